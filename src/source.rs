//! Raw delimited source: the last-resort tier and the source of truth.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use encoding_rs::Encoding;
use log::info;

use crate::{data::RawCell, io_utils, normalize::RawTable};

/// Picks the first existing candidate, falling back to the last one.
///
/// A missing fallback is reported by the reader, not here.
pub fn locate(candidates: &[PathBuf]) -> Option<&Path> {
    candidates
        .iter()
        .find(|candidate| candidate.is_file())
        .or_else(|| candidates.last())
        .map(PathBuf::as_path)
}

pub fn read_table(path: &Path, delimiter: Option<u8>, encoding: &'static Encoding) -> Result<RawTable> {
    let delimiter = io_utils::resolve_input_delimiter(path, delimiter);
    info!(
        "Reading delimited source '{}' (delimiter '{}', encoding {})",
        path.display(),
        crate::printable_delimiter(delimiter),
        encoding.name()
    );
    let mut reader = io_utils::open_csv_reader_from_path(path, delimiter, true)?;
    let headers = io_utils::reader_headers(&mut reader, encoding)
        .with_context(|| format!("Reading headers from {path:?}"))?;

    let mut table = RawTable::new(headers);
    for (row_idx, record) in reader.byte_records().enumerate() {
        let record = record.with_context(|| format!("Reading row {}", row_idx + 2))?;
        let decoded = io_utils::decode_record(&record, encoding)
            .with_context(|| format!("Decoding row {}", row_idx + 2))?;
        table
            .rows
            .push(decoded.into_iter().map(RawCell::Text).collect());
    }
    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;
    use encoding_rs::UTF_8;
    use tempfile::tempdir;

    #[test]
    fn locate_prefers_first_existing_candidate() {
        let dir = tempdir().unwrap();
        let local = dir.path().join("local.csv");
        let shared = dir.path().join("shared.csv");
        std::fs::write(&shared, "a\n1\n").unwrap();
        let candidates = vec![local.clone(), shared.clone()];
        assert_eq!(locate(&candidates), Some(shared.as_path()));

        std::fs::write(&local, "a\n1\n").unwrap();
        assert_eq!(locate(&candidates), Some(local.as_path()));
    }

    #[test]
    fn locate_defaults_to_last_candidate_when_none_exist() {
        let candidates = vec![PathBuf::from("/nope/a.csv"), PathBuf::from("/nope/b.csv")];
        assert_eq!(locate(&candidates), Some(Path::new("/nope/b.csv")));
        assert_eq!(locate(&[]), None);
    }

    #[test]
    fn read_table_keeps_cells_as_text() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("data.tsv");
        std::fs::write(&path, "Customer Name\tTags\nAsha\ta,b\n").unwrap();
        let table = read_table(&path, None, UTF_8).unwrap();
        assert_eq!(table.headers, vec!["Customer Name", "Tags"]);
        assert_eq!(
            table.rows,
            vec![vec![RawCell::Text("Asha".into()), RawCell::Text("a,b".into())]]
        );
    }

    #[test]
    fn read_table_reports_missing_file() {
        let err = read_table(Path::new("/definitely/missing.csv"), None, UTF_8)
            .expect_err("missing file should fail");
        assert!(format!("{err:#}").contains("Opening input file"));
    }
}
