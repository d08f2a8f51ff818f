//! Columnar binary cache of a normalized [`Dataset`].
//!
//! The cache stores one vector per canonical field (plus one per extension
//! column) so a reload skips header mapping and coercion entirely. Files are
//! bincode-encoded and versioned; anything that does not decode as the
//! current version is rejected and the caller falls through to the next tier.

use std::{
    collections::BTreeMap,
    ffi::OsString,
    fs::{self, File},
    io::{BufWriter, Write},
    path::{Path, PathBuf},
};

use anyhow::{Context, Result, anyhow, ensure};
use chrono::{DateTime, NaiveDateTime, Timelike};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{
    data::Value,
    record::{Dataset, Field, FieldKind, Transaction},
};

const CACHE_MAGIC: [u8; 4] = *b"TXVC";
const CACHE_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
enum ColumnData {
    Text(Vec<Option<String>>),
    Timestamp(Vec<Option<(i64, u32)>>),
    Integer(Vec<Option<i64>>),
    Decimal(Vec<Option<[u8; 16]>>),
    Tags(Vec<Vec<String>>),
    Extension(Vec<Option<Value>>),
}

impl ColumnData {
    fn len(&self) -> usize {
        match self {
            ColumnData::Text(values) => values.len(),
            ColumnData::Timestamp(values) => values.len(),
            ColumnData::Integer(values) => values.len(),
            ColumnData::Decimal(values) => values.len(),
            ColumnData::Tags(values) => values.len(),
            ColumnData::Extension(values) => values.len(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
struct CachedColumn {
    name: String,
    data: ColumnData,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
struct ColumnarCache {
    magic: [u8; 4],
    version: u32,
    row_count: usize,
    columns: Vec<CachedColumn>,
    extension_columns: Vec<String>,
}

impl ColumnarCache {
    fn from_dataset(dataset: &Dataset) -> Self {
        let records = dataset.records();
        let mut columns = Field::ALL
            .iter()
            .map(|field| CachedColumn {
                name: field.name().to_string(),
                data: encode_field(records, *field),
            })
            .collect::<Vec<_>>();
        for name in dataset.extension_columns() {
            let values = records
                .iter()
                .map(|record| record.extensions.get(name).cloned().flatten())
                .collect();
            columns.push(CachedColumn {
                name: name.clone(),
                data: ColumnData::Extension(values),
            });
        }
        ColumnarCache {
            magic: CACHE_MAGIC,
            version: CACHE_VERSION,
            row_count: records.len(),
            columns,
            extension_columns: dataset.extension_columns().to_vec(),
        }
    }

    fn into_dataset(self) -> Result<Dataset> {
        ensure!(self.magic == CACHE_MAGIC, "Not a dataset cache file");
        ensure!(
            self.version == CACHE_VERSION,
            "Unsupported cache version {} (expected {CACHE_VERSION})",
            self.version
        );
        let row_count = self.row_count;
        let mut records = vec![Transaction::default(); row_count];
        for name in &self.extension_columns {
            for record in records.iter_mut() {
                record.extensions.insert(name.clone(), None);
            }
        }

        for column in self.columns {
            ensure!(
                column.data.len() == row_count,
                "Cache column '{}' holds {} value(s) for {row_count} row(s)",
                column.name,
                column.data.len()
            );
            match column.data {
                ColumnData::Extension(values) => {
                    for (record, value) in records.iter_mut().zip(values) {
                        record.extensions.insert(column.name.clone(), value);
                    }
                }
                data => {
                    let field = column.name.parse::<Field>()?;
                    decode_field(&mut records, field, data)?;
                }
            }
        }
        Ok(Dataset::new(records, self.extension_columns))
    }
}

fn encode_field(records: &[Transaction], field: Field) -> ColumnData {
    match field.kind() {
        FieldKind::Text => ColumnData::Text(
            records
                .iter()
                .map(|record| record.text(field).map(str::to_string))
                .collect(),
        ),
        FieldKind::Timestamp => ColumnData::Timestamp(
            records
                .iter()
                .map(|record| record.date.as_ref().map(encode_timestamp))
                .collect(),
        ),
        FieldKind::Integer => ColumnData::Integer(
            records
                .iter()
                .map(|record| match field {
                    Field::Age => record.age,
                    _ => record.quantity,
                })
                .collect(),
        ),
        FieldKind::Decimal => ColumnData::Decimal(
            records
                .iter()
                .map(|record| record.decimal(field).map(Decimal::serialize))
                .collect(),
        ),
        FieldKind::Tags => {
            ColumnData::Tags(records.iter().map(|record| record.tags.clone()).collect())
        }
    }
}

fn decode_field(records: &mut [Transaction], field: Field, data: ColumnData) -> Result<()> {
    match (field.kind(), data) {
        (FieldKind::Text, ColumnData::Text(values)) => {
            for (record, value) in records.iter_mut().zip(values) {
                if let Some(slot) = record.text_slot_mut(field) {
                    *slot = value;
                }
            }
        }
        (FieldKind::Timestamp, ColumnData::Timestamp(values)) => {
            for (record, value) in records.iter_mut().zip(values) {
                record.date = value.map(decode_timestamp).transpose()?;
            }
        }
        (FieldKind::Integer, ColumnData::Integer(values)) => {
            for (record, value) in records.iter_mut().zip(values) {
                if let Some(slot) = record.integer_slot_mut(field) {
                    *slot = value;
                }
            }
        }
        (FieldKind::Decimal, ColumnData::Decimal(values)) => {
            for (record, value) in records.iter_mut().zip(values) {
                if let Some(slot) = record.decimal_slot_mut(field) {
                    *slot = value.map(Decimal::deserialize);
                }
            }
        }
        (FieldKind::Tags, ColumnData::Tags(values)) => {
            for (record, value) in records.iter_mut().zip(values) {
                record.tags = value;
            }
        }
        (kind, _) => {
            return Err(anyhow!(
                "Cache column '{field}' does not hold {kind:?} values"
            ));
        }
    }
    Ok(())
}

fn encode_timestamp(value: &NaiveDateTime) -> (i64, u32) {
    let utc = value.and_utc();
    (utc.timestamp(), utc.nanosecond())
}

fn decode_timestamp((seconds, nanos): (i64, u32)) -> Result<NaiveDateTime> {
    DateTime::from_timestamp(seconds, nanos)
        .map(|dt| dt.naive_utc())
        .ok_or_else(|| anyhow!("Cached timestamp {seconds}.{nanos:09} is out of range"))
}

/// Writes the cache beside `path` and renames it into place, so readers see
/// either the previous file or the complete new one.
pub fn save(dataset: &Dataset, path: &Path) -> Result<()> {
    let cache = ColumnarCache::from_dataset(dataset);
    let staging = staging_path(path);
    let written = write_cache(&cache, &staging).and_then(|()| {
        fs::rename(&staging, path)
            .with_context(|| format!("Moving cache file into place at {path:?}"))
    });
    if written.is_err() {
        let _ = fs::remove_file(&staging);
    }
    written
}

fn write_cache(cache: &ColumnarCache, path: &Path) -> Result<()> {
    let file = File::create(path).with_context(|| format!("Creating cache file {path:?}"))?;
    let mut writer = BufWriter::new(file);
    bincode::serde::encode_into_std_write(cache, &mut writer, bincode::config::standard())
        .context("Writing cache file")?;
    writer.flush().context("Flushing cache file")?;
    writer
        .get_ref()
        .sync_all()
        .context("Syncing cache file")?;
    Ok(())
}

fn staging_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(OsString::from).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

pub fn load(path: &Path) -> Result<Dataset> {
    read_cache(path)?.into_dataset()
}

/// Column names and value counts stored in a cache file.
pub fn column_summary(path: &Path) -> Result<BTreeMap<String, usize>> {
    let cache = read_cache(path)?;
    Ok(cache
        .columns
        .into_iter()
        .map(|column| (column.name, column.data.len()))
        .collect())
}

fn read_cache(path: &Path) -> Result<ColumnarCache> {
    let bytes = fs::read(path).with_context(|| format!("Opening cache file {path:?}"))?;
    let (cache, _): (ColumnarCache, usize) =
        bincode::serde::decode_from_slice(&bytes, bincode::config::standard())
            .context("Decoding cache file")?;
    Ok(cache)
}
