//! Relational store tier: a SQLite file holding a bulk import of the source.
//!
//! Rows are read from the `transactions` table, or from the legacy
//! `properties` table when the former is absent. Legacy imports sanitized
//! their headers (`transaction_id`); those are turned back into title-cased,
//! space-separated names before the column mapping is applied.

use std::path::Path;

use anyhow::{Context, Result};
use heck::ToTitleCase;
use log::{debug, info};
use rusqlite::{Connection, OpenFlags, types::ValueRef};

use crate::{data::RawCell, normalize::RawTable};

pub const TRANSACTIONS_TABLE: &str = "transactions";
pub const LEGACY_TABLE: &str = "properties";

const ID_HEADER: &str = "Transaction ID";

pub fn read_table(path: &Path) -> Result<RawTable> {
    let flags = OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX;
    let connection = Connection::open_with_flags(path, flags)
        .with_context(|| format!("Opening relational store {path:?}"))?;

    let mut table = match select_all(&connection, TRANSACTIONS_TABLE) {
        Ok(table) => table,
        Err(primary) => {
            debug!("Table '{TRANSACTIONS_TABLE}' unavailable ({primary:#}); trying '{LEGACY_TABLE}'");
            select_all(&connection, LEGACY_TABLE).map_err(|_| primary)?
        }
    };
    restore_sanitized_headers(&mut table.headers);
    info!(
        "Read {} row(s) across {} column(s) from {:?}",
        table.rows.len(),
        table.headers.len(),
        path
    );
    Ok(table)
}

fn select_all(connection: &Connection, table: &str) -> Result<RawTable> {
    let mut statement = connection
        .prepare(&format!("SELECT * FROM \"{table}\""))
        .with_context(|| format!("Querying table '{table}'"))?;
    let headers = statement
        .column_names()
        .into_iter()
        .map(str::to_string)
        .collect::<Vec<_>>();
    let column_count = headers.len();

    let mut raw = RawTable::new(headers);
    let mut rows = statement.query([])?;
    while let Some(row) = rows.next()? {
        let mut cells = Vec::with_capacity(column_count);
        for idx in 0..column_count {
            cells.push(cell_from_sql(row.get_ref(idx)?));
        }
        raw.rows.push(cells);
    }
    Ok(raw)
}

fn cell_from_sql(value: ValueRef<'_>) -> RawCell {
    match value {
        ValueRef::Null => RawCell::Null,
        ValueRef::Integer(i) => RawCell::Integer(i),
        ValueRef::Real(f) => RawCell::Float(f),
        ValueRef::Text(bytes) | ValueRef::Blob(bytes) => {
            RawCell::Text(String::from_utf8_lossy(bytes).into_owned())
        }
    }
}

/// Title-cases lowercase/underscore headers when the table looks sanitized.
pub fn restore_sanitized_headers(headers: &mut [String]) {
    let sanitized = !headers.iter().any(|h| h == ID_HEADER)
        && headers
            .iter()
            .any(|h| h.replace('_', " ").eq_ignore_ascii_case(ID_HEADER));
    if !sanitized {
        return;
    }
    for header in headers.iter_mut() {
        *header = header.to_title_case();
    }
}
