//! Elastic text tables for printing query pages in a terminal.

use std::borrow::Cow;
use std::fmt::Write as _;

use anyhow::{Result, anyhow};
use itertools::Itertools;

use crate::{
    query::{FieldKey, QueryPage},
    record::{Dataset, Field},
};

/// Columns shown when none are requested.
pub const DEFAULT_COLUMNS: [Field; 7] = [
    Field::TransactionId,
    Field::Date,
    Field::CustomerName,
    Field::CustomerRegion,
    Field::ProductCategory,
    Field::PaymentMethod,
    Field::FinalAmount,
];

pub fn resolve_columns(names: &[String], dataset: &Dataset) -> Result<Vec<(String, FieldKey)>> {
    if names.is_empty() {
        return Ok(DEFAULT_COLUMNS
            .iter()
            .map(|field| (field.name().to_string(), FieldKey::Canonical(*field)))
            .collect());
    }
    names
        .iter()
        .map(|name| name.trim())
        .filter(|name| !name.is_empty())
        .map(|name| {
            FieldKey::resolve(name, dataset)
                .map(|key| (name.to_string(), key))
                .ok_or_else(|| anyhow!("Unknown column '{name}'"))
        })
        .collect()
}

pub fn render_page(page: &QueryPage, columns: &[(String, FieldKey)]) -> String {
    let headers = columns.iter().map(|(name, _)| name.clone()).collect_vec();
    let rows = page
        .data
        .iter()
        .map(|record| {
            columns
                .iter()
                .map(|(_, key)| key.value(record).as_display())
                .collect_vec()
        })
        .collect_vec();
    let mut output = render_table(&headers, &rows);
    let _ = writeln!(
        output,
        "page {} ({} per page), {} matching record(s)",
        page.page, page.page_size, page.total
    );
    output
}

pub fn render_table(headers: &[String], rows: &[Vec<String>]) -> String {
    let column_count = headers.len();
    let mut widths = headers.iter().map(|h| display_width(h)).collect_vec();

    for row in rows {
        for (idx, cell) in row.iter().enumerate().take(column_count) {
            widths[idx] = widths[idx].max(display_width(cell));
        }
    }

    for width in &mut widths {
        *width = (*width).max(1);
    }

    let mut output = String::new();
    let _ = writeln!(output, "{}", format_row(headers, &widths));

    let separator_widths = widths.iter().map(|w| (*w).max(3)).collect_vec();
    let separator_cells = separator_widths.iter().map(|w| "-".repeat(*w)).collect_vec();
    let _ = writeln!(output, "{}", format_row(&separator_cells, &separator_widths));

    for row in rows {
        let _ = writeln!(output, "{}", format_row(row, &widths));
    }

    output
}

fn format_row(values: &[String], widths: &[usize]) -> String {
    let mut line = values
        .iter()
        .zip(widths)
        .map(|(value, width)| {
            let sanitized = sanitize_cell(value);
            let padding = width.saturating_sub(display_width(sanitized.as_ref()));
            let mut cell = sanitized.into_owned();
            cell.push_str(&" ".repeat(padding));
            cell
        })
        .join("  ");
    while line.ends_with(' ') {
        line.pop();
    }
    line
}

fn display_width(value: &str) -> usize {
    let mut width = 0usize;
    let mut chars = value.chars();
    while let Some(ch) = chars.next() {
        if ch == '\u{1b}' {
            // ANSI escape, e.g. \x1b[31m
            for next in chars.by_ref() {
                if next == 'm' {
                    break;
                }
            }
        } else {
            width += 1;
        }
    }
    width
}

fn sanitize_cell(value: &str) -> Cow<'_, str> {
    if value.contains(['\n', '\r', '\t']) {
        Cow::Owned(value.replace(['\n', '\r', '\t'], " "))
    } else {
        Cow::Borrowed(value)
    }
}
