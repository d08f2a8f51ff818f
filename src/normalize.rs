//! Schema normalization: raw source tables into canonical [`Dataset`]s.
//!
//! Headers are resolved through the column mapping table, typed fields are
//! coerced (timestamps, integers, currency-decorated decimals, tag lists) and
//! every missing-value sentinel collapses to `None`. A cell that fails to
//! coerce becomes `None` and is counted in the [`NormalizeReport`].

use std::collections::BTreeMap;

use log::debug;
use rust_decimal::Decimal;

use crate::{
    data::{
        RawCell, Value, decimal_from_f64, format_float, integral_f64, parse_decimal_text,
        parse_integer_text, parse_timestamp,
    },
    record::{Dataset, Field, FieldKind, Transaction},
};

/// Table as read from a source tier, headers still in their raw form.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<RawCell>>,
}

impl RawTable {
    pub fn new(headers: Vec<String>) -> Self {
        Self {
            headers,
            rows: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NormalizeReport {
    pub rows: usize,
    pub coercion_failures: BTreeMap<Field, usize>,
    pub extension_columns: Vec<String>,
}

impl NormalizeReport {
    pub fn total_failures(&self) -> usize {
        self.coercion_failures.values().sum()
    }

    fn record_failure(&mut self, field: Field) {
        *self.coercion_failures.entry(field).or_insert(0) += 1;
    }
}

#[derive(Debug, Clone, Copy)]
enum ColumnTarget {
    Canonical(Field),
    Extension(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ExtensionType {
    Integer,
    Float,
    String,
}

#[derive(Debug, Clone)]
struct ExtensionCandidate {
    possible_integer: bool,
    possible_float: bool,
    observed: usize,
}

impl ExtensionCandidate {
    fn new() -> Self {
        Self {
            possible_integer: true,
            possible_float: true,
            observed: 0,
        }
    }

    fn observe(&mut self, cell: &RawCell) {
        match cell {
            RawCell::Null => return,
            RawCell::Text(text) => {
                let trimmed = text.trim();
                if self.possible_integer && trimmed.parse::<i64>().is_err() {
                    self.possible_integer = false;
                }
                if self.possible_float && trimmed.parse::<f64>().is_err() {
                    self.possible_float = false;
                }
            }
            RawCell::Integer(_) => {}
            RawCell::Float(_) => self.possible_integer = false,
        }
        self.observed += 1;
    }

    fn decide(&self) -> ExtensionType {
        if self.observed == 0 {
            ExtensionType::String
        } else if self.possible_integer {
            ExtensionType::Integer
        } else if self.possible_float {
            ExtensionType::Float
        } else {
            ExtensionType::String
        }
    }
}

pub fn normalize(table: RawTable) -> Dataset {
    normalize_with_report(table).0
}

pub fn normalize_with_report(table: RawTable) -> (Dataset, NormalizeReport) {
    let RawTable { headers, rows } = table;
    let (targets, extension_columns) = plan_columns(&headers);

    let rows = rows
        .into_iter()
        .map(|row| row.into_iter().map(RawCell::canonical).collect::<Vec<_>>())
        .collect::<Vec<_>>();

    let mut candidates = vec![ExtensionCandidate::new(); extension_columns.len()];
    for row in &rows {
        for (cell, target) in row.iter().zip(&targets) {
            if let ColumnTarget::Extension(idx) = target {
                candidates[*idx].observe(cell);
            }
        }
    }
    let extension_types = candidates
        .iter()
        .map(ExtensionCandidate::decide)
        .collect::<Vec<_>>();

    let mut report = NormalizeReport {
        rows: rows.len(),
        extension_columns: extension_columns.clone(),
        ..NormalizeReport::default()
    };

    let mut records = Vec::with_capacity(rows.len());
    for row in rows {
        let mut record = Transaction::default();
        for name in &extension_columns {
            record.extensions.insert(name.clone(), None);
        }
        for (cell, target) in row.into_iter().zip(&targets) {
            if cell.is_null() {
                continue;
            }
            match *target {
                ColumnTarget::Canonical(field) => assign_field(&mut record, field, cell, &mut report),
                ColumnTarget::Extension(idx) => {
                    let name = &extension_columns[idx];
                    let slot = record.extensions.entry(name.clone()).or_insert(None);
                    if slot.is_none() {
                        *slot = extension_value(cell, extension_types[idx]);
                    }
                }
            }
        }
        records.push(record);
    }

    if report.total_failures() > 0 {
        debug!(
            "Normalized {} row(s); {} value(s) failed coercion: {:?}",
            report.rows,
            report.total_failures(),
            report.coercion_failures
        );
    }

    (Dataset::new(records, extension_columns), report)
}

fn plan_columns(headers: &[String]) -> (Vec<ColumnTarget>, Vec<String>) {
    let mut extension_columns: Vec<String> = Vec::new();
    let targets = headers
        .iter()
        .map(|header| match Field::from_header(header) {
            Some(field) => ColumnTarget::Canonical(field),
            None => {
                let idx = match extension_columns.iter().position(|name| name == header) {
                    Some(existing) => existing,
                    None => {
                        extension_columns.push(header.clone());
                        extension_columns.len() - 1
                    }
                };
                ColumnTarget::Extension(idx)
            }
        })
        .collect();
    (targets, extension_columns)
}

/// Writes `cell` into `field` unless an earlier column already supplied a value.
fn assign_field(record: &mut Transaction, field: Field, cell: RawCell, report: &mut NormalizeReport) {
    match field.kind() {
        FieldKind::Text => {
            if let Some(slot) = record.text_slot_mut(field)
                && slot.is_none()
            {
                *slot = text_value(cell);
            }
        }
        FieldKind::Timestamp => {
            if record.date.is_some() {
                return;
            }
            record.date = match cell {
                RawCell::Text(text) => parse_timestamp(&text),
                _ => None,
            };
            if record.date.is_none() {
                report.record_failure(field);
            }
        }
        FieldKind::Integer => {
            if let Some(slot) = record.integer_slot_mut(field)
                && slot.is_none()
            {
                *slot = integer_value(cell);
                if slot.is_none() {
                    report.record_failure(field);
                }
            }
        }
        FieldKind::Decimal => {
            if let Some(slot) = record.decimal_slot_mut(field)
                && slot.is_none()
            {
                *slot = decimal_value(cell);
                if slot.is_none() {
                    report.record_failure(field);
                }
            }
        }
        FieldKind::Tags => {
            if record.tags.is_empty() {
                record.tags = match cell {
                    RawCell::Text(text) => split_tags(&text),
                    RawCell::Integer(i) => split_tags(&i.to_string()),
                    RawCell::Float(f) => split_tags(&format_float(f)),
                    RawCell::Null => Vec::new(),
                };
            }
        }
    }
}

fn text_value(cell: RawCell) -> Option<String> {
    match cell {
        RawCell::Null => None,
        RawCell::Text(text) => Some(text),
        RawCell::Integer(i) => Some(i.to_string()),
        RawCell::Float(f) => Some(format_float(f)),
    }
}

fn integer_value(cell: RawCell) -> Option<i64> {
    match cell {
        RawCell::Null => None,
        RawCell::Text(text) => parse_integer_text(&text),
        RawCell::Integer(i) => Some(i),
        RawCell::Float(f) => integral_f64(f),
    }
}

fn decimal_value(cell: RawCell) -> Option<Decimal> {
    match cell {
        RawCell::Null => None,
        RawCell::Text(text) => parse_decimal_text(&text),
        RawCell::Integer(i) => Some(Decimal::from(i)),
        RawCell::Float(f) => decimal_from_f64(f),
    }
}

fn extension_value(cell: RawCell, ty: ExtensionType) -> Option<Value> {
    match (ty, cell) {
        (_, RawCell::Null) => None,
        (ExtensionType::Integer, RawCell::Text(text)) => text.trim().parse().ok().map(Value::Integer),
        (ExtensionType::Integer, RawCell::Integer(i)) => Some(Value::Integer(i)),
        (ExtensionType::Float, RawCell::Text(text)) => text.trim().parse().ok().map(Value::Float),
        (ExtensionType::Float, RawCell::Integer(i)) => Some(Value::Float(i as f64)),
        (ExtensionType::Integer | ExtensionType::Float, RawCell::Float(f)) => Some(Value::Float(f)),
        (ExtensionType::String, other) => text_value(other).map(Value::String),
    }
}

/// Splits a delimited tag field on commas and pipes, keeping source order.
///
/// Text that is itself a bracketed list literal (`['a', 'b']`) is read as
/// that list instead.
pub fn split_tags(text: &str) -> Vec<String> {
    if let Some(tags) = parse_list_literal(text) {
        return tags
            .into_iter()
            .map(|tag| tag.trim().to_string())
            .filter(|tag| !tag.is_empty())
            .collect();
    }
    text.replace('|', ",")
        .split(',')
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .map(str::to_string)
        .collect()
}

/// Reads a bracketed list literal in JSON or single-quoted form.
pub fn parse_list_literal(text: &str) -> Option<Vec<String>> {
    let trimmed = text.trim();
    if !(trimmed.starts_with('[') && trimmed.ends_with(']')) {
        return None;
    }
    if let Ok(items) = serde_json::from_str::<Vec<String>>(trimmed) {
        return Some(items);
    }
    let inner = trimmed[1..trimmed.len() - 1].trim();
    if inner.is_empty() {
        return Some(Vec::new());
    }
    inner
        .split(',')
        .map(|item| unquote(item.trim()).map(str::to_string))
        .collect()
}

fn unquote(value: &str) -> Option<&str> {
    let bytes = value.as_bytes();
    if bytes.len() >= 2
        && ((bytes[0] == b'\'' && bytes[bytes.len() - 1] == b'\'')
            || (bytes[0] == b'"' && bytes[bytes.len() - 1] == b'"'))
    {
        Some(&value[1..value.len() - 1])
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use std::str::FromStr;

    fn text(value: &str) -> RawCell {
        RawCell::Text(value.to_string())
    }

    fn table(headers: &[&str], rows: Vec<Vec<RawCell>>) -> RawTable {
        RawTable {
            headers: headers.iter().map(|h| h.to_string()).collect(),
            rows,
        }
    }

    #[test]
    fn renames_and_coerces_raw_csv_row() {
        let raw = table(
            &[
                "Transaction ID",
                "Date",
                "Customer Name",
                "Phone Number",
                "Age",
                "Tags",
                "Total Amount",
                "Employee name",
            ],
            vec![vec![
                text("1001"),
                text("2023-02-01"),
                text("Asha Rao"),
                text("9876543210"),
                text("34"),
                text("sale | new ,, clearance"),
                text("₹1,250.00"),
                text("Ravi"),
            ]],
        );
        let (dataset, report) = normalize_with_report(raw);
        assert_eq!(report.total_failures(), 0);
        let record = &dataset.records()[0];
        assert_eq!(record.transaction_id.as_deref(), Some("1001"));
        assert_eq!(
            record.date,
            NaiveDate::from_ymd_opt(2023, 2, 1).and_then(|d| d.and_hms_opt(0, 0, 0))
        );
        assert_eq!(record.phone_number.as_deref(), Some("9876543210"));
        assert_eq!(record.age, Some(34));
        assert_eq!(record.tags, vec!["sale", "new", "clearance"]);
        assert_eq!(record.total_amount, Decimal::from_str("1250.00").ok());
        assert_eq!(record.employee_name.as_deref(), Some("Ravi"));
    }

    #[test]
    fn bad_values_become_null_and_are_counted() {
        let raw = table(
            &["Date", "Age", "Final Amount"],
            vec![vec![text("someday"), text("thirty"), text("free")]],
        );
        let (dataset, report) = normalize_with_report(raw);
        let record = &dataset.records()[0];
        assert!(record.date.is_none());
        assert!(record.age.is_none());
        assert!(record.final_amount.is_none());
        assert_eq!(report.total_failures(), 3);
        assert_eq!(report.coercion_failures.get(&Field::Date), Some(&1));
    }

    #[test]
    fn sentinels_and_nan_collapse_to_null() {
        let raw = table(
            &["Customer Name", "Price per Unit", "Gender", "Tags"],
            vec![vec![text("N/A"), RawCell::Float(f64::NAN), text(""), RawCell::Null]],
        );
        let (dataset, report) = normalize_with_report(raw);
        let record = &dataset.records()[0];
        assert!(record.customer_name.is_none());
        assert!(record.price_per_unit.is_none());
        assert!(record.gender.is_none());
        assert!(record.tags.is_empty());
        assert_eq!(report.total_failures(), 0);
    }

    #[test]
    fn numeric_cells_pass_through_typed_fields() {
        let raw = table(
            &["Phone Number", "Quantity", "Total Amount", "Age"],
            vec![vec![
                RawCell::Integer(9123456789),
                RawCell::Float(3.0),
                RawCell::Float(99.5),
                RawCell::Float(41.5),
            ]],
        );
        let (dataset, report) = normalize_with_report(raw);
        let record = &dataset.records()[0];
        assert_eq!(record.phone_number.as_deref(), Some("9123456789"));
        assert_eq!(record.quantity, Some(3));
        assert_eq!(record.total_amount, Decimal::from_str("99.5").ok());
        assert!(record.age.is_none());
        assert_eq!(report.coercion_failures.get(&Field::Age), Some(&1));
    }

    #[test]
    fn unmapped_columns_become_typed_extensions_on_every_record() {
        let raw = table(
            &["Transaction ID", "Loyalty Points", "Channel"],
            vec![
                vec![text("1"), text("120"), text("web")],
                vec![text("2"), text(""), text("store")],
            ],
        );
        let dataset = normalize(raw);
        assert_eq!(dataset.extension_columns(), ["Loyalty Points", "Channel"]);
        let first = &dataset.records()[0];
        let second = &dataset.records()[1];
        assert_eq!(first.extensions["Loyalty Points"], Some(Value::Integer(120)));
        assert_eq!(second.extensions["Loyalty Points"], None);
        assert_eq!(
            second.extensions["Channel"],
            Some(Value::String("store".into()))
        );
    }

    #[test]
    fn duplicate_header_variants_merge_first_non_null() {
        let raw = table(
            &["Customer region", "Customer Region"],
            vec![
                vec![RawCell::Null, text("North")],
                vec![text("South"), text("West")],
            ],
        );
        let dataset = normalize(raw);
        assert_eq!(dataset.records()[0].customer_region.as_deref(), Some("North"));
        assert_eq!(dataset.records()[1].customer_region.as_deref(), Some("South"));
    }

    #[test]
    fn canonical_headers_pass_through_unchanged() {
        let headers = Field::ALL.iter().map(|f| f.name()).collect::<Vec<_>>();
        let mut cells = vec![RawCell::Null; headers.len()];
        cells[0] = text("T-9");
        cells[5] = text("Female");
        let dataset = normalize(table(&headers, vec![cells]));
        let record = &dataset.records()[0];
        assert_eq!(record.transaction_id.as_deref(), Some("T-9"));
        assert_eq!(record.gender.as_deref(), Some("Female"));
        assert!(dataset.extension_columns().is_empty());
    }

    #[test]
    fn split_tags_accepts_list_literals() {
        assert_eq!(split_tags("['a', 'b']"), vec!["a", "b"]);
        assert_eq!(split_tags(r#"["x","y"]"#), vec!["x", "y"]);
        assert!(split_tags("[]").is_empty());
        assert_eq!(parse_list_literal("[a, b]"), None);
        assert_eq!(parse_list_literal("a, b"), None);
    }
}
