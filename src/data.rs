//! Typed cell values and the text coercions shared by every load tier.
//!
//! Sources hand over loosely typed cells (CSV text, SQLite dynamic values);
//! the helpers here turn them into timestamps, integers and exact decimals,
//! returning `None` for anything that does not coerce so a single bad cell
//! never aborts a load.

use std::{fmt, str::FromStr};

use anyhow::{Result, anyhow};
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;
use rust_decimal::prelude::FromPrimitive;
use serde::{Deserialize, Serialize};

/// Slash and dot layouts read month-first; the day-first layouts only match
/// when the leading number cannot be a month.
const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%m/%d/%Y",
    "%d/%m/%Y",
    "%Y/%m/%d",
    "%m.%d.%Y",
    "%d.%m.%Y",
    "%d-%m-%Y",
];

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%m/%d/%Y %H:%M:%S",
    "%d/%m/%Y %H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
];

const MISSING_SENTINELS: &[&str] = &[
    "na", "n/a", "nan", "-nan", "nat", "null", "none", "<na>", "#n/a", "#na",
];

/// Value of a pass-through (unmapped) column.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum Value {
    String(String),
    Integer(i64),
    Float(f64),
}

impl Value {
    pub fn as_display(&self) -> String {
        match self {
            Value::String(s) => s.clone(),
            Value::Integer(i) => i.to_string(),
            Value::Float(f) => format_float(*f),
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Value::Integer(_) | Value::Float(_) => 0,
            Value::String(_) => 1,
        }
    }

    pub fn total_cmp(&self, other: &Self) -> std::cmp::Ordering {
        match (self, other) {
            (Value::String(a), Value::String(b)) => a.cmp(b),
            (Value::Integer(a), Value::Integer(b)) => a.cmp(b),
            (Value::Float(a), Value::Float(b)) => a.total_cmp(b),
            (Value::Integer(a), Value::Float(b)) => (*a as f64).total_cmp(b),
            (Value::Float(a), Value::Integer(b)) => a.total_cmp(&(*b as f64)),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_display())
    }
}

/// Loosely typed cell as produced by a source tier, before normalization.
#[derive(Debug, Clone, PartialEq)]
pub enum RawCell {
    Null,
    Text(String),
    Integer(i64),
    Float(f64),
}

impl RawCell {
    /// Folds every "not a value" representation into [`RawCell::Null`].
    pub fn canonical(self) -> RawCell {
        match self {
            RawCell::Text(text) if is_missing_sentinel(&text) => RawCell::Null,
            RawCell::Float(f) if f.is_nan() => RawCell::Null,
            other => other,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, RawCell::Null)
    }
}

pub fn is_missing_sentinel(value: &str) -> bool {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return true;
    }
    let lowered = trimmed.to_ascii_lowercase();
    MISSING_SENTINELS.contains(&lowered.as_str())
}

pub fn parse_naive_date(value: &str) -> Result<NaiveDate> {
    for fmt in DATE_FORMATS {
        if let Ok(parsed) = NaiveDate::parse_from_str(value, fmt) {
            return Ok(parsed);
        }
    }
    Err(anyhow!("Failed to parse '{value}' as date"))
}

pub fn parse_naive_datetime(value: &str) -> Result<NaiveDateTime> {
    for fmt in DATETIME_FORMATS {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(value, fmt) {
            return Ok(parsed);
        }
    }
    Err(anyhow!("Failed to parse '{value}' as datetime"))
}

/// Parses a timestamp in any of the accepted layouts.
///
/// Offsets are converted to UTC; date-only values land on midnight.
pub fn parse_timestamp(value: &str) -> Option<NaiveDateTime> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }
    if let Ok(parsed) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(parsed.naive_utc());
    }
    let without_zulu = trimmed.strip_suffix('Z').unwrap_or(trimmed);
    if let Ok(parsed) = parse_naive_datetime(without_zulu) {
        return Some(parsed);
    }
    parse_naive_date(trimmed)
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
}

/// Renders a timestamp as ISO-8601 with millisecond precision and a `Z` suffix.
pub fn format_timestamp(value: &NaiveDateTime) -> String {
    value.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()
}

/// Parses possibly currency-decorated text ("₹1,299.00", "$-12") into a decimal.
pub fn parse_decimal_text(value: &str) -> Option<Decimal> {
    let trimmed = value.trim();
    if let Ok(parsed) = Decimal::from_str(trimmed) {
        return Some(parsed);
    }
    let stripped = trimmed
        .chars()
        .filter(|c| c.is_ascii_digit() || matches!(c, '.' | '-'))
        .collect::<String>();
    Decimal::from_str(&stripped).ok()
}

pub fn decimal_from_f64(value: f64) -> Option<Decimal> {
    if value.is_finite() {
        Decimal::from_f64(value)
    } else {
        None
    }
}

pub fn parse_integer_text(value: &str) -> Option<i64> {
    let trimmed = value.trim();
    if let Ok(parsed) = trimmed.parse::<i64>() {
        return Some(parsed);
    }
    trimmed.parse::<f64>().ok().and_then(integral_f64)
}

pub fn integral_f64(value: f64) -> Option<i64> {
    if value.is_finite() && value.fract() == 0.0 && value.abs() < i64::MAX as f64 {
        Some(value as i64)
    } else {
        None
    }
}

pub fn format_float(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < i64::MAX as f64 {
        (value as i64).to_string()
    } else {
        value.to_string()
    }
}
