//! Search, filter, sort and paginate over a loaded dataset.
//!
//! Queries are read-only: matching records are gathered by reference, sorted
//! stably, and only the requested page is cloned into the response.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::{
    filter::{FilterPlan, FilterSpec},
    record::{Dataset, Field, FieldValue, Transaction},
};

pub const DEFAULT_PAGE: i64 = 1;
pub const DEFAULT_PAGE_SIZE: i64 = 10;
pub const DEFAULT_SORT_FIELD: &str = "Date";

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    #[default]
    Desc,
}

impl SortDirection {
    /// `asc` in any case sorts ascending; everything else sorts descending.
    pub fn parse(value: &str) -> Self {
        if value.trim().eq_ignore_ascii_case("asc") {
            SortDirection::Asc
        } else {
            SortDirection::Desc
        }
    }

    pub fn is_ascending(self) -> bool {
        matches!(self, SortDirection::Asc)
    }

    fn as_str(self) -> &'static str {
        match self {
            SortDirection::Asc => "asc",
            SortDirection::Desc => "desc",
        }
    }
}

impl std::fmt::Display for SortDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldKey {
    Canonical(Field),
    Extension(String),
}

impl FieldKey {
    /// Resolves a field name against the canonical fields and the
    /// dataset's extension columns. Unknown names yield `None`.
    pub fn resolve(name: &str, dataset: &Dataset) -> Option<FieldKey> {
        let name = name.trim();
        if let Ok(field) = name.parse::<Field>() {
            return Some(FieldKey::Canonical(field));
        }
        dataset
            .has_extension(name)
            .then(|| FieldKey::Extension(name.to_string()))
    }

    pub fn value<'a>(&self, record: &'a Transaction) -> FieldValue<'a> {
        let value = match self {
            FieldKey::Canonical(field) => record.get(*field),
            FieldKey::Extension(name) => record.extension(name),
        };
        match value {
            FieldValue::Tags(tags) if tags.is_empty() => FieldValue::Null,
            other => other,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct QueryRequest {
    pub page: i64,
    pub page_size: i64,
    pub sort_field: Option<String>,
    pub sort_dir: SortDirection,
    pub search: String,
    pub filters: FilterSpec,
}

impl Default for QueryRequest {
    fn default() -> Self {
        Self {
            page: DEFAULT_PAGE,
            page_size: DEFAULT_PAGE_SIZE,
            sort_field: Some(DEFAULT_SORT_FIELD.to_string()),
            sort_dir: SortDirection::Desc,
            search: String::new(),
            filters: FilterSpec::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryPage {
    pub data: Vec<Transaction>,
    pub page: i64,
    pub page_size: i64,
    pub total: usize,
}

pub fn execute(dataset: &Dataset, request: &QueryRequest) -> QueryPage {
    let plan = FilterPlan::new(&request.search, &request.filters);
    let mut matches = if plan.is_unrestricted() {
        dataset.records().iter().collect::<Vec<_>>()
    } else {
        dataset
            .records()
            .iter()
            .filter(|record| plan.matches(record))
            .collect::<Vec<_>>()
    };

    if let Some(name) = request.sort_field.as_deref()
        && let Some(key) = FieldKey::resolve(name, dataset)
    {
        sort_records(&mut matches, &key, request.sort_dir);
    }

    let total = matches.len();
    let data = page_bounds(request.page, request.page_size, total)
        .map(|(start, end)| matches[start..end].iter().map(|r| (*r).clone()).collect())
        .unwrap_or_default();

    QueryPage {
        data,
        page: request.page,
        page_size: request.page_size,
        total,
    }
}

/// Stable sort; records without a value go last in both directions.
pub fn sort_records(records: &mut [&Transaction], key: &FieldKey, direction: SortDirection) {
    records.sort_by(|a, b| {
        let left = key.value(a);
        let right = key.value(b);
        match (left.is_null(), right.is_null()) {
            (true, true) => Ordering::Equal,
            (true, false) => Ordering::Greater,
            (false, true) => Ordering::Less,
            (false, false) => {
                let ord = compare_values(&left, &right);
                if direction.is_ascending() {
                    ord
                } else {
                    ord.reverse()
                }
            }
        }
    });
}

fn compare_values(left: &FieldValue<'_>, right: &FieldValue<'_>) -> Ordering {
    match (left, right) {
        (FieldValue::Text(a), FieldValue::Text(b)) => a.cmp(b),
        (FieldValue::Timestamp(a), FieldValue::Timestamp(b)) => a.cmp(b),
        (FieldValue::Integer(a), FieldValue::Integer(b)) => a.cmp(b),
        (FieldValue::Decimal(a), FieldValue::Decimal(b)) => a.cmp(b),
        (FieldValue::Tags(a), FieldValue::Tags(b)) => a.cmp(b),
        (FieldValue::Extension(a), FieldValue::Extension(b)) => a.total_cmp(b),
        _ => Ordering::Equal,
    }
}

/// Half-open slice bounds for a one-based page, or `None` when the page is
/// out of range.
fn page_bounds(page: i64, page_size: i64, total: usize) -> Option<(usize, usize)> {
    if page < 1 || page_size < 1 {
        return None;
    }
    let start = usize::try_from(page - 1)
        .ok()?
        .checked_mul(usize::try_from(page_size).ok()?)?;
    if start >= total {
        return None;
    }
    let size = usize::try_from(page_size).ok()?;
    Some((start, start.saturating_add(size).min(total)))
}
