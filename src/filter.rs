//! Request filters: the JSON payload clients send and the compiled predicate.
//!
//! [`FilterSpec`] mirrors the `filters` query parameter. [`FilterPlan`]
//! compiles it together with the free-text search into a single conjunction
//! evaluated once per record; stages are independent, so the order in which
//! they are checked never changes the result.

use std::collections::HashSet;

use chrono::NaiveDateTime;
use log::debug;
use serde::{Deserialize, Serialize};

use crate::{
    data::parse_timestamp,
    record::{Field, Transaction},
};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterSpec {
    #[serde(default)]
    pub customer_regions: Option<Vec<String>>,
    #[serde(default)]
    pub genders: Option<Vec<String>>,
    #[serde(default)]
    pub product_categories: Option<Vec<String>>,
    #[serde(default)]
    pub payment_methods: Option<Vec<String>>,
    #[serde(default)]
    pub age_range: Option<AgeRange>,
    #[serde(default)]
    pub date_range: Option<DateRange>,
    #[serde(default)]
    pub tags: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgeRange {
    #[serde(default)]
    pub min: Option<f64>,
    #[serde(default)]
    pub max: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DateRange {
    #[serde(default)]
    pub from: Option<String>,
    #[serde(default)]
    pub to: Option<String>,
}

impl FilterSpec {
    /// Decodes the `filters` parameter; anything that is not a valid payload
    /// means "no filters".
    pub fn parse(raw: Option<&str>) -> FilterSpec {
        let Some(raw) = raw.map(str::trim).filter(|raw| !raw.is_empty()) else {
            return FilterSpec::default();
        };
        match serde_json::from_str::<Option<FilterSpec>>(raw) {
            Ok(spec) => spec.unwrap_or_default(),
            Err(err) => {
                debug!("Ignoring malformed filters payload {raw:?}: {err}");
                FilterSpec::default()
            }
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct FilterPlan {
    search: Option<String>,
    categorical: Vec<(Field, HashSet<String>)>,
    age: Option<(f64, f64)>,
    date: Option<(Option<NaiveDateTime>, Option<NaiveDateTime>)>,
    tags: Option<HashSet<String>>,
}

impl FilterPlan {
    pub fn new(search: &str, spec: &FilterSpec) -> Self {
        let search = (!search.is_empty()).then(|| search.to_lowercase());

        let categorical = [
            (Field::CustomerRegion, &spec.customer_regions),
            (Field::Gender, &spec.genders),
            (Field::ProductCategory, &spec.product_categories),
            (Field::PaymentMethod, &spec.payment_methods),
        ]
        .into_iter()
        .filter_map(|(field, values)| accepted_set(values).map(|set| (field, set)))
        .collect();

        let age = spec
            .age_range
            .as_ref()
            .filter(|range| range.min.is_some() || range.max.is_some())
            .map(|range| {
                (
                    range.min.unwrap_or(f64::NEG_INFINITY),
                    range.max.unwrap_or(f64::INFINITY),
                )
            });

        let date = spec.date_range.as_ref().and_then(|range| {
            let from = range.from.as_deref().and_then(parse_timestamp);
            let to = range.to.as_deref().and_then(parse_timestamp);
            (from.is_some() || to.is_some()).then_some((from, to))
        });

        FilterPlan {
            search,
            categorical,
            age,
            date,
            tags: accepted_set(&spec.tags),
        }
    }

    pub fn is_unrestricted(&self) -> bool {
        self.search.is_none()
            && self.categorical.is_empty()
            && self.age.is_none()
            && self.date.is_none()
            && self.tags.is_none()
    }

    pub fn matches(&self, record: &Transaction) -> bool {
        self.matches_search(record)
            && self.matches_categorical(record)
            && self.matches_age(record)
            && self.matches_date(record)
            && self.matches_tags(record)
    }

    fn matches_search(&self, record: &Transaction) -> bool {
        let Some(needle) = &self.search else {
            return true;
        };
        [Field::CustomerName, Field::PhoneNumber]
            .into_iter()
            .filter_map(|field| record.text(field))
            .any(|value| value.to_lowercase().contains(needle.as_str()))
    }

    fn matches_categorical(&self, record: &Transaction) -> bool {
        self.categorical.iter().all(|(field, accepted)| {
            record
                .text(*field)
                .is_some_and(|value| accepted.contains(value))
        })
    }

    fn matches_age(&self, record: &Transaction) -> bool {
        let Some((min, max)) = self.age else {
            return true;
        };
        record.age.is_some_and(|age| {
            let age = age as f64;
            age >= min && age <= max
        })
    }

    fn matches_date(&self, record: &Transaction) -> bool {
        let Some((from, to)) = &self.date else {
            return true;
        };
        let Some(date) = record.date.as_ref() else {
            return false;
        };
        from.as_ref().is_none_or(|from| date >= from) && to.as_ref().is_none_or(|to| date <= to)
    }

    fn matches_tags(&self, record: &Transaction) -> bool {
        let Some(targets) = &self.tags else {
            return true;
        };
        record.tags.iter().any(|tag| targets.contains(tag))
    }
}

fn accepted_set(values: &Option<Vec<String>>) -> Option<HashSet<String>> {
    values
        .as_ref()
        .filter(|values| !values.is_empty())
        .map(|values| values.iter().cloned().collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn dated(y: i32, m: u32, d: u32) -> Option<NaiveDateTime> {
        NaiveDate::from_ymd_opt(y, m, d).and_then(|date| date.and_hms_opt(0, 0, 0))
    }

    fn customer(name: &str, phone: &str) -> Transaction {
        Transaction {
            customer_name: Some(name.into()),
            phone_number: Some(phone.into()),
            ..Transaction::default()
        }
    }

    #[test]
    fn parse_accepts_full_payload() {
        let spec = FilterSpec::parse(Some(
            r#"{"customerRegions":["North"],"ageRange":{"min":18},"dateRange":{"from":"2023-01-01"},"tags":["sale"]}"#,
        ));
        assert_eq!(spec.customer_regions, Some(vec!["North".to_string()]));
        assert_eq!(spec.age_range.as_ref().and_then(|r| r.min), Some(18.0));
        assert_eq!(spec.age_range.as_ref().and_then(|r| r.max), None);
        assert_eq!(spec.tags, Some(vec!["sale".to_string()]));
    }

    #[test]
    fn malformed_or_empty_payload_means_no_filters() {
        for raw in [None, Some(""), Some("{not json"), Some("null"), Some("[1,2]")] {
            assert_eq!(FilterSpec::parse(raw), FilterSpec::default(), "{raw:?}");
        }
        assert!(FilterPlan::new("", &FilterSpec::parse(Some("{not json"))).is_unrestricted());
    }

    #[test]
    fn explicit_nulls_are_accepted() {
        let spec = FilterSpec::parse(Some(r#"{"genders":null,"ageRange":{"min":null,"max":40}}"#));
        assert_eq!(spec.genders, None);
        let plan = FilterPlan::new("", &spec);
        let mut record = Transaction::default();
        record.age = Some(40);
        assert!(plan.matches(&record));
        record.age = Some(41);
        assert!(!plan.matches(&record));
    }

    #[test]
    fn search_matches_name_or_phone_case_insensitively() {
        let plan = FilterPlan::new("ASHA", &FilterSpec::default());
        assert!(plan.matches(&customer("Asha Rao", "555")));
        assert!(!plan.matches(&customer("Ravi", "555")));

        let by_phone = FilterPlan::new("98765", &FilterSpec::default());
        assert!(by_phone.matches(&customer("Ravi", "+91 9876543210")));
        assert!(!by_phone.matches(&Transaction::default()));
    }

    #[test]
    fn categorical_filter_rejects_nulls_and_non_members() {
        let spec = FilterSpec {
            genders: Some(vec!["Female".into()]),
            ..FilterSpec::default()
        };
        let plan = FilterPlan::new("", &spec);
        let mut record = Transaction::default();
        assert!(!plan.matches(&record));
        record.gender = Some("Male".into());
        assert!(!plan.matches(&record));
        record.gender = Some("Female".into());
        assert!(plan.matches(&record));
    }

    #[test]
    fn empty_filter_sets_do_not_restrict() {
        let spec = FilterSpec {
            genders: Some(Vec::new()),
            tags: Some(Vec::new()),
            ..FilterSpec::default()
        };
        assert!(FilterPlan::new("", &spec).is_unrestricted());
    }

    #[test]
    fn age_range_excludes_missing_ages() {
        let spec = FilterSpec {
            age_range: Some(AgeRange {
                min: Some(20.0),
                max: Some(30.0),
            }),
            ..FilterSpec::default()
        };
        let plan = FilterPlan::new("", &spec);
        let mut record = Transaction::default();
        assert!(!plan.matches(&record));
        for (age, expected) in [(19, false), (20, true), (30, true), (31, false)] {
            record.age = Some(age);
            assert_eq!(plan.matches(&record), expected, "age {age}");
        }
    }

    #[test]
    fn date_range_is_closed_and_ignores_unparsable_bounds() {
        let spec = FilterSpec {
            date_range: Some(DateRange {
                from: Some("2023-01-01T00:00:00.000Z".into()),
                to: Some("2023-02-01".into()),
            }),
            ..FilterSpec::default()
        };
        let plan = FilterPlan::new("", &spec);
        let mut record = Transaction::default();
        assert!(!plan.matches(&record));
        record.date = dated(2023, 1, 1);
        assert!(plan.matches(&record));
        record.date = dated(2023, 2, 1);
        assert!(plan.matches(&record));
        record.date = dated(2023, 2, 2);
        assert!(!plan.matches(&record));

        let garbage = FilterSpec {
            date_range: Some(DateRange {
                from: Some("yesterday".into()),
                to: None,
            }),
            ..FilterSpec::default()
        };
        assert!(FilterPlan::new("", &garbage).is_unrestricted());
    }

    #[test]
    fn stages_applied_in_any_order_agree_with_the_combined_plan() {
        let records = (0..12)
            .map(|i| Transaction {
                customer_region: Some(["North", "South", "East"][i % 3].into()),
                age: (i % 4 != 0).then_some(18 + i as i64 * 3),
                tags: if i % 2 == 0 { vec!["sale".into()] } else { Vec::new() },
                ..Transaction::default()
            })
            .collect::<Vec<_>>();
        let stages = [
            FilterSpec {
                customer_regions: Some(vec!["North".into(), "East".into()]),
                ..FilterSpec::default()
            },
            FilterSpec {
                age_range: Some(AgeRange {
                    min: Some(20.0),
                    max: Some(45.0),
                }),
                ..FilterSpec::default()
            },
            FilterSpec {
                tags: Some(vec!["sale".into()]),
                ..FilterSpec::default()
            },
        ];
        let combined = FilterPlan::new(
            "",
            &FilterSpec {
                customer_regions: stages[0].customer_regions.clone(),
                age_range: stages[1].age_range.clone(),
                tags: stages[2].tags.clone(),
                ..FilterSpec::default()
            },
        );
        let expected = records
            .iter()
            .filter(|r| combined.matches(r))
            .collect::<Vec<_>>();

        for order in [[0, 1, 2], [2, 1, 0], [1, 2, 0]] {
            let mut remaining = records.iter().collect::<Vec<_>>();
            for idx in order {
                let plan = FilterPlan::new("", &stages[idx]);
                remaining.retain(|r| plan.matches(r));
            }
            assert_eq!(remaining, expected, "{order:?}");
        }
    }

    #[test]
    fn tag_filter_requires_non_empty_intersection() {
        let record = Transaction {
            tags: vec!["a".into(), "b".into()],
            ..Transaction::default()
        };
        let plan = |tags: &[&str]| {
            FilterPlan::new(
                "",
                &FilterSpec {
                    tags: Some(tags.iter().map(|t| t.to_string()).collect()),
                    ..FilterSpec::default()
                },
            )
        };
        assert!(plan(&["b", "c"]).matches(&record));
        assert!(!plan(&["c", "d"]).matches(&record));
        assert!(!plan(&["a"]).matches(&Transaction::default()));
    }
}
