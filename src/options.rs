//! Distinct-value catalog used to populate client-side filter controls.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::{
    normalize::parse_list_literal,
    record::{Dataset, Field},
};

/// Records scanned for the tag universe. Tag coverage past this prefix is
/// best-effort.
pub const TAG_SAMPLE_LIMIT: usize = 100_000;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterOptions {
    pub regions: Vec<String>,
    pub product_categories: Vec<String>,
    pub payment_methods: Vec<String>,
    pub tags: Vec<String>,
}

pub fn aggregate(dataset: &Dataset) -> FilterOptions {
    aggregate_with_limit(dataset, TAG_SAMPLE_LIMIT)
}

pub fn aggregate_with_limit(dataset: &Dataset, tag_sample_limit: usize) -> FilterOptions {
    FilterOptions {
        regions: distinct(dataset, Field::CustomerRegion),
        product_categories: distinct(dataset, Field::ProductCategory),
        payment_methods: distinct(dataset, Field::PaymentMethod),
        tags: tag_universe(dataset, tag_sample_limit),
    }
}

fn distinct(dataset: &Dataset, field: Field) -> Vec<String> {
    dataset
        .records()
        .iter()
        .filter_map(|record| record.text(field))
        .collect::<BTreeSet<_>>()
        .into_iter()
        .map(str::to_string)
        .collect()
}

fn tag_universe(dataset: &Dataset, limit: usize) -> Vec<String> {
    let mut tags = BTreeSet::new();
    for record in dataset.records().iter().take(limit) {
        for tag in &record.tags {
            if tag.starts_with('[') && tag.ends_with(']') {
                // List text that slipped through as a single token.
                if let Some(items) = parse_list_literal(tag) {
                    tags.extend(
                        items
                            .into_iter()
                            .map(|item| item.trim().to_string())
                            .filter(|item| !item.is_empty()),
                    );
                }
            } else {
                tags.insert(tag.clone());
            }
        }
    }
    tags.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Transaction;

    fn record(region: Option<&str>, category: Option<&str>, tags: &[&str]) -> Transaction {
        Transaction {
            customer_region: region.map(str::to_string),
            product_category: category.map(str::to_string),
            payment_method: Some("UPI".into()),
            tags: tags.iter().map(|t| t.to_string()).collect(),
            ..Transaction::default()
        }
    }

    #[test]
    fn categorical_values_are_distinct_sorted_and_non_null() {
        let dataset = Dataset::new(
            vec![
                record(Some("West"), Some("Books"), &[]),
                record(None, Some("Audio"), &[]),
                record(Some("East"), Some("Books"), &[]),
            ],
            Vec::new(),
        );
        let options = aggregate(&dataset);
        assert_eq!(options.regions, vec!["East", "West"]);
        assert_eq!(options.product_categories, vec!["Audio", "Books"]);
        assert_eq!(options.payment_methods, vec!["UPI"]);
    }

    #[test]
    fn tags_only_cover_the_sampled_prefix() {
        let dataset = Dataset::new(
            vec![
                record(None, None, &["sale", "new"]),
                record(None, None, &["gift"]),
                record(None, None, &["clearance"]),
            ],
            Vec::new(),
        );
        let options = aggregate_with_limit(&dataset, 2);
        assert_eq!(options.tags, vec!["gift", "new", "sale"]);
    }

    #[test]
    fn bracketed_list_text_is_expanded_or_skipped() {
        let dataset = Dataset::new(
            vec![
                record(None, None, &["['vip', 'sale']"]),
                record(None, None, &["[broken"]),
                record(None, None, &["[not, quoted]"]),
            ],
            Vec::new(),
        );
        let options = aggregate(&dataset);
        assert_eq!(options.tags, vec!["[broken", "sale", "vip"]);
    }

    #[test]
    fn serializes_with_client_keys() {
        let json = serde_json::to_value(FilterOptions::default()).unwrap();
        let mut keys = json.as_object().unwrap().keys().cloned().collect::<Vec<_>>();
        keys.sort();
        assert_eq!(
            keys,
            vec!["paymentMethods", "productCategories", "regions", "tags"]
        );
    }
}
