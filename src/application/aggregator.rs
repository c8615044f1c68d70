//! Aggregator
//!
//! Groups normalized showcase items by identity within their collection
//! scope. Graded items are counted and dropped before bucketing.

use std::collections::HashMap;

use tracing::debug;

use crate::application::set_classifier::SetClassifier;
use crate::domain::reconciliation::{AggregatedEntry, EntryIdentity};
use crate::domain::showcase_item::NormalizedItem;
use crate::domain::value_objects::composite_key;

/// Bucket for id-less items whose set, name and number are all unknown
const EMPTY_COMPOSITE: &str = "||";

/// Aggregated entries split by whether an external id is known
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Aggregation {
    pub id_bearing: Vec<AggregatedEntry>,
    pub id_less: Vec<AggregatedEntry>,
    pub skipped_graded: usize,
}

impl Aggregation {
    pub fn entry_count(&self) -> usize {
        self.id_bearing.len() + self.id_less.len()
    }
}

/// Insertion-ordered buckets keyed by (scope, identity)
#[derive(Default)]
struct Buckets {
    entries: Vec<AggregatedEntry>,
    positions: HashMap<(String, EntryIdentity), usize>,
}

impl Buckets {
    fn add(&mut self, scope: String, identity: EntryIdentity, item: &NormalizedItem, is_japanese: bool) {
        let key = (scope, identity);
        let position = match self.positions.get(&key) {
            Some(&position) => position,
            None => {
                let (collection_scope, identity) = key.clone();
                self.entries.push(AggregatedEntry {
                    collection_scope,
                    identity,
                    collection_id: item.collection_id.clone(),
                    collection_name: item.collection_name.clone(),
                    quantity: 0,
                    set_name: None,
                    showcase_name: None,
                    image_url: None,
                    card_number: None,
                    rarity: None,
                    is_japanese: false,
                });
                self.positions.insert(key, self.entries.len() - 1);
                self.entries.len() - 1
            }
        };

        let entry = &mut self.entries[position];
        entry.quantity = entry.quantity.saturating_add(item.quantity);
        entry.is_japanese |= is_japanese;
        for (slot, value) in [
            (&mut entry.set_name, &item.set_name),
            (&mut entry.showcase_name, &item.showcase_name),
            (&mut entry.image_url, &item.image_url),
            (&mut entry.card_number, &item.card_number),
            (&mut entry.rarity, &item.rarity),
            (&mut entry.collection_id, &item.collection_id),
            (&mut entry.collection_name, &item.collection_name),
        ] {
            if slot.is_none() {
                slot.clone_from(value);
            }
        }
    }
}

/// Aggregate normalized items into id-bearing and id-less entries
pub fn aggregate(items: &[NormalizedItem], classifier: &SetClassifier, ungraded_grade_id: &str) -> Aggregation {
    let mut id_bearing = Buckets::default();
    let mut id_less = Buckets::default();
    let mut skipped_graded = 0;

    for item in items {
        let classification = classifier.classify(item.set_name.as_deref());
        if classification.is_japanese {
            debug!(
                product_id = ?item.product_id,
                set = ?item.set_name,
                name = ?item.showcase_name,
                number = ?item.card_number,
                rarity = ?item.rarity,
                grade_company = ?item.grade_company,
                grade_id = ?item.grade_id,
                "Japanese showcase item"
            );
        }

        if item.is_graded(ungraded_grade_id) {
            skipped_graded += 1;
            continue;
        }

        let scope = item.collection_scope();
        match item.product_id {
            Some(id) => id_bearing.add(scope, EntryIdentity::External(id), item, classification.is_japanese),
            None => {
                let key = composite_key(
                    item.set_name.as_deref(),
                    item.showcase_name.as_deref(),
                    item.card_number.as_deref(),
                )
                .unwrap_or_else(|| EMPTY_COMPOSITE.to_string());
                id_less.add(scope, EntryIdentity::Composite(key), item, classification.is_japanese);
            }
        }
    }

    debug!(
        "Aggregated {} id-bearing and {} id-less entries ({} graded skipped)",
        id_bearing.entries.len(),
        id_less.entries.len(),
        skipped_graded
    );

    Aggregation {
        id_bearing: id_bearing.entries,
        id_less: id_less.entries,
        skipped_graded,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::catalog::{CatalogLanguage, CatalogSet};
    use proptest::prelude::*;

    fn classifier() -> SetClassifier {
        SetClassifier::new(
            vec![CatalogSet {
                id: 1,
                name: "Jungle".into(),
                name_other: None,
                code: None,
                language: CatalogLanguage::English,
            }],
            vec![CatalogSet {
                id: 9,
                name: "Clay Burst".into(),
                name_other: None,
                code: None,
                language: CatalogLanguage::Japanese,
            }],
        )
    }

    fn item(id: Option<i64>, quantity: u32) -> NormalizedItem {
        NormalizedItem {
            product_id: id,
            quantity,
            ..NormalizedItem::default()
        }
    }

    #[test]
    fn test_same_id_sums_quantities() {
        let items = vec![item(Some(123), 1), item(Some(123), 2)];
        let aggregation = aggregate(&items, &classifier(), "52");
        assert_eq!(aggregation.id_bearing.len(), 1);
        assert_eq!(aggregation.id_bearing[0].quantity, 3);
        assert_eq!(aggregation.id_bearing[0].collection_scope, "default");
    }

    #[test]
    fn test_collection_scopes_stay_apart() {
        let mut first = item(Some(5), 1);
        first.collection_id = Some("a".into());
        let mut second = item(Some(5), 1);
        second.collection_id = Some("b".into());
        let aggregation = aggregate(&[first, second], &classifier(), "52");
        assert_eq!(aggregation.id_bearing.len(), 2);
    }

    #[test]
    fn test_graded_items_are_counted_not_aggregated() {
        let mut graded = item(Some(7), 1);
        graded.grade_company = Some("PSA".into());
        let mut sentinel = item(Some(8), 1);
        sentinel.grade_id = Some("52".into());
        let mut sealed = item(Some(9), 1);
        sealed.grade_id = Some("10".into());
        sealed.is_card = Some(false);

        let aggregation = aggregate(&[graded, sentinel, sealed], &classifier(), "52");
        assert_eq!(aggregation.skipped_graded, 1);
        let ids: Vec<_> = aggregation.id_bearing.iter().filter_map(AggregatedEntry::external_id).collect();
        assert_eq!(ids, vec![8, 9]);
    }

    #[test]
    fn test_id_less_items_bucket_by_composite_key() {
        let clefable = |number: &str, rarity: Option<&str>| NormalizedItem {
            quantity: 1,
            set_name: Some("Jungle".into()),
            showcase_name: Some("Clefable".into()),
            card_number: Some(number.into()),
            rarity: rarity.map(str::to_string),
            ..NormalizedItem::default()
        };
        let items = vec![clefable("5/64", None), clefable("005/064", Some("Holo")), item(None, 4)];
        let aggregation = aggregate(&items, &classifier(), "52");

        assert_eq!(aggregation.id_less.len(), 2);
        let first = &aggregation.id_less[0];
        assert_eq!(first.identity, EntryIdentity::Composite("jungle|clefable|5/64".into()));
        assert_eq!(first.quantity, 2);
        assert_eq!(first.card_number.as_deref(), Some("5/64"));
        assert_eq!(first.rarity.as_deref(), Some("Holo"));
        assert!(!first.is_japanese);
        assert_eq!(aggregation.id_less[1].identity, EntryIdentity::Composite("||".into()));
    }

    #[test]
    fn test_japanese_flag_is_sticky() {
        let mut english = item(Some(3), 1);
        english.set_name = Some("Jungle".into());
        let mut japanese = item(Some(3), 1);
        japanese.set_name = Some("Clay Burst".into());

        let aggregation = aggregate(&[english, japanese], &classifier(), "52");
        assert!(aggregation.id_bearing[0].is_japanese);
        assert_eq!(aggregation.id_bearing[0].set_name.as_deref(), Some("Jungle"));
    }

    /// Items for a handful of ids whose descriptive fields agree per id
    fn arb_items() -> impl Strategy<Value = Vec<NormalizedItem>> {
        prop::collection::vec((1_i64..5, 1_u32..4, any::<bool>()), 0..12).prop_map(|rows| {
            rows.into_iter()
                .map(|(id, quantity, described)| NormalizedItem {
                    product_id: Some(id),
                    quantity,
                    showcase_name: described.then(|| format!("Card {id}")),
                    rarity: described.then(|| "Rare".to_string()),
                    ..NormalizedItem::default()
                })
                .collect()
        })
    }

    proptest! {
        #[test]
        fn prop_aggregation_ignores_item_order(items in arb_items(), seed in any::<u64>()) {
            let classifier = classifier();
            let mut shuffled = items.clone();
            let len = shuffled.len();
            if len > 1 {
                for i in 0..len {
                    let j = usize::try_from(seed.wrapping_mul(i as u64 + 7) % len as u64).unwrap();
                    shuffled.swap(i, j);
                }
            }

            let sorted = |aggregation: Aggregation| {
                let mut entries = aggregation.id_bearing;
                entries.sort_by_key(|entry| entry.external_id());
                entries
            };
            prop_assert_eq!(
                sorted(aggregate(&items, &classifier, "52")),
                sorted(aggregate(&shuffled, &classifier, "52"))
            );
        }
    }
}
