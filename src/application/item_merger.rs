//! Item merger
//!
//! Folds items recovered by one extraction strategy into the list produced
//! by another. A secondary item is matched to an existing item by external
//! id, then by tight key, then by loose key, always within its collection
//! scope. Matches only fill empty fields; unmatched items are appended.

use std::collections::HashMap;

use serde_json::Value;

use crate::application::item_normalizer::{aliases, first_text, product_id_of, raw_collection_scope};
use crate::domain::showcase_item::{NormalizedItem, RawItem};
use crate::domain::value_objects::{loose_key, tight_key};

/// Identity keys of one item, all relative to `scope`
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MergeKeys {
    pub scope: String,
    pub external_id: Option<i64>,
    pub tight: Option<String>,
    pub loose: Option<String>,
}

impl MergeKeys {
    fn from_parts(
        scope: String,
        external_id: Option<i64>,
        set_name: Option<&str>,
        card_name: Option<&str>,
        card_number: Option<&str>,
    ) -> Self {
        Self {
            scope,
            external_id,
            tight: tight_key(set_name, card_name, card_number),
            loose: loose_key(set_name, card_name, card_number),
        }
    }

    fn is_unidentified(&self) -> bool {
        self.external_id.is_none() && self.loose.is_none()
    }
}

/// Items the merger can deduplicate
pub trait Mergeable {
    fn merge_keys(&self) -> MergeKeys;

    /// Copy every populated field of `other` into fields of `self` that are
    /// still empty. Populated fields are never overwritten. Returns whether
    /// anything was copied.
    fn fill_gaps_from(&mut self, other: &Self) -> bool;
}

impl Mergeable for RawItem {
    fn merge_keys(&self) -> MergeKeys {
        let Some(fields) = self.as_object() else {
            return MergeKeys {
                scope: "default".to_string(),
                ..MergeKeys::default()
            };
        };
        MergeKeys::from_parts(
            raw_collection_scope(fields),
            product_id_of(fields),
            first_text(fields, aliases::SET_NAME).as_deref(),
            first_text(fields, aliases::NAME).as_deref(),
            first_text(fields, aliases::CARD_NUMBER).as_deref(),
        )
    }

    fn fill_gaps_from(&mut self, other: &Self) -> bool {
        let (Some(target), Some(source)) = (self.as_object_mut(), other.as_object()) else {
            return false;
        };
        let mut changed = false;
        for (key, value) in source {
            if is_blank(value) {
                continue;
            }
            if target.get(key).is_none_or(is_blank) {
                target.insert(key.clone(), value.clone());
                changed = true;
            }
        }
        changed
    }
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(text) => text.is_empty(),
        _ => false,
    }
}

impl Mergeable for NormalizedItem {
    fn merge_keys(&self) -> MergeKeys {
        MergeKeys::from_parts(
            self.collection_scope(),
            self.product_id,
            self.set_name.as_deref(),
            self.showcase_name.as_deref(),
            self.card_number.as_deref(),
        )
    }

    fn fill_gaps_from(&mut self, other: &Self) -> bool {
        fn fill<T: Clone>(target: &mut Option<T>, source: &Option<T>) -> bool {
            if target.is_none() && source.is_some() {
                target.clone_from(source);
                return true;
            }
            false
        }
        let filled = [
            fill(&mut self.product_id, &other.product_id),
            fill(&mut self.showcase_name, &other.showcase_name),
            fill(&mut self.image_url, &other.image_url),
            fill(&mut self.set_name, &other.set_name),
            fill(&mut self.collection_id, &other.collection_id),
            fill(&mut self.collection_name, &other.collection_name),
            fill(&mut self.grade_company, &other.grade_company),
            fill(&mut self.grade_id, &other.grade_id),
            fill(&mut self.card_condition, &other.card_condition),
            fill(&mut self.is_card, &other.is_card),
            fill(&mut self.card_number, &other.card_number),
            fill(&mut self.rarity, &other.rarity),
        ];
        filled.contains(&true)
    }
}

#[derive(Default)]
struct KeyIndex {
    by_id: HashMap<(String, i64), usize>,
    by_tight: HashMap<(String, String), usize>,
    by_loose: HashMap<(String, String), usize>,
}

impl KeyIndex {
    fn build<T: Mergeable>(items: &[T]) -> Self {
        let mut index = Self::default();
        for (position, item) in items.iter().enumerate() {
            index.insert(&item.merge_keys(), position);
        }
        index
    }

    /// Register keys for `position`; earlier registrations win
    fn insert(&mut self, keys: &MergeKeys, position: usize) {
        if let Some(id) = keys.external_id {
            self.by_id.entry((keys.scope.clone(), id)).or_insert(position);
        }
        if let Some(tight) = &keys.tight {
            self.by_tight.entry((keys.scope.clone(), tight.clone())).or_insert(position);
        }
        if let Some(loose) = &keys.loose {
            self.by_loose.entry((keys.scope.clone(), loose.clone())).or_insert(position);
        }
    }

    fn find(&self, keys: &MergeKeys) -> Option<usize> {
        let scope = &keys.scope;
        keys.external_id
            .and_then(|id| self.by_id.get(&(scope.clone(), id)))
            .or_else(|| keys.tight.as_ref().and_then(|k| self.by_tight.get(&(scope.clone(), k.clone()))))
            .or_else(|| keys.loose.as_ref().and_then(|k| self.by_loose.get(&(scope.clone(), k.clone()))))
            .copied()
    }
}

/// One sweep over `secondary`; returns whether `primary` changed
fn merge_pass<T: Mergeable + Clone + PartialEq>(primary: &mut Vec<T>, secondary: &[T]) -> bool {
    let mut index = KeyIndex::build(primary);
    let mut changed = false;

    for item in secondary {
        let keys = item.merge_keys();
        // Nothing to key on: only an identical copy counts as the same item
        let found = if keys.is_unidentified() {
            primary.iter().position(|existing| existing == item)
        } else {
            index.find(&keys)
        };
        match found {
            Some(position) => {
                if primary[position].fill_gaps_from(item) {
                    changed = true;
                    let refreshed = primary[position].merge_keys();
                    index.insert(&refreshed, position);
                }
            }
            None => {
                index.insert(&keys, primary.len());
                primary.push(item.clone());
                changed = true;
            }
        }
    }
    changed
}

/// Merge `secondary` into `primary` in place.
///
/// Secondary items with neither an external id nor any key component are
/// appended unless an identical item is already present. Sweeps repeat
/// until one changes nothing, so merging the same secondary list again is a
/// no-op.
pub fn merge_items<T: Mergeable + Clone + PartialEq>(primary: &mut Vec<T>, secondary: &[T]) {
    if secondary.is_empty() {
        return;
    }
    // Only gap fills can follow the first sweep, and each fills a field for good
    while merge_pass(primary, secondary) {}
}

/// Deduplicate a list by merging it into an empty one
pub fn dedupe_items<T: Mergeable + Clone + PartialEq>(items: &[T]) -> Vec<T> {
    let mut deduped = Vec::with_capacity(items.len());
    merge_items(&mut deduped, items);
    deduped
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    #[test]
    fn test_raw_merge_by_id_fills_gaps_only() {
        let mut primary = vec![json!({"product_id": 1, "product_name": "Clefable", "card_number": ""})];
        let secondary = vec![json!({"product_id": "1", "product_name": "Other", "card_number": "5/64", "rarity": null})];
        merge_items(&mut primary, &secondary);

        assert_eq!(primary.len(), 1);
        assert_eq!(primary[0]["product_name"], "Clefable");
        assert_eq!(primary[0]["card_number"], "5/64");
        assert!(primary[0].get("rarity").is_none());
    }

    #[test]
    fn test_raw_merge_by_tight_key() {
        let mut primary = vec![json!({"catalog_group": "Jungle", "product_name": "Clefable (JP)", "card_number": "05/64"})];
        let secondary = vec![json!({"setName": "JUNGLE", "name": "clefable", "number": "5/64", "image_url": "x/product_9.png"})];
        merge_items(&mut primary, &secondary);
        assert_eq!(primary.len(), 1);
        assert_eq!(primary[0]["image_url"], "x/product_9.png");
    }

    #[test]
    fn test_raw_merge_by_loose_key() {
        let mut primary = vec![json!({"catalog_group": "Jungle", "product_name": "Clefable"})];
        let secondary = vec![json!({"catalog_group": "Jungle", "product_name": "Clefable", "rarity": "Holo"})];
        merge_items(&mut primary, &secondary);
        assert_eq!(primary.len(), 1);
        assert_eq!(primary[0]["rarity"], "Holo");
    }

    #[test]
    fn test_collection_scopes_never_merge() {
        let mut primary = vec![json!({"product_id": 1, "collection_id": "a"})];
        let secondary = vec![json!({"product_id": 1, "collection_id": "b"})];
        merge_items(&mut primary, &secondary);
        assert_eq!(primary.len(), 2);
    }

    #[test]
    fn test_unidentified_items_are_appended_once() {
        let mut primary = vec![json!({"quantity": 1})];
        let secondary = vec![json!({"quantity": 2, "image_url": "x.png"}), json!("junk"), json!({"quantity": 1})];
        merge_items(&mut primary, &secondary);
        assert_eq!(primary.len(), 3);
        assert_eq!(primary[1]["image_url"], "x.png");

        merge_items(&mut primary, &secondary);
        assert_eq!(primary.len(), 3);

        let mut empty = Vec::new();
        merge_items(&mut empty, &[json!({"quantity": 2, "image_url": "x.png"})]);
        assert_eq!(empty.len(), 1);
    }

    #[test]
    fn test_items_sharing_only_a_set_stay_apart() {
        let mut primary = vec![json!({
            "product_id": 1,
            "catalog_group": "Jungle",
            "product_name": "Pikachu",
            "card_number": "60/64"
        })];
        let secondary = vec![json!({"product_id": 2, "catalog_group": "Jungle", "quantity": "3"})];
        merge_items(&mut primary, &secondary);

        assert_eq!(primary.len(), 2);
        assert!(primary[0].get("quantity").is_none());
        assert_eq!(primary[1]["product_id"], 2);
        assert_eq!(primary[1]["quantity"], "3");
    }

    #[test]
    fn test_loose_keys_match_exactly() {
        let mut primary = vec![
            json!({"product_id": 9, "catalog_group": "Jungle"}),
            json!({"catalog_group": "Jungle", "product_name": "Clefable"}),
        ];
        let secondary = vec![
            json!({"catalog_group": "Jungle", "product_name": "Clefable", "image_url": "x"}),
            json!({"catalog_group": "Jungle", "product_name": "Eevee", "quantity": 4}),
            json!({"product_id": 9, "product_name": "Electrode"}),
        ];
        merge_items(&mut primary, &secondary);
        let snapshot = primary.clone();
        merge_items(&mut primary, &secondary);

        assert_eq!(primary, snapshot);
        assert_eq!(primary.len(), 3);
        assert_eq!(primary[0]["product_name"], "Electrode");
        assert!(primary[0].get("image_url").is_none());
        assert_eq!(primary[1]["image_url"], "x");
        assert_eq!(primary[2]["quantity"], 4);
    }

    #[test]
    fn test_dedupe_keeps_distinct_cards_of_one_set() {
        let items = vec![
            json!({"catalog_group": "Jungle", "product_name": "Clefable", "card_number": "5/64"}),
            json!({"catalog_group": "Jungle", "product_name": "Electrode", "card_number": "2/64"}),
            json!({"catalog_group": "Jungle"}),
        ];
        assert_eq!(dedupe_items(&items).len(), 3);
    }

    #[test]
    fn test_dedupe_collapses_duplicates() {
        let items = vec![
            json!({"product_id": 5, "quantity": 1}),
            json!({"product_id": 5, "card_number": "7"}),
            json!({"product_id": 6}),
        ];
        let deduped = dedupe_items(&items);
        assert_eq!(deduped.len(), 2);
        assert_eq!(deduped[0]["card_number"], "7");
    }

    #[test]
    fn test_normalized_merge_fills_missing_number() {
        let mut primary = vec![NormalizedItem {
            product_id: Some(3),
            quantity: 2,
            set_name: Some("Fossil".into()),
            ..NormalizedItem::default()
        }];
        let secondary = vec![NormalizedItem {
            product_id: Some(3),
            quantity: 9,
            card_number: Some("15/62".into()),
            set_name: Some("Other".into()),
            ..NormalizedItem::default()
        }];
        merge_items(&mut primary, &secondary);
        assert_eq!(primary.len(), 1);
        assert_eq!(primary[0].quantity, 2);
        assert_eq!(primary[0].set_name.as_deref(), Some("Fossil"));
        assert_eq!(primary[0].card_number.as_deref(), Some("15/62"));
    }

    fn arb_item() -> impl Strategy<Value = NormalizedItem> {
        (
            prop::option::of(1_i64..4),
            prop::option::of(prop::sample::select(vec!["Jungle", "Fossil"])),
            prop::option::of(prop::sample::select(vec!["Clefable", "Eevee (JP)"])),
            prop::option::of(prop::sample::select(vec!["5/64", "005/064", "51"])),
            prop::option::of(prop::sample::select(vec!["a", "b"])),
            prop::option::of(prop::sample::select(vec!["Rare", "Common"])),
        )
            .prop_map(|(id, set, name, number, collection, rarity)| NormalizedItem {
                product_id: id,
                quantity: 1,
                set_name: set.map(str::to_string),
                showcase_name: name.map(str::to_string),
                card_number: number.map(str::to_string),
                collection_id: collection.map(str::to_string),
                rarity: rarity.map(str::to_string),
                ..NormalizedItem::default()
            })
    }

    proptest! {
        #[test]
        fn prop_merge_is_idempotent(
            primary in prop::collection::vec(arb_item(), 0..6),
            secondary in prop::collection::vec(arb_item(), 0..6),
        ) {
            let mut once = primary.clone();
            merge_items(&mut once, &secondary);
            let mut twice = once.clone();
            merge_items(&mut twice, &secondary);
            prop_assert_eq!(once, twice);
        }
    }
}
