//! Card-number backfill
//!
//! Fills card numbers still missing after matching from items recovered by
//! a static HTML pass, keyed by normalized set and card name.

use std::collections::HashMap;

use crate::application::item_normalizer::{aliases, first_text};
use crate::domain::reconciliation::MatchResult;
use crate::domain::showcase_item::RawItem;
use crate::domain::value_objects::name_set_key;

/// `set|name` → first card number seen for it
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CardNumberLookup {
    numbers: HashMap<String, String>,
}

impl CardNumberLookup {
    pub fn from_items(items: &[RawItem]) -> Self {
        let mut numbers = HashMap::new();
        for fields in items.iter().filter_map(RawItem::as_object) {
            let key = name_set_key(
                first_text(fields, aliases::SET_NAME).as_deref(),
                first_text(fields, aliases::NAME).as_deref(),
            );
            let number = first_text(fields, aliases::CARD_NUMBER).filter(|n| !n.trim().is_empty());
            if let (Some(key), Some(number)) = (key, number) {
                numbers.entry(key).or_insert(number);
            }
        }
        Self { numbers }
    }

    pub fn is_empty(&self) -> bool {
        self.numbers.is_empty()
    }

    pub fn get(&self, set_name: Option<&str>, card_name: Option<&str>) -> Option<&str> {
        self.numbers.get(&name_set_key(set_name, card_name)?).map(String::as_str)
    }

    /// Fill missing card numbers in place; returns how many were filled
    pub fn fill(&self, results: &mut [MatchResult]) -> usize {
        if self.is_empty() {
            return 0;
        }
        let mut filled = 0;
        for result in results.iter_mut().filter(|r| r.card_number.is_none()) {
            let set_name = result.showcase_set.as_deref().or(result.set.as_deref());
            let card_name = result.showcase_name.as_deref().or(result.name.as_deref());
            if let Some(number) = self.get(set_name, card_name) {
                result.card_number = Some(number.to_string());
                filled += 1;
            }
        }
        filled
    }
}

pub fn needs_backfill(results: &[MatchResult]) -> bool {
    results.iter().any(|result| result.card_number.is_none())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn result(set: Option<&str>, name: Option<&str>, number: Option<&str>) -> MatchResult {
        MatchResult {
            tcg_product_id: None,
            quantity: 1,
            collection_id: None,
            collection_name: None,
            showcase_set: set.map(str::to_string),
            showcase_name: name.map(str::to_string),
            showcase_image_url: None,
            matched: false,
            name: None,
            set: None,
            code: None,
            product_type: None,
            card_number: number.map(str::to_string),
            rarity: None,
            image_url: None,
            market_price: None,
            japanese_checks: None,
        }
    }

    #[test]
    fn test_lookup_keeps_first_number() {
        let lookup = CardNumberLookup::from_items(&[
            json!({"catalog_group": "Jungle", "product_name": "Clefable", "card_number": "17/64"}),
            json!({"catalog_group": "Jungle", "product_name": "Clefable (JP)", "card_number": "1/64"}),
            json!({"catalog_group": "Jungle", "product_name": "Eevee", "card_number": ""}),
            json!({"product_name": "No Set", "card_number": "3"}),
        ]);
        assert_eq!(lookup.get(Some("JUNGLE"), Some("clefable")), Some("17/64"));
        assert_eq!(lookup.get(Some("Jungle"), Some("Eevee")), None);
        assert_eq!(lookup.get(None, Some("No Set")), None);
    }

    #[test]
    fn test_fill_only_touches_missing_numbers() {
        let lookup = CardNumberLookup::from_items(&[json!({
            "catalog_group": "Jungle", "product_name": "Clefable", "card_number": "17/64"
        })]);
        let mut results = vec![
            result(Some("Jungle"), Some("Clefable"), None),
            result(Some("Jungle"), Some("Clefable"), Some("99")),
            result(None, Some("Clefable"), None),
        ];
        results[2].set = Some("Jungle".into());

        assert!(needs_backfill(&results));
        assert_eq!(lookup.fill(&mut results), 2);
        assert_eq!(results[0].card_number.as_deref(), Some("17/64"));
        assert_eq!(results[1].card_number.as_deref(), Some("99"));
        assert_eq!(results[2].card_number.as_deref(), Some("17/64"));
        assert!(!needs_backfill(&results));
    }
}
