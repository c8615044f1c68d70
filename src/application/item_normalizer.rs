//! Item normalizer
//!
//! Maps one raw showcase item to a [`NormalizedItem`]. Each canonical field
//! is read through an ordered alias table; a few fields fall back to a
//! bounded breadth-first search of nested objects when no alias matches.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};
use tracing::debug;

use crate::domain::constants::extraction::DEEP_SEARCH_DEPTH;
use crate::domain::showcase_item::{NormalizedItem, RawItem};
use crate::domain::value_objects::{collection_scope_key, looks_like_card_number, strip_jp_tag};
use crate::infrastructure::config::ImporterConfig;

/// Ordered alias tables, one per canonical field
pub mod aliases {
    pub const COLLECTION_ID: &[&str] = &[
        "collection_id",
        "collectionId",
        "collectr_collection_id",
        "collectrCollectionId",
        "__collection_id",
    ];
    pub const COLLECTION_NAME: &[&str] = &[
        "collection_name",
        "collectionName",
        "collectr_collection_name",
        "collectrCollectionName",
        "__collection_name",
    ];
    pub const PRODUCT_ID: &[&str] = &["product_id", "productId", "tcg_product_id", "tcgProductId"];
    pub const IMAGE_URL: &[&str] = &["image_url", "imageUrl"];
    pub const QUANTITY: &[&str] = &["quantity", "qty", "count", "total", "total_quantity"];
    pub const GRADE_ID: &[&str] = &["grade_id", "gradeId", "grade", "grade_value", "gradeValue"];
    pub const GRADE_COMPANY: &[&str] = &["grade_company", "gradeCompany"];
    pub const CARD_CONDITION: &[&str] = &["card_condition", "cardCondition"];
    pub const IS_CARD: &[&str] = &["is_card", "isCard"];
    pub const NAME: &[&str] = &["product_name", "productName", "name", "title"];
    pub const SET_NAME: &[&str] = &["catalog_group", "catalogGroup", "set_name", "setName", "group"];
    pub const CARD_NUMBER: &[&str] = &[
        "card_number",
        "cardNumber",
        "collector_number",
        "collectorNumber",
        "number",
        "card_no",
        "cardNo",
        "num",
    ];
    pub const RARITY: &[&str] = &["rarity", "card_rarity", "cardRarity", "rarity_name", "rarityName"];
}

fn patterns(sources: &[&str]) -> Vec<Regex> {
    sources
        .iter()
        .map(|source| Regex::new(source).expect("valid deep search pattern"))
        .collect()
}

static NAME_KEYS: Lazy<Vec<Regex>> =
    Lazy::new(|| patterns(&[r"(?i)product_name", r"(?i)card_name", r"(?i)^name$", r"(?i)title"]));
static SET_KEYS: Lazy<Vec<Regex>> = Lazy::new(|| {
    patterns(&[r"(?i)set_name", r"(?i)setName", r"(?i)catalog_group", r"(?i)group_name", r"(?i)^set$"])
});
static NUMBER_KEYS: Lazy<Vec<Regex>> = Lazy::new(|| {
    patterns(&[r"(?i)card_number", r"(?i)collector_number", r"(?i)cardNo", r"(?i)card_no", r"(?i)number"])
});
static RARITY_KEYS: Lazy<Vec<Regex>> = Lazy::new(|| patterns(&[r"(?i)rarity"]));

static IMAGE_PRODUCT_ID: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"product_(\d+)").expect("valid image id regex"));
static LEADING_INTEGER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*([+-]?\d+)").expect("valid integer regex"));

/// Card number patterns tried against the display name, in order
static NAME_NUMBER_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    patterns(&[
        r"(?i)#?\s*([A-Z0-9]{1,6}-\d{1,4}(?:/\d{1,4})?)",
        r"(?i)#?\s*([A-Z]{1,3}\d{1,4}(?:/\d{1,4})?)",
        r"#?\s*(\d{1,4}(?:/\d{1,4})?)",
    ])
});

/// Non-empty text of a scalar JSON value
pub fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => {
            let trimmed = text.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    }
}

/// First alias whose value is a non-empty scalar
pub fn first_text(fields: &Map<String, Value>, names: &[&str]) -> Option<String> {
    names.iter().find_map(|name| fields.get(*name).and_then(scalar_text))
}

/// Breadth-first search for a scalar under a key matching one of `key_patterns`.
///
/// Shallower hits win; within one object, earlier patterns win. Arrays do
/// not count as a level of their own.
pub fn find_first_value(
    root: &Value,
    key_patterns: &[Regex],
    accept: Option<fn(&str) -> bool>,
    max_depth: usize,
) -> Option<String> {
    let mut queue = VecDeque::from([(root, 0_usize)]);
    while let Some((value, depth)) = queue.pop_front() {
        match value {
            Value::Array(entries) => {
                queue.extend(entries.iter().map(|entry| (entry, depth)));
            }
            Value::Object(fields) => {
                let hit = key_patterns.iter().find_map(|pattern| {
                    fields
                        .iter()
                        .filter(|(key, _)| pattern.is_match(key))
                        .filter_map(|(_, candidate)| scalar_text(candidate))
                        .find(|text| accept.is_none_or(|check| check(text)))
                });
                if hit.is_some() {
                    return hit;
                }
                if depth < max_depth {
                    queue.extend(
                        fields
                            .values()
                            .filter(|child| child.is_object() || child.is_array())
                            .map(|child| (child, depth + 1)),
                    );
                }
            }
            _ => {}
        }
    }
    None
}

/// Positive integral product id from a scalar value
fn parse_product_id(value: &Value) -> Option<i64> {
    let id = match value {
        Value::Number(number) => number
            .as_i64()
            .or_else(|| number.as_f64().filter(|f| f.fract() == 0.0 && f.is_finite()).map(|f| f as i64)),
        Value::String(text) => text.trim().parse::<i64>().ok(),
        _ => None,
    }?;
    (id > 0).then_some(id)
}

/// Product id from the aliases, else from a `product_<digits>` image path
pub fn product_id_of(fields: &Map<String, Value>) -> Option<i64> {
    aliases::PRODUCT_ID
        .iter()
        .filter_map(|name| fields.get(*name))
        .find(|value| !value.is_null())
        .and_then(parse_product_id)
        .or_else(|| {
            let image = first_text(fields, aliases::IMAGE_URL)?;
            IMAGE_PRODUCT_ID
                .captures(&image)
                .and_then(|caps| caps[1].parse::<i64>().ok())
                .filter(|id| *id > 0)
        })
}

/// Leading integer of the first quantity alias, floored to 1
pub fn parse_quantity(fields: &Map<String, Value>) -> u32 {
    let parsed = aliases::QUANTITY
        .iter()
        .filter_map(|name| fields.get(*name))
        .find(|value| !value.is_null())
        .and_then(|value| match value {
            Value::Number(number) => number.as_i64().or_else(|| number.as_f64().map(|f| f.trunc() as i64)),
            Value::String(text) => LEADING_INTEGER
                .captures(text)
                .and_then(|caps| caps[1].parse::<i64>().ok()),
            _ => None,
        });
    match parsed {
        Some(quantity) if quantity >= 1 => u32::try_from(quantity).unwrap_or(u32::MAX),
        _ => 1,
    }
}

/// Card number embedded in a display name
pub fn card_number_from_name(name: &str) -> Option<String> {
    NAME_NUMBER_PATTERNS
        .iter()
        .find_map(|pattern| pattern.captures(name).map(|caps| caps[1].to_string()))
}

/// Collection scope key of a raw item
pub fn raw_collection_scope(fields: &Map<String, Value>) -> String {
    collection_scope_key(
        first_text(fields, aliases::COLLECTION_ID).as_deref(),
        first_text(fields, aliases::COLLECTION_NAME).as_deref(),
    )
}

/// Whether a raw item carries a card number under any known alias
pub fn has_card_number(item: &RawItem) -> bool {
    item.as_object()
        .is_some_and(|fields| first_text(fields, aliases::CARD_NUMBER).is_some())
}

/// Normalize without debug sampling
pub fn normalize_item(raw: &RawItem) -> Option<NormalizedItem> {
    let fields = raw.as_object()?;

    let showcase_name = first_text(fields, aliases::NAME)
        .or_else(|| find_first_value(raw, &NAME_KEYS, None, DEEP_SEARCH_DEPTH))
        .map(|name| strip_jp_tag(&name))
        .filter(|name| !name.is_empty());

    let set_name = first_text(fields, aliases::SET_NAME)
        .or_else(|| find_first_value(raw, &SET_KEYS, None, DEEP_SEARCH_DEPTH));

    let card_number = first_text(fields, aliases::CARD_NUMBER)
        .or_else(|| find_first_value(raw, &NUMBER_KEYS, Some(looks_like_card_number), DEEP_SEARCH_DEPTH))
        .or_else(|| showcase_name.as_deref().and_then(card_number_from_name));

    let rarity = first_text(fields, aliases::RARITY)
        .or_else(|| find_first_value(raw, &RARITY_KEYS, None, DEEP_SEARCH_DEPTH));

    let is_card = aliases::IS_CARD
        .iter()
        .find_map(|name| fields.get(*name).and_then(Value::as_bool));

    Some(NormalizedItem {
        product_id: product_id_of(fields),
        quantity: parse_quantity(fields),
        showcase_name,
        image_url: first_text(fields, aliases::IMAGE_URL),
        set_name,
        collection_id: first_text(fields, aliases::COLLECTION_ID),
        collection_name: first_text(fields, aliases::COLLECTION_NAME),
        grade_company: first_text(fields, aliases::GRADE_COMPANY),
        grade_id: first_text(fields, aliases::GRADE_ID),
        card_condition: first_text(fields, aliases::CARD_CONDITION),
        is_card,
        card_number,
        rarity,
    })
}

/// Shallow key-shape summary of a raw item for debug output
pub fn key_shape(value: &Value, depth: usize) -> Value {
    let type_name = |value: &Value| {
        Value::String(
            match value {
                Value::Null => "null",
                Value::Bool(_) => "boolean",
                Value::Number(_) => "number",
                Value::String(_) => "string",
                Value::Array(_) => "array",
                Value::Object(_) => "object",
            }
            .to_string(),
        )
    };
    match value {
        Value::Array(entries) if depth > 0 => {
            Value::Array(entries.first().map(|first| key_shape(first, depth - 1)).into_iter().collect())
        }
        Value::Object(fields) if depth > 0 => Value::Object(
            fields
                .iter()
                .map(|(key, child)| (key.clone(), key_shape(child, depth - 1)))
                .collect(),
        ),
        other => type_name(other),
    }
}

/// Normalizer with optional debug sampling of id-less items
pub struct ItemNormalizer {
    debug_limit: Option<usize>,
    sampled: AtomicUsize,
}

impl ItemNormalizer {
    pub fn new(config: &ImporterConfig) -> Self {
        Self {
            debug_limit: config.debug.then_some(config.debug_limit),
            sampled: AtomicUsize::new(0),
        }
    }

    pub fn normalize(&self, raw: &RawItem) -> Option<NormalizedItem> {
        let item = normalize_item(raw)?;
        if item.product_id.is_none() {
            self.sample(raw, &item);
        }
        Some(item)
    }

    fn sample(&self, raw: &RawItem, item: &NormalizedItem) {
        let Some(limit) = self.debug_limit else { return };
        if self.sampled.fetch_add(1, Ordering::Relaxed) >= limit {
            return;
        }
        debug!(
            keys = %key_shape(raw, 2),
            name = ?item.showcase_name,
            set = ?item.set_name,
            number = ?item.card_number,
            rarity = ?item.rarity,
            "Raw item without product id"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    #[test]
    fn test_api_shaped_item() {
        let item = normalize_item(&json!({
            "product_id": "123",
            "quantity": "2",
            "product_name": "Clefable (JP)",
            "catalog_group": "Jungle",
            "card_number": "005/064",
            "rarity": "Holo Rare",
            "grade_id": 52,
            "grade_company": null,
            "is_card": true,
            "image_url": "https://cdn/public-assets/products/product_123.png"
        }))
        .unwrap();
        assert_eq!(item.product_id, Some(123));
        assert_eq!(item.quantity, 2);
        assert_eq!(item.showcase_name.as_deref(), Some("Clefable"));
        assert_eq!(item.set_name.as_deref(), Some("Jungle"));
        assert_eq!(item.card_number.as_deref(), Some("005/064"));
        assert_eq!(item.grade_id.as_deref(), Some("52"));
        assert_eq!(item.grade_company, None);
        assert_eq!(item.is_card, Some(true));
    }

    #[test]
    fn test_camel_case_page_item() {
        let item = normalize_item(&json!({
            "productId": 77,
            "productName": "Pikachu",
            "setName": "Base Set",
            "cardNumber": "58/102",
            "collectionId": "c-1"
        }))
        .unwrap();
        assert_eq!(item.product_id, Some(77));
        assert_eq!(item.quantity, 1);
        assert_eq!(item.collection_scope(), "id:c-1");
    }

    #[test]
    fn test_id_from_image_url() {
        let item = normalize_item(&json!({"image_url": "https://x/product_4501.jpg"})).unwrap();
        assert_eq!(item.product_id, Some(4501));
    }

    #[rstest]
    #[case(json!({"product_id": "0"}), None)]
    #[case(json!({"product_id": -4}), None)]
    #[case(json!({"product_id": "abc"}), None)]
    #[case(json!({"tcgProductId": 9.0}), Some(9))]
    fn test_rejects_invalid_ids(#[case] raw: Value, #[case] expected: Option<i64>) {
        assert_eq!(normalize_item(&raw).unwrap().product_id, expected);
    }

    #[rstest]
    #[case(json!({"quantity": "3 cards"}), 3)]
    #[case(json!({"qty": 0}), 1)]
    #[case(json!({"count": "-2"}), 1)]
    #[case(json!({"quantity": "many"}), 1)]
    #[case(json!({"total": 4}), 4)]
    #[case(json!({}), 1)]
    fn test_quantity(#[case] raw: Value, #[case] expected: u32) {
        assert_eq!(normalize_item(&raw).unwrap().quantity, expected);
    }

    #[test]
    fn test_non_objects_are_rejected() {
        assert!(normalize_item(&json!([1, 2])).is_none());
        assert!(normalize_item(&json!("text")).is_none());
        assert!(normalize_item(&Value::Null).is_none());
    }

    #[test]
    fn test_deep_search_prefers_shallow_hits() {
        let item = normalize_item(&json!({
            "product": {
                "details": {"card_number": "99/99"},
                "card_number": "12/100",
                "meta": {"rarity_label": "Rare"}
            },
            "set": {"set_name": "Fossil"}
        }))
        .unwrap();
        assert_eq!(item.card_number.as_deref(), Some("12/100"));
        assert_eq!(item.set_name.as_deref(), Some("Fossil"));
        assert_eq!(item.rarity.as_deref(), Some("Rare"));
    }

    #[test]
    fn test_deep_search_validates_card_number_shape() {
        let item = normalize_item(&json!({
            "product_name": "Eevee",
            "extra": {"phone_number": "555-1234-5678", "card_no": "SV049"}
        }))
        .unwrap();
        assert_eq!(item.card_number.as_deref(), Some("SV049"));
    }

    #[test]
    fn test_deep_search_is_depth_bounded() {
        let raw = json!({"a": {"b": {"c": {"d": {"e": {"f": {"rarity": "Deep"}}}}}}});
        assert_eq!(normalize_item(&raw).unwrap().rarity, None);
        assert_eq!(find_first_value(&raw, &RARITY_KEYS, None, 6).as_deref(), Some("Deep"));
    }

    #[rstest]
    #[case("Pikachu V SWSH-061", Some("SWSH-061"))]
    #[case("Lugia SV049", Some("SV049"))]
    #[case("Mew #151", Some("151"))]
    #[case("Snorlax 27/64", Some("27/64"))]
    #[case("Mewtwo", None)]
    fn test_card_number_from_name(#[case] name: &str, #[case] expected: Option<&str>) {
        assert_eq!(card_number_from_name(name).as_deref(), expected);
    }

    #[test]
    fn test_key_shape() {
        let shape = key_shape(&json!({"a": 1, "b": {"c": "x", "d": {"e": 1}}, "f": [true]}), 2);
        assert_eq!(shape, json!({"a": "number", "b": {"c": "string", "d": "object"}, "f": ["boolean"]}));
    }

    #[test]
    fn test_sampler_respects_limit() {
        let config = ImporterConfig { debug: true, debug_limit: 1, ..ImporterConfig::default() };
        let normalizer = ItemNormalizer::new(&config);
        for _ in 0..3 {
            normalizer.normalize(&json!({"product_name": "Eevee"}));
        }
        assert_eq!(normalizer.sampled.load(Ordering::Relaxed), 3);
        assert!(normalizer.normalize(&json!({"product_id": 5})).is_some());
        assert_eq!(normalizer.sampled.load(Ordering::Relaxed), 3);
    }
}
