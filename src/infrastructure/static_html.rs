//! Static HTML item extractor
//!
//! The showcase page embeds its product payload as JSON fragments inside
//! script markup, sometimes with escaped quoting. Each fragment around a
//! `product_id` marker is cut out between the nearest braces and its string
//! fields are read with per-key patterns.

use std::collections::{HashMap, HashSet};

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};

use crate::domain::showcase_item::RawItem;
use crate::domain::value_objects::decode_escapes;

static PRODUCT_ID_MARKERS: Lazy<[Regex; 2]> = Lazy::new(|| {
    [
        Regex::new(r#"\\"product_id\\":\\"(\d+)\\""#).expect("valid escaped marker regex"),
        Regex::new(r#""product_id":"(\d+)""#).expect("valid plain marker regex"),
    ]
});

/// Fields read from every fragment, in output order
const STRING_FIELDS: &[&str] = &[
    "product_id",
    "image_url",
    "product_name",
    "quantity",
    "catalog_group",
    "card_number",
    "rarity",
    "grade_id",
    "grade_company",
];

struct FieldPatterns {
    escaped: Regex,
    plain: Regex,
}

static FIELD_PATTERNS: Lazy<HashMap<&'static str, FieldPatterns>> = Lazy::new(|| {
    STRING_FIELDS
        .iter()
        .map(|field| {
            let key = regex::escape(field);
            let patterns = FieldPatterns {
                escaped: Regex::new(&format!(r#"\\"{key}\\":\\"(.*?)\\""#)).expect("valid escaped field regex"),
                plain: Regex::new(&format!(r#""{key}":"(.*?)""#)).expect("valid plain field regex"),
            };
            (*field, patterns)
        })
        .collect()
});

/// Items recovered from one page
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StaticExtraction {
    pub items: Vec<RawItem>,
    /// Distinct product fragments found; every fragment yields one item
    pub total_blocks: usize,
}

fn extract_string(block: &str, field: &str) -> Option<String> {
    let patterns = FIELD_PATTERNS.get(field)?;
    patterns
        .escaped
        .captures(block)
        .or_else(|| patterns.plain.captures(block))
        .map(|caps| decode_escapes(&caps[1]))
}

/// Cut the `{...}` fragment enclosing a marker at `position`
fn enclosing_block(html: &str, position: usize) -> Option<&str> {
    let start = html[..=position].rfind('{')?;
    let end = position + html[position..].find('}')?;
    Some(&html[start..=end])
}

fn block_to_item(block: &str) -> RawItem {
    let mut fields = Map::new();
    for field in STRING_FIELDS {
        let value = match (extract_string(block, field), *field) {
            (Some(text), _) => Value::String(text),
            (None, "image_url") => Value::String(String::new()),
            (None, _) => Value::Null,
        };
        fields.insert((*field).to_string(), value);
    }
    Value::Object(fields)
}

/// Extract every embedded product fragment from `html`
pub fn extract_static_items(html: &str) -> StaticExtraction {
    let mut seen = HashSet::new();
    let mut blocks = Vec::new();
    for marker in PRODUCT_ID_MARKERS.iter() {
        for found in marker.find_iter(html) {
            let Some(block) = enclosing_block(html, found.start()) else {
                continue;
            };
            if seen.insert(block) {
                blocks.push(block);
            }
        }
    }

    StaticExtraction {
        total_blocks: blocks.len(),
        items: blocks.into_iter().map(block_to_item).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ESCAPED_PAGE: &str = r#"<script>self.__next_f.push([1,"{\"product_id\":\"42\",\"product_name\":\"Pokémon Clefable\",\"catalog_group\":\"Jungle\",\"card_number\":\"5/64\",\"quantity\":\"2\",\"grade_company\":null}"])</script>"#;

    #[test]
    fn test_escaped_fragments_are_decoded() {
        let extraction = extract_static_items(ESCAPED_PAGE);
        assert_eq!(extraction.total_blocks, 1);
        let item = &extraction.items[0];
        assert_eq!(item["product_id"], "42");
        assert_eq!(item["product_name"], "Pokémon Clefable");
        assert_eq!(item["catalog_group"], "Jungle");
        assert_eq!(item["card_number"], "5/64");
        assert_eq!(item["quantity"], "2");
        assert_eq!(item["image_url"], "");
        assert!(item["grade_company"].is_null());
        assert!(item["rarity"].is_null());
    }

    #[test]
    fn test_plain_fragments_and_duplicates() {
        let html = r#"<div>{"product_id":"7","product_name":"Eevee","rarity":"Common"}</div>
            <div>{"product_id":"7","product_name":"Eevee","rarity":"Common"}</div>
            <div>{"product_id":"8","image_url":"https://x/product_8.png"}</div>"#;
        let extraction = extract_static_items(html);
        assert_eq!(extraction.total_blocks, 2);
        assert_eq!(extraction.items[0]["rarity"], "Common");
        assert_eq!(extraction.items[1]["image_url"], "https://x/product_8.png");
    }

    #[test]
    fn test_pages_without_markers_yield_nothing() {
        let extraction = extract_static_items("<html><body>blocked</body></html>");
        assert_eq!(extraction, StaticExtraction::default());
    }
}
