//! Normalization value objects
//!
//! Text normalization shared by every comparison in the pipeline: set and
//! card names, card numbers, collection scopes and the composite identity
//! keys used when no external product id is known.

use once_cell::sync::Lazy;
use regex::Regex;

static UNICODE_ESCAPE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\\u([0-9a-fA-F]{4})").expect("valid unicode escape regex"));
static NON_ALNUM_RUN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^a-z0-9]+").expect("valid alnum regex"));
static JP_TAG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\(\s*JP\s*\)").expect("valid JP tag regex"));
static MULTI_SPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s{2,}").expect("valid space regex"));
static CARD_NUMBER_SHAPE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^#?\s*[A-Z0-9]{0,6}-?\d{1,4}(?:/[A-Z]{0,4}\d{1,4})?$")
        .expect("valid card number shape regex")
});

/// Decode JSON-style escape sequences left in strings scraped from markup
pub fn decode_escapes(value: &str) -> String {
    if !value.contains('\\') {
        return value.to_string();
    }
    let unicode = UNICODE_ESCAPE.replace_all(value, |caps: &regex::Captures<'_>| {
        u32::from_str_radix(&caps[1], 16)
            .ok()
            .and_then(char::from_u32)
            .map(String::from)
            .unwrap_or_default()
    });
    unicode
        .replace("\\n", "\n")
        .replace("\\r", "\r")
        .replace("\\t", "\t")
        .replace("\\\"", "\"")
        .replace("\\\\", "\\")
}

/// Lowercased, `&` spelled out, non-alphanumeric runs collapsed to one space
pub fn normalize_name(value: &str) -> String {
    let lowered = decode_escapes(value).to_lowercase().replace('&', "and");
    NON_ALNUM_RUN.replace_all(&lowered, " ").trim().to_string()
}

/// Remove `(JP)` markers the showcase appends to Japanese card names
pub fn strip_jp_tag(value: &str) -> String {
    let stripped = JP_TAG.replace_all(value, "");
    MULTI_SPACE.replace_all(&stripped, " ").trim().to_string()
}

pub fn normalize_card_name(value: &str) -> String {
    normalize_name(&strip_jp_tag(value))
}

fn strip_leading_zeros(token: &str) -> &str {
    let mut rest = token;
    while rest.starts_with('0') && rest[1..].starts_with(|c: char| c.is_ascii_digit()) {
        rest = &rest[1..];
    }
    rest
}

/// Canonical card number: uppercase, no `#` or whitespace, leading zeros
/// stripped from numerator and denominator independently.
///
/// ```
/// use collectr_reconciler::domain::value_objects::normalize_card_number;
/// assert_eq!(normalize_card_number("007/102").as_deref(), Some("7/102"));
/// assert_eq!(normalize_card_number("052").as_deref(), Some("52"));
/// ```
pub fn normalize_card_number(value: &str) -> Option<String> {
    let raw: String = value
        .trim()
        .to_uppercase()
        .chars()
        .filter(|c| *c != '#' && !c.is_whitespace())
        .collect();
    if raw.is_empty() {
        return None;
    }

    if raw.contains('/') {
        let mut parts = raw.split('/');
        let left = parts.next().map(strip_leading_zeros).unwrap_or_default();
        let right = parts.next().map(strip_leading_zeros).unwrap_or_default();
        return Some(format!("{left}/{right}"));
    }

    Some(strip_leading_zeros(&raw).to_string())
}

/// Digits, an optional slash-delimited total, or letter-prefixed digits
pub fn looks_like_card_number(value: &str) -> bool {
    let raw = value.trim();
    !raw.is_empty() && CARD_NUMBER_SHAPE.is_match(raw)
}

/// Loose name comparison: normalized equality or containment either way
pub fn names_loosely_match(left: &str, right: &str) -> bool {
    let left = normalize_name(left);
    let right = normalize_name(right);
    if left.is_empty() || right.is_empty() {
        return false;
    }
    left == right || left.contains(&right) || right.contains(&left)
}

/// Scope key partitioning identity comparisons between sub-collections
pub fn collection_scope_key(collection_id: Option<&str>, collection_name: Option<&str>) -> String {
    if let Some(id) = collection_id.filter(|id| !id.trim().is_empty()) {
        return format!("id:{id}");
    }
    if let Some(name) = collection_name {
        let normalized = normalize_name(name);
        if !normalized.is_empty() {
            return format!("name:{normalized}");
        }
    }
    "default".to_string()
}

fn key_parts(
    set_name: Option<&str>,
    card_name: Option<&str>,
    card_number: Option<&str>,
) -> (String, String, String) {
    (
        set_name.map(normalize_name).unwrap_or_default(),
        card_name.map(normalize_card_name).unwrap_or_default(),
        card_number.and_then(normalize_card_number).unwrap_or_default(),
    )
}

/// `set|name|number`, only when all three components normalize to non-empty
pub fn tight_key(
    set_name: Option<&str>,
    card_name: Option<&str>,
    card_number: Option<&str>,
) -> Option<String> {
    let (set, name, number) = key_parts(set_name, card_name, card_number);
    if set.is_empty() || name.is_empty() || number.is_empty() {
        return None;
    }
    Some(format!("{set}|{name}|{number}"))
}

/// `set|name|number` with empty components allowed; `None` when all are empty
pub fn loose_key(
    set_name: Option<&str>,
    card_name: Option<&str>,
    card_number: Option<&str>,
) -> Option<String> {
    let (set, name, number) = key_parts(set_name, card_name, card_number);
    if set.is_empty() && name.is_empty() && number.is_empty() {
        return None;
    }
    Some(format!("{set}|{name}|{number}"))
}

/// Tight key when available, loose key otherwise
pub fn composite_key(
    set_name: Option<&str>,
    card_name: Option<&str>,
    card_number: Option<&str>,
) -> Option<String> {
    tight_key(set_name, card_name, card_number).or_else(|| loose_key(set_name, card_name, card_number))
}

/// `set|name` key used by the card-number backfill table
pub fn name_set_key(set_name: Option<&str>, card_name: Option<&str>) -> Option<String> {
    let set = set_name.map(normalize_name).unwrap_or_default();
    let name = card_name.map(normalize_card_name).unwrap_or_default();
    if set.is_empty() || name.is_empty() {
        return None;
    }
    Some(format!("{set}|{name}"))
}
