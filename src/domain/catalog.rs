//! Catalog entities
//!
//! Read-only rows of the internal card catalog. The catalog is partitioned
//! by language; each partition has its own set and product tables.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

static CODE_COLON_PREFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^([A-Z0-9]{2,6})\s*:\s*(.+)$").expect("valid colon prefix regex"));
static CODE_DASH_PREFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^([A-Z0-9]{2,6})\s*-\s*(.+)$").expect("valid dash prefix regex"));

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CatalogLanguage {
    English,
    Japanese,
}

impl CatalogLanguage {
    pub fn sets_table(self) -> &'static str {
        match self {
            Self::English => "pokemon_sets",
            Self::Japanese => "pokemon_japan_sets",
        }
    }

    pub fn products_table(self) -> &'static str {
        match self {
            Self::English => "pokemon_products",
            Self::Japanese => "pokemon_japan_products",
        }
    }
}

/// One catalog set row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogSet {
    pub id: i64,
    pub name: String,
    /// Alternate (usually localized or abbreviated) name
    pub name_other: Option<String>,
    pub code: Option<String>,
    pub language: CatalogLanguage,
}

impl CatalogSet {
    /// Every name this set may be looked up by: primary, alias, and the
    /// primary name with a leading `CODE:` / `CODE -` prefix removed.
    pub fn lookup_names(&self) -> Vec<&str> {
        let mut names = vec![self.name.as_str()];
        if let Some(other) = self.name_other.as_deref() {
            names.push(other);
        }
        for pattern in [&*CODE_COLON_PREFIX, &*CODE_DASH_PREFIX] {
            if let Some(rest) = pattern.captures(&self.name).and_then(|caps| caps.get(2)) {
                names.push(rest.as_str());
            }
        }
        names
    }
}

/// One catalog product row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogProduct {
    pub id: i64,
    /// Numeric product id shared with the showcase platform
    pub external_id: i64,
    pub name: String,
    pub set_id: Option<i64>,
    pub card_number: Option<String>,
    pub rarity: Option<String>,
    pub image_url: Option<String>,
    pub market_price: Option<f64>,
    pub product_type: Option<String>,
}

/// A product joined with its owning set, as returned by catalog reads
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductWithSet {
    pub product: CatalogProduct,
    pub set: Option<CatalogSet>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(name: &str, other: Option<&str>) -> CatalogSet {
        CatalogSet {
            id: 1,
            name: name.to_string(),
            name_other: other.map(str::to_string),
            code: None,
            language: CatalogLanguage::English,
        }
    }

    #[test]
    fn test_lookup_names_strip_code_prefixes() {
        assert_eq!(set("SV01: Scarlet & Violet", None).lookup_names(), vec!["SV01: Scarlet & Violet", "Scarlet & Violet"]);
        assert_eq!(set("SWSH12 - Silver Tempest", Some("Silver Tempest")).lookup_names(), vec![
            "SWSH12 - Silver Tempest",
            "Silver Tempest",
            "Silver Tempest"
        ]);
        assert_eq!(set("Jungle", None).lookup_names(), vec!["Jungle"]);
    }

    #[test]
    fn test_partition_tables() {
        assert_eq!(CatalogLanguage::English.products_table(), "pokemon_products");
        assert_eq!(CatalogLanguage::Japanese.sets_table(), "pokemon_japan_sets");
    }
}
