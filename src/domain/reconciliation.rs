//! Reconciliation entities
//!
//! Aggregated showcase entries, their catalog match results and the run
//! summary handed back to the caller.

use serde::{Deserialize, Serialize};

use crate::domain::catalog::ProductWithSet;
use crate::domain::showcase_item::ShowcaseCollection;

/// Identity of an aggregated entry within its collection scope
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum EntryIdentity {
    /// Numeric product id shared with the catalog
    External(i64),
    /// Normalized `set|name|number` surrogate
    Composite(String),
}

/// Showcase items sharing one identity, quantities summed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregatedEntry {
    pub collection_scope: String,
    pub identity: EntryIdentity,
    pub collection_id: Option<String>,
    pub collection_name: Option<String>,
    pub quantity: u32,
    pub set_name: Option<String>,
    pub showcase_name: Option<String>,
    pub image_url: Option<String>,
    pub card_number: Option<String>,
    pub rarity: Option<String>,
    pub is_japanese: bool,
}

impl AggregatedEntry {
    pub fn external_id(&self) -> Option<i64> {
        match self.identity {
            EntryIdentity::External(id) => Some(id),
            EntryIdentity::Composite(_) => None,
        }
    }
}

/// Explainability record attached to every Japanese match attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct JapaneseChecks {
    pub set_match: bool,
    pub card_number_match: bool,
    /// `None` when there was no display name to compare
    pub name_match: Option<bool>,
}

/// One reconciled line of the report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchResult {
    pub tcg_product_id: Option<i64>,
    pub quantity: u32,
    #[serde(rename = "collectr_collection_id")]
    pub collection_id: Option<String>,
    #[serde(rename = "collectr_collection_name")]
    pub collection_name: Option<String>,
    #[serde(rename = "collectr_set")]
    pub showcase_set: Option<String>,
    #[serde(rename = "collectr_name")]
    pub showcase_name: Option<String>,
    #[serde(rename = "collectr_image_url")]
    pub showcase_image_url: Option<String>,
    pub matched: bool,
    pub name: Option<String>,
    pub set: Option<String>,
    pub code: Option<String>,
    pub product_type: Option<String>,
    pub card_number: Option<String>,
    pub rarity: Option<String>,
    pub image_url: Option<String>,
    pub market_price: Option<f64>,
    pub japanese_checks: Option<JapaneseChecks>,
}

impl MatchResult {
    /// Build a result for an id-bearing entry; only catalog fields are echoed
    pub fn for_id_bearing(
        entry: &AggregatedEntry,
        product: Option<&ProductWithSet>,
        japanese_checks: Option<JapaneseChecks>,
    ) -> Self {
        let mut result = Self::echo(entry, product, japanese_checks);
        result.tcg_product_id = entry.external_id();
        result
    }

    /// Build a result for an id-less entry; showcase values fill gaps when
    /// nothing matched
    pub fn for_id_less(
        entry: &AggregatedEntry,
        product: Option<&ProductWithSet>,
        japanese_checks: Option<JapaneseChecks>,
    ) -> Self {
        let mut result = Self::echo(entry, product, japanese_checks);
        result.tcg_product_id = product.map(|p| p.product.external_id);
        result.name = result.name.or_else(|| entry.showcase_name.clone());
        result.card_number = result.card_number.or_else(|| entry.card_number.clone());
        result.rarity = result.rarity.or_else(|| entry.rarity.clone());
        result
    }

    fn echo(
        entry: &AggregatedEntry,
        product: Option<&ProductWithSet>,
        japanese_checks: Option<JapaneseChecks>,
    ) -> Self {
        let set = product.and_then(|p| p.set.as_ref());
        Self {
            tcg_product_id: None,
            quantity: entry.quantity,
            collection_id: entry.collection_id.clone(),
            collection_name: entry.collection_name.clone(),
            showcase_set: entry.set_name.clone(),
            showcase_name: entry.showcase_name.clone(),
            showcase_image_url: entry.image_url.clone(),
            matched: product.is_some(),
            name: product.map(|p| p.product.name.clone()),
            set: set.map(|s| s.name.clone()),
            code: set.and_then(|s| s.code.clone()),
            product_type: product.and_then(|p| p.product.product_type.clone()),
            card_number: product.and_then(|p| p.product.card_number.clone()),
            rarity: product.and_then(|p| p.product.rarity.clone()),
            image_url: product.and_then(|p| p.product.image_url.clone()),
            market_price: product.and_then(|p| p.product.market_price),
            japanese_checks,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    pub total_raw_items_seen: usize,
    pub aggregated_entry_count: usize,
    pub matched_count: usize,
    pub skipped_graded_count: usize,
}

/// Complete payload of one import run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconciliationReport {
    pub summary: RunSummary,
    /// Id-bearing results first, then id-less results
    pub results: Vec<MatchResult>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub collections: Vec<ShowcaseCollection>,
}
