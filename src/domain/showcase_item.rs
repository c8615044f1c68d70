//! Showcase items
//!
//! Raw items are untyped JSON bags whose field names depend on the strategy
//! that produced them. A normalized item is the canonical shape derived from
//! exactly one raw item.

use serde::{Deserialize, Serialize};

use crate::domain::value_objects::collection_scope_key;

/// Field bag from one extraction strategy (API payload, page script or
/// markup scrape). Only JSON objects carry meaning.
pub type RawItem = serde_json::Value;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedItem {
    pub product_id: Option<i64>,
    pub quantity: u32,
    /// Display name with any `(JP)` marker removed
    pub showcase_name: Option<String>,
    pub image_url: Option<String>,
    pub set_name: Option<String>,
    pub collection_id: Option<String>,
    pub collection_name: Option<String>,
    pub grade_company: Option<String>,
    pub grade_id: Option<String>,
    pub card_condition: Option<String>,
    pub is_card: Option<bool>,
    pub card_number: Option<String>,
    pub rarity: Option<String>,
}

impl NormalizedItem {
    pub fn collection_scope(&self) -> String {
        collection_scope_key(self.collection_id.as_deref(), self.collection_name.as_deref())
    }

    /// Professionally graded cards are excluded from reconciliation.
    ///
    /// A grading company always means graded. Otherwise an explicit
    /// non-card flag means not graded, and a grade id only counts when it
    /// differs from the platform's "ungraded" sentinel.
    pub fn is_graded(&self, ungraded_grade_id: &str) -> bool {
        if self.grade_company.as_deref().is_some_and(|company| !company.trim().is_empty()) {
            return true;
        }
        if self.is_card == Some(false) {
            return false;
        }
        match self.grade_id.as_deref().map(str::trim) {
            Some(grade) if !grade.is_empty() => grade != ungraded_grade_id,
            _ => false,
        }
    }
}

/// A sub-collection exposed by a showcase
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShowcaseCollection {
    pub id: String,
    pub name: Option<String>,
}
