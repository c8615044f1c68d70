//! Repository interfaces for the card catalog
//!
//! The catalog is read-only during a run. Implementations return
//! `anyhow::Result`; any failure is fatal for the run that issued it.

use anyhow::Result;
use async_trait::async_trait;

use crate::domain::catalog::{CatalogLanguage, CatalogSet, ProductWithSet};

/// Targeted probe for one Japanese entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JapanProductProbe {
    /// Canonical card number; compared against the canonical form of each
    /// catalog number
    pub normalized_card_number: String,
    /// Case-insensitive substring filter on the product name
    pub name: Option<String>,
    /// Case-insensitive substring filter on the set's primary or alias name
    pub set_name: Option<String>,
    pub limit: u32,
}

#[async_trait]
pub trait CatalogRepository: Send + Sync {
    /// Every set row of one language partition
    async fn list_sets(&self, language: CatalogLanguage) -> Result<Vec<CatalogSet>>;

    /// Products whose external id is in `external_ids`, joined with their set
    async fn products_by_external_ids(
        &self,
        language: CatalogLanguage,
        external_ids: &[i64],
    ) -> Result<Vec<ProductWithSet>>;

    /// Products owned by any of `set_ids`, joined with their set
    async fn products_by_set_ids(
        &self,
        language: CatalogLanguage,
        set_ids: &[i64],
    ) -> Result<Vec<ProductWithSet>>;

    /// Japanese candidates for one probe, at most `probe.limit` rows
    async fn search_japan_products(&self, probe: &JapanProductProbe) -> Result<Vec<ProductWithSet>>;
}
