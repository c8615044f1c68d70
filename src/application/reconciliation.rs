//! Reconciliation use case
//!
//! One run takes a showcase URL through extraction, normalization,
//! aggregation, catalog matching and card-number backfill, and returns the
//! summary together with one result per aggregated entry.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::application::aggregator::aggregate;
use crate::application::backfill::{CardNumberLookup, needs_backfill};
use crate::application::catalog_matcher::CatalogMatcher;
use crate::application::item_normalizer::ItemNormalizer;
use crate::application::set_classifier::SetClassifier;
use crate::application::showcase_extractor::ShowcaseExtractor;
use crate::domain::catalog::CatalogLanguage;
use crate::domain::reconciliation::{MatchResult, ReconciliationReport, RunSummary};
use crate::domain::repositories::CatalogRepository;
use crate::domain::services::ShowcaseSource;
use crate::domain::showcase_item::{NormalizedItem, RawItem};
use crate::domain::showcase_url::ShowcaseTarget;
use crate::error::{ImportError, ImportResult, ensure_active};
use crate::infrastructure::config::ImporterConfig;
use crate::infrastructure::static_html::extract_static_items;

pub struct ReconciliationUseCase {
    config: ImporterConfig,
    source: Arc<dyn ShowcaseSource>,
    catalog: Arc<dyn CatalogRepository>,
}

impl ReconciliationUseCase {
    pub fn new(config: ImporterConfig, source: Arc<dyn ShowcaseSource>, catalog: Arc<dyn CatalogRepository>) -> Self {
        Self { config, source, catalog }
    }

    pub fn config(&self) -> &ImporterConfig {
        &self.config
    }

    /// Reconcile one showcase against the catalog
    pub async fn run(&self, url: &str, cancel: &CancellationToken) -> ImportResult<ReconciliationReport> {
        self.config.catalog_url()?;
        let target = ShowcaseTarget::parse(url)?;
        info!("🚀 Reconciling showcase {}", target);

        let classifier = self.load_classifier().await?;
        ensure_active(cancel)?;

        let extraction = ShowcaseExtractor::new(self.source.as_ref(), &self.config)
            .extract(&target, cancel)
            .await?;
        ensure_active(cancel)?;

        let normalizer = ItemNormalizer::new(&self.config);
        let items: Vec<NormalizedItem> = extraction
            .items
            .iter()
            .filter_map(|raw| normalizer.normalize(raw))
            .collect();
        let aggregation = aggregate(&items, &classifier, &self.config.ungraded_grade_id);
        ensure_active(cancel)?;

        let mut results = CatalogMatcher::new(self.catalog.as_ref(), &classifier, self.config.catalog_concurrency)
            .match_entries(&aggregation)
            .await?;
        ensure_active(cancel)?;

        self.backfill(&target, extraction.static_items.as_deref(), &mut results).await;

        let summary = RunSummary {
            total_raw_items_seen: extraction.total_raw_items_seen,
            aggregated_entry_count: aggregation.entry_count(),
            matched_count: results.iter().filter(|result| result.matched).count(),
            skipped_graded_count: aggregation.skipped_graded,
        };
        info!(
            "✅ Reconciliation complete: {} raw, {} entries, {} matched, {} graded skipped",
            summary.total_raw_items_seen,
            summary.aggregated_entry_count,
            summary.matched_count,
            summary.skipped_graded_count
        );

        Ok(ReconciliationReport {
            summary,
            results,
            collections: extraction.collections,
        })
    }

    async fn load_classifier(&self) -> ImportResult<SetClassifier> {
        let english = self
            .catalog
            .list_sets(CatalogLanguage::English)
            .await
            .map_err(ImportError::catalog)?;
        let japan = self
            .catalog
            .list_sets(CatalogLanguage::Japanese)
            .await
            .map_err(ImportError::catalog)?;
        debug!("Loaded {} English and {} Japanese sets", english.len(), japan.len());
        Ok(SetClassifier::new(english, japan))
    }

    /// Fill missing card numbers from a static page pass. The page is
    /// fetched again only when extraction left no usable lookup.
    async fn backfill(
        &self,
        target: &ShowcaseTarget,
        static_items: Option<&[RawItem]>,
        results: &mut [MatchResult],
    ) {
        if !needs_backfill(results) {
            return;
        }

        let mut lookup = static_items.map(CardNumberLookup::from_items).unwrap_or_default();
        if lookup.is_empty() {
            match self.source.fetch_static(&target.url).await {
                Ok(page) if page.is_success() => {
                    lookup = CardNumberLookup::from_items(&extract_static_items(&page.body).items);
                }
                Ok(page) => debug!("Backfill fetch returned HTTP {}", page.status),
                Err(e) => debug!("Backfill fetch failed: {:#}", e),
            }
        }

        let filled = lookup.fill(results);
        if filled > 0 {
            info!("Backfilled {} card numbers", filled);
        }
    }
}
