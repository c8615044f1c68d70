//! Application layer module
//!
//! The reconciliation pipeline: extraction, normalization, merging,
//! classification, aggregation, catalog matching and backfill, orchestrated
//! by the reconciliation use case.

pub mod aggregator;
pub mod backfill;
pub mod catalog_matcher;
pub mod item_merger;
pub mod item_normalizer;
pub mod reconciliation;
pub mod set_classifier;
pub mod showcase_extractor;

pub use aggregator::{Aggregation, aggregate};
pub use catalog_matcher::CatalogMatcher;
pub use item_normalizer::ItemNormalizer;
pub use reconciliation::ReconciliationUseCase;
pub use set_classifier::SetClassifier;
pub use showcase_extractor::{Extraction, ShowcaseExtractor};
