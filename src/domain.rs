//! Domain module - catalog and showcase entities
//!
//! Entities, value objects and the traits the reconciliation pipeline is
//! written against. Nothing here performs I/O.

pub mod catalog;
pub mod constants;
pub mod reconciliation;
pub mod repositories;
pub mod services;
pub mod showcase_item;
pub mod showcase_url;
pub mod value_objects;

pub use catalog::{CatalogLanguage, CatalogProduct, CatalogSet, ProductWithSet};
pub use reconciliation::{
    AggregatedEntry, EntryIdentity, JapaneseChecks, MatchResult, ReconciliationReport, RunSummary,
};
pub use repositories::{CatalogRepository, JapanProductProbe};
pub use services::{ApiWalk, BrowserCapture, ShowcaseSource, StaticPage};
pub use showcase_item::{NormalizedItem, RawItem, ShowcaseCollection};
pub use showcase_url::ShowcaseTarget;
