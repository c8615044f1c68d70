//! Collectr showcase reconciler
//!
//! Reads a public Collectr showcase through its API, a headless browser or
//! the plain page, and reconciles the items against the card catalog.

pub mod application;
pub mod domain;
pub mod error;
pub mod infrastructure;

pub use application::ReconciliationUseCase;
pub use domain::{MatchResult, ReconciliationReport, RunSummary, ShowcaseTarget};
pub use error::{ImportError, ImportResult};
pub use infrastructure::ImporterConfig;
