//! Infrastructure layer for configuration, showcase access and the catalog store
//!
//! This module provides the HTTP and headless browser access to the showcase,
//! the static HTML and DOM extractors, the SQLite catalog, and the logging and
//! configuration plumbing.

pub mod browser_session;
pub mod config;
pub mod database_connection;
pub mod dom_card_scraper;
pub mod http_client;
pub mod live_showcase_source;
pub mod logging;
pub mod page_scripts;
pub mod showcase_api;
pub mod sqlite_catalog_repository;
pub mod static_html;

// Re-export commonly used items
pub use config::ImporterConfig;
pub use database_connection::DatabaseConnection;
pub use http_client::{HttpClient, HttpClientConfig};
pub use live_showcase_source::LiveShowcaseSource;
pub use logging::init_logging;
pub use sqlite_catalog_repository::SqliteCatalogRepository;
