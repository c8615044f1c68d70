//! Showcase data sources
//!
//! One trait per seam the extractor depends on, so the pipeline can run
//! against the live site or against canned data.

use anyhow::Result;
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::domain::showcase_item::{RawItem, ShowcaseCollection};
use crate::domain::showcase_url::ShowcaseTarget;

/// Outcome of a paginated API walk
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ApiWalk {
    pub items: Vec<RawItem>,
    pub collections: Vec<ShowcaseCollection>,
}

/// Plain page fetch, no script execution
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaticPage {
    pub status: u16,
    pub body: String,
}

impl StaticPage {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Everything one headless browser session observed
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BrowserCapture {
    /// Products decoded from intercepted showcase API responses
    pub network_items: Vec<RawItem>,
    /// Products from the paginated walk replayed inside the page
    pub page_api_items: Vec<RawItem>,
    /// Cards scraped from the rendered DOM
    pub dom_items: Vec<RawItem>,
    /// Rendered page markup, when it could be read
    pub page_html: Option<String>,
}

impl BrowserCapture {
    pub fn is_empty(&self) -> bool {
        self.network_items.is_empty() && self.page_api_items.is_empty() && self.dom_items.is_empty()
    }
}

#[async_trait]
pub trait ShowcaseSource: Send + Sync {
    /// Walk the showcase API page by page.
    ///
    /// A failing page ends the walk; items gathered so far are kept.
    async fn walk_api(&self, target: &ShowcaseTarget, cancel: &CancellationToken) -> Result<ApiWalk>;

    /// Render the page in a headless browser and capture what it exposes.
    /// The browser is released before this returns, on every path.
    async fn browse(&self, target: &ShowcaseTarget) -> Result<BrowserCapture>;

    async fn fetch_static(&self, url: &str) -> Result<StaticPage>;
}
