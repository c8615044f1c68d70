//! Multi-source showcase extraction
//!
//! Strategies run in increasing cost order: the paginated API, the headless
//! browser, then the static page. A static pass also enriches earlier
//! results when some items lack a card number.

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::application::item_merger::{dedupe_items, merge_items};
use crate::application::item_normalizer::has_card_number;
use crate::domain::constants::extraction::MIN_STATIC_HTML_LEN;
use crate::domain::services::{ApiWalk, BrowserCapture, ShowcaseSource};
use crate::domain::showcase_item::{RawItem, ShowcaseCollection};
use crate::domain::showcase_url::ShowcaseTarget;
use crate::error::{ImportError, ImportResult, ensure_active};
use crate::infrastructure::config::ImporterConfig;
use crate::infrastructure::static_html::extract_static_items;

const BLOCKED_HINT: &str = "The site may be blocking automated requests. Try setting COLLECTR_HEADLESS=0.";

/// Raw items gathered for one run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Extraction {
    pub items: Vec<RawItem>,
    pub collections: Vec<ShowcaseCollection>,
    pub total_raw_items_seen: usize,
    /// Items from a static page pass, kept for card-number backfill
    pub static_items: Option<Vec<RawItem>>,
}

/// Combine everything a browser session saw into one deduplicated list.
///
/// The rendered markup also goes through the static extractor; its items
/// are the answer when nothing else identified a card.
pub fn assemble_browser_items(capture: &BrowserCapture) -> Vec<RawItem> {
    let mut collected = capture.network_items.clone();
    merge_items(&mut collected, &capture.page_api_items);
    merge_items(&mut collected, &capture.dom_items);

    let rendered = capture
        .page_html
        .as_deref()
        .map(extract_static_items)
        .unwrap_or_default();
    merge_items(&mut collected, &rendered.items);

    let deduped = dedupe_items(&collected);
    if deduped.is_empty() { rendered.items } else { deduped }
}

pub struct ShowcaseExtractor<'a> {
    source: &'a dyn ShowcaseSource,
    config: &'a ImporterConfig,
}

impl<'a> ShowcaseExtractor<'a> {
    pub fn new(source: &'a dyn ShowcaseSource, config: &'a ImporterConfig) -> Self {
        Self { source, config }
    }

    pub async fn extract(&self, target: &ShowcaseTarget, cancel: &CancellationToken) -> ImportResult<Extraction> {
        let mut extraction = Extraction::default();

        if self.config.use_api {
            let walk = self.from_api(target, cancel).await?;
            extraction.total_raw_items_seen = walk.items.len();
            extraction.items = walk.items;
            extraction.collections = walk.collections;
        }

        if extraction.items.is_empty() && self.config.use_browser {
            ensure_active(cancel)?;
            extraction.items = self.from_browser(target).await;
            extraction.total_raw_items_seen = extraction.items.len();
        }

        if !extraction.items.is_empty() && !extraction.items.iter().all(has_card_number) {
            ensure_active(cancel)?;
            self.enrich(target, &mut extraction).await;
        }

        if extraction.items.is_empty() {
            ensure_active(cancel)?;
            let (items, total_blocks) = self.from_static_page(target).await?;
            extraction.total_raw_items_seen = total_blocks;
            extraction.static_items = Some(items.clone());
            extraction.items = items;
        }

        info!(
            "📦 Extracted {} raw items ({} seen)",
            extraction.items.len(),
            extraction.total_raw_items_seen
        );
        Ok(extraction)
    }

    /// API walk; any failure other than cancellation yields no items
    async fn from_api(&self, target: &ShowcaseTarget, cancel: &CancellationToken) -> ImportResult<ApiWalk> {
        match self.source.walk_api(target, cancel).await {
            Ok(walk) => Ok(walk),
            Err(_) if cancel.is_cancelled() => Err(ImportError::Cancelled),
            Err(e) => {
                warn!("API strategy failed: {:#}", e);
                Ok(ApiWalk::default())
            }
        }
    }

    async fn from_browser(&self, target: &ShowcaseTarget) -> Vec<RawItem> {
        match self.source.browse(target).await {
            Ok(capture) => {
                let items = assemble_browser_items(&capture);
                debug!("Browser strategy yielded {} items", items.len());
                items
            }
            Err(e) => {
                warn!("Browser strategy failed: {:#}", e);
                Vec::new()
            }
        }
    }

    /// Merge static page items into an existing extraction. Failures are
    /// ignored.
    async fn enrich(&self, target: &ShowcaseTarget, extraction: &mut Extraction) {
        let page = match self.source.fetch_static(&target.url).await {
            Ok(page) if page.is_success() => page,
            Ok(page) => {
                debug!("Enrichment fetch returned HTTP {}", page.status);
                return;
            }
            Err(e) => {
                debug!("Enrichment fetch failed: {:#}", e);
                return;
            }
        };

        let extracted = extract_static_items(&page.body);
        if extracted.items.is_empty() {
            return;
        }
        merge_items(&mut extraction.items, &extracted.items);
        extraction.total_raw_items_seen = extraction.total_raw_items_seen.max(extracted.total_blocks);
        debug!("Static enrichment merged {} items", extracted.items.len());
        extraction.static_items = Some(extracted.items);
    }

    /// Last resort: the plain page. Every way of coming back empty is fatal.
    async fn from_static_page(&self, target: &ShowcaseTarget) -> ImportResult<(Vec<RawItem>, usize)> {
        let page = self
            .source
            .fetch_static(&target.url)
            .await
            .map_err(|e| ImportError::NoItemsFound(format!("{e:#}")))?;
        if !page.is_success() {
            return Err(ImportError::StaticFetchFailed { status: page.status });
        }
        if page.body.trim().len() < MIN_STATIC_HTML_LEN {
            return Err(ImportError::NoItemsFound(format!("Collectr returned empty HTML. {BLOCKED_HINT}")));
        }

        let extracted = extract_static_items(&page.body);
        if extracted.items.is_empty() {
            return Err(ImportError::NoItemsFound(format!(
                "No items found in Collectr HTML. {BLOCKED_HINT}"
            )));
        }
        Ok((extracted.items, extracted.total_blocks))
    }
}
