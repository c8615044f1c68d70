//! Paginated showcase API client
//!
//! Pages are requested strictly one after another. The first empty or
//! failing page ends a walk; items already collected are kept.

use std::sync::Arc;

use anyhow::{Context, Result};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

use crate::domain::constants::site;
use crate::domain::services::ApiWalk;
use crate::domain::showcase_item::{RawItem, ShowcaseCollection};
use crate::domain::showcase_url::ShowcaseTarget;
use crate::infrastructure::config::ImporterConfig;
use crate::infrastructure::http_client::HttpClient;

/// Query parameters for one showcase API page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShowcasePageQuery<'a> {
    pub profile_id: &'a str,
    pub offset: u32,
    pub limit: u32,
    pub username: &'a str,
    pub collection_id: Option<&'a str>,
    /// `None` omits the parameter; `Some("")` sends it empty
    pub filters: Option<&'a str>,
}

impl ShowcasePageQuery<'_> {
    pub fn to_url(&self) -> Result<Url> {
        let mut url = Url::parse(site::API_BASE)
            .and_then(|base| base.join(&format!("{}{}", site::SHOWCASE_API_PATH, self.profile_id)))
            .with_context(|| format!("Invalid showcase profile id: {}", self.profile_id))?;
        {
            let mut pairs = url.query_pairs_mut();
            pairs
                .append_pair("offset", &self.offset.to_string())
                .append_pair("limit", &self.limit.to_string())
                .append_pair("unstackedView", "true")
                .append_pair("username", self.username);
            if let Some(collection_id) = self.collection_id {
                pairs.append_pair("id", collection_id);
            }
            if let Some(filters) = self.filters {
                pairs.append_pair("filters", filters);
            }
        }
        Ok(url)
    }
}

/// Product array of a showcase payload, wherever the API nested it
pub fn extract_products(payload: &Value) -> Vec<RawItem> {
    ["/products", "/data/products", "/data/data/products"]
        .iter()
        .find_map(|pointer| payload.pointer(pointer).and_then(Value::as_array))
        .cloned()
        .unwrap_or_default()
}

/// Sub-collections listed in a showcase payload
pub fn extract_collections(payload: &Value) -> Vec<ShowcaseCollection> {
    let Some(list) = ["/collections", "/data/collections"]
        .iter()
        .find_map(|pointer| payload.pointer(pointer).and_then(Value::as_array))
    else {
        return Vec::new();
    };

    list.iter()
        .filter_map(|entry| {
            let id = match entry.get("id")? {
                Value::String(id) if !id.trim().is_empty() => id.trim().to_string(),
                Value::Number(id) => id.to_string(),
                _ => return None,
            };
            let name = entry.get("name").and_then(Value::as_str).map(str::to_string);
            Some(ShowcaseCollection { id, name })
        })
        .collect()
}

/// Stamp collection id and name on items that do not carry their own
pub fn tag_items_with_collection(items: &mut [RawItem], collection: &ShowcaseCollection) {
    for item in items.iter_mut() {
        let Some(fields) = item.as_object_mut() else { continue };
        let missing = |value: Option<&Value>| value.is_none_or(|v| v.is_null() || v.as_str() == Some(""));
        if missing(fields.get("collection_id")) {
            fields.insert("collection_id".into(), Value::String(collection.id.clone()));
        }
        if let Some(name) = &collection.name {
            if missing(fields.get("collection_name")) {
                fields.insert("collection_name".into(), Value::String(name.clone()));
            }
        }
    }
}

pub struct ShowcaseApiClient {
    http: Arc<HttpClient>,
    page_size: u32,
    max_pages: u32,
    username: String,
    filters: Option<String>,
}

impl ShowcaseApiClient {
    pub fn new(http: Arc<HttpClient>, config: &ImporterConfig) -> Self {
        Self {
            http,
            page_size: config.api_page_size,
            max_pages: config.api_max_pages,
            username: config.api_username().to_string(),
            filters: config.filters.clone(),
        }
    }

    /// Walk the showcase, once per sub-collection when the first walk lists
    /// several
    pub async fn walk_showcase(&self, target: &ShowcaseTarget, cancel: &CancellationToken) -> Result<ApiWalk> {
        let initial_filters = self
            .filters
            .as_deref()
            .or(target.collection_id.as_ref().map(|_| ""));
        let initial = self
            .walk(&target.profile_id, target.collection_id.as_deref(), initial_filters, cancel)
            .await?;

        if initial.collections.is_empty() {
            info!("API walk returned {} items", initial.items.len());
            return Ok(initial);
        }

        let loop_filters = self.filters.as_deref().unwrap_or("");
        let mut items = Vec::new();
        for collection in &initial.collections {
            let mut walk = self
                .walk(&target.profile_id, Some(&collection.id), Some(loop_filters), cancel)
                .await?;
            tag_items_with_collection(&mut walk.items, collection);
            debug!("Collection {} yielded {} items", collection.id, walk.items.len());
            items.append(&mut walk.items);
        }

        info!(
            "API walk returned {} items across {} collections",
            items.len(),
            initial.collections.len()
        );
        Ok(ApiWalk {
            items,
            collections: initial.collections,
        })
    }

    /// One paginated walk. Errors only on cancellation.
    pub async fn walk(
        &self,
        profile_id: &str,
        collection_id: Option<&str>,
        filters: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<ApiWalk> {
        let mut walk = ApiWalk::default();
        let mut offset = 0;

        for page in 0..self.max_pages {
            if cancel.is_cancelled() {
                anyhow::bail!("API walk cancelled at page {page}");
            }

            let url = ShowcasePageQuery {
                profile_id,
                offset,
                limit: self.page_size,
                username: &self.username,
                collection_id,
                filters,
            }
            .to_url()?;

            let payload = match self.http.get_json(url.as_str(), cancel).await {
                Ok(payload) => payload,
                Err(e) if cancel.is_cancelled() => return Err(e),
                Err(e) => {
                    warn!("Stopping API walk at page {}: {:#}", page, e);
                    break;
                }
            };

            if page == 0 {
                walk.collections = extract_collections(&payload);
            }

            let products = extract_products(&payload);
            if products.is_empty() {
                debug!("API page {} is empty, walk complete", page);
                break;
            }
            debug!("API page {} returned {} products", page, products.len());
            walk.items.extend(products);
            offset += self.page_size;
        }

        Ok(walk)
    }
}
