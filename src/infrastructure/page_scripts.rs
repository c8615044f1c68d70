//! Scripts evaluated inside the rendered showcase page
//!
//! Parameters are injected as one JSON literal so no value is ever spliced
//! into script text unescaped. Scripts that produce data return it as a JSON
//! string, which the session decodes on the Rust side.

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use serde::Serialize;

use crate::domain::constants::{api, site};

const PARAMS_PLACEHOLDER: &str = "__PARAMS__";

const PAGE_API_REPLAY: &str = r"(async (p) => {
  const pageUsername = () => {
    try {
      const token = JSON.parse(localStorage.getItem(p.tokenStorageKey) || '{}');
      if (token && token.username) return token.username;
    } catch (e) {}
    return p.anonUsername;
  };
  const username = p.username || pageUsername();
  const items = [];
  let offset = 0;
  for (let page = 0; page < p.maxPages; page += 1) {
    const params = new URLSearchParams();
    params.set('offset', String(offset));
    params.set('limit', String(p.limit));
    params.set('unstackedView', 'true');
    params.set('username', username);
    if (p.collectionId) params.set('id', p.collectionId);
    if (p.filters !== null && p.filters !== undefined) params.set('filters', String(p.filters));
    const response = await fetch(`${p.apiBase}${p.apiPath}${p.profileId}?${params.toString()}`, {
      credentials: 'include',
      headers: p.headers,
    });
    if (!response.ok) break;
    const payload = await response.json();
    const products = Array.isArray(payload?.products)
      ? payload.products
      : Array.isArray(payload?.data?.products)
        ? payload.data.products
        : Array.isArray(payload?.data?.data?.products)
          ? payload.data.data.products
          : [];
    if (products.length === 0) break;
    items.push(...products);
    offset += p.limit;
  }
  return JSON.stringify(items);
})(__PARAMS__)";

const SCROLL_STEP: &str = r"(() => {
  const candidates = Array.from(document.querySelectorAll('*')).filter((el) => {
    const overflowY = window.getComputedStyle(el).overflowY;
    return (overflowY === 'auto' || overflowY === 'scroll') && el.scrollHeight > el.clientHeight;
  });
  const target = candidates.sort((a, b) => b.scrollHeight - a.scrollHeight)[0];
  if (target) {
    target.scrollTop = target.scrollHeight;
  } else {
    window.scrollTo(0, document.body.scrollHeight);
  }
  return true;
})()";

const CARD_COUNT: &str = r"((selectors) =>
  selectors.reduce((total, selector) => total + document.querySelectorAll(selector).length, 0)
)(__PARAMS__)";

/// Inputs of the in-page API walk
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageReplayParams<'a> {
    pub profile_id: &'a str,
    pub collection_id: Option<&'a str>,
    /// `None` omits the parameter; `Some("")` sends it empty
    pub filters: Option<&'a str>,
    /// Configured identity; the page's own token is used when unset
    pub username: Option<&'a str>,
    pub headers: BTreeMap<&'a str, &'a str>,
    pub limit: u32,
    pub max_pages: u32,
    api_base: &'static str,
    api_path: &'static str,
    anon_username: &'static str,
    token_storage_key: &'static str,
}

impl<'a> PageReplayParams<'a> {
    pub fn new(profile_id: &'a str) -> Self {
        Self {
            profile_id,
            collection_id: None,
            filters: None,
            username: None,
            headers: BTreeMap::new(),
            limit: api::DEFAULT_PAGE_SIZE,
            max_pages: api::DEFAULT_MAX_PAGES,
            api_base: site::API_BASE,
            api_path: site::SHOWCASE_API_PATH,
            anon_username: site::ANON_USERNAME,
            token_storage_key: site::PAGE_TOKEN_STORAGE_KEY,
        }
    }
}

fn with_params<T: Serialize + ?Sized>(template: &str, params: &T) -> Result<String> {
    let literal = serde_json::to_string(params).context("Failed to encode page script parameters")?;
    Ok(template.replace(PARAMS_PLACEHOLDER, &literal))
}

/// Paginated showcase walk run with the page's own cookies; resolves to a
/// JSON array string
pub fn page_api_replay(params: &PageReplayParams<'_>) -> Result<String> {
    with_params(PAGE_API_REPLAY, params)
}

/// Scroll the tallest scrollable container, or the window, to its bottom
pub fn scroll_step() -> &'static str {
    SCROLL_STEP
}

/// Number of rendered card-name nodes
pub fn card_count(selectors: &[String]) -> Result<String> {
    with_params(CARD_COUNT, selectors)
}
