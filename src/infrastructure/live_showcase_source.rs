//! Live Collectr source: API client, headless browser and static fetches

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::domain::services::{ApiWalk, BrowserCapture, ShowcaseSource, StaticPage};
use crate::domain::showcase_url::ShowcaseTarget;
use crate::infrastructure::browser_session::{self, BrowserSettings};
use crate::infrastructure::config::ImporterConfig;
use crate::infrastructure::http_client::{HttpClient, HttpClientConfig};
use crate::infrastructure::showcase_api::ShowcaseApiClient;

pub struct LiveShowcaseSource {
    api: ShowcaseApiClient,
    http: Arc<HttpClient>,
    browser: BrowserSettings,
}

impl LiveShowcaseSource {
    pub fn new(config: &ImporterConfig) -> Result<Self> {
        let http = Arc::new(HttpClient::new(HttpClientConfig::from(config))?);
        Ok(Self {
            api: ShowcaseApiClient::new(Arc::clone(&http), config),
            http,
            browser: BrowserSettings::from(config),
        })
    }
}

#[async_trait]
impl ShowcaseSource for LiveShowcaseSource {
    async fn walk_api(&self, target: &ShowcaseTarget, cancel: &CancellationToken) -> Result<ApiWalk> {
        self.api.walk_showcase(target, cancel).await
    }

    async fn browse(&self, target: &ShowcaseTarget) -> Result<BrowserCapture> {
        let target = target.clone();
        let settings = self.browser.clone();
        tokio::task::spawn_blocking(move || browser_session::capture(&target, &settings))
            .await
            .context("Browser task panicked")?
    }

    async fn fetch_static(&self, url: &str) -> Result<StaticPage> {
        self.http.fetch(url, &CancellationToken::new()).await
    }
}
