//! HTTP client for showcase requests with rate limiting and header overrides
//!
//! API pages and static page fetches share one client so that cookies,
//! headers and the request budget apply to both.

use std::num::NonZeroU32;
use std::time::Duration;

use anyhow::{Context, Result};
use governor::{
    Quota, RateLimiter,
    clock::DefaultClock,
    state::{InMemoryState, direct::NotKeyed},
};
use reqwest::{
    Client,
    header::{HeaderMap, HeaderName, HeaderValue},
};
use tokio_util::sync::CancellationToken;

use crate::domain::services::StaticPage;
use crate::infrastructure::config::ImporterConfig;

/// HTTP client configuration
#[derive(Debug, Clone, serde::Serialize)]
pub struct HttpClientConfig {
    pub headers: Vec<(String, String)>,
    pub timeout: Duration,
    pub max_requests_per_second: u32,
    pub max_redirects: usize,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        ImporterConfig::default().into()
    }
}

impl From<ImporterConfig> for HttpClientConfig {
    fn from(config: ImporterConfig) -> Self {
        Self::from(&config)
    }
}

impl From<&ImporterConfig> for HttpClientConfig {
    fn from(config: &ImporterConfig) -> Self {
        Self {
            headers: config
                .headers
                .api_headers()
                .into_iter()
                .map(|(name, value)| (name.to_string(), value))
                .collect(),
            timeout: config.request_timeout,
            max_requests_per_second: config.max_requests_per_second,
            max_redirects: 10,
        }
    }
}

/// Rate-limited client that never treats an HTTP status as a transport error
pub struct HttpClient {
    client: Client,
    rate_limiter: RateLimiter<NotKeyed, InMemoryState, DefaultClock>,
}

impl HttpClient {
    pub fn new(config: HttpClientConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        for (name, value) in &config.headers {
            headers.insert(
                HeaderName::from_bytes(name.as_bytes()).with_context(|| format!("Invalid header name: {name}"))?,
                HeaderValue::from_str(value).with_context(|| format!("Invalid value for header {name}"))?,
            );
        }

        let client = Client::builder()
            .timeout(config.timeout)
            .default_headers(headers)
            .cookie_store(true)
            .gzip(true)
            .brotli(true)
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .build()
            .context("Failed to create HTTP client")?;

        let quota = Quota::per_second(
            NonZeroU32::new(config.max_requests_per_second).context("Rate limit must be greater than 0")?,
        );

        Ok(Self {
            client,
            rate_limiter: RateLimiter::direct(quota),
        })
    }

    /// Fetch a URL and return status and body, whatever the status
    pub async fn fetch(&self, url: &str, cancellation_token: &CancellationToken) -> Result<StaticPage> {
        if cancellation_token.is_cancelled() {
            anyhow::bail!("Request cancelled before starting");
        }

        tokio::select! {
            () = self.rate_limiter.until_ready() => {},
            () = cancellation_token.cancelled() => {
                anyhow::bail!("Request cancelled during rate limiting");
            }
        }

        tracing::debug!("Fetching URL: {}", url);

        let response = tokio::select! {
            result = self.client.get(url).send() => {
                result.with_context(|| format!("Failed to fetch URL: {url}"))?
            },
            () = cancellation_token.cancelled() => {
                tracing::warn!("HTTP request cancelled for URL: {}", url);
                anyhow::bail!("HTTP request cancelled");
            }
        };

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .with_context(|| format!("Failed to read response body from: {url}"))?;

        tracing::debug!("Fetched {} ({}, {} chars)", url, status, body.len());
        Ok(StaticPage { status, body })
    }

    /// Fetch a URL and decode its JSON body; non-success statuses are errors
    pub async fn get_json(&self, url: &str, cancellation_token: &CancellationToken) -> Result<serde_json::Value> {
        let page = self.fetch(url, cancellation_token).await?;
        if !page.is_success() {
            anyhow::bail!("HTTP request failed with status {}: {}", page.status, url);
        }
        serde_json::from_str(&page.body).with_context(|| format!("Response from {url} is not valid JSON"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_http_client_creation() {
        let client = HttpClient::new(HttpClientConfig::default());
        assert!(client.is_ok());
    }

    #[test]
    fn test_config_carries_header_overrides() {
        let mut importer = ImporterConfig::default();
        importer.headers.referer = Some("https://app.getcollectr.com/".into());
        importer.max_requests_per_second = 1;

        let config = HttpClientConfig::from(&importer);
        assert_eq!(config.max_requests_per_second, 1);
        assert!(config.headers.iter().any(|(name, value)| name == "referer" && value == "https://app.getcollectr.com/"));
        assert!(HttpClient::new(config).is_ok());
    }

    #[test]
    fn test_invalid_header_value_is_rejected() {
        let config = HttpClientConfig {
            headers: vec![("authorization".into(), "bad\nvalue".into())],
            ..HttpClientConfig::default()
        };
        assert!(HttpClient::new(config).is_err());
    }

    #[tokio::test]
    async fn test_cancelled_token_short_circuits() {
        let client = HttpClient::new(HttpClientConfig::default()).unwrap();
        let token = CancellationToken::new();
        token.cancel();
        let err = client.fetch("https://app.getcollectr.com/", &token).await.unwrap_err();
        assert!(err.to_string().contains("cancelled"));
    }
}
