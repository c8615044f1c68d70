//! Configuration infrastructure
//!
//! Importer settings are read once per run from environment-style keys
//! (`COLLECTR_*`, `CATALOG_*`) through the `config` crate and then passed by
//! reference to every component. Nothing below the run entry point reads the
//! environment.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::domain::constants::{api, matching};
use crate::error::{ImportError, ImportResult};

/// Defaults for settings that have no counterpart in the domain constants
pub mod defaults {
    pub const API_USER_AGENT: &str = "Collectr Catalog Importer";
    pub const API_ACCEPT: &str = "application/json";
    pub const DEBUG_SAMPLE_LIMIT: usize = 3;
    pub const REQUEST_TIMEOUT_SECS: u64 = 30;
    pub const MAX_REQUESTS_PER_SECOND: u32 = 4;
    pub const LOG_LEVEL: &str = "info";
}

/// Request header overrides shared by API and page requests
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeaderOverrides {
    pub user_agent: Option<String>,
    pub accept: Option<String>,
    pub accept_language: Option<String>,
    /// Sent verbatim as the `authorization` header
    pub authorization: Option<String>,
    pub origin: Option<String>,
    pub referer: Option<String>,
}

impl HeaderOverrides {
    /// Header set for API and static page requests
    pub fn api_headers(&self) -> Vec<(&'static str, String)> {
        let mut headers = vec![
            (
                "user-agent",
                self.user_agent.clone().unwrap_or_else(|| defaults::API_USER_AGENT.to_string()),
            ),
            ("accept", self.accept.clone().unwrap_or_else(|| defaults::API_ACCEPT.to_string())),
        ];
        let optional = [
            ("accept-language", &self.accept_language),
            ("authorization", &self.authorization),
            ("origin", &self.origin),
            ("referer", &self.referer),
        ];
        headers.extend(optional.into_iter().filter_map(|(name, value)| value.clone().map(|v| (name, v))));
        headers
    }

    /// Extra headers for the browser session; the browser keeps its own
    /// user agent and origin
    pub fn page_headers(&self) -> Vec<(&'static str, String)> {
        [
            ("accept", &self.accept),
            ("accept-language", &self.accept_language),
            ("authorization", &self.authorization),
        ]
        .into_iter()
        .filter_map(|(name, value)| value.clone().map(|v| (name, v)))
        .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingSettings {
    pub level: String,
    pub json: bool,
    pub file: Option<PathBuf>,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: defaults::LOG_LEVEL.to_string(),
            json: false,
            file: None,
        }
    }
}

/// Immutable settings for one import run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImporterConfig {
    pub headers: HeaderOverrides,
    /// Items per API page, clamped to the range the API accepts
    pub api_page_size: u32,
    pub api_max_pages: u32,
    /// Identity token sent as `username`; anonymous when unset
    pub username: Option<String>,
    /// Raw `filters` query value; `Some("")` is distinct from unset
    pub filters: Option<String>,
    pub use_api: bool,
    pub use_browser: bool,
    pub scroll: bool,
    pub headless: bool,
    pub debug: bool,
    pub debug_limit: usize,
    pub ungraded_grade_id: String,
    pub request_timeout: Duration,
    pub max_requests_per_second: u32,
    pub catalog_concurrency: usize,
    pub logging: LoggingSettings,
    pub catalog_database_url: Option<String>,
}

impl Default for ImporterConfig {
    fn default() -> Self {
        Self {
            headers: HeaderOverrides::default(),
            api_page_size: api::DEFAULT_PAGE_SIZE,
            api_max_pages: api::DEFAULT_MAX_PAGES,
            username: None,
            filters: None,
            use_api: true,
            use_browser: true,
            scroll: true,
            headless: true,
            debug: false,
            debug_limit: defaults::DEBUG_SAMPLE_LIMIT,
            ungraded_grade_id: matching::DEFAULT_UNGRADED_GRADE_ID.to_string(),
            request_timeout: Duration::from_secs(defaults::REQUEST_TIMEOUT_SECS),
            max_requests_per_second: defaults::MAX_REQUESTS_PER_SECOND,
            catalog_concurrency: matching::DEFAULT_CATALOG_CONCURRENCY,
            logging: LoggingSettings::default(),
            catalog_database_url: None,
        }
    }
}

impl ImporterConfig {
    /// Read settings from the process environment
    pub fn from_env() -> ImportResult<Self> {
        Self::load(None)
    }

    /// Read settings from an explicit variable map instead of the process
    /// environment. Keys use the same names as the environment variables.
    pub fn from_map(vars: HashMap<String, String>) -> ImportResult<Self> {
        Self::load(Some(vars))
    }

    fn load(vars: Option<HashMap<String, String>>) -> ImportResult<Self> {
        let settings = config::Config::builder()
            .add_source(config::Environment::with_prefix("COLLECTR").source(vars.clone()))
            .add_source(config::Environment::with_prefix("CATALOG").source(vars))
            .build()
            .map_err(|e| ImportError::Configuration(e.to_string()))?;

        let text = |key: &str| -> Option<String> {
            settings
                .get_string(key)
                .ok()
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };
        let switch = |key: &str, default: bool| text(key).map_or(default, |value| !is_off(&value));
        let number = |key: &str| text(key).and_then(|value| value.parse::<u64>().ok());

        let defaults = Self::default();
        Ok(Self {
            headers: HeaderOverrides {
                user_agent: text("user_agent"),
                accept: text("accept"),
                accept_language: text("accept_language"),
                authorization: text("auth_token").or_else(|| text("authorization")),
                origin: text("origin"),
                referer: text("referer"),
            },
            api_page_size: clamp_u32(number("api_limit"), api::DEFAULT_PAGE_SIZE, api::MIN_PAGE_SIZE, api::MAX_PAGE_SIZE),
            api_max_pages: clamp_u32(
                number("api_max_pages"),
                api::DEFAULT_MAX_PAGES,
                api::MIN_MAX_PAGES,
                api::MAX_MAX_PAGES,
            ),
            username: text("username").or_else(|| text("anon_username")),
            // An empty filter is meaningful, so it bypasses the trimming filter
            filters: settings.get_string("filters").ok(),
            use_api: switch("use_api", defaults.use_api),
            use_browser: switch("use_browser", defaults.use_browser),
            scroll: switch("scroll", defaults.scroll),
            headless: switch("headless", defaults.headless),
            debug: switch("debug", defaults.debug),
            debug_limit: number("debug_limit").map_or(defaults.debug_limit, |n| usize::try_from(n).unwrap_or(usize::MAX)),
            ungraded_grade_id: text("ungraded_grade_id").unwrap_or(defaults.ungraded_grade_id),
            request_timeout: number("request_timeout_secs")
                .filter(|secs| *secs > 0)
                .map_or(defaults.request_timeout, Duration::from_secs),
            max_requests_per_second: number("max_requests_per_second")
                .and_then(|n| u32::try_from(n).ok())
                .filter(|n| *n > 0)
                .unwrap_or(defaults.max_requests_per_second),
            catalog_concurrency: number("catalog_concurrency")
                .and_then(|n| usize::try_from(n).ok())
                .filter(|n| *n > 0)
                .unwrap_or(defaults.catalog_concurrency),
            logging: LoggingSettings {
                level: text("log_level").unwrap_or(defaults.logging.level),
                json: switch("log_json", false),
                file: text("log_file").map(PathBuf::from),
            },
            catalog_database_url: text("database_url"),
        })
    }

    /// Catalog connection string, required before any run starts
    pub fn catalog_url(&self) -> ImportResult<&str> {
        self.catalog_database_url.as_deref().ok_or(ImportError::MissingCatalogCredentials)
    }

    /// Identity token for API requests, anonymous when none is configured
    pub fn api_username(&self) -> &str {
        self.username.as_deref().unwrap_or(crate::domain::constants::site::ANON_USERNAME)
    }
}

/// Switch values that turn a feature off; anything else leaves it on
fn is_off(value: &str) -> bool {
    matches!(value.to_ascii_lowercase().as_str(), "0" | "false" | "no" | "off")
}

fn clamp_u32(value: Option<u64>, default: u32, min: u32, max: u32) -> u32 {
    let value = value.and_then(|v| u32::try_from(v).ok()).unwrap_or(default);
    value.clamp(min, max)
}
