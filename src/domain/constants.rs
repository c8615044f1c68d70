//! Site characteristics and reconciliation constants
//!
//! Fixed properties of the Collectr showcase site and the catalog-matching
//! limits. Tunables that operators may override live in
//! [`crate::infrastructure::config`]; these are the defaults and hard bounds.

/// Collectr site characteristics
pub mod site {
    /// Host every showcase URL must point at
    pub const SHOWCASE_HOST: &str = "app.getcollectr.com";

    /// Base of the showcase data API
    pub const API_BASE: &str = "https://api-v2.getcollectr.com";

    /// Path fragment identifying showcase API responses
    pub const SHOWCASE_API_PATH: &str = "/data/showcase/";

    /// Identity token used when no username is configured
    pub const ANON_USERNAME: &str = "00000000-0000-0000-0000-000000000000";

    /// Local-storage key holding the page's own identity token
    pub const PAGE_TOKEN_STORAGE_KEY: &str = "collectrToken";
}

/// Paginated API walk bounds
pub mod api {
    pub const DEFAULT_PAGE_SIZE: u32 = 30;
    pub const MIN_PAGE_SIZE: u32 = 10;
    pub const MAX_PAGE_SIZE: u32 = 30;

    pub const DEFAULT_MAX_PAGES: u32 = 200;
    pub const MIN_MAX_PAGES: u32 = 1;
    pub const MAX_MAX_PAGES: u32 = 500;
}

/// Headless browser timings
pub mod browser {
    pub const VIEWPORT: (u32, u32) = (1280, 800);
    pub const NAVIGATION_TIMEOUT_SECS: u64 = 60;
    pub const SETTLE_DELAY_MS: u64 = 2000;
    pub const FINAL_SETTLE_DELAY_MS: u64 = 1000;

    pub const MAX_SCROLLS: u32 = 60;
    pub const SCROLL_DELAY_MS: u64 = 1200;
    pub const MAX_IDLE_ROUNDS: u32 = 4;

    /// Network is considered quiet after this long without a showcase response
    pub const NETWORK_QUIET_MS: u64 = 1000;
    pub const NETWORK_IDLE_TIMEOUT_SECS: u64 = 10;

    /// Upper bound of ancestor levels walked to find a card container
    pub const CARD_ROOT_MAX_DEPTH: usize = 14;

    pub const DESKTOP_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/121.0.0.0 Safari/537.36";
    pub const ACCEPT_LANGUAGE: &str = "en-US,en;q=0.9";
}

/// Raw item extraction
pub mod extraction {
    /// Default depth of the nested fallback field search
    pub const DEEP_SEARCH_DEPTH: usize = 4;

    /// Static pages shorter than this are treated as a blocked response
    pub const MIN_STATIC_HTML_LEN: usize = 1000;
}

/// Catalog matching limits
pub mod matching {
    /// External ids per catalog request
    pub const ID_BATCH_SIZE: usize = 400;

    /// Set ids per catalog request
    pub const SET_BATCH_SIZE: usize = 200;

    /// Candidates fetched per Japanese probe
    pub const JAPAN_CANDIDATE_LIMIT: u32 = 5;

    /// Grade id the showcase API reports for raw (ungraded) cards
    pub const DEFAULT_UNGRADED_GRADE_ID: &str = "52";

    pub const DEFAULT_CATALOG_CONCURRENCY: usize = 4;
}
