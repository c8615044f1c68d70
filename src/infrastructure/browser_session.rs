//! Headless browser session for the showcase page
//!
//! A session renders the page, replays the paginated API from inside it,
//! scrolls until the grid stops growing and finally snapshots the DOM. All
//! calls here block, so callers run [`capture`] on a blocking thread.

use std::collections::{BTreeMap, HashSet};
use std::ffi::OsStr;
use std::thread::sleep;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, anyhow};
use headless_chrome::{Browser, LaunchOptions, Tab};
use serde_json::Value;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{debug, info, warn};
use url::Url;

use crate::domain::constants::{api, browser, site};
use crate::domain::services::BrowserCapture;
use crate::domain::showcase_item::RawItem;
use crate::domain::showcase_url::ShowcaseTarget;
use crate::infrastructure::config::ImporterConfig;
use crate::infrastructure::dom_card_scraper::{CardSelectors, DomCardScraper};
use crate::infrastructure::page_scripts::{self, PageReplayParams};

const RESPONSE_HANDLER_NAME: &str = "showcase-responses";
const NETWORK_POLL_INTERVAL: Duration = Duration::from_millis(100);
const BROWSER_IDLE_TIMEOUT: Duration = Duration::from_secs(180);

/// Browser-related subset of the importer settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrowserSettings {
    pub headless: bool,
    pub scroll: bool,
    pub username: Option<String>,
    pub filters: Option<String>,
    pub page_headers: Vec<(&'static str, String)>,
    pub navigation_timeout: Duration,
}

impl From<&ImporterConfig> for BrowserSettings {
    fn from(config: &ImporterConfig) -> Self {
        Self {
            headless: config.headless,
            scroll: config.scroll,
            username: config.username.clone(),
            filters: config.filters.clone(),
            page_headers: config.headers.page_headers(),
            navigation_timeout: Duration::from_secs(browser::NAVIGATION_TIMEOUT_SECS),
        }
    }
}

impl Default for BrowserSettings {
    fn default() -> Self {
        Self::from(&ImporterConfig::default())
    }
}

/// What the response watcher reports from the browser's event thread
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NetworkEvent {
    /// Any response reached the page
    Activity,
    /// Body of a showcase API response for this profile
    ShowcaseResponse { url: String, body: String },
}

/// Successful JSON responses of `profile_id`'s showcase API
pub fn is_showcase_response(profile_id: &str, url: &str, status: u32, mime_type: &str) -> bool {
    url.contains(site::SHOWCASE_API_PATH)
        && url.contains(profile_id)
        && (200..300).contains(&status)
        && mime_type.contains("application/json")
}

/// Showcase API responses observed by the page, folded from [`NetworkEvent`]s
#[derive(Debug)]
pub struct NetworkCollector {
    items: Vec<RawItem>,
    seen_offsets: HashSet<String>,
    last_activity: Instant,
}

impl Default for NetworkCollector {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            seen_offsets: HashSet::new(),
            last_activity: Instant::now(),
        }
    }
}

impl NetworkCollector {
    pub fn quiet_for(&self) -> Duration {
        self.last_activity.elapsed()
    }

    /// Apply one event; returns the number of products added
    pub fn apply(&mut self, event: NetworkEvent) -> usize {
        self.last_activity = Instant::now();
        match event {
            NetworkEvent::Activity => 0,
            NetworkEvent::ShowcaseResponse { url, body } => {
                if !self.claim_offset(&url) {
                    return 0;
                }
                let added = self.record(&body);
                debug!("Intercepted {} products from {}", added, url);
                added
            }
        }
    }

    /// Reserve the page offset of `url`; false when it was already recorded
    fn claim_offset(&mut self, url: &str) -> bool {
        let offset = Url::parse(url)
            .ok()
            .and_then(|parsed| parsed.query_pairs().find(|(key, _)| key == "offset").map(|(_, v)| v.into_owned()))
            .filter(|offset| !offset.is_empty());
        match offset {
            Some(offset) => self.seen_offsets.insert(offset),
            None => true,
        }
    }

    fn record(&mut self, body: &str) -> usize {
        let Ok(payload) = serde_json::from_str::<Value>(body) else {
            return 0;
        };
        let Some(products) = ["/products", "/data/products"]
            .iter()
            .find_map(|pointer| payload.pointer(pointer).and_then(Value::as_array))
        else {
            return 0;
        };
        self.items.extend(products.iter().cloned());
        products.len()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn take_items(&mut self) -> Vec<RawItem> {
        std::mem::take(&mut self.items)
    }
}

/// Receiving end of the response watcher, owned by the capture loop
struct NetworkFeed {
    events: UnboundedReceiver<NetworkEvent>,
    collector: NetworkCollector,
}

impl NetworkFeed {
    fn new(events: UnboundedReceiver<NetworkEvent>) -> Self {
        Self {
            events,
            collector: NetworkCollector::default(),
        }
    }

    /// Fold every pending event; returns the item count afterwards
    fn drain(&mut self) -> usize {
        while let Ok(event) = self.events.try_recv() {
            self.collector.apply(event);
        }
        self.collector.len()
    }

    fn wait_for_quiet(&mut self) {
        let quiet = Duration::from_millis(browser::NETWORK_QUIET_MS);
        let deadline = Instant::now() + Duration::from_secs(browser::NETWORK_IDLE_TIMEOUT_SECS);
        while Instant::now() < deadline {
            self.drain();
            if self.collector.quiet_for() >= quiet {
                return;
            }
            sleep(NETWORK_POLL_INTERVAL);
        }
    }

    fn into_items(mut self) -> Vec<RawItem> {
        self.drain();
        self.collector.take_items()
    }
}

/// Owns the browser process. headless_chrome kills the process when the
/// `Browser` is dropped, which ends the session.
struct BrowserGuard {
    browser: Browser,
}

impl BrowserGuard {
    fn launch(settings: &BrowserSettings) -> Result<Self> {
        let options = LaunchOptions::default_builder()
            .headless(settings.headless)
            .sandbox(false)
            .window_size(Some(browser::VIEWPORT))
            .idle_browser_timeout(BROWSER_IDLE_TIMEOUT)
            .args(vec![
                OsStr::new("--disable-blink-features=AutomationControlled"),
                OsStr::new("--lang=en-US,en"),
            ])
            .build()
            .map_err(|e| anyhow!("Invalid browser launch options: {e}"))?;
        let browser = Browser::new(options).context("Failed to launch headless browser")?;
        debug!("Browser launched (headless: {})", settings.headless);
        Ok(Self { browser })
    }
}

/// Forward showcase responses to `events`. The handler keeps no state of
/// its own beyond the profile id it filters on.
fn watch_showcase_responses(tab: &Tab, profile_id: &str, events: UnboundedSender<NetworkEvent>) -> Result<()> {
    let profile_id = profile_id.to_string();
    tab.register_response_handling(
        RESPONSE_HANDLER_NAME,
        Box::new(move |params, fetch_body| {
            // The receiver is gone once the capture finished
            if events.send(NetworkEvent::Activity).is_err() {
                return;
            }
            let response = &params.response;
            if !is_showcase_response(&profile_id, &response.url, response.status, &response.mime_type) {
                return;
            }
            match fetch_body() {
                Ok(body) if body.base_64_encoded => {
                    debug!("Skipping encoded showcase response: {}", response.url);
                }
                Ok(body) => {
                    let _ = events.send(NetworkEvent::ShowcaseResponse {
                        url: response.url.clone(),
                        body: body.body,
                    });
                }
                Err(e) => debug!("Could not read showcase response body: {}", e),
            }
        }),
    )
    .context("Failed to register response handler")?;
    Ok(())
}

fn configure_tab(tab: &Tab, settings: &BrowserSettings) -> Result<()> {
    tab.set_default_timeout(settings.navigation_timeout);
    tab.set_user_agent(browser::DESKTOP_USER_AGENT, Some(browser::ACCEPT_LANGUAGE), None)
        .context("Failed to set user agent")?;
    let mut headers = std::collections::HashMap::new();
    headers.insert("accept-language", browser::ACCEPT_LANGUAGE);
    tab.set_extra_http_headers(headers).context("Failed to set extra headers")?;
    if let Err(e) = tab.enable_stealth_mode() {
        debug!("Stealth mode unavailable: {}", e);
    }
    Ok(())
}

/// Run the paginated walk with the page's own cookies and identity
fn replay_page_api(tab: &Tab, target: &ShowcaseTarget, settings: &BrowserSettings) -> Vec<RawItem> {
    let filters = settings
        .filters
        .as_deref()
        .or(target.collection_id.as_ref().map(|_| ""));
    let mut params = PageReplayParams::new(&target.profile_id);
    params.collection_id = target.collection_id.as_deref();
    params.filters = filters;
    params.username = settings.username.as_deref();
    params.headers = settings
        .page_headers
        .iter()
        .map(|(name, value)| (*name, value.as_str()))
        .collect::<BTreeMap<_, _>>();

    let result = page_scripts::page_api_replay(&params)
        .and_then(|script| tab.evaluate(&script, true).context("Page API replay failed"))
        .and_then(|remote| {
            let text = remote
                .value
                .as_ref()
                .and_then(Value::as_str)
                .ok_or_else(|| anyhow!("Page API replay returned no data"))?;
            serde_json::from_str::<Vec<RawItem>>(text).context("Page API replay returned invalid JSON")
        });

    match result {
        Ok(items) => {
            debug!("Page API replay returned {} items", items.len());
            items
        }
        Err(e) => {
            warn!("Page API replay failed: {:#}", e);
            Vec::new()
        }
    }
}

fn dom_card_count(tab: &Tab, script: &str) -> u64 {
    tab.evaluate(script, false)
        .ok()
        .and_then(|remote| remote.value)
        .and_then(|value| value.as_u64())
        .unwrap_or(0)
}

/// Scroll until neither intercepted items nor rendered cards grow for a few
/// rounds
fn scroll_until_idle(tab: &Tab, feed: &mut NetworkFeed, count_script: &str) -> Result<()> {
    let mut idle_rounds = 0;
    let mut last_count = feed.drain();
    let mut last_dom_count = dom_card_count(tab, count_script);

    for round in 0..browser::MAX_SCROLLS {
        if idle_rounds >= browser::MAX_IDLE_ROUNDS {
            debug!("Scrolling stopped after {} rounds", round);
            break;
        }
        tab.evaluate(page_scripts::scroll_step(), false).context("Scroll step failed")?;
        sleep(Duration::from_millis(browser::SCROLL_DELAY_MS));
        feed.wait_for_quiet();

        let count = feed.drain();
        let dom_count = dom_card_count(tab, count_script);
        if count == last_count && dom_count == last_dom_count {
            idle_rounds += 1;
        } else {
            idle_rounds = 0;
            last_count = count;
            last_dom_count = dom_count;
        }
    }
    Ok(())
}

/// Render the showcase and collect everything the page exposes.
///
/// Blocking; the browser is closed before this returns.
pub fn capture(target: &ShowcaseTarget, settings: &BrowserSettings) -> Result<BrowserCapture> {
    let selectors = CardSelectors::default();
    let scraper = DomCardScraper::with_selectors(&selectors)?;
    let count_script = page_scripts::card_count(&selectors.card_names)?;

    let guard = BrowserGuard::launch(settings)?;
    let tab = guard.browser.new_tab().context("Failed to open browser tab")?;
    configure_tab(&tab, settings)?;

    let (events, receiver) = mpsc::unbounded_channel();
    watch_showcase_responses(&tab, &target.profile_id, events)?;
    let mut feed = NetworkFeed::new(receiver);

    info!("🌐 Rendering showcase page {}", target.url);
    tab.navigate_to(&target.url)
        .with_context(|| format!("Failed to navigate to {}", target.url))?
        .wait_until_navigated()
        .context("Showcase page did not finish loading")?;
    sleep(Duration::from_millis(browser::SETTLE_DELAY_MS));

    let page_api_items = replay_page_api(&tab, target, settings);

    let short_replay = (1..api::DEFAULT_PAGE_SIZE as usize).contains(&page_api_items.len());
    if settings.scroll && !short_replay {
        if let Err(e) = scroll_until_idle(&tab, &mut feed, &count_script) {
            warn!("Scrolling aborted: {:#}", e);
        }
    }
    sleep(Duration::from_millis(browser::FINAL_SETTLE_DELAY_MS));

    let page_html = match tab.get_content() {
        Ok(html) => Some(html),
        Err(e) => {
            warn!("Failed to read rendered page: {}", e);
            None
        }
    };
    let dom_items = page_html.as_deref().map(|html| scraper.scrape(html)).unwrap_or_default();
    let network_items = feed.into_items();

    info!(
        "Browser captured {} network, {} page API and {} DOM items",
        network_items.len(),
        page_api_items.len(),
        dom_items.len()
    );
    drop(tab);
    drop(guard);

    Ok(BrowserCapture {
        network_items,
        page_api_items,
        dom_items,
        page_html,
    })
}
