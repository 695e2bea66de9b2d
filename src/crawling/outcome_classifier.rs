//! Outcome Classifier
//!
//! Issues a search and polls the page until exactly one [`SearchOutcome`]
//! can be reported. Signals are evaluated in a fixed order on every tick:
//! login form, maintenance, blocked, "no products" banner, then a result
//! list or product page.

use futures::FutureExt;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::crawling::locators;
use crate::crawling::session_manager::dismiss_welcome_popup;
use crate::domain::errors::ItemError;
use crate::domain::outcome::SearchOutcome;
use crate::infrastructure::browser_driver::{BrowserSession, DriverResult, ElementRef, best_effort};
use crate::infrastructure::config::TimingConfig;
use crate::infrastructure::wait::{any_displayed, find_visible, poll_until};

const BLOCKED_TITLE_MARKERS: [&str; 2] = ["access denied", "captcha"];
const BLOCKED_URL_MARKERS: [&str; 2] = ["captcha", "blocked"];
const BLOCKED_SOURCE_MARKERS: [&str; 6] = [
    "recaptcha",
    "g-recaptcha",
    "verify you are human",
    "are you a robot",
    "access denied",
    "unusual traffic",
];

const MAINTENANCE_TITLE_MARKERS: [&str; 2] = ["maintenance", "service unavailable"];
const MAINTENANCE_SOURCE_MARKERS: [&str; 4] = [
    "maintenance",
    "temporarily unavailable",
    "service unavailable",
    "scheduled maintenance",
];

const OFFLINE_TITLE_MARKERS: [&str; 3] = ["no internet", "internet disconnected", "dns"];

/// Maximum clicks on the first search result
const RESULT_CLICK_TRIES: u32 = 3;

/// Lower-cased snapshot of the page identity used by the signal checks
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageState {
    pub url: String,
    pub title: String,
    pub source: String,
}

impl PageState {
    pub fn new(url: &str, title: &str, source: &str) -> Self {
        Self {
            url: url.to_lowercase(),
            title: title.to_lowercase(),
            source: source.to_lowercase(),
        }
    }

    /// Reads the current page. Lookup noise yields empty fields.
    pub async fn read<S>(session: &mut S) -> DriverResult<Self>
    where
        S: BrowserSession + ?Sized,
    {
        let url = best_effort(session.current_url().await)?;
        let title = best_effort(session.page_title().await)?;
        let source = best_effort(session.page_source().await)?;
        Ok(Self::new(&url, &title, &source))
    }

    pub fn is_blocked(&self) -> bool {
        contains_any(&self.title, &BLOCKED_TITLE_MARKERS)
            || contains_any(&self.url, &BLOCKED_URL_MARKERS)
            || contains_any(&self.source, &BLOCKED_SOURCE_MARKERS)
    }

    pub fn is_maintenance(&self) -> bool {
        contains_any(&self.title, &MAINTENANCE_TITLE_MARKERS)
            || self.url.contains("maintenance")
            || contains_any(&self.source, &MAINTENANCE_SOURCE_MARKERS)
    }

    pub fn is_offline(&self) -> bool {
        self.url.starts_with("chrome-error://") || contains_any(&self.title, &OFFLINE_TITLE_MARKERS)
    }
}

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|needle| haystack.contains(needle))
}

/// What one poll tick observed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Tick {
    Resolved(SearchOutcome),
    ResultList,
    ProductVisible,
}

enum Readiness {
    Ready(ElementRef),
    Resolved(SearchOutcome),
}

/// Reads the page identity at most once per tick.
async fn page_state<'p, S>(session: &mut S, cached: &'p mut Option<PageState>) -> DriverResult<&'p PageState>
where
    S: BrowserSession + ?Sized,
{
    if cached.is_none() {
        *cached = Some(PageState::read(session).await?);
    }
    Ok(cached.get_or_insert_with(PageState::default))
}

/// Whether the page currently shows the signal for `outcome`.
async fn signal_present<S>(session: &mut S, outcome: SearchOutcome, page: &mut Option<PageState>) -> DriverResult<bool>
where
    S: BrowserSession + ?Sized,
{
    Ok(match outcome {
        SearchOutcome::LoginRequired => best_effort(session.find_displayed(locators::LOGIN_EMAIL).await)?.is_some(),
        SearchOutcome::Maintenance => page_state(session, page).await?.is_maintenance(),
        SearchOutcome::Blocked => page_state(session, page).await?.is_blocked(),
        SearchOutcome::NoProductsFound => any_displayed(session, &locators::NO_PRODUCTS_BANNERS).await?,
        SearchOutcome::Opened => {
            !best_effort(session.find_all(locators::RESULT_LINK).await)?.is_empty()
                || any_displayed(session, &[locators::PRODUCT_NAME, locators::ADD_TO_CART]).await?
        }
    })
}

/// Site-level signals (login form, maintenance, block page) in precedence order.
async fn site_signal<S>(session: &mut S) -> DriverResult<Option<SearchOutcome>>
where
    S: BrowserSession + ?Sized,
{
    let mut page = None;
    for outcome in SearchOutcome::PRECEDENCE {
        if !outcome.is_site_signal() {
            continue;
        }
        if signal_present(session, outcome, &mut page).await? {
            return Ok(Some(outcome));
        }
    }
    Ok(None)
}

async fn poll_tick<S>(session: &mut S) -> DriverResult<Option<Tick>>
where
    S: BrowserSession + ?Sized,
{
    let mut page = None;
    for outcome in SearchOutcome::PRECEDENCE {
        if !signal_present(session, outcome, &mut page).await? {
            continue;
        }
        if outcome != SearchOutcome::Opened {
            return Ok(Some(Tick::Resolved(outcome)));
        }
        if !best_effort(session.find_all(locators::RESULT_LINK).await)?.is_empty() {
            return Ok(Some(Tick::ResultList));
        }
        return Ok(Some(Tick::ProductVisible));
    }
    Ok(None)
}

/// Search-and-classify for one identifier
#[derive(Debug, Clone)]
pub struct OutcomeClassifier {
    timing: TimingConfig,
    base_url: String,
}

impl OutcomeClassifier {
    pub fn new(timing: TimingConfig, base_url: impl Into<String>) -> Self {
        Self {
            timing,
            base_url: base_url.into(),
        }
    }

    pub const fn timing(&self) -> &TimingConfig {
        &self.timing
    }

    /// Refreshes once when the browser shows its offline page.
    pub async fn ensure_online<S>(&self, session: &mut S) -> Result<(), ItemError>
    where
        S: BrowserSession + ?Sized,
    {
        if !PageState::read(session).await?.is_offline() {
            return Ok(());
        }
        warn!("🌐 Browser appears offline, refreshing");
        best_effort(session.refresh().await)?;
        best_effort(session.wait_until_loaded(self.timing.page_ready_timeout()).await)?;

        if PageState::read(session).await?.is_offline() {
            return Err(ItemError::Transient {
                message: "Browser is offline after refresh.".into(),
            });
        }
        Ok(())
    }

    /// Searches for `identifier` and classifies where the browser ends up.
    ///
    /// Each attempt that sees no terminal signal within the search timeout
    /// is repeated; after the last one the item counts as not found.
    pub async fn search<S>(&self, session: &mut S, identifier: &str) -> Result<SearchOutcome, ItemError>
    where
        S: BrowserSession + ?Sized,
    {
        let attempts = self.timing.search_attempts.max(1);
        for attempt in 1..=attempts {
            if let Some(outcome) = self.attempt(session, identifier).await? {
                debug!("Search for {} resolved to {:?}", identifier, outcome);
                return Ok(outcome);
            }
            warn!(
                "⏱️ No result signal for {} within {:?} (attempt {}/{})",
                identifier,
                self.timing.search_timeout(),
                attempt,
                attempts
            );
        }
        Ok(SearchOutcome::NoProductsFound)
    }

    async fn attempt<S>(&self, session: &mut S, identifier: &str) -> Result<Option<SearchOutcome>, ItemError>
    where
        S: BrowserSession + ?Sized,
    {
        best_effort(session.wait_until_loaded(self.timing.page_ready_timeout()).await)?;

        let search_box = match self.ensure_search_ready(session).await? {
            Readiness::Ready(element) => element,
            Readiness::Resolved(outcome) => return Ok(Some(outcome)),
        };

        session.clear(&search_box).await?;
        session.type_text(&search_box, identifier).await?;
        let url_before = best_effort(session.current_url().await)?;
        session.press_enter(&search_box).await?;
        sleep(self.timing.resubmit_after()).await;

        let url_after = best_effort(session.current_url().await)?;
        if url_after == url_before {
            info!("↪️ No navigation after submit for {}, resubmitting once", identifier);
            if let Err(e) = session.submit_form(&search_box).await {
                if e.is_session_invalid() {
                    return Err(e.into());
                }
                debug!("Forced resubmit failed: {}", e);
            }
        }

        let tick = poll_until(
            session,
            self.timing.search_timeout(),
            self.timing.poll_interval(),
            |s| poll_tick(s).boxed(),
        )
        .await?;

        match tick {
            None => Ok(None),
            Some(Tick::Resolved(outcome)) => Ok(Some(outcome)),
            Some(Tick::ResultList) => self.open_first_result(session).await.map(Some),
            Some(Tick::ProductVisible) => {
                best_effort(session.wait_until_loaded(self.timing.page_ready_timeout()).await)?;
                Ok(Some(SearchOutcome::Opened))
            }
        }
    }

    async fn search_box<S>(&self, session: &mut S) -> DriverResult<Option<ElementRef>>
    where
        S: BrowserSession + ?Sized,
    {
        let (glance, tick) = (self.timing.short_field_timeout(), self.timing.poll_interval());
        if let Some(element) = find_visible(session, locators::SEARCH_BOX, glance, tick).await? {
            return Ok(Some(element));
        }
        find_visible(session, locators::SEARCH_BOX_ALT, glance, tick).await
    }

    async fn ensure_search_ready<S>(&self, session: &mut S) -> Result<Readiness, ItemError>
    where
        S: BrowserSession + ?Sized,
    {
        if let Some(element) = self.search_box(session).await? {
            return Ok(Readiness::Ready(element));
        }

        debug!("Search box not visible, returning to the storefront home");
        session.navigate(&self.base_url).await?;
        best_effort(session.wait_until_loaded(self.timing.page_ready_timeout()).await)?;
        dismiss_welcome_popup(session, &self.timing).await?;

        if let Some(element) = self.search_box(session).await? {
            return Ok(Readiness::Ready(element));
        }
        if let Some(outcome) = site_signal(session).await? {
            return Ok(Readiness::Resolved(outcome));
        }
        Err(ItemError::Transient {
            message: "Search input not available after recovery.".into(),
        })
    }

    /// Clicks the first result link. A link that cannot be opened counts as
    /// no product found; only session loss is raised.
    async fn open_first_result<S>(&self, session: &mut S) -> Result<SearchOutcome, ItemError>
    where
        S: BrowserSession + ?Sized,
    {
        for attempt in 1..=RESULT_CLICK_TRIES {
            let links = best_effort(session.find_all(locators::RESULT_LINK).await)?;
            let clicked = match links.first() {
                Some(first) => session.click(first).await,
                None => Ok(()),
            };
            match clicked {
                Ok(()) if !links.is_empty() => {
                    best_effort(session.wait_until_loaded(self.timing.page_ready_timeout()).await)?;
                    return Ok(SearchOutcome::Opened);
                }
                Ok(()) => debug!("Result list vanished (try {}/{})", attempt, RESULT_CLICK_TRIES),
                Err(e) if e.is_session_invalid() => return Err(e.into()),
                Err(e) => debug!("First result click failed (try {}/{}): {}", attempt, RESULT_CLICK_TRIES, e),
            }
            sleep(self.timing.poll_interval()).await;
        }
        warn!("🔗 Could not open the first search result");
        Ok(SearchOutcome::NoProductsFound)
    }
}
