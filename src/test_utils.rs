//! Test utilities
//!
//! A scripted in-memory storefront implementing the browser seam. Each
//! identifier can be given a sequence of pages that successive searches land
//! on (the last entry repeats). Faults can be queued per driver operation and
//! every interesting interaction is written to an op log for assertions.

use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use async_trait::async_trait;

use crate::crawling::locators as L;
use crate::domain::outcome::AddToCartState;
use crate::infrastructure::browser_driver::{BrowserDriver, BrowserSession, DriverError, DriverResult, ElementRef, Locator};
use crate::infrastructure::config::{AppConfig, SiteConfig, TimingConfig};

/// Product page fixture
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FakeProduct {
    pub name: Option<String>,
    pub item_number: Option<String>,
    pub upc: Option<String>,
    pub vendor_item_number: Option<String>,
    pub case_pack: Option<String>,
    pub description: Option<String>,
    pub price: Option<String>,
    pub fallback_price: Option<String>,
    pub msrp_pricing: Option<String>,
    pub stock: Option<String>,
    pub out_of_stock_label: Option<String>,
    pub spec_rows: Vec<(String, String)>,
    pub add_to_cart: AddToCartState,
    pub variant_select: bool,
}

pub fn sample_product() -> FakeProduct {
    FakeProduct {
        name: Some("Garden Gnome".into()),
        item_number: Some("GN-1001".into()),
        upc: Some("012345678912".into()),
        vendor_item_number: Some("V-77".into()),
        case_pack: Some("12".into()),
        description: Some("Hand painted resin gnome".into()),
        price: Some("$12.99".into()),
        fallback_price: None,
        msrp_pricing: Some("$19.99".into()),
        stock: Some("In Stock: 25".into()),
        out_of_stock_label: None,
        spec_rows: vec![
            ("Brand Name".into(), "Acme".into()),
            ("Primary Color".into(), "Red".into()),
            ("Prop65Applies".into(), "No".into()),
        ],
        add_to_cart: AddToCartState::Enabled,
        variant_select: false,
    }
}

/// Pages the fake storefront can show
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FakePage {
    /// Header only; no result signal ever appears
    Blank,
    Home,
    LoginForm,
    NoResults,
    ResultsList,
    Product(FakeProduct),
    Blocked { with_no_results_banner: bool },
    Maintenance,
    Offline,
}

impl FakePage {
    const fn has_header(&self) -> bool {
        matches!(
            self,
            Self::Blank | Self::Home | Self::NoResults | Self::ResultsList | Self::Product(_)
        )
    }

    fn url_for(&self, identifier: &str) -> String {
        let base = FakeSite::BASE_URL;
        match self {
            Self::Blank | Self::NoResults | Self::ResultsList => format!("{base}search?search={identifier}"),
            Self::Home => base.to_string(),
            Self::LoginForm => format!("{base}account/login"),
            Self::Product(_) => format!("{base}product/{identifier}"),
            Self::Blocked { .. } => format!("{base}captcha?search={identifier}"),
            Self::Maintenance => format!("{base}maintenance"),
            Self::Offline => "chrome-error://chromewebdata/".to_string(),
        }
    }

    fn title(&self) -> String {
        match self {
            Self::Product(p) => p.name.clone().unwrap_or_else(|| "Product".into()),
            Self::LoginForm => "Log in".into(),
            Self::Blocked { .. } => "Just a moment...".into(),
            Self::Maintenance => "Scheduled Maintenance".into(),
            Self::Offline => "No internet".into(),
            _ => "Shop".into(),
        }
    }

    fn source(&self) -> String {
        match self {
            Self::Blocked { .. } => "<html><div class=\"g-recaptcha\"></div></html>".into(),
            Self::Maintenance => "<html><h1>We'll be back soon</h1></html>".into(),
            _ => "<html><body>shop</body></html>".into(),
        }
    }
}

#[derive(Debug, Clone)]
struct Force {
    seq: u64,
    page: FakePage,
    log_out: bool,
}

#[derive(Debug)]
struct SiteState {
    scripts: HashMap<String, VecDeque<FakePage>>,
    default_page: FakePage,
    ops: Vec<(Instant, String)>,
    faults: HashMap<String, VecDeque<DriverError>>,
    force: Option<Force>,
    ignore_enter: bool,
    welcome_popup: bool,
    remember_login: bool,
    broken_menu: bool,
    sticky_offline: bool,
    expired: bool,
    snapshot_delay: Option<Duration>,
    opened: usize,
    closed: usize,
    logins: usize,
}

/// Shared storefront behind every fake session
#[derive(Debug, Clone)]
pub struct FakeSite {
    state: Arc<Mutex<SiteState>>,
}

impl Default for FakeSite {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeSite {
    pub const BASE_URL: &'static str = "https://shop.test/";

    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(SiteState {
                scripts: HashMap::new(),
                default_page: FakePage::NoResults,
                ops: Vec::new(),
                faults: HashMap::new(),
                force: None,
                ignore_enter: false,
                welcome_popup: false,
                remember_login: false,
                broken_menu: false,
                sticky_offline: false,
                expired: false,
                snapshot_delay: None,
                opened: 0,
                closed: 0,
                logins: 0,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SiteState> {
        self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Pages successive searches for `identifier` land on
    pub fn script<I: IntoIterator<Item = FakePage>>(&self, identifier: &str, pages: I) {
        self.lock().scripts.insert(identifier.to_string(), pages.into_iter().collect());
    }

    /// Queues one failure for the next call of `op`
    pub fn fail_next(&self, op: &str, error: DriverError) {
        self.lock().faults.entry(op.to_string()).or_default().push_back(error);
    }

    pub fn ignore_enter(&self) {
        self.lock().ignore_enter = true;
    }

    pub fn with_welcome_popup(&self) {
        self.lock().welcome_popup = true;
    }

    pub fn start_logged_in(&self) {
        self.lock().remember_login = true;
    }

    pub fn break_account_menu(&self) {
        self.lock().broken_menu = true;
    }

    /// Screenshots take `delay` before they are written
    pub fn slow_snapshots(&self, delay: Duration) {
        self.lock().snapshot_delay = Some(delay);
    }

    /// Every live session shows `page` from its next call on
    pub fn show(&self, page: FakePage) {
        self.force(page, false);
    }

    /// Offline page that one refresh clears
    pub fn go_offline(&self) {
        self.force(FakePage::Offline, false);
    }

    /// Offline page that survives refreshes
    pub fn stay_offline(&self) {
        self.lock().sticky_offline = true;
        self.force(FakePage::Offline, false);
    }

    /// Logs every session out; navigation lands on the login form until a login
    pub fn expire_login(&self) {
        self.lock().expired = true;
        self.force(FakePage::LoginForm, true);
    }

    fn force(&self, page: FakePage, log_out: bool) {
        let mut state = self.lock();
        let seq = state.force.as_ref().map_or(1, |f| f.seq + 1);
        state.force = Some(Force { seq, page, log_out });
    }

    pub fn ops(&self) -> Vec<String> {
        self.lock().ops.iter().map(|(_, op)| op.clone()).collect()
    }

    /// Time of the first occurrence of `op`
    pub fn op_time(&self, op: &str) -> Option<Instant> {
        self.lock().ops.iter().find(|(_, o)| o == op).map(|(at, _)| *at)
    }

    pub fn sessions_opened(&self) -> usize {
        self.lock().opened
    }

    pub fn sessions_closed(&self) -> usize {
        self.lock().closed
    }

    pub fn logins(&self) -> usize {
        self.lock().logins
    }

    fn record(&self, op: impl Into<String>) {
        self.lock().ops.push((Instant::now(), op.into()));
    }

    fn fault(&self, op: &str) -> DriverResult<()> {
        match self.lock().faults.get_mut(op).and_then(VecDeque::pop_front) {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    fn next_page(&self, identifier: &str) -> FakePage {
        let mut state = self.lock();
        let default = state.default_page.clone();
        match state.scripts.get_mut(identifier) {
            Some(queue) if queue.len() > 1 => queue.pop_front().unwrap_or(default),
            Some(queue) => queue.front().cloned().unwrap_or(default),
            None => default,
        }
    }
}

/// Driver over a [`FakeSite`]
#[derive(Debug, Clone)]
pub struct FakeDriver {
    site: FakeSite,
}

impl FakeDriver {
    pub const fn new(site: FakeSite) -> Self {
        Self { site }
    }
}

#[async_trait]
impl BrowserDriver for FakeDriver {
    type Session = FakeSession;

    async fn open_session(&self) -> DriverResult<FakeSession> {
        self.site.fault("open_session")?;
        let logged_in = {
            let mut state = self.site.lock();
            state.opened += 1;
            state.remember_login
        };
        self.site.record("open_session");
        Ok(FakeSession {
            site: self.site.clone(),
            page: FakePage::Blank,
            url: "about:blank".into(),
            last_search: String::new(),
            search_text: String::new(),
            logged_in,
            menu_open: false,
            popup_visible: false,
            email_typed: false,
            password_typed: false,
            seen_force: self.site.lock().force.as_ref().map_or(0, |f| f.seq),
            closed: false,
        })
    }
}

/// One fake browser tab
#[derive(Debug)]
pub struct FakeSession {
    site: FakeSite,
    page: FakePage,
    url: String,
    last_search: String,
    search_text: String,
    logged_in: bool,
    menu_open: bool,
    popup_visible: bool,
    email_typed: bool,
    password_typed: bool,
    seen_force: u64,
    closed: bool,
}

fn id_of(locator: Locator) -> String {
    locator.to_string()
}

impl FakeSession {
    /// Applies any page forced by the test since the last call.
    fn sync(&mut self, op: &str) -> DriverResult<()> {
        let force = self.site.lock().force.clone();
        if let Some(force) = force.filter(|f| f.seq > self.seen_force) {
            self.seen_force = force.seq;
            if force.log_out {
                self.logged_in = false;
            }
            self.url = force.page.url_for(&self.last_search);
            self.page = force.page;
            self.menu_open = false;
        }
        if self.closed {
            return Err(DriverError::SessionInvalid("session already closed".into()));
        }
        self.site.fault(op)
    }

    fn go(&mut self, page: FakePage) {
        self.url = page.url_for(&self.last_search);
        self.page = page;
        self.menu_open = false;
    }

    fn visible(&self) -> Vec<(Locator, String)> {
        let broken_menu = self.site.lock().broken_menu;
        let mut els = Vec::new();
        if self.popup_visible {
            els.push((L::WELCOME_POPUP, "Welcome".to_string()));
            els.push((L::ACCEPT_ALL, "Accept all".to_string()));
        }
        if self.page.has_header() {
            els.push((L::ACCOUNT_ICON, "Account".to_string()));
            els.push((L::SEARCH_BOX, self.search_text.clone()));
            if self.menu_open && !broken_menu {
                if self.logged_in {
                    els.push((L::ALREADY_LOGGED_IN, "Welcome back".to_string()));
                    els.push((L::LOGOUT, "Log out".to_string()));
                } else {
                    els.push((L::LOGIN_LINK, "Log in".to_string()));
                }
            }
        }
        match &self.page {
            FakePage::LoginForm => {
                els.push((L::LOGIN_EMAIL, String::new()));
                els.push((L::LOGIN_PASSWORD, String::new()));
                els.push((L::LOGIN_SUBMIT, "Log in".to_string()));
            }
            FakePage::NoResults => els.push((L::NO_PRODUCTS_BANNERS[0], "No products found".to_string())),
            FakePage::Blocked {
                with_no_results_banner: true,
            } => els.push((L::NO_PRODUCTS_BANNERS[0], "No products found".to_string())),
            FakePage::Product(p) => {
                let fields = [
                    (L::PRODUCT_NAME, &p.name),
                    (L::ITEM_NUMBER, &p.item_number),
                    (L::PRODUCT_UPC, &p.upc),
                    (L::VENDOR_ITEM_NUMBER, &p.vendor_item_number),
                    (L::CASE_PACK, &p.case_pack),
                    (L::DESCRIPTION, &p.description),
                    (L::PRICE, &p.price),
                    (L::PRICE_FALLBACK, &p.fallback_price),
                    (L::MSRP_PRICING, &p.msrp_pricing),
                    (L::STOCK, &p.stock),
                    (L::OUT_OF_STOCK, &p.out_of_stock_label),
                ];
                for (locator, value) in fields {
                    if let Some(text) = value {
                        els.push((locator, text.clone()));
                    }
                }
                if !p.spec_rows.is_empty() {
                    els.push((L::SPEC_TABLE_BODY, String::new()));
                }
                if p.add_to_cart != AddToCartState::Missing {
                    els.push((L::ADD_TO_CART, "Add to Cart".to_string()));
                }
                if p.variant_select {
                    els.push((L::VARIANT_SELECT, String::new()));
                }
            }
            _ => {}
        }
        els
    }

    fn product(&self) -> Option<&FakeProduct> {
        match &self.page {
            FakePage::Product(p) => Some(p),
            _ => None,
        }
    }

    fn text_of(&self, element: &ElementRef) -> Option<String> {
        if let Some(rest) = element.0.strip_prefix("spec:") {
            let mut parts = rest.splitn(2, ':');
            let index: usize = parts.next()?.parse().ok()?;
            let (label, value) = self.product()?.spec_rows.get(index)?;
            return match parts.next() {
                Some("label") => Some(label.clone()),
                Some("value") => Some(value.clone()),
                _ => Some(format!("{label} {value}")),
            };
        }
        if let Some(index) = element.0.strip_prefix("result:") {
            return matches!(self.page, FakePage::ResultsList).then(|| format!("Result {index}"));
        }
        self.visible()
            .into_iter()
            .find(|(locator, _)| id_of(*locator) == element.0)
            .map(|(_, text)| text)
    }

    fn perform_search(&mut self) {
        let identifier = self.search_text.trim().to_string();
        self.last_search = identifier.clone();
        let (expired, sticky_offline) = {
            let state = self.site.lock();
            (state.expired, state.sticky_offline)
        };
        let page = if sticky_offline {
            FakePage::Offline
        } else if expired && !self.logged_in {
            FakePage::LoginForm
        } else {
            self.site.next_page(&identifier)
        };
        self.go(page);
    }
}

#[async_trait]
impl BrowserSession for FakeSession {
    async fn navigate(&mut self, url: &str) -> DriverResult<()> {
        self.sync("navigate")?;
        self.site.record("navigate");
        let (expired, sticky_offline, welcome_popup) = {
            let state = self.site.lock();
            (state.expired, state.sticky_offline, state.welcome_popup)
        };
        let page = if sticky_offline {
            FakePage::Offline
        } else if expired && !self.logged_in {
            FakePage::LoginForm
        } else {
            FakePage::Home
        };
        self.popup_visible = welcome_popup && page == FakePage::Home;
        self.go(page);
        if self.page == FakePage::Home {
            self.url = url.to_string();
        }
        Ok(())
    }

    async fn refresh(&mut self) -> DriverResult<()> {
        self.sync("refresh")?;
        self.site.record("refresh");
        let sticky_offline = self.site.lock().sticky_offline;
        if self.page == FakePage::Offline && !sticky_offline {
            self.go(FakePage::Home);
        }
        Ok(())
    }

    async fn wait_until_loaded(&mut self, _timeout: Duration) -> DriverResult<bool> {
        self.sync("wait_until_loaded")?;
        Ok(true)
    }

    async fn find_displayed(&mut self, locator: Locator) -> DriverResult<Option<ElementRef>> {
        self.sync("find_displayed")?;
        Ok(self
            .visible()
            .into_iter()
            .find(|(l, _)| *l == locator)
            .map(|(l, _)| ElementRef(id_of(l))))
    }

    async fn find_all(&mut self, locator: Locator) -> DriverResult<Vec<ElementRef>> {
        self.sync("find_all")?;
        let ids = match locator {
            L::RESULT_LINK if self.page == FakePage::ResultsList => {
                vec![ElementRef("result:0".into()), ElementRef("result:1".into())]
            }
            L::SPEC_ROWS => self
                .product()
                .map(|p| (0..p.spec_rows.len()).map(|i| ElementRef(format!("spec:{i}"))).collect())
                .unwrap_or_default(),
            _ => self
                .visible()
                .into_iter()
                .filter(|(l, _)| *l == locator)
                .map(|(l, _)| ElementRef(id_of(l)))
                .collect(),
        };
        Ok(ids)
    }

    async fn find_within(&mut self, parent: &ElementRef, locator: Locator) -> DriverResult<Option<ElementRef>> {
        self.sync("find_within")?;
        let suffix = match locator {
            L::SPEC_LABEL => "label",
            L::SPEC_VALUE => "value",
            _ => return Ok(None),
        };
        Ok(parent
            .0
            .starts_with("spec:")
            .then(|| ElementRef(format!("{}:{suffix}", parent.0))))
    }

    async fn click(&mut self, element: &ElementRef) -> DriverResult<()> {
        self.sync("click")?;
        let id = element.0.as_str();
        if id == id_of(L::ACCEPT_ALL) {
            self.popup_visible = false;
            self.site.lock().welcome_popup = false;
            self.site.record("popup_dismissed");
        } else if id == id_of(L::ACCOUNT_ICON) {
            self.menu_open = true;
        } else if id == id_of(L::LOGIN_LINK) {
            self.go(FakePage::LoginForm);
        } else if id == id_of(L::LOGOUT) {
            self.logged_in = false;
            self.site.record("logout");
            self.go(FakePage::Home);
        } else if id == id_of(L::LOGIN_SUBMIT) {
            if self.email_typed && self.password_typed {
                self.logged_in = true;
                {
                    let mut state = self.site.lock();
                    state.logins += 1;
                    state.expired = false;
                }
                self.site.record("login");
                self.go(FakePage::Home);
                self.url = FakeSite::BASE_URL.to_string();
            }
        } else if id.starts_with("result:") {
            self.go(FakePage::Product(sample_product()));
        }
        Ok(())
    }

    async fn clear(&mut self, element: &ElementRef) -> DriverResult<()> {
        self.sync("clear")?;
        if element.0 == id_of(L::SEARCH_BOX) {
            self.search_text.clear();
        }
        Ok(())
    }

    async fn type_text(&mut self, element: &ElementRef, text: &str) -> DriverResult<()> {
        self.sync("type_text")?;
        let id = element.0.as_str();
        if id == id_of(L::SEARCH_BOX) {
            self.search_text.push_str(text);
        } else if id == id_of(L::LOGIN_EMAIL) {
            self.email_typed = !text.is_empty();
        } else if id == id_of(L::LOGIN_PASSWORD) {
            self.password_typed = !text.is_empty();
        }
        Ok(())
    }

    async fn press_enter(&mut self, _element: &ElementRef) -> DriverResult<()> {
        self.sync("press_enter")?;
        if self.site.lock().ignore_enter {
            self.site.record("enter_ignored");
            return Ok(());
        }
        self.site.record(format!("submit:{}", self.search_text.trim()));
        self.perform_search();
        Ok(())
    }

    async fn submit_form(&mut self, _element: &ElementRef) -> DriverResult<()> {
        self.sync("submit_form")?;
        self.site.record(format!("submit_form:{}", self.search_text.trim()));
        self.perform_search();
        Ok(())
    }

    async fn read_text(&mut self, element: &ElementRef) -> DriverResult<String> {
        self.sync("read_text")?;
        self.text_of(element).ok_or(DriverError::StaleElement)
    }

    async fn attribute(&mut self, element: &ElementRef, name: &str) -> DriverResult<Option<String>> {
        self.sync("attribute")?;
        let disabled = element.0 == id_of(L::ADD_TO_CART)
            && self.product().is_some_and(|p| p.add_to_cart == AddToCartState::Disabled);
        Ok((disabled && name == "aria-disabled").then(|| "true".to_string()))
    }

    async fn is_enabled(&mut self, element: &ElementRef) -> DriverResult<bool> {
        self.sync("is_enabled")?;
        if element.0 == id_of(L::ADD_TO_CART) {
            return Ok(self.product().is_some_and(|p| p.add_to_cart == AddToCartState::Enabled));
        }
        Ok(true)
    }

    async fn is_displayed(&mut self, element: &ElementRef) -> DriverResult<bool> {
        self.sync("is_displayed")?;
        Ok(self.text_of(element).is_some()
            || self.visible().iter().any(|(l, _)| id_of(*l) == element.0))
    }

    async fn current_url(&mut self) -> DriverResult<String> {
        self.sync("current_url")?;
        Ok(self.url.clone())
    }

    async fn page_title(&mut self) -> DriverResult<String> {
        self.sync("page_title")?;
        Ok(self.page.title())
    }

    async fn page_source(&mut self) -> DriverResult<String> {
        self.sync("page_source")?;
        Ok(self.page.source())
    }

    async fn capture_snapshot(&mut self, path: &Path) -> DriverResult<()> {
        self.sync("capture_snapshot")?;
        let delay = self.site.lock().snapshot_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.site.record("snapshot");
        std::fs::write(path, b"\x89PNG\r\n\x1a\n").map_err(|e| DriverError::Other(e.to_string()))
    }

    async fn close(&mut self) -> DriverResult<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.site.lock().closed += 1;
        self.site.record("close");
        self.site.fault("close")
    }
}

pub fn fast_timing() -> TimingConfig {
    TimingConfig {
        search_timeout_ms: 300,
        poll_interval_ms: 10,
        resubmit_after_ms: 20,
        search_attempts: 2,
        page_ready_timeout_ms: 200,
        element_timeout_ms: 200,
        spinner_timeout_ms: 50,
        price_wait_ms: 50,
        stock_wait_ms: 50,
        field_timeout_ms: 30,
        short_field_timeout_ms: 20,
        spec_table_timeout_ms: 30,
    }
}

pub fn test_site() -> SiteConfig {
    SiteConfig {
        base_url: FakeSite::BASE_URL.to_string(),
        username: "auditor@example.com".to_string(),
        password: "hunter2".to_string(),
    }
}

/// Fast, quiet configuration writing under `dir`
pub fn test_config(dir: &Path) -> AppConfig {
    let mut config = AppConfig::default();
    config.site = test_site();
    config.timing = fast_timing();
    config.input.identifier_file = dir.join("upcs.txt");
    config.recovery.retry_count = 1;
    config.recovery.retry_delay_ms = 10;
    config.recovery.blocked_backoff_ms = 0;
    config.recovery.snapshot_timeout_ms = 1_000;
    config.output.output_dir = dir.to_path_buf();
    config.output.screenshots_enabled = false;
    config.logging.console_output = false;
    config.logging.file_output = false;
    config
}
