//! Browser automation seam
//!
//! The audit engine only talks to a browser through these traits. The
//! production implementation is [`crate::infrastructure::webdriver_client`];
//! tests use a scripted in-memory storefront.

use std::fmt;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::errors::{FailureKind, ItemError, classify_failure};

/// Element locating strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Locator {
    Css(&'static str),
    XPath(&'static str),
    Id(&'static str),
}

impl Locator {
    /// W3C `using` strategy and value
    pub fn strategy(&self) -> (&'static str, String) {
        match self {
            Self::Css(css) => ("css selector", (*css).to_string()),
            Self::XPath(xpath) => ("xpath", (*xpath).to_string()),
            Self::Id(id) => ("css selector", format!("#{id}")),
        }
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Css(s) => write!(f, "css={s}"),
            Self::XPath(s) => write!(f, "xpath={s}"),
            Self::Id(s) => write!(f, "id={s}"),
        }
    }
}

/// Opaque handle to an element in the current page
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ElementRef(pub String);

/// Driver call failure
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DriverError {
    #[error("no such element: {0}")]
    NoSuchElement(String),

    #[error("stale element reference")]
    StaleElement,

    #[error("element not interactable: {0}")]
    NotInteractable(String),

    #[error("timeout: {0}")]
    Timeout(String),

    #[error("invalid session id: {0}")]
    SessionInvalid(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("{0}")]
    Other(String),
}

impl DriverError {
    /// True when the session behind this call is gone.
    pub fn is_session_invalid(&self) -> bool {
        match self {
            Self::SessionInvalid(_) => true,
            other => classify_failure(&other.to_string()) == FailureKind::SessionInvalid,
        }
    }
}

impl From<DriverError> for ItemError {
    fn from(err: DriverError) -> Self {
        if err.is_session_invalid() {
            Self::SessionInvalid {
                message: err.to_string(),
            }
        } else {
            Self::from_message(err.to_string())
        }
    }
}

pub type DriverResult<T> = Result<T, DriverError>;

/// Turns every failure except session loss into the default value.
///
/// Page checks run against pages that may be mid-navigation; only a dead
/// session is worth reporting from them.
pub fn best_effort<T: Default>(result: DriverResult<T>) -> DriverResult<T> {
    match result {
        Err(e) if !e.is_session_invalid() => Ok(T::default()),
        other => other,
    }
}

/// One live browser session.
///
/// Element lookups return `Ok(None)` / an empty list when nothing matches;
/// `Err` is reserved for driver or transport failures.
#[async_trait]
pub trait BrowserSession: Send {
    async fn navigate(&mut self, url: &str) -> DriverResult<()>;
    async fn refresh(&mut self) -> DriverResult<()>;

    /// Waits for `document.readyState == "complete"`. Returns `false` on timeout.
    async fn wait_until_loaded(&mut self, timeout: Duration) -> DriverResult<bool>;

    /// First matching element that is currently displayed
    async fn find_displayed(&mut self, locator: Locator) -> DriverResult<Option<ElementRef>>;
    async fn find_all(&mut self, locator: Locator) -> DriverResult<Vec<ElementRef>>;
    async fn find_within(
        &mut self,
        parent: &ElementRef,
        locator: Locator,
    ) -> DriverResult<Option<ElementRef>>;

    async fn click(&mut self, element: &ElementRef) -> DriverResult<()>;
    async fn clear(&mut self, element: &ElementRef) -> DriverResult<()>;
    async fn type_text(&mut self, element: &ElementRef, text: &str) -> DriverResult<()>;
    async fn press_enter(&mut self, element: &ElementRef) -> DriverResult<()>;
    /// Submits the form enclosing `element`
    async fn submit_form(&mut self, element: &ElementRef) -> DriverResult<()>;

    async fn read_text(&mut self, element: &ElementRef) -> DriverResult<String>;
    async fn attribute(&mut self, element: &ElementRef, name: &str) -> DriverResult<Option<String>>;
    async fn is_enabled(&mut self, element: &ElementRef) -> DriverResult<bool>;
    async fn is_displayed(&mut self, element: &ElementRef) -> DriverResult<bool>;

    async fn current_url(&mut self) -> DriverResult<String>;
    async fn page_title(&mut self) -> DriverResult<String>;
    async fn page_source(&mut self) -> DriverResult<String>;

    /// Writes a PNG of the current viewport to `path`
    async fn capture_snapshot(&mut self, path: &Path) -> DriverResult<()>;

    async fn close(&mut self) -> DriverResult<()>;
}

/// Factory for browser sessions
#[async_trait]
pub trait BrowserDriver: Send + Sync {
    type Session: BrowserSession + 'static;

    async fn open_session(&self) -> DriverResult<Self::Session>;
}
