//! Session lifecycle
//!
//! Opens, authenticates, restarts and closes the one browser session a batch
//! owns. Sessions are passed around explicitly; nothing is bound per thread.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::crawling::locators;
use crate::domain::errors::{AuditError, ItemError};
use crate::infrastructure::browser_driver::{BrowserDriver, BrowserSession, best_effort};
use crate::infrastructure::config::{SiteConfig, TimingConfig};
use crate::infrastructure::snapshot::SnapshotRecorder;
use crate::infrastructure::wait::{click_when_ready, find_visible, type_when_ready};

/// Session lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionState {
    Created,
    Authenticated,
    InUse,
    Invalid,
    Closed,
}

/// A batch-owned session plus its lifecycle bookkeeping.
///
/// `inner` is `None` after a failed restart; the next item tries to bring
/// the session back before it does anything else.
#[derive(Debug)]
pub struct ManagedSession<S> {
    inner: Option<S>,
    state: SessionState,
    restarts: u32,
}

impl<S: BrowserSession> ManagedSession<S> {
    pub fn new(session: S) -> Self {
        Self {
            inner: Some(session),
            state: SessionState::Created,
            restarts: 0,
        }
    }

    pub const fn state(&self) -> SessionState {
        self.state
    }

    pub const fn restarts(&self) -> u32 {
        self.restarts
    }

    pub const fn is_live(&self) -> bool {
        self.inner.is_some() && matches!(self.state, SessionState::Authenticated | SessionState::InUse)
    }

    /// Borrows the live session for one unit of work.
    pub fn session_mut(&mut self) -> Result<&mut S, ItemError> {
        match self.inner.as_mut() {
            Some(session) if self.state != SessionState::Closed => {
                self.state = SessionState::InUse;
                Ok(session)
            }
            _ => Err(ItemError::SessionInvalid {
                message: "no live browser session".into(),
            }),
        }
    }

    /// Best-effort access for diagnostics on an unhealthy session
    pub fn raw_mut(&mut self) -> Option<&mut S> {
        self.inner.as_mut()
    }

    pub fn mark_invalid(&mut self) {
        if self.state != SessionState::Closed {
            self.state = SessionState::Invalid;
        }
    }
}

/// Clicks "Accept all" when the welcome popup is showing.
pub async fn dismiss_welcome_popup<S>(session: &mut S, timing: &TimingConfig) -> Result<(), ItemError>
where
    S: BrowserSession + ?Sized,
{
    let popup = find_visible(
        session,
        locators::WELCOME_POPUP,
        timing.short_field_timeout(),
        timing.poll_interval(),
    )
    .await?;
    if popup.is_some() {
        debug!("Dismissing welcome popup");
        best_effort(
            click_when_ready(
                session,
                locators::ACCEPT_ALL,
                timing.element_timeout(),
                timing.poll_interval(),
            )
            .await,
        )?;
        session.wait_until_loaded(timing.page_ready_timeout()).await?;
    }
    Ok(())
}

/// Opens and recovers sessions for batches
pub struct SessionManager<D: BrowserDriver> {
    driver: Arc<D>,
    site: SiteConfig,
    timing: TimingConfig,
    snapshots: SnapshotRecorder,
}

impl<D: BrowserDriver> SessionManager<D> {
    pub fn new(driver: Arc<D>, site: SiteConfig, timing: TimingConfig, snapshots: SnapshotRecorder) -> Self {
        Self {
            driver,
            site,
            timing,
            snapshots,
        }
    }

    pub const fn timing(&self) -> &TimingConfig {
        &self.timing
    }

    pub fn base_url(&self) -> &str {
        &self.site.base_url
    }

    /// Opens a fresh session and logs in. A session that fails to
    /// authenticate is closed before the error is returned.
    pub async fn open(&self) -> Result<ManagedSession<D::Session>, AuditError> {
        let session = self
            .driver
            .open_session()
            .await
            .map_err(|e| AuditError::SessionSetup(e.to_string()))?;
        let mut managed = ManagedSession::new(session);

        let authenticated = match managed.inner.as_mut() {
            Some(session) => self.authenticate(session).await,
            None => Err(ItemError::SessionInvalid {
                message: "session vanished during setup".into(),
            }),
        };
        if let Err(e) = authenticated {
            self.close(&mut managed).await;
            return Err(AuditError::SessionSetup(e.to_string()));
        }

        managed.state = SessionState::Authenticated;
        Ok(managed)
    }

    /// Discards the current session, opens a new one and logs in again.
    pub async fn restart(&self, managed: &mut ManagedSession<D::Session>) -> Result<(), ItemError> {
        info!("♻️ Restarting browser session (restart #{})", managed.restarts + 1);
        if let Some(mut old) = managed.inner.take() {
            if let Err(e) = old.close().await {
                debug!("Old session close failed during restart: {}", e);
            }
        }
        managed.state = SessionState::Invalid;
        managed.restarts += 1;

        let mut session = self.driver.open_session().await?;
        if let Err(e) = self.authenticate(&mut session).await {
            if let Err(close_err) = session.close().await {
                warn!("⚠️ Close of unauthenticated replacement session failed: {}", close_err);
            }
            return Err(e);
        }

        managed.inner = Some(session);
        managed.state = SessionState::Authenticated;
        Ok(())
    }

    /// Closes the session. Errors are logged; closing twice is a no-op.
    pub async fn close(&self, managed: &mut ManagedSession<D::Session>) {
        if let Some(mut session) = managed.inner.take() {
            if let Err(e) = session.close().await {
                warn!("⚠️ Browser session close failed: {}", e);
            }
        }
        managed.state = SessionState::Closed;
    }

    /// Opens the storefront and runs the login flow.
    ///
    /// A failed login leaves a `LOGIN_FAIL` snapshot behind.
    pub async fn authenticate<S>(&self, session: &mut S) -> Result<(), ItemError>
    where
        S: BrowserSession + ?Sized,
    {
        let result = async {
            self.open_site(session).await?;
            self.login(session).await
        }
        .await;

        match result {
            Ok(()) => {
                info!("✅ Login completed");
                Ok(())
            }
            Err(e) => {
                warn!("❌ Login failed: {}", e);
                self.snapshots.capture(session, "LOGIN_FAIL", "session").await;
                Err(e)
            }
        }
    }

    /// Navigates to the base URL and dismisses the welcome popup.
    pub async fn open_site<S>(&self, session: &mut S) -> Result<(), ItemError>
    where
        S: BrowserSession + ?Sized,
    {
        session.navigate(&self.site.base_url).await?;
        session.wait_until_loaded(self.timing.page_ready_timeout()).await?;
        dismiss_welcome_popup(session, &self.timing).await
    }

    async fn login<S>(&self, session: &mut S) -> Result<(), ItemError>
    where
        S: BrowserSession + ?Sized,
    {
        let (wait, tick, glance) = (
            self.timing.element_timeout(),
            self.timing.poll_interval(),
            self.timing.short_field_timeout(),
        );

        click_when_ready(session, locators::ACCOUNT_ICON, wait, tick).await?;

        if find_visible(session, locators::LOGIN_LINK, glance, tick).await?.is_some() {
            click_when_ready(session, locators::LOGIN_LINK, wait, tick).await?;
        } else if find_visible(session, locators::ALREADY_LOGGED_IN, glance, tick)
            .await?
            .is_some()
        {
            debug!("Already logged in, logging out first");
            click_when_ready(session, locators::LOGOUT, wait, tick).await?;
            session.wait_until_loaded(self.timing.page_ready_timeout()).await?;
            click_when_ready(session, locators::ACCOUNT_ICON, wait, tick).await?;
            click_when_ready(session, locators::LOGIN_LINK, wait, tick).await?;
        } else {
            return Err(ItemError::Unclassified {
                message: "Login menu not in expected state.".into(),
            });
        }

        session.wait_until_loaded(self.timing.page_ready_timeout()).await?;
        type_when_ready(session, locators::LOGIN_EMAIL, &self.site.username, wait, tick).await?;
        type_when_ready(session, locators::LOGIN_PASSWORD, &self.site.password, wait, tick).await?;
        click_when_ready(session, locators::LOGIN_SUBMIT, wait, tick).await?;
        session.wait_until_loaded(self.timing.page_ready_timeout()).await?;
        Ok(())
    }
}
