//! Recovery Controller
//!
//! Drives one identifier from validation to a written record:
//!
//! ```text
//! Validating → Searching → Classifying → (Recovering-Login | Recording) → Done
//! ```
//!
//! - malformed identifiers are recorded without touching the browser
//! - `LoginRequired` re-authenticates and searches exactly once more
//! - transient and unclassified failures go through the retry policy
//! - session loss gets one full session restart and exactly one more attempt
//! - every identifier ends in exactly one record, then one checkpoint mark

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, error, info, info_span, warn};

use crate::crawling::outcome_classifier::OutcomeClassifier;
use crate::crawling::product_extractor::ProductExtractor;
use crate::crawling::session_manager::{ManagedSession, SessionManager};
use crate::domain::errors::ItemError;
use crate::domain::identifier::Identifier;
use crate::domain::outcome::{RecordStatus, SearchOutcome};
use crate::domain::result_record::ResultRecord;
use crate::infrastructure::browser_driver::{BrowserDriver, BrowserSession};
use crate::infrastructure::checkpoint_store::CheckpointStore;
use crate::infrastructure::config::AppConfig;
use crate::infrastructure::output_sink::OutputSinkRegistry;
use crate::infrastructure::retry_policy::RetryPolicy;
use crate::infrastructure::snapshot::SnapshotRecorder;

/// What happened to one identifier
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemReport {
    pub record: ResultRecord,
    /// The record reached the output file
    pub recorded: bool,
    /// The checkpoint log has the identifier
    pub checkpointed: bool,
}

/// Shared per-run collaborators of every batch worker
pub struct RecoveryController<D: BrowserDriver> {
    sessions: Arc<SessionManager<D>>,
    classifier: OutcomeClassifier,
    extractor: ProductExtractor,
    retry: RetryPolicy,
    snapshots: SnapshotRecorder,
    sink: Arc<OutputSinkRegistry>,
    checkpoint: Arc<CheckpointStore>,
    blocked_backoff: Duration,
}

impl<D: BrowserDriver> RecoveryController<D> {
    pub fn new(
        sessions: Arc<SessionManager<D>>,
        config: &AppConfig,
        snapshots: SnapshotRecorder,
        sink: Arc<OutputSinkRegistry>,
        checkpoint: Arc<CheckpointStore>,
    ) -> Self {
        Self {
            classifier: OutcomeClassifier::new(config.timing.clone(), sessions.base_url()),
            extractor: ProductExtractor::new(config.timing.clone()),
            retry: RetryPolicy::for_items(&config.recovery),
            blocked_backoff: config.recovery.blocked_backoff(),
            sessions,
            snapshots,
            sink,
            checkpoint,
        }
    }

    pub fn sessions(&self) -> &Arc<SessionManager<D>> {
        &self.sessions
    }

    pub fn sink(&self) -> &Arc<OutputSinkRegistry> {
        &self.sink
    }

    /// Processes one identifier and writes its record to `output`.
    ///
    /// Never fails: every error ends up as a `FAILED` record.
    pub async fn process_item(
        &self,
        managed: &mut ManagedSession<D::Session>,
        identifier: &str,
        output: &Path,
        cancel: &CancellationToken,
    ) -> ItemReport {
        let span = info_span!("item", identifier = %identifier);
        async {
            let record = self.resolve(managed, identifier).await;
            let record = self.attach_snapshot(managed, record).await;
            let report = self.persist(output, record).await;

            if report.record.status == RecordStatus::Blocked && !self.blocked_backoff.is_zero() {
                warn!("🛑 Blocked, backing off for {:?}", self.blocked_backoff);
                tokio::select! {
                    () = tokio::time::sleep(self.blocked_backoff) => {}
                    () = cancel.cancelled() => {}
                }
            }
            report
        }
        .instrument(span)
        .await
    }

    async fn resolve(&self, managed: &mut ManagedSession<D::Session>, identifier: &str) -> ResultRecord {
        let id = match Identifier::parse(identifier) {
            Ok(id) => id,
            Err(e) => {
                info!("🚫 {}", e);
                return ResultRecord::terminal(identifier, RecordStatus::InvalidFormat, "Invalid UPC format", "");
            }
        };

        if managed.raw_mut().is_none() {
            if let Err(e) = self.sessions.restart(managed).await {
                error!("❌ No browser session for {}: {}", id, e);
                return ResultRecord::terminal(
                    id.as_str(),
                    RecordStatus::Failed,
                    format!("Session unavailable: {e}"),
                    "",
                );
            }
        }

        let result = match self.run_with_retries(managed, &id).await {
            Err(e) if e.is_session_invalid() => {
                warn!("💀 Session lost ({}), restarting once", e);
                managed.mark_invalid();
                match self.sessions.restart(managed).await {
                    Ok(()) => self.run_once(managed, &id).await,
                    Err(restart_err) => Err(restart_err),
                }
            }
            other => other,
        };

        match result {
            Ok(record) => record,
            Err(e) => {
                error!("❌ {} failed: {}", id, e);
                let url = self.current_url(managed).await;
                ResultRecord::terminal(id.as_str(), RecordStatus::Failed, e.to_string(), url)
            }
        }
    }

    async fn run_with_retries(
        &self,
        managed: &mut ManagedSession<D::Session>,
        id: &Identifier,
    ) -> Result<ResultRecord, ItemError> {
        let session = managed.session_mut()?;
        let mut attempt = Attempt {
            controller: self,
            session,
            identifier: id.as_str(),
        };
        self.retry.run(&mut attempt, |a| a.process_once().boxed()).await
    }

    /// Single attempt on a restarted session. Errors are final.
    async fn run_once(
        &self,
        managed: &mut ManagedSession<D::Session>,
        id: &Identifier,
    ) -> Result<ResultRecord, ItemError> {
        let session = managed.session_mut()?;
        let mut attempt = Attempt {
            controller: self,
            session,
            identifier: id.as_str(),
        };
        attempt.process_once().await
    }

    async fn attach_snapshot(&self, managed: &mut ManagedSession<D::Session>, record: ResultRecord) -> ResultRecord {
        if !record.status.wants_snapshot() {
            return record;
        }
        let Some(session) = managed.raw_mut() else {
            return record;
        };
        let snapshot = self
            .snapshots
            .capture(session, record.status.label(), &record.identifier)
            .await;
        record.with_snapshot(snapshot)
    }

    /// Appends the record, then checkpoints it only if the append succeeded.
    async fn persist(&self, output: &Path, record: ResultRecord) -> ItemReport {
        if let Err(e) = self.sink.append(output, &record).await {
            error!("❌ Could not write record for {}: {}", record.identifier, e);
            return ItemReport {
                record,
                recorded: false,
                checkpointed: false,
            };
        }
        let checkpointed = self.checkpoint.mark_processed(&record.identifier).await;
        info!("📝 {} → {} {}", record.identifier, record.status, record.message);
        ItemReport {
            record,
            recorded: true,
            checkpointed,
        }
    }

    async fn current_url(&self, managed: &mut ManagedSession<D::Session>) -> String {
        match managed.raw_mut() {
            Some(session) => session.current_url().await.unwrap_or_default(),
            None => String::new(),
        }
    }
}

/// State threaded through the retry policy for one identifier
struct Attempt<'a, D: BrowserDriver> {
    controller: &'a RecoveryController<D>,
    session: &'a mut D::Session,
    identifier: &'a str,
}

impl<D: BrowserDriver> Attempt<'_, D> {
    async fn process_once(&mut self) -> Result<ResultRecord, ItemError> {
        let controller = self.controller;
        let id = self.identifier;

        controller.classifier.ensure_online(&mut *self.session).await?;
        let mut outcome = controller.classifier.search(&mut *self.session, id).await?;

        if outcome == SearchOutcome::LoginRequired {
            info!("🔑 Login required, re-authenticating");
            controller.sessions.authenticate(&mut *self.session).await?;
            outcome = controller.classifier.search(&mut *self.session, id).await?;
            if outcome == SearchOutcome::LoginRequired {
                return Err(ItemError::SessionExpired);
            }
        }

        let terminal = |status, message: &str, url: String| ResultRecord::terminal(id, status, message, url);
        Ok(match outcome {
            SearchOutcome::Opened => {
                let page = controller.extractor.extract(&mut *self.session).await?;
                ResultRecord::from_product_page(id, page)
            }
            SearchOutcome::NoProductsFound => terminal(
                RecordStatus::NoProductFound,
                "No products found for this UPC",
                self.url().await,
            ),
            SearchOutcome::Blocked => terminal(
                RecordStatus::Blocked,
                "Blocked/CAPTCHA detected after search",
                self.url().await,
            ),
            SearchOutcome::Maintenance => terminal(
                RecordStatus::Maintenance,
                "Site is in maintenance mode",
                self.url().await,
            ),
            SearchOutcome::LoginRequired => return Err(ItemError::SessionExpired),
        })
    }

    async fn url(&mut self) -> String {
        self.session.current_url().await.unwrap_or_default()
    }
}
