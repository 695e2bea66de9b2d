//! # Batch Orchestrator
//!
//! Loads the work, partitions it against the checkpoint log and runs the
//! batches either one after another or as independent concurrent workers.
//! A failing batch never takes its siblings down.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::Local;
use futures::future::join_all;
use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::{AbortHandle, JoinError};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::crawling::batch_executor::{BatchReport, run_batch};
use crate::crawling::partitioner::{Batch, WorkPlan, load_identifiers, partition};
use crate::crawling::recovery_controller::RecoveryController;
use crate::crawling::session_manager::SessionManager;
use crate::domain::errors::AuditError;
use crate::infrastructure::browser_driver::BrowserDriver;
use crate::infrastructure::checkpoint_store::CheckpointStore;
use crate::infrastructure::config::{AppConfig, ExecutionMode};
use crate::infrastructure::output_sink::{OutputSinkRegistry, batch_output_path, run_stamp};
use crate::infrastructure::snapshot::SnapshotRecorder;

/// End-of-run totals
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub run_stamp: String,
    /// Identifiers read from the input (after header and blank removal)
    pub input_size: usize,
    pub already_processed: usize,
    pub scheduled: usize,
    pub recorded: usize,
    pub batches: Vec<BatchReport>,
}

impl RunSummary {
    /// True when every scheduled identifier has a written record.
    pub fn completed_all(&self) -> bool {
        self.recorded == self.scheduled && self.batches.iter().all(BatchReport::is_complete)
    }
}

/// Runs a whole audit over one browser driver
pub struct Orchestrator<D: BrowserDriver + 'static> {
    driver: Arc<D>,
    config: AppConfig,
}

impl<D: BrowserDriver + 'static> Orchestrator<D> {
    pub fn new(driver: Arc<D>, config: AppConfig) -> Self {
        Self { driver, config }
    }

    /// Reads the input file and runs every batch that still has work.
    pub async fn run(&self, cancel: CancellationToken) -> Result<RunSummary, AuditError> {
        let raw = load_identifiers(&self.config.input.identifier_file).await?;
        self.run_identifiers(raw, cancel).await
    }

    /// Runs the given raw identifier lines.
    pub async fn run_identifiers(&self, raw: Vec<String>, cancel: CancellationToken) -> Result<RunSummary, AuditError> {
        let run_id = Uuid::new_v4();
        let stamp = run_stamp(Local::now());
        info!("🎯 Run {} starting ({:?} mode)", run_id, self.config.batch.execution_mode);

        let checkpoint = Arc::new(CheckpointStore::new(self.config.output.checkpoint_path()));
        let processed = checkpoint.load_processed().await;
        let plan = partition(
            raw,
            self.config.input.deduplicate,
            self.config.batch.batch_size,
            &processed,
        )?;

        let controller = Arc::new(self.build_controller(checkpoint));
        let timer = self
            .config
            .run
            .run_timeout()
            .map(|limit| spawn_run_timer(limit, cancel.clone()));

        let WorkPlan {
            batches,
            input_size,
            already_processed,
        } = plan;
        let scheduled = batches.iter().map(Batch::len).sum();

        let reports = match self.config.batch.execution_mode {
            ExecutionMode::Sequential => self.run_sequential(&controller, batches, &stamp, &cancel).await,
            ExecutionMode::Parallel => self.run_parallel(&controller, batches, &stamp, &cancel).await,
        };

        if let Some(timer) = timer {
            timer.abort();
        }

        let summary = RunSummary {
            run_id,
            run_stamp: stamp,
            input_size,
            already_processed,
            scheduled,
            recorded: reports.iter().map(|r| r.recorded).sum(),
            batches: reports,
        };
        log_summary(&summary);
        Ok(summary)
    }

    fn build_controller(&self, checkpoint: Arc<CheckpointStore>) -> RecoveryController<D> {
        let output = &self.config.output;
        let snapshots = SnapshotRecorder::new(
            output.screenshot_path(),
            output.screenshots_enabled,
            self.config.recovery.snapshot_timeout(),
        );
        let sessions = Arc::new(SessionManager::new(
            Arc::clone(&self.driver),
            self.config.site.clone(),
            self.config.timing.clone(),
            snapshots.clone(),
        ));
        RecoveryController::new(
            sessions,
            &self.config,
            snapshots,
            Arc::new(OutputSinkRegistry::new()),
            checkpoint,
        )
    }

    fn output_for(&self, batch: &Batch, stamp: &str) -> PathBuf {
        batch_output_path(&self.config.output.output_dir, batch.number, stamp)
    }

    async fn run_sequential(
        &self,
        controller: &Arc<RecoveryController<D>>,
        batches: Vec<Batch>,
        stamp: &str,
        cancel: &CancellationToken,
    ) -> Vec<BatchReport> {
        let mut reports = Vec::with_capacity(batches.len());
        for batch in batches {
            let output = self.output_for(&batch, stamp);
            if cancel.is_cancelled() {
                reports.push(skipped(&batch, output));
                continue;
            }
            reports.push(run_batch(Arc::clone(controller), batch, output, cancel.clone()).await);
        }
        reports
    }

    async fn run_parallel(
        &self,
        controller: &Arc<RecoveryController<D>>,
        batches: Vec<Batch>,
        stamp: &str,
        cancel: &CancellationToken,
    ) -> Vec<BatchReport> {
        let limit = self
            .config
            .batch
            .max_concurrent_batches
            .map(|n| Arc::new(Semaphore::new(n)));
        info!(
            "⚡ Launching {} batches (concurrency cap: {})",
            batches.len(),
            limit.as_ref().map_or_else(|| "none".to_string(), |s| s.available_permits().to_string())
        );

        let mut placeholders = Vec::with_capacity(batches.len());
        let mut handles = Vec::with_capacity(batches.len());
        for batch in batches {
            let output = self.output_for(&batch, stamp);
            placeholders.push(skipped(&batch, output.clone()));

            let controller = Arc::clone(controller);
            let cancel = cancel.clone();
            let limit = limit.clone();
            handles.push(tokio::spawn(async move {
                let _permit = match limit {
                    Some(semaphore) => match semaphore.acquire_owned().await {
                        Ok(permit) => Some(permit),
                        Err(_) => return skipped(&batch, output),
                    },
                    None => None,
                };
                if cancel.is_cancelled() {
                    return skipped(&batch, output);
                }
                run_batch(controller, batch, output, cancel).await
            }));
        }

        let aborts: Vec<AbortHandle> = handles.iter().map(tokio::task::JoinHandle::abort_handle).collect();
        let mut joined = Box::pin(join_all(handles));
        let shutdown_timeout = self.config.run.shutdown_timeout();

        let results = tokio::select! {
            results = &mut joined => results,
            () = grace_period_elapsed(cancel, shutdown_timeout) => {
                warn!("⏰ Batches still running {:?} after cancellation, aborting", shutdown_timeout);
                for handle in &aborts {
                    handle.abort();
                }
                joined.await
            }
        };

        results
            .into_iter()
            .zip(placeholders)
            .map(|(result, placeholder)| match result {
                Ok(report) => report,
                Err(e) => failed_worker(placeholder, &e),
            })
            .collect()
    }
}

/// Report for a batch that never started
fn skipped(batch: &Batch, output: PathBuf) -> BatchReport {
    BatchReport {
        batch: batch.number,
        output,
        planned: batch.len(),
        cancelled: true,
        ..BatchReport::default()
    }
}

fn failed_worker(mut report: BatchReport, err: &JoinError) -> BatchReport {
    error!("❌ Batch {} worker ended abnormally: {}", report.batch, err);
    report.cancelled = err.is_cancelled();
    report.fatal_error = Some(if err.is_cancelled() {
        "aborted after shutdown grace period".to_string()
    } else {
        "batch worker panicked".to_string()
    });
    report
}

async fn grace_period_elapsed(cancel: &CancellationToken, grace: Duration) {
    cancel.cancelled().await;
    tokio::time::sleep(grace).await;
}

fn spawn_run_timer(limit: Duration, cancel: CancellationToken) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        tokio::select! {
            () = tokio::time::sleep(limit) => {
                warn!("⏰ Run timeout of {:?} reached, cancelling", limit);
                cancel.cancel();
            }
            () = cancel.cancelled() => {}
        }
    })
}

fn log_summary(summary: &RunSummary) {
    info!(
        "📊 Run {} finished: input={} already_processed={} scheduled={} recorded={}",
        summary.run_id, summary.input_size, summary.already_processed, summary.scheduled, summary.recorded
    );
    for report in &summary.batches {
        info!(
            "   batch {}: {}/{} recorded, statuses={:?}{}{}",
            report.batch,
            report.recorded,
            report.planned,
            report.status_counts,
            report
                .fatal_error
                .as_ref()
                .map(|e| format!(", fatal: {e}"))
                .unwrap_or_default(),
            if report.cancelled { ", cancelled" } else { "" }
        );
    }
    if summary.completed_all() {
        info!("✅ All scheduled identifiers recorded");
    } else {
        warn!(
            "⚠️ Run incomplete: {} of {} scheduled identifiers recorded",
            summary.recorded, summary.scheduled
        );
    }
}
