//! Per-batch worker
//!
//! A batch owns one browser session and one output file from start to
//! finish. Items run strictly one after another. The session and the file
//! are released on every exit path, including a panic inside the item loop.

use std::collections::BTreeMap;
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::FutureExt;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, error, info, info_span, warn};

use crate::crawling::partitioner::Batch;
use crate::crawling::recovery_controller::RecoveryController;
use crate::crawling::session_manager::ManagedSession;
use crate::domain::outcome::RecordStatus;
use crate::infrastructure::browser_driver::BrowserDriver;

/// Outcome of one batch
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    pub batch: usize,
    pub output: PathBuf,
    pub planned: usize,
    /// Records that reached the output file
    pub recorded: usize,
    pub status_counts: BTreeMap<RecordStatus, usize>,
    /// Setup failure or panic that ended the batch early
    pub fatal_error: Option<String>,
    pub cancelled: bool,
}

impl BatchReport {
    fn new(batch: &Batch, output: &Path) -> Self {
        Self {
            batch: batch.number,
            output: output.to_path_buf(),
            planned: batch.len(),
            ..Self::default()
        }
    }

    pub fn count(&self, status: RecordStatus) -> usize {
        self.status_counts.get(&status).copied().unwrap_or(0)
    }

    pub const fn is_complete(&self) -> bool {
        self.fatal_error.is_none() && !self.cancelled && self.recorded == self.planned
    }
}

/// Runs one batch end to end.
pub async fn run_batch<D: BrowserDriver>(
    controller: Arc<RecoveryController<D>>,
    batch: Batch,
    output: PathBuf,
    cancel: CancellationToken,
) -> BatchReport {
    let span = info_span!("batch", batch = batch.number);
    execute(controller, batch, output, cancel).instrument(span).await
}

async fn execute<D: BrowserDriver>(
    controller: Arc<RecoveryController<D>>,
    batch: Batch,
    output: PathBuf,
    cancel: CancellationToken,
) -> BatchReport {
    let mut report = BatchReport::new(&batch, &output);
    info!("🚀 Batch {} starting: {} identifiers → {:?}", batch.number, batch.len(), output);

    if let Err(e) = controller.sink().init(&output).await {
        error!("❌ Batch {} output setup failed: {}", batch.number, e);
        report.fatal_error = Some(e.to_string());
        return report;
    }

    let mut managed = match controller.sessions().open().await {
        Ok(managed) => managed,
        Err(e) => {
            error!("❌ Batch {} session setup failed: {}", batch.number, e);
            report.fatal_error = Some(e.to_string());
            close_output(&controller, &output).await;
            return report;
        }
    };

    let outcome = AssertUnwindSafe(process_items(&controller, &mut managed, &batch, &output, &cancel, &mut report))
        .catch_unwind()
        .await;
    if outcome.is_err() {
        error!("💥 Batch {} panicked while processing items", batch.number);
        report.fatal_error = Some("batch worker panicked".into());
    }

    controller.sessions().close(&mut managed).await;
    close_output(&controller, &output).await;

    info!(
        "🏁 Batch {} finished: {}/{} recorded{}",
        batch.number,
        report.recorded,
        report.planned,
        if report.cancelled { " (cancelled)" } else { "" }
    );
    report
}

async fn process_items<D: BrowserDriver>(
    controller: &RecoveryController<D>,
    managed: &mut ManagedSession<D::Session>,
    batch: &Batch,
    output: &Path,
    cancel: &CancellationToken,
    report: &mut BatchReport,
) {
    for (index, identifier) in batch.identifiers.iter().enumerate() {
        if cancel.is_cancelled() {
            warn!("⏹️ Batch {} cancelled after {} items", batch.number, index);
            report.cancelled = true;
            return;
        }
        let item = controller.process_item(managed, identifier, output, cancel).await;
        if item.recorded {
            report.recorded += 1;
        }
        *report.status_counts.entry(item.record.status).or_insert(0) += 1;
    }
}

async fn close_output<D: BrowserDriver>(controller: &RecoveryController<D>, output: &Path) {
    if let Err(e) = controller.sink().close(output).await {
        warn!("⚠️ Could not close {:?}: {}", output, e);
    }
}
