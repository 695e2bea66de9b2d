//! Append-only checkpoint log
//!
//! One identifier per line. The log is read once at startup and appended to
//! after each durably written result record. Appends from concurrent batch
//! workers are serialized through a single async mutex.

use std::collections::HashSet;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, warn};

#[derive(Debug)]
pub struct CheckpointStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl CheckpointStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Identifiers already recorded by earlier runs.
    ///
    /// A missing log means a fresh run. An unreadable log is logged and
    /// treated as empty, which re-processes rather than skips work.
    pub async fn load_processed(&self) -> HashSet<String> {
        match fs::read_to_string(&self.path).await {
            Ok(content) => {
                let processed: HashSet<String> = content
                    .lines()
                    .map(str::trim)
                    .filter(|line| !line.is_empty())
                    .map(str::to_string)
                    .collect();
                debug!("📌 Loaded {} checkpointed identifiers from {:?}", processed.len(), self.path);
                processed
            }
            Err(e) if e.kind() == ErrorKind::NotFound => HashSet::new(),
            Err(e) => {
                warn!("⚠️ Could not read checkpoint log {:?}: {}", self.path, e);
                HashSet::new()
            }
        }
    }

    /// Appends one identifier as a single write of one line.
    ///
    /// Failures are logged and reported as `false`; they never abort the run.
    pub async fn mark_processed(&self, identifier: &str) -> bool {
        let _guard = self.write_lock.lock().await;
        match self.append_line(identifier).await {
            Ok(()) => true,
            Err(e) => {
                warn!("⚠️ Checkpoint append failed for {}: {}", identifier, e);
                false
            }
        }
    }

    async fn append_line(&self, identifier: &str) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        let line = format!("{}\n", identifier.trim());
        file.write_all(line.as_bytes()).await?;
        file.flush().await
    }
}
