//! Best-effort diagnostic screenshots
//!
//! Capture never fails the caller: every error and timeout is logged and
//! turned into `None`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, warn};

use super::browser_driver::BrowserSession;

static UNSAFE_FILE_CHARS: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"[^A-Za-z0-9._-]").ok());

/// Replaces every character outside `[A-Za-z0-9._-]` with `_`.
pub fn safe_file_name(raw: &str) -> String {
    match UNSAFE_FILE_CHARS.as_ref() {
        Some(re) => re.replace_all(raw, "_").into_owned(),
        None => raw
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || "._-".contains(c) { c } else { '_' })
            .collect(),
    }
}

/// Writes `<dir>/<label>_<identifier>_<millis>.png` snapshots
#[derive(Debug, Clone)]
pub struct SnapshotRecorder {
    dir: PathBuf,
    enabled: bool,
    timeout: Duration,
}

impl SnapshotRecorder {
    pub fn new(dir: impl Into<PathBuf>, enabled: bool, timeout: Duration) -> Self {
        Self {
            dir: dir.into(),
            enabled,
            timeout,
        }
    }

    pub fn disabled() -> Self {
        Self::new(PathBuf::new(), false, Duration::ZERO)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub const fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Snapshot path for a status label and identifier
    pub fn path_for(&self, label: &str, identifier: &str) -> PathBuf {
        let millis = chrono::Utc::now().timestamp_millis();
        let name = safe_file_name(&format!("{label}_{identifier}_{millis}"));
        self.dir.join(format!("{name}.png"))
    }

    /// Captures the current page, bounded by the configured timeout.
    pub async fn capture<S>(&self, session: &mut S, label: &str, identifier: &str) -> Option<PathBuf>
    where
        S: BrowserSession + ?Sized,
    {
        if !self.enabled {
            return None;
        }
        if let Err(e) = tokio::fs::create_dir_all(&self.dir).await {
            warn!("📷 Snapshot directory {:?} unavailable: {}", self.dir, e);
            return None;
        }

        let path = self.path_for(label, identifier);
        match tokio::time::timeout(self.timeout, session.capture_snapshot(&path)).await {
            Ok(Ok(())) => {
                debug!("📷 Snapshot saved: {:?}", path);
                Some(path)
            }
            Ok(Err(e)) => {
                warn!("📷 Snapshot failed for {} ({}): {}", identifier, label, e);
                None
            }
            Err(_) => {
                warn!("📷 Snapshot timed out after {:?} for {}", self.timeout, identifier);
                None
            }
        }
    }
}
