//! Per-batch CSV output
//!
//! One append-only file per batch. Live writers are kept in a registry keyed
//! by path; every record is flushed as soon as it is written so a crash loses
//! at most the record in flight.

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex as StdMutex, PoisonError};

use chrono::{DateTime, Local};
use csv::{QuoteStyle, Writer, WriterBuilder};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::domain::errors::AuditError;
use crate::domain::result_record::{CSV_HEADER, ResultRecord};

/// Run timestamp used in every batch file name of one run
pub fn run_stamp(now: DateTime<Local>) -> String {
    now.format("%Y%m%d_%H%M%S").to_string()
}

/// `<dir>/results_batch_<n>_<stamp>.csv`
pub fn batch_output_path(dir: &Path, batch_number: usize, run_stamp: &str) -> PathBuf {
    dir.join(format!("results_batch_{batch_number}_{run_stamp}.csv"))
}

/// Cell cleanup applied before quoting: `"` becomes `'`, line breaks become
/// spaces, surrounding whitespace is trimmed.
pub fn sanitize(value: &str) -> String {
    value
        .replace('"', "'")
        .replace(['\n', '\r'], " ")
        .trim()
        .to_string()
}

fn create_parent(path: &Path) -> Result<(), AuditError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| AuditError::io(parent, e))?;
    }
    Ok(())
}

fn record_writer(file: File) -> Writer<File> {
    WriterBuilder::new()
        .quote_style(QuoteStyle::Always)
        .has_headers(false)
        .from_writer(file)
}

type SharedWriter = Arc<StdMutex<Writer<File>>>;

fn shared(writer: Writer<File>) -> SharedWriter {
    Arc::new(StdMutex::new(writer))
}

/// Runs file I/O on the blocking pool.
async fn blocking<T, F>(path: &Path, work: F) -> Result<T, AuditError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, AuditError> + Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| AuditError::io(path, std::io::Error::other(e)))?
}

async fn flush(path: &Path, writer: SharedWriter) -> Result<(), AuditError> {
    let owned = path.to_path_buf();
    blocking(path, move || {
        let mut writer = writer.lock().unwrap_or_else(PoisonError::into_inner);
        writer.flush().map_err(|e| AuditError::io(owned, e))
    })
    .await
}

/// Registry of live per-batch writers.
///
/// The registry lock only guards the path map; each file has its own writer
/// lock, so batches never wait on each other's disk writes.
#[derive(Default)]
pub struct OutputSinkRegistry {
    writers: Mutex<HashMap<PathBuf, SharedWriter>>,
}

impl OutputSinkRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates or truncates `path` and writes the header row.
    pub async fn init(&self, path: &Path) -> Result<(), AuditError> {
        let previous = self.writers.lock().await.remove(path);
        if let Some(previous) = previous {
            if let Err(e) = flush(path, previous).await {
                warn!("⚠️ Flush of previous writer failed for {:?}: {}", path, e);
            }
        }

        let owned = path.to_path_buf();
        let writer = blocking(path, move || {
            create_parent(&owned)?;
            let mut file = File::create(&owned).map_err(|e| AuditError::io(&owned, e))?;
            writeln!(file, "{}", CSV_HEADER.join(",")).map_err(|e| AuditError::io(&owned, e))?;
            file.flush().map_err(|e| AuditError::io(&owned, e))?;
            Ok(record_writer(file))
        })
        .await?;

        self.writers.lock().await.insert(path.to_path_buf(), shared(writer));
        debug!("📝 Output initialized: {:?}", path);
        Ok(())
    }

    /// Appends one record and flushes it. A path that was never initialized
    /// (or already closed) is reopened in append mode.
    pub async fn append(&self, path: &Path, record: &ResultRecord) -> Result<(), AuditError> {
        let writer = self.writer_for(path).await?;
        let row: Vec<String> = record
            .columns()
            .iter()
            .map(|cell| cell.as_deref().map(sanitize).unwrap_or_default())
            .collect();

        let owned = path.to_path_buf();
        blocking(path, move || {
            let mut writer = writer.lock().unwrap_or_else(PoisonError::into_inner);
            writer.write_record(&row)?;
            writer.flush().map_err(|e| AuditError::io(owned, e))
        })
        .await
    }

    async fn writer_for(&self, path: &Path) -> Result<SharedWriter, AuditError> {
        let mut writers = self.writers.lock().await;
        if let Some(writer) = writers.get(path) {
            return Ok(Arc::clone(writer));
        }

        let owned = path.to_path_buf();
        let file = blocking(path, move || {
            create_parent(&owned)?;
            OpenOptions::new()
                .create(true)
                .append(true)
                .open(&owned)
                .map_err(|e| AuditError::io(&owned, e))
        })
        .await?;
        let writer = shared(record_writer(file));
        writers.insert(path.to_path_buf(), Arc::clone(&writer));
        Ok(writer)
    }

    /// Flushes and releases the writer for `path`. Closing twice is a no-op.
    pub async fn close(&self, path: &Path) -> Result<(), AuditError> {
        let removed = self.writers.lock().await.remove(path);
        if let Some(writer) = removed {
            flush(path, writer).await.inspect_err(|e| {
                warn!("⚠️ Flush on close failed for {:?}: {}", path, e);
            })?;
        }
        Ok(())
    }

    pub async fn open_count(&self) -> usize {
        self.writers.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::outcome::RecordStatus;
    use rstest::rstest;

    #[rstest]
    #[case("plain", "plain")]
    #[case("  padded  ", "padded")]
    #[case("say \"hi\"", "say 'hi'")]
    #[case("two\r\nlines", "two  lines")]
    fn sanitizes_cells(#[case] raw: &str, #[case] expected: &str) {
        assert_eq!(sanitize(raw), expected);
    }

    #[test]
    fn file_name_carries_batch_and_stamp() {
        let path = batch_output_path(Path::new("out"), 3, "20250101_120000");
        assert_eq!(path, PathBuf::from("out/results_batch_3_20250101_120000.csv"));
    }

    #[tokio::test]
    async fn init_append_close_produces_header_and_quoted_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/results_batch_1_x.csv");
        let sinks = OutputSinkRegistry::new();

        sinks.init(&path).await.unwrap();
        let record = ResultRecord::terminal("12345678", RecordStatus::NoProductFound, "No products found", "https://shop.example/search");
        sinks.append(&path, &record).await.unwrap();
        sinks.close(&path).await.unwrap();
        sinks.close(&path).await.unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let mut lines = content.lines();
        assert!(lines.next().unwrap().starts_with("UPC,AddToCart,ProductURL"));
        let row = lines.next().unwrap();
        assert!(row.starts_with("\"12345678\",\"NA\",\"https://shop.example/search\",\"NO PRODUCT FOUND\""));
        assert!(row.ends_with("\"\""));
        assert_eq!(sinks.open_count().await, 0);
    }

    #[tokio::test]
    async fn init_truncates_previous_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("batch.csv");
        std::fs::write(&path, "stale\nrows\n").unwrap();

        let sinks = OutputSinkRegistry::new();
        sinks.init(&path).await.unwrap();
        sinks.close(&path).await.unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap().lines().count(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn concurrent_batches_write_their_own_files() {
        let dir = tempfile::tempdir().unwrap();
        let first = dir.path().join("results_batch_1_x.csv");
        let second = dir.path().join("results_batch_2_x.csv");
        let sinks = OutputSinkRegistry::new();
        sinks.init(&first).await.unwrap();
        sinks.init(&second).await.unwrap();

        let writes = (0..20).map(|i| {
            let path = if i % 2 == 0 { &first } else { &second };
            let record = ResultRecord::terminal(&format!("1234567{i:02}"), RecordStatus::NoProductFound, "No products found", "");
            let sinks = &sinks;
            async move { sinks.append(path, &record).await }
        });
        for outcome in futures::future::join_all(writes).await {
            outcome.unwrap();
        }
        assert_eq!(sinks.open_count().await, 2);
        sinks.close(&first).await.unwrap();
        sinks.close(&second).await.unwrap();

        for path in [&first, &second] {
            let text = std::fs::read_to_string(path).unwrap();
            assert_eq!(text.lines().count(), 11, "{path:?}");
            assert!(text.lines().skip(1).all(|line| line.starts_with('"')));
        }
        assert_eq!(sinks.open_count().await, 0);
    }

    #[tokio::test]
    async fn append_after_close_reopens_in_append_mode() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("batch.csv");
        let sinks = OutputSinkRegistry::new();
        let record = ResultRecord::terminal("12345678", RecordStatus::NoProductFound, "No products found", "");

        sinks.init(&path).await.unwrap();
        sinks.append(&path, &record).await.unwrap();
        sinks.close(&path).await.unwrap();
        sinks.append(&path, &record).await.unwrap();
        sinks.close(&path).await.unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap().lines().count(), 3);
    }
}
