//! Configuration infrastructure
//!
//! Contains configuration loading and validation for an audit run.
//!
//! Configuration is layered:
//! 1. Built-in defaults (see [`defaults`])
//! 2. Optional TOML/JSON file (`--config`, or the per-user default path)
//! 3. Environment overrides, `UPC_AUDIT__<SECTION>__<KEY>`

#![allow(clippy::derivable_impls)]

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

/// Environment variable prefix for overrides
pub const ENV_PREFIX: &str = "UPC_AUDIT";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load config: {source}")]
    FileLoad {
        #[from]
        source: config::ConfigError,
    },

    #[error("Configuration validation failed: {message}")]
    Validation { message: String },
}

/// Complete application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub site: SiteConfig,
    pub input: InputConfig,
    pub batch: BatchConfig,
    pub recovery: RecoveryConfig,
    pub output: OutputConfig,
    pub browser: BrowserConfig,
    pub timing: TimingConfig,
    pub run: RunConfig,
    pub logging: LoggingConfig,
}

/// Storefront address and credentials
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SiteConfig {
    pub base_url: String,
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InputConfig {
    /// Line-oriented identifier list
    pub identifier_file: PathBuf,

    /// Drop repeated identifiers, keeping the first occurrence
    pub deduplicate: bool,
}

/// How batches are scheduled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    #[default]
    Sequential,
    Parallel,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Number of identifiers per batch
    pub batch_size: usize,

    pub execution_mode: ExecutionMode,

    /// Upper bound on batches running at once (parallel mode only)
    pub max_concurrent_batches: Option<usize>,
}

/// Per-item retry and backoff settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecoveryConfig {
    /// Additional attempts after the first one
    pub retry_count: u32,
    pub retry_delay_ms: u64,
    /// Random extra delay added on each retry, 0 disables it
    pub retry_jitter_ms: u64,
    /// Pause after a blocked page before the next item
    pub blocked_backoff_ms: u64,
    pub snapshot_timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub output_dir: PathBuf,

    /// Defaults to `<output_dir>/progress/checkpoint.txt`
    pub checkpoint_file: Option<PathBuf>,

    /// Defaults to `<output_dir>/screenshots`
    pub screenshot_dir: Option<PathBuf>,

    pub screenshots_enabled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserConfig {
    pub webdriver_url: String,
    pub headless: bool,
    pub window_zoom: f64,
    pub page_load_timeout_secs: u64,
    pub script_timeout_secs: u64,
}

/// Storefront interaction timings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    pub search_timeout_ms: u64,
    pub poll_interval_ms: u64,
    pub resubmit_after_ms: u64,
    pub search_attempts: u32,
    pub page_ready_timeout_ms: u64,
    pub element_timeout_ms: u64,
    pub spinner_timeout_ms: u64,
    pub price_wait_ms: u64,
    pub stock_wait_ms: u64,
    pub field_timeout_ms: u64,
    pub short_field_timeout_ms: u64,
    pub spec_table_timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Wall-clock limit for the whole run
    pub run_timeout_secs: Option<u64>,

    /// Grace period for in-flight batches after cancellation
    pub shutdown_timeout_secs: u64,
}

/// Logging configuration settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "error", "warn", "info", "debug", "trace"
    pub level: String,

    /// Enable JSON formatted logs
    pub json_format: bool,

    /// Enable console output
    pub console_output: bool,

    /// Enable file output
    pub file_output: bool,

    /// Number of log files to keep (older files will be deleted)
    pub max_files: u32,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            identifier_file: PathBuf::from(defaults::IDENTIFIER_FILE),
            deduplicate: defaults::DEDUPLICATE,
        }
    }
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            batch_size: defaults::BATCH_SIZE,
            execution_mode: ExecutionMode::default(),
            max_concurrent_batches: None,
        }
    }
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            retry_count: defaults::RETRY_COUNT,
            retry_delay_ms: defaults::RETRY_DELAY_MS,
            retry_jitter_ms: 0,
            blocked_backoff_ms: defaults::BLOCKED_BACKOFF_MS,
            snapshot_timeout_ms: defaults::SNAPSHOT_TIMEOUT_MS,
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from(defaults::OUTPUT_DIR),
            checkpoint_file: None,
            screenshot_dir: None,
            screenshots_enabled: defaults::SCREENSHOTS_ENABLED,
        }
    }
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            webdriver_url: defaults::WEBDRIVER_URL.to_string(),
            headless: false,
            window_zoom: defaults::WINDOW_ZOOM,
            page_load_timeout_secs: defaults::PAGE_LOAD_TIMEOUT_SECS,
            script_timeout_secs: defaults::SCRIPT_TIMEOUT_SECS,
        }
    }
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            search_timeout_ms: defaults::SEARCH_TIMEOUT_MS,
            poll_interval_ms: defaults::POLL_INTERVAL_MS,
            resubmit_after_ms: defaults::RESUBMIT_AFTER_MS,
            search_attempts: defaults::SEARCH_ATTEMPTS,
            page_ready_timeout_ms: defaults::PAGE_READY_TIMEOUT_MS,
            element_timeout_ms: defaults::ELEMENT_TIMEOUT_MS,
            spinner_timeout_ms: defaults::SPINNER_TIMEOUT_MS,
            price_wait_ms: defaults::PRICE_WAIT_MS,
            stock_wait_ms: defaults::STOCK_WAIT_MS,
            field_timeout_ms: defaults::FIELD_TIMEOUT_MS,
            short_field_timeout_ms: defaults::SHORT_FIELD_TIMEOUT_MS,
            spec_table_timeout_ms: defaults::SPEC_TABLE_TIMEOUT_MS,
        }
    }
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            run_timeout_secs: None,
            shutdown_timeout_secs: defaults::SHUTDOWN_TIMEOUT_SECS,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: defaults::LOG_LEVEL.to_string(),
            json_format: defaults::LOG_JSON_FORMAT,
            console_output: defaults::LOG_CONSOLE_OUTPUT,
            file_output: defaults::LOG_FILE_OUTPUT,
            max_files: defaults::LOG_MAX_FILES,
        }
    }
}

impl OutputConfig {
    pub fn checkpoint_path(&self) -> PathBuf {
        self.checkpoint_file
            .clone()
            .unwrap_or_else(|| self.output_dir.join("progress").join("checkpoint.txt"))
    }

    pub fn screenshot_path(&self) -> PathBuf {
        self.screenshot_dir
            .clone()
            .unwrap_or_else(|| self.output_dir.join("screenshots"))
    }

    pub fn log_dir(&self) -> PathBuf {
        self.output_dir.join("logs")
    }
}

impl RecoveryConfig {
    pub const fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub const fn retry_jitter(&self) -> Duration {
        Duration::from_millis(self.retry_jitter_ms)
    }

    pub const fn blocked_backoff(&self) -> Duration {
        Duration::from_millis(self.blocked_backoff_ms)
    }

    pub const fn snapshot_timeout(&self) -> Duration {
        Duration::from_millis(self.snapshot_timeout_ms)
    }
}

impl TimingConfig {
    pub const fn search_timeout(&self) -> Duration {
        Duration::from_millis(self.search_timeout_ms)
    }

    pub const fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub const fn resubmit_after(&self) -> Duration {
        Duration::from_millis(self.resubmit_after_ms)
    }

    pub const fn page_ready_timeout(&self) -> Duration {
        Duration::from_millis(self.page_ready_timeout_ms)
    }

    pub const fn element_timeout(&self) -> Duration {
        Duration::from_millis(self.element_timeout_ms)
    }

    pub const fn spinner_timeout(&self) -> Duration {
        Duration::from_millis(self.spinner_timeout_ms)
    }

    pub const fn price_wait(&self) -> Duration {
        Duration::from_millis(self.price_wait_ms)
    }

    pub const fn stock_wait(&self) -> Duration {
        Duration::from_millis(self.stock_wait_ms)
    }

    pub const fn field_timeout(&self) -> Duration {
        Duration::from_millis(self.field_timeout_ms)
    }

    pub const fn short_field_timeout(&self) -> Duration {
        Duration::from_millis(self.short_field_timeout_ms)
    }

    pub const fn spec_table_timeout(&self) -> Duration {
        Duration::from_millis(self.spec_table_timeout_ms)
    }
}

impl RunConfig {
    pub fn run_timeout(&self) -> Option<Duration> {
        self.run_timeout_secs.map(Duration::from_secs)
    }

    pub const fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }
}

impl AppConfig {
    /// 설정값 유효성 검증
    pub fn validate(&self) -> Result<(), ConfigError> {
        let fail = |message: &str| {
            Err(ConfigError::Validation {
                message: message.to_string(),
            })
        };

        if self.site.base_url.trim().is_empty() {
            return fail("site.base_url must not be empty");
        }
        if url::Url::parse(&self.site.base_url).is_err() {
            return fail("site.base_url is not a valid URL");
        }
        if self.site.username.trim().is_empty() || self.site.password.is_empty() {
            return fail("site.username and site.password are required");
        }
        if self.batch.batch_size == 0 {
            return fail("batch.batch_size must be greater than 0");
        }
        if self.batch.max_concurrent_batches == Some(0) {
            return fail("batch.max_concurrent_batches must be greater than 0 when set");
        }
        if self.browser.window_zoom <= 0.0 {
            return fail("browser.window_zoom must be greater than 0");
        }
        if self.timing.poll_interval_ms == 0 {
            return fail("timing.poll_interval_ms must be greater than 0");
        }
        if self.timing.search_attempts == 0 {
            return fail("timing.search_attempts must be greater than 0");
        }
        Ok(())
    }
}

/// Configuration manager for locating and loading settings
pub struct ConfigManager {
    pub config_path: Option<PathBuf>,
    explicit: bool,
}

impl ConfigManager {
    /// Get the application configuration directory
    pub fn get_config_dir() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("upc-cart-audit"))
    }

    /// Uses `path` when given (must exist), else the per-user default (optional).
    pub fn new(path: Option<PathBuf>) -> Self {
        match path {
            Some(path) => Self {
                config_path: Some(path),
                explicit: true,
            },
            None => Self {
                config_path: Self::get_config_dir().map(|dir| dir.join("config.toml")),
                explicit: false,
            },
        }
    }

    /// Builds the layered configuration. Validation is left to the caller so
    /// command-line overrides can be applied first.
    pub fn load(&self) -> Result<AppConfig, ConfigError> {
        let mut builder = config::Config::builder();

        if let Some(path) = &self.config_path {
            builder = builder.add_source(config::File::from(path.as_path()).required(self.explicit));
            info!("📁 Config source: {} (required: {})", path.display(), self.explicit);
        }

        let settings = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        Ok(settings.try_deserialize()?)
    }

    pub fn path(&self) -> Option<&Path> {
        self.config_path.as_deref()
    }
}

/// Configuration default values
pub mod defaults {
    pub const IDENTIFIER_FILE: &str = "upcs.txt";
    pub const DEDUPLICATE: bool = true;

    pub const BATCH_SIZE: usize = 250;

    pub const RETRY_COUNT: u32 = 1;
    pub const RETRY_DELAY_MS: u64 = 1500;
    pub const BLOCKED_BACKOFF_MS: u64 = 5000;
    pub const SNAPSHOT_TIMEOUT_MS: u64 = 10_000;

    pub const OUTPUT_DIR: &str = "ScrapingOutputResults";
    pub const SCREENSHOTS_ENABLED: bool = true;

    pub const WEBDRIVER_URL: &str = "http://localhost:9515";
    pub const WINDOW_ZOOM: f64 = 0.5;
    pub const PAGE_LOAD_TIMEOUT_SECS: u64 = 60;
    pub const SCRIPT_TIMEOUT_SECS: u64 = 30;

    pub const SEARCH_TIMEOUT_MS: u64 = 45_000;
    pub const POLL_INTERVAL_MS: u64 = 500;
    pub const RESUBMIT_AFTER_MS: u64 = 800;
    pub const SEARCH_ATTEMPTS: u32 = 2;
    pub const PAGE_READY_TIMEOUT_MS: u64 = 20_000;
    pub const ELEMENT_TIMEOUT_MS: u64 = 20_000;
    pub const SPINNER_TIMEOUT_MS: u64 = 10_000;
    pub const PRICE_WAIT_MS: u64 = 8000;
    pub const STOCK_WAIT_MS: u64 = 4000;
    pub const FIELD_TIMEOUT_MS: u64 = 8000;
    pub const SHORT_FIELD_TIMEOUT_MS: u64 = 3000;
    pub const SPEC_TABLE_TIMEOUT_MS: u64 = 5000;

    pub const SHUTDOWN_TIMEOUT_SECS: u64 = 120;

    pub const LOG_LEVEL: &str = "info";
    pub const LOG_JSON_FORMAT: bool = false;
    pub const LOG_CONSOLE_OUTPUT: bool = true;
    pub const LOG_FILE_OUTPUT: bool = true;
    pub const LOG_MAX_FILES: u32 = 10;
}
