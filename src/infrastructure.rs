//! Infrastructure layer for configuration, persistence, and browser integration
//!
//! This module provides configuration loading, logging, the browser driver
//! seam and its WebDriver implementation, and the durable stores an audit
//! run writes to (checkpoint log, per-batch CSV output, snapshots).

pub mod browser_driver;
pub mod checkpoint_store;
pub mod config;
pub mod logging;
pub mod output_sink;
pub mod retry_policy;
pub mod snapshot;
pub mod wait;
pub mod webdriver_client;

// Re-export commonly used items
pub use browser_driver::{BrowserDriver, BrowserSession, DriverError, DriverResult, ElementRef, Locator};
pub use checkpoint_store::CheckpointStore;
pub use config::{AppConfig, ConfigError, ConfigManager, ExecutionMode};
pub use logging::{init_logging_with_config, log_system_info};
pub use output_sink::{OutputSinkRegistry, batch_output_path, run_stamp};
pub use retry_policy::RetryPolicy;
pub use snapshot::SnapshotRecorder;
pub use webdriver_client::{WebDriverClient, WebDriverSession};
