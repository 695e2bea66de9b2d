//! upc-cart-audit - command line entry point
//!
//! Loads configuration, sets up logging, connects to the WebDriver endpoint
//! and runs the audit. Exit code 0 means every scheduled identifier was
//! recorded, 1 means the run stopped short, 2 means it never got going.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use upc_cart_audit::crawling::Orchestrator;
use upc_cart_audit::infrastructure::{
    AppConfig, ConfigManager, ExecutionMode, WebDriverClient, init_logging_with_config, log_system_info,
};

/// Command-line arguments
#[derive(Parser, Debug)]
#[command(name = "upc-cart-audit")]
#[command(about = "Checks storefront add-to-cart availability for a list of UPCs")]
#[command(version)]
struct Args {
    /// Configuration file (TOML or JSON)
    #[arg(short, long, env = "UPC_AUDIT_CONFIG")]
    config: Option<PathBuf>,

    /// Identifier list, one per line
    #[arg(short, long)]
    input: Option<PathBuf>,

    /// Batch execution mode
    #[arg(long, value_enum)]
    mode: Option<ExecutionMode>,

    /// Identifiers per batch
    #[arg(long)]
    batch_size: Option<usize>,

    /// WebDriver endpoint, e.g. http://localhost:9515
    #[arg(long)]
    webdriver_url: Option<String>,
}

impl Args {
    fn apply(&self, config: &mut AppConfig) {
        if let Some(input) = &self.input {
            config.input.identifier_file = input.clone();
        }
        if let Some(mode) = self.mode {
            config.batch.execution_mode = mode;
        }
        if let Some(batch_size) = self.batch_size {
            config.batch.batch_size = batch_size;
        }
        if let Some(url) = &self.webdriver_url {
            config.browser.webdriver_url = url.clone();
        }
    }
}

fn load_config(args: &Args) -> Result<AppConfig> {
    let manager = ConfigManager::new(args.config.clone());
    let mut config = manager.load().context("Failed to load configuration")?;
    args.apply(&mut config);
    config.validate().context("Invalid configuration")?;
    Ok(config)
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let config = match load_config(&args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("❌ {e:#}");
            return ExitCode::from(2);
        }
    };

    match init_logging_with_config(&config.logging, &config.output.log_dir()) {
        Ok(path) => info!("📝 Logging to {:?}", path),
        Err(e) => eprintln!("⚠️ Logging setup failed: {e:#}"),
    }
    log_system_info();

    match run(config).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(1),
        Err(e) => {
            error!("❌ Run aborted: {:#}", e);
            ExitCode::from(2)
        }
    }
}

async fn run(config: AppConfig) -> Result<bool> {
    let driver = WebDriverClient::new(&config.browser).context("Failed to create WebDriver client")?;
    info!("🌐 WebDriver endpoint: {}", config.browser.webdriver_url);

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("⏹️ Interrupt received, finishing in-flight items");
            on_signal.cancel();
        }
    });

    let orchestrator = Orchestrator::new(Arc::new(driver), config);
    let summary = orchestrator.run(cancel).await.context("Audit run failed")?;
    Ok(summary.completed_all())
}
