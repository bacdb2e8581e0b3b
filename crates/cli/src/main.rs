//! uqw: submit URLs appended to watched files for analysis and collect the
//! resulting artifacts, by polling and via inbound webhooks.
//!
//! # Usage
//!
//! ```bash
//! uqw --config uqw.yaml
//!
//! # Via environment variables
//! UQW_CONFIG=uqw.yaml UQW_APIKEY=... uqw
//! ```

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::{error, warn};
use tracing_subscriber::EnvFilter;

use uqw_cli::signals::{self, QuitSignal};
use uqw_cli::{exit_status, CliArgs, Orchestrator};
use uqw_client::{HttpScanService, ScanService};
use uqw_core::AppConfig;

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    uqw_core::config::load_dotenv();
    let args = CliArgs::parse();

    let result = run(args).await;
    if let Err(e) = &result {
        error!("{e:#}");
    }
    ExitCode::from(exit_status(&result))
}

async fn run(args: CliArgs) -> anyhow::Result<()> {
    // Installed first so an interrupt during startup takes the graceful path.
    let mut quit = QuitSignal::new().context("failed to install signal handlers")?;

    let mut config = AppConfig::from_file(&args.config)
        .with_context(|| format!("failed to load config {}", args.config.display()))?;
    if let Some(secs) = args.shutdown_timeout {
        config.shutdown_timeout_secs = secs;
    }
    config.log_summary();

    let service: Arc<dyn ScanService> = Arc::new(
        HttpScanService::new(&config.api_url, &config.api_key).context("failed to build API client")?,
    );

    let orchestrator = Orchestrator::new(config, service)?;
    tokio::select! {
        _ = orchestrator.log_webhook_hint() => {}
        _ = quit.recv() => {
            warn!("quit signal received during startup, nothing started");
            return Ok(());
        }
    }

    let running = orchestrator.start().await?;
    signals::wait_for_quit(quit).await;
    running.shutdown().await?;
    Ok(())
}
