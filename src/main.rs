use anyhow::{bail, Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use storewatch::cli::{parse_args, print_help};
use storewatch::config::Config;
use storewatch::health::ReportMetrics;
use storewatch::ingest;
use storewatch::jobs::{ReportJobManager, ReportStatus};
use storewatch::server;
use storewatch::store::{MemoryJobStore, ReferenceData};

#[tokio::main]
async fn main() -> Result<()> {
    let args = parse_args();

    if args.help {
        print_help();
        return Ok(());
    }

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("storewatch=info".parse()?),
        )
        .init();

    info!("storewatch v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config = Config::from_env()?;
    info!("Configuration loaded");
    info!("  Data directory: {}", config.data_dir.display());
    info!("  HTTP port: {}", config.http_port);

    // Handle --validate mode
    if args.validate {
        info!("Validating configuration...");
        match config.validate() {
            Ok(()) => {
                info!("Configuration is valid");
                return Ok(());
            }
            Err(e) => {
                error!("{}", e);
                std::process::exit(1);
            }
        }
    }

    let (store, summary) = ingest::load_dir(&config.data_dir)
        .with_context(|| format!("Failed to load data from {}", config.data_dir.display()))?;
    let skipped = summary.timezones.skipped + summary.menu_hours.skipped + summary.store_status.skipped;
    if skipped > 0 {
        warn!("{} malformed input rows were skipped", skipped);
    }

    let data: Arc<dyn ReferenceData> = Arc::new(store);
    let manager = ReportJobManager::new(
        Arc::new(MemoryJobStore::new()),
        data,
        Arc::new(ReportMetrics::new()),
    )
    .with_data_dir(config.data_dir.clone());

    // Generate a single report (for batch use) or serve the API
    if args.once {
        let output = args
            .output
            .map(PathBuf::from)
            .unwrap_or_else(|| config.report_output.clone());
        return run_once(&manager, output).await;
    }

    let cancel_token = CancellationToken::new();
    let server_handle = {
        let manager = manager.clone();
        let cancel = cancel_token.clone();
        let port = config.http_port;
        tokio::spawn(async move {
            server::run_server(port, manager, cancel).await;
        })
    };

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    info!("Shutdown signal received");
    cancel_token.cancel();

    if let Err(e) = server_handle.await {
        error!("Server task failed: {}", e);
    }

    Ok(())
}

/// Generate one report and write its CSV to `output`
async fn run_once(manager: &ReportJobManager, output: PathBuf) -> Result<()> {
    info!("Generating single report (--once mode)");

    let report_id = manager.create()?;
    manager
        .start(&report_id)
        .await
        .context("Report task did not finish")?;

    match manager.status(&report_id)? {
        ReportStatus::Complete(payload) => {
            tokio::fs::write(&output, payload.csv)
                .await
                .with_context(|| format!("Failed to write {}", output.display()))?;
            info!("Report {} written to {}", report_id, output.display());
            Ok(())
        }
        ReportStatus::Failed(message) => bail!("Report generation failed: {}", message),
        other => bail!("Report {} ended in unexpected state {:?}", report_id, other),
    }
}
