// ABOUTME: Command-line entry point that runs one incremental sync of a route catalog
// ABOUTME: Wires catalog, credentials, checkpoint file, and HTTP client into the orchestrator
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Riptide Sync

//! Riptide sync runner.
//!
//! Usage:
//! ```bash
//! # Sync the built-in demo catalog against public APIs
//! cargo run --bin riptide-sync
//!
//! # Sync a custom catalog with a bounded record count per route
//! RIPTIDE_API_KEY=... RIPTIDE_RECORD_LIMIT=500 \
//!     cargo run --bin riptide-sync -- --catalog routes.json
//! ```

use std::path::Path;
use std::process;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::sync::watch;
use tracing::{error, info, warn};

use riptide::catalog::RouteCatalog;
use riptide::checkpoint::{CheckpointStore, CursorManager, FileCheckpointStore};
use riptide::client::ResilientClient;
use riptide::config::SyncConfig;
use riptide::logging::LoggingConfig;
use riptide::orchestrator::Orchestrator;
use riptide::sink::StdoutSink;
use riptide::RunStatus;

#[derive(Parser)]
#[command(
    name = "riptide-sync",
    about = "Incremental REST sync runner",
    version
)]
struct SyncArgs {
    /// Route catalog JSON file (omit to run the built-in demo catalog)
    #[arg(long)]
    catalog: Option<String>,

    /// Checkpoint state file
    #[arg(long, default_value = "riptide-state.json")]
    checkpoint: String,

    /// Concurrent routes (overrides RIPTIDE_WORKERS)
    #[arg(long)]
    workers: Option<usize>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = SyncArgs::parse();

    LoggingConfig::from_env()
        .init()
        .context("failed to initialize logging")?;

    let status = run(args).await?;
    if !matches!(status, RunStatus::Success) {
        process::exit(1);
    }
    Ok(())
}

async fn run(args: SyncArgs) -> Result<RunStatus> {
    let config = SyncConfig::from_env().context("invalid environment configuration")?;

    let catalog = match &args.catalog {
        Some(path) => RouteCatalog::from_file(Path::new(path))
            .with_context(|| format!("failed to load catalog from {path}"))?,
        None => {
            info!("no catalog given, using built-in demo routes");
            RouteCatalog::demo()
        }
    };
    let catalog = catalog.with_overrides(&config.param_overrides, config.record_limit);
    config.require_credential(&catalog)?;

    let store = FileCheckpointStore::new(&args.checkpoint);
    let cursors = Arc::new(CursorManager::new());
    if let Some(snapshot) = store.load().await.context("failed to read checkpoint file")? {
        info!(path = %args.checkpoint, routes = snapshot.positions.len(), "resuming from checkpoint");
        cursors.load(snapshot).await;
    }

    let client = ResilientClient::with_timeouts(
        config.retry_policy(),
        config.credential.clone(),
        Duration::from_secs(config.timeout_secs),
        Duration::from_secs(riptide::client::DEFAULT_CONNECT_TIMEOUT_SECS),
    )
    .context("failed to build HTTP client")?;
    let sink = Arc::new(StdoutSink::new(store));
    let (cancel_tx, cancel_rx) = watch::channel(false);

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, finishing in-flight pages");
            let _ = cancel_tx.send(true);
        }
    });

    let workers = args.workers.unwrap_or(config.workers);
    let orchestrator = Orchestrator::new(Arc::new(catalog), Arc::new(client), sink, cursors)
        .with_workers(workers)
        .with_cancellation(cancel_rx);

    let summary = orchestrator.run().await;
    for failed in summary.failed_routes() {
        error!(route = %failed, "route did not complete");
    }
    Ok(summary.status)
}
