//! nas-ingest - audio triage-and-repair service
//!
//! Watches the ingestion directory, scores each new audio file, completes
//! metadata for clean files and quarantines and repairs defective ones.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use nas_common::logging::init_logging;
use nas_ingest::config::{self, IngestConfig};
use nas_ingest::db::Ledger;
use nas_ingest::pipeline::build_engine;
use nas_ingest::services::{work_queue, IngestWatcher, TriageEngine, WorkerPool};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Command-line arguments for nas-ingest
#[derive(Parser, Debug)]
#[command(name = "nas-ingest")]
#[command(about = "Audio triage-and-repair ingestion service")]
#[command(version)]
struct Args {
    /// Configuration file (default: ~/.config/nas/config.toml, then /etc/nas/config.toml)
    #[arg(short, long, env = "NAS_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Root folder holding the ingestion, quarantine and workspace directories
    #[arg(short, long, env = "NAS_ROOT_FOLDER", global = true)]
    root_folder: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    /// Sweep, then watch the ingestion directory until interrupted (default)
    Run,
    /// Sweep once, process everything found, and exit
    Sweep,
    /// Print a JSON summary of the ledger
    Report,
    /// Print the resolved configuration
    PrintConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let (file, config) = config::load(args.config.as_deref(), args.root_folder.as_deref())
        .context("Failed to load configuration")?;
    init_logging(&file.bootstrap.logging).context("Failed to initialize logging")?;

    match args.command.unwrap_or(Command::Run) {
        Command::PrintConfig => {
            println!("{}", toml::to_string_pretty(&config)?);
            Ok(())
        }
        Command::Report => report(&config).await,
        Command::Sweep => process(&config, false).await,
        Command::Run => process(&config, true).await,
    }
}

async fn report(config: &IngestConfig) -> Result<()> {
    let ledger = Ledger::open(&config.database_path, config.db_max_lock_wait_ms)
        .await
        .context("Failed to open ledger")?;
    let summary = ledger.summary().await.context("Failed to summarize ledger")?;
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

/// Recover, sweep, and (in watch mode) follow the ingestion directory
async fn process(config: &IngestConfig, watch: bool) -> Result<()> {
    info!(
        root_folder = %config.root_folder.display(),
        database = %config.database_path.display(),
        mode = if watch { "run" } else { "sweep" },
        "Starting nas-ingest"
    );

    config
        .ensure_directories()
        .context("Failed to create working directories")?;

    let ledger = Arc::new(
        Ledger::open(&config.database_path, config.db_max_lock_wait_ms)
            .await
            .context("Failed to open ledger")?,
    );
    info!(records = ledger.count().await?, "Ledger ready");

    let engine: Arc<TriageEngine> = Arc::new(
        build_engine(config, Arc::clone(&ledger))
            .await
            .context("Failed to build triage pipeline")?,
    );

    engine
        .recover_interrupted()
        .await
        .context("Startup recovery failed")?;

    let cancel = CancellationToken::new();
    let (tx, rx) = work_queue(config.queue_capacity);
    let pool = WorkerPool::spawn(
        Arc::clone(&engine),
        rx,
        tx.downgrade(),
        config.workers,
        cancel.clone(),
    );

    let watcher = IngestWatcher::new(
        config.ingest_dir.clone(),
        config.extensions.clone(),
        config.settle_delay(),
        tx,
    );

    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        signal_cancel.cancel();
    });

    let sweep = async {
        tokio::select! {
            result = watcher.sweep() => result.map(|_| ()),
            _ = cancel.cancelled() => Ok(()),
        }
    };

    if watch {
        let (sweep_result, watch_result) = tokio::join!(sweep, watcher.watch(cancel.cancelled()));
        sweep_result.context("Startup sweep failed")?;
        watch_result.context("Watcher failed")?;
    } else {
        sweep.await.context("Sweep failed")?;
    }

    // Dropping the last producer closes the queue; workers drain it unless cancelled
    drop(watcher);
    let handled = pool.join().await;

    if cancel.is_cancelled() {
        warn!(handled, "Stopped by signal; queued files will be picked up by the next sweep");
    } else {
        info!(handled, "All queued files processed");
    }
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
