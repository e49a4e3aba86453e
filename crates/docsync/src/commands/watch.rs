//! Keep the index in sync until interrupted

use anyhow::{Context, Result};
use docsync_index::{FileWatcher, RawEvent, SyncEngine, SyncRunner};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use super::common::{open_handles, resolve_root};
use crate::config::{ConfigArgs, SyncConfig};

/// How long queued events may keep running after Ctrl-C.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

pub fn watch(path: &Path, args: &ConfigArgs) -> Result<()> {
    let root = resolve_root(path)?;
    let config = SyncConfig::resolve(&root, args)?;

    info!("Watching: {:?}", config.root);
    info!("Data directory: {:?}", config.data_dir);

    let handles = open_handles(&config)?;
    let engine = handles.engine.clone();

    // Start watching before the initial scan so nothing that changes during
    // the scan is missed; those events queue up and replay idempotently.
    let (tx, rx) = mpsc::channel(config.queue_capacity);
    let watcher = FileWatcher::start(&config.root, engine.exclusions().clone(), tx)?;

    let report = engine.reconcile()?;
    info!(
        "Initial scan: {} indexed, {} unchanged, {} removed, {} errors",
        report.indexed, report.unchanged, report.removed, report.errors
    );
    info!("Tracking {} files", handles.records.count()?);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")?;

    let result = runtime.block_on(run_until_interrupted(&config, engine, watcher, rx));
    runtime.shutdown_timeout(SHUTDOWN_GRACE);
    result
}

async fn run_until_interrupted(
    config: &SyncConfig,
    engine: Arc<SyncEngine>,
    watcher: FileWatcher,
    events: mpsc::Receiver<RawEvent>,
) -> Result<()> {
    let mut runner: JoinHandle<_> = tokio::spawn(
        SyncRunner::new(engine, config.workers, config.queue_capacity).run(events),
    );

    tokio::select! {
        finished = &mut runner => {
            // The runner only stops by itself on a fatal error
            drop(watcher);
            finished.context("Sync runner panicked")??;
            return Ok(());
        }
        signal = tokio::signal::ctrl_c() => {
            signal.context("Failed to listen for Ctrl-C")?;
            info!("Interrupted, finishing queued events");
        }
    }

    // Closing the watch closes the event channel, which lets the runner drain
    drop(watcher);
    match tokio::time::timeout(SHUTDOWN_GRACE, runner).await {
        Ok(finished) => {
            let stats = finished.context("Sync runner panicked")??;
            info!(
                "Stopped after {} events ({} indexed, {} deleted, {} errors)",
                stats.processed, stats.indexed, stats.deleted, stats.errors
            );
        }
        Err(_) => warn!("Shutdown grace period elapsed, abandoning queued events"),
    }
    Ok(())
}
