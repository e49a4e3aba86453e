//! Concurrent event processing with per-path ordering.
//!
//! A dispatcher reads the watcher channel and routes each event to one of N
//! shard workers by a stable hash of its path. Each shard has its own bounded
//! queue and handles its events strictly one after another, so two events for
//! the same path never overlap or reorder while unrelated paths proceed in
//! parallel.
//!
//! A delete is expanded into one delete per tracked file below it before
//! routing, so a removed directory never touches keys owned by other shards.

use crate::engine::{SyncEngine, SyncOutcome};
use crate::error::SyncError;
use crate::watcher::RawEvent;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Totals over a runner's lifetime.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunStats {
    pub processed: usize,
    pub indexed: usize,
    pub unchanged: usize,
    pub deleted: usize,
    pub moved: usize,
    pub skipped: usize,
    pub rescans: usize,
    pub errors: usize,
}

impl RunStats {
    fn record(&mut self, outcome: &SyncOutcome) {
        self.processed += 1;
        match outcome {
            SyncOutcome::New | SyncOutcome::Modified => self.indexed += 1,
            SyncOutcome::Unchanged => self.unchanged += 1,
            SyncOutcome::Deleted { tracked: true } => self.deleted += 1,
            SyncOutcome::Deleted { tracked: false } | SyncOutcome::Skipped => self.skipped += 1,
            SyncOutcome::Moved { target } => {
                self.moved += 1;
                if matches!(**target, SyncOutcome::New | SyncOutcome::Modified) {
                    self.indexed += 1;
                }
            }
            SyncOutcome::Rescanned(report) => {
                self.rescans += 1;
                self.errors += report.errors;
            }
        }
    }

    fn merge(&mut self, other: &RunStats) {
        self.processed += other.processed;
        self.indexed += other.indexed;
        self.unchanged += other.unchanged;
        self.deleted += other.deleted;
        self.moved += other.moved;
        self.skipped += other.skipped;
        self.rescans += other.rescans;
        self.errors += other.errors;
    }
}

enum Job {
    Event(RawEvent),
    /// Acknowledged once every job queued before it has finished.
    Barrier(oneshot::Sender<()>),
}

pub struct SyncRunner {
    engine: Arc<SyncEngine>,
    workers: usize,
    queue_capacity: usize,
}

impl SyncRunner {
    pub fn new(engine: Arc<SyncEngine>, workers: usize, queue_capacity: usize) -> Self {
        Self {
            engine,
            workers: workers.max(1),
            queue_capacity: queue_capacity.max(1),
        }
    }

    /// Process events until the channel closes or a fatal error occurs.
    ///
    /// On a clean close every queued event is finished before returning.
    pub async fn run(self, mut events: mpsc::Receiver<RawEvent>) -> Result<RunStats, SyncError> {
        let (fatal_tx, mut fatal_rx) = mpsc::channel::<SyncError>(self.workers);
        let per_shard = (self.queue_capacity / self.workers).max(1);

        let mut shards = Vec::with_capacity(self.workers);
        let mut handles: Vec<JoinHandle<RunStats>> = Vec::with_capacity(self.workers);
        for id in 0..self.workers {
            let (tx, rx) = mpsc::channel(per_shard);
            shards.push(tx);
            handles.push(tokio::spawn(shard_worker(
                id,
                self.engine.clone(),
                rx,
                fatal_tx.clone(),
            )));
        }
        drop(fatal_tx);
        info!("Sync runner started with {} workers", self.workers);

        let mut stats = RunStats::default();
        let result = loop {
            tokio::select! {
                biased;
                Some(err) = fatal_rx.recv() => break Err(err),
                event = events.recv() => {
                    let alive = match event {
                        Some(RawEvent::Rescan) => match self.rescan(&shards).await {
                            Ok(alive) => {
                                if alive {
                                    stats.rescans += 1;
                                }
                                alive
                            }
                            Err(e) => break Err(e),
                        },
                        Some(RawEvent::Deleted(path)) => match self.expand_delete(path).await {
                            Ok(events) => dispatch_all(&shards, events).await,
                            Err(e) => break Err(e),
                        },
                        Some(event) => dispatch(&shards, event).await,
                        None => break Ok(()),
                    };
                    if !alive {
                        // A worker only exits early after a fatal error
                        break match fatal_rx.try_recv() {
                            Ok(err) => Err(err),
                            Err(_) => Ok(()),
                        };
                    }
                }
            }
        };

        drop(shards);
        match result {
            Ok(()) => {
                for handle in handles {
                    match handle.await {
                        Ok(shard_stats) => stats.merge(&shard_stats),
                        Err(e) => error!("Sync worker failed: {}", e),
                    }
                }
                // A worker may have failed while the last events drained
                if let Ok(err) = fatal_rx.try_recv() {
                    error!("Stopping sync runner: {}", err);
                    return Err(err);
                }
                info!(
                    "Sync runner stopped: {} events, {} indexed, {} unchanged, {} deleted, {} moved, {} errors",
                    stats.processed,
                    stats.indexed,
                    stats.unchanged,
                    stats.deleted,
                    stats.moved,
                    stats.errors
                );
                Ok(stats)
            }
            Err(e) => {
                error!("Stopping sync runner: {}", e);
                for handle in handles {
                    handle.abort();
                }
                Err(e)
            }
        }
    }

    async fn expand_delete(&self, path: PathBuf) -> Result<Vec<RawEvent>, SyncError> {
        let engine = self.engine.clone();
        let fallback = RawEvent::Deleted(path.clone());
        match tokio::task::spawn_blocking(move || engine.expand_delete(&path)).await {
            Ok(result) => result,
            Err(e) => {
                error!("Delete expansion failed: {}", e);
                Ok(vec![fallback])
            }
        }
    }

    /// Drain every shard, then reconcile the whole tree.
    async fn rescan(&self, shards: &[mpsc::Sender<Job>]) -> Result<bool, SyncError> {
        warn!("Filesystem events were dropped, rescanning");

        let mut acks = Vec::with_capacity(shards.len());
        for shard in shards {
            let (tx, rx) = oneshot::channel();
            if shard.send(Job::Barrier(tx)).await.is_err() {
                return Ok(false);
            }
            acks.push(rx);
        }
        for ack in acks {
            if ack.await.is_err() {
                return Ok(false);
            }
        }

        let engine = self.engine.clone();
        match tokio::task::spawn_blocking(move || engine.reconcile()).await {
            Ok(Ok(_)) => Ok(true),
            Ok(Err(e)) => Err(e),
            Err(e) => {
                error!("Rescan task failed: {}", e);
                Ok(true)
            }
        }
    }
}

async fn shard_worker(
    id: usize,
    engine: Arc<SyncEngine>,
    mut jobs: mpsc::Receiver<Job>,
    fatal: mpsc::Sender<SyncError>,
) -> RunStats {
    let mut stats = RunStats::default();

    while let Some(job) = jobs.recv().await {
        let event = match job {
            Job::Event(event) => event,
            Job::Barrier(done) => {
                let _ = done.send(());
                continue;
            }
        };

        let engine = engine.clone();
        match tokio::task::spawn_blocking(move || engine.handle(event)).await {
            Ok(Ok(outcome)) => stats.record(&outcome),
            Ok(Err(e)) if e.is_fatal() => {
                let _ = fatal.send(e).await;
                break;
            }
            Ok(Err(e)) => {
                warn!("[!] {}", e);
                stats.errors += 1;
            }
            Err(e) => {
                error!("[!] Sync task failed: {}", e);
                stats.errors += 1;
            }
        }
    }

    debug!("Sync worker {} stopped", id);
    stats
}

async fn dispatch_all(shards: &[mpsc::Sender<Job>], events: Vec<RawEvent>) -> bool {
    for event in events {
        if !dispatch(shards, event).await {
            return false;
        }
    }
    true
}

async fn dispatch(shards: &[mpsc::Sender<Job>], event: RawEvent) -> bool {
    for (shard, event) in route(event, shards.len()) {
        if shards[shard].send(Job::Event(event)).await.is_err() {
            return false;
        }
    }
    true
}

fn shard_of(path: &Path, shards: usize) -> usize {
    let mut hasher = DefaultHasher::new();
    path.hash(&mut hasher);
    (hasher.finish() % shards as u64) as usize
}

/// Assign an event to the shard owning its path. A move whose endpoints live
/// on different shards becomes a delete on one and a create on the other.
/// Events without a path have no owner and route nowhere.
fn route(event: RawEvent, shards: usize) -> Vec<(usize, RawEvent)> {
    let owners: Vec<usize> = event.paths().iter().map(|p| shard_of(p, shards)).collect();
    match (event, owners.as_slice()) {
        (RawEvent::Moved { from, to }, &[src, dst]) if src != dst => {
            info!("[→] File moved from {} to {}", from.display(), to.display());
            vec![(src, RawEvent::Deleted(from)), (dst, RawEvent::Created(to))]
        }
        (event, &[owner, ..]) => vec![(owner, event)],
        (_, &[]) => Vec::new(),
    }
}
