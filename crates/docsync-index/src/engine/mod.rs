//! Incremental synchronization engine.
//!
//! For every filesystem event the engine decides whether the index has to
//! change, drives the change through [`IndexClient`], and only then records
//! the new content hash in the [`RecordStore`]. A path is `Untracked` while it
//! has no record and `Tracked(hash)` afterwards.
//!
//! Every method is idempotent: replaying an event converges to the same
//! state, so at-least-once delivery from the watcher is safe.

use crate::client::{IndexClient, Metadata};
use crate::error::SyncError;
use crate::exclusions::Exclusions;
use crate::fingerprint::hash_file;
use crate::store::RecordStore;
use crate::watcher::RawEvent;
use docsync_extract::{ExtractError, TextExtractor};
use serde::Serialize;
use std::collections::HashSet;
use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use std::sync::Arc;
use std::time::UNIX_EPOCH;
use tracing::{debug, info, warn};

/// What a single event did to the index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    New,
    Modified,
    Unchanged,
    /// `tracked` is false when nothing was recorded for the path.
    Deleted { tracked: bool },
    Moved { target: Box<SyncOutcome> },
    /// The path vanished or is not a regular file.
    Skipped,
    Rescanned(ScanReport),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ScanReport {
    pub scanned: usize,
    pub indexed: usize,
    pub unchanged: usize,
    pub removed: usize,
    pub skipped: usize,
    pub errors: usize,
}

/// Shared by all sync workers; every collaborator is behind an `Arc` and is
/// itself safe for concurrent use.
pub struct SyncEngine {
    records: Arc<RecordStore>,
    index: Arc<dyn IndexClient>,
    extractor: Arc<TextExtractor>,
    exclusions: Exclusions,
}

fn path_key(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

fn modified_secs(metadata: &fs::Metadata) -> f64 {
    metadata
        .modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

impl SyncEngine {
    pub fn new(
        records: Arc<RecordStore>,
        index: Arc<dyn IndexClient>,
        extractor: Arc<TextExtractor>,
        exclusions: Exclusions,
    ) -> Self {
        Self {
            records,
            index,
            extractor,
            exclusions,
        }
    }

    pub fn exclusions(&self) -> &Exclusions {
        &self.exclusions
    }

    pub fn handle(&self, event: RawEvent) -> Result<SyncOutcome, SyncError> {
        match event {
            RawEvent::Created(path) | RawEvent::Modified(path) => self.sync_path(&path),
            RawEvent::Deleted(path) => self.remove_path(&path),
            RawEvent::Moved { from, to } => self.move_path(&from, &to),
            RawEvent::Rescan => self.reconcile().map(SyncOutcome::Rescanned),
        }
    }

    /// Bring the index in line with the current content of `path`.
    ///
    /// Re-indexes only when the content hash differs from the recorded one.
    /// The record is written after the index accepted the document, so a
    /// failure anywhere before leaves the previous state in place.
    pub fn sync_path(&self, path: &Path) -> Result<SyncOutcome, SyncError> {
        let key = path_key(path);

        let metadata = match fs::metadata(path) {
            Ok(m) => m,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(self.vanished(&key)),
            Err(source) => return Err(SyncError::Io { path: key, source }),
        };
        if !metadata.is_file() {
            debug!("Skipping non-file {}", key);
            return Ok(SyncOutcome::Skipped);
        }
        let last_modified = modified_secs(&metadata);

        let hash = match hash_file(path) {
            Ok(h) => h,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(self.vanished(&key)),
            Err(source) => return Err(SyncError::Io { path: key, source }),
        };

        let existing = self.records.get(&key).map_err(SyncError::Storage)?;
        if let Some(record) = &existing
            && record.content_hash == hash.as_str()
        {
            info!("[=] Unchanged: {}", key);
            return Ok(SyncOutcome::Unchanged);
        }

        let text = match self.extractor.extract(path) {
            Ok(text) => text,
            Err(ExtractError::NotFound(_)) => return Ok(self.vanished(&key)),
            Err(source) => return Err(SyncError::Extraction { path: key, source }),
        };

        let mut meta = Metadata::new();
        meta.insert("source".to_string(), key.clone());
        if let Some(name) = path.file_name() {
            meta.insert("file_name".to_string(), name.to_string_lossy().into_owned());
        }
        meta.insert(
            "format".to_string(),
            self.extractor.family_for(path).label().to_string(),
        );
        meta.insert("content_hash".to_string(), hash.to_string());
        meta.insert("last_modified".to_string(), last_modified.to_string());

        let vector = self
            .index
            .embed(&text)
            .map_err(|source| SyncError::Backend {
                path: key.clone(),
                source,
            })?;
        self.index
            .upsert(&key, &text, &vector, &meta)
            .map_err(|source| SyncError::Backend {
                path: key.clone(),
                source,
            })?;

        self.records
            .upsert(&key, last_modified, hash.as_str())
            .map_err(SyncError::Storage)?;

        if existing.is_some() {
            info!("[*] Modified content: {}", key);
            Ok(SyncOutcome::Modified)
        } else {
            info!("[+] New file: {}", key);
            Ok(SyncOutcome::New)
        }
    }

    /// Forget exactly `path`.
    ///
    /// The index entry is deleted even without a record: an upsert whose
    /// record write was lost would otherwise stay in the index for good.
    pub fn remove_path(&self, path: &Path) -> Result<SyncOutcome, SyncError> {
        let key = path_key(path);
        let tracked = self.records.get(&key).map_err(SyncError::Storage)?.is_some();

        self.remove_key(&key)?;
        if tracked {
            info!("[-] Deleted: {}", key);
        } else {
            debug!("Delete of untracked path {}", key);
        }
        Ok(SyncOutcome::Deleted { tracked })
    }

    /// One `Deleted` per key a delete of `path` affects: every tracked file
    /// below it (a removed directory arrives as a single event), then `path`
    /// itself.
    pub fn expand_delete(&self, path: &Path) -> Result<Vec<RawEvent>, SyncError> {
        let nested = self
            .records
            .paths_under(&path_key(path))
            .map_err(SyncError::Storage)?;

        let mut events: Vec<RawEvent> = nested
            .into_iter()
            .map(|child| RawEvent::Deleted(child.into()))
            .collect();
        events.push(RawEvent::Deleted(path.to_path_buf()));
        Ok(events)
    }

    /// A rename drops the source entry and indexes the destination. The
    /// destination is synced even when removing the source failed.
    pub fn move_path(&self, from: &Path, to: &Path) -> Result<SyncOutcome, SyncError> {
        info!("[→] File moved from {} to {}", from.display(), to.display());
        let removed = self.remove_path(from);
        let target = self.sync_path(to);

        removed?;
        Ok(SyncOutcome::Moved {
            target: Box::new(target?),
        })
    }

    /// Walk the whole root, syncing every file, then drop records for files
    /// that disappeared while nobody was watching, and index entries that
    /// lost their record.
    pub fn reconcile(&self) -> Result<ScanReport, SyncError> {
        let root = self.exclusions.root();
        info!("Reconciling {:?}", root);
        let mut report = ScanReport::default();

        for file in self.exclusions.files_under(root) {
            report.scanned += 1;
            match self.sync_path(&file) {
                Ok(SyncOutcome::New | SyncOutcome::Modified) => report.indexed += 1,
                Ok(SyncOutcome::Unchanged) => report.unchanged += 1,
                Ok(_) => report.skipped += 1,
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    warn!("[!] {}", e);
                    report.errors += 1;
                }
            }
        }

        let tracked = self
            .records
            .paths_under(&path_key(root))
            .map_err(SyncError::Storage)?;
        for key in tracked {
            let path = Path::new(&key);
            if path.is_file() && !self.exclusions.is_excluded(path) {
                continue;
            }
            match self.remove_key(&key) {
                Ok(()) => {
                    info!("[-] Deleted: {}", key);
                    report.removed += 1;
                }
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    warn!("[!] {}", e);
                    report.errors += 1;
                }
            }
        }

        self.prune_orphans(root, &mut report)?;

        info!(
            "Reconciled {:?}: {} scanned, {} indexed, {} unchanged, {} removed, {} errors",
            root,
            report.scanned,
            report.indexed,
            report.unchanged,
            report.removed,
            report.errors
        );
        Ok(report)
    }

    /// Index entries under `root` with no record and no file behind them.
    fn prune_orphans(&self, root: &Path, report: &mut ScanReport) -> Result<(), SyncError> {
        let recorded: HashSet<String> = self
            .records
            .all_paths()
            .map_err(SyncError::Storage)?
            .into_iter()
            .collect();

        let indexed = match self.index.paths() {
            Ok(paths) => paths,
            Err(e) => {
                warn!("[!] Cannot list index entries: {}", e);
                report.errors += 1;
                return Ok(());
            }
        };

        for key in indexed {
            let path = Path::new(&key);
            if recorded.contains(&key)
                || !path.starts_with(root)
                || (path.is_file() && !self.exclusions.is_excluded(path))
            {
                continue;
            }
            match self.index.delete(&key) {
                Ok(()) => {
                    info!("[-] Deleted orphaned index entry: {}", key);
                    report.removed += 1;
                }
                Err(e) => {
                    warn!("[!] index backend failed for {}: {}", key, e);
                    report.errors += 1;
                }
            }
        }
        Ok(())
    }

    /// Index entry first: if it fails the record survives and a later event
    /// retries the removal.
    fn remove_key(&self, key: &str) -> Result<(), SyncError> {
        self.index
            .delete(key)
            .map_err(|source| SyncError::Backend {
                path: key.to_string(),
                source,
            })?;
        self.records.delete(key).map_err(SyncError::Storage)?;
        Ok(())
    }

    fn vanished(&self, key: &str) -> SyncOutcome {
        info!("[!] Skipped {}: no longer exists", key);
        SyncOutcome::Skipped
    }
}
