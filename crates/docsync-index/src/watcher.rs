//! Filesystem notifications turned into per-file [`RawEvent`]s.
//!
//! `notify` delivers events on its own thread. A converter thread translates
//! them and pushes the result into a bounded tokio channel, blocking when the
//! consumer falls behind. Nothing is dropped on backpressure.

use crate::exclusions::Exclusions;
use anyhow::{Context, Result};
use notify::event::{ModifyKind, RenameMode};
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self as std_mpsc, RecvTimeoutError};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// How long the source half of a rename waits for its destination.
const RENAME_WINDOW: Duration = Duration::from_millis(500);
const MAX_COMPLETED_RENAMES: usize = 4096;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawEvent {
    Created(PathBuf),
    Modified(PathBuf),
    Deleted(PathBuf),
    Moved { from: PathBuf, to: PathBuf },
    /// The OS dropped events; the tree must be reconciled.
    Rescan,
}

impl RawEvent {
    pub fn paths(&self) -> Vec<&Path> {
        match self {
            Self::Created(p) | Self::Modified(p) | Self::Deleted(p) => vec![p.as_path()],
            Self::Moved { from, to } => vec![from.as_path(), to.as_path()],
            Self::Rescan => Vec::new(),
        }
    }
}

/// Stateful translation of `notify` events.
///
/// Holds the source half of tracked renames until the destination arrives or
/// the rename window expires, and expands directory creates/moves into one
/// event per contained file.
pub(crate) struct EventTranslator {
    exclusions: Exclusions,
    pending_from: HashMap<usize, (PathBuf, Instant)>,
    completed: HashSet<usize>,
}

impl EventTranslator {
    pub(crate) fn new(exclusions: Exclusions) -> Self {
        Self {
            exclusions,
            pending_from: HashMap::new(),
            completed: HashSet::new(),
        }
    }

    pub(crate) fn translate(&mut self, event: Event, now: Instant) -> Vec<RawEvent> {
        let mut out = Vec::new();

        if event.need_rescan() {
            out.push(RawEvent::Rescan);
            return out;
        }

        let tracker = event.tracker();
        self.flush_paths(&event.paths, tracker, &mut out);

        match event.kind {
            EventKind::Create(_) => {
                for path in event.paths {
                    self.created(path, &mut out);
                }
            }
            EventKind::Modify(ModifyKind::Name(mode)) => {
                self.renamed(mode, tracker, event.paths, now, &mut out);
            }
            EventKind::Modify(_) => {
                for path in event.paths {
                    if path.is_dir() || self.exclusions.is_excluded(&path) {
                        continue;
                    }
                    out.push(RawEvent::Modified(path));
                }
            }
            EventKind::Remove(_) => {
                for path in event.paths {
                    self.deleted(path, &mut out);
                }
            }
            _ => {}
        }

        out
    }

    /// Rename sources whose destination never showed up are deletions.
    pub(crate) fn flush_expired(&mut self, now: Instant) -> Vec<RawEvent> {
        let expired: Vec<usize> = self
            .pending_from
            .iter()
            .filter(|(_, (_, seen))| now.duration_since(*seen) >= RENAME_WINDOW)
            .map(|(tracker, _)| *tracker)
            .collect();

        let mut out = Vec::new();
        for tracker in expired {
            if let Some((from, _)) = self.pending_from.remove(&tracker) {
                self.deleted(from, &mut out);
            }
        }
        out
    }

    pub(crate) fn flush_all(&mut self) -> Vec<RawEvent> {
        let mut out = Vec::new();
        let pending: Vec<PathBuf> = self.pending_from.drain().map(|(_, (p, _))| p).collect();
        for from in pending {
            self.deleted(from, &mut out);
        }
        out
    }

    /// Emit held rename sources before any unrelated event on the same path.
    fn flush_paths(&mut self, paths: &[PathBuf], tracker: Option<usize>, out: &mut Vec<RawEvent>) {
        let stale: Vec<usize> = self
            .pending_from
            .iter()
            .filter(|(t, (from, _))| Some(**t) != tracker && paths.contains(from))
            .map(|(t, _)| *t)
            .collect();

        for t in stale {
            if let Some((from, _)) = self.pending_from.remove(&t) {
                self.deleted(from, out);
            }
        }
    }

    fn renamed(
        &mut self,
        mode: RenameMode,
        tracker: Option<usize>,
        paths: Vec<PathBuf>,
        now: Instant,
        out: &mut Vec<RawEvent>,
    ) {
        match mode {
            RenameMode::From => {
                let Some(from) = paths.into_iter().next() else {
                    return;
                };
                match tracker {
                    Some(t) => {
                        self.pending_from.insert(t, (from, now));
                    }
                    None => self.deleted(from, out),
                }
            }
            RenameMode::To => {
                let Some(to) = paths.into_iter().next() else {
                    return;
                };
                let matched = tracker
                    .and_then(|t| self.pending_from.remove(&t).map(|(from, _)| (t, from)));
                match matched {
                    Some((t, from)) => {
                        if self.completed.len() >= MAX_COMPLETED_RENAMES {
                            self.completed.clear();
                        }
                        self.completed.insert(t);
                        self.moved(from, to, out);
                    }
                    None => self.created(to, out),
                }
            }
            RenameMode::Both => {
                if let Some(t) = tracker {
                    // Already reported through the From/To pair
                    if self.completed.remove(&t) {
                        return;
                    }
                    self.pending_from.remove(&t);
                }
                let mut paths = paths.into_iter();
                match (paths.next(), paths.next()) {
                    (Some(from), Some(to)) => self.moved(from, to, out),
                    (Some(path), None) => self.by_existence(path, out),
                    _ => {}
                }
            }
            RenameMode::Any | RenameMode::Other => {
                for path in paths {
                    self.by_existence(path, out);
                }
            }
        }
    }

    /// Backends that cannot pair renames report each side separately.
    fn by_existence(&self, path: PathBuf, out: &mut Vec<RawEvent>) {
        if path.exists() {
            self.created(path, out);
        } else {
            self.deleted(path, out);
        }
    }

    fn created(&self, path: PathBuf, out: &mut Vec<RawEvent>) {
        if self.exclusions.is_excluded(&path) {
            debug!("Skipping excluded path event: {:?}", path);
            return;
        }
        if path.is_dir() {
            out.extend(
                self.exclusions
                    .files_under(&path)
                    .into_iter()
                    .map(RawEvent::Created),
            );
        } else {
            out.push(RawEvent::Created(path));
        }
    }

    fn deleted(&self, path: PathBuf, out: &mut Vec<RawEvent>) {
        if self.exclusions.is_excluded(&path) {
            debug!("Skipping excluded path event: {:?}", path);
            return;
        }
        out.push(RawEvent::Deleted(path));
    }

    fn moved(&self, from: PathBuf, to: PathBuf, out: &mut Vec<RawEvent>) {
        let from_excluded = self.exclusions.is_excluded(&from);
        let to_excluded = self.exclusions.is_excluded(&to);

        match (from_excluded, to_excluded) {
            (true, true) => {}
            // e.g. an editor renaming its temp file over the real one
            (true, false) => self.created(to, out),
            (false, true) => self.deleted(from, out),
            (false, false) if to.is_dir() => {
                for file in self.exclusions.files_under(&to) {
                    match file.strip_prefix(&to) {
                        Ok(rel) => out.push(RawEvent::Moved {
                            from: from.join(rel),
                            to: file,
                        }),
                        Err(_) => out.push(RawEvent::Created(file)),
                    }
                }
            }
            (false, false) => out.push(RawEvent::Moved { from, to }),
        }
    }
}

/// A running recursive watch. Dropping it stops the watch and closes the
/// event channel once pending events are forwarded.
pub struct FileWatcher {
    _watcher: RecommendedWatcher,
}

impl FileWatcher {
    pub fn start(
        root: &Path,
        exclusions: Exclusions,
        events: mpsc::Sender<RawEvent>,
    ) -> Result<Self> {
        let (tx, rx) = std_mpsc::channel();

        let mut watcher = RecommendedWatcher::new(
            move |res| {
                let _ = tx.send(res);
            },
            Config::default(),
        )
        .context("Failed to create filesystem watcher")?;

        let translator = EventTranslator::new(exclusions);
        std::thread::Builder::new()
            .name("docsync-watcher".to_string())
            .spawn(move || forward_events(rx, translator, events))
            .context("Failed to spawn watcher thread")?;

        watcher
            .watch(root, RecursiveMode::Recursive)
            .with_context(|| format!("Failed to watch {:?}", root))?;
        info!("Watching directory: {:?}", root);

        Ok(Self { _watcher: watcher })
    }
}

fn forward_events(
    rx: std_mpsc::Receiver<notify::Result<Event>>,
    mut translator: EventTranslator,
    events: mpsc::Sender<RawEvent>,
) {
    loop {
        let batch = match rx.recv_timeout(RENAME_WINDOW / 2) {
            Ok(Ok(event)) => {
                debug!("File event: {:?}", event);
                let now = Instant::now();
                let mut batch = translator.flush_expired(now);
                batch.extend(translator.translate(event, now));
                batch
            }
            Ok(Err(e)) => {
                error!("Watch error: {}", e);
                continue;
            }
            Err(RecvTimeoutError::Timeout) => translator.flush_expired(Instant::now()),
            Err(RecvTimeoutError::Disconnected) => {
                send_all(&events, translator.flush_all());
                break;
            }
        };

        if !send_all(&events, batch) {
            warn!("Event channel closed");
            break;
        }
    }
    debug!("Watcher event loop stopped");
}

fn send_all(events: &mpsc::Sender<RawEvent>, batch: Vec<RawEvent>) -> bool {
    batch
        .into_iter()
        .all(|event| events.blocking_send(event).is_ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{AccessKind, CreateKind, DataChange, Flag, MetadataKind, RemoveKind};
    use std::fs;
    use tempfile::TempDir;

    fn setup() -> (TempDir, EventTranslator) {
        let dir = tempfile::tempdir().unwrap();
        let translator = EventTranslator::new(Exclusions::new(dir.path()));
        (dir, translator)
    }

    fn event(kind: EventKind, paths: &[&Path]) -> Event {
        paths
            .iter()
            .fold(Event::new(kind), |e, p| e.add_path(p.to_path_buf()))
    }

    fn rename(mode: RenameMode, paths: &[&Path], tracker: usize) -> Event {
        event(EventKind::Modify(ModifyKind::Name(mode)), paths).set_tracker(tracker)
    }

    #[test]
    fn test_create_modify_remove() {
        let (dir, mut t) = setup();
        let path = dir.path().join("notes.txt");
        let now = Instant::now();

        assert_eq!(
            t.translate(event(EventKind::Create(CreateKind::File), &[&path]), now),
            vec![RawEvent::Created(path.clone())]
        );
        assert_eq!(
            t.translate(
                event(EventKind::Modify(ModifyKind::Data(DataChange::Content)), &[&path]),
                now
            ),
            vec![RawEvent::Modified(path.clone())]
        );
        assert_eq!(
            t.translate(
                event(EventKind::Modify(ModifyKind::Metadata(MetadataKind::WriteTime)), &[&path]),
                now
            ),
            vec![RawEvent::Modified(path.clone())]
        );
        assert_eq!(
            t.translate(event(EventKind::Remove(RemoveKind::File), &[&path]), now),
            vec![RawEvent::Deleted(path)]
        );
    }

    #[test]
    fn test_directory_modify_and_access_ignored() {
        let (dir, mut t) = setup();
        let now = Instant::now();
        let modify_dir = event(EventKind::Modify(ModifyKind::Any), &[dir.path()]);
        assert!(t.translate(modify_dir, now).is_empty());

        let file = dir.path().join("a.txt");
        let access = event(EventKind::Access(AccessKind::Any), &[&file]);
        assert!(t.translate(access, now).is_empty());
    }

    #[test]
    fn test_excluded_paths_skipped() {
        let (dir, mut t) = setup();
        let now = Instant::now();
        let git = dir.path().join(".git").join("index");
        let swap = dir.path().join("notes.txt.swp");

        assert!(t.translate(event(EventKind::Create(CreateKind::File), &[&git]), now).is_empty());
        assert!(t.translate(event(EventKind::Remove(RemoveKind::File), &[&swap]), now).is_empty());
    }

    #[test]
    fn test_tracked_rename_pair() {
        let (dir, mut t) = setup();
        let from = dir.path().join("a.txt");
        let to = dir.path().join("b.txt");
        let now = Instant::now();

        assert!(t.translate(rename(RenameMode::From, &[&from], 7), now).is_empty());
        assert_eq!(
            t.translate(rename(RenameMode::To, &[&to], 7), now),
            vec![RawEvent::Moved {
                from: from.clone(),
                to: to.clone()
            }]
        );
        // inotify follows up with a combined event for the same rename
        assert!(t.translate(rename(RenameMode::Both, &[&from, &to], 7), now).is_empty());
        assert!(t.flush_expired(now + RENAME_WINDOW * 2).is_empty());
    }

    #[test]
    fn test_unpaired_rename_source_becomes_delete() {
        let (dir, mut t) = setup();
        let from = dir.path().join("a.txt");
        let now = Instant::now();

        assert!(t.translate(rename(RenameMode::From, &[&from], 3), now).is_empty());
        assert!(t.flush_expired(now + RENAME_WINDOW / 2).is_empty());
        assert_eq!(
            t.flush_expired(now + RENAME_WINDOW),
            vec![RawEvent::Deleted(from)]
        );
    }

    #[test]
    fn test_pending_source_flushed_before_later_event_on_same_path() {
        let (dir, mut t) = setup();
        let path = dir.path().join("a.txt");
        let now = Instant::now();

        t.translate(rename(RenameMode::From, &[&path], 9), now);
        assert_eq!(
            t.translate(event(EventKind::Create(CreateKind::File), &[&path]), now),
            vec![RawEvent::Deleted(path.clone()), RawEvent::Created(path)]
        );
    }

    #[test]
    fn test_rename_destination_without_source_is_create() {
        let (dir, mut t) = setup();
        let to = dir.path().join("incoming.txt");
        assert_eq!(
            t.translate(rename(RenameMode::To, &[&to], 11), Instant::now()),
            vec![RawEvent::Created(to)]
        );
    }

    #[test]
    fn test_combined_rename_without_pair() {
        let (dir, mut t) = setup();
        let from = dir.path().join("a.txt");
        let to = dir.path().join("b.txt");
        assert_eq!(
            t.translate(rename(RenameMode::Both, &[&from, &to], 4), Instant::now()),
            vec![RawEvent::Moved { from, to }]
        );
    }

    #[test]
    fn test_untracked_rename_uses_existence() {
        let (dir, mut t) = setup();
        let gone = dir.path().join("gone.txt");
        let here = dir.path().join("here.txt");
        fs::write(&here, "x").unwrap();
        let now = Instant::now();

        let any = |p: &Path| event(EventKind::Modify(ModifyKind::Name(RenameMode::Any)), &[p]);
        assert_eq!(t.translate(any(&gone), now), vec![RawEvent::Deleted(gone)]);
        assert_eq!(t.translate(any(&here), now), vec![RawEvent::Created(here)]);
    }

    #[test]
    fn test_rename_across_exclusion_boundary() {
        let (dir, mut t) = setup();
        let tmp = dir.path().join("report.docx~");
        let real = dir.path().join("report.docx");
        let hidden = dir.path().join(".trash").join("report.docx");
        let now = Instant::now();

        assert_eq!(
            t.translate(rename(RenameMode::Both, &[&tmp, &real], 1), now),
            vec![RawEvent::Created(real.clone())]
        );
        assert_eq!(
            t.translate(rename(RenameMode::Both, &[&real, &hidden], 2), now),
            vec![RawEvent::Deleted(real)]
        );
    }

    #[test]
    fn test_directory_create_expands_to_files() {
        let (dir, mut t) = setup();
        let sub = dir.path().join("project");
        fs::create_dir_all(sub.join("docs")).unwrap();
        fs::write(sub.join("a.txt"), "a").unwrap();
        fs::write(sub.join("docs").join("b.md"), "b").unwrap();

        let mut events = t.translate(
            event(EventKind::Create(CreateKind::Folder), &[&sub]),
            Instant::now(),
        );
        events.sort_by_key(|e| format!("{:?}", e));
        assert_eq!(
            events,
            vec![
                RawEvent::Created(sub.join("a.txt")),
                RawEvent::Created(sub.join("docs").join("b.md")),
            ]
        );
    }

    #[test]
    fn test_directory_move_expands_per_file() {
        let (dir, mut t) = setup();
        let old = dir.path().join("old");
        let new = dir.path().join("new");
        fs::create_dir_all(&new).unwrap();
        fs::write(new.join("a.txt"), "a").unwrap();

        assert_eq!(
            t.translate(rename(RenameMode::Both, &[&old, &new], 5), Instant::now()),
            vec![RawEvent::Moved {
                from: old.join("a.txt"),
                to: new.join("a.txt")
            }]
        );
    }

    #[test]
    fn test_rescan_flag() {
        let (dir, mut t) = setup();
        let e = event(EventKind::Other, &[dir.path()]).set_flag(Flag::Rescan);
        assert_eq!(t.translate(e, Instant::now()), vec![RawEvent::Rescan]);
    }

    #[test]
    fn test_flush_all_emits_pending_deletes() {
        let (dir, mut t) = setup();
        let from = dir.path().join("a.txt");
        t.translate(rename(RenameMode::From, &[&from], 1), Instant::now());
        assert_eq!(t.flush_all(), vec![RawEvent::Deleted(from)]);
        assert!(t.flush_all().is_empty());
    }

    #[test]
    fn test_event_paths() {
        let moved = RawEvent::Moved {
            from: PathBuf::from("/a"),
            to: PathBuf::from("/b"),
        };
        assert_eq!(moved.paths(), vec![Path::new("/a"), Path::new("/b")]);
        assert!(RawEvent::Rescan.paths().is_empty());
    }

    #[tokio::test]
    async fn test_dropping_watcher_closes_channel() {
        let dir = tempfile::tempdir().unwrap();
        let (tx, mut rx) = mpsc::channel(16);
        let watcher = FileWatcher::start(dir.path(), Exclusions::new(dir.path()), tx).unwrap();
        drop(watcher);

        let closed = tokio::time::timeout(Duration::from_secs(5), async {
            while rx.recv().await.is_some() {}
        })
        .await;
        assert!(closed.is_ok());
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn test_watch_reports_create_rename_delete_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().canonicalize().unwrap();
        let (tx, mut rx) = mpsc::channel(64);
        let watcher = FileWatcher::start(&root, Exclusions::new(&root), tx).unwrap();

        let a = root.join("a.txt");
        let b = root.join("b.txt");
        let pause = Duration::from_millis(200);
        fs::write(&a, "draft").unwrap();
        tokio::time::sleep(pause).await;
        fs::rename(&a, &b).unwrap();
        tokio::time::sleep(pause).await;
        fs::remove_file(&b).unwrap();

        let mut seen = Vec::new();
        let done = tokio::time::timeout(Duration::from_secs(10), async {
            while let Some(event) = rx.recv().await {
                let last = event == RawEvent::Deleted(b.clone());
                seen.push(event);
                if last {
                    break;
                }
            }
        })
        .await;
        drop(watcher);
        assert!(done.is_ok(), "no delete for b.txt in {:?}", seen);

        let position = |wanted: &RawEvent| seen.iter().position(|e| e == wanted);
        let created = position(&RawEvent::Created(a.clone())).unwrap();
        let moved = position(&RawEvent::Moved {
            from: a.clone(),
            to: b.clone(),
        })
        .unwrap();
        let deleted = position(&RawEvent::Deleted(b.clone())).unwrap();
        assert!(created < moved && moved < deleted, "{:?}", seen);
    }
}
