//! Vault filesystem watcher with echo suppression
//!
//! Bridges raw `notify` events into note-level events:
//! - per-path debounce and coalescing of the raw event stream
//! - settle detection so half-written files are never read
//! - own-write recognition via write flags and expected content hashes
//! - rename synthesis from delete/create pairs using embedded identity
//! - index reconciliation before every emitted event
//!
//! All bookkeeping lives in a single loop task; the shared maps
//! ([`ExpectedContent`], write flags) are the only state touched from
//! outside it.

use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant, SystemTime};

use anyhow::{bail, Context, Result};
use dashmap::DashMap;
use notify::event::{ModifyKind, RenameMode};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, trace, warn};

use vellum_core::hash::{hash_bytes, read_file_stable, ContentHash};
use vellum_core::note::{extract_note_id, NoteId};
use vellum_core::paths::{is_markdown, rel_display, vault_relative};
use vellum_index::VaultIndex;

use crate::config::SyncConfig;
use crate::events::{EventBus, NoteEvent, SyncStats};
use crate::ignore::IgnoreRules;
use crate::reconcile::{record_from_disk, Reconciler};
use crate::writer::ExpectedContent;

/// Upper bound on how long a busy file can postpone its own processing
const SETTLE_CAP: Duration = Duration::from_secs(3);

/// What a burst of raw events boils down to for one path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FsChange {
    Appeared,
    Modified,
    Vanished,
}

/// Map a notify event kind onto [`FsChange`]
///
/// Platforms that cannot tell rename direction report `Name(Any)` or
/// `Name(Both)`; existence of the concrete path disambiguates those.
fn map_event_kind(kind: &EventKind, exists: impl Fn() -> bool) -> Option<FsChange> {
    match kind {
        EventKind::Create(_) => Some(FsChange::Appeared),
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => Some(FsChange::Vanished),
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => Some(FsChange::Appeared),
        EventKind::Modify(ModifyKind::Name(_)) => {
            if exists() {
                Some(FsChange::Appeared)
            } else {
                Some(FsChange::Vanished)
            }
        }
        // Permission and mtime-only changes carry no content
        EventKind::Modify(ModifyKind::Metadata(_)) => None,
        EventKind::Modify(_) => Some(FsChange::Modified),
        EventKind::Remove(_) => Some(FsChange::Vanished),
        EventKind::Access(_) => None,
        _ => None,
    }
}

/// Merge a later raw change into an earlier one within the debounce window
///
/// `None` means the pair cancels out entirely (created and deleted before
/// anyone looked).
fn coalesce(old: FsChange, new: FsChange) -> Option<FsChange> {
    use FsChange::*;
    match (old, new) {
        (Appeared, Vanished) => None,
        (Appeared, _) => Some(Appeared),
        // Atomic replace: the path vanished and came back with new content
        (Vanished, Appeared) => Some(Modified),
        (_, Vanished) => Some(Vanished),
        (Modified, _) => Some(Modified),
        (Vanished, Modified) => Some(Modified),
    }
}

struct PendingChange {
    change: FsChange,
    deadline: tokio::time::Instant,
}

/// A delete held back for the rename window
///
/// If a matching appearance shows up before `expires_at`, the pair becomes
/// one rename. Otherwise the delete is reported on expiry.
struct RecentDeletion {
    note_id: NoteId,
    old_path: PathBuf,
    content_hash: Option<ContentHash>,
    deleted_at: tokio::time::Instant,
    expires_at: tokio::time::Instant,
}

/// Pick the deletion a newly appeared file continues, if any
///
/// Embedded identity is the only accepted evidence; an appearance without
/// one never claims a held deletion, it ages out as a plain delete.
fn take_matching_deletion(
    deletions: &mut HashMap<NoteId, RecentDeletion>,
    embedded: Option<NoteId>,
) -> Option<RecentDeletion> {
    deletions.remove(&embedded?)
}

struct WriteFlag {
    started_at: Instant,
    completed_at: Option<Instant>,
}

fn flag_live(flag: &WriteFlag, linger: Duration, stale_after: Duration) -> bool {
    match flag.completed_at {
        Some(done) => done.elapsed() < linger,
        // A start with no completion means the write is (or died) in
        // flight; age it out eventually
        None => flag.started_at.elapsed() < stale_after,
    }
}

/// Paths this process is currently writing, with a short linger after
/// completion so the trailing notification still reads as our own
struct WriteFlags {
    flags: DashMap<PathBuf, WriteFlag>,
}

impl WriteFlags {
    fn new() -> Self {
        Self {
            flags: DashMap::new(),
        }
    }

    fn mark_starting(&self, rel: &Path) {
        self.flags.insert(
            rel.to_path_buf(),
            WriteFlag {
                started_at: Instant::now(),
                completed_at: None,
            },
        );
    }

    fn mark_complete(&self, rel: &Path) {
        match self.flags.get_mut(rel) {
            Some(mut flag) => flag.completed_at = Some(Instant::now()),
            None => {
                self.flags.insert(
                    rel.to_path_buf(),
                    WriteFlag {
                        started_at: Instant::now(),
                        completed_at: Some(Instant::now()),
                    },
                );
            }
        }
    }

    fn is_active(&self, rel: &Path, linger: Duration, stale_after: Duration) -> bool {
        self.flags
            .get(rel)
            .map(|flag| flag_live(&flag, linger, stale_after))
            .unwrap_or(false)
    }

    fn sweep(&self, linger: Duration, stale_after: Duration) {
        self.flags
            .retain(|_, flag| flag_live(flag, linger, stale_after));
    }

    fn clear(&self) {
        self.flags.clear();
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.flags.len()
    }
}

struct WatchHandles {
    backend: RecommendedWatcher,
    task: Option<tokio::task::JoinHandle<()>>,
    shutdown: Option<oneshot::Sender<()>>,
}

/// Watches a vault directory and turns filesystem noise into [`NoteEvent`]s
///
/// One instance per vault. `start` spawns the loop task; every emitted
/// event reflects an index that has already been updated.
pub struct ChangeWatcher {
    vault_root: PathBuf,
    config: SyncConfig,
    index: Arc<VaultIndex>,
    reconciler: Arc<dyn Reconciler>,
    expected: Arc<ExpectedContent>,
    ignore: Arc<IgnoreRules>,
    bus: EventBus,
    write_flags: WriteFlags,
    open_notes: Mutex<HashSet<PathBuf>>,
    running: Mutex<Option<WatchHandles>>,
}

impl ChangeWatcher {
    pub fn new(
        vault_root: impl Into<PathBuf>,
        config: SyncConfig,
        index: Arc<VaultIndex>,
        reconciler: Arc<dyn Reconciler>,
        expected: Arc<ExpectedContent>,
        ignore: Arc<IgnoreRules>,
    ) -> Arc<Self> {
        let vault_root = vault_root.into();
        // Backends report symlink-resolved paths; the root has to match
        // them or strip_prefix fails on every event
        let vault_root = vault_root.canonicalize().unwrap_or(vault_root);
        Arc::new(Self {
            vault_root,
            config,
            index,
            reconciler,
            expected,
            ignore,
            bus: EventBus::new(),
            write_flags: WriteFlags::new(),
            open_notes: Mutex::new(HashSet::new()),
            running: Mutex::new(None),
        })
    }

    /// Begin watching the vault recursively
    pub fn start(self: &Arc<Self>) -> Result<()> {
        let mut running = self.running.lock();
        if running.is_some() {
            bail!("watcher already running for {}", self.vault_root.display());
        }

        let (raw_tx, raw_rx) = mpsc::channel::<notify::Result<Event>>(256);
        let mut backend = RecommendedWatcher::new(
            move |res| {
                let _ = raw_tx.blocking_send(res);
            },
            notify::Config::default(),
        )
        .context("creating filesystem watcher")?;
        backend
            .watch(&self.vault_root, RecursiveMode::Recursive)
            .with_context(|| format!("watching {}", self.vault_root.display()))?;

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let task = tokio::spawn(watch_loop(Arc::downgrade(self), raw_rx, shutdown_rx));
        *running = Some(WatchHandles {
            backend,
            task: Some(task),
            shutdown: Some(shutdown_tx),
        });
        info!(vault = %self.vault_root.display(), "watching vault");
        Ok(())
    }

    /// Stop watching; undelivered debounced events are discarded
    pub async fn stop(&self) {
        let handles = self.running.lock().take();
        let Some(mut handles) = handles else {
            return;
        };
        if let Some(shutdown) = handles.shutdown.take() {
            let _ = shutdown.send(());
        }
        drop(handles.backend);
        if let Some(task) = handles.task.take() {
            let _ = task.await;
        }
        // A later start must classify from scratch
        self.write_flags.clear();
        self.open_notes.lock().clear();
        info!(vault = %self.vault_root.display(), "watcher stopped");
    }

    pub fn is_watching(&self) -> bool {
        self.running.lock().is_some()
    }

    /// Handler registration lives here
    pub fn events(&self) -> &EventBus {
        &self.bus
    }

    /// Full scan bringing the index in line with disk, bracketed by
    /// sync lifecycle events
    pub async fn initial_sync(&self) -> Result<SyncStats> {
        self.bus.emit(&NoteEvent::SyncStarted);
        let stats = self.reconciler.reconcile().await?;
        self.bus.emit(&NoteEvent::SyncCompleted { stats });
        Ok(stats)
    }

    /// Reconciliation pass run between classifying an external event and
    /// emitting it, so subscribers never observe an event ahead of the index
    ///
    /// Failure is logged and the classified event still goes out; the next
    /// external event or a manual sync retries the repair.
    async fn bracketed_reconcile(&self) {
        self.bus.emit(&NoteEvent::SyncStarted);
        match self.reconciler.reconcile().await {
            Ok(stats) => self.bus.emit(&NoteEvent::SyncCompleted { stats }),
            Err(err) => warn!(error = %err, "reconciliation before event failed"),
        }
    }

    /// Flag a path before this process writes or deletes it
    pub fn mark_write_starting(&self, path: &Path) -> Result<()> {
        let rel = self.rel_of(path)?;
        self.write_flags.mark_starting(&rel);
        Ok(())
    }

    /// Clear the flag; recognition lingers briefly for the trailing event
    pub fn mark_write_complete(&self, path: &Path) -> Result<()> {
        let rel = self.rel_of(path)?;
        self.write_flags.mark_complete(&rel);
        Ok(())
    }

    /// Record that a note is open for editing (conflict detection)
    pub fn mark_note_open(&self, path: &Path) -> Result<()> {
        let rel = self.rel_of(path)?;
        self.open_notes.lock().insert(rel);
        Ok(())
    }

    pub fn mark_note_closed(&self, path: &Path) -> Result<()> {
        let rel = self.rel_of(path)?;
        self.open_notes.lock().remove(&rel);
        Ok(())
    }

    /// Vault-relative form of a caller-supplied path
    ///
    /// The stored root is symlink-resolved; a caller may hold the vault
    /// through a symlink, so on a miss the parent directory (the leaf may
    /// not exist yet) is resolved and the strip retried.
    fn rel_of(&self, path: &Path) -> Result<PathBuf> {
        match vault_relative(&self.vault_root, path) {
            Ok(rel) => Ok(rel),
            Err(err) => {
                let (Some(parent), Some(name)) = (path.parent(), path.file_name()) else {
                    return Err(err);
                };
                match parent.canonicalize() {
                    Ok(dir) => vault_relative(&self.vault_root, &dir.join(name)),
                    Err(_) => Err(err),
                }
            }
        }
    }

    pub fn open_note_count(&self) -> usize {
        self.open_notes.lock().len()
    }

    /// Fold one raw notify event into the pending map
    fn ingest(&self, event: Event, pending: &mut HashMap<PathBuf, PendingChange>) {
        for path in &event.paths {
            if !is_markdown(path) || self.ignore.should_ignore(path) {
                continue;
            }
            let rel = match vault_relative(&self.vault_root, path) {
                Ok(rel) => rel,
                Err(_) => continue,
            };
            let Some(change) = map_event_kind(&event.kind, || path.exists()) else {
                continue;
            };
            trace!(path = %rel.display(), ?change, "raw change");

            let deadline = tokio::time::Instant::now() + self.config.watch_debounce();
            match pending.entry(rel) {
                Entry::Occupied(mut entry) => match coalesce(entry.get().change, change) {
                    Some(merged) => {
                        entry.get_mut().change = merged;
                        entry.get_mut().deadline = deadline;
                    }
                    None => {
                        entry.remove();
                    }
                },
                Entry::Vacant(entry) => {
                    entry.insert(PendingChange { change, deadline });
                }
            }
        }
    }

    /// Handle every pending path whose debounce deadline has passed
    async fn process_due(
        &self,
        pending: &mut HashMap<PathBuf, PendingChange>,
        deletions: &mut HashMap<NoteId, RecentDeletion>,
    ) {
        let now = tokio::time::Instant::now();
        let mut due: Vec<(PathBuf, FsChange)> = pending
            .iter()
            .filter(|(_, p)| p.deadline <= now)
            .map(|(path, p)| (path.clone(), p.change))
            .collect();
        for (path, _) in &due {
            pending.remove(path);
        }
        // Removals go first so a paired appearance finds its deletion record
        due.sort_by_key(|(_, change)| match change {
            FsChange::Vanished => 0,
            _ => 1,
        });

        for (rel, change) in due {
            match change {
                FsChange::Vanished => self.process_vanished(&rel, deletions).await,
                FsChange::Appeared | FsChange::Modified => {
                    self.process_present(&rel, deletions).await
                }
            }
        }

        self.expire_deletions(deletions, tokio::time::Instant::now())
            .await;
    }

    async fn process_vanished(&self, rel: &Path, deletions: &mut HashMap<NoteId, RecentDeletion>) {
        let rel_str = rel_display(rel);

        if self.write_flags.is_active(
            rel,
            self.config.write_flag_linger(),
            self.config.expectation_ttl(),
        ) {
            // Our own deletion; keep the index straight without telling
            // anyone
            if let Err(err) = self.index.remove_note_by_path(&rel_str) {
                warn!(path = %rel_str, error = %err, "failed to drop own deletion from index");
            }
            debug!(path = %rel_str, "own deletion observed");
            return;
        }

        let row = match self.index.note_by_path(&rel_str) {
            Ok(row) => row,
            Err(err) => {
                warn!(path = %rel_str, error = %err, "index lookup failed for removed file");
                return;
            }
        };
        let Some(row) = row else {
            // No identity to correlate a rename with; report right away
            debug!(path = %rel_str, "untracked file removed");
            self.bracketed_reconcile().await;
            self.bus.emit(&NoteEvent::ExternalDelete {
                path: rel.to_path_buf(),
                note_id: None,
            });
            return;
        };

        let now = tokio::time::Instant::now();
        debug!(path = %rel_str, "delete observed; holding for rename window");
        deletions.insert(
            row.id,
            RecentDeletion {
                note_id: row.id,
                old_path: rel.to_path_buf(),
                content_hash: Some(row.content_hash),
                deleted_at: now,
                expires_at: now + self.config.rename_window(),
            },
        );
    }

    async fn process_present(&self, rel: &Path, deletions: &mut HashMap<NoteId, RecentDeletion>) {
        let abs = self.vault_root.join(rel);
        let Some(bytes) = self.settle_and_read(&abs).await else {
            return;
        };
        let hash = hash_bytes(&bytes);
        let content = String::from_utf8_lossy(&bytes);
        let rel_str = rel_display(rel);
        let embedded = extract_note_id(&content);

        // Own-write recognition: flag first, then the expectation map
        if self.write_flags.is_active(
            rel,
            self.config.write_flag_linger(),
            self.config.expectation_ttl(),
        ) {
            self.expected.consume(rel, &hash);
            self.absorb_own_write(rel, &rel_str, &content, &abs, hash, embedded);
            return;
        }
        if self.expected.consume(rel, &hash) {
            self.absorb_own_write(rel, &rel_str, &content, &abs, hash, embedded);
            return;
        }

        let row = match self.index.note_by_path(&rel_str) {
            Ok(row) => row,
            Err(err) => {
                warn!(path = %rel_str, error = %err, "index lookup failed for changed file");
                return;
            }
        };

        match row {
            Some(existing) => {
                if existing.content_hash == hash {
                    trace!(path = %rel_str, "content unchanged; dropping event");
                    return;
                }
                if self.config.detect_conflicts && self.open_notes.lock().contains(rel) {
                    // The open editor keeps its baseline row; no index
                    // update and no reconcile until the caller resolves it
                    debug!(path = %rel_str, "external change conflicts with open note");
                    self.bus.emit(&NoteEvent::EditConflict {
                        path: rel.to_path_buf(),
                        note_id: Some(existing.id),
                    });
                    return;
                }
                debug!(path = %rel_str, "external change");
                self.bracketed_reconcile().await;
                self.bus.emit(&NoteEvent::ExternalChange {
                    path: rel.to_path_buf(),
                    note_id: Some(existing.id),
                });
            }
            None => {
                if let Some(deletion) = take_matching_deletion(deletions, embedded) {
                    debug!(
                        from = %deletion.old_path.display(),
                        to = %rel_str,
                        "external rename"
                    );
                    self.bracketed_reconcile().await;
                    self.bus.emit(&NoteEvent::ExternalRename {
                        old_path: deletion.old_path,
                        new_path: rel.to_path_buf(),
                        note_id: deletion.note_id,
                    });
                    return;
                }
                self.process_new_file(rel, &rel_str, embedded).await;
            }
        }
    }

    /// A file appeared at an unindexed path and no deletion record claimed it
    async fn process_new_file(&self, rel: &Path, rel_str: &str, embedded: Option<NoteId>) {
        if let Some(id) = embedded {
            match self.index.note_by_id(id) {
                Ok(Some(old)) => {
                    if !self.vault_root.join(&old.path).exists() {
                        // The id's previous home is gone: this is the rename
                        // pair arriving appearance-first
                        debug!(from = %old.path, to = %rel_str, "external rename");
                        self.bracketed_reconcile().await;
                        self.bus.emit(&NoteEvent::ExternalRename {
                            old_path: PathBuf::from(old.path),
                            new_path: rel.to_path_buf(),
                            note_id: id,
                        });
                        return;
                    }
                    warn!(path = %rel_str, "duplicate note id on disk; indexing as a new note");
                }
                Ok(None) => {}
                Err(err) => {
                    warn!(path = %rel_str, error = %err, "id lookup failed for new file");
                }
            }
        }

        debug!(path = %rel_str, "external add");
        self.bracketed_reconcile().await;
        // The pass settled the row's identity; annotate from it
        let note_id = self.index.note_id_by_path(rel_str).ok().flatten().or(embedded);
        self.bus.emit(&NoteEvent::ExternalAdd {
            path: rel.to_path_buf(),
            note_id,
        });
    }

    /// Index one of our own writes without emitting anything
    fn absorb_own_write(
        &self,
        rel: &Path,
        rel_str: &str,
        content: &str,
        abs: &Path,
        hash: ContentHash,
        embedded: Option<NoteId>,
    ) {
        let existing = self.index.note_by_path(rel_str).ok().flatten();
        if let Some(ref row) = existing {
            if row.content_hash == hash {
                trace!(path = %rel_str, "own write already indexed");
                return;
            }
        }
        let id = existing
            .map(|row| row.id)
            .or(embedded)
            .unwrap_or_else(NoteId::generate);
        let record = record_from_disk(id, rel_str, content, abs, hash);
        if let Err(err) = self.index.upsert_note(&record) {
            warn!(path = %rel_str, error = %err, "failed to index own write");
        }
        trace!(path = %rel_str, "own write observed");
    }

    /// Report deletions whose rename window closed without a match
    async fn expire_deletions(
        &self,
        deletions: &mut HashMap<NoteId, RecentDeletion>,
        now: tokio::time::Instant,
    ) {
        if deletions.is_empty() {
            return;
        }
        let expired: Vec<NoteId> = deletions
            .iter()
            .filter(|(_, d)| d.expires_at <= now)
            .map(|(id, _)| *id)
            .collect();

        for id in expired {
            let Some(deletion) = deletions.remove(&id) else {
                continue;
            };
            if self.vault_root.join(&deletion.old_path).exists() {
                // The file came back; the change path already handled it
                continue;
            }
            debug!(
                path = %deletion.old_path.display(),
                held = ?deletion.deleted_at.elapsed(),
                last_hash = ?deletion.content_hash,
                "external delete"
            );
            self.bracketed_reconcile().await;
            self.bus.emit(&NoteEvent::ExternalDelete {
                path: deletion.old_path,
                note_id: Some(id),
            });
        }
    }

    async fn run_maintenance(&self, deletions: &mut HashMap<NoteId, RecentDeletion>) {
        self.expected.sweep_expired();
        self.write_flags.sweep(
            self.config.write_flag_linger(),
            self.config.expectation_ttl(),
        );
        self.expire_deletions(deletions, tokio::time::Instant::now())
            .await;
    }

    /// Wait until the file stops changing, then read it
    ///
    /// Returns `None` when the file disappears mid-settle (the paired
    /// removal event will handle it) or cannot be read at all.
    async fn settle_and_read(&self, abs: &Path) -> Option<Vec<u8>> {
        fn stamp(meta: &fs::Metadata) -> (u64, Option<SystemTime>) {
            (meta.len(), meta.modified().ok())
        }

        let started = Instant::now();
        let mut last = match fs::metadata(abs) {
            Ok(meta) => stamp(&meta),
            Err(_) => return None,
        };
        let mut stable_since = Instant::now();

        loop {
            if stable_since.elapsed() >= self.config.settle_window() {
                break;
            }
            if started.elapsed() >= SETTLE_CAP {
                warn!(path = %abs.display(), "file did not settle; reading anyway");
                break;
            }
            tokio::time::sleep(self.config.settle_poll()).await;
            let current = match fs::metadata(abs) {
                Ok(meta) => stamp(&meta),
                Err(_) => return None,
            };
            if current != last {
                last = current;
                stable_since = Instant::now();
            }
        }

        match read_file_stable(abs, 2) {
            Ok(bytes) => Some(bytes),
            Err(err) => {
                warn!(path = %abs.display(), error = %err, "unreadable file event dropped");
                None
            }
        }
    }
}

/// The loop task owning all debounce and rename-window state
async fn watch_loop(
    watcher: Weak<ChangeWatcher>,
    mut raw_rx: mpsc::Receiver<notify::Result<Event>>,
    mut shutdown_rx: oneshot::Receiver<()>,
) {
    let mut pending: HashMap<PathBuf, PendingChange> = HashMap::new();
    let mut deletions: HashMap<NoteId, RecentDeletion> = HashMap::new();
    let mut maintenance = tokio::time::interval(Duration::from_secs(1));
    maintenance.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        let next_due = pending
            .values()
            .map(|p| p.deadline)
            .chain(deletions.values().map(|d| d.expires_at))
            .min();

        tokio::select! {
            _ = &mut shutdown_rx => {
                debug!("watch loop shutting down");
                break;
            }
            maybe = raw_rx.recv() => {
                let Some(res) = maybe else { break };
                let Some(watcher) = watcher.upgrade() else { break };
                match res {
                    Ok(event) => watcher.ingest(event, &mut pending),
                    Err(err) => warn!(error = %err, "watcher backend error"),
                }
            }
            _ = sleep_until_opt(next_due) => {
                let Some(watcher) = watcher.upgrade() else { break };
                watcher.process_due(&mut pending, &mut deletions).await;
            }
            _ = maintenance.tick() => {
                let Some(watcher) = watcher.upgrade() else { break };
                watcher.run_maintenance(&mut deletions).await;
            }
        }
    }
}

async fn sleep_until_opt(deadline: Option<tokio::time::Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{AccessKind, CreateKind, DataChange, MetadataKind, RemoveKind};
    use vellum_core::hash::hash_str;

    #[test]
    fn test_kind_mapping() {
        let gone = || false;
        let there = || true;

        assert_eq!(
            map_event_kind(&EventKind::Create(CreateKind::File), gone),
            Some(FsChange::Appeared)
        );
        assert_eq!(
            map_event_kind(&EventKind::Remove(RemoveKind::File), there),
            Some(FsChange::Vanished)
        );
        assert_eq!(
            map_event_kind(
                &EventKind::Modify(ModifyKind::Data(DataChange::Content)),
                there
            ),
            Some(FsChange::Modified)
        );
        assert_eq!(
            map_event_kind(
                &EventKind::Modify(ModifyKind::Name(RenameMode::From)),
                there
            ),
            Some(FsChange::Vanished)
        );
        assert_eq!(
            map_event_kind(&EventKind::Modify(ModifyKind::Name(RenameMode::To)), gone),
            Some(FsChange::Appeared)
        );
        // Undirected renames are disambiguated by existence
        assert_eq!(
            map_event_kind(&EventKind::Modify(ModifyKind::Name(RenameMode::Any)), there),
            Some(FsChange::Appeared)
        );
        assert_eq!(
            map_event_kind(&EventKind::Modify(ModifyKind::Name(RenameMode::Any)), gone),
            Some(FsChange::Vanished)
        );
        // Content-free kinds are dropped
        assert_eq!(
            map_event_kind(
                &EventKind::Modify(ModifyKind::Metadata(MetadataKind::Any)),
                there
            ),
            None
        );
        assert_eq!(
            map_event_kind(&EventKind::Access(AccessKind::Any), there),
            None
        );
    }

    #[test]
    fn test_coalescing_table() {
        use FsChange::*;
        // Create then delete within the window: nothing happened
        assert_eq!(coalesce(Appeared, Vanished), None);
        assert_eq!(coalesce(Appeared, Modified), Some(Appeared));
        assert_eq!(coalesce(Appeared, Appeared), Some(Appeared));
        // Delete then create: the path survived with new content
        assert_eq!(coalesce(Vanished, Appeared), Some(Modified));
        assert_eq!(coalesce(Vanished, Vanished), Some(Vanished));
        assert_eq!(coalesce(Vanished, Modified), Some(Modified));
        assert_eq!(coalesce(Modified, Vanished), Some(Vanished));
        assert_eq!(coalesce(Modified, Appeared), Some(Modified));
        assert_eq!(coalesce(Modified, Modified), Some(Modified));
    }

    #[test]
    fn test_write_flags_lifecycle() {
        let flags = WriteFlags::new();
        let rel = Path::new("note.md");
        let linger = Duration::from_millis(50);
        let stale = Duration::from_secs(5);

        assert!(!flags.is_active(rel, linger, stale));

        flags.mark_starting(rel);
        assert!(flags.is_active(rel, linger, stale));

        flags.mark_complete(rel);
        // Recognition lingers briefly after completion
        assert!(flags.is_active(rel, linger, stale));

        std::thread::sleep(Duration::from_millis(80));
        assert!(!flags.is_active(rel, linger, stale));

        flags.sweep(linger, stale);
        assert_eq!(flags.len(), 0);
    }

    #[test]
    fn test_write_flags_stale_start_ages_out() {
        let flags = WriteFlags::new();
        let rel = Path::new("stuck.md");

        flags.mark_starting(rel);
        // Never completed; active until the stale cutoff
        assert!(flags.is_active(rel, Duration::from_millis(10), Duration::from_millis(30)));
        std::thread::sleep(Duration::from_millis(50));
        assert!(!flags.is_active(rel, Duration::from_millis(10), Duration::from_millis(30)));
    }

    #[test]
    fn test_complete_without_start_still_lingers() {
        let flags = WriteFlags::new();
        let rel = Path::new("late.md");
        flags.mark_complete(rel);
        assert!(flags.is_active(rel, Duration::from_millis(50), Duration::from_secs(5)));
    }

    fn deletion(id: NoteId, path: &str) -> RecentDeletion {
        let now = tokio::time::Instant::now();
        RecentDeletion {
            note_id: id,
            old_path: PathBuf::from(path),
            content_hash: Some(hash_str("gone")),
            deleted_at: now,
            expires_at: now + Duration::from_secs(1),
        }
    }

    #[test]
    fn test_deletion_match_by_embedded_id() {
        let mut deletions = HashMap::new();
        let id = NoteId::generate();
        deletions.insert(id, deletion(id, "old.md"));

        let matched = take_matching_deletion(&mut deletions, Some(id));
        assert_eq!(matched.unwrap().old_path, PathBuf::from("old.md"));
        assert!(deletions.is_empty());
    }

    #[test]
    fn test_deletion_without_identity_never_matches() {
        let mut deletions = HashMap::new();
        let id = NoteId::generate();
        deletions.insert(id, deletion(id, "old.md"));

        // Identity is the only accepted evidence; an id-less appearance
        // leaves the deletion to age out as a plain delete
        assert!(take_matching_deletion(&mut deletions, None).is_none());
        assert_eq!(deletions.len(), 1);
    }

    #[test]
    fn test_deletion_no_match_leaves_records() {
        let mut deletions = HashMap::new();
        let id = NoteId::generate();
        deletions.insert(id, deletion(id, "old.md"));

        let other = NoteId::generate();
        assert!(take_matching_deletion(&mut deletions, Some(other)).is_none());
        assert_eq!(deletions.len(), 1);
    }

    #[test]
    fn test_write_flags_clear() {
        let flags = WriteFlags::new();
        flags.mark_starting(Path::new("a.md"));
        flags.mark_complete(Path::new("b.md"));

        flags.clear();
        assert_eq!(flags.len(), 0);
        assert!(!flags.is_active(
            Path::new("a.md"),
            Duration::from_secs(1),
            Duration::from_secs(5)
        ));
    }
}
