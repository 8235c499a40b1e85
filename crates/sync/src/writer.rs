//! Debounced write queue keeping the index and the disk in step
//!
//! The coordinator owns one pending write per path. Queueing again within the
//! debounce window replaces the content and restarts the timer (last write
//! wins, no partial merge). A flush publishes the content hash as an
//! expectation before the write syscall so the watcher can recognize the
//! resulting notification as our own. Failed writes retry on a fixed backoff
//! and are dropped with an error after the budget is spent; queued-but-
//! unflushed edits are not durable across a crash.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use anyhow::Result;
use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error, warn};

use vellum_core::hash::{hash_str, ContentHash};
use vellum_core::paths::vault_relative;

use crate::config::SyncConfig;

/// Backoff schedule for failed writes, indexed by retry number
const RETRY_BACKOFF_MS: [u64; 3] = [100, 500, 1000];

/// Retry budget before a failing write is dropped
const MAX_RETRIES: u32 = 3;

/// One queued write; at most one exists per path
struct PendingWrite {
    content: String,
    queued_at: Instant,
    retry_count: u32,
    /// Bumped on every re-queue; a flush only acts when its generation
    /// still matches, so a racing replacement is never lost
    generation: u64,
    timer: Option<JoinHandle<()>>,
}

/// Hashes of content about to land on disk, shared with the watcher
///
/// This is the single point of contact between the two components: the
/// coordinator registers before each write syscall, the watcher consumes on
/// match. Entries carry a safety-net TTL for the case where the matching
/// notification never arrives.
pub struct ExpectedContent {
    entries: DashMap<PathBuf, Vec<ExpectedEntry>>,
    ttl: Duration,
}

struct ExpectedEntry {
    hash: ContentHash,
    expires_at: Instant,
}

impl ExpectedContent {
    fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
        }
    }

    /// Publish a hash for a path; refreshes the expiry if already present
    pub(crate) fn register(&self, path: &Path, hash: ContentHash) {
        let expires_at = Instant::now() + self.ttl;
        let mut entry = self.entries.entry(path.to_path_buf()).or_default();
        if let Some(existing) = entry.iter_mut().find(|e| e.hash == hash) {
            existing.expires_at = expires_at;
        } else {
            entry.push(ExpectedEntry { hash, expires_at });
        }
    }

    /// Check-and-consume: removes the matched hash so classification is
    /// idempotent (a second identical event reads as external)
    pub(crate) fn consume(&self, path: &Path, hash: &ContentHash) -> bool {
        let now = Instant::now();
        let Some(mut entry) = self.entries.get_mut(path) else {
            return false;
        };
        entry.retain(|e| e.expires_at > now);
        let found = match entry.iter().position(|e| &e.hash == hash) {
            Some(pos) => {
                entry.remove(pos);
                true
            }
            None => false,
        };
        let empty = entry.is_empty();
        drop(entry);
        if empty {
            self.entries.remove_if(path, |_, v| v.is_empty());
        }
        found
    }

    /// Non-consuming membership check for monitoring and tests
    pub(crate) fn contains(&self, path: &Path, hash: &ContentHash) -> bool {
        let now = Instant::now();
        self.entries
            .get(path)
            .map(|entry| {
                entry
                    .iter()
                    .any(|e| &e.hash == hash && e.expires_at > now)
            })
            .unwrap_or(false)
    }

    /// Drop every expectation for a path (the path is about to stop
    /// receiving events, e.g. before a rename)
    pub(crate) fn clear_path(&self, path: &Path) {
        self.entries.remove(path);
    }

    /// Drop entries past their TTL; invoked from the watcher's
    /// maintenance tick
    pub(crate) fn sweep_expired(&self) {
        let now = Instant::now();
        self.entries.retain(|_, entry| {
            entry.retain(|e| e.expires_at > now);
            !entry.is_empty()
        });
    }

    pub(crate) fn clear_all(&self) {
        self.entries.clear();
    }

    #[cfg(test)]
    fn path_count(&self) -> usize {
        self.entries.len()
    }
}

/// Per-vault write scheduler
///
/// Construct once per vault and share via `Arc`; timers hold a `Weak` back
/// reference so a dropped coordinator quietly cancels its future flushes.
pub struct WriteCoordinator {
    vault_root: PathBuf,
    config: SyncConfig,
    pending: Mutex<HashMap<PathBuf, PendingWrite>>,
    expected: Arc<ExpectedContent>,
    next_generation: AtomicU64,
    shutdown: AtomicBool,
}

impl WriteCoordinator {
    pub fn new(vault_root: impl Into<PathBuf>, config: SyncConfig) -> Arc<Self> {
        let ttl = config.expectation_ttl();
        Arc::new(Self {
            vault_root: vault_root.into(),
            config,
            pending: Mutex::new(HashMap::new()),
            expected: Arc::new(ExpectedContent::new(ttl)),
            next_generation: AtomicU64::new(1),
            shutdown: AtomicBool::new(false),
        })
    }

    /// Handle to the shared expectation map, for wiring up the watcher
    pub fn expectations(&self) -> Arc<ExpectedContent> {
        Arc::clone(&self.expected)
    }

    /// Queue content for a path using the configured debounce delay
    pub fn queue_write(self: &Arc<Self>, path: &Path, content: String) -> Result<()> {
        self.queue_write_with_delay(path, content, self.config.write_debounce())
    }

    /// Queue content for a path, flushing after `delay`
    ///
    /// A second call for the same path before the timer fires fully replaces
    /// the earlier content and restarts the timer.
    pub fn queue_write_with_delay(
        self: &Arc<Self>,
        path: &Path,
        content: String,
        delay: Duration,
    ) -> Result<()> {
        if self.shutdown.load(Ordering::SeqCst) {
            warn!(path = %path.display(), "queue_write after destroy; ignoring");
            return Ok(());
        }
        let rel = vault_relative(&self.vault_root, path)?;
        let generation = self.next_generation.fetch_add(1, Ordering::SeqCst);

        let mut pending = self.pending.lock();
        match pending.get_mut(&rel) {
            Some(existing) => {
                if let Some(timer) = existing.timer.take() {
                    timer.abort();
                }
                debug!(path = %rel.display(), "coalescing queued write");
                existing.content = content;
                existing.queued_at = Instant::now();
                existing.retry_count = 0;
                existing.generation = generation;
            }
            None => {
                pending.insert(
                    rel.clone(),
                    PendingWrite {
                        content,
                        queued_at: Instant::now(),
                        retry_count: 0,
                        generation,
                        timer: None,
                    },
                );
            }
        }

        let handle = self.spawn_flush_timer(rel.clone(), generation, delay);
        if let Some(entry) = pending.get_mut(&rel) {
            entry.timer = Some(handle);
        }
        Ok(())
    }

    fn spawn_flush_timer(
        self: &Arc<Self>,
        rel: PathBuf,
        generation: u64,
        delay: Duration,
    ) -> JoinHandle<()> {
        let weak: Weak<Self> = Arc::downgrade(self);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(coordinator) = weak.upgrade() {
                coordinator.flush_generation(&rel, generation, true).await;
            }
        })
    }

    /// Flush whatever is pending for a path right now; no-op when idle
    pub async fn flush_write(self: &Arc<Self>, path: &Path) -> Result<()> {
        let rel = vault_relative(&self.vault_root, path)?;
        let generation = self.pending.lock().get(&rel).map(|e| e.generation);
        if let Some(generation) = generation {
            self.flush_generation(&rel, generation, false).await;
        }
        Ok(())
    }

    /// The single write path. `from_timer` marks calls made by the entry's
    /// own timer task, which must not abort itself.
    async fn flush_generation(self: &Arc<Self>, rel: &Path, generation: u64, from_timer: bool) {
        let (content, queued_at) = {
            let mut pending = self.pending.lock();
            match pending.get_mut(rel) {
                Some(entry) if entry.generation == generation => {
                    if from_timer {
                        entry.timer = None;
                    } else if let Some(timer) = entry.timer.take() {
                        timer.abort();
                    }
                    (entry.content.clone(), entry.queued_at)
                }
                // Superseded or already flushed
                _ => return,
            }
        };

        let hash = hash_str(&content);
        // The expectation must be registered before the write syscall is
        // issued: the notification can arrive before write() returns.
        self.expected.register(rel, hash);

        let abs = self.vault_root.join(rel);
        match tokio::fs::write(&abs, content.as_bytes()).await {
            Ok(()) => {
                let mut pending = self.pending.lock();
                if pending
                    .get(rel)
                    .map(|e| e.generation == generation)
                    .unwrap_or(false)
                {
                    pending.remove(rel);
                }
                debug!(
                    path = %rel.display(),
                    queued = ?queued_at.elapsed(),
                    "write flushed"
                );
            }
            Err(err) => self.handle_write_failure(rel, generation, &err),
        }
    }

    fn handle_write_failure(self: &Arc<Self>, rel: &Path, generation: u64, err: &std::io::Error) {
        let mut pending = self.pending.lock();
        let Some(entry) = pending.get_mut(rel) else {
            return;
        };
        if entry.generation != generation {
            // Replaced while the write was in flight; the new timer owns it
            return;
        }

        if entry.retry_count < MAX_RETRIES {
            entry.retry_count += 1;
            let backoff =
                Duration::from_millis(RETRY_BACKOFF_MS[(entry.retry_count - 1) as usize]);
            warn!(
                path = %rel.display(),
                retry = entry.retry_count,
                backoff_ms = backoff.as_millis() as u64,
                error = %err,
                "write failed; retrying"
            );
            let weak: Weak<Self> = Arc::downgrade(self);
            let rel_owned = rel.to_path_buf();
            entry.timer = Some(tokio::spawn(async move {
                tokio::time::sleep(backoff).await;
                if let Some(coordinator) = weak.upgrade() {
                    coordinator
                        .flush_generation(&rel_owned, generation, true)
                        .await;
                }
            }));
        } else {
            error!(
                path = %rel.display(),
                retries = MAX_RETRIES,
                error = %err,
                "write failed after final retry; dropping queued content"
            );
            pending.remove(rel);
        }
    }

    /// Flush every pending path in parallel; used at shutdown and before
    /// switching vaults
    pub async fn flush_all(self: &Arc<Self>) {
        let targets: Vec<(PathBuf, u64)> = self
            .pending
            .lock()
            .iter()
            .map(|(path, entry)| (path.clone(), entry.generation))
            .collect();

        if targets.is_empty() {
            return;
        }
        debug!(count = targets.len(), "flushing all pending writes");

        let mut set = JoinSet::new();
        for (rel, generation) in targets {
            let this = Arc::clone(self);
            set.spawn(async move {
                this.flush_generation(&rel, generation, false).await;
            });
        }
        while set.join_next().await.is_some() {}
    }

    /// Flush the path, then drop its expectations
    ///
    /// Called immediately before the underlying file is moved: leftover
    /// expectations would reference a path that no longer receives events.
    pub async fn cancel_pending_operations(self: &Arc<Self>, path: &Path) -> Result<()> {
        let rel = vault_relative(&self.vault_root, path)?;
        self.flush_write(path).await?;
        self.expected.clear_path(&rel);
        Ok(())
    }

    /// Whether a write is queued for this path
    pub fn has_pending_write(&self, path: &Path) -> bool {
        match vault_relative(&self.vault_root, path) {
            Ok(rel) => self.pending.lock().contains_key(&rel),
            Err(_) => false,
        }
    }

    /// Number of queued writes across all paths
    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }

    /// Non-consuming check against the published expectations
    pub fn is_content_expected(&self, path: &Path, hash: &ContentHash) -> bool {
        match vault_relative(&self.vault_root, path) {
            Ok(rel) => self.expected.contains(&rel, hash),
            Err(_) => false,
        }
    }

    /// Cancel every timer and clear all state; queue calls afterwards are
    /// ignored
    pub fn destroy(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
        let mut pending = self.pending.lock();
        for (_, entry) in pending.iter_mut() {
            if let Some(timer) = entry.timer.take() {
                timer.abort();
            }
        }
        pending.clear();
        self.expected.clear_all();
        debug!("write coordinator destroyed");
    }
}

impl Drop for WriteCoordinator {
    fn drop(&mut self) {
        for (_, entry) in self.pending.lock().iter_mut() {
            if let Some(timer) = entry.timer.take() {
                timer.abort();
            }
        }
    }
}
