//! Full-vault diff between disk state and the index
//!
//! Individual watcher events keep the index current while the engine runs;
//! reconciliation is the catch-up path for everything that happened while
//! nothing was watching. It walks every markdown file under the vault and
//! repairs drift in either direction:
//! - files on disk with no row are indexed (embedded id preserved)
//! - rows whose file is gone are removed
//! - a known id appearing at a new path is repaired as a move, not as
//!   a delete plus a create

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use async_trait::async_trait;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use vellum_core::hash::{hash_str, ContentHash};
use vellum_core::note::{extract_note_id, note_title, NoteId};
use vellum_core::paths::{is_markdown, rel_display, vault_relative};
use vellum_core::time::{epoch_ms, now_ms};
use vellum_index::{NoteRecord, VaultIndex};

use crate::events::SyncStats;
use crate::ignore::IgnoreRules;

/// Brings the index in line with what is actually on disk
#[async_trait]
pub trait Reconciler: Send + Sync {
    async fn reconcile(&self) -> Result<SyncStats>;
}

/// Standard reconciler backed by the SQLite index
pub struct IndexReconciler {
    vault_root: PathBuf,
    index: Arc<VaultIndex>,
    ignore: Arc<IgnoreRules>,
}

impl IndexReconciler {
    pub fn new(
        vault_root: impl Into<PathBuf>,
        index: Arc<VaultIndex>,
        ignore: Arc<IgnoreRules>,
    ) -> Self {
        let vault_root = vault_root.into();
        let vault_root = vault_root.canonicalize().unwrap_or(vault_root);
        Self {
            vault_root,
            index,
            ignore,
        }
    }

    /// Every markdown file under the vault that is not ignored, as
    /// (vault-relative string, absolute path) pairs
    fn scan_disk(&self) -> Vec<(String, PathBuf)> {
        let mut files = Vec::new();
        let walker = WalkDir::new(&self.vault_root)
            .follow_links(false)
            .into_iter()
            .filter_entry(|entry| entry.depth() == 0 || !self.ignore.should_ignore(entry.path()));

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    warn!(error = %err, "skipping unreadable directory entry");
                    continue;
                }
            };
            if !entry.file_type().is_file() || !is_markdown(entry.path()) {
                continue;
            }
            match vault_relative(&self.vault_root, entry.path()) {
                Ok(rel) => files.push((rel_display(&rel), entry.path().to_path_buf())),
                Err(err) => warn!(error = %err, "skipping path outside vault"),
            }
        }
        files
    }

}

/// Build an index row from what is on disk right now
///
/// Timestamps come from the file's mtime; on a stat failure the current
/// time stands in.
pub(crate) fn record_from_disk(
    id: NoteId,
    rel: &str,
    content: &str,
    abs: &Path,
    hash: ContentHash,
) -> NoteRecord {
    let modified_at = fs::metadata(abs)
        .and_then(|meta| meta.modified())
        .map(epoch_ms)
        .unwrap_or_else(|_| now_ms());
    NoteRecord {
        id,
        path: rel.to_string(),
        title: note_title(content, Path::new(rel)),
        content_hash: hash,
        size_bytes: content.len() as u64,
        created_at: modified_at,
        modified_at,
    }
}

#[async_trait]
impl Reconciler for IndexReconciler {
    async fn reconcile(&self) -> Result<SyncStats> {
        let started = Instant::now();
        let mut stats = SyncStats::default();

        let indexed: HashMap<String, NoteRecord> = self
            .index
            .list_notes()?
            .into_iter()
            .map(|record| (record.path.clone(), record))
            .collect();
        // Index paths accounted for this pass; leftovers get removed
        let mut seen: HashSet<String> = HashSet::new();

        let disk = self.scan_disk();
        let disk_paths: HashSet<&str> = disk.iter().map(|(rel, _)| rel.as_str()).collect();

        for (rel, abs) in &disk {
            let content = match fs::read_to_string(abs) {
                Ok(content) => content,
                Err(err) => {
                    // Leave any existing row alone; the file is present,
                    // just not readable right now
                    warn!(path = %rel, error = %err, "unreadable note skipped");
                    seen.insert(rel.clone());
                    continue;
                }
            };
            let hash = hash_str(&content);

            match indexed.get(rel) {
                Some(row) => {
                    seen.insert(rel.clone());
                    if row.content_hash != hash {
                        let record = record_from_disk(row.id, rel, &content, abs, hash);
                        self.index.upsert_note(&record)?;
                        stats.updated += 1;
                    }
                }
                None => {
                    let (id, moved_from) = match extract_note_id(&content) {
                        Some(id) => match self.index.note_by_id(id)? {
                            // The id's old path is gone from disk: this file
                            // IS that note, relocated
                            Some(old) if !disk_paths.contains(old.path.as_str()) => {
                                (id, Some(old.path))
                            }
                            // Same id embedded in two live files; do not let
                            // the copy steal the original's row
                            Some(_) => {
                                warn!(path = %rel, "duplicate note id on disk; indexing as a new note");
                                (NoteId::generate(), None)
                            }
                            None => (id, None),
                        },
                        None => (NoteId::generate(), None),
                    };

                    let record = record_from_disk(id, rel, &content, abs, hash);
                    self.index.upsert_note(&record)?;
                    seen.insert(rel.clone());
                    match moved_from {
                        Some(old_path) => {
                            debug!(from = %old_path, to = %rel, "repaired moved note");
                            seen.insert(old_path);
                            stats.updated += 1;
                        }
                        None => stats.added += 1,
                    }
                }
            }
        }

        for path in indexed.keys() {
            if !seen.contains(path) {
                if self.index.remove_note_by_path(path)?.is_some() {
                    debug!(path = %path, "removed vanished note from index");
                    stats.deleted += 1;
                }
            }
        }

        info!(
            added = stats.added,
            updated = stats.updated,
            deleted = stats.deleted,
            elapsed = ?started.elapsed(),
            "vault reconciled"
        );
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ignore::IgnoreConfig;
    use tempfile::TempDir;
    use vellum_core::note::compose_note;

    fn reconciler_for(vault: &TempDir) -> (Arc<VaultIndex>, IndexReconciler) {
        let index = Arc::new(VaultIndex::in_memory().unwrap());
        let ignore =
            Arc::new(IgnoreRules::load(vault.path(), IgnoreConfig::default()).unwrap());
        let reconciler =
            IndexReconciler::new(vault.path(), Arc::clone(&index), ignore);
        (index, reconciler)
    }

    #[tokio::test]
    async fn test_indexes_fresh_vault() {
        let vault = TempDir::new().unwrap();
        let id = NoteId::generate();
        fs::write(
            vault.path().join("tagged.md"),
            compose_note(id, "Tagged", "Body text."),
        )
        .unwrap();
        fs::write(vault.path().join("bare.md"), "# Bare\n\nNo frontmatter.").unwrap();

        let (index, reconciler) = reconciler_for(&vault);
        let stats = reconciler.reconcile().await.unwrap();

        assert_eq!(stats.added, 2);
        assert_eq!(stats.updated, 0);
        assert_eq!(stats.deleted, 0);
        assert_eq!(index.note_count().unwrap(), 2);

        // The embedded identity survives indexing
        let tagged = index.note_by_path("tagged.md").unwrap().unwrap();
        assert_eq!(tagged.id, id);
        assert_eq!(tagged.title, "Tagged");

        // A bare note gets a generated identity without touching the file
        let bare = index.note_by_path("bare.md").unwrap().unwrap();
        assert_eq!(bare.title, "Bare");
        assert_eq!(
            fs::read_to_string(vault.path().join("bare.md")).unwrap(),
            "# Bare\n\nNo frontmatter."
        );
    }

    #[tokio::test]
    async fn test_detects_edits_and_deletions() {
        let vault = TempDir::new().unwrap();
        fs::write(vault.path().join("keep.md"), "original").unwrap();
        fs::write(vault.path().join("gone.md"), "doomed").unwrap();

        let (index, reconciler) = reconciler_for(&vault);
        reconciler.reconcile().await.unwrap();

        fs::write(vault.path().join("keep.md"), "edited").unwrap();
        fs::remove_file(vault.path().join("gone.md")).unwrap();

        let stats = reconciler.reconcile().await.unwrap();
        assert_eq!(stats.added, 0);
        assert_eq!(stats.updated, 1);
        assert_eq!(stats.deleted, 1);

        let row = index.note_by_path("keep.md").unwrap().unwrap();
        assert_eq!(row.content_hash, hash_str("edited"));
        assert!(index.note_by_path("gone.md").unwrap().is_none());
    }

    #[tokio::test]
    async fn test_repairs_move_by_embedded_identity() {
        let vault = TempDir::new().unwrap();
        let id = NoteId::generate();
        fs::write(
            vault.path().join("old.md"),
            compose_note(id, "Traveler", "Same note, new home."),
        )
        .unwrap();

        let (index, reconciler) = reconciler_for(&vault);
        reconciler.reconcile().await.unwrap();

        fs::create_dir_all(vault.path().join("archive")).unwrap();
        fs::rename(
            vault.path().join("old.md"),
            vault.path().join("archive/new.md"),
        )
        .unwrap();

        let stats = reconciler.reconcile().await.unwrap();
        // A move is one repair, never a delete plus an add
        assert_eq!(stats.added, 0);
        assert_eq!(stats.updated, 1);
        assert_eq!(stats.deleted, 0);

        let row = index.note_by_id(id).unwrap().unwrap();
        assert_eq!(row.path, "archive/new.md");
        assert_eq!(index.note_count().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_skips_ignored_and_non_markdown() {
        let vault = TempDir::new().unwrap();
        fs::write(vault.path().join("note.md"), "real").unwrap();
        fs::write(vault.path().join("notes.txt"), "not markdown").unwrap();
        fs::create_dir_all(vault.path().join(".vellum")).unwrap();
        fs::write(vault.path().join(".vellum/internal.md"), "internal").unwrap();
        fs::write(vault.path().join(".gitignore"), "drafts/\n").unwrap();
        fs::create_dir_all(vault.path().join("drafts")).unwrap();
        fs::write(vault.path().join("drafts/wip.md"), "draft").unwrap();

        let (index, reconciler) = reconciler_for(&vault);
        let stats = reconciler.reconcile().await.unwrap();

        assert_eq!(stats.added, 1);
        assert_eq!(index.note_count().unwrap(), 1);
        assert!(index.note_by_path("note.md").unwrap().is_some());
    }

    #[tokio::test]
    async fn test_unchanged_vault_reports_empty_stats() {
        let vault = TempDir::new().unwrap();
        fs::write(vault.path().join("a.md"), "alpha").unwrap();
        fs::write(vault.path().join("b.md"), "beta").unwrap();

        let (_index, reconciler) = reconciler_for(&vault);
        reconciler.reconcile().await.unwrap();

        let stats = reconciler.reconcile().await.unwrap();
        assert!(stats.is_empty());
    }

    #[tokio::test]
    async fn test_touched_file_with_same_content_is_not_an_update() {
        let vault = TempDir::new().unwrap();
        let path = vault.path().join("steady.md");
        fs::write(&path, "unchanging").unwrap();

        let (_index, reconciler) = reconciler_for(&vault);
        reconciler.reconcile().await.unwrap();

        // Bump mtime without touching content; identity is the hash,
        // not the timestamp
        let later = filetime::FileTime::from_unix_time(4_102_444_800, 0);
        filetime::set_file_mtime(&path, later).unwrap();

        let stats = reconciler.reconcile().await.unwrap();
        assert!(stats.is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_id_gets_fresh_identity() {
        let vault = TempDir::new().unwrap();
        let id = NoteId::generate();
        let content = compose_note(id, "Original", "One of two.");
        fs::write(vault.path().join("a.md"), &content).unwrap();

        let (index, reconciler) = reconciler_for(&vault);
        reconciler.reconcile().await.unwrap();

        // Copy-paste duplicate carrying the same embedded id
        fs::write(vault.path().join("b.md"), &content).unwrap();
        let stats = reconciler.reconcile().await.unwrap();

        assert_eq!(stats.added, 1);
        let original = index.note_by_path("a.md").unwrap().unwrap();
        let copy = index.note_by_path("b.md").unwrap().unwrap();
        assert_eq!(original.id, id);
        assert_ne!(copy.id, id);
        assert_eq!(index.note_count().unwrap(), 2);
    }
}
