//! SQLite-backed vault index
//!
//! One row per note, keyed by note id with a unique vault-relative path.
//! The index is the queryable side of the vault; files on disk stay the
//! source of truth and reconciliation re-derives rows from them. All
//! timestamps are unix milliseconds.

use std::collections::HashMap;
use std::path::Path;

use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension, ToSql};
use serde::{Deserialize, Serialize};
use tracing::debug;

use vellum_core::hash::ContentHash;
use vellum_core::note::NoteId;

use crate::error::{IndexError, IndexResult};

/// One indexed note
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoteRecord {
    pub id: NoteId,
    /// Vault-relative path, forward slashes
    pub path: String,
    pub title: String,
    pub content_hash: ContentHash,
    pub size_bytes: u64,
    pub created_at: i64,
    pub modified_at: i64,
}

/// The vault's relational index
///
/// The connection sits behind a mutex so a single `Arc<VaultIndex>` can be
/// shared by the watcher, the reconciler, and the CLI.
pub struct VaultIndex {
    conn: Mutex<Connection>,
}

impl VaultIndex {
    /// Open (creating if needed) the index database at the given path
    pub fn open(path: &Path) -> IndexResult<Self> {
        let conn = Connection::open(path)?;

        // WAL keeps readers (status, queries) unblocked while the watcher writes
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        conn.execute_batch("PRAGMA busy_timeout=5000;")?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;

        let index = Self { conn: Mutex::new(conn) };
        index.init_schema()?;
        Ok(index)
    }

    /// In-memory index for tests
    pub fn in_memory() -> IndexResult<Self> {
        let conn = Connection::open_in_memory()?;
        let index = Self { conn: Mutex::new(conn) };
        index.init_schema()?;
        Ok(index)
    }

    fn init_schema(&self) -> IndexResult<()> {
        let conn = self.conn.lock();
        conn.execute_batch(
            r#"
            -- One row per note. Paths are vault-relative with forward
            -- slashes; timestamps are unix milliseconds.
            CREATE TABLE IF NOT EXISTS notes (
                id            TEXT PRIMARY KEY,
                path          TEXT NOT NULL UNIQUE,
                title         TEXT NOT NULL,
                content_hash  TEXT NOT NULL,
                size_bytes    INTEGER NOT NULL,
                created_at    INTEGER NOT NULL,
                modified_at   INTEGER NOT NULL
            );
            "#,
        )?;
        Ok(())
    }

    /// Insert or update a note row
    ///
    /// Matches an existing row first by path, then by id (a moved note keeps
    /// its id and created_at); otherwise inserts.
    pub fn upsert_note(&self, record: &NoteRecord) -> IndexResult<()> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;

        let by_path: Option<String> = tx
            .query_row(
                "SELECT id FROM notes WHERE path = ?1",
                params![record.path],
                |row| row.get(0),
            )
            .optional()?;

        if by_path.is_some() {
            tx.execute(
                "UPDATE notes SET id = ?1, title = ?2, content_hash = ?3,
                        size_bytes = ?4, modified_at = ?5
                 WHERE path = ?6",
                params![
                    record.id.to_string(),
                    record.title,
                    record.content_hash.to_hex(),
                    record.size_bytes as i64,
                    record.modified_at,
                    record.path,
                ],
            )?;
        } else {
            let by_id: Option<String> = tx
                .query_row(
                    "SELECT path FROM notes WHERE id = ?1",
                    params![record.id.to_string()],
                    |row| row.get(0),
                )
                .optional()?;

            if let Some(old_path) = by_id {
                debug!(id = %record.id, from = %old_path, to = %record.path, "index move");
                tx.execute(
                    "UPDATE notes SET path = ?1, title = ?2, content_hash = ?3,
                            size_bytes = ?4, modified_at = ?5
                     WHERE id = ?6",
                    params![
                        record.path,
                        record.title,
                        record.content_hash.to_hex(),
                        record.size_bytes as i64,
                        record.modified_at,
                        record.id.to_string(),
                    ],
                )?;
            } else {
                tx.execute(
                    "INSERT INTO notes (id, path, title, content_hash, size_bytes,
                                        created_at, modified_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                    params![
                        record.id.to_string(),
                        record.path,
                        record.title,
                        record.content_hash.to_hex(),
                        record.size_bytes as i64,
                        record.created_at,
                        record.modified_at,
                    ],
                )?;
            }
        }

        tx.commit()?;
        Ok(())
    }

    /// Look up a note by its vault-relative path
    pub fn note_by_path(&self, path: &str) -> IndexResult<Option<NoteRecord>> {
        let conn = self.conn.lock();
        let raw = conn
            .query_row(
                "SELECT id, path, title, content_hash, size_bytes, created_at, modified_at
                 FROM notes WHERE path = ?1",
                params![path],
                map_raw_note,
            )
            .optional()?;
        raw.map(RawNote::into_record).transpose()
    }

    /// Look up a note by id
    pub fn note_by_id(&self, id: NoteId) -> IndexResult<Option<NoteRecord>> {
        let conn = self.conn.lock();
        let raw = conn
            .query_row(
                "SELECT id, path, title, content_hash, size_bytes, created_at, modified_at
                 FROM notes WHERE id = ?1",
                params![id.to_string()],
                map_raw_note,
            )
            .optional()?;
        raw.map(RawNote::into_record).transpose()
    }

    /// Identity lookup used by the watcher when classifying events
    pub fn note_id_by_path(&self, path: &str) -> IndexResult<Option<NoteId>> {
        let conn = self.conn.lock();
        let raw: Option<String> = conn
            .query_row(
                "SELECT id FROM notes WHERE path = ?1",
                params![path],
                |row| row.get(0),
            )
            .optional()?;
        raw.map(|s| NoteId::parse(&s).map_err(IndexError::invalid_value))
            .transpose()
    }

    /// Last-known content hash for a note, used for deletion records
    pub fn content_hash_by_id(&self, id: NoteId) -> IndexResult<Option<ContentHash>> {
        let conn = self.conn.lock();
        let raw: Option<String> = conn
            .query_row(
                "SELECT content_hash FROM notes WHERE id = ?1",
                params![id.to_string()],
                |row| row.get(0),
            )
            .optional()?;
        raw.map(|s| ContentHash::from_hex(&s).map_err(IndexError::invalid_value))
            .transpose()
    }

    /// Point a note's row at a new path, preserving id and created_at
    ///
    /// Returns false when no row with that id exists.
    pub fn rename_note(&self, id: NoteId, new_path: &str) -> IndexResult<bool> {
        let conn = self.conn.lock();
        let changed = conn.execute(
            "UPDATE notes SET path = ?1 WHERE id = ?2",
            params![new_path, id.to_string()],
        )?;
        Ok(changed > 0)
    }

    /// Delete a note row, returning what was removed
    pub fn remove_note_by_path(&self, path: &str) -> IndexResult<Option<NoteRecord>> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        let raw = tx
            .query_row(
                "SELECT id, path, title, content_hash, size_bytes, created_at, modified_at
                 FROM notes WHERE path = ?1",
                params![path],
                map_raw_note,
            )
            .optional()?;
        if raw.is_some() {
            tx.execute("DELETE FROM notes WHERE path = ?1", params![path])?;
        }
        tx.commit()?;
        raw.map(RawNote::into_record).transpose()
    }

    /// All notes, ordered by path
    pub fn list_notes(&self) -> IndexResult<Vec<NoteRecord>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT id, path, title, content_hash, size_bytes, created_at, modified_at
             FROM notes ORDER BY path",
        )?;
        let rows = stmt.query_map([], map_raw_note)?;

        let mut notes = Vec::new();
        for raw in rows {
            notes.push(raw?.into_record()?);
        }
        Ok(notes)
    }

    /// Number of indexed notes
    pub fn note_count(&self) -> IndexResult<u64> {
        let conn = self.conn.lock();
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM notes", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    /// Generic statement execution for callers outside the engine
    pub fn execute(&self, sql: &str, params: &[&dyn ToSql]) -> IndexResult<usize> {
        let conn = self.conn.lock();
        Ok(conn.execute(sql, params)?)
    }

    /// Generic query returning JSON-friendly rows for callers outside the engine
    pub fn query_rows(
        &self,
        sql: &str,
        params: &[&dyn ToSql],
    ) -> IndexResult<Vec<HashMap<String, serde_json::Value>>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(sql)?;
        let column_names: Vec<String> =
            stmt.column_names().iter().map(|s| s.to_string()).collect();

        let mut rows = stmt.query(params)?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            let mut map = HashMap::with_capacity(column_names.len());
            for (i, name) in column_names.iter().enumerate() {
                let value = match row.get_ref(i)? {
                    rusqlite::types::ValueRef::Null => serde_json::Value::Null,
                    rusqlite::types::ValueRef::Integer(v) => serde_json::Value::from(v),
                    rusqlite::types::ValueRef::Real(v) => serde_json::Value::from(v),
                    rusqlite::types::ValueRef::Text(t) => {
                        serde_json::Value::String(String::from_utf8_lossy(t).into_owned())
                    }
                    // No blob columns in this schema
                    rusqlite::types::ValueRef::Blob(_) => serde_json::Value::Null,
                };
                map.insert(name.clone(), value);
            }
            out.push(map);
        }
        Ok(out)
    }
}

/// Row shape as stored, before typed conversion
struct RawNote {
    id: String,
    path: String,
    title: String,
    content_hash: String,
    size_bytes: i64,
    created_at: i64,
    modified_at: i64,
}

fn map_raw_note(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawNote> {
    Ok(RawNote {
        id: row.get(0)?,
        path: row.get(1)?,
        title: row.get(2)?,
        content_hash: row.get(3)?,
        size_bytes: row.get(4)?,
        created_at: row.get(5)?,
        modified_at: row.get(6)?,
    })
}

impl RawNote {
    fn into_record(self) -> IndexResult<NoteRecord> {
        Ok(NoteRecord {
            id: NoteId::parse(&self.id).map_err(IndexError::invalid_value)?,
            path: self.path,
            title: self.title,
            content_hash: ContentHash::from_hex(&self.content_hash)
                .map_err(IndexError::invalid_value)?,
            size_bytes: self.size_bytes as u64,
            created_at: self.created_at,
            modified_at: self.modified_at,
        })
    }
}
