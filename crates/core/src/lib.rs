//! Vellum Core - shared primitives for the note vault
//!
//! This crate provides the foundational pieces the engine is built on:
//! - BLAKE3 content hashing with stable-read verification
//! - Note identity (ULID) and frontmatter extraction
//! - Vault path conventions
//! - Millisecond timestamps

pub mod hash;
pub mod note;
pub mod paths;
pub mod time;

// Re-export main types for convenience
pub use hash::{hash_bytes, hash_file, hash_str, read_file_stable, ContentHash};
pub use note::{compose_note, extract_note_id, note_title, split_frontmatter, NoteId};
pub use paths::{is_markdown, rel_display, vault_relative, VAULT_DIR};
pub use time::{epoch_ms, now_ms};

/// Common result type used throughout vellum-core
pub type Result<T> = anyhow::Result<T>;
