//! Vellum Index - SQLite-backed queryable side of the vault
//!
//! This crate provides:
//! - The `notes` table schema and typed row accessors
//! - Identity and content-hash lookups the sync engine classifies with
//! - Generic execute/query escape hatches for outer tooling

pub mod error;
pub mod index;

// Re-exports
pub use error::{IndexError, IndexResult};
pub use index::{NoteRecord, VaultIndex};
