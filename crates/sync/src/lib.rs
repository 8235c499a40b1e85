//! Vellum Sync - keeps the vault directory, the index, and listeners
//! telling the same story
//!
//! The engine has two halves sharing one piece of state:
//! - [`WriteCoordinator`] debounces and coalesces outgoing writes,
//!   publishing each content hash as an expectation before it touches disk
//! - [`ChangeWatcher`] turns raw filesystem events into note events,
//!   consuming expectations so our own writes never echo back
//!
//! [`IndexReconciler`] covers everything that happened while nothing was
//! watching, and [`IgnoreRules`] decides which files count at all.

pub mod config;
pub mod events;
pub mod ignore;
pub mod reconcile;
pub mod watcher;
pub mod writer;

pub use config::SyncConfig;
pub use events::{EventBus, HandlerId, NoteEvent, SyncStats};
pub use ignore::{IgnoreConfig, IgnoreRules};
pub use reconcile::{IndexReconciler, Reconciler};
pub use watcher::ChangeWatcher;
pub use writer::{ExpectedContent, WriteCoordinator};
