//! Typed event stream emitted by the watcher
//!
//! Subscribers get a small closed set of variants; anything richer (previews,
//! graph updates) is derived downstream from the index. Handler panics are
//! caught and logged so one bad subscriber can never poison the event loop
//! or the notification source behind it.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::error;

use vellum_core::note::NoteId;

/// Counters from one reconciliation pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncStats {
    pub added: usize,
    pub updated: usize,
    pub deleted: usize,
}

impl SyncStats {
    pub fn total(&self) -> usize {
        self.added + self.updated + self.deleted
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }
}

/// Everything the engine reports to subscribers
///
/// Paths are vault-relative. `note_id` is present when the identity could be
/// resolved from content or index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NoteEvent {
    /// A file appeared that this process did not write
    ExternalAdd {
        path: PathBuf,
        note_id: Option<NoteId>,
    },
    /// A file changed on disk outside our own write path
    ExternalChange {
        path: PathBuf,
        note_id: Option<NoteId>,
    },
    /// A file disappeared and no matching add arrived in the rename window
    ExternalDelete {
        path: PathBuf,
        note_id: Option<NoteId>,
    },
    /// A delete and an add correlated by embedded identity
    ExternalRename {
        old_path: PathBuf,
        new_path: PathBuf,
        note_id: NoteId,
    },
    /// An external write hit a note that is open for editing
    EditConflict {
        path: PathBuf,
        note_id: Option<NoteId>,
    },
    /// A reconciliation pass is starting
    SyncStarted,
    /// A reconciliation pass finished
    SyncCompleted { stats: SyncStats },
}

/// Subscription token returned by [`EventBus::on`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(u64);

type Handler = Arc<dyn Fn(&NoteEvent) + Send + Sync + 'static>;

/// Minimal pub-sub registry for [`NoteEvent`]
///
/// Handlers run synchronously on the emitting task in registration order.
pub struct EventBus {
    handlers: RwLock<Vec<(HandlerId, Handler)>>,
    next_id: AtomicU64,
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            handlers: RwLock::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Register a handler; keep the returned id to unsubscribe
    pub fn on<F>(&self, handler: F) -> HandlerId
    where
        F: Fn(&NoteEvent) + Send + Sync + 'static,
    {
        let id = HandlerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.handlers.write().push((id, Arc::new(handler)));
        id
    }

    /// Remove a handler; unknown ids are a no-op
    pub fn off(&self, id: HandlerId) {
        self.handlers.write().retain(|(hid, _)| *hid != id);
    }

    /// Number of live subscriptions
    pub fn subscriber_count(&self) -> usize {
        self.handlers.read().len()
    }

    /// Deliver an event to every subscriber
    pub fn emit(&self, event: &NoteEvent) {
        // Clone out so a handler can subscribe/unsubscribe without deadlock
        let handlers: Vec<(HandlerId, Handler)> = self.handlers.read().clone();
        for (id, handler) in handlers {
            let result = catch_unwind(AssertUnwindSafe(|| handler(event)));
            if result.is_err() {
                error!(handler = id.0, ?event, "event handler panicked");
            }
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn add_event(path: &str) -> NoteEvent {
        NoteEvent::ExternalAdd {
            path: PathBuf::from(path),
            note_id: None,
        }
    }

    #[test]
    fn test_emit_reaches_subscribers_in_order() {
        let bus = EventBus::new();
        let order = Arc::new(RwLock::new(Vec::new()));

        let o1 = order.clone();
        bus.on(move |_| o1.write().push(1));
        let o2 = order.clone();
        bus.on(move |_| o2.write().push(2));

        bus.emit(&add_event("a.md"));
        assert_eq!(*order.read(), vec![1, 2]);
    }

    #[test]
    fn test_off_stops_delivery() {
        let bus = EventBus::new();
        let count = Arc::new(AtomicUsize::new(0));

        let c = count.clone();
        let id = bus.on(move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        });

        bus.emit(&add_event("a.md"));
        bus.off(id);
        bus.emit(&add_event("b.md"));

        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn test_panicking_handler_does_not_poison_later_handlers() {
        let bus = EventBus::new();
        let count = Arc::new(AtomicUsize::new(0));

        bus.on(|_| panic!("boom"));
        let c = count.clone();
        bus.on(move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        });

        bus.emit(&add_event("a.md"));
        assert_eq!(count.load(Ordering::SeqCst), 1);

        // Still delivers on the next emit
        bus.emit(&add_event("b.md"));
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_sync_stats_helpers() {
        let empty = SyncStats::default();
        assert!(empty.is_empty());
        assert_eq!(empty.total(), 0);

        let stats = SyncStats {
            added: 2,
            updated: 1,
            deleted: 3,
        };
        assert!(!stats.is_empty());
        assert_eq!(stats.total(), 6);
    }
}
