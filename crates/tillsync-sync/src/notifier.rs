//! # Event Notifier
//!
//! Count cache and the pending/conflict count broadcast.
//!
//! ## Event Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  OfflineStore::write_queue / write_conflicts                            │
//! │       │  counts.set_*(scope_id, len)                                    │
//! │       ▼                                                                 │
//! │  Notifier::dispatch()                                                   │
//! │       │  scope = provider.resolve_scope()                               │
//! │       │  snapshot = counts.get(scope_id)   (0/0 if no scope)            │
//! │       ▼                                                                 │
//! │  SyncEventEmitter::emit_counts(CountEvent)                              │
//! │       ├──► BroadcastEmitter ──► every subscriber (UI badge, logs)      │
//! │       └──► NoOpEmitter      (tests, headless)                           │
//! │                                                                         │
//! │  Emitters never block: a slow or absent subscriber only misses events. │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tokio::sync::broadcast;
use tracing::trace;

use tillsync_core::{CountEvent, CountSnapshot};

use crate::scope::ScopeProvider;

/// Capacity of the broadcast channel; lagging receivers skip ahead.
pub const EVENT_CHANNEL_CAPACITY: usize = 64;

// =============================================================================
// Event Emitter Trait
// =============================================================================

/// Trait for emitting count events (implemented by the host UI bridge).
pub trait SyncEventEmitter: Send + Sync {
    fn emit_counts(&self, event: &CountEvent);
}

/// No-op event emitter for testing.
pub struct NoOpEmitter;

impl SyncEventEmitter for NoOpEmitter {
    fn emit_counts(&self, _event: &CountEvent) {}
}

/// Fans count events out over a Tokio broadcast channel.
#[derive(Debug, Clone)]
pub struct BroadcastEmitter {
    tx: broadcast::Sender<CountEvent>,
}

impl BroadcastEmitter {
    pub fn new() -> Self {
        let (tx, _rx) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        BroadcastEmitter { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CountEvent> {
        self.tx.subscribe()
    }
}

impl Default for BroadcastEmitter {
    fn default() -> Self {
        Self::new()
    }
}

impl SyncEventEmitter for BroadcastEmitter {
    fn emit_counts(&self, event: &CountEvent) {
        // Err only means nobody is listening
        let _ = self.tx.send(event.clone());
    }
}

// =============================================================================
// Count Cache
// =============================================================================

/// Last known counts per scope id.
///
/// Answers synchronous count queries; refreshed on every store write, so it
/// may briefly trail the database.
#[derive(Debug, Default)]
pub struct CountCache {
    inner: RwLock<HashMap<String, CountSnapshot>>,
}

impl CountCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, scope_id: &str) -> CountSnapshot {
        self.inner
            .read()
            .ok()
            .and_then(|m| m.get(scope_id).copied())
            .unwrap_or_default()
    }

    pub fn set_pending(&self, scope_id: &str, pending: usize) {
        self.update(scope_id, |s| s.pending = pending);
    }

    pub fn set_conflicts(&self, scope_id: &str, conflicts: usize) {
        self.update(scope_id, |s| s.conflicts = conflicts);
    }

    pub fn set(&self, scope_id: &str, snapshot: CountSnapshot) {
        self.update(scope_id, |s| *s = snapshot);
    }

    fn update(&self, scope_id: &str, f: impl FnOnce(&mut CountSnapshot)) {
        if let Ok(mut map) = self.inner.write() {
            f(map.entry(scope_id.to_string()).or_default());
        }
    }
}

// =============================================================================
// Notifier
// =============================================================================

/// Builds and emits [`CountEvent`]s for the currently resolvable scope.
pub struct Notifier {
    scope_provider: Arc<dyn ScopeProvider>,
    counts: Arc<CountCache>,
    emitter: Arc<dyn SyncEventEmitter>,
    last_synced_at: RwLock<Option<DateTime<Utc>>>,
}

impl Notifier {
    pub fn new(
        scope_provider: Arc<dyn ScopeProvider>,
        counts: Arc<CountCache>,
        emitter: Arc<dyn SyncEventEmitter>,
    ) -> Self {
        Notifier {
            scope_provider,
            counts,
            emitter,
            last_synced_at: RwLock::new(None),
        }
    }

    /// Counts of the current scope; 0/0 when there is none.
    pub fn snapshot(&self) -> CountSnapshot {
        self.scope_provider
            .resolve_scope()
            .map(|scope| self.counts.get(&scope.scope_id()))
            .unwrap_or_default()
    }

    /// Records the end of a completed sync cycle.
    pub fn mark_synced(&self, at: DateTime<Utc>) {
        if let Ok(mut guard) = self.last_synced_at.write() {
            *guard = Some(at);
        }
    }

    pub fn last_synced_at(&self) -> Option<DateTime<Utc>> {
        self.last_synced_at.read().ok().and_then(|g| *g)
    }

    /// Emits the current counts to every subscriber.
    pub fn dispatch(&self) -> CountEvent {
        let scope_id = self.scope_provider.resolve_scope().map(|s| s.scope_id());
        let snapshot = scope_id
            .as_deref()
            .map(|id| self.counts.get(id))
            .unwrap_or_default();

        let event = CountEvent {
            pending: snapshot.pending,
            conflicts: snapshot.conflicts,
            scope_id,
            last_synced_at: self.last_synced_at().unwrap_or_else(Utc::now),
        };

        trace!(
            pending = event.pending,
            conflicts = event.conflicts,
            "Dispatching count event"
        );
        self.emitter.emit_counts(&event);
        event
    }
}
