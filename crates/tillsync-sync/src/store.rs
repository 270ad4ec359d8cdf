//! # Offline Store
//!
//! Per-scope queue and conflict records on top of the key/value table.
//!
//! ## Read-Modify-Write
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  enqueue ──┐                                                            │
//! │  sync    ──┼──► mutate(scope, |state| ...)                              │
//! │  legacy  ──┘        │                                                   │
//! │                     ├── lock (one mutation at a time per process)       │
//! │                     ├── read queue + conflicts                          │
//! │                     ├── apply closure                                   │
//! │                     ├── write changed records in ONE transaction        │
//! │                     ├── refresh count cache                             │
//! │                     └── dispatch count event                            │
//! │                                                                         │
//! │  A sale enqueued while a batch POST is in flight lands in the queue    │
//! │  before the sync writes back; the write-back re-reads and applies      │
//! │  outcomes by local_id, so the new sale survives.                       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Reads never fail: a missing, corrupt or unreadable record is an empty list.

use serde::de::DeserializeOwned;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use tillsync_core::{ConflictedSale, CountSnapshot, QueuedSale, SyncScope};
use tillsync_db::{Database, OfflineStoreRepository};

use crate::error::SyncResult;
use crate::notifier::{CountCache, Notifier};

/// Queue and conflict list of one scope, as handed to a mutation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScopeState {
    pub queue: Vec<QueuedSale>,
    pub conflicts: Vec<ConflictedSale>,
}

impl ScopeState {
    /// True if `local_id` is already queued or conflicted.
    pub fn contains(&self, local_id: &str) -> bool {
        self.queue.iter().any(|s| s.local_id == local_id)
            || self.conflicts.iter().any(|c| c.local_id() == local_id)
    }

    pub fn counts(&self) -> CountSnapshot {
        CountSnapshot {
            pending: self.queue.len(),
            conflicts: self.conflicts.len(),
        }
    }
}

/// Durable per-scope records plus the count cache.
pub struct OfflineStore {
    repo: OfflineStoreRepository,
    counts: Arc<CountCache>,
    notifier: Arc<Notifier>,
    write_lock: Mutex<()>,
}

impl OfflineStore {
    pub fn new(db: &Database, counts: Arc<CountCache>, notifier: Arc<Notifier>) -> Self {
        OfflineStore {
            repo: db.offline_store(),
            counts,
            notifier,
            write_lock: Mutex::new(()),
        }
    }

    // =========================================================================
    // Reads
    // =========================================================================

    pub async fn read_queue(&self, scope: &SyncScope) -> Vec<QueuedSale> {
        self.read_list(&scope.queue_key()).await
    }

    pub async fn read_conflicts(&self, scope: &SyncScope) -> Vec<ConflictedSale> {
        self.read_list(&scope.conflicts_key()).await
    }

    async fn read_list<T: DeserializeOwned>(&self, key: &str) -> Vec<T> {
        let raw = match self.repo.get(key).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return Vec::new(),
            Err(e) => {
                warn!(key = %key, error = %e, "Failed to read offline record, treating as empty");
                return Vec::new();
            }
        };

        match serde_json::from_str(&raw) {
            Ok(list) => list,
            Err(e) => {
                warn!(key = %key, error = %e, "Corrupt offline record, treating as empty");
                Vec::new()
            }
        }
    }

    /// Reads both records and refreshes the cached counts.
    pub async fn read_state(&self, scope: &SyncScope) -> ScopeState {
        let state = ScopeState {
            queue: self.read_queue(scope).await,
            conflicts: self.read_conflicts(scope).await,
        };
        self.counts.set(&scope.scope_id(), state.counts());
        state
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// Replaces the scope's queue.
    pub async fn write_queue(&self, scope: &SyncScope, queue: &[QueuedSale]) -> SyncResult<()> {
        let _guard = self.write_lock.lock().await;
        let value = serde_json::to_string(queue)?;
        self.repo.put(&scope.queue_key(), &value).await?;
        self.counts.set_pending(&scope.scope_id(), queue.len());
        self.notifier.dispatch();
        Ok(())
    }

    /// Replaces the scope's conflict list.
    pub async fn write_conflicts(
        &self,
        scope: &SyncScope,
        conflicts: &[ConflictedSale],
    ) -> SyncResult<()> {
        let _guard = self.write_lock.lock().await;
        let value = serde_json::to_string(conflicts)?;
        self.repo.put(&scope.conflicts_key(), &value).await?;
        self.counts.set_conflicts(&scope.scope_id(), conflicts.len());
        self.notifier.dispatch();
        Ok(())
    }

    /// Runs a read-modify-write section on one scope.
    ///
    /// Only records that actually changed are written, together in one
    /// transaction. Returns whatever `f` returns.
    pub async fn mutate<F, R>(&self, scope: &SyncScope, f: F) -> SyncResult<R>
    where
        F: FnOnce(&mut ScopeState) -> R,
    {
        let _guard = self.write_lock.lock().await;

        let before = ScopeState {
            queue: self.read_queue(scope).await,
            conflicts: self.read_conflicts(scope).await,
        };
        let mut state = before.clone();
        let result = f(&mut state);

        let mut entries = Vec::with_capacity(2);
        if state.queue != before.queue {
            entries.push((scope.queue_key(), serde_json::to_string(&state.queue)?));
        }
        if state.conflicts != before.conflicts {
            entries.push((scope.conflicts_key(), serde_json::to_string(&state.conflicts)?));
        }

        if !entries.is_empty() {
            self.repo.put_all(&entries).await?;
            debug!(
                scope_id = %scope.scope_id(),
                pending = state.queue.len(),
                conflicts = state.conflicts.len(),
                "Offline records updated"
            );
        }

        self.counts.set(&scope.scope_id(), state.counts());
        if !entries.is_empty() {
            self.notifier.dispatch();
        }

        Ok(result)
    }

    /// Cached counts of a scope.
    pub fn cached_counts(&self, scope: &SyncScope) -> CountSnapshot {
        self.counts.get(&scope.scope_id())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notifier::{BroadcastEmitter, NoOpEmitter};
    use crate::scope::StaticScopeProvider;
    use chrono::Utc;
    use tillsync_core::{CreateSalePayload, Money, SaleItemInput};
    use tillsync_db::DbConfig;

    fn sale(local_id: &str) -> QueuedSale {
        let payload = CreateSalePayload::new(
            vec![SaleItemInput::new(1, 1, Money::from_cents(100))],
            "cash",
        );
        QueuedSale::new(local_id, payload, Utc::now())
    }

    async fn setup(scope: &SyncScope) -> (Database, OfflineStore) {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let counts = Arc::new(CountCache::new());
        let notifier = Arc::new(Notifier::new(
            Arc::new(StaticScopeProvider::new(scope.clone())),
            counts.clone(),
            Arc::new(NoOpEmitter),
        ));
        let store = OfflineStore::new(&db, counts, notifier);
        (db, store)
    }

    #[tokio::test]
    async fn test_empty_scope_reads_empty() {
        let scope = SyncScope::new("t1", "u1");
        let (_db, store) = setup(&scope).await;
        assert!(store.read_queue(&scope).await.is_empty());
        assert!(store.read_conflicts(&scope).await.is_empty());
    }

    #[tokio::test]
    async fn test_write_then_read_queue_updates_counts() {
        let scope = SyncScope::new("t1", "u1");
        let (_db, store) = setup(&scope).await;

        store.write_queue(&scope, &[sale("a"), sale("b")]).await.unwrap();

        let queue = store.read_queue(&scope).await;
        assert_eq!(queue.len(), 2);
        assert_eq!(queue[0].local_id, "a");
        assert_eq!(store.cached_counts(&scope).pending, 2);
    }

    #[tokio::test]
    async fn test_corrupt_record_reads_empty() {
        let scope = SyncScope::new("t1", "u1");
        let (db, store) = setup(&scope).await;

        db.offline_store()
            .put(&scope.queue_key(), "{not json")
            .await
            .unwrap();

        assert!(store.read_queue(&scope).await.is_empty());
    }

    #[tokio::test]
    async fn test_mutate_moves_sale_to_conflicts() {
        let scope = SyncScope::new("t1", "u1");
        let (_db, store) = setup(&scope).await;
        store.write_queue(&scope, &[sale("a"), sale("b")]).await.unwrap();

        store
            .mutate(&scope, |state| {
                let idx = state.queue.iter().position(|s| s.local_id == "a").unwrap();
                let moved = state.queue.remove(idx);
                state.conflicts.push(moved.into_conflict("Insufficient stock", Utc::now()));
            })
            .await
            .unwrap();

        let state = store.read_state(&scope).await;
        assert_eq!(state.queue.len(), 1);
        assert_eq!(state.conflicts.len(), 1);
        assert!(state.contains("a"));
        assert_eq!(state.conflicts[0].local_id(), "a");
        assert_eq!(store.cached_counts(&scope), CountSnapshot { pending: 1, conflicts: 1 });
    }

    #[tokio::test]
    async fn test_unchanged_mutation_emits_nothing() {
        let scope = SyncScope::new("t1", "u1");
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let counts = Arc::new(CountCache::new());
        let emitter = Arc::new(BroadcastEmitter::new());
        let mut rx = emitter.subscribe();
        let notifier = Arc::new(Notifier::new(
            Arc::new(StaticScopeProvider::new(scope.clone())),
            counts.clone(),
            emitter,
        ));
        let store = OfflineStore::new(&db, counts, notifier);

        store.mutate(&scope, |_| ()).await.unwrap();
        assert!(rx.try_recv().is_err());

        store.mutate(&scope, |s| s.queue.push(sale("x"))).await.unwrap();
        assert_eq!(rx.try_recv().unwrap().pending, 1);
    }

    #[tokio::test]
    async fn test_scopes_are_isolated() {
        let alice = SyncScope::new("t1", "alice");
        let bob = SyncScope::new("t1", "bob");
        let (_db, store) = setup(&alice).await;

        store.write_queue(&alice, &[sale("a1")]).await.unwrap();

        assert_eq!(store.read_queue(&alice).await.len(), 1);
        assert!(store.read_queue(&bob).await.is_empty());
    }
}
