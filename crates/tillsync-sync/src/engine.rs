//! # Offline Sales Sync Engine
//!
//! Enqueues sales that could not be created online and replays them in
//! batches.
//!
//! ## Sync Cycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     sync_queued_sales()                                 │
//! │                                                                         │
//! │  in-flight guard taken? ──────────────────────► AlreadyRunning         │
//! │  resolve scope         ── none ───────────────► NoScope                │
//! │  migrate legacy queue                                                   │
//! │  network offline?      ───────────────────────► Offline                │
//! │  read queue            ── empty ── refresh ───► Idle                   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  POST /sales/sync (whole queue, client_txn_id = local_id)              │
//! │       │                                                                 │
//! │       ├── network error ── no mutation ───────► Offline                │
//! │       ├── 401 / 403     ── no mutation ───────► Err(Unauthorized)      │
//! │       ├── other error   ── attempts += 1 all ─► Err(e)                 │
//! │       └── results, per queued sale:                                    │
//! │             success        → removed                                   │
//! │             final failure  → conflicts                                 │
//! │             other failure  → attempts += 1, stays                      │
//! │             no result      → unchanged                                 │
//! │                                    ───────────► Synced(report)         │
//! │                                                                         │
//! │  The guard is released on every path (drop guard).                     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use tillsync_core::{
    conflict_reason, generate_local_id, is_final_failure, ConflictedSale, CountEvent,
    CountSnapshot, CreateSalePayload, QueuedSale, Sale, SyncScope,
};
use tillsync_db::Database;

use crate::api::{SalesSyncApi, SyncBatchItem, SyncItemResult};
use crate::error::{SyncError, SyncResult};
use crate::legacy::LegacyQueueFile;
use crate::notifier::{CountCache, NoOpEmitter, Notifier, SyncEventEmitter};
use crate::scheduler::NetworkStatus;
use crate::scope::ScopeProvider;
use crate::store::OfflineStore;

/// `last_error` recorded when the server fails a sale without a message.
pub const UNKNOWN_SYNC_ERROR: &str = "Sync failed without an error message";

// =============================================================================
// Outcomes
// =============================================================================

/// Counts of one completed sync cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    /// Accepted by the server and removed from the queue.
    pub synced: usize,
    /// Moved to the conflict list.
    pub conflicted: usize,
    /// Failed transiently; still queued with one more attempt.
    pub retried: usize,
    /// Sent but absent from the response; left as they were.
    pub unmatched: usize,
}

/// How a call to [`OfflineSalesSync::sync_queued_sales`] ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Another cycle is in flight in this process.
    AlreadyRunning,
    /// No authenticated scope.
    NoScope,
    /// Offline, or the batch request got no response.
    Offline,
    /// Nothing queued.
    Idle,
    Synced(SyncReport),
}

/// What an enqueue returns right away.
///
/// The sale is persisted and a sync attempted by a background task; await
/// [`QueuedSaleHandle::persisted`] to wait for both, or drop it.
#[derive(Debug)]
pub struct QueuedSaleHandle {
    pub sale: Sale,
    pub local_id: String,
    task: JoinHandle<SyncResult<()>>,
}

impl QueuedSaleHandle {
    /// Waits for the background append (and the sync attempt after it).
    pub async fn persisted(self) -> SyncResult<()> {
        self.task.await?
    }

    pub fn into_parts(self) -> (Sale, JoinHandle<SyncResult<()>>) {
        (self.sale, self.task)
    }
}

/// Result of the online-first helper.
#[derive(Debug)]
pub enum CreatedSale {
    /// The backend created the sale.
    Online(Sale),
    /// The backend was unreachable; the sale was queued.
    Queued(QueuedSaleHandle),
}

impl CreatedSale {
    pub fn sale(&self) -> &Sale {
        match self {
            CreatedSale::Online(sale) => sale,
            CreatedSale::Queued(handle) => &handle.sale,
        }
    }

    pub fn is_queued(&self) -> bool {
        matches!(self, CreatedSale::Queued(_))
    }
}

// =============================================================================
// In-Flight Guard
// =============================================================================

struct InFlightGuard<'a>(&'a AtomicBool);

impl<'a> InFlightGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| InFlightGuard(flag))
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

// =============================================================================
// Engine
// =============================================================================

/// The offline sale queue of one process.
///
/// Shared as `Arc<OfflineSalesSync>`; build it with [`OfflineSalesSyncBuilder`].
pub struct OfflineSalesSync {
    store: OfflineStore,
    api: Arc<dyn SalesSyncApi>,
    scope_provider: Arc<dyn ScopeProvider>,
    notifier: Arc<Notifier>,
    network: Arc<NetworkStatus>,
    legacy: Option<LegacyQueueFile>,
    in_flight: AtomicBool,
}

impl OfflineSalesSync {
    /// Returns a builder.
    pub fn builder(db: Database) -> OfflineSalesSyncBuilder {
        OfflineSalesSyncBuilder::new(db)
    }

    pub fn resolve_scope(&self) -> Option<SyncScope> {
        self.scope_provider.resolve_scope()
    }

    pub fn network(&self) -> &Arc<NetworkStatus> {
        &self.network
    }

    pub fn store(&self) -> &OfflineStore {
        &self.store
    }

    /// True while a sync cycle holds the in-flight guard.
    pub fn is_syncing(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    // =========================================================================
    // Enqueue
    // =========================================================================

    /// Queues a sale for later replay and returns its optimistic local copy.
    ///
    /// The payload is assumed queue-eligible (see
    /// [`tillsync_core::is_queue_eligible`]). The append and a follow-up sync
    /// run on a spawned task; must be called inside a Tokio runtime.
    ///
    /// ## Errors
    /// - [`SyncError::NoScope`] if no tenant scope can be resolved
    pub fn queue_sale_for_sync(
        self: &Arc<Self>,
        mut payload: CreateSalePayload,
    ) -> SyncResult<QueuedSaleHandle> {
        let scope = self.resolve_scope().ok_or(SyncError::NoScope)?;
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| SyncError::Internal(format!("No async runtime: {}", e)))?;

        let local_id = generate_local_id();
        payload.ensure_reference(&local_id);

        let now = Utc::now();
        let sale = Sale::optimistic(&local_id, &payload, now);
        let queued = QueuedSale::new(local_id.clone(), payload, now);

        let engine = Arc::clone(self);
        let task = runtime.spawn(async move {
            let local_id = queued.local_id.clone();
            engine
                .store
                .mutate(&scope, |state| state.queue.push(queued))
                .await?;
            info!(scope_id = %scope.scope_id(), local_id = %local_id, "Sale queued for offline sync");

            if let Err(e) = engine.sync_queued_sales().await {
                warn!(error = %e, "Sync after enqueue failed");
            }
            Ok(())
        });

        Ok(QueuedSaleHandle {
            sale,
            local_id,
            task,
        })
    }

    // =========================================================================
    // Sync
    // =========================================================================

    /// Runs one sync cycle for the current scope.
    pub async fn sync_queued_sales(&self) -> SyncResult<SyncOutcome> {
        let Some(_guard) = InFlightGuard::acquire(&self.in_flight) else {
            debug!("Sync already in flight, skipping");
            return Ok(SyncOutcome::AlreadyRunning);
        };

        let Some(scope) = self.resolve_scope() else {
            debug!("No sync scope, skipping");
            return Ok(SyncOutcome::NoScope);
        };

        self.migrate_legacy_for(&scope).await;

        if !self.network.is_online() {
            debug!(scope_id = %scope.scope_id(), "Offline, skipping sync");
            return Ok(SyncOutcome::Offline);
        }

        let queue = self.store.read_queue(&scope).await;
        if queue.is_empty() {
            self.store.read_state(&scope).await;
            self.notifier.dispatch();
            return Ok(SyncOutcome::Idle);
        }

        let batch: Vec<SyncBatchItem> = queue.iter().map(SyncBatchItem::from_queued).collect();
        let sent: HashSet<String> = queue.into_iter().map(|s| s.local_id).collect();

        info!(scope_id = %scope.scope_id(), count = batch.len(), "Syncing offline sales");

        match self.api.sync_batch(&batch).await {
            Ok(results) => {
                let report = self.apply_results(&scope, &sent, results).await?;
                let finished_at = Utc::now();
                self.notifier.mark_synced(finished_at);
                self.notifier.dispatch();

                info!(
                    scope_id = %scope.scope_id(),
                    synced = report.synced,
                    conflicted = report.conflicted,
                    retried = report.retried,
                    unmatched = report.unmatched,
                    "Offline sync finished"
                );
                Ok(SyncOutcome::Synced(report))
            }
            Err(e) if e.is_network() => {
                info!(error = %e, "Sales API unreachable, will retry later");
                Ok(SyncOutcome::Offline)
            }
            Err(e) if e.is_auth_failure() => {
                warn!(error = %e, "Sync rejected credentials, queue left untouched");
                Err(e)
            }
            Err(e) => {
                warn!(error = %e, count = sent.len(), "Sync batch failed, recording attempt");
                let message = e.to_string();
                let now = Utc::now();
                self.store
                    .mutate(&scope, |state| {
                        state
                            .queue
                            .iter_mut()
                            .filter(|s| sent.contains(&s.local_id))
                            .for_each(|s| s.record_failure(message.clone(), now));
                    })
                    .await?;
                Err(e)
            }
        }
    }

    /// Applies per-sale results to the freshly read queue.
    async fn apply_results(
        &self,
        scope: &SyncScope,
        sent: &HashSet<String>,
        results: Vec<SyncItemResult>,
    ) -> SyncResult<SyncReport> {
        let results: HashMap<String, SyncItemResult> = results
            .into_iter()
            .map(|r| (r.client_txn_id.clone(), r))
            .collect();
        let now = Utc::now();

        self.store
            .mutate(scope, |state| {
                let mut report = SyncReport::default();
                let queue = std::mem::take(&mut state.queue);

                for mut sale in queue {
                    // Enqueued while the batch was in flight
                    if !sent.contains(&sale.local_id) {
                        state.queue.push(sale);
                        continue;
                    }

                    let Some(result) = results.get(&sale.local_id) else {
                        report.unmatched += 1;
                        state.queue.push(sale);
                        continue;
                    };

                    if result.success {
                        report.synced += 1;
                        continue;
                    }

                    let reason = result.failure_reason();
                    let error = result.error.as_deref();
                    if is_final_failure(reason, error) {
                        report.conflicted += 1;
                        let already = state.conflicts.iter().any(|c| c.local_id() == sale.local_id);
                        if !already {
                            state
                                .conflicts
                                .push(sale.into_conflict(conflict_reason(reason, error), now));
                        }
                    } else {
                        report.retried += 1;
                        sale.record_failure(error.unwrap_or(UNKNOWN_SYNC_ERROR), now);
                        state.queue.push(sale);
                    }
                }

                report
            })
            .await
    }

    async fn migrate_legacy_for(&self, scope: &SyncScope) {
        if let Some(legacy) = &self.legacy {
            if let Err(e) = legacy.migrate_into(&self.store, scope).await {
                warn!(error = %e, "Legacy queue migration failed");
            }
        }
    }

    /// Folds the legacy unscoped queue into the current scope, if any.
    pub async fn migrate_legacy_queue(&self) -> SyncResult<usize> {
        match (&self.legacy, self.resolve_scope()) {
            (Some(legacy), Some(scope)) => legacy.migrate_into(&self.store, &scope).await,
            _ => Ok(0),
        }
    }

    // =========================================================================
    // Counts & Inspection
    // =========================================================================

    /// Re-reads the current scope's records into the count cache and emits.
    pub async fn refresh_counts(&self) -> CountSnapshot {
        let snapshot = match self.resolve_scope() {
            Some(scope) => self.store.read_state(&scope).await.counts(),
            None => CountSnapshot::default(),
        };
        self.notifier.dispatch();
        snapshot
    }

    /// Emits the cached counts of the current scope.
    pub fn dispatch(&self) -> CountEvent {
        self.notifier.dispatch()
    }

    pub fn pending_count(&self) -> usize {
        self.notifier.snapshot().pending
    }

    pub fn conflict_count(&self) -> usize {
        self.notifier.snapshot().conflicts
    }

    pub fn last_synced_at(&self) -> Option<DateTime<Utc>> {
        self.notifier.last_synced_at()
    }

    /// The current scope's conflicted sales, for manual review.
    pub async fn conflicts(&self) -> Vec<ConflictedSale> {
        match self.resolve_scope() {
            Some(scope) => self.store.read_conflicts(&scope).await,
            None => Vec::new(),
        }
    }

    // =========================================================================
    // Online-First Creation
    // =========================================================================

    /// Creates a sale online, falling back to the offline queue when the
    /// backend is unreachable.
    ///
    /// Real-time payments (mobile-money push) are never queued: their
    /// errors are returned unchanged. Non-network errors always propagate.
    pub async fn create_sale(self: &Arc<Self>, payload: CreateSalePayload) -> SyncResult<CreatedSale> {
        if payload.is_realtime_payment() {
            return self.api.create_sale(&payload).await.map(CreatedSale::Online);
        }

        if !self.network.is_online() {
            debug!("Offline, queueing sale directly");
            return self.queue_sale_for_sync(payload).map(CreatedSale::Queued);
        }

        match self.api.create_sale(&payload).await {
            Ok(sale) => Ok(CreatedSale::Online(sale)),
            Err(e) if e.is_network() => {
                warn!(error = %e, "Sale creation unreachable, queueing offline");
                self.queue_sale_for_sync(payload).map(CreatedSale::Queued)
            }
            Err(e) => Err(e),
        }
    }
}

// =============================================================================
// Builder Pattern
// =============================================================================

/// Builder for creating OfflineSalesSync with options.
pub struct OfflineSalesSyncBuilder {
    db: Database,
    api: Option<Arc<dyn SalesSyncApi>>,
    scope_provider: Option<Arc<dyn ScopeProvider>>,
    emitter: Option<Arc<dyn SyncEventEmitter>>,
    network: Option<Arc<NetworkStatus>>,
    legacy_queue_path: Option<PathBuf>,
}

impl OfflineSalesSyncBuilder {
    pub fn new(db: Database) -> Self {
        OfflineSalesSyncBuilder {
            db,
            api: None,
            scope_provider: None,
            emitter: None,
            network: None,
            legacy_queue_path: None,
        }
    }

    pub fn with_api(mut self, api: Arc<dyn SalesSyncApi>) -> Self {
        self.api = Some(api);
        self
    }

    pub fn with_scope_provider(mut self, provider: Arc<dyn ScopeProvider>) -> Self {
        self.scope_provider = Some(provider);
        self
    }

    pub fn with_emitter(mut self, emitter: Arc<dyn SyncEventEmitter>) -> Self {
        self.emitter = Some(emitter);
        self
    }

    pub fn with_network_status(mut self, network: Arc<NetworkStatus>) -> Self {
        self.network = Some(network);
        self
    }

    pub fn with_legacy_queue(mut self, path: impl Into<PathBuf>) -> Self {
        self.legacy_queue_path = Some(path.into());
        self
    }

    /// Builds the engine.
    pub fn build(self) -> SyncResult<Arc<OfflineSalesSync>> {
        let api = self
            .api
            .ok_or_else(|| SyncError::InvalidConfig("Sales API required".into()))?;
        let scope_provider = self
            .scope_provider
            .ok_or_else(|| SyncError::InvalidConfig("Scope provider required".into()))?;
        let emitter = self.emitter.unwrap_or_else(|| Arc::new(NoOpEmitter));
        let network = self
            .network
            .unwrap_or_else(|| Arc::new(NetworkStatus::default()));

        let counts = Arc::new(CountCache::new());
        let notifier = Arc::new(Notifier::new(scope_provider.clone(), counts.clone(), emitter));
        let store = OfflineStore::new(&self.db, counts, notifier.clone());

        Ok(Arc::new(OfflineSalesSync {
            store,
            api,
            scope_provider,
            notifier,
            network,
            legacy: self.legacy_queue_path.map(LegacyQueueFile::new),
            in_flight: AtomicBool::new(false),
        }))
    }
}
