//! End-to-end behaviour of the offline sale queue against a scripted API.

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;

use tillsync_core::{CreateSalePayload, Money, QueuedSale, Sale, SaleItemInput, SyncScope};
use tillsync_db::{Database, DbConfig};
use tillsync_sync::{
    BroadcastEmitter, LifecycleSignal, OfflineSalesSync, SalesSyncApi, Session,
    SessionScopeProvider, SessionSlot, StaticScopeProvider, SyncBatchItem, SyncError,
    SyncItemResult, SyncOutcome, SyncReport, SyncResult, SyncScheduler,
};

// ── Scripted API ────────────────────────────────────────────────

type Handler = Box<dyn Fn(&SyncBatchItem) -> SyncItemResult + Send + Sync>;
type Failure = Box<dyn Fn() -> SyncError + Send + Sync>;

/// Answers per sale through `handler`, or fails the whole call with `error`.
struct ScriptedApi {
    handler: Mutex<Handler>,
    error: Mutex<Option<Failure>>,
    calls: AtomicUsize,
    batches: Mutex<Vec<Vec<String>>>,
    gate: Option<Arc<Notify>>,
    started: Arc<Notify>,
}

impl ScriptedApi {
    fn accepting() -> Self {
        Self::with_handler(|item| SyncItemResult::succeeded(item.client_txn_id.clone()))
    }

    fn with_handler(handler: impl Fn(&SyncBatchItem) -> SyncItemResult + Send + Sync + 'static) -> Self {
        ScriptedApi {
            handler: Mutex::new(Box::new(handler)),
            error: Mutex::new(None),
            calls: AtomicUsize::new(0),
            batches: Mutex::new(Vec::new()),
            gate: None,
            started: Arc::new(Notify::new()),
        }
    }

    /// Blocks every batch until the returned gate is notified.
    fn gated(mut self) -> (Self, Arc<Notify>) {
        let gate = Arc::new(Notify::new());
        self.gate = Some(gate.clone());
        (self, gate)
    }

    fn fail_with(&self, error: impl Fn() -> SyncError + Send + Sync + 'static) {
        *self.error.lock().unwrap() = Some(Box::new(error));
    }

    fn recover(&self) {
        *self.error.lock().unwrap() = None;
    }

    fn set_handler(&self, handler: impl Fn(&SyncBatchItem) -> SyncItemResult + Send + Sync + 'static) {
        *self.handler.lock().unwrap() = Box::new(handler);
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn last_batch(&self) -> Vec<String> {
        self.batches.lock().unwrap().last().cloned().unwrap_or_default()
    }
}

#[async_trait]
impl SalesSyncApi for ScriptedApi {
    async fn sync_batch(&self, sales: &[SyncBatchItem]) -> SyncResult<Vec<SyncItemResult>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.batches
            .lock()
            .unwrap()
            .push(sales.iter().map(|s| s.client_txn_id.clone()).collect());
        self.started.notify_one();

        if let Some(gate) = &self.gate {
            gate.notified().await;
        }

        if let Some(error) = self.error.lock().unwrap().as_ref() {
            return Err(error());
        }

        let handler = self.handler.lock().unwrap();
        Ok(sales.iter().map(|s| handler(s)).collect())
    }

    async fn create_sale(&self, _payload: &CreateSalePayload) -> SyncResult<Sale> {
        Err(SyncError::Network("connection refused".into()))
    }
}

// ── Fixtures ────────────────────────────────────────────────────

fn scope() -> SyncScope {
    SyncScope::new("tenant-1", "cashier-1")
        .with_branch("branch-1")
        .with_terminal("till-1")
}

fn payload(product_id: i64) -> CreateSalePayload {
    CreateSalePayload::new(
        vec![SaleItemInput::new(product_id, 1, Money::from_cents(1_000))],
        "cash",
    )
}

async fn engine_with(api: Arc<ScriptedApi>) -> Arc<OfflineSalesSync> {
    let db = Database::new(DbConfig::in_memory()).await.unwrap();
    OfflineSalesSync::builder(db)
        .with_api(api)
        .with_scope_provider(Arc::new(StaticScopeProvider::new(scope())))
        .build()
        .unwrap()
}

/// Enqueues while offline so nothing is sent yet.
async fn enqueue_offline(engine: &Arc<OfflineSalesSync>, count: i64) -> Vec<String> {
    engine.network().set_online(false);
    let mut ids = Vec::new();
    for i in 0..count {
        let handle = engine.queue_sale_for_sync(payload(i + 1)).unwrap();
        ids.push(handle.local_id.clone());
        handle.persisted().await.unwrap();
    }
    engine.network().set_online(true);
    ids
}

async fn eventually(mut check: impl FnMut() -> bool) -> bool {
    for _ in 0..100 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    false
}

// ── Durability ──────────────────────────────────────────────────

#[tokio::test]
async fn queued_sales_survive_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("tillsync.db");
    let api = Arc::new(ScriptedApi::accepting());

    {
        let db = Database::new(DbConfig::new(&path)).await.unwrap();
        let engine = OfflineSalesSync::builder(db.clone())
            .with_api(api.clone())
            .with_scope_provider(Arc::new(StaticScopeProvider::new(scope())))
            .build()
            .unwrap();
        enqueue_offline(&engine, 2).await;
        db.close().await;
    }

    let db = Database::new(DbConfig::new(&path)).await.unwrap();
    let engine = OfflineSalesSync::builder(db)
        .with_api(api.clone())
        .with_scope_provider(Arc::new(StaticScopeProvider::new(scope())))
        .build()
        .unwrap();

    assert_eq!(engine.refresh_counts().await.pending, 2);
    assert_eq!(api.calls(), 0);
}

// ── Success and idempotency ─────────────────────────────────────

#[tokio::test]
async fn successful_batch_empties_queue_once() {
    let api = Arc::new(ScriptedApi::accepting());
    let engine = engine_with(api.clone()).await;
    let ids = enqueue_offline(&engine, 2).await;

    let outcome = engine.sync_queued_sales().await.unwrap();
    assert_eq!(
        outcome,
        SyncOutcome::Synced(SyncReport { synced: 2, ..Default::default() })
    );
    assert_eq!(api.last_batch(), ids);
    assert_eq!(engine.pending_count(), 0);

    assert_eq!(engine.sync_queued_sales().await.unwrap(), SyncOutcome::Idle);
    assert_eq!(api.calls(), 1);
}

#[tokio::test]
async fn batch_uses_local_id_as_reference_and_txn_id() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let seen_in_api = seen.clone();
    let api = Arc::new(ScriptedApi::with_handler(move |item| {
        seen_in_api
            .lock()
            .unwrap()
            .push((item.client_txn_id.clone(), item.payload.reference.clone()));
        SyncItemResult::succeeded(item.client_txn_id.clone())
    }));
    let engine = engine_with(api).await;
    let ids = enqueue_offline(&engine, 1).await;

    engine.sync_queued_sales().await.unwrap();

    let seen = seen.lock().unwrap();
    assert_eq!(seen[0].0, ids[0]);
    assert_eq!(seen[0].1.as_deref(), Some(ids[0].as_str()));
}

#[tokio::test]
async fn single_cash_sale_round_trip() {
    let api = Arc::new(ScriptedApi::accepting());
    let emitter = Arc::new(BroadcastEmitter::new());
    let mut events = emitter.subscribe();
    let db = Database::new(DbConfig::in_memory()).await.unwrap();
    let engine = OfflineSalesSync::builder(db)
        .with_api(api.clone())
        .with_scope_provider(Arc::new(StaticScopeProvider::new(scope())))
        .with_emitter(emitter)
        .build()
        .unwrap();

    let payload = CreateSalePayload::new(
        vec![SaleItemInput::new(1, 2, Money::from_major(100.0))],
        "cash",
    )
    .with_tax(Money::zero());
    engine
        .store()
        .write_queue(&scope(), &[QueuedSale::new("offline-1", payload, chrono::Utc::now())])
        .await
        .unwrap();

    let outcome = engine.sync_queued_sales().await.unwrap();
    assert_eq!(
        outcome,
        SyncOutcome::Synced(SyncReport { synced: 1, ..Default::default() })
    );
    assert_eq!(api.last_batch(), vec!["offline-1".to_string()]);

    let state = engine.store().read_state(&scope()).await;
    assert!(state.queue.is_empty());
    assert!(state.conflicts.is_empty());

    let mut last = None;
    while let Ok(event) = events.try_recv() {
        last = Some(event);
    }
    assert_eq!(last.unwrap().pending, 0);
}

// ── Classification ──────────────────────────────────────────────

#[tokio::test]
async fn failures_are_routed_by_finality() {
    let api = Arc::new(ScriptedApi::accepting());
    let engine = engine_with(api.clone()).await;
    let ids = enqueue_offline(&engine, 4).await;

    let (stock, invalid, timeout, ok) = (ids[0].clone(), ids[1].clone(), ids[2].clone(), ids[3].clone());
    api.set_handler(move |item| {
        let id = item.client_txn_id.as_str();
        if id == stock {
            SyncItemResult::failed(id, Some("Insufficient stock for product 1"), None)
        } else if id == invalid {
            SyncItemResult::failed(id, None, Some("validation"))
        } else if id == timeout {
            SyncItemResult::failed(id, Some("Upstream timeout"), Some("server"))
        } else {
            SyncItemResult::succeeded(id)
        }
    });

    let outcome = engine.sync_queued_sales().await.unwrap();
    assert_eq!(
        outcome,
        SyncOutcome::Synced(SyncReport { synced: 1, conflicted: 2, retried: 1, unmatched: 0 })
    );

    let state = engine.store().read_state(&scope()).await;
    assert_eq!(state.queue.len(), 1);
    assert_eq!(state.queue[0].local_id, ids[2]);
    assert_eq!(state.queue[0].attempts, 1);
    assert_eq!(state.queue[0].last_error.as_deref(), Some("Upstream timeout"));
    assert!(state.queue[0].last_attempt_at.is_some());

    let reasons: Vec<_> = state
        .conflicts
        .iter()
        .map(|c| (c.local_id().to_string(), c.conflict_reason.clone()))
        .collect();
    assert!(reasons.contains(&(ids[0].clone(), "Insufficient stock for product 1".to_string())));
    assert!(reasons.contains(&(ids[1].clone(), "Rejected by server (validation)".to_string())));
    assert!(!state.contains(&ok));

    assert_eq!(engine.pending_count(), 1);
    assert_eq!(engine.conflict_count(), 2);
}

#[tokio::test]
async fn missing_results_leave_sales_untouched() {
    let api = Arc::new(ScriptedApi::accepting());
    let engine = engine_with(api.clone()).await;
    let ids = enqueue_offline(&engine, 2).await;

    let answered = ids[0].clone();
    api.set_handler(move |_item| SyncItemResult::succeeded(answered.clone()));

    let outcome = engine.sync_queued_sales().await.unwrap();
    assert_eq!(
        outcome,
        SyncOutcome::Synced(SyncReport { synced: 1, unmatched: 1, ..Default::default() })
    );

    let queue = engine.store().read_queue(&scope()).await;
    assert_eq!(queue.len(), 1);
    assert_eq!(queue[0].local_id, ids[1]);
    assert_eq!(queue[0].attempts, 0);
}

// ── Whole-batch failures ────────────────────────────────────────

#[tokio::test]
async fn server_error_counts_an_attempt_for_every_sale() {
    let api = Arc::new(ScriptedApi::accepting());
    let engine = engine_with(api.clone()).await;
    enqueue_offline(&engine, 2).await;

    api.fail_with(|| SyncError::Server { status: 503, message: "Maintenance".into() });
    let err = engine.sync_queued_sales().await.unwrap_err();
    assert!(matches!(err, SyncError::Server { status: 503, .. }));

    let queue = engine.store().read_queue(&scope()).await;
    assert_eq!(queue.len(), 2);
    assert!(queue.iter().all(|s| s.attempts == 1));
    assert!(queue
        .iter()
        .all(|s| s.last_error.as_deref() == Some("Maintenance (HTTP 503)")));

    api.recover();
    engine.sync_queued_sales().await.unwrap();
    assert_eq!(engine.pending_count(), 0);
}

#[tokio::test]
async fn auth_failure_leaves_queue_untouched() {
    let api = Arc::new(ScriptedApi::accepting());
    let engine = engine_with(api.clone()).await;
    enqueue_offline(&engine, 1).await;

    api.fail_with(|| SyncError::Unauthorized { status: 401 });
    let err = engine.sync_queued_sales().await.unwrap_err();
    assert!(err.is_auth_failure());

    let queue = engine.store().read_queue(&scope()).await;
    assert_eq!(queue[0].attempts, 0);
    assert!(queue[0].last_error.is_none());
}

#[tokio::test]
async fn unreachable_backend_leaves_queue_untouched() {
    let api = Arc::new(ScriptedApi::accepting());
    let engine = engine_with(api.clone()).await;
    enqueue_offline(&engine, 1).await;

    api.fail_with(|| SyncError::Network("connection reset".into()));
    assert_eq!(engine.sync_queued_sales().await.unwrap(), SyncOutcome::Offline);
    assert_eq!(engine.store().read_queue(&scope()).await[0].attempts, 0);
}

#[tokio::test]
async fn offline_skips_the_network() {
    let api = Arc::new(ScriptedApi::accepting());
    let engine = engine_with(api.clone()).await;
    enqueue_offline(&engine, 1).await;

    engine.network().set_online(false);
    assert_eq!(engine.sync_queued_sales().await.unwrap(), SyncOutcome::Offline);
    assert_eq!(api.calls(), 0);
}

// ── Concurrency ─────────────────────────────────────────────────

#[tokio::test]
async fn concurrent_sync_is_skipped_while_one_is_in_flight() {
    let (api, gate) = ScriptedApi::accepting().gated();
    let api = Arc::new(api);
    let engine = engine_with(api.clone()).await;
    enqueue_offline(&engine, 1).await;

    let first = {
        let engine = engine.clone();
        tokio::spawn(async move { engine.sync_queued_sales().await })
    };
    api.started.notified().await;

    assert!(engine.is_syncing());
    assert_eq!(engine.sync_queued_sales().await.unwrap(), SyncOutcome::AlreadyRunning);

    gate.notify_one();
    let outcome = first.await.unwrap().unwrap();
    assert!(matches!(outcome, SyncOutcome::Synced(r) if r.synced == 1));
    assert_eq!(api.calls(), 1);
    assert!(!engine.is_syncing());
}

#[tokio::test]
async fn sale_enqueued_during_sync_is_kept() {
    let (api, gate) = ScriptedApi::accepting().gated();
    let api = Arc::new(api);
    let engine = engine_with(api.clone()).await;
    let first_ids = enqueue_offline(&engine, 1).await;

    let sync = {
        let engine = engine.clone();
        tokio::spawn(async move { engine.sync_queued_sales().await })
    };
    api.started.notified().await;

    let late = engine.queue_sale_for_sync(payload(9)).unwrap();
    let late_id = late.local_id.clone();
    late.persisted().await.unwrap();

    gate.notify_one();
    sync.await.unwrap().unwrap();

    assert_eq!(api.last_batch(), first_ids);
    let queue = engine.store().read_queue(&scope()).await;
    assert_eq!(queue.len(), 1);
    assert_eq!(queue[0].local_id, late_id);
    assert_eq!(queue[0].attempts, 0);
}

// ── Legacy queue ────────────────────────────────────────────────

#[tokio::test]
async fn legacy_queue_is_folded_into_the_next_batch() {
    let dir = tempfile::tempdir().unwrap();
    let legacy_path = dir.path().join("offline-sales-queue.json");

    let api = Arc::new(ScriptedApi::accepting());
    let db = Database::new(DbConfig::in_memory()).await.unwrap();
    let engine = OfflineSalesSync::builder(db)
        .with_api(api.clone())
        .with_scope_provider(Arc::new(StaticScopeProvider::new(scope())))
        .with_legacy_queue(&legacy_path)
        .build()
        .unwrap();
    let ids = enqueue_offline(&engine, 1).await;

    // Written by an older build, camelCase and unscoped
    let legacy_entry = |local_id: &str| {
        serde_json::json!({
            "localId": local_id,
            "payload": {
                "items": [{"product_id": 5, "quantity": 0.5, "price": 12.99}],
                "payment_method": "cash"
            },
            "queuedAt": "2024-05-01T10:00:00Z",
            "attempts": 2
        })
    };
    std::fs::write(
        &legacy_path,
        serde_json::json!([legacy_entry("offline-legacy-1"), legacy_entry("offline-legacy-2")])
            .to_string(),
    )
    .unwrap();

    let outcome = engine.sync_queued_sales().await.unwrap();
    assert_eq!(
        outcome,
        SyncOutcome::Synced(SyncReport { synced: 3, ..Default::default() })
    );
    assert_eq!(api.calls(), 1);
    assert_eq!(
        api.last_batch(),
        vec![
            ids[0].clone(),
            "offline-legacy-1".to_string(),
            "offline-legacy-2".to_string()
        ]
    );
    assert!(!legacy_path.exists());
    assert!(engine.store().read_queue(&scope()).await.is_empty());
}

// ── Scopes ──────────────────────────────────────────────────────

#[tokio::test]
async fn scopes_do_not_see_each_other() {
    let api = Arc::new(ScriptedApi::accepting());
    let slot = Arc::new(SessionSlot::new(Some(
        Session::new("alice", "token-a").with_tenant("tenant-1"),
    )));
    let db = Database::new(DbConfig::in_memory()).await.unwrap();
    let engine = OfflineSalesSync::builder(db)
        .with_api(api.clone())
        .with_scope_provider(Arc::new(SessionScopeProvider::new(slot.clone())))
        .build()
        .unwrap();

    enqueue_offline(&engine, 1).await;
    assert_eq!(engine.pending_count(), 1);

    slot.set(Session::new("bob", "token-b").with_tenant("tenant-1"));
    assert_eq!(engine.refresh_counts().await.pending, 0);
    assert_eq!(engine.sync_queued_sales().await.unwrap(), SyncOutcome::Idle);
    assert_eq!(api.calls(), 0);

    slot.clear();
    assert!(matches!(
        engine.queue_sale_for_sync(payload(1)),
        Err(SyncError::NoScope)
    ));
    assert_eq!(engine.sync_queued_sales().await.unwrap(), SyncOutcome::NoScope);

    slot.set(Session::new("alice", "token-a").with_tenant("tenant-1"));
    assert_eq!(engine.refresh_counts().await.pending, 1);
}

// ── Events ──────────────────────────────────────────────────────

#[tokio::test]
async fn count_events_follow_the_queue() {
    let api = Arc::new(ScriptedApi::accepting());
    let emitter = Arc::new(BroadcastEmitter::new());
    let mut events = emitter.subscribe();
    let db = Database::new(DbConfig::in_memory()).await.unwrap();
    let engine = OfflineSalesSync::builder(db)
        .with_api(api)
        .with_scope_provider(Arc::new(StaticScopeProvider::new(scope())))
        .with_emitter(emitter)
        .build()
        .unwrap();

    enqueue_offline(&engine, 1).await;
    let queued = events.recv().await.unwrap();
    assert_eq!(queued.pending, 1);
    assert_eq!(queued.scope_id.as_deref(), Some(scope().scope_id().as_str()));

    engine.sync_queued_sales().await.unwrap();
    let mut last = queued;
    while let Ok(event) = events.try_recv() {
        last = event;
    }
    assert_eq!(last.pending, 0);
    assert_eq!(Some(last.last_synced_at), engine.last_synced_at());
}

// ── Scheduler ───────────────────────────────────────────────────

#[tokio::test]
async fn scheduler_syncs_on_start_timer_and_reconnect() {
    let api = Arc::new(ScriptedApi::with_handler(|item| {
        SyncItemResult::failed(item.client_txn_id.clone(), Some("Try later"), Some("server"))
    }));
    let engine = engine_with(api.clone()).await;
    enqueue_offline(&engine, 1).await;

    let scheduler = SyncScheduler::new(engine.clone(), Duration::from_millis(100));
    scheduler.initialize().await;
    scheduler.initialize().await;
    assert!(scheduler.is_initialized());

    assert!(eventually(|| api.calls() >= 1).await);
    assert!(eventually(|| api.calls() >= 3).await);

    scheduler.dispose();
    scheduler.dispose();
    assert!(!scheduler.is_initialized());

    tokio::time::sleep(Duration::from_millis(150)).await;
    let settled = api.calls();
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(api.calls(), settled);

    // Listener outlives dispose
    engine.network().set_online(false);
    engine.network().set_online(true);
    assert!(eventually(|| api.calls() > settled).await);

    engine.network().signals().publish(LifecycleSignal::BecameVisible);
    let after_reconnect = api.calls();
    assert!(eventually(|| api.calls() > after_reconnect).await);
}

#[tokio::test]
async fn reinitialize_after_dispose_restarts_timer() {
    let api = Arc::new(ScriptedApi::with_handler(|item| {
        SyncItemResult::failed(item.client_txn_id.clone(), Some("Try later"), None)
    }));
    let engine = engine_with(api.clone()).await;
    enqueue_offline(&engine, 1).await;

    let scheduler = SyncScheduler::new(engine, Duration::from_millis(50));
    scheduler.initialize().await;
    scheduler.dispose();
    tokio::time::sleep(Duration::from_millis(100)).await;

    let before = api.calls();
    scheduler.initialize().await;
    assert!(eventually(|| api.calls() >= before + 2).await);
    scheduler.dispose();
}
