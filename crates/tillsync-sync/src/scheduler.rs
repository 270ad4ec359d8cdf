//! # Sync Scheduler
//!
//! Decides when [`OfflineSalesSync::sync_queued_sales`] runs.
//!
//! ## Triggers
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  initialize() ──► legacy migration + count refresh                      │
//! │                ──► one immediate sync                                   │
//! │                                                                         │
//! │  timer task      every `interval` while initialized                     │
//! │  listener task   LifecycleSignal::ConnectivityRestored                  │
//! │                  LifecycleSignal::BecameVisible                         │
//! │        │                                                                │
//! │        └────────────► sync_queued_sales() (in-flight guard dedups)     │
//! │                                                                         │
//! │  dispose() stops the timer only. The listener is registered once per   │
//! │  scheduler and stays until the scheduler is dropped.                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::engine::OfflineSalesSync;

/// Capacity of the lifecycle signal channel.
pub const SIGNAL_CHANNEL_CAPACITY: usize = 16;

// =============================================================================
// Lifecycle Signals
// =============================================================================

/// Host events that should prompt a sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleSignal {
    /// Network went from offline to online.
    ConnectivityRestored,
    /// The app came back to the foreground.
    BecameVisible,
}

/// Publisher/subscriber handle for [`LifecycleSignal`]s. Clones share one
/// channel.
#[derive(Debug, Clone)]
pub struct LifecycleSignals {
    tx: broadcast::Sender<LifecycleSignal>,
}

impl LifecycleSignals {
    pub fn new() -> Self {
        let (tx, _rx) = broadcast::channel(SIGNAL_CHANNEL_CAPACITY);
        LifecycleSignals { tx }
    }

    pub fn publish(&self, signal: LifecycleSignal) {
        // Err only means nobody is listening
        let _ = self.tx.send(signal);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LifecycleSignal> {
        self.tx.subscribe()
    }
}

impl Default for LifecycleSignals {
    fn default() -> Self {
        Self::new()
    }
}

/// Online/offline flag fed by the host.
///
/// Starts online. An offline → online transition publishes
/// [`LifecycleSignal::ConnectivityRestored`].
#[derive(Debug)]
pub struct NetworkStatus {
    online: AtomicBool,
    signals: LifecycleSignals,
}

impl NetworkStatus {
    pub fn new(signals: LifecycleSignals) -> Self {
        NetworkStatus {
            online: AtomicBool::new(true),
            signals,
        }
    }

    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::Acquire)
    }

    pub fn set_online(&self, online: bool) {
        let was_online = self.online.swap(online, Ordering::AcqRel);
        if online && !was_online {
            info!("Connectivity restored");
            self.signals.publish(LifecycleSignal::ConnectivityRestored);
        } else if !online && was_online {
            info!("Connectivity lost");
        }
    }

    pub fn signals(&self) -> &LifecycleSignals {
        &self.signals
    }
}

impl Default for NetworkStatus {
    fn default() -> Self {
        Self::new(LifecycleSignals::new())
    }
}

// =============================================================================
// Scheduler
// =============================================================================

#[derive(Default)]
struct SchedulerState {
    initialized: bool,
    timer_shutdown: Option<mpsc::Sender<()>>,
    timer: Option<JoinHandle<()>>,
    listener: Option<JoinHandle<()>>,
}

/// Periodic and event-driven sync triggers.
pub struct SyncScheduler {
    engine: Arc<OfflineSalesSync>,
    interval: Duration,
    state: Mutex<SchedulerState>,
}

impl SyncScheduler {
    pub fn new(engine: Arc<OfflineSalesSync>, interval: Duration) -> Self {
        SyncScheduler {
            engine,
            interval,
            state: Mutex::new(SchedulerState::default()),
        }
    }

    pub fn engine(&self) -> &Arc<OfflineSalesSync> {
        &self.engine
    }

    pub fn is_initialized(&self) -> bool {
        self.state.lock().map(|s| s.initialized).unwrap_or(false)
    }

    /// Starts the triggers. Calling it again while initialized does nothing.
    pub async fn initialize(&self) {
        {
            let Ok(mut state) = self.state.lock() else {
                warn!("Scheduler state poisoned, not initializing");
                return;
            };
            if state.initialized {
                debug!("Sync scheduler already initialized");
                return;
            }
            state.initialized = true;

            if state.listener.is_none() {
                state.listener = Some(self.spawn_listener());
            }

            let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
            state.timer_shutdown = Some(shutdown_tx);
            state.timer = Some(self.spawn_timer(shutdown_rx));
        }

        info!(interval_secs = self.interval.as_secs_f64(), "Sync scheduler initialized");

        match self.engine.migrate_legacy_queue().await {
            Ok(0) => {}
            Ok(added) => info!(added, "Legacy offline sales restored"),
            Err(e) => warn!(error = %e, "Legacy queue migration failed"),
        }
        self.engine.refresh_counts().await;

        let engine = Arc::clone(&self.engine);
        tokio::spawn(async move {
            run_sync(&engine, "startup").await;
        });

        self.engine.dispatch();
    }

    /// Stops the periodic timer. Safe to call repeatedly.
    pub fn dispose(&self) {
        let Ok(mut state) = self.state.lock() else {
            return;
        };
        if !state.initialized {
            return;
        }
        state.initialized = false;

        // Dropping the sender ends the timer loop
        state.timer_shutdown.take();
        if let Some(timer) = state.timer.take() {
            timer.abort();
        }
        info!("Sync scheduler disposed");
    }

    fn spawn_timer(&self, mut shutdown_rx: mpsc::Receiver<()>) -> JoinHandle<()> {
        let engine = Arc::clone(&self.engine);
        let period = self.interval;

        tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => run_sync(&engine, "timer").await,
                    _ = shutdown_rx.recv() => {
                        debug!("Sync timer stopped");
                        break;
                    }
                }
            }
        })
    }

    fn spawn_listener(&self) -> JoinHandle<()> {
        let engine = Arc::clone(&self.engine);
        let mut signals = engine.network().signals().subscribe();

        tokio::spawn(async move {
            loop {
                match signals.recv().await {
                    Ok(signal) => {
                        debug!(?signal, "Lifecycle signal received");
                        run_sync(&engine, "lifecycle").await;
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        debug!(skipped, "Lifecycle signals lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }
}

impl Drop for SyncScheduler {
    fn drop(&mut self) {
        if let Ok(state) = self.state.get_mut() {
            if let Some(timer) = state.timer.take() {
                timer.abort();
            }
            if let Some(listener) = state.listener.take() {
                listener.abort();
            }
        }
    }
}

async fn run_sync(engine: &OfflineSalesSync, trigger: &'static str) {
    match engine.sync_queued_sales().await {
        Ok(outcome) => debug!(trigger, ?outcome, "Sync attempt finished"),
        Err(e) => warn!(trigger, error = %e, "Sync attempt failed"),
    }
}
