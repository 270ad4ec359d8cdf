//! # tillsync-sync: Offline Sales Sync for TillSync POS
//!
//! Keeps sales made while the backend is unreachable and replays them once
//! it comes back.
//!
//! ## Architecture Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Offline Sales Sync                                │
//! │                                                                         │
//! │  POS checkout                                                           │
//! │       │ create_sale() / queue_sale_for_sync()                          │
//! │       ▼                                                                 │
//! │  ┌──────────────────────────────────────────────────────────────────┐  │
//! │  │                  OfflineSalesSync (engine)                       │  │
//! │  │  scope ◄── ScopeProvider (session + terminal context)           │  │
//! │  │  queue/conflicts ◄──► OfflineStore ◄──► tillsync-db (SQLite)    │  │
//! │  │  batch replay ──► SalesSyncApi ──► POST /sales/sync             │  │
//! │  └───────────────┬──────────────────────────────────┬───────────────┘  │
//! │                  │                                  │                   │
//! │                  ▼                                  ▼                   │
//! │  ┌────────────────────────────┐    ┌──────────────────────────────┐    │
//! │  │        SyncScheduler       │    │           Notifier           │    │
//! │  │  interval timer            │    │  CountCache                  │    │
//! │  │  LifecycleSignals          │    │  SyncEventEmitter ──► UI     │    │
//! │  └────────────────────────────┘    └──────────────────────────────┘    │
//! │                                                                         │
//! │  LegacyQueueFile: one-time import of the old unscoped JSON queue       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//! - [`api`] - Sales API trait and the reqwest client
//! - [`config`] - Agent configuration (TOML + environment)
//! - [`engine`] - `OfflineSalesSync`: enqueue, batch sync, result routing
//! - [`error`] - Sync error types
//! - [`legacy`] - Legacy queue file migration
//! - [`notifier`] - Count cache and count events
//! - [`scheduler`] - Timer, lifecycle signals, network status
//! - [`scope`] - Session and terminal scope resolution
//! - [`store`] - Per-scope queue and conflict records
//!
//! ## Usage
//!
//! ```rust,ignore
//! use tillsync_sync::{HttpSalesApi, OfflineSalesSync, SessionScopeProvider, SyncConfig, SyncScheduler};
//! use tillsync_db::{Database, DbConfig};
//!
//! let config = SyncConfig::load_or_default(None);
//! let db = Database::new(DbConfig::new(config.database_path())).await?;
//!
//! let engine = OfflineSalesSync::builder(db)
//!     .with_api(Arc::new(HttpSalesApi::from_config(&config, session.clone())?))
//!     .with_scope_provider(Arc::new(SessionScopeProvider::new(session)))
//!     .with_legacy_queue(config.legacy_queue_path())
//!     .build()?;
//!
//! let scheduler = SyncScheduler::new(engine.clone(), config.sync_interval());
//! scheduler.initialize().await;
//!
//! let created = engine.create_sale(payload).await?;
//! println!("Pending: {}", engine.pending_count());
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod api;
pub mod config;
pub mod engine;
pub mod error;
pub mod legacy;
pub mod notifier;
pub mod scheduler;
pub mod scope;
pub mod store;

// =============================================================================
// Re-exports
// =============================================================================

pub use api::{HttpSalesApi, SalesSyncApi, SyncBatchItem, SyncItemResult};
pub use config::{ApiSettings, DeviceConfig, StorageSettings, SyncConfig, SyncSettings};
pub use engine::{
    CreatedSale, OfflineSalesSync, OfflineSalesSyncBuilder, QueuedSaleHandle, SyncOutcome,
    SyncReport,
};
pub use error::{SyncError, SyncResult};
pub use legacy::LegacyQueueFile;
pub use notifier::{BroadcastEmitter, CountCache, NoOpEmitter, Notifier, SyncEventEmitter};
pub use scheduler::{LifecycleSignal, LifecycleSignals, NetworkStatus, SyncScheduler};
pub use scope::{
    DeviceModeSource, ScopeProvider, Session, SessionScopeProvider, SessionSlot, SessionSource,
    StaticScopeProvider, TerminalContext,
};
pub use store::{OfflineStore, ScopeState};
pub use tillsync_core::{ensure_queue_eligible, is_queue_eligible};
