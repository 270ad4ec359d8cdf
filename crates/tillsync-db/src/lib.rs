//! # tillsync-db: Durable Local Store
//!
//! SQLite access for the offline sale queue. The sync crate sees nothing but
//! a string key/value table; the records' JSON shape is its business.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Tillsync Data Flow                               │
//! │                                                                         │
//! │  OfflineStore::write_queue(scope, queue)                               │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                   tillsync-db (THIS CRATE)                      │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌──────────────────┐   ┌──────────────┐ │   │
//! │  │   │   Database    │    │   Repository     │   │  Migrations  │ │   │
//! │  │   │   (pool.rs)   │◄───│ OfflineStoreRepo │   │  (embedded)  │ │   │
//! │  │   │  SqlitePool   │    │  get / put / del │   │ 001_*.sql    │ │   │
//! │  │   └───────────────┘    └──────────────────┘   └──────────────┘ │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │       SQLite file: offline_store(key, value, updated_at)        │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`pool`] - Connection pool creation and configuration
//! - [`migrations`] - Embedded database migrations
//! - [`error`] - Database error types
//! - [`repository`] - Key/value repository
//!
//! ## Usage
//!
//! ```rust,ignore
//! use tillsync_db::{Database, DbConfig};
//!
//! let db = Database::new(DbConfig::new("path/to/tillsync.db")).await?;
//! db.offline_store().put("offline-sales-queue:t:no-branch:u:no-terminal", "[]").await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{DbError, DbResult};
pub use pool::{Database, DbConfig};

pub use repository::offline_store::OfflineStoreRepository;
