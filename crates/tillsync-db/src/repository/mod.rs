//! # Repository Module
//!
//! ## Repository Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Repository Pattern                                   │
//! │                                                                         │
//! │  OfflineStore (tillsync-sync)                                          │
//! │       │                                                                 │
//! │       │  db.offline_store().get("offline-sales-queue:...")             │
//! │       ▼                                                                 │
//! │  OfflineStoreRepository                                                │
//! │  ├── get(&self, key)                                                   │
//! │  └── put(&self, key, value) / put_all(&self, entries)                  │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  SQLite Database                                                       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Available Repositories
//!
//! - [`OfflineStoreRepository`](offline_store::OfflineStoreRepository) - Scoped queue records

pub mod offline_store;
