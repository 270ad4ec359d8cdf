//! # tillsync-core: Pure Domain Types for Offline Sale Sync
//!
//! This crate holds the data model of the offline sale queue as plain types
//! and pure functions with zero I/O dependencies.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Tillsync Architecture                            │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │             Sale-creation client (POS frontend)                 │   │
//! │  │     network failure ──► queue_sale_for_sync(payload)            │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                 tillsync-sync (engine, scheduler)               │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │              ★ tillsync-core (THIS CRATE) ★                     │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────┐  ┌───────────┐  ┌───────────┐  ┌───────────┐  │   │
//! │  │   │   scope   │  │   queue   │  │   types   │  │   money   │  │   │
//! │  │   │ SyncScope │  │QueuedSale │  │  Payload  │  │   Money   │  │   │
//! │  │   │  keys     │  │ Conflict  │  │   Sale    │  │  (cents)  │  │   │
//! │  │   └───────────┘  └───────────┘  └───────────┘  └───────────┘  │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`scope`] - Scope partition keys
//! - [`queue`] - Queued/conflicted sale records and outcome classification
//! - [`types`] - Create-sale payload and the optimistic local sale
//! - [`money`] - Money for totals, lossless Amount for payload values
//! - [`error`] - Domain error types
//! - [`validation`] - Payload validation and queue eligibility
//!
//! ## Example Usage
//!
//! ```rust
//! use tillsync_core::SyncScope;
//!
//! let scope = SyncScope::new("tenant-7", "user-42").with_terminal("till-3");
//! assert_eq!(scope.scope_id(), "tenant-7:no-branch:user-42:till-3");
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod money;
pub mod queue;
pub mod scope;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use error::{CoreError, CoreResult, ValidationError};
pub use money::{Amount, Money};
pub use queue::{
    conflict_reason, generate_local_id, is_final_failure, ConflictedSale, CountEvent,
    CountSnapshot, FailureReason, QueuedSale,
};
pub use scope::SyncScope;
pub use types::*;
pub use validation::{ensure_queue_eligible, is_queue_eligible};

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Prefix of every locally generated sale id.
///
/// The full id (`offline-<uuid>`) doubles as the idempotency key the server
/// deduplicates on, so it must never be regenerated for an existing sale.
pub const LOCAL_ID_PREFIX: &str = "offline-";

/// Payment methods settled through a live provider round trip.
///
/// Sales paid this way are never queued: replaying a mobile-money push later
/// could charge the customer twice.
pub const REALTIME_PAYMENT_METHODS: &[&str] = &["mobile_money", "mpesa", "momo", "airtel_money"];
