//! # Queue Records
//!
//! What the offline queue and the conflict list store, and how a batch
//! result is classified as final or retryable.
//!
//! ## Record Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       QueuedSale Lifecycle                              │
//! │                                                                         │
//! │   enqueue ──► QueuedSale { attempts: 0 }                                │
//! │                    │                                                    │
//! │        ┌───────────┼──────────────────┬───────────────────┐            │
//! │        ▼           ▼                  ▼                   ▼            │
//! │    success     transient          final failure       no result      │
//! │    (drop)   attempts += 1        ConflictedSale       (unchanged)     │
//! │             last_error set      (never requeued)                      │
//! │                                                                         │
//! │   Invariant: a local_id lives in exactly ONE of {queue, conflicts}.    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;
use uuid::Uuid;

use crate::types::CreateSalePayload;
use crate::LOCAL_ID_PREFIX;

// =============================================================================
// Local Id
// =============================================================================

/// Generates a fresh `offline-<uuid v4>` id.
///
/// ```rust
/// let id = tillsync_core::generate_local_id();
/// assert!(id.starts_with("offline-"));
/// ```
pub fn generate_local_id() -> String {
    format!("{}{}", LOCAL_ID_PREFIX, Uuid::new_v4())
}

// =============================================================================
// Queued Sale
// =============================================================================

/// A sale waiting to be replayed against the batch-sync endpoint.
///
/// The camelCase aliases accept records written by the older unscoped queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueuedSale {
    #[serde(alias = "localId")]
    pub local_id: String,
    pub payload: CreateSalePayload,
    #[serde(alias = "queuedAt")]
    pub queued_at: DateTime<Utc>,
    #[serde(default)]
    pub attempts: u32,
    #[serde(default, alias = "lastError", skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    #[serde(default, alias = "lastAttemptAt", skip_serializing_if = "Option::is_none")]
    pub last_attempt_at: Option<DateTime<Utc>>,
}

impl QueuedSale {
    pub fn new(local_id: impl Into<String>, payload: CreateSalePayload, queued_at: DateTime<Utc>) -> Self {
        QueuedSale {
            local_id: local_id.into(),
            payload,
            queued_at,
            attempts: 0,
            last_error: None,
            last_attempt_at: None,
        }
    }

    /// Records one transient failure. The sale stays queued.
    pub fn record_failure(&mut self, error: impl Into<String>, at: DateTime<Utc>) {
        self.attempts += 1;
        self.last_error = Some(error.into());
        self.last_attempt_at = Some(at);
    }

    /// Promotes this sale to the conflict list.
    pub fn into_conflict(self, reason: impl Into<String>, at: DateTime<Utc>) -> ConflictedSale {
        ConflictedSale {
            sale: self,
            conflict_reason: reason.into(),
            moved_to_conflicts_at: at,
        }
    }
}

/// A sale the server rejected permanently. Kept for manual review.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConflictedSale {
    #[serde(flatten)]
    pub sale: QueuedSale,
    #[serde(alias = "conflictReason")]
    pub conflict_reason: String,
    #[serde(alias = "movedToConflictsAt")]
    pub moved_to_conflicts_at: DateTime<Utc>,
}

impl ConflictedSale {
    pub fn local_id(&self) -> &str {
        &self.sale.local_id
    }
}

// =============================================================================
// Counts
// =============================================================================

/// Cached queue/conflict sizes of one scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct CountSnapshot {
    pub pending: usize,
    pub conflicts: usize,
}

/// Broadcast after every queue/conflict write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct CountEvent {
    pub pending: usize,
    pub conflicts: usize,
    pub scope_id: Option<String>,
    #[ts(type = "string")]
    pub last_synced_at: DateTime<Utc>,
}

// =============================================================================
// Failure Classification
// =============================================================================

/// The tag a batch result may carry on failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureReason {
    Conflict,
    Validation,
    Server,
}

impl FailureReason {
    /// Parses the wire tag. Unknown tags return `None`.
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag.trim().to_ascii_lowercase().as_str() {
            "conflict" => Some(FailureReason::Conflict),
            "validation" => Some(FailureReason::Validation),
            "server" => Some(FailureReason::Server),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FailureReason::Conflict => "conflict",
            FailureReason::Validation => "validation",
            FailureReason::Server => "server",
        }
    }

    /// Tags that are final without looking at the error text.
    pub fn is_final(&self) -> bool {
        matches!(self, FailureReason::Conflict | FailureReason::Validation)
    }
}

/// Error text fragments that mean retrying cannot help.
const PERMANENT_ERROR_PATTERNS: &[&str] = &[
    "insufficient",
    "out of stock",
    "invalid",
    "not found",
    "does not exist",
];

/// True if a failed result must go to the conflict list.
///
/// Final when tagged `conflict`/`validation`; otherwise final when the error
/// text names a permanent condition: insufficient or out-of-stock goods,
/// invalid data, a missing record. A bare mention of stock is not enough.
///
/// ```rust
/// use tillsync_core::{is_final_failure, FailureReason};
///
/// assert!(is_final_failure(Some(FailureReason::Validation), None));
/// assert!(is_final_failure(None, Some("Insufficient stock for item 12")));
/// assert!(!is_final_failure(Some(FailureReason::Server), Some("timeout")));
/// ```
pub fn is_final_failure(reason: Option<FailureReason>, error: Option<&str>) -> bool {
    if reason.map(|r| r.is_final()).unwrap_or(false) {
        return true;
    }

    match error {
        Some(text) => {
            let lower = text.to_lowercase();
            PERMANENT_ERROR_PATTERNS.iter().any(|p| lower.contains(p))
        }
        None => false,
    }
}

/// Reason stored on a conflicted sale: the server's message, else the tag.
pub fn conflict_reason(reason: Option<FailureReason>, error: Option<&str>) -> String {
    match (error.map(str::trim).filter(|e| !e.is_empty()), reason) {
        (Some(text), _) => text.to_string(),
        (None, Some(tag)) => format!("Rejected by server ({})", tag.as_str()),
        (None, None) => "Rejected by server".to_string(),
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
