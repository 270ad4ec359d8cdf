//! # Sync Error Types
//!
//! Error types for sync operations.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Sync Error Categories                             │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │  Configuration  │  │   Network       │  │     HTTP status         │ │
//! │  │                 │  │  (no response)  │  │                         │ │
//! │  │  InvalidConfig  │  │  Network        │  │  Unauthorized 401/403   │ │
//! │  │  InvalidUrl     │  │                 │  │  Server (anything else) │ │
//! │  │  ConfigLoad...  │  │                 │  │  InvalidResponse        │ │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘ │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │    Storage      │  │     Scope       │  │      Domain             │ │
//! │  │                 │  │                 │  │                         │ │
//! │  │  DatabaseError  │  │  NoScope        │  │  Core(CoreError)        │ │
//! │  │  Serialization  │  │                 │  │                         │ │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘ │
//! │                                                                         │
//! │  What the engine does with a failed batch POST:                        │
//! │    per-sale results   → routed like a 2xx, whatever the status         │
//! │    is_network()       → nothing (queue untouched)                      │
//! │    is_auth_failure()  → nothing (queue untouched)                      │
//! │    anything else      → every queued sale gets attempts += 1           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use reqwest::StatusCode;
use thiserror::Error;

use tillsync_core::CoreError;

/// Result type alias for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Sync error type covering all possible sync failures.
#[derive(Debug, Error)]
pub enum SyncError {
    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Invalid sync configuration.
    #[error("Invalid sync configuration: {0}")]
    InvalidConfig(String),

    /// Invalid API URL.
    #[error("Invalid API URL: {0}")]
    InvalidUrl(String),

    /// Failed to load config file.
    #[error("Failed to load config: {0}")]
    ConfigLoadFailed(String),

    // =========================================================================
    // Scope Errors
    // =========================================================================
    /// No authenticated session with a tenant.
    ///
    /// ## When This Occurs
    /// - A sale is enqueued before login or after logout
    /// - The session has no tenant and the terminal has none either
    #[error("Cannot queue sale offline without an authenticated tenant scope")]
    NoScope,

    // =========================================================================
    // Network Errors
    // =========================================================================
    /// The request produced no HTTP response (connect, timeout, send).
    #[error("Network error: {0}")]
    Network(String),

    // =========================================================================
    // HTTP Errors
    // =========================================================================
    /// The server rejected the credentials (401/403).
    #[error("Not authorized (HTTP {status})")]
    Unauthorized { status: u16 },

    /// Any other non-success status.
    #[error("{message} (HTTP {status})")]
    Server { status: u16, message: String },

    /// The response body did not have the expected shape.
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    // =========================================================================
    // Storage Errors
    // =========================================================================
    /// Database query failed.
    #[error("Database error: {0}")]
    DatabaseError(String),

    /// Failed to serialize or parse a record.
    #[error("Serialization failed: {0}")]
    SerializationFailed(String),

    // =========================================================================
    // Domain Errors
    // =========================================================================
    /// The payload violates a domain rule.
    #[error(transparent)]
    Core(#[from] CoreError),

    // =========================================================================
    // Internal Errors
    // =========================================================================
    /// Internal engine error.
    #[error("Internal error: {0}")]
    Internal(String),
}

// =============================================================================
// Error Conversions
// =============================================================================

impl From<tillsync_db::DbError> for SyncError {
    fn from(err: tillsync_db::DbError) -> Self {
        SyncError::DatabaseError(err.to_string())
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        SyncError::SerializationFailed(err.to_string())
    }
}

impl From<url::ParseError> for SyncError {
    fn from(err: url::ParseError) -> Self {
        SyncError::InvalidUrl(err.to_string())
    }
}

/// ## Error Mapping
/// ```text
/// carries a status      → status_error(status)
/// decode / body failure → InvalidResponse
/// everything else       → Network (no response was received)
/// ```
impl From<reqwest::Error> for SyncError {
    fn from(err: reqwest::Error) -> Self {
        if let Some(status) = err.status() {
            return SyncError::status_error(status, None);
        }
        if err.is_decode() || err.is_body() {
            return SyncError::InvalidResponse(err.to_string());
        }
        if err.is_connect() {
            return SyncError::Network(format!("Cannot reach server: {}", err));
        }
        if err.is_timeout() {
            return SyncError::Network(format!("Request timed out: {}", err));
        }
        SyncError::Network(err.to_string())
    }
}

impl From<std::io::Error> for SyncError {
    fn from(err: std::io::Error) -> Self {
        SyncError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::de::Error> for SyncError {
    fn from(err: toml::de::Error) -> Self {
        SyncError::ConfigLoadFailed(err.to_string())
    }
}

impl From<tokio::task::JoinError> for SyncError {
    fn from(err: tokio::task::JoinError) -> Self {
        SyncError::Internal(format!("Background task failed: {}", err))
    }
}

// =============================================================================
// Error Categorization
// =============================================================================

impl SyncError {
    /// Maps a non-success HTTP status, with the server's message if it sent one.
    pub fn status_error(status: StatusCode, message: Option<String>) -> Self {
        match status.as_u16() {
            code @ (401 | 403) => SyncError::Unauthorized { status: code },
            code => SyncError::Server {
                status: code,
                message: message
                    .filter(|m| !m.trim().is_empty())
                    .unwrap_or_else(|| default_status_message(code)),
            },
        }
    }

    /// True if no response was received at all.
    ///
    /// The engine leaves the queue untouched for these; the sale did not
    /// reach the server, so nothing counts as an attempt.
    pub fn is_network(&self) -> bool {
        matches!(self, SyncError::Network(_))
    }

    /// True for 401/403.
    pub fn is_auth_failure(&self) -> bool {
        matches!(self, SyncError::Unauthorized { .. })
    }
}

fn default_status_message(code: u16) -> String {
    match code {
        404 => "Sales endpoint not found".to_string(),
        s if s >= 500 => "Server error".to_string(),
        _ => "Unexpected response from server".to_string(),
    }
}
