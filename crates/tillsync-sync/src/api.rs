//! # Sales API Client
//!
//! The two backend calls the engine makes.
//!
//! ## Wire Format
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  POST {base}/sales/sync            Authorization: Bearer <token>        │
//! │                                                                         │
//! │  { "sales": [ { ...payload, "client_txn_id": "offline-…",               │
//! │                 "reference": "offline-…" }, ... ] }                      │
//! │                                                                         │
//! │  200 { "data": { "results": [                                           │
//! │        { "client_txn_id": "offline-…", "success": true,  "sale": {…} },│
//! │        { "client_txn_id": "offline-…", "success": false,               │
//! │          "error": "Insufficient stock", "reason": "conflict" } ] } }   │
//! │                                                                         │
//! │  4xx/5xx with the same body        → results routed per sale            │
//! │  4xx/5xx without results, 401/403  → SyncError                          │
//! │                                                                         │
//! │  POST {base}/sales                 → 2xx { "data": <sale> }             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The server deduplicates on `client_txn_id`, so replaying a batch whose
//! response was lost is harmless.

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use tillsync_core::{CreateSalePayload, FailureReason, QueuedSale, Sale};

use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::scope::SessionSource;

/// Longest server-supplied message kept on an error.
const MAX_ERROR_MESSAGE_CHARS: usize = 200;

// =============================================================================
// Wire Types
// =============================================================================

/// One element of the batch body.
#[derive(Debug, Clone, Serialize)]
pub struct SyncBatchItem {
    #[serde(flatten)]
    pub payload: CreateSalePayload,
    pub client_txn_id: String,
}

impl SyncBatchItem {
    /// The payload plus `client_txn_id = local_id`, with `reference`
    /// defaulted to `local_id`.
    pub fn from_queued(sale: &QueuedSale) -> Self {
        let mut payload = sale.payload.clone();
        payload.ensure_reference(&sale.local_id);
        SyncBatchItem {
            payload,
            client_txn_id: sale.local_id.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
struct SyncBatchRequest<'a> {
    sales: &'a [SyncBatchItem],
}

/// Per-sale outcome reported by the batch endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncItemResult {
    pub client_txn_id: String,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sale: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl SyncItemResult {
    pub fn succeeded(client_txn_id: impl Into<String>) -> Self {
        SyncItemResult {
            client_txn_id: client_txn_id.into(),
            success: true,
            error: None,
            sale: None,
            reason: None,
        }
    }

    pub fn failed(
        client_txn_id: impl Into<String>,
        error: Option<&str>,
        reason: Option<&str>,
    ) -> Self {
        SyncItemResult {
            client_txn_id: client_txn_id.into(),
            success: false,
            error: error.map(str::to_string),
            sale: None,
            reason: reason.map(str::to_string),
        }
    }

    pub fn failure_reason(&self) -> Option<FailureReason> {
        self.reason.as_deref().and_then(FailureReason::from_tag)
    }
}

#[derive(Debug, Deserialize)]
struct DataEnvelope<T> {
    data: T,
}

#[derive(Debug, Deserialize)]
struct SyncBatchData {
    #[serde(default)]
    results: Vec<SyncItemResult>,
}

// =============================================================================
// Trait
// =============================================================================

/// Backend operations the engine depends on.
#[async_trait]
pub trait SalesSyncApi: Send + Sync {
    /// Submits a batch. `Err` means the whole call failed; per-sale
    /// failures arrive as unsuccessful results.
    async fn sync_batch(&self, sales: &[SyncBatchItem]) -> SyncResult<Vec<SyncItemResult>>;

    /// Creates one sale online.
    async fn create_sale(&self, payload: &CreateSalePayload) -> SyncResult<Sale>;
}

// =============================================================================
// HTTP Implementation
// =============================================================================

/// [`SalesSyncApi`] over HTTP with reqwest.
pub struct HttpSalesApi {
    client: Client,
    base_url: String,
    session: Arc<dyn SessionSource>,
}

impl HttpSalesApi {
    pub fn new(
        base_url: impl Into<String>,
        timeout: Duration,
        session: Arc<dyn SessionSource>,
    ) -> SyncResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SyncError::InvalidConfig(format!("Failed to create HTTP client: {}", e)))?;

        Ok(HttpSalesApi {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            session,
        })
    }

    pub fn from_config(config: &SyncConfig, session: Arc<dyn SessionSource>) -> SyncResult<Self> {
        Self::new(config.api.base_url.clone(), config.request_timeout(), session)
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authorized(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.session.access_token() {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    /// Maps a non-success response.
    async fn check_status(response: Response) -> SyncResult<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        Err(status_failure(status, &body))
    }
}

/// The error for a non-success response.
///
/// Only a JSON `message`/`error` field is used as the message, capped in
/// length. Anything else (an HTML error page from a proxy, say) gets the
/// default text for the status.
fn status_failure(status: StatusCode, body: &str) -> SyncError {
    let message = serde_json::from_str::<Value>(body).ok().and_then(|json| {
        json.get("message")
            .or_else(|| json.get("error"))
            .and_then(Value::as_str)
            .map(|m| m.trim().chars().take(MAX_ERROR_MESSAGE_CHARS).collect::<String>())
    });
    SyncError::status_error(status, message)
}

/// Per-sale results carried by a non-success batch response, if any.
///
/// 401/403 never count: the credentials are the problem, not the sales.
fn per_sale_results(status: StatusCode, body: &str) -> Option<Vec<SyncItemResult>> {
    if matches!(status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) {
        return None;
    }
    serde_json::from_str::<DataEnvelope<SyncBatchData>>(body)
        .ok()
        .map(|envelope| envelope.data.results)
        .filter(|results| !results.is_empty())
}

#[async_trait]
impl SalesSyncApi for HttpSalesApi {
    async fn sync_batch(&self, sales: &[SyncBatchItem]) -> SyncResult<Vec<SyncItemResult>> {
        debug!(count = sales.len(), "Posting offline sales batch");

        let request = self
            .client
            .post(self.url("/sales/sync"))
            .json(&SyncBatchRequest { sales });
        let response = self.authorized(request).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            if let Some(results) = per_sale_results(status, &body) {
                warn!(
                    status = status.as_u16(),
                    count = results.len(),
                    "Batch rejected with per-sale results"
                );
                return Ok(results);
            }
            return Err(status_failure(status, &body));
        }

        let envelope: DataEnvelope<SyncBatchData> = response
            .json()
            .await
            .map_err(|e| SyncError::InvalidResponse(e.to_string()))?;

        Ok(envelope.data.results)
    }

    async fn create_sale(&self, payload: &CreateSalePayload) -> SyncResult<Sale> {
        let request = self.client.post(self.url("/sales")).json(payload);
        let response = self.authorized(request).send().await?;
        let response = Self::check_status(response).await?;

        let envelope: DataEnvelope<Sale> = response
            .json()
            .await
            .map_err(|e| SyncError::InvalidResponse(e.to_string()))?;

        Ok(envelope.data)
    }
}
