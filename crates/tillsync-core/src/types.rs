//! # Domain Types
//!
//! The create-sale payload a terminal submits and the sale it gets back.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌───────────────────┐         ┌───────────────────┐                   │
//! │  │ CreateSalePayload │ ──────► │  Sale (optimistic)│                   │
//! │  │  ───────────────  │ enqueue │  ───────────────  │                   │
//! │  │  items[]          │         │  id = local_id    │                   │
//! │  │  tax?             │         │  subtotal / total │                   │
//! │  │  payment_method   │         │  offline = true   │                   │
//! │  │  reference?       │         └───────────────────┘                   │
//! │  │  ...extra         │                                                 │
//! │  └───────────────────┘                                                 │
//! │                                                                         │
//! │  Fields this crate does not know about are kept in `extra` and sent   │
//! │  back to the server untouched.                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use ts_rs::TS;

use crate::money::{Amount, Money};
use crate::REALTIME_PAYMENT_METHODS;

// =============================================================================
// Entity Id
// =============================================================================

/// Identifier as the backend sends it: numeric for server rows, text for
/// local ids and external references.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EntityId {
    Int(i64),
    Text(String),
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityId::Int(id) => write!(f, "{}", id),
            EntityId::Text(id) => f.write_str(id),
        }
    }
}

impl From<i32> for EntityId {
    fn from(id: i32) -> Self {
        EntityId::Int(id.into())
    }
}

impl From<i64> for EntityId {
    fn from(id: i64) -> Self {
        EntityId::Int(id)
    }
}

impl From<&str> for EntityId {
    fn from(id: &str) -> Self {
        EntityId::Text(id.to_string())
    }
}

impl From<String> for EntityId {
    fn from(id: String) -> Self {
        EntityId::Text(id)
    }
}

// =============================================================================
// Sale Status
// =============================================================================

/// Lifecycle status of a sale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum SaleStatus {
    /// Paid and final. Offline sales are always created in this state.
    #[default]
    Completed,
    Pending,
    Draft,
    Voided,
    Refunded,
}

// =============================================================================
// Create-Sale Payload
// =============================================================================

/// One line of a sale as submitted by the terminal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaleItemInput {
    pub product_id: EntityId,
    /// May be fractional for weighed goods.
    pub quantity: Amount,
    /// Unit price.
    pub price: Amount,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl SaleItemInput {
    pub fn new(
        product_id: impl Into<EntityId>,
        quantity: impl Into<Amount>,
        price: impl Into<Amount>,
    ) -> Self {
        SaleItemInput {
            product_id: product_id.into(),
            quantity: quantity.into(),
            price: price.into(),
            extra: Map::new(),
        }
    }

    /// `price × quantity`, rounded to the cent.
    pub fn line_total(&self) -> Money {
        Money::from_major(self.price.as_f64() * self.quantity.as_f64())
    }
}

/// The body of a create-sale request.
///
/// Owned by its `QueuedSale` once queued; the sync engine forwards it
/// verbatim plus `client_txn_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateSalePayload {
    pub items: Vec<SaleItemInput>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tax: Option<Amount>,
    #[serde(default)]
    pub payment_method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl CreateSalePayload {
    pub fn new(items: Vec<SaleItemInput>, payment_method: impl Into<String>) -> Self {
        CreateSalePayload {
            items,
            tax: None,
            payment_method: payment_method.into(),
            reference: None,
            extra: Map::new(),
        }
    }

    pub fn with_tax(mut self, tax: impl Into<Amount>) -> Self {
        self.tax = Some(tax.into());
        self
    }

    pub fn with_reference(mut self, reference: impl Into<String>) -> Self {
        self.reference = Some(reference.into());
        self
    }

    /// Σ(price × quantity) over all items.
    pub fn subtotal(&self) -> Money {
        self.items.iter().map(SaleItemInput::line_total).sum()
    }

    /// True if the payment is settled by a live provider round trip
    /// (mobile-money push), which must never be replayed later.
    pub fn is_realtime_payment(&self) -> bool {
        let method = self.payment_method.trim().to_ascii_lowercase();
        REALTIME_PAYMENT_METHODS.contains(&method.as_str())
    }

    /// Sets `reference` to `fallback` unless the caller supplied a non-empty one.
    pub fn ensure_reference(&mut self, fallback: &str) {
        let missing = self
            .reference
            .as_deref()
            .map(|r| r.trim().is_empty())
            .unwrap_or(true);
        if missing {
            self.reference = Some(fallback.to_string());
        }
    }
}

// =============================================================================
// Sale
// =============================================================================

/// A sale as the POS displays it.
///
/// Either returned by the backend, or synthesized locally by
/// [`Sale::optimistic`] while the real one is still queued.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sale {
    pub id: EntityId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_id: Option<String>,
    #[serde(default)]
    pub reference: Option<String>,
    #[serde(default)]
    pub items: Vec<SaleItemInput>,
    #[serde(default)]
    pub subtotal: Money,
    #[serde(default)]
    pub tax: Money,
    #[serde(default)]
    pub total: Money,
    #[serde(default)]
    pub status: SaleStatus,
    #[serde(default)]
    pub payment_method: String,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    /// True while the sale exists only on this terminal.
    #[serde(default)]
    pub offline: bool,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Sale {
    /// Builds the local stand-in for a queued sale.
    ///
    /// `subtotal = Σ(price × quantity)`, `tax = payload.tax` or zero,
    /// `total = subtotal + tax`, status completed, both timestamps `now`.
    pub fn optimistic(local_id: &str, payload: &CreateSalePayload, now: DateTime<Utc>) -> Self {
        let subtotal = payload.subtotal();
        let tax = payload.tax.as_ref().map(Amount::to_money).unwrap_or_default();

        Sale {
            id: EntityId::Text(local_id.to_string()),
            local_id: Some(local_id.to_string()),
            reference: Some(
                payload
                    .reference
                    .clone()
                    .unwrap_or_else(|| local_id.to_string()),
            ),
            items: payload.items.clone(),
            subtotal,
            tax,
            total: subtotal + tax,
            status: SaleStatus::Completed,
            payment_method: payload.payment_method.clone(),
            created_at: Some(now),
            updated_at: Some(now),
            offline: true,
            extra: payload.extra.clone(),
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
