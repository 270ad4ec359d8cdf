//! # Validation Module
//!
//! Checks a create-sale payload before it is queued.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: POS frontend                                                 │
//! │  └── Cart rules, immediate feedback                                    │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: THIS MODULE                                                  │
//! │  ├── Queue eligibility (no real-time payments)                         │
//! │  └── Shape checks the server would reject anyway                       │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: Backend                                                      │
//! │  └── Stock, references, pricing → conflict on replay                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use tillsync_core::validation::is_queue_eligible;
//! use tillsync_core::{CreateSalePayload, SaleItemInput};
//!
//! let cash = CreateSalePayload::new(vec![SaleItemInput::new(1, 1, 1)], "cash");
//! assert!(is_queue_eligible(&cash));
//! ```

use crate::error::{CoreError, CoreResult, ValidationError};
use crate::types::CreateSalePayload;

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Validates the shape of a payload.
///
/// ## Rules
/// - At least one item
/// - Every quantity is positive
/// - No price is negative
pub fn validate_payload(payload: &CreateSalePayload) -> ValidationResult<()> {
    if payload.items.is_empty() {
        return Err(ValidationError::Required {
            field: "items".to_string(),
        });
    }

    for (index, item) in payload.items.iter().enumerate() {
        if !item.quantity.is_positive() {
            return Err(ValidationError::MustBePositive {
                field: format!("items[{}].quantity", index),
            });
        }
        if item.price.is_negative() {
            return Err(ValidationError::MustNotBeNegative {
                field: format!("items[{}].price", index),
            });
        }
    }

    Ok(())
}

/// Fails if the payload must not be queued for later replay.
pub fn ensure_queue_eligible(payload: &CreateSalePayload) -> CoreResult<()> {
    if payload.is_realtime_payment() {
        return Err(CoreError::RealtimePaymentNotQueueable {
            method: payload.payment_method.clone(),
        });
    }
    validate_payload(payload)?;
    Ok(())
}

/// Boolean form of [`ensure_queue_eligible`].
pub fn is_queue_eligible(payload: &CreateSalePayload) -> bool {
    ensure_queue_eligible(payload).is_ok()
}
