//! Domain error taxonomy for stock and job-work operations

use rust_decimal::Decimal;
use thiserror::Error;

/// Errors raised by the quantity ledger, the transition engine and the
/// job-work reconciler. Every operation that returns one of these leaves the
/// records it touched unchanged.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StockError {
    /// Requested quantity exceeds what the source state holds. Recoverable:
    /// retry with a lower quantity or a different batch.
    #[error("insufficient stock in {state}: requested {requested}, available {available}")]
    InsufficientStock {
        state: String,
        requested: Decimal,
        available: Decimal,
    },

    /// A transition's outputs exceed its declared input. Caller mistake,
    /// never clamped.
    #[error("conservation violation in {state}: outputs total {requested}, available {available}")]
    Conservation {
        state: String,
        requested: Decimal,
        available: Decimal,
    },

    /// A job-work return exceeds the remaining issued quantity.
    #[error("return exceeds issued quantity: requested {requested}, remaining {remaining}")]
    OverReturn {
        requested: Decimal,
        remaining: Decimal,
    },

    /// Operation attempted against an expired or failed/quarantined batch.
    #[error("batch {batch_code} cannot be used: {reason}")]
    ExpiredOrRejectedBatch { batch_code: String, reason: String },

    /// Multi-process advancement out of order or against a missing stage.
    #[error("process sequence violation: {0}")]
    SequenceIntegrity(String),

    /// Lock or version conflict on a shared record; retry the whole
    /// operation from scratch.
    #[error("concurrent modification detected, retry the operation")]
    ConcurrencyConflict,

    /// Quantity is zero, negative or otherwise unusable.
    #[error("invalid quantity: {0}")]
    InvalidQuantity(Decimal),

    /// Status change not permitted by the process state machine.
    #[error("invalid status transition from {from} to {to}")]
    InvalidStatusTransition { from: String, to: String },
}
