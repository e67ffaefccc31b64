//! Movement ledger models

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::process::{ProcessName, StockState};

/// One entry in the append-only movement ledger. Every state transition on a
/// batch records exactly one entry; entries are never mutated or deleted and
/// form the traceability chain for the batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MovementEntry {
    pub id: Uuid,
    pub batch_id: Uuid,
    pub item_id: Uuid,
    /// None for receipts from outside the ledger (goods inward, production)
    pub from_state: Option<StockState>,
    pub to_state: StockState,
    pub quantity: Decimal,
    pub process: Option<ProcessName>,
    /// Audit identity of whoever triggered the transition
    pub actor: Option<String>,
    /// Originating document ("job_work", "production", ...)
    pub reference_type: Option<String>,
    pub reference_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}
