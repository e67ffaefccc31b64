//! Batch (lot) model, quality gate and FIFO selection

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::StockError;
use crate::models::ledger::StockLedger;
use crate::models::process::StockState;

/// An identified lot of one item, the unit of physical inventory identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Batch {
    pub id: Uuid,
    pub item_id: Uuid,
    /// Unique per item (e.g., "B-2025-017")
    pub batch_code: String,
    /// Supplier's own batch reference, when received from outside
    pub supplier_batch: Option<String>,
    pub manufacture_date: NaiveDate,
    pub expiry_date: Option<NaiveDate>,
    pub storage_location: Option<String>,
    pub inspection_status: InspectionStatus,
    pub states: StockLedger,
    /// Batches with movement history are deactivated, never deleted
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Batch {
    pub fn total_quantity(&self) -> Decimal {
        self.states.total_quantity()
    }

    /// Usable quantity: everything except scrap, and except quantity still
    /// held in inspection when the batch failed or is quarantined.
    pub fn available_quantity(&self) -> Decimal {
        let mut available = self.total_quantity() - self.states.quantity(&StockState::Scrap);
        if self.inspection_status.blocks_issue() {
            available -= self.states.quantity(&StockState::Inspection);
        }
        available
    }

    pub fn is_expired(&self, today: NaiveDate) -> bool {
        self.expiry_date.map(|expiry| expiry < today).unwrap_or(false)
    }

    /// Gate every issue/transition against expiry and the inspection status.
    pub fn ensure_issuable(&self, today: NaiveDate) -> Result<(), StockError> {
        if self.is_expired(today) {
            return Err(StockError::ExpiredOrRejectedBatch {
                batch_code: self.batch_code.clone(),
                reason: "batch is past its expiry date".to_string(),
            });
        }
        if self.inspection_status.blocks_issue() {
            return Err(StockError::ExpiredOrRejectedBatch {
                batch_code: self.batch_code.clone(),
                reason: format!("inspection status is {}", self.inspection_status.as_str()),
            });
        }
        if !self.is_active {
            return Err(StockError::ExpiredOrRejectedBatch {
                batch_code: self.batch_code.clone(),
                reason: "batch is deactivated".to_string(),
            });
        }
        Ok(())
    }
}

/// Quality/inspection gate on a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InspectionStatus {
    Pending,
    Passed,
    Failed,
    Quarantine,
}

impl InspectionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InspectionStatus::Pending => "pending",
            InspectionStatus::Passed => "passed",
            InspectionStatus::Failed => "failed",
            InspectionStatus::Quarantine => "quarantine",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(InspectionStatus::Pending),
            "passed" => Some(InspectionStatus::Passed),
            "failed" => Some(InspectionStatus::Failed),
            "quarantine" => Some(InspectionStatus::Quarantine),
            _ => None,
        }
    }

    /// Failed and quarantined batches cannot be issued.
    pub fn blocks_issue(&self) -> bool {
        matches!(self, InspectionStatus::Failed | InspectionStatus::Quarantine)
    }
}

/// One batch's share of a multi-batch draw.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchDraw {
    pub batch_id: Uuid,
    pub quantity: Decimal,
}

/// Plan a draw of `requested` raw quantity across batches, oldest
/// manufacture date first. Skips batches that are not issuable. Fails with
/// `InsufficientStock` when the issuable raw total cannot cover the request;
/// nothing is drawn partially.
pub fn select_fifo(
    batches: &[Batch],
    requested: Decimal,
    today: NaiveDate,
) -> Result<Vec<BatchDraw>, StockError> {
    if requested <= Decimal::ZERO {
        return Err(StockError::InvalidQuantity(requested));
    }

    let mut ordered: Vec<&Batch> = batches
        .iter()
        .filter(|batch| batch.ensure_issuable(today).is_ok())
        .collect();
    ordered.sort_by(|a, b| {
        a.manufacture_date
            .cmp(&b.manufacture_date)
            .then(a.created_at.cmp(&b.created_at))
    });

    let mut draws = Vec::new();
    let mut remaining = requested;
    for batch in ordered {
        if remaining <= Decimal::ZERO {
            break;
        }
        let raw = batch.states.quantity(&StockState::Raw);
        if raw <= Decimal::ZERO {
            continue;
        }
        let take = raw.min(remaining);
        draws.push(BatchDraw {
            batch_id: batch.id,
            quantity: take,
        });
        remaining -= take;
    }

    if remaining > Decimal::ZERO {
        let available = requested - remaining;
        return Err(StockError::InsufficientStock {
            state: StockState::Raw.key(),
            requested,
            available,
        });
    }
    Ok(draws)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::process::ProcessName;

    fn dec(n: i64) -> Decimal {
        Decimal::from(n)
    }

    fn batch(code: &str, manufactured: NaiveDate, raw: i64) -> Batch {
        let mut states = StockLedger::new();
        if raw > 0 {
            states.credit(StockState::Raw, dec(raw)).unwrap();
        }
        Batch {
            id: Uuid::new_v4(),
            item_id: Uuid::new_v4(),
            batch_code: code.to_string(),
            supplier_batch: None,
            manufacture_date: manufactured,
            expiry_date: None,
            storage_location: None,
            inspection_status: InspectionStatus::Passed,
            states,
            is_active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_available_excludes_scrap() {
        let mut b = batch("B-001", date(2025, 1, 10), 100);
        b.states.move_to_wip(dec(50), ProcessName::Cutting).unwrap();
        b.states
            .receive_from_wip(dec(40), dec(10), ProcessName::Cutting)
            .unwrap();

        assert_eq!(b.total_quantity(), dec(100));
        assert_eq!(b.available_quantity(), dec(90));
    }

    #[test]
    fn test_available_excludes_quarantined_inspection() {
        let mut b = batch("B-002", date(2025, 1, 10), 0);
        b.states.credit(StockState::Inspection, dec(30)).unwrap();
        b.states.credit(StockState::Raw, dec(70)).unwrap();

        b.inspection_status = InspectionStatus::Pending;
        assert_eq!(b.available_quantity(), dec(100));

        b.inspection_status = InspectionStatus::Quarantine;
        assert_eq!(b.available_quantity(), dec(70));
    }

    #[test]
    fn test_expired_batch_not_issuable() {
        let mut b = batch("B-003", date(2024, 6, 1), 50);
        b.expiry_date = Some(date(2025, 1, 1));
        let err = b.ensure_issuable(date(2025, 3, 1)).unwrap_err();
        assert!(matches!(err, StockError::ExpiredOrRejectedBatch { .. }));
        assert!(b.ensure_issuable(date(2024, 12, 31)).is_ok());
    }

    #[test]
    fn test_failed_batch_not_issuable() {
        let mut b = batch("B-004", date(2025, 1, 1), 50);
        b.inspection_status = InspectionStatus::Failed;
        assert!(b.ensure_issuable(date(2025, 1, 2)).is_err());
    }

    #[test]
    fn test_fifo_draws_oldest_first() {
        let today = date(2025, 6, 1);
        let old = batch("B-OLD", date(2025, 1, 1), 60);
        let new = batch("B-NEW", date(2025, 5, 1), 100);
        let draws = select_fifo(&[new.clone(), old.clone()], dec(80), today).unwrap();

        assert_eq!(draws.len(), 2);
        assert_eq!(draws[0].batch_id, old.id);
        assert_eq!(draws[0].quantity, dec(60));
        assert_eq!(draws[1].batch_id, new.id);
        assert_eq!(draws[1].quantity, dec(20));
    }

    #[test]
    fn test_fifo_skips_blocked_batches() {
        let today = date(2025, 6, 1);
        let mut bad = batch("B-BAD", date(2025, 1, 1), 100);
        bad.inspection_status = InspectionStatus::Quarantine;
        let good = batch("B-GOOD", date(2025, 2, 1), 100);

        let draws = select_fifo(&[bad, good.clone()], dec(50), today).unwrap();
        assert_eq!(draws.len(), 1);
        assert_eq!(draws[0].batch_id, good.id);
    }

    #[test]
    fn test_fifo_insufficient_fails_whole_draw() {
        let today = date(2025, 6, 1);
        let a = batch("B-A", date(2025, 1, 1), 30);
        let b = batch("B-B", date(2025, 2, 1), 40);
        let err = select_fifo(&[a, b], dec(100), today).unwrap_err();
        assert!(matches!(err, StockError::InsufficientStock { .. }));
    }
}
