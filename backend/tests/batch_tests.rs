//! Batch tests
//!
//! Covers the quality/inspection gate, availability derivation and FIFO
//! batch selection.

use chrono::{NaiveDate, Utc};
use proptest::prelude::*;
use rust_decimal::Decimal;
use std::str::FromStr;
use uuid::Uuid;

use shared::models::{
    select_fifo, Batch, InspectionStatus, ProcessName, StockLedger, StockState,
};
use shared::StockError;

fn dec(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn batch(code: &str, manufactured: NaiveDate, raw: &str) -> Batch {
    let mut states = StockLedger::new();
    let quantity = dec(raw);
    if quantity > Decimal::ZERO {
        states.credit(StockState::Raw, quantity).unwrap();
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

// ============================================================================
// Quality Gate Tests
// ============================================================================

#[cfg(test)]
mod quality_gate_tests {
    use super::*;

    #[test]
    fn test_expired_batch_blocked() {
        let mut b = batch("B-001", date(2024, 6, 1), "50");
        b.expiry_date = Some(date(2025, 1, 31));

        assert!(b.ensure_issuable(date(2025, 1, 31)).is_ok());
        let err = b.ensure_issuable(date(2025, 2, 1)).unwrap_err();
        assert!(matches!(err, StockError::ExpiredOrRejectedBatch { .. }));
    }

    #[test]
    fn test_failed_and_quarantined_blocked() {
        for status in [InspectionStatus::Failed, InspectionStatus::Quarantine] {
            let mut b = batch("B-002", date(2025, 1, 1), "50");
            b.inspection_status = status;
            assert!(b.ensure_issuable(date(2025, 2, 1)).is_err());
            assert!(status.blocks_issue());
        }
    }

    #[test]
    fn test_pending_and_passed_allowed() {
        for status in [InspectionStatus::Pending, InspectionStatus::Passed] {
            let mut b = batch("B-003", date(2025, 1, 1), "50");
            b.inspection_status = status;
            assert!(b.ensure_issuable(date(2025, 2, 1)).is_ok());
            assert!(!status.blocks_issue());
        }
    }

    #[test]
    fn test_deactivated_batch_blocked() {
        let mut b = batch("B-004", date(2025, 1, 1), "50");
        b.is_active = false;
        assert!(b.ensure_issuable(date(2025, 2, 1)).is_err());
    }

    /// Quantity passing inspection joins raw and becomes available.
    #[test]
    fn test_inspection_release_to_raw() {
        let mut b = batch("B-005", date(2025, 1, 1), "0");
        b.states.credit(StockState::Inspection, dec("40")).unwrap();
        b.inspection_status = InspectionStatus::Pending;

        b.states.release_inspection(dec("40")).unwrap();
        b.inspection_status = InspectionStatus::Passed;

        assert_eq!(b.states.quantity(&StockState::Raw), dec("40"));
        assert_eq!(b.available_quantity(), dec("40"));
    }
}

// ============================================================================
// Availability Tests
// ============================================================================

#[cfg(test)]
mod availability_tests {
    use super::*;

    #[test]
    fn test_available_excludes_scrap() {
        let mut b = batch("B-010", date(2025, 1, 1), "100");
        b.states.move_to_wip(dec("40"), ProcessName::Cutting).unwrap();
        b.states
            .receive_from_wip(dec("30"), dec("10"), ProcessName::Cutting)
            .unwrap();

        assert_eq!(b.total_quantity(), dec("100"));
        assert_eq!(b.available_quantity(), dec("90"));
    }

    #[test]
    fn test_available_excludes_blocked_inspection_quantity() {
        let mut b = batch("B-011", date(2025, 1, 1), "70");
        b.states.credit(StockState::Inspection, dec("30")).unwrap();

        b.inspection_status = InspectionStatus::Pending;
        assert_eq!(b.available_quantity(), dec("100"));

        b.inspection_status = InspectionStatus::Failed;
        assert_eq!(b.available_quantity(), dec("70"));
    }

    #[test]
    fn test_total_is_sum_of_states() {
        let mut b = batch("B-012", date(2025, 1, 1), "60");
        b.states.move_to_wip(dec("25"), ProcessName::Welding).unwrap();
        b.states
            .receive_from_wip(dec("20"), dec("5"), ProcessName::Welding)
            .unwrap();

        let summed: Decimal = b.states.entries().map(|(_, q)| q).sum();
        assert_eq!(b.total_quantity(), summed);
        assert_eq!(b.total_quantity(), dec("60"));
    }
}

// ============================================================================
// FIFO Selection Tests
// ============================================================================

#[cfg(test)]
mod fifo_tests {
    use super::*;

    #[test]
    fn test_oldest_manufacture_date_first() {
        let today = date(2025, 6, 1);
        let feb = batch("B-FEB", date(2025, 2, 1), "40");
        let jan = batch("B-JAN", date(2025, 1, 1), "40");
        let mar = batch("B-MAR", date(2025, 3, 1), "40");

        let draws = select_fifo(&[feb.clone(), jan.clone(), mar.clone()], dec("100"), today).unwrap();

        assert_eq!(draws.len(), 3);
        assert_eq!(draws[0].batch_id, jan.id);
        assert_eq!(draws[0].quantity, dec("40"));
        assert_eq!(draws[1].batch_id, feb.id);
        assert_eq!(draws[1].quantity, dec("40"));
        assert_eq!(draws[2].batch_id, mar.id);
        assert_eq!(draws[2].quantity, dec("20"));
    }

    #[test]
    fn test_exact_fit_stops_drawing() {
        let today = date(2025, 6, 1);
        let a = batch("B-A", date(2025, 1, 1), "60");
        let b = batch("B-B", date(2025, 2, 1), "60");

        let draws = select_fifo(&[a.clone(), b], dec("60"), today).unwrap();
        assert_eq!(draws.len(), 1);
        assert_eq!(draws[0].batch_id, a.id);
    }

    #[test]
    fn test_blocked_batches_skipped() {
        let today = date(2025, 6, 1);
        let mut quarantined = batch("B-Q", date(2025, 1, 1), "100");
        quarantined.inspection_status = InspectionStatus::Quarantine;
        let mut expired = batch("B-E", date(2025, 1, 2), "100");
        expired.expiry_date = Some(date(2025, 5, 1));
        let clean = batch("B-C", date(2025, 3, 1), "100");

        let draws = select_fifo(&[quarantined, expired, clean.clone()], dec("80"), today).unwrap();
        assert_eq!(draws.len(), 1);
        assert_eq!(draws[0].batch_id, clean.id);
    }

    /// Exhausted batches fail the whole draw; nothing is consumed partially.
    #[test]
    fn test_insufficient_across_batches_fails() {
        let today = date(2025, 6, 1);
        let a = batch("B-A", date(2025, 1, 1), "30");
        let b = batch("B-B", date(2025, 2, 1), "30");

        let err = select_fifo(&[a, b], dec("61"), today).unwrap_err();
        assert!(matches!(err, StockError::InsufficientStock { .. }));
    }

    #[test]
    fn test_zero_request_rejected() {
        let today = date(2025, 6, 1);
        let a = batch("B-A", date(2025, 1, 1), "30");
        assert!(select_fifo(&[a], Decimal::ZERO, today).is_err());
    }
}

// ============================================================================
// Property-Based Tests
// ============================================================================

#[cfg(test)]
mod property_tests {
    use super::*;

    fn quantity_strategy() -> impl Strategy<Value = Decimal> {
        (1i64..=10000i64).prop_map(|n| Decimal::new(n, 1))
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        /// FIFO draws cover exactly the requested quantity and never exceed
        /// any batch's raw stock.
        #[test]
        fn prop_fifo_draws_cover_request(
            raws in prop::collection::vec(quantity_strategy(), 1..8),
            requested in quantity_strategy()
        ) {
            let today = date(2025, 6, 1);
            let batches: Vec<Batch> = raws
                .iter()
                .enumerate()
                .map(|(i, raw)| {
                    let mut b = batch(
                        &format!("B-{:03}", i),
                        date(2025, 1, 1 + (i as u32 % 28)),
                        "0",
                    );
                    b.states.credit(StockState::Raw, *raw).unwrap();
                    b
                })
                .collect();

            let total: Decimal = raws.iter().copied().sum();
            match select_fifo(&batches, requested, today) {
                Ok(draws) => {
                    let drawn: Decimal = draws.iter().map(|d| d.quantity).sum();
                    prop_assert_eq!(drawn, requested);
                    for draw in &draws {
                        let source = batches.iter().find(|b| b.id == draw.batch_id).unwrap();
                        prop_assert!(draw.quantity <= source.states.quantity(&StockState::Raw));
                    }
                }
                Err(_) => prop_assert!(total < requested),
            }
        }

        /// Available quantity never exceeds total quantity.
        #[test]
        fn prop_available_within_total(
            raw in quantity_strategy(),
            inspection in quantity_strategy()
        ) {
            let mut b = batch("B-P", date(2025, 1, 1), "0");
            b.states.credit(StockState::Raw, raw).unwrap();
            b.states.credit(StockState::Inspection, inspection).unwrap();

            for status in [
                InspectionStatus::Pending,
                InspectionStatus::Passed,
                InspectionStatus::Failed,
                InspectionStatus::Quarantine,
            ] {
                b.inspection_status = status;
                prop_assert!(b.available_quantity() <= b.total_quantity());
                prop_assert!(b.available_quantity() >= Decimal::ZERO);
            }
        }
    }
}
