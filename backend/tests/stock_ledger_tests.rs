//! Stock ledger tests
//!
//! Covers the per-state quantity ledger invariants:
//! - non-negativity of every state field
//! - conservation across internal transitions
//! - all-or-nothing failure (no partial field updates)

use proptest::prelude::*;
use rust_decimal::Decimal;
use std::str::FromStr;

use shared::models::{ProcessName, StockLedger, StockState};
use shared::StockError;

// Helper to create Decimal from string
fn dec(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

fn ledger_with_raw(quantity: &str) -> StockLedger {
    let mut ledger = StockLedger::new();
    ledger.credit(StockState::Raw, dec(quantity)).unwrap();
    ledger
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod unit_tests {
    use super::*;

    /// The walk-through scenario: 500 raw, 200 into cutting, 180 finished +
    /// 20 scrap out, then an over-draw that must fail.
    #[test]
    fn test_steel_rod_scenario() {
        let mut ledger = ledger_with_raw("500");

        ledger.move_to_wip(dec("200"), ProcessName::Cutting).unwrap();
        assert_eq!(ledger.quantity(&StockState::Raw), dec("300"));
        assert_eq!(
            ledger.quantity(&StockState::Wip(ProcessName::Cutting)),
            dec("200")
        );

        ledger
            .receive_from_wip(dec("180"), dec("20"), ProcessName::Cutting)
            .unwrap();
        assert_eq!(
            ledger.quantity(&StockState::Wip(ProcessName::Cutting)),
            Decimal::ZERO
        );
        assert_eq!(ledger.quantity(&StockState::Finished), dec("180"));
        assert_eq!(ledger.quantity(&StockState::Scrap), dec("20"));

        // Only 300 raw remain, so 400 must be rejected.
        let err = ledger.move_to_wip(dec("400"), ProcessName::Cutting).unwrap_err();
        assert!(matches!(err, StockError::InsufficientStock { .. }));
        assert_eq!(ledger.quantity(&StockState::Raw), dec("300"));
    }

    /// An over-draw leaves every field exactly as it was.
    #[test]
    fn test_overdraw_snapshot_unchanged() {
        let mut ledger = ledger_with_raw("100");
        ledger.move_to_wip(dec("30"), ProcessName::Welding).unwrap();
        let snapshot = ledger.clone();

        assert!(ledger.move_to_wip(dec("71"), ProcessName::Welding).is_err());
        assert_eq!(ledger, snapshot);

        assert!(ledger
            .receive_from_wip(dec("20"), dec("11"), ProcessName::Welding)
            .is_err());
        assert_eq!(ledger, snapshot);
    }

    /// finished + scrap beyond the WIP slot is a conservation error.
    #[test]
    fn test_conservation_violation_rejected() {
        let mut ledger = ledger_with_raw("100");
        ledger.move_to_wip(dec("100"), ProcessName::Bending).unwrap();

        let err = ledger
            .receive_from_wip(dec("60"), dec("50"), ProcessName::Bending)
            .unwrap_err();
        assert!(matches!(err, StockError::Conservation { .. }));
    }

    /// WIP can hop between process slots without touching raw or finished.
    #[test]
    fn test_move_between_processes_preserves_total() {
        let mut ledger = ledger_with_raw("120");
        ledger.move_to_wip(dec("120"), ProcessName::Cutting).unwrap();
        ledger
            .move_between_processes(dec("80"), ProcessName::Cutting, ProcessName::Zinc)
            .unwrap();

        assert_eq!(ledger.quantity(&StockState::Wip(ProcessName::Cutting)), dec("40"));
        assert_eq!(ledger.quantity(&StockState::Wip(ProcessName::Zinc)), dec("80"));
        assert_eq!(ledger.total_quantity(), dec("120"));
        assert_eq!(ledger.wip_total(), dec("120"));
    }

    /// Custom process names get their own WIP slots.
    #[test]
    fn test_custom_process_slot() {
        let custom = ProcessName::parse("shot blasting").unwrap();
        let mut ledger = ledger_with_raw("50");
        ledger.move_to_wip(dec("50"), custom.clone()).unwrap();
        assert_eq!(ledger.quantity(&StockState::Wip(custom)), dec("50"));
    }

    /// Unused job-work material returns to raw, not finished.
    #[test]
    fn test_reconcile_return_splits_three_ways() {
        let mut ledger = ledger_with_raw("100");
        ledger.move_to_wip(dec("100"), ProcessName::Painting).unwrap();
        ledger
            .reconcile_return(dec("70"), dec("10"), dec("20"), ProcessName::Painting)
            .unwrap();

        assert_eq!(ledger.quantity(&StockState::Finished), dec("70"));
        assert_eq!(ledger.quantity(&StockState::Scrap), dec("10"));
        assert_eq!(ledger.quantity(&StockState::Raw), dec("20"));
        assert_eq!(ledger.total_quantity(), dec("100"));
    }

    /// Fractional quantities work the same as whole units.
    #[test]
    fn test_fractional_quantities() {
        let mut ledger = ledger_with_raw("10.5");
        ledger.move_to_wip(dec("0.5"), ProcessName::Machining).unwrap();
        ledger
            .receive_from_wip(dec("0.25"), dec("0.25"), ProcessName::Machining)
            .unwrap();

        assert_eq!(ledger.quantity(&StockState::Raw), dec("10.0"));
        assert_eq!(ledger.quantity(&StockState::Finished), dec("0.25"));
        assert_eq!(ledger.quantity(&StockState::Scrap), dec("0.25"));
    }
}

// ============================================================================
// Property-Based Tests
// ============================================================================

#[cfg(test)]
mod property_tests {
    use super::*;

    /// Strategy for generating positive quantities (0.1 to 1000.0)
    fn quantity_strategy() -> impl Strategy<Value = Decimal> {
        (1i64..=10000i64).prop_map(|n| Decimal::new(n, 1))
    }

    /// Strategy for generating process names
    fn process_strategy() -> impl Strategy<Value = ProcessName> {
        prop_oneof![
            Just(ProcessName::Cutting),
            Just(ProcessName::Bending),
            Just(ProcessName::Welding),
            Just(ProcessName::Painting),
            Just(ProcessName::Custom("anodizing".to_string())),
        ]
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        /// Internal moves never create or destroy quantity.
        #[test]
        fn prop_total_conserved_by_internal_moves(
            initial in quantity_strategy(),
            moved in quantity_strategy(),
            process in process_strategy()
        ) {
            let mut ledger = StockLedger::new();
            ledger.credit(StockState::Raw, initial).unwrap();

            if ledger.move_to_wip(moved, process).is_ok() {
                prop_assert_eq!(ledger.total_quantity(), initial);
            } else {
                // The failed move left everything in raw.
                prop_assert_eq!(ledger.quantity(&StockState::Raw), initial);
            }
        }

        /// Conservation law: into WIP = finished + scrap + remaining WIP.
        #[test]
        fn prop_wip_conservation(
            initial in quantity_strategy(),
            finished in quantity_strategy(),
            scrap in quantity_strategy(),
            process in process_strategy()
        ) {
            let mut ledger = StockLedger::new();
            ledger.credit(StockState::Raw, initial).unwrap();
            ledger.move_to_wip(initial, process.clone()).unwrap();

            let wip_state = StockState::Wip(process.clone());
            if ledger.receive_from_wip(finished, scrap, process).is_ok() {
                let remaining = ledger.quantity(&wip_state);
                prop_assert_eq!(
                    initial,
                    finished + scrap + remaining
                );
            } else {
                // Failed receive left all of it in WIP.
                prop_assert_eq!(ledger.quantity(&wip_state), initial);
            }
        }

        /// No operation sequence can drive any state negative.
        #[test]
        fn prop_states_never_negative(
            initial in quantity_strategy(),
            amounts in prop::collection::vec(quantity_strategy(), 1..10),
            process in process_strategy()
        ) {
            let mut ledger = StockLedger::new();
            ledger.credit(StockState::Raw, initial).unwrap();

            for amount in amounts {
                // Errors are expected: over-draws must be rejected.
                let _ = ledger.move_to_wip(amount, process.clone());
                for (_, quantity) in ledger.entries() {
                    prop_assert!(quantity >= Decimal::ZERO);
                }
            }
        }

        /// A rejected operation leaves the ledger byte-for-byte unchanged.
        #[test]
        fn prop_failed_op_changes_nothing(
            initial in quantity_strategy(),
            extra in quantity_strategy(),
            process in process_strategy()
        ) {
            let mut ledger = StockLedger::new();
            ledger.credit(StockState::Raw, initial).unwrap();
            let snapshot = ledger.clone();

            let result = ledger.move_to_wip(initial + extra, process);
            prop_assert!(result.is_err());
            prop_assert_eq!(ledger, snapshot);
        }

        /// Draw order across independent WIP slots does not matter.
        #[test]
        fn prop_slot_order_independent(
            a in quantity_strategy(),
            b in quantity_strategy()
        ) {
            let total = a + b;

            let mut first = StockLedger::new();
            first.credit(StockState::Raw, total).unwrap();
            first.move_to_wip(a, ProcessName::Cutting).unwrap();
            first.move_to_wip(b, ProcessName::Welding).unwrap();

            let mut second = StockLedger::new();
            second.credit(StockState::Raw, total).unwrap();
            second.move_to_wip(b, ProcessName::Welding).unwrap();
            second.move_to_wip(a, ProcessName::Cutting).unwrap();

            prop_assert_eq!(first, second);
        }
    }
}
