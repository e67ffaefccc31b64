//! Per-state quantity ledger
//!
//! One ledger tracks how much of an item or batch resides in each stock
//! state. All mutation goes through the operations here, which check their
//! preconditions up front and only then touch the map, so a failed call
//! leaves the ledger exactly as it was.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::StockError;
use crate::models::process::{ProcessName, StockState};

/// Quantities per stock state. Conservation holds across every operation:
/// quantity is neither created nor destroyed except where an operation
/// declares an external boundary (receiving material, scrap write-off).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StockLedger {
    states: BTreeMap<StockState, Decimal>,
}

impl StockLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a ledger from persisted `(state, quantity)` rows. Negative
    /// quantities are rejected; a negative stored value means the record was
    /// corrupted outside the engine.
    pub fn from_entries<I>(entries: I) -> Result<Self, StockError>
    where
        I: IntoIterator<Item = (StockState, Decimal)>,
    {
        let mut ledger = Self::new();
        for (state, quantity) in entries {
            if quantity < Decimal::ZERO {
                return Err(StockError::InvalidQuantity(quantity));
            }
            *ledger.states.entry(state).or_insert(Decimal::ZERO) += quantity;
        }
        Ok(ledger)
    }

    pub fn quantity(&self, state: &StockState) -> Decimal {
        self.states.get(state).copied().unwrap_or(Decimal::ZERO)
    }

    /// Sum of every state field.
    pub fn total_quantity(&self) -> Decimal {
        self.states.values().copied().sum()
    }

    /// Total across all work-in-process slots.
    pub fn wip_total(&self) -> Decimal {
        self.states
            .iter()
            .filter(|(state, _)| state.is_wip())
            .map(|(_, quantity)| *quantity)
            .sum()
    }

    /// All states with their quantities, including zeroed slots that have
    /// been used before.
    pub fn entries(&self) -> impl Iterator<Item = (&StockState, Decimal)> {
        self.states.iter().map(|(state, quantity)| (state, *quantity))
    }

    /// Add quantity arriving from outside the ledger (goods receipt,
    /// production output).
    pub fn credit(&mut self, state: StockState, quantity: Decimal) -> Result<(), StockError> {
        ensure_positive(quantity)?;
        *self.states.entry(state).or_insert(Decimal::ZERO) += quantity;
        Ok(())
    }

    /// Remove quantity leaving the ledger entirely (despatch, write-off).
    pub fn debit(&mut self, state: &StockState, quantity: Decimal) -> Result<(), StockError> {
        ensure_positive(quantity)?;
        let available = self.quantity(state);
        if available < quantity {
            return Err(StockError::InsufficientStock {
                state: state.key(),
                requested: quantity,
                available,
            });
        }
        *self.states.entry(state.clone()).or_insert(Decimal::ZERO) -= quantity;
        Ok(())
    }

    /// Move quantity between two states.
    pub fn transfer(
        &mut self,
        from: &StockState,
        to: StockState,
        quantity: Decimal,
    ) -> Result<(), StockError> {
        self.debit(from, quantity)?;
        *self.states.entry(to).or_insert(Decimal::ZERO) += quantity;
        Ok(())
    }

    /// raw -> wip:process. The WIP slot is created on first use.
    pub fn move_to_wip(
        &mut self,
        quantity: Decimal,
        process: ProcessName,
    ) -> Result<(), StockError> {
        self.transfer(&StockState::Raw, StockState::Wip(process), quantity)
    }

    /// wip:from -> wip:to.
    pub fn move_between_processes(
        &mut self,
        quantity: Decimal,
        from: ProcessName,
        to: ProcessName,
    ) -> Result<(), StockError> {
        self.transfer(&StockState::Wip(from), StockState::Wip(to), quantity)
    }

    /// Close out a WIP slot into finished and scrap. Requires
    /// `wip >= finished + scrap`; anything else is a conservation violation.
    pub fn receive_from_wip(
        &mut self,
        finished: Decimal,
        scrap: Decimal,
        process: ProcessName,
    ) -> Result<(), StockError> {
        ensure_non_negative(finished)?;
        ensure_non_negative(scrap)?;
        let requested = finished + scrap;
        if requested <= Decimal::ZERO {
            return Err(StockError::InvalidQuantity(requested));
        }

        let wip_state = StockState::Wip(process);
        let available = self.quantity(&wip_state);
        if available < requested {
            return Err(StockError::Conservation {
                state: wip_state.key(),
                requested,
                available,
            });
        }

        *self.states.entry(wip_state).or_insert(Decimal::ZERO) -= requested;
        if finished > Decimal::ZERO {
            *self.states.entry(StockState::Finished).or_insert(Decimal::ZERO) += finished;
        }
        if scrap > Decimal::ZERO {
            *self.states.entry(StockState::Scrap).or_insert(Decimal::ZERO) += scrap;
        }
        Ok(())
    }

    /// Reconcile a job-work return against a WIP slot in one step:
    /// finished and scrap leave WIP as in [`Self::receive_from_wip`], unused
    /// material goes back to raw. The single precondition check keeps the
    /// whole return all-or-nothing.
    pub fn reconcile_return(
        &mut self,
        finished: Decimal,
        scrap: Decimal,
        unused: Decimal,
        process: ProcessName,
    ) -> Result<(), StockError> {
        ensure_non_negative(finished)?;
        ensure_non_negative(scrap)?;
        ensure_non_negative(unused)?;
        let requested = finished + scrap + unused;
        if requested <= Decimal::ZERO {
            return Err(StockError::InvalidQuantity(requested));
        }

        let wip_state = StockState::Wip(process);
        let available = self.quantity(&wip_state);
        if available < requested {
            return Err(StockError::Conservation {
                state: wip_state.key(),
                requested,
                available,
            });
        }

        *self.states.entry(wip_state).or_insert(Decimal::ZERO) -= requested;
        if finished > Decimal::ZERO {
            *self.states.entry(StockState::Finished).or_insert(Decimal::ZERO) += finished;
        }
        if scrap > Decimal::ZERO {
            *self.states.entry(StockState::Scrap).or_insert(Decimal::ZERO) += scrap;
        }
        if unused > Decimal::ZERO {
            *self.states.entry(StockState::Raw).or_insert(Decimal::ZERO) += unused;
        }
        Ok(())
    }

    /// inspection -> raw, once a batch passes its quality gate.
    pub fn release_inspection(&mut self, quantity: Decimal) -> Result<(), StockError> {
        self.transfer(&StockState::Inspection, StockState::Raw, quantity)
    }
}

fn ensure_positive(quantity: Decimal) -> Result<(), StockError> {
    if quantity <= Decimal::ZERO {
        return Err(StockError::InvalidQuantity(quantity));
    }
    Ok(())
}

fn ensure_non_negative(quantity: Decimal) -> Result<(), StockError> {
    if quantity < Decimal::ZERO {
        return Err(StockError::InvalidQuantity(quantity));
    }
    Ok(())
}
