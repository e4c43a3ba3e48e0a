//! Stock aggregation: folds ledger entries into current stock.
//!
//! The product's total is the sum of its per-location levels, and every level
//! stays at or above zero. A movement that would break that is rejected before
//! anything is recorded.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use stockledger_core::{DomainError, DomainResult};

use crate::movement::{LocationId, StockMovement};

/// Per-location stock of one product.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockLevels {
    total: i64,
    by_location: BTreeMap<LocationId, i64>,
}

impl StockLevels {
    pub fn total(&self) -> i64 {
        self.total
    }

    pub fn at(&self, location: &LocationId) -> i64 {
        self.by_location.get(location).copied().unwrap_or(0)
    }

    pub fn locations(&self) -> impl Iterator<Item = (&LocationId, i64)> {
        self.by_location.iter().map(|(l, q)| (l, *q))
    }

    /// Apply one entry, rejecting it if any level would go negative.
    ///
    /// Returns the new total. On error `self` is unchanged.
    pub fn apply(&mut self, movement: &StockMovement) -> DomainResult<i64> {
        if movement.quantity <= 0 {
            return Err(DomainError::validation("quantity must be positive"));
        }

        let delta = movement.signed_delta();
        let level = self.at(&movement.location);

        let next_level = level
            .checked_add(delta)
            .ok_or_else(|| DomainError::validation("stock level overflow"))?;
        let next_total = self
            .total
            .checked_add(delta)
            .ok_or_else(|| DomainError::validation("stock level overflow"))?;

        if next_level < 0 || next_total < 0 {
            return Err(DomainError::insufficient_stock(movement.quantity, level));
        }

        self.by_location.insert(movement.location.clone(), next_level);
        self.total = next_total;
        Ok(next_total)
    }

    /// Fold an already accepted entry. Used when rehydrating from history.
    pub(crate) fn fold(&mut self, movement: &StockMovement) {
        let delta = movement.signed_delta();
        *self.by_location.entry(movement.location.clone()).or_insert(0) += delta;
        self.total += delta;
    }

    /// Rebuild levels from zero by replaying a ledger in order.
    pub fn replay<'a>(movements: impl IntoIterator<Item = &'a StockMovement>) -> DomainResult<Self> {
        let mut levels = Self::default();
        for m in movements {
            levels.apply(m)?;
        }
        Ok(levels)
    }
}
