//! Core types for pooling

use cb_ledger::{checked_sum, PoolId, PoolMember, ShipId, Year};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Ship entering a pool with its balance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolMemberInput {
    /// Ship
    pub ship_id: ShipId,

    /// Balance at pool entry (gCO₂e)
    pub cb_before: Decimal,
}

impl PoolMemberInput {
    /// Create member input
    pub fn new(ship_id: impl Into<String>, cb_before: Decimal) -> Self {
        Self {
            ship_id: ShipId::new(ship_id),
            cb_before,
        }
    }
}

/// Request to create a pool
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatePool {
    /// Reporting year
    pub year: Year,

    /// Members with the balances the caller saw
    pub members: Vec<PoolMemberInput>,
}

impl CreatePool {
    /// Σ positive cb_before, `None` on overflow
    pub fn total_surplus(&self) -> Option<Decimal> {
        checked_sum(
            self.members
                .iter()
                .map(|m| m.cb_before)
                .filter(|cb| *cb > Decimal::ZERO),
        )
    }

    /// Σ negative cb_before, `None` on overflow
    pub fn total_deficit(&self) -> Option<Decimal> {
        checked_sum(
            self.members
                .iter()
                .map(|m| m.cb_before)
                .filter(|cb| *cb < Decimal::ZERO),
        )
    }

    /// Σ cb_before, `None` when either side overflows
    pub fn pool_sum(&self) -> Option<Decimal> {
        // opposite signs, cannot overflow once both sides fit
        self.total_surplus()?.checked_add(self.total_deficit()?)
    }
}

/// Allocation for one member
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Allocation {
    /// Ship
    pub ship_id: ShipId,

    /// Balance before pooling
    pub cb_before: Decimal,

    /// Balance after pooling
    pub cb_after: Decimal,

    /// cb_after − cb_before (positive = received, negative = given)
    pub allocation: Decimal,
}

/// One movement of surplus from a surplus ship to a deficit ship
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transfer {
    /// Giving ship
    pub from: ShipId,

    /// Receiving ship
    pub to: ShipId,

    /// Amount moved
    pub amount: Decimal,
}

/// Allocator output
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocationOutcome {
    /// Members ordered by cb_before descending
    pub members: Vec<Allocation>,

    /// Transfers in the order they were made
    pub transfers: Vec<Transfer>,
}

/// Result of validating a pool request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolValidation {
    /// No rule failed
    pub is_valid: bool,

    /// Every failed rule
    pub errors: Vec<String>,

    /// Σ cb_before, `None` if the balances overflow
    pub pool_sum: Option<Decimal>,
}

/// Persisted pool
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolResult {
    /// Pool ID
    pub pool_id: PoolId,

    /// Reporting year
    pub year: Year,

    /// Members as persisted, allocation order
    pub members: Vec<PoolMember>,

    /// Transfers made by the allocator
    pub transfers: Vec<Transfer>,

    /// Σ positive cb_before
    pub total_surplus: Decimal,

    /// Σ negative cb_before (a non-positive number)
    pub total_deficit: Decimal,

    /// Σ cb_before
    pub pool_sum: Decimal,
}

/// Stage of pool creation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PoolState {
    /// Checking the request
    Validating,

    /// Running the allocator
    Allocating,

    /// Writing the batch
    Persisting,

    /// Pool written
    Done,

    /// Validation failed (terminal)
    Rejected,

    /// Allocation broke a rule (terminal)
    InvariantViolated,
}

impl PoolState {
    /// No further transitions
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PoolState::Done | PoolState::Rejected | PoolState::InvariantViolated
        )
    }

    /// Allowed transitions
    pub fn can_transition_to(&self, next: PoolState) -> bool {
        matches!(
            (self, next),
            (PoolState::Validating, PoolState::Allocating)
                | (PoolState::Validating, PoolState::Rejected)
                | (PoolState::Allocating, PoolState::Persisting)
                | (PoolState::Allocating, PoolState::InvariantViolated)
                | (PoolState::Persisting, PoolState::Done)
        )
    }
}

impl fmt::Display for PoolState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PoolState::Validating => "validating",
            PoolState::Allocating => "allocating",
            PoolState::Persisting => "persisting",
            PoolState::Done => "done",
            PoolState::Rejected => "rejected",
            PoolState::InvariantViolated => "invariant_violated",
        };
        write!(f, "{}", name)
    }
}
