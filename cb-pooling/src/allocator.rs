//! Greedy pool allocation
//!
//! # Algorithm
//!
//! 1. Sort members by balance, largest surplus first (stable on input order)
//! 2. Surplus cursor at the front, deficit cursor at the back
//! 3. Skip members with nothing to give / nothing owed
//! 4. Move min(surplus, deficit) from front to back, repeat until the cursors meet
//!
//! Each transfer zeroes the surplus at the front or the deficit at the back,
//! so there are at most N − 1 transfers. When the pool sum is non-negative
//! every deficit is closed. The split is not proportional.
//!
//! # Example
//!
//! ```text
//! Members:
//!   A: +100
//!   B:  −30
//!   C:  −40
//!
//! Sorted: A(+100), B(−30), C(−40)
//!
//! Transfers:
//!   A → C: 40
//!   A → B: 30
//!
//! After:
//!   A: 30 (allocation −70)
//!   B:  0 (allocation +30)
//!   C:  0 (allocation +40)
//! ```

use crate::{
    types::{Allocation, AllocationOutcome, PoolMemberInput, Transfer},
    Error, Result,
};
use cb_ledger::checked_sum;
use rust_decimal::Decimal;

/// Allocate surplus to deficits
///
/// Pure: the input is not touched and duplicates are not merged.
pub fn allocate(members: &[PoolMemberInput]) -> AllocationOutcome {
    let mut sorted: Vec<&PoolMemberInput> = members.iter().collect();
    // stable, ties keep input order
    sorted.sort_by(|a, b| b.cb_before.cmp(&a.cb_before));

    let mut result: Vec<Allocation> = sorted
        .into_iter()
        .map(|m| Allocation {
            ship_id: m.ship_id.clone(),
            cb_before: m.cb_before,
            cb_after: m.cb_before,
            allocation: Decimal::ZERO,
        })
        .collect();

    let mut transfers = Vec::new();
    if result.len() < 2 {
        return AllocationOutcome {
            members: result,
            transfers,
        };
    }

    let mut i = 0;
    let mut j = result.len() - 1;

    while i < j {
        while i < j && result[i].cb_after <= Decimal::ZERO {
            i += 1;
        }
        while i < j && result[j].cb_after >= Decimal::ZERO {
            j -= 1;
        }
        if i >= j {
            break;
        }

        let amount = result[i].cb_after.min(-result[j].cb_after);

        result[i].cb_after -= amount;
        result[i].allocation -= amount;
        result[j].cb_after += amount;
        result[j].allocation += amount;

        transfers.push(Transfer {
            from: result[i].ship_id.clone(),
            to: result[j].ship_id.clone(),
            amount,
        });
    }

    AllocationOutcome {
        members: result,
        transfers,
    }
}

/// Check the pooling rules on an allocation
///
/// - a deficit member never ends below where it started
/// - a surplus member never ends negative
/// - Σ allocation == 0
pub fn check_invariants(members: &[Allocation]) -> Result<()> {
    for member in members {
        if member.cb_before < Decimal::ZERO && member.cb_after < member.cb_before {
            return Err(Error::InvariantViolation(format!(
                "Ship {} would exit worse after pooling ({} -> {})",
                member.ship_id, member.cb_before, member.cb_after
            )));
        }
        if member.cb_before > Decimal::ZERO && member.cb_after < Decimal::ZERO {
            return Err(Error::InvariantViolation(format!(
                "Surplus ship {} would exit negative after pooling ({} -> {})",
                member.ship_id, member.cb_before, member.cb_after
            )));
        }
        if member.cb_after.checked_sub(member.cb_before) != Some(member.allocation) {
            return Err(Error::InvariantViolation(format!(
                "Allocation {} for ship {} does not match {} -> {}",
                member.allocation, member.ship_id, member.cb_before, member.cb_after
            )));
        }
    }

    match checked_sum(members.iter().map(|m| m.allocation)) {
        Some(total) if total == Decimal::ZERO => {}
        Some(total) => {
            return Err(Error::InvariantViolation(format!(
                "Allocations sum to {}, expected 0",
                total
            )))
        }
        None => {
            return Err(Error::InvariantViolation(
                "Allocations overflow when summed".to_string(),
            ))
        }
    }

    Ok(())
}
