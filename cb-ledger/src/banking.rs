//! Banking of surplus compliance balance
//!
//! Bank moves part of a positive balance into a new bank entry. Apply moves
//! banked surplus back into a (usually deficit) ship-year, debiting the
//! ship's entries oldest first.
//!
//! The functions here are pure: they decide whether an operation may run and
//! which entries it debits. [`crate::ComplianceLedger`] reads the inputs,
//! calls them under the ship lock and commits the resulting writes.

use crate::types::{BankEntry, EntryId, ShipId, Year};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Request to bank surplus from a ship-year
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BankSurplus {
    /// Ship
    pub ship_id: ShipId,

    /// Year holding the surplus
    pub year: Year,

    /// Amount to bank (gCO₂e)
    pub amount_gco2eq: Decimal,
}

/// Request to apply banked surplus to a ship-year
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplyBanked {
    /// Ship
    pub ship_id: ShipId,

    /// Year receiving the surplus
    pub deficit_year: Year,

    /// Amount to apply (gCO₂e)
    pub amount_gco2eq: Decimal,
}

/// Why a banking operation was refused
///
/// These are expected, caller-correctable outcomes and never abort with an
/// error.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum Rejection {
    /// Zero or negative amount requested
    #[error("Amount must be positive, got {0}")]
    NonPositiveAmount(Decimal),

    /// Balance is zero or negative
    #[error("Cannot bank negative or zero compliance balance")]
    NoSurplus,

    /// More than the balance requested
    #[error("Requested amount {requested} exceeds available balance {available}")]
    ExceedsBalance {
        /// Requested
        requested: Decimal,
        /// Current balance
        available: Decimal,
    },

    /// Nothing banked
    #[error("No banked surplus available")]
    NoBankedSurplus,

    /// More than the banked total requested
    #[error("Requested amount {requested} exceeds available banked {available}")]
    ExceedsBanked {
        /// Requested
        requested: Decimal,
        /// Σ remaining
        available: Decimal,
    },

    /// Resulting balance would leave the representable range
    #[error("Applying {requested} to balance {cb} overflows")]
    BalanceOverflow {
        /// Requested
        requested: Decimal,
        /// Current balance
        cb: Decimal,
    },
}

/// Outcome of Bank or Apply
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BankingResult {
    /// Operation ran
    pub success: bool,

    /// Balance before
    pub cb_before: Decimal,

    /// Amount moved, zero on rejection
    pub applied: Decimal,

    /// Balance after, equal to `cb_before` on rejection
    pub cb_after: Decimal,

    /// Human readable outcome
    pub message: String,

    /// Set when `success` is false
    pub rejection: Option<Rejection>,
}

impl BankingResult {
    /// Successful transfer
    pub fn accepted(
        cb_before: Decimal,
        applied: Decimal,
        cb_after: Decimal,
        message: impl Into<String>,
    ) -> Self {
        Self {
            success: true,
            cb_before,
            applied,
            cb_after,
            message: message.into(),
            rejection: None,
        }
    }

    /// Refused transfer, balance untouched
    pub fn rejected(cb: Decimal, rejection: Rejection) -> Self {
        Self {
            success: false,
            cb_before: cb,
            applied: Decimal::ZERO,
            cb_after: cb,
            message: rejection.to_string(),
            rejection: Some(rejection),
        }
    }
}

/// Check whether `amount` can be banked from a balance of `cb`
pub fn check_bank(cb: Decimal, amount: Decimal) -> Result<(), Rejection> {
    if amount <= Decimal::ZERO {
        return Err(Rejection::NonPositiveAmount(amount));
    }
    if cb <= Decimal::ZERO {
        return Err(Rejection::NoSurplus);
    }
    if amount > cb {
        return Err(Rejection::ExceedsBalance {
            requested: amount,
            available: cb,
        });
    }
    Ok(())
}

/// Check whether `amount` can be applied from `available` banked surplus
pub fn check_apply(available: Decimal, amount: Decimal) -> Result<(), Rejection> {
    if amount <= Decimal::ZERO {
        return Err(Rejection::NonPositiveAmount(amount));
    }
    if available <= Decimal::ZERO {
        return Err(Rejection::NoBankedSurplus);
    }
    if amount > available {
        return Err(Rejection::ExceedsBanked {
            requested: amount,
            available,
        });
    }
    Ok(())
}

/// Balance after applying `amount` to `cb`
pub fn applied_balance(cb: Decimal, amount: Decimal) -> Result<Decimal, Rejection> {
    cb.checked_add(amount).ok_or(Rejection::BalanceOverflow {
        requested: amount,
        cb,
    })
}

/// Planned reduction of one bank entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Debit {
    /// Entry
    pub entry_id: EntryId,

    /// Owner
    pub ship_id: ShipId,

    /// Amount taken from the entry
    pub debited: Decimal,

    /// Remaining after the debit
    pub remaining: Decimal,
}

/// Plan a FIFO debit of `amount` over `entries`
///
/// Entries are ordered by `created_at` here regardless of how the store
/// returned them. Exhausted entries are skipped and the last touched entry
/// may be debited partially. If the entries hold less than `amount`, the
/// plan covers what is there; callers compare [`total_debited`] against the
/// request.
pub fn fifo_debit(entries: &[BankEntry], amount: Decimal) -> Vec<Debit> {
    let mut ordered: Vec<&BankEntry> = entries.iter().collect();
    ordered.sort_by(|a, b| a.created_at.cmp(&b.created_at));

    let mut outstanding = amount;
    let mut debits = Vec::new();

    for entry in ordered {
        if outstanding <= Decimal::ZERO {
            break;
        }
        if entry.is_exhausted() {
            continue;
        }

        let take = outstanding.min(entry.remaining_gco2eq);
        debits.push(Debit {
            entry_id: entry.id,
            ship_id: entry.ship_id.clone(),
            debited: take,
            remaining: entry.remaining_gco2eq - take,
        });
        outstanding -= take;
    }

    debits
}

/// Σ debited over a plan
pub fn total_debited(debits: &[Debit]) -> Decimal {
    debits.iter().map(|d| d.debited).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use rust_decimal_macros::dec;

    fn entries(remaining: &[Decimal]) -> Vec<BankEntry> {
        let ship = ShipId::new("A");
        let base = chrono::Utc::now();
        remaining
            .iter()
            .enumerate()
            .map(|(i, r)| {
                let mut entry = BankEntry::new(ship.clone(), 2024, dec!(100));
                entry.remaining_gco2eq = *r;
                entry.created_at = base + Duration::seconds(i as i64);
                entry
            })
            .collect()
    }

    #[test]
    fn test_check_bank() {
        assert!(check_bank(dec!(100), dec!(100)).is_ok());
        assert_eq!(check_bank(dec!(0), dec!(1)), Err(Rejection::NoSurplus));
        assert_eq!(check_bank(dec!(-5), dec!(1)), Err(Rejection::NoSurplus));
        assert_eq!(
            check_bank(dec!(10), dec!(11)),
            Err(Rejection::ExceedsBalance {
                requested: dec!(11),
                available: dec!(10)
            })
        );
        assert_eq!(
            check_bank(dec!(10), dec!(0)),
            Err(Rejection::NonPositiveAmount(dec!(0)))
        );
    }

    #[test]
    fn test_check_apply() {
        assert!(check_apply(dec!(150), dec!(120)).is_ok());
        assert_eq!(check_apply(dec!(0), dec!(1)), Err(Rejection::NoBankedSurplus));
        assert!(matches!(
            check_apply(dec!(10), dec!(10.5)),
            Err(Rejection::ExceedsBanked { .. })
        ));
        assert!(matches!(
            check_apply(dec!(10), dec!(-3)),
            Err(Rejection::NonPositiveAmount(_))
        ));
    }

    #[test]
    fn test_fifo_ties_keep_input_order() {
        let mut tied = entries(&[dec!(10), dec!(10), dec!(10)]);
        let at = tied[0].created_at;
        for entry in &mut tied {
            entry.created_at = at;
        }

        let debits = fifo_debit(&tied, dec!(15));
        assert_eq!(debits.len(), 2);
        assert_eq!(debits[0].entry_id, tied[0].id);
        assert_eq!(debits[0].remaining, dec!(0));
        assert_eq!(debits[1].entry_id, tied[1].id);
        assert_eq!(debits[1].remaining, dec!(5));
    }

    #[test]
    fn test_applied_balance_overflow() {
        assert_eq!(applied_balance(dec!(-50), dec!(20)), Ok(dec!(-30)));
        assert_eq!(
            applied_balance(Decimal::MAX, dec!(1)),
            Err(Rejection::BalanceOverflow {
                requested: dec!(1),
                cb: Decimal::MAX,
            })
        );
    }

    #[test]
    fn test_fifo_partial_debit() {
        let entries = entries(&[dec!(100), dec!(50)]);
        let debits = fifo_debit(&entries, dec!(120));

        assert_eq!(debits.len(), 2);
        assert_eq!(debits[0].entry_id, entries[0].id);
        assert_eq!(debits[0].remaining, dec!(0));
        assert_eq!(debits[1].remaining, dec!(30));
        assert_eq!(total_debited(&debits), dec!(120));
    }

    #[test]
    fn test_fifo_ignores_input_order_and_skips_exhausted() {
        let mut entries = entries(&[dec!(0), dec!(40), dec!(60)]);
        entries.reverse();

        let debits = fifo_debit(&entries, dec!(50));
        assert_eq!(debits.len(), 2);
        // oldest non-exhausted entry first
        assert_eq!(debits[0].entry_id, entries[1].id);
        assert_eq!(debits[0].debited, dec!(40));
        assert_eq!(debits[1].entry_id, entries[0].id);
        assert_eq!(debits[1].remaining, dec!(50));
    }

    #[test]
    fn test_fifo_stops_when_covered() {
        let entries = entries(&[dec!(100), dec!(50)]);
        let debits = fifo_debit(&entries, dec!(100));
        assert_eq!(debits.len(), 1);
    }

    #[test]
    fn test_fifo_short_plan() {
        let entries = entries(&[dec!(10)]);
        let debits = fifo_debit(&entries, dec!(25));
        assert_eq!(total_debited(&debits), dec!(10));
    }

    #[test]
    fn test_rejected_result_keeps_balance() {
        let result = BankingResult::rejected(dec!(-7), Rejection::NoSurplus);
        assert!(!result.success);
        assert_eq!(result.cb_after, result.cb_before);
        assert_eq!(result.applied, Decimal::ZERO);
        assert_eq!(
            result.message,
            "Cannot bank negative or zero compliance balance"
        );
    }
}
