//! Property-based tests for ledger invariants
//!
//! These tests use proptest to verify critical invariants:
//! - Bank conservation: cb_after == cb_before − applied, new entry holds applied
//! - Apply conservation: cb_after == cb_before + applied, Σ remaining drops by applied
//! - FIFO: older entries are exhausted before newer ones are touched
//! - Rejections change nothing

use cb_ledger::{
    ApplyBanked, BankSurplus, ComplianceLedger, ComplianceRecord, Config, MemoryStore, ShipId,
    Year,
};
use cb_ledger::store::BalanceStore;
use proptest::prelude::*;
use rust_decimal::Decimal;
use std::sync::Arc;

/// Strategy for generating positive amounts (two decimal places)
fn amount_strategy() -> impl Strategy<Value = Decimal> {
    (1i64..10_000_000_00i64).prop_map(|cents| Decimal::new(cents, 2))
}

/// Strategy for generating balances of either sign
fn balance_strategy() -> impl Strategy<Value = Decimal> {
    (-10_000_000_00i64..10_000_000_00i64).prop_map(|cents| Decimal::new(cents, 2))
}

fn create_test_ledger() -> ComplianceLedger<MemoryStore> {
    ComplianceLedger::new(Arc::new(MemoryStore::new()), Config::default())
}

async fn seed(ledger: &ComplianceLedger<MemoryStore>, ship: &ShipId, year: Year, cb: Decimal) {
    ledger
        .store()
        .save_balance(ComplianceRecord::new(ship.clone(), year, cb, None))
        .await
        .unwrap();
}

async fn stored_cb(ledger: &ComplianceLedger<MemoryStore>, ship: &ShipId, year: Year) -> Decimal {
    ledger
        .store()
        .get_balance(ship, year)
        .await
        .unwrap()
        .unwrap()
        .cb
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// Property: Bank moves exactly the amount into a new entry
    #[test]
    fn prop_bank_conserves(cb in amount_strategy(), pct in 1u32..=100u32) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let ledger = create_test_ledger();
            let ship = ShipId::new("A");
            seed(&ledger, &ship, 2024, cb).await;

            let amount = (cb * Decimal::from(pct) / Decimal::ONE_HUNDRED).max(Decimal::new(1, 2)).min(cb);
            let result = ledger
                .bank_surplus(BankSurplus { ship_id: ship.clone(), year: 2024, amount_gco2eq: amount })
                .await
                .unwrap();

            prop_assert!(result.success);
            prop_assert_eq!(result.cb_after, result.cb_before - result.applied);
            prop_assert_eq!(stored_cb(&ledger, &ship, 2024).await, cb - amount);

            let records = ledger.bank_records(&ship, None).await.unwrap();
            prop_assert_eq!(records.records.len(), 1);
            prop_assert_eq!(records.records[0].remaining_gco2eq, amount);
            prop_assert_eq!(records.total_available, amount);
            Ok(())
        })?;
    }

    /// Property: Apply conserves and debits oldest entries first
    #[test]
    fn prop_apply_conserves_fifo(
        banked in prop::collection::vec(amount_strategy(), 1..6),
        deficit in balance_strategy(),
        pct in 1u32..=100u32,
    ) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let ledger = create_test_ledger();
            let ship = ShipId::new("A");

            for (i, amount) in banked.iter().enumerate() {
                let year = 2000 + i as Year;
                seed(&ledger, &ship, year, *amount).await;
                let result = ledger
                    .bank_surplus(BankSurplus { ship_id: ship.clone(), year, amount_gco2eq: *amount })
                    .await
                    .unwrap();
                prop_assert!(result.success);
            }

            let total: Decimal = banked.iter().copied().sum();
            let amount = (total * Decimal::from(pct) / Decimal::ONE_HUNDRED).max(Decimal::new(1, 2)).min(total);
            seed(&ledger, &ship, 2030, deficit).await;

            let result = ledger
                .apply_banked(ApplyBanked { ship_id: ship.clone(), deficit_year: 2030, amount_gco2eq: amount })
                .await
                .unwrap();

            prop_assert!(result.success);
            prop_assert_eq!(result.cb_after, deficit + amount);
            prop_assert_eq!(stored_cb(&ledger, &ship, 2030).await, deficit + amount);

            let records = ledger.bank_records(&ship, None).await.unwrap();
            prop_assert_eq!(records.total_available, total - amount);

            // Expected FIFO outcome
            let mut outstanding = amount;
            for (entry, original) in records.records.iter().zip(&banked) {
                let take = outstanding.min(*original);
                outstanding -= take;
                prop_assert!(entry.remaining_gco2eq >= Decimal::ZERO);
                prop_assert_eq!(entry.remaining_gco2eq, *original - take);
            }
            Ok(())
        })?;
    }

    /// Property: Bank rejections leave balance and bank untouched
    #[test]
    fn prop_bank_rejection_changes_nothing(cb in balance_strategy(), amount in balance_strategy()) {
        prop_assume!(cb <= Decimal::ZERO || amount <= Decimal::ZERO || amount > cb);

        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let ledger = create_test_ledger();
            let ship = ShipId::new("A");
            seed(&ledger, &ship, 2024, cb).await;

            let result = ledger
                .bank_surplus(BankSurplus { ship_id: ship.clone(), year: 2024, amount_gco2eq: amount })
                .await
                .unwrap();

            prop_assert!(!result.success);
            prop_assert_eq!(result.cb_after, result.cb_before);
            prop_assert_eq!(result.applied, Decimal::ZERO);
            prop_assert_eq!(stored_cb(&ledger, &ship, 2024).await, cb);
            prop_assert_eq!(ledger.store().entry_count(), 0);
            Ok(())
        })?;
    }

    /// Property: Applying more than is banked is refused
    #[test]
    fn prop_apply_over_cap_rejected(banked in amount_strategy(), extra in amount_strategy()) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let ledger = create_test_ledger();
            let ship = ShipId::new("A");
            seed(&ledger, &ship, 2023, banked).await;
            seed(&ledger, &ship, 2024, Decimal::from(-1)).await;
            ledger
                .bank_surplus(BankSurplus { ship_id: ship.clone(), year: 2023, amount_gco2eq: banked })
                .await
                .unwrap();

            let result = ledger
                .apply_banked(ApplyBanked { ship_id: ship.clone(), deficit_year: 2024, amount_gco2eq: banked + extra })
                .await
                .unwrap();

            prop_assert!(!result.success);
            prop_assert_eq!(result.cb_after, Decimal::from(-1));
            prop_assert_eq!(ledger.bank_records(&ship, None).await.unwrap().total_available, banked);
            Ok(())
        })?;
    }
}

#[tokio::test]
async fn test_fifo_scenario() {
    let ledger = create_test_ledger();
    let ship = ShipId::new("A");
    seed(&ledger, &ship, 2023, Decimal::from(100)).await;
    seed(&ledger, &ship, 2024, Decimal::from(50)).await;
    seed(&ledger, &ship, 2025, Decimal::from(-500)).await;

    for (year, amount) in [(2023, 100), (2024, 50)] {
        ledger
            .bank_surplus(BankSurplus {
                ship_id: ship.clone(),
                year,
                amount_gco2eq: Decimal::from(amount),
            })
            .await
            .unwrap();
    }

    ledger
        .apply_banked(ApplyBanked {
            ship_id: ship.clone(),
            deficit_year: 2025,
            amount_gco2eq: Decimal::from(120),
        })
        .await
        .unwrap();

    let remaining: Vec<Decimal> = ledger
        .bank_records(&ship, None)
        .await
        .unwrap()
        .records
        .iter()
        .map(|e| e.remaining_gco2eq)
        .collect();
    assert_eq!(remaining, vec![Decimal::ZERO, Decimal::from(30)]);
}
