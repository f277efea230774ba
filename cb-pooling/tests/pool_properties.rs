//! Property-based tests for the pool allocator and pool creation
//!
//! - Conservation: Σ allocation == 0, Σ cb_after == Σ cb_before
//! - No-worse-off: deficit members never end below cb_before
//! - No-surplus-to-deficit: surplus members never end negative
//! - Deficits closed whenever the pool sum is non-negative
//! - At most N − 1 transfers

use cb_ledger::store::BalanceStore;
use cb_ledger::{ComplianceLedger, ComplianceRecord, MemoryStore, ShipId};
use cb_pooling::{
    allocate, check_invariants, Config, CreatePool, Error, PoolMemberInput, PoolOrchestrator,
};
use proptest::prelude::*;
use rust_decimal::Decimal;
use std::sync::Arc;

/// Strategy for balances of either sign (two decimal places)
fn cb_strategy() -> impl Strategy<Value = Decimal> {
    (-1_000_000_00i64..1_000_000_00i64).prop_map(|cents| Decimal::new(cents, 2))
}

/// Strategy for member lists with distinct ship ids
fn members_strategy(max: usize) -> impl Strategy<Value = Vec<PoolMemberInput>> {
    prop::collection::vec(cb_strategy(), 1..max).prop_map(|cbs| {
        cbs.into_iter()
            .enumerate()
            .map(|(i, cb)| PoolMemberInput::new(format!("S{}", i), cb))
            .collect()
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// Property: Allocation conserves the pool
    #[test]
    fn prop_allocation_conserves(members in members_strategy(20)) {
        let outcome = allocate(&members);

        let allocated: Decimal = outcome.members.iter().map(|m| m.allocation).sum();
        let before: Decimal = members.iter().map(|m| m.cb_before).sum();
        let after: Decimal = outcome.members.iter().map(|m| m.cb_after).sum();

        prop_assert_eq!(allocated, Decimal::ZERO);
        prop_assert_eq!(before, after);
        prop_assert_eq!(outcome.members.len(), members.len());
    }

    /// Property: Pooling rules hold for every member
    #[test]
    fn prop_pooling_rules(members in members_strategy(20)) {
        let outcome = allocate(&members);

        for m in &outcome.members {
            if m.cb_before < Decimal::ZERO {
                prop_assert!(m.cb_after >= m.cb_before);
            }
            if m.cb_before > Decimal::ZERO {
                prop_assert!(m.cb_after >= Decimal::ZERO);
            }
            prop_assert_eq!(m.cb_after - m.cb_before, m.allocation);
        }
        prop_assert!(check_invariants(&outcome.members).is_ok());
    }

    /// Property: Output is sorted by cb_before descending
    #[test]
    fn prop_sorted_descending(members in members_strategy(20)) {
        let outcome = allocate(&members);
        for pair in outcome.members.windows(2) {
            prop_assert!(pair[0].cb_before >= pair[1].cb_before);
        }
    }

    /// Property: Non-negative pools close every deficit
    #[test]
    fn prop_deficits_closed(members in members_strategy(20)) {
        let sum: Decimal = members.iter().map(|m| m.cb_before).sum();
        prop_assume!(sum >= Decimal::ZERO);

        let outcome = allocate(&members);
        prop_assert!(outcome.members.iter().all(|m| m.cb_after >= Decimal::ZERO));
    }

    /// Property: Transfers are few, positive and reproduce the allocations
    #[test]
    fn prop_transfers(members in members_strategy(20)) {
        let outcome = allocate(&members);

        prop_assert!(outcome.transfers.len() < members.len().max(1));
        for transfer in &outcome.transfers {
            prop_assert!(transfer.amount > Decimal::ZERO);
            prop_assert_ne!(&transfer.from, &transfer.to);
        }

        let given: Decimal = outcome.transfers.iter().map(|t| t.amount).sum();
        let received: Decimal = outcome
            .members
            .iter()
            .map(|m| m.allocation)
            .filter(|a| *a > Decimal::ZERO)
            .sum();
        prop_assert_eq!(given, received);
    }

    /// Property: Created pools persist exactly the allocation, rejected pools nothing
    #[test]
    fn prop_create_pool_persists_allocation(members in members_strategy(8)) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let store = Arc::new(MemoryStore::new());
            for m in &members {
                store
                    .save_balance(ComplianceRecord::new(m.ship_id.clone(), 2024, m.cb_before, None))
                    .await
                    .unwrap();
            }
            let ledger = Arc::new(ComplianceLedger::new(store.clone(), Default::default()));
            let orchestrator = PoolOrchestrator::new(ledger, Config::default());

            let request = CreatePool { year: 2024, members: members.clone() };
            let sum = request.pool_sum().unwrap();

            match orchestrator.create_pool(request).await {
                Ok(result) => {
                    prop_assert!(sum >= Decimal::ZERO);
                    prop_assert_eq!(result.pool_sum, sum);
                    prop_assert_eq!(result.total_surplus + result.total_deficit, sum);
                    for member in &result.members {
                        let stored = store.get_balance(&member.ship_id, 2024).await.unwrap().unwrap();
                        prop_assert_eq!(stored.cb, member.cb_after);
                    }
                    prop_assert_eq!(store.pool_count(), 1);
                }
                Err(Error::Rejected { .. }) => {
                    prop_assert!(sum < Decimal::ZERO);
                    prop_assert_eq!(store.pool_count(), 0);
                    for m in &members {
                        let stored = store.get_balance(&m.ship_id, 2024).await.unwrap().unwrap();
                        prop_assert_eq!(stored.cb, m.cb_before);
                    }
                }
                Err(other) => prop_assert!(false, "unexpected error: {}", other),
            }
            Ok(())
        })?;
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_overlapping_pools_serialize() {
    let store = Arc::new(MemoryStore::new());
    for (ship, cb) in [("A", 100), ("B", -30), ("C", -40), ("D", -20)] {
        store
            .save_balance(ComplianceRecord::new(ShipId::new(ship), 2024, Decimal::from(cb), None))
            .await
            .unwrap();
    }
    let ledger = Arc::new(ComplianceLedger::new(store.clone(), Default::default()));
    let orchestrator = Arc::new(PoolOrchestrator::new(
        ledger,
        Config {
            snapshot_policy: cb_pooling::SnapshotPolicy::UseLive,
            ..Config::default()
        },
    ));

    // Both pools draw on A; ship locks order them
    let first = {
        let orchestrator = orchestrator.clone();
        tokio::spawn(async move {
            orchestrator
                .create_pool(CreatePool {
                    year: 2024,
                    members: vec![
                        PoolMemberInput::new("A", Decimal::from(100)),
                        PoolMemberInput::new("B", Decimal::from(-30)),
                        PoolMemberInput::new("C", Decimal::from(-40)),
                    ],
                })
                .await
        })
    };
    let second = {
        let orchestrator = orchestrator.clone();
        tokio::spawn(async move {
            orchestrator
                .create_pool(CreatePool {
                    year: 2024,
                    members: vec![
                        PoolMemberInput::new("D", Decimal::from(-20)),
                        PoolMemberInput::new("A", Decimal::from(100)),
                    ],
                })
                .await
        })
    };

    assert!(first.await.unwrap().is_ok());
    assert!(second.await.unwrap().is_ok());

    // A gave 70 and 20 in some order
    let a = store.get_balance(&ShipId::new("A"), 2024).await.unwrap().unwrap();
    assert_eq!(a.cb, Decimal::from(10));
    assert_eq!(store.pool_count(), 2);
}
