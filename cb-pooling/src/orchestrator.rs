//! Pool creation
//!
//! Drives a request through `Validating → Allocating → Persisting → Done`.
//! A request can end early in `Rejected` (validation) or `InvariantViolated`
//! (allocation); neither writes anything.
//!
//! Member balances are read while holding every member's ship lock, and the
//! pool, its members and the updated balances are committed in one batch
//! under the same locks. A member without a stored balance is calculated
//! from its fuel record; that balance is only written as part of the pool
//! batch.

use crate::{
    allocator,
    config::{Config, SnapshotPolicy},
    types::{CreatePool, PoolMemberInput, PoolResult, PoolState, PoolValidation},
    Error, Result,
};
use cb_ledger::{
    ComplianceLedger, ComplianceRecord, LedgerBatch, LedgerStore, Pool, PoolId, PoolMember,
    ShipId, Year,
};
use rust_decimal::Decimal;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

/// Creates pools against a ledger
pub struct PoolOrchestrator<S> {
    /// Ledger holding the balances
    ledger: Arc<ComplianceLedger<S>>,

    /// Configuration
    config: Config,
}

impl<S: LedgerStore> PoolOrchestrator<S> {
    /// Create orchestrator
    pub fn new(ledger: Arc<ComplianceLedger<S>>, config: Config) -> Self {
        Self { ledger, config }
    }

    /// Ledger in use
    pub fn ledger(&self) -> &Arc<ComplianceLedger<S>> {
        &self.ledger
    }

    /// Configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Check a request without touching the ledger
    pub fn validate(&self, request: &CreatePool) -> PoolValidation {
        let mut errors = Vec::new();
        let pool_sum = request.pool_sum();

        if request.members.is_empty() {
            errors.push("Pool has no members".to_string());
        }

        if request.members.len() > self.config.max_members {
            errors.push(format!(
                "Pool has {} members, maximum is {}",
                request.members.len(),
                self.config.max_members
            ));
        }

        let mut seen = HashSet::new();
        for member in &request.members {
            if !seen.insert(&member.ship_id) {
                errors.push(format!("Ship {} appears more than once", member.ship_id));
            }
        }

        match pool_sum {
            Some(sum) if sum < Decimal::ZERO => errors.push(
                "Pool sum is negative. Total deficits exceed total surplus.".to_string(),
            ),
            Some(_) => {}
            None => errors.push("Pool balances overflow the supported range".to_string()),
        }

        PoolValidation {
            is_valid: errors.is_empty(),
            errors,
            pool_sum,
        }
    }

    /// Validate, allocate and persist a pool
    pub async fn create_pool(&self, request: CreatePool) -> Result<PoolResult> {
        let started = Instant::now();
        let year = request.year;
        let mut state = PoolState::Validating;

        self.check_valid(&request, &mut state)?;

        let guard = self
            .ledger
            .lock_ships(request.members.iter().map(|m| m.ship_id.clone()))
            .await;

        // Snapshot under lock
        let mut records: HashMap<ShipId, ComplianceRecord> = HashMap::new();
        let mut members = Vec::with_capacity(request.members.len());
        for member in &request.members {
            let record = self
                .ledger
                .snapshot_locked(&guard, &member.ship_id, year)
                .await?;

            match self.config.snapshot_policy {
                SnapshotPolicy::RejectStale => {
                    if record.cb != member.cb_before {
                        tracing::warn!(
                            ship_id = %member.ship_id,
                            year,
                            supplied = %member.cb_before,
                            live = %record.cb,
                            "Pool rejected on stale balance"
                        );
                        self.advance(&mut state, PoolState::Rejected);
                        self.ledger.reject("pool");
                        return Err(Error::StaleSnapshot {
                            ship_id: member.ship_id.clone(),
                            supplied: member.cb_before,
                            live: record.cb,
                        });
                    }
                    members.push(member.clone());
                }
                SnapshotPolicy::UseLive => members.push(PoolMemberInput {
                    ship_id: member.ship_id.clone(),
                    cb_before: record.cb,
                }),
            }

            records.insert(member.ship_id.clone(), record);
        }

        let request = CreatePool { year, members };
        if self.config.snapshot_policy == SnapshotPolicy::UseLive {
            self.check_valid(&request, &mut state)?;
        }
        let (total_surplus, total_deficit, pool_sum) = pool_totals(&request)?;

        self.advance(&mut state, PoolState::Allocating);
        let outcome = allocator::allocate(&request.members);
        if let Err(e) = allocator::check_invariants(&outcome.members) {
            tracing::error!(year, error = %e, "Pool allocation broke an invariant");
            self.advance(&mut state, PoolState::InvariantViolated);
            return Err(e);
        }

        self.advance(&mut state, PoolState::Persisting);
        let pool = Pool::new(year);
        let pool_members: Vec<PoolMember> = outcome
            .members
            .iter()
            .map(|a| PoolMember {
                pool_id: pool.id,
                ship_id: a.ship_id.clone(),
                cb_before: a.cb_before,
                cb_after: a.cb_after,
                allocation: a.allocation,
            })
            .collect();

        let mut batch = LedgerBatch::new();
        batch.put_pool(pool.clone(), pool_members.clone());
        for allocation in &outcome.members {
            let record = records.get(&allocation.ship_id).ok_or_else(|| {
                Error::InvariantViolation(format!(
                    "no snapshot for pooled ship {}",
                    allocation.ship_id
                ))
            })?;
            batch.put_balance(record.with_cb(allocation.cb_after));
        }
        self.ledger.commit(&guard, batch).await?;
        drop(guard);

        self.advance(&mut state, PoolState::Done);


        tracing::info!(
            pool_id = %pool.id,
            year,
            members = pool_members.len(),
            transfers = outcome.transfers.len(),
            pool_sum = %pool_sum,
            "Pool created"
        );
        if let Some(metrics) = self.ledger.metrics() {
            metrics.record_pool_created();
        }
        self.ledger.observe("pool", started);

        Ok(PoolResult {
            pool_id: pool.id,
            year,
            members: pool_members,
            transfers: outcome.transfers,
            total_surplus,
            total_deficit,
            pool_sum,
        })
    }

    /// Pools created for a year
    pub async fn pools_by_year(&self, year: Year) -> Result<Vec<Pool>> {
        Ok(self.ledger.pools_by_year(year).await?)
    }

    /// Members of a pool
    pub async fn pool_members(&self, pool_id: PoolId) -> Result<Vec<PoolMember>> {
        Ok(self.ledger.pool_members(pool_id).await?)
    }

    fn check_valid(&self, request: &CreatePool, state: &mut PoolState) -> Result<()> {
        let validation = self.validate(request);
        if validation.is_valid {
            return Ok(());
        }

        tracing::warn!(
            year = request.year,
            pool_sum = ?validation.pool_sum,
            errors = ?validation.errors,
            "Pool rejected"
        );
        self.advance(state, PoolState::Rejected);
        self.ledger.reject("pool");

        Err(Error::Rejected {
            year: request.year,
            errors: validation.errors,
        })
    }

    fn advance(&self, state: &mut PoolState, next: PoolState) {
        debug_assert!(
            state.can_transition_to(next),
            "invalid pool transition {} -> {}",
            state,
            next
        );
        tracing::debug!(from = %state, to = %next, "Pool state");
        *state = next;
    }
}

impl<S> fmt::Debug for PoolOrchestrator<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PoolOrchestrator")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// (Σ surplus, Σ deficit, Σ cb_before) of a validated request
fn pool_totals(request: &CreatePool) -> Result<(Decimal, Decimal, Decimal)> {
    match (
        request.total_surplus(),
        request.total_deficit(),
        request.pool_sum(),
    ) {
        (Some(surplus), Some(deficit), Some(sum)) => Ok((surplus, deficit, sum)),
        _ => Err(Error::InvariantViolation(format!(
            "pool totals for {} overflow after validation",
            request.year
        ))),
    }
}
