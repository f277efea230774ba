//! Main ledger orchestration layer
//!
//! This module ties together the store, the calculator, the banking rules and
//! the per-ship locks into a high-level API for compliance balances.
//!
//! # Example
//!
//! ```no_run
//! use cb_ledger::{ApplyBanked, BankSurplus, ComplianceLedger, Config, MemoryStore, ShipId};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> cb_ledger::Result<()> {
//!     let ledger = ComplianceLedger::new(Arc::new(MemoryStore::new()), Config::default());
//!     let ship = ShipId::new("R002");
//!
//!     let balance = ledger.compute_balance(&ship, 2024).await?;
//!     if balance.is_surplus {
//!         ledger
//!             .bank_surplus(BankSurplus {
//!                 ship_id: ship.clone(),
//!                 year: 2024,
//!                 amount_gco2eq: balance.cb,
//!             })
//!             .await?;
//!     }
//!
//!     // later, against a deficit year
//!     // ledger.apply_banked(ApplyBanked { .. }).await?;
//!     Ok(())
//! }
//! ```

use crate::{
    banking::{self, ApplyBanked, BankSurplus, BankingResult},
    calculator::ComplianceCalculator,
    comparison::{self, ComparisonResult},
    locks::{ShipGuard, ShipLocks},
    metrics::Metrics,
    store::{LedgerBatch, LedgerStore},
    types::{
        AdjustedBalance, BankEntry, BankRecords, ComplianceBalance,
        ComplianceRecord, FuelRecord, Pool, PoolId, PoolMember, RouteFilter, ShipId, Year,
    },
    Config, Error, Result,
};
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

/// Compliance ledger over a store
pub struct ComplianceLedger<S> {
    /// Persistence
    store: Arc<S>,

    /// Balance formula with injected constants
    calculator: ComplianceCalculator,

    /// One async mutex per ship
    locks: ShipLocks,

    /// Optional metrics
    metrics: Option<Metrics>,

    /// Configuration
    config: Config,
}

impl<S: LedgerStore> ComplianceLedger<S> {
    /// Create ledger over a store
    pub fn new(store: Arc<S>, config: Config) -> Self {
        Self {
            store,
            calculator: ComplianceCalculator::new(config.regulatory),
            locks: ShipLocks::new(),
            metrics: None,
            config,
        }
    }

    /// Attach metrics
    pub fn with_metrics(mut self, metrics: Metrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Underlying store
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Calculator in use
    pub fn calculator(&self) -> &ComplianceCalculator {
        &self.calculator
    }

    /// Configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Metrics, if attached
    pub fn metrics(&self) -> Option<&Metrics> {
        self.metrics.as_ref()
    }

    /// Lock a set of ships for a multi-ship operation
    pub async fn lock_ships<I>(&self, ships: I) -> ShipGuard
    where
        I: IntoIterator<Item = ShipId>,
    {
        self.locks.acquire(ships).await
    }

    /// Compute and persist the balance of a ship-year from its fuel record
    ///
    /// Overwrites any stored balance for the ship-year.
    pub async fn compute_balance(&self, ship_id: &ShipId, year: Year) -> Result<ComplianceBalance> {
        let started = Instant::now();
        let guard = self.locks.acquire([ship_id.clone()]).await;

        let record = self.compute_locked(&guard, ship_id, year).await?;

        self.observe("compute", started);
        Ok(record.balance())
    }

    /// Stored balance, computed on first access
    pub async fn balance(&self, ship_id: &ShipId, year: Year) -> Result<ComplianceBalance> {
        if let Some(record) = self.store.get_balance(ship_id, year).await? {
            return Ok(record.balance());
        }

        let guard = self.locks.acquire([ship_id.clone()]).await;
        Ok(self.record_locked(&guard, ship_id, year).await?.balance())
    }

    /// Stored record for a ship the caller has locked, computed if absent
    pub async fn record_locked(
        &self,
        guard: &ShipGuard,
        ship_id: &ShipId,
        year: Year,
    ) -> Result<ComplianceRecord> {
        guard.ensure_covers([ship_id])?;

        match self.store.get_balance(ship_id, year).await? {
            Some(record) => Ok(record),
            None => self.compute_locked(guard, ship_id, year).await,
        }
    }

    /// Stored record for a ship the caller has locked, calculated if absent
    ///
    /// Writes nothing. A calculated record only lands in the store if the
    /// caller commits it.
    pub async fn snapshot_locked(
        &self,
        guard: &ShipGuard,
        ship_id: &ShipId,
        year: Year,
    ) -> Result<ComplianceRecord> {
        guard.ensure_covers([ship_id])?;

        match self.store.get_balance(ship_id, year).await? {
            Some(record) => Ok(record),
            None => self.calculate(ship_id, year).await,
        }
    }

    /// Balance plus the ship's available banked surplus
    pub async fn adjusted_balance(&self, ship_id: &ShipId, year: Year) -> Result<AdjustedBalance> {
        let balance = self.balance(ship_id, year).await?;
        let available_banked = self.store.sum_remaining_by_ship(ship_id).await?;

        Ok(AdjustedBalance {
            balance,
            available_banked,
        })
    }

    /// Bank part of a positive balance
    ///
    /// Business-rule failures come back as `Ok` with `success == false`.
    /// A missing balance is an error.
    pub async fn bank_surplus(&self, request: BankSurplus) -> Result<BankingResult> {
        let started = Instant::now();
        let BankSurplus {
            ship_id,
            year,
            amount_gco2eq: amount,
        } = request;

        let guard = self.locks.acquire([ship_id.clone()]).await;
        let record = self
            .store
            .get_balance(&ship_id, year)
            .await?
            .ok_or_else(|| Error::BalanceNotFound {
                ship_id: ship_id.clone(),
                year,
            })?;

        if let Err(rejection) = banking::check_bank(record.cb, amount) {
            tracing::warn!(
                ship_id = %ship_id,
                year,
                cb = %record.cb,
                amount = %amount,
                reason = %rejection,
                "Bank rejected"
            );
            self.reject("bank");
            return Ok(BankingResult::rejected(record.cb, rejection));
        }

        let cb_before = record.cb;
        let cb_after = cb_before - amount;
        let entry = BankEntry::new(ship_id.clone(), year, amount);

        let mut batch = LedgerBatch::new();
        batch
            .put_entry(entry.clone())
            .put_balance(record.with_cb(cb_after));
        self.commit(&guard, batch).await?;

        tracing::info!(
            ship_id = %ship_id,
            year,
            entry_id = %entry.id,
            amount = %amount,
            cb_before = %cb_before,
            cb_after = %cb_after,
            "Surplus banked"
        );
        if let Some(metrics) = &self.metrics {
            metrics.record_banked(amount);
        }
        self.observe("bank", started);

        Ok(BankingResult::accepted(
            cb_before,
            amount,
            cb_after,
            format!("Banked {} gCO2e from {}", amount, year),
        ))
    }

    /// Apply banked surplus to a ship-year, oldest entries first
    ///
    /// Business-rule failures come back as `Ok` with `success == false`.
    /// A missing balance is an error.
    pub async fn apply_banked(&self, request: ApplyBanked) -> Result<BankingResult> {
        let started = Instant::now();
        let ApplyBanked {
            ship_id,
            deficit_year: year,
            amount_gco2eq: amount,
        } = request;

        let guard = self.locks.acquire([ship_id.clone()]).await;
        let record = self
            .store
            .get_balance(&ship_id, year)
            .await?
            .ok_or_else(|| Error::BalanceNotFound {
                ship_id: ship_id.clone(),
                year,
            })?;
        let available = self.store.sum_remaining_by_ship(&ship_id).await?;

        let checked = banking::check_apply(available, amount)
            .and_then(|()| banking::applied_balance(record.cb, amount));
        let cb_after = match checked {
            Ok(cb_after) => cb_after,
            Err(rejection) => {
                tracing::warn!(
                    ship_id = %ship_id,
                    year,
                    available = %available,
                    amount = %amount,
                    reason = %rejection,
                    "Apply rejected"
                );
                self.reject("apply");
                return Ok(BankingResult::rejected(record.cb, rejection));
            }
        };

        let entries = self.store.list_entries_by_ship(&ship_id).await?;
        let debits = banking::fifo_debit(&entries, amount);
        let debited = banking::total_debited(&debits);
        if debited != amount {
            return Err(Error::InvariantViolation(format!(
                "FIFO debit covered {} of {} for ship {} (available {})",
                debited, amount, ship_id, available
            )));
        }

        tracing::debug!(
            ship_id = %ship_id,
            entries = debits.len(),
            "FIFO debit planned"
        );

        let cb_before = record.cb;

        let mut batch = LedgerBatch::new();
        for debit in &debits {
            batch.set_remaining(debit.entry_id, debit.ship_id.clone(), debit.remaining);
        }
        batch.put_balance(record.with_cb(cb_after));
        self.commit(&guard, batch).await?;

        tracing::info!(
            ship_id = %ship_id,
            year,
            amount = %amount,
            cb_before = %cb_before,
            cb_after = %cb_after,
            "Banked surplus applied"
        );
        if let Some(metrics) = &self.metrics {
            metrics.record_applied(amount);
        }
        self.observe("apply", started);

        Ok(BankingResult::accepted(
            cb_before,
            amount,
            cb_after,
            format!("Applied {} gCO2e to {}", amount, year),
        ))
    }

    /// Bank entries of a ship, oldest first, optionally for one banked year
    pub async fn bank_records(&self, ship_id: &ShipId, year: Option<Year>) -> Result<BankRecords> {
        let records = match year {
            Some(year) => self.store.list_entries_by_ship_and_year(ship_id, year).await?,
            None => self.store.list_entries_by_ship(ship_id).await?,
        };
        let total_available = self.store.sum_remaining_by_ship(ship_id).await?;

        Ok(BankRecords {
            records,
            total_available,
        })
    }

    /// Fuel records matching a filter
    pub async fn routes(&self, filter: &RouteFilter) -> Result<Vec<FuelRecord>> {
        self.store.list_fuel_records(filter).await
    }

    /// Make a ship's record the comparison baseline
    pub async fn set_baseline(&self, ship_id: &ShipId) -> Result<FuelRecord> {
        let baseline = self.store.set_baseline(ship_id).await?;
        tracing::info!(ship_id = %ship_id, "Baseline set");
        Ok(baseline)
    }

    /// Compare every record against the baseline and the configured target
    pub async fn compare_routes(&self) -> Result<ComparisonResult> {
        let baseline = self
            .store
            .find_baseline()
            .await?
            .ok_or(Error::BaselineNotFound)?;
        let records = self.store.list_fuel_records(&RouteFilter::default()).await?;

        Ok(comparison::compare_routes(
            &baseline,
            &records,
            self.calculator.regulatory().target_intensity,
        ))
    }

    /// Pools created for a year
    pub async fn pools_by_year(&self, year: Year) -> Result<Vec<Pool>> {
        self.store.list_pools_by_year(year).await
    }

    /// Members of a pool
    pub async fn pool_members(&self, pool_id: PoolId) -> Result<Vec<PoolMember>> {
        self.store.list_members(pool_id).await
    }

    /// Commit a batch touching only ships the guard holds
    pub async fn commit(&self, guard: &ShipGuard, batch: LedgerBatch) -> Result<()> {
        guard.ensure_covers(batch.ships())?;
        self.store.commit(batch).await
    }

    /// Count a mutating operation and its latency
    pub fn observe(&self, operation: &str, started: Instant) {
        if let Some(metrics) = &self.metrics {
            metrics.record_operation(operation, started.elapsed().as_secs_f64());
        }
    }

    /// Count a soft rejection
    pub fn reject(&self, operation: &str) {
        if let Some(metrics) = &self.metrics {
            metrics.record_rejection(operation);
        }
    }

    async fn calculate(&self, ship_id: &ShipId, year: Year) -> Result<ComplianceRecord> {
        let fuel = self
            .store
            .find_fuel_record(ship_id)
            .await?
            .ok_or_else(|| Error::FuelRecordNotFound(ship_id.clone()))?;

        self.calculator.compute(ship_id, year, &fuel)
    }

    async fn compute_locked(
        &self,
        guard: &ShipGuard,
        ship_id: &ShipId,
        year: Year,
    ) -> Result<ComplianceRecord> {
        let record = self.calculate(ship_id, year).await?;

        let mut batch = LedgerBatch::new();
        batch.put_balance(record.clone());
        self.commit(guard, batch).await?;

        tracing::info!(
            ship_id = %ship_id,
            year,
            cb = %record.cb,
            "Compliance balance computed"
        );
        Ok(record)
    }
}

impl<S> fmt::Debug for ComplianceLedger<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComplianceLedger")
            .field("calculator", &self.calculator)
            .field("locked_ships", &self.locks.len())
            .field("metrics", &self.metrics.is_some())
            .finish_non_exhaustive()
    }
}
