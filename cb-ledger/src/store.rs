//! Store contracts consumed by the ledger
//!
//! The ledger never talks to a database directly. It reads and writes
//! balances, bank entries, pools and fuel records through these traits, and
//! groups the writes of one logical operation into a [`LedgerBatch`] that the
//! store must apply all-or-nothing.
//!
//! Two implementations ship with the crate:
//! - [`crate::memory::MemoryStore`] for tests and embedding
//! - [`crate::storage::RocksStore`] for durable single-node deployments

use crate::{
    types::{
        BankEntry, ComplianceRecord, EntryId, FuelRecord, Pool, PoolId, PoolMember, RouteFilter,
        ShipId, Year,
    },
    Result,
};
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::collections::BTreeSet;

/// Compliance balance persistence, one record per (ship, year)
#[async_trait]
pub trait BalanceStore: Send + Sync {
    /// Fetch the record for a ship-year
    async fn get_balance(&self, ship_id: &ShipId, year: Year) -> Result<Option<ComplianceRecord>>;

    /// Upsert by (ship, year)
    async fn save_balance(&self, record: ComplianceRecord) -> Result<ComplianceRecord>;
}

/// Append-only bank ledger
#[async_trait]
pub trait BankStore: Send + Sync {
    /// All entries of a ship, oldest first
    async fn list_entries_by_ship(&self, ship_id: &ShipId) -> Result<Vec<BankEntry>>;

    /// Entries banked from one year, oldest first
    async fn list_entries_by_ship_and_year(
        &self,
        ship_id: &ShipId,
        year: Year,
    ) -> Result<Vec<BankEntry>>;

    /// Σ remaining over all of the ship's entries
    async fn sum_remaining_by_ship(&self, ship_id: &ShipId) -> Result<Decimal>;

    /// Append a new entry with the full amount remaining
    async fn create_entry(&self, ship_id: &ShipId, year: Year, amount: Decimal)
        -> Result<BankEntry>;

    /// Lower the remaining amount of an entry
    async fn set_remaining(&self, entry_id: EntryId, remaining: Decimal) -> Result<()>;
}

/// Pool persistence
#[async_trait]
pub trait PoolStore: Send + Sync {
    /// Create an empty pool
    async fn create_pool(&self, year: Year) -> Result<Pool>;

    /// Attach members to a pool, stamping the pool id on each
    async fn add_members(&self, pool_id: PoolId, members: Vec<PoolMember>)
        -> Result<Vec<PoolMember>>;

    /// Pools of a year, oldest first
    async fn list_pools_by_year(&self, year: Year) -> Result<Vec<Pool>>;

    /// Members in allocation order
    async fn list_members(&self, pool_id: PoolId) -> Result<Vec<PoolMember>>;
}

/// Source-of-truth fuel/intensity records
#[async_trait]
pub trait FuelRecordStore: Send + Sync {
    /// Record for a ship
    async fn find_fuel_record(&self, ship_id: &ShipId) -> Result<Option<FuelRecord>>;

    /// Records matching a filter, ordered by ship id
    async fn list_fuel_records(&self, filter: &RouteFilter) -> Result<Vec<FuelRecord>>;

    /// The baseline record, if one is flagged
    async fn find_baseline(&self) -> Result<Option<FuelRecord>>;

    /// Insert or replace a record
    async fn put_fuel_record(&self, record: FuelRecord) -> Result<()>;

    /// Flag one record as baseline and clear the flag everywhere else
    async fn set_baseline(&self, ship_id: &ShipId) -> Result<FuelRecord>;
}

/// Everything the ledger needs, plus atomic multi-write
#[async_trait]
pub trait LedgerStore: BalanceStore + BankStore + PoolStore + FuelRecordStore {
    /// Apply every operation of the batch, or none of them
    async fn commit(&self, batch: LedgerBatch) -> Result<()>;
}

/// Single write inside a [`LedgerBatch`]
#[derive(Debug, Clone, PartialEq)]
pub enum WriteOp {
    /// Upsert a balance
    PutBalance(ComplianceRecord),

    /// Append a new bank entry
    PutEntry(BankEntry),

    /// Debit a bank entry
    SetRemaining {
        /// Entry
        entry_id: EntryId,
        /// Owner, used for lock coverage checks
        ship_id: ShipId,
        /// New remaining amount
        remaining: Decimal,
    },

    /// Create a pool with its members
    PutPool {
        /// Pool header
        pool: Pool,
        /// Members, allocation order
        members: Vec<PoolMember>,
    },
}

/// Ordered set of writes committed atomically
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LedgerBatch {
    ops: Vec<WriteOp>,
}

impl LedgerBatch {
    /// Empty batch
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a balance upsert
    pub fn put_balance(&mut self, record: ComplianceRecord) -> &mut Self {
        self.ops.push(WriteOp::PutBalance(record));
        self
    }

    /// Add a bank entry
    pub fn put_entry(&mut self, entry: BankEntry) -> &mut Self {
        self.ops.push(WriteOp::PutEntry(entry));
        self
    }

    /// Add a debit
    pub fn set_remaining(
        &mut self,
        entry_id: EntryId,
        ship_id: ShipId,
        remaining: Decimal,
    ) -> &mut Self {
        self.ops.push(WriteOp::SetRemaining {
            entry_id,
            ship_id,
            remaining,
        });
        self
    }

    /// Add a pool
    pub fn put_pool(&mut self, pool: Pool, members: Vec<PoolMember>) -> &mut Self {
        self.ops.push(WriteOp::PutPool { pool, members });
        self
    }

    /// Operations in insertion order
    pub fn ops(&self) -> &[WriteOp] {
        &self.ops
    }

    /// Consume into operations
    pub fn into_ops(self) -> Vec<WriteOp> {
        self.ops
    }

    /// Number of operations
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    /// No operations
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Every ship whose state the batch touches
    pub fn ships(&self) -> BTreeSet<&ShipId> {
        let mut ships = BTreeSet::new();
        for op in &self.ops {
            match op {
                WriteOp::PutBalance(record) => {
                    ships.insert(&record.ship_id);
                }
                WriteOp::PutEntry(entry) => {
                    ships.insert(&entry.ship_id);
                }
                WriteOp::SetRemaining { ship_id, .. } => {
                    ships.insert(ship_id);
                }
                WriteOp::PutPool { members, .. } => {
                    ships.extend(members.iter().map(|m| &m.ship_id));
                }
            }
        }
        ships
    }
}

/// Sort entries by creation time. Stable, so ties keep store order.
pub fn sort_fifo(entries: &mut [BankEntry]) {
    entries.sort_by(|a, b| a.created_at.cmp(&b.created_at));
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_batch_ships() {
        let a = ShipId::new("A");
        let b = ShipId::new("B");
        let entry = BankEntry::new(a.clone(), 2024, dec!(10));

        let mut batch = LedgerBatch::new();
        batch
            .put_entry(entry.clone())
            .set_remaining(entry.id, a.clone(), dec!(5))
            .put_balance(ComplianceRecord::new(b.clone(), 2024, dec!(1), None));

        assert_eq!(batch.len(), 3);
        let ships: Vec<_> = batch.ships().into_iter().cloned().collect();
        assert_eq!(ships, vec![a, b]);
    }

    #[test]
    fn test_sort_fifo() {
        let ship = ShipId::new("A");
        let mut older = BankEntry::new(ship.clone(), 2023, dec!(1));
        let newer = BankEntry::new(ship, 2024, dec!(2));
        older.created_at = newer.created_at - chrono::Duration::seconds(5);

        let mut entries = vec![newer.clone(), older.clone()];
        sort_fifo(&mut entries);
        assert_eq!(entries[0].id, older.id);
        assert_eq!(entries[1].id, newer.id);
    }
}
