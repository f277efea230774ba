//! In-memory store
//!
//! All state lives behind one `RwLock`. A commit validates the whole batch
//! against the current state first and only then applies it, so a rejected
//! batch leaves nothing behind.

use crate::{
    store::{sort_fifo, BalanceStore, BankStore, FuelRecordStore, LedgerBatch, LedgerStore, PoolStore, WriteOp},
    types::{
        checked_sum, BankEntry, ComplianceRecord, EntryId, FuelRecord, Pool, PoolId, PoolMember, RouteFilter,
        ShipId, Year,
    },
    Error, Result,
};
use async_trait::async_trait;
use parking_lot::RwLock;
use rust_decimal::Decimal;
use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Default)]
struct State {
    balances: HashMap<(ShipId, Year), ComplianceRecord>,
    entries: Vec<BankEntry>,
    entry_index: HashMap<EntryId, usize>,
    pools: Vec<Pool>,
    members: HashMap<PoolId, Vec<PoolMember>>,
    fuel_records: BTreeMap<ShipId, FuelRecord>,
}

impl State {
    fn entry(&self, id: &EntryId) -> Option<&BankEntry> {
        self.entry_index.get(id).map(|&i| &self.entries[i])
    }

    fn has_pool(&self, id: &PoolId) -> bool {
        self.members.contains_key(id)
    }

    /// Dry-run the batch. Debits are checked against the entry as it will
    /// look after the earlier operations of the same batch.
    fn validate(&self, ops: &[WriteOp]) -> Result<()> {
        let mut pending: HashMap<EntryId, BankEntry> = HashMap::new();

        for op in ops {
            match op {
                WriteOp::PutBalance(_) => {}
                WriteOp::PutEntry(entry) => {
                    if self.entry(&entry.id).is_some() || pending.contains_key(&entry.id) {
                        return Err(Error::InvariantViolation(format!(
                            "bank entry {} already exists",
                            entry.id
                        )));
                    }
                    entry.check_remaining(entry.remaining_gco2eq)?;
                    pending.insert(entry.id, entry.clone());
                }
                WriteOp::SetRemaining {
                    entry_id,
                    ship_id,
                    remaining,
                } => {
                    let mut current = pending
                        .get(entry_id)
                        .or_else(|| self.entry(entry_id))
                        .cloned()
                        .ok_or_else(|| Error::EntryNotFound(entry_id.to_string()))?;
                    if &current.ship_id != ship_id {
                        return Err(Error::InvariantViolation(format!(
                            "bank entry {} belongs to {}, not {}",
                            entry_id, current.ship_id, ship_id
                        )));
                    }
                    current.check_remaining(*remaining)?;
                    current.remaining_gco2eq = *remaining;
                    pending.insert(*entry_id, current);
                }
                WriteOp::PutPool { pool, .. } => {
                    if self.has_pool(&pool.id) {
                        return Err(Error::InvariantViolation(format!(
                            "pool {} already exists",
                            pool.id
                        )));
                    }
                }
            }
        }

        Ok(())
    }

    fn apply(&mut self, ops: Vec<WriteOp>) {
        for op in ops {
            match op {
                WriteOp::PutBalance(record) => {
                    self.balances
                        .insert((record.ship_id.clone(), record.year), record);
                }
                WriteOp::PutEntry(entry) => {
                    self.entry_index.insert(entry.id, self.entries.len());
                    self.entries.push(entry);
                }
                WriteOp::SetRemaining {
                    entry_id,
                    remaining,
                    ..
                } => {
                    if let Some(&i) = self.entry_index.get(&entry_id) {
                        self.entries[i].remaining_gco2eq = remaining;
                    }
                }
                WriteOp::PutPool { pool, mut members } => {
                    for member in &mut members {
                        member.pool_id = pool.id;
                    }
                    self.members.insert(pool.id, members);
                    self.pools.push(pool);
                }
            }
        }
    }

    fn commit(&mut self, ops: Vec<WriteOp>) -> Result<()> {
        self.validate(&ops)?;
        self.apply(ops);
        Ok(())
    }

    fn ship_entries(&self, ship_id: &ShipId) -> Vec<BankEntry> {
        let mut entries: Vec<BankEntry> = self
            .entries
            .iter()
            .filter(|e| &e.ship_id == ship_id)
            .cloned()
            .collect();
        sort_fifo(&mut entries);
        entries
    }
}

/// Store keeping everything in process memory
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: RwLock<State>,
}

impl MemoryStore {
    /// Empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Store seeded with fuel records
    pub fn with_fuel_records(records: impl IntoIterator<Item = FuelRecord>) -> Self {
        let store = Self::new();
        {
            let mut state = store.state.write();
            for record in records {
                state.fuel_records.insert(record.ship_id.clone(), record);
            }
        }
        store
    }

    /// Number of bank entries across all ships
    pub fn entry_count(&self) -> usize {
        self.state.read().entries.len()
    }

    /// Number of pools
    pub fn pool_count(&self) -> usize {
        self.state.read().pools.len()
    }
}

#[async_trait]
impl BalanceStore for MemoryStore {
    async fn get_balance(&self, ship_id: &ShipId, year: Year) -> Result<Option<ComplianceRecord>> {
        Ok(self
            .state
            .read()
            .balances
            .get(&(ship_id.clone(), year))
            .cloned())
    }

    async fn save_balance(&self, record: ComplianceRecord) -> Result<ComplianceRecord> {
        self.state
            .write()
            .commit(vec![WriteOp::PutBalance(record.clone())])?;
        Ok(record)
    }
}

#[async_trait]
impl BankStore for MemoryStore {
    async fn list_entries_by_ship(&self, ship_id: &ShipId) -> Result<Vec<BankEntry>> {
        Ok(self.state.read().ship_entries(ship_id))
    }

    async fn list_entries_by_ship_and_year(
        &self,
        ship_id: &ShipId,
        year: Year,
    ) -> Result<Vec<BankEntry>> {
        let mut entries = self.state.read().ship_entries(ship_id);
        entries.retain(|e| e.year == year);
        Ok(entries)
    }

    async fn sum_remaining_by_ship(&self, ship_id: &ShipId) -> Result<Decimal> {
        let total = checked_sum(
            self.state
                .read()
                .entries
                .iter()
                .filter(|e| &e.ship_id == ship_id)
                .map(|e| e.remaining_gco2eq),
        );
        total.ok_or_else(|| {
            Error::InvariantViolation(format!("banked total of ship {} overflows", ship_id))
        })
    }

    async fn create_entry(
        &self,
        ship_id: &ShipId,
        year: Year,
        amount: Decimal,
    ) -> Result<BankEntry> {
        let entry = BankEntry::new(ship_id.clone(), year, amount);
        self.state
            .write()
            .commit(vec![WriteOp::PutEntry(entry.clone())])?;
        Ok(entry)
    }

    async fn set_remaining(&self, entry_id: EntryId, remaining: Decimal) -> Result<()> {
        let mut state = self.state.write();
        let ship_id = state
            .entry(&entry_id)
            .map(|e| e.ship_id.clone())
            .ok_or_else(|| Error::EntryNotFound(entry_id.to_string()))?;
        state.commit(vec![WriteOp::SetRemaining {
            entry_id,
            ship_id,
            remaining,
        }])
    }
}

#[async_trait]
impl PoolStore for MemoryStore {
    async fn create_pool(&self, year: Year) -> Result<Pool> {
        let pool = Pool::new(year);
        self.state.write().commit(vec![WriteOp::PutPool {
            pool: pool.clone(),
            members: vec![],
        }])?;
        Ok(pool)
    }

    async fn add_members(
        &self,
        pool_id: PoolId,
        mut members: Vec<PoolMember>,
    ) -> Result<Vec<PoolMember>> {
        let mut state = self.state.write();
        let stored = state
            .members
            .get_mut(&pool_id)
            .ok_or_else(|| Error::PoolNotFound(pool_id.to_string()))?;
        for member in &mut members {
            member.pool_id = pool_id;
        }
        stored.extend(members.iter().cloned());
        Ok(members)
    }

    async fn list_pools_by_year(&self, year: Year) -> Result<Vec<Pool>> {
        Ok(self
            .state
            .read()
            .pools
            .iter()
            .filter(|p| p.year == year)
            .cloned()
            .collect())
    }

    async fn list_members(&self, pool_id: PoolId) -> Result<Vec<PoolMember>> {
        self.state
            .read()
            .members
            .get(&pool_id)
            .cloned()
            .ok_or_else(|| Error::PoolNotFound(pool_id.to_string()))
    }
}

#[async_trait]
impl FuelRecordStore for MemoryStore {
    async fn find_fuel_record(&self, ship_id: &ShipId) -> Result<Option<FuelRecord>> {
        Ok(self.state.read().fuel_records.get(ship_id).cloned())
    }

    async fn list_fuel_records(&self, filter: &RouteFilter) -> Result<Vec<FuelRecord>> {
        Ok(self
            .state
            .read()
            .fuel_records
            .values()
            .filter(|r| filter.matches(r))
            .cloned()
            .collect())
    }

    async fn find_baseline(&self) -> Result<Option<FuelRecord>> {
        Ok(self
            .state
            .read()
            .fuel_records
            .values()
            .find(|r| r.is_baseline)
            .cloned())
    }

    async fn put_fuel_record(&self, record: FuelRecord) -> Result<()> {
        self.state
            .write()
            .fuel_records
            .insert(record.ship_id.clone(), record);
        Ok(())
    }

    async fn set_baseline(&self, ship_id: &ShipId) -> Result<FuelRecord> {
        let mut state = self.state.write();
        if !state.fuel_records.contains_key(ship_id) {
            return Err(Error::FuelRecordNotFound(ship_id.clone()));
        }
        let mut baseline = None;
        for record in state.fuel_records.values_mut() {
            record.is_baseline = &record.ship_id == ship_id;
            if record.is_baseline {
                baseline = Some(record.clone());
            }
        }
        baseline.ok_or_else(|| Error::FuelRecordNotFound(ship_id.clone()))
    }
}

#[async_trait]
impl LedgerStore for MemoryStore {
    async fn commit(&self, batch: LedgerBatch) -> Result<()> {
        let ops = batch.into_ops();
        tracing::debug!(ops = ops.len(), "Committing batch");
        self.state.write().commit(ops)
    }
}
