//! Storage layer using RocksDB
//!
//! # Column Families
//!
//! - `balances` - Compliance records (key: ship || 0 || year)
//! - `entries` - Bank entries (key: entry_id)
//! - `entry_index` - FIFO index (key: ship || 0 || created_at || entry_id)
//! - `pools` - Pool headers (key: pool_id)
//! - `pool_members` - Members of a pool (key: pool_id)
//! - `pool_index` - Pools by year (key: year || created_at || pool_id)
//! - `fuel_records` - Source-of-truth records (key: ship)

use crate::{
    error::{Error, Result},
    store::{sort_fifo, BalanceStore, BankStore, FuelRecordStore, LedgerBatch, LedgerStore, PoolStore, WriteOp},
    types::{
        checked_sum, BankEntry, ComplianceRecord, EntryId, FuelRecord, Pool, PoolId, PoolMember, RouteFilter,
        ShipId, Year,
    },
    Config,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rocksdb::{ColumnFamily, ColumnFamilyDescriptor, Direction, IteratorMode, Options, WriteBatch, DB};
use rust_decimal::Decimal;
use serde::{de::DeserializeOwned, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Column family names
const CF_BALANCES: &str = "balances";
const CF_ENTRIES: &str = "entries";
const CF_ENTRY_INDEX: &str = "entry_index";
const CF_POOLS: &str = "pools";
const CF_POOL_MEMBERS: &str = "pool_members";
const CF_POOL_INDEX: &str = "pool_index";
const CF_FUEL_RECORDS: &str = "fuel_records";

const COLUMN_FAMILIES: [&str; 7] = [
    CF_BALANCES,
    CF_ENTRIES,
    CF_ENTRY_INDEX,
    CF_POOLS,
    CF_POOL_MEMBERS,
    CF_POOL_INDEX,
    CF_FUEL_RECORDS,
];

/// Ledger store backed by RocksDB
pub struct RocksStore {
    db: DB,
    /// Serializes validate-then-write of commits
    commit_lock: Mutex<()>,
}

impl RocksStore {
    /// Open or create database
    pub fn open(config: &Config) -> Result<Self> {
        let path = &config.data_dir;

        // Create directory if not exists
        std::fs::create_dir_all(path)?;

        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);
        db_opts.create_missing_column_families(true);
        db_opts.set_write_buffer_size(config.rocksdb.write_buffer_size_mb * 1024 * 1024);
        db_opts.set_max_write_buffer_number(config.rocksdb.max_write_buffer_number);
        db_opts.set_max_background_jobs(config.rocksdb.max_background_jobs);
        if config.rocksdb.enable_statistics {
            db_opts.enable_statistics();
        }

        let cf_descriptors = COLUMN_FAMILIES.iter().map(|name| {
            let mut opts = Options::default();
            opts.set_compression_type(rocksdb::DBCompressionType::Lz4);
            ColumnFamilyDescriptor::new(*name, opts)
        });

        let db = DB::open_cf_descriptors(&db_opts, path, cf_descriptors)?;

        tracing::info!(
            path = ?path,
            column_families = COLUMN_FAMILIES.len(),
            "Opened RocksDB ledger store"
        );

        Ok(Self {
            db,
            commit_lock: Mutex::new(()),
        })
    }

    // Helper: get column family handle

    fn cf_handle(&self, name: &str) -> Result<&ColumnFamily> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| Error::Storage(format!("Column family {} not found", name)))
    }

    fn get<T: DeserializeOwned>(&self, cf: &str, key: &[u8]) -> Result<Option<T>> {
        let cf = self.cf_handle(cf)?;
        match self.db.get_cf(cf, key)? {
            Some(bytes) => Ok(Some(bincode::deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    fn put<T: Serialize>(&self, batch: &mut WriteBatch, cf: &str, key: &[u8], value: &T) -> Result<()> {
        let cf = self.cf_handle(cf)?;
        batch.put_cf(cf, key, bincode::serialize(value)?);
        Ok(())
    }

    fn put_marker(&self, batch: &mut WriteBatch, cf: &str, key: &[u8]) -> Result<()> {
        let cf = self.cf_handle(cf)?;
        batch.put_cf(cf, key, b"");
        Ok(())
    }

    /// Keys and values under a prefix, in key order
    fn scan_prefix(&self, cf: &str, prefix: &[u8]) -> Result<Vec<(Box<[u8]>, Box<[u8]>)>> {
        let cf = self.cf_handle(cf)?;
        let iter = self
            .db
            .iterator_cf(cf, IteratorMode::From(prefix, Direction::Forward));

        let mut items = Vec::new();
        for item in iter {
            let (key, value) = item?;
            if !key.starts_with(prefix) {
                break;
            }
            items.push((key, value));
        }
        Ok(items)
    }

    fn get_entry(&self, id: &EntryId) -> Result<Option<BankEntry>> {
        self.get(CF_ENTRIES, id.as_uuid().as_bytes())
    }

    fn entries_for(&self, ship_id: &ShipId) -> Result<Vec<BankEntry>> {
        let prefix = ship_prefix(ship_id);
        let mut entries = Vec::new();

        for (key, _) in self.scan_prefix(CF_ENTRY_INDEX, &prefix)? {
            let id = entry_id_from_index(&key)?;
            let entry = self
                .get_entry(&id)?
                .ok_or_else(|| Error::Storage(format!("Dangling entry index {}", id)))?;
            entries.push(entry);
        }

        sort_fifo(&mut entries);
        Ok(entries)
    }

    fn stage(&self, batch: &mut WriteBatch, ops: Vec<WriteOp>) -> Result<()> {
        // entry id -> entry as it will look after the ops staged so far
        let mut pending: HashMap<EntryId, BankEntry> = HashMap::new();

        for op in ops {
            match op {
                WriteOp::PutBalance(record) => {
                    self.put(batch, CF_BALANCES, &balance_key(&record.ship_id, record.year), &record)?;
                }
                WriteOp::PutEntry(entry) => {
                    if pending.contains_key(&entry.id) || self.get_entry(&entry.id)?.is_some() {
                        return Err(Error::InvariantViolation(format!(
                            "bank entry {} already exists",
                            entry.id
                        )));
                    }
                    entry.check_remaining(entry.remaining_gco2eq)?;
                    self.put(batch, CF_ENTRIES, entry.id.as_uuid().as_bytes(), &entry)?;
                    self.put_marker(batch, CF_ENTRY_INDEX, &entry_index_key(&entry)?)?;
                    pending.insert(entry.id, entry);
                }
                WriteOp::SetRemaining {
                    entry_id,
                    ship_id,
                    remaining,
                } => {
                    let mut current = match pending.remove(&entry_id) {
                        Some(entry) => entry,
                        None => self
                            .get_entry(&entry_id)?
                            .ok_or_else(|| Error::EntryNotFound(entry_id.to_string()))?,
                    };
                    if current.ship_id != ship_id {
                        return Err(Error::InvariantViolation(format!(
                            "bank entry {} belongs to {}, not {}",
                            entry_id, current.ship_id, ship_id
                        )));
                    }
                    current.check_remaining(remaining)?;
                    current.remaining_gco2eq = remaining;
                    self.put(batch, CF_ENTRIES, entry_id.as_uuid().as_bytes(), &current)?;
                    pending.insert(entry_id, current);
                }
                WriteOp::PutPool { pool, mut members } => {
                    let key = pool.id.as_uuid().as_bytes().to_vec();
                    if self.get::<Pool>(CF_POOLS, &key)?.is_some() {
                        return Err(Error::InvariantViolation(format!(
                            "pool {} already exists",
                            pool.id
                        )));
                    }
                    for member in &mut members {
                        member.pool_id = pool.id;
                    }
                    self.put(batch, CF_POOLS, &key, &pool)?;
                    self.put(batch, CF_POOL_MEMBERS, &key, &members)?;
                    self.put_marker(batch, CF_POOL_INDEX, &pool_index_key(&pool)?)?;
                }
            }
        }

        Ok(())
    }

    fn commit_ops(&self, ops: Vec<WriteOp>) -> Result<()> {
        let _commit = self.commit_lock.lock();
        let mut batch = WriteBatch::default();
        self.stage(&mut batch, ops)?;

        // Atomic commit
        self.db.write(batch)?;
        Ok(())
    }
}

impl fmt::Debug for RocksStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RocksStore")
            .field("path", &self.db.path())
            .finish_non_exhaustive()
    }
}

// Key helpers

fn ship_prefix(ship_id: &ShipId) -> Vec<u8> {
    let mut key = ship_id.as_str().as_bytes().to_vec();
    key.push(0); // Separator
    key
}

fn balance_key(ship_id: &ShipId, year: Year) -> Vec<u8> {
    let mut key = ship_prefix(ship_id);
    key.extend_from_slice(&year.to_be_bytes());
    key
}

/// Big-endian, sign bit flipped, so byte order matches time order.
/// Fails outside the nanosecond range (years 1677 to 2262).
fn time_key(ts: &DateTime<Utc>) -> Result<[u8; 8]> {
    let nanos = ts.timestamp_nanos_opt().ok_or_else(|| {
        Error::InvariantViolation(format!("timestamp {} cannot be indexed", ts))
    })?;
    Ok(((nanos as u64) ^ (1 << 63)).to_be_bytes())
}

fn entry_index_key(entry: &BankEntry) -> Result<Vec<u8>> {
    let mut key = ship_prefix(&entry.ship_id);
    key.extend_from_slice(&time_key(&entry.created_at)?);
    key.extend_from_slice(entry.id.as_uuid().as_bytes());
    Ok(key)
}

fn entry_id_from_index(key: &[u8]) -> Result<EntryId> {
    if key.len() < 16 {
        return Err(Error::Storage("Malformed entry index key".to_string()));
    }
    let id: [u8; 16] = key[key.len() - 16..]
        .try_into()
        .map_err(|_| Error::Storage("Malformed entry index key".to_string()))?;
    Ok(EntryId::from(uuid::Uuid::from_bytes(id)))
}

fn year_prefix(year: Year) -> [u8; 4] {
    ((year as u32) ^ (1 << 31)).to_be_bytes()
}

fn pool_index_key(pool: &Pool) -> Result<Vec<u8>> {
    let mut key = year_prefix(pool.year).to_vec();
    key.extend_from_slice(&time_key(&pool.created_at)?);
    key.extend_from_slice(pool.id.as_uuid().as_bytes());
    Ok(key)
}

fn pool_key_from_index(key: &[u8]) -> Result<Vec<u8>> {
    if key.len() < 16 {
        return Err(Error::Storage("Malformed pool index key".to_string()));
    }
    Ok(key[key.len() - 16..].to_vec())
}

#[async_trait]
impl BalanceStore for RocksStore {
    async fn get_balance(&self, ship_id: &ShipId, year: Year) -> Result<Option<ComplianceRecord>> {
        self.get(CF_BALANCES, &balance_key(ship_id, year))
    }

    async fn save_balance(&self, record: ComplianceRecord) -> Result<ComplianceRecord> {
        self.commit_ops(vec![WriteOp::PutBalance(record.clone())])?;
        Ok(record)
    }
}

#[async_trait]
impl BankStore for RocksStore {
    async fn list_entries_by_ship(&self, ship_id: &ShipId) -> Result<Vec<BankEntry>> {
        self.entries_for(ship_id)
    }

    async fn list_entries_by_ship_and_year(
        &self,
        ship_id: &ShipId,
        year: Year,
    ) -> Result<Vec<BankEntry>> {
        let mut entries = self.entries_for(ship_id)?;
        entries.retain(|e| e.year == year);
        Ok(entries)
    }

    async fn sum_remaining_by_ship(&self, ship_id: &ShipId) -> Result<Decimal> {
        checked_sum(self.entries_for(ship_id)?.iter().map(|e| e.remaining_gco2eq)).ok_or_else(
            || Error::InvariantViolation(format!("banked total of ship {} overflows", ship_id)),
        )
    }

    async fn create_entry(
        &self,
        ship_id: &ShipId,
        year: Year,
        amount: Decimal,
    ) -> Result<BankEntry> {
        let entry = BankEntry::new(ship_id.clone(), year, amount);
        self.commit_ops(vec![WriteOp::PutEntry(entry.clone())])?;
        Ok(entry)
    }

    async fn set_remaining(&self, entry_id: EntryId, remaining: Decimal) -> Result<()> {
        let entry = self
            .get_entry(&entry_id)?
            .ok_or_else(|| Error::EntryNotFound(entry_id.to_string()))?;
        self.commit_ops(vec![WriteOp::SetRemaining {
            entry_id,
            ship_id: entry.ship_id,
            remaining,
        }])
    }
}

#[async_trait]
impl PoolStore for RocksStore {
    async fn create_pool(&self, year: Year) -> Result<Pool> {
        let pool = Pool::new(year);
        self.commit_ops(vec![WriteOp::PutPool {
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
        let key = pool_id.as_uuid().as_bytes().to_vec();
        let _commit = self.commit_lock.lock();

        let mut stored: Vec<PoolMember> = self
            .get(CF_POOL_MEMBERS, &key)?
            .ok_or_else(|| Error::PoolNotFound(pool_id.to_string()))?;
        for member in &mut members {
            member.pool_id = pool_id;
        }
        stored.extend(members.iter().cloned());

        let mut batch = WriteBatch::default();
        self.put(&mut batch, CF_POOL_MEMBERS, &key, &stored)?;
        self.db.write(batch)?;

        Ok(members)
    }

    async fn list_pools_by_year(&self, year: Year) -> Result<Vec<Pool>> {
        let mut pools = Vec::new();
        for (key, _) in self.scan_prefix(CF_POOL_INDEX, &year_prefix(year))? {
            let pool_key = pool_key_from_index(&key)?;
            let pool: Pool = self
                .get(CF_POOLS, &pool_key)?
                .ok_or_else(|| Error::Storage("Dangling pool index".to_string()))?;
            pools.push(pool);
        }
        Ok(pools)
    }

    async fn list_members(&self, pool_id: PoolId) -> Result<Vec<PoolMember>> {
        self.get(CF_POOL_MEMBERS, pool_id.as_uuid().as_bytes())?
            .ok_or_else(|| Error::PoolNotFound(pool_id.to_string()))
    }
}

#[async_trait]
impl FuelRecordStore for RocksStore {
    async fn find_fuel_record(&self, ship_id: &ShipId) -> Result<Option<FuelRecord>> {
        self.get(CF_FUEL_RECORDS, ship_id.as_str().as_bytes())
    }

    async fn list_fuel_records(&self, filter: &RouteFilter) -> Result<Vec<FuelRecord>> {
        let mut records = Vec::new();
        for (_, value) in self.scan_prefix(CF_FUEL_RECORDS, &[])? {
            let record: FuelRecord = bincode::deserialize(&value)?;
            if filter.matches(&record) {
                records.push(record);
            }
        }
        Ok(records)
    }

    async fn find_baseline(&self) -> Result<Option<FuelRecord>> {
        Ok(self
            .list_fuel_records(&RouteFilter::default())
            .await?
            .into_iter()
            .find(|r| r.is_baseline))
    }

    async fn put_fuel_record(&self, record: FuelRecord) -> Result<()> {
        let mut batch = WriteBatch::default();
        self.put(&mut batch, CF_FUEL_RECORDS, record.ship_id.as_str().as_bytes(), &record)?;
        self.db.write(batch)?;
        Ok(())
    }

    async fn set_baseline(&self, ship_id: &ShipId) -> Result<FuelRecord> {
        let mut records = self.list_fuel_records(&RouteFilter::default()).await?;
        if !records.iter().any(|r| &r.ship_id == ship_id) {
            return Err(Error::FuelRecordNotFound(ship_id.clone()));
        }

        let mut batch = WriteBatch::default();
        let mut baseline = None;
        for record in &mut records {
            record.is_baseline = &record.ship_id == ship_id;
            self.put(&mut batch, CF_FUEL_RECORDS, record.ship_id.as_str().as_bytes(), &*record)?;
            if record.is_baseline {
                baseline = Some(record.clone());
            }
        }
        self.db.write(batch)?;

        baseline.ok_or_else(|| Error::FuelRecordNotFound(ship_id.clone()))
    }
}

#[async_trait]
impl LedgerStore for RocksStore {
    async fn commit(&self, batch: LedgerBatch) -> Result<()> {
        let ops = batch.into_ops();
        tracing::debug!(ops = ops.len(), "Committing batch");
        self.commit_ops(ops)
    }
}
