//! Compliance Balance Ledger
//!
//! Per ship-year compliance balances (CB) in gCO₂-equivalent, derived from
//! fuel consumption and GHG intensity, plus a bank of surplus that can be
//! carried forward and applied to later deficits.
//!
//! # Architecture
//!
//! - **Pure rules**: the calculator, the bank/apply checks and the FIFO debit
//!   planner hold no state
//! - **Per-ship locks**: every read-modify-write runs under the ship's mutex
//! - **Atomic batches**: the writes of one operation commit all-or-nothing
//! - **Pluggable stores**: in-memory or RocksDB behind async traits
//!
//! # Invariants
//!
//! - Conservation: Bank moves exactly `applied` from the balance into a new
//!   entry; Apply moves exactly `applied` from entries into the balance
//! - `0 <= remaining <= amount` for every bank entry, and remaining never grows
//! - FIFO: Apply debits entries oldest first
//! - Rejected operations change nothing

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    rust_2018_idioms,
    missing_debug_implementations,
    clippy::all
)]

pub mod banking;
pub mod calculator;
pub mod comparison;
pub mod config;
pub mod error;
pub mod ledger;
pub mod locks;
pub mod memory;
pub mod metrics;
pub mod storage;
pub mod store;
pub mod types;

// Re-exports
pub use banking::{ApplyBanked, BankSurplus, BankingResult, Rejection};
pub use calculator::ComplianceCalculator;
pub use comparison::{ComparisonResult, RouteComparison};
pub use config::{Config, RegulatoryConfig};
pub use error::{Error, Result};
pub use ledger::ComplianceLedger;
pub use locks::ShipGuard;
pub use memory::MemoryStore;
pub use metrics::Metrics;
pub use storage::RocksStore;
pub use store::{LedgerBatch, LedgerStore, WriteOp};
pub use types::{
    checked_sum, AdjustedBalance, BankEntry, BankRecords, CalculationInputs, ComplianceBalance,
    ComplianceRecord, EntryId, FuelRecord, Pool, PoolId, PoolMember, RouteFilter, ShipId, Year,
};
