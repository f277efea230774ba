//! Error types for the compliance ledger

use crate::types::{ShipId, Year};
use thiserror::Error;

/// Result type for ledger operations
pub type Result<T> = std::result::Result<T, Error>;

/// Ledger errors
///
/// These are hard failures: the operation is aborted and nothing is written.
/// Expected business outcomes (insufficient surplus, amount above a cap) are
/// reported through [`crate::BankingResult`] instead.
#[derive(Error, Debug)]
pub enum Error {
    /// Storage error (RocksDB)
    #[error("Storage error: {0}")]
    Storage(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    /// No compliance balance for the ship-year
    #[error("No compliance balance found for ship {ship_id} year {year}")]
    BalanceNotFound {
        /// Ship
        ship_id: ShipId,
        /// Reporting year
        year: Year,
    },

    /// No fuel record to compute a balance from
    #[error("Fuel record not found: {0}")]
    FuelRecordNotFound(ShipId),

    /// Requested year differs from the fuel record year
    #[error("Fuel record year {recorded} for ship {ship_id} does not match requested year {requested}")]
    YearMismatch {
        /// Ship
        ship_id: ShipId,
        /// Year asked for
        requested: Year,
        /// Year on the fuel record
        recorded: Year,
    },

    /// No baseline fuel record
    #[error("No baseline route found")]
    BaselineNotFound,

    /// Bank entry not found
    #[error("Bank entry not found: {0}")]
    EntryNotFound(String),

    /// Pool not found
    #[error("Pool not found: {0}")]
    PoolNotFound(String),

    /// Invariant violation (remaining above amount, negative remaining, etc.)
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    /// Concurrency error (write without holding the ship lock)
    #[error("Concurrency error: {0}")]
    Concurrency(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// True for missing-record failures
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Error::BalanceNotFound { .. }
                | Error::FuelRecordNotFound(_)
                | Error::BaselineNotFound
                | Error::EntryNotFound(_)
                | Error::PoolNotFound(_)
        )
    }
}

impl From<rocksdb::Error> for Error {
    fn from(err: rocksdb::Error) -> Self {
        Error::Storage(err.to_string())
    }
}
