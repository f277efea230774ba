//! Error types for pooling

use cb_ledger::{ShipId, Year};
use rust_decimal::Decimal;
use thiserror::Error;

/// Result type for pooling operations
pub type Result<T> = std::result::Result<T, Error>;

/// Pooling errors
#[derive(Error, Debug)]
pub enum Error {
    /// Ledger error
    #[error("Ledger error: {0}")]
    Ledger(#[from] cb_ledger::Error),

    /// Pool failed validation, nothing written
    #[error("Pool validation failed for {year}: {}", .errors.join(", "))]
    Rejected {
        /// Reporting year
        year: Year,
        /// Every failed rule
        errors: Vec<String>,
    },

    /// Caller-supplied balance no longer matches the ledger
    #[error("Stale balance for ship {ship_id}: supplied {supplied}, ledger holds {live}")]
    StaleSnapshot {
        /// Ship
        ship_id: ShipId,
        /// Balance the caller sent
        supplied: Decimal,
        /// Balance read under lock
        live: Decimal,
    },

    /// Allocation broke a pooling rule, nothing written
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
