//! Compliance Pooling
//!
//! Lets a group of ships share their compliance balances for a year: surplus
//! from some members closes the deficits of others.
//!
//! # Flow
//!
//! 1. **Validation**: the pool sum must be non-negative, members distinct
//! 2. **Snapshot**: member balances are read under the ship locks
//! 3. **Allocation**: greedy two-pointer transfer from largest surplus to
//!    largest deficit
//! 4. **Persistence**: pool, members and new balances in one atomic batch
//!
//! # Rules
//!
//! - A deficit ship never leaves worse off
//! - A surplus ship never leaves with a deficit
//! - Σ allocation == 0
//!
//! # Example
//!
//! ```no_run
//! use cb_ledger::{ComplianceLedger, MemoryStore};
//! use cb_pooling::{Config, CreatePool, PoolMemberInput, PoolOrchestrator};
//! use rust_decimal::Decimal;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> cb_pooling::Result<()> {
//!     let ledger = ComplianceLedger::new(Arc::new(MemoryStore::new()), Default::default());
//!     let pooling = PoolOrchestrator::new(Arc::new(ledger), Config::default());
//!
//!     let pool = pooling
//!         .create_pool(CreatePool {
//!             year: 2024,
//!             members: vec![
//!                 PoolMemberInput::new("A", Decimal::from(100)),
//!                 PoolMemberInput::new("B", Decimal::from(-30)),
//!             ],
//!         })
//!         .await?;
//!     println!("Pool {} with {} transfers", pool.pool_id, pool.transfers.len());
//!
//!     Ok(())
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    rust_2018_idioms,
    missing_debug_implementations,
    clippy::all
)]

pub mod allocator;
pub mod config;
pub mod error;
pub mod orchestrator;
pub mod types;

// Re-exports
pub use allocator::{allocate, check_invariants};
pub use config::{Config, SnapshotPolicy};
pub use error::{Error, Result};
pub use orchestrator::PoolOrchestrator;
pub use types::*;
