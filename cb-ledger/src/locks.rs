//! Per-ship serialization
//!
//! Every read-modify-write of a ship's balance or bank entries runs while
//! holding that ship's lock. Bank and Apply lock one ship; pool creation
//! locks all members. Locks are always taken in ship id order, so two pools
//! sharing members cannot deadlock.
//!
//! A ship's mutex stays registered while anyone holds or waits on it. The
//! last guard to release it removes the entry, so the registry tracks only
//! ships in use.

use crate::types::ShipId;
use dashmap::DashMap;
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

type Registry = DashMap<ShipId, Arc<Mutex<()>>>;

/// Registry of one async mutex per ship
#[derive(Debug, Default)]
pub struct ShipLocks {
    locks: Arc<Registry>,
}

impl ShipLocks {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Lock every ship in the set, in sorted order. Duplicates are ignored.
    pub async fn acquire<I>(&self, ships: I) -> ShipGuard
    where
        I: IntoIterator<Item = ShipId>,
    {
        let ships: BTreeSet<ShipId> = ships.into_iter().collect();
        let mut guards = Vec::with_capacity(ships.len());

        for ship in &ships {
            // Clone under the shard lock, then release the shard before awaiting
            let mutex = self.locks.entry(ship.clone()).or_default().value().clone();
            guards.push(mutex.lock_owned().await);
        }

        tracing::trace!(ships = ships.len(), "Ship locks acquired");

        ShipGuard {
            ships,
            guards,
            registry: self.locks.clone(),
        }
    }

    /// Ships currently locked or waited on
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    /// No ship is locked or waited on
    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

/// Held locks for a set of ships. Released on drop.
#[derive(Debug)]
pub struct ShipGuard {
    ships: BTreeSet<ShipId>,
    guards: Vec<OwnedMutexGuard<()>>,
    registry: Arc<Registry>,
}

impl ShipGuard {
    /// Is this ship locked by the guard
    pub fn covers(&self, ship_id: &ShipId) -> bool {
        self.ships.contains(ship_id)
    }

    /// Fail unless every ship is covered
    pub fn ensure_covers<'a, I>(&self, ships: I) -> crate::Result<()>
    where
        I: IntoIterator<Item = &'a ShipId>,
    {
        for ship in ships {
            if !self.covers(ship) {
                return Err(crate::Error::Concurrency(format!(
                    "ship {} is not locked by the caller",
                    ship
                )));
            }
        }
        Ok(())
    }

    /// Locked ships, sorted
    pub fn ships(&self) -> impl Iterator<Item = &ShipId> {
        self.ships.iter()
    }
}

impl Drop for ShipGuard {
    fn drop(&mut self) {
        self.guards.clear();
        for ship in &self.ships {
            // Only the registry holds the mutex: nobody is waiting on it
            self.registry
                .remove_if(ship, |_, mutex| Arc::strong_count(mutex) == 1);
        }
    }
}
