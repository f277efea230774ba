//! Core types for the compliance ledger
//!
//! All types are designed for:
//! - Deterministic serialization (bincode)
//! - Exact arithmetic (Decimal for gCO₂e quantities)

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Reporting year
pub type Year = i32;

/// Ship identifier (IMO number, route id, etc.)
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ShipId(String);

impl ShipId {
    /// Create new ship ID
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get as string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ShipId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ShipId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// Bank entry identifier (UUIDv7, time-ordered)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EntryId(Uuid);

impl EntryId {
    /// Fresh identifier
    pub fn generate() -> Self {
        Self(Uuid::now_v7())
    }

    /// Underlying UUID
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl From<Uuid> for EntryId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Pool identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PoolId(Uuid);

impl PoolId {
    /// Fresh identifier
    pub fn generate() -> Self {
        Self(Uuid::now_v7())
    }

    /// Underlying UUID
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl From<Uuid> for PoolId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

impl fmt::Display for PoolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Inputs the calculator used to derive a balance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalculationInputs {
    /// Regulatory target (gCO₂e/MJ)
    pub target_intensity: Decimal,

    /// Actual intensity of the fuel mix (gCO₂e/MJ)
    pub actual_intensity: Decimal,

    /// Energy in scope (MJ)
    pub energy_in_scope: Decimal,
}

/// Persisted compliance balance of one ship-year
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComplianceRecord {
    /// Ship
    pub ship_id: ShipId,

    /// Reporting year
    pub year: Year,

    /// Compliance balance (gCO₂e), signed
    pub cb: Decimal,

    /// How the balance was originally derived. `None` for records written
    /// directly through the store.
    pub inputs: Option<CalculationInputs>,

    /// Last write
    pub updated_at: DateTime<Utc>,
}

impl ComplianceRecord {
    /// Create a record
    pub fn new(
        ship_id: ShipId,
        year: Year,
        cb: Decimal,
        inputs: Option<CalculationInputs>,
    ) -> Self {
        Self {
            ship_id,
            year,
            cb,
            inputs,
            updated_at: Utc::now(),
        }
    }

    /// Same record with an adjusted balance. Calculation inputs are kept.
    pub fn with_cb(&self, cb: Decimal) -> Self {
        Self {
            ship_id: self.ship_id.clone(),
            year: self.year,
            cb,
            inputs: self.inputs,
            updated_at: Utc::now(),
        }
    }

    /// Public view of the balance
    pub fn balance(&self) -> ComplianceBalance {
        ComplianceBalance::new(self.ship_id.clone(), self.year, self.cb)
    }
}

/// Compliance balance with derived surplus/deficit flags
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComplianceBalance {
    /// Ship
    pub ship_id: ShipId,

    /// Reporting year
    pub year: Year,

    /// Compliance balance (gCO₂e)
    pub cb: Decimal,

    /// cb > 0
    pub is_surplus: bool,

    /// cb < 0
    pub is_deficit: bool,
}

impl ComplianceBalance {
    /// Derive flags from the balance
    pub fn new(ship_id: ShipId, year: Year, cb: Decimal) -> Self {
        Self {
            ship_id,
            year,
            cb,
            is_surplus: cb > Decimal::ZERO,
            is_deficit: cb < Decimal::ZERO,
        }
    }
}

/// Balance together with the ship's banked surplus
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdjustedBalance {
    /// Current balance
    pub balance: ComplianceBalance,

    /// Σ remaining over the ship's bank entries
    pub available_banked: Decimal,
}

/// Banked surplus entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BankEntry {
    /// Entry ID
    pub id: EntryId,

    /// Ship
    pub ship_id: ShipId,

    /// Year the surplus was banked from
    pub year: Year,

    /// Banked amount, immutable
    pub amount_gco2eq: Decimal,

    /// Still available, only ever decreases
    pub remaining_gco2eq: Decimal,

    /// FIFO ordering key
    pub created_at: DateTime<Utc>,

    /// Carried but not enforced
    pub expires_at: Option<DateTime<Utc>>,
}

impl BankEntry {
    /// New entry with the full amount remaining
    pub fn new(ship_id: ShipId, year: Year, amount: Decimal) -> Self {
        Self {
            id: EntryId::generate(),
            ship_id,
            year,
            amount_gco2eq: amount,
            remaining_gco2eq: amount,
            created_at: Utc::now(),
            expires_at: None,
        }
    }

    /// Nothing left to debit
    pub fn is_exhausted(&self) -> bool {
        self.remaining_gco2eq <= Decimal::ZERO
    }

    /// Check `0 <= remaining <= amount` for a prospective remaining value
    pub fn check_remaining(&self, remaining: Decimal) -> crate::Result<()> {
        if remaining < Decimal::ZERO || remaining > self.amount_gco2eq {
            return Err(crate::Error::InvariantViolation(format!(
                "remaining {} outside [0, {}] for bank entry {}",
                remaining, self.amount_gco2eq, self.id
            )));
        }
        if remaining > self.remaining_gco2eq {
            return Err(crate::Error::InvariantViolation(format!(
                "remaining of bank entry {} cannot grow from {} to {}",
                self.id, self.remaining_gco2eq, remaining
            )));
        }
        Ok(())
    }
}

/// Bank entries of a ship plus its available total
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BankRecords {
    /// Entries, oldest first
    pub records: Vec<BankEntry>,

    /// Σ remaining over all of the ship's entries
    pub total_available: Decimal,
}

/// Source-of-truth voyage/fuel record for one ship
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FuelRecord {
    /// Ship (route id)
    pub ship_id: ShipId,

    /// Vessel type (Container, Tanker, ...)
    pub vessel_type: String,

    /// Fuel type (HFO, LNG, MGO, ...)
    pub fuel_type: String,

    /// Reporting year
    pub year: Year,

    /// Actual GHG intensity (gCO₂e/MJ)
    pub ghg_intensity: Decimal,

    /// Fuel consumption (tonnes)
    pub fuel_consumption: Decimal,

    /// Distance (km)
    pub distance: Decimal,

    /// Total emissions (tonnes)
    pub total_emissions: Decimal,

    /// Baseline for route comparison
    pub is_baseline: bool,
}

/// Filter for listing fuel records
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RouteFilter {
    /// Vessel type
    pub vessel_type: Option<String>,

    /// Fuel type
    pub fuel_type: Option<String>,

    /// Reporting year
    pub year: Option<Year>,
}

impl RouteFilter {
    /// Check a record against every set field
    pub fn matches(&self, record: &FuelRecord) -> bool {
        self.vessel_type
            .as_deref()
            .map_or(true, |v| v == record.vessel_type)
            && self
                .fuel_type
                .as_deref()
                .map_or(true, |f| f == record.fuel_type)
            && self.year.map_or(true, |y| y == record.year)
    }
}

/// Compliance pool header
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pool {
    /// Pool ID
    pub id: PoolId,

    /// Reporting year
    pub year: Year,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

impl Pool {
    /// New pool for a year
    pub fn new(year: Year) -> Self {
        Self {
            id: PoolId::generate(),
            year,
            created_at: Utc::now(),
        }
    }
}

/// Member of a persisted pool
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolMember {
    /// Owning pool
    pub pool_id: PoolId,

    /// Ship
    pub ship_id: ShipId,

    /// Balance at pool entry
    pub cb_before: Decimal,

    /// Balance after allocation
    pub cb_after: Decimal,

    /// cb_after - cb_before (positive = received)
    pub allocation: Decimal,
}

/// Σ of gCO₂e quantities, `None` if the total leaves the `Decimal` range
pub fn checked_sum<I>(values: I) -> Option<Decimal>
where
    I: IntoIterator<Item = Decimal>,
{
    values
        .into_iter()
        .try_fold(Decimal::ZERO, |acc, value| acc.checked_add(value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_balance_flags() {
        let surplus = ComplianceBalance::new(ShipId::new("R002"), 2024, dec!(100));
        assert!(surplus.is_surplus);
        assert!(!surplus.is_deficit);

        let deficit = ComplianceBalance::new(ShipId::new("R001"), 2024, dec!(-1));
        assert!(deficit.is_deficit);

        let flat = ComplianceBalance::new(ShipId::new("R003"), 2024, Decimal::ZERO);
        assert!(!flat.is_surplus && !flat.is_deficit);
    }

    #[test]
    fn test_checked_sum() {
        assert_eq!(checked_sum([dec!(10), dec!(-30), dec!(5)]), Some(dec!(-15)));
        assert_eq!(checked_sum(Vec::new()), Some(Decimal::ZERO));
        assert_eq!(checked_sum([Decimal::MAX, Decimal::MAX]), None);
        assert_eq!(checked_sum([Decimal::MIN, dec!(-1)]), None);
    }

    #[test]
    fn test_with_cb_keeps_inputs() {
        let inputs = CalculationInputs {
            target_intensity: dec!(89.3368),
            actual_intensity: dec!(88.0),
            energy_in_scope: dec!(196800000),
        };
        let record = ComplianceRecord::new(ShipId::new("R002"), 2024, dec!(10), Some(inputs));

        let adjusted = record.with_cb(dec!(4));
        assert_eq!(adjusted.cb, dec!(4));
        assert_eq!(adjusted.inputs, Some(inputs));
    }

    #[test]
    fn test_bank_entry_remaining_bounds() {
        let entry = BankEntry::new(ShipId::new("R002"), 2024, dec!(100));
        assert!(entry.check_remaining(dec!(0)).is_ok());
        assert!(entry.check_remaining(dec!(100)).is_ok());
        assert!(entry.check_remaining(dec!(-1)).is_err());
        assert!(entry.check_remaining(dec!(101)).is_err());

        let mut drained = entry.clone();
        drained.remaining_gco2eq = dec!(40);
        assert!(drained.check_remaining(dec!(50)).is_err());
    }

    #[test]
    fn test_route_filter() {
        let record = FuelRecord {
            ship_id: ShipId::new("R001"),
            vessel_type: "Container".to_string(),
            fuel_type: "HFO".to_string(),
            year: 2024,
            ghg_intensity: dec!(91.0),
            fuel_consumption: dec!(5000),
            distance: dec!(12000),
            total_emissions: dec!(4500),
            is_baseline: true,
        };

        assert!(RouteFilter::default().matches(&record));
        assert!(RouteFilter {
            vessel_type: Some("Container".to_string()),
            year: Some(2024),
            ..Default::default()
        }
        .matches(&record));
        assert!(!RouteFilter {
            fuel_type: Some("LNG".to_string()),
            ..Default::default()
        }
        .matches(&record));
    }
}
