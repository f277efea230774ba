//! Compliance balance calculation
//!
//! ```text
//! energy_in_scope = fuel_consumption × energy_conversion_factor     (MJ)
//! cb              = (target_intensity − actual_intensity) × energy  (gCO₂e)
//! ```
//!
//! A positive balance is a surplus, a negative one a deficit.

use crate::{
    config::RegulatoryConfig,
    types::{CalculationInputs, ComplianceRecord, FuelRecord, ShipId, Year},
    Error, Result,
};
use rust_decimal::Decimal;

/// Pure calculator parameterised by the regulatory constants
#[derive(Debug, Clone, Copy)]
pub struct ComplianceCalculator {
    regulatory: RegulatoryConfig,
}

impl ComplianceCalculator {
    /// Create calculator
    pub fn new(regulatory: RegulatoryConfig) -> Self {
        Self { regulatory }
    }

    /// Constants in use
    pub fn regulatory(&self) -> &RegulatoryConfig {
        &self.regulatory
    }

    /// Energy in scope for a fuel quantity (MJ)
    pub fn energy_in_scope(&self, fuel_consumption_t: Decimal) -> Decimal {
        fuel_consumption_t * self.regulatory.energy_conversion_factor
    }

    /// Inputs and balance for a fuel record
    pub fn calculate(&self, record: &FuelRecord) -> (CalculationInputs, Decimal) {
        let inputs = CalculationInputs {
            target_intensity: self.regulatory.target_intensity,
            actual_intensity: record.ghg_intensity,
            energy_in_scope: self.energy_in_scope(record.fuel_consumption),
        };
        let cb = (inputs.target_intensity - inputs.actual_intensity) * inputs.energy_in_scope;
        (inputs, cb)
    }

    /// Build the balance record for a requested ship-year
    ///
    /// Fails with [`Error::YearMismatch`] if the fuel record belongs to a
    /// different year.
    pub fn compute(
        &self,
        ship_id: &ShipId,
        year: Year,
        record: &FuelRecord,
    ) -> Result<ComplianceRecord> {
        if record.year != year {
            return Err(Error::YearMismatch {
                ship_id: ship_id.clone(),
                requested: year,
                recorded: record.year,
            });
        }

        let (inputs, cb) = self.calculate(record);
        Ok(ComplianceRecord::new(ship_id.clone(), year, cb, Some(inputs)))
    }
}

impl Default for ComplianceCalculator {
    fn default() -> Self {
        Self::new(RegulatoryConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn fuel_record(year: Year, intensity: Decimal, fuel: Decimal) -> FuelRecord {
        FuelRecord {
            ship_id: ShipId::new("R001"),
            vessel_type: "Container".to_string(),
            fuel_type: "HFO".to_string(),
            year,
            ghg_intensity: intensity,
            fuel_consumption: fuel,
            distance: dec!(12000),
            total_emissions: dec!(4500),
            is_baseline: false,
        }
    }

    #[test]
    fn test_deficit_scenario() {
        let calculator = ComplianceCalculator::default();
        let record = fuel_record(2024, dec!(91.0), dec!(5000));

        let computed = calculator
            .compute(&ShipId::new("R001"), 2024, &record)
            .unwrap();
        let inputs = computed.inputs.unwrap();

        assert_eq!(inputs.energy_in_scope, dec!(205000000));
        // (89.3368 - 91.0) × 205,000,000
        assert_eq!(computed.cb, dec!(-340956000));
        assert!(computed.balance().is_deficit);
    }

    #[test]
    fn test_surplus_scenario() {
        let calculator = ComplianceCalculator::default();
        let record = fuel_record(2024, dec!(88.0), dec!(4800));

        let (inputs, cb) = calculator.calculate(&record);
        assert_eq!(inputs.energy_in_scope, dec!(196800000));
        assert_eq!(cb, dec!(263082240));
    }

    #[test]
    fn test_on_target_is_zero() {
        let calculator = ComplianceCalculator::default();
        let record = fuel_record(2025, dec!(89.3368), dec!(4900));

        let (_, cb) = calculator.calculate(&record);
        assert_eq!(cb, Decimal::ZERO);
    }

    #[test]
    fn test_injected_constants() {
        let calculator = ComplianceCalculator::new(RegulatoryConfig {
            target_intensity: dec!(80),
            energy_conversion_factor: dec!(1000),
        });
        let record = fuel_record(2030, dec!(90), dec!(2));

        let (inputs, cb) = calculator.calculate(&record);
        assert_eq!(inputs.energy_in_scope, dec!(2000));
        assert_eq!(cb, dec!(-20000));
    }

    #[test]
    fn test_year_mismatch() {
        let calculator = ComplianceCalculator::default();
        let record = fuel_record(2024, dec!(91.0), dec!(5000));

        let err = calculator
            .compute(&ShipId::new("R001"), 2025, &record)
            .unwrap_err();
        assert!(matches!(
            err,
            Error::YearMismatch {
                requested: 2025,
                recorded: 2024,
                ..
            }
        ));
    }
}
