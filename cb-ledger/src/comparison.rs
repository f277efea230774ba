//! Route comparison against the baseline record

use crate::types::{FuelRecord, ShipId, Year};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// One record compared with baseline and target
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteComparison {
    /// Route / ship
    pub ship_id: ShipId,

    /// Vessel type
    pub vessel_type: String,

    /// Fuel type
    pub fuel_type: String,

    /// Reporting year
    pub year: Year,

    /// Actual intensity (gCO₂e/MJ)
    pub ghg_intensity: Decimal,

    /// Is the baseline itself
    pub is_baseline: bool,

    /// Percent above (+) or below (−) the baseline intensity. Absent for the
    /// baseline and when the baseline intensity is zero.
    pub percent_diff: Option<Decimal>,

    /// Intensity at or below target
    pub compliant: bool,

    /// Target used
    pub target_intensity: Decimal,
}

/// Baseline plus every other record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComparisonResult {
    /// Baseline row
    pub baseline: RouteComparison,

    /// Non-baseline rows, store order
    pub comparisons: Vec<RouteComparison>,

    /// Target used
    pub target_intensity: Decimal,
}

fn row(record: &FuelRecord, target: Decimal, percent_diff: Option<Decimal>) -> RouteComparison {
    RouteComparison {
        ship_id: record.ship_id.clone(),
        vessel_type: record.vessel_type.clone(),
        fuel_type: record.fuel_type.clone(),
        year: record.year,
        ghg_intensity: record.ghg_intensity,
        is_baseline: record.is_baseline,
        percent_diff,
        compliant: record.ghg_intensity <= target,
        target_intensity: target,
    }
}

/// Compare `records` against `baseline`. Baseline-flagged records are left
/// out of `comparisons`.
pub fn compare_routes(
    baseline: &FuelRecord,
    records: &[FuelRecord],
    target_intensity: Decimal,
) -> ComparisonResult {
    let comparisons = records
        .iter()
        .filter(|r| !r.is_baseline)
        .map(|r| {
            let diff = r
                .ghg_intensity
                .checked_div(baseline.ghg_intensity)
                .map(|ratio| (ratio - Decimal::ONE) * Decimal::ONE_HUNDRED);
            row(r, target_intensity, diff)
        })
        .collect();

    ComparisonResult {
        baseline: row(baseline, target_intensity, None),
        comparisons,
        target_intensity,
    }
}
