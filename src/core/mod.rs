pub mod capacity_factor;
pub mod pipeline;
pub mod power_curve;
pub mod solar;
pub mod solar_angles;
pub mod units;
pub mod weather;
pub mod wind;

pub mod aggregation;

use crate::catalog::{EnergyUnit, Technology};
use crate::core::weather::{GridPoint, WeatherVariable, WeatherWindow};

/// Hourly output of one reference device (one module, one turbine) together
/// with the reference maximum used to normalise it into a capacity factor.
#[derive(Clone, Debug)]
pub struct UnitPower {
    /// Power series in W, one entry per hour of the simulation year.
    pub power_w: Vec<f64>,
    /// Reference maximum power in W (curve nameplate / module rating).
    pub reference_max_power_w: f64,
    /// Set when a registry attribute had to be substituted with a default.
    pub mapping_note: Option<String>,
}

/// Outcome of one unit's power computation.
#[derive(Clone, Debug)]
pub enum ModelOutput {
    Computed(UnitPower),
    /// The unit cannot be simulated for a per-unit data reason; the caller
    /// stores a zero-valued record tagged with the reason instead.
    NotComputable { reason: String },
}

/// The one seam the two technologies share: given a unit, its weather-grid
/// point and the sliced weather window, produce the hourly power series.
/// Wind and solar supply concrete implementations; everything downstream
/// (reduction, batching, aggregation) is technology-agnostic.
pub trait PowerModel: Send + Sync {
    fn technology(&self) -> Technology;

    fn required_variables(&self) -> &'static [WeatherVariable];

    fn unit_power(
        &self,
        unit: &EnergyUnit,
        point: GridPoint,
        window: &WeatherWindow,
        simulation_year: i32,
    ) -> anyhow::Result<ModelOutput>;
}
