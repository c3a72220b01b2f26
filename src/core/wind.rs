//! Wind power model: extrapolates reanalysis wind to hub height, normalises
//! for air density and looks up turbine output from the power curve.

use crate::catalog::{EnergyUnit, Technology, TechnologyAttributes};
use crate::core::power_curve::PowerCurveTable;
use crate::core::units::{
    REFERENCE_AIR_DENSITY, SPECIFIC_GAS_CONSTANT_DRY_AIR, WIND_REFERENCE_HEIGHT,
};
use crate::core::weather::{GridPoint, WeatherVariable, WeatherWindow, WIND_VARIABLES};
use crate::core::{ModelOutput, PowerModel, UnitPower};
use anyhow::bail;
use std::sync::Arc;

pub struct WindPowerModel {
    curves: Arc<PowerCurveTable>,
    default_turbine_type: String,
    cut_off_margin_ms: Option<f64>,
}

impl WindPowerModel {
    pub fn new(
        curves: Arc<PowerCurveTable>,
        default_turbine_type: String,
        cut_off_margin_ms: Option<f64>,
    ) -> anyhow::Result<Self> {
        if curves.curve(&default_turbine_type).is_none() {
            bail!("default turbine type {default_turbine_type} has no power curve");
        }
        Ok(Self {
            curves,
            default_turbine_type,
            cut_off_margin_ms,
        })
    }
}

/// Hub-height wind speed normalised to the reference air density.
///
/// The measured speed is the Pythagorean combination of the wind components
/// at the reference height, extrapolated with a logarithmic profile over the
/// surface roughness. Air density at hub height follows from a barometric
/// pressure/temperature lapse, and the speed is corrected by the cube root
/// of the density ratio.
pub(crate) fn normalised_hub_height_wind_speed(
    u: &[f64],
    v: &[f64],
    roughness: &[f64],
    pressure: &[f64],
    temperature_k: &[f64],
    hub_height_m: f64,
    reference_height_m: f64,
) -> Vec<f64> {
    (0..u.len())
        .map(|hour| {
            let measured = (u[hour].powi(2) + v[hour].powi(2)).sqrt();
            let at_hub = measured * (hub_height_m / roughness[hour]).ln()
                / (reference_height_m / roughness[hour]).ln();
            let pressure_at_hub = pressure[hour]
                * (1. - 0.0065 * hub_height_m / temperature_k[hour]).powf(5.25);
            let temperature_at_hub = temperature_k[hour] - 6.5 * hub_height_m / temperature_k[hour];
            let density_at_hub =
                pressure_at_hub / (temperature_at_hub * SPECIFIC_GAS_CONSTANT_DRY_AIR);
            at_hub * (density_at_hub / REFERENCE_AIR_DENSITY).powf(1. / 3.)
        })
        .collect()
}

impl PowerModel for WindPowerModel {
    fn technology(&self) -> Technology {
        Technology::Wind
    }

    fn required_variables(&self) -> &'static [WeatherVariable] {
        &WIND_VARIABLES
    }

    fn unit_power(
        &self,
        unit: &EnergyUnit,
        _point: GridPoint,
        window: &WeatherWindow,
        _simulation_year: i32,
    ) -> anyhow::Result<ModelOutput> {
        let TechnologyAttributes::Wind {
            turbine_type,
            hub_height_m,
        } = &unit.attributes
        else {
            bail!("unit {} is not a wind unit", unit.id);
        };

        let (curve_type, mapping_note) = match turbine_type {
            Some(registry_type) if self.curves.curve(registry_type).is_some() => {
                (registry_type.as_str(), None)
            }
            Some(registry_type) => (
                self.default_turbine_type.as_str(),
                Some(format!(
                    "turbine type {registry_type} has no power curve, substituted default {}",
                    self.default_turbine_type
                )),
            ),
            None => (
                self.default_turbine_type.as_str(),
                Some(format!(
                    "turbine type unknown, substituted default {}",
                    self.default_turbine_type
                )),
            ),
        };
        // checked at construction for the default, just above for the rest
        let curve = self
            .curves
            .curve(curve_type)
            .expect("curve presence checked before lookup");

        let u = window.series(WeatherVariable::UWind100m)?;
        let v = window.series(WeatherVariable::VWind100m)?;
        let roughness = window.series(WeatherVariable::SurfaceRoughness)?;
        let pressure = window.series(WeatherVariable::SurfacePressure)?;
        let temperature = window.series(WeatherVariable::Temperature2m)?;

        let speeds = normalised_hub_height_wind_speed(
            u,
            v,
            roughness,
            pressure,
            temperature,
            *hub_height_m,
            WIND_REFERENCE_HEIGHT,
        );
        let power_w = speeds
            .iter()
            .map(|speed| curve.power_at(*speed, self.cut_off_margin_ms))
            .collect();

        Ok(ModelOutput::Computed(UnitPower {
            power_w,
            reference_max_power_w: curve.max_power_w(),
            mapping_note,
        }))
    }
}
