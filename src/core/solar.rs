//! Solar power model: plane-of-array irradiance from reanalysis fields and
//! precomputed sun positions, cell temperature, and DC output of one
//! reference module following the Sandia Array Performance Model (SAPM).

use crate::catalog::{EnergyUnit, Technology, TechnologyAttributes};
use crate::core::solar_angles::SolarAngleStore;
use crate::core::units::{kelvin_to_celsius, SECONDS_PER_HOUR, STANDARD_PRESSURE};
use crate::core::weather::{GridPoint, WeatherVariable, WeatherWindow, SOLAR_VARIABLES};
use crate::core::{ModelOutput, PowerModel, UnitPower};
use anyhow::bail;
use std::sync::Arc;

/// Incidence angles steeper than this are treated as the sun standing
/// behind the panel plane; the projection is zeroed for those hours.
const MIN_PROJECTION_ANGLE_DEG: f64 = 88.;
/// Zenith-like angles at or beyond this make a non-zero DNI implausible.
const ZENITH_THRESHOLD_FOR_ZERO_DNI: f64 = 88.;
/// Lower zenith bound of the clear-sky consistency clamp.
const ZENITH_THRESHOLD_FOR_CLEARSKY_LIMIT: f64 = 80.;
/// Permitted ratio of derived DNI over clear-sky DNI before clamping.
const CLEARSKY_TOLERANCE: f64 = 1.1;
/// SAPM reference irradiance, in W/m2.
const REFERENCE_IRRADIANCE: f64 = 1_000.;
/// SAPM reference cell temperature, in deg C.
const REFERENCE_CELL_TEMPERATURE: f64 = 25.;

const BOLTZMANN: f64 = 1.38066e-23;
const ELEMENTARY_CHARGE: f64 = 1.60218e-19;

/// Electrical coefficients of one module under the SAPM.
#[derive(Clone, Copy, Debug)]
pub struct SapmModule {
    /// Maximum-power-point current at reference conditions, in A.
    pub impo: f64,
    /// Maximum-power-point voltage at reference conditions, in V.
    pub vmpo: f64,
    pub c0: f64,
    pub c1: f64,
    pub c2: f64,
    pub c3: f64,
    /// Normalised temperature coefficient of Imp, in 1/degC.
    pub aimp: f64,
    /// Temperature coefficient of Vmp at reference irradiance, in V/degC.
    pub bvmpo: f64,
    /// Irradiance dependence of the Vmp temperature coefficient.
    pub mbvmp: f64,
    pub diode_factor: f64,
    pub cells_in_series: f64,
    /// Spectral correction polynomial over absolute air mass (a0..a4).
    pub airmass_coefficients: [f64; 5],
    /// Incidence-angle correction polynomial over degrees (b0..b5).
    pub incidence_coefficients: [f64; 6],
    /// Fraction of diffuse irradiance used by the module.
    pub diffuse_fraction: f64,
}

/// The single reference module all solar units are simulated with: a
/// 160 W-class glass/glass module. Scaling to each unit's rated capacity
/// happens in the capacity-factor reducer, so only the shape of this
/// module's response matters, not its absolute size.
pub const REFERENCE_MODULE: SapmModule = SapmModule {
    impo: 5.10,
    vmpo: 31.3,
    c0: 1.004,
    c1: -0.004,
    c2: 0.308,
    c3: -6.35,
    aimp: -0.00032,
    bvmpo: -0.1551,
    mbvmp: 0.,
    diode_factor: 1.35,
    cells_in_series: 72.,
    airmass_coefficients: [0.9417, 0.06516, -0.02022, 0.00219, -0.00009],
    incidence_coefficients: [
        1.,
        -2.438e-3,
        3.103e-4,
        -1.246e-5,
        2.112e-7,
        -1.359e-9,
    ],
    diffuse_fraction: 1.,
};

impl SapmModule {
    /// DC power at the maximum power point, in W, for a given effective
    /// irradiance (W/m2) and cell temperature (deg C).
    pub fn max_power_point(&self, effective_irradiance: f64, cell_temperature: f64) -> f64 {
        let ee = effective_irradiance / REFERENCE_IRRADIANCE;
        if ee <= 0. {
            // no output without irradiance; NaN effective irradiance falls
            // through and stays NaN for the reducer to scrub
            return 0.;
        }
        let thermal_voltage =
            self.diode_factor * BOLTZMANN * (cell_temperature + 273.15) / ELEMENTARY_CHARGE;
        let log_ee = ee.ln();
        let temp_delta = cell_temperature - REFERENCE_CELL_TEMPERATURE;

        let i_mp = self.impo * (self.c0 * ee + self.c1 * ee * ee) * (1. + self.aimp * temp_delta);
        let bvmpo = self.bvmpo + self.mbvmp * (1. - ee);
        let v_mp = (self.vmpo
            + self.c2 * self.cells_in_series * thermal_voltage * log_ee
            + self.c3 * self.cells_in_series * (thermal_voltage * log_ee).powi(2)
            + bvmpo * temp_delta)
            .max(0.);
        i_mp * v_mp
    }

    /// Nameplate rating: output at reference irradiance and temperature.
    pub fn rated_power_w(&self) -> f64 {
        self.max_power_point(REFERENCE_IRRADIANCE, REFERENCE_CELL_TEMPERATURE)
    }
}

/// SAPM cell-temperature coefficients for one mounting configuration.
#[derive(Clone, Copy, Debug)]
pub struct CellTemperatureParameters {
    pub a: f64,
    pub b: f64,
    pub delta_t: f64,
}

/// Open-rack glass/glass mounting. Of the standard mounting
/// configurations this shows the larger temperature swing (deltaT 3) and a
/// stronger power loss with temperature than close-roof mounting, which is
/// the conservative choice for free-field and rooftop-rack fleets.
pub const OPEN_RACK_GLASS_GLASS: CellTemperatureParameters = CellTemperatureParameters {
    a: -3.47,
    b: -0.0594,
    delta_t: 3.,
};

fn cosd(angle_deg: f64) -> f64 {
    angle_deg.to_radians().cos()
}

fn sind(angle_deg: f64) -> f64 {
    angle_deg.to_radians().sin()
}

/// Cosine of the angle between the panel normal and the sun ray.
pub(crate) fn incidence_projection(
    tilt_deg: f64,
    panel_azimuth_deg: f64,
    solar_zenith_deg: f64,
    solar_azimuth_deg: f64,
) -> f64 {
    cosd(tilt_deg) * cosd(solar_zenith_deg)
        + sind(tilt_deg) * sind(solar_zenith_deg) * cosd(solar_azimuth_deg - panel_azimuth_deg)
}

/// Derived direct-normal irradiance with the consistency corrections: never
/// negative, implausible near-horizon values removed, and optionally clamped
/// against a clear-sky series. Removed values are NaN so that downstream
/// irradiance terms stay flagged until the reducer zeroes them.
pub(crate) fn direct_normal_irradiance(
    ghi: f64,
    dhi: f64,
    zenith_deg: f64,
    clearsky_dni: Option<f64>,
) -> f64 {
    let mut dni = (ghi - dhi) / cosd(zenith_deg);
    if dni < 0. {
        return f64::NAN;
    }
    if zenith_deg >= ZENITH_THRESHOLD_FOR_ZERO_DNI && dni != 0. {
        return f64::NAN;
    }
    if let Some(clearsky) = clearsky_dni {
        let max_dni = clearsky * CLEARSKY_TOLERANCE;
        if zenith_deg >= ZENITH_THRESHOLD_FOR_CLEARSKY_LIMIT
            && zenith_deg < ZENITH_THRESHOLD_FOR_ZERO_DNI
            && dni > max_dni
        {
            dni = max_dni;
        }
    }
    dni
}

/// In-plane direct irradiance. NaN DNI stays NaN; otherwise negative
/// projections contribute nothing.
fn plane_of_array_direct(dni: f64, incidence_deg: f64) -> f64 {
    if dni.is_nan() {
        return f64::NAN;
    }
    (dni * cosd(incidence_deg)).max(0.)
}

/// Isotropic in-plane sky diffuse irradiance.
fn sky_diffuse_isotropic(tilt_deg: f64, dhi: f64) -> f64 {
    dhi * (1. + cosd(tilt_deg)) * 0.5
}

/// In-plane irradiance reflected off the ground.
fn ground_reflected_diffuse(tilt_deg: f64, ghi: f64, albedo: f64) -> f64 {
    ghi * albedo * (1. - cosd(tilt_deg)) * 0.5
}

/// SAPM cell temperature from in-plane irradiance, ambient temperature and
/// wind speed.
fn cell_temperature(
    poa_global: f64,
    air_temperature_c: f64,
    wind_speed: f64,
    parameters: CellTemperatureParameters,
) -> f64 {
    let module_temperature =
        poa_global * (parameters.a + parameters.b * wind_speed).exp() + air_temperature_c;
    module_temperature + poa_global / REFERENCE_IRRADIANCE * parameters.delta_t
}

/// Pressure-corrected (absolute) air mass along the slant path at a given
/// solar zenith angle. Beyond ~94 degrees the path term is undefined and
/// the result is NaN, which keeps those hours flagged.
pub(crate) fn absolute_airmass(surface_pressure: f64, zenith_deg: f64) -> f64 {
    (surface_pressure / STANDARD_PRESSURE)
        / (zenith_deg.to_radians() + 0.5 * (93.885 - zenith_deg).powf(-1.253)).cos()
}

fn polyval(coefficients: &[f64], x: f64) -> f64 {
    coefficients
        .iter()
        .enumerate()
        .map(|(power, coefficient)| coefficient * x.powi(power as i32))
        .sum()
}

/// SAPM effective irradiance, in W/m2: in-plane direct and diffuse
/// components weighted by the spectral (air mass) and incidence-angle
/// corrections of the module.
fn effective_irradiance(
    poa_direct: f64,
    poa_diffuse: f64,
    airmass_absolute: f64,
    incidence_deg: f64,
    module: &SapmModule,
) -> f64 {
    let spectral = polyval(&module.airmass_coefficients, airmass_absolute);
    let incidence = polyval(&module.incidence_coefficients, incidence_deg).max(0.);
    spectral * (poa_direct * incidence + module.diffuse_fraction * poa_diffuse)
}

pub struct SolarPowerModel {
    angles: Arc<dyn SolarAngleStore>,
    angle_reference_year: i32,
    module: SapmModule,
    thermal: CellTemperatureParameters,
    module_rated_power_w: f64,
}

impl SolarPowerModel {
    pub fn new(angles: Arc<dyn SolarAngleStore>, angle_reference_year: i32) -> Self {
        Self {
            angles,
            angle_reference_year,
            module: REFERENCE_MODULE,
            thermal: OPEN_RACK_GLASS_GLASS,
            module_rated_power_w: REFERENCE_MODULE.rated_power_w(),
        }
    }

    pub fn module_rated_power_w(&self) -> f64 {
        self.module_rated_power_w
    }
}

impl PowerModel for SolarPowerModel {
    fn technology(&self) -> Technology {
        Technology::Solar
    }

    fn required_variables(&self) -> &'static [WeatherVariable] {
        &SOLAR_VARIABLES
    }

    fn unit_power(
        &self,
        unit: &EnergyUnit,
        point: GridPoint,
        window: &WeatherWindow,
        simulation_year: i32,
    ) -> anyhow::Result<ModelOutput> {
        let TechnologyAttributes::Solar {
            azimuth_deg,
            tilt_deg,
        } = unit.attributes
        else {
            bail!("unit {} is not a solar unit", unit.id);
        };

        let Some(angles) = self.angles.series_for(point, self.angle_reference_year) else {
            return Ok(ModelOutput::NotComputable {
                reason: format!(
                    "no solar angle series for grid point ({}, {})",
                    point.latitude, point.longitude
                ),
            });
        };
        let angles = angles.aligned_to(simulation_year);
        let hours = window.hours();
        if angles.zenith.len() != hours {
            bail!(
                "aligned solar angle series has {} hours, weather window {}",
                angles.zenith.len(),
                hours
            );
        }

        let u = window.series(WeatherVariable::UWind10m)?;
        let v = window.series(WeatherVariable::VWind10m)?;
        let ghi_cumulative = window.series(WeatherVariable::GlobalHorizontalIrradiance)?;
        let direct_cumulative = window.series(WeatherVariable::DirectHorizontalIrradiance)?;
        let pressure = window.series(WeatherVariable::SurfacePressure)?;
        let temperature_k = window.series(WeatherVariable::Temperature2m)?;
        let albedo = window.series(WeatherVariable::DiffuseAlbedo)?;

        let projection_threshold = cosd(MIN_PROJECTION_ANGLE_DEG);
        let mut power_w = Vec::with_capacity(hours);

        for hour in 0..hours {
            // cumulative J/m2 over the hour to instantaneous W/m2
            let ghi = ghi_cumulative[hour] / SECONDS_PER_HOUR as f64;
            let direct_horizontal = direct_cumulative[hour] / SECONDS_PER_HOUR as f64;
            let dhi = ghi - direct_horizontal;
            let wind_speed = (u[hour].powi(2) + v[hour].powi(2)).sqrt();
            let air_temperature_c = kelvin_to_celsius(temperature_k[hour])?;
            let zenith = angles.zenith[hour];

            let mut projection =
                incidence_projection(tilt_deg, azimuth_deg, zenith, angles.azimuth[hour]);
            if projection < projection_threshold {
                // sun behind the panel plane: this hour cannot produce
                projection = 0.;
            }
            let incidence_deg = projection.acos().to_degrees();

            let dni = direct_normal_irradiance(ghi, dhi, incidence_deg, None);
            let poa_direct = plane_of_array_direct(dni, incidence_deg);
            let poa_diffuse = sky_diffuse_isotropic(tilt_deg, dhi)
                + ground_reflected_diffuse(tilt_deg, ghi, albedo[hour]);
            let poa_global = poa_direct + poa_diffuse;

            let cell_temp = cell_temperature(poa_global, air_temperature_c, wind_speed, self.thermal);
            let airmass = absolute_airmass(pressure[hour], zenith);
            let irradiance =
                effective_irradiance(poa_direct, poa_diffuse, airmass, incidence_deg, &self.module);

            power_w.push(self.module.max_power_point(irradiance, cell_temp));
        }

        Ok(ModelOutput::Computed(UnitPower {
            power_w,
            reference_max_power_w: self.module_rated_power_w,
            mapping_note: None,
        }))
    }
}
