//! Normalises a raw power series into hourly/monthly/yearly capacity-factor
//! and energy records for one unit, shared by both technologies.

use crate::catalog::EnergyUnit;
use crate::core::units::WATTS_PER_KILOWATT;
use crate::core::UnitPower;
use crate::statistics::{monthly_statistics, mean, round_to, MonthlyStatistic};
use crate::storage::{HourlyRecord, MonthlyRecord, RecordMeta, YearlyRecord};
use anyhow::bail;

/// Decimal places kept on capacity factors and monthly energies.
const RESULT_DECIMALS: u32 = 4;

/// The three records produced for one (unit, year). Hourly retention is a
/// storage trade-off and entirely optional.
#[derive(Clone, Debug)]
pub struct ReducedRecords {
    pub hourly: Option<HourlyRecord>,
    pub monthly: MonthlyRecord,
    pub yearly: YearlyRecord,
}

#[derive(Clone, Debug)]
pub struct CapacityFactorReducer {
    pub save_hourly: bool,
    pub software_version: String,
    pub outfile_postfix: String,
}

impl CapacityFactorReducer {
    fn meta(&self, no_calc_reason: Option<String>) -> RecordMeta {
        RecordMeta {
            software_version: self.software_version.clone(),
            outfile_postfix: self.outfile_postfix.clone(),
            no_calc_reason,
        }
    }

    /// Reduce one unit's raw power series.
    ///
    /// Non-numeric power samples become zero before anything else, so an
    /// optional curtailment multiplier scales every hour uniformly. The
    /// hourly capacity factor normalises against the reference device's
    /// maximum power; the unit's own hourly energy is the capacity factor
    /// scaled by its rated net capacity, which absorbs any size mismatch
    /// between the unit and the reference device it was mapped to.
    pub fn reduce(
        &self,
        unit: &EnergyUnit,
        year: i32,
        power: &UnitPower,
        curtailment_multiplier: Option<f64>,
    ) -> anyhow::Result<ReducedRecords> {
        if power.reference_max_power_w <= 0. {
            bail!(
                "reference maximum power {} for unit {} is not positive",
                power.reference_max_power_w,
                unit.id
            );
        }
        let max_power_kw = power.reference_max_power_w / WATTS_PER_KILOWATT as f64;

        let power_kw = power
            .power_w
            .iter()
            .map(|&watts| {
                let rounded = round_to(watts, RESULT_DECIMALS) / WATTS_PER_KILOWATT as f64;
                let cleaned = if rounded.is_finite() { rounded } else { 0. };
                cleaned * curtailment_multiplier.unwrap_or(1.)
            })
            .collect::<Vec<_>>();

        let capacity_factor = power_kw
            .iter()
            .map(|kw| round_to(kw / max_power_kw, RESULT_DECIMALS))
            .collect::<Vec<_>>();
        let energy_kwh = capacity_factor
            .iter()
            .map(|cf| cf * unit.net_capacity_kw)
            .collect::<Vec<_>>();

        let monthly_energy = monthly_statistics(&energy_kwh, MonthlyStatistic::Sum)?
            .map(|value| round_to(value, RESULT_DECIMALS));
        let monthly_cf = monthly_statistics(&capacity_factor, MonthlyStatistic::Mean)?
            .map(|value| round_to(value, RESULT_DECIMALS));

        let yearly_energy = round_to(energy_kwh.iter().sum(), 0);
        let yearly_cf = round_to(mean(&capacity_factor), RESULT_DECIMALS);

        Ok(ReducedRecords {
            hourly: self.save_hourly.then(|| HourlyRecord {
                unit_id: unit.id.clone(),
                year,
                energy_kwh,
                capacity_factor: capacity_factor.clone(),
                meta: self.meta(None),
            }),
            monthly: MonthlyRecord {
                unit_id: unit.id.clone(),
                year,
                energy_kwh: monthly_energy.to_vec(),
                capacity_factor: monthly_cf.to_vec(),
                meta: self.meta(None),
            },
            yearly: YearlyRecord {
                unit_id: unit.id.clone(),
                year,
                energy_kwh: yearly_energy,
                capacity_factor: yearly_cf,
                meta: self.meta(None),
            },
        })
    }

    /// Zero-valued records tagged with the reason the unit could not be
    /// simulated - a placeholder, not a true zero-output reading.
    pub fn placeholder(&self, unit: &EnergyUnit, year: i32, reason: &str) -> ReducedRecords {
        let reason = Some(reason.to_owned());
        ReducedRecords {
            hourly: self.save_hourly.then(|| HourlyRecord {
                unit_id: unit.id.clone(),
                year,
                energy_kwh: vec![0.],
                capacity_factor: vec![0.],
                meta: self.meta(reason.clone()),
            }),
            monthly: MonthlyRecord {
                unit_id: unit.id.clone(),
                year,
                energy_kwh: vec![0.],
                capacity_factor: vec![0.],
                meta: self.meta(reason.clone()),
            },
            yearly: YearlyRecord {
                unit_id: unit.id.clone(),
                year,
                energy_kwh: 0.,
                capacity_factor: 0.,
                meta: self.meta(reason),
            },
        }
    }
}
