//! Re-derives unit-level yearly results into grouped summary statistics:
//! per geography, and per geography and year split into the
//! "as-commissioned" and "as-running" cohorts.

use crate::catalog::{EnergyUnit, KeyString, Technology, UnitCatalog, UnitFilter};
use crate::statistics::{mean, weighted_mean};
use crate::storage::{ResultStore, YearlyRecord};
use indexmap::IndexMap;
use itertools::Itertools;
use std::collections::HashMap;
use strum::IntoEnumIterator;
use strum_macros::{Display, EnumIter};
use tracing::info;

/// Geography key used when a unit has no municipality key or state. The
/// postal-code level groups unknowns under the empty string instead.
const MISSING_GEOGRAPHY: &str = "MISSING";

#[derive(Clone, Copy, Debug, Display, EnumIter, Eq, Hash, PartialEq)]
pub enum GeoLevel {
    /// Finest: municipality key, with its centroid coordinates.
    #[strum(serialize = "ags")]
    Municipality,
    /// Mid: postal code, with its centroid coordinates.
    #[strum(serialize = "plz")]
    PostalCode,
    /// Coarse: state, without coordinates.
    #[strum(serialize = "bl")]
    State,
}

/// One unit flattened for grouping: geography keys, lifecycle years and its
/// all-years average capacity factor (absent when it has no yearly results).
#[derive(Clone, Debug)]
struct UnitProfile {
    unit_id: KeyString,
    net_capacity_kw: f64,
    commissioning_year: i32,
    decommissioning_year: i32,
    avg_cf: Option<f64>,
}

impl UnitProfile {
    fn geography(unit: &EnergyUnit, level: GeoLevel) -> (KeyString, Option<f64>, Option<f64>) {
        match level {
            GeoLevel::Municipality => (
                unit.municipality_key
                    .as_deref()
                    .unwrap_or(MISSING_GEOGRAPHY)
                    .into(),
                unit.municipality_latitude,
                unit.municipality_longitude,
            ),
            GeoLevel::PostalCode => (
                unit.postal_code.as_deref().unwrap_or("").into(),
                unit.postal_latitude,
                unit.postal_longitude,
            ),
            GeoLevel::State => (
                unit.state.as_deref().unwrap_or(MISSING_GEOGRAPHY).into(),
                None,
                None,
            ),
        }
    }
}

/// Geography-only aggregate over all units of the group.
#[derive(Clone, Debug, PartialEq)]
pub struct GeoAggregate {
    pub key: KeyString,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    /// Unweighted mean of the units' all-years average capacity factors.
    pub mean_cf: Option<f64>,
    /// Capacity-weighted mean of the same; None when the group's summed
    /// capacity is zero.
    pub weighted_mean_cf: Option<f64>,
    pub total_capacity_kw: f64,
    pub unit_count: usize,
}

/// Statistics of one cohort within one (geography, year) cell.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CohortStats {
    /// Mean capacity factor of the cohort in that calendar year.
    pub mean_cf_y: Option<f64>,
    pub weighted_mean_cf_y: Option<f64>,
    /// Mean of the cohort units' all-years average capacity factors.
    pub mean_avg_cf: Option<f64>,
    pub weighted_mean_avg_cf: Option<f64>,
    /// Summed energy of the cohort in that calendar year, in kWh; None when
    /// no cohort unit has a result for the year.
    pub energy_kwh: Option<f64>,
    pub unit_count: usize,
    pub capacity_kw: f64,
}

/// One row of the geography-by-year table: the geography totals joined with
/// the two cohorts. A cell present in only one cohort keeps the other None.
#[derive(Clone, Debug, PartialEq)]
pub struct GeoYearAggregate {
    pub key: KeyString,
    pub year: i32,
    pub totals: GeoAggregate,
    pub commissioned: Option<CohortStats>,
    pub running: Option<CohortStats>,
}

#[derive(Clone, Debug, Default)]
pub struct LevelAggregates {
    pub geography: Vec<GeoAggregate>,
    pub geography_year: Vec<GeoYearAggregate>,
}

/// All aggregate tables for one technology, keyed by geographic level.
#[derive(Clone, Debug, Default)]
pub struct AggregationResult {
    pub technology: Option<Technology>,
    pub levels: IndexMap<GeoLevel, LevelAggregates>,
}

pub struct AggregationEngine<'a> {
    catalog: &'a dyn UnitCatalog,
    store: &'a dyn ResultStore,
}

impl<'a> AggregationEngine<'a> {
    pub fn new(catalog: &'a dyn UnitCatalog, store: &'a dyn ResultStore) -> Self {
        Self { catalog, store }
    }

    pub fn aggregate(&self, technology: Technology) -> anyhow::Result<AggregationResult> {
        info!("aggregating {technology} units");
        let units = self
            .catalog
            .list_units(technology, &UnitFilter::default())?;
        let yearly = self.store.yearly_results(technology);

        let mut results_by_unit: HashMap<KeyString, Vec<&YearlyRecord>> = HashMap::new();
        for record in &yearly {
            results_by_unit
                .entry(record.unit_id.clone())
                .or_default()
                .push(record);
        }

        let mut result = AggregationResult {
            technology: Some(technology),
            levels: IndexMap::new(),
        };
        for level in GeoLevel::iter() {
            info!("creating {technology} aggregation on {level} level");
            result
                .levels
                .insert(level, self.aggregate_level(&units, &results_by_unit, level));
        }
        Ok(result)
    }

    fn aggregate_level(
        &self,
        units: &[EnergyUnit],
        results_by_unit: &HashMap<KeyString, Vec<&YearlyRecord>>,
        level: GeoLevel,
    ) -> LevelAggregates {
        // grouped profiles, preserving first-seen geography order
        let mut groups: IndexMap<KeyString, (Option<f64>, Option<f64>, Vec<UnitProfile>)> =
            IndexMap::new();
        for unit in units {
            let (key, latitude, longitude) = UnitProfile::geography(unit, level);
            let records = results_by_unit.get(&unit.id);
            let avg_cf = records.map(|records| {
                mean(
                    &records
                        .iter()
                        .map(|record| record.capacity_factor)
                        .collect::<Vec<_>>(),
                )
            });
            let profile = UnitProfile {
                unit_id: unit.id.clone(),
                net_capacity_kw: unit.net_capacity_kw,
                commissioning_year: unit.commissioning_year(),
                decommissioning_year: unit.decommissioning_year(),
                avg_cf,
            };
            let entry = groups
                .entry(key)
                .or_insert_with(|| (latitude, longitude, Vec::new()));
            entry.2.push(profile);
        }
        groups.sort_keys();

        let mut geography = Vec::new();
        let mut geography_year = Vec::new();

        for (key, (latitude, longitude, profiles)) in groups {
            let totals = geo_totals(&key, latitude, longitude, &profiles);

            let commissioned = commissioned_cohorts(&profiles, results_by_unit);
            let running = running_cohorts(&profiles, results_by_unit);

            // full outer join of the two cohort maps on the year
            let years = commissioned
                .keys()
                .chain(running.keys())
                .copied()
                .unique()
                .sorted()
                .collect::<Vec<_>>();
            for year in years {
                geography_year.push(GeoYearAggregate {
                    key: key.clone(),
                    year,
                    totals: totals.clone(),
                    commissioned: commissioned.get(&year).cloned(),
                    running: running.get(&year).cloned(),
                });
            }

            geography.push(totals);
        }

        LevelAggregates {
            geography,
            geography_year,
        }
    }
}

fn geo_totals(
    key: &KeyString,
    latitude: Option<f64>,
    longitude: Option<f64>,
    profiles: &[UnitProfile],
) -> GeoAggregate {
    let with_avg = profiles
        .iter()
        .filter_map(|profile| profile.avg_cf.map(|avg| (avg, profile.net_capacity_kw)))
        .collect::<Vec<_>>();
    let avg_values = with_avg.iter().map(|(avg, _)| *avg).collect::<Vec<_>>();
    let total_capacity_kw: f64 = profiles.iter().map(|profile| profile.net_capacity_kw).sum();

    GeoAggregate {
        key: key.clone(),
        latitude,
        longitude,
        mean_cf: (!avg_values.is_empty()).then(|| mean(&avg_values)),
        // numerator skips units without results, the denominator counts the
        // whole group's capacity
        weighted_mean_cf: if total_capacity_kw > 0. {
            Some(
                with_avg
                    .iter()
                    .map(|(avg, capacity)| avg * capacity)
                    .sum::<f64>()
                    / total_capacity_kw,
            )
        } else {
            None
        },
        total_capacity_kw,
        unit_count: profiles.len(),
    }
}

/// "As-commissioned": units grouped by their commissioning year, evaluated
/// against that same calendar year's results.
fn commissioned_cohorts(
    profiles: &[UnitProfile],
    results_by_unit: &HashMap<KeyString, Vec<&YearlyRecord>>,
) -> IndexMap<i32, CohortStats> {
    let mut cohorts: IndexMap<i32, Vec<&UnitProfile>> = IndexMap::new();
    for profile in profiles {
        cohorts
            .entry(profile.commissioning_year)
            .or_default()
            .push(profile);
    }

    cohorts
        .into_iter()
        .map(|(year, members)| {
            let matched = members
                .iter()
                .filter_map(|profile| {
                    results_by_unit
                        .get(&profile.unit_id)
                        .and_then(|records| {
                            records.iter().find(|record| record.year == year)
                        })
                        .map(|record| (*profile, *record))
                })
                .collect::<Vec<_>>();

            let cf_values = matched
                .iter()
                .map(|(_, record)| record.capacity_factor)
                .collect::<Vec<_>>();
            let (avg_values, _) = avg_cf_pairs(&members);
            // the whole cohort's capacity is the weighting denominator, also
            // for members without a matching result
            let capacity_kw: f64 = members.iter().map(|profile| profile.net_capacity_kw).sum();

            let stats = CohortStats {
                mean_cf_y: (!cf_values.is_empty()).then(|| mean(&cf_values)),
                weighted_mean_cf_y: cohort_weighted_mean(
                    matched
                        .iter()
                        .map(|(profile, record)| {
                            record.capacity_factor * profile.net_capacity_kw
                        })
                        .sum(),
                    capacity_kw,
                ),
                mean_avg_cf: (!avg_values.is_empty()).then(|| mean(&avg_values)),
                weighted_mean_avg_cf: cohort_weighted_mean(
                    members
                        .iter()
                        .filter_map(|profile| {
                            profile.avg_cf.map(|avg| avg * profile.net_capacity_kw)
                        })
                        .sum(),
                    capacity_kw,
                ),
                energy_kwh: (!matched.is_empty())
                    .then(|| matched.iter().map(|(_, record)| record.energy_kwh).sum()),
                unit_count: members.len(),
                capacity_kw,
            };
            (year, stats)
        })
        .collect()
}

/// "As-running": for every result year, the units commissioned on or before
/// it and not yet decommissioned (strictly later decommissioning year).
fn running_cohorts(
    profiles: &[UnitProfile],
    results_by_unit: &HashMap<KeyString, Vec<&YearlyRecord>>,
) -> IndexMap<i32, CohortStats> {
    // (profile, result) pairs for every year the unit was running in
    let mut rows: IndexMap<i32, Vec<(&UnitProfile, &YearlyRecord)>> = IndexMap::new();
    for profile in profiles {
        let Some(records) = results_by_unit.get(&profile.unit_id) else {
            continue;
        };
        for record in records {
            if profile.commissioning_year <= record.year
                && record.year < profile.decommissioning_year
            {
                rows.entry(record.year).or_default().push((profile, *record));
            }
        }
    }

    rows.into_iter()
        .map(|(year, members)| {
            let cf_values = members
                .iter()
                .map(|(_, record)| record.capacity_factor)
                .collect::<Vec<_>>();
            let weights = members
                .iter()
                .map(|(profile, _)| profile.net_capacity_kw)
                .collect::<Vec<_>>();
            let member_profiles = members
                .iter()
                .map(|(profile, _)| *profile)
                .collect::<Vec<_>>();
            let (avg_values, avg_weights) = avg_cf_pairs(&member_profiles);

            let stats = CohortStats {
                mean_cf_y: Some(mean(&cf_values)),
                weighted_mean_cf_y: weighted_mean(&cf_values, &weights),
                mean_avg_cf: (!avg_values.is_empty()).then(|| mean(&avg_values)),
                weighted_mean_avg_cf: weighted_mean(&avg_values, &avg_weights),
                energy_kwh: Some(members.iter().map(|(_, record)| record.energy_kwh).sum()),
                unit_count: members.len(),
                capacity_kw: weights.iter().sum(),
            };
            (year, stats)
        })
        .collect()
}

fn avg_cf_pairs(profiles: &[&UnitProfile]) -> (Vec<f64>, Vec<f64>) {
    profiles
        .iter()
        .filter_map(|profile| profile.avg_cf.map(|avg| (avg, profile.net_capacity_kw)))
        .unzip()
}

fn cohort_weighted_mean(product_sum: f64, capacity_sum: f64) -> Option<f64> {
    (capacity_sum > 0.).then(|| product_sum / capacity_sum)
}
