//! Result persistence behind an explicitly constructed, dependency-injected
//! store handle. The engine only ever talks to the `ResultStore` trait;
//! the in-memory implementation backs tests and CSV-only runs.

use crate::catalog::{KeyString, Technology};
use crate::errors::FlushError;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};

/// Conflict handling for a batch upsert keyed by (unit id, year).
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConflictPolicy {
    /// Insert rows whose key is new, leave existing rows untouched.
    SkipExisting,
    /// Insert new rows and replace existing rows.
    #[default]
    Overwrite,
    /// Stage the batch and update only rows that already exist, never
    /// inserting - the join-table path used when refreshing columns of
    /// already-committed rows.
    UpdateJoin,
}

/// Tagging carried on every stored record.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct RecordMeta {
    pub software_version: String,
    pub outfile_postfix: String,
    /// When set, the record is a reason-tagged placeholder and every
    /// numeric field is zero.
    pub no_calc_reason: Option<String>,
}

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct HourlyRecord {
    pub unit_id: KeyString,
    pub year: i32,
    /// Estimated unit energy per hour, in kWh.
    pub energy_kwh: Vec<f64>,
    /// Capacity factor per hour.
    pub capacity_factor: Vec<f64>,
    pub meta: RecordMeta,
}

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct MonthlyRecord {
    pub unit_id: KeyString,
    pub year: i32,
    /// Summed unit energy per calendar month, in kWh.
    pub energy_kwh: Vec<f64>,
    /// Mean capacity factor per calendar month.
    pub capacity_factor: Vec<f64>,
    pub meta: RecordMeta,
}

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct YearlyRecord {
    pub unit_id: KeyString,
    pub year: i32,
    /// Summed unit energy over the year, in kWh.
    pub energy_kwh: f64,
    /// Mean capacity factor over the year.
    pub capacity_factor: f64,
    pub meta: RecordMeta,
}

pub trait ResultStore: Send + Sync {
    fn upsert_hourly(
        &self,
        technology: Technology,
        batch: Vec<HourlyRecord>,
        policy: ConflictPolicy,
    ) -> Result<(), FlushError>;

    fn upsert_monthly(
        &self,
        technology: Technology,
        batch: Vec<MonthlyRecord>,
        policy: ConflictPolicy,
    ) -> Result<(), FlushError>;

    fn upsert_yearly(
        &self,
        technology: Technology,
        batch: Vec<YearlyRecord>,
        policy: ConflictPolicy,
    ) -> Result<(), FlushError>;

    /// All stored rows, ordered by (unit id, year).
    fn hourly_results(&self, technology: Technology) -> Vec<HourlyRecord>;
    fn monthly_results(&self, technology: Technology) -> Vec<MonthlyRecord>;
    fn yearly_results(&self, technology: Technology) -> Vec<YearlyRecord>;

    /// Unit ids that already have a yearly row for the given year - the
    /// anti-join input for incremental runs.
    fn units_with_yearly_result(&self, technology: Technology, year: i32) -> HashSet<KeyString>;
}

type TableKey = (KeyString, i32);

#[derive(Debug, Default)]
struct Tables {
    hourly: BTreeMap<TableKey, HourlyRecord>,
    monthly: BTreeMap<TableKey, MonthlyRecord>,
    yearly: BTreeMap<TableKey, YearlyRecord>,
}

/// In-memory result store. Every upsert validates the whole batch before
/// touching a table, so a rejected batch leaves the store unchanged.
#[derive(Debug, Default)]
pub struct InMemoryResultStore {
    tables: RwLock<HashMap<Technology, Tables>>,
}

impl InMemoryResultStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn table_name(technology: Technology, granularity: &str) -> String {
    format!("results_{technology}_{granularity}")
}

/// Whole-batch validation: per-row series lengths (a full year of entries or
/// the single-element placeholder) and in-batch key uniqueness. Runs before
/// any row is applied, which makes the flush all-or-nothing.
fn validate_batch(
    table: &str,
    keys: impl Iterator<Item = TableKey>,
    series_lens: impl Iterator<Item = (usize, usize)>,
    valid_lens: &[usize],
) -> Result<(), FlushError> {
    let mut seen: HashSet<TableKey> = HashSet::new();
    for ((unit_id, year), (energy_len, cf_len)) in keys.zip(series_lens) {
        if !valid_lens.contains(&energy_len) || !valid_lens.contains(&cf_len) {
            return Err(FlushError::Rejected {
                table: table.to_owned(),
                reason: format!(
                    "({unit_id}, {year}) has series lengths {energy_len}/{cf_len}, expected one of {valid_lens:?}"
                ),
            });
        }
        if !seen.insert((unit_id.clone(), year)) {
            return Err(FlushError::DuplicateKey {
                table: table.to_owned(),
                unit_id: unit_id.to_string(),
                year,
            });
        }
    }
    Ok(())
}

fn apply_batch<R>(
    table: &mut BTreeMap<TableKey, R>,
    batch: Vec<R>,
    policy: ConflictPolicy,
    key: impl Fn(&R) -> TableKey,
) {
    for record in batch {
        let record_key = key(&record);
        match policy {
            ConflictPolicy::SkipExisting => {
                table.entry(record_key).or_insert(record);
            }
            ConflictPolicy::Overwrite => {
                table.insert(record_key, record);
            }
            ConflictPolicy::UpdateJoin => {
                if let Some(existing) = table.get_mut(&record_key) {
                    *existing = record;
                }
            }
        }
    }
}

impl ResultStore for InMemoryResultStore {
    fn upsert_hourly(
        &self,
        technology: Technology,
        batch: Vec<HourlyRecord>,
        policy: ConflictPolicy,
    ) -> Result<(), FlushError> {
        validate_batch(
            &table_name(technology, "hourly"),
            batch.iter().map(|r| (r.unit_id.clone(), r.year)),
            batch
                .iter()
                .map(|r| (r.energy_kwh.len(), r.capacity_factor.len())),
            &[8_760, 8_784, 1],
        )?;
        let mut tables = self.tables.write();
        apply_batch(
            &mut tables.entry(technology).or_default().hourly,
            batch,
            policy,
            |r| (r.unit_id.clone(), r.year),
        );
        Ok(())
    }

    fn upsert_monthly(
        &self,
        technology: Technology,
        batch: Vec<MonthlyRecord>,
        policy: ConflictPolicy,
    ) -> Result<(), FlushError> {
        validate_batch(
            &table_name(technology, "monthly"),
            batch.iter().map(|r| (r.unit_id.clone(), r.year)),
            batch
                .iter()
                .map(|r| (r.energy_kwh.len(), r.capacity_factor.len())),
            &[12, 1],
        )?;
        let mut tables = self.tables.write();
        apply_batch(
            &mut tables.entry(technology).or_default().monthly,
            batch,
            policy,
            |r| (r.unit_id.clone(), r.year),
        );
        Ok(())
    }

    fn upsert_yearly(
        &self,
        technology: Technology,
        batch: Vec<YearlyRecord>,
        policy: ConflictPolicy,
    ) -> Result<(), FlushError> {
        validate_batch(
            &table_name(technology, "yearly"),
            batch.iter().map(|r| (r.unit_id.clone(), r.year)),
            batch.iter().map(|_| (1, 1)),
            &[1],
        )?;
        let mut tables = self.tables.write();
        apply_batch(
            &mut tables.entry(technology).or_default().yearly,
            batch,
            policy,
            |r| (r.unit_id.clone(), r.year),
        );
        Ok(())
    }

    fn hourly_results(&self, technology: Technology) -> Vec<HourlyRecord> {
        self.tables
            .read()
            .get(&technology)
            .map(|tables| tables.hourly.values().cloned().collect())
            .unwrap_or_default()
    }

    fn monthly_results(&self, technology: Technology) -> Vec<MonthlyRecord> {
        self.tables
            .read()
            .get(&technology)
            .map(|tables| tables.monthly.values().cloned().collect())
            .unwrap_or_default()
    }

    fn yearly_results(&self, technology: Technology) -> Vec<YearlyRecord> {
        self.tables
            .read()
            .get(&technology)
            .map(|tables| tables.yearly.values().cloned().collect())
            .unwrap_or_default()
    }

    fn units_with_yearly_result(&self, technology: Technology, year: i32) -> HashSet<KeyString> {
        self.tables
            .read()
            .get(&technology)
            .map(|tables| {
                tables
                    .yearly
                    .keys()
                    .filter(|(_, record_year)| *record_year == year)
                    .map(|(unit_id, _)| unit_id.clone())
                    .collect()
            })
            .unwrap_or_default()
    }
}
