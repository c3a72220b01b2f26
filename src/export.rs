//! Batched CSV export of the per-unit result tables and wholesale CSV
//! output of the aggregate tables.
//!
//! Exports run in row batches: the first batch creates the file and writes
//! the header, every following batch appends. An export whose first batch
//! comes back empty writes nothing and logs a warning - usually a year with
//! no computed results or a unit filter matching no rows of the technology.

use crate::catalog::{KeyString, Technology};
use crate::core::aggregation::{AggregationResult, CohortStats, GeoYearAggregate};
use crate::output::Output;
use crate::storage::{MonthlyRecord, RecordMeta, ResultStore, YearlyRecord};
use anyhow::anyhow;
use csv::{ReaderBuilder as CsvReaderBuilder, WriterBuilder as CsvWriterBuilder};
use std::io::{Read, Write};
use tracing::{info, warn};

const YEARLY_HEADER: [&str; 7] = [
    "unit_id",
    "year",
    "energy_y",
    "cf_y",
    "software_version",
    "outfile_postfix",
    "no_calc_reason",
];

const MONTHLY_HEADER: [&str; 7] = [
    "unit_id",
    "year",
    "energy_m",
    "cf_m",
    "software_version",
    "outfile_postfix",
    "no_calc_reason",
];

/// Which rows of a result table to export.
#[derive(Clone, Debug, Default)]
pub struct ExportFilter {
    pub unit_ids: Option<Vec<KeyString>>,
    pub years: Option<Vec<i32>>,
}

impl ExportFilter {
    fn matches(&self, unit_id: &KeyString, year: i32) -> bool {
        if let Some(ids) = &self.unit_ids {
            if !ids.contains(unit_id) {
                return false;
            }
        }
        if let Some(years) = &self.years {
            if !years.contains(&year) {
                return false;
            }
        }
        true
    }
}

/// Serialise a `;`-joined series cell.
fn series_cell(values: &[f64]) -> String {
    values
        .iter()
        .map(|value| value.to_string())
        .collect::<Vec<_>>()
        .join(";")
}

fn parse_series_cell(cell: &str) -> anyhow::Result<Vec<f64>> {
    cell.split(';')
        .map(|value| value.parse::<f64>().map_err(Into::into))
        .collect()
}

fn optional_cell<T: ToString>(value: &Option<T>) -> String {
    value.as_ref().map(T::to_string).unwrap_or_default()
}

pub fn export_yearly_results(
    store: &dyn ResultStore,
    technology: Technology,
    filter: &ExportFilter,
    batch_size: usize,
    output: &impl Output,
    location_key: &str,
) -> anyhow::Result<usize> {
    let rows = store
        .yearly_results(technology)
        .into_iter()
        .filter(|record| filter.matches(&record.unit_id, record.year))
        .collect::<Vec<_>>();
    export_batched(&rows, batch_size, output, location_key, &YEARLY_HEADER, |record| {
        vec![
            record.unit_id.to_string(),
            record.year.to_string(),
            record.energy_kwh.to_string(),
            record.capacity_factor.to_string(),
            record.meta.software_version.clone(),
            record.meta.outfile_postfix.clone(),
            optional_cell(&record.meta.no_calc_reason),
        ]
    })
}

pub fn export_monthly_results(
    store: &dyn ResultStore,
    technology: Technology,
    filter: &ExportFilter,
    batch_size: usize,
    output: &impl Output,
    location_key: &str,
) -> anyhow::Result<usize> {
    let rows = store
        .monthly_results(technology)
        .into_iter()
        .filter(|record| filter.matches(&record.unit_id, record.year))
        .collect::<Vec<_>>();
    export_batched(&rows, batch_size, output, location_key, &MONTHLY_HEADER, |record| {
        vec![
            record.unit_id.to_string(),
            record.year.to_string(),
            series_cell(&record.energy_kwh),
            series_cell(&record.capacity_factor),
            record.meta.software_version.clone(),
            record.meta.outfile_postfix.clone(),
            optional_cell(&record.meta.no_calc_reason),
        ]
    })
}

fn export_batched<R>(
    rows: &[R],
    batch_size: usize,
    output: &impl Output,
    location_key: &str,
    header: &[&str],
    to_row: impl Fn(&R) -> Vec<String>,
) -> anyhow::Result<usize> {
    if rows.is_empty() {
        warn!(
            "'{location_key}' - no csv exported, the first batch was empty; check the export \
             year and unit filters against the technology's computed results"
        );
        return Ok(0);
    }

    for (batch_index, batch) in rows.chunks(batch_size).enumerate() {
        let writer: Box<dyn Write> = if batch_index == 0 {
            Box::new(output.writer_for_location_key(location_key)?)
        } else {
            Box::new(output.appender_for_location_key(location_key)?)
        };
        let mut csv = CsvWriterBuilder::new().from_writer(writer);
        if batch_index == 0 {
            csv.write_record(header)?;
        }
        for record in batch {
            csv.write_record(to_row(record))?;
        }
        csv.flush()?;
    }

    info!("'{location_key}' exported {} rows to csv", rows.len());
    Ok(rows.len())
}

/// Re-ingest a yearly export. Numeric fields survive bit-for-bit because
/// stored values are already rounded to fixed decimals and serialised with
/// the shortest round-tripping representation.
pub fn read_yearly_csv(reader: impl Read) -> anyhow::Result<Vec<YearlyRecord>> {
    let mut csv = CsvReaderBuilder::new().has_headers(true).from_reader(reader);
    csv.records()
        .map(|result| {
            let record = result?;
            let field = |index: usize| {
                record
                    .get(index)
                    .ok_or_else(|| anyhow!("missing column {index} in yearly export"))
            };
            Ok(YearlyRecord {
                unit_id: field(0)?.into(),
                year: field(1)?.parse()?,
                energy_kwh: field(2)?.parse()?,
                capacity_factor: field(3)?.parse()?,
                meta: RecordMeta {
                    software_version: field(4)?.to_owned(),
                    outfile_postfix: field(5)?.to_owned(),
                    no_calc_reason: match field(6)? {
                        "" => None,
                        reason => Some(reason.to_owned()),
                    },
                },
            })
        })
        .collect()
}

pub fn read_monthly_csv(reader: impl Read) -> anyhow::Result<Vec<MonthlyRecord>> {
    let mut csv = CsvReaderBuilder::new().has_headers(true).from_reader(reader);
    csv.records()
        .map(|result| {
            let record = result?;
            let field = |index: usize| {
                record
                    .get(index)
                    .ok_or_else(|| anyhow!("missing column {index} in monthly export"))
            };
            Ok(MonthlyRecord {
                unit_id: field(0)?.into(),
                year: field(1)?.parse()?,
                energy_kwh: parse_series_cell(field(2)?)?,
                capacity_factor: parse_series_cell(field(3)?)?,
                meta: RecordMeta {
                    software_version: field(4)?.to_owned(),
                    outfile_postfix: field(5)?.to_owned(),
                    no_calc_reason: match field(6)? {
                        "" => None,
                        reason => Some(reason.to_owned()),
                    },
                },
            })
        })
        .collect()
}

/// Write every aggregate table of one technology, each file replaced
/// wholesale, rows already sorted by their natural key.
pub fn write_aggregate_tables(
    result: &AggregationResult,
    output: &impl Output,
) -> anyhow::Result<()> {
    let technology = result
        .technology
        .ok_or_else(|| anyhow!("aggregation result carries no technology"))?;

    for (level, aggregates) in &result.levels {
        let geo_key = format!("agg_{technology}_{level}");
        let mut csv = CsvWriterBuilder::new()
            .from_writer(output.writer_for_location_key(&geo_key)?);
        csv.write_record([
            "tech".to_owned(),
            level.to_string(),
            "lat".to_owned(),
            "lon".to_owned(),
            "mean_cf".to_owned(),
            "weighted_mean_cf".to_owned(),
            "total_capacity_kw".to_owned(),
            "unit_count".to_owned(),
        ])?;
        for row in &aggregates.geography {
            csv.write_record([
                technology.to_string(),
                row.key.to_string(),
                optional_cell(&row.latitude),
                optional_cell(&row.longitude),
                optional_cell(&row.mean_cf),
                optional_cell(&row.weighted_mean_cf),
                row.total_capacity_kw.to_string(),
                row.unit_count.to_string(),
            ])?;
        }
        csv.flush()?;
        info!("wrote {} rows to {geo_key}", aggregates.geography.len());

        let year_key = format!("agg_{technology}_{level}_yr");
        let mut csv = CsvWriterBuilder::new()
            .from_writer(output.writer_for_location_key(&year_key)?);
        let mut header = vec![
            "tech".to_owned(),
            level.to_string(),
            "yr".to_owned(),
            "lat".to_owned(),
            "lon".to_owned(),
            "mean_cf".to_owned(),
            "weighted_mean_cf".to_owned(),
            "total_capacity_kw".to_owned(),
            "unit_count".to_owned(),
        ];
        for cohort in ["act", "run"] {
            header.extend(cohort_header(cohort));
        }
        csv.write_record(&header)?;
        for row in &aggregates.geography_year {
            csv.write_record(geo_year_row(technology, row))?;
        }
        csv.flush()?;
        info!(
            "wrote {} rows to {year_key}",
            aggregates.geography_year.len()
        );
    }
    Ok(())
}

fn cohort_header(prefix: &str) -> Vec<String> {
    [
        "cf_y",
        "cf_y_power_weighted",
        "avg_cf",
        "avg_cf_power_weighted",
        "energy_y",
        "unit_count",
        "capacity_kw",
    ]
    .iter()
    .map(|column| format!("{prefix}_{column}"))
    .collect()
}

fn cohort_cells(stats: Option<&CohortStats>) -> Vec<String> {
    match stats {
        Some(stats) => vec![
            optional_cell(&stats.mean_cf_y),
            optional_cell(&stats.weighted_mean_cf_y),
            optional_cell(&stats.mean_avg_cf),
            optional_cell(&stats.weighted_mean_avg_cf),
            optional_cell(&stats.energy_kwh),
            stats.unit_count.to_string(),
            stats.capacity_kw.to_string(),
        ],
        None => vec![String::new(); 7],
    }
}

fn geo_year_row(technology: Technology, row: &GeoYearAggregate) -> Vec<String> {
    let mut cells = vec![
        technology.to_string(),
        row.key.to_string(),
        row.year.to_string(),
        optional_cell(&row.totals.latitude),
        optional_cell(&row.totals.longitude),
        optional_cell(&row.totals.mean_cf),
        optional_cell(&row.totals.weighted_mean_cf),
        row.totals.total_capacity_kw.to_string(),
        row.totals.unit_count.to_string(),
    ];
    cells.extend(cohort_cells(row.commissioned.as_ref()));
    cells.extend(cohort_cells(row.running.as_ref()));
    cells
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::MemoryOutput;
    use crate::storage::tests::yearly;
    use crate::storage::{ConflictPolicy, InMemoryResultStore};
    use pretty_assertions::assert_eq;
    use rstest::*;

    fn seeded_store() -> InMemoryResultStore {
        let store = InMemoryResultStore::new();
        store
            .upsert_yearly(
                Technology::Wind,
                vec![
                    yearly("W1", 2020, 8760000., 0.5),
                    yearly("W2", 2020, 1234., 0.1234),
                    yearly("W1", 2021, 8000000., 0.4567),
                ],
                ConflictPolicy::Overwrite,
            )
            .unwrap();
        store
    }

    #[rstest]
    fn yearly_export_round_trips_bit_for_bit() {
        let store = seeded_store();
        let output = MemoryOutput::default();
        let exported = export_yearly_results(
            &store,
            Technology::Wind,
            &ExportFilter::default(),
            100,
            &output,
            "wind_yearly",
        )
        .unwrap();
        assert_eq!(exported, 3);

        let content = output.content("wind_yearly").unwrap();
        let reread = read_yearly_csv(content.as_bytes()).unwrap();
        assert_eq!(reread, store.yearly_results(Technology::Wind));
    }

    #[rstest]
    fn small_batches_append_without_repeating_the_header() {
        let store = seeded_store();
        let output = MemoryOutput::default();
        export_yearly_results(
            &store,
            Technology::Wind,
            &ExportFilter::default(),
            1,
            &output,
            "wind_yearly",
        )
        .unwrap();
        let content = output.content("wind_yearly").unwrap();
        let header_lines = content
            .lines()
            .filter(|line| line.starts_with("unit_id"))
            .count();
        assert_eq!(header_lines, 1);
        assert_eq!(content.lines().count(), 4);
    }

    #[rstest]
    fn filters_restrict_units_and_years() {
        let store = seeded_store();
        let output = MemoryOutput::default();
        let filter = ExportFilter {
            unit_ids: Some(vec!["W1".into()]),
            years: Some(vec![2021]),
        };
        let exported = export_yearly_results(
            &store,
            Technology::Wind,
            &filter,
            100,
            &output,
            "wind_yearly",
        )
        .unwrap();
        assert_eq!(exported, 1);
        let reread =
            read_yearly_csv(output.content("wind_yearly").unwrap().as_bytes()).unwrap();
        assert_eq!(reread[0].year, 2021);
    }

    #[rstest]
    fn empty_exports_write_no_file() {
        let store = InMemoryResultStore::new();
        let output = MemoryOutput::default();
        let exported = export_yearly_results(
            &store,
            Technology::Wind,
            &ExportFilter::default(),
            100,
            &output,
            "wind_yearly",
        )
        .unwrap();
        assert_eq!(exported, 0);
        assert!(output.content("wind_yearly").is_none());
    }

    #[rstest]
    fn monthly_export_round_trips_series_cells() {
        let store = InMemoryResultStore::new();
        let record = MonthlyRecord {
            unit_id: "S1".into(),
            year: 2020,
            energy_kwh: vec![1.5; 12],
            capacity_factor: vec![0.1234; 12],
            meta: RecordMeta::default(),
        };
        store
            .upsert_monthly(Technology::Solar, vec![record], ConflictPolicy::Overwrite)
            .unwrap();
        let output = MemoryOutput::default();
        export_monthly_results(
            &store,
            Technology::Solar,
            &ExportFilter::default(),
            100,
            &output,
            "solar_monthly",
        )
        .unwrap();
        let reread =
            read_monthly_csv(output.content("solar_monthly").unwrap().as_bytes()).unwrap();
        assert_eq!(reread, store.monthly_results(Technology::Solar));
    }
}
