//! Drives one pass over all units of a technology for each requested year:
//! compute power, reduce to capacity-factor records, and flush the records
//! to the store in bounded batches.
//!
//! Units are independent of each other, so the per-unit work runs on the
//! rayon pool; the only shared mutable state is the three output buffers,
//! each guarded by a mutex, and a batch is flushed while the buffer's lock
//! is held so there is a single writer at any time. Weather for a year is
//! loaded fully before the first unit is touched and shared read-only.

use crate::catalog::{EnergyUnit, Technology, UnitCatalog, UnitFilter};
use crate::config::RunConfig;
use crate::core::capacity_factor::{CapacityFactorReducer, ReducedRecords};
use crate::core::weather::{GridPoint, GridResolver, WeatherYear};
use crate::core::{ModelOutput, PowerModel};
use crate::errors::RecfError;
use crate::storage::{HourlyRecord, MonthlyRecord, ResultStore, YearlyRecord};
use indicatif::ProgressBar;
use parking_lot::Mutex;
use rayon::prelude::*;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

pub struct BatchPipeline<'a> {
    config: &'a RunConfig,
    catalog: &'a dyn UnitCatalog,
    resolver: &'a dyn GridResolver,
    store: Arc<dyn ResultStore>,
    reducer: CapacityFactorReducer,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct YearRunSummary {
    pub year: i32,
    pub processed: usize,
    pub skipped: usize,
}

struct OutputBuffers {
    hourly: Mutex<Vec<HourlyRecord>>,
    monthly: Mutex<Vec<MonthlyRecord>>,
    yearly: Mutex<Vec<YearlyRecord>>,
}

impl OutputBuffers {
    fn new() -> Self {
        Self {
            hourly: Mutex::new(Vec::new()),
            monthly: Mutex::new(Vec::new()),
            yearly: Mutex::new(Vec::new()),
        }
    }
}

impl<'a> BatchPipeline<'a> {
    pub fn new(
        config: &'a RunConfig,
        catalog: &'a dyn UnitCatalog,
        resolver: &'a dyn GridResolver,
        store: Arc<dyn ResultStore>,
    ) -> Self {
        let reducer = CapacityFactorReducer {
            save_hourly: config.save_hourly,
            software_version: config.software_version.clone(),
            outfile_postfix: config.outfile_postfix.clone(),
        };
        Self {
            config,
            catalog,
            resolver,
            store,
            reducer,
        }
    }

    /// Run every requested year. A missing weather file aborts only the
    /// affected year; the remaining years still run, and the aborted years
    /// are surfaced as an error afterwards.
    pub fn run(&self, model: &dyn PowerModel) -> Result<Vec<YearRunSummary>, RecfError> {
        let mut summaries = Vec::new();
        let mut aborted_years = Vec::new();

        for &year in &self.config.years {
            match self.run_year(model, year) {
                Ok(summary) => summaries.push(summary),
                Err(error) => {
                    tracing::error!("year {year} aborted: {error:#}");
                    aborted_years.push(year);
                }
            }
        }

        if aborted_years.is_empty() {
            Ok(summaries)
        } else {
            Err(RecfError::AbortedYears {
                count: aborted_years.len(),
                requested: self.config.years.len(),
                years: aborted_years,
            })
        }
    }

    pub fn run_year(
        &self,
        model: &dyn PowerModel,
        year: i32,
    ) -> anyhow::Result<YearRunSummary> {
        let technology = model.technology();
        let tech_config = self.config.technology(technology);
        let batch_size = self.config.batch_size;
        let started = Instant::now();

        info!("loading weather year {year} for {technology}, batch size {batch_size}");
        let weather = WeatherYear::load(
            &self.config.input_path,
            year,
            model.required_variables(),
        )?;

        let filter = UnitFilter {
            ids: tech_config.unit_ids.clone().map(|ids| {
                ids.into_iter().map(Into::into).collect()
            }),
            limit: self.config.limit_units,
            exclude_ids: self
                .config
                .incremental
                .then(|| self.store.units_with_yearly_result(technology, year)),
        };
        let units = self.catalog.list_units(technology, &filter)?;
        let curtailment_multiplier = tech_config.curtailment_multiplier(technology);

        let buffers = OutputBuffers::new();
        let skipped = Mutex::new(0usize);
        let progress = ProgressBar::new(units.len() as u64);
        let unit_count = units.len();

        units
            .into_par_iter()
            .try_for_each(|unit| -> anyhow::Result<()> {
                let records =
                    self.records_for_unit(model, &weather, unit, year, curtailment_multiplier)?;
                if records.yearly.meta.no_calc_reason.is_some() {
                    *skipped.lock() += 1;
                }
                self.buffer_records(&buffers, records, technology, batch_size)?;
                progress.inc(1);
                Ok(())
            })?;
        progress.finish_and_clear();

        // whatever is left after the last unit goes out unconditionally
        self.flush_hourly(&mut buffers.hourly.lock(), technology)?;
        self.flush_monthly(&mut buffers.monthly.lock(), technology)?;
        self.flush_yearly(&mut buffers.yearly.lock(), technology)?;

        let skipped = skipped.into_inner();
        info!(
            "processed {unit_count} {technology} units for year {year} ({skipped} skipped) in {:.2}s",
            started.elapsed().as_secs_f64()
        );

        Ok(YearRunSummary {
            year,
            processed: unit_count,
            skipped,
        })
    }

    fn records_for_unit(
        &self,
        model: &dyn PowerModel,
        weather: &WeatherYear,
        mut unit: EnergyUnit,
        year: i32,
        curtailment_multiplier: Option<f64>,
    ) -> anyhow::Result<ReducedRecords> {
        let Some(point) = self.grid_point_for(&unit) else {
            return Ok(self
                .reducer
                .placeholder(&unit, year, "missing grid and raw coordinates"));
        };

        let window = match weather.window(point) {
            Ok(window) => window,
            Err(error) => {
                warn!("unit {}: {error:#}", unit.id);
                return Ok(self
                    .reducer
                    .placeholder(&unit, year, "grid point absent from weather data"));
            }
        };

        match model.unit_power(&unit, point, &window, year)? {
            ModelOutput::Computed(power) => {
                if let Some(note) = &power.mapping_note {
                    warn!("unit {}: {note}", unit.id);
                    unit.push_mapping_note(note);
                }
                self.reducer
                    .reduce(&unit, year, &power, curtailment_multiplier)
            }
            ModelOutput::NotComputable { reason } => {
                warn!("unit {}: {reason}", unit.id);
                Ok(self.reducer.placeholder(&unit, year, &reason))
            }
        }
    }

    /// The unit's pre-assigned grid point, or the nearest grid point to its
    /// raw coordinates when the assignment is missing.
    fn grid_point_for(&self, unit: &EnergyUnit) -> Option<GridPoint> {
        match (unit.grid_latitude, unit.grid_longitude) {
            (Some(latitude), Some(longitude)) => Some(GridPoint::new(latitude, longitude)),
            _ => match (unit.latitude, unit.longitude) {
                (Some(latitude), Some(longitude)) => self.resolver.nearest(latitude, longitude),
                _ => None,
            },
        }
    }

    fn buffer_records(
        &self,
        buffers: &OutputBuffers,
        records: ReducedRecords,
        technology: Technology,
        batch_size: usize,
    ) -> anyhow::Result<()> {
        if let Some(hourly) = records.hourly {
            let mut buffer = buffers.hourly.lock();
            buffer.push(hourly);
            if buffer.len() >= batch_size {
                self.flush_hourly(&mut buffer, technology)?;
            }
        }
        {
            let mut buffer = buffers.monthly.lock();
            buffer.push(records.monthly);
            if buffer.len() >= batch_size {
                self.flush_monthly(&mut buffer, technology)?;
            }
        }
        {
            let mut buffer = buffers.yearly.lock();
            buffer.push(records.yearly);
            if buffer.len() >= batch_size {
                self.flush_yearly(&mut buffer, technology)?;
            }
        }
        Ok(())
    }

    fn flush_hourly(
        &self,
        buffer: &mut Vec<HourlyRecord>,
        technology: Technology,
    ) -> anyhow::Result<()> {
        if buffer.is_empty() {
            return Ok(());
        }
        let batch = std::mem::take(buffer);
        info!("flushing {} hourly {technology} records", batch.len());
        self.store
            .upsert_hourly(technology, batch, self.config.conflict_policy)?;
        Ok(())
    }

    fn flush_monthly(
        &self,
        buffer: &mut Vec<MonthlyRecord>,
        technology: Technology,
    ) -> anyhow::Result<()> {
        if buffer.is_empty() {
            return Ok(());
        }
        let batch = std::mem::take(buffer);
        info!("flushing {} monthly {technology} records", batch.len());
        self.store
            .upsert_monthly(technology, batch, self.config.conflict_policy)?;
        Ok(())
    }

    fn flush_yearly(
        &self,
        buffer: &mut Vec<YearlyRecord>,
        technology: Technology,
    ) -> anyhow::Result<()> {
        if buffer.is_empty() {
            return Ok(());
        }
        let batch = std::mem::take(buffer);
        info!("flushing {} yearly {technology} records", batch.len());
        self.store
            .upsert_yearly(technology, batch, self.config.conflict_policy)?;
        Ok(())
    }
}
