#![allow(clippy::too_many_arguments)]

pub mod catalog;
pub mod config;
pub mod core;
pub mod errors;
pub mod export;
pub mod output;
pub mod statistics;
pub mod storage;

#[cfg(test)]
mod tests;

use crate::catalog::{Technology, UnitCatalog};
use crate::config::RunConfig;
use crate::core::aggregation::AggregationEngine;
use crate::core::pipeline::BatchPipeline;
use crate::core::power_curve::PowerCurveTable;
use crate::core::solar::SolarPowerModel;
use crate::core::solar_angles::SolarAngleStore;
use crate::core::weather::GridResolver;
use crate::core::wind::WindPowerModel;
use crate::export::{
    export_monthly_results, export_yearly_results, write_aggregate_tables, ExportFilter,
};
use crate::output::Output;
use crate::storage::ResultStore;
use std::sync::Arc;
use tracing::info;

/// Run everything the configuration asks for: per-technology capacity-factor
/// calculation, CSV export of the result tables, and aggregation.
pub fn run_project(
    config: &RunConfig,
    catalog: &dyn UnitCatalog,
    resolver: &dyn GridResolver,
    solar_angles: Arc<dyn SolarAngleStore>,
    power_curves: Arc<PowerCurveTable>,
    store: Arc<dyn ResultStore>,
    output: &impl Output,
) -> anyhow::Result<()> {
    config.log_summary();
    let pipeline = BatchPipeline::new(config, catalog, resolver, store.clone());

    if config.wind.enabled {
        info!("calculating wind electricity generation and capacity factors");
        let model = WindPowerModel::new(
            power_curves.clone(),
            config.default_turbine_type.clone(),
            config.turbine_cut_off_margin_ms,
        )?;
        pipeline.run(&model)?;
    }

    if config.solar.enabled {
        info!("calculating solar electricity generation and capacity factors");
        let model = SolarPowerModel::new(solar_angles.clone(), config.solar_angle_year);
        pipeline.run(&model)?;
    }

    for (technology, enabled) in [
        (Technology::Wind, config.export.wind),
        (Technology::Solar, config.export.solar),
    ] {
        if !enabled {
            continue;
        }
        for &year in &config.export.years {
            let filter = ExportFilter {
                unit_ids: config
                    .export
                    .unit_ids
                    .clone()
                    .map(|ids| ids.into_iter().map(Into::into).collect()),
                years: Some(vec![year]),
            };
            let location_key = |period: &str| {
                format!(
                    "{technology}_{period}_{year}_{}_{}",
                    config.software_version, config.outfile_postfix
                )
            };
            export_monthly_results(
                store.as_ref(),
                technology,
                &filter,
                config.export.batch_size,
                output,
                &location_key("monthly"),
            )?;
            export_yearly_results(
                store.as_ref(),
                technology,
                &filter,
                config.export.batch_size,
                output,
                &location_key("yearly"),
            )?;
        }
    }

    for (technology, enabled) in [
        (Technology::Wind, config.aggregate.wind),
        (Technology::Solar, config.aggregate.solar),
    ] {
        if !enabled {
            continue;
        }
        let engine = AggregationEngine::new(catalog, store.as_ref());
        let result = engine.aggregate(technology)?;
        write_aggregate_tables(&result, output)?;
    }

    Ok(())
}
