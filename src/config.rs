//! Typed run configuration, deserialised from JSON and validated once at
//! startup. Components receive the config by reference; nothing reads the
//! process environment.

use crate::catalog::Technology;
use crate::storage::ConflictPolicy;
use anyhow::Context;
use serde::Deserialize;
use serde_valid::Validate;
use std::io::Read;
use std::path::PathBuf;
use tracing::{info, warn};

fn default_software_version() -> String {
    env!("CARGO_PKG_VERSION").replace('.', "_")
}

fn default_batch_size() -> usize {
    200_000
}

fn default_export_batch_size() -> usize {
    100_000
}

fn default_solar_angle_year() -> i32 {
    2000
}

fn default_turbine_type() -> String {
    "E-82/2300".to_owned()
}

#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct RunConfig {
    /// Directory holding weather files and the collaborator tables.
    pub input_path: PathBuf,
    /// Directory CSV output is written under, one subdirectory per technology.
    pub output_path: PathBuf,
    #[serde(default)]
    pub run_id: String,
    #[serde(default = "default_software_version")]
    pub software_version: String,
    /// Distinguishes output batches of repeated runs; part of every record.
    #[serde(default)]
    pub outfile_postfix: String,
    /// Simulation years, processed in order.
    #[validate(min_items = 1)]
    pub years: Vec<i32>,
    #[serde(default = "default_batch_size")]
    #[validate(minimum = 1)]
    pub batch_size: usize,
    #[serde(default)]
    pub conflict_policy: ConflictPolicy,
    /// Hourly result retention; a sizeable storage trade-off, off by default.
    #[serde(default)]
    pub save_hourly: bool,
    /// Reference year of the persisted solar-angle series.
    #[serde(default = "default_solar_angle_year")]
    pub solar_angle_year: i32,
    /// Only process units without a yearly result for the simulation year;
    /// restricted to single-year runs.
    #[serde(default)]
    pub incremental: bool,
    #[serde(default)]
    pub limit_units: Option<usize>,
    #[serde(default = "default_turbine_type")]
    pub default_turbine_type: String,
    /// Hard turbine cut-off margin above the last sampled curve speed, in
    /// m/s. Absent means output holds the last curve value instead.
    #[serde(default)]
    pub turbine_cut_off_margin_ms: Option<f64>,
    #[serde(default)]
    pub wind: TechnologyConfig,
    #[serde(default)]
    pub solar: TechnologyConfig,
    #[serde(default)]
    #[validate]
    pub export: ExportConfig,
    #[serde(default)]
    pub aggregate: AggregateConfig,
}

#[derive(Clone, Debug, Default, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct TechnologyConfig {
    #[serde(default)]
    pub enabled: bool,
    /// Curtailment fraction in [0, 1]; values outside the range disable
    /// curtailment for the run with a warning rather than aborting.
    #[serde(default)]
    pub curtailment: Option<f64>,
    /// Restrict the run to these registry ids.
    #[serde(default)]
    pub unit_ids: Option<Vec<String>>,
}

impl TechnologyConfig {
    /// The multiplier applied to every hourly power sample: 1 - fraction.
    /// Invalid fractions fall back to no curtailment and log a warning.
    pub fn curtailment_multiplier(&self, technology: Technology) -> Option<f64> {
        let fraction = self.curtailment?;
        if (0. ..=1.).contains(&fraction) {
            info!("{technology} curtailment set to {fraction}");
            Some(1. - fraction)
        } else {
            warn!(
                "{technology} curtailment {fraction} is out of range [0, 1], \
                 no curtailment applied in run"
            );
            None
        }
    }
}

#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct ExportConfig {
    #[serde(default)]
    pub wind: bool,
    #[serde(default)]
    pub solar: bool,
    /// Years to export; empty means export nothing.
    #[serde(default)]
    pub years: Vec<i32>,
    /// Restrict exports to these registry ids; absent means all units.
    #[serde(default)]
    pub unit_ids: Option<Vec<String>>,
    #[serde(default = "default_export_batch_size")]
    #[validate(minimum = 1)]
    pub batch_size: usize,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            wind: false,
            solar: false,
            years: Vec::new(),
            unit_ids: None,
            batch_size: default_export_batch_size(),
        }
    }
}

#[derive(Clone, Debug, Default, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct AggregateConfig {
    #[serde(default)]
    pub wind: bool,
    #[serde(default)]
    pub solar: bool,
}

impl RunConfig {
    pub fn from_reader(reader: impl Read) -> anyhow::Result<Self> {
        let config: RunConfig =
            serde_json::from_reader(reader).context("could not parse run configuration")?;
        config
            .validate()
            .context("run configuration failed validation")?;
        if config.incremental && config.years.len() != 1 {
            anyhow::bail!(
                "incremental mode expects exactly one year, got {:?}",
                config.years
            );
        }
        Ok(config)
    }

    pub fn technology(&self, technology: Technology) -> &TechnologyConfig {
        match technology {
            Technology::Wind => &self.wind,
            Technology::Solar => &self.solar,
        }
    }

    /// Echo the effective settings once at startup. Batch/export scope only,
    /// nothing secret.
    pub fn log_summary(&self) {
        info!(
            "run {}: years {:?}, batch size {}, conflict policy {:?}, save hourly {}, \
             incremental {}, limit {:?}, wind enabled {}, solar enabled {}, \
             export wind {} solar {} years {:?}, aggregate wind {} solar {}",
            self.run_id,
            self.years,
            self.batch_size,
            self.conflict_policy,
            self.save_hourly,
            self.incremental,
            self.limit_units,
            self.wind.enabled,
            self.solar.enabled,
            self.export.wind,
            self.export.solar,
            self.export.years,
            self.aggregate.wind,
            self.aggregate.solar,
        );
    }
}
