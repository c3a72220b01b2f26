//! End-to-end wind runs through the batch pipeline against weather files on
//! disk, including the aggregation cohorts derived from the stored results.

use crate::catalog::{EnergyUnit, InMemoryCatalog, Technology, TechnologyAttributes};
use crate::config::tests::minimal_config;
use crate::config::RunConfig;
use crate::core::aggregation::{AggregationEngine, GeoLevel};
use crate::core::pipeline::BatchPipeline;
use crate::core::power_curve::{PowerCurve, PowerCurveTable};
use crate::core::units::hours_in_year;
use crate::core::weather::{GridPoint, NearestGridResolver, WeatherVariable, WIND_VARIABLES};
use crate::core::wind::WindPowerModel;
use crate::storage::{ConflictPolicy, InMemoryResultStore, ResultStore};
use approx::assert_relative_eq;
use chrono::NaiveDate;
use indexmap::IndexMap;
use pretty_assertions::assert_eq;
use rstest::*;
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub(crate) fn test_input_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("recf-test-{}-{name}", std::process::id()));
    let _ = fs::remove_dir_all(&dir);
    fs::create_dir_all(dir.join("weather").join("hourly")).unwrap();
    dir
}

pub(crate) fn write_weather_files(
    input: &Path,
    year: i32,
    point: GridPoint,
    values: &[(WeatherVariable, f64)],
) {
    let hours = hours_in_year(year);
    for (variable, value) in values {
        let mut csv = String::from("latitude,longitude,value\n");
        for _ in 0..hours {
            writeln!(csv, "{},{},{}", point.latitude, point.longitude, value).unwrap();
        }
        let path = input
            .join("weather")
            .join("hourly")
            .join(format!("{year}_{variable}.csv"));
        fs::write(path, csv).unwrap();
    }
}

/// Strong, constant wind: the normalised hub-height speed stays beyond the
/// curve's last sampled point, so every hour produces the curve maximum.
fn write_strong_wind_year(input: &Path, year: i32, point: GridPoint) {
    write_weather_files(
        input,
        year,
        point,
        &[
            (WeatherVariable::UWind100m, 50.),
            (WeatherVariable::VWind100m, 0.),
            (WeatherVariable::SurfaceRoughness, 0.05),
            (WeatherVariable::SurfacePressure, 101_325.),
            (WeatherVariable::Temperature2m, 288.15),
        ],
    );
}

fn curve_table() -> Arc<PowerCurveTable> {
    let mut curves = IndexMap::new();
    curves.insert(
        "E-82/2300".to_owned(),
        PowerCurve::from_samples(
            &[3., 6., 9., 12.],
            &[Some(0.), Some(400_000.), Some(1_800_000.), Some(2_500_000.)],
        )
        .unwrap(),
    );
    Arc::new(PowerCurveTable::new(curves))
}

fn wind_unit(id: &str, point: GridPoint) -> EnergyUnit {
    EnergyUnit {
        id: id.into(),
        net_capacity_kw: 2_000.,
        latitude: Some(point.latitude),
        longitude: Some(point.longitude),
        grid_latitude: Some(point.latitude),
        grid_longitude: Some(point.longitude),
        municipality_key: Some("03403000".to_owned()),
        municipality_latitude: Some(point.latitude),
        municipality_longitude: Some(point.longitude),
        postal_code: Some("26125".to_owned()),
        postal_latitude: Some(point.latitude),
        postal_longitude: Some(point.longitude),
        state: Some("Niedersachsen".to_owned()),
        commissioning_date: NaiveDate::from_ymd_opt(2019, 6, 1),
        decommissioning_date: None,
        attributes: TechnologyAttributes::Wind {
            turbine_type: Some("E-82/2300".to_owned()),
            hub_height_m: 98.,
        },
        mapping_log: String::new(),
    }
}

fn wind_config(input: PathBuf, years: Vec<i32>) -> RunConfig {
    let mut config = minimal_config(years);
    config.input_path = input;
    config.wind.enabled = true;
    config
}

#[fixture]
fn point() -> GridPoint {
    GridPoint::new(53.5, 8.0)
}

#[rstest]
fn constant_max_power_wind_year_end_to_end(point: GridPoint) {
    let input = test_input_dir("wind-e2e");
    write_strong_wind_year(&input, 2020, point);

    let config = wind_config(input.clone(), vec![2020]);
    let catalog = InMemoryCatalog::new(vec![wind_unit("W1", point)]);
    let resolver = NearestGridResolver::new(vec![point]);
    let store = Arc::new(InMemoryResultStore::new());
    let pipeline = BatchPipeline::new(&config, &catalog, &resolver, store.clone());
    let model = WindPowerModel::new(curve_table(), "E-82/2300".to_owned(), None).unwrap();

    let summary = pipeline.run_year(&model, 2020).unwrap();
    assert_eq!(summary.processed, 1);
    assert_eq!(summary.skipped, 0);

    let yearly = store.yearly_results(Technology::Wind);
    assert_eq!(yearly.len(), 1);
    // every hour at the curve maximum: capacity factor 2500/2500 kW
    assert_relative_eq!(yearly[0].capacity_factor, 1.);
    // 1.0 * 2000 kW * 8784 leap-year hours
    assert_relative_eq!(yearly[0].energy_kwh, 17_568_000.);
    assert_eq!(yearly[0].meta.no_calc_reason, None);

    let monthly = store.monthly_results(Technology::Wind);
    assert_eq!(monthly[0].energy_kwh.len(), 12);
    // leap-year February: 696 hours * 2000 kWh
    assert_relative_eq!(monthly[0].energy_kwh[1], 1_392_000.);
    assert_relative_eq!(
        monthly[0].energy_kwh.iter().sum::<f64>(),
        yearly[0].energy_kwh,
        epsilon = 1.
    );

    // cohort membership: commissioned 2019 <= 2020 < 9999 means running in
    // 2020, but the as-commissioned cohort for 2020 stays empty
    let engine = AggregationEngine::new(&catalog, store.as_ref());
    let result = engine.aggregate(Technology::Wind).unwrap();
    let level = &result.levels[&GeoLevel::Municipality];
    let row_2020 = level
        .geography_year
        .iter()
        .find(|row| row.year == 2020)
        .unwrap();
    let running = row_2020.running.as_ref().unwrap();
    assert_eq!(running.unit_count, 1);
    assert_relative_eq!(running.mean_cf_y.unwrap(), 1.);
    assert!(row_2020.commissioned.is_none());

    fs::remove_dir_all(&input).unwrap();
}

#[rstest]
fn curtailment_scales_the_yearly_energy(point: GridPoint) {
    let input = test_input_dir("wind-curtailment");
    write_strong_wind_year(&input, 2021, point);

    let catalog = InMemoryCatalog::new(vec![wind_unit("W1", point)]);
    let resolver = NearestGridResolver::new(vec![point]);
    let model = WindPowerModel::new(curve_table(), "E-82/2300".to_owned(), None).unwrap();

    let mut energies = Vec::new();
    for curtailment in [None, Some(0.2)] {
        let mut config = wind_config(input.clone(), vec![2021]);
        config.wind.curtailment = curtailment;
        let store = Arc::new(InMemoryResultStore::new());
        let pipeline = BatchPipeline::new(&config, &catalog, &resolver, store.clone());
        pipeline.run_year(&model, 2021).unwrap();
        energies.push(store.yearly_results(Technology::Wind)[0].energy_kwh);
    }
    assert_relative_eq!(energies[1], energies[0] * 0.8, epsilon = 1.);

    fs::remove_dir_all(&input).unwrap();
}

#[rstest]
fn overwrite_policy_makes_reruns_idempotent(point: GridPoint) {
    let input = test_input_dir("wind-idempotent");
    write_strong_wind_year(&input, 2021, point);

    let mut config = wind_config(input.clone(), vec![2021]);
    config.conflict_policy = ConflictPolicy::Overwrite;
    let catalog = InMemoryCatalog::new(vec![wind_unit("W1", point), wind_unit("W2", point)]);
    let resolver = NearestGridResolver::new(vec![point]);
    let store = Arc::new(InMemoryResultStore::new());
    let pipeline = BatchPipeline::new(&config, &catalog, &resolver, store.clone());
    let model = WindPowerModel::new(curve_table(), "E-82/2300".to_owned(), None).unwrap();

    pipeline.run_year(&model, 2021).unwrap();
    let first_yearly = store.yearly_results(Technology::Wind);
    let first_monthly = store.monthly_results(Technology::Wind);

    pipeline.run_year(&model, 2021).unwrap();
    assert_eq!(store.yearly_results(Technology::Wind), first_yearly);
    assert_eq!(store.monthly_results(Technology::Wind), first_monthly);

    fs::remove_dir_all(&input).unwrap();
}

#[rstest]
fn units_without_any_coordinates_get_reason_tagged_placeholders(point: GridPoint) {
    let input = test_input_dir("wind-placeholder");
    write_strong_wind_year(&input, 2020, point);
    write_strong_wind_year(&input, 2021, point);

    let mut unit = wind_unit("W-nocoords", point);
    unit.latitude = None;
    unit.longitude = None;
    unit.grid_latitude = None;
    unit.grid_longitude = None;

    let config = wind_config(input.clone(), vec![2020, 2021]);
    let catalog = InMemoryCatalog::new(vec![unit]);
    let resolver = NearestGridResolver::new(vec![point]);
    let store = Arc::new(InMemoryResultStore::new());
    let pipeline = BatchPipeline::new(&config, &catalog, &resolver, store.clone());
    let model = WindPowerModel::new(curve_table(), "E-82/2300".to_owned(), None).unwrap();

    let summaries = pipeline.run(&model).unwrap();
    assert_eq!(summaries.len(), 2);
    assert!(summaries.iter().all(|summary| summary.skipped == 1));

    let yearly = store.yearly_results(Technology::Wind);
    assert_eq!(yearly.len(), 2);
    for record in yearly {
        assert_eq!(record.energy_kwh, 0.);
        assert_eq!(record.capacity_factor, 0.);
        assert!(record.meta.no_calc_reason.is_some());
    }

    fs::remove_dir_all(&input).unwrap();
}

#[rstest]
fn incremental_mode_skips_units_with_existing_yearly_results(point: GridPoint) {
    let input = test_input_dir("wind-incremental");
    write_strong_wind_year(&input, 2021, point);

    let mut config = wind_config(input.clone(), vec![2021]);
    config.incremental = true;
    let catalog = InMemoryCatalog::new(vec![wind_unit("W1", point), wind_unit("W2", point)]);
    let resolver = NearestGridResolver::new(vec![point]);
    let store = Arc::new(InMemoryResultStore::new());
    let model = WindPowerModel::new(curve_table(), "E-82/2300".to_owned(), None).unwrap();

    // W1 already has a yearly row for 2021
    store
        .upsert_yearly(
            Technology::Wind,
            vec![crate::storage::tests::yearly("W1", 2021, 1., 0.1)],
            ConflictPolicy::Overwrite,
        )
        .unwrap();

    let pipeline = BatchPipeline::new(&config, &catalog, &resolver, store.clone());
    let summary = pipeline.run_year(&model, 2021).unwrap();
    assert_eq!(summary.processed, 1);
    // the pre-existing row was not overwritten by the incremental pass
    let w1 = store
        .yearly_results(Technology::Wind)
        .into_iter()
        .find(|record| record.unit_id == "W1")
        .unwrap();
    assert_relative_eq!(w1.energy_kwh, 1.);

    fs::remove_dir_all(&input).unwrap();
}

#[rstest]
fn missing_weather_files_abort_only_the_affected_year(point: GridPoint) {
    let input = test_input_dir("wind-missing-year");
    // 2021 has data, 2022 has none
    write_strong_wind_year(&input, 2021, point);

    let config = wind_config(input.clone(), vec![2021, 2022]);
    let catalog = InMemoryCatalog::new(vec![wind_unit("W1", point)]);
    let resolver = NearestGridResolver::new(vec![point]);
    let store = Arc::new(InMemoryResultStore::new());
    let pipeline = BatchPipeline::new(&config, &catalog, &resolver, store.clone());
    let model = WindPowerModel::new(curve_table(), "E-82/2300".to_owned(), None).unwrap();

    let error = pipeline.run(&model).unwrap_err();
    assert!(error.to_string().contains("2022"));
    // the good year still committed its records
    assert_eq!(store.yearly_results(Technology::Wind).len(), 1);
    assert_eq!(store.yearly_results(Technology::Wind)[0].year, 2021);

    fs::remove_dir_all(&input).unwrap();
}

#[rstest]
fn wind_variables_cover_the_required_fields() {
    assert_eq!(WIND_VARIABLES.len(), 5);
}
