//! Solar runs through the batch pipeline, covering the leap-day alignment
//! of the precomputed angle series and the angle-store miss path.

use crate::catalog::{EnergyUnit, InMemoryCatalog, Technology, TechnologyAttributes};
use crate::core::pipeline::BatchPipeline;
use crate::core::solar::SolarPowerModel;
use crate::core::solar_angles::{InMemorySolarAngles, SolarAngleSeries};
use crate::core::units::hours_in_year;
use crate::core::weather::{GridPoint, NearestGridResolver, WeatherVariable};
use crate::storage::{InMemoryResultStore, ResultStore};
use crate::tests::test_pipeline::{test_input_dir, write_weather_files};
use approx::assert_relative_eq;
use chrono::NaiveDate;
use pretty_assertions::assert_eq;
use rstest::*;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

fn write_solar_year(input: &std::path::Path, year: i32, point: GridPoint) {
    write_weather_files(
        input,
        year,
        point,
        &[
            (WeatherVariable::UWind10m, 3.),
            (WeatherVariable::VWind10m, 4.),
            // 1.8e6 J/m2 over the hour = 500 W/m2 global horizontal
            (WeatherVariable::GlobalHorizontalIrradiance, 1_800_000.),
            // 400 W/m2 direct horizontal
            (WeatherVariable::DirectHorizontalIrradiance, 1_440_000.),
            (WeatherVariable::SurfacePressure, 101_325.),
            (WeatherVariable::Temperature2m, 293.15),
            (WeatherVariable::DiffuseAlbedo, 0.2),
        ],
    );
}

/// Midday-like sun position for every hour of the angle reference year 2000.
fn angle_store(point: GridPoint) -> InMemorySolarAngles {
    let hours = hours_in_year(2000);
    let mut store = InMemorySolarAngles::default();
    store.insert(
        point,
        SolarAngleSeries::new(2000, vec![45.; hours], vec![180.; hours]).unwrap(),
    );
    store
}

fn solar_unit(id: &str, point: GridPoint) -> EnergyUnit {
    EnergyUnit {
        id: id.into(),
        net_capacity_kw: 10.,
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
        commissioning_date: NaiveDate::from_ymd_opt(2015, 3, 1),
        decommissioning_date: None,
        attributes: TechnologyAttributes::Solar {
            azimuth_deg: 180.,
            tilt_deg: 30.,
        },
        mapping_log: String::new(),
    }
}

fn solar_config(input: PathBuf, years: Vec<i32>) -> crate::config::RunConfig {
    let mut config = crate::config::tests::minimal_config(years);
    config.input_path = input;
    config.solar.enabled = true;
    config.save_hourly = true;
    config
}

#[fixture]
fn point() -> GridPoint {
    GridPoint::new(53.5, 8.0)
}

#[rstest]
fn leap_reference_angles_drive_a_common_year_run(point: GridPoint) {
    let input = test_input_dir("solar-e2e");
    // 2021 is a common year; the 2000 reference series must lose its 29 Feb
    write_solar_year(&input, 2021, point);

    let config = solar_config(input.clone(), vec![2021]);
    let catalog = InMemoryCatalog::new(vec![solar_unit("S1", point)]);
    let resolver = NearestGridResolver::new(vec![point]);
    let store = Arc::new(InMemoryResultStore::new());
    let pipeline = BatchPipeline::new(&config, &catalog, &resolver, store.clone());
    let model = SolarPowerModel::new(Arc::new(angle_store(point)), 2000);

    let summary = pipeline.run_year(&model, 2021).unwrap();
    assert_eq!(summary.processed, 1);
    assert_eq!(summary.skipped, 0);

    let yearly = store.yearly_results(Technology::Solar);
    assert_eq!(yearly.len(), 1);
    // constant daylight-like conditions: output is positive and below rating
    assert!(yearly[0].capacity_factor > 0.);
    assert!(yearly[0].capacity_factor < 1.);
    assert!(yearly[0].energy_kwh > 0.);

    let hourly = store.hourly_results(Technology::Solar);
    assert_eq!(hourly[0].capacity_factor.len(), 8_760);
    // unit energy is the capacity factor scaled by the rated 10 kW
    assert_relative_eq!(
        hourly[0].energy_kwh[0],
        hourly[0].capacity_factor[0] * 10.,
        epsilon = 1e-9
    );

    let monthly = store.monthly_results(Technology::Solar);
    assert_relative_eq!(
        monthly[0].energy_kwh.iter().sum::<f64>(),
        yearly[0].energy_kwh,
        epsilon = 1.
    );

    fs::remove_dir_all(&input).unwrap();
}

#[rstest]
fn leap_simulation_year_gets_the_duplicated_angle_block(point: GridPoint) {
    let input = test_input_dir("solar-leap");
    write_solar_year(&input, 2020, point);

    let config = solar_config(input.clone(), vec![2020]);
    let catalog = InMemoryCatalog::new(vec![solar_unit("S1", point)]);
    let resolver = NearestGridResolver::new(vec![point]);
    let store = Arc::new(InMemoryResultStore::new());
    let pipeline = BatchPipeline::new(&config, &catalog, &resolver, store.clone());
    // common-year reference series: alignment must duplicate 28 February
    let mut angles = InMemorySolarAngles::default();
    angles.insert(
        point,
        SolarAngleSeries::new(2019, vec![45.; 8_760], vec![180.; 8_760]).unwrap(),
    );
    let model = SolarPowerModel::new(Arc::new(angles), 2019);

    pipeline.run_year(&model, 2020).unwrap();
    let hourly = store.hourly_results(Technology::Solar);
    assert_eq!(hourly[0].capacity_factor.len(), 8_784);

    fs::remove_dir_all(&input).unwrap();
}

#[rstest]
fn grid_points_without_angle_series_become_placeholders(point: GridPoint) {
    let input = test_input_dir("solar-no-angles");
    write_solar_year(&input, 2021, point);

    let config = solar_config(input.clone(), vec![2021]);
    let catalog = InMemoryCatalog::new(vec![solar_unit("S1", point)]);
    let resolver = NearestGridResolver::new(vec![point]);
    let store = Arc::new(InMemoryResultStore::new());
    let pipeline = BatchPipeline::new(&config, &catalog, &resolver, store.clone());
    let model = SolarPowerModel::new(Arc::new(InMemorySolarAngles::default()), 2000);

    let summary = pipeline.run_year(&model, 2021).unwrap();
    assert_eq!(summary.skipped, 1);
    let yearly = store.yearly_results(Technology::Solar);
    assert_eq!(yearly[0].capacity_factor, 0.);
    assert!(yearly[0]
        .meta
        .no_calc_reason
        .as_deref()
        .unwrap()
        .contains("no solar angle series"));

    fs::remove_dir_all(&input).unwrap();
}
