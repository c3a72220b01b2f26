//! Loads gridded reanalysis weather variables for one simulation year and
//! slices them down to single-grid-point hourly windows.

use crate::core::units::hours_in_year;
use crate::errors::WeatherSourceError;
use anyhow::{anyhow, bail};
use csv::ReaderBuilder as CsvReaderBuilder;
use indexmap::IndexMap;
use ordered_float::OrderedFloat;
use std::collections::HashMap;
use std::fs::File;
use std::path::{Path, PathBuf};
use strum_macros::Display;

const COLUMN_LATITUDE: usize = 0;
const COLUMN_LONGITUDE: usize = 1;
const COLUMN_VALUE: usize = 2;

#[derive(Clone, Copy, Debug, Display, Eq, Hash, PartialEq)]
pub enum WeatherVariable {
    #[strum(serialize = "100m_u_component_of_wind")]
    UWind100m,
    #[strum(serialize = "100m_v_component_of_wind")]
    VWind100m,
    #[strum(serialize = "forecast_surface_roughness")]
    SurfaceRoughness,
    #[strum(serialize = "surface_pressure")]
    SurfacePressure,
    #[strum(serialize = "2m_temperature")]
    Temperature2m,
    #[strum(serialize = "10m_u_component_of_wind")]
    UWind10m,
    #[strum(serialize = "10m_v_component_of_wind")]
    VWind10m,
    #[strum(serialize = "surface_solar_radiation_downwards")]
    GlobalHorizontalIrradiance,
    #[strum(serialize = "total_sky_direct_solar_radiation_at_surface")]
    DirectHorizontalIrradiance,
    #[strum(serialize = "near_ir_albedo_for_diffuse_radiation")]
    DiffuseAlbedo,
}

pub const WIND_VARIABLES: [WeatherVariable; 5] = [
    WeatherVariable::UWind100m,
    WeatherVariable::VWind100m,
    WeatherVariable::SurfaceRoughness,
    WeatherVariable::SurfacePressure,
    WeatherVariable::Temperature2m,
];

pub const SOLAR_VARIABLES: [WeatherVariable; 7] = [
    WeatherVariable::UWind10m,
    WeatherVariable::VWind10m,
    WeatherVariable::GlobalHorizontalIrradiance,
    WeatherVariable::DirectHorizontalIrradiance,
    WeatherVariable::SurfacePressure,
    WeatherVariable::Temperature2m,
    WeatherVariable::DiffuseAlbedo,
];

/// One reanalysis grid cell centre.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GridPoint {
    pub latitude: f64,
    pub longitude: f64,
}

pub(crate) type GridKey = (OrderedFloat<f64>, OrderedFloat<f64>);

impl GridPoint {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    pub(crate) fn key(&self) -> GridKey {
        (OrderedFloat(self.latitude), OrderedFloat(self.longitude))
    }
}

/// One weather variable over the full grid for one year: an hourly series
/// per grid point.
#[derive(Clone, Debug, Default)]
pub struct VariableGrid {
    series: HashMap<GridKey, Vec<f64>>,
}

impl VariableGrid {
    pub fn insert(&mut self, point: GridPoint, values: Vec<f64>) {
        self.series.insert(point.key(), values);
    }

    pub fn at(&self, point: GridPoint) -> Option<&[f64]> {
        self.series.get(&point.key()).map(Vec::as_slice)
    }
}

/// All weather variables needed for one technology in one simulation year,
/// fully loaded before any unit computation starts and shared read-only
/// across the unit loop.
#[derive(Clone, Debug)]
pub struct WeatherYear {
    year: i32,
    grids: HashMap<WeatherVariable, VariableGrid>,
}

impl WeatherYear {
    pub fn new(year: i32, grids: HashMap<WeatherVariable, VariableGrid>) -> Self {
        Self { year, grids }
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    /// Load one file per requested variable from
    /// `<input>/weather/hourly/<year>_<variable>.csv`. Any missing or
    /// unreadable file fails the whole year.
    pub fn load(
        input_path: &Path,
        year: i32,
        variables: &[WeatherVariable],
    ) -> Result<Self, WeatherSourceError> {
        let mut grids = HashMap::new();
        for variable in variables {
            let path = variable_file_path(input_path, year, *variable);
            let file = File::open(&path).map_err(|error| WeatherSourceError {
                year,
                variable: *variable,
                path: path.clone(),
                reason: error.to_string(),
            })?;
            let grid =
                read_variable_grid(file, hours_in_year(year)).map_err(|error| {
                    WeatherSourceError {
                        year,
                        variable: *variable,
                        path: path.clone(),
                        reason: error.to_string(),
                    }
                })?;
            grids.insert(*variable, grid);
        }
        Ok(Self { year, grids })
    }

    /// Slice every loaded variable down to the hourly series at one grid
    /// point. Errors when the point is absent from any loaded grid - the
    /// caller records that unit as not computable.
    pub fn window(&self, point: GridPoint) -> anyhow::Result<WeatherWindow<'_>> {
        let mut series = IndexMap::new();
        for (variable, grid) in &self.grids {
            let values = grid.at(point).ok_or_else(|| {
                anyhow!(
                    "grid point ({}, {}) absent from loaded {} data for {}",
                    point.latitude,
                    point.longitude,
                    variable,
                    self.year
                )
            })?;
            series.insert(*variable, values);
        }
        Ok(WeatherWindow { series })
    }
}

fn variable_file_path(input_path: &Path, year: i32, variable: WeatherVariable) -> PathBuf {
    input_path
        .join("weather")
        .join("hourly")
        .join(format!("{year}_{variable}.csv"))
}

/// Read one variable file: `latitude,longitude,value` rows in hour order,
/// one block of `hours` consecutive rows per grid point.
fn read_variable_grid(
    file: impl std::io::Read,
    hours: usize,
) -> anyhow::Result<VariableGrid> {
    let mut reader = CsvReaderBuilder::new().has_headers(true).from_reader(file);
    let mut grid = VariableGrid::default();
    let mut current: Option<(GridPoint, Vec<f64>)> = None;

    for result in reader.records() {
        let record = result?;
        let latitude: f64 = record
            .get(COLUMN_LATITUDE)
            .ok_or_else(|| anyhow!("missing latitude column"))?
            .parse()?;
        let longitude: f64 = record
            .get(COLUMN_LONGITUDE)
            .ok_or_else(|| anyhow!("missing longitude column"))?
            .parse()?;
        let value: f64 = record
            .get(COLUMN_VALUE)
            .ok_or_else(|| anyhow!("missing value column"))?
            .parse()?;

        let point = GridPoint::new(latitude, longitude);
        match &mut current {
            Some((open_point, values)) if *open_point == point => values.push(value),
            _ => {
                if let Some((finished, values)) = current.take() {
                    validate_series_len(finished, &values, hours)?;
                    grid.insert(finished, values);
                }
                current = Some((point, vec![value]));
            }
        }
    }
    if let Some((finished, values)) = current.take() {
        validate_series_len(finished, &values, hours)?;
        grid.insert(finished, values);
    }

    Ok(grid)
}

fn validate_series_len(point: GridPoint, values: &[f64], hours: usize) -> anyhow::Result<()> {
    if values.len() != hours {
        bail!(
            "grid point ({}, {}) has {} hourly values, expected {}",
            point.latitude,
            point.longitude,
            values.len(),
            hours
        );
    }
    Ok(())
}

/// The hourly series of every required variable at one grid point.
#[derive(Clone, Debug)]
pub struct WeatherWindow<'a> {
    series: IndexMap<WeatherVariable, &'a [f64]>,
}

impl<'a> WeatherWindow<'a> {
    pub fn series(&self, variable: WeatherVariable) -> anyhow::Result<&'a [f64]> {
        self.series
            .get(&variable)
            .copied()
            .ok_or_else(|| anyhow!("weather variable {variable} not loaded"))
    }

    pub fn hours(&self) -> usize {
        self.series
            .values()
            .next()
            .map(|values| values.len())
            .unwrap_or_default()
    }
}

/// Maps arbitrary coordinates to the closest known weather grid point.
pub trait GridResolver: Send + Sync {
    fn nearest(&self, latitude: f64, longitude: f64) -> Option<GridPoint>;
}

/// Linear scan over the known grid, closest by squared coordinate distance.
#[derive(Clone, Debug, Default)]
pub struct NearestGridResolver {
    points: Vec<GridPoint>,
}

impl NearestGridResolver {
    pub fn new(points: Vec<GridPoint>) -> Self {
        Self { points }
    }

    /// Read `latitude,longitude` rows listing the known grid cell centres.
    pub fn from_csv(reader: impl std::io::Read) -> anyhow::Result<Self> {
        let mut csv = CsvReaderBuilder::new().has_headers(true).from_reader(reader);
        let mut points = Vec::new();
        for result in csv.records() {
            let record = result?;
            let latitude: f64 = record
                .get(COLUMN_LATITUDE)
                .ok_or_else(|| anyhow!("missing latitude column"))?
                .parse()?;
            let longitude: f64 = record
                .get(COLUMN_LONGITUDE)
                .ok_or_else(|| anyhow!("missing longitude column"))?
                .parse()?;
            points.push(GridPoint::new(latitude, longitude));
        }
        Ok(Self::new(points))
    }
}

impl GridResolver for NearestGridResolver {
    fn nearest(&self, latitude: f64, longitude: f64) -> Option<GridPoint> {
        self.points
            .iter()
            .min_by_key(|point| {
                OrderedFloat(
                    (point.latitude - latitude).powi(2) + (point.longitude - longitude).powi(2),
                )
            })
            .copied()
    }
}
