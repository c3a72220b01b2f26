//! Precomputed solar position series per weather grid point.
//!
//! The zenith/azimuth sequences are computed once for a fixed reference year
//! by an external stage and persisted; at simulation time the series is
//! aligned to the simulation year's hour count by inserting or removing the
//! 29 February block.

use crate::core::units::{hours_in_year, is_leap_year, FEB_29_END_HOUR, FEB_29_FIRST_HOUR};
use crate::core::weather::{GridKey, GridPoint};
use anyhow::{anyhow, bail};
use csv::ReaderBuilder as CsvReaderBuilder;
use std::collections::HashMap;
use std::io::Read;
use std::sync::Arc;

const COLUMN_LATITUDE: usize = 0;
const COLUMN_LONGITUDE: usize = 1;
const COLUMN_REFERENCE_YEAR: usize = 2;
const COLUMN_ZENITH: usize = 3;
const COLUMN_AZIMUTH: usize = 4;

/// Hourly solar zenith and azimuth angles, in degrees, for one grid point
/// and one reference year.
#[derive(Clone, Debug, PartialEq)]
pub struct SolarAngleSeries {
    pub reference_year: i32,
    pub zenith: Vec<f64>,
    pub azimuth: Vec<f64>,
}

impl SolarAngleSeries {
    pub fn new(reference_year: i32, zenith: Vec<f64>, azimuth: Vec<f64>) -> anyhow::Result<Self> {
        if zenith.len() != azimuth.len() {
            bail!(
                "zenith ({}) and azimuth ({}) series lengths differ",
                zenith.len(),
                azimuth.len()
            );
        }
        if zenith.len() != hours_in_year(reference_year) {
            bail!(
                "angle series has {} hours, reference year {} has {}",
                zenith.len(),
                reference_year,
                hours_in_year(reference_year)
            );
        }
        Ok(Self {
            reference_year,
            zenith,
            azimuth,
        })
    }

    /// Align the series to the simulation year's hour count. When the
    /// reference year is a leap year and the simulation year is not, the
    /// 29 February hours are dropped; in the opposite case the 28 February
    /// hours are duplicated in their place.
    pub fn aligned_to(&self, simulation_year: i32) -> SolarAngleSeries {
        match (
            is_leap_year(self.reference_year),
            is_leap_year(simulation_year),
        ) {
            (true, false) => SolarAngleSeries {
                reference_year: self.reference_year,
                zenith: drop_leap_day(&self.zenith),
                azimuth: drop_leap_day(&self.azimuth),
            },
            (false, true) => SolarAngleSeries {
                reference_year: self.reference_year,
                zenith: duplicate_feb_28(&self.zenith),
                azimuth: duplicate_feb_28(&self.azimuth),
            },
            _ => self.clone(),
        }
    }
}

fn drop_leap_day(series: &[f64]) -> Vec<f64> {
    let mut out = Vec::with_capacity(series.len() - 24);
    out.extend_from_slice(&series[..FEB_29_FIRST_HOUR]);
    out.extend_from_slice(&series[FEB_29_END_HOUR..]);
    out
}

fn duplicate_feb_28(series: &[f64]) -> Vec<f64> {
    let feb_28 = &series[FEB_29_FIRST_HOUR - 24..FEB_29_FIRST_HOUR];
    let mut out = Vec::with_capacity(series.len() + 24);
    out.extend_from_slice(&series[..FEB_29_FIRST_HOUR]);
    out.extend_from_slice(feb_28);
    out.extend_from_slice(&series[FEB_29_FIRST_HOUR..]);
    out
}

/// Lookup of the persisted angle series by grid point.
pub trait SolarAngleStore: Send + Sync {
    fn series_for(&self, point: GridPoint, reference_year: i32) -> Option<Arc<SolarAngleSeries>>;
}

#[derive(Clone, Debug, Default)]
pub struct InMemorySolarAngles {
    series: HashMap<(GridKey, i32), Arc<SolarAngleSeries>>,
}

impl InMemorySolarAngles {
    pub fn insert(&mut self, point: GridPoint, series: SolarAngleSeries) {
        self.series
            .insert((point.key(), series.reference_year), Arc::new(series));
    }

    /// Read `latitude,longitude,reference_year,zenith,azimuth` rows, hour
    /// order within each grid-point block.
    pub fn from_csv(reader: impl Read) -> anyhow::Result<Self> {
        let mut csv = CsvReaderBuilder::new().has_headers(true).from_reader(reader);
        let mut collected: HashMap<(GridKey, i32), (Vec<f64>, Vec<f64>)> = HashMap::new();

        for result in csv.records() {
            let record = result?;
            let field = |index: usize| {
                record
                    .get(index)
                    .ok_or_else(|| anyhow!("missing column {index} in solar angle file"))
            };
            let latitude: f64 = field(COLUMN_LATITUDE)?.parse()?;
            let longitude: f64 = field(COLUMN_LONGITUDE)?.parse()?;
            let reference_year: i32 = field(COLUMN_REFERENCE_YEAR)?.parse()?;
            let zenith: f64 = field(COLUMN_ZENITH)?.parse()?;
            let azimuth: f64 = field(COLUMN_AZIMUTH)?.parse()?;

            let entry = collected
                .entry((GridPoint::new(latitude, longitude).key(), reference_year))
                .or_default();
            entry.0.push(zenith);
            entry.1.push(azimuth);
        }

        let mut store = Self::default();
        for ((key, reference_year), (zenith, azimuth)) in collected {
            let point = GridPoint::new(key.0 .0, key.1 .0);
            store.insert(point, SolarAngleSeries::new(reference_year, zenith, azimuth)?);
        }
        Ok(store)
    }
}

impl SolarAngleStore for InMemorySolarAngles {
    fn series_for(&self, point: GridPoint, reference_year: i32) -> Option<Arc<SolarAngleSeries>> {
        self.series.get(&(point.key(), reference_year)).cloned()
    }
}
