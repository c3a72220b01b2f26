//! Turbine power-curve lookup table.
//!
//! The curve file is semicolon-delimited: the header row carries the sampled
//! wind speeds in m/s, every following row a turbine type name followed by
//! the power output in W at each sampled speed. Cells may be empty where a
//! curve has no sample at that speed.

use crate::statistics::np_interp;
use anyhow::{anyhow, bail};
use csv::ReaderBuilder as CsvReaderBuilder;
use indexmap::IndexMap;
use std::io::Read;

/// An ordered wind-speed to power mapping for one turbine type, reduced to
/// its valid (non-missing) samples.
#[derive(Clone, Debug, PartialEq)]
pub struct PowerCurve {
    speeds_ms: Vec<f64>,
    powers_w: Vec<f64>,
}

impl PowerCurve {
    pub fn from_samples(speeds_ms: &[f64], powers_w: &[Option<f64>]) -> anyhow::Result<Self> {
        if speeds_ms.len() != powers_w.len() {
            bail!(
                "curve has {} speeds but {} power samples",
                speeds_ms.len(),
                powers_w.len()
            );
        }
        let (speeds_ms, powers_w): (Vec<f64>, Vec<f64>) = speeds_ms
            .iter()
            .zip(powers_w)
            .filter_map(|(speed, power)| power.map(|power| (*speed, power)))
            .unzip();
        if speeds_ms.is_empty() {
            bail!("curve has no valid samples");
        }
        Ok(Self {
            speeds_ms,
            powers_w,
        })
    }

    /// Nameplate maximum of the curve, in W, used to normalise output into a
    /// capacity factor.
    pub fn max_power_w(&self) -> f64 {
        self.powers_w.iter().copied().fold(f64::MIN, f64::max)
    }

    pub fn last_sampled_speed_ms(&self) -> f64 {
        self.speeds_ms[self.speeds_ms.len() - 1]
    }

    /// Instantaneous power at a wind speed, by linear interpolation over the
    /// valid samples. Speeds beyond the last sample hold its power value
    /// unless a hard cut-off margin is given, in which case output drops to
    /// zero once the speed exceeds the last sample by more than the margin.
    pub fn power_at(&self, speed_ms: f64, cut_off_margin_ms: Option<f64>) -> f64 {
        if let Some(margin) = cut_off_margin_ms {
            if speed_ms > self.last_sampled_speed_ms() + margin {
                return 0.;
            }
        }
        np_interp(speed_ms, &self.speeds_ms, &self.powers_w)
    }
}

/// All known turbine curves, keyed by turbine type name.
#[derive(Clone, Debug, Default)]
pub struct PowerCurveTable {
    curves: IndexMap<String, PowerCurve>,
}

impl PowerCurveTable {
    pub fn new(curves: IndexMap<String, PowerCurve>) -> Self {
        Self { curves }
    }

    pub fn from_csv(reader: impl Read) -> anyhow::Result<Self> {
        let mut csv = CsvReaderBuilder::new()
            .delimiter(b';')
            .has_headers(false)
            .from_reader(reader);
        let mut records = csv.records();

        let header = records
            .next()
            .ok_or_else(|| anyhow!("power curve file is empty"))??;
        let speeds = header
            .iter()
            .skip(1)
            .map(|cell| cell.parse::<f64>())
            .collect::<Result<Vec<f64>, _>>()
            .map_err(|error| anyhow!("invalid wind speed in curve header: {error}"))?;

        let mut curves = IndexMap::new();
        for result in records {
            let record = result?;
            let turbine_type = record
                .get(0)
                .ok_or_else(|| anyhow!("curve row without turbine type"))?
                .to_owned();
            let powers = record
                .iter()
                .skip(1)
                .map(|cell| {
                    let cell = cell.trim();
                    if cell.is_empty() {
                        Ok(None)
                    } else {
                        cell.parse::<f64>().map(Some)
                    }
                })
                .collect::<Result<Vec<Option<f64>>, _>>()
                .map_err(|error| anyhow!("invalid power for {turbine_type}: {error}"))?;
            curves.insert(turbine_type, PowerCurve::from_samples(&speeds, &powers)?);
        }

        if curves.is_empty() {
            bail!("power curve file contains no turbine types");
        }
        Ok(Self { curves })
    }

    pub fn curve(&self, turbine_type: &str) -> Option<&PowerCurve> {
        self.curves.get(turbine_type)
    }

    pub fn turbine_types(&self) -> impl Iterator<Item = &str> {
        self.curves.keys().map(String::as_str)
    }
}
