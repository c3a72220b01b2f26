/// A simple statistics module with utility functions shared by the power
/// models, the capacity-factor reducer and the aggregation engine.
use crate::core::units::month_hours_for_len;
use anyhow::bail;

/// One-dimensional piecewise-linear interpolation with the same contract as
/// numpy's `interp`: outside the sampled domain the first/last sample value
/// is returned. `xp` must be sorted ascending and non-empty.
pub fn np_interp(x: f64, xp: &[f64], fp: &[f64]) -> f64 {
    debug_assert_eq!(xp.len(), fp.len());
    debug_assert!(!xp.is_empty());

    if x <= xp[0] {
        return fp[0];
    }
    if x >= xp[xp.len() - 1] {
        return fp[fp.len() - 1];
    }
    let upper = xp.partition_point(|&sample| sample < x);
    let (x0, x1) = (xp[upper - 1], xp[upper]);
    let (f0, f1) = (fp[upper - 1], fp[upper]);
    if x1 == x0 {
        return f0;
    }
    f0 + (f1 - f0) * (x - x0) / (x1 - x0)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MonthlyStatistic {
    Sum,
    Mean,
}

/// Partition an hourly series covering one calendar year into the 12
/// calendar months and compute the per-month sum or mean. The leap status is
/// inferred from the series length (8784 hours puts 29 days in February).
pub fn monthly_statistics(hourly: &[f64], statistic: MonthlyStatistic) -> anyhow::Result<[f64; 12]> {
    if hourly.len() != 8_760 && hourly.len() != 8_784 {
        bail!(
            "hourly series has {} entries, expected 8760 or 8784",
            hourly.len()
        );
    }

    let month_hours = month_hours_for_len(hourly.len());
    let mut results = [0.; 12];
    let mut start = 0;
    for (month, hours) in month_hours.iter().enumerate() {
        let bucket = &hourly[start..start + hours];
        results[month] = match statistic {
            MonthlyStatistic::Sum => bucket.iter().sum(),
            MonthlyStatistic::Mean => mean(bucket),
        };
        start += hours;
    }

    Ok(results)
}

pub fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

/// Weight-averaged value over paired slices. Returns `None` when the weights
/// sum to zero so callers never divide by zero - the rule applies uniformly
/// to every capacity-weighted mean in the aggregation engine.
pub fn weighted_mean(values: &[f64], weights: &[f64]) -> Option<f64> {
    debug_assert_eq!(values.len(), weights.len());
    let weight_sum: f64 = weights.iter().sum();
    if weight_sum > 0. {
        let product_sum: f64 = values
            .iter()
            .zip(weights)
            .map(|(value, weight)| value * weight)
            .sum();
        Some(product_sum / weight_sum)
    } else {
        None
    }
}

/// Round to a fixed number of decimal places, matching the rounding policy
/// applied to stored capacity factors and energies.
pub fn round_to(value: f64, decimals: u32) -> f64 {
    let factor = 10f64.powi(decimals as i32);
    (value * factor).round() / factor
}
