use thiserror::Error;

pub const WATTS_PER_KILOWATT: u32 = 1_000;
pub const SECONDS_PER_HOUR: u32 = 3_600;
pub const HOURS_PER_DAY: u32 = 24;
pub const DAYS_IN_MONTH: [u32; 12] = [31, 28, 31, 30, 31, 30, 31, 31, 30, 31, 30, 31];

/// Reference height of the reanalysis wind components used for wind units, in m.
pub const WIND_REFERENCE_HEIGHT: f64 = 100.;
/// Specific gas constant of dry air, in J/(kg.K).
pub const SPECIFIC_GAS_CONSTANT_DRY_AIR: f64 = 287.05;
/// Reference air density the hub-height wind speed is normalised to, in kg/m3.
pub const REFERENCE_AIR_DENSITY: f64 = 1.225;
/// Standard atmospheric pressure, in Pa.
pub const STANDARD_PRESSURE: f64 = 101_325.;

/// Hour index at which 29 February starts within a leap-year hourly series.
pub const FEB_29_FIRST_HOUR: usize = (24 * 59) as usize;
/// Hour index one past the end of 29 February within a leap-year hourly series.
pub const FEB_29_END_HOUR: usize = (24 * 60) as usize;

pub fn is_leap_year(year: i32) -> bool {
    year % 4 == 0 && (year % 100 != 0 || year % 400 == 0)
}

pub fn hours_in_year(year: i32) -> usize {
    if is_leap_year(year) {
        8_784
    } else {
        8_760
    }
}

/// Hours per calendar month for an hourly series of the given length
/// (8760 or 8784 - February picks up the leap day in the latter case).
pub fn month_hours_for_len(series_len: usize) -> [usize; 12] {
    let mut hours = DAYS_IN_MONTH.map(|days| (days * HOURS_PER_DAY) as usize);
    if series_len == 8_784 {
        hours[1] = (29 * HOURS_PER_DAY) as usize;
    }
    hours
}

pub(crate) fn kelvin_to_celsius(temp_k: f64) -> Result<f64, BelowAbsoluteZeroError> {
    if temp_k < 0.0 {
        Err(BelowAbsoluteZeroError { k: temp_k })
    } else {
        Ok(temp_k - 273.15)
    }
}

#[derive(Debug, Error)]
#[error("A temperature of {k}ºK/{}ºC was encountered, which is less than absolute zero", k - 273.15)]
pub(crate) struct BelowAbsoluteZeroError {
    k: f64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::*;

    #[rstest]
    #[case(2020, true)]
    #[case(2021, false)]
    #[case(2000, true)]
    #[case(1900, false)]
    fn leap_years_follow_gregorian_rules(#[case] year: i32, #[case] expected: bool) {
        assert_eq!(is_leap_year(year), expected);
    }

    #[rstest]
    fn month_hours_partition_the_year() {
        assert_eq!(month_hours_for_len(8_760).iter().sum::<usize>(), 8_760);
        assert_eq!(month_hours_for_len(8_784).iter().sum::<usize>(), 8_784);
        assert_eq!(month_hours_for_len(8_760)[1], 672);
        assert_eq!(month_hours_for_len(8_784)[1], 696);
    }

    #[rstest]
    fn non_leap_month_hours_match_calendar() {
        assert_eq!(
            month_hours_for_len(8_760),
            [744, 672, 744, 720, 744, 720, 744, 744, 720, 744, 720, 744]
        );
    }

    #[rstest]
    fn kelvin_conversion_rejects_below_absolute_zero() {
        assert!(kelvin_to_celsius(-1.0).is_err());
        assert_eq!(kelvin_to_celsius(273.15).unwrap(), 0.);
    }
}
