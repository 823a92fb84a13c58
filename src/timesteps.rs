//! Regular grids of timesteps.
use anyhow::{Context, Result, bail, ensure};
use chrono::{NaiveDate, NaiveDateTime, TimeDelta};

/// Formats accepted for the start of a time series
const DATETIME_FORMATS: [&str; 3] = ["%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M", "%Y-%m-%dT%H:%M:%S"];

/// The format used when writing timestamps
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// A sequence of equally spaced timesteps
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Timesteps {
    start: NaiveDateTime,
    step: TimeDelta,
    len: usize,
}

impl Timesteps {
    /// Create a new [`Timesteps`].
    ///
    /// # Arguments
    ///
    /// * `start` - The first timestamp
    /// * `step` - The distance between consecutive timestamps (must be positive)
    /// * `len` - The number of timesteps (must be nonzero)
    pub fn new(start: NaiveDateTime, step: TimeDelta, len: usize) -> Result<Self> {
        ensure!(len > 0, "At least one timestep is required");
        ensure!(step > TimeDelta::zero(), "Timestep length must be positive");

        let timesteps = Self { start, step, len };
        ensure!(
            timesteps.timestamp(len - 1).is_some(),
            "Time series of {len} steps starting at {start} is out of range"
        );

        Ok(timesteps)
    }

    /// Create a new [`Timesteps`] from a start date and a frequency, e.g. `"1h"` or `"15min"`
    pub fn from_strings(start: &str, frequency: &str, len: usize) -> Result<Self> {
        Self::new(parse_datetime(start)?, parse_frequency(frequency)?, len)
    }

    /// The number of timesteps
    pub fn len(&self) -> usize {
        self.len
    }

    /// Always false, as there is at least one timestep
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The length of each timestep in hours
    pub fn duration_hours(&self) -> f64 {
        self.step.num_seconds() as f64 / 3600.0
    }

    /// The timestamp of the `i`th timestep
    fn timestamp(&self, i: usize) -> Option<NaiveDateTime> {
        let offset = self.step.checked_mul(i32::try_from(i).ok()?)?;
        self.start.checked_add_signed(offset)
    }

    /// Iterate over the timestamps
    pub fn iter(&self) -> impl Iterator<Item = NaiveDateTime> + '_ {
        (0..self.len).filter_map(|i| self.timestamp(i))
    }
}

/// Parse a date, optionally with a time of day
pub fn parse_datetime(value: &str) -> Result<NaiveDateTime> {
    let value = value.trim();
    for format in DATETIME_FORMATS {
        if let Ok(datetime) = NaiveDateTime::parse_from_str(value, format) {
            return Ok(datetime);
        }
    }

    let date = NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .with_context(|| format!("Invalid date: '{value}'"))?;

    date.and_hms_opt(0, 0, 0).context("Invalid date")
}

/// Parse a frequency string made of an optional integer multiple and a unit.
///
/// Supported units are `s`, `min` (or `T`), `h` and `D`, e.g. `"15min"` or `"1h"`.
pub fn parse_frequency(value: &str) -> Result<TimeDelta> {
    let value = value.trim();
    let split = value
        .find(|c: char| !c.is_ascii_digit())
        .with_context(|| format!("Frequency '{value}' has no unit"))?;
    let (count, unit) = value.split_at(split);

    let count: i64 = if count.is_empty() {
        1
    } else {
        count
            .parse()
            .with_context(|| format!("Invalid frequency: '{value}'"))?
    };
    ensure!(count > 0, "Frequency must be positive, but is '{value}'");

    let seconds_per_unit = match unit {
        "s" | "S" => 1,
        "min" | "T" => 60,
        "h" | "H" => 3600,
        "D" | "d" => 86400,
        _ => bail!("Unknown frequency unit '{unit}' in '{value}'"),
    };

    count
        .checked_mul(seconds_per_unit)
        .and_then(TimeDelta::try_seconds)
        .with_context(|| format!("Frequency '{value}' is out of range"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use float_cmp::assert_approx_eq;
    use rstest::rstest;

    #[rstest]
    #[case("h", 3600)]
    #[case("1H", 3600)]
    #[case("15min", 900)]
    #[case("30T", 1800)]
    #[case("D", 86400)]
    #[case(" 2h ", 7200)]
    fn test_parse_frequency(#[case] value: &str, #[case] seconds: i64) {
        assert_eq!(parse_frequency(value).unwrap().num_seconds(), seconds);
    }

    #[rstest]
    #[case("")]
    #[case("15")]
    #[case("0h")]
    #[case("1 week")]
    #[case("1.5h")]
    fn test_parse_frequency_invalid(#[case] value: &str) {
        assert!(parse_frequency(value).is_err());
    }

    #[rstest]
    #[case("2020-01-01")]
    #[case("2020-01-01 00:00")]
    #[case("2020-01-01 00:00:00")]
    #[case("2020-01-01T00:00:00")]
    fn test_parse_datetime(#[case] value: &str) {
        let expected = NaiveDate::from_ymd_opt(2020, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        assert_eq!(parse_datetime(value).unwrap(), expected);
    }

    #[test]
    fn test_parse_datetime_invalid() {
        assert!(parse_datetime("01/01/2020").is_err());
    }

    #[test]
    fn test_timesteps() {
        let timesteps = Timesteps::from_strings("2020-01-01 23:00", "15min", 5).unwrap();
        assert_eq!(timesteps.len(), 5);
        assert_approx_eq!(f64, timesteps.duration_hours(), 0.25);

        let timestamps = timesteps
            .iter()
            .map(|t| t.format(TIMESTAMP_FORMAT).to_string())
            .collect::<Vec<_>>();
        assert_eq!(
            timestamps,
            [
                "2020-01-01 23:00:00",
                "2020-01-01 23:15:00",
                "2020-01-01 23:30:00",
                "2020-01-01 23:45:00",
                "2020-01-02 00:00:00"
            ]
        );
    }

    #[test]
    fn test_timesteps_invalid() {
        assert!(Timesteps::from_strings("2020-01-01", "1h", 0).is_err());
        assert!(Timesteps::from_strings("2020-13-01", "1h", 1).is_err());
    }
}
