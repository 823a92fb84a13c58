//! Breakpoints of piecewise-linear approximations to efficiency curves.
//!
//! A [`BreakpointSet`] is the ordered list of `(x, y)` points anchoring the segments of a
//! piecewise-linear function. Sets are created by fitting measurement data (see [`fit`]), can be
//! extended to span a physical operating range with [`BreakpointSet::process`] and are saved to
//! and loaded from CSV files.
use crate::input::{input_err_msg, read_csv_semicolon};
use crate::linearisation::SegmentParams;
use anyhow::{Context, Result, ensure};
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub mod fit;

/// The separator used when breakpoints are written as a single string
const VALUE_SEPARATOR: &str = ", ";

/// An ordered set of breakpoints with strictly increasing x values.
///
/// A set of `K + 1` breakpoints describes `K` linear segments, so at least two points are
/// required.
#[derive(Debug, Clone, PartialEq)]
pub struct BreakpointSet {
    points: Vec<(f64, f64)>,
}

impl BreakpointSet {
    /// Create a new [`BreakpointSet`] from separate arrays of x and y values.
    pub fn new(x: &[f64], y: &[f64]) -> Result<Self> {
        ensure!(
            x.len() == y.len(),
            "Number of x breakpoints ({}) does not match number of y breakpoints ({})",
            x.len(),
            y.len()
        );

        Self::from_points(x.iter().copied().zip(y.iter().copied()).collect())
    }

    /// Create a new [`BreakpointSet`] from `(x, y)` pairs, checking that it is valid
    pub fn from_points(points: Vec<(f64, f64)>) -> Result<Self> {
        ensure!(
            points.len() >= 2,
            "At least two breakpoints are required, but {} were given",
            points.len()
        );
        ensure!(
            points.iter().all(|(x, y)| x.is_finite() && y.is_finite()),
            "Breakpoints must be finite numbers"
        );
        for ((x1, _), (x2, _)) in points.iter().tuple_windows() {
            ensure!(
                x1 < x2,
                "x breakpoints must be strictly increasing, but {x2} follows {x1}"
            );
        }

        Ok(Self { points })
    }

    /// The `(x, y)` pairs in this set
    pub fn points(&self) -> &[(f64, f64)] {
        &self.points
    }

    /// Iterate over the x values
    pub fn iter_x(&self) -> impl Iterator<Item = f64> + '_ {
        self.points.iter().map(|(x, _)| *x)
    }

    /// Iterate over the y values
    pub fn iter_y(&self) -> impl Iterator<Item = f64> + '_ {
        self.points.iter().map(|(_, y)| *y)
    }

    /// The number of breakpoints
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Always false, as a valid set has at least two points
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// The number of linear segments described by this set
    pub fn num_segments(&self) -> usize {
        self.points.len() - 1
    }

    /// The smallest and largest x value
    pub fn x_bounds(&self) -> (f64, f64) {
        (self.points[0].0, self.points[self.points.len() - 1].0)
    }

    /// The smallest and largest y value.
    ///
    /// Unlike x, the y values need not be monotonic.
    pub fn y_bounds(&self) -> (f64, f64) {
        self.iter_y()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), y| {
                (lo.min(y), hi.max(y))
            })
    }

    /// Return a copy of this set with both coordinates multiplied by `factor`.
    ///
    /// Used to convert breakpoints given relative to a rated power into absolute values.
    pub fn scaled(&self, factor: f64) -> Result<Self> {
        ensure!(
            factor.is_finite() && factor > 0.0,
            "Scaling factor for breakpoints must be positive, but is {factor}"
        );

        Self::from_points(
            self.points
                .iter()
                .map(|(x, y)| (x * factor, y * factor))
                .collect(),
        )
    }

    /// Extend this set so that it explicitly spans the operating range `[x_min, x_max]`.
    ///
    /// The line through the first segment is evaluated at `x_min` and the line through the last
    /// segment at `x_max`. These points replace the first and last breakpoints. As a throughput
    /// cannot be negative, the value at `x_min` is clamped to zero. If `x_min` is nonzero, the
    /// point `(0, 0)` is added at the start, so that an idle device is representable.
    ///
    /// # Arguments
    ///
    /// * `x_min` - The minimal nonzero operating point (minimum part load)
    /// * `x_max` - The maximal operating point
    pub fn process(&self, x_min: f64, x_max: f64) -> Result<Self> {
        ensure!(
            x_min.is_finite() && x_max.is_finite(),
            "Operating range must be finite"
        );
        ensure!(x_min >= 0.0, "x_min must be nonnegative, but is {x_min}");
        ensure!(
            x_min < x_max,
            "x_min ({x_min}) must be less than x_max ({x_max})"
        );

        let n = self.points.len();
        let second = self.points[1].0;
        let second_last = self.points[n - 2].0;
        ensure!(
            n == 2 || x_min < second,
            "x_min ({x_min}) must be below the second breakpoint ({second})"
        );
        ensure!(
            n == 2 || x_max > second_last,
            "x_max ({x_max}) must be above the second-to-last breakpoint ({second_last})"
        );

        let first = SegmentParams::from_points(self.points[0], self.points[1]);
        let y_mpl = first.evaluate(x_min).max(0.0);
        let last = SegmentParams::from_points(self.points[n - 2], self.points[n - 1]);
        let y_max = last.evaluate(x_max);

        let mut points = Vec::with_capacity(n + 1);
        if x_min != 0.0 {
            points.push((0.0, 0.0));
        }
        points.push((x_min, y_mpl));
        points.extend_from_slice(&self.points[1..n - 1]);
        points.push((x_max, y_max));

        Self::from_points(points).context("Processed breakpoints are invalid")
    }

    /// Format the x and y values as strings of separated values with the given precision
    pub fn to_strings(&self, decimals: usize) -> (String, String) {
        (
            format_values(self.iter_x(), decimals),
            format_values(self.iter_y(), decimals),
        )
    }

    /// Save the breakpoints to CSV files in `dir_path`.
    ///
    /// Two files are written: a table with one row per breakpoint and a single row with the
    /// values joined into strings, suitable for pasting into a scenario table.
    ///
    /// # Returns
    ///
    /// The paths of the two files written.
    pub fn write_csv(&self, dir_path: &Path, decimals: usize) -> Result<(PathBuf, PathBuf)> {
        fs::create_dir_all(dir_path)
            .with_context(|| format!("Could not create directory {}", dir_path.display()))?;

        let table_path = dir_path.join(format!("{}_breakpoints.csv", self.len()));
        let mut writer = csv::WriterBuilder::new()
            .delimiter(b';')
            .from_path(&table_path)?;
        for &(x, y) in &self.points {
            writer.serialize(BreakpointRow {
                x_breakpoints: x,
                y_breakpoints: y,
            })?;
        }
        writer.flush()?;

        let string_path = dir_path.join(format!("{}_breakpoints_as_string.csv", self.len()));
        let mut writer = csv::WriterBuilder::new()
            .delimiter(b';')
            .from_path(&string_path)?;
        let (x_breakpoints, y_breakpoints) = self.to_strings(decimals);
        writer.serialize(BreakpointStringRow {
            x_breakpoints,
            y_breakpoints,
        })?;
        writer.flush()?;

        Ok((table_path, string_path))
    }

    /// Read breakpoints from a tabular CSV file, as written by [`BreakpointSet::write_csv`]
    pub fn read_csv(file_path: &Path) -> Result<Self> {
        let rows: Vec<BreakpointRow> = read_csv_semicolon(file_path)?;
        let points = rows
            .into_iter()
            .map(|row| (row.x_breakpoints, row.y_breakpoints))
            .collect();

        Self::from_points(points).with_context(|| input_err_msg(file_path))
    }
}

/// A row in the tabular breakpoints file
#[derive(Debug, PartialEq, Serialize, Deserialize)]
struct BreakpointRow {
    x_breakpoints: f64,
    y_breakpoints: f64,
}

/// The single row of the breakpoints-as-string file
#[derive(Debug, PartialEq, Serialize, Deserialize)]
struct BreakpointStringRow {
    x_breakpoints: String,
    y_breakpoints: String,
}

/// Join values into a string with a fixed number of decimals
pub fn format_values<I>(values: I, decimals: usize) -> String
where
    I: IntoIterator<Item = f64>,
{
    values
        .into_iter()
        .map(|value| format!("{value:.decimals$}"))
        .join(VALUE_SEPARATOR)
}

#[cfg(test)]
mod tests {
    use super::*;
    use float_cmp::assert_approx_eq;
    use rstest::rstest;
    use tempfile::tempdir;

    fn breakpoints(x: &[f64], y: &[f64]) -> BreakpointSet {
        BreakpointSet::new(x, y).unwrap()
    }

    #[rstest]
    #[case(&[0.0, 1.0], &[0.0, 1.0], true)]
    #[case(&[0.0, 0.5, 1.0], &[0.0, 0.45, 1.0], true)]
    #[case(&[0.0], &[0.0], false)] // too few points
    #[case(&[0.0, 0.0], &[0.0, 1.0], false)] // tie
    #[case(&[1.0, 0.0], &[0.0, 1.0], false)] // decreasing
    #[case(&[0.0, 1.0], &[0.0], false)] // length mismatch
    #[case(&[0.0, f64::NAN], &[0.0, 1.0], false)]
    #[case(&[0.0, 1.0], &[0.0, f64::INFINITY], false)]
    fn test_breakpoint_set_new(#[case] x: &[f64], #[case] y: &[f64], #[case] valid: bool) {
        assert_eq!(BreakpointSet::new(x, y).is_ok(), valid);
    }

    #[test]
    fn test_bounds_and_segments() {
        let set = breakpoints(&[0.0, 0.5, 1.0], &[0.0, 0.6, 0.4]);
        assert_eq!(set.len(), 3);
        assert_eq!(set.num_segments(), 2);
        assert_eq!(set.x_bounds(), (0.0, 1.0));
        assert_eq!(set.y_bounds(), (0.0, 0.6));
    }

    #[test]
    fn test_scaled() {
        let set = breakpoints(&[0.0, 0.5, 1.0], &[0.0, 0.45, 1.0]);
        let scaled = set.scaled(10.0).unwrap();
        assert_eq!(scaled.points(), &[(0.0, 0.0), (5.0, 4.5), (10.0, 10.0)]);
        assert!(set.scaled(0.0).is_err());
        assert!(set.scaled(-1.0).is_err());
    }

    #[test]
    fn test_process_adds_zero_and_extrapolates() {
        // First segment: y = 0.8x + 0.02, last segment: y = 0.9x - 0.03
        let set = breakpoints(&[0.2, 0.5, 0.8], &[0.18, 0.42, 0.69]);
        let processed = set.process(0.1, 1.0).unwrap();

        let expected = [(0.0, 0.0), (0.1, 0.1), (0.5, 0.42), (1.0, 0.87)];
        assert_eq!(processed.len(), expected.len());
        for (&(x, y), (x_exp, y_exp)) in processed.points().iter().zip(expected) {
            assert_approx_eq!(f64, x, x_exp, epsilon = 1e-12);
            assert_approx_eq!(f64, y, y_exp, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_process_clamps_negative_part_load() {
        // First segment: y = x - 0.3, which is negative at x = 0.1
        let set = breakpoints(&[0.4, 0.6, 1.0], &[0.1, 0.3, 0.8]);
        let processed = set.process(0.1, 1.0).unwrap();
        assert_eq!(processed.points()[1], (0.1, 0.0));
    }

    #[test]
    fn test_process_zero_x_min() {
        let set = breakpoints(&[0.1, 0.5, 0.9], &[0.05, 0.45, 0.85]);
        let processed = set.process(0.0, 1.0).unwrap();

        // No extra point is added
        assert_eq!(processed.len(), set.len());
        assert_eq!(processed.x_bounds(), (0.0, 1.0));
        assert_approx_eq!(f64, processed.points()[0].1, 0.0, epsilon = 1e-12);
        assert_approx_eq!(f64, processed.points()[2].1, 0.95, epsilon = 1e-12);
    }

    #[test]
    fn test_process_aligned_set_is_unchanged() {
        let set = breakpoints(&[0.0, 0.3, 0.7, 1.0], &[0.0, 0.25, 0.65, 0.9]);
        let processed = set.process(0.0, 1.0).unwrap();
        assert_eq!(processed.len(), set.len());
        for (&(x, y), &(x_exp, y_exp)) in processed.points().iter().zip(set.points()) {
            assert_approx_eq!(f64, x, x_exp, epsilon = 1e-12);
            assert_approx_eq!(f64, y, y_exp, epsilon = 1e-12);
        }
    }

    #[rstest]
    #[case(-0.1, 1.0)] // negative x_min
    #[case(0.5, 0.5)] // empty range
    #[case(0.6, 1.0)] // x_min beyond second breakpoint
    #[case(0.1, 0.4)] // x_max below second-to-last breakpoint
    #[case(0.1, f64::INFINITY)]
    fn test_process_invalid_range(#[case] x_min: f64, #[case] x_max: f64) {
        let set = breakpoints(&[0.2, 0.5, 0.8], &[0.18, 0.42, 0.69]);
        assert!(set.process(x_min, x_max).is_err());
    }

    #[test]
    fn test_process_single_segment() {
        let set = breakpoints(&[0.2, 0.8], &[0.1, 0.7]);
        let processed = set.process(0.5, 1.0).unwrap();
        assert_eq!(processed.len(), 3);
        assert_approx_eq!(f64, processed.points()[1].1, 0.4, epsilon = 1e-12);
        assert_approx_eq!(f64, processed.points()[2].1, 0.9, epsilon = 1e-12);
    }

    #[test]
    fn test_format_values() {
        assert_eq!(format_values([0.0, 0.12345, 1.0], 3), "0.000, 0.123, 1.000");
        assert_eq!(format_values(Vec::new(), 2), "");
    }

    #[test]
    fn test_write_and_read_csv() {
        let dir = tempdir().unwrap();
        let set = breakpoints(&[0.0, 0.1, 0.55, 1.0], &[0.0, 0.07, 0.5, 0.93]);
        let (table_path, string_path) = set.write_csv(dir.path(), 4).unwrap();

        assert_eq!(table_path.file_name().unwrap(), "4_breakpoints.csv");
        assert_eq!(BreakpointSet::read_csv(&table_path).unwrap(), set);

        let contents = fs::read_to_string(string_path).unwrap();
        assert_eq!(
            contents,
            "x_breakpoints;y_breakpoints\n\
             0.0000, 0.1000, 0.5500, 1.0000;0.0000, 0.0700, 0.5000, 0.9300\n"
        );
    }
}
