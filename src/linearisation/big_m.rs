//! Big-M constants for the disjunctive encoding of piecewise-linear functions.
//!
//! In the big-M encoding, every segment `s` contributes four constraints which only bind when the
//! segment's binary indicator `delta` is one:
//!
//! ```text
//! y >= slope_s * x + intercept_s - M0 * (1 - delta)
//! y <= slope_s * x + intercept_s + M1 * (1 - delta)
//! x >= x_s                       - M2 * (1 - delta)
//! x <= x_{s+1}                   + M3 * (1 - delta)
//! ```
//!
//! The constants must be large enough that the constraints hold for any point on another segment
//! when `delta` is zero.
use super::SegmentParams;
use crate::breakpoints::BreakpointSet;
use anyhow::{Result, ensure};
use strum::{Display, EnumIter};

/// The direction of a big-M constraint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter)]
pub enum BigMKind {
    /// `y >= line - M0 * (1 - delta)`
    #[strum(to_string = "y>=")]
    YLower,
    /// `y <= line + M1 * (1 - delta)`
    #[strum(to_string = "y<=")]
    YUpper,
    /// `x >= x_s - M2 * (1 - delta)`
    #[strum(to_string = "x>=")]
    XLower,
    /// `x <= x_{s+1} + M3 * (1 - delta)`
    #[strum(to_string = "x<=")]
    XUpper,
}

/// Big-M constants for every segment and constraint direction
#[derive(Debug, Clone, PartialEq)]
pub struct BigMTable {
    values: Vec<[f64; 4]>,
}

impl BigMTable {
    /// Calculate the big-M constants for a set of breakpoints.
    ///
    /// The constants for the y constraints are the largest deviation of any breakpoint below
    /// (`M0`) or above (`M1`) the segment's line. The constants for the x constraints are the
    /// distance from the segment's ends to the smallest (`M2`) and largest (`M3`) breakpoint.
    ///
    /// # Arguments
    ///
    /// * `breakpoints` - The breakpoints of the piecewise-linear function
    /// * `segments` - The parameters of each segment, as returned by
    ///   [`segment_params`](super::segment_params)
    pub fn new(breakpoints: &BreakpointSet, segments: &[SegmentParams]) -> Result<Self> {
        assert_eq!(
            breakpoints.num_segments(),
            segments.len(),
            "Segment parameters do not match breakpoints"
        );

        let points = breakpoints.points();
        let x_min = points.iter().map(|(x, _)| *x).fold(f64::INFINITY, f64::min);
        let x_max = points
            .iter()
            .map(|(x, _)| *x)
            .fold(f64::NEG_INFINITY, f64::max);

        let values = segments
            .iter()
            .enumerate()
            .map(|(s, params)| {
                let (lowest, highest) = points.iter().map(|&p| params.residual(p)).fold(
                    (f64::INFINITY, f64::NEG_INFINITY),
                    |(lo, hi), r| (lo.min(r), hi.max(r)),
                );

                [
                    -lowest,
                    highest,
                    (points[s].0 - x_min).max(0.0),
                    (x_max - points[s + 1].0).max(0.0),
                ]
            })
            .collect();

        let table = Self { values };
        table.validate()?;

        Ok(table)
    }

    /// Check that all constants are finite and nonnegative
    fn validate(&self) -> Result<()> {
        for (s, row) in self.values.iter().enumerate() {
            for value in row {
                ensure!(
                    value.is_finite() && *value >= 0.0,
                    "Invalid big-M value {value} for segment {s}"
                );
            }
        }

        Ok(())
    }

    /// Get the constant for the given constraint direction and segment
    pub fn get(&self, kind: BigMKind, segment: usize) -> f64 {
        self.values[segment][kind as usize]
    }

    /// The number of segments covered by the table
    pub fn num_segments(&self) -> usize {
        self.values.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::linearisation::segment_params;
    use float_cmp::assert_approx_eq;
    use rstest::rstest;
    use strum::IntoEnumIterator;

    #[test]
    fn test_big_m_two_segments() {
        let breakpoints = BreakpointSet::new(&[0.0, 0.5, 1.0], &[0.0, 0.45, 1.0]).unwrap();
        let segments = segment_params(&breakpoints);
        let table = BigMTable::new(&breakpoints, &segments).unwrap();

        // Segment 0 (y = 0.9x): the point (1, 1) lies 0.1 above the line
        assert_approx_eq!(f64, table.get(BigMKind::YLower, 0), 0.0, epsilon = 1e-12);
        assert_approx_eq!(f64, table.get(BigMKind::YUpper, 0), 0.1, epsilon = 1e-12);
        assert_approx_eq!(f64, table.get(BigMKind::XLower, 0), 0.0, epsilon = 1e-12);
        assert_approx_eq!(f64, table.get(BigMKind::XUpper, 0), 0.5, epsilon = 1e-12);

        // Segment 1 (y = 1.1x - 0.1): the point (0, 0) lies 0.1 above the line
        assert_approx_eq!(f64, table.get(BigMKind::YLower, 1), 0.0, epsilon = 1e-12);
        assert_approx_eq!(f64, table.get(BigMKind::YUpper, 1), 0.1, epsilon = 1e-12);
        assert_approx_eq!(f64, table.get(BigMKind::XLower, 1), 0.5, epsilon = 1e-12);
        assert_approx_eq!(f64, table.get(BigMKind::XUpper, 1), 0.0, epsilon = 1e-12);
    }

    #[rstest]
    #[case(&[0.0, 0.5, 1.0], &[0.0, 0.45, 1.0])]
    #[case(&[0.0, 0.1, 0.4, 0.7, 1.0], &[0.0, 0.02, 0.3, 0.65, 0.88])]
    #[case(&[0.0, 0.2, 0.6, 1.0], &[0.0, 0.3, 0.5, 0.55])] // concave
    #[case(&[0.0, 1.0, 2.0, 3.0], &[1.0, -1.0, 2.0, 0.0])] // non-monotonic
    fn test_big_m_sufficiency(#[case] x: &[f64], #[case] y: &[f64]) {
        let breakpoints = BreakpointSet::new(x, y).unwrap();
        let segments = segment_params(&breakpoints);
        let table = BigMTable::new(&breakpoints, &segments).unwrap();
        assert_eq!(table.num_segments(), segments.len());

        for (s, params) in segments.iter().enumerate() {
            for kind in BigMKind::iter() {
                assert!(table.get(kind, s) >= 0.0);
            }

            let m = table
                .get(BigMKind::YLower, s)
                .max(table.get(BigMKind::YUpper, s));
            for &point in breakpoints.points() {
                let residual = params.residual(point);
                assert!(residual.abs() <= m + 1e-12);

                // The inactive constraints must hold at every breakpoint
                assert!(residual >= -table.get(BigMKind::YLower, s) - 1e-12);
                assert!(residual <= table.get(BigMKind::YUpper, s) + 1e-12);
                assert!(point.0 >= breakpoints.points()[s].0 - table.get(BigMKind::XLower, s));
                assert!(point.0 <= breakpoints.points()[s + 1].0 + table.get(BigMKind::XUpper, s));
            }
        }
    }

    #[test]
    fn test_big_m_kind_display() {
        let names: Vec<_> = BigMKind::iter().map(|kind| kind.to_string()).collect();
        assert_eq!(names, ["y>=", "y<=", "x>=", "x<="]);
    }
}
