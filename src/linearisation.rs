//! Linear segments of piecewise-linear functions.
//!
//! The parameters here are derived once from a [`BreakpointSet`] and shared by the storage model
//! encodings.
use crate::breakpoints::BreakpointSet;
use itertools::Itertools;

pub mod big_m;
pub use big_m::{BigMKind, BigMTable};

/// The slope and intercept of a single linear segment, i.e. `y = slope * x + intercept`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SegmentParams {
    /// Slope of the segment
    pub slope: f64,
    /// Value of the segment's line at `x = 0`
    pub intercept: f64,
}

impl SegmentParams {
    /// Calculate the line through two points.
    ///
    /// # Panics
    ///
    /// Panics if the two points have the same x value. Breakpoint sets have strictly increasing x
    /// values, so this indicates a bug.
    pub fn from_points((x1, y1): (f64, f64), (x2, y2): (f64, f64)) -> Self {
        assert!(x1 != x2, "Cannot calculate slope for segment of zero width");

        let slope = (y2 - y1) / (x2 - x1);
        Self {
            slope,
            intercept: y1 - slope * x1,
        }
    }

    /// The value of the segment's line at `x`
    pub fn evaluate(&self, x: f64) -> f64 {
        self.slope * x + self.intercept
    }

    /// The signed vertical distance of `(x, y)` from the segment's line
    pub fn residual(&self, (x, y): (f64, f64)) -> f64 {
        y - self.evaluate(x)
    }
}

/// Calculate the parameters of every segment in a set of breakpoints
pub fn segment_params(breakpoints: &BreakpointSet) -> Vec<SegmentParams> {
    breakpoints
        .points()
        .iter()
        .tuple_windows()
        .map(|(&p1, &p2)| SegmentParams::from_points(p1, p2))
        .collect()
}

/// Evaluate the piecewise-linear function defined by a set of breakpoints.
///
/// Returns `None` if `x` lies outside the breakpoints' domain.
pub fn interpolate(breakpoints: &BreakpointSet, x: f64) -> Option<f64> {
    let (x_lo, x_hi) = breakpoints.x_bounds();
    if !(x_lo..=x_hi).contains(&x) {
        return None;
    }

    let points = breakpoints.points();
    // Index of the first breakpoint at or beyond x, but at least 1 so there is a segment start
    let idx = points.partition_point(|&(xk, _)| xk < x).max(1);
    Some(SegmentParams::from_points(points[idx - 1], points[idx]).evaluate(x))
}
