//! Fitting piecewise-linear functions to efficiency measurement data.
//!
//! For fixed breakpoint locations, the best continuous piecewise-linear fit is a linear
//! least-squares problem in the values at the breakpoints. The locations of the interior
//! breakpoints are found in two stages: an exhaustive search over a grid of locations, followed by
//! a Nelder-Mead search over the segment widths starting from the best grid points.
use super::BreakpointSet;
use crate::linearisation::interpolate;
use anyhow::{Context, Result, bail, ensure};
use argmin::core::{CostFunction, Executor, State};
use argmin::solver::neldermead::NelderMead;
use faer::{Mat, prelude::*, solvers::PartialPivLu};
use itertools::Itertools;
use log::debug;

/// Maximum number of Nelder-Mead iterations per starting point
const MAX_ITERS: u64 = 1000;

/// Convergence tolerance on the standard deviation of the simplex's costs
const SD_TOLERANCE: f64 = 1e-14;

/// Distance of the initial simplex's vertices from the starting point
const SIMPLEX_STEP: f64 = 0.5;

/// Segments narrower than this (on the normalised x axis) are rejected
const MIN_SEGMENT_WIDTH: f64 = 1e-9;

/// Cost returned for breakpoint locations which do not admit a unique fit
const INFEASIBLE_COST: f64 = f64::MAX;

/// Candidate grid resolutions, finest first
const GRID_RESOLUTIONS: [usize; 10] = [200, 100, 50, 40, 25, 20, 10, 8, 5, 4];

/// Maximum number of location combinations evaluated in the grid search
const MAX_GRID_COMBINATIONS: f64 = 10_000.0;

/// Number of grid points used as starting points for the Nelder-Mead search
const NUM_GRID_STARTS: usize = 3;

/// Diagonal entries of the normal matrix below this (relative to its largest entry) mean that a
/// breakpoint has no data around it
const PIVOT_TOLERANCE: f64 = 1e-12;

/// Raw efficiency measurements, as `(x, y)` samples
#[derive(Debug, Clone, PartialEq)]
pub struct EfficiencyCurve {
    x: Vec<f64>,
    y: Vec<f64>,
}

impl EfficiencyCurve {
    /// Create a new [`EfficiencyCurve`], checking that the samples are valid
    pub fn new(x: Vec<f64>, y: Vec<f64>) -> Result<Self> {
        ensure!(!x.is_empty(), "Efficiency curve has no samples");
        ensure!(
            x.len() == y.len(),
            "Number of x samples ({}) does not match number of y samples ({})",
            x.len(),
            y.len()
        );
        ensure!(
            x.iter().chain(y.iter()).all(|v| v.is_finite()),
            "Efficiency curve samples must be finite numbers"
        );

        Ok(Self { x, y })
    }

    /// The x samples
    pub fn x(&self) -> &[f64] {
        &self.x
    }

    /// The y samples
    pub fn y(&self) -> &[f64] {
        &self.y
    }

    /// The root-mean-square deviation of the samples from the function given by `breakpoints`.
    ///
    /// Returns `None` if any sample lies outside the breakpoints' domain.
    pub fn rms_error(&self, breakpoints: &BreakpointSet) -> Option<f64> {
        let mut sum = 0.0;
        for (&x, &y) in self.x.iter().zip(&self.y) {
            let residual = y - interpolate(breakpoints, x)?;
            sum += residual * residual;
        }

        Some((sum / self.x.len() as f64).sqrt())
    }

    /// The number of distinct x values
    fn num_distinct_x(&self) -> usize {
        self.x
            .iter()
            .copied()
            .sorted_by(f64::total_cmp)
            .dedup()
            .count()
    }
}

/// Fit a continuous piecewise-linear function with `num_segments` segments to the given data.
///
/// The x values are normalised to `[0, 1]` for the search and rescaled afterwards. The first and
/// last breakpoints are placed at the smallest and largest x sample and the y values of all
/// breakpoints are the fitted function's values there.
///
/// # Returns
///
/// A [`BreakpointSet`] with `num_segments + 1` points.
pub fn fit_breakpoints(curve: &EfficiencyCurve, num_segments: usize) -> Result<BreakpointSet> {
    ensure!(num_segments >= 1, "At least one segment is required");

    let x = curve.x();
    let lower = x.iter().copied().fold(f64::INFINITY, f64::min);
    let upper = x.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    ensure!(
        upper > lower,
        "Cannot fit breakpoints as all x samples are equal ({lower})"
    );

    let num_distinct = curve.num_distinct_x();
    ensure!(
        num_distinct > num_segments,
        "Fitting {num_segments} segments requires at least {} distinct x samples, but only \
         {num_distinct} were given",
        num_segments + 1
    );

    let x_norm = x
        .iter()
        .map(|value| (value - lower) / (upper - lower))
        .collect_vec();
    let problem = SegmentFit {
        x: &x_norm,
        y: curve.y(),
    };

    let locations = if num_segments == 1 {
        vec![0.0, 1.0]
    } else {
        problem.search_locations(num_segments)?
    };

    let (values, ssr) = problem
        .least_squares(&locations)
        .context("Could not find a piecewise-linear fit for the given data")?;
    debug!("Fitted {num_segments} segments with sum of squared residuals {ssr}");

    // Rescale x, making sure that the end points exactly match the data range
    let last = locations.len() - 1;
    let x_breakpoints = locations
        .iter()
        .enumerate()
        .map(|(i, loc)| match i {
            0 => lower,
            i if i == last => upper,
            _ => loc * (upper - lower) + lower,
        })
        .collect_vec();

    BreakpointSet::new(&x_breakpoints, &values)
}

/// A least-squares fit of normalised data
struct SegmentFit<'a> {
    x: &'a [f64],
    y: &'a [f64],
}

impl SegmentFit<'_> {
    /// Search for the interior breakpoint locations minimising the squared residuals
    fn search_locations(&self, num_segments: usize) -> Result<Vec<f64>> {
        let grid_best = self.grid_search(num_segments);
        let starts = grid_best
            .iter()
            .map(|(_, locations)| param_from_locations(locations))
            .chain(self.starting_points(num_segments))
            .collect_vec();

        let mut best = grid_best.into_iter().next();
        for start in starts {
            let simplex = initial_simplex(&start);
            let solver = NelderMead::new(simplex).with_sd_tolerance(SD_TOLERANCE)?;
            let result = Executor::new(SegmentFit { x: self.x, y: self.y }, solver)
                .configure(|state| state.max_iters(MAX_ITERS))
                .run()?;

            let state = result.state();
            let Some(param) = state.get_best_param() else {
                continue;
            };
            let cost = state.get_best_cost();
            debug!(
                "Breakpoint search finished after {} iterations with cost {cost}",
                state.get_iter()
            );

            if best.as_ref().is_none_or(|(best_cost, _)| cost < *best_cost) {
                best = Some((cost, locations_from_param(param)));
            }
        }

        match best {
            Some((cost, locations)) if cost < INFEASIBLE_COST => Ok(locations),
            _ => bail!("Could not find breakpoint locations with a valid fit"),
        }
    }

    /// Evaluate every combination of interior locations on a regular grid.
    ///
    /// The grid is as fine as possible while keeping the number of combinations manageable.
    ///
    /// # Returns
    ///
    /// The best locations found with their costs, best first. Empty if even the coarsest grid has
    /// too many combinations.
    fn grid_search(&self, num_segments: usize) -> Vec<(f64, Vec<f64>)> {
        let num_interior = num_segments - 1;
        let Some(resolution) = grid_resolution(num_interior) else {
            return Vec::new();
        };
        debug!("Searching breakpoint locations on a grid with spacing 1/{resolution}");

        (1..resolution)
            .combinations(num_interior)
            .map(|interior| {
                let locations = std::iter::once(0.0)
                    .chain(interior.into_iter().map(|i| i as f64 / resolution as f64))
                    .chain(std::iter::once(1.0))
                    .collect_vec();
                (self.ssr(&locations), locations)
            })
            .filter(|(cost, _)| *cost < INFEASIBLE_COST)
            .k_smallest_by(NUM_GRID_STARTS, |(a, _), (b, _)| a.total_cmp(b))
            .collect()
    }

    /// Deterministic starting points for the search.
    ///
    /// The first gives segments of equal width, the second places breakpoints at quantiles of the
    /// samples, so that every segment covers data.
    fn starting_points(&self, num_segments: usize) -> Vec<Vec<f64>> {
        let uniform = vec![0.0; num_segments];

        let sorted = self.x.iter().copied().sorted_by(f64::total_cmp).collect_vec();
        let mut quantiles = Vec::with_capacity(num_segments + 1);
        quantiles.push(0.0);
        for i in 1..num_segments {
            quantiles.push(sorted[i * (sorted.len() - 1) / num_segments]);
        }
        quantiles.push(1.0);

        if quantiles
            .iter()
            .tuple_windows()
            .all(|(a, b)| b - a > MIN_SEGMENT_WIDTH)
        {
            vec![uniform, param_from_locations(&quantiles)]
        } else {
            vec![uniform]
        }
    }

    /// The sum of squared residuals of the best fit for the given locations, or
    /// [`INFEASIBLE_COST`] if there is none
    fn ssr(&self, locations: &[f64]) -> f64 {
        if locations
            .iter()
            .tuple_windows()
            .any(|(a, b)| b - a < MIN_SEGMENT_WIDTH)
        {
            return INFEASIBLE_COST;
        }

        self.least_squares(locations)
            .map_or(INFEASIBLE_COST, |(_, ssr)| ssr)
    }

    /// Fit the values at the given breakpoint locations by linear least squares.
    ///
    /// The fitted function is written as a sum of hat functions, one per breakpoint, so that the
    /// coefficients are the function's values at the breakpoints.
    ///
    /// # Returns
    ///
    /// The values at the breakpoints and the sum of squared residuals, or `None` if the locations
    /// do not determine a unique fit (e.g. a breakpoint has no data around it).
    fn least_squares(&self, locations: &[f64]) -> Option<(Vec<f64>, f64)> {
        let n = locations.len();
        let mut normal = Mat::<f64>::zeros(n, n);
        let mut rhs = Mat::<f64>::zeros(n, 1);
        for (&x, &y) in self.x.iter().zip(self.y) {
            let (k, weight) = hat_weights(locations, x);
            let basis = [(k, 1.0 - weight), (k + 1, weight)];
            for &(i, bi) in &basis {
                rhs.write(i, 0, rhs.read(i, 0) + bi * y);
                for &(j, bj) in &basis {
                    normal.write(i, j, normal.read(i, j) + bi * bj);
                }
            }
        }

        let values = solve_normal_equations(&normal, &rhs)?;
        let ssr = self
            .x
            .iter()
            .zip(self.y)
            .map(|(&x, &y)| {
                let (k, weight) = hat_weights(locations, x);
                let predicted = values[k] * (1.0 - weight) + values[k + 1] * weight;
                (y - predicted).powi(2)
            })
            .sum();

        Some((values, ssr))
    }
}

impl CostFunction for SegmentFit<'_> {
    type Param = Vec<f64>;
    type Output = f64;

    fn cost(&self, param: &Self::Param) -> Result<Self::Output, argmin::core::Error> {
        Ok(self.ssr(&locations_from_param(param)))
    }
}

/// Convert search parameters into breakpoint locations in `[0, 1]`.
///
/// Each parameter is the log of a segment's relative width, so any parameter vector gives
/// strictly increasing locations.
fn locations_from_param(param: &[f64]) -> Vec<f64> {
    let max = param.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let weights = param.iter().map(|p| (p - max).exp()).collect_vec();
    let total: f64 = weights.iter().sum();

    let mut locations = Vec::with_capacity(param.len() + 1);
    locations.push(0.0);
    let mut cumulative = 0.0;
    for weight in &weights[..weights.len() - 1] {
        cumulative += weight / total;
        locations.push(cumulative);
    }
    locations.push(1.0);

    locations
}

/// Convert strictly increasing breakpoint locations into search parameters
fn param_from_locations(locations: &[f64]) -> Vec<f64> {
    locations
        .iter()
        .tuple_windows()
        .map(|(a, b)| (b - a).ln())
        .collect()
}

/// The finest grid whose combinations of `num_interior` locations can all be evaluated
fn grid_resolution(num_interior: usize) -> Option<usize> {
    GRID_RESOLUTIONS.into_iter().find(|&resolution| {
        let num_points = resolution - 1;
        num_points >= num_interior
            && (0..num_interior).fold(1.0, |acc, i| {
                acc * (num_points - i) as f64 / (i + 1) as f64
            }) <= MAX_GRID_COMBINATIONS
    })
}

/// Construct a simplex around `start` with one vertex per dimension plus one
fn initial_simplex(start: &[f64]) -> Vec<Vec<f64>> {
    let mut simplex = vec![start.to_vec()];
    for i in 0..start.len() {
        let mut vertex = start.to_vec();
        vertex[i] += SIMPLEX_STEP;
        simplex.push(vertex);
    }

    simplex
}

/// Find the segment containing `x` and the weight of the segment's right-hand breakpoint
fn hat_weights(locations: &[f64], x: f64) -> (usize, f64) {
    let last_segment = locations.len() - 2;
    let k = locations
        .partition_point(|&loc| loc <= x)
        .saturating_sub(1)
        .min(last_segment);
    let weight = (x - locations[k]) / (locations[k + 1] - locations[k]);

    (k, weight.clamp(0.0, 1.0))
}

/// Solve the normal equations `a * v = b` with an LU decomposition.
///
/// Returns `None` if the matrix is (numerically) singular.
fn solve_normal_equations(a: &Mat<f64>, b: &Mat<f64>) -> Option<Vec<f64>> {
    let n = a.nrows();
    let scale = (0..n)
        .cartesian_product(0..n)
        .fold(0.0_f64, |acc, (i, j)| acc.max(a.read(i, j).abs()));
    if scale == 0.0 || (0..n).any(|i| a.read(i, i) <= PIVOT_TOLERANCE * scale) {
        return None;
    }

    let lu = PartialPivLu::new(a.as_ref());
    let solution = lu.solve(b);
    let values = (0..n).map(|i| solution.read(i, 0)).collect_vec();

    values.iter().all(|v| v.is_finite()).then_some(values)
}
