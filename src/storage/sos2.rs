//! Piecewise-linear conversion with SOS2 interpolation weights.
//!
//! Each operating point is written as a convex combination of the curve's breakpoints. An SOS2
//! set over the weights ensures that only two adjacent breakpoints are combined, so the point lies
//! on the curve.
use super::balance::{PowerBounds, add_operating_modes, add_power_variables, add_state_of_charge};
use super::{ConstraintGroup, ConversionCurve, EncodingVariables, StorageDevice, StorageVariables};
use crate::optimisation::{Problem, Variable};
use crate::timesteps::Timesteps;
use anyhow::{Context, Result};

/// The SOS2 formulation of a storage device with piecewise-linear efficiency
pub struct Sos2Encoding;

impl ConstraintGroup for Sos2Encoding {
    fn add_to_problem(
        &self,
        problem: &mut Problem,
        device: &StorageDevice,
        timesteps: &Timesteps,
    ) -> Result<StorageVariables> {
        let (charge, discharge) = device
            .curves()
            .context("The SOS2 formulation requires piecewise-linear conversion curves")?;

        // Powers are bounded by the range of their breakpoints
        let (p_in_min, p_in_max) = charge.breakpoints().x_bounds();
        let (p_in_stor_min, p_in_stor_max) = charge.breakpoints().y_bounds();
        let (p_out_stor_min, p_out_stor_max) = discharge.breakpoints().x_bounds();
        let (p_out_min, p_out_max) = discharge.breakpoints().y_bounds();
        let bounds = PowerBounds {
            p_in: p_in_min..=p_in_max,
            p_in_stor: p_in_stor_min..=p_in_stor_max,
            p_out: p_out_min..=p_out_max,
            p_out_stor: p_out_stor_min..=p_out_stor_max,
        };
        let power = add_power_variables(problem, timesteps, &bounds);
        let soc = add_state_of_charge(
            problem,
            device,
            timesteps,
            &power.p_in_stor,
            &power.p_out_stor,
        );
        let (y_in, y_out) = add_operating_modes(problem, device, &power.p_in, &power.p_out);

        let lambda_in = add_interpolation(problem, "in", charge, &power.p_in, &power.p_in_stor);
        let lambda_out =
            add_interpolation(problem, "out", discharge, &power.p_out_stor, &power.p_out);

        Ok(StorageVariables {
            p_in: power.p_in,
            p_in_stor: power.p_in_stor,
            p_out: power.p_out,
            p_out_stor: power.p_out_stor,
            soc,
            y_in: Some(y_in),
            y_out: Some(y_out),
            encoding: EncodingVariables::Sos2 {
                lambda_in,
                lambda_out,
            },
        })
    }
}

/// Require that `y[t] = f(x[t])` for the piecewise-linear function `f` given by `curve`.
///
/// # Returns
///
/// The interpolation weights, indexed by timestep and breakpoint.
pub fn add_interpolation(
    problem: &mut Problem,
    label: &str,
    curve: &ConversionCurve,
    x: &[Variable],
    y: &[Variable],
) -> Vec<Vec<Variable>> {
    let points = curve.breakpoints().points();

    x.iter()
        .zip(y)
        .enumerate()
        .map(|(t, (&x, &y))| {
            let lambda: Vec<_> = (0..points.len())
                .map(|k| problem.add_continuous(format!("lambda_{label}[{t},{k}]"), 0.0..=1.0, 0.0))
                .collect();

            problem.add_row(
                format!("convexity_{label}[{t}]"),
                1.0..=1.0,
                lambda.iter().map(|&l| (l, 1.0)),
            );
            problem.add_row(
                format!("interpolation_x_{label}[{t}]"),
                0.0..=0.0,
                std::iter::once((x, -1.0)).chain(lambda.iter().zip(points).map(|(&l, p)| (l, p.0))),
            );
            problem.add_row(
                format!("interpolation_y_{label}[{t}]"),
                0.0..=0.0,
                std::iter::once((y, -1.0)).chain(lambda.iter().zip(points).map(|(&l, p)| (l, p.1))),
            );
            problem.add_sos2(format!("sos2_{label}[{t}]"), lambda.clone());

            lambda
        })
        .collect()
}
