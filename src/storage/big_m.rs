//! Piecewise-linear conversion with big-M segment selection.
//!
//! For each curve and timestep, one binary per segment selects the segment the operating point
//! lies on. The constraints of the other segments are relaxed by the constants in the curve's
//! [`BigMTable`](crate::linearisation::BigMTable).
use super::balance::{PowerBounds, add_operating_modes, add_power_variables, add_state_of_charge};
use super::{ConstraintGroup, ConversionCurve, EncodingVariables, StorageDevice, StorageVariables};
use crate::linearisation::BigMKind;
use crate::optimisation::{Problem, Variable};
use crate::timesteps::Timesteps;
use anyhow::{Context, Result};

/// The big-M formulation of a storage device with piecewise-linear efficiency
pub struct BigMEncoding;

impl ConstraintGroup for BigMEncoding {
    fn add_to_problem(
        &self,
        problem: &mut Problem,
        device: &StorageDevice,
        timesteps: &Timesteps,
    ) -> Result<StorageVariables> {
        let (charge, discharge) = device
            .curves()
            .context("The big-M formulation requires piecewise-linear conversion curves")?;

        let bounds = PowerBounds {
            p_in: 0.0..,
            p_in_stor: 0.0..,
            p_out: 0.0..,
            p_out_stor: 0.0..,
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

        let delta_in = add_segment_selection(problem, "in", charge, &power.p_in, &power.p_in_stor);
        let delta_out =
            add_segment_selection(problem, "out", discharge, &power.p_out_stor, &power.p_out);

        Ok(StorageVariables {
            p_in: power.p_in,
            p_in_stor: power.p_in_stor,
            p_out: power.p_out,
            p_out_stor: power.p_out_stor,
            soc,
            y_in: Some(y_in),
            y_out: Some(y_out),
            encoding: EncodingVariables::BigM {
                delta_in,
                delta_out,
            },
        })
    }
}

/// Require that `y[t] = f(x[t])` for the piecewise-linear function `f` given by `curve`.
///
/// # Returns
///
/// The segment selectors, indexed by timestep and segment.
pub fn add_segment_selection(
    problem: &mut Problem,
    label: &str,
    curve: &ConversionCurve,
    x: &[Variable],
    y: &[Variable],
) -> Vec<Vec<Variable>> {
    let points = curve.breakpoints().points();
    let big_m = curve.big_m();

    x.iter()
        .zip(y)
        .enumerate()
        .map(|(t, (&x, &y))| {
            let deltas: Vec<_> = curve
                .segments()
                .iter()
                .enumerate()
                .map(|(s, segment)| {
                    let delta = problem.add_binary(format!("delta_{label}[{t},{s}]"), 0.0);
                    let name = |kind: BigMKind| format!("segment_{label}[{t},{s}] {kind}");

                    let m = big_m.get(BigMKind::YLower, s);
                    problem.add_row(
                        name(BigMKind::YLower),
                        segment.intercept - m..,
                        [(y, 1.0), (x, -segment.slope), (delta, -m)],
                    );

                    let m = big_m.get(BigMKind::YUpper, s);
                    problem.add_row(
                        name(BigMKind::YUpper),
                        ..=segment.intercept + m,
                        [(y, 1.0), (x, -segment.slope), (delta, m)],
                    );

                    let m = big_m.get(BigMKind::XLower, s);
                    problem.add_row(
                        name(BigMKind::XLower),
                        points[s].0 - m..,
                        [(x, 1.0), (delta, -m)],
                    );

                    let m = big_m.get(BigMKind::XUpper, s);
                    problem.add_row(
                        name(BigMKind::XUpper),
                        ..=points[s + 1].0 + m,
                        [(x, 1.0), (delta, m)],
                    );

                    delta
                })
                .collect();

            problem.add_row(
                format!("segment_choice_{label}[{t}]"),
                1.0..=1.0,
                deltas.iter().map(|&delta| (delta, 1.0)),
            );

            deltas
        })
        .collect()
}
