//! Functionality for running batches of storage dispatch optimisations.
use crate::breakpoints::BreakpointSet;
use crate::breakpoints::fit::{EfficiencyCurve, fit_breakpoints};
use crate::input::scenario::ScenarioOptions;
use crate::optimisation::highs::{SolveStatus, solve};
use crate::output::{
    ROUNDING_THRESHOLD, ScenarioResults, ScenarioStatus, write_scenario_results,
    write_scenario_status,
};
use crate::storage::StorageOperation;
use anyhow::{Context, Result, ensure};
use log::{info, warn};
use std::ops::RangeInclusive;
use std::path::Path;

/// Run all active scenarios and write their results.
///
/// A scenario which fails (because of invalid input or because the solver finds no solution) is
/// reported in the status table and the remaining scenarios are still calculated.
///
/// # Arguments
///
/// * `scenarios` - The scenarios to run
/// * `base_dir` - The directory relative to which time series paths are resolved
/// * `output_path` - The folder in which results are written
/// * `solver_output` - Whether to show the solver's own output
///
/// # Returns
///
/// The status of every scenario, in the order given.
pub fn run(
    scenarios: &[ScenarioOptions],
    base_dir: &Path,
    output_path: &Path,
    solver_output: bool,
) -> Result<Vec<ScenarioStatus>> {
    let mut statuses = Vec::with_capacity(scenarios.len());
    for scenario in scenarios {
        let mut status = ScenarioStatus::new(
            &scenario.name,
            scenario.active,
            scenario.solve_timeout,
            scenario.mip_gap,
        );

        if scenario.active {
            info!("Calculating scenario: '{}'", scenario.name);
            match run_scenario(scenario, base_dir, output_path, solver_output, &mut status) {
                Ok(()) => info!("Scenario '{}' finished", scenario.name),
                Err(err) => warn!("Scenario '{}' failed: {err:?}", scenario.name),
            }
        } else {
            info!("Skipping inactive scenario: '{}'", scenario.name);
        }

        statuses.push(status);
    }

    let file_path = write_scenario_status(output_path, &statuses)?;
    info!("Scenario status written to {}", file_path.display());

    Ok(statuses)
}

/// Build, solve and export a single scenario, recording the outcome in `status`
fn run_scenario(
    scenario: &ScenarioOptions,
    base_dir: &Path,
    output_path: &Path,
    solver_output: bool,
    status: &mut ScenarioStatus,
) -> Result<()> {
    let system = scenario.energy_system(base_dir)?;
    let (problem, variables) = system.build_problem()?;
    let outcome = solve(&problem, &scenario.solver_options(solver_output))?;
    status.status = Some(outcome.status.to_string());
    status.solution_time = Some(outcome.solution_time.as_secs_f64());

    match outcome.status {
        SolveStatus::Optimal => {}
        SolveStatus::TimeLimit => warn!(
            "Time limit reached for scenario '{}'; the solution may not be optimal",
            scenario.name
        ),
        SolveStatus::Infeasible | SolveStatus::NoSolution => {
            warn!(
                "No solution for scenario '{}': {}",
                scenario.name, outcome.status
            );
            return Ok(());
        }
    }

    let storage: Vec<StorageOperation> = variables
        .storage
        .operation(&outcome)
        .into_iter()
        .map(|operation| operation.rounded(ROUNDING_THRESHOLD))
        .collect();
    let buses = variables.bus_flows(&outcome, &system.demand);
    let results = ScenarioResults {
        timesteps: &system.timesteps,
        storage: &storage,
        buses: &buses,
    };
    let dir_path = write_scenario_results(output_path, &scenario.name, &results)?;
    info!("Results written to {}", dir_path.display());

    status.solved = 1;
    status.objective = outcome.objective;
    status.final_mip_gap = outcome.mip_gap;
    status.eta_in_mean = mean(storage.iter().filter_map(StorageOperation::eta_in));
    status.eta_out_mean = mean(storage.iter().filter_map(StorageOperation::eta_out));

    Ok(())
}

/// The mean of some values, if there are any
fn mean<I: Iterator<Item = f64>>(values: I) -> Option<f64> {
    let (count, sum) = values.fold((0usize, 0.0), |(count, sum), value| (count + 1, sum + value));
    (count > 0).then(|| sum / count as f64)
}

/// Fit breakpoints for a range of breakpoint counts, process them for the operating range and
/// save them.
///
/// # Arguments
///
/// * `curve` - The measured efficiency curve
/// * `counts` - The numbers of breakpoints to fit (each at least 2)
/// * `x_min` - The minimal nonzero operating point
/// * `x_max` - The maximal operating point
/// * `output_path` - The folder in which the breakpoint files are written
/// * `decimals` - The number of decimals in the breakpoint strings
///
/// # Returns
///
/// The processed breakpoints for each count.
pub fn calculate_breakpoints(
    curve: &EfficiencyCurve,
    counts: RangeInclusive<usize>,
    x_min: f64,
    x_max: f64,
    output_path: &Path,
    decimals: usize,
) -> Result<Vec<BreakpointSet>> {
    ensure!(
        *counts.start() >= 2,
        "At least two breakpoints are required, but the minimum is {}",
        counts.start()
    );
    ensure!(!counts.is_empty(), "Range of breakpoint counts is empty");

    counts
        .map(|count| {
            let fitted = fit_breakpoints(curve, count - 1)
                .with_context(|| format!("Could not fit {count} breakpoints"))?;
            if let Some(rms) = curve.rms_error(&fitted) {
                info!("Fitted {count} breakpoints with RMS error {rms:.6}");
            }

            let processed = fitted
                .process(x_min, x_max)
                .with_context(|| format!("Could not process {count} breakpoints"))?;
            let (table_path, _) = processed.write_csv(output_path, decimals)?;
            let (x_string, y_string) = processed.to_strings(decimals);
            info!(
                "Saved breakpoints to {}\n  x: {x_string}\n  y: {y_string}",
                table_path.display()
            );

            Ok(processed)
        })
        .collect()
}
