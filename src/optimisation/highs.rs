//! Solving [`Problem`]s with the HiGHS solver.
//!
//! HiGHS has no native support for special ordered sets, so every SOS2 set is replaced by an
//! equivalent formulation with one binary per pair of adjacent variables before solving.
use super::{FEASIBILITY_TOLERANCE, Problem, Variable, VariableKind};
use anyhow::{Result, ensure};
use highs::{HighsModelStatus, RowProblem, Sense};
use log::{debug, warn};
use std::time::{Duration, Instant};
use strum::Display;

/// Options passed to the solver
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SolverOptions {
    /// Maximum wall-clock time for the solve, in seconds
    pub time_limit: Option<f64>,
    /// Relative MIP gap at which the solver may stop
    pub mip_gap: Option<f64>,
    /// Whether to write the solver's own output to the console
    pub output: bool,
}

/// The outcome of a solve
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum SolveStatus {
    /// A solution was found within the requested gap
    #[strum(to_string = "optimal")]
    Optimal,
    /// The time limit was reached, but a feasible solution is available
    #[strum(to_string = "time limit")]
    TimeLimit,
    /// The problem has no feasible solution
    #[strum(to_string = "infeasible")]
    Infeasible,
    /// The solver stopped without a usable solution
    #[strum(to_string = "no solution")]
    NoSolution,
}

impl SolveStatus {
    /// Whether a solution is available
    pub fn has_solution(self) -> bool {
        matches!(self, Self::Optimal | Self::TimeLimit)
    }
}

/// The result of solving a [`Problem`]
#[derive(Debug, Clone, PartialEq)]
pub struct SolveOutcome {
    /// Whether (and how) the problem was solved
    pub status: SolveStatus,
    /// The objective value, if a solution is available
    pub objective: Option<f64>,
    /// Values of the problem's variables (empty if there is no solution)
    pub values: Vec<f64>,
    /// Time taken by the solver
    pub solution_time: Duration,
    /// The relative MIP gap reported by the solver (`None` for pure LPs)
    pub mip_gap: Option<f64>,
}

impl SolveOutcome {
    /// Get the value of a variable in the solution.
    ///
    /// # Panics
    ///
    /// If there is no solution.
    pub fn value(&self, var: Variable) -> f64 {
        self.values[var.index()]
    }
}

/// Solve a problem, minimising its objective.
///
/// Errors are only returned if the problem cannot be passed to the solver. A problem which is
/// infeasible or could not be solved in time is reported via [`SolveOutcome::status`].
pub fn solve(problem: &Problem, options: &SolverOptions) -> Result<SolveOutcome> {
    let num_columns = problem.num_variables();
    let highs_problem = to_highs_problem(problem)?;

    let mut model = highs_problem.optimise(Sense::Minimise);
    model.set_option("output_flag", options.output);
    if let Some(time_limit) = options.time_limit {
        model.set_option("time_limit", time_limit);
    }
    if let Some(mip_gap) = options.mip_gap {
        model.set_option("mip_rel_gap", mip_gap);
    }

    debug!(
        "Solving problem with {num_columns} variables ({} binary), {} constraints and {} SOS2 sets",
        problem.num_binaries(),
        problem.constraints().len(),
        problem.sos2_sets().len()
    );
    let start = Instant::now();
    let solved = model.solve();
    let solution_time = start.elapsed();

    let status = match solved.status() {
        HighsModelStatus::Optimal => SolveStatus::Optimal,
        HighsModelStatus::ReachedTimeLimit => SolveStatus::TimeLimit,
        HighsModelStatus::Infeasible => SolveStatus::Infeasible,
        status => {
            warn!("Solver stopped with status {status:?}");
            SolveStatus::NoSolution
        }
    };
    if !status.has_solution() {
        return Ok(no_solution(status, solution_time));
    }

    // HiGHS reports an infinite gap for problems without integer columns
    let mip_gap = problem
        .is_mip()
        .then(|| solved.mip_gap())
        .filter(|gap| gap.is_finite());
    let mut values = solved.get_solution().columns().to_vec();
    values.truncate(num_columns);

    // The time limit may be reached before any feasible solution is found
    if status == SolveStatus::TimeLimit && !problem.is_feasible(&values, FEASIBILITY_TOLERANCE) {
        warn!("Time limit reached without a feasible solution");
        return Ok(no_solution(SolveStatus::NoSolution, solution_time));
    }

    Ok(SolveOutcome {
        status,
        objective: Some(problem.objective_value(&values)),
        values,
        solution_time,
        mip_gap,
    })
}

/// An outcome without a solution
fn no_solution(status: SolveStatus, solution_time: Duration) -> SolveOutcome {
    SolveOutcome {
        status,
        objective: None,
        values: Vec::new(),
        solution_time,
        mip_gap: None,
    }
}

/// Convert a [`Problem`] into a HiGHS problem.
///
/// The problem's variables keep their column indices. Binaries used to enforce SOS2 sets are
/// appended after them.
fn to_highs_problem(problem: &Problem) -> Result<RowProblem> {
    let mut highs_problem = RowProblem::default();
    let columns = problem
        .iter_variables()
        .map(|(_, definition)| {
            let bounds = definition.min..=definition.max;
            match definition.kind {
                VariableKind::Continuous => highs_problem.add_column(definition.cost, bounds),
                VariableKind::Binary => highs_problem.add_integer_column(definition.cost, bounds),
            }
        })
        .collect::<Vec<_>>();

    for row in problem.constraints() {
        highs_problem.add_row(
            row.min..=row.max,
            row.terms
                .iter()
                .map(|(var, coeff)| (columns[var.index()], *coeff)),
        );
    }

    // At most two adjacent members of each set may be nonzero: select exactly one pair of
    // neighbours and only allow those to take a value
    for set in problem.sos2_sets() {
        if set.variables.len() <= 2 {
            continue;
        }

        let mut uppers = Vec::with_capacity(set.variables.len());
        for &var in &set.variables {
            let definition = problem.definition(var);
            ensure!(
                definition.min >= 0.0 && definition.max.is_finite(),
                "Members of SOS2 set {} must be nonnegative with a finite upper bound, but {} \
                 has bounds [{}, {}]",
                set.name,
                problem.variable_name(var),
                definition.min,
                definition.max
            );
            uppers.push(definition.max);
        }

        let selectors = (0..set.variables.len() - 1)
            .map(|_| highs_problem.add_integer_column(0.0, 0.0..=1.0))
            .collect::<Vec<_>>();
        highs_problem.add_row(1.0..=1.0, selectors.iter().map(|&col| (col, 1.0)));

        for (k, (&var, upper)) in set.variables.iter().zip(uppers).enumerate() {
            let mut terms = vec![(columns[var.index()], 1.0)];
            if k > 0 {
                terms.push((selectors[k - 1], -upper));
            }
            if k < selectors.len() {
                terms.push((selectors[k], -upper));
            }
            highs_problem.add_row(..=0.0, terms);
        }
    }

    Ok(highs_problem)
}
