//! A solver-independent description of mixed-integer linear programs.
//!
//! Model-building code adds variables, linear rows and SOS2 sets to a [`Problem`]. The problem is
//! then handed to a backend (see [`highs`]) which returns a value for every variable.
use indexmap::IndexMap;
use itertools::Itertools;
use std::ops::{Bound, RangeBounds};

pub mod highs;

/// Default tolerance used when checking whether a solution satisfies a problem
pub const FEASIBILITY_TOLERANCE: f64 = 1e-5;

/// A decision variable in the optimisation.
///
/// Note that this type does **not** include the value of the variable; it just refers to a
/// particular column of the problem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Variable(usize);

impl Variable {
    /// The index of the variable's column
    pub fn index(self) -> usize {
        self.0
    }
}

/// The domain of a variable
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VariableKind {
    /// A real-valued variable
    Continuous,
    /// A variable which can only take the values zero and one
    Binary,
}

/// The definition of a variable: its domain, bounds and objective coefficient
#[derive(Debug, Clone, PartialEq)]
pub struct VariableDefinition {
    /// The domain of the variable
    pub kind: VariableKind,
    /// Lower bound
    pub min: f64,
    /// Upper bound
    pub max: f64,
    /// Coefficient in the (minimised) objective function
    pub cost: f64,
}

/// A linear constraint of the form `min <= sum(coeff * var) <= max`
#[derive(Debug, Clone, PartialEq)]
pub struct Constraint {
    /// The name of the constraint
    pub name: String,
    /// Lower bound
    pub min: f64,
    /// Upper bound
    pub max: f64,
    /// The variables in the constraint and their coefficients
    pub terms: Vec<(Variable, f64)>,
}

impl Constraint {
    /// Evaluate the left-hand side for the given variable values
    pub fn activity(&self, values: &[f64]) -> f64 {
        self.terms
            .iter()
            .map(|(var, coeff)| coeff * values[var.index()])
            .sum()
    }
}

/// A special ordered set of type 2: at most two of the variables may be nonzero and if there are
/// two, they must be adjacent.
#[derive(Debug, Clone, PartialEq)]
pub struct Sos2Set {
    /// The name of the set
    pub name: String,
    /// The variables in the set, in order
    pub variables: Vec<Variable>,
}

impl Sos2Set {
    /// Check whether the given values satisfy the ordering condition
    pub fn is_satisfied(&self, values: &[f64], tolerance: f64) -> bool {
        let nonzero = self
            .variables
            .iter()
            .positions(|var| values[var.index()].abs() > tolerance)
            .collect_vec();

        match nonzero.as_slice() {
            [] | [_] => true,
            [first, second] => second - first == 1,
            _ => false,
        }
    }
}

/// A mixed-integer linear program with a minimisation objective
#[derive(Debug, Clone, Default)]
pub struct Problem {
    variables: IndexMap<String, VariableDefinition>,
    constraints: Vec<Constraint>,
    sos2_sets: Vec<Sos2Set>,
}

impl Problem {
    /// Create an empty problem
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a variable to the problem.
    ///
    /// # Panics
    ///
    /// If a variable with the same name already exists or the bounds are empty.
    fn add_variable(&mut self, name: String, definition: VariableDefinition) -> Variable {
        assert!(
            definition.min <= definition.max,
            "Variable {name} has empty bounds [{}, {}]",
            definition.min,
            definition.max
        );

        let (index, old) = self.variables.insert_full(name, definition);
        assert!(
            old.is_none(),
            "Variable {} defined more than once",
            self.variables.get_index(index).map_or("", |(name, _)| name.as_str())
        );

        Variable(index)
    }

    /// Add a continuous variable with the given bounds and objective coefficient
    pub fn add_continuous<N, B>(&mut self, name: N, bounds: B, cost: f64) -> Variable
    where
        N: Into<String>,
        B: RangeBounds<f64>,
    {
        let (min, max) = to_limits(&bounds);
        self.add_variable(
            name.into(),
            VariableDefinition {
                kind: VariableKind::Continuous,
                min,
                max,
                cost,
            },
        )
    }

    /// Add a binary variable with the given objective coefficient
    pub fn add_binary<N: Into<String>>(&mut self, name: N, cost: f64) -> Variable {
        self.add_variable(
            name.into(),
            VariableDefinition {
                kind: VariableKind::Binary,
                min: 0.0,
                max: 1.0,
                cost,
            },
        )
    }

    /// Add a linear constraint with the given bounds on its left-hand side
    pub fn add_row<N, B, I>(&mut self, name: N, bounds: B, terms: I)
    where
        N: Into<String>,
        B: RangeBounds<f64>,
        I: IntoIterator<Item = (Variable, f64)>,
    {
        let (min, max) = to_limits(&bounds);
        self.constraints.push(Constraint {
            name: name.into(),
            min,
            max,
            terms: terms.into_iter().collect(),
        });
    }

    /// Require that at most two adjacent variables in `variables` are nonzero
    pub fn add_sos2<N: Into<String>>(&mut self, name: N, variables: Vec<Variable>) {
        self.sos2_sets.push(Sos2Set {
            name: name.into(),
            variables,
        });
    }

    /// Look up a variable by name
    pub fn variable(&self, name: &str) -> Option<Variable> {
        self.variables.get_index_of(name).map(Variable)
    }

    /// The name of a variable
    pub fn variable_name(&self, var: Variable) -> &str {
        self.variables
            .get_index(var.index())
            .map(|(name, _)| name.as_str())
            .expect("Variable does not belong to this problem")
    }

    /// The definition of a variable
    pub fn definition(&self, var: Variable) -> &VariableDefinition {
        &self.variables[var.index()]
    }

    /// Iterate over the variables and their definitions, in the order they were added
    pub fn iter_variables(&self) -> impl Iterator<Item = (Variable, &VariableDefinition)> {
        self.variables
            .values()
            .enumerate()
            .map(|(index, definition)| (Variable(index), definition))
    }

    /// The number of variables
    pub fn num_variables(&self) -> usize {
        self.variables.len()
    }

    /// The number of binary variables
    pub fn num_binaries(&self) -> usize {
        self.variables
            .values()
            .filter(|definition| definition.kind == VariableKind::Binary)
            .count()
    }

    /// The linear constraints
    pub fn constraints(&self) -> &[Constraint] {
        &self.constraints
    }

    /// The SOS2 sets
    pub fn sos2_sets(&self) -> &[Sos2Set] {
        &self.sos2_sets
    }

    /// Whether any variable is binary or any SOS2 set is present
    pub fn is_mip(&self) -> bool {
        self.num_binaries() > 0 || !self.sos2_sets.is_empty()
    }

    /// Evaluate the objective function for the given variable values
    pub fn objective_value(&self, values: &[f64]) -> f64 {
        self.variables
            .values()
            .zip(values)
            .map(|(definition, value)| definition.cost * value)
            .sum()
    }

    /// Check whether `values` satisfies every bound, integrality requirement, row and SOS2 set
    pub fn is_feasible(&self, values: &[f64], tolerance: f64) -> bool {
        if values.len() != self.variables.len() || values.iter().any(|v| !v.is_finite()) {
            return false;
        }

        let bounds_ok = self.variables.values().zip(values).all(|(definition, &value)| {
            let in_bounds =
                value >= definition.min - tolerance && value <= definition.max + tolerance;
            let integral = definition.kind == VariableKind::Continuous
                || (value - value.round()).abs() <= tolerance;
            in_bounds && integral
        });

        bounds_ok
            && self.constraints.iter().all(|row| {
                let activity = row.activity(values);
                activity >= row.min - tolerance && activity <= row.max + tolerance
            })
            && self
                .sos2_sets
                .iter()
                .all(|set| set.is_satisfied(values, tolerance))
    }
}

/// Convert range bounds into a pair of (inclusive) limits
fn to_limits<B: RangeBounds<f64>>(bounds: &B) -> (f64, f64) {
    let min = match bounds.start_bound() {
        Bound::Included(&x) | Bound::Excluded(&x) => x,
        Bound::Unbounded => f64::NEG_INFINITY,
    };
    let max = match bounds.end_bound() {
        Bound::Included(&x) | Bound::Excluded(&x) => x,
        Bound::Unbounded => f64::INFINITY,
    };

    (min, max)
}
