//! The energy system surrounding a storage device.
//!
//! Two buses are connected directly and through the storage device:
//!
//! ```text
//! bus_gen: ee_gen + fossil_gen = cut_off + connect + P_in
//! bus_dem: connect + P_out     = demand
//! ```
//!
//! Renewable generation and demand are fixed by time series. Surplus generation can be curtailed
//! for free, while fossil generation has a cost per MWh. The objective is to minimise the cost of
//! fossil generation.
use crate::optimisation::highs::SolveOutcome;
use crate::optimisation::{Problem, Variable};
use crate::storage::{StorageDevice, StorageModel, StorageVariables};
use crate::timesteps::Timesteps;
use anyhow::{Context, Result, ensure};
use log::debug;

/// The cost of fossil generation if not otherwise specified, per MWh
pub const DEFAULT_FOSSIL_COST: f64 = 100.0;

/// An energy system with a single storage device
#[derive(Debug, Clone, PartialEq)]
pub struct EnergySystem {
    /// The timesteps of the optimisation
    pub timesteps: Timesteps,
    /// Demand in each timestep (MW)
    pub demand: Vec<f64>,
    /// Renewable generation in each timestep (MW)
    pub ee_generation: Vec<f64>,
    /// The cost of fossil generation, per MWh
    pub fossil_cost: f64,
    /// The storage device
    pub storage: StorageDevice,
    /// The formulation used for the storage device
    pub storage_model: StorageModel,
}

impl EnergySystem {
    /// Create a new [`EnergySystem`], checking that the time series match the timesteps
    pub fn new(
        timesteps: Timesteps,
        demand: Vec<f64>,
        ee_generation: Vec<f64>,
        fossil_cost: f64,
        storage: StorageDevice,
        storage_model: StorageModel,
    ) -> Result<Self> {
        for (name, series) in [("demand", &demand), ("ee_generation", &ee_generation)] {
            ensure!(
                series.len() == timesteps.len(),
                "Time series {name} has {} values, but there are {} timesteps",
                series.len(),
                timesteps.len()
            );
            ensure!(
                series.iter().all(|value| value.is_finite() && *value >= 0.0),
                "Time series {name} must contain nonnegative numbers"
            );
        }
        ensure!(
            fossil_cost.is_finite() && fossil_cost >= 0.0,
            "Fossil generation cost must be nonnegative, but is {fossil_cost}"
        );

        Ok(Self {
            timesteps,
            demand,
            ee_generation,
            fossil_cost,
            storage,
            storage_model,
        })
    }

    /// Build the optimisation problem for this energy system
    pub fn build_problem(&self) -> Result<(Problem, EnergySystemVariables)> {
        let mut problem = Problem::new();
        let storage = self
            .storage_model
            .encoding()
            .add_to_problem(&mut problem, &self.storage, &self.timesteps)
            .with_context(|| format!("Could not add {} storage model", self.storage_model))?;

        let dt = self.timesteps.duration_hours();
        let mut ee_gen = Vec::with_capacity(self.timesteps.len());
        let mut fossil_gen = Vec::with_capacity(self.timesteps.len());
        let mut cut_off = Vec::with_capacity(self.timesteps.len());
        let mut connect = Vec::with_capacity(self.timesteps.len());
        for (t, (&generation, &demand)) in self.ee_generation.iter().zip(&self.demand).enumerate() {
            let ee = problem.add_continuous(format!("ee_gen[{t}]"), generation..=generation, 0.0);
            let fossil =
                problem.add_continuous(format!("fossil_gen[{t}]"), 0.0.., self.fossil_cost * dt);
            let cut = problem.add_continuous(format!("cut_off[{t}]"), 0.0.., 0.0);
            let direct = problem.add_continuous(format!("connect[{t}]"), 0.0.., 0.0);

            problem.add_row(
                format!("bus_gen[{t}]"),
                0.0..=0.0,
                [
                    (ee, 1.0),
                    (fossil, 1.0),
                    (cut, -1.0),
                    (direct, -1.0),
                    (storage.p_in[t], -1.0),
                ],
            );
            problem.add_row(
                format!("bus_dem[{t}]"),
                demand..=demand,
                [(direct, 1.0), (storage.p_out[t], 1.0)],
            );

            ee_gen.push(ee);
            fossil_gen.push(fossil);
            cut_off.push(cut);
            connect.push(direct);
        }

        debug!(
            "Built energy system with {} variables and {} constraints",
            problem.num_variables(),
            problem.constraints().len()
        );

        let variables = EnergySystemVariables {
            ee_gen,
            fossil_gen,
            cut_off,
            connect,
            storage,
        };

        Ok((problem, variables))
    }
}

/// Handles for the variables of an energy system, indexed by timestep
#[derive(Debug, Clone, PartialEq)]
pub struct EnergySystemVariables {
    /// Renewable generation
    pub ee_gen: Vec<Variable>,
    /// Fossil generation
    pub fossil_gen: Vec<Variable>,
    /// Curtailed generation
    pub cut_off: Vec<Variable>,
    /// Direct flow from the generation to the demand bus
    pub connect: Vec<Variable>,
    /// The storage device
    pub storage: StorageVariables,
}

impl EnergySystemVariables {
    /// Read the flows at both buses from a solution
    pub fn bus_flows(&self, outcome: &SolveOutcome, demand: &[f64]) -> Vec<BusFlows> {
        demand
            .iter()
            .enumerate()
            .map(|(t, &demand)| BusFlows {
                ee_gen: outcome.value(self.ee_gen[t]),
                fossil_gen: outcome.value(self.fossil_gen[t]),
                cut_off: outcome.value(self.cut_off[t]),
                connect: outcome.value(self.connect[t]),
                storage_in: outcome.value(self.storage.p_in[t]),
                storage_out: outcome.value(self.storage.p_out[t]),
                demand,
            })
            .collect()
    }
}

/// The flows at both buses in one timestep
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BusFlows {
    /// Renewable generation into `bus_gen`
    pub ee_gen: f64,
    /// Fossil generation into `bus_gen`
    pub fossil_gen: f64,
    /// Curtailment from `bus_gen`
    pub cut_off: f64,
    /// Flow from `bus_gen` to `bus_dem`
    pub connect: f64,
    /// Flow from `bus_gen` into storage
    pub storage_in: f64,
    /// Flow from storage into `bus_dem`
    pub storage_out: f64,
    /// Demand at `bus_dem`
    pub demand: f64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixture::{storage_device, timesteps};
    use crate::optimisation::highs::{SolveStatus, SolverOptions, solve};
    use float_cmp::assert_approx_eq;
    use rstest::rstest;

    #[rstest]
    fn test_energy_system_new_invalid(storage_device: StorageDevice, timesteps: Timesteps) {
        let new = |demand: Vec<f64>, generation: Vec<f64>, cost| {
            EnergySystem::new(
                timesteps.clone(),
                demand,
                generation,
                cost,
                storage_device.clone(),
                StorageModel::BigM,
            )
        };
        assert!(new(vec![1.0; 4], vec![1.0; 4], 100.0).is_ok());
        assert!(new(vec![1.0; 3], vec![1.0; 4], 100.0).is_err());
        assert!(new(vec![1.0; 4], vec![-1.0; 4], 100.0).is_err());
        assert!(new(vec![1.0; 4], vec![1.0; 4], f64::NAN).is_err());
    }

    #[rstest]
    fn test_energy_system_without_storage_use(
        storage_device: StorageDevice,
        timesteps: Timesteps,
    ) {
        // Renewables exceed demand except in the last timestep
        let system = EnergySystem::new(
            timesteps,
            vec![5.0, 5.0, 5.0, 5.0],
            vec![8.0, 8.0, 8.0, 3.0],
            DEFAULT_FOSSIL_COST,
            storage_device,
            StorageModel::BigM,
        )
        .unwrap();
        let (problem, variables) = system.build_problem().unwrap();
        let outcome = solve(&problem, &SolverOptions::default()).unwrap();
        assert_eq!(outcome.status, SolveStatus::Optimal);

        let flows = variables.bus_flows(&outcome, &system.demand);
        assert_eq!(flows.len(), 4);
        for flow in &flows {
            // Both buses balance
            assert_approx_eq!(
                f64,
                flow.ee_gen + flow.fossil_gen,
                flow.cut_off + flow.connect + flow.storage_in,
                epsilon = 1e-6
            );
            assert_approx_eq!(
                f64,
                flow.connect + flow.storage_out,
                flow.demand,
                epsilon = 1e-6
            );
        }

        // Storing surplus to cover the deficit is cheaper than fossil generation
        assert!(outcome.objective.unwrap() < 2.0 * DEFAULT_FOSSIL_COST);
    }
}
