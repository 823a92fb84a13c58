//! Storage with constant conversion efficiencies.
//!
//! This formulation is a pure linear program. Charging and discharging in the same timestep is not
//! excluded explicitly; with efficiencies below one it is never worthwhile.
use super::balance::{PowerBounds, add_power_variables, add_state_of_charge};
use super::{ConstraintGroup, Conversion, EncodingVariables, StorageDevice, StorageVariables};
use crate::optimisation::Problem;
use crate::timesteps::Timesteps;
use anyhow::{Result, bail};

/// The formulation of a storage device with constant efficiencies
pub struct LinearEncoding;

impl ConstraintGroup for LinearEncoding {
    fn add_to_problem(
        &self,
        problem: &mut Problem,
        device: &StorageDevice,
        timesteps: &Timesteps,
    ) -> Result<StorageVariables> {
        let Conversion::Constant { eta_in, eta_out } = device.conversion else {
            bail!("The linear formulation requires constant efficiencies");
        };

        let bounds = PowerBounds {
            p_in: 0.0..=device.p_max_in,
            p_in_stor: 0.0..=f64::INFINITY,
            p_out: 0.0..=device.p_max_out,
            p_out_stor: 0.0..=f64::INFINITY,
        };
        let power = add_power_variables(problem, timesteps, &bounds);
        let soc = add_state_of_charge(
            problem,
            device,
            timesteps,
            &power.p_in_stor,
            &power.p_out_stor,
        );

        for t in 0..timesteps.len() {
            problem.add_row(
                format!("conversion_in[{t}]"),
                0.0..=0.0,
                [(power.p_in_stor[t], 1.0), (power.p_in[t], -eta_in)],
            );
            problem.add_row(
                format!("conversion_out[{t}]"),
                0.0..=0.0,
                [(power.p_out[t], 1.0), (power.p_out_stor[t], -eta_out)],
            );
        }

        Ok(StorageVariables {
            p_in: power.p_in,
            p_in_stor: power.p_in_stor,
            p_out: power.p_out,
            p_out_stor: power.p_out_stor,
            soc,
            y_in: None,
            y_out: None,
            encoding: EncodingVariables::None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixture::{storage_device, storage_parameters, timesteps};
    use crate::optimisation::FEASIBILITY_TOLERANCE;
    use crate::storage::{StorageModel, StorageParameters};
    use rstest::rstest;

    #[rstest]
    fn test_linear_encoding(mut storage_parameters: StorageParameters, timesteps: Timesteps) {
        storage_parameters.eta_in = Some(0.9);
        storage_parameters.eta_out = Some(0.8);
        let device = StorageDevice::new(&storage_parameters, StorageModel::Linear).unwrap();

        let mut problem = Problem::new();
        let variables = LinearEncoding
            .add_to_problem(&mut problem, &device, &timesteps)
            .unwrap();
        assert!(!problem.is_mip());
        assert!(variables.y_in.is_none());
        assert_eq!(problem.definition(variables.p_in[0]).max, 10.0);

        // Charge 10 MW in the first hour, then discharge the stored 9 MWh over the next two
        let mut values = vec![0.0; problem.num_variables()];
        let mut set = |var: crate::optimisation::Variable, value| values[var.index()] = value;
        set(variables.p_in[0], 10.0);
        set(variables.p_in_stor[0], 9.0);
        set(variables.p_out_stor[1], 4.5);
        set(variables.p_out[1], 3.6);
        set(variables.p_out_stor[2], 4.5);
        set(variables.p_out[2], 3.6);
        set(variables.soc[0], 29.0);
        set(variables.soc[1], 24.5);
        set(variables.soc[2], 20.0);
        set(variables.soc[3], 20.0);
        assert!(problem.is_feasible(&values, FEASIBILITY_TOLERANCE));

        // Delivering more than the efficiency allows
        values[variables.p_out[1].index()] = 4.0;
        assert!(!problem.is_feasible(&values, FEASIBILITY_TOLERANCE));
    }

    #[rstest]
    fn test_linear_encoding_requires_constant_efficiency(
        storage_device: StorageDevice,
        timesteps: Timesteps,
    ) {
        let mut problem = Problem::new();
        assert!(
            LinearEncoding
                .add_to_problem(&mut problem, &storage_device, &timesteps)
                .is_err()
        );
    }
}
