//! Constraints shared by all storage formulations: the state-of-charge balance and the operating
//! mode indicators.
use super::StorageDevice;
use crate::optimisation::{Problem, Variable};
use crate::timesteps::Timesteps;
use std::ops::RangeBounds;

/// Handles for the power flows of a device, indexed by timestep
pub struct PowerVariables {
    /// Power drawn from the grid
    pub p_in: Vec<Variable>,
    /// Power added to the storage
    pub p_in_stor: Vec<Variable>,
    /// Power delivered to the grid
    pub p_out: Vec<Variable>,
    /// Power taken from the storage
    pub p_out_stor: Vec<Variable>,
}

/// Bounds for each of the four power flows
pub struct PowerBounds<B> {
    /// Bounds for `P_in`
    pub p_in: B,
    /// Bounds for `P_in_stor`
    pub p_in_stor: B,
    /// Bounds for `P_out`
    pub p_out: B,
    /// Bounds for `P_out_stor`
    pub p_out_stor: B,
}

/// Add the four power flow variables for every timestep
pub fn add_power_variables<B>(
    problem: &mut Problem,
    timesteps: &Timesteps,
    bounds: &PowerBounds<B>,
) -> PowerVariables
where
    B: RangeBounds<f64> + Clone,
{
    let mut add = |name: &str, bounds: &B| -> Vec<Variable> {
        (0..timesteps.len())
            .map(|t| problem.add_continuous(format!("{name}[{t}]"), bounds.clone(), 0.0))
            .collect()
    };

    PowerVariables {
        p_in: add("P_in", &bounds.p_in),
        p_in_stor: add("P_in_stor", &bounds.p_in_stor),
        p_out: add("P_out", &bounds.p_out),
        p_out_stor: add("P_out_stor", &bounds.p_out_stor),
    }
}

/// Add the state-of-charge variables and their constraints.
///
/// For every timestep `t` with length `dt`:
///
/// ```text
/// soc[t] = ETA_SOC * soc[t-1] + dt * P_in_stor[t] - dt * P_out_stor[t]
/// SOC_MIN <= soc[t] <= SOC_MAX
/// ```
///
/// where `soc[-1]` is the initial state of charge. At the end of the horizon the state of charge
/// must have returned to at least its initial value.
pub fn add_state_of_charge(
    problem: &mut Problem,
    device: &StorageDevice,
    timesteps: &Timesteps,
    p_in_stor: &[Variable],
    p_out_stor: &[Variable],
) -> Vec<Variable> {
    let dt = timesteps.duration_hours();
    let soc: Vec<_> = (0..timesteps.len())
        .map(|t| problem.add_continuous(format!("soc[{t}]"), device.soc_min..=device.soc_max, 0.0))
        .collect();

    for t in 0..timesteps.len() {
        let mut terms = vec![
            (soc[t], 1.0),
            (p_in_stor[t], -dt),
            (p_out_stor[t], dt),
        ];
        let rhs = if t == 0 {
            device.eta_soc * device.soc_ini
        } else {
            terms.push((soc[t - 1], -device.eta_soc));
            0.0
        };
        problem.add_row(format!("soc_balance[{t}]"), rhs..=rhs, terms);
    }

    if let Some(&last) = soc.last() {
        problem.add_row("soc_end", device.soc_ini.., [(last, 1.0)]);
    }

    soc
}

/// Add binary indicators for charging and discharging.
///
/// While charging, the power drawn must lie between `P_MIN_IN` and `P_MAX_IN`, otherwise it must
/// be zero (and likewise for discharging). The device cannot charge and discharge in the same
/// timestep.
///
/// # Returns
///
/// The charging and discharging indicators.
pub fn add_operating_modes(
    problem: &mut Problem,
    device: &StorageDevice,
    p_in: &[Variable],
    p_out: &[Variable],
) -> (Vec<Variable>, Vec<Variable>) {
    let mut y_in = Vec::with_capacity(p_in.len());
    let mut y_out = Vec::with_capacity(p_out.len());

    for (t, (&p_in, &p_out)) in p_in.iter().zip(p_out).enumerate() {
        let charging = problem.add_binary(format!("Y_in[{t}]"), 0.0);
        let discharging = problem.add_binary(format!("Y_out[{t}]"), 0.0);

        problem.add_row(
            format!("P_in_max[{t}]"),
            ..=0.0,
            [(p_in, 1.0), (charging, -device.p_max_in)],
        );
        problem.add_row(
            format!("P_in_min[{t}]"),
            0.0..,
            [(p_in, 1.0), (charging, -device.p_min_in)],
        );
        problem.add_row(
            format!("P_out_max[{t}]"),
            ..=0.0,
            [(p_out, 1.0), (discharging, -device.p_max_out)],
        );
        problem.add_row(
            format!("P_out_min[{t}]"),
            0.0..,
            [(p_out, 1.0), (discharging, -device.p_min_out)],
        );
        problem.add_row(
            format!("operation_mode[{t}]"),
            ..=1.0,
            [(charging, 1.0), (discharging, 1.0)],
        );

        y_in.push(charging);
        y_out.push(discharging);
    }

    (y_in, y_out)
}
