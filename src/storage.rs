//! Storage devices and the constraint systems describing their operation.
//!
//! A [`StorageDevice`] holds the physical parameters of a device in absolute units. It is added to
//! an optimisation problem by one of the encodings implementing [`ConstraintGroup`]:
//!
//! * [`big_m::BigMEncoding`]: piecewise-linear conversion with one binary per segment
//! * [`sos2::Sos2Encoding`]: piecewise-linear conversion with SOS2 interpolation weights
//! * [`linear::LinearEncoding`]: constant conversion efficiencies
use crate::breakpoints::BreakpointSet;
use crate::linearisation::{BigMTable, SegmentParams, segment_params};
use crate::optimisation::Problem;
use crate::optimisation::Variable;
use crate::optimisation::highs::SolveOutcome;
use crate::timesteps::Timesteps;
use anyhow::{Context, Result, bail, ensure};
use serde::Deserialize;
use strum::Display;

pub mod balance;
pub mod big_m;
pub mod linear;
pub mod sos2;

/// The formulation used to model a storage device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Display)]
pub enum StorageModel {
    /// Piecewise-linear efficiency with big-M segment selection
    #[default]
    #[serde(rename = "big_m")]
    #[strum(to_string = "big_m")]
    BigM,
    /// Piecewise-linear efficiency with SOS2 interpolation
    #[serde(rename = "sos2")]
    #[strum(to_string = "sos2")]
    Sos2,
    /// Constant efficiencies
    #[serde(rename = "linear")]
    #[strum(to_string = "linear")]
    Linear,
}

impl StorageModel {
    /// The constraint group implementing this formulation
    pub fn encoding(self) -> &'static dyn ConstraintGroup {
        match self {
            Self::BigM => &big_m::BigMEncoding,
            Self::Sos2 => &sos2::Sos2Encoding,
            Self::Linear => &linear::LinearEncoding,
        }
    }

    /// Whether the formulation uses piecewise-linear conversion curves
    pub fn is_piecewise_linear(self) -> bool {
        !matches!(self, Self::Linear)
    }
}

/// The parameters of a storage device as given in a scenario description.
///
/// Minimum powers and the initial state of charge are given relative to the corresponding
/// maxima. Breakpoints are given relative to the maximum charging power (charge curve) or
/// maximum discharging power (discharge curve).
#[derive(Debug, Clone, PartialEq)]
pub struct StorageParameters {
    /// Maximum charging power (MW)
    pub p_max_in: f64,
    /// Maximum discharging power (MW)
    pub p_max_out: f64,
    /// Minimum charging power while charging, relative to `p_max_in`
    pub p_min_in: f64,
    /// Minimum discharging power while discharging, relative to `p_max_out`
    pub p_min_out: f64,
    /// Minimum state of charge (MWh)
    pub soc_min: f64,
    /// Maximum state of charge (MWh)
    pub soc_max: f64,
    /// Initial state of charge, relative to `soc_max`
    pub soc_ini: f64,
    /// Fraction of the state of charge retained from one timestep to the next
    pub eta_soc: f64,
    /// Constant charging efficiency
    pub eta_in: Option<f64>,
    /// Constant discharging efficiency
    pub eta_out: Option<f64>,
    /// Charging curve: grid power (x) to stored power (y)
    pub charge_breakpoints: Option<BreakpointSet>,
    /// Discharging curve: power taken from storage (x) to grid power (y)
    pub discharge_breakpoints: Option<BreakpointSet>,
}

/// A piecewise-linear conversion curve with the parameters needed by the encodings
#[derive(Debug, Clone, PartialEq)]
pub struct ConversionCurve {
    breakpoints: BreakpointSet,
    segments: Vec<SegmentParams>,
    big_m: BigMTable,
}

impl ConversionCurve {
    /// Derive segment parameters and big-M constants for a set of breakpoints
    pub fn new(breakpoints: BreakpointSet) -> Result<Self> {
        let segments = segment_params(&breakpoints);
        let big_m = BigMTable::new(&breakpoints, &segments)?;

        Ok(Self {
            breakpoints,
            segments,
            big_m,
        })
    }

    /// The breakpoints of the curve
    pub fn breakpoints(&self) -> &BreakpointSet {
        &self.breakpoints
    }

    /// The parameters of each segment
    pub fn segments(&self) -> &[SegmentParams] {
        &self.segments
    }

    /// The big-M constants of each segment
    pub fn big_m(&self) -> &BigMTable {
        &self.big_m
    }
}

/// How power is converted between the grid and the storage
#[derive(Debug, Clone, PartialEq)]
pub enum Conversion {
    /// Constant efficiencies
    Constant {
        /// Charging efficiency
        eta_in: f64,
        /// Discharging efficiency
        eta_out: f64,
    },
    /// Piecewise-linear conversion curves
    PiecewiseLinear {
        /// Charging curve, from `P_in` to `P_in_stor`
        charge: ConversionCurve,
        /// Discharging curve, from `P_out_stor` to `P_out`
        discharge: ConversionCurve,
    },
}

/// A storage device with parameters in absolute units
#[derive(Debug, Clone, PartialEq)]
pub struct StorageDevice {
    /// Maximum charging power (MW)
    pub p_max_in: f64,
    /// Maximum discharging power (MW)
    pub p_max_out: f64,
    /// Minimum charging power while charging (MW)
    pub p_min_in: f64,
    /// Minimum discharging power while discharging (MW)
    pub p_min_out: f64,
    /// Minimum state of charge (MWh)
    pub soc_min: f64,
    /// Maximum state of charge (MWh)
    pub soc_max: f64,
    /// Initial state of charge (MWh)
    pub soc_ini: f64,
    /// Fraction of the state of charge retained from one timestep to the next
    pub eta_soc: f64,
    /// Conversion between grid and storage
    pub conversion: Conversion,
}

impl StorageDevice {
    /// Create a [`StorageDevice`] for the given formulation, converting relative parameters to
    /// absolute values.
    pub fn new(params: &StorageParameters, model: StorageModel) -> Result<Self> {
        check_parameters(params)?;

        let conversion = if model.is_piecewise_linear() {
            let (Some(charge), Some(discharge)) =
                (&params.charge_breakpoints, &params.discharge_breakpoints)
            else {
                bail!("The {model} storage model requires charge and discharge breakpoints");
            };
            ensure!(
                charge.len() == discharge.len(),
                "Number of charge breakpoints ({}) does not match number of discharge \
                 breakpoints ({})",
                charge.len(),
                discharge.len()
            );

            let charge = charge
                .scaled(params.p_max_in)
                .and_then(ConversionCurve::new)
                .context("Invalid charge breakpoints")?;
            let discharge = discharge
                .scaled(params.p_max_out)
                .and_then(ConversionCurve::new)
                .context("Invalid discharge breakpoints")?;
            Conversion::PiecewiseLinear { charge, discharge }
        } else {
            let (Some(eta_in), Some(eta_out)) = (params.eta_in, params.eta_out) else {
                bail!("The {model} storage model requires ETA_IN and ETA_OUT");
            };
            for (name, eta) in [("ETA_IN", eta_in), ("ETA_OUT", eta_out)] {
                ensure!(
                    eta > 0.0 && eta <= 1.0,
                    "{name} must be in (0, 1], but is {eta}"
                );
            }
            Conversion::Constant { eta_in, eta_out }
        };

        Ok(Self {
            p_max_in: params.p_max_in,
            p_max_out: params.p_max_out,
            p_min_in: params.p_min_in * params.p_max_in,
            p_min_out: params.p_min_out * params.p_max_out,
            soc_min: params.soc_min,
            soc_max: params.soc_max,
            soc_ini: params.soc_ini * params.soc_max,
            eta_soc: params.eta_soc,
            conversion,
        })
    }

    /// The charging and discharging curves, if the conversion is piecewise linear
    pub fn curves(&self) -> Option<(&ConversionCurve, &ConversionCurve)> {
        match &self.conversion {
            Conversion::PiecewiseLinear { charge, discharge } => Some((charge, discharge)),
            Conversion::Constant { .. } => None,
        }
    }
}

/// Check the scalar parameters of a storage device
fn check_parameters(params: &StorageParameters) -> Result<()> {
    let scalars = [
        ("P_MAX_IN", params.p_max_in),
        ("P_MAX_OUT", params.p_max_out),
        ("P_MIN_IN", params.p_min_in),
        ("P_MIN_OUT", params.p_min_out),
        ("SOC_MIN", params.soc_min),
        ("SOC_MAX", params.soc_max),
        ("SOC_INI", params.soc_ini),
        ("ETA_SOC", params.eta_soc),
    ];
    for (name, value) in scalars {
        ensure!(
            value.is_finite() && value >= 0.0,
            "{name} must be a nonnegative number, but is {value}"
        );
    }

    ensure!(params.p_max_in > 0.0, "P_MAX_IN must be positive");
    ensure!(params.p_max_out > 0.0, "P_MAX_OUT must be positive");
    ensure!(
        params.p_min_in <= 1.0 && params.p_min_out <= 1.0,
        "P_MIN_IN and P_MIN_OUT are relative to the maximum power and must not exceed 1"
    );
    ensure!(
        params.soc_min <= params.soc_max,
        "SOC_MIN ({}) must not exceed SOC_MAX ({})",
        params.soc_min,
        params.soc_max
    );
    ensure!(
        params.soc_ini <= 1.0,
        "SOC_INI is relative to SOC_MAX and must not exceed 1, but is {}",
        params.soc_ini
    );
    ensure!(
        params.eta_soc > 0.0 && params.eta_soc <= 1.0,
        "ETA_SOC must be in (0, 1], but is {}",
        params.eta_soc
    );

    Ok(())
}

/// Variables added to a problem for the selection of segments or interpolation weights
#[derive(Debug, Clone, PartialEq, Default)]
pub enum EncodingVariables {
    /// No additional variables
    #[default]
    None,
    /// Binary segment selectors, indexed by timestep and segment
    BigM {
        /// Selectors for the charging curve
        delta_in: Vec<Vec<Variable>>,
        /// Selectors for the discharging curve
        delta_out: Vec<Vec<Variable>>,
    },
    /// Interpolation weights, indexed by timestep and breakpoint
    Sos2 {
        /// Weights for the charging curve
        lambda_in: Vec<Vec<Variable>>,
        /// Weights for the discharging curve
        lambda_out: Vec<Vec<Variable>>,
    },
}

/// Handles for the variables describing a storage device's operation, indexed by timestep
#[derive(Debug, Clone, PartialEq)]
pub struct StorageVariables {
    /// Power drawn from the grid
    pub p_in: Vec<Variable>,
    /// Power added to the storage
    pub p_in_stor: Vec<Variable>,
    /// Power delivered to the grid
    pub p_out: Vec<Variable>,
    /// Power taken from the storage
    pub p_out_stor: Vec<Variable>,
    /// State of charge at the end of the timestep
    pub soc: Vec<Variable>,
    /// Charging indicators, if the formulation has them
    pub y_in: Option<Vec<Variable>>,
    /// Discharging indicators, if the formulation has them
    pub y_out: Option<Vec<Variable>>,
    /// Formulation-specific variables
    pub encoding: EncodingVariables,
}

impl StorageVariables {
    /// Read the device's operation from a solution
    pub fn operation(&self, outcome: &SolveOutcome) -> Vec<StorageOperation> {
        (0..self.soc.len())
            .map(|t| StorageOperation {
                p_in: outcome.value(self.p_in[t]),
                p_in_stor: outcome.value(self.p_in_stor[t]),
                p_out: outcome.value(self.p_out[t]),
                p_out_stor: outcome.value(self.p_out_stor[t]),
                soc: outcome.value(self.soc[t]),
            })
            .collect()
    }
}

/// The operation of a storage device in one timestep
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StorageOperation {
    /// Power drawn from the grid
    pub p_in: f64,
    /// Power added to the storage
    pub p_in_stor: f64,
    /// Power delivered to the grid
    pub p_out: f64,
    /// Power taken from the storage
    pub p_out_stor: f64,
    /// State of charge at the end of the timestep
    pub soc: f64,
}

impl StorageOperation {
    /// Set values below `threshold` to zero
    pub fn rounded(self, threshold: f64) -> Self {
        let round = |value: f64| if value < threshold { 0.0 } else { value };
        Self {
            p_in: round(self.p_in),
            p_in_stor: round(self.p_in_stor),
            p_out: round(self.p_out),
            p_out_stor: round(self.p_out_stor),
            soc: round(self.soc),
        }
    }

    /// The charging efficiency, if the device is charging
    pub fn eta_in(&self) -> Option<f64> {
        (self.p_in > 0.0).then(|| self.p_in_stor / self.p_in)
    }

    /// The discharging efficiency, if the device is discharging
    pub fn eta_out(&self) -> Option<f64> {
        (self.p_out_stor > 0.0).then(|| self.p_out / self.p_out_stor)
    }
}

/// A formulation of a storage device's operation as variables and constraints
pub trait ConstraintGroup {
    /// Add the device's variables and constraints to `problem`.
    ///
    /// Nothing is added to the objective function.
    fn add_to_problem(
        &self,
        problem: &mut Problem,
        device: &StorageDevice,
        timesteps: &Timesteps,
    ) -> Result<StorageVariables>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixture::{assert_error, storage_parameters};
    use float_cmp::assert_approx_eq;
    use rstest::rstest;

    #[rstest]
    fn test_storage_device_scaling(storage_parameters: StorageParameters) {
        let device = StorageDevice::new(&storage_parameters, StorageModel::BigM).unwrap();
        assert_eq!(device.p_max_in, 10.0);
        assert_approx_eq!(f64, device.p_min_in, 1.0);
        assert_approx_eq!(f64, device.p_min_out, 1.0);
        assert_approx_eq!(f64, device.soc_ini, 20.0);

        let (charge, discharge) = device.curves().unwrap();
        assert_eq!(charge.breakpoints().x_bounds(), (0.0, 10.0));
        assert_eq!(discharge.breakpoints().x_bounds(), (0.0, 10.0));
        assert_eq!(charge.segments().len(), 2);
        assert_eq!(charge.big_m().num_segments(), 2);
    }

    #[rstest]
    fn test_storage_device_linear(mut storage_parameters: StorageParameters) {
        assert_error!(
            StorageDevice::new(&storage_parameters, StorageModel::Linear),
            "The linear storage model requires ETA_IN and ETA_OUT"
        );

        storage_parameters.eta_in = Some(0.9);
        storage_parameters.eta_out = Some(0.8);
        let device = StorageDevice::new(&storage_parameters, StorageModel::Linear).unwrap();
        assert_eq!(
            device.conversion,
            Conversion::Constant {
                eta_in: 0.9,
                eta_out: 0.8
            }
        );
        assert!(device.curves().is_none());
    }

    #[rstest]
    fn test_storage_device_missing_breakpoints(mut storage_parameters: StorageParameters) {
        storage_parameters.discharge_breakpoints = None;
        assert_error!(
            StorageDevice::new(&storage_parameters, StorageModel::Sos2),
            "The sos2 storage model requires charge and discharge breakpoints"
        );
    }

    #[rstest]
    fn test_storage_device_breakpoint_count_mismatch(mut storage_parameters: StorageParameters) {
        storage_parameters.discharge_breakpoints =
            Some(BreakpointSet::new(&[0.0, 1.0], &[0.0, 0.9]).unwrap());
        assert!(StorageDevice::new(&storage_parameters, StorageModel::BigM).is_err());
    }

    #[rstest]
    #[case(|p: &mut StorageParameters| p.p_max_in = 0.0)]
    #[case(|p: &mut StorageParameters| p.p_min_out = 1.5)]
    #[case(|p: &mut StorageParameters| p.soc_min = 50.0)]
    #[case(|p: &mut StorageParameters| p.soc_ini = -0.1)]
    #[case(|p: &mut StorageParameters| p.eta_soc = 0.0)]
    #[case(|p: &mut StorageParameters| p.soc_max = f64::NAN)]
    fn test_storage_device_invalid(
        mut storage_parameters: StorageParameters,
        #[case] modify: fn(&mut StorageParameters),
    ) {
        modify(&mut storage_parameters);
        assert!(StorageDevice::new(&storage_parameters, StorageModel::BigM).is_err());
    }

    #[test]
    fn test_storage_operation_efficiencies() {
        let operation = StorageOperation {
            p_in: 2.0,
            p_in_stor: 1.8,
            p_out: 0.0,
            p_out_stor: 1e-9,
            soc: 5.0,
        };
        assert_approx_eq!(f64, operation.eta_in().unwrap(), 0.9);
        assert!(operation.eta_out().is_some());

        let rounded = operation.rounded(1e-7);
        assert_eq!(rounded.p_out_stor, 0.0);
        assert!(rounded.eta_out().is_none());
    }

    #[test]
    fn test_storage_model_names() {
        assert_eq!(StorageModel::default(), StorageModel::BigM);
        assert_eq!(StorageModel::Sos2.to_string(), "sos2");
        assert!(!StorageModel::Linear.is_piecewise_linear());
    }
}
