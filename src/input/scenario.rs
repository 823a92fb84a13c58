//! Code for reading the scenario table and the time series it refers to.
//!
//! Each row of the scenario table describes one optimisation run: the storage device, the
//! formulation used for it, the time horizon and the solver settings.
use super::{
    deserialise_flag, deserialise_optional_proportion, deserialise_proportion, input_err_msg,
    parse_float_list, read_columns, read_csv_semicolon,
};
use crate::breakpoints::BreakpointSet;
use crate::energy_system::{DEFAULT_FOSSIL_COST, EnergySystem};
use crate::optimisation::highs::SolverOptions;
use crate::storage::{StorageDevice, StorageModel, StorageParameters};
use crate::timesteps::Timesteps;
use anyhow::{Context, Result, bail, ensure};
use itertools::Itertools;
use serde::Deserialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// The column of the time series file containing demand
const DEMAND_COLUMN: &str = "demand_[MW]";

/// The column of the time series file containing renewable generation
const GENERATION_COLUMN: &str = "ee_generation_[MW]";

/// One row of the scenario table
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ScenarioOptions {
    /// A unique name, also used for the scenario's output folder
    pub name: String,
    /// Whether the scenario should be calculated
    #[serde(deserialize_with = "deserialise_flag")]
    pub active: bool,
    /// Time limit for the solver, in seconds
    pub solve_timeout: f64,
    /// Relative MIP gap at which the solver may stop
    pub mip_gap: f64,
    /// The formulation used for the storage device
    #[serde(default)]
    pub storage_model: StorageModel,
    /// The start of the first timestep
    pub start_date: String,
    /// The number of timesteps
    pub timeseries_length: usize,
    /// The length of a timestep, e.g. `1h` or `15min`
    pub frequency: String,
    /// Path to the time series file, relative to the scenario file
    pub input_data: PathBuf,
    #[serde(rename = "P_MAX_IN_[MW]")]
    p_max_in: f64,
    #[serde(rename = "P_MAX_OUT_[MW]")]
    p_max_out: f64,
    #[serde(rename = "P_MIN_IN_[-]", deserialize_with = "deserialise_proportion")]
    p_min_in: f64,
    #[serde(rename = "P_MIN_OUT_[-]", deserialize_with = "deserialise_proportion")]
    p_min_out: f64,
    #[serde(rename = "SOC_MIN_[MWh]")]
    soc_min: f64,
    #[serde(rename = "SOC_MAX_[MWh]")]
    soc_max: f64,
    #[serde(rename = "SOC_INI_[-]", deserialize_with = "deserialise_proportion")]
    soc_ini: f64,
    #[serde(
        rename = "ETA_SOC_[-]",
        default,
        deserialize_with = "deserialise_optional_proportion"
    )]
    eta_soc: Option<f64>,
    #[serde(
        rename = "ETA_IN_[-]",
        default,
        deserialize_with = "deserialise_optional_proportion"
    )]
    eta_in: Option<f64>,
    #[serde(
        rename = "ETA_OUT_[-]",
        default,
        deserialize_with = "deserialise_optional_proportion"
    )]
    eta_out: Option<f64>,
    #[serde(rename = "p_in_breakpoints_[-]", default)]
    p_in_breakpoints: Option<String>,
    #[serde(rename = "p_in_stor_breakpoints_[-]", default)]
    p_in_stor_breakpoints: Option<String>,
    #[serde(rename = "p_out_stor_breakpoints_[-]", default)]
    p_out_stor_breakpoints: Option<String>,
    #[serde(rename = "p_out_breakpoints_[-]", default)]
    p_out_breakpoints: Option<String>,
    /// Scaling factor for demand
    #[serde(rename = "sf_dem_[-]")]
    pub sf_dem: f64,
    /// Scaling factor for renewable generation
    #[serde(rename = "sf_res_[-]")]
    pub sf_res: f64,
    /// Cost of fossil generation per MWh
    #[serde(default)]
    pub fossil_cost: Option<f64>,
}

impl ScenarioOptions {
    /// The timesteps of the optimisation
    pub fn timesteps(&self) -> Result<Timesteps> {
        Timesteps::from_strings(&self.start_date, &self.frequency, self.timeseries_length)
    }

    /// The options to pass to the solver
    pub fn solver_options(&self, output: bool) -> SolverOptions {
        SolverOptions {
            time_limit: Some(self.solve_timeout),
            mip_gap: Some(self.mip_gap),
            output,
        }
    }

    /// The parameters of the storage device, with breakpoints relative to the maximum powers
    pub fn storage_parameters(&self) -> Result<StorageParameters> {
        let charge_breakpoints = breakpoints_from_strings(
            self.p_in_breakpoints.as_deref(),
            self.p_in_stor_breakpoints.as_deref(),
        )
        .context("Invalid charge breakpoints")?;
        let discharge_breakpoints = breakpoints_from_strings(
            self.p_out_stor_breakpoints.as_deref(),
            self.p_out_breakpoints.as_deref(),
        )
        .context("Invalid discharge breakpoints")?;

        Ok(StorageParameters {
            p_max_in: self.p_max_in,
            p_max_out: self.p_max_out,
            p_min_in: self.p_min_in,
            p_min_out: self.p_min_out,
            soc_min: self.soc_min,
            soc_max: self.soc_max,
            soc_ini: self.soc_ini,
            eta_soc: self.eta_soc.unwrap_or(1.0),
            eta_in: self.eta_in,
            eta_out: self.eta_out,
            charge_breakpoints,
            discharge_breakpoints,
        })
    }

    /// Build the energy system described by this scenario.
    ///
    /// # Arguments
    ///
    /// * `base_dir` - The directory relative to which the time series path is resolved
    pub fn energy_system(&self, base_dir: &Path) -> Result<EnergySystem> {
        let timesteps = self.timesteps()?;
        let storage = StorageDevice::new(&self.storage_parameters()?, self.storage_model)?;
        let (demand, ee_generation) = read_timeseries(
            &base_dir.join(&self.input_data),
            timesteps.len(),
            self.sf_dem,
            self.sf_res,
        )?;

        EnergySystem::new(
            timesteps,
            demand,
            ee_generation,
            self.fossil_cost.unwrap_or(DEFAULT_FOSSIL_COST),
            storage,
            self.storage_model,
        )
    }

    /// Check values which do not depend on other files
    fn validate(&self) -> Result<()> {
        ensure!(
            self.solve_timeout.is_finite() && self.solve_timeout > 0.0,
            "solve_timeout must be positive, but is {}",
            self.solve_timeout
        );
        ensure!(
            self.mip_gap.is_finite() && self.mip_gap >= 0.0,
            "mip_gap must be nonnegative, but is {}",
            self.mip_gap
        );
        ensure!(
            self.sf_dem >= 0.0 && self.sf_res >= 0.0,
            "Scaling factors must be nonnegative"
        );

        Ok(())
    }
}

/// Read the scenario table from `file_path`.
///
/// Scenario names must be unique and usable as folder names.
pub fn read_scenarios(file_path: &Path) -> Result<Vec<ScenarioOptions>> {
    let scenarios: Vec<ScenarioOptions> = read_csv_semicolon(file_path)?;

    let mut names = HashSet::new();
    for scenario in &scenarios {
        let name = scenario.name.as_str();
        ensure!(
            !name.is_empty() && !name.contains(['/', '\\']) && name != "." && name != "..",
            "{}: Invalid scenario name '{name}'",
            input_err_msg(file_path)
        );
        ensure!(
            names.insert(name),
            "{}: Duplicate scenario name '{name}'",
            input_err_msg(file_path)
        );
        scenario
            .validate()
            .with_context(|| format!("{}: Invalid scenario '{name}'", input_err_msg(file_path)))?;
    }

    Ok(scenarios)
}

/// Create breakpoints from strings of separated values.
///
/// Either both strings or neither must be given.
fn breakpoints_from_strings(x: Option<&str>, y: Option<&str>) -> Result<Option<BreakpointSet>> {
    let (x, y) = match (x, y) {
        (Some(x), Some(y)) => (x, y),
        (None, None) => return Ok(None),
        (Some(_), None) => bail!("x breakpoints are given without y breakpoints"),
        (None, Some(_)) => bail!("y breakpoints are given without x breakpoints"),
    };

    let x = parse_float_list(x)?;
    let y = parse_float_list(y)?;
    BreakpointSet::new(&x, &y).map(Some)
}

/// Read demand and renewable generation for the first `len` timesteps, applying scaling factors
fn read_timeseries(
    file_path: &Path,
    len: usize,
    sf_dem: f64,
    sf_res: f64,
) -> Result<(Vec<f64>, Vec<f64>)> {
    let columns = read_columns(file_path, &[DEMAND_COLUMN, GENERATION_COLUMN])?;
    let (demand, generation) = columns
        .into_iter()
        .collect_tuple()
        .context("Expected exactly two columns")?;
    ensure!(
        demand.len() >= len,
        "{}: Time series has {} rows, but {len} timesteps are required",
        input_err_msg(file_path),
        demand.len()
    );

    let scale = |values: Vec<f64>, factor: f64| -> Vec<f64> {
        values
            .into_iter()
            .take(len)
            .map(|value| value * factor)
            .collect()
    };

    Ok((scale(demand, sf_dem), scale(generation, sf_res)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use float_cmp::assert_approx_eq;
    use std::fs;
    use tempfile::tempdir;

    const HEADER: &str = "name;active;solve_timeout;mip_gap;storage_model;start_date;\
        timeseries_length;frequency;input_data;P_MAX_IN_[MW];P_MAX_OUT_[MW];P_MIN_IN_[-];\
        P_MIN_OUT_[-];SOC_MIN_[MWh];SOC_MAX_[MWh];SOC_INI_[-];ETA_SOC_[-];ETA_IN_[-];ETA_OUT_[-];\
        p_in_breakpoints_[-];p_in_stor_breakpoints_[-];p_out_stor_breakpoints_[-];\
        p_out_breakpoints_[-];sf_dem_[-];sf_res_[-]";

    fn write_scenarios(dir: &Path, rows: &[&str]) -> PathBuf {
        let file_path = dir.join("scenarios.csv");
        let contents = std::iter::once(HEADER).chain(rows.iter().copied()).join("\n");
        fs::write(&file_path, contents).unwrap();
        file_path
    }

    fn write_timeseries(dir: &Path) {
        fs::write(
            dir.join("timeseries.csv"),
            "datetime;demand_[MW];ee_generation_[MW]\n\
             2020-01-01 00:00:00;1;4\n\
             2020-01-01 01:00:00;2;3\n\
             2020-01-01 02:00:00;3;2\n",
        )
        .unwrap();
    }

    const BIG_M_ROW: &str = "pwl;1;60;0.01;big_m;2020-01-01 00:00:00;2;1h;timeseries.csv;\
        10;10;0.1;0.1;0;40;0.5;;;;0, 0.5, 1;0, 0.45, 0.85;0, 0.5, 1;0, 0.46, 0.88;2;0.5";

    const LINEAR_ROW: &str = "lin;0;60;0;linear;2020-01-01;3;1h;timeseries.csv;\
        10;10;0;0;0;40;0;0.99;0.9;0.8;;;;;1;1";

    #[test]
    fn test_read_scenarios() {
        let dir = tempdir().unwrap();
        let file_path = write_scenarios(dir.path(), &[BIG_M_ROW, LINEAR_ROW]);
        let scenarios = read_scenarios(&file_path).unwrap();
        assert_eq!(scenarios.len(), 2);

        let pwl = &scenarios[0];
        assert_eq!(pwl.name, "pwl");
        assert!(pwl.active);
        assert_eq!(pwl.storage_model, StorageModel::BigM);
        assert_eq!(pwl.eta_soc, None);
        let params = pwl.storage_parameters().unwrap();
        assert_eq!(params.eta_soc, 1.0);
        assert_eq!(
            params.charge_breakpoints.unwrap().points(),
            [(0.0, 0.0), (0.5, 0.45), (1.0, 0.85)]
        );

        let linear = &scenarios[1];
        assert!(!linear.active);
        assert_eq!(linear.storage_model, StorageModel::Linear);
        let params = linear.storage_parameters().unwrap();
        assert_eq!(params.eta_in, Some(0.9));
        assert!(params.charge_breakpoints.is_none());
    }

    #[test]
    fn test_read_scenarios_duplicate_name() {
        let dir = tempdir().unwrap();
        let file_path = write_scenarios(dir.path(), &[BIG_M_ROW, BIG_M_ROW]);
        assert!(read_scenarios(&file_path).is_err());
    }

    #[test]
    fn test_read_scenarios_invalid_timeout() {
        let dir = tempdir().unwrap();
        let row = BIG_M_ROW.replacen(";60;", ";0;", 1);
        let file_path = write_scenarios(dir.path(), &[&row]);
        assert!(read_scenarios(&file_path).is_err());
    }

    #[test]
    fn test_read_scenarios_invalid_proportion() {
        let dir = tempdir().unwrap();
        let row = BIG_M_ROW.replacen(";10;10;0.1;", ";10;10;1.5;", 1);
        let file_path = write_scenarios(dir.path(), &[&row]);
        assert!(read_scenarios(&file_path).is_err());

        let row = LINEAR_ROW.replacen(";0.99;0.9;", ";0.99;1.9;", 1);
        let file_path = write_scenarios(dir.path(), &[&row]);
        assert!(read_scenarios(&file_path).is_err());
    }

    #[test]
    fn test_breakpoints_from_strings() {
        assert_eq!(breakpoints_from_strings(None, None).unwrap(), None);
        let breakpoints = breakpoints_from_strings(Some("0, 1"), Some("0, 0.9"))
            .unwrap()
            .unwrap();
        assert_eq!(breakpoints.points(), [(0.0, 0.0), (1.0, 0.9)]);

        assert!(breakpoints_from_strings(Some("0, 1"), None).is_err());
        assert!(breakpoints_from_strings(None, Some("0, 0.9")).is_err());
    }

    #[test]
    fn test_storage_parameters_half_breakpoint_pair() {
        let dir = tempdir().unwrap();
        let row = LINEAR_ROW.replacen(";0.8;;;;;", ";0.8;0, 1;;;;", 1);
        let file_path = write_scenarios(dir.path(), &[&row]);
        let scenarios = read_scenarios(&file_path).unwrap();
        assert!(scenarios[0].storage_parameters().is_err());
    }

    #[test]
    fn test_energy_system() {
        let dir = tempdir().unwrap();
        write_timeseries(dir.path());
        let file_path = write_scenarios(dir.path(), &[BIG_M_ROW, LINEAR_ROW]);
        let scenarios = read_scenarios(&file_path).unwrap();

        // Only the first two rows are used, with scaling factors applied
        let system = scenarios[0].energy_system(dir.path()).unwrap();
        assert_eq!(system.timesteps.len(), 2);
        assert_eq!(system.demand, [2.0, 4.0]);
        assert_eq!(system.ee_generation, [2.0, 1.5]);
        assert_eq!(system.fossil_cost, DEFAULT_FOSSIL_COST);
        assert_approx_eq!(f64, system.storage.soc_ini, 20.0);

        let system = scenarios[1].energy_system(dir.path()).unwrap();
        assert_eq!(system.demand, [1.0, 2.0, 3.0]);
        assert_eq!(system.storage.eta_soc, 0.99);
    }

    #[test]
    fn test_energy_system_timeseries_too_short() {
        let dir = tempdir().unwrap();
        write_timeseries(dir.path());
        let row = BIG_M_ROW.replacen(";2;1h;", ";5;1h;", 1);
        let file_path = write_scenarios(dir.path(), &[&row]);
        let scenarios = read_scenarios(&file_path).unwrap();
        assert!(scenarios[0].energy_system(dir.path()).is_err());
    }

    #[test]
    fn test_energy_system_missing_breakpoints() {
        let dir = tempdir().unwrap();
        write_timeseries(dir.path());
        let row = LINEAR_ROW.replacen("linear", "sos2", 1);
        let file_path = write_scenarios(dir.path(), &[&row]);
        let scenarios = read_scenarios(&file_path).unwrap();
        assert!(scenarios[0].energy_system(dir.path()).is_err());
    }
}
