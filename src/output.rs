//! The module responsible for writing output data to disk.
use crate::energy_system::BusFlows;
use crate::input::CSV_DELIMITER;
use crate::storage::StorageOperation;
use crate::timesteps::{TIMESTAMP_FORMAT, Timesteps};
use anyhow::{Context, Result, ensure};
use chrono::Local;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub mod metadata;

/// The root folder in which scenario-file-specific output folders will be created
const OUTPUT_DIRECTORY_ROOT: &str = "pwl_storage_results";

/// The output file name for the operation of the storage device
const STORAGE_FILE_NAME: &str = "storage.csv";

/// The output file name for flows at the generation bus
const BUS_GEN_FILE_NAME: &str = "bus_gen.csv";

/// The output file name for flows at the demand bus
const BUS_DEM_FILE_NAME: &str = "bus_dem.csv";

/// Storage powers below this value are written as zero
pub const ROUNDING_THRESHOLD: f64 = 1e-7;

/// Get the default output folder for the scenario file at the specified path
pub fn get_output_dir(scenario_file: &Path) -> Result<PathBuf> {
    let name = scenario_file
        .file_stem()
        .context("Scenario file has no name")?
        .to_str()
        .context("Invalid chars in scenario file name")?;

    Ok([OUTPUT_DIRECTORY_ROOT, name].iter().collect())
}

/// Create a new output directory, deleting an existing one if `allow_overwrite` is set.
///
/// # Returns
///
/// Whether an existing directory was overwritten.
pub fn create_output_directory(output_dir: &Path, allow_overwrite: bool) -> Result<bool> {
    let overwrite = if output_dir.is_dir() {
        let is_empty = output_dir.read_dir()?.next().is_none();
        if is_empty {
            return Ok(false);
        }

        ensure!(
            allow_overwrite,
            "Output folder already exists and is not empty. Use --overwrite to replace it."
        );
        fs::remove_dir_all(output_dir)?;
        true
    } else {
        false
    };

    // Try to create the directory, with parents
    fs::create_dir_all(output_dir)?;

    Ok(overwrite)
}

/// Represents a row in the storage CSV file
#[derive(Serialize, Deserialize, Debug, PartialEq)]
struct StorageRow {
    datetime: String,
    #[serde(rename = "P_in")]
    p_in: f64,
    #[serde(rename = "P_in_stor")]
    p_in_stor: f64,
    #[serde(rename = "P_out")]
    p_out: f64,
    #[serde(rename = "P_out_stor")]
    p_out_stor: f64,
    soc: f64,
    eta_in: Option<f64>,
    eta_out: Option<f64>,
}

/// Represents a row in the generation bus CSV file
#[derive(Serialize, Deserialize, Debug, PartialEq)]
struct BusGenRow {
    datetime: String,
    ee_gen: f64,
    fossil_gen: f64,
    cut_off: f64,
    connect: f64,
    storage_in: f64,
}

/// Represents a row in the demand bus CSV file
#[derive(Serialize, Deserialize, Debug, PartialEq)]
struct BusDemRow {
    datetime: String,
    connect: f64,
    storage_out: f64,
    demand: f64,
}

/// The results of one scenario, indexed by timestep
pub struct ScenarioResults<'a> {
    /// The timesteps of the scenario
    pub timesteps: &'a Timesteps,
    /// The operation of the storage device
    pub storage: &'a [StorageOperation],
    /// The flows at both buses
    pub buses: &'a [BusFlows],
}

/// Open a `;`-separated CSV writer
fn new_writer(file_path: &Path) -> Result<csv::Writer<fs::File>> {
    csv::WriterBuilder::new()
        .delimiter(CSV_DELIMITER)
        .from_path(file_path)
        .with_context(|| format!("Could not create {}", file_path.display()))
}

/// Write the results of one scenario to a folder of its own.
///
/// # Arguments
///
/// * `output_path` - Folder in which the scenario's folder is created
/// * `name` - The name of the scenario
/// * `results` - The results to write
///
/// # Returns
///
/// The path of the scenario's folder.
pub fn write_scenario_results(
    output_path: &Path,
    name: &str,
    results: &ScenarioResults,
) -> Result<PathBuf> {
    let dir_path = output_path.join(name);
    fs::create_dir_all(&dir_path)
        .with_context(|| format!("Could not create directory {}", dir_path.display()))?;

    let datetimes: Vec<_> = results
        .timesteps
        .iter()
        .map(|datetime| datetime.format(TIMESTAMP_FORMAT).to_string())
        .collect();

    let mut writer = new_writer(&dir_path.join(STORAGE_FILE_NAME))?;
    for (datetime, operation) in datetimes.iter().zip(results.storage) {
        let operation = operation.rounded(ROUNDING_THRESHOLD);
        writer.serialize(StorageRow {
            datetime: datetime.clone(),
            p_in: operation.p_in,
            p_in_stor: operation.p_in_stor,
            p_out: operation.p_out,
            p_out_stor: operation.p_out_stor,
            soc: operation.soc,
            eta_in: operation.eta_in(),
            eta_out: operation.eta_out(),
        })?;
    }
    writer.flush()?;

    let mut writer = new_writer(&dir_path.join(BUS_GEN_FILE_NAME))?;
    for (datetime, flows) in datetimes.iter().zip(results.buses) {
        writer.serialize(BusGenRow {
            datetime: datetime.clone(),
            ee_gen: flows.ee_gen,
            fossil_gen: flows.fossil_gen,
            cut_off: flows.cut_off,
            connect: flows.connect,
            storage_in: flows.storage_in,
        })?;
    }
    writer.flush()?;

    let mut writer = new_writer(&dir_path.join(BUS_DEM_FILE_NAME))?;
    for (datetime, flows) in datetimes.iter().zip(results.buses) {
        writer.serialize(BusDemRow {
            datetime: datetime.clone(),
            connect: flows.connect,
            storage_out: flows.storage_out,
            demand: flows.demand,
        })?;
    }
    writer.flush()?;

    Ok(dir_path)
}

/// A row of the scenario status table
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ScenarioStatus {
    /// The name of the scenario
    pub name: String,
    /// Whether the scenario was to be calculated (0 or 1)
    pub active: u8,
    /// Whether a solution was found (0 or 1)
    pub solved: u8,
    /// The outcome reported by the solver, if the scenario was solved
    pub status: Option<String>,
    /// Time limit for the solver, in seconds
    pub solve_timeout: f64,
    /// Requested relative MIP gap
    pub mip_gap: f64,
    /// The relative MIP gap reported by the solver
    pub final_mip_gap: Option<f64>,
    /// Time taken by the solver, in seconds
    pub solution_time: Option<f64>,
    /// The objective value
    pub objective: Option<f64>,
    /// Mean charging efficiency over the timesteps in which the device charges
    pub eta_in_mean: Option<f64>,
    /// Mean discharging efficiency over the timesteps in which the device discharges
    pub eta_out_mean: Option<f64>,
}

impl ScenarioStatus {
    /// A status for a scenario which has not (yet) been solved
    pub fn new(name: &str, active: bool, solve_timeout: f64, mip_gap: f64) -> Self {
        Self {
            name: name.to_string(),
            active: active.into(),
            solved: 0,
            status: None,
            solve_timeout,
            mip_gap,
            final_mip_gap: None,
            solution_time: None,
            objective: None,
            eta_in_mean: None,
            eta_out_mean: None,
        }
    }
}

/// Write the status of all scenarios to a file named after the current date and time.
///
/// # Returns
///
/// The path of the file written.
pub fn write_scenario_status(output_path: &Path, statuses: &[ScenarioStatus]) -> Result<PathBuf> {
    let version_date = Local::now().format("%d_%m_%Y__%H_%M");
    let file_path = output_path.join(format!("scenario_status_version_{version_date}.csv"));

    let mut writer = new_writer(&file_path)?;
    for status in statuses {
        writer.serialize(status)?;
    }
    writer.flush()?;

    Ok(file_path)
}
