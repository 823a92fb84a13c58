//! The command line interface for the program.
use crate::breakpoints::fit::EfficiencyCurve;
use crate::efficiency::ConstantEfficiency;
use crate::input::read_columns;
use crate::input::scenario::read_scenarios;
use crate::log;
use crate::output::metadata::write_metadata;
use crate::output::{create_output_directory, get_output_dir};
use crate::settings::Settings;
use crate::simulation::{calculate_breakpoints, run};
use ::log::{LevelFilter, info, warn};
use anyhow::{Context, Result};
use clap::{Args, CommandFactory, Parser, Subcommand};
use itertools::Itertools;
use std::path::{Path, PathBuf};

/// The command line interface for the program.
#[derive(Parser)]
#[command(version, about)]
struct Cli {
    /// The available commands.
    #[command(subcommand)]
    command: Option<Commands>,
}

/// Options for the run command
#[derive(Args)]
pub struct RunOpts {
    /// Directory for output files
    #[arg(short, long)]
    pub output_dir: Option<PathBuf>,
    /// Whether to overwrite the output directory if it already exists
    #[arg(long)]
    pub overwrite: bool,
}

/// Options for the breakpoints command
#[derive(Args)]
pub struct BreakpointOpts {
    /// Column of the data file containing input power
    #[arg(long)]
    pub x_column: String,
    /// Column of the data file containing output power
    #[arg(long)]
    pub y_column: String,
    /// The smallest number of breakpoints to fit
    #[arg(long, default_value_t = 2)]
    pub min_breakpoints: usize,
    /// The largest number of breakpoints to fit
    #[arg(long)]
    pub max_breakpoints: usize,
    /// The minimal nonzero operating point
    #[arg(long)]
    pub x_min: f64,
    /// The maximal operating point
    #[arg(long)]
    pub x_max: f64,
    /// Number of decimals when saving breakpoints as strings
    #[arg(long)]
    pub decimals: Option<usize>,
    /// Directory for output files
    #[arg(short, long)]
    pub output_dir: Option<PathBuf>,
}

/// The available commands.
#[derive(Subcommand)]
enum Commands {
    /// Run the scenarios in a scenario file.
    Run {
        /// Path to the scenario file.
        scenario_file: PathBuf,
        /// Other run options
        #[command(flatten)]
        opts: RunOpts,
    },
    /// Validate a scenario file.
    Validate {
        /// Path to the scenario file.
        scenario_file: PathBuf,
    },
    /// Fit breakpoints to measured efficiency data.
    Breakpoints {
        /// Path to the data file.
        data_file: PathBuf,
        /// Other breakpoint options
        #[command(flatten)]
        opts: BreakpointOpts,
    },
    /// Estimate constant efficiencies from measured data.
    Efficiency {
        /// Path to the data file.
        data_file: PathBuf,
        /// Column of the data file containing input power
        #[arg(long)]
        x_column: String,
        /// Column of the data file containing output power
        #[arg(long)]
        y_column: String,
        /// Column of the data file containing the efficiency, if present
        #[arg(long)]
        eff_column: Option<String>,
    },
}

impl Commands {
    /// Execute the supplied CLI command
    fn execute(self) -> Result<()> {
        match self {
            Self::Run {
                scenario_file,
                opts,
            } => handle_run_command(&scenario_file, &opts, None),
            Self::Validate { scenario_file } => handle_validate_command(&scenario_file, None),
            Self::Breakpoints { data_file, opts } => {
                handle_breakpoints_command(&data_file, &opts, None)
            }
            Self::Efficiency {
                data_file,
                x_column,
                y_column,
                eff_column,
            } => handle_efficiency_command(
                &data_file,
                &x_column,
                &y_column,
                eff_column.as_deref(),
                None,
            )
            .map(|_| ()),
        }
    }
}

/// Parse CLI arguments and start the program
pub fn run_cli() -> Result<()> {
    let cli = Cli::parse();

    let Some(command) = cli.command else {
        let help_str = Cli::command().render_long_help().to_string();
        println!("{help_str}");
        return Ok(());
    };

    command.execute()
}

/// Load program settings for an input file, if not provided
fn load_settings(settings: Option<Settings>, input_file: &Path) -> Result<Settings> {
    match settings {
        Some(settings) => Ok(settings),
        None => Settings::load(Some(input_file)).context("Failed to load settings."),
    }
}

/// Initialise the program logger with the log level from settings
fn init_logger(settings: &Settings, log_file_path: Option<&Path>) -> Result<LevelFilter> {
    log::init(Some(settings.log_level.as_str()), log_file_path)
        .context("Failed to initialise logging.")
}

/// Handle the `run` command.
///
/// Log files are written to the output folder of the first run in a process only, as the logger
/// is initialised once (see [`log::init`]).
pub fn handle_run_command(
    scenario_file: &Path,
    opts: &RunOpts,
    settings: Option<Settings>,
) -> Result<()> {
    let settings = load_settings(settings, scenario_file)?;

    // Get path to output folder
    let pathbuf: PathBuf;
    let output_path = if let Some(p) = opts.output_dir.as_deref() {
        p
    } else {
        pathbuf = get_output_dir(scenario_file)?;
        &pathbuf
    };

    let overwrite = create_output_directory(output_path, opts.overwrite || settings.overwrite)
        .with_context(|| {
            format!(
                "Failed to create output directory: {}",
                output_path.display()
            )
        })?;

    // Initialise program logger
    let log_level = init_logger(&settings, Some(output_path))?;

    let scenarios = read_scenarios(scenario_file).context("Failed to load scenarios.")?;
    info!(
        "Loaded {} scenarios from {}",
        scenarios.len(),
        scenario_file.display()
    );
    info!("Output folder: {}", output_path.display());

    // NB: We have to wait until the logger is initialised to display this warning
    if overwrite {
        warn!("Output folder will be overwritten");
    }

    write_metadata(output_path, scenario_file, scenarios.len())
        .context("Failed to save metadata.")?;

    let base_dir = scenario_file.parent().unwrap_or(Path::new(""));
    let statuses = run(
        &scenarios,
        base_dir,
        output_path,
        log_level != LevelFilter::Off,
    )?;
    let num_solved = statuses.iter().filter(|status| status.solved == 1).count();
    let num_active = statuses.iter().filter(|status| status.active == 1).count();
    info!("Calculated all scenarios ({num_solved} of {num_active} active scenarios solved)");

    Ok(())
}

/// Handle the `validate` command.
pub fn handle_validate_command(scenario_file: &Path, settings: Option<Settings>) -> Result<()> {
    let settings = load_settings(settings, scenario_file)?;

    // Initialise program logger (we won't save log files when running the validate command)
    init_logger(&settings, None)?;

    // Build the energy system of every active scenario, without solving
    let scenarios = read_scenarios(scenario_file).context("Failed to validate scenarios.")?;
    let base_dir = scenario_file.parent().unwrap_or(Path::new(""));
    for scenario in scenarios.iter().filter(|scenario| scenario.active) {
        scenario
            .energy_system(base_dir)
            .and_then(|system| system.build_problem())
            .with_context(|| format!("Failed to validate scenario '{}'.", scenario.name))?;
    }
    info!("Scenario validation successful!");

    Ok(())
}

/// Handle the `breakpoints` command.
pub fn handle_breakpoints_command(
    data_file: &Path,
    opts: &BreakpointOpts,
    settings: Option<Settings>,
) -> Result<()> {
    let settings = load_settings(settings, data_file)?;
    init_logger(&settings, None)?;

    let output_path = opts
        .output_dir
        .clone()
        .or_else(|| data_file.parent().map(|dir| dir.join("breakpoints")))
        .context("Could not determine output directory")?;
    let (x, y) = read_columns(data_file, &[opts.x_column.as_str(), opts.y_column.as_str()])?
        .into_iter()
        .collect_tuple()
        .context("Expected exactly two columns")?;
    let curve = EfficiencyCurve::new(x, y)
        .with_context(|| format!("Invalid efficiency data in {}", data_file.display()))?;

    calculate_breakpoints(
        &curve,
        opts.min_breakpoints..=opts.max_breakpoints,
        opts.x_min,
        opts.x_max,
        &output_path,
        opts.decimals.unwrap_or(settings.breakpoint_decimals),
    )?;
    info!("Breakpoints saved to {}", output_path.display());

    Ok(())
}

/// Handle the `efficiency` command.
pub fn handle_efficiency_command(
    data_file: &Path,
    x_column: &str,
    y_column: &str,
    eff_column: Option<&str>,
    settings: Option<Settings>,
) -> Result<ConstantEfficiency> {
    let settings = load_settings(settings, data_file)?;
    init_logger(&settings, None)?;

    ConstantEfficiency::from_csv(data_file, x_column, y_column, eff_column)
}
