//! Code for loading program settings.
use crate::input::read_toml;
use crate::log::DEFAULT_LOG_LEVEL;
use anyhow::Result;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// The name of the settings file
pub const SETTINGS_FILE_NAME: &str = "settings.toml";

/// The number of decimals with which breakpoints are written by default
const DEFAULT_BREAKPOINT_DECIMALS: usize = 4;

/// Default log level for program
fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

/// Default precision of breakpoint strings
fn default_breakpoint_decimals() -> usize {
    DEFAULT_BREAKPOINT_DECIMALS
}

/// Program settings from config file
#[derive(Debug, Deserialize, PartialEq)]
pub struct Settings {
    /// The default program log level
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Whether to overwrite output folders by default
    #[serde(default)]
    pub overwrite: bool,
    /// The number of decimals used when saving breakpoints as strings
    #[serde(default = "default_breakpoint_decimals")]
    pub breakpoint_decimals: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            overwrite: false,
            breakpoint_decimals: DEFAULT_BREAKPOINT_DECIMALS,
        }
    }
}

impl Settings {
    /// Read program settings for an input file.
    ///
    /// A `settings.toml` next to `input_file` takes precedence over one in the working directory.
    /// If neither is present, default values for settings will be used.
    pub fn load(input_file: Option<&Path>) -> Result<Settings> {
        let candidates = input_file
            .and_then(Path::parent)
            .map(|dir| dir.join(SETTINGS_FILE_NAME))
            .into_iter()
            .chain(std::iter::once(PathBuf::from(SETTINGS_FILE_NAME)));
        for file_path in candidates {
            if file_path.is_file() {
                return Self::load_from_path(&file_path);
            }
        }

        Ok(Settings::default())
    }

    /// Read from the specified path, using default values if the file is not present
    pub fn load_from_path(file_path: &Path) -> Result<Settings> {
        if !file_path.is_file() {
            return Ok(Settings::default());
        }

        read_toml(file_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::{self, File};
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn test_settings_load_from_path_no_file() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join(SETTINGS_FILE_NAME); // NB: doesn't exist
        assert_eq!(
            Settings::load_from_path(&file_path).unwrap(),
            Settings::default()
        );
    }

    #[test]
    fn test_settings_load_from_path() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join(SETTINGS_FILE_NAME);

        {
            let mut file = File::create(&file_path).unwrap();
            writeln!(file, "log_level = \"warn\"").unwrap();
        }

        assert_eq!(
            Settings::load_from_path(&file_path).unwrap(),
            Settings {
                log_level: "warn".to_string(),
                overwrite: false,
                breakpoint_decimals: 4,
            }
        );
    }

    #[test]
    fn test_settings_load_next_to_input_file() {
        let dir = tempdir().unwrap();
        fs::write(
            dir.path().join(SETTINGS_FILE_NAME),
            "overwrite = true\nbreakpoint_decimals = 2\n",
        )
        .unwrap();

        let settings = Settings::load(Some(&dir.path().join("scenarios.csv"))).unwrap();
        assert!(settings.overwrite);
        assert_eq!(settings.breakpoint_decimals, 2);
    }

    #[test]
    fn test_settings_load_invalid() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join(SETTINGS_FILE_NAME);
        fs::write(&file_path, "breakpoint_decimals = \"many\"\n").unwrap();
        assert!(Settings::load_from_path(&file_path).is_err());
    }
}
