//! Common routines for handling input data.
use anyhow::{Context, Result, ensure};
use serde::de::{Deserialize, DeserializeOwned, Deserializer};
use std::fs;
use std::path::Path;

pub mod scenario;

/// The field delimiter used by all CSV files
pub const CSV_DELIMITER: u8 = b';';

/// Format an error message to include the file path. To be used with `anyhow::Context`.
pub fn input_err_msg<P: AsRef<Path>>(file_path: P) -> String {
    format!("Error reading {}", file_path.as_ref().to_string_lossy())
}

/// Read a series of type `T`s from a `;`-separated CSV file.
///
/// # Arguments
///
/// * `file_path` - Path to the CSV file
pub fn read_csv_semicolon<T: DeserializeOwned>(file_path: &Path) -> Result<Vec<T>> {
    let vec = read_csv_optional(file_path)?;
    ensure!(
        !vec.is_empty(),
        "{}: CSV file cannot be empty",
        input_err_msg(file_path)
    );

    Ok(vec)
}

/// Read a series of type `T`s from a `;`-separated CSV file, which may contain no rows
pub fn read_csv_optional<T: DeserializeOwned>(file_path: &Path) -> Result<Vec<T>> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(CSV_DELIMITER)
        .trim(csv::Trim::All)
        .from_path(file_path)
        .with_context(|| input_err_msg(file_path))?;

    let vec = reader
        .deserialize()
        .collect::<Result<Vec<T>, _>>()
        .with_context(|| input_err_msg(file_path))?;

    Ok(vec)
}

/// Read the named numeric columns from a `;`-separated CSV file.
///
/// # Returns
///
/// One vector of values per requested column, in the order requested.
pub fn read_columns(file_path: &Path, names: &[&str]) -> Result<Vec<Vec<f64>>> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(CSV_DELIMITER)
        .trim(csv::Trim::All)
        .from_path(file_path)
        .with_context(|| input_err_msg(file_path))?;

    let headers = reader
        .headers()
        .with_context(|| input_err_msg(file_path))?
        .clone();
    let indices = names
        .iter()
        .map(|name| {
            headers
                .iter()
                .position(|header| header == *name)
                .with_context(|| format!("{}: Missing column '{name}'", input_err_msg(file_path)))
        })
        .collect::<Result<Vec<_>>>()?;

    let mut columns = vec![Vec::new(); names.len()];
    for (row, record) in reader.records().enumerate() {
        let record = record.with_context(|| input_err_msg(file_path))?;
        for (column, &index) in columns.iter_mut().zip(&indices) {
            let field = record.get(index).unwrap_or_default();
            let value = field.parse().with_context(|| {
                format!(
                    "{}: Invalid number '{field}' in row {}",
                    input_err_msg(file_path),
                    row + 1
                )
            })?;
            column.push(value);
        }
    }
    ensure!(
        columns.first().is_none_or(|column| !column.is_empty()),
        "{}: CSV file cannot be empty",
        input_err_msg(file_path)
    );

    Ok(columns)
}

/// Parse a TOML file at the specified path.
///
/// # Returns
///
/// * The deserialised TOML data or an error if the file could not be read or parsed.
pub fn read_toml<T: DeserializeOwned>(file_path: &Path) -> Result<T> {
    let toml_str = fs::read_to_string(file_path).with_context(|| input_err_msg(file_path))?;
    let toml_data = toml::from_str(&toml_str).with_context(|| input_err_msg(file_path))?;

    Ok(toml_data)
}

/// Parse a list of numbers separated by commas, e.g. `"0, 0.5, 1"`
pub fn parse_float_list(value: &str) -> Result<Vec<f64>> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<f64>()
                .with_context(|| format!("Invalid number '{s}' in list '{value}'"))
        })
        .collect()
}

/// Read a boolean flag, which may be given as `0`/`1` or `true`/`false`
pub fn deserialise_flag<'de, D>(deserialiser: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    let value: String = Deserialize::deserialize(deserialiser)?;
    match value.trim().to_lowercase().as_str() {
        "1" | "true" => Ok(true),
        "0" | "false" => Ok(false),
        other => Err(serde::de::Error::custom(format!(
            "Invalid flag '{other}': expected 0, 1, true or false"
        ))),
    }
}

/// Read an f64, checking that it is between 0 and 1
pub fn deserialise_proportion<'de, D>(deserialiser: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Deserialize::deserialize(deserialiser)?;
    if !(0.0..=1.0).contains(&value) {
        Err(serde::de::Error::custom("Value is not between 0 and 1"))?;
    }

    Ok(value)
}

/// Read an optional f64, checking that it is between 0 and 1 if present
pub fn deserialise_optional_proportion<'de, D>(deserialiser: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value: Option<f64> = Deserialize::deserialize(deserialiser)?;
    if value.is_some_and(|value| !(0.0..=1.0).contains(&value)) {
        Err(serde::de::Error::custom("Value is not between 0 and 1"))?;
    }

    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use std::io::Write;
    use tempfile::tempdir;

    #[derive(Debug, PartialEq, Deserialize)]
    struct Record {
        id: String,
        value: u32,
        #[serde(deserialize_with = "deserialise_flag")]
        active: bool,
    }

    #[derive(Debug, PartialEq, Deserialize)]
    struct ProportionRecord {
        #[serde(deserialize_with = "deserialise_proportion")]
        value: f64,
        #[serde(default, deserialize_with = "deserialise_optional_proportion")]
        other: Option<f64>,
    }

    fn write_file(dir: &Path, name: &str, contents: &str) -> std::path::PathBuf {
        let file_path = dir.join(name);
        let mut file = fs::File::create(&file_path).unwrap();
        write!(file, "{contents}").unwrap();
        file_path
    }

    #[test]
    fn test_read_csv_semicolon() {
        let dir = tempdir().unwrap();
        let file_path = write_file(
            dir.path(),
            "test.csv",
            "id;value;active\nhello; 1;1\nworld;2;false\n",
        );
        let records: Vec<Record> = read_csv_semicolon(&file_path).unwrap();
        assert_eq!(
            records,
            &[
                Record {
                    id: "hello".to_string(),
                    value: 1,
                    active: true,
                },
                Record {
                    id: "world".to_string(),
                    value: 2,
                    active: false,
                }
            ]
        );

        // Empty file
        let file_path = write_file(dir.path(), "empty.csv", "id;value;active\n");
        assert!(read_csv_semicolon::<Record>(&file_path).is_err());
        assert!(
            read_csv_optional::<Record>(&file_path)
                .unwrap()
                .is_empty()
        );

        // Bad flag
        let file_path = write_file(dir.path(), "bad.csv", "id;value;active\nhello;1;yes\n");
        assert!(read_csv_semicolon::<Record>(&file_path).is_err());

        // Missing file
        assert!(read_csv_semicolon::<Record>(&dir.path().join("missing.csv")).is_err());
    }

    #[test]
    fn test_read_columns() {
        let dir = tempdir().unwrap();
        let file_path = write_file(
            dir.path(),
            "data.csv",
            "index;P_in_rel;eta_in\n0;0.1;0.5\n1; 0.5 ;0.8\n",
        );
        let columns = read_columns(&file_path, &["eta_in", "P_in_rel"]).unwrap();
        assert_eq!(columns, [vec![0.5, 0.8], vec![0.1, 0.5]]);

        assert!(read_columns(&file_path, &["missing"]).is_err());

        let file_path = write_file(dir.path(), "bad.csv", "x;y\n0.1;a\n");
        assert!(read_columns(&file_path, &["x", "y"]).is_err());

        let file_path = write_file(dir.path(), "empty.csv", "x;y\n");
        assert!(read_columns(&file_path, &["x", "y"]).is_err());
    }

    #[test]
    fn test_read_toml() {
        #[derive(Debug, PartialEq, Deserialize)]
        struct Config {
            value: u32,
        }

        let dir = tempdir().unwrap();
        let file_path = write_file(dir.path(), "test.toml", "value = 1\n");
        assert_eq!(
            read_toml::<Config>(&file_path).unwrap(),
            Config { value: 1 }
        );

        let file_path = write_file(dir.path(), "bad.toml", "bad toml syntax");
        assert!(read_toml::<Config>(&file_path).is_err());
    }

    #[test]
    fn test_parse_float_list() {
        assert_eq!(parse_float_list("0, 0.5,1").unwrap(), [0.0, 0.5, 1.0]);
        assert_eq!(parse_float_list(" 2.5 ").unwrap(), [2.5]);
        assert!(parse_float_list("").unwrap().is_empty());
        assert!(parse_float_list("0, a, 1").is_err());
    }

    #[test]
    fn test_deserialise_proportion() {
        let dir = tempdir().unwrap();
        let file_path = write_file(dir.path(), "ok.csv", "value;other\n0.5;\n");
        let records: Vec<ProportionRecord> = read_csv_semicolon(&file_path).unwrap();
        assert_eq!(
            records,
            [ProportionRecord {
                value: 0.5,
                other: None
            }]
        );

        let file_path = write_file(dir.path(), "bad.csv", "value;other\n1.5;\n");
        assert!(read_csv_semicolon::<ProportionRecord>(&file_path).is_err());

        let file_path = write_file(dir.path(), "bad_other.csv", "value;other\n0.5;-0.1\n");
        assert!(read_csv_semicolon::<ProportionRecord>(&file_path).is_err());
    }
}
