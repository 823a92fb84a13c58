//! Fixtures for tests
use crate::breakpoints::BreakpointSet;
use crate::storage::{StorageDevice, StorageModel, StorageParameters};
use crate::timesteps::Timesteps;
use rstest::fixture;

/// Assert that an error with the given message occurs
macro_rules! assert_error {
    ($result:expr, $msg:expr) => {
        assert_eq!(
            $result.unwrap_err().chain().next().unwrap().to_string(),
            $msg
        );
    };
}
pub(crate) use assert_error;

/// Four hourly timesteps
#[fixture]
pub fn timesteps() -> Timesteps {
    Timesteps::from_strings("2020-01-01 00:00:00", "1h", 4).unwrap()
}

/// A 10 MW / 40 MWh device, half charged, with two-segment conversion curves
#[fixture]
pub fn storage_parameters() -> StorageParameters {
    StorageParameters {
        p_max_in: 10.0,
        p_max_out: 10.0,
        p_min_in: 0.1,
        p_min_out: 0.1,
        soc_min: 0.0,
        soc_max: 40.0,
        soc_ini: 0.5,
        eta_soc: 1.0,
        eta_in: None,
        eta_out: None,
        charge_breakpoints: Some(BreakpointSet::new(&[0.0, 0.5, 1.0], &[0.0, 0.45, 0.85]).unwrap()),
        discharge_breakpoints: Some(
            BreakpointSet::new(&[0.0, 0.5, 1.0], &[0.0, 0.46, 0.88]).unwrap(),
        ),
    }
}

#[fixture]
pub fn storage_device(storage_parameters: StorageParameters) -> StorageDevice {
    StorageDevice::new(&storage_parameters, StorageModel::BigM).unwrap()
}
