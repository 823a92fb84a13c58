//! Constant efficiencies estimated from measured conversion data.
//!
//! These are used to parameterise the linear storage model, which serves as a reference for the
//! piecewise-linear formulations.
use crate::input::read_columns;
use anyhow::{Result, ensure};
use log::info;
use std::path::Path;

/// Constant efficiencies estimated from samples of a conversion curve
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConstantEfficiency {
    /// The slope of a least-squares line through the origin
    pub regression: f64,
    /// The largest efficiency of any sample
    pub max: f64,
    /// The mean efficiency of all samples
    pub mean: f64,
}

impl ConstantEfficiency {
    /// Estimate constant efficiencies from input power `x` and output power `y`.
    ///
    /// If `eta` is not given, the efficiency of each sample is `y / x`. Samples with zero input
    /// power have no defined efficiency and are skipped for the maximum and the mean.
    pub fn estimate(x: &[f64], y: &[f64], eta: Option<&[f64]>) -> Result<Self> {
        ensure!(!x.is_empty(), "At least one sample is required");
        ensure!(
            x.len() == y.len(),
            "Input and output power must have the same number of samples ({} != {})",
            x.len(),
            y.len()
        );
        if let Some(eta) = eta {
            ensure!(
                eta.len() == x.len(),
                "Efficiency must have the same number of samples as power ({} != {})",
                eta.len(),
                x.len()
            );
        }

        let sum_xx: f64 = x.iter().map(|x| x * x).sum();
        ensure!(
            sum_xx > 0.0,
            "Cannot fit an efficiency when all input powers are zero"
        );
        let sum_xy: f64 = x.iter().zip(y).map(|(x, y)| x * y).sum();

        let etas: Vec<f64> = match eta {
            Some(eta) => eta.to_vec(),
            None => x
                .iter()
                .zip(y)
                .filter(|(x, _)| **x != 0.0)
                .map(|(x, y)| y / x)
                .collect(),
        };
        ensure!(
            etas.iter().all(|eta| eta.is_finite()),
            "Efficiencies must be finite numbers"
        );

        Ok(Self {
            regression: sum_xy / sum_xx,
            max: etas.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            mean: etas.iter().sum::<f64>() / etas.len() as f64,
        })
    }

    /// Estimate constant efficiencies from the named columns of a CSV file
    pub fn from_csv(
        file_path: &Path,
        x_label: &str,
        y_label: &str,
        eta_label: Option<&str>,
    ) -> Result<Self> {
        let mut labels = vec![x_label, y_label];
        labels.extend(eta_label);
        let columns = read_columns(file_path, &labels)?;
        let eta = columns.get(2).map(Vec::as_slice);
        let efficiency = Self::estimate(&columns[0], &columns[1], eta)?;

        info!(
            "Constant efficiency for {y_label} over {x_label}: regression {:.4}, max {:.4}, mean {:.4}",
            efficiency.regression, efficiency.max, efficiency.mean
        );

        Ok(efficiency)
    }
}
