//! Parameter summaries of a fit or of its toy study.

use std::fmt;
use std::str::FromStr;

use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};

use crate::error::{FitError, Result};
use crate::minimizer::{calculate_correlation, standard_errors_from_covariance};

use super::fit::Fit;

/// Which parametrization a summary is expressed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamSpace {
    /// The minimizer's parameters.
    Internal,
    /// The branching ratios.
    Physics,
}

impl fmt::Display for ParamSpace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamSpace::Internal => f.write_str("internal"),
            ParamSpace::Physics => f.write_str("physics"),
        }
    }
}

impl FromStr for ParamSpace {
    type Err = FitError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "internal" => Ok(ParamSpace::Internal),
            "physics" => Ok(ParamSpace::Physics),
            _ => Err(FitError::Configuration(format!(
                "parameter space must be one of [\"internal\", \"physics\"], got {s:?}"
            ))),
        }
    }
}

/// Names, values, errors and covariance of the parameters in one space.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitParameters {
    pub names: Vec<String>,
    pub values: Array1<f64>,
    pub errors: Array1<f64>,
    pub covariance: Array2<f64>,
    pub starting_values: Array1<f64>,
    pub param_space: ParamSpace,
    pub is_from_toys: bool,
}

impl FitParameters {
    /// The fit's own values and HESSE covariance. The covariance is NaN before HESSE ran.
    pub fn from_fit(fit: &Fit<'_>, param_space: ParamSpace) -> Result<Self> {
        let starting_values = starting_values(fit, param_space)?;
        let (names, values, covariance) = match param_space {
            ParamSpace::Internal => {
                let m = fit.minimizer();
                (m.parameters().to_vec(), m.values().clone(), m.covariance().cloned())
            }
            ParamSpace::Physics => (fit.parameters().to_vec(), fit.values(), fit.covariance()),
        };
        let n = names.len();
        let covariance = covariance.unwrap_or_else(|| Array2::from_elem((n, n), f64::NAN));
        Ok(Self {
            errors: standard_errors_from_covariance(&covariance),
            names,
            values,
            covariance,
            starting_values,
            param_space,
            is_from_toys: false,
        })
    }

    /// Mean and sample covariance of the toy values.
    pub fn from_toys(fit: &Fit<'_>, param_space: ParamSpace) -> Result<Self> {
        let toys = fit.toys().ok_or(FitError::NoToys)?;
        let (names, samples) = match param_space {
            ParamSpace::Internal => (fit.minimizer().parameters().to_vec(), toys.internal()),
            ParamSpace::Physics => (fit.parameters().to_vec(), toys.physics()),
        };
        let (values, covariance) = mean_and_covariance(samples);
        Ok(Self {
            errors: standard_errors_from_covariance(&covariance),
            names,
            values,
            covariance,
            starting_values: starting_values(fit, param_space)?,
            param_space,
            is_from_toys: true,
        })
    }

    /// Pearson correlation matrix.
    pub fn correlation(&self) -> Array2<f64> {
        calculate_correlation(&self.covariance)
    }
}

fn starting_values(fit: &Fit<'_>, param_space: ParamSpace) -> Result<Array1<f64>> {
    let start = fit.data_set().fit_start_brs();
    match param_space {
        ParamSpace::Internal => fit.plugin().transform_to_internal(start),
        ParamSpace::Physics => Ok(start.clone()),
    }
}

/// Column means and the unbiased (`N - 1`) sample covariance of `samples` (rows are draws).
///
/// Fewer than two draws give NaN.
pub fn mean_and_covariance(samples: &Array2<f64>) -> (Array1<f64>, Array2<f64>) {
    let (n, p) = samples.dim();
    let mean = samples
        .mean_axis(Axis(0))
        .unwrap_or_else(|| Array1::from_elem(p, f64::NAN));
    if n < 2 {
        return (mean, Array2::from_elem((p, p), f64::NAN));
    }
    let centered = samples - &mean;
    let covariance = centered.t().dot(&centered) / (n - 1) as f64;
    (mean, covariance)
}
