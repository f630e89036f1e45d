//! Cost function plugins.
//!
//! A plugin binds one [`ForwardModel`] (one data set and one realization of
//! the observed counts) to an objective and owns the [`Minimizer`] that
//! works on it. The physics view (`parameters`, `values`, `errors`,
//! `covariance`) is expressed through the plugin, so a plugin may fit in a
//! different internal parametrization than the branching ratios.
//!
//! The shipped plugins are selected through [`FitMode`]. Other plugins
//! are added with [`FitMode::Custom`] and a [`PluginFactory`].

mod least_squares;
mod poisson;

pub use least_squares::{LeastSquares, LeastSquaresObjective, Noise};
pub use poisson::{Poisson, PoissonObjective};

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use ndarray::{Array1, Array2};

use crate::error::{FitError, Result};
use crate::minimizer::{standard_errors_from_covariance, Bounds, Minimizer};
use crate::model::ForwardModel;

/// A cost function with its minimizer and physics parameter view.
pub trait FitPlugin: fmt::Debug + Send + Sync {
    /// Registry name of the plugin.
    fn name(&self) -> &str;

    /// The model and observed counts this plugin is bound to.
    fn model(&self) -> &ForwardModel;

    fn minimizer(&self) -> &Minimizer;

    fn minimizer_mut(&mut self) -> &mut Minimizer;

    /// Limits applied by `set_has_limits(true)`, one per internal parameter.
    fn default_limits(&self) -> Vec<Bounds>;

    /// Whether the physics values are guaranteed to sum to one.
    fn enforces_brs_sum_to_1(&self) -> bool;

    /// Physics parameter names.
    fn parameters(&self) -> &[String] {
        self.model().decay_names()
    }

    /// Map branching ratios to the internal parameters of the minimizer.
    fn transform_to_internal(&self, values: &Array1<f64>) -> Result<Array1<f64>> {
        Ok(values.clone())
    }

    /// Physics values at the current minimizer state.
    fn values(&self) -> Array1<f64> {
        self.minimizer().values().clone()
    }

    /// Physics covariance, `None` before HESSE ran.
    fn covariance(&self) -> Option<Array2<f64>> {
        self.minimizer().covariance().cloned()
    }

    /// Square roots of the physics covariance diagonal, NaN before HESSE ran.
    fn errors(&self) -> Array1<f64> {
        match self.covariance() {
            Some(cov) => standard_errors_from_covariance(&cov),
            None => Array1::from_elem(self.parameters().len(), f64::NAN),
        }
    }

    /// True if any minimizer parameter is limited.
    fn has_limits(&self) -> bool {
        self.minimizer()
            .limits()
            .iter()
            .any(|b| b.has_lower_bound() || b.has_upper_bound())
    }

    /// Switch between the default limits and no limits.
    fn set_has_limits(&mut self, has_limits: bool) -> Result<()> {
        if has_limits == self.has_limits() {
            return Ok(());
        }
        let limits = if has_limits {
            self.default_limits()
        } else {
            vec![Bounds::unbounded(); self.minimizer().parameters().len()]
        };
        self.minimizer_mut().set_limits(limits)
    }

    /// Observed counts per channel.
    fn counts(&self) -> Vec<(String, Array1<f64>)> {
        self.model().channel_counts()
    }
}

/// Creates plugins of one kind, for the fit and for every toy.
pub trait PluginFactory: fmt::Debug + Send + Sync {
    fn name(&self) -> &str;

    /// Bind a new plugin to `model`.
    ///
    /// [`Fit`](crate::fitting::Fit) moves the minimizer to
    /// `transform_to_internal(start_brs)` afterwards, so the factory only has
    /// to produce a start of the right length.
    fn create(&self, model: ForwardModel, start_brs: &Array1<f64>) -> Result<Box<dyn FitPlugin>>;
}

/// The cost function of a fit.
///
/// # Examples
///
/// ```
/// use alldecays_rs::fitting::FitMode;
///
/// let mode: FitMode = "Poisson".parse().unwrap();
/// assert_eq!(mode.name(), "Poisson");
/// assert_eq!(FitMode::default().name(), "GaussianLeastSquares");
/// assert!("Gaussian".parse::<FitMode>().is_err());
/// ```
#[derive(Debug, Clone, Default)]
pub enum FitMode {
    /// χ² with the observed counts as variance.
    #[default]
    GaussianLeastSquares,
    /// χ² with binomial box-fraction variances.
    BinomialLeastSquares,
    /// Poisson negative log-likelihood.
    Poisson,
    /// A user plugin.
    Custom(Arc<dyn PluginFactory>),
}

impl FitMode {
    /// Names of the shipped plugins.
    pub const AVAILABLE: [&'static str; 3] = ["BinomialLeastSquares", "GaussianLeastSquares", "Poisson"];

    pub fn name(&self) -> &str {
        match self {
            FitMode::GaussianLeastSquares => "GaussianLeastSquares",
            FitMode::BinomialLeastSquares => "BinomialLeastSquares",
            FitMode::Poisson => "Poisson",
            FitMode::Custom(factory) => factory.name(),
        }
    }

    /// Create the plugin for `model`.
    pub fn create(&self, model: ForwardModel, start_brs: &Array1<f64>) -> Result<Box<dyn FitPlugin>> {
        Ok(match self {
            FitMode::GaussianLeastSquares => Box::new(LeastSquares::new(model, start_brs, Noise::Gaussian)?),
            FitMode::BinomialLeastSquares => Box::new(LeastSquares::new(model, start_brs, Noise::Binomial)?),
            FitMode::Poisson => Box::new(Poisson::new(model, start_brs)?),
            FitMode::Custom(factory) => factory.create(model, start_brs)?,
        })
    }
}

impl fmt::Display for FitMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for FitMode {
    type Err = FitError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "GaussianLeastSquares" => Ok(FitMode::GaussianLeastSquares),
            "BinomialLeastSquares" => Ok(FitMode::BinomialLeastSquares),
            "Poisson" => Ok(FitMode::Poisson),
            _ => Err(FitError::UnknownFitMode {
                name: s.to_string(),
                available: Self::AVAILABLE.to_vec(),
            }),
        }
    }
}

impl From<Arc<dyn PluginFactory>> for FitMode {
    fn from(factory: Arc<dyn PluginFactory>) -> Self {
        FitMode::Custom(factory)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry() {
        for name in FitMode::AVAILABLE {
            assert_eq!(name.parse::<FitMode>().unwrap().name(), name);
        }
        match "Minuit".parse::<FitMode>() {
            Err(FitError::UnknownFitMode { name, available }) => {
                assert_eq!(name, "Minuit");
                assert_eq!(available.len(), 3);
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
