//! Problem definition trait.
//!
//! This module defines the `Problem` trait, the interface between a cost
//! function and the minimizer. A problem exposes a residual vector, whose
//! sum of squares the minimizer drives down, and an objective value with its
//! error definition, from which the covariance is derived.

use crate::error::Result;
use ndarray::{Array1, Array2};

/// Error definition of a χ² (least-squares) objective.
pub const LEAST_SQUARES: f64 = 1.0;

/// Error definition of a negative log-likelihood objective.
pub const LIKELIHOOD: f64 = 0.5;

/// A trait representing an objective expressed through residuals.
///
/// The objective returned by [`Problem::eval_cost`] must be minimized at the
/// same point as the sum of squared residuals. For least-squares problems
/// the two coincide; likelihood problems return deviance residuals.
pub trait Problem {
    /// Evaluate the residuals at the given parameters.
    ///
    /// # Arguments
    ///
    /// * `params` - The parameter values at which to evaluate the residuals
    ///
    /// # Returns
    ///
    /// * A vector of residuals, or an error if the evaluation fails
    fn eval(&self, params: &Array1<f64>) -> Result<Array1<f64>>;

    /// Get the number of parameters in the problem.
    fn parameter_count(&self) -> usize;

    /// Get the number of residuals in the problem.
    fn residual_count(&self) -> usize;

    /// Evaluate the Jacobian matrix at the given parameters.
    ///
    /// The default implementation uses forward finite differences.
    fn jacobian(&self, params: &Array1<f64>) -> Result<Array2<f64>>
    where
        Self: Sized,
    {
        crate::utils::finite_difference::jacobian(self, params, None)
    }

    /// Evaluate the objective at the given parameters.
    ///
    /// Defaults to the sum of squared residuals.
    fn eval_cost(&self, params: &Array1<f64>) -> Result<f64> {
        let residuals = self.eval(params)?;
        Ok(residuals.iter().map(|r| r.powi(2)).sum())
    }

    /// Objective change that corresponds to one standard deviation.
    ///
    /// [`LEAST_SQUARES`] for χ² objectives, [`LIKELIHOOD`] for negative
    /// log-likelihoods.
    fn errordef(&self) -> f64 {
        LEAST_SQUARES
    }
}
