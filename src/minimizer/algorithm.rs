//! Implementation of the Levenberg-Marquardt algorithm.
//!
//! The iteration minimizes the sum of squared residuals of a [`Problem`]. It
//! runs until one of the convergence criteria of [`LmConfig`] is met or the
//! evaluation budget is exhausted; it never errors on non-convergence, the
//! outcome is reported through [`ConvergenceStatus`].

use faer::{Col, Mat};
use nalgebra::{DMatrix, DVector};
use ndarray::Array1;
use std::fmt;
use tracing::trace;

use crate::error::{AllDecaysError, Result};
use crate::problem::Problem;
use crate::utils::finite_difference::jacobian_from;
use crate::utils::matrix_convert::{nalgebra_vec_to_ndarray, ndarray_to_faer, ndarray_vec_to_faer};

use super::config::LmConfig;
use super::convergence::ConvergenceStatus;

/// Result of the Levenberg-Marquardt optimization.
#[derive(Debug, Clone)]
pub struct LmResult {
    /// Parameter values at the end of the iteration
    pub params: Array1<f64>,

    /// Sum of squared residuals at `params`
    pub cost: f64,

    /// Number of accepted steps
    pub iterations: usize,

    /// Number of residual evaluations, Jacobian columns included
    pub func_evals: usize,

    /// Why the iteration stopped
    pub status: ConvergenceStatus,
}

impl LmResult {
    pub fn success(&self) -> bool {
        self.status.is_converged()
    }
}

impl fmt::Display for LmResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Optimization Result:")?;
        writeln!(f, "  Success: {}", self.success())?;
        writeln!(f, "  Message: {}", self.status.description())?;
        writeln!(f, "  Cost: {:.6e}", self.cost)?;
        writeln!(f, "  Iterations: {}", self.iterations)?;
        writeln!(f, "  Function evaluations: {}", self.func_evals)?;
        writeln!(f, "  Parameters: {}", self.params)?;
        Ok(())
    }
}

/// The Levenberg-Marquardt optimizer.
#[derive(Debug, Clone, Default)]
pub struct LevenbergMarquardt {
    config: LmConfig,
}

impl LevenbergMarquardt {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: LmConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &LmConfig {
        &self.config
    }

    /// Minimize the sum of squared residuals of `problem` starting at `initial_params`.
    ///
    /// # Errors
    ///
    /// Only a dimension mismatch or a failing residual evaluation is an
    /// error. Running out of budget is reported in the result.
    pub fn minimize<P: Problem>(&self, problem: &P, initial_params: Array1<f64>) -> Result<LmResult> {
        let n_params = problem.parameter_count();
        if initial_params.len() != n_params {
            return Err(AllDecaysError::DimensionMismatch(format!(
                "Expected {} parameters, got {}",
                n_params,
                initial_params.len()
            )));
        }
        let cfg = &self.config;

        let mut params = initial_params;
        let mut lambda = cfg.initial_lambda;
        let mut residuals = problem.eval(&params)?;
        let mut cost = sum_of_squares(&residuals);
        let mut func_evals = 1;
        let mut iterations = 0;

        let status = 'outer: loop {
            if !cost.is_finite() {
                break ConvergenceStatus::NumericalError;
            }
            if func_evals + n_params > cfg.max_evaluations {
                break ConvergenceStatus::CallLimitReached;
            }

            let jac = jacobian_from(problem, &params, &residuals, None)?;
            func_evals += n_params;
            let j = ndarray_to_faer(&jac);
            let r = ndarray_vec_to_faer(&residuals);

            // g = J^T r
            let g: Col<f64> = j.as_ref().transpose() * r.as_ref();
            if g.norm_l2() < cfg.gtol {
                break ConvergenceStatus::GradientConvergence;
            }
            let jtj: Mat<f64> = j.as_ref().transpose() * j.as_ref();

            loop {
                if func_evals >= cfg.max_evaluations {
                    break 'outer ConvergenceStatus::CallLimitReached;
                }

                let Some(step) = self.calculate_step(&jtj, &g, lambda) else {
                    lambda = (lambda * cfg.lambda_up_factor).min(cfg.max_lambda);
                    if lambda >= cfg.max_lambda {
                        break 'outer ConvergenceStatus::DampingLimitReached;
                    }
                    continue;
                };

                let new_params = &params + &step;
                let new_residuals = problem.eval(&new_params)?;
                func_evals += 1;
                let new_cost = sum_of_squares(&new_residuals);

                if new_cost.is_finite() && new_cost < cost {
                    let param_change = norm(&step) / (norm(&params) + cfg.xtol);
                    let cost_change = (cost - new_cost) / cost.max(1.0);

                    params = new_params;
                    residuals = new_residuals;
                    cost = new_cost;
                    lambda = (lambda * cfg.lambda_down_factor).max(cfg.min_lambda);
                    iterations += 1;

                    if param_change < cfg.xtol {
                        break 'outer ConvergenceStatus::ParameterConvergence;
                    }
                    if cost_change < cfg.ftol {
                        break 'outer ConvergenceStatus::FunctionValueConvergence;
                    }
                    break;
                }

                // A step that leaves the cost unchanged within tolerance means we sit at the minimum.
                if new_cost.is_finite() && (new_cost - cost).abs() <= cfg.ftol * cost.max(1.0) {
                    break 'outer ConvergenceStatus::FunctionValueConvergence;
                }

                lambda = (lambda * cfg.lambda_up_factor).min(cfg.max_lambda);
                if lambda >= cfg.max_lambda {
                    break 'outer ConvergenceStatus::DampingLimitReached;
                }
            }
        };

        trace!(
            iterations,
            func_evals,
            cost,
            status = status.description(),
            "levenberg-marquardt finished"
        );

        Ok(LmResult {
            params,
            cost,
            iterations,
            func_evals,
            status,
        })
    }

    /// Solve `(J^T J + λ I) δ = -J^T r` for the step `δ`.
    ///
    /// Returns `None` when the damped normal matrix is not positive definite.
    fn calculate_step(&self, jtj: &Mat<f64>, g: &Col<f64>, lambda: f64) -> Option<Array1<f64>> {
        let n = jtj.nrows();
        let a = DMatrix::from_fn(n, n, |i, j| *jtj.get(i, j) + if i == j { lambda } else { 0.0 });
        let rhs = DVector::from_fn(n, |i, _| -*g.get(i));
        let step = a.cholesky()?.solve(&rhs);
        if step.iter().all(|s| s.is_finite()) {
            Some(nalgebra_vec_to_ndarray(&step))
        } else {
            None
        }
    }
}

fn sum_of_squares(residuals: &Array1<f64>) -> f64 {
    residuals.iter().map(|r| r.powi(2)).sum()
}

fn norm(x: &Array1<f64>) -> f64 {
    sum_of_squares(x).sqrt()
}
