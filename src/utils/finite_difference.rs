//! Finite difference methods for numerical differentiation.
//!
//! This module provides functions for computing derivatives and Jacobians
//! using finite difference approximations.

use crate::error::{AllDecaysError, Result};
use crate::problem::Problem;
use ndarray::{Array1, Array2};

/// Default step size for finite-difference Jacobians.
const DEFAULT_EPSILON: f64 = 1e-8;

/// Default relative step size for second derivatives.
///
/// Second differences lose twice as many digits as first differences, so the
/// step has to be much larger than [`DEFAULT_EPSILON`].
pub const HESSIAN_EPSILON: f64 = 1e-4;

/// Step size for parameter `value`, scaled to its magnitude.
fn scaled_step(value: f64, eps: f64) -> f64 {
    if value.abs() > eps {
        value.abs() * eps
    } else {
        eps
    }
}

/// Compute the Jacobian matrix using forward finite differences.
///
/// The Jacobian is the matrix of partial derivatives of the residuals with
/// respect to the parameters: J[i,j] = ∂residual[i]/∂param[j].
///
/// # Arguments
///
/// * `problem` - The problem to evaluate
/// * `params` - The parameter values at which to evaluate the Jacobian
/// * `epsilon` - The step size for finite differences (optional)
///
/// # Returns
///
/// * `Result<Array2<f64>>` - The Jacobian matrix
pub fn jacobian(
    problem: &dyn Problem,
    params: &Array1<f64>,
    epsilon: Option<f64>,
) -> Result<Array2<f64>> {
    let residuals = problem.eval(params)?;
    jacobian_from(problem, params, &residuals, epsilon)
}

/// Forward-difference Jacobian reusing already evaluated `residuals` at `params`.
pub fn jacobian_from(
    problem: &dyn Problem,
    params: &Array1<f64>,
    residuals: &Array1<f64>,
    epsilon: Option<f64>,
) -> Result<Array2<f64>> {
    let eps = epsilon.unwrap_or(DEFAULT_EPSILON);
    let n_params = params.len();
    let n_residuals = problem.residual_count();

    if residuals.len() != n_residuals {
        return Err(AllDecaysError::DimensionMismatch(format!(
            "Expected {} residuals, got {}",
            n_residuals,
            residuals.len()
        )));
    }

    let mut jac = Array2::zeros((n_residuals, n_params));

    for j in 0..n_params {
        let mut params_perturbed = params.clone();
        let eps_j = scaled_step(params[j], eps);
        params_perturbed[j] += eps_j;

        let residuals_perturbed = problem.eval(&params_perturbed)?;

        for i in 0..n_residuals {
            jac[[i, j]] = (residuals_perturbed[i] - residuals[i]) / eps_j;
        }
    }

    Ok(jac)
}

/// Compute the Hessian matrix using central finite differences.
///
/// The Hessian is the matrix of second partial derivatives of the function with
/// respect to the parameters: H[i,j] = ∂²f/∂param[i]∂param[j].
///
/// Returns the Hessian together with the number of function evaluations spent.
pub fn hessian<F>(f: F, params: &Array1<f64>, epsilon: Option<f64>) -> Result<(Array2<f64>, usize)>
where
    F: Fn(&Array1<f64>) -> Result<f64>,
{
    let eps = epsilon.unwrap_or(HESSIAN_EPSILON);
    let n_params = params.len();
    let mut hess = Array2::zeros((n_params, n_params));

    let f0 = f(params)?;
    let mut n_evals = 1;

    for i in 0..n_params {
        let eps_i = scaled_step(params[i], eps);
        for j in 0..=i {
            let eps_j = scaled_step(params[j], eps);

            if i == j {
                let mut params_p = params.clone();
                let mut params_m = params.clone();
                params_p[i] += eps_i;
                params_m[i] -= eps_i;

                let f_p = f(&params_p)?;
                let f_m = f(&params_m)?;
                n_evals += 2;

                hess[[i, i]] = (f_p - 2.0 * f0 + f_m) / (eps_i * eps_i);
            } else {
                let mut params_pp = params.clone();
                let mut params_pm = params.clone();
                let mut params_mp = params.clone();
                let mut params_mm = params.clone();

                params_pp[i] += eps_i;
                params_pp[j] += eps_j;
                params_pm[i] += eps_i;
                params_pm[j] -= eps_j;
                params_mp[i] -= eps_i;
                params_mp[j] += eps_j;
                params_mm[i] -= eps_i;
                params_mm[j] -= eps_j;

                let f_pp = f(&params_pp)?;
                let f_pm = f(&params_pm)?;
                let f_mp = f(&params_mp)?;
                let f_mm = f(&params_mm)?;
                n_evals += 4;

                hess[[i, j]] = (f_pp - f_pm - f_mp + f_mm) / (4.0 * eps_i * eps_j);
                hess[[j, i]] = hess[[i, j]];
            }
        }
    }

    Ok((hess, n_evals))
}
