//! # Covariance Matrix Calculations
//!
//! Parameter covariance from the Hessian of the objective at its minimum,
//! scaled by the objective's error definition: `C = 2 · errordef · H⁻¹`.
//! The inverse is taken through a symmetric eigen-decomposition, which also
//! tells whether the Hessian is positive definite and how well conditioned
//! it is.

use ndarray::{Array1, Array2};

use crate::error::{AllDecaysError, Result};
use crate::utils::matrix_convert::{nalgebra_to_ndarray, ndarray_to_nalgebra};

/// Relative size below which an eigenvalue is raised to keep the inverse finite.
const EIGENVALUE_FLOOR: f64 = 1e-12;

/// A covariance matrix together with the quality of the Hessian it came from.
#[derive(Debug, Clone)]
pub struct CovarianceEstimate {
    pub covariance: Array2<f64>,

    /// All Hessian eigenvalues were strictly positive.
    pub positive_definite: bool,

    /// Smallest over largest Hessian eigenvalue, zero if not positive definite.
    pub rcond: f64,
}

/// Covariance from a Hessian of an objective with error definition `errordef`.
///
/// A Hessian that is not positive definite still yields a covariance: its
/// eigenvalues are replaced by their magnitudes, floored relative to the
/// largest one, and the estimate is flagged.
pub fn covariance_from_hessian(hessian: &Array2<f64>, errordef: f64) -> Result<CovarianceEstimate> {
    let n = hessian.nrows();
    if hessian.ncols() != n {
        return Err(AllDecaysError::DimensionMismatch(format!(
            "Hessian must be square, got {}x{}",
            n,
            hessian.ncols()
        )));
    }
    if n == 0 {
        return Ok(CovarianceEstimate {
            covariance: Array2::zeros((0, 0)),
            positive_definite: true,
            rcond: 1.0,
        });
    }
    if hessian.iter().any(|h| !h.is_finite()) {
        return Err(AllDecaysError::LinearAlgebraError(
            "Hessian contains non-finite entries".to_string(),
        ));
    }

    let h = ndarray_to_nalgebra(hessian);
    let symmetric = (&h + h.transpose()) * 0.5;
    let eigen = symmetric.symmetric_eigen();

    let max_abs = eigen.eigenvalues.iter().fold(0.0f64, |acc, v| acc.max(v.abs()));
    let min = eigen.eigenvalues.iter().copied().fold(f64::INFINITY, f64::min);
    let positive_definite = min > 0.0;
    let rcond = if positive_definite && max_abs > 0.0 {
        min / max_abs
    } else {
        0.0
    };

    let floor = (max_abs * EIGENVALUE_FLOOR).max(f64::MIN_POSITIVE);
    let inverse_eigenvalues = eigen.eigenvalues.map(|v| 1.0 / v.abs().max(floor));
    let v = &eigen.eigenvectors;
    let inverse = v * nalgebra::DMatrix::from_diagonal(&inverse_eigenvalues) * v.transpose();

    Ok(CovarianceEstimate {
        covariance: nalgebra_to_ndarray(&inverse) * (2.0 * errordef),
        positive_definite,
        rcond,
    })
}

/// Calculate the correlation matrix from a covariance matrix.
///
/// Entries involving a parameter with zero variance are set to zero.
pub fn calculate_correlation(covar: &Array2<f64>) -> Array2<f64> {
    let n = covar.nrows();
    Array2::from_shape_fn((n, n), |(i, j)| {
        if i == j {
            1.0
        } else {
            let denom = (covar[[i, i]] * covar[[j, j]]).sqrt();
            if denom > 0.0 {
                covar[[i, j]] / denom
            } else {
                0.0
            }
        }
    })
}

/// Square roots of the diagonal; negative variances give zero, NaN stays NaN.
pub fn standard_errors_from_covariance(covar: &Array2<f64>) -> Array1<f64> {
    covar.diag().mapv(|v| if v < 0.0 { 0.0 } else { v.sqrt() })
}
