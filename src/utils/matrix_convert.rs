//! Matrix conversion utilities.
//!
//! The fit model and the toy ensembles are stored as ndarray arrays, the
//! minimizer's normal equations are formed with faer, and decompositions
//! (Cholesky, symmetric eigen) are done with nalgebra. These helpers move
//! `f64` data between the three representations.
//!
//! ndarray is row-major by default, faer is column-major; all conversions
//! copy element by element so the memory layout never matters.

use faer::{Col, Mat};
use nalgebra::{DMatrix, DVector};
use ndarray::{Array1, Array2};

// === ndarray <-> faer conversions ===

/// Convert an ndarray Array2 to a faer Mat.
pub fn ndarray_to_faer(arr: &Array2<f64>) -> Mat<f64> {
    Mat::from_fn(arr.nrows(), arr.ncols(), |i, j| arr[[i, j]])
}

/// Convert an ndarray Array1 to a faer Col (column vector).
pub fn ndarray_vec_to_faer(arr: &Array1<f64>) -> Col<f64> {
    Col::from_fn(arr.len(), |i| arr[i])
}

// === ndarray <-> nalgebra conversions ===

/// Convert an ndarray Array2 to a nalgebra DMatrix.
pub fn ndarray_to_nalgebra(arr: &Array2<f64>) -> DMatrix<f64> {
    DMatrix::from_fn(arr.nrows(), arr.ncols(), |i, j| arr[[i, j]])
}

/// Convert a nalgebra DMatrix to an ndarray Array2.
pub fn nalgebra_to_ndarray(mat: &DMatrix<f64>) -> Array2<f64> {
    Array2::from_shape_fn((mat.nrows(), mat.ncols()), |(i, j)| mat[(i, j)])
}

/// Convert a nalgebra DVector to an ndarray Array1.
pub fn nalgebra_vec_to_ndarray(vec: &DVector<f64>) -> Array1<f64> {
    Array1::from_shape_fn(vec.nrows(), |i| vec[i])
}
