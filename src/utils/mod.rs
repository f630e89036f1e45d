//! Utility functions and helpers for the alldecays-rs library.

pub mod finite_difference;
pub mod matrix_convert;
pub mod sampling;
pub mod stats;

// Re-export commonly used utilities
pub use matrix_convert::{
    nalgebra_to_ndarray, nalgebra_vec_to_ndarray, ndarray_to_faer, ndarray_to_nalgebra,
    ndarray_vec_to_faer,
};

pub use finite_difference::{hessian, jacobian};
pub use sampling::{multinomial, multivariate_hypergeometric};
