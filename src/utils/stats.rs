//! Binomial proportion estimates with Beta posteriors.

use ndarray::Array1;
use statrs::distribution::{Beta, ContinuousCDF};

use crate::error::{AllDecaysError, Result};

/// Confidence level of a one-sigma interval.
pub const ONE_SIGMA_CL: f64 = 0.683;

/// Posterior mean and asymmetric interval half-widths of a binomial proportion.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProportionEstimate {
    pub mean: f64,
    pub err_lower: f64,
    pub err_upper: f64,
}

impl ProportionEstimate {
    /// Average of the two half-widths.
    pub fn symmetric_error(&self) -> f64 {
        (self.err_lower + self.err_upper) / 2.0
    }
}

/// Bayesian estimate of a proportion `pass / total` with a Beta(a, b) prior.
///
/// Beta(1, 1) is the uniform prior, Beta(0.5, 0.5) the Jeffreys prior. The
/// posterior mean `(pass + a) / (total + a + b)` differs from the mode
/// `pass / total`. The interval is central at confidence level `cl`.
pub fn binomial_proportion(total: f64, pass: f64, cl: f64, a: f64, b: f64) -> Result<ProportionEstimate> {
    let mean = (pass + a) / (total + a + b);
    let posterior = Beta::new(pass + a, total - pass + b).map_err(|e| {
        AllDecaysError::Statistics(format!("Beta({}, {}): {e}", pass + a, total - pass + b))
    })?;
    let p_lower = posterior.inverse_cdf((1.0 - cl) / 2.0);
    let p_upper = posterior.inverse_cdf(1.0 - (1.0 - cl) / 2.0);
    Ok(ProportionEstimate {
        mean,
        err_lower: mean - p_lower,
        err_upper: p_upper - mean,
    })
}

/// One-sigma binomial error of every box fraction `counts[i] / counts.sum()`.
pub fn binomial_one_sigma(counts: &Array1<f64>) -> Result<Array1<f64>> {
    let total = counts.sum();
    counts
        .iter()
        .map(|&k| binomial_proportion(total, k, ONE_SIGMA_CL, 1.0, 1.0).map(|e| e.symmetric_error()))
        .collect::<Result<Vec<f64>>>()
        .map(Array1::from_vec)
}
