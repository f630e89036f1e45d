//! Discrete resampling used by the channel inputs and the toy study.
//!
//! Both draws are built from sequences of conditional univariate draws from
//! `rand_distr`, consuming the caller's generator in a fixed order so that a
//! seeded generator reproduces the same counts.

use ndarray::Array1;
use rand::Rng;
use rand_distr::{Binomial, Distribution, Hypergeometric};

use crate::error::{DataError, Result};

/// Largest population a multivariate hypergeometric draw accepts.
pub const MAX_HYPERGEOMETRIC_POPULATION: u64 = 1_000_000_000;

/// Largest number of trials a multinomial draw accepts (exactly representable in `f64`).
pub const MAX_MULTINOMIAL_TRIALS: f64 = 9_007_199_254_740_992.0;

/// Draw `n_trials` events over categories with (unnormalized) weights `weights`.
///
/// Every category is drawn from a binomial conditioned on the events left
/// after the previous categories; the last non-empty category takes the rest.
pub fn multinomial<R: Rng + ?Sized>(
    rng: &mut R,
    n_trials: u64,
    weights: &Array1<f64>,
) -> Result<Array1<u64>> {
    if weights.iter().any(|w| !w.is_finite() || *w < 0.0) {
        return Err(DataError::InvalidHypothesis(format!(
            "multinomial weights must be finite and non-negative: {weights}"
        ))
        .into());
    }
    let mut counts = Array1::zeros(weights.len());
    let mut remaining_weight: f64 = weights.sum();
    let mut remaining_trials = n_trials;
    let last = weights.iter().rposition(|&w| w > 0.0);

    for (i, &w) in weights.iter().enumerate() {
        if remaining_trials == 0 || remaining_weight <= 0.0 {
            break;
        }
        let p = (w / remaining_weight).clamp(0.0, 1.0);
        let drawn = if p >= 1.0 || Some(i) == last {
            remaining_trials
        } else {
            Binomial::new(remaining_trials, p)
                .map_err(|e| DataError::ResamplingOverflow(format!("binomial({remaining_trials}, {p}): {e}")))?
                .sample(rng)
        };
        counts[i] = drawn;
        remaining_trials -= drawn;
        remaining_weight -= w;
    }
    Ok(counts)
}

/// Number of trials for a toy draw: the floor of the total expected count.
pub fn trials_from_expected(expected_total: f64) -> Result<u64> {
    if !expected_total.is_finite() || expected_total < 0.0 {
        return Err(DataError::InvalidHypothesis(format!(
            "expected total count must be finite and non-negative, got {expected_total}"
        ))
        .into());
    }
    let n = expected_total.floor();
    if n > MAX_MULTINOMIAL_TRIALS {
        return Err(DataError::ResamplingOverflow(format!(
            "{n} multinomial trials cannot be represented exactly"
        ))
        .into());
    }
    Ok(n as u64)
}

/// Draw `n_sample` items without replacement from a population split into `colors`.
pub fn multivariate_hypergeometric<R: Rng + ?Sized>(
    rng: &mut R,
    colors: &[u64],
    n_sample: u64,
) -> Result<Vec<u64>> {
    let total = colors
        .iter()
        .try_fold(0u64, |acc, &c| acc.checked_add(c))
        .ok_or_else(|| DataError::ResamplingOverflow("population size overflows u64".to_string()))?;
    if total > MAX_HYPERGEOMETRIC_POPULATION {
        return Err(DataError::ResamplingOverflow(format!(
            "population of {total} exceeds {MAX_HYPERGEOMETRIC_POPULATION}"
        ))
        .into());
    }
    if n_sample > total {
        return Err(DataError::ResamplingOverflow(format!(
            "cannot draw {n_sample} items from a population of {total}"
        ))
        .into());
    }

    let mut drawn = vec![0u64; colors.len()];
    let mut remaining_population = total;
    let mut remaining_sample = n_sample;
    for (i, &color) in colors.iter().enumerate() {
        if remaining_sample == 0 {
            break;
        }
        let k = if color == remaining_population {
            remaining_sample
        } else if color == 0 {
            0
        } else {
            Hypergeometric::new(remaining_population, color, remaining_sample)
                .map_err(|e| {
                    DataError::ResamplingOverflow(format!(
                        "hypergeometric({remaining_population}, {color}, {remaining_sample}): {e}"
                    ))
                })?
                .sample(rng)
        };
        drawn[i] = k;
        remaining_population -= color;
        remaining_sample -= k;
    }
    Ok(drawn)
}
