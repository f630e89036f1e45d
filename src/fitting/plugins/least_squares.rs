//! χ² fits with Gaussian or binomial box-count variances.

use std::sync::Arc;

use ndarray::{s, Array1};

use crate::error::Result;
use crate::minimizer::{Bounds, Minimizer};
use crate::model::ForwardModel;
use crate::problem::{Problem, LEAST_SQUARES};
use crate::utils::stats::binomial_one_sigma;

use super::FitPlugin;

/// Variance model of the observed box counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Noise {
    /// `var = observed`.
    ///
    /// A box with zero observed counts has zero variance, so any prediction
    /// other than exactly zero makes the objective infinite. Such a fit ends
    /// with `valid == false` and NaN errors.
    Gaussian,
    /// `var = N² σ²` with `N` the channel total and `σ` the averaged 68.3 %
    /// interval half-width of the box fraction under a uniform Beta prior.
    ///
    /// Removes the zero-variance problem of empty boxes.
    Binomial,
}

impl Noise {
    fn variance(&self, model: &ForwardModel) -> Result<Array1<f64>> {
        match self {
            Noise::Gaussian => Ok(model.observed().clone()),
            Noise::Binomial => {
                let mut variance = Array1::zeros(model.n_boxes());
                for block in model.blocks() {
                    let counts = model.observed().slice(s![block.rows.clone()]).to_owned();
                    let total = counts.sum();
                    let sigma = binomial_one_sigma(&counts)?;
                    variance
                        .slice_mut(s![block.rows.clone()])
                        .assign(&sigma.mapv(|e| (total * e).powi(2)));
                }
                Ok(variance)
            }
        }
    }
}

/// Residuals `(observed - predicted) / σ`; the objective is their sum of squares.
#[derive(Debug)]
pub struct LeastSquaresObjective {
    model: Arc<ForwardModel>,
    sigma: Array1<f64>,
}

impl LeastSquaresObjective {
    pub fn new(model: Arc<ForwardModel>, noise: Noise) -> Result<Self> {
        let sigma = noise.variance(&model)?.mapv(f64::sqrt);
        Ok(Self { model, sigma })
    }
}

impl Problem for LeastSquaresObjective {
    fn eval(&self, params: &Array1<f64>) -> Result<Array1<f64>> {
        let predicted = self.model.predict(params)?;
        Ok((self.model.observed() - &predicted) / &self.sigma)
    }

    fn parameter_count(&self) -> usize {
        self.model.n_params()
    }

    fn residual_count(&self) -> usize {
        self.model.n_boxes()
    }

    fn errordef(&self) -> f64 {
        LEAST_SQUARES
    }
}

/// The `GaussianLeastSquares` and `BinomialLeastSquares` plugins.
///
/// Parameters are the branching ratios themselves; their sum is not constrained.
#[derive(Debug, Clone)]
pub struct LeastSquares {
    noise: Noise,
    model: Arc<ForwardModel>,
    minimizer: Minimizer,
}

impl LeastSquares {
    pub fn new(model: ForwardModel, start_brs: &Array1<f64>, noise: Noise) -> Result<Self> {
        let model = Arc::new(model);
        let objective = LeastSquaresObjective::new(Arc::clone(&model), noise)?;
        let minimizer = Minimizer::new(
            Arc::new(objective),
            model.decay_names().to_vec(),
            start_brs.clone(),
        )?;
        Ok(Self {
            noise,
            model,
            minimizer,
        })
    }

    pub fn noise(&self) -> Noise {
        self.noise
    }
}

impl FitPlugin for LeastSquares {
    fn name(&self) -> &str {
        match self.noise {
            Noise::Gaussian => "GaussianLeastSquares",
            Noise::Binomial => "BinomialLeastSquares",
        }
    }

    fn model(&self) -> &ForwardModel {
        &self.model
    }

    fn minimizer(&self) -> &Minimizer {
        &self.minimizer
    }

    fn minimizer_mut(&mut self) -> &mut Minimizer {
        &mut self.minimizer
    }

    fn default_limits(&self) -> Vec<Bounds> {
        vec![Bounds { min: 0.0, max: 1.0 }; self.model.n_params()]
    }

    fn enforces_brs_sum_to_1(&self) -> bool {
        false
    }
}
