//! Poisson likelihood fit.

use std::sync::Arc;

use ndarray::Array1;

use crate::error::Result;
use crate::minimizer::{Bounds, Minimizer};
use crate::model::ForwardModel;
use crate::problem::{Problem, LIKELIHOOD};

use super::FitPlugin;

/// Negative log-likelihood `Σ (ν - n ln ν)` of Poisson box counts.
///
/// The residuals are signed deviance residuals, whose sum of squares is
/// twice the NLL up to a constant, so the least-squares iteration and the
/// likelihood share their minimum.
#[derive(Debug)]
pub struct PoissonObjective {
    model: Arc<ForwardModel>,
}

impl PoissonObjective {
    pub fn new(model: Arc<ForwardModel>) -> Self {
        Self { model }
    }

    fn predicted(&self, params: &Array1<f64>) -> Result<Array1<f64>> {
        Ok(self.model.predict(params)?.mapv(|nu| nu.max(f64::MIN_POSITIVE)))
    }
}

impl Problem for PoissonObjective {
    fn eval(&self, params: &Array1<f64>) -> Result<Array1<f64>> {
        let predicted = self.predicted(params)?;
        Ok(predicted
            .iter()
            .zip(self.model.observed().iter())
            .map(|(&nu, &n)| {
                let deviance = if n > 0.0 {
                    2.0 * (nu - n + n * (n / nu).ln())
                } else {
                    2.0 * nu
                };
                (nu - n).signum() * deviance.max(0.0).sqrt()
            })
            .collect())
    }

    fn parameter_count(&self) -> usize {
        self.model.n_params()
    }

    fn residual_count(&self) -> usize {
        self.model.n_boxes()
    }

    fn eval_cost(&self, params: &Array1<f64>) -> Result<f64> {
        let predicted = self.predicted(params)?;
        Ok(predicted
            .iter()
            .zip(self.model.observed().iter())
            .map(|(&nu, &n)| nu - n * nu.ln())
            .sum())
    }

    fn errordef(&self) -> f64 {
        LIKELIHOOD
    }
}

/// The `Poisson` plugin. Parameters are the branching ratios, limited to be non-negative.
#[derive(Debug, Clone)]
pub struct Poisson {
    model: Arc<ForwardModel>,
    minimizer: Minimizer,
}

impl Poisson {
    pub fn new(model: ForwardModel, start_brs: &Array1<f64>) -> Result<Self> {
        let model = Arc::new(model);
        let minimizer = Minimizer::new(
            Arc::new(PoissonObjective::new(Arc::clone(&model))),
            model.decay_names().to_vec(),
            start_brs.clone(),
        )?;
        Ok(Self { model, minimizer })
    }
}

impl FitPlugin for Poisson {
    fn name(&self) -> &str {
        "Poisson"
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
        vec![Bounds::min_only(0.0); self.model.n_params()]
    }

    /// Normalizing the values would change their covariance in a non-obvious
    /// way; fits that need `Σ BR = 1` should use a plugin that enforces it.
    fn enforces_brs_sum_to_1(&self) -> bool {
        false
    }
}
