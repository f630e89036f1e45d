//! Bounded minimizer with a MIGRAD/HESSE style interface.
//!
//! [`Minimizer`] owns an objective ([`Problem`]) and the current parameter
//! state. [`Minimizer::migrad`] runs the Levenberg-Marquardt iteration in the
//! unbounded internal space of the parameter limits and then estimates the
//! covariance with [`Minimizer::hesse`]. The minimizer reports its outcome
//! through the `valid` and `accurate` flags instead of erroring.

pub mod algorithm;
pub mod bounds;
pub mod config;
pub mod convergence;
pub mod covariance;

pub use algorithm::{LevenbergMarquardt, LmResult};
pub use bounds::{Bounds, BoundsError, BoundsTransform};
pub use config::LmConfig;
pub use convergence::ConvergenceStatus;
pub use covariance::{calculate_correlation, covariance_from_hessian, standard_errors_from_covariance};

use std::fmt;
use std::sync::Arc;

use ndarray::{Array1, Array2};
use tracing::debug;

use crate::error::{AllDecaysError, Result};
use crate::problem::Problem;
use crate::utils::finite_difference::{hessian, HESSIAN_EPSILON};

/// Reciprocal condition number below which a covariance is not accurate.
pub const ACCURATE_RCOND: f64 = 1e-12;

/// Default evaluation budget of a MIGRAD call.
pub const DEFAULT_NCALL: usize = 10_000;

/// A problem evaluated in the internal space of a set of limits.
struct InternalProblem<'a> {
    inner: &'a (dyn Problem + Send + Sync),
    transforms: Vec<BoundsTransform>,
}

impl InternalProblem<'_> {
    fn to_external(&self, internal: &Array1<f64>) -> Array1<f64> {
        internal
            .iter()
            .zip(self.transforms.iter())
            .map(|(&v, t)| t.to_external(v))
            .collect()
    }
}

impl Problem for InternalProblem<'_> {
    fn eval(&self, params: &Array1<f64>) -> Result<Array1<f64>> {
        self.inner.eval(&self.to_external(params))
    }

    fn parameter_count(&self) -> usize {
        self.inner.parameter_count()
    }

    fn residual_count(&self) -> usize {
        self.inner.residual_count()
    }

    fn eval_cost(&self, params: &Array1<f64>) -> Result<f64> {
        self.inner.eval_cost(&self.to_external(params))
    }

    fn errordef(&self) -> f64 {
        self.inner.errordef()
    }
}

/// Minimizer state for one objective.
#[derive(Clone)]
pub struct Minimizer {
    problem: Arc<dyn Problem + Send + Sync>,
    names: Vec<String>,
    values: Array1<f64>,
    limits: Vec<Bounds>,
    config: LmConfig,
    covariance: Option<Array2<f64>>,
    fval: f64,
    nfcn: usize,
    status: ConvergenceStatus,
    valid: bool,
    accurate: bool,
}

impl fmt::Debug for Minimizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Minimizer")
            .field("names", &self.names)
            .field("values", &self.values)
            .field("limits", &self.limits)
            .field("fval", &self.fval)
            .field("nfcn", &self.nfcn)
            .field("status", &self.status)
            .field("valid", &self.valid)
            .field("accurate", &self.accurate)
            .finish()
    }
}

impl Minimizer {
    /// Create a minimizer for `problem` starting at `start`, without limits.
    ///
    /// No evaluation is counted; `valid` is false until [`Minimizer::migrad`] succeeds.
    pub fn new(
        problem: Arc<dyn Problem + Send + Sync>,
        names: Vec<String>,
        start: Array1<f64>,
    ) -> Result<Self> {
        let n = problem.parameter_count();
        if names.len() != n || start.len() != n {
            return Err(AllDecaysError::DimensionMismatch(format!(
                "Expected {} parameter names and start values, got {} and {}",
                n,
                names.len(),
                start.len()
            )));
        }
        let fval = problem.eval_cost(&start)?;
        Ok(Self {
            problem,
            names,
            values: start,
            limits: vec![Bounds::unbounded(); n],
            config: LmConfig::default(),
            covariance: None,
            fval,
            nfcn: 0,
            status: ConvergenceStatus::NotRun,
            valid: false,
            accurate: false,
        })
    }

    /// Replace the iteration settings. The `max_evaluations` field is overridden per MIGRAD call.
    pub fn with_config(mut self, config: LmConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &LmConfig {
        &self.config
    }

    pub fn set_config(&mut self, config: LmConfig) {
        self.config = config;
    }

    /// Minimize with at most `ncall` objective evaluations, then run HESSE.
    pub fn migrad(&mut self, ncall: usize) -> Result<()> {
        let transforms: Vec<BoundsTransform> =
            self.limits.iter().copied().map(BoundsTransform::new).collect();
        let internal_start = self
            .values
            .iter()
            .zip(transforms.iter())
            .map(|(&v, t)| t.to_internal(t.bounds().clamp(v)))
            .collect::<std::result::Result<Array1<f64>, _>>()?;

        let internal = InternalProblem {
            inner: self.problem.as_ref(),
            transforms,
        };
        let lm = LevenbergMarquardt::with_config(self.config.clone().with_max_evaluations(ncall));
        let result = lm.minimize(&internal, internal_start)?;

        self.values = internal.to_external(&result.params);
        self.nfcn += result.func_evals;
        self.status = result.status;
        self.fval = self.problem.eval_cost(&self.values)?;
        self.nfcn += 1;
        debug!(
            nfcn = self.nfcn,
            fval = self.fval,
            status = self.status.description(),
            "migrad finished"
        );

        self.hesse()
    }

    /// Estimate the covariance from a finite-difference Hessian of the objective at the current values.
    pub fn hesse(&mut self) -> Result<()> {
        let problem = self.problem.as_ref();
        let (hess, n_evals) = hessian(|x| problem.eval_cost(x), &self.values, Some(HESSIAN_EPSILON))?;
        self.nfcn += n_evals;

        if !self.fval.is_finite() || hess.iter().any(|h| !h.is_finite()) {
            debug!(fval = self.fval, "objective not finite at the minimum, covariance unavailable");
            let n = self.names.len();
            self.covariance = Some(Array2::from_elem((n, n), f64::NAN));
            self.valid = false;
            self.accurate = false;
            return Ok(());
        }

        let estimate = covariance_from_hessian(&hess, self.problem.errordef())?;
        self.valid = self.status.is_converged() && estimate.positive_definite;
        self.accurate = self.valid && estimate.rcond > ACCURATE_RCOND;
        if !estimate.positive_definite {
            debug!(rcond = estimate.rcond, "hessian not positive definite, eigenvalues floored");
        }
        self.covariance = Some(estimate.covariance);
        Ok(())
    }

    /// Parameter names.
    pub fn parameters(&self) -> &[String] {
        &self.names
    }

    pub fn values(&self) -> &Array1<f64> {
        &self.values
    }

    /// Set new start values. Invalidates the previous result but keeps the evaluation count.
    pub fn set_values(&mut self, values: Array1<f64>) -> Result<()> {
        if values.len() != self.names.len() {
            return Err(AllDecaysError::DimensionMismatch(format!(
                "Expected {} values, got {}",
                self.names.len(),
                values.len()
            )));
        }
        self.fval = self.problem.eval_cost(&values)?;
        self.values = values;
        self.invalidate();
        Ok(())
    }

    /// Square roots of the covariance diagonal, NaN before HESSE ran.
    pub fn errors(&self) -> Array1<f64> {
        match &self.covariance {
            Some(cov) => standard_errors_from_covariance(cov),
            None => Array1::from_elem(self.names.len(), f64::NAN),
        }
    }

    pub fn covariance(&self) -> Option<&Array2<f64>> {
        self.covariance.as_ref()
    }

    pub fn limits(&self) -> &[Bounds] {
        &self.limits
    }

    /// Set one [`Bounds`] per parameter. Invalidates the previous result.
    pub fn set_limits(&mut self, limits: Vec<Bounds>) -> Result<()> {
        if limits.len() != self.names.len() {
            return Err(AllDecaysError::DimensionMismatch(format!(
                "Expected {} limits, got {}",
                self.names.len(),
                limits.len()
            )));
        }
        self.limits = limits;
        self.invalidate();
        Ok(())
    }

    /// Converged and with a positive definite Hessian.
    pub fn valid(&self) -> bool {
        self.valid
    }

    /// Valid and with a well-conditioned Hessian.
    pub fn accurate(&self) -> bool {
        self.accurate
    }

    /// Number of objective evaluations since construction.
    pub fn nfcn(&self) -> usize {
        self.nfcn
    }

    /// Objective value at the current values.
    pub fn fval(&self) -> f64 {
        self.fval
    }

    pub fn errordef(&self) -> f64 {
        self.problem.errordef()
    }

    pub fn status(&self) -> ConvergenceStatus {
        self.status
    }

    fn invalidate(&mut self) {
        self.covariance = None;
        self.status = ConvergenceStatus::NotRun;
        self.valid = false;
        self.accurate = false;
    }
}
