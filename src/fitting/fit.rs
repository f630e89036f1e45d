//! Fit orchestration.
//!
//! A [`Fit`] binds a data set to a [`FitPlugin`], runs the configured
//! [`FitStep`] on the plugin's minimizer and checks the outcome. Toy
//! studies (see [`Fit::fill_toys`]) create one new fit per toy with the same
//! settings.

use std::fmt;
use std::sync::Arc;

use ndarray::{Array1, Array2};
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::data::DataSet;
use crate::error::{FitError, Result};
use crate::minimizer::{LmConfig, Minimizer, DEFAULT_NCALL};
use crate::model::ForwardModel;

use super::plugins::{FitMode, FitPlugin};
use super::toys::ToyValues;

type StepFn = dyn Fn(&mut Minimizer) -> Result<()> + Send + Sync;

/// The minimization procedure applied to a freshly created plugin.
///
/// # Examples
///
/// ```
/// use alldecays_rs::fitting::FitStep;
///
/// // Two MIGRAD calls with a small budget each.
/// let step = FitStep::new(|m| {
///     m.migrad(500)?;
///     m.migrad(500)
/// });
/// let _ = step;
/// ```
#[derive(Clone)]
pub struct FitStep(Arc<StepFn>);

impl FitStep {
    pub fn new<F>(step: F) -> Self
    where
        F: Fn(&mut Minimizer) -> Result<()> + Send + Sync + 'static,
    {
        Self(Arc::new(step))
    }

    /// A single MIGRAD call with `ncall` evaluations.
    pub fn migrad(ncall: usize) -> Self {
        Self::new(move |m| m.migrad(ncall))
    }

    /// Leave the minimizer at its start values.
    pub fn none() -> Self {
        Self::new(|_| Ok(()))
    }

    pub fn run(&self, minimizer: &mut Minimizer) -> Result<()> {
        (self.0)(minimizer)
    }
}

impl Default for FitStep {
    fn default() -> Self {
        Self::migrad(DEFAULT_NCALL)
    }
}

impl fmt::Debug for FitStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("FitStep(..)")
    }
}

/// Settings shared by a fit and all of its toy fits.
#[derive(Debug, Clone)]
pub(crate) struct FitSettings {
    pub fit_mode: FitMode,
    pub fit_step: FitStep,
    pub has_limits: bool,
    pub raise_invalid_fit: bool,
    pub lm_config: LmConfig,
}

/// Configures and creates a [`Fit`].
#[derive(Debug)]
pub struct FitBuilder<'a> {
    data_set: &'a dyn DataSet,
    settings: FitSettings,
    print_brs_sum_not_1: bool,
    run_fit: bool,
}

impl<'a> FitBuilder<'a> {
    fn new(data_set: &'a dyn DataSet) -> Self {
        Self {
            data_set,
            settings: FitSettings {
                fit_mode: FitMode::default(),
                fit_step: FitStep::default(),
                has_limits: false,
                raise_invalid_fit: true,
                lm_config: LmConfig::default(),
            },
            print_brs_sum_not_1: true,
            run_fit: true,
        }
    }

    pub fn fit_mode(mut self, fit_mode: FitMode) -> Self {
        self.settings.fit_mode = fit_mode;
        self
    }

    pub fn fit_step(mut self, fit_step: FitStep) -> Self {
        self.settings.fit_step = fit_step;
        self
    }

    /// Apply the plugin's default limits. Off by default.
    pub fn has_limits(mut self, has_limits: bool) -> Self {
        self.settings.has_limits = has_limits;
        self
    }

    /// Fail with [`FitError::InvalidFit`] on an invalid minimum. On by default.
    pub fn raise_invalid_fit(mut self, raise: bool) -> Self {
        self.settings.raise_invalid_fit = raise;
        self
    }

    /// Log the notice about plugins that do not enforce `Σ BR = 1`. On by default.
    pub fn print_brs_sum_not_1(mut self, print: bool) -> Self {
        self.print_brs_sum_not_1 = print;
        self
    }

    /// Run the fit step during construction. On by default.
    pub fn run_fit(mut self, run: bool) -> Self {
        self.run_fit = run;
        self
    }

    pub fn lm_config(mut self, config: LmConfig) -> Self {
        self.settings.lm_config = config;
        self
    }

    /// Fit the expected counts at the data BRs.
    pub fn build(self) -> Result<Fit<'a>> {
        check_data_set(self.data_set)?;
        let model = ForwardModel::expected(self.data_set)?;
        Fit::create(self.data_set, self.settings, model, self.print_brs_sum_not_1, self.run_fit)
    }

    /// Fit one multinomial toy drawn from `rng` in every channel.
    pub fn build_toy<R: Rng + ?Sized>(self, rng: &mut R) -> Result<Fit<'a>> {
        check_data_set(self.data_set)?;
        let model = ForwardModel::toy(self.data_set, rng)?;
        Fit::create(self.data_set, self.settings, model, self.print_brs_sum_not_1, self.run_fit)
    }
}

fn check_data_set(data_set: &dyn DataSet) -> Result<()> {
    if data_set.decay_names().is_empty() {
        return Err(FitError::Configuration("the data set has no signal decays".to_string()).into());
    }
    if data_set.channels().is_empty() {
        return Err(FitError::Configuration("the data set has no channels".to_string()).into());
    }
    Ok(())
}

/// A fit of one data set with one cost function.
///
/// # Examples
///
/// ```no_run
/// use alldecays_rs::data::{ChannelSource, ChannelTable, SingleDataSet};
/// use alldecays_rs::fitting::{Fit, FitMode};
///
/// let mut ds = SingleDataSet::new(vec!["H→bb".into(), "H→cc".into()]);
/// let table = ChannelTable::from_json_file("channel1.json").unwrap();
/// ds.add_channel("channel1", ChannelSource::Unpolarized(table)).unwrap();
///
/// let fit = Fit::builder(&ds).fit_mode(FitMode::Poisson).build().unwrap();
/// println!("{:?} ± {:?}", fit.values(), fit.errors());
/// ```
#[derive(Debug)]
pub struct Fit<'a> {
    pub(crate) data_set: &'a dyn DataSet,
    pub(crate) settings: FitSettings,
    pub(crate) plugin: Box<dyn FitPlugin>,
    pub(crate) toys: Option<ToyValues>,
}

impl<'a> Fit<'a> {
    pub fn builder(data_set: &'a dyn DataSet) -> FitBuilder<'a> {
        FitBuilder::new(data_set)
    }

    /// Fit the expected counts with the default settings.
    pub fn new(data_set: &'a dyn DataSet) -> Result<Self> {
        Self::builder(data_set).build()
    }

    fn create(
        data_set: &'a dyn DataSet,
        settings: FitSettings,
        model: ForwardModel,
        print_brs_sum_not_1: bool,
        run_fit: bool,
    ) -> Result<Self> {
        let mut plugin = settings.fit_mode.create(model, data_set.fit_start_brs())?;
        let start = plugin.transform_to_internal(data_set.fit_start_brs())?;
        plugin.minimizer_mut().set_values(start)?;
        plugin.set_has_limits(settings.has_limits)?;
        plugin.minimizer_mut().set_config(settings.lm_config.clone());

        if !plugin.enforces_brs_sum_to_1() && print_brs_sum_not_1 {
            info!(
                plugin = plugin.name(),
                "The chosen fit plugin does not enforce the branching ratios to sum to 1. \
                 On top of being conceptually problematic, this will break \
                 if the signal cross section does not match with the expectation."
            );
        }

        let mut fit = Self {
            data_set,
            settings,
            plugin,
            toys: None,
        };
        if run_fit {
            fit.run_fit()?;
        }
        Ok(fit)
    }

    /// A fresh fit on one toy with the same settings, without the BR-sum notice.
    pub(crate) fn toy_fit<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<Fit<'a>> {
        let model = ForwardModel::toy(self.data_set, rng)?;
        let mut settings = self.settings.clone();
        settings.has_limits = self.plugin.has_limits();
        Fit::create(self.data_set, settings, model, false, true)
    }

    /// Run the fit step and check the minimum.
    ///
    /// An invalid minimum after at least one evaluation is an error unless
    /// `raise_invalid_fit` is off.
    pub fn run_fit(&mut self) -> Result<()> {
        self.settings.fit_step.run(self.plugin.minimizer_mut())?;
        let m = self.plugin.minimizer();
        debug!(nfcn = m.nfcn(), valid = m.valid(), accurate = m.accurate(), "fit step done");
        if !m.valid() && m.nfcn() != 0 && self.settings.raise_invalid_fit {
            return Err(FitError::InvalidFit(format!(
                "{} after {} evaluations (fval = {}, values = {})",
                m.status().description(),
                m.nfcn(),
                m.fval(),
                m.values()
            ))
            .into());
        }
        Ok(())
    }

    pub fn data_set(&self) -> &'a dyn DataSet {
        self.data_set
    }

    /// The plugin, giving the physics view of the fit.
    pub fn plugin(&self) -> &dyn FitPlugin {
        self.plugin.as_ref()
    }

    pub fn plugin_mut(&mut self) -> &mut dyn FitPlugin {
        self.plugin.as_mut()
    }

    /// The minimizer, giving the internal view of the fit.
    pub fn minimizer(&self) -> &Minimizer {
        self.plugin.minimizer()
    }

    /// Mutable minimizer access, e.g. to change limits or start values and minimize again.
    pub fn minimizer_mut(&mut self) -> &mut Minimizer {
        self.plugin.minimizer_mut()
    }

    pub fn fit_mode(&self) -> &FitMode {
        &self.settings.fit_mode
    }

    /// Physics parameter names.
    pub fn parameters(&self) -> &[String] {
        self.plugin.parameters()
    }

    /// Physics values.
    pub fn values(&self) -> Array1<f64> {
        self.plugin.values()
    }

    /// Physics errors.
    pub fn errors(&self) -> Array1<f64> {
        self.plugin.errors()
    }

    /// Physics covariance, p × p.
    pub fn covariance(&self) -> Option<Array2<f64>> {
        self.plugin.covariance()
    }

    /// Snapshot of the current state.
    pub fn result(&self) -> FitResult {
        let m = self.plugin.minimizer();
        FitResult {
            fit_mode: self.plugin.name().to_string(),
            parameters: self.plugin.parameters().to_vec(),
            values: self.plugin.values(),
            internal_parameters: m.parameters().to_vec(),
            internal_values: m.values().clone(),
            covariance: self.plugin.covariance(),
            errors: self.plugin.errors(),
            valid: m.valid(),
            accurate: m.accurate(),
            nfcn: m.nfcn(),
            fval: m.fval(),
        }
    }

    /// The toy ensemble of the last toy study.
    pub fn toys(&self) -> Option<&ToyValues> {
        self.toys.as_ref()
    }

    /// Replace the toy ensemble, e.g. with a masked copy.
    pub fn set_toys(&mut self, toys: Option<ToyValues>) {
        self.toys = toys;
    }
}

impl fmt::Display for Fit<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let m = self.plugin.minimizer();
        writeln!(f, "Fit with:")?;
        writeln!(f, " - Fit mode: {}", self.plugin.name())?;
        writeln!(f, " - Channels: {}", self.data_set.channels().len())?;
        writeln!(
            f,
            " - valid: {}, accurate: {}, nfcn: {}, fval: {:.6}",
            m.valid(),
            m.accurate(),
            m.nfcn(),
            m.fval()
        )?;
        for ((name, v), e) in self
            .plugin
            .parameters()
            .iter()
            .zip(self.plugin.values().iter())
            .zip(self.plugin.errors().iter())
        {
            writeln!(f, "   {name}: {v:.6} ± {e:.6}")?;
        }
        Ok(())
    }
}

/// Immutable record of a fit outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitResult {
    pub fit_mode: String,
    /// Physics parameter names.
    pub parameters: Vec<String>,
    /// Physics values.
    pub values: Array1<f64>,
    pub internal_parameters: Vec<String>,
    pub internal_values: Array1<f64>,
    /// Physics covariance, absent before HESSE ran.
    pub covariance: Option<Array2<f64>>,
    /// Physics errors, `sqrt(diag(covariance))`.
    pub errors: Array1<f64>,
    pub valid: bool,
    pub accurate: bool,
    pub nfcn: usize,
    pub fval: f64,
}

impl FitResult {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
