//! Shared fixtures for the integration tests.

use std::collections::BTreeMap;
use std::sync::Arc;

use alldecays_rs::data::{
    ChannelOptions, ChannelSource, ChannelTable, DataSet, Polarization, PolarizationCase,
    SingleDataSet,
};
use alldecays_rs::fitting::{FitMode, FitPlugin, PluginFactory};
use alldecays_rs::minimizer::{Bounds, Minimizer};
use alldecays_rs::problem::Problem;
use alldecays_rs::{ForwardModel, Result};
use ndarray::{s, Array1, Array2};

pub fn names(v: &[&str]) -> Vec<String> {
    v.iter().map(|s| s.to_string()).collect()
}

/// Route library logs to the test output. Safe to call from every test.
pub fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::INFO)
        .try_init();
}

/// Two decays, one background and two boxes; every number is hand-computable.
///
/// σ = (60, 40, 50) fb, P(b1 | A) = 0.8, P(b1 | B) = 0.1, P(b1 | bkg) = 0.25
/// with 50 % of the background unselected.
pub fn reference_table() -> ChannelTable {
    ChannelTable::new(
        names(&["A", "B", "bkg"]),
        names(&["b1", "b2"]),
        vec![60.0, 40.0, 50.0],
        vec![0, 0, 50],
        vec![vec![80, 20], vec![10, 90], vec![25, 25]],
    )
    .unwrap()
}

/// Full-statistics options, so fit and data matrices are identical.
pub fn full_stats() -> ChannelOptions {
    ChannelOptions::default().with_ignore_limited_mc_statistics_bias(true)
}

/// One reference channel named `"c1"` with flat BRs.
pub fn reference_data_set() -> SingleDataSet {
    let mut ds = SingleDataSet::new(names(&["A", "B"])).with_channel_options(full_stats());
    ds.add_channel("c1", ChannelSource::Unpolarized(reference_table()))
        .unwrap();
    ds
}

pub const HIGGS_DECAYS: [&str; 3] = ["H→bb", "H→cc", "H→gg"];

/// Three decays in two channels with three boxes each and the default MC split.
pub fn higgs_like_data_set() -> SingleDataSet {
    let decays = names(&HIGGS_DECAYS);
    let hadronic = ChannelTable::new(
        names(&["H→bb", "H→cc", "H→gg", "qq", "WW"]),
        names(&["b-like", "c-like", "g-like"]),
        vec![120.0, 120.0, 120.0, 300.0, 150.0],
        vec![1_000, 1_200, 1_500, 8_000, 6_000],
        vec![
            vec![7_000, 1_200, 800],
            vec![900, 6_400, 1_500],
            vec![700, 1_300, 6_500],
            vec![400, 600, 1_000],
            vec![1_000, 1_500, 1_500],
        ],
    )
    .unwrap();
    let leptonic = ChannelTable::new(
        names(&["H→bb", "H→cc", "H→gg", "ZZ"]),
        names(&["b-like", "c-like", "g-like"]),
        vec![40.0, 40.0, 40.0, 80.0],
        vec![2_000, 2_500, 3_000, 7_000],
        vec![
            vec![6_000, 1_200, 800],
            vec![1_000, 5_500, 1_000],
            vec![600, 900, 5_500],
            vec![1_000, 1_000, 1_000],
        ],
    )
    .unwrap();
    let mut ds = SingleDataSet::new(decays)
        .with_data_brs(ndarray::array![0.6, 0.1, 0.3])
        .unwrap();
    ds.add_channels([
        ("hadronic", ChannelSource::Unpolarized(hadronic)),
        ("leptonic", ChannelSource::Unpolarized(leptonic)),
    ])
    .unwrap();
    ds
}

/// The reference table at four helicity combinations, with cross sections
/// scaled by `factors` and no background in `eRpR`.
pub fn polarized_source(factors: [f64; 4]) -> ChannelSource {
    let tables: BTreeMap<PolarizationCase, ChannelTable> = PolarizationCase::ALL
        .iter()
        .zip(factors)
        .map(|(&case, f)| {
            let mut t = reference_table();
            t.cross_sections.iter_mut().for_each(|cs| *cs *= f);
            if case == PolarizationCase::ERpR {
                t.cross_sections[2] = 0.0;
                t.unselected[2] = 0;
                t.counts[2] = vec![0, 0];
            }
            (case, t)
        })
        .collect();
    ChannelSource::Polarized(tables)
}

pub fn polarized_data_set(polarization: Polarization, factors: [f64; 4]) -> SingleDataSet {
    let mut ds = SingleDataSet::new(names(&["A", "B"]))
        .with_channel_options(full_stats())
        .with_polarization(polarization)
        .unwrap();
    ds.add_channel("pol", polarized_source(factors)).unwrap();
    ds
}

/// Jacobian of `q ↦ (q, 1 - Σ q)`.
fn sum_to_one_jacobian(n: usize) -> Array2<f64> {
    let mut jac = Array2::zeros((n, n - 1));
    jac.slice_mut(s![..n - 1, ..]).assign(&Array2::<f64>::eye(n - 1));
    jac.row_mut(n - 1).fill(-1.0);
    jac
}

/// Gaussian χ² of the first `n - 1` BRs, the last one being `1 - Σ`.
#[derive(Debug)]
struct SumToOneObjective {
    model: Arc<ForwardModel>,
}

impl SumToOneObjective {
    fn full(q: &Array1<f64>) -> Array1<f64> {
        q.iter().copied().chain(std::iter::once(1.0 - q.sum())).collect()
    }
}

impl Problem for SumToOneObjective {
    fn eval(&self, q: &Array1<f64>) -> Result<Array1<f64>> {
        let predicted = self.model.predict(&Self::full(q))?;
        let observed = self.model.observed();
        Ok((observed - &predicted) / &observed.mapv(f64::sqrt))
    }

    fn parameter_count(&self) -> usize {
        self.model.n_params() - 1
    }

    fn residual_count(&self) -> usize {
        self.model.n_boxes()
    }
}

/// A plugin that fits `n - 1` BRs and derives the last one from `Σ BR = 1`.
#[derive(Debug)]
pub struct SumToOne {
    model: Arc<ForwardModel>,
    minimizer: Minimizer,
}

impl FitPlugin for SumToOne {
    fn name(&self) -> &str {
        "SumToOne"
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
        vec![Bounds { min: 0.0, max: 1.0 }; self.model.n_params() - 1]
    }

    fn enforces_brs_sum_to_1(&self) -> bool {
        true
    }

    fn transform_to_internal(&self, values: &Array1<f64>) -> Result<Array1<f64>> {
        Ok(values.slice(s![..values.len() - 1]).to_owned())
    }

    fn values(&self) -> Array1<f64> {
        SumToOneObjective::full(self.minimizer.values())
    }

    fn covariance(&self) -> Option<Array2<f64>> {
        let jac = sum_to_one_jacobian(self.model.n_params());
        self.minimizer
            .covariance()
            .map(|cov| jac.dot(cov).dot(&jac.t()))
    }
}

#[derive(Debug)]
pub struct SumToOneFactory;

impl PluginFactory for SumToOneFactory {
    fn name(&self) -> &str {
        "SumToOne"
    }

    /// Starts at zero; the fit moves it to `transform_to_internal(fit_start_brs)`.
    fn create(&self, model: ForwardModel, _start_brs: &Array1<f64>) -> Result<Box<dyn FitPlugin>> {
        let model = Arc::new(model);
        let names = model.decay_names()[..model.n_params() - 1].to_vec();
        let start = Array1::zeros(model.n_params() - 1);
        let minimizer = Minimizer::new(
            Arc::new(SumToOneObjective {
                model: Arc::clone(&model),
            }),
            names,
            start,
        )?;
        Ok(Box::new(SumToOne { model, minimizer }))
    }
}

pub fn sum_to_one_mode() -> FitMode {
    FitMode::Custom(Arc::new(SumToOneFactory))
}

/// Asserts that the data set's channels all use `expected` as luminosity.
pub fn assert_luminosity(ds: &dyn DataSet, expected: f64) {
    for (name, ch) in ds.channels() {
        assert_eq!(ch.luminosity(), expected, "channel {name}");
    }
}
