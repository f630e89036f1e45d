//! Fits on expected counts.

use alldecays_rs::data::{DataSet, SingleDataSet};
use alldecays_rs::fitting::{Fit, FitMode, FitParameters, FitResult, FitStep, ParamSpace};
use alldecays_rs::minimizer::ConvergenceStatus;
use alldecays_rs::problem::{LEAST_SQUARES, LIKELIHOOD};
use alldecays_rs::{AllDecaysError, FitError};
use approx::assert_relative_eq;
use ndarray::array;

use crate::common::{
    higgs_like_data_set, init_logging, names, reference_data_set, sum_to_one_mode, HIGGS_DECAYS,
};

fn all_modes() -> Vec<FitMode> {
    FitMode::AVAILABLE
        .iter()
        .map(|name| name.parse().unwrap())
        .collect()
}

#[test]
fn test_zero_iteration_fit_keeps_start_values() {
    let ds = higgs_like_data_set()
        .with_fit_start_brs(array![0.2, 0.3, 0.5])
        .unwrap();
    for mode in all_modes() {
        let fit = Fit::builder(&ds)
            .fit_mode(mode)
            .fit_step(FitStep::none())
            .build()
            .unwrap();
        assert_eq!(fit.values(), array![0.2, 0.3, 0.5]);
        assert_eq!(fit.minimizer().nfcn(), 0);
        assert!(!fit.minimizer().valid());
        assert!(fit.covariance().is_none());
    }
}

#[test]
fn test_asimov_fit_recovers_data_brs() {
    init_logging();
    let mut ds = reference_data_set();
    ds.set_data_brs(array![0.3, 0.7]).unwrap();
    for mode in all_modes() {
        let fit = Fit::builder(&ds).fit_mode(mode.clone()).build().unwrap();
        assert!(fit.minimizer().valid(), "{mode}");
        assert!(fit.minimizer().accurate(), "{mode}");
        assert_relative_eq!(fit.values()[0], 0.3, epsilon = 1e-5);
        assert_relative_eq!(fit.values()[1], 0.7, epsilon = 1e-5);
        let cov = fit.covariance().unwrap();
        assert_eq!(cov.dim(), (2, 2));
        assert!(fit.errors().iter().all(|e| e.is_finite() && *e > 0.0));
    }
}

#[test]
fn test_multi_channel_fit_with_limits() {
    let ds = higgs_like_data_set();
    for mode in all_modes() {
        let fit = Fit::builder(&ds)
            .fit_mode(mode.clone())
            .has_limits(true)
            .build()
            .unwrap();
        assert!(fit.plugin().has_limits());
        assert!(fit.minimizer().valid(), "{mode}");
        // The fit matrix comes from the other MC half, so the data BRs are only approximately recovered.
        for (value, truth) in fit.values().iter().zip(ds.data_brs().iter()) {
            assert!((value - truth).abs() < 0.1, "{mode}: {value} vs {truth}");
        }
        assert_eq!(fit.parameters(), &names(&HIGGS_DECAYS)[..]);
    }
}

#[test]
fn test_errordef_per_mode() {
    let ds = reference_data_set();
    let errordef = |mode: FitMode| {
        Fit::builder(&ds)
            .fit_mode(mode)
            .run_fit(false)
            .build()
            .unwrap()
            .minimizer()
            .errordef()
    };
    assert_eq!(errordef(FitMode::GaussianLeastSquares), LEAST_SQUARES);
    assert_eq!(errordef(FitMode::BinomialLeastSquares), LEAST_SQUARES);
    assert_eq!(errordef(FitMode::Poisson), LIKELIHOOD);
}

#[test]
fn test_default_limits_per_mode() {
    let ds = reference_data_set();
    for mode in all_modes() {
        let fit = Fit::builder(&ds)
            .fit_mode(mode.clone())
            .has_limits(true)
            .run_fit(false)
            .build()
            .unwrap();
        let limits = fit.plugin().default_limits();
        assert_eq!(limits[0].min, 0.0);
        let max = if matches!(mode, FitMode::Poisson) { f64::INFINITY } else { 1.0 };
        assert_eq!(limits[0].max, max);
        assert!(!fit.plugin().enforces_brs_sum_to_1());
    }
}

#[test]
fn test_custom_plugin_enforces_sum_to_one() {
    init_logging();
    let ds = higgs_like_data_set();
    let fit = Fit::builder(&ds)
        .fit_mode(sum_to_one_mode())
        .has_limits(true)
        .build()
        .unwrap();
    assert!(fit.plugin().enforces_brs_sum_to_1());
    assert_eq!(fit.minimizer().parameters().len(), 2);
    assert_eq!(fit.parameters().len(), 3);
    assert_relative_eq!(fit.values().sum(), 1.0, epsilon = 1e-12);

    let cov = fit.covariance().unwrap();
    assert_eq!(cov.dim(), (3, 3));
    // The constraint makes every row of the covariance sum to zero.
    for row in cov.rows() {
        assert_relative_eq!(row.sum(), 0.0, epsilon = 1e-12);
    }
    assert_eq!(fit.fit_mode().name(), "SumToOne");
}

#[test]
fn test_custom_plugin_starts_at_internal_fit_start() {
    let ds = higgs_like_data_set()
        .with_fit_start_brs(array![0.2, 0.3, 0.5])
        .unwrap();
    let fit = Fit::builder(&ds)
        .fit_mode(sum_to_one_mode())
        .run_fit(false)
        .build()
        .unwrap();
    let expected = fit.plugin().transform_to_internal(ds.fit_start_brs()).unwrap();
    assert_eq!(fit.minimizer().values(), &expected);
    assert_eq!(expected, array![0.2, 0.3]);
    assert_relative_eq!(fit.values()[2], 0.5, epsilon = 1e-12);
}

#[test]
fn test_invalid_fit_is_raised() {
    let ds = higgs_like_data_set();
    let result = Fit::builder(&ds).fit_step(FitStep::migrad(2)).build();
    assert!(matches!(result, Err(AllDecaysError::Fit(FitError::InvalidFit(_)))));

    let fit = Fit::builder(&ds)
        .fit_step(FitStep::migrad(2))
        .raise_invalid_fit(false)
        .build()
        .unwrap();
    assert!(!fit.minimizer().valid());
    assert_eq!(fit.minimizer().status(), ConvergenceStatus::CallLimitReached);
}

#[test]
fn test_empty_data_sets_fail_fast() {
    let no_channels = SingleDataSet::new(names(&["A", "B"]));
    assert!(matches!(
        Fit::new(&no_channels),
        Err(AllDecaysError::Fit(FitError::Configuration(_)))
    ));
    let no_decays = SingleDataSet::new(Vec::new());
    assert!(matches!(
        Fit::new(&no_decays),
        Err(AllDecaysError::Fit(FitError::Configuration(_)))
    ));
}

#[test]
fn test_refit_with_new_limits() {
    let ds = reference_data_set();
    let mut fit = Fit::new(&ds).unwrap();
    let first = fit.values();

    fit.plugin_mut().set_has_limits(true).unwrap();
    fit.minimizer_mut().set_values(array![0.4, 0.4]).unwrap();
    assert!(!fit.minimizer().valid());
    fit.run_fit().unwrap();
    assert!(fit.minimizer().valid());
    assert_relative_eq!(fit.values()[0], first[0], epsilon = 1e-5);
}

#[test]
fn test_fit_result_serializes() {
    let ds = reference_data_set();
    let fit = Fit::builder(&ds).fit_mode(FitMode::Poisson).build().unwrap();
    let result = fit.result();
    assert_eq!(result.fit_mode, "Poisson");
    assert_eq!(result.parameters, names(&["A", "B"]));
    assert_eq!(result.errors.len(), 2);

    let json = result.to_json().unwrap();
    let back: FitResult = serde_json::from_str(&json).unwrap();
    assert_eq!(back.valid, result.valid);
    assert_eq!(back.nfcn, result.nfcn);
    assert_relative_eq!(back.values[0], result.values[0]);
}

#[test]
fn test_fit_parameters_from_fit() {
    let ds = higgs_like_data_set();
    let fit = Fit::builder(&ds)
        .fit_mode(sum_to_one_mode())
        .build()
        .unwrap();

    let physics = FitParameters::from_fit(&fit, ParamSpace::Physics).unwrap();
    assert_eq!(physics.names.len(), 3);
    assert_eq!(physics.starting_values, ds.fit_start_brs().clone());
    assert!(!physics.is_from_toys);

    let internal = FitParameters::from_fit(&fit, ParamSpace::Internal).unwrap();
    assert_eq!(internal.names.len(), 2);
    assert_eq!(internal.starting_values.len(), 2);
    let corr = internal.correlation();
    assert_relative_eq!(corr[[0, 0]], 1.0);
    assert!(corr[[0, 1]].abs() <= 1.0);

    assert!(matches!(
        FitParameters::from_toys(&fit, ParamSpace::Physics),
        Err(AllDecaysError::Fit(FitError::NoToys))
    ));
}

#[test]
fn test_fit_display() {
    let ds = reference_data_set();
    let fit = Fit::new(&ds).unwrap();
    let text = fit.to_string();
    assert!(text.contains("GaussianLeastSquares"));
    assert!(text.contains("A:"));
}
