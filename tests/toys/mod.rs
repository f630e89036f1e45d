//! Toy studies and their diagnostics.

use alldecays_rs::fitting::{
    channel_toy_ratios, valid_toy_values, Fit, FitMode, FitParameters, FitStep, ParamSpace,
    ToyConfig,
};
use alldecays_rs::data::{ChannelSource, ChannelTable, SingleDataSet};
use alldecays_rs::{AllDecaysError, DataError, FitError};
use approx::assert_relative_eq;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use crate::common::{
    full_stats, higgs_like_data_set, init_logging, names, reference_data_set, sum_to_one_mode,
};

#[test]
fn test_channel_counts_need_to_be_stored() {
    init_logging();
    let ds = higgs_like_data_set();
    let mut fit = Fit::new(&ds).unwrap();
    let mut rng = ChaCha8Rng::seed_from_u64(1);

    assert!(matches!(
        channel_toy_ratios(&fit, "hadronic"),
        Err(AllDecaysError::Fit(FitError::NoToys))
    ));

    fit.fill_toys(2, &mut rng, false).unwrap();
    assert!(valid_toy_values(&fit, false).is_ok());
    assert!(matches!(
        channel_toy_ratios(&fit, "hadronic"),
        Err(AllDecaysError::Fit(FitError::ChannelCountsNotStored))
    ));

    fit.fill_toys(2, &mut rng, true).unwrap();
    let ratios = channel_toy_ratios(&fit, "hadronic").unwrap();
    assert_eq!(ratios.ratios.dim(), (2, 3));
    assert_eq!(ratios.box_names.len(), 3);
    assert!(ratios.ratios.iter().all(|r| r.is_finite() && *r > 0.5 && *r < 1.5));
    assert_eq!(ratios.inaccurate_ratios().nrows(), ratios.n_inaccurate());

    assert!(matches!(
        channel_toy_ratios(&fit, "nope"),
        Err(AllDecaysError::Data(DataError::UnknownChannel(_)))
    ));
}

#[test]
fn test_stored_counts_match_the_toy_totals() {
    let ds = reference_data_set();
    let mut fit = Fit::builder(&ds).fit_mode(FitMode::Poisson).build().unwrap();
    let toys = fit
        .fill_toys(3, &mut ChaCha8Rng::seed_from_u64(2), true)
        .unwrap();
    for toy in toys.channel_counts().unwrap() {
        let (name, counts) = &toy[0];
        assert_eq!(name, "c1");
        assert!((counts.sum() - 125_000.0).abs() <= 1.0);
    }
}

#[test]
fn test_toys_are_seeded() {
    let ds = reference_data_set();
    let mut first = Fit::new(&ds).unwrap();
    let mut second = Fit::new(&ds).unwrap();
    let a = first
        .fill_toys(5, &mut ChaCha8Rng::seed_from_u64(3), false)
        .unwrap()
        .clone();
    let b = second
        .fill_toys(5, &mut ChaCha8Rng::seed_from_u64(3), false)
        .unwrap();
    assert_eq!(&a, b);
    assert_eq!(a.len(), 5);
    assert!(a.channel_counts().is_none());
}

#[test]
fn test_toy_spread_matches_hesse_errors() {
    let ds = reference_data_set();
    let mut fit = Fit::builder(&ds).fit_mode(FitMode::Poisson).build().unwrap();
    let config = ToyConfig::default().with_n_toys(200).with_progress_interval(50);
    fit.fill_toys_with(&config, &mut ChaCha8Rng::seed_from_u64(4))
        .unwrap();

    let from_toys = FitParameters::from_toys(&fit, ParamSpace::Physics).unwrap();
    let from_fit = FitParameters::from_fit(&fit, ParamSpace::Physics).unwrap();
    assert!(from_toys.is_from_toys);
    for i in 0..2 {
        assert_relative_eq!(from_toys.values[i], 0.5, epsilon = 3.0 * from_fit.errors[i]);
        assert_relative_eq!(from_toys.errors[i], from_fit.errors[i], max_relative = 0.25);
    }
}

#[test]
fn test_mask_keeps_selected_toys() {
    let ds = higgs_like_data_set();
    let mut fit = Fit::new(&ds).unwrap();
    let toys = fit
        .fill_toys(4, &mut ChaCha8Rng::seed_from_u64(5), true)
        .unwrap()
        .clone();

    let mask = [true, false, true, false];
    let masked = toys.get_copy_after_mask(&mask).unwrap();
    assert_eq!(masked.len(), 2);
    assert_eq!(masked.physics().row(1), toys.physics().row(2));
    assert_eq!(masked.nfcn(), &[toys.nfcn()[0], toys.nfcn()[2]]);
    assert_eq!(masked.channel_counts().unwrap().len(), 2);

    let all = toys.get_copy_after_mask(&[true; 4]).unwrap();
    assert_eq!(all, toys);
    assert!(toys.get_copy_after_mask(&[false; 4]).unwrap().is_empty());
    assert!(toys.get_copy_after_mask(&[true; 3]).is_err());

    fit.set_toys(Some(masked));
    assert_eq!(fit.toys().unwrap().len(), 2);
}

#[test]
fn test_toys_with_custom_plugin() {
    let ds = higgs_like_data_set();
    let mut fit = Fit::builder(&ds)
        .fit_mode(sum_to_one_mode())
        .has_limits(true)
        .build()
        .unwrap();
    let toys = fit
        .fill_toys(3, &mut ChaCha8Rng::seed_from_u64(6), false)
        .unwrap();
    assert_eq!(toys.internal().ncols(), 2);
    assert_eq!(toys.physics().ncols(), 3);
    for row in toys.physics().rows() {
        assert_relative_eq!(row.sum(), 1.0, epsilon = 1e-12);
    }
}

#[test]
fn test_invalid_toy_aborts_study() {
    let ds = higgs_like_data_set();
    let mut fit = Fit::builder(&ds)
        .fit_step(FitStep::migrad(2))
        .run_fit(false)
        .build()
        .unwrap();
    let result = fit.fill_toys(3, &mut ChaCha8Rng::seed_from_u64(7), false);
    assert!(matches!(result, Err(AllDecaysError::Fit(FitError::InvalidFit(_)))));
    assert!(fit.toys().is_none());
}

#[test]
fn test_invalid_toys_are_kept_without_raising() {
    let ds = higgs_like_data_set();
    let mut fit = Fit::builder(&ds)
        .fit_step(FitStep::migrad(2))
        .raise_invalid_fit(false)
        .build()
        .unwrap();
    let toys = fit
        .fill_toys(3, &mut ChaCha8Rng::seed_from_u64(8), false)
        .unwrap();
    assert_eq!(toys.n_invalid(), 3);
    assert_eq!(toys.n_inaccurate(), 3);
}

/// About half an expected event in `b3`, so most toys leave it empty.
fn sparse_box_data_set() -> SingleDataSet {
    let table = ChannelTable::new(
        names(&["A", "B", "bkg"]),
        names(&["b1", "b2", "b3"]),
        vec![60.0, 40.0, 50.0],
        vec![0, 0, 500],
        vec![vec![800, 199, 1], vec![100, 899, 1], vec![250, 249, 1]],
    )
    .unwrap();
    let mut ds = SingleDataSet::new(names(&["A", "B"]))
        .with_channel_options(full_stats())
        .with_luminosity(4.0);
    ds.add_channel("sparse", ChannelSource::Unpolarized(table))
        .unwrap();
    ds
}

#[test]
fn test_empty_box_gaussian_toys_are_flagged_invalid() {
    let ds = sparse_box_data_set();
    let mut fit = Fit::builder(&ds)
        .fit_mode(FitMode::GaussianLeastSquares)
        .raise_invalid_fit(false)
        .build()
        .unwrap();
    assert!(fit.minimizer().valid());

    let toys = fit
        .fill_toys(20, &mut ChaCha8Rng::seed_from_u64(1), true)
        .unwrap();
    assert_eq!(toys.len(), 20);
    assert!(toys.n_invalid() > 0);
    for (i, counts) in toys.channel_counts().unwrap().iter().enumerate() {
        if counts[0].1[2] == 0.0 {
            assert!(!toys.valid()[i]);
            assert!(!toys.accurate()[i]);
        }
    }
}

#[test]
fn test_empty_box_gaussian_toy_raises_invalid_fit() {
    let ds = sparse_box_data_set();
    let mut fit = Fit::builder(&ds)
        .fit_mode(FitMode::GaussianLeastSquares)
        .run_fit(false)
        .build()
        .unwrap();
    let result = fit.fill_toys(20, &mut ChaCha8Rng::seed_from_u64(1), false);
    assert!(matches!(result, Err(AllDecaysError::Fit(FitError::InvalidFit(_)))));
}

#[test]
fn test_empty_box_is_harmless_for_poisson() {
    let ds = sparse_box_data_set();
    let mut fit = Fit::builder(&ds)
        .fit_mode(FitMode::Poisson)
        .raise_invalid_fit(false)
        .build()
        .unwrap();
    let toys = fit
        .fill_toys(20, &mut ChaCha8Rng::seed_from_u64(1), false)
        .unwrap();
    assert_eq!(toys.len(), 20);
    assert_eq!(toys.n_invalid(), 0);
}

#[cfg(feature = "parallel")]
#[test]
fn test_parallel_toys_are_reproducible() {
    let ds = higgs_like_data_set();
    let mut first = Fit::new(&ds).unwrap();
    let mut second = Fit::new(&ds).unwrap();
    let a = first.fill_toys_parallel(8, 42, true).unwrap().clone();
    let b = second.fill_toys_parallel(8, 42, true).unwrap();
    assert_eq!(&a, b);
    assert_eq!(a.len(), 8);
    assert_eq!(a.n_invalid(), 0);

    let other = first.fill_toys_parallel(8, 43, false).unwrap();
    assert_ne!(other.physics(), a.physics());
}
