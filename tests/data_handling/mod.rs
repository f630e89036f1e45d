//! Channels, data sets and the expected-count model.

use alldecays_rs::data::{
    ChannelOptions, ChannelSource, ChannelTable, CombinedDataSet, DataSet, Polarization,
    PolarizationCase, SingleDataSet,
};
use alldecays_rs::{AllDecaysError, DataError};
use approx::assert_relative_eq;
use ndarray::{array, Array1};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::common::{
    assert_luminosity, full_stats, higgs_like_data_set, names, polarized_data_set, polarized_source,
    reference_data_set, reference_table, HIGGS_DECAYS,
};

fn random_brs<R: Rng>(rng: &mut R, n: usize) -> Array1<f64> {
    let raw: Array1<f64> = (0..n).map(|_| rng.gen::<f64>()).collect();
    let sum = raw.sum();
    raw / sum
}

#[test]
fn test_expected_counts_of_reference_channel() {
    let ds = reference_data_set();
    let (_, ch) = &ds.channels()[0];

    // 1000 fb⁻¹ · (0.5 · 100 fb · (0.8, 0.2) + 0.5 · 100 fb · (0.1, 0.9) + 50 fb · (0.25, 0.25))
    let expected = ch.expected_counts(None).unwrap();
    assert_relative_eq!(expected[0], 57_500.0, epsilon = 1e-6);
    assert_relative_eq!(expected[1], 67_500.0, epsilon = 1e-6);

    let shifted = ch.expected_counts(Some(&array![0.2, 0.8])).unwrap();
    assert_relative_eq!(shifted[0], 100_000.0 * (0.2 * 0.8 + 0.8 * 0.1) + 12_500.0, epsilon = 1e-6);
    assert_relative_eq!(shifted.sum(), 125_000.0, epsilon = 1e-6);
}

#[test]
fn test_expected_counts_are_non_negative_and_finite() {
    let ds = higgs_like_data_set();
    let mut rng = ChaCha8Rng::seed_from_u64(11);
    for _ in 0..50 {
        let brs = random_brs(&mut rng, HIGGS_DECAYS.len());
        for (_, ch) in ds.channels() {
            let counts = ch.expected_counts(Some(&brs)).unwrap();
            assert!(counts.iter().all(|c| c.is_finite() && *c >= 0.0));
        }
    }
}

#[test]
fn test_invalid_hypothesis_is_rejected_before_arithmetic() {
    let ds = higgs_like_data_set();
    let (_, ch) = &ds.channels()[0];
    for brs in [array![0.5, 0.5], array![0.5, 0.6, -0.1], array![0.2, 0.2, 0.2], array![f64::NAN, 0.5, 0.5]] {
        assert!(matches!(
            ch.expected_counts(Some(&brs)),
            Err(AllDecaysError::Data(DataError::InvalidHypothesis(_)))
        ));
    }
}

#[test]
fn test_toy_draws_are_reproducible_and_conserve_total() {
    let ds = higgs_like_data_set();
    let (_, ch) = &ds.channels()[1];
    let n = ch.expected_counts(None).unwrap().sum().floor() as u64;

    let a = ch.draw_toys(&mut ChaCha8Rng::seed_from_u64(5), 4, None).unwrap();
    let b = ch.draw_toys(&mut ChaCha8Rng::seed_from_u64(5), 4, None).unwrap();
    assert_eq!(a, b);
    assert!(a.rows().into_iter().all(|row| row.sum() == n));

    let single = ch.draw_toy(&mut ChaCha8Rng::seed_from_u64(6), None).unwrap();
    assert_eq!(single.sum(), n);
}

#[test]
fn test_mc_split_is_seeded() {
    let decays = names(&HIGGS_DECAYS);
    let build = |seed: u64| {
        let mut ds = SingleDataSet::new(decays.clone())
            .with_channel_options(ChannelOptions::default().with_split_seed(seed));
        let source = ChannelSource::Unpolarized(higgs_table());
        ds.add_channel("c", source).unwrap();
        ds.channel("c").unwrap().fit_matrix().clone()
    };
    assert_eq!(build(1), build(1));
    assert_ne!(build(1), build(2));
}

fn higgs_table() -> ChannelTable {
    ChannelTable::new(
        names(&["H→bb", "H→cc", "H→gg"]),
        names(&["x", "y"]),
        vec![1.0, 1.0, 1.0],
        vec![100, 100, 100],
        vec![vec![500, 400], vec![450, 450], vec![300, 600]],
    )
    .unwrap()
}

#[test]
fn test_rename_and_back_restores_matrices() {
    let mut ds = higgs_like_data_set();
    let before: Vec<_> = ds
        .channels()
        .iter()
        .map(|(_, ch)| (ch.fit_matrix().clone(), ch.data_matrix().clone()))
        .collect();

    ds.set_decay_names(names(&["bb", "cc", "gg"])).unwrap();
    ds.set_box_names("hadronic", &names(&["1", "2", "3"])).unwrap();
    ds.set_bkg_names("hadronic", &names(&["bkg1", "bkg2"])).unwrap();
    assert_eq!(ds.channel("leptonic").unwrap().decay_names(), &names(&["bb", "cc", "gg"])[..]);

    ds.set_decay_names(names(&HIGGS_DECAYS)).unwrap();
    ds.set_box_names("hadronic", &names(&["b-like", "c-like", "g-like"])).unwrap();
    ds.set_bkg_names("hadronic", &names(&["WW", "qq"])).unwrap();

    let after: Vec<_> = ds
        .channels()
        .iter()
        .map(|(_, ch)| (ch.fit_matrix().clone(), ch.data_matrix().clone()))
        .collect();
    assert_eq!(before, after);
}

#[test]
fn test_rename_length_mismatch() {
    let mut ds = higgs_like_data_set();
    assert!(matches!(
        ds.set_decay_names(names(&["bb"])),
        Err(AllDecaysError::Data(DataError::NameLengthMismatch { .. }))
    ));
    assert!(ds.set_box_names("nope", &names(&["1", "2", "3"])).is_err());
}

#[test]
fn test_table_from_json() {
    let json = r#"{
        "processes": ["A", "B", "bkg"],
        "box_names": ["b1", "b2"],
        "cross_sections": [60.0, 40.0, 50.0],
        "unselected": [0, 0, 50],
        "counts": [[80, 20], [10, 90], [25, 25]]
    }"#;
    assert_eq!(ChannelTable::from_json_str(json).unwrap(), reference_table());

    let bad = json.replace("[25, 25]", "[25]");
    assert!(matches!(
        ChannelTable::from_json_str(&bad),
        Err(AllDecaysError::Data(DataError::Table(_)))
    ));
    assert!(matches!(
        ChannelTable::from_json_str("{"),
        Err(AllDecaysError::JsonError(_))
    ));
    assert!(ChannelTable::from_json_file("does/not/exist.json").is_err());
}

#[test]
fn test_missing_decay_in_table() {
    let mut ds = SingleDataSet::new(names(&["A", "C"]));
    assert!(matches!(
        ds.add_channel("c1", ChannelSource::Unpolarized(reference_table())),
        Err(AllDecaysError::Data(DataError::Table(_)))
    ));
}

#[test]
fn test_polarization_blending() {
    let pol = Polarization::new(-0.8, 0.3).unwrap();
    let factors = [1.0, 2.0, 0.5, 1.5];
    let ds = polarized_data_set(pol, factors);
    let ch = ds.channel("pol").unwrap();

    let weights: Vec<f64> = PolarizationCase::ALL.iter().map(|&c| pol.weight(c)).collect();
    let sig: f64 = weights.iter().zip(factors).map(|(w, f)| w * f * 100.0).sum();
    let bkg: f64 = weights[..3].iter().zip(factors).map(|(w, f)| w * f * 50.0).sum();
    assert_relative_eq!(ch.signal_cs_default(), sig, epsilon = 1e-9);
    assert_relative_eq!(ch.bkg_cs_default()[0], bkg, epsilon = 1e-9);

    // The matrices are the same in every helicity combination where a process exists.
    let column = ch.fit_matrix().column("bkg").unwrap();
    assert_relative_eq!(column[0], 0.25, epsilon = 1e-12);

    let expected = ch.expected_counts(None).unwrap();
    assert_relative_eq!(expected[0], 1000.0 * (sig * 0.45 + bkg * 0.25), epsilon = 1e-6);
}

#[test]
fn test_polarization_change_refreshes_channel() {
    let factors = [1.0, 2.0, 0.5, 1.5];
    let mut ds = polarized_data_set(Polarization::new(-0.8, 0.3).unwrap(), factors);
    let before = ds.channel("pol").unwrap().signal_cs_default();

    // Fully right-handed beams only see eRpR.
    ds.set_polarization(Some(Polarization::new(1.0, 1.0).unwrap())).unwrap();
    let ch = ds.channel("pol").unwrap();
    assert_relative_eq!(ch.signal_cs_default(), 150.0, epsilon = 1e-9);
    assert_relative_eq!(ch.bkg_cs_default()[0], 0.0);
    assert!(before != ch.signal_cs_default());

    assert!(matches!(
        ds.set_polarization(None),
        Err(AllDecaysError::Data(DataError::Polarization(_)))
    ));
}

#[test]
fn test_polarized_source_needs_all_cases() {
    let ChannelSource::Polarized(mut tables) = polarized_source([1.0; 4]) else {
        unreachable!()
    };
    tables.remove(&PolarizationCase::ELpL);
    let mut ds = SingleDataSet::new(names(&["A", "B"]))
        .with_polarization(Polarization::new(0.0, 0.0).unwrap())
        .unwrap();
    assert!(ds.add_channel("pol", ChannelSource::Polarized(tables)).is_err());
}

#[test]
fn test_drop_background() {
    let mut ds = reference_data_set();
    ds.drop_bkg("c1", &names(&["bkg"])).unwrap();
    let (_, ch) = &ds.channels()[0];
    assert!(ch.bkg_names().is_empty());
    assert_relative_eq!(ch.expected_counts(None).unwrap().sum(), 100_000.0, epsilon = 1e-6);
    assert!(matches!(
        ds.drop_bkg("c1", &names(&["bkg"])),
        Err(AllDecaysError::Data(DataError::UnknownBackground(_)))
    ));
}

#[test]
fn test_luminosity_and_scaler_propagate() {
    let mut ds = higgs_like_data_set();
    ds.set_luminosity(3_000.0);
    assert_luminosity(&ds, 3_000.0);

    let before = ds.channel("hadronic").unwrap().expected_counts(None).unwrap();
    ds.set_signal_scaler(2.0);
    let after = ds.channel("hadronic").unwrap().expected_counts(None).unwrap();
    assert!(after.iter().zip(before.iter()).all(|(a, b)| a > b));
}

#[test]
fn test_combined_data_set() {
    let first: Box<dyn DataSet> = Box::new(reference_data_set());
    let second: Box<dyn DataSet> = Box::new(reference_data_set().with_luminosity(500.0));
    let mut combined = CombinedDataSet::new(names(&["A", "B"]))
        .with_data_sets([("full", first), ("half", second)])
        .unwrap();

    let channel_names: Vec<String> = combined.channels().into_iter().map(|(n, _)| n).collect();
    assert_eq!(channel_names, names(&["full:c1", "half:c1"]));
    assert_eq!(combined.luminosity(), None);

    combined.set_luminosity(2_000.0);
    assert_eq!(combined.luminosity(), Some(2_000.0));
    assert_luminosity(&combined, 2_000.0);

    let other: Box<dyn DataSet> = Box::new(
        SingleDataSet::new(names(&["A", "B"]))
            .with_channel_options(full_stats())
            .with_fit_start_brs(array![0.9, 0.1])
            .unwrap(),
    );
    assert!(matches!(
        combined.add_data_sets([("other", other)]),
        Err(AllDecaysError::Data(DataError::IncompatibleDataSet { .. }))
    ));
}
