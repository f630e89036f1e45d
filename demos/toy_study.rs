//! Fit a two-channel Higgs-like data set in every fit mode and compare the
//! HESSE errors with the spread of a toy study.
//!
//! Run with `cargo run --example toy_study`. Set `RUST_LOG=debug` for the
//! minimizer details.

use alldecays_rs::data::{ChannelSource, ChannelTable, DataSet, SingleDataSet};
use alldecays_rs::fitting::{channel_toy_ratios, Fit, FitMode, FitParameters, ParamSpace, ToyConfig};
use ndarray::array;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing_subscriber::EnvFilter;

fn names(v: &[&str]) -> Vec<String> {
    v.iter().map(|s| s.to_string()).collect()
}

fn channel(signal_cs: f64, bkg: &[(&str, f64)], counts: Vec<Vec<u64>>) -> alldecays_rs::Result<ChannelTable> {
    let mut processes = names(&["H→bb", "H→cc", "H→gg"]);
    let mut cross_sections = vec![signal_cs; 3];
    for (name, cs) in bkg {
        processes.push(name.to_string());
        cross_sections.push(*cs);
    }
    let unselected = vec![2_000; processes.len()];
    ChannelTable::new(
        processes,
        names(&["b-like", "c-like", "g-like"]),
        cross_sections,
        unselected,
        counts,
    )
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    println!("Branching ratio toy study");
    println!("=========================\n");

    let hadronic = channel(
        120.0,
        &[("qq", 300.0), ("WW", 150.0)],
        vec![
            vec![7_000, 1_200, 800],
            vec![900, 6_400, 1_500],
            vec![700, 1_300, 6_500],
            vec![400, 600, 1_000],
            vec![1_000, 1_500, 1_500],
        ],
    )?;
    let leptonic = channel(
        40.0,
        &[("ZZ", 80.0)],
        vec![
            vec![6_000, 1_200, 800],
            vec![1_000, 5_500, 1_000],
            vec![600, 900, 5_500],
            vec![1_000, 1_000, 1_000],
        ],
    )?;

    let mut ds = SingleDataSet::new(names(&["H→bb", "H→cc", "H→gg"]))
        .with_data_brs(array![0.58, 0.03, 0.39])?
        .with_luminosity(2_000.0);
    ds.add_channels([
        ("hadronic", ChannelSource::Unpolarized(hadronic)),
        ("leptonic", ChannelSource::Unpolarized(leptonic)),
    ])?;
    println!("{ds}");

    for mode in [FitMode::GaussianLeastSquares, FitMode::BinomialLeastSquares, FitMode::Poisson] {
        let mut fit = Fit::builder(&ds)
            .fit_mode(mode)
            .has_limits(true)
            .print_brs_sum_not_1(false)
            .build()?;
        println!("{fit}");

        let config = ToyConfig::default()
            .with_n_toys(200)
            .with_store_channel_counts(true)
            .with_progress_interval(50);
        let mut rng = StdRng::seed_from_u64(42);
        fit.fill_toys_with(&config, &mut rng)?;

        let from_fit = FitParameters::from_fit(&fit, ParamSpace::Physics)?;
        let from_toys = FitParameters::from_toys(&fit, ParamSpace::Physics)?;
        println!("{:<10} {:>10} {:>10} {:>10}", "decay", "truth", "HESSE", "toy σ");
        for (i, name) in from_fit.names.iter().enumerate() {
            println!(
                "{:<10} {:>10.4} {:>10.4} {:>10.4}",
                name,
                ds.data_brs()[i],
                from_fit.errors[i],
                from_toys.errors[i]
            );
        }

        let ratios = channel_toy_ratios(&fit, "hadronic")?;
        println!(
            "hadronic: {} of {} toys inaccurate\n",
            ratios.n_inaccurate(),
            ratios.accurate.len()
        );
    }

    Ok(())
}
