//! # alldecays-rs
//!
//! `alldecays-rs` estimates the branching ratios of a particle decay from
//! binned event counts in several detection channels, and studies the
//! estimator on multinomial toys.
//!
//! The library provides:
//! - Channels built from MC tables, with independent MC halves for the
//!   likelihood and the expected data, and optional beam polarization
//! - Single and combined data sets sharing decay names and branching ratios
//! - A linear forward model from branching ratios to expected box counts
//! - Gaussian least squares, binomial least squares and Poisson cost functions
//! - A bounded Levenberg-Marquardt minimizer with a HESSE covariance estimate
//! - Sequential and parallel toy studies with diagnostics
//!
//! ## Basic Usage
//!
//! ```no_run
//! use alldecays_rs::data::{ChannelSource, ChannelTable, SingleDataSet};
//! use alldecays_rs::fitting::{Fit, FitMode};
//! use rand::SeedableRng;
//!
//! let decays = vec!["H→bb".to_string(), "H→WW".to_string(), "H→other".to_string()];
//! let mut data_set = SingleDataSet::new(decays).with_luminosity(2_000.0);
//! let table = ChannelTable::from_json_file("tau_channel.json")?;
//! data_set.add_channel("tau", ChannelSource::Unpolarized(table))?;
//!
//! let mut fit = Fit::builder(&data_set)
//!     .fit_mode(FitMode::BinomialLeastSquares)
//!     .has_limits(true)
//!     .build()?;
//! println!("{fit}");
//!
//! let mut rng = rand::rngs::StdRng::seed_from_u64(42);
//! let toys = fit.fill_toys(100, &mut rng, false)?;
//! println!("{} of {} toys accurate", toys.len() - toys.n_inaccurate(), toys.len());
//! # Ok::<(), alldecays_rs::AllDecaysError>(())
//! ```

pub mod data;
pub mod error;
pub mod fitting;
pub mod minimizer;
pub mod model;
pub mod problem;
pub mod utils;

// Re-exports for convenience
pub use data::{Channel, ChannelSource, ChannelTable, CombinedDataSet, DataSet, SingleDataSet};
pub use error::{AllDecaysError, DataError, FitError, Result};
pub use fitting::{Fit, FitMode, FitResult, FitStep, ToyValues};
pub use minimizer::Minimizer;
pub use model::ForwardModel;
pub use problem::Problem;

/// Version of the library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
