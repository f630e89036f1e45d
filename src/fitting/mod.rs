//! Fits of a data set and toy studies.
//!
//! [`Fit`] runs one of the cost functions of [`FitMode`] on the expected
//! counts of a data set. [`Fit::fill_toys`] repeats the fit on multinomial
//! toys to study bias, spread and fit failures.

pub mod diagnostics;
pub mod fit;
pub mod plugins;
pub mod summary;
pub mod toys;

pub use diagnostics::{channel_toy_ratios, valid_toy_values, ChannelToyRatios};
pub use fit::{Fit, FitBuilder, FitResult, FitStep};
pub use plugins::{FitMode, FitPlugin, LeastSquares, Noise, PluginFactory, Poisson};
pub use summary::{mean_and_covariance, FitParameters, ParamSpace};
pub use toys::{ChannelCounts, ToyConfig, ToyValues};
