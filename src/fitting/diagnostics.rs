//! Views on a toy study that help find why some toy fits fail.

use ndarray::{Array1, Array2};

use crate::error::{DataError, FitError, Result};

use super::fit::Fit;
use super::toys::ToyValues;

/// The toy ensemble of `fit`, optionally requiring stored channel counts.
pub fn valid_toy_values<'f>(fit: &'f Fit<'_>, channel_counts_needed: bool) -> Result<&'f ToyValues> {
    let toys = fit.toys().ok_or(FitError::NoToys)?;
    if channel_counts_needed && toys.channel_counts().is_none() {
        return Err(FitError::ChannelCountsNotStored.into());
    }
    Ok(toys)
}

/// Toy counts of one channel relative to its expected counts.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelToyRatios {
    pub channel: String,
    pub box_names: Vec<String>,
    pub expected: Array1<f64>,
    /// `toy / expected`, toys × boxes.
    pub ratios: Array2<f64>,
    /// Whether each toy fit had an accurate covariance.
    pub accurate: Vec<bool>,
}

impl ChannelToyRatios {
    pub fn n_inaccurate(&self) -> usize {
        self.accurate.iter().filter(|a| !**a).count()
    }

    /// Ratios of the toys with an inaccurate covariance only.
    pub fn inaccurate_ratios(&self) -> Array2<f64> {
        let rows: Vec<usize> = (0..self.accurate.len()).filter(|&i| !self.accurate[i]).collect();
        self.ratios.select(ndarray::Axis(0), &rows)
    }
}

/// Per-box `toy / expected` ratios of `channel` for every stored toy.
pub fn channel_toy_ratios(fit: &Fit<'_>, channel: &str) -> Result<ChannelToyRatios> {
    let toys = valid_toy_values(fit, true)?;
    let channels = fit.data_set().channels();
    let (_, ch) = channels
        .iter()
        .find(|(name, _)| name == channel)
        .ok_or_else(|| DataError::UnknownChannel(channel.to_string()))?;
    let expected = ch.expected_counts(None)?;

    let counts = toys.channel_counts().ok_or(FitError::ChannelCountsNotStored)?;
    let mut ratios = Array2::zeros((toys.len(), expected.len()));
    for (i, toy) in counts.iter().enumerate() {
        let (_, observed) = toy
            .iter()
            .find(|(name, _)| name == channel)
            .ok_or_else(|| DataError::UnknownChannel(channel.to_string()))?;
        ratios.row_mut(i).assign(&(observed / &expected));
    }
    Ok(ChannelToyRatios {
        channel: channel.to_string(),
        box_names: ch.box_names().to_vec(),
        expected,
        ratios,
        accurate: toys.accurate().to_vec(),
    })
}
