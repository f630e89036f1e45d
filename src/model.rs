//! Forward model of a whole data set.
//!
//! [`ForwardModel`] stacks the channels of a data set into one linear
//! model `predicted = D · [x, 1]`, where `x` are the branching ratios and the
//! last column carries the summed background. Each channel contributes a
//! block of rows `lumi · [P_sig · σ_sig · scale | Σ_b P_b · σ_b]` built from
//! its fit matrix, together with the observed counts of that channel.

use std::ops::Range;

use ndarray::{s, Array1, Array2};
use rand::Rng;

use crate::data::{Channel, DataSet, ProbabilityMatrix};
use crate::error::{AllDecaysError, DataError, Result};

/// The rows of one channel inside a [`ForwardModel`].
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelBlock {
    pub name: String,
    pub box_names: Vec<String>,
    /// Row range in the stacked design matrix and count vectors.
    pub rows: Range<usize>,
}

/// Linear expected-count model plus the counts it is compared to.
#[derive(Debug, Clone, PartialEq)]
pub struct ForwardModel {
    decay_names: Vec<String>,
    blocks: Vec<ChannelBlock>,
    design: Array2<f64>,
    observed: Array1<f64>,
}

impl ForwardModel {
    /// Stack all channels of `data_set` with one observed count vector per channel.
    ///
    /// Channels are checked for consistency with the data set before any
    /// block is built.
    pub fn build(data_set: &dyn DataSet, observed: Vec<Array1<f64>>) -> Result<Self> {
        let channels = data_set.channels();
        if observed.len() != channels.len() {
            return Err(AllDecaysError::DimensionMismatch(format!(
                "{} channels but {} observed count vectors",
                channels.len(),
                observed.len()
            )));
        }

        let decay_names = data_set.decay_names().to_vec();
        let n_params = decay_names.len();
        let n_rows: usize = channels.iter().map(|(_, ch)| ch.box_names().len()).sum();

        let mut design = Array2::zeros((n_rows, n_params + 1));
        let mut stacked = Array1::zeros(n_rows);
        let mut blocks = Vec::with_capacity(channels.len());
        let mut start = 0;
        for ((name, channel), counts) in channels.iter().zip(observed) {
            check_consistency(name, channel, &decay_names)?;
            let n_boxes = channel.box_names().len();
            if counts.len() != n_boxes {
                return Err(inconsistent(
                    name,
                    format!("{} observed counts for {n_boxes} boxes", counts.len()),
                ));
            }
            let rows = start..start + n_boxes;
            design
                .slice_mut(s![rows.clone(), ..])
                .assign(&design_block(channel, &decay_names)?);
            stacked.slice_mut(s![rows.clone()]).assign(&counts);
            blocks.push(ChannelBlock {
                name: name.clone(),
                box_names: channel.box_names().to_vec(),
                rows: rows.clone(),
            });
            start = rows.end;
        }

        Ok(Self {
            decay_names,
            blocks,
            design,
            observed: stacked,
        })
    }

    /// Model of the expected counts at the data BRs of `data_set`.
    pub fn expected(data_set: &dyn DataSet) -> Result<Self> {
        Self::build(data_set, expected_counts(data_set)?)
    }

    /// Model of one multinomial toy per channel.
    pub fn toy<R: Rng + ?Sized>(data_set: &dyn DataSet, rng: &mut R) -> Result<Self> {
        Self::build(data_set, toy_counts(data_set, rng)?)
    }

    /// Predicted counts of all boxes for the BRs `x`.
    pub fn predict(&self, x: &Array1<f64>) -> Result<Array1<f64>> {
        let n = self.decay_names.len();
        if x.len() != n {
            return Err(AllDecaysError::DimensionMismatch(format!(
                "Expected {n} branching ratios, got {}",
                x.len()
            )));
        }
        let extended: Array1<f64> = x.iter().copied().chain(std::iter::once(1.0)).collect();
        Ok(self.design.dot(&extended))
    }

    pub fn decay_names(&self) -> &[String] {
        &self.decay_names
    }

    pub fn n_params(&self) -> usize {
        self.decay_names.len()
    }

    pub fn n_boxes(&self) -> usize {
        self.observed.len()
    }

    pub fn blocks(&self) -> &[ChannelBlock] {
        &self.blocks
    }

    /// Stacked design matrix, boxes × (decays + 1).
    pub fn design(&self) -> &Array2<f64> {
        &self.design
    }

    /// Stacked observed counts.
    pub fn observed(&self) -> &Array1<f64> {
        &self.observed
    }

    /// Observed counts of each channel, in channel order.
    pub fn channel_counts(&self) -> Vec<(String, Array1<f64>)> {
        self.blocks
            .iter()
            .map(|b| (b.name.clone(), self.observed.slice(s![b.rows.clone()]).to_owned()))
            .collect()
    }
}

/// Expected counts of every channel at its data BRs.
pub fn expected_counts(data_set: &dyn DataSet) -> Result<Vec<Array1<f64>>> {
    data_set
        .channels()
        .into_iter()
        .map(|(_, ch)| ch.expected_counts(None))
        .collect()
}

/// One multinomial toy per channel, drawn in channel order from `rng`.
pub fn toy_counts<R: Rng + ?Sized>(data_set: &dyn DataSet, rng: &mut R) -> Result<Vec<Array1<f64>>> {
    data_set
        .channels()
        .into_iter()
        .map(|(_, ch)| ch.draw_toy(rng, None).map(|t| t.mapv(|c| c as f64)))
        .collect()
}

fn design_block(channel: &Channel, decay_names: &[String]) -> Result<Array2<f64>> {
    let fit_matrix = channel.fit_matrix();
    let lumi = channel.luminosity();
    let signal_factor = channel.signal_cs_default() * channel.signal_scaler() * lumi;

    let mut block = Array2::zeros((channel.box_names().len(), decay_names.len() + 1));
    block
        .slice_mut(s![.., ..decay_names.len()])
        .assign(&(fit_matrix.select(decay_names)? * signal_factor));
    let bkg = fit_matrix.weighted_sum(&channel.bkg_names(), channel.bkg_cs_default())? * lumi;
    block.column_mut(decay_names.len()).assign(&bkg);
    Ok(block)
}

fn check_consistency(name: &str, channel: &Channel, decay_names: &[String]) -> Result<()> {
    if channel.decay_names() != decay_names {
        return Err(inconsistent(
            name,
            format!(
                "decay names {:?} differ from the data set's {:?}",
                channel.decay_names(),
                decay_names
            ),
        ));
    }
    let bkg_names = channel.bkg_names();
    if bkg_names.len() != channel.bkg_cs_default().len() {
        return Err(inconsistent(
            name,
            format!(
                "{} background processes but {} background cross sections",
                bkg_names.len(),
                channel.bkg_cs_default().len()
            ),
        ));
    }
    let columns: Vec<String> = decay_names.iter().cloned().chain(bkg_names).collect();
    for matrix in [channel.fit_matrix(), channel.data_matrix()] {
        check_process_columns(name, matrix, &columns)?;
    }
    if channel.data_matrix().box_names() != channel.box_names() {
        return Err(inconsistent(name, "fit and data matrices have different boxes".to_string()));
    }
    Ok(())
}

/// Matrix columns must be the signal decays, in order, followed by the backgrounds.
fn check_process_columns(name: &str, matrix: &ProbabilityMatrix, columns: &[String]) -> Result<()> {
    if matrix.process_names() != columns {
        return Err(inconsistent(
            name,
            format!(
                "matrix processes {:?} differ from the expected columns {:?}",
                matrix.process_names(),
                columns
            ),
        ));
    }
    Ok(())
}

fn inconsistent(channel: &str, reason: String) -> AllDecaysError {
    DataError::InconsistentChannel {
        channel: channel.to_string(),
        reason,
    }
    .into()
}
