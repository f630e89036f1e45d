//! A detection channel: one or four pure inputs, blended for the current
//! polarization, plus the expected-count forward model of that channel.
//!
//! Quantities shared with the owning data set live in [`ChannelSettings`].
//! Derived matrices and cross sections are recomputed by
//! [`Channel::refresh`], which every setter that changes them calls.

use std::collections::{BTreeMap, BTreeSet};

use ndarray::{Array1, Array2};
use rand::Rng;

use crate::error::{DataError, Result};
use crate::utils::sampling::{multinomial, trials_from_expected};

use super::matrix::ProbabilityMatrix;
use super::polarization::{blend_matrices, Polarization, PolarizationCase};
use super::pure_channel::{ChannelOptions, PureChannel};
use super::table::ChannelTable;

/// Tolerance on `Σ BR = 1` for an explicit hypothesis.
pub const BR_SUM_TOLERANCE: f64 = 1e-9;

/// Default luminosity, fb⁻¹.
pub const DEFAULT_LUMINOSITY: f64 = 1_000.0;

/// Where the MC counts of a channel come from.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelSource {
    /// A single table, used without polarization.
    Unpolarized(ChannelTable),
    /// One table per pure helicity combination. All four are required.
    Polarized(BTreeMap<PolarizationCase, ChannelTable>),
}

/// State a data set shares with all of its channels.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelSettings {
    pub decay_names: Vec<String>,
    /// BR vector used to generate the expected data.
    pub data_brs: Array1<f64>,
    /// Integrated luminosity, fb⁻¹.
    pub luminosity: f64,
    /// Factor applied to the signal cross section.
    pub signal_scaler: f64,
    pub polarization: Option<Polarization>,
}

impl ChannelSettings {
    /// Flat BRs, 1000 fb⁻¹, unscaled signal, no polarization.
    pub fn new(decay_names: Vec<String>) -> Self {
        let n = decay_names.len();
        let data_brs = if n == 0 {
            Array1::zeros(0)
        } else {
            Array1::from_elem(n, 1.0 / n as f64)
        };
        Self {
            decay_names,
            data_brs,
            luminosity: DEFAULT_LUMINOSITY,
            signal_scaler: 1.0,
            polarization: None,
        }
    }
}

/// One channel of a data set.
#[derive(Debug, Clone)]
pub struct Channel {
    settings: ChannelSettings,
    pure: Vec<(Option<PolarizationCase>, PureChannel)>,
    signal_cs_default: f64,
    bkg_cs_default: Array1<f64>,
    fit_matrix: ProbabilityMatrix,
    data_matrix: ProbabilityMatrix,
}

impl Channel {
    /// Build a channel from its MC source.
    ///
    /// The polarization of `settings` must match the kind of source.
    pub fn new(source: ChannelSource, settings: ChannelSettings, options: &ChannelOptions) -> Result<Self> {
        let decay_names = &settings.decay_names;
        let pure = match (&source, settings.polarization) {
            (ChannelSource::Unpolarized(table), None) => {
                vec![(None, PureChannel::from_table(table, decay_names, options, false)?)]
            }
            (ChannelSource::Polarized(tables), Some(_)) => {
                let missing: Vec<&str> = PolarizationCase::ALL
                    .iter()
                    .filter(|c| !tables.contains_key(c))
                    .map(|c| c.name())
                    .collect();
                if !missing.is_empty() {
                    return Err(DataError::Polarization(format!(
                        "missing pure polarization inputs {missing:?}"
                    ))
                    .into());
                }
                PolarizationCase::ALL
                    .iter()
                    .map(|&case| {
                        let pc = PureChannel::from_table(&tables[&case], decay_names, options, true)?;
                        Ok((Some(case), pc))
                    })
                    .collect::<Result<Vec<_>>>()?
            }
            (ChannelSource::Unpolarized(_), Some(pol)) => {
                return Err(DataError::Polarization(format!(
                    "an unpolarized channel cannot be used with polarization {pol}"
                ))
                .into())
            }
            (ChannelSource::Polarized(_), None) => {
                return Err(DataError::Polarization(
                    "a polarized channel needs a polarization".to_string(),
                )
                .into())
            }
        };
        check_brs(&settings.data_brs, settings.decay_names.len())?;

        let (_, first) = &pure[0];
        let mut channel = Self {
            signal_cs_default: first.signal_cs_default,
            bkg_cs_default: first.bkg_cs_default.clone(),
            fit_matrix: first.fit_matrix.clone(),
            data_matrix: first.data_matrix.clone(),
            settings,
            pure,
        };
        channel.refresh()?;
        Ok(channel)
    }

    /// Recompute the blended matrices and cross sections from the pure inputs.
    pub fn refresh(&mut self) -> Result<()> {
        let Some(pol) = self.settings.polarization else {
            let (_, pc) = &self.pure[0];
            self.signal_cs_default = pc.signal_cs_default;
            self.bkg_cs_default = pc.bkg_cs_default.clone();
            self.fit_matrix = pc.fit_matrix.clone();
            self.data_matrix = pc.data_matrix.clone();
            return Ok(());
        };

        let weighted: Vec<(f64, &PureChannel)> = self
            .pure
            .iter()
            .map(|(case, pc)| (case.map(|c| pol.weight(c)).unwrap_or(1.0), pc))
            .collect();

        let bkg_names: Vec<String> = weighted
            .iter()
            .flat_map(|(_, pc)| pc.bkg_names())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let process_names: Vec<String> =
            self.settings.decay_names.iter().cloned().chain(bkg_names.iter().cloned()).collect();

        let fit_inputs: Vec<(f64, &ProbabilityMatrix)> =
            weighted.iter().map(|(w, pc)| (*w, &pc.fit_matrix)).collect();
        let data_inputs: Vec<(f64, &ProbabilityMatrix)> =
            weighted.iter().map(|(w, pc)| (*w, &pc.data_matrix)).collect();

        let mut bkg_cs = Array1::zeros(bkg_names.len());
        for (w, pc) in &weighted {
            for (name, cs) in pc.bkg_names().iter().zip(pc.bkg_cs_default.iter()) {
                if let Some(i) = bkg_names.iter().position(|b| b == name) {
                    bkg_cs[i] += w * cs;
                }
            }
        }

        self.fit_matrix = blend_matrices(&process_names, &fit_inputs)?;
        self.data_matrix = blend_matrices(&process_names, &data_inputs)?;
        self.signal_cs_default = weighted.iter().map(|(w, pc)| w * pc.signal_cs_default).sum();
        self.bkg_cs_default = bkg_cs;
        Ok(())
    }

    pub fn settings(&self) -> &ChannelSettings {
        &self.settings
    }

    pub fn decay_names(&self) -> &[String] {
        &self.settings.decay_names
    }

    pub fn bkg_names(&self) -> Vec<String> {
        self.fit_matrix
            .process_names()
            .iter()
            .filter(|p| !self.settings.decay_names.contains(p))
            .cloned()
            .collect()
    }

    pub fn box_names(&self) -> &[String] {
        self.fit_matrix.box_names()
    }

    /// Sum of the signal cross sections, fb.
    pub fn signal_cs_default(&self) -> f64 {
        self.signal_cs_default
    }

    /// Cross section per background, fb, in the order of [`Channel::bkg_names`].
    pub fn bkg_cs_default(&self) -> &Array1<f64> {
        &self.bkg_cs_default
    }

    /// Matrix used in the likelihood.
    pub fn fit_matrix(&self) -> &ProbabilityMatrix {
        &self.fit_matrix
    }

    /// Matrix used to generate expected and toy counts.
    pub fn data_matrix(&self) -> &ProbabilityMatrix {
        &self.data_matrix
    }

    pub fn data_brs(&self) -> &Array1<f64> {
        &self.settings.data_brs
    }

    pub fn luminosity(&self) -> f64 {
        self.settings.luminosity
    }

    pub fn signal_scaler(&self) -> f64 {
        self.settings.signal_scaler
    }

    pub fn polarization(&self) -> Option<Polarization> {
        self.settings.polarization
    }

    pub fn is_polarized(&self) -> bool {
        self.pure[0].0.is_some()
    }

    /// Rename the signal processes in every matrix.
    pub fn set_decay_names(&mut self, new_names: &[String]) -> Result<()> {
        let old = self.settings.decay_names.clone();
        check_name_count("decay names", old.len(), new_names.len())?;
        let mut pure = self.pure.clone();
        for (_, pc) in pure.iter_mut() {
            pc.set_decay_names(new_names)?;
        }
        self.rename_derived(|m| m.rename_processes(&old, new_names))?;
        self.pure = pure;
        self.settings.decay_names = new_names.to_vec();
        Ok(())
    }

    /// Rename the backgrounds, in the order of [`Channel::bkg_names`].
    pub fn set_bkg_names(&mut self, new_names: &[String]) -> Result<()> {
        let old = self.bkg_names();
        check_name_count("background names", old.len(), new_names.len())?;
        let mut pure = self.pure.clone();
        for (_, pc) in pure.iter_mut() {
            pc.rename_processes(&old, new_names)?;
        }
        self.rename_derived(|m| m.rename_processes(&old, new_names))?;
        self.pure = pure;
        Ok(())
    }

    pub fn set_box_names(&mut self, new_names: &[String]) -> Result<()> {
        let old = self.box_names().to_vec();
        check_name_count("box names", old.len(), new_names.len())?;
        let mut pure = self.pure.clone();
        for (_, pc) in pure.iter_mut() {
            pc.rename_boxes(&old, new_names)?;
        }
        self.rename_derived(|m| m.rename_boxes(&old, new_names))?;
        self.pure = pure;
        Ok(())
    }

    /// Apply `f` to copies of both derived matrices and commit only if both succeed.
    fn rename_derived<F>(&mut self, f: F) -> Result<()>
    where
        F: Fn(&mut ProbabilityMatrix) -> Result<()>,
    {
        let mut fit_matrix = self.fit_matrix.clone();
        let mut data_matrix = self.data_matrix.clone();
        f(&mut fit_matrix)?;
        f(&mut data_matrix)?;
        self.fit_matrix = fit_matrix;
        self.data_matrix = data_matrix;
        Ok(())
    }

    /// Remove background processes from every input.
    pub fn drop_bkg(&mut self, names: &[String]) -> Result<()> {
        let bkg = self.bkg_names();
        let missing: Vec<String> = names.iter().filter(|n| !bkg.contains(n)).cloned().collect();
        if !missing.is_empty() {
            return Err(DataError::UnknownBackground(missing).into());
        }
        for (_, pc) in self.pure.iter_mut() {
            pc.drop_bkg(names);
        }
        self.refresh()
    }

    /// Change the polarization. A channel cannot switch between polarized and unpolarized.
    pub fn set_polarization(&mut self, polarization: Option<Polarization>) -> Result<()> {
        match (self.is_polarized(), polarization) {
            (false, Some(pol)) => Err(DataError::Polarization(format!(
                "an unpolarized channel cannot be changed into a polarized one: {pol}"
            ))
            .into()),
            (true, None) => Err(DataError::Polarization(
                "a polarized channel cannot be changed into an unpolarized one".to_string(),
            )
            .into()),
            _ => {
                self.settings.polarization = polarization;
                self.refresh()
            }
        }
    }

    pub fn set_data_brs(&mut self, brs: Array1<f64>) -> Result<()> {
        check_brs(&brs, self.settings.decay_names.len())?;
        self.settings.data_brs = brs;
        Ok(())
    }

    pub fn set_luminosity(&mut self, luminosity: f64) {
        self.settings.luminosity = luminosity;
    }

    pub fn set_signal_scaler(&mut self, signal_scaler: f64) {
        self.settings.signal_scaler = signal_scaler;
    }

    /// Expected counts per box for the BR hypothesis `brs`, or for the data BRs.
    ///
    /// An explicit hypothesis must have one non-negative entry per decay and
    /// sum to one. Counts are generated with the data matrix.
    pub fn expected_counts(&self, brs: Option<&Array1<f64>>) -> Result<Array1<f64>> {
        let brs = match brs {
            Some(b) => {
                validate_hypothesis(b, self.settings.decay_names.len())?;
                b
            }
            None => &self.settings.data_brs,
        };
        let signal_cs = brs * (self.signal_cs_default * self.settings.signal_scaler);
        let process_counts: Array1<f64> = signal_cs
            .iter()
            .chain(self.bkg_cs_default.iter())
            .map(|cs| cs * self.settings.luminosity)
            .collect();
        Ok(self.data_matrix.values().dot(&process_counts))
    }

    /// One multinomial toy: `floor(Σ expected)` events over the boxes, with
    /// probabilities proportional to the expected counts.
    pub fn draw_toy<R: Rng + ?Sized>(&self, rng: &mut R, brs: Option<&Array1<f64>>) -> Result<Array1<u64>> {
        let expected = self.expected_counts(brs)?;
        let n = trials_from_expected(expected.sum())?;
        multinomial(rng, n, &expected)
    }

    /// `size` independent toys, one per row.
    pub fn draw_toys<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        size: usize,
        brs: Option<&Array1<f64>>,
    ) -> Result<Array2<u64>> {
        let expected = self.expected_counts(brs)?;
        let n = trials_from_expected(expected.sum())?;
        let mut toys = Array2::zeros((size, expected.len()));
        for mut row in toys.rows_mut() {
            row.assign(&multinomial(rng, n, &expected)?);
        }
        Ok(toys)
    }
}

fn check_name_count(what: &'static str, expected: usize, got: usize) -> Result<()> {
    if expected != got {
        return Err(DataError::NameLengthMismatch { what, expected, got }.into());
    }
    Ok(())
}

pub(crate) fn check_brs(brs: &Array1<f64>, n_decays: usize) -> Result<()> {
    if brs.len() != n_decays {
        return Err(DataError::BrLength {
            expected: n_decays,
            got: brs.len(),
        }
        .into());
    }
    Ok(())
}

/// Length, sign and normalization checks of a BR hypothesis.
pub fn validate_hypothesis(brs: &Array1<f64>, n_decays: usize) -> Result<()> {
    if brs.len() != n_decays {
        return Err(DataError::InvalidHypothesis(format!(
            "{brs} has {} entries, expected {n_decays}",
            brs.len()
        ))
        .into());
    }
    if brs.iter().any(|b| !b.is_finite() || *b < 0.0) {
        return Err(DataError::InvalidHypothesis(format!("{brs} has negative or non-finite entries")).into());
    }
    let sum = brs.sum();
    if (sum - 1.0).abs() > BR_SUM_TOLERANCE {
        return Err(DataError::InvalidHypothesis(format!("{brs} sums to {sum}, not 1")).into());
    }
    Ok(())
}
