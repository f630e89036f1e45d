//! Several data sets fitted together.

use std::collections::BTreeSet;
use std::fmt;

use ndarray::Array1;

use crate::error::{DataError, Result};

use super::channel::{check_brs, Channel, ChannelSettings};
use super::data_set::DataSet;

/// Named child data sets that share decay names, BRs and signal scale.
///
/// Channels are exposed as `"<child>:<channel>"`. Children may differ in
/// luminosity and polarization.
#[derive(Debug)]
pub struct CombinedDataSet {
    decay_names: Vec<String>,
    data_brs: Array1<f64>,
    fit_start_brs: Array1<f64>,
    signal_scaler: f64,
    data_sets: Vec<(String, Box<dyn DataSet>)>,
}

impl CombinedDataSet {
    /// An empty combination with flat BRs and unscaled signal.
    pub fn new(decay_names: Vec<String>) -> Self {
        let settings = ChannelSettings::new(decay_names);
        Self {
            fit_start_brs: settings.data_brs.clone(),
            data_brs: settings.data_brs,
            decay_names: settings.decay_names,
            signal_scaler: settings.signal_scaler,
            data_sets: Vec::new(),
        }
    }

    /// Set the data BRs, and the fit start BRs to the same values.
    pub fn with_data_brs(mut self, brs: Array1<f64>) -> Result<Self> {
        self.set_data_brs(brs.clone())?;
        self.fit_start_brs = brs;
        Ok(self)
    }

    pub fn with_fit_start_brs(mut self, brs: Array1<f64>) -> Result<Self> {
        self.set_fit_start_brs(brs)?;
        Ok(self)
    }

    pub fn with_signal_scaler(mut self, signal_scaler: f64) -> Self {
        self.set_signal_scaler(signal_scaler);
        self
    }

    pub fn with_data_sets<I, S>(mut self, data_sets: I) -> Result<Self>
    where
        I: IntoIterator<Item = (S, Box<dyn DataSet>)>,
        S: Into<String>,
    {
        self.add_data_sets(data_sets)?;
        Ok(self)
    }

    /// Add children after checking them against this combination.
    ///
    /// Either all children are added or none.
    pub fn add_data_sets<I, S>(&mut self, data_sets: I) -> Result<()>
    where
        I: IntoIterator<Item = (S, Box<dyn DataSet>)>,
        S: Into<String>,
    {
        let new: Vec<(String, Box<dyn DataSet>)> =
            data_sets.into_iter().map(|(n, ds)| (n.into(), ds)).collect();

        let mut prefixes: BTreeSet<&str> = self.data_sets.iter().map(|(n, _)| n.as_str()).collect();
        for (name, ds) in &new {
            if !prefixes.insert(name.as_str()) {
                return Err(incompatible(name, "a data set with this name is already combined"));
            }
            self.check_compatible(name, ds.as_ref())?;
        }

        let mut channel_names: BTreeSet<String> =
            self.channels().into_iter().map(|(n, _)| n).collect();
        for (name, ds) in &new {
            for (channel, _) in ds.channels() {
                let full = format!("{name}:{channel}");
                if !channel_names.insert(full.clone()) {
                    return Err(DataError::DuplicateChannel(full).into());
                }
            }
        }

        self.data_sets.extend(new);
        Ok(())
    }

    fn check_compatible(&self, name: &str, ds: &dyn DataSet) -> Result<()> {
        if ds.decay_names() != self.decay_names.as_slice() {
            return Err(incompatible(
                name,
                &format!("decay names {:?} != {:?}", ds.decay_names(), self.decay_names),
            ));
        }
        if ds.data_brs() != &self.data_brs {
            return Err(incompatible(
                name,
                &format!("data BRs {} != {}", ds.data_brs(), self.data_brs),
            ));
        }
        if ds.fit_start_brs() != &self.fit_start_brs {
            return Err(incompatible(
                name,
                &format!("fit start BRs {} != {}", ds.fit_start_brs(), self.fit_start_brs),
            ));
        }
        if ds.signal_scaler() != self.signal_scaler {
            return Err(incompatible(
                name,
                &format!("signal scaler {} != {}", ds.signal_scaler(), self.signal_scaler),
            ));
        }
        Ok(())
    }

    pub fn data_set_names(&self) -> Vec<&str> {
        self.data_sets.iter().map(|(n, _)| n.as_str()).collect()
    }

    pub fn data_set(&self, name: &str) -> Option<&dyn DataSet> {
        self.data_sets.iter().find(|(n, _)| n == name).map(|(_, ds)| ds.as_ref())
    }

    /// Mutable access to a child, for settings that are not shared.
    ///
    /// Changing a shared quantity on the child directly makes the
    /// combination inconsistent; use the combined setters instead.
    pub fn data_set_mut(&mut self, name: &str) -> Option<&mut (dyn DataSet + 'static)> {
        self.data_sets
            .iter_mut()
            .find(|(n, _)| n == name)
            .map(|(_, ds)| ds.as_mut())
    }
}

fn incompatible(name: &str, reason: &str) -> crate::error::AllDecaysError {
    DataError::IncompatibleDataSet {
        name: name.to_string(),
        reason: reason.to_string(),
    }
    .into()
}

impl DataSet for CombinedDataSet {
    fn channels(&self) -> Vec<(String, &Channel)> {
        self.data_sets
            .iter()
            .flat_map(|(prefix, ds)| {
                ds.channels()
                    .into_iter()
                    .map(move |(name, ch)| (format!("{prefix}:{name}"), ch))
            })
            .collect()
    }

    fn decay_names(&self) -> &[String] {
        &self.decay_names
    }

    fn set_decay_names(&mut self, names: Vec<String>) -> Result<()> {
        if names.len() != self.decay_names.len() {
            return Err(DataError::NameLengthMismatch {
                what: "decay names",
                expected: self.decay_names.len(),
                got: names.len(),
            }
            .into());
        }
        // Renaming is a bijection, so a failure part way can be undone.
        let old = self.decay_names.clone();
        for k in 0..self.data_sets.len() {
            if let Err(e) = self.data_sets[k].1.set_decay_names(names.clone()) {
                for (_, ds) in self.data_sets[..k].iter_mut() {
                    ds.set_decay_names(old.clone())?;
                }
                return Err(e);
            }
        }
        self.decay_names = names;
        Ok(())
    }

    fn data_brs(&self) -> &Array1<f64> {
        &self.data_brs
    }

    fn set_data_brs(&mut self, brs: Array1<f64>) -> Result<()> {
        check_brs(&brs, self.decay_names.len())?;
        for (_, ds) in self.data_sets.iter_mut() {
            ds.set_data_brs(brs.clone())?;
        }
        self.data_brs = brs;
        Ok(())
    }

    fn fit_start_brs(&self) -> &Array1<f64> {
        &self.fit_start_brs
    }

    fn set_fit_start_brs(&mut self, brs: Array1<f64>) -> Result<()> {
        check_brs(&brs, self.decay_names.len())?;
        for (_, ds) in self.data_sets.iter_mut() {
            ds.set_fit_start_brs(brs.clone())?;
        }
        self.fit_start_brs = brs;
        Ok(())
    }

    /// The common luminosity of all children, `None` if they differ or there are none.
    fn luminosity(&self) -> Option<f64> {
        let mut lumis = self.data_sets.iter().map(|(_, ds)| ds.luminosity());
        let first = lumis.next()??;
        lumis.all(|l| l == Some(first)).then_some(first)
    }

    fn set_luminosity(&mut self, luminosity: f64) {
        for (_, ds) in self.data_sets.iter_mut() {
            ds.set_luminosity(luminosity);
        }
    }

    fn signal_scaler(&self) -> f64 {
        self.signal_scaler
    }

    fn set_signal_scaler(&mut self, signal_scaler: f64) {
        for (_, ds) in self.data_sets.iter_mut() {
            ds.set_signal_scaler(signal_scaler);
        }
        self.signal_scaler = signal_scaler;
    }
}

impl fmt::Display for CombinedDataSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "CombinedDataSet of {} data sets: {:?}.",
            self.data_sets.len(),
            self.data_set_names()
        )?;
        match self.luminosity() {
            Some(l) => writeln!(f, "  Luminosity: {l} ifb.")?,
            None => writeln!(f, "  Luminosity differs between the data sets.")?,
        }
        writeln!(f, "  Considered signal decays: {:?}.", self.decay_names)
    }
}
