//! The data set capability interface and the single data set.

use std::fmt;

use ndarray::Array1;

use crate::error::{DataError, Result};

use super::channel::{check_brs, Channel, ChannelSettings, ChannelSource};
use super::polarization::Polarization;
use super::pure_channel::ChannelOptions;

/// What a fit needs from a collection of channels.
///
/// Setters on shared quantities propagate to every channel before they
/// return. A setter that fails leaves the data set unchanged.
pub trait DataSet: fmt::Debug + Send + Sync {
    /// All channels in insertion order, with their (possibly namespaced) names.
    fn channels(&self) -> Vec<(String, &Channel)>;

    /// Signal process names, shared by all channels.
    fn decay_names(&self) -> &[String];

    /// Rename the signal processes in every channel.
    fn set_decay_names(&mut self, names: Vec<String>) -> Result<()>;

    /// BRs used to generate the expected data.
    fn data_brs(&self) -> &Array1<f64>;

    fn set_data_brs(&mut self, brs: Array1<f64>) -> Result<()>;

    /// BRs the minimization starts from.
    fn fit_start_brs(&self) -> &Array1<f64>;

    fn set_fit_start_brs(&mut self, brs: Array1<f64>) -> Result<()>;

    /// Integrated luminosity in fb⁻¹, `None` if the channels disagree.
    fn luminosity(&self) -> Option<f64>;

    fn set_luminosity(&mut self, luminosity: f64);

    /// Factor applied to all signal cross sections.
    fn signal_scaler(&self) -> f64;

    fn set_signal_scaler(&mut self, signal_scaler: f64);
}

/// An insertion-ordered set of channels that share decay names, BRs,
/// luminosity, signal scale and polarization.
///
/// # Examples
///
/// ```no_run
/// use alldecays_rs::data::{ChannelSource, ChannelTable, DataSet, Polarization, SingleDataSet};
///
/// let decays = vec!["H→bb".to_string(), "H→cc".to_string()];
/// let mut ds = SingleDataSet::new(decays);
/// let table = ChannelTable::from_json_file("channel1.json").unwrap();
/// ds.add_channel("channel1", ChannelSource::Unpolarized(table)).unwrap();
/// assert_eq!(ds.luminosity(), Some(1000.0));
/// ```
#[derive(Debug, Clone)]
pub struct SingleDataSet {
    settings: ChannelSettings,
    fit_start_brs: Array1<f64>,
    options: ChannelOptions,
    channels: Vec<(String, Channel)>,
}

impl SingleDataSet {
    /// An empty data set with flat BRs, 1000 fb⁻¹, unscaled signal and no polarization.
    pub fn new(decay_names: Vec<String>) -> Self {
        let settings = ChannelSettings::new(decay_names);
        Self {
            fit_start_brs: settings.data_brs.clone(),
            settings,
            options: ChannelOptions::default(),
            channels: Vec::new(),
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

    pub fn with_luminosity(mut self, luminosity: f64) -> Self {
        self.set_luminosity(luminosity);
        self
    }

    pub fn with_signal_scaler(mut self, signal_scaler: f64) -> Self {
        self.set_signal_scaler(signal_scaler);
        self
    }

    /// Polarization for channels added later. Use [`SingleDataSet::set_polarization`] afterwards.
    pub fn with_polarization(mut self, polarization: Polarization) -> Result<Self> {
        self.set_polarization(Some(polarization))?;
        Ok(self)
    }

    /// MC split options for channels added later.
    pub fn with_channel_options(mut self, options: ChannelOptions) -> Self {
        self.options = options;
        self
    }

    /// Build a channel from `source` with the shared settings and add it.
    pub fn add_channel(&mut self, name: impl Into<String>, source: ChannelSource) -> Result<()> {
        let name = name.into();
        if self.channels.iter().any(|(n, _)| *n == name) {
            return Err(DataError::DuplicateChannel(name).into());
        }
        let channel = Channel::new(source, self.settings.clone(), &self.options)?;
        self.channels.push((name, channel));
        Ok(())
    }

    /// Add several channels, stopping at the first failure.
    pub fn add_channels<I, S>(&mut self, sources: I) -> Result<()>
    where
        I: IntoIterator<Item = (S, ChannelSource)>,
        S: Into<String>,
    {
        for (name, source) in sources {
            self.add_channel(name, source)?;
        }
        Ok(())
    }

    /// Remove channels by name. Unknown names are an error and nothing is removed.
    pub fn drop_channels(&mut self, names: &[&str]) -> Result<()> {
        if let Some(unknown) = names.iter().find(|n| self.channel(n).is_none()) {
            return Err(DataError::UnknownChannel(unknown.to_string()).into());
        }
        self.channels.retain(|(n, _)| !names.contains(&n.as_str()));
        Ok(())
    }

    pub fn channel(&self, name: &str) -> Option<&Channel> {
        self.channels.iter().find(|(n, _)| n == name).map(|(_, c)| c)
    }

    fn channel_mut(&mut self, name: &str) -> Result<&mut Channel> {
        self.channels
            .iter_mut()
            .find(|(n, _)| n == name)
            .map(|(_, c)| c)
            .ok_or_else(|| DataError::UnknownChannel(name.to_string()).into())
    }

    pub fn channel_names(&self) -> Vec<&str> {
        self.channels.iter().map(|(n, _)| n.as_str()).collect()
    }

    /// Rename the backgrounds of one channel.
    pub fn set_bkg_names(&mut self, channel: &str, names: &[String]) -> Result<()> {
        self.channel_mut(channel)?.set_bkg_names(names)
    }

    /// Rename the boxes of one channel.
    pub fn set_box_names(&mut self, channel: &str, names: &[String]) -> Result<()> {
        self.channel_mut(channel)?.set_box_names(names)
    }

    /// Remove backgrounds from one channel.
    pub fn drop_bkg(&mut self, channel: &str, names: &[String]) -> Result<()> {
        self.channel_mut(channel)?.drop_bkg(names)
    }

    pub fn polarization(&self) -> Option<Polarization> {
        self.settings.polarization
    }

    /// Change the polarization of all channels.
    pub fn set_polarization(&mut self, polarization: Option<Polarization>) -> Result<()> {
        let mut channels = self.channels.clone();
        for (_, channel) in channels.iter_mut() {
            channel.set_polarization(polarization)?;
        }
        self.channels = channels;
        self.settings.polarization = polarization;
        Ok(())
    }
}

impl DataSet for SingleDataSet {
    fn channels(&self) -> Vec<(String, &Channel)> {
        self.channels.iter().map(|(n, c)| (n.clone(), c)).collect()
    }

    fn decay_names(&self) -> &[String] {
        &self.settings.decay_names
    }

    fn set_decay_names(&mut self, names: Vec<String>) -> Result<()> {
        if names.len() != self.settings.decay_names.len() {
            return Err(DataError::NameLengthMismatch {
                what: "decay names",
                expected: self.settings.decay_names.len(),
                got: names.len(),
            }
            .into());
        }
        let mut channels = self.channels.clone();
        for (_, channel) in channels.iter_mut() {
            channel.set_decay_names(&names)?;
        }
        self.channels = channels;
        self.settings.decay_names = names;
        Ok(())
    }

    fn data_brs(&self) -> &Array1<f64> {
        &self.settings.data_brs
    }

    fn set_data_brs(&mut self, brs: Array1<f64>) -> Result<()> {
        check_brs(&brs, self.settings.decay_names.len())?;
        for (_, channel) in self.channels.iter_mut() {
            channel.set_data_brs(brs.clone())?;
        }
        self.settings.data_brs = brs;
        Ok(())
    }

    fn fit_start_brs(&self) -> &Array1<f64> {
        &self.fit_start_brs
    }

    fn set_fit_start_brs(&mut self, brs: Array1<f64>) -> Result<()> {
        check_brs(&brs, self.settings.decay_names.len())?;
        self.fit_start_brs = brs;
        Ok(())
    }

    fn luminosity(&self) -> Option<f64> {
        Some(self.settings.luminosity)
    }

    fn set_luminosity(&mut self, luminosity: f64) {
        for (_, channel) in self.channels.iter_mut() {
            channel.set_luminosity(luminosity);
        }
        self.settings.luminosity = luminosity;
    }

    fn signal_scaler(&self) -> f64 {
        self.settings.signal_scaler
    }

    fn set_signal_scaler(&mut self, signal_scaler: f64) {
        for (_, channel) in self.channels.iter_mut() {
            channel.set_signal_scaler(signal_scaler);
        }
        self.settings.signal_scaler = signal_scaler;
    }
}

impl fmt::Display for SingleDataSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "SingleDataSet with {} channels.", self.channels.len())?;
        if !self.channels.is_empty() {
            writeln!(f, "  Channel names: {:?}.", self.channel_names())?;
        }
        match self.settings.polarization {
            Some(pol) => writeln!(f, "  Luminosity: {} ifb with polarization {pol}.", self.settings.luminosity)?,
            None => writeln!(f, "  Luminosity: {} ifb unpolarized.", self.settings.luminosity)?,
        }
        if self.settings.signal_scaler != 1.0 {
            writeln!(f, "  The signal strength is rescaled by {}.", self.settings.signal_scaler)?;
        }
        writeln!(f, "  Considered signal decays: {:?}.", self.settings.decay_names)
    }
}
