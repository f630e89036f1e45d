//! Channels and data sets: MC input tables, probability matrices,
//! polarization blending and the expected-count forward model of each
//! channel.

pub mod channel;
pub mod combined;
pub mod data_set;
pub mod matrix;
pub mod polarization;
mod pure_channel;
pub mod table;

pub use channel::{
    validate_hypothesis, Channel, ChannelSettings, ChannelSource, BR_SUM_TOLERANCE,
    DEFAULT_LUMINOSITY,
};
pub use combined::CombinedDataSet;
pub use data_set::{DataSet, SingleDataSet};
pub use matrix::ProbabilityMatrix;
pub use polarization::{blend_matrices, Polarization, PolarizationCase};
pub use pure_channel::{ChannelOptions, DEFAULT_SPLIT_SEED};
pub use table::ChannelTable;
