//! One channel at one fixed polarization, built from a [`ChannelTable`].

use ndarray::Array1;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use crate::error::{DataError, Result};
use crate::utils::sampling::multivariate_hypergeometric;

use super::matrix::ProbabilityMatrix;
use super::table::ChannelTable;

/// Seed of the generator that splits the MC events in two halves.
pub const DEFAULT_SPLIT_SEED: u64 = 1;

/// Share of the MC events used to generate the expected data.
const DATA_FRACTION: f64 = 0.5;

/// How the MC events of a channel become probability matrices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelOptions {
    /// Seed of the MC split.
    pub split_seed: u64,

    /// Use all MC events for both matrices instead of two independent halves.
    ///
    /// This hides the uncertainty from limited MC statistics.
    pub ignore_limited_mc_statistics_bias: bool,
}

impl Default for ChannelOptions {
    fn default() -> Self {
        Self {
            split_seed: DEFAULT_SPLIT_SEED,
            ignore_limited_mc_statistics_bias: false,
        }
    }
}

impl ChannelOptions {
    pub fn with_split_seed(mut self, seed: u64) -> Self {
        self.split_seed = seed;
        self
    }

    pub fn with_ignore_limited_mc_statistics_bias(mut self, ignore: bool) -> Self {
        self.ignore_limited_mc_statistics_bias = ignore;
        self
    }
}

/// Cross sections and the two probability matrices of one pure input.
///
/// Columns are the decay names followed by the backgrounds in sorted order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct PureChannel {
    pub decay_names: Vec<String>,
    /// Sum of the signal cross sections, fb.
    pub signal_cs_default: f64,
    /// Cross section per background, fb, in column order.
    pub bkg_cs_default: Array1<f64>,
    /// Built from the first MC half, used in the likelihood.
    pub fit_matrix: ProbabilityMatrix,
    /// Built from the second MC half, used to generate expected counts.
    pub data_matrix: ProbabilityMatrix,
}

impl PureChannel {
    pub fn from_table(
        table: &ChannelTable,
        decay_names: &[String],
        options: &ChannelOptions,
        allow_zero_signal: bool,
    ) -> Result<Self> {
        table.validate()?;
        let table = table.ordered(decay_names)?;
        let n_decays = decay_names.len();

        if !allow_zero_signal {
            if let Some((process, _)) = table
                .processes
                .iter()
                .zip(table.process_totals())
                .find(|(_, total)| *total == 0)
            {
                return Err(DataError::Table(format!(
                    "process {process:?} has no MC events; \
                     only pure polarization inputs may contain empty processes"
                ))
                .into());
            }
        }

        let signal_cs_default = table.cross_sections[..n_decays].iter().sum();
        let bkg_cs_default = Array1::from_vec(table.cross_sections[n_decays..].to_vec());

        let (fit_rows, data_rows) = if options.ignore_limited_mc_statistics_bias {
            let rows = full_rows(&table);
            (rows.clone(), rows)
        } else {
            split_rows(&table, options.split_seed)?
        };

        Ok(Self {
            decay_names: decay_names.to_vec(),
            signal_cs_default,
            bkg_cs_default,
            fit_matrix: matrix_from_rows(&table, &fit_rows)?,
            data_matrix: matrix_from_rows(&table, &data_rows)?,
        })
    }

    pub fn bkg_names(&self) -> Vec<String> {
        self.fit_matrix
            .process_names()
            .iter()
            .filter(|p| !self.decay_names.contains(p))
            .cloned()
            .collect()
    }

    pub fn box_names(&self) -> &[String] {
        self.fit_matrix.box_names()
    }

    /// Apply a process rename to both matrices, leaving them untouched on error.
    pub fn rename_processes(&mut self, old: &[String], new: &[String]) -> Result<()> {
        let mut fit_matrix = self.fit_matrix.clone();
        let mut data_matrix = self.data_matrix.clone();
        fit_matrix.rename_processes(old, new)?;
        data_matrix.rename_processes(old, new)?;
        self.fit_matrix = fit_matrix;
        self.data_matrix = data_matrix;
        Ok(())
    }

    pub fn set_decay_names(&mut self, new_names: &[String]) -> Result<()> {
        let old = self.decay_names.clone();
        self.rename_processes(&old, new_names)?;
        self.decay_names = new_names.to_vec();
        Ok(())
    }

    pub fn rename_boxes(&mut self, old: &[String], new: &[String]) -> Result<()> {
        let mut fit_matrix = self.fit_matrix.clone();
        let mut data_matrix = self.data_matrix.clone();
        fit_matrix.rename_boxes(old, new)?;
        data_matrix.rename_boxes(old, new)?;
        self.fit_matrix = fit_matrix;
        self.data_matrix = data_matrix;
        Ok(())
    }

    /// Remove the backgrounds in `names` that this input has.
    pub fn drop_bkg(&mut self, names: &[String]) {
        let bkg = self.bkg_names();
        let keep: Vec<f64> = bkg
            .iter()
            .zip(self.bkg_cs_default.iter())
            .filter(|(n, _)| !names.contains(n))
            .map(|(_, &cs)| cs)
            .collect();
        self.bkg_cs_default = Array1::from_vec(keep);
        self.fit_matrix.drop_processes(names);
        self.data_matrix.drop_processes(names);
    }
}

/// Per-process `[unselected, box counts...]` rows.
fn full_rows(table: &ChannelTable) -> Vec<Vec<u64>> {
    table
        .unselected
        .iter()
        .zip(table.counts.iter())
        .map(|(&u, row)| std::iter::once(u).chain(row.iter().copied()).collect())
        .collect()
}

/// Split every process's MC events in two independent halves.
///
/// The data half holds `floor(total / 2)` events drawn without replacement;
/// the fit half keeps the rest.
fn split_rows(table: &ChannelTable, seed: u64) -> Result<(Vec<Vec<u64>>, Vec<Vec<u64>>)> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut fit_rows = Vec::with_capacity(table.processes.len());
    let mut data_rows = Vec::with_capacity(table.processes.len());
    for (process, row) in table.processes.iter().zip(full_rows(table)) {
        let total: u64 = row.iter().sum();
        let n_sample = (DATA_FRACTION * total as f64).floor() as u64;
        let drawn = multivariate_hypergeometric(&mut rng, &row, n_sample).map_err(|e| {
            DataError::ResamplingOverflow(format!("splitting MC events of {process:?}: {e}"))
        })?;
        fit_rows.push(row.iter().zip(drawn.iter()).map(|(r, d)| r - d).collect());
        data_rows.push(drawn);
    }
    Ok((fit_rows, data_rows))
}

fn matrix_from_rows(table: &ChannelTable, rows: &[Vec<u64>]) -> Result<ProbabilityMatrix> {
    let unselected: Vec<u64> = rows.iter().map(|r| r[0]).collect();
    let counts: Vec<Vec<u64>> = rows.iter().map(|r| r[1..].to_vec()).collect();
    ProbabilityMatrix::from_counts(
        table.box_names.clone(),
        table.processes.clone(),
        &unselected,
        &counts,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn names(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    fn table() -> ChannelTable {
        ChannelTable::new(
            names(&["bkg", "A", "B"]),
            names(&["b1", "b2", "b3"]),
            vec![30.0, 10.0, 20.0],
            vec![100, 200, 0],
            vec![vec![300, 300, 300], vec![400, 200, 200], vec![500, 300, 200]],
        )
        .unwrap()
    }

    #[test]
    fn test_cross_sections_and_columns() {
        let pc = PureChannel::from_table(&table(), &names(&["A", "B"]), &ChannelOptions::default(), false)
            .unwrap();
        assert_relative_eq!(pc.signal_cs_default, 30.0);
        assert_eq!(pc.bkg_cs_default.to_vec(), vec![30.0]);
        assert_eq!(pc.fit_matrix.process_names(), &names(&["A", "B", "bkg"])[..]);
        assert_eq!(pc.bkg_names(), names(&["bkg"]));
    }

    #[test]
    fn test_split_halves_are_independent_and_reproducible() {
        let decays = names(&["A", "B"]);
        let a = PureChannel::from_table(&table(), &decays, &ChannelOptions::default(), false).unwrap();
        let b = PureChannel::from_table(&table(), &decays, &ChannelOptions::default(), false).unwrap();
        assert_eq!(a, b);
        assert_ne!(a.fit_matrix, a.data_matrix);

        // Both halves are close to the full-statistics probabilities.
        let full = ChannelOptions::default().with_ignore_limited_mc_statistics_bias(true);
        let f = PureChannel::from_table(&table(), &decays, &full, false).unwrap();
        assert_eq!(f.fit_matrix, f.data_matrix);
        assert_relative_eq!(f.fit_matrix.values()[[0, 0]], 0.4);
        for m in [&a.fit_matrix, &a.data_matrix] {
            assert!((m.values()[[0, 0]] - 0.4).abs() < 0.1);
        }
    }

    #[test]
    fn test_empty_process_needs_permission() {
        let mut t = table();
        t.unselected[1] = 0;
        t.counts[1] = vec![0, 0, 0];
        let decays = names(&["A", "B"]);
        assert!(PureChannel::from_table(&t, &decays, &ChannelOptions::default(), false).is_err());

        let pc = PureChannel::from_table(&t, &decays, &ChannelOptions::default(), true).unwrap();
        assert!(!pc.fit_matrix.has_events("A"));
    }

    #[test]
    fn test_drop_bkg() {
        let mut pc =
            PureChannel::from_table(&table(), &names(&["A", "B"]), &ChannelOptions::default(), false)
                .unwrap();
        pc.drop_bkg(&names(&["bkg"]));
        assert!(pc.bkg_names().is_empty());
        assert_eq!(pc.bkg_cs_default.len(), 0);
        assert_eq!(pc.data_matrix.n_processes(), 2);
    }
}
