//! Named box-by-process probability matrices.

use ndarray::{Array1, Array2, ArrayView1, Axis};
use serde::{Deserialize, Serialize};

use crate::error::{DataError, Result};

use super::table::check_unique;

/// P(box | process), rows keyed by box name and columns by process name.
///
/// A column of `NaN` marks a process without MC events; such columns only
/// occur in pure-polarization inputs and are skipped when blending.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbabilityMatrix {
    box_names: Vec<String>,
    process_names: Vec<String>,
    values: Array2<f64>,
}

impl ProbabilityMatrix {
    /// Wrap `values` (boxes × processes) with row and column names.
    pub fn new(box_names: Vec<String>, process_names: Vec<String>, values: Array2<f64>) -> Result<Self> {
        if values.dim() != (box_names.len(), process_names.len()) {
            return Err(DataError::Table(format!(
                "matrix of shape {:?} does not match {} boxes and {} processes",
                values.dim(),
                box_names.len(),
                process_names.len()
            ))
            .into());
        }
        check_unique(&box_names)?;
        check_unique(&process_names)?;
        Ok(Self {
            box_names,
            process_names,
            values,
        })
    }

    /// Probabilities from per-process MC counts.
    ///
    /// `unselected[j]` and `counts[j]` are the events of process `j` outside
    /// any box and per box. Each column is normalized by the process total,
    /// so it sums to less than one when events are unselected. A process
    /// with no events at all gives a `NaN` column.
    pub fn from_counts(
        box_names: Vec<String>,
        process_names: Vec<String>,
        unselected: &[u64],
        counts: &[Vec<u64>],
    ) -> Result<Self> {
        let values = Array2::from_shape_fn((box_names.len(), process_names.len()), |(i, j)| {
            let total = unselected[j] + counts[j].iter().sum::<u64>();
            counts[j][i] as f64 / total as f64
        });
        Self::new(box_names, process_names, values)
    }

    pub fn box_names(&self) -> &[String] {
        &self.box_names
    }

    pub fn process_names(&self) -> &[String] {
        &self.process_names
    }

    /// Raw values, boxes × processes.
    pub fn values(&self) -> &Array2<f64> {
        &self.values
    }

    pub fn n_boxes(&self) -> usize {
        self.box_names.len()
    }

    pub fn n_processes(&self) -> usize {
        self.process_names.len()
    }

    /// The column of process `name`, if present.
    pub fn column(&self, name: &str) -> Option<ArrayView1<'_, f64>> {
        self.process_names
            .iter()
            .position(|p| p == name)
            .map(|j| self.values.column(j))
    }

    /// Columns of `names`, in that order. Missing processes are an error.
    pub fn select(&self, names: &[String]) -> Result<Array2<f64>> {
        let mut out = Array2::zeros((self.n_boxes(), names.len()));
        for (k, name) in names.iter().enumerate() {
            let col = self.column(name).ok_or_else(|| {
                DataError::Table(format!("process {name:?} is not a column of the matrix"))
            })?;
            out.column_mut(k).assign(&col);
        }
        Ok(out)
    }

    /// Σ_j P[:, j] · weights[j] over the processes `names`.
    pub fn weighted_sum(&self, names: &[String], weights: &Array1<f64>) -> Result<Array1<f64>> {
        Ok(self.select(names)?.dot(weights))
    }

    /// Rename processes with `old → new` pairs. Names not in `old` stay.
    ///
    /// The resulting column names must be unique; on error the matrix is unchanged.
    pub fn rename_processes(&mut self, old: &[String], new: &[String]) -> Result<()> {
        let renamed = rename(&self.process_names, old, new);
        check_unique(&renamed)?;
        self.process_names = renamed;
        Ok(())
    }

    /// Rename boxes with `old → new` pairs. Names not in `old` stay.
    pub fn rename_boxes(&mut self, old: &[String], new: &[String]) -> Result<()> {
        let renamed = rename(&self.box_names, old, new);
        check_unique(&renamed)?;
        self.box_names = renamed;
        Ok(())
    }

    /// Remove the columns of `names`; names that are not columns are ignored.
    pub fn drop_processes(&mut self, names: &[String]) {
        let keep: Vec<usize> = (0..self.n_processes())
            .filter(|&j| !names.contains(&self.process_names[j]))
            .collect();
        self.values = self.values.select(Axis(1), &keep);
        self.process_names = keep.iter().map(|&j| self.process_names[j].clone()).collect();
    }

    /// True if the column of `name` is present and free of `NaN`.
    pub fn has_events(&self, name: &str) -> bool {
        self.column(name)
            .map(|c| c.iter().all(|v| !v.is_nan()))
            .unwrap_or(false)
    }
}

fn rename(names: &[String], old: &[String], new: &[String]) -> Vec<String> {
    names
        .iter()
        .map(|n| match old.iter().position(|o| o == n) {
            Some(k) => new[k].clone(),
            None => n.clone(),
        })
        .collect()
}
