//! Raw Monte-Carlo input of one channel at one polarization.
//!
//! Rows are processes (signal decays and backgrounds). Each row carries the
//! default cross section in fb, the number of MC events that were not
//! selected into any box, and the number of MC events per box.

use std::collections::HashSet;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{DataError, Result};

/// Per-process MC counts of one channel.
///
/// # Examples
///
/// ```
/// use alldecays_rs::data::ChannelTable;
///
/// let table = ChannelTable::from_json_str(r#"{
///     "processes": ["H→bb", "H→cc", "ZZ"],
///     "box_names": ["box1", "box2"],
///     "cross_sections": [100.0, 20.0, 50.0],
///     "unselected": [10, 10, 40],
///     "counts": [[60, 30], [20, 70], [30, 30]]
/// }"#).unwrap();
/// assert_eq!(table.process_totals(), vec![100, 100, 100]);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelTable {
    pub processes: Vec<String>,
    pub box_names: Vec<String>,
    /// Default cross section per process, in fb.
    pub cross_sections: Vec<f64>,
    /// MC events per process that fall in no box.
    pub unselected: Vec<u64>,
    /// MC events per process (outer) and box (inner).
    pub counts: Vec<Vec<u64>>,
}

impl ChannelTable {
    /// Build and validate a table.
    pub fn new(
        processes: Vec<String>,
        box_names: Vec<String>,
        cross_sections: Vec<f64>,
        unselected: Vec<u64>,
        counts: Vec<Vec<u64>>,
    ) -> Result<Self> {
        let table = Self {
            processes,
            box_names,
            cross_sections,
            unselected,
            counts,
        };
        table.validate()?;
        Ok(table)
    }

    /// Parse and validate a JSON table.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let table: Self = serde_json::from_str(json)?;
        table.validate()?;
        Ok(table)
    }

    /// Read, parse and validate a JSON table from disk.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Self::from_json_str(&content)
    }

    /// Check the structure: row and column lengths, unique names, and
    /// finite non-negative cross sections.
    pub fn validate(&self) -> Result<()> {
        let n = self.processes.len();
        if n == 0 {
            return Err(DataError::Table("no processes".to_string()).into());
        }
        if self.box_names.is_empty() {
            return Err(DataError::Table("no boxes".to_string()).into());
        }
        for (what, len) in [
            ("cross_sections", self.cross_sections.len()),
            ("unselected", self.unselected.len()),
            ("counts", self.counts.len()),
        ] {
            if len != n {
                return Err(DataError::Table(format!(
                    "{what} has {len} rows, expected one per process ({n})"
                ))
                .into());
            }
        }
        for (process, row) in self.processes.iter().zip(self.counts.iter()) {
            if row.len() != self.box_names.len() {
                return Err(DataError::Table(format!(
                    "process {process:?} has {} box counts, expected {}",
                    row.len(),
                    self.box_names.len()
                ))
                .into());
            }
        }
        for (process, &cs) in self.processes.iter().zip(self.cross_sections.iter()) {
            if !cs.is_finite() || cs < 0.0 {
                return Err(DataError::Table(format!(
                    "cross section of {process:?} must be finite and non-negative, got {cs}"
                ))
                .into());
            }
        }
        check_unique(&self.processes)?;
        check_unique(&self.box_names)?;
        Ok(())
    }

    /// A copy with the rows reordered: `decay_names` first, then the remaining processes sorted.
    ///
    /// Every decay name must be present. A process absent at a given
    /// polarization is expressed as a row with zero counts.
    pub fn ordered(&self, decay_names: &[String]) -> Result<Self> {
        let missing: Vec<&String> = decay_names
            .iter()
            .filter(|d| !self.processes.contains(d))
            .collect();
        if !missing.is_empty() {
            return Err(DataError::Table(format!(
                "not all decay names were found in the channel: missing {missing:?}. \
                 If this is expected (e.g. for a specific pure polarization), \
                 add zero-count rows for those processes"
            ))
            .into());
        }
        let mut backgrounds: Vec<&String> = self
            .processes
            .iter()
            .filter(|p| !decay_names.contains(p))
            .collect();
        backgrounds.sort();

        let order: Vec<usize> = decay_names
            .iter()
            .chain(backgrounds)
            .filter_map(|name| self.processes.iter().position(|p| p == name))
            .collect();

        Ok(Self {
            processes: order.iter().map(|&i| self.processes[i].clone()).collect(),
            box_names: self.box_names.clone(),
            cross_sections: order.iter().map(|&i| self.cross_sections[i]).collect(),
            unselected: order.iter().map(|&i| self.unselected[i]).collect(),
            counts: order.iter().map(|&i| self.counts[i].clone()).collect(),
        })
    }

    /// Total MC events per process, unselected included.
    pub fn process_totals(&self) -> Vec<u64> {
        self.unselected
            .iter()
            .zip(self.counts.iter())
            .map(|(&u, row)| u + row.iter().sum::<u64>())
            .collect()
    }
}

pub(crate) fn check_unique(names: &[String]) -> Result<()> {
    let mut seen = HashSet::with_capacity(names.len());
    for name in names {
        if !seen.insert(name) {
            return Err(DataError::DuplicateName(name.clone()).into());
        }
    }
    Ok(())
}
