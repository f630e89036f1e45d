//! Beam polarization and the blending of pure-polarization inputs.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::error::{DataError, Result};

use super::matrix::ProbabilityMatrix;

/// One of the four pure helicity combinations of the electron and positron beams.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum PolarizationCase {
    #[serde(rename = "eLpL")]
    ELpL,
    #[serde(rename = "eLpR")]
    ELpR,
    #[serde(rename = "eRpL")]
    ERpL,
    #[serde(rename = "eRpR")]
    ERpR,
}

impl PolarizationCase {
    pub const ALL: [PolarizationCase; 4] = [
        PolarizationCase::ELpL,
        PolarizationCase::ELpR,
        PolarizationCase::ERpL,
        PolarizationCase::ERpR,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            PolarizationCase::ELpL => "eLpL",
            PolarizationCase::ELpR => "eLpR",
            PolarizationCase::ERpL => "eRpL",
            PolarizationCase::ERpR => "eRpR",
        }
    }
}

impl fmt::Display for PolarizationCase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for PolarizationCase {
    type Err = DataError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        PolarizationCase::ALL
            .into_iter()
            .find(|c| c.name() == s)
            .ok_or_else(|| DataError::Polarization(format!("unknown polarization case {s:?}")))
    }
}

/// Longitudinal beam polarization `(e-, e+)`, each in `[-1, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Polarization {
    pub electron: f64,
    pub positron: f64,
}

impl Polarization {
    pub fn new(electron: f64, positron: f64) -> Result<Self> {
        let valid = |p: f64| (-1.0..=1.0).contains(&p);
        if !valid(electron) || !valid(positron) {
            return Err(DataError::Polarization(format!(
                "invalid polarization (e-, e+) = ({electron}, {positron}), both must be in [-1, 1]"
            ))
            .into());
        }
        Ok(Self { electron, positron })
    }

    /// Luminosity fraction of a pure helicity combination.
    pub fn weight(&self, case: PolarizationCase) -> f64 {
        let right_e = (1.0 + self.electron) / 2.0;
        let right_p = (1.0 + self.positron) / 2.0;
        match case {
            PolarizationCase::ELpL => (1.0 - right_e) * (1.0 - right_p),
            PolarizationCase::ELpR => (1.0 - right_e) * right_p,
            PolarizationCase::ERpL => right_e * (1.0 - right_p),
            PolarizationCase::ERpR => right_e * right_p,
        }
    }
}

impl fmt::Display for Polarization {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "(e-, e+)=({}%, {}%)",
            (100.0 * self.electron).round(),
            (100.0 * self.positron).round()
        )
    }
}

/// Blend weighted pure-polarization matrices into one matrix with columns `process_names`.
///
/// Each column is the weighted mean over the inputs in which the process
/// has events: `Σ w·col / Σ w`. A process without events anywhere stays zero.
/// All inputs must share the same set of boxes; rows follow the first input.
pub fn blend_matrices(
    process_names: &[String],
    inputs: &[(f64, &ProbabilityMatrix)],
) -> Result<ProbabilityMatrix> {
    let Some((_, first)) = inputs.first() else {
        return Err(DataError::Polarization("no pure polarization inputs to blend".to_string()).into());
    };
    let box_names = first.box_names().to_vec();
    let box_set: BTreeSet<&String> = box_names.iter().collect();
    for (_, m) in inputs {
        if m.box_names().iter().collect::<BTreeSet<_>>() != box_set {
            return Err(DataError::Polarization(format!(
                "box names differ between pure polarizations: {:?} != {:?}",
                box_names,
                m.box_names()
            ))
            .into());
        }
    }

    let mut values = Array2::zeros((box_names.len(), process_names.len()));
    for (j, process) in process_names.iter().enumerate() {
        let mut norm = 0.0;
        for (w, m) in inputs {
            if !m.has_events(process) {
                continue;
            }
            let Some(col) = m.column(process) else { continue };
            norm += w;
            for (i, box_name) in box_names.iter().enumerate() {
                // Rows may be permuted between inputs.
                let row = m.box_names().iter().position(|b| b == box_name).unwrap_or(i);
                values[[i, j]] += w * col[row];
            }
        }
        if norm != 0.0 {
            values.column_mut(j).mapv_inplace(|v| v / norm);
        }
    }
    ProbabilityMatrix::new(box_names, process_names.to_vec(), values)
}
