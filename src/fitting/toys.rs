//! Toy studies: refit the data set on multinomial resamplings of its
//! expected counts and collect the outcomes.

use ndarray::{Array1, Array2, Axis};
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{FitError, Result};

use super::fit::Fit;

/// Observed counts of every channel in one toy, in channel order.
pub type ChannelCounts = Vec<(String, Array1<f64>)>;

/// Number of toys above which storing channel counts triggers a warning.
const MANY_TOYS_FOR_COUNTS: usize = 100;

const PROBLEMATIC_FITS_TEXT: &str = "Some toy fits seem to not have worked properly. \
Derived quantities (e.g. parameter correlations from the toy values) are affected by this. \
To (temporarily) ignore those toys, apply a mask: \
`let accurate = toys.accurate().to_vec(); fit.set_toys(Some(toys.get_copy_after_mask(&accurate)?));`";

/// Settings of a toy study.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToyConfig {
    pub n_toys: usize,
    /// Keep the observed counts of every toy, for diagnostics.
    pub store_channel_counts: bool,
    /// Log progress every this many toys; 0 disables progress logging.
    pub progress_interval: usize,
}

impl Default for ToyConfig {
    fn default() -> Self {
        Self {
            n_toys: 100,
            store_channel_counts: false,
            progress_interval: 10,
        }
    }
}

impl ToyConfig {
    pub fn with_n_toys(mut self, n_toys: usize) -> Self {
        self.n_toys = n_toys;
        self
    }

    pub fn with_store_channel_counts(mut self, store: bool) -> Self {
        self.store_channel_counts = store;
        self
    }

    pub fn with_progress_interval(mut self, interval: usize) -> Self {
        self.progress_interval = interval;
        self
    }
}

/// Outcome of one toy fit.
#[derive(Debug, Clone)]
struct ToyRecord {
    internal: Array1<f64>,
    physics: Array1<f64>,
    valid: bool,
    accurate: bool,
    nfcn: usize,
    fval: f64,
    channel_counts: Option<ChannelCounts>,
}

/// The outcomes of a toy study, one row per toy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToyValues {
    internal: Array2<f64>,
    physics: Array2<f64>,
    valid: Vec<bool>,
    accurate: Vec<bool>,
    nfcn: Vec<usize>,
    fval: Array1<f64>,
    channel_counts: Option<Vec<ChannelCounts>>,
}

impl ToyValues {
    /// Collect toy outcomes. All fields must have one entry per toy.
    pub fn new(
        internal: Array2<f64>,
        physics: Array2<f64>,
        valid: Vec<bool>,
        accurate: Vec<bool>,
        nfcn: Vec<usize>,
        fval: Array1<f64>,
        channel_counts: Option<Vec<ChannelCounts>>,
    ) -> Result<Self> {
        let n = physics.nrows();
        let lengths = [
            ("internal", internal.nrows()),
            ("valid", valid.len()),
            ("accurate", accurate.len()),
            ("nfcn", nfcn.len()),
            ("fval", fval.len()),
            ("channel_counts", channel_counts.as_ref().map_or(n, Vec::len)),
        ];
        if let Some((field, len)) = lengths.iter().find(|(_, len)| *len != n) {
            return Err(FitError::ToyShape(format!("{field} has {len} entries for {n} toys")).into());
        }
        Ok(Self {
            internal,
            physics,
            valid,
            accurate,
            nfcn,
            fval,
            channel_counts,
        })
    }

    fn from_records(records: Vec<ToyRecord>, n_internal: usize, n_physics: usize) -> Result<Self> {
        let n = records.len();
        let mut internal = Array2::zeros((n, n_internal));
        let mut physics = Array2::zeros((n, n_physics));
        for (i, r) in records.iter().enumerate() {
            internal.row_mut(i).assign(&r.internal);
            physics.row_mut(i).assign(&r.physics);
        }
        let channel_counts = records
            .iter()
            .map(|r| r.channel_counts.clone())
            .collect::<Option<Vec<_>>>();
        Self::new(
            internal,
            physics,
            records.iter().map(|r| r.valid).collect(),
            records.iter().map(|r| r.accurate).collect(),
            records.iter().map(|r| r.nfcn).collect(),
            records.iter().map(|r| r.fval).collect(),
            if n == 0 { None } else { channel_counts },
        )
    }

    /// Number of toys.
    pub fn len(&self) -> usize {
        self.physics.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Minimizer values, toys × internal parameters.
    pub fn internal(&self) -> &Array2<f64> {
        &self.internal
    }

    /// Physics values, toys × parameters.
    pub fn physics(&self) -> &Array2<f64> {
        &self.physics
    }

    pub fn valid(&self) -> &[bool] {
        &self.valid
    }

    pub fn accurate(&self) -> &[bool] {
        &self.accurate
    }

    pub fn nfcn(&self) -> &[usize] {
        &self.nfcn
    }

    pub fn fval(&self) -> &Array1<f64> {
        &self.fval
    }

    pub fn channel_counts(&self) -> Option<&[ChannelCounts]> {
        self.channel_counts.as_deref()
    }

    pub fn n_invalid(&self) -> usize {
        self.valid.iter().filter(|v| !**v).count()
    }

    pub fn n_inaccurate(&self) -> usize {
        self.accurate.iter().filter(|a| !**a).count()
    }

    /// The sub-ensemble of the toys where `mask` is true.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// # fn run(fit: &mut alldecays_rs::fitting::Fit) -> alldecays_rs::Result<()> {
    /// let toys = fit.toys().unwrap();
    /// let mask = toys.accurate().to_vec();
    /// let accurate_toys = toys.get_copy_after_mask(&mask)?;
    /// fit.set_toys(Some(accurate_toys));
    /// # Ok(())
    /// # }
    /// ```
    pub fn get_copy_after_mask(&self, mask: &[bool]) -> Result<Self> {
        if mask.len() != self.len() {
            return Err(FitError::ToyShape(format!(
                "mask has {} entries for {} toys",
                mask.len(),
                self.len()
            ))
            .into());
        }
        let keep: Vec<usize> = mask
            .iter()
            .enumerate()
            .filter(|(_, m)| **m)
            .map(|(i, _)| i)
            .collect();
        let pick = |v: &[bool]| keep.iter().map(|&i| v[i]).collect::<Vec<bool>>();
        Self::new(
            self.internal.select(Axis(0), &keep),
            self.physics.select(Axis(0), &keep),
            pick(&self.valid),
            pick(&self.accurate),
            keep.iter().map(|&i| self.nfcn[i]).collect(),
            self.fval.select(Axis(0), &keep),
            self.channel_counts
                .as_ref()
                .map(|cc| keep.iter().map(|&i| cc[i].clone()).collect()),
        )
    }
}

impl<'a> Fit<'a> {
    /// Run `n_toys` toy fits drawing from `rng` and store them in [`Fit::toys`].
    pub fn fill_toys<R: Rng + ?Sized>(
        &mut self,
        n_toys: usize,
        rng: &mut R,
        store_channel_counts: bool,
    ) -> Result<&ToyValues> {
        let config = ToyConfig::default()
            .with_n_toys(n_toys)
            .with_store_channel_counts(store_channel_counts);
        self.fill_toys_with(&config, rng)
    }

    /// Run a toy study with the settings of `config`.
    ///
    /// With `raise_invalid_fit` the first invalid toy ends the study with an error.
    pub fn fill_toys_with<R: Rng + ?Sized>(&mut self, config: &ToyConfig, rng: &mut R) -> Result<&ToyValues> {
        warn_on_many_stored(config);
        let mut records = Vec::with_capacity(config.n_toys);
        let (mut inaccurate, mut invalid) = (0, 0);
        for i in 0..config.n_toys {
            let record = self.run_toy(rng, config.store_channel_counts)?;
            if !record.accurate {
                inaccurate += 1;
                invalid += usize::from(!record.valid);
                info!("{inaccurate} not accurate, {invalid} invalid");
            }
            records.push(record);
            if config.progress_interval > 0 && (i + 1) % config.progress_interval == 0 {
                info!(done = i + 1, total = config.n_toys, "toy minimizations");
            }
        }
        self.store_toys(records)
    }

    /// Run `n_toys` toy fits in parallel. Toy `i` draws from its own
    /// generator seeded with `seed + i`.
    #[cfg(feature = "parallel")]
    pub fn fill_toys_parallel(&mut self, n_toys: usize, seed: u64, store_channel_counts: bool) -> Result<&ToyValues> {
        use rand::rngs::StdRng;
        use rand::SeedableRng;
        use rayon::prelude::*;

        warn_on_many_stored(&ToyConfig::default().with_n_toys(n_toys).with_store_channel_counts(store_channel_counts));
        let this = &*self;
        let records = (0..n_toys)
            .into_par_iter()
            .map(|i| {
                let mut rng = StdRng::seed_from_u64(seed.wrapping_add(i as u64));
                this.run_toy(&mut rng, store_channel_counts)
            })
            .collect::<Result<Vec<_>>>()?;
        info!(total = n_toys, "parallel toy minimizations done");
        self.store_toys(records)
    }

    fn run_toy<R: Rng + ?Sized>(&self, rng: &mut R, store_channel_counts: bool) -> Result<ToyRecord> {
        let toy = self.toy_fit(rng)?;
        let m = toy.minimizer();
        Ok(ToyRecord {
            internal: m.values().clone(),
            physics: toy.values(),
            valid: m.valid(),
            accurate: m.accurate(),
            nfcn: m.nfcn(),
            fval: m.fval(),
            channel_counts: store_channel_counts.then(|| toy.plugin().counts()),
        })
    }

    fn store_toys(&mut self, records: Vec<ToyRecord>) -> Result<&ToyValues> {
        let n_internal = self.minimizer().parameters().len();
        let n_physics = self.parameters().len();
        let toys = ToyValues::from_records(records, n_internal, n_physics)?;
        if toys.n_invalid() > 0 || toys.n_inaccurate() > 0 {
            warn!(
                invalid = toys.n_invalid(),
                inaccurate = toys.n_inaccurate(),
                "{PROBLEMATIC_FITS_TEXT}"
            );
        }
        let toys = self.toys.insert(toys);
        Ok(&*toys)
    }
}

fn warn_on_many_stored(config: &ToyConfig) {
    if config.store_channel_counts && config.n_toys >= MANY_TOYS_FOR_COUNTS {
        warn!(
            n_toys = config.n_toys,
            "Storing channel counts is meant for debugging and diagnostics; \
             this seems like a high number of toys for such a run."
        );
    }
}
