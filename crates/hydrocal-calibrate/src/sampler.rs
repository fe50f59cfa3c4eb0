//! Uniform sampling with shrinking subsets
//!
//! The run budget is split into a number of subsets. Every subset draws its
//! vectors uniformly from the current search box and evaluates them in
//! parallel. Afterwards the box is narrowed to the envelope of the best runs
//! seen so far, so later subsets concentrate around good parameter sets.
//!
//! Runs whose calibration score is undefined rank below every defined score.

use crate::{setup::CalibrationSetup, Error, Result};
use hydrocal_core::objective::{Efficiency, ObjectiveResult};
use hydrocal_core::parameters::Bounds;
use hydrocal_core::timeseries::{DischargeSeries, FloatValue};
use indexmap::IndexMap;
use log::{debug, info, warn};
use rand::Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

/// Information about sampling progress.
///
/// Passed to progress callbacks after every subset.
#[derive(Debug, Clone)]
pub struct ProgressInfo {
    /// Current subset (0-indexed)
    pub subset: usize,

    /// Total number of subsets
    pub total: usize,

    /// Evaluations completed so far
    pub evaluations: usize,

    /// Best calibration score so far, if any run was defined
    pub best: Option<FloatValue>,
}

/// One evaluated parameter vector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    pub parameters: IndexMap<String, FloatValue>,
    pub calibration: Efficiency,
    pub validation: Efficiency,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub simulation: Option<DischargeSeries>,
}

impl RunRecord {
    pub fn vector(&self) -> Vec<FloatValue> {
        self.parameters.values().copied().collect()
    }

    /// Calibration score used for ranking, undefined runs last
    fn rank_score(&self) -> FloatValue {
        self.calibration.value().unwrap_or(FloatValue::NEG_INFINITY)
    }
}

/// Best first; undefined scores sort after every defined one
fn by_score(a: &RunRecord, b: &RunRecord) -> Ordering {
    b.rank_score()
        .partial_cmp(&a.rank_score())
        .unwrap_or(Ordering::Equal)
}

/// Everything produced by a sampling run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CalibrationResults {
    /// Parameter names in vector order
    pub parameter_names: Vec<String>,

    /// Every evaluated run in evaluation order
    pub runs: Vec<RunRecord>,

    /// Vectors rejected by the model before simulation
    pub rejected: usize,
}

impl CalibrationResults {
    /// The run with the highest defined calibration score
    pub fn best(&self) -> Option<&RunRecord> {
        self.runs
            .iter()
            .filter(|r| r.calibration.is_defined())
            .min_by(|a, b| by_score(a, b))
    }

    /// Runs whose calibration score is defined
    pub fn defined_runs(&self) -> usize {
        self.runs.iter().filter(|r| r.calibration.is_defined()).count()
    }

    /// Save the results as a JSON document.
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the file to create
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, self)?;
        writer.flush()?;
        Ok(())
    }

    /// Load results written by [`CalibrationResults::save`].
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path)?;
        let results = serde_json::from_reader(BufReader::new(file))?;
        Ok(results)
    }
}

/// Draws one vector uniformly from a box
pub fn sample_uniform<R: Rng + ?Sized>(bounds: &[Bounds], rng: &mut R) -> Vec<FloatValue> {
    bounds
        .iter()
        .map(|b| rng.gen_range(b.low..=b.high))
        .collect()
}

/// Envelope of the best runs, kept inside the original search space
fn shrink_bounds(original: &[Bounds], best: &[&RunRecord]) -> Vec<Bounds> {
    original
        .iter()
        .enumerate()
        .map(|(i, full)| {
            let (low, high) = best
                .iter()
                .filter_map(|r| r.parameters.get_index(i).map(|(_, v)| *v))
                .fold(
                    (FloatValue::INFINITY, FloatValue::NEG_INFINITY),
                    |(lo, hi), v| (lo.min(v), hi.max(v)),
                );
            if low > high {
                return *full;
            }
            Bounds {
                low: low.max(full.low),
                high: high.min(full.high),
            }
        })
        .collect()
}

/// Uniform sampler that narrows its search box after each subset
pub struct SubsetSampler<S: CalibrationSetup> {
    setup: S,
    runs: usize,
    subsets: usize,
    /// Fraction of the runs so far that defines the next search box
    keep_fraction: FloatValue,
    keep_simulations: bool,
}

impl<S: CalibrationSetup> SubsetSampler<S> {
    /// Create a new sampler.
    ///
    /// # Arguments
    ///
    /// * `setup` - The model, observations and objective to calibrate
    /// * `runs` - Total number of evaluations
    /// * `subsets` - Number of rounds the evaluations are split into
    pub fn new(setup: S, runs: usize, subsets: usize) -> Result<Self> {
        if subsets == 0 {
            return Err(Error::SamplingError(
                "Must have at least one subset".to_string(),
            ));
        }
        if runs < subsets {
            return Err(Error::SamplingError(format!(
                "{} run(s) cannot fill {} subsets",
                runs, subsets
            )));
        }
        if setup.parameters().is_empty() {
            return Err(Error::InvalidParameter(
                "the search space has no parameters".to_string(),
            ));
        }
        Ok(Self {
            setup,
            runs,
            subsets,
            keep_fraction: 0.1,
            keep_simulations: false,
        })
    }

    /// Set the fraction of runs that defines the next search box.
    pub fn with_keep_fraction(mut self, fraction: FloatValue) -> Result<Self> {
        if !(fraction > 0.0 && fraction <= 1.0) {
            return Err(Error::SamplingError(format!(
                "keep fraction must be in (0, 1], got {}",
                fraction
            )));
        }
        self.keep_fraction = fraction;
        Ok(self)
    }

    /// Keep the simulated series of every run in the results.
    pub fn with_simulations(mut self, keep: bool) -> Self {
        self.keep_simulations = keep;
        self
    }

    pub fn setup(&self) -> &S {
        &self.setup
    }

    /// Number of runs in subset `index`
    fn subset_len(&self, index: usize) -> usize {
        self.runs / self.subsets + usize::from(index < self.runs % self.subsets)
    }

    /// Simulates and scores one vector.
    ///
    /// # Returns
    ///
    /// `Ok(None)` if the model rejected the vector, the scores otherwise.
    /// Errors that are not scoped to this vector abort the calibration.
    pub fn evaluate(&self, vector: &[FloatValue]) -> Result<Option<(ObjectiveResult, DischargeSeries)>> {
        let simulation = match self.setup.simulation(vector) {
            Ok(simulation) => simulation,
            Err(e) if e.is_per_evaluation() => {
                debug!("Skipping rejected vector: {}", e);
                return Ok(None);
            }
            Err(e) => return Err(Error::Model(e)),
        };
        let scores = self
            .setup
            .objective_function(&simulation, self.setup.evaluation())?;
        Ok(Some((scores, simulation)))
    }

    /// Evaluate several vectors in parallel, keeping their order.
    fn evaluate_batch(
        &self,
        vectors: &[Vec<FloatValue>],
    ) -> Vec<Result<Option<(ObjectiveResult, DischargeSeries)>>> {
        vectors.par_iter().map(|v| self.evaluate(v)).collect()
    }

    /// Run the sampler.
    pub fn run<R: Rng>(&self, rng: &mut R) -> Result<CalibrationResults> {
        self.run_with_progress(rng, None::<fn(&ProgressInfo)>)
    }

    /// Run the sampler with an optional progress callback.
    ///
    /// # Arguments
    ///
    /// * `rng` - Source of the uniform draws; all draws happen on the calling thread
    /// * `progress_callback` - Called after every subset
    pub fn run_with_progress<R, F>(
        &self,
        rng: &mut R,
        mut progress_callback: Option<F>,
    ) -> Result<CalibrationResults>
    where
        R: Rng,
        F: FnMut(&ProgressInfo),
    {
        let parameters = self.setup.parameters();
        let original: Vec<Bounds> = parameters.iter().map(|(_, b)| *b).collect();
        let mut bounds = original.clone();
        let mut results = CalibrationResults {
            parameter_names: parameters.names(),
            ..Default::default()
        };

        for subset in 0..self.subsets {
            let vectors: Vec<Vec<FloatValue>> = (0..self.subset_len(subset))
                .map(|_| sample_uniform(&bounds, rng))
                .collect();

            let first_run = results.runs.len();
            for (vector, outcome) in vectors.iter().zip(self.evaluate_batch(&vectors)) {
                match outcome? {
                    Some((scores, simulation)) => results.runs.push(RunRecord {
                        parameters: parameters.to_map(vector),
                        calibration: scores.calibration,
                        validation: scores.validation,
                        // failed integrations are all NaN and not worth keeping
                        simulation: (self.keep_simulations && simulation.is_finite())
                            .then_some(simulation),
                    }),
                    None => results.rejected += 1,
                }
            }

            let undefined = results.runs[first_run..]
                .iter()
                .filter(|r| !r.calibration.is_defined())
                .count();
            if undefined > 0 {
                warn!(
                    "Subset {}: {} run(s) with an undefined calibration score",
                    subset + 1,
                    undefined
                );
            }

            let mut ranked: Vec<&RunRecord> = results
                .runs
                .iter()
                .filter(|r| r.calibration.is_defined())
                .collect();
            ranked.sort_by(|a, b| by_score(a, b));
            let keep = ((results.runs.len() as FloatValue * self.keep_fraction).ceil() as usize)
                .max(2)
                .min(ranked.len());
            bounds = shrink_bounds(&original, &ranked[..keep]);
            let relative_width = bounds
                .iter()
                .zip(&original)
                .map(|(b, full)| if full.width() > 0.0 { b.width() / full.width() } else { 1.0 })
                .sum::<FloatValue>()
                / bounds.len() as FloatValue;
            debug!(
                "Search box spans {:.1}% of the parameter ranges on average",
                100.0 * relative_width
            );

            let best = results.best().and_then(|r| r.calibration.value());
            info!(
                "Subset {}/{}: {} evaluation(s), best calibration score {}",
                subset + 1,
                self.subsets,
                results.runs.len() + results.rejected,
                best.map(|b| format!("{:.4}", b))
                    .unwrap_or_else(|| "undefined".to_string())
            );

            if let Some(ref mut callback) = progress_callback {
                callback(&ProgressInfo {
                    subset,
                    total: self.subsets,
                    evaluations: results.runs.len() + results.rejected,
                    best,
                });
            }
        }

        Ok(results)
    }
}
