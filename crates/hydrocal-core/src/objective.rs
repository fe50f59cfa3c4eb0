//! Goodness-of-fit scores for discharge series
//!
//! Scores are computed separately for a calibration window and a validation
//! window. A score that cannot be computed (flat observations, a failed
//! simulation, an empty window) is reported as [`Efficiency::Undefined`]
//! with the reason, never as a number.

use crate::errors::{HydroError, HydroResult};
use crate::timeseries::{DischargeSeries, FloatValue};
use ndarray::ArrayView1;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectiveKind {
    /// Kling-Gupta efficiency
    Kge,
    /// Nash-Sutcliffe efficiency
    Nse,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UndefinedReason {
    EmptyWindow,
    NonFiniteSimulation,
    NonFiniteObservation,
    ZeroObservedVariance,
    ZeroObservedSum,
    ZeroSimulatedVariance,
}

impl fmt::Display for UndefinedReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            UndefinedReason::EmptyWindow => "window contains no values",
            UndefinedReason::NonFiniteSimulation => "simulation contains non-finite values",
            UndefinedReason::NonFiniteObservation => "observations contain non-finite values",
            UndefinedReason::ZeroObservedVariance => "observed series has zero variance",
            UndefinedReason::ZeroObservedSum => "observed series sums to zero",
            UndefinedReason::ZeroSimulatedVariance => "simulated series has zero variance",
        };
        write!(f, "{}", reason)
    }
}

/// An efficiency score in `(-inf, 1]`, or the reason it does not exist
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Efficiency {
    Defined(FloatValue),
    Undefined(UndefinedReason),
}

impl Efficiency {
    pub fn value(&self) -> Option<FloatValue> {
        match self {
            Efficiency::Defined(v) => Some(*v),
            Efficiency::Undefined(_) => None,
        }
    }

    pub fn is_defined(&self) -> bool {
        matches!(self, Efficiency::Defined(_))
    }

    /// The score as a number, or `DegenerateObjective`
    pub fn into_result(self) -> HydroResult<FloatValue> {
        match self {
            Efficiency::Defined(v) => Ok(v),
            Efficiency::Undefined(reason) => Err(HydroError::DegenerateObjective(reason.to_string())),
        }
    }
}

impl fmt::Display for Efficiency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Efficiency::Defined(v) => write!(f, "{:.4}", v),
            Efficiency::Undefined(reason) => write!(f, "undefined ({})", reason),
        }
    }
}

/// Scores for the calibration and validation windows
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ObjectiveResult {
    pub calibration: Efficiency,
    pub validation: Efficiency,
}

struct Moments {
    mean_obs: FloatValue,
    mean_sim: FloatValue,
    sum_obs: FloatValue,
    sum_sim: FloatValue,
    /// Sums of squared deviations and cross products
    ss_obs: FloatValue,
    ss_sim: FloatValue,
    cross: FloatValue,
    n: FloatValue,
}

fn check_window(
    observed: ArrayView1<FloatValue>,
    simulated: ArrayView1<FloatValue>,
) -> Result<(), UndefinedReason> {
    if observed.is_empty() {
        return Err(UndefinedReason::EmptyWindow);
    }
    if simulated.iter().any(|v| !v.is_finite()) {
        return Err(UndefinedReason::NonFiniteSimulation);
    }
    if observed.iter().any(|v| !v.is_finite()) {
        return Err(UndefinedReason::NonFiniteObservation);
    }
    Ok(())
}

fn moments(observed: ArrayView1<FloatValue>, simulated: ArrayView1<FloatValue>) -> Moments {
    let n = observed.len() as FloatValue;
    let sum_obs = observed.sum();
    let sum_sim = simulated.sum();
    let mean_obs = sum_obs / n;
    let mean_sim = sum_sim / n;

    let dev_obs = observed.mapv(|o| o - mean_obs);
    let dev_sim = simulated.mapv(|s| s - mean_sim);

    Moments {
        mean_obs,
        mean_sim,
        sum_obs,
        sum_sim,
        ss_obs: dev_obs.dot(&dev_obs),
        ss_sim: dev_sim.dot(&dev_sim),
        cross: dev_obs.dot(&dev_sim),
        n,
    }
}

/// Kling-Gupta efficiency
///
/// $$ KGE = 1 - \sqrt{(r - 1)^2 + (\alpha - 1)^2 + (\beta - 1)^2} $$
///
/// with $r$ the Pearson correlation, $\alpha = \sigma_{sim} / \sigma_{obs}$ and
/// $\beta = \sum sim / \sum obs$.
pub fn kge(observed: ArrayView1<FloatValue>, simulated: ArrayView1<FloatValue>) -> Efficiency {
    if let Err(reason) = check_window(observed, simulated) {
        return Efficiency::Undefined(reason);
    }
    let m = moments(observed, simulated);
    if m.ss_obs == 0.0 {
        return Efficiency::Undefined(UndefinedReason::ZeroObservedVariance);
    }
    if m.sum_obs == 0.0 {
        return Efficiency::Undefined(UndefinedReason::ZeroObservedSum);
    }
    if m.ss_sim == 0.0 {
        return Efficiency::Undefined(UndefinedReason::ZeroSimulatedVariance);
    }

    let r = m.cross / (m.ss_obs * m.ss_sim).sqrt();
    let alpha = (m.ss_sim / m.n).sqrt() / (m.ss_obs / m.n).sqrt();
    let beta = m.sum_sim / m.sum_obs;
    log::trace!(
        "kge components r={} alpha={} beta={} (means {} / {})",
        r,
        alpha,
        beta,
        m.mean_sim,
        m.mean_obs
    );

    Efficiency::Defined(
        1.0 - ((r - 1.0).powi(2) + (alpha - 1.0).powi(2) + (beta - 1.0).powi(2)).sqrt(),
    )
}

/// Nash-Sutcliffe efficiency
pub fn nse(observed: ArrayView1<FloatValue>, simulated: ArrayView1<FloatValue>) -> Efficiency {
    if let Err(reason) = check_window(observed, simulated) {
        return Efficiency::Undefined(reason);
    }
    let m = moments(observed, simulated);
    if m.ss_obs == 0.0 {
        return Efficiency::Undefined(UndefinedReason::ZeroObservedVariance);
    }
    let residual: FloatValue = observed
        .iter()
        .zip(simulated.iter())
        .map(|(o, s)| (o - s).powi(2))
        .sum();

    Efficiency::Defined(1.0 - residual / m.ss_obs)
}

impl ObjectiveKind {
    pub fn score(
        &self,
        observed: ArrayView1<FloatValue>,
        simulated: ArrayView1<FloatValue>,
    ) -> Efficiency {
        match self {
            ObjectiveKind::Kge => kge(observed, simulated),
            ObjectiveKind::Nse => nse(observed, simulated),
        }
    }
}

/// Scores a simulation on two consecutive windows split at a fixed day offset
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SplitObjective {
    pub kind: ObjectiveKind,
    /// Number of days in the calibration window
    pub offset: usize,
}

impl SplitObjective {
    pub fn new(kind: ObjectiveKind, offset: usize) -> Self {
        Self { kind, offset }
    }

    pub fn evaluate(
        &self,
        simulated: &DischargeSeries,
        observed: &DischargeSeries,
    ) -> HydroResult<ObjectiveResult> {
        if simulated.len() != observed.len() {
            return Err(HydroError::LengthMismatch {
                expected: observed.len(),
                actual: simulated.len(),
            });
        }
        let (sim_calibration, sim_validation) = simulated.split_at(self.offset);
        let (obs_calibration, obs_validation) = observed.split_at(self.offset);

        Ok(ObjectiveResult {
            calibration: self
                .kind
                .score(obs_calibration.view(), sim_calibration.view()),
            validation: self.kind.score(obs_validation.view(), sim_validation.view()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use chrono::NaiveDate;
    use ndarray::array;

    fn series(values: Vec<f64>) -> DischargeSeries {
        DischargeSeries::new(NaiveDate::from_ymd_opt(1980, 1, 1).unwrap(), values)
    }

    #[test]
    fn kge_perfect_match() {
        let obs = array![0.3, 1.2, 4.5, 2.2, 0.9, 0.4];
        assert_eq!(kge(obs.view(), obs.view()), Efficiency::Defined(1.0));
    }

    #[test]
    fn kge_known_value() {
        // sim = 2 * obs: r = 1, alpha = 2, beta = 2 => 1 - sqrt(2)
        let obs = array![1.0, 2.0, 3.0, 4.0];
        let sim = obs.mapv(|v| v * 2.0);
        let score = kge(obs.view(), sim.view()).value().unwrap();
        assert_relative_eq!(score, 1.0 - 2.0_f64.sqrt(), epsilon = 1e-12);
    }

    #[test]
    fn kge_can_be_very_negative() {
        let obs = array![1.0, 2.0, 3.0, 4.0];
        let sim = array![400.0, 30.0, 20.0, 1.0];
        assert!(kge(obs.view(), sim.view()).value().unwrap() < -10.0);
    }

    #[test]
    fn kge_undefined_cases() {
        let flat = array![2.0, 2.0, 2.0];
        let varied = array![1.0, 2.0, 3.0];
        let failed = array![f64::NAN, f64::NAN, f64::NAN];
        let empty = ndarray::Array1::<f64>::zeros(0);

        assert_eq!(
            kge(flat.view(), varied.view()),
            Efficiency::Undefined(UndefinedReason::ZeroObservedVariance)
        );
        assert_eq!(
            kge(varied.view(), flat.view()),
            Efficiency::Undefined(UndefinedReason::ZeroSimulatedVariance)
        );
        assert_eq!(
            kge(varied.view(), failed.view()),
            Efficiency::Undefined(UndefinedReason::NonFiniteSimulation)
        );
        assert_eq!(
            kge(empty.view(), empty.view()),
            Efficiency::Undefined(UndefinedReason::EmptyWindow)
        );
    }

    #[test]
    fn nse_known_value() {
        let obs = array![1.0, 2.0, 3.0, 4.0, 5.0];
        let sim = array![1.1, 2.2, 2.8, 4.1, 4.9];
        assert_relative_eq!(nse(obs.view(), sim.view()).value().unwrap(), 0.989, epsilon = 1e-10);
        assert_eq!(nse(obs.view(), obs.view()), Efficiency::Defined(1.0));
    }

    #[test]
    fn undefined_score_is_flagged() {
        let score = Efficiency::Undefined(UndefinedReason::ZeroObservedVariance);
        assert!(!score.is_defined());
        assert!(matches!(
            score.into_result(),
            Err(HydroError::DegenerateObjective(_))
        ));
    }

    #[test]
    fn scores_round_trip_through_json() {
        let result = ObjectiveResult {
            calibration: Efficiency::Defined(0.625),
            validation: Efficiency::Undefined(UndefinedReason::ZeroObservedVariance),
        };

        let text = serde_json::to_string(&result).unwrap();
        assert!(text.contains("\"defined\":0.625"), "{}", text);
        assert!(text.contains("\"undefined\":\"zero_observed_variance\""), "{}", text);
        assert_eq!(serde_json::from_str::<ObjectiveResult>(&text).unwrap(), result);
    }

    #[test]
    fn split_objective_scores_both_windows() {
        let values: Vec<f64> = (0..20).map(|i| 1.0 + (i as f64 * 0.7).sin().abs()).collect();
        let observed = series(values);
        let objective = SplitObjective::new(ObjectiveKind::Kge, 12);

        let result = objective.evaluate(&observed, &observed).unwrap();
        assert_eq!(result.calibration, Efficiency::Defined(1.0));
        assert_eq!(result.validation, Efficiency::Defined(1.0));
    }

    #[test]
    fn split_objective_windows_are_independent() {
        let observed = series(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0]);
        // validation half is perfect, calibration half is biased
        let simulated = series(vec![2.0, 4.0, 6.0, 8.0, 5.0, 6.0, 7.0, 8.0]);
        let result = SplitObjective::new(ObjectiveKind::Kge, 4)
            .evaluate(&simulated, &observed)
            .unwrap();

        assert!(result.calibration.value().unwrap() < 0.5);
        assert_eq!(result.validation, Efficiency::Defined(1.0));
    }

    #[test]
    fn split_objective_rejects_length_mismatch() {
        let objective = SplitObjective::new(ObjectiveKind::Kge, 2);
        let err = objective
            .evaluate(&series(vec![1.0, 2.0]), &series(vec![1.0, 2.0, 3.0]))
            .unwrap_err();
        assert!(matches!(
            err,
            HydroError::LengthMismatch {
                expected: 3,
                actual: 2
            }
        ));
    }

    #[test]
    fn split_past_end_leaves_validation_undefined() {
        let observed = series(vec![1.0, 2.0, 3.0]);
        let result = SplitObjective::new(ObjectiveKind::Nse, 10)
            .evaluate(&observed, &observed)
            .unwrap();
        assert_eq!(result.calibration, Efficiency::Defined(1.0));
        assert_eq!(
            result.validation,
            Efficiency::Undefined(UndefinedReason::EmptyWindow)
        );
    }
}
