//! The interface between a model and a calibration algorithm

use crate::Result;
use chrono::NaiveDate;
use hydrocal_components::model::CatchmentModel;
use hydrocal_core::config::ModelConfig;
use hydrocal_core::errors::HydroResult;
use hydrocal_core::forcing::load_observed_discharge;
use hydrocal_core::objective::{ObjectiveResult, SplitObjective};
use hydrocal_core::parameters::ParameterSet;
use hydrocal_core::timeseries::{DischargeSeries, FloatValue};
use hydrocal_core::units::DischargeConverter;

/// Everything a calibration algorithm needs to know about a model
///
/// Implementations must be safe to evaluate from several threads at once.
pub trait CalibrationSetup: Sync {
    /// The search space; vectors passed to `simulation` follow its order
    fn parameters(&self) -> &ParameterSet;

    /// Simulated discharge (mm/day) over the reported period
    ///
    /// A failed integration yields a NaN-filled series, not an error.
    fn simulation(&self, vector: &[FloatValue]) -> HydroResult<DischargeSeries>;

    /// Observed discharge (mm/day) over the reported period
    fn evaluation(&self) -> &DischargeSeries;

    /// Scores a simulation against the observations
    fn objective_function(
        &self,
        simulation: &DischargeSeries,
        evaluation: &DischargeSeries,
    ) -> HydroResult<ObjectiveResult>;
}

/// One simulation seen at the gauge, in m³/s
#[derive(Debug, Clone, PartialEq)]
pub struct DischargeReport {
    pub mean_simulated: FloatValue,
    pub mean_observed: FloatValue,
    /// Day and flow of the highest finite simulated discharge
    pub peak: Option<(NaiveDate, FloatValue)>,
    pub scores: ObjectiveResult,
}

fn mean(series: &DischargeSeries) -> FloatValue {
    series.sum() / series.len() as FloatValue
}

/// A catchment model paired with its gauge observations
#[derive(Debug, Clone)]
pub struct CatchmentSetup {
    model: CatchmentModel,
    observed: DischargeSeries,
    objective: SplitObjective,
    converter: DischargeConverter,
}

impl CatchmentSetup {
    /// Loads forcing and observed discharge as configured
    pub fn from_config(config: &ModelConfig) -> Result<Self> {
        let model = CatchmentModel::from_config(config)?;
        let converter = DischargeConverter::new(config.catchment.area_km2)?;
        let observed = load_observed_discharge(&config.forcing, &config.simulation, &converter)?;
        let objective = SplitObjective::new(
            config.calibration.objective,
            config.calibration.split_offset,
        );
        Self::new(model, observed, objective)
    }

    /// Pairs a model with observations in mm/day
    ///
    /// `observed` may cover more than the reported period; it is cut to
    /// `[begin, end]` of the model.
    pub fn new(
        model: CatchmentModel,
        observed: DischargeSeries,
        objective: SplitObjective,
    ) -> Result<Self> {
        let period = model.period();
        let observed = observed.slice(period.begin, period.end)?;
        let converter = DischargeConverter::new(model.layout().area_km2())?;
        Ok(Self {
            model,
            observed,
            objective,
            converter,
        })
    }

    pub fn model(&self) -> &CatchmentModel {
        &self.model
    }

    pub fn objective(&self) -> &SplitObjective {
        &self.objective
    }

    /// Simulates `vector` and reports it against the gauge in m³/s
    ///
    /// A failed simulation has a NaN mean and no peak.
    pub fn report(&self, vector: &[FloatValue]) -> Result<DischargeReport> {
        let simulated = self.simulation(vector)?;
        let scores = self.objective_function(&simulated, &self.observed)?;

        let simulated = self.converter.series_to_volumetric(&simulated);
        let observed = self.converter.series_to_volumetric(&self.observed);
        let peak = simulated
            .iter()
            .filter(|(_, q)| q.is_finite())
            .max_by(|a, b| a.1.total_cmp(&b.1));

        Ok(DischargeReport {
            mean_simulated: mean(&simulated),
            mean_observed: mean(&observed),
            peak,
            scores,
        })
    }
}

impl CalibrationSetup for CatchmentSetup {
    fn parameters(&self) -> &ParameterSet {
        self.model.parameters()
    }

    fn simulation(&self, vector: &[FloatValue]) -> HydroResult<DischargeSeries> {
        self.model.simulate(vector)
    }

    fn evaluation(&self) -> &DischargeSeries {
        &self.observed
    }

    fn objective_function(
        &self,
        simulation: &DischargeSeries,
        evaluation: &DischargeSeries,
    ) -> HydroResult<ObjectiveResult> {
        self.objective.evaluate(simulation, evaluation)
    }
}
