//! A calibratable catchment model
//!
//! [`CatchmentModel`] owns everything that stays fixed during a calibration:
//! the layout, the forcing and potential evapotranspiration of every cell and
//! the parameter search space. Each call to [`CatchmentModel::simulate`] builds
//! fresh storage networks from a parameter vector, so a model can be shared
//! between threads and evaluated concurrently.

use crate::network::StorageNetwork;
use crate::pet::potential_evapotranspiration;
use crate::simulation::{reporting_window, run_unit, UnitRun};
use crate::spatial::CatchmentLayout;
use hydrocal_core::config::{IntegratorConfig, ModelConfig, ParameterMode, SimulationPeriod, Variant};
use hydrocal_core::errors::{HydroError, HydroResult};
use hydrocal_core::forcing::ForcingSeries;
use hydrocal_core::parameters::{ParameterSet, CELL_PARAMETER_NAMES};
use hydrocal_core::timeseries::{DailyTimeseries, DischargeSeries, FloatValue};
use log::{debug, info, warn};
use std::sync::Arc;

#[derive(Debug, Clone)]
struct CellInputs {
    forcing: Arc<ForcingSeries>,
    pet: Arc<DailyTimeseries>,
}

#[derive(Debug, Clone)]
pub struct CatchmentModel {
    period: SimulationPeriod,
    integrator: IntegratorConfig,
    layout: CatchmentLayout,
    parameter_mode: ParameterMode,
    parameters: ParameterSet,
    cells: Vec<CellInputs>,
}

impl CatchmentModel {
    /// Loads the forcing named in the configuration and builds the model
    pub fn from_config(config: &ModelConfig) -> HydroResult<Self> {
        config.validate()?;
        let layout = CatchmentLayout::from_config(config)?;
        let forcing = match config.model.variant {
            Variant::Lumped => vec![ForcingSeries::load_lumped(
                &config.forcing,
                &config.simulation,
            )?],
            Variant::Distributed => layout
                .units()
                .iter()
                .map(|unit| ForcingSeries::load_unit(&config.forcing, unit.name(), &config.simulation))
                .collect::<HydroResult<Vec<_>>>()?,
        };
        Self::new(config, forcing)
    }

    /// Builds a model from forcing that is already in memory
    ///
    /// `forcing` holds one series per cell in layout order, each covering the
    /// warm-up and the reported period.
    pub fn new(config: &ModelConfig, forcing: Vec<ForcingSeries>) -> HydroResult<Self> {
        config.validate()?;
        let layout = CatchmentLayout::from_config(config)?;
        if forcing.len() != layout.len() {
            return Err(HydroError::Config(format!(
                "{} cell(s) but forcing for {}",
                layout.len(),
                forcing.len()
            )));
        }

        let period = config.simulation;
        let start = period.forcing_start()?;
        let method = config.model.pet_method();
        let cells = forcing
            .into_iter()
            .zip(layout.units())
            .map(|(forcing, unit)| {
                if forcing.start() != start || forcing.len() != period.horizon_len() {
                    return Err(HydroError::Config(format!(
                        "forcing of '{}' starts {} with {} days, expected {} with {} days",
                        unit.name(),
                        forcing.start(),
                        forcing.len(),
                        start,
                        period.horizon_len()
                    )));
                }
                let pet =
                    potential_evapotranspiration(&forcing, method, config.catchment.latitude_deg)?;
                Ok(CellInputs {
                    forcing: Arc::new(forcing),
                    pet: Arc::new(pet),
                })
            })
            .collect::<HydroResult<Vec<_>>>()?;

        let cell_parameters = match config.model.variant {
            Variant::Lumped => ParameterSet::lumped(),
            Variant::Distributed => ParameterSet::distributed(),
        };
        let parameters = match config.model.parameter_mode {
            ParameterMode::Shared => cell_parameters,
            ParameterMode::PerUnit => cell_parameters.per_unit(layout.unit_names()),
        };

        info!(
            "Built {:?} model of {} with {} cell(s), {} parameter(s), {} to {}",
            config.model.variant,
            config.catchment.name,
            layout.len(),
            parameters.len(),
            period.begin,
            period.end
        );

        Ok(Self {
            period,
            integrator: config.integrator,
            layout,
            parameter_mode: config.model.parameter_mode,
            parameters,
            cells,
        })
    }

    pub fn parameters(&self) -> &ParameterSet {
        &self.parameters
    }

    pub fn layout(&self) -> &CatchmentLayout {
        &self.layout
    }

    pub fn period(&self) -> &SimulationPeriod {
        &self.period
    }

    /// Forcing of the cell at `index` in layout order
    pub fn forcing(&self, index: usize) -> Option<&ForcingSeries> {
        self.cells.get(index).map(|c| c.forcing.as_ref())
    }

    /// Potential evapotranspiration of the cell at `index`
    pub fn potential_evapotranspiration(&self, index: usize) -> Option<&DailyTimeseries> {
        self.cells.get(index).map(|c| c.pet.as_ref())
    }

    /// One storage network per cell for a parameter vector
    pub fn build_networks(&self, vector: &[FloatValue]) -> HydroResult<Vec<StorageNetwork>> {
        self.parameters.validate(vector)?;
        match self.parameter_mode {
            ParameterMode::Shared => {
                let network = StorageNetwork::from_slice(vector)?;
                Ok(vec![network; self.layout.len()])
            }
            ParameterMode::PerUnit => vector
                .chunks(CELL_PARAMETER_NAMES.len())
                .zip(self.layout.units())
                .map(|(values, unit)| {
                    StorageNetwork::from_slice(values).map_err(|e| match e {
                        HydroError::InvalidParameter { name, message } => {
                            HydroError::InvalidParameter {
                                name: format!("{}.{}", unit.name(), name),
                                message,
                            }
                        }
                        other => other,
                    })
                })
                .collect(),
        }
    }

    /// Runs every cell over the whole forcing horizon
    ///
    /// Unlike [`CatchmentModel::simulate`] an integration failure is returned
    /// as an error.
    pub fn simulate_units(&self, vector: &[FloatValue]) -> HydroResult<Vec<UnitRun>> {
        let networks = self.build_networks(vector)?;
        networks
            .iter()
            .zip(&self.cells)
            .map(|(network, cell)| run_unit(network, &cell.forcing, &cell.pet, &self.integrator))
            .collect()
    }

    /// Basin discharge (mm/day) over the reported period
    ///
    /// A vector outside the search space is an `InvalidParameter` error. If
    /// the integration fails the result is a series of the full reporting
    /// length filled with NaN.
    pub fn simulate(&self, vector: &[FloatValue]) -> HydroResult<DischargeSeries> {
        let runs = match self.simulate_units(vector) {
            Ok(runs) => runs,
            Err(e @ HydroError::IntegrationFailure { .. }) => {
                warn!("{}; discharge is undefined for this parameter set", e);
                return Ok(self.undefined_discharge());
            }
            Err(e) => {
                if let HydroError::InvalidParameter { .. } = e {
                    warn!("Rejected parameter vector: {}", e);
                }
                return Err(e);
            }
        };

        let outflows: Vec<DailyTimeseries> = runs.into_iter().map(|run| run.outflow).collect();
        let basin = self.layout.aggregate(&outflows)?;
        let discharge = reporting_window(&basin, &self.period)?;
        debug!(
            "Simulated {} cell(s), mean discharge {:.3} mm/day",
            self.layout.len(),
            discharge.sum() / discharge.len() as FloatValue
        );
        Ok(discharge)
    }

    /// The result reported for a failed integration
    pub fn undefined_discharge(&self) -> DischargeSeries {
        DailyTimeseries::undefined(self.period.begin, self.period.report_len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use hydrocal_core::config::SubcatchmentConfig;
    use hydrocal_core::forcing::TemperatureSeries;

    fn config(variant: Variant, mode: ParameterMode) -> ModelConfig {
        let mut config = ModelConfig::default();
        config.simulation = SimulationPeriod::new(
            NaiveDate::from_ymd_opt(1981, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(1981, 12, 31).unwrap(),
        );
        config.model.variant = variant;
        config.model.parameter_mode = mode;
        config.model.evapotranspiration = Some(hydrocal_core::config::PetMethod::Hargreaves);
        if variant == Variant::Distributed {
            config.catchment.area_km2 = 30.0;
            config.model.subcatchments = vec![
                SubcatchmentConfig {
                    name: "upper".to_string(),
                    area_km2: 10.0,
                    elevation_m: 600.0,
                },
                SubcatchmentConfig {
                    name: "lower".to_string(),
                    area_km2: 20.0,
                    elevation_m: 350.0,
                },
            ];
        }
        config
    }

    fn forcing(config: &ModelConfig) -> ForcingSeries {
        let start = config.simulation.forcing_start().unwrap();
        let n = config.simulation.horizon_len();
        let avg: Vec<FloatValue> = (0..n)
            .map(|i| 8.0 - 10.0 * (2.0 * std::f64::consts::PI * i as FloatValue / 365.0).cos())
            .collect();
        let precipitation = (0..n).map(|i| ((i * 37) % 11) as FloatValue * 0.8).collect();
        let series = |values: Vec<FloatValue>| DailyTimeseries::new(start, values);
        ForcingSeries::new(
            series(precipitation),
            TemperatureSeries {
                max: series(avg.iter().map(|t| t + 5.0).collect()),
                min: series(avg.iter().map(|t| t - 5.0).collect()),
                avg: series(avg),
            },
        )
        .unwrap()
    }

    fn model(config: &ModelConfig) -> CatchmentModel {
        let cells = CatchmentLayout::from_config(config).unwrap().len();
        CatchmentModel::new(config, vec![forcing(config); cells]).unwrap()
    }

    #[test]
    fn lumped_simulation_covers_reporting_period() {
        let config = config(Variant::Lumped, ParameterMode::Shared);
        let model = model(&config);
        let discharge = model.simulate(&model.parameters().midpoints()).unwrap();

        assert_eq!(discharge.len(), 365);
        assert_eq!(discharge.start(), config.simulation.begin);
        assert!(discharge.is_finite());
        assert!(discharge.values().iter().all(|q| *q >= 0.0));
    }

    #[test]
    fn integration_failure_gives_undefined_series() {
        let mut config = config(Variant::Lumped, ParameterMode::Shared);
        config.integrator.max_steps = 1;
        let model = model(&config);
        let discharge = model.simulate(&model.parameters().midpoints()).unwrap();

        assert_eq!(discharge.len(), 365);
        assert!(discharge.values().iter().all(|q| q.is_nan()));
    }

    #[test]
    fn out_of_bounds_vector_is_rejected() {
        let config = config(Variant::Lumped, ParameterMode::Shared);
        let model = model(&config);
        let mut vector = model.parameters().midpoints();
        vector[0] = 1e6;
        let err = model.simulate(&vector).unwrap_err();
        assert!(matches!(err, HydroError::InvalidParameter { .. }));
        assert!(model.simulate(&vector[..5]).is_err());
    }

    #[test]
    fn per_unit_mode_repeats_the_cell_block() {
        let config = config(Variant::Distributed, ParameterMode::PerUnit);
        let model = model(&config);
        assert_eq!(model.parameters().len(), 24);
        assert_eq!(model.parameters().names()[12], "lower.tr_soil_gw");

        let networks = model.build_networks(&model.parameters().midpoints()).unwrap();
        assert_eq!(networks.len(), 2);
        assert!(networks.iter().all(|n| n.node_count() == 5 && n.edge_count() == 5));
    }

    #[test]
    fn identical_cells_match_shared_parameters() {
        let shared = model(&config(Variant::Distributed, ParameterMode::Shared));
        let per_unit = model(&config(Variant::Distributed, ParameterMode::PerUnit));

        let vector = shared.parameters().midpoints();
        let repeated: Vec<FloatValue> = vector.iter().chain(vector.iter()).copied().collect();

        let a = shared.simulate(&vector).unwrap();
        let b = per_unit.simulate(&repeated).unwrap();
        assert_eq!(a.len(), b.len());
        for (x, y) in a.values().iter().zip(b.values()) {
            assert!((x - y).abs() < 1e-9, "{} != {}", x, y);
        }
    }

    #[test]
    fn forcing_must_cover_the_horizon() {
        let config = config(Variant::Lumped, ParameterMode::Shared);
        let short = ForcingSeries::new(
            DailyTimeseries::filled(config.simulation.begin, 10, 1.0),
            TemperatureSeries {
                max: DailyTimeseries::filled(config.simulation.begin, 10, 5.0),
                min: DailyTimeseries::filled(config.simulation.begin, 10, 1.0),
                avg: DailyTimeseries::filled(config.simulation.begin, 10, 3.0),
            },
        )
        .unwrap();
        assert!(matches!(
            CatchmentModel::new(&config, vec![short]),
            Err(HydroError::Config(_))
        ));
    }
}
