//! Day-by-day integration of a cell over the forcing horizon
//!
//! Forcing is held constant within each day. The outlet and
//! evapotranspiration accumulators are read at the end of the day and reset,
//! so each recorded value is the depth that left the cell on that day.

use crate::network::{StorageNetwork, EVAPOTRANSPIRATION, OUTLET};
use hydrocal_core::config::{IntegratorConfig, SimulationPeriod};
use hydrocal_core::errors::{HydroError, HydroResult};
use hydrocal_core::forcing::ForcingSeries;
use hydrocal_core::ivp::{IVPBuilder, ModelState};
use hydrocal_core::timeseries::{DailyTimeseries, FloatValue, Time};

/// Daily results of one cell over the whole forcing horizon
#[derive(Debug, Clone)]
pub struct UnitRun {
    /// Water reaching the cell outlet (mm/day)
    pub outflow: DailyTimeseries,
    /// Canopy evaporation plus transpiration (mm/day)
    pub evapotranspiration: DailyTimeseries,
    pub initial_state: ModelState,
    pub final_state: ModelState,
}

impl UnitRun {
    /// Change of the water stored in the cell over the run (mm)
    pub fn storage_change(&self) -> FloatValue {
        StorageNetwork::storage(&self.final_state) - StorageNetwork::storage(&self.initial_state)
    }
}

/// Integrates one cell through every day of its forcing
///
/// # Arguments
///
/// * `network` - The storage network built for the current parameter vector
/// * `forcing` - Daily precipitation and temperature of the cell
/// * `pet` - Potential evapotranspiration aligned with `forcing`
/// * `integrator` - Solver selection and tolerances
///
/// # Returns
///
/// The daily outflow and evapotranspiration, or `IntegrationFailure` if the
/// solver gives up or the state stops being finite on any day.
pub fn run_unit(
    network: &StorageNetwork,
    forcing: &ForcingSeries,
    pet: &DailyTimeseries,
    integrator: &IntegratorConfig,
) -> HydroResult<UnitRun> {
    if pet.len() != forcing.len() {
        return Err(HydroError::LengthMismatch {
            expected: forcing.len(),
            actual: pet.len(),
        });
    }

    let initial_state = network.initial_state();
    let mut state = initial_state.clone();
    let mut outflow = Vec::with_capacity(forcing.len());
    let mut evapotranspiration = Vec::with_capacity(forcing.len());

    let days = forcing
        .precipitation()
        .values()
        .iter()
        .zip(forcing.temperature_avg().values())
        .zip(pet.values());
    for (i, ((precipitation, temperature), pet)) in days.enumerate() {
        let t0 = i as Time;
        let drivers = network.drivers(*precipitation, *temperature, *pet);

        state = IVPBuilder::new(network, &drivers, state)
            .solve(t0, t0 + 1.0, integrator)
            .map_err(|e| match e {
                HydroError::IntegrationFailure { t, message } => HydroError::IntegrationFailure {
                    t,
                    message: format!(
                        "{} on {}",
                        message,
                        forcing.precipitation().date_at(i).unwrap_or(forcing.start())
                    ),
                },
                other => other,
            })?;

        outflow.push(state[OUTLET]);
        evapotranspiration.push(state[EVAPOTRANSPIRATION]);
        state[OUTLET] = 0.0;
        state[EVAPOTRANSPIRATION] = 0.0;
    }

    Ok(UnitRun {
        outflow: DailyTimeseries::new(forcing.start(), outflow),
        evapotranspiration: DailyTimeseries::new(forcing.start(), evapotranspiration),
        initial_state,
        final_state: state,
    })
}

/// Drops the warm-up days, keeping `[begin, end]`
pub fn reporting_window(
    series: &DailyTimeseries,
    period: &SimulationPeriod,
) -> HydroResult<DailyTimeseries> {
    series.slice(period.begin, period.end)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::{assert_abs_diff_eq, assert_relative_eq};
    use chrono::NaiveDate;
    use hydrocal_core::config::SolverMethod;
    use hydrocal_core::forcing::TemperatureSeries;

    fn network() -> StorageNetwork {
        StorageNetwork::from_slice(&[
            150.0, 40.0, 300.0, 120.0, 1.5, 2.0, 100.0, 0.3, 3.0, 0.0, 4.0, 0.5,
        ])
        .unwrap()
    }

    /// 90 days alternating between cold, wet and dry spells
    fn forcing(start: NaiveDate) -> (ForcingSeries, DailyTimeseries) {
        let n = 90;
        let precipitation = (0..n).map(|i| if i % 7 < 3 { 8.0 } else { 0.0 }).collect();
        let avg: Vec<FloatValue> = (0..n)
            .map(|i| if i < 30 { -4.0 } else { 2.0 + 0.2 * (i - 30) as FloatValue })
            .collect();
        let temperature = TemperatureSeries {
            max: DailyTimeseries::new(start, avg.iter().map(|t| t + 4.0).collect()),
            min: DailyTimeseries::new(start, avg.iter().map(|t| t - 4.0).collect()),
            avg: DailyTimeseries::new(start, avg),
        };
        let forcing =
            ForcingSeries::new(DailyTimeseries::new(start, precipitation), temperature).unwrap();
        let pet = DailyTimeseries::filled(start, n, 1.5);
        (forcing, pet)
    }

    fn start() -> NaiveDate {
        NaiveDate::from_ymd_opt(1979, 1, 1).unwrap()
    }

    #[test]
    fn run_covers_every_forcing_day() {
        let (forcing, pet) = forcing(start());
        let run = run_unit(&network(), &forcing, &pet, &IntegratorConfig::default()).unwrap();

        assert_eq!(run.outflow.len(), 90);
        assert_eq!(run.outflow.start(), start());
        assert!(run.outflow.values().iter().all(|q| q.is_finite() && *q >= 0.0));
        assert!(run.evapotranspiration.values().iter().all(|e| *e >= 0.0));
    }

    #[test]
    fn water_is_conserved() {
        let (forcing, pet) = forcing(start());
        let run = run_unit(&network(), &forcing, &pet, &IntegratorConfig::default()).unwrap();

        let inputs = forcing.precipitation().sum();
        let outputs = run.outflow.sum() + run.evapotranspiration.sum();
        assert_abs_diff_eq!(inputs - outputs, run.storage_change(), epsilon = 1e-4);
    }

    #[test]
    fn rk4_agrees_with_dopri5() {
        let (forcing, pet) = forcing(start());
        let adaptive = run_unit(&network(), &forcing, &pet, &IntegratorConfig::default()).unwrap();
        let fixed = IntegratorConfig {
            method: SolverMethod::Rk4,
            step_size: 0.05,
            ..IntegratorConfig::default()
        };
        let fixed = run_unit(&network(), &forcing, &pet, &fixed).unwrap();

        assert_relative_eq!(adaptive.outflow.sum(), fixed.outflow.sum(), max_relative = 1e-3);
    }

    #[test]
    fn step_limit_turns_into_integration_failure() {
        let (forcing, pet) = forcing(start());
        let options = IntegratorConfig {
            max_steps: 1,
            ..IntegratorConfig::default()
        };
        let err = run_unit(&network(), &forcing, &pet, &options).unwrap_err();
        assert!(matches!(err, HydroError::IntegrationFailure { .. }), "{}", err);
    }

    #[test]
    fn misaligned_pet_is_rejected() {
        let (forcing, _) = forcing(start());
        let pet = DailyTimeseries::filled(start(), 10, 1.0);
        assert!(matches!(
            run_unit(&network(), &forcing, &pet, &IntegratorConfig::default()),
            Err(HydroError::LengthMismatch { .. })
        ));
    }

    #[test]
    fn reporting_window_drops_warmup() {
        let period = SimulationPeriod {
            begin: NaiveDate::from_ymd_opt(1979, 2, 1).unwrap(),
            end: NaiveDate::from_ymd_opt(1979, 3, 31).unwrap(),
            warmup_years: 0,
        };
        let series = DailyTimeseries::filled(start(), 90, 1.0);
        let window = reporting_window(&series, &period).unwrap();
        assert_eq!(window.start(), period.begin);
        assert_eq!(window.len(), period.report_len());
    }
}
