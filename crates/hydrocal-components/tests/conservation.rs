//! Water balance of a distributed model loaded from per-unit forcing files

use approx::assert_relative_eq;
use chrono::NaiveDate;
use hydrocal_components::model::CatchmentModel;
use hydrocal_core::config::{
    ModelConfig, ParameterMode, SimulationPeriod, SubcatchmentConfig, Variant,
};
use hydrocal_core::forcing::ForcingVariable;
use hydrocal_core::timeseries::FloatValue;
use hydrocal_core::units::mm_to_m3;
use std::fs;
use tempfile::{tempdir, TempDir};

const UNITS: [(&str, FloatValue, FloatValue); 3] = [
    ("grass_high", 48.035, 582.98),
    ("wood_low", 136.099, 388.31),
    ("rest_low", 48.035, 311.42),
];

fn value(variable: ForcingVariable, unit: usize, day: usize) -> FloatValue {
    let season = (2.0 * std::f64::consts::PI * day as FloatValue / 365.25).cos();
    let avg = 8.0 - 9.5 * season - unit as FloatValue;
    match variable {
        ForcingVariable::Precipitation => {
            if (day * 7 + unit) % 5 < 2 {
                ((day * 31 + unit * 11) % 19) as FloatValue * 0.7
            } else {
                0.0
            }
        }
        ForcingVariable::TemperatureAvg => avg,
        ForcingVariable::TemperatureMin => avg - 4.0,
        ForcingVariable::TemperatureMax => avg + 4.0,
        ForcingVariable::Wind => 2.0 + (day % 4) as FloatValue * 0.5,
        ForcingVariable::Sunshine => 4.0 - 3.0 * season,
        ForcingVariable::RelativeHumidity => 78.0 + 8.0 * season,
    }
}

/// Writes per-unit forcing files and returns the configuration reading them
///
/// Keep the directory alive for as long as the model loads from it.
fn distributed_config() -> (TempDir, ModelConfig) {
    let dir = tempdir().unwrap();

    let mut config = ModelConfig::default();
    config.simulation = SimulationPeriod::new(
        NaiveDate::from_ymd_opt(1981, 1, 1).unwrap(),
        NaiveDate::from_ymd_opt(1982, 12, 31).unwrap(),
    );
    config.forcing.directory = dir.path().to_path_buf();
    config.catchment.area_km2 = UNITS.iter().map(|u| u.1).sum();
    config.model.variant = Variant::Distributed;
    config.model.parameter_mode = ParameterMode::PerUnit;
    config.model.subcatchments = UNITS
        .iter()
        .map(|(name, area, elevation)| SubcatchmentConfig {
            name: name.to_string(),
            area_km2: *area,
            elevation_m: *elevation,
        })
        .collect();

    let days = config.simulation.horizon_len();
    for (u, (unit, _, _)) in UNITS.iter().enumerate() {
        for variable in ForcingVariable::ALL {
            let content: String = (0..days)
                .map(|d| format!("{:.3}\n", value(variable, u, d)))
                .collect();
            fs::write(config.forcing.unit_path(variable.file_key(), unit), content).unwrap();
        }
    }
    (dir, config)
}

#[test]
fn every_cell_conserves_water() {
    let (_dir, config) = distributed_config();
    let model = CatchmentModel::from_config(&config).unwrap();
    assert_eq!(model.parameters().len(), 36);

    let runs = model.simulate_units(&model.parameters().midpoints()).unwrap();
    assert_eq!(runs.len(), 3);

    for (i, run) in runs.iter().enumerate() {
        let precipitation = model.forcing(i).unwrap().precipitation().sum();
        let losses = run.outflow.sum() + run.evapotranspiration.sum();
        let residual = precipitation - losses - run.storage_change();
        assert!(residual.abs() < 1e-4, "cell {} residual {}", i, residual);
        assert!(run.evapotranspiration.sum() > 0.0);
    }
}

#[test]
fn basin_volume_is_sum_of_cell_volumes() {
    let (_dir, config) = distributed_config();
    let model = CatchmentModel::from_config(&config).unwrap();
    let vector = model.parameters().midpoints();

    let basin = model.simulate(&vector).unwrap();
    let runs = model.simulate_units(&vector).unwrap();
    let offset = config.simulation.warmup_len();
    assert_eq!(basin.len(), config.simulation.report_len());

    for day in [0, 100, 400, basin.len() - 1] {
        let cells: FloatValue = runs
            .iter()
            .zip(UNITS)
            .map(|(run, (_, area, _))| mm_to_m3(run.outflow.values()[offset + day], area))
            .sum();
        assert_relative_eq!(
            mm_to_m3(basin.values()[day], config.catchment.area_km2),
            cells,
            max_relative = 1e-10
        );
    }
}

#[test]
fn penman_monteith_is_the_distributed_default() {
    let (_dir, config) = distributed_config();
    let model = CatchmentModel::from_config(&config).unwrap();
    let pet = model.potential_evapotranspiration(0).unwrap();

    assert_eq!(pet.len(), config.simulation.horizon_len());
    assert!(pet.values().iter().all(|v| v.is_finite() && *v >= 0.0));
    // summer demand exceeds winter demand
    let january = pet.values()[..31].iter().sum::<FloatValue>();
    let july = pet.values()[181..212].iter().sum::<FloatValue>();
    assert!(july > january);
}
