//! Calibration of a lumped model driven by forcing files on disk

use approx::assert_relative_eq;
use chrono::NaiveDate;
use hydrocal_calibrate::{CalibrationSetup, CatchmentSetup, SubsetSampler};
use hydrocal_core::config::{ModelConfig, SimulationPeriod};
use hydrocal_core::errors::HydroError;
use hydrocal_core::objective::Efficiency;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::fmt::Write as _;
use std::fs;
use std::path::Path;
use tempfile::{tempdir, TempDir};

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

/// Writes precipitation, temperature and discharge files for `days` days
///
/// The files live as long as the returned directory.
fn write_forcing(days: usize) -> TempDir {
    let dir = tempdir().unwrap();

    let mut precipitation = String::new();
    let mut temperature = String::new();
    let mut discharge = String::new();
    for i in 0..days {
        let season = (2.0 * std::f64::consts::PI * i as f64 / 365.25).cos();
        let avg = 8.5 - 9.0 * season;
        let rain = if (i * 7919) % 13 < 5 { ((i * 31) % 17) as f64 * 0.9 } else { 0.0 };
        writeln!(precipitation, "{:.2}", rain).unwrap();
        writeln!(temperature, "{:.2}\t{:.2}\t{:.2}", avg + 4.5, avg - 4.5, avg).unwrap();
        writeln!(discharge, "{:.3}", 9.0 + 4.0 * season + ((i * 13) % 7) as f64).unwrap();
    }
    // trailing blank lines are ignored
    precipitation.push('\n');

    fs::write(dir.path().join("P.txt"), precipitation).unwrap();
    fs::write(dir.path().join("T.txt"), temperature).unwrap();
    fs::write(dir.path().join("Q.txt"), discharge).unwrap();
    dir
}

fn config(dir: &Path) -> ModelConfig {
    let mut config = ModelConfig::default();
    config.forcing.directory = dir.to_path_buf();
    config
}

#[test]
fn forcing_files_are_removed_with_their_directory() {
    let dir = write_forcing(10);
    let path = dir.path().to_path_buf();
    assert!(path.join("T.txt").exists());

    drop(dir);
    assert!(!path.exists());
}

#[test]
fn decade_run_splits_into_calibration_and_validation() {
    let dir = write_forcing(365 + 3653);
    let config = config(dir.path());
    assert_eq!(config.simulation.begin, date(1980, 1, 1));
    assert_eq!(config.simulation.end, date(1989, 12, 31));

    let setup = CatchmentSetup::from_config(&config).unwrap();
    let observed = setup.evaluation();
    assert_eq!(observed.len(), 3653);
    assert_eq!(observed.start(), date(1980, 1, 1));

    let simulated = setup.simulation(&setup.parameters().midpoints()).unwrap();
    assert_eq!(simulated.len(), 3653);
    assert!(simulated.is_finite());

    let (calibration, validation) = simulated.split_at(config.calibration.split_offset);
    assert_eq!(calibration.len(), 1827);
    assert_eq!(validation.len(), 1826);
    assert_eq!(calibration.end(), Some(date(1984, 12, 31)));
    assert_eq!(validation.start(), date(1985, 1, 1));

    let perfect = setup.objective_function(&simulated, &simulated).unwrap();
    assert_eq!(perfect.calibration, Efficiency::Defined(1.0));
    assert_eq!(perfect.validation, Efficiency::Defined(1.0));

    let scores = setup.objective_function(&simulated, observed).unwrap();
    assert!(scores.calibration.value().unwrap() <= 1.0);
    assert!(scores.validation.is_defined());
}

#[test]
fn failed_integration_scores_are_undefined() {
    let dir = write_forcing(365 + 731);
    let mut config = config(dir.path());
    config.simulation = SimulationPeriod::new(date(1980, 1, 1), date(1981, 12, 31));
    config.calibration.split_offset = 366;
    config.integrator.max_steps = 1;

    let setup = CatchmentSetup::from_config(&config).unwrap();
    let simulated = setup.simulation(&setup.parameters().midpoints()).unwrap();
    assert_eq!(simulated.len(), 731);
    assert!(simulated.values().iter().all(|q| q.is_nan()));

    let scores = setup.objective_function(&simulated, setup.evaluation()).unwrap();
    assert!(!scores.calibration.is_defined());
    assert!(!scores.validation.is_defined());
}

#[test]
fn report_is_in_cubic_metres_per_second() {
    let dir = write_forcing(365 + 731);
    let mut config = config(dir.path());
    config.simulation = SimulationPeriod::new(date(1980, 1, 1), date(1981, 12, 31));
    config.calibration.split_offset = 366;

    let setup = CatchmentSetup::from_config(&config).unwrap();
    let vector = setup.parameters().midpoints();
    let report = setup.report(&vector).unwrap();

    // the gauge file is in m³/s and starts one year before the period
    let gauge: Vec<f64> = fs::read_to_string(dir.path().join("Q.txt"))
        .unwrap()
        .lines()
        .skip(365)
        .take(731)
        .map(|line| line.parse().unwrap())
        .collect();
    let expected = gauge.iter().sum::<f64>() / gauge.len() as f64;
    assert_relative_eq!(report.mean_observed, expected, max_relative = 1e-9);

    let simulated = setup.simulation(&vector).unwrap();
    let area = config.catchment.area_km2;
    let mean_depth = simulated.sum() / simulated.len() as f64;
    assert_relative_eq!(
        report.mean_simulated,
        mean_depth * area * 1e6 / 86_400_000.0,
        max_relative = 1e-9
    );

    let (peak_date, peak) = report.peak.unwrap();
    assert!(peak_date >= date(1980, 1, 1) && peak_date <= date(1981, 12, 31));
    assert!(peak >= report.mean_simulated);
    assert_eq!(
        report.scores,
        setup.objective_function(&simulated, setup.evaluation()).unwrap()
    );
}

#[test]
fn failed_run_reports_no_peak() {
    let dir = write_forcing(365 + 731);
    let mut config = config(dir.path());
    config.simulation = SimulationPeriod::new(date(1980, 1, 1), date(1981, 12, 31));
    config.calibration.split_offset = 366;
    config.integrator.max_steps = 1;

    let setup = CatchmentSetup::from_config(&config).unwrap();
    let report = setup.report(&setup.parameters().midpoints()).unwrap();

    assert!(report.mean_simulated.is_nan());
    assert!(report.mean_observed.is_finite());
    assert_eq!(report.peak, None);
    assert!(matches!(
        report.scores.calibration.into_result(),
        Err(HydroError::DegenerateObjective(_))
    ));
}

#[test]
fn short_forcing_file_is_a_load_error() {
    let dir = write_forcing(400);
    let config = config(dir.path());
    let err = CatchmentSetup::from_config(&config).unwrap_err();
    assert!(
        matches!(err, hydrocal_calibrate::Error::Model(HydroError::Load { .. })),
        "{}",
        err
    );
}

#[test]
fn sampler_drives_the_catchment_model() {
    let dir = write_forcing(365 + 731);
    let mut config = config(dir.path());
    config.simulation = SimulationPeriod::new(date(1980, 1, 1), date(1981, 12, 31));
    config.calibration.split_offset = 366;

    let setup = CatchmentSetup::from_config(&config).unwrap();
    let sampler = SubsetSampler::new(setup, 8, 2).unwrap();
    let results = sampler.run(&mut ChaCha8Rng::seed_from_u64(5)).unwrap();

    assert_eq!(results.runs.len() + results.rejected, 8);
    assert_eq!(results.parameter_names.len(), 12);
    assert_eq!(results.parameter_names[0], "tr_soil_gw");
}
