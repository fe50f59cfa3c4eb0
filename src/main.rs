//! Calibrates a catchment model against observed discharge
//!
//! # Usage
//!
//! ```bash
//! RUST_LOG=debug hydrocal 5000 --config hydrocal.toml --seed 42 --output fulda.json
//! ```

use anyhow::Context;
use clap::Parser;
use env_logger::Env;
use hydrocal_calibrate::{CatchmentSetup, RunRecord, SubsetSampler};
use hydrocal_core::config::ModelConfig;
use log::{info, warn};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::path::PathBuf;

/// Calibrate a catchment water-balance model
#[derive(Parser, Debug)]
#[command(name = "hydrocal")]
#[command(about = "Sample model parameters and score them against observed discharge")]
struct Args {
    /// Number of model runs (defaults to calibration.runs of the configuration)
    runs: Option<usize>,

    /// TOML configuration; built-in defaults are used without one
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Number of subsets the runs are split into
    #[arg(long)]
    subsets: Option<usize>,

    /// Seed for reproducible sampling
    #[arg(long)]
    seed: Option<u64>,

    /// Results file (JSON)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Store the simulated discharge of every run in the results file
    #[arg(long)]
    save_simulations: bool,
}

fn load_config(args: &Args) -> anyhow::Result<ModelConfig> {
    let mut config = match &args.config {
        Some(path) => ModelConfig::from_file(path)
            .with_context(|| format!("Failed to load configuration {}", path.display()))?,
        None => ModelConfig::default(),
    };

    if let Some(runs) = args.runs {
        config.calibration.runs = runs;
    }
    if let Some(subsets) = args.subsets {
        config.calibration.subsets = subsets;
    }
    if let Some(seed) = args.seed {
        config.calibration.seed = Some(seed);
    }
    if let Some(output) = &args.output {
        config.calibration.output = output.clone();
    }
    config.calibration.save_simulations |= args.save_simulations;

    config.validate().context("Invalid configuration")?;
    Ok(config)
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    let config = load_config(&args)?;
    let calibration = &config.calibration;

    let setup = CatchmentSetup::from_config(&config).context("Failed to set up the model")?;
    let sampler = SubsetSampler::new(setup, calibration.runs, calibration.subsets)?
        .with_simulations(calibration.save_simulations);

    let mut rng = match calibration.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    info!(
        "Calibrating {} with {} run(s) in {} subset(s)",
        config.catchment.name, calibration.runs, calibration.subsets
    );
    let results = sampler.run(&mut rng)?;

    results
        .save(&calibration.output)
        .with_context(|| format!("Failed to write {}", calibration.output.display()))?;
    info!(
        "Wrote {} run(s) to {}",
        results.runs.len(),
        calibration.output.display()
    );

    match results.best() {
        Some(best) => report_best(sampler.setup(), best)?,
        None => warn!("No run produced a defined calibration score"),
    }

    Ok(())
}

fn report_best(setup: &CatchmentSetup, best: &RunRecord) -> anyhow::Result<()> {
    info!("Best run: calibration {}", best.calibration);
    match best.validation.into_result() {
        Ok(score) => info!("  validation {:.4}", score),
        Err(e) => warn!("  validation failed: {}", e),
    }
    for (name, value) in &best.parameters {
        info!("  {} = {:.4}", name, value);
    }

    let report = setup
        .report(&best.vector())
        .context("Failed to rerun the best parameter set")?;
    info!(
        "  mean discharge {:.2} m³/s simulated, {:.2} m³/s observed",
        report.mean_simulated, report.mean_observed
    );
    if let Some((date, flow)) = report.peak {
        info!("  simulated peak {:.2} m³/s on {}", flow, date);
    }
    Ok(())
}
