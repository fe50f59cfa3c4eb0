//! Calibration of hydrocal catchment models
//!
//! A [`CalibrationSetup`] exposes the parameter search space, the
//! parameter-to-discharge mapping, the observed discharge and the objective
//! function. The [`SubsetSampler`] drives a setup: it draws parameter vectors
//! uniformly, evaluates them in parallel and narrows the search space around
//! the best runs after every subset.

pub mod sampler;
pub mod setup;

pub use sampler::{CalibrationResults, ProgressInfo, RunRecord, SubsetSampler};
pub use setup::{CalibrationSetup, CatchmentSetup, DischargeReport};

use hydrocal_core::errors::HydroError;
use thiserror::Error;

/// Errors raised while calibrating
#[derive(Error, Debug)]
pub enum Error {
    #[error("Model error: {0}")]
    Model(#[from] HydroError),

    #[error("Sampling error: {0}")]
    SamplingError(String),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
