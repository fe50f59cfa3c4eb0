use std::path::PathBuf;
use thiserror::Error;

/// Error type for invalid operations.
#[derive(Error, Debug)]
pub enum HydroError {
    #[error("{0}")]
    Error(String),
    #[error("Failed to load {path}: line {line}: {message}")]
    Load {
        path: PathBuf,
        line: usize,
        message: String,
    },
    #[error("Invalid configuration: {0}")]
    Config(String),
    #[error("Invalid parameter '{name}': {message}")]
    InvalidParameter { name: String, message: String },
    #[error("Integration failed at t={t}: {message}")]
    IntegrationFailure { t: f64, message: String },
    #[error("Objective is undefined: {0}")]
    DegenerateObjective(String),
    #[error("Length mismatch: expected {expected}, got {actual}")]
    LengthMismatch { expected: usize, actual: usize },
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl HydroError {
    pub(crate) fn load(path: impl Into<PathBuf>, line: usize, message: impl Into<String>) -> Self {
        HydroError::Load {
            path: path.into(),
            line,
            message: message.into(),
        }
    }

    pub fn invalid_parameter(name: impl Into<String>, message: impl Into<String>) -> Self {
        HydroError::InvalidParameter {
            name: name.into(),
            message: message.into(),
        }
    }

    /// Whether the error only invalidates a single evaluation
    ///
    /// Load and configuration errors abort a calibration; everything else is
    /// scoped to the parameter vector that produced it.
    pub fn is_per_evaluation(&self) -> bool {
        matches!(
            self,
            HydroError::InvalidParameter { .. }
                | HydroError::IntegrationFailure { .. }
                | HydroError::DegenerateObjective(_)
        )
    }
}

/// Convenience type for `Result<T, HydroError>`.
pub type HydroResult<T> = Result<T, HydroError>;
