//! Run configuration
//!
//! Everything a model run depends on that is not a calibrated parameter lives here:
//! the simulation period, integrator settings, catchment constants and the
//! locations of the forcing files. A configuration is read from TOML once per
//! process and handed to the model constructor.
//!
//! Every section is optional; missing values fall back to the defaults used for
//! the Fulda catchment at Kämmerzell.
//!
//! ```
//! use hydrocal_core::config::{ModelConfig, Variant};
//!
//! let config = ModelConfig::from_toml_str(
//!     r#"
//!     [simulation]
//!     begin = "1980-01-01"
//!     end = "1989-12-31"
//!
//!     [model]
//!     variant = "lumped"
//!     "#,
//! )
//! .unwrap();
//! assert_eq!(config.model.variant, Variant::Lumped);
//! assert_eq!(config.simulation.report_len(), 3653);
//! ```

use crate::errors::{HydroError, HydroResult};
use crate::objective::ObjectiveKind;
use crate::timeseries::{days_between, FloatValue};
use chrono::{Months, NaiveDate};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub simulation: SimulationPeriod,
    pub integrator: IntegratorConfig,
    pub catchment: CatchmentConfig,
    pub forcing: ForcingConfig,
    pub model: LayoutConfig,
    pub calibration: CalibrationConfig,
}

impl ModelConfig {
    pub fn from_toml_str(content: &str) -> HydroResult<Self> {
        let config: ModelConfig =
            toml::from_str(content).map_err(|e| HydroError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> HydroResult<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            HydroError::Config(format!(
                "Failed to read {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;
        Self::from_toml_str(&content)
    }

    pub fn to_toml_string(&self) -> HydroResult<String> {
        toml::to_string_pretty(self).map_err(|e| HydroError::Config(e.to_string()))
    }

    /// Checks the settings for internal consistency
    pub fn validate(&self) -> HydroResult<()> {
        self.simulation.validate()?;
        self.integrator.validate()?;
        self.catchment.validate()?;
        self.model.validate()?;
        if self.calibration.subsets == 0 {
            return Err(HydroError::Config(
                "calibration.subsets must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// The reported period and the warm-up prefix before it
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationPeriod {
    /// First reported day
    pub begin: NaiveDate,
    /// Last reported day (inclusive)
    pub end: NaiveDate,
    /// Years integrated before `begin` and discarded from the output
    pub warmup_years: u32,
}

impl Default for SimulationPeriod {
    fn default() -> Self {
        Self {
            begin: NaiveDate::from_ymd_opt(1980, 1, 1).unwrap_or_default(),
            end: NaiveDate::from_ymd_opt(1989, 12, 31).unwrap_or_default(),
            warmup_years: 1,
        }
    }
}

impl SimulationPeriod {
    pub fn new(begin: NaiveDate, end: NaiveDate) -> Self {
        Self {
            begin,
            end,
            warmup_years: 1,
        }
    }

    pub fn validate(&self) -> HydroResult<()> {
        if self.end < self.begin {
            return Err(HydroError::Config(format!(
                "simulation end {} is before begin {}",
                self.end, self.begin
            )));
        }
        self.forcing_start()?;
        Ok(())
    }

    /// First day of the forcing horizon (`begin` minus the warm-up)
    pub fn forcing_start(&self) -> HydroResult<NaiveDate> {
        self.begin
            .checked_sub_months(Months::new(12 * self.warmup_years))
            .ok_or_else(|| HydroError::Config(format!("warm-up before {} underflows", self.begin)))
    }

    /// Number of reported days, `(end - begin).days + 1`
    pub fn report_len(&self) -> usize {
        (days_between(self.begin, self.end) + 1) as usize
    }

    /// Number of warm-up days preceding `begin`
    pub fn warmup_len(&self) -> usize {
        self.forcing_start()
            .map(|start| days_between(start, self.begin) as usize)
            .unwrap_or(0)
    }

    /// Number of days from the forcing start through `end`
    pub fn horizon_len(&self) -> usize {
        self.warmup_len() + self.report_len()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SolverMethod {
    /// Adaptive Dormand-Prince 5(4)
    Dopri5,
    /// Classic fixed-step Runge-Kutta
    Rk4,
}

/// Settings for the ODE integrator
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IntegratorConfig {
    pub method: SolverMethod,
    /// Absolute error tolerance (mm)
    pub abs_tolerance: FloatValue,
    /// Relative error tolerance
    pub rel_tolerance: FloatValue,
    /// Maximum number of integrator steps within one day
    pub max_steps: u32,
    /// Step size in days, only used by `rk4`
    pub step_size: FloatValue,
}

impl Default for IntegratorConfig {
    fn default() -> Self {
        Self {
            method: SolverMethod::Dopri5,
            abs_tolerance: 1e-8,
            rel_tolerance: 1e-6,
            max_steps: 50_000,
            step_size: 0.01,
        }
    }
}

impl IntegratorConfig {
    pub fn validate(&self) -> HydroResult<()> {
        if !(self.abs_tolerance > 0.0 && self.rel_tolerance >= 0.0) {
            return Err(HydroError::Config(format!(
                "integrator tolerances must be positive (abs={}, rel={})",
                self.abs_tolerance, self.rel_tolerance
            )));
        }
        if self.max_steps == 0 {
            return Err(HydroError::Config(
                "integrator.max_steps must be at least 1".to_string(),
            ));
        }
        if !(self.step_size > 0.0 && self.step_size <= 1.0) {
            return Err(HydroError::Config(format!(
                "integrator.step_size must be in (0, 1] days, got {}",
                self.step_size
            )));
        }
        Ok(())
    }
}

/// Fixed properties of the gauged catchment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CatchmentConfig {
    pub name: String,
    /// Area upstream of the gauge (km²)
    pub area_km2: FloatValue,
    /// Latitude used for extraterrestrial radiation (degrees north)
    pub latitude_deg: FloatValue,
}

impl Default for CatchmentConfig {
    fn default() -> Self {
        Self {
            name: "Fulda at Kämmerzell".to_string(),
            area_km2: 562.41,
            latitude_deg: 50.6,
        }
    }
}

impl CatchmentConfig {
    pub fn validate(&self) -> HydroResult<()> {
        if !(self.area_km2.is_finite() && self.area_km2 > 0.0) {
            return Err(HydroError::Config(format!(
                "catchment.area_km2 must be positive, got {}",
                self.area_km2
            )));
        }
        if !(-90.0..=90.0).contains(&self.latitude_deg) {
            return Err(HydroError::Config(format!(
                "catchment.latitude_deg must be within [-90, 90], got {}",
                self.latitude_deg
            )));
        }
        Ok(())
    }
}

/// Where the forcing files live
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForcingConfig {
    pub directory: PathBuf,
    /// Lumped precipitation file, one value per line (mm/day)
    pub precipitation: String,
    /// Lumped temperature file with tab separated max, min, avg columns (°C)
    pub temperature: String,
    /// Observed discharge at the gauge (m³/s)
    pub discharge: String,
    /// Per-unit file name pattern for the distributed variant
    ///
    /// `{variable}` is replaced by one of `T_avg`, `T_min`, `T_max`, `prec`,
    /// `wind`, `sunshine`, `rel_hum` and `{unit}` by the subcatchment name.
    pub unit_file_pattern: String,
}

impl Default for ForcingConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("."),
            precipitation: "P.txt".to_string(),
            temperature: "T.txt".to_string(),
            discharge: "Q.txt".to_string(),
            unit_file_pattern: "{variable}_{unit}.txt".to_string(),
        }
    }
}

impl ForcingConfig {
    pub fn path(&self, file_name: &str) -> PathBuf {
        self.directory.join(file_name)
    }

    pub fn unit_path(&self, variable: &str, unit: &str) -> PathBuf {
        self.directory.join(
            self.unit_file_pattern
                .replace("{variable}", variable)
                .replace("{unit}", unit),
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Variant {
    /// A single cell for the whole catchment
    Lumped,
    /// One cell per subcatchment
    Distributed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PetMethod {
    /// Temperature-only Hargreaves equation
    Hargreaves,
    /// FAO-56 Penman-Monteith, needs wind, sunshine and humidity
    PenmanMonteith,
}

/// How parameter vectors map onto the cells of a distributed model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParameterMode {
    /// One vector applies to every cell
    Shared,
    /// Every cell has its own block of parameters
    PerUnit,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubcatchmentConfig {
    pub name: String,
    pub area_km2: FloatValue,
    pub elevation_m: FloatValue,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutConfig {
    pub variant: Variant,
    /// Defaults to Hargreaves for lumped and Penman-Monteith for distributed models
    #[serde(skip_serializing_if = "Option::is_none")]
    pub evapotranspiration: Option<PetMethod>,
    pub parameter_mode: ParameterMode,
    pub subcatchments: Vec<SubcatchmentConfig>,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            variant: Variant::Lumped,
            evapotranspiration: None,
            parameter_mode: ParameterMode::Shared,
            subcatchments: vec![],
        }
    }
}

impl LayoutConfig {
    pub fn pet_method(&self) -> PetMethod {
        self.evapotranspiration.unwrap_or(match self.variant {
            Variant::Lumped => PetMethod::Hargreaves,
            Variant::Distributed => PetMethod::PenmanMonteith,
        })
    }

    pub fn validate(&self) -> HydroResult<()> {
        match self.variant {
            Variant::Lumped => {
                if !self.subcatchments.is_empty() {
                    return Err(HydroError::Config(
                        "a lumped model cannot define subcatchments".to_string(),
                    ));
                }
                if self.parameter_mode == ParameterMode::PerUnit {
                    return Err(HydroError::Config(
                        "per_unit parameters require the distributed variant".to_string(),
                    ));
                }
            }
            Variant::Distributed => {
                if self.subcatchments.is_empty() {
                    return Err(HydroError::Config(
                        "a distributed model needs at least one subcatchment".to_string(),
                    ));
                }
                for (i, unit) in self.subcatchments.iter().enumerate() {
                    if self.subcatchments[..i].iter().any(|u| u.name == unit.name) {
                        return Err(HydroError::Config(format!(
                            "subcatchment '{}' is defined twice",
                            unit.name
                        )));
                    }
                }
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationConfig {
    /// Number of model evaluations
    pub runs: usize,
    /// Number of rounds the sampler splits the runs into
    pub subsets: usize,
    /// Days in the calibration window, counted from `begin`
    pub split_offset: usize,
    pub objective: ObjectiveKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
    pub output: PathBuf,
    /// Keep every simulated series in the results file
    pub save_simulations: bool,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            runs: 100_000,
            subsets: 30,
            split_offset: 1827,
            objective: ObjectiveKind::Kge,
            seed: None,
            output: PathBuf::from("results.json"),
            save_simulations: false,
        }
    }
}
