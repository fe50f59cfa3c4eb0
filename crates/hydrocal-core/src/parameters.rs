//! Calibrated parameters and their search space

use crate::errors::{HydroError, HydroResult};
use crate::timeseries::FloatValue;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Names of the parameters of a single cell, in vector order
pub const CELL_PARAMETER_NAMES: [&str; 12] = [
    "tr_soil_gw",
    "tr_soil_out",
    "tr_gw_out",
    "V0_soil",
    "beta_soil_gw",
    "beta_soil_out",
    "ETV1",
    "fETV0",
    "meltrate",
    "snow_melt_temp",
    "LAI",
    "CanopyClosure",
];

/// A closed interval `[low, high]`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub low: FloatValue,
    pub high: FloatValue,
}

impl Bounds {
    pub fn new(low: FloatValue, high: FloatValue) -> HydroResult<Self> {
        if !(low.is_finite() && high.is_finite() && low <= high) {
            return Err(HydroError::Error(format!(
                "invalid bounds [{}, {}]",
                low, high
            )));
        }
        Ok(Self { low, high })
    }

    pub fn contains(&self, value: FloatValue) -> bool {
        value >= self.low && value <= self.high
    }

    pub fn width(&self) -> FloatValue {
        self.high - self.low
    }

    pub fn midpoint(&self) -> FloatValue {
        0.5 * (self.low + self.high)
    }
}

/// An ordered mapping from parameter names to their bounds
///
/// The insertion order defines the order of values in a parameter vector.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParameterSet {
    parameters: IndexMap<String, Bounds>,
}

impl ParameterSet {
    pub fn new() -> Self {
        Self::default()
    }

    fn from_table(table: [(FloatValue, FloatValue); 12]) -> Self {
        let mut set = Self::new();
        for (name, (low, high)) in CELL_PARAMETER_NAMES.iter().zip(table) {
            set.parameters.insert(name.to_string(), Bounds { low, high });
        }
        set
    }

    /// Search space of the lumped model
    pub fn lumped() -> Self {
        Self::from_table([
            (0.0, 400.0),
            (0.0, 200.0),
            (0.0, 650.0),
            (0.0, 300.0),
            (0.3, 6.0),
            (0.3, 8.0),
            (0.0, 300.0),
            (0.0, 0.9),
            (0.01, 15.0),
            (-3.0, 3.0),
            (1.0, 12.0),
            (0.0, 0.9),
        ])
    }

    /// Search space of a subcatchment cell in the distributed model
    pub fn distributed() -> Self {
        Self::from_table([
            (1.0, 400.0),
            (1.0, 200.0),
            (1.0, 650.0),
            (1.0, 300.0),
            (0.5, 6.0),
            (0.5, 7.0),
            (1.0, 300.0),
            (0.1, 0.9),
            (0.01, 12.0),
            (-3.0, 3.0),
            (1.0, 12.0),
            (0.1, 0.9),
        ])
    }

    /// Repeats this set once per unit, prefixing every name with `<unit>.`
    pub fn per_unit<I, S>(&self, unit_names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut set = Self::new();
        for unit in unit_names {
            for (name, bounds) in self.iter() {
                set.parameters
                    .insert(format!("{}.{}", unit.as_ref(), name), *bounds);
            }
        }
        set
    }

    /// Adds a parameter, replacing the bounds of an existing one
    pub fn add(&mut self, name: &str, bounds: Bounds) -> &mut Self {
        self.parameters.insert(name.to_string(), bounds);
        self
    }

    pub fn len(&self) -> usize {
        self.parameters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parameters.is_empty()
    }

    pub fn names(&self) -> Vec<String> {
        self.parameters.keys().cloned().collect()
    }

    pub fn get(&self, name: &str) -> Option<&Bounds> {
        self.parameters.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Bounds)> {
        self.parameters.iter()
    }

    /// Checks that a vector has one finite, in-bounds value per parameter
    pub fn validate(&self, vector: &[FloatValue]) -> HydroResult<()> {
        if vector.len() != self.len() {
            return Err(HydroError::invalid_parameter(
                "<vector>",
                format!("expected {} values, got {}", self.len(), vector.len()),
            ));
        }
        for ((name, bounds), value) in self.parameters.iter().zip(vector) {
            if !value.is_finite() {
                return Err(HydroError::invalid_parameter(
                    name.as_str(),
                    format!("{} is not finite", value),
                ));
            }
            if !bounds.contains(*value) {
                return Err(HydroError::invalid_parameter(
                    name.as_str(),
                    format!("{} is outside [{}, {}]", value, bounds.low, bounds.high),
                ));
            }
        }
        Ok(())
    }

    /// The vector of bound midpoints
    pub fn midpoints(&self) -> Vec<FloatValue> {
        self.parameters.values().map(|b| b.midpoint()).collect()
    }

    /// Pairs names with the values of a vector
    pub fn to_map(&self, vector: &[FloatValue]) -> IndexMap<String, FloatValue> {
        self.parameters
            .keys()
            .cloned()
            .zip(vector.iter().copied())
            .collect()
    }
}
