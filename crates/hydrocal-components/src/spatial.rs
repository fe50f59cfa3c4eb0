//! Spatial layout of a catchment and aggregation of cell outflow
//!
//! A catchment is either a single lumped cell or a set of subcatchments.
//! Subcatchment outflow is combined by volume: each depth is converted to a
//! volume over its own area, the volumes are summed, and the sum is spread
//! back over the catchment area.
//!
//! ```rust
//! use hydrocal_components::spatial::{CatchmentLayout, SpatialUnit};
//!
//! let layout = CatchmentLayout::new(
//!     30.0,
//!     vec![
//!         SpatialUnit::subcatchment("upper", 10.0, 500.0),
//!         SpatialUnit::subcatchment("lower", 20.0, 300.0),
//!     ],
//! )
//! .unwrap();
//! // 10 km² at 3 mm and 20 km² at 6 mm give 5 mm over 30 km²
//! assert!((layout.aggregate_day(&[3.0, 6.0]) - 5.0).abs() < 1e-12);
//! ```

use hydrocal_core::config::{ModelConfig, Variant};
use hydrocal_core::errors::{HydroError, HydroResult};
use hydrocal_core::timeseries::{DailyTimeseries, FloatValue};
use hydrocal_core::units::{m3_to_mm, mm_to_m3};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SpatialUnit {
    /// The whole catchment as one cell
    Lumped,
    Subcatchment {
        name: String,
        area_km2: FloatValue,
        /// Metadata only, never calibrated
        elevation_m: FloatValue,
    },
}

impl SpatialUnit {
    pub fn subcatchment(name: &str, area_km2: FloatValue, elevation_m: FloatValue) -> Self {
        SpatialUnit::Subcatchment {
            name: name.to_string(),
            area_km2,
            elevation_m,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            SpatialUnit::Lumped => "lumped",
            SpatialUnit::Subcatchment { name, .. } => name,
        }
    }

    pub fn area_km2(&self) -> Option<FloatValue> {
        match self {
            SpatialUnit::Lumped => None,
            SpatialUnit::Subcatchment { area_km2, .. } => Some(*area_km2),
        }
    }
}

/// The cells of a catchment and the area used to report basin outflow
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatchmentLayout {
    area_km2: FloatValue,
    units: Vec<SpatialUnit>,
}

impl CatchmentLayout {
    pub fn new(area_km2: FloatValue, units: Vec<SpatialUnit>) -> HydroResult<Self> {
        if !(area_km2 > 0.0) {
            return Err(HydroError::Config(format!(
                "catchment area must be positive, got {}",
                area_km2
            )));
        }
        if units.is_empty() {
            return Err(HydroError::Config("a catchment needs at least one cell".to_string()));
        }
        let lumped = units.iter().filter(|u| matches!(u, SpatialUnit::Lumped)).count();
        if lumped > 0 && units.len() > 1 {
            return Err(HydroError::Config(
                "a lumped cell cannot be combined with other cells".to_string(),
            ));
        }
        for unit in &units {
            if let Some(area) = unit.area_km2() {
                if !(area > 0.0) {
                    return Err(HydroError::Config(format!(
                        "subcatchment '{}' has non-positive area {}",
                        unit.name(),
                        area
                    )));
                }
            }
        }
        Ok(Self { area_km2, units })
    }

    pub fn lumped(area_km2: FloatValue) -> HydroResult<Self> {
        Self::new(area_km2, vec![SpatialUnit::Lumped])
    }

    pub fn from_config(config: &ModelConfig) -> HydroResult<Self> {
        match config.model.variant {
            Variant::Lumped => Self::lumped(config.catchment.area_km2),
            Variant::Distributed => Self::new(
                config.catchment.area_km2,
                config
                    .model
                    .subcatchments
                    .iter()
                    .map(|s| SpatialUnit::subcatchment(&s.name, s.area_km2, s.elevation_m))
                    .collect(),
            ),
        }
    }

    pub fn area_km2(&self) -> FloatValue {
        self.area_km2
    }

    pub fn units(&self) -> &[SpatialUnit] {
        &self.units
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    pub fn is_lumped(&self) -> bool {
        matches!(self.units.as_slice(), [SpatialUnit::Lumped])
    }

    pub fn unit_names(&self) -> Vec<String> {
        self.units.iter().map(|u| u.name().to_string()).collect()
    }

    /// Sum of the cell volumes (m³) for one day of cell depths (mm)
    ///
    /// A lumped cell covers the whole catchment.
    pub fn total_volume(&self, depths: &[FloatValue]) -> FloatValue {
        self.units
            .iter()
            .zip(depths)
            .map(|(unit, depth)| mm_to_m3(*depth, unit.area_km2().unwrap_or(self.area_km2)))
            .sum()
    }

    /// Basin depth (mm) for one day of cell depths (mm)
    pub fn aggregate_day(&self, depths: &[FloatValue]) -> FloatValue {
        if self.is_lumped() {
            return depths.first().copied().unwrap_or(FloatValue::NAN);
        }
        m3_to_mm(self.total_volume(depths), self.area_km2)
    }

    /// Combines one series per cell into the basin series
    ///
    /// All series must start on the same day and have the same length. A NaN
    /// in any cell makes the basin value NaN.
    pub fn aggregate(&self, series: &[DailyTimeseries]) -> HydroResult<DailyTimeseries> {
        if series.len() != self.units.len() {
            return Err(HydroError::LengthMismatch {
                expected: self.units.len(),
                actual: series.len(),
            });
        }
        let first = &series[0];
        if self.is_lumped() {
            return Ok(first.clone());
        }
        for s in &series[1..] {
            if s.len() != first.len() {
                return Err(HydroError::LengthMismatch {
                    expected: first.len(),
                    actual: s.len(),
                });
            }
            if s.start() != first.start() {
                return Err(HydroError::Error(format!(
                    "cell series start on {} and {}",
                    first.start(),
                    s.start()
                )));
            }
        }

        let mut day = vec![0.0; series.len()];
        let values = (0..first.len())
            .map(|i| {
                for (slot, s) in day.iter_mut().zip(series) {
                    *slot = s.values()[i];
                }
                self.aggregate_day(&day)
            })
            .collect();
        Ok(DailyTimeseries::new(first.start(), values))
    }
}
