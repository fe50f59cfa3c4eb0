//! Discharge unit conversion
//!
//! Observed discharge arrives as a volumetric flow (m³/s) at the gauge.
//! Models work in area-normalised depth rates (mm/day), so the catchment
//! area is needed to move between the two.
//!
//! ```
//! use hydrocal_core::units::DischargeConverter;
//!
//! let converter = DischargeConverter::new(562.41).unwrap();
//! let depth = converter.to_depth_rate(10.0);
//! let flow = converter.to_volumetric(depth);
//! assert!((flow - 10.0).abs() < 1e-12);
//! ```

use crate::errors::{HydroError, HydroResult};
use crate::timeseries::{DailyTimeseries, FloatValue};
use serde::{Deserialize, Serialize};

pub const SECONDS_PER_DAY: FloatValue = 86400.0;
pub const MM_PER_M: FloatValue = 1000.0;
pub const M2_PER_KM2: FloatValue = 1e6;

/// Volume in m³ of a 1 mm water column over `area_km2`
pub fn mm_to_m3(depth_mm: FloatValue, area_km2: FloatValue) -> FloatValue {
    depth_mm / MM_PER_M * area_km2 * M2_PER_KM2
}

/// Depth in mm of `volume_m3` spread over `area_km2`
pub fn m3_to_mm(volume_m3: FloatValue, area_km2: FloatValue) -> FloatValue {
    volume_m3 * MM_PER_M / (area_km2 * M2_PER_KM2)
}

/// Converts between m³/s and mm/day for a fixed catchment area
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DischargeConverter {
    area_km2: FloatValue,
}

impl DischargeConverter {
    pub fn new(area_km2: FloatValue) -> HydroResult<Self> {
        if !(area_km2.is_finite() && area_km2 > 0.0) {
            return Err(HydroError::Config(format!(
                "catchment area must be positive, got {} km²",
                area_km2
            )));
        }
        Ok(Self { area_km2 })
    }

    pub fn area_km2(&self) -> FloatValue {
        self.area_km2
    }

    /// m³/s to mm/day
    pub fn to_depth_rate(&self, flow_m3_per_s: FloatValue) -> FloatValue {
        flow_m3_per_s * SECONDS_PER_DAY * MM_PER_M / (self.area_km2 * M2_PER_KM2)
    }

    /// mm/day to m³/s
    pub fn to_volumetric(&self, depth_mm_per_day: FloatValue) -> FloatValue {
        depth_mm_per_day * self.area_km2 * M2_PER_KM2 / (SECONDS_PER_DAY * MM_PER_M)
    }

    pub fn series_to_depth_rate(&self, series: &DailyTimeseries) -> DailyTimeseries {
        series.map(|v| self.to_depth_rate(v))
    }

    pub fn series_to_volumetric(&self, series: &DailyTimeseries) -> DailyTimeseries {
        series.map(|v| self.to_volumetric(v))
    }
}
