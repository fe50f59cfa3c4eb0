//! Flux laws between the storages of a cell
//!
//! All volumes are depths in mm over the cell area and all rates are mm/day.
//! Every law is continuous in the storage volume so the right-hand side of the
//! ODE system stays smooth enough for the adaptive integrator.

use hydrocal_core::timeseries::FloatValue;
use serde::{Deserialize, Serialize};

/// Snow depth (mm) over which melt ramps up to its full degree-day rate
pub const MELT_RAMP_DEPTH: FloatValue = 1.0;
/// Canopy storage capacity per unit of leaf area index (mm)
pub const CANOPY_CAPACITY_PER_LAI: FloatValue = 0.1;

/// Nonlinear reservoir outflow
///
/// $$ q = \left(\frac{V}{V_{ref}}\right)^\beta \frac{V_{ref}}{t_r} $$
///
/// `volume` and `v_ref` in mm, `residence_time` in days. Zero for empty storages.
pub fn power_law(
    volume: FloatValue,
    v_ref: FloatValue,
    beta: FloatValue,
    residence_time: FloatValue,
) -> FloatValue {
    if volume <= 0.0 {
        return 0.0;
    }
    (volume / v_ref).powf(beta) * v_ref / residence_time
}

/// Piecewise linear limitation of transpiration by soil moisture
///
/// The stress factor is 0 up to the floor volume `fETV0 * ETV1`, rises
/// linearly and reaches 1 at `ETV1`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VolumeStress {
    /// Volume (mm) at and above which transpiration is unlimited
    pub etv1: FloatValue,
    /// Volume (mm) at and below which transpiration stops
    pub etv0: FloatValue,
}

impl VolumeStress {
    pub fn new(etv1: FloatValue, f_etv0: FloatValue) -> Self {
        Self {
            etv1,
            etv0: (etv1 * f_etv0).max(0.0),
        }
    }

    pub fn stress(&self, volume: FloatValue) -> FloatValue {
        if volume <= 0.0 {
            0.0
        } else if volume >= self.etv1 {
            1.0
        } else if volume <= self.etv0 {
            0.0
        } else {
            (volume - self.etv0) / (self.etv1 - self.etv0)
        }
    }
}

/// Degree-day snowmelt (mm/day)
///
/// Melt needs both snow and a temperature above the threshold. Below
/// [`MELT_RAMP_DEPTH`] the rate scales with the available snow.
pub fn snowmelt(
    snow: FloatValue,
    temperature: FloatValue,
    threshold: FloatValue,
    meltrate: FloatValue,
) -> FloatValue {
    if snow <= 0.0 || temperature <= threshold {
        return 0.0;
    }
    let availability = (snow / MELT_RAMP_DEPTH).min(1.0);
    meltrate * (temperature - threshold) * availability
}

/// Where a day's precipitation goes before any storage is involved
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PrecipitationPartition {
    pub snowfall: FloatValue,
    /// Rain falling onto the canopy
    pub intercepted: FloatValue,
    /// Rain falling straight through to the soil
    pub throughfall: FloatValue,
}

impl PrecipitationPartition {
    pub fn total(&self) -> FloatValue {
        self.snowfall + self.intercepted + self.throughfall
    }
}

/// Splits precipitation into snow and rain and the rain into canopy and soil parts
///
/// Precipitation falls as snow when `temperature <= threshold`.
pub fn partition_precipitation(
    precipitation: FloatValue,
    temperature: FloatValue,
    threshold: FloatValue,
    canopy_closure: FloatValue,
) -> PrecipitationPartition {
    let precipitation = precipitation.max(0.0);
    if temperature <= threshold {
        return PrecipitationPartition {
            snowfall: precipitation,
            ..Default::default()
        };
    }
    let intercepted = precipitation * canopy_closure;
    PrecipitationPartition {
        snowfall: 0.0,
        intercepted,
        throughfall: precipitation - intercepted,
    }
}

/// Interception storage of the canopy
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Canopy {
    /// mm
    pub capacity: FloatValue,
}

impl Canopy {
    pub fn from_lai(lai: FloatValue) -> Self {
        Self {
            capacity: CANOPY_CAPACITY_PER_LAI * lai,
        }
    }

    /// Filling of the canopy in `[0, 1]`
    pub fn fill(&self, storage: FloatValue) -> FloatValue {
        if storage <= 0.0 {
            return 0.0;
        }
        (storage / self.capacity).min(1.0)
    }

    /// Part of the canopy input that drips onto the soil
    pub fn overflow(&self, input: FloatValue, storage: FloatValue) -> FloatValue {
        input * self.fill(storage)
    }

    /// Evaporation of intercepted water, limited by the canopy filling
    pub fn evaporation(&self, pet: FloatValue, storage: FloatValue) -> FloatValue {
        pet.max(0.0) * self.fill(storage)
    }
}
