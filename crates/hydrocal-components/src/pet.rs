//! Potential evapotranspiration from daily forcing
//!
//! Radiation terms follow FAO Irrigation and Drainage Paper 56. Rates are
//! returned as mm/day and never negative.

use chrono::Datelike;
use hydrocal_core::config::PetMethod;
use hydrocal_core::errors::{HydroError, HydroResult};
use hydrocal_core::forcing::{ForcingDay, ForcingSeries};
use hydrocal_core::timeseries::{DailyTimeseries, FloatValue};
use std::f64::consts::PI;

/// Solar constant (MJ m⁻² min⁻¹)
const SOLAR_CONSTANT: FloatValue = 0.0820;
/// Stefan-Boltzmann constant (MJ K⁻⁴ m⁻² day⁻¹)
const STEFAN_BOLTZMANN: FloatValue = 4.903e-9;
/// Latent heat conversion from MJ m⁻² day⁻¹ to mm/day
const MJ_TO_MM: FloatValue = 0.408;
/// Standard atmospheric pressure (kPa)
const ATMOSPHERIC_PRESSURE: FloatValue = 101.3;
const ALBEDO: FloatValue = 0.23;

/// Solar declination (rad) and sunset hour angle (rad)
fn solar_geometry(latitude_deg: FloatValue, day_of_year: u32) -> (FloatValue, FloatValue) {
    let phi = latitude_deg.to_radians();
    let declination = 0.409 * (2.0 * PI * day_of_year as FloatValue / 365.0 - 1.39).sin();
    // clamped for polar day and night
    let sunset = (-phi.tan() * declination.tan()).clamp(-1.0, 1.0).acos();
    (declination, sunset)
}

/// Daily extraterrestrial radiation (MJ m⁻² day⁻¹)
pub fn extraterrestrial_radiation(latitude_deg: FloatValue, day_of_year: u32) -> FloatValue {
    let phi = latitude_deg.to_radians();
    let (declination, sunset) = solar_geometry(latitude_deg, day_of_year);
    let inverse_distance = 1.0 + 0.033 * (2.0 * PI * day_of_year as FloatValue / 365.0).cos();

    let ra = 24.0 * 60.0 / PI
        * SOLAR_CONSTANT
        * inverse_distance
        * (sunset * phi.sin() * declination.sin()
            + phi.cos() * declination.cos() * sunset.sin());
    ra.max(0.0)
}

/// Maximum possible hours of sunshine
pub fn daylight_hours(latitude_deg: FloatValue, day_of_year: u32) -> FloatValue {
    let (_, sunset) = solar_geometry(latitude_deg, day_of_year);
    24.0 / PI * sunset
}

/// Saturation vapour pressure (kPa) at a temperature in °C
fn saturation_vapour_pressure(temperature: FloatValue) -> FloatValue {
    0.6108 * (17.27 * temperature / (temperature + 237.3)).exp()
}

/// Hargreaves reference evapotranspiration (mm/day)
pub fn hargreaves(
    temperature_min: FloatValue,
    temperature_max: FloatValue,
    temperature_avg: FloatValue,
    radiation: FloatValue,
) -> FloatValue {
    let range = (temperature_max - temperature_min).max(0.0);
    (0.0023 * MJ_TO_MM * radiation * (temperature_avg + 17.8) * range.sqrt()).max(0.0)
}

/// Meteorology of one day for the Penman-Monteith equation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PenmanMonteithInputs {
    pub temperature_min: FloatValue,
    pub temperature_max: FloatValue,
    pub temperature_avg: FloatValue,
    /// m/s at 2 m
    pub wind: FloatValue,
    /// hours
    pub sunshine: FloatValue,
    /// %
    pub relative_humidity: FloatValue,
}

/// FAO-56 Penman-Monteith grass reference evapotranspiration (mm/day)
///
/// Soil heat flux is neglected at the daily step.
pub fn penman_monteith(
    inputs: &PenmanMonteithInputs,
    latitude_deg: FloatValue,
    day_of_year: u32,
) -> FloatValue {
    let ra = extraterrestrial_radiation(latitude_deg, day_of_year);
    let n_max = daylight_hours(latitude_deg, day_of_year);
    let sunshine_fraction = if n_max > 0.0 {
        (inputs.sunshine / n_max).clamp(0.0, 1.0)
    } else {
        0.0
    };
    let rs = (0.25 + 0.5 * sunshine_fraction) * ra;
    let rso = 0.75 * ra;
    let relative_shortwave = if rso > 0.0 { (rs / rso).min(1.0) } else { 1.0 };

    let es = 0.5
        * (saturation_vapour_pressure(inputs.temperature_max)
            + saturation_vapour_pressure(inputs.temperature_min));
    let ea = es * (inputs.relative_humidity / 100.0).clamp(0.0, 1.0);

    let t_max_k = inputs.temperature_max + 273.16;
    let t_min_k = inputs.temperature_min + 273.16;
    let rnl = STEFAN_BOLTZMANN
        * 0.5
        * (t_max_k.powi(4) + t_min_k.powi(4))
        * (0.34 - 0.14 * ea.sqrt())
        * (1.35 * relative_shortwave - 0.35);
    let rn = (1.0 - ALBEDO) * rs - rnl;

    let t = inputs.temperature_avg;
    let delta = 4098.0 * saturation_vapour_pressure(t) / (t + 237.3).powi(2);
    let gamma = 0.665e-3 * ATMOSPHERIC_PRESSURE;
    let u2 = inputs.wind.max(0.0);

    let numerator = MJ_TO_MM * delta * rn + gamma * 900.0 / (t + 273.0) * u2 * (es - ea);
    let denominator = delta + gamma * (1.0 + 0.34 * u2);
    (numerator / denominator).max(0.0)
}

fn penman_monteith_day(day: &ForcingDay, latitude_deg: FloatValue) -> HydroResult<FloatValue> {
    let missing = |name: &str| {
        HydroError::Config(format!(
            "Penman-Monteith needs {} forcing (missing on {})",
            name, day.date
        ))
    };
    let inputs = PenmanMonteithInputs {
        temperature_min: day.temperature_min,
        temperature_max: day.temperature_max,
        temperature_avg: day.temperature_avg,
        wind: day.wind.ok_or_else(|| missing("wind"))?,
        sunshine: day.sunshine.ok_or_else(|| missing("sunshine"))?,
        relative_humidity: day
            .relative_humidity
            .ok_or_else(|| missing("relative humidity"))?,
    };
    Ok(penman_monteith(&inputs, latitude_deg, day.date.ordinal()))
}

/// Daily potential evapotranspiration for a whole forcing series
pub fn potential_evapotranspiration(
    forcing: &ForcingSeries,
    method: PetMethod,
    latitude_deg: FloatValue,
) -> HydroResult<DailyTimeseries> {
    let values = forcing
        .days()
        .map(|day| match method {
            PetMethod::Hargreaves => Ok(hargreaves(
                day.temperature_min,
                day.temperature_max,
                day.temperature_avg,
                extraterrestrial_radiation(latitude_deg, day.date.ordinal()),
            )),
            PetMethod::PenmanMonteith => penman_monteith_day(&day, latitude_deg),
        })
        .collect::<HydroResult<Vec<_>>>()?;
    Ok(DailyTimeseries::new(forcing.start(), values))
}
