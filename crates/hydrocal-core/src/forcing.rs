//! Forcing data loading
//!
//! Forcing files hold one day per line without a header. Single-variable files
//! contain one value per line; combined temperature files contain three tab
//! separated columns in the order max, min, avg.
//!
//! Every series starts at the first day of the warm-up period, so the files must
//! cover at least `[begin - warm-up, end]`. Values beyond `end` are ignored.
//! Any missing or malformed line is a [`HydroError::Load`].

use crate::config::{ForcingConfig, SimulationPeriod};
use crate::errors::{HydroError, HydroResult};
use crate::timeseries::{DailyTimeseries, DischargeSeries, FloatValue};
use crate::units::DischargeConverter;
use chrono::NaiveDate;
use log::debug;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// Climate variables read from per-unit files
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ForcingVariable {
    Precipitation,
    TemperatureAvg,
    TemperatureMin,
    TemperatureMax,
    Wind,
    Sunshine,
    RelativeHumidity,
}

impl ForcingVariable {
    pub const ALL: [ForcingVariable; 7] = [
        ForcingVariable::TemperatureAvg,
        ForcingVariable::TemperatureMin,
        ForcingVariable::TemperatureMax,
        ForcingVariable::Precipitation,
        ForcingVariable::Wind,
        ForcingVariable::Sunshine,
        ForcingVariable::RelativeHumidity,
    ];

    /// Name used in per-unit file names
    pub fn file_key(&self) -> &'static str {
        match self {
            ForcingVariable::Precipitation => "prec",
            ForcingVariable::TemperatureAvg => "T_avg",
            ForcingVariable::TemperatureMin => "T_min",
            ForcingVariable::TemperatureMax => "T_max",
            ForcingVariable::Wind => "wind",
            ForcingVariable::Sunshine => "sunshine",
            ForcingVariable::RelativeHumidity => "rel_hum",
        }
    }
}

/// Reads `expected_len` rows of `columns` tab separated values
///
/// Returns the values column by column.
fn read_rows(path: &Path, columns: usize, expected_len: usize) -> HydroResult<Vec<Vec<FloatValue>>> {
    let file = File::open(path).map_err(|e| HydroError::load(path, 0, e.to_string()))?;
    let reader = BufReader::new(file);

    let mut data = vec![Vec::with_capacity(expected_len); columns];
    let mut trailing_blank: Option<usize> = None;

    for (index, line) in reader.lines().enumerate() {
        let line_number = index + 1;
        let line = line.map_err(|e| HydroError::load(path, line_number, e.to_string()))?;
        if data[0].len() == expected_len {
            break;
        }
        if line.trim().is_empty() {
            trailing_blank.get_or_insert(line_number);
            continue;
        }
        if let Some(blank) = trailing_blank {
            return Err(HydroError::load(path, blank, "unexpected blank line"));
        }

        let fields: Vec<&str> = line.trim_end_matches(['\n', '\r']).split('\t').collect();
        if fields.len() != columns {
            return Err(HydroError::load(
                path,
                line_number,
                format!("expected {} column(s), found {}", columns, fields.len()),
            ));
        }
        for (column, field) in fields.iter().enumerate() {
            let value: FloatValue = field.trim().parse().map_err(|_| {
                HydroError::load(path, line_number, format!("cannot parse '{}' as a number", field))
            })?;
            if !value.is_finite() {
                return Err(HydroError::load(
                    path,
                    line_number,
                    format!("non-finite value '{}'", field),
                ));
            }
            data[column].push(value);
        }
    }

    let found = data[0].len();
    if found < expected_len {
        return Err(HydroError::load(
            path,
            found + 1,
            format!("file has {} value(s) but {} day(s) are required", found, expected_len),
        ));
    }
    debug!("Read {} day(s) from {}", found, path.display());
    Ok(data)
}

/// Reads a single column file into a daily series starting at `start`
pub fn read_single_column<P: AsRef<Path>>(
    path: P,
    start: NaiveDate,
    expected_len: usize,
) -> HydroResult<DailyTimeseries> {
    let mut data = read_rows(path.as_ref(), 1, expected_len)?;
    Ok(DailyTimeseries::new(start, data.remove(0)))
}

/// Daily temperatures read from a combined file
#[derive(Debug, Clone)]
pub struct TemperatureSeries {
    pub max: DailyTimeseries,
    pub min: DailyTimeseries,
    pub avg: DailyTimeseries,
}

/// Reads a three column (max, min, avg) temperature file
pub fn read_temperature<P: AsRef<Path>>(
    path: P,
    start: NaiveDate,
    expected_len: usize,
) -> HydroResult<TemperatureSeries> {
    let mut data = read_rows(path.as_ref(), 3, expected_len)?;
    let avg = data.remove(2);
    let min = data.remove(1);
    let max = data.remove(0);
    Ok(TemperatureSeries {
        max: DailyTimeseries::new(start, max),
        min: DailyTimeseries::new(start, min),
        avg: DailyTimeseries::new(start, avg),
    })
}

/// Forcing values for a single day
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ForcingDay {
    pub date: NaiveDate,
    /// mm/day
    pub precipitation: FloatValue,
    /// °C
    pub temperature_avg: FloatValue,
    pub temperature_min: FloatValue,
    pub temperature_max: FloatValue,
    /// m/s at 2 m
    pub wind: Option<FloatValue>,
    /// Hours of bright sunshine
    pub sunshine: Option<FloatValue>,
    /// %
    pub relative_humidity: Option<FloatValue>,
}

/// All forcing series of one spatial unit
///
/// Every series starts on the same day and has the same length.
#[derive(Debug, Clone)]
pub struct ForcingSeries {
    precipitation: DailyTimeseries,
    temperature_avg: DailyTimeseries,
    temperature_min: DailyTimeseries,
    temperature_max: DailyTimeseries,
    wind: Option<DailyTimeseries>,
    sunshine: Option<DailyTimeseries>,
    relative_humidity: Option<DailyTimeseries>,
}

fn check_aligned(reference: &DailyTimeseries, other: &DailyTimeseries, name: &str) -> HydroResult<()> {
    if reference.start() != other.start() || reference.len() != other.len() {
        return Err(HydroError::Error(format!(
            "{} starts {} with {} values, expected {} with {} values",
            name,
            other.start(),
            other.len(),
            reference.start(),
            reference.len()
        )));
    }
    Ok(())
}

impl ForcingSeries {
    pub fn new(
        precipitation: DailyTimeseries,
        temperature: TemperatureSeries,
    ) -> HydroResult<Self> {
        check_aligned(&precipitation, &temperature.avg, "average temperature")?;
        check_aligned(&precipitation, &temperature.min, "minimum temperature")?;
        check_aligned(&precipitation, &temperature.max, "maximum temperature")?;
        Ok(Self {
            precipitation,
            temperature_avg: temperature.avg,
            temperature_min: temperature.min,
            temperature_max: temperature.max,
            wind: None,
            sunshine: None,
            relative_humidity: None,
        })
    }

    /// Adds the inputs needed by radiation-based evapotranspiration
    pub fn with_meteorology(
        mut self,
        wind: DailyTimeseries,
        sunshine: DailyTimeseries,
        relative_humidity: DailyTimeseries,
    ) -> HydroResult<Self> {
        check_aligned(&self.precipitation, &wind, "wind")?;
        check_aligned(&self.precipitation, &sunshine, "sunshine")?;
        check_aligned(&self.precipitation, &relative_humidity, "relative humidity")?;
        self.wind = Some(wind);
        self.sunshine = Some(sunshine);
        self.relative_humidity = Some(relative_humidity);
        Ok(self)
    }

    /// Loads the forcing of a lumped model
    pub fn load_lumped(config: &ForcingConfig, period: &SimulationPeriod) -> HydroResult<Self> {
        let start = period.forcing_start()?;
        let len = period.horizon_len();
        let precipitation = read_single_column(config.path(&config.precipitation), start, len)?;
        let temperature = read_temperature(config.path(&config.temperature), start, len)?;
        Self::new(precipitation, temperature)
    }

    /// Loads all seven per-unit forcing files of one subcatchment
    pub fn load_unit(
        config: &ForcingConfig,
        unit_name: &str,
        period: &SimulationPeriod,
    ) -> HydroResult<Self> {
        let start = period.forcing_start()?;
        let len = period.horizon_len();
        let read = |variable: ForcingVariable| {
            read_single_column(config.unit_path(variable.file_key(), unit_name), start, len)
        };

        let temperature = TemperatureSeries {
            max: read(ForcingVariable::TemperatureMax)?,
            min: read(ForcingVariable::TemperatureMin)?,
            avg: read(ForcingVariable::TemperatureAvg)?,
        };
        Self::new(read(ForcingVariable::Precipitation)?, temperature)?.with_meteorology(
            read(ForcingVariable::Wind)?,
            read(ForcingVariable::Sunshine)?,
            read(ForcingVariable::RelativeHumidity)?,
        )
    }

    pub fn start(&self) -> NaiveDate {
        self.precipitation.start()
    }

    pub fn len(&self) -> usize {
        self.precipitation.len()
    }

    pub fn is_empty(&self) -> bool {
        self.precipitation.is_empty()
    }

    pub fn has_meteorology(&self) -> bool {
        self.wind.is_some() && self.sunshine.is_some() && self.relative_humidity.is_some()
    }

    pub fn precipitation(&self) -> &DailyTimeseries {
        &self.precipitation
    }

    pub fn temperature_avg(&self) -> &DailyTimeseries {
        &self.temperature_avg
    }

    /// The forcing of day `index` counted from the start of the series
    pub fn day(&self, index: usize) -> Option<ForcingDay> {
        let value = |ts: &Option<DailyTimeseries>| ts.as_ref().and_then(|ts| ts.get(index));
        Some(ForcingDay {
            date: self.precipitation.date_at(index)?,
            precipitation: self.precipitation.get(index)?,
            temperature_avg: self.temperature_avg.get(index)?,
            temperature_min: self.temperature_min.get(index)?,
            temperature_max: self.temperature_max.get(index)?,
            wind: value(&self.wind),
            sunshine: value(&self.sunshine),
            relative_humidity: value(&self.relative_humidity),
        })
    }

    pub fn days(&self) -> impl Iterator<Item = ForcingDay> + '_ {
        (0..self.len()).filter_map(move |i| self.day(i))
    }
}

/// Loads observed discharge (m³/s) and converts it to mm/day
///
/// The returned series covers the whole forcing horizon, warm-up included.
pub fn load_observed_discharge(
    config: &ForcingConfig,
    period: &SimulationPeriod,
    converter: &DischargeConverter,
) -> HydroResult<DischargeSeries> {
    let raw = read_single_column(
        config.path(&config.discharge),
        period.forcing_start()?,
        period.horizon_len(),
    )?;
    Ok(converter.series_to_depth_rate(&raw))
}
