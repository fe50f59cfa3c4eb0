//! Daily, date-indexed timeseries
//!
//! Every series in a model run shares the same fixed step of one day.
//! A series is anchored to the calendar date of its first value, so two
//! series can be aligned or sliced purely by date arithmetic.

use crate::errors::{HydroError, HydroResult};
use chrono::{Days, NaiveDate};
use ndarray::ArrayView1;
use serde::{Deserialize, Serialize};

pub type FloatValue = f64;
/// Model time in days since the start of the forcing horizon
pub type Time = f64;

/// Number of days from `from` to `to` (negative if `to` is earlier)
pub fn days_between(from: NaiveDate, to: NaiveDate) -> i64 {
    (to - from).num_days()
}

/// A sequence of values with a fixed one-day step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyTimeseries {
    start: NaiveDate,
    values: Vec<FloatValue>,
}

/// Simulated or observed discharge in mm/day
pub type DischargeSeries = DailyTimeseries;

impl DailyTimeseries {
    pub fn new(start: NaiveDate, values: Vec<FloatValue>) -> Self {
        Self { start, values }
    }

    /// A series of `len` days holding the same value
    pub fn filled(start: NaiveDate, len: usize, value: FloatValue) -> Self {
        Self::new(start, vec![value; len])
    }

    /// A series of `len` days where every value is undefined (NaN)
    ///
    /// This is the shape returned when a simulation could not be completed.
    pub fn undefined(start: NaiveDate, len: usize) -> Self {
        Self::filled(start, len, FloatValue::NAN)
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    /// Date of the last value, or `None` for an empty series
    pub fn end(&self) -> Option<NaiveDate> {
        match self.values.len() {
            0 => None,
            n => self.date_at(n - 1),
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn values(&self) -> &[FloatValue] {
        &self.values
    }

    pub fn view(&self) -> ArrayView1<'_, FloatValue> {
        ArrayView1::from(&self.values)
    }

    pub fn get(&self, index: usize) -> Option<FloatValue> {
        self.values.get(index).copied()
    }

    pub fn date_at(&self, index: usize) -> Option<NaiveDate> {
        self.start.checked_add_days(Days::new(index as u64))
    }

    /// Index of `date` within the series, if it is covered
    pub fn index_of(&self, date: NaiveDate) -> Option<usize> {
        let offset = days_between(self.start, date);
        if offset < 0 || offset as usize >= self.values.len() {
            None
        } else {
            Some(offset as usize)
        }
    }

    /// Values on and after `begin` up to and including `end`
    pub fn slice(&self, begin: NaiveDate, end: NaiveDate) -> HydroResult<Self> {
        if end < begin {
            return Err(HydroError::Error(format!(
                "Cannot slice from {} to an earlier date {}",
                begin, end
            )));
        }
        let first = self.index_of(begin).ok_or_else(|| {
            HydroError::Error(format!(
                "{} is outside of the series starting {} with {} values",
                begin,
                self.start,
                self.len()
            ))
        })?;
        let last = self.index_of(end).ok_or_else(|| {
            HydroError::Error(format!(
                "{} is outside of the series starting {} with {} values",
                end,
                self.start,
                self.len()
            ))
        })?;

        Ok(Self::new(begin, self.values[first..=last].to_vec()))
    }

    /// Splits the series into `[0, offset)` and `[offset, len)`
    ///
    /// An offset past the end yields an empty second half.
    pub fn split_at(&self, offset: usize) -> (Self, Self) {
        let offset = offset.min(self.values.len());
        let (head, tail) = self.values.split_at(offset);
        let tail_start = self
            .start
            .checked_add_days(Days::new(offset as u64))
            .unwrap_or(self.start);
        (
            Self::new(self.start, head.to_vec()),
            Self::new(tail_start, tail.to_vec()),
        )
    }

    pub fn map<F>(&self, f: F) -> Self
    where
        F: Fn(FloatValue) -> FloatValue,
    {
        Self::new(self.start, self.values.iter().map(|v| f(*v)).collect())
    }

    /// True if every value is a finite number
    pub fn is_finite(&self) -> bool {
        self.values.iter().all(|v| v.is_finite())
    }

    pub fn iter(&self) -> impl Iterator<Item = (NaiveDate, FloatValue)> + '_ {
        self.values
            .iter()
            .enumerate()
            .map(move |(i, v)| (self.start + Days::new(i as u64), *v))
    }

    pub fn sum(&self) -> FloatValue {
        self.values.iter().sum()
    }
}
