//! Date ranges for settlement periods
//!
//! Settlements cover an inclusive range of collection dates. Both ends are
//! calendar dates in the vendor's business day, so no timezone is involved.

use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Errors related to temporal operations
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TemporalError {
    #[error("Invalid range: date_from {from} is after date_to {to}")]
    InvalidRange {
        from: NaiveDate,
        to: NaiveDate,
    },

    #[error("Date arithmetic out of range")]
    OutOfRange,
}

/// An inclusive range of calendar dates `[date_from, date_to]`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DateRange {
    date_from: NaiveDate,
    date_to: NaiveDate,
}

impl DateRange {
    /// Creates a range, rejecting `date_from > date_to`
    pub fn new(date_from: NaiveDate, date_to: NaiveDate) -> Result<Self, TemporalError> {
        if date_from > date_to {
            return Err(TemporalError::InvalidRange {
                from: date_from,
                to: date_to,
            });
        }
        Ok(Self { date_from, date_to })
    }

    /// A single-day range
    pub fn single_day(date: NaiveDate) -> Self {
        Self {
            date_from: date,
            date_to: date,
        }
    }

    /// The range ending at `date_to` and reaching back `days` days
    ///
    /// `ending_at(d, 15)` covers `[d - 15, d]`, the default settlement window.
    pub fn ending_at(date_to: NaiveDate, days: u64) -> Result<Self, TemporalError> {
        let date_from = date_to
            .checked_sub_days(Days::new(days))
            .ok_or(TemporalError::OutOfRange)?;
        Self::new(date_from, date_to)
    }

    pub fn date_from(&self) -> NaiveDate {
        self.date_from
    }

    pub fn date_to(&self) -> NaiveDate {
        self.date_to
    }

    /// Returns true if `date` falls within the range (both ends inclusive)
    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.date_from && date <= self.date_to
    }

    /// Number of calendar days covered
    pub fn days(&self) -> i64 {
        (self.date_to - self.date_from).num_days() + 1
    }
}

impl fmt::Display for DateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} to {}", self.date_from, self.date_to)
    }
}
