use std::{fmt, str::FromStr};

use chrono::{Datelike, Days, Months, NaiveDate};
use serde::Serialize;
use thiserror::Error;
use tracing::warn;

/// Advance applied when a stored schedule cannot be advanced by its own rule.
pub const FALLBACK_INTERVAL_DAYS: u64 = 30;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecurrenceError {
    #[error("unrecognized frequency {0:?}")]
    UnrecognizedFrequency(String),
    #[error("CUSTOM frequency requires customIntervalDays")]
    MissingCustomInterval,
    #[error("customIntervalDays must be at least 1, got {0}")]
    InvalidCustomInterval(i32),
    #[error("next occurrence after {0} is out of the supported date range")]
    OutOfRange(NaiveDate),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(into = "String")]
pub enum Frequency {
    Daily,
    Weekly,
    Biweekly,
    Monthly,
    Bimonthly,
    Quarterly,
    Semiannual,
    Annual,
    Custom,
    /// A stored value that predates validation. Never produced by `FromStr`.
    Unrecognized(String),
}

impl Frequency {
    pub const ALL: [Frequency; 9] = [
        Frequency::Daily,
        Frequency::Weekly,
        Frequency::Biweekly,
        Frequency::Monthly,
        Frequency::Bimonthly,
        Frequency::Quarterly,
        Frequency::Semiannual,
        Frequency::Annual,
        Frequency::Custom,
    ];

    pub fn as_str(&self) -> &str {
        match self {
            Frequency::Daily => "DAILY",
            Frequency::Weekly => "WEEKLY",
            Frequency::Biweekly => "BIWEEKLY",
            Frequency::Monthly => "MONTHLY",
            Frequency::Bimonthly => "BIMONTHLY",
            Frequency::Quarterly => "QUARTERLY",
            Frequency::Semiannual => "SEMIANNUAL",
            Frequency::Annual => "ANNUAL",
            Frequency::Custom => "CUSTOM",
            Frequency::Unrecognized(raw) => raw,
        }
    }

    /// Lenient parse for values read back from storage.
    pub fn from_stored(value: &str) -> Self {
        value
            .parse()
            .unwrap_or_else(|_| Frequency::Unrecognized(value.to_string()))
    }
}

impl FromStr for Frequency {
    type Err = RecurrenceError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_ascii_uppercase();
        Frequency::ALL
            .into_iter()
            .find(|frequency| frequency.as_str() == normalized)
            .ok_or_else(|| RecurrenceError::UnrecognizedFrequency(value.to_string()))
    }
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<Frequency> for String {
    fn from(value: Frequency) -> Self {
        value.as_str().to_string()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecurrenceOptions {
    pub custom_interval_days: Option<i32>,
    /// Pins MONTHLY results to this day, clamped to the month's last day.
    pub day_of_month: Option<u32>,
}

/// Computes the occurrence following `anchor`.
///
/// Pure calendar arithmetic on naive dates. Month-based rules clamp to the last
/// day of the target month, so Jan 31 + 1 month is Feb 28/29.
pub fn next_occurrence(
    frequency: &Frequency,
    anchor: NaiveDate,
    options: RecurrenceOptions,
) -> Result<NaiveDate, RecurrenceError> {
    let next = match frequency {
        Frequency::Daily => anchor.checked_add_days(Days::new(1)),
        Frequency::Weekly => anchor.checked_add_days(Days::new(7)),
        Frequency::Biweekly => anchor.checked_add_days(Days::new(15)),
        Frequency::Monthly => anchor
            .checked_add_months(Months::new(1))
            .and_then(|shifted| match options.day_of_month {
                Some(day) => pin_day_of_month(shifted, day),
                None => Some(shifted),
            }),
        Frequency::Bimonthly => anchor.checked_add_months(Months::new(2)),
        Frequency::Quarterly => anchor.checked_add_months(Months::new(3)),
        Frequency::Semiannual => anchor.checked_add_months(Months::new(6)),
        Frequency::Annual => anchor.checked_add_months(Months::new(12)),
        Frequency::Custom => {
            let days = options
                .custom_interval_days
                .ok_or(RecurrenceError::MissingCustomInterval)?;
            if days < 1 {
                return Err(RecurrenceError::InvalidCustomInterval(days));
            }
            anchor.checked_add_days(Days::new(days as u64))
        }
        Frequency::Unrecognized(raw) => {
            return Err(RecurrenceError::UnrecognizedFrequency(raw.clone()))
        }
    };

    next.ok_or(RecurrenceError::OutOfRange(anchor))
}

/// Like [`next_occurrence`], but a misconfigured rule advances by
/// [`FALLBACK_INTERVAL_DAYS`] instead of failing. `None` only when the date
/// range is exhausted.
pub fn next_occurrence_or_fallback(
    frequency: &Frequency,
    anchor: NaiveDate,
    options: RecurrenceOptions,
) -> Option<NaiveDate> {
    match next_occurrence(frequency, anchor, options) {
        Ok(next) => Some(next),
        Err(RecurrenceError::OutOfRange(_)) => None,
        Err(err) => {
            warn!(
                frequency = %frequency,
                anchor = %anchor,
                error = %err,
                "falling back to {FALLBACK_INTERVAL_DAYS}-day recurrence"
            );
            anchor.checked_add_days(Days::new(FALLBACK_INTERVAL_DAYS))
        }
    }
}

/// First occurrence of the walk anchored at `start` that falls on or after `date`.
pub fn first_occurrence_on_or_after(
    frequency: &Frequency,
    options: RecurrenceOptions,
    start: NaiveDate,
    date: NaiveDate,
) -> Option<NaiveDate> {
    Occurrences::new(frequency, options, start, NaiveDate::MAX).find(|day| *day >= date)
}

fn pin_day_of_month(date: NaiveDate, day: u32) -> Option<NaiveDate> {
    let last = last_day_of_month(date)?;
    date.with_day(day.clamp(1, last))
}

fn last_day_of_month(date: NaiveDate) -> Option<u32> {
    date.with_day(1)?
        .checked_add_months(Months::new(1))?
        .pred_opt()
        .map(|last| last.day())
}

/// Strictly increasing walk of occurrence dates from `start` through `until`.
pub struct Occurrences<'a> {
    frequency: &'a Frequency,
    options: RecurrenceOptions,
    cursor: Option<NaiveDate>,
    until: NaiveDate,
    fell_back: bool,
}

impl<'a> Occurrences<'a> {
    pub fn new(
        frequency: &'a Frequency,
        options: RecurrenceOptions,
        start: NaiveDate,
        until: NaiveDate,
    ) -> Self {
        Self {
            frequency,
            options,
            cursor: Some(start),
            until,
            fell_back: false,
        }
    }

    fn advance(&mut self, current: NaiveDate) -> Option<NaiveDate> {
        match next_occurrence(self.frequency, current, self.options) {
            Ok(next) => Some(next),
            Err(RecurrenceError::OutOfRange(_)) => None,
            Err(err) => {
                if !self.fell_back {
                    warn!(
                        frequency = %self.frequency,
                        error = %err,
                        "misconfigured recurrence, walking with {FALLBACK_INTERVAL_DAYS}-day steps"
                    );
                    self.fell_back = true;
                }
                current.checked_add_days(Days::new(FALLBACK_INTERVAL_DAYS))
            }
        }
    }
}

impl Iterator for Occurrences<'_> {
    type Item = NaiveDate;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.cursor.take()?;
        if current > self.until {
            return None;
        }
        self.cursor = self.advance(current).filter(|next| *next > current);
        Some(current)
    }
}
