use chrono::{NaiveDate, NaiveTime};
use thiserror::Error;

use super::{parse_time, Frequency, Priority, RecurrenceError};

/// Configuration problems rejected before a schedule is stored.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScheduleValidationError {
    #[error("{0} must not be empty")]
    EmptyField(&'static str),
    #[error("{field} must be a HH:MM time, got {value:?}")]
    InvalidTime { field: &'static str, value: String },
    #[error(transparent)]
    Recurrence(#[from] RecurrenceError),
    #[error("dayOfMonth must be between 1 and 31, got {0}")]
    DayOfMonthOutOfRange(i16),
    #[error("daysOfWeek entries must be between 0 and 6, got {0}")]
    DayOfWeekOutOfRange(i16),
    #[error("unknown priority {0:?}")]
    UnknownPriority(String),
    #[error("endDate {end} is before startDate {start}")]
    EndBeforeStart { start: NaiveDate, end: NaiveDate },
    #[error("startDate cannot be changed after creation")]
    StartDateImmutable,
}

pub type ValidationResult<T> = Result<T, ScheduleValidationError>;

#[derive(Debug, Clone, Copy)]
pub struct RecurrenceInput<'a> {
    pub frequency: &'a str,
    pub custom_interval_days: Option<i32>,
    pub day_of_month: Option<i16>,
    pub days_of_week: &'a [i16],
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidRecurrence {
    pub frequency: Frequency,
    /// Kept only for CUSTOM.
    pub custom_interval_days: Option<i32>,
    pub day_of_month: Option<i16>,
    /// Sorted and deduplicated.
    pub days_of_week: Vec<i16>,
}

pub fn validate_recurrence(input: RecurrenceInput<'_>) -> ValidationResult<ValidRecurrence> {
    let frequency: Frequency = input.frequency.parse()?;

    let custom_interval_days = if frequency == Frequency::Custom {
        match input.custom_interval_days {
            None => return Err(RecurrenceError::MissingCustomInterval.into()),
            Some(days) if days < 1 => {
                return Err(RecurrenceError::InvalidCustomInterval(days).into())
            }
            Some(days) => Some(days),
        }
    } else {
        None
    };

    if let Some(day) = input.day_of_month {
        if !(1..=31).contains(&day) {
            return Err(ScheduleValidationError::DayOfMonthOutOfRange(day));
        }
    }

    let mut days_of_week = input.days_of_week.to_vec();
    if let Some(bad) = days_of_week.iter().find(|day| !(0..=6).contains(*day)) {
        return Err(ScheduleValidationError::DayOfWeekOutOfRange(*bad));
    }
    days_of_week.sort_unstable();
    days_of_week.dedup();

    Ok(ValidRecurrence {
        frequency,
        custom_interval_days,
        day_of_month: input.day_of_month,
        days_of_week,
    })
}

pub fn require_text(field: &'static str, value: &str) -> ValidationResult<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ScheduleValidationError::EmptyField(field));
    }
    Ok(trimmed.to_string())
}

pub fn require_time(field: &'static str, value: &str) -> ValidationResult<NaiveTime> {
    parse_time(value).ok_or_else(|| ScheduleValidationError::InvalidTime {
        field,
        value: value.to_string(),
    })
}

pub fn parse_priority(value: Option<&str>) -> ValidationResult<Priority> {
    match value {
        None => Ok(Priority::Medium),
        Some(raw) => raw
            .parse()
            .map_err(|_| ScheduleValidationError::UnknownPriority(raw.to_string())),
    }
}

pub fn validate_window(start: NaiveDate, end: Option<NaiveDate>) -> ValidationResult<()> {
    match end {
        Some(end) if end < start => Err(ScheduleValidationError::EndBeforeStart { start, end }),
        _ => Ok(()),
    }
}
