//! Recurring maintenance schedules and the service orders they generate.
//!
//! [`recurrence`] holds the pure date math, [`materializer`] turns occurrences
//! into service orders and [`scanner`] drives both over every due schedule.

use std::{fmt, str::FromStr};

use chrono::{Days, NaiveDate, NaiveDateTime, NaiveTime};
use serde::Serialize;
use uuid::Uuid;

pub mod materializer;
pub mod recurrence;
pub mod scanner;
pub mod validation;

pub use materializer::{MaterializeAborted, MaterializeReport, Materializer, OccurrenceFailure};
pub use recurrence::{Frequency, Occurrences, RecurrenceError, RecurrenceOptions};
pub use scanner::{ScanReport, ScheduleFailure, ScheduleScanner};

pub const TIME_FORMAT: &str = "%H:%M";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Priority {
    Low,
    Medium,
    High,
    Urgent,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "LOW",
            Priority::Medium => "MEDIUM",
            Priority::High => "HIGH",
            Priority::Urgent => "URGENT",
        }
    }
}

impl FromStr for Priority {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_uppercase().as_str() {
            "LOW" => Ok(Priority::Low),
            "MEDIUM" => Ok(Priority::Medium),
            "HIGH" => Ok(Priority::High),
            "URGENT" => Ok(Priority::Urgent),
            other => Err(format!("unknown priority {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ServiceState {
    Pending,
    InProgress,
    Completed,
    Cancelled,
}

impl ServiceState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceState::Pending => "PENDING",
            ServiceState::InProgress => "IN_PROGRESS",
            ServiceState::Completed => "COMPLETED",
            ServiceState::Cancelled => "CANCELLED",
        }
    }
}

impl FromStr for ServiceState {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "PENDING" => Ok(ServiceState::Pending),
            "IN_PROGRESS" => Ok(ServiceState::InProgress),
            "COMPLETED" => Ok(ServiceState::Completed),
            "CANCELLED" => Ok(ServiceState::Cancelled),
            other => Err(format!("unknown service state {other}")),
        }
    }
}

impl fmt::Display for ServiceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A recurring maintenance configuration ("programación").
///
/// `start_date` is the fixed anchor of the recurrence: occurrence walks always
/// begin there, never at `next_run_at`.
#[derive(Debug, Clone, PartialEq)]
pub struct Schedule {
    pub id: Uuid,
    pub client_id: Uuid,
    pub technician_id: Option<Uuid>,
    pub equipment_ids: Vec<Uuid>,
    pub name: String,
    pub description: Option<String>,
    pub service_type: String,
    pub start_time: NaiveTime,
    pub end_time: Option<NaiveTime>,
    pub priority: Priority,
    pub notes: Option<String>,
    pub frequency: Frequency,
    pub custom_interval_days: Option<i32>,
    /// Stored for the admin UI; the calculator does not read it.
    pub days_of_week: Vec<i16>,
    pub day_of_month: Option<u32>,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
    pub next_run_at: Option<NaiveDate>,
    pub last_run_at: Option<NaiveDateTime>,
    pub is_active: bool,
}

impl Schedule {
    pub fn recurrence_options(&self) -> RecurrenceOptions {
        RecurrenceOptions {
            custom_interval_days: self.custom_interval_days,
            day_of_month: self.day_of_month,
        }
    }

    /// Occurrence dates from `start_date` up to `horizon`, inclusive, never
    /// past `end_date`.
    pub fn occurrences(&self, horizon: NaiveDate) -> Occurrences<'_> {
        let until = match self.end_date {
            Some(end) if end < horizon => end,
            _ => horizon,
        };
        Occurrences::new(
            &self.frequency,
            self.recurrence_options(),
            self.start_date,
            until,
        )
    }

    pub fn occurrence_key(&self, day: NaiveDate) -> OccurrenceKey {
        OccurrenceKey {
            schedule_id: self.id,
            day,
            start_time: self.start_time,
        }
    }
}

/// At most one active service order exists per key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OccurrenceKey {
    pub schedule_id: Uuid,
    pub day: NaiveDate,
    pub start_time: NaiveTime,
}

impl OccurrenceKey {
    pub fn start_time_label(&self) -> String {
        self.start_time.format(TIME_FORMAT).to_string()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewServiceOrder {
    pub order_number: String,
    pub client_id: Uuid,
    pub technician_id: Option<Uuid>,
    pub equipment_id: Option<Uuid>,
    pub schedule_id: Option<Uuid>,
    pub scheduled_at: NaiveDateTime,
    pub start_time: NaiveTime,
    pub end_time: Option<NaiveTime>,
    pub state: ServiceState,
    pub service_type: String,
    pub priority: Priority,
    pub description: Option<String>,
    pub notes: Option<String>,
    pub details: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ServiceOrder {
    pub id: Uuid,
    pub order_number: String,
    pub client_id: Uuid,
    pub technician_id: Option<Uuid>,
    pub equipment_id: Option<Uuid>,
    pub schedule_id: Option<Uuid>,
    pub scheduled_at: NaiveDateTime,
    pub start_time: NaiveTime,
    pub end_time: Option<NaiveTime>,
    pub state: ServiceState,
    pub service_type: String,
    pub priority: Priority,
    pub description: Option<String>,
    pub notes: Option<String>,
    pub details: serde_json::Value,
    pub is_active: bool,
    pub created_at: NaiveDateTime,
}

pub fn parse_time(value: &str) -> Option<NaiveTime> {
    let trimmed = value.trim();
    if trimmed.len() != 5 {
        return None;
    }
    NaiveTime::parse_from_str(trimmed, TIME_FORMAT).ok()
}

pub fn format_time(value: NaiveTime) -> String {
    value.format(TIME_FORMAT).to_string()
}

/// `today + days`, or `None` when `days` is negative or leaves the date range.
pub fn horizon_after(today: NaiveDate, days: i64) -> Option<NaiveDate> {
    let days = u64::try_from(days).ok()?;
    today.checked_add_days(Days::new(days))
}
