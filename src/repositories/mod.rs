use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use diesel::result::DatabaseErrorKind;
use thiserror::Error;
use uuid::Uuid;

use crate::scheduling::{NewServiceOrder, OccurrenceKey, Schedule, ServiceOrder};

pub mod postgres;

pub use postgres::{PgScheduleRepository, PgServiceOrderRepository};

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("storage unavailable: {0}")]
    Unavailable(String),
    #[error("record not found")]
    NotFound,
    #[error("order number {0} is already taken")]
    DuplicateOrderNumber(String),
    #[error("constraint violated: {0}")]
    Constraint(String),
    #[error("invalid stored record: {0}")]
    InvalidRecord(String),
    #[error("database error: {0}")]
    Database(#[from] diesel::result::Error),
}

impl RepositoryError {
    /// Errors worth retrying on the next scan rather than recording per occurrence.
    pub fn is_transient(&self) -> bool {
        match self {
            RepositoryError::Unavailable(_) => true,
            RepositoryError::Database(diesel::result::Error::DatabaseError(kind, _)) => matches!(
                kind,
                DatabaseErrorKind::SerializationFailure | DatabaseErrorKind::ClosedConnection
            ),
            RepositoryError::Database(diesel::result::Error::BrokenTransactionManager) => true,
            _ => false,
        }
    }
}

pub type RepositoryResult<T> = Result<T, RepositoryError>;

/// Fields the scan writes back after processing a schedule. `None` leaves the
/// stored value untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SchedulePatch {
    pub next_run_at: Option<NaiveDate>,
    pub last_run_at: Option<NaiveDateTime>,
}

/// A due schedule whose stored row cannot be read back as a [`Schedule`].
#[derive(Debug)]
pub struct UnreadableSchedule {
    pub schedule_id: Uuid,
    pub error: RepositoryError,
}

#[derive(Debug, Default)]
pub struct DueSchedules {
    pub ready: Vec<Schedule>,
    pub unreadable: Vec<UnreadableSchedule>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum InsertOutcome {
    Created(ServiceOrder),
    AlreadyMaterialized,
}

#[async_trait]
pub trait ScheduleRepository: Send + Sync + 'static {
    /// Active schedules whose `next_run_at` is unset or on/before `horizon`.
    /// Rows that fail to decode come back in `unreadable` instead of failing
    /// the whole lookup.
    async fn find_due(&self, horizon: NaiveDate) -> RepositoryResult<DueSchedules>;

    async fn find_by_id(&self, id: Uuid) -> RepositoryResult<Option<Schedule>>;

    async fn update(&self, id: Uuid, patch: SchedulePatch) -> RepositoryResult<Schedule>;
}

#[async_trait]
pub trait ServiceOrderRepository: Send + Sync + 'static {
    /// Inserts `order` unless an active order already holds `key`.
    ///
    /// The existence check and the insert must be atomic with respect to other
    /// callers using the same key. A uniqueness conflict on `key` is reported
    /// as [`InsertOutcome::AlreadyMaterialized`], never as an error.
    async fn create_for_occurrence(
        &self,
        key: &OccurrenceKey,
        order: NewServiceOrder,
    ) -> RepositoryResult<InsertOutcome>;

    async fn count_by_schedule_id(&self, schedule_id: Uuid) -> RepositoryResult<i64>;
}
