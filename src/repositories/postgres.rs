use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime, Utc};
use diesel::{prelude::*, result::DatabaseErrorKind, PgConnection};
use tracing::warn;
use uuid::Uuid;

use crate::{
    db::PgPool,
    models::{NewServiceOrderRow, ScheduleRow, ServiceOrderRow},
    schema::{schedules, service_orders},
    scheduling::{
        format_time, parse_time, Frequency, NewServiceOrder, OccurrenceKey, Priority, Schedule,
        ServiceOrder, ServiceState,
    },
};

use super::{
    DueSchedules, InsertOutcome, RepositoryError, RepositoryResult, SchedulePatch,
    ScheduleRepository, ServiceOrderRepository, UnreadableSchedule,
};

pub const OCCURRENCE_CONSTRAINT: &str = "service_orders_occurrence_key";
pub const ORDER_NUMBER_CONSTRAINT: &str = "service_orders_order_number_key";

async fn with_conn<F, T>(pool: &PgPool, f: F) -> RepositoryResult<T>
where
    F: FnOnce(&mut PgConnection) -> RepositoryResult<T> + Send + 'static,
    T: Send + 'static,
{
    let pool = pool.clone();
    tokio::task::spawn_blocking(move || {
        let mut conn = pool
            .get()
            .map_err(|err| RepositoryError::Unavailable(format!("database pool error: {err}")))?;
        f(&mut conn)
    })
    .await
    .map_err(|err| RepositoryError::Unavailable(format!("database task failed: {err}")))?
}

#[derive(Clone)]
pub struct PgScheduleRepository {
    pool: PgPool,
}

impl PgScheduleRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(AsChangeset)]
#[diesel(table_name = schedules)]
struct RunChangeset {
    next_run_at: Option<NaiveDate>,
    last_run_at: Option<NaiveDateTime>,
    updated_at: NaiveDateTime,
}

#[async_trait]
impl ScheduleRepository for PgScheduleRepository {
    async fn find_due(&self, horizon: NaiveDate) -> RepositoryResult<DueSchedules> {
        with_conn(&self.pool, move |conn| {
            let rows: Vec<ScheduleRow> = schedules::table
                .filter(schedules::is_active.eq(true))
                .filter(
                    schedules::next_run_at
                        .le(horizon)
                        .or(schedules::next_run_at.is_null()),
                )
                .order(schedules::created_at.asc())
                .load(conn)?;

            let mut due = DueSchedules::default();
            for row in rows {
                let schedule_id = row.id;
                match Schedule::try_from(row) {
                    Ok(schedule) => due.ready.push(schedule),
                    Err(error) => {
                        warn!(%schedule_id, error = %error, "due schedule cannot be read");
                        due.unreadable.push(UnreadableSchedule { schedule_id, error });
                    }
                }
            }
            Ok(due)
        })
        .await
    }

    async fn find_by_id(&self, id: Uuid) -> RepositoryResult<Option<Schedule>> {
        with_conn(&self.pool, move |conn| {
            schedules::table
                .find(id)
                .first::<ScheduleRow>(conn)
                .optional()?
                .map(Schedule::try_from)
                .transpose()
        })
        .await
    }

    async fn update(&self, id: Uuid, patch: SchedulePatch) -> RepositoryResult<Schedule> {
        with_conn(&self.pool, move |conn| {
            let changeset = RunChangeset {
                next_run_at: patch.next_run_at,
                last_run_at: patch.last_run_at,
                updated_at: Utc::now().naive_utc(),
            };
            let row: ScheduleRow = diesel::update(schedules::table.find(id))
                .set(&changeset)
                .get_result(conn)
                .map_err(|err| match err {
                    diesel::result::Error::NotFound => RepositoryError::NotFound,
                    other => RepositoryError::from(other),
                })?;
            Schedule::try_from(row)
        })
        .await
    }
}

#[derive(Clone)]
pub struct PgServiceOrderRepository {
    pool: PgPool,
}

impl PgServiceOrderRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ServiceOrderRepository for PgServiceOrderRepository {
    async fn create_for_occurrence(
        &self,
        key: &OccurrenceKey,
        order: NewServiceOrder,
    ) -> RepositoryResult<InsertOutcome> {
        let key = *key;
        let order_number = order.order_number.clone();
        let new_row = new_order_row(order);

        let result = with_conn(&self.pool, move |conn| {
            conn.transaction::<InsertOutcome, RepositoryError, _>(|conn| {
                let existing = service_orders::table
                    .filter(service_orders::schedule_id.eq(key.schedule_id))
                    .filter(service_orders::scheduled_day.eq(key.day))
                    .filter(service_orders::start_time.eq(key.start_time_label()))
                    .filter(service_orders::is_active.eq(true))
                    .select(service_orders::id)
                    .first::<Uuid>(conn)
                    .optional()?;
                if existing.is_some() {
                    return Ok(InsertOutcome::AlreadyMaterialized);
                }

                let row: ServiceOrderRow = diesel::insert_into(service_orders::table)
                    .values(&new_row)
                    .get_result(conn)?;
                Ok(InsertOutcome::Created(ServiceOrder::try_from(row)?))
            })
        })
        .await;

        match result {
            Err(RepositoryError::Database(diesel::result::Error::DatabaseError(kind, info))) => {
                let constraint = info.constraint_name().map(str::to_owned);
                match (kind, constraint.as_deref()) {
                    (DatabaseErrorKind::UniqueViolation, Some(OCCURRENCE_CONSTRAINT)) => {
                        Ok(InsertOutcome::AlreadyMaterialized)
                    }
                    (DatabaseErrorKind::UniqueViolation, Some(ORDER_NUMBER_CONSTRAINT)) => {
                        Err(RepositoryError::DuplicateOrderNumber(order_number))
                    }
                    (DatabaseErrorKind::ForeignKeyViolation, _) => {
                        Err(RepositoryError::Constraint(info.message().to_string()))
                    }
                    _ => Err(RepositoryError::Database(
                        diesel::result::Error::DatabaseError(kind, info),
                    )),
                }
            }
            other => other,
        }
    }

    async fn count_by_schedule_id(&self, schedule_id: Uuid) -> RepositoryResult<i64> {
        with_conn(&self.pool, move |conn| {
            let count = service_orders::table
                .filter(service_orders::schedule_id.eq(schedule_id))
                .count()
                .get_result::<i64>(conn)?;
            Ok(count)
        })
        .await
    }
}

fn new_order_row(order: NewServiceOrder) -> NewServiceOrderRow {
    NewServiceOrderRow {
        id: Uuid::new_v4(),
        order_number: order.order_number,
        client_id: order.client_id,
        technician_id: order.technician_id,
        equipment_id: order.equipment_id,
        schedule_id: order.schedule_id,
        scheduled_at: order.scheduled_at,
        scheduled_day: order.scheduled_at.date(),
        start_time: format_time(order.start_time),
        end_time: order.end_time.map(format_time),
        state: order.state.as_str().to_string(),
        service_type: order.service_type,
        priority: order.priority.as_str().to_string(),
        description: order.description,
        notes: order.notes,
        details: order.details,
    }
}

fn stored_time(owner: Uuid, field: &str, value: &str) -> RepositoryResult<chrono::NaiveTime> {
    parse_time(value).ok_or_else(|| {
        RepositoryError::InvalidRecord(format!("{owner} has malformed {field} {value:?}"))
    })
}

impl TryFrom<ScheduleRow> for Schedule {
    type Error = RepositoryError;

    fn try_from(row: ScheduleRow) -> Result<Self, Self::Error> {
        let start_time = stored_time(row.id, "start_time", &row.start_time)?;
        let end_time = row
            .end_time
            .as_deref()
            .map(|value| stored_time(row.id, "end_time", value))
            .transpose()?;

        Ok(Schedule {
            id: row.id,
            client_id: row.client_id,
            technician_id: row.technician_id,
            equipment_ids: row.equipment_ids,
            name: row.name,
            description: row.description,
            service_type: row.service_type,
            start_time,
            end_time,
            priority: row.priority.parse().unwrap_or(Priority::Medium),
            notes: row.notes,
            frequency: Frequency::from_stored(&row.frequency),
            custom_interval_days: row.custom_interval_days,
            days_of_week: row.days_of_week,
            day_of_month: row.day_of_month.and_then(|day| u32::try_from(day).ok()),
            start_date: row.start_date,
            end_date: row.end_date,
            next_run_at: row.next_run_at,
            last_run_at: row.last_run_at,
            is_active: row.is_active,
        })
    }
}

impl TryFrom<ServiceOrderRow> for ServiceOrder {
    type Error = RepositoryError;

    fn try_from(row: ServiceOrderRow) -> Result<Self, Self::Error> {
        let start_time = stored_time(row.id, "start_time", &row.start_time)?;
        let end_time = row
            .end_time
            .as_deref()
            .map(|value| stored_time(row.id, "end_time", value))
            .transpose()?;
        let state = row
            .state
            .parse::<ServiceState>()
            .map_err(|err: String| RepositoryError::InvalidRecord(format!("{}: {err}", row.id)))?;

        Ok(ServiceOrder {
            id: row.id,
            order_number: row.order_number,
            client_id: row.client_id,
            technician_id: row.technician_id,
            equipment_id: row.equipment_id,
            schedule_id: row.schedule_id,
            scheduled_at: row.scheduled_at,
            start_time,
            end_time,
            state,
            service_type: row.service_type,
            priority: row.priority.parse().unwrap_or(Priority::Medium),
            description: row.description,
            notes: row.notes,
            details: row.details,
            is_active: row.is_active,
            created_at: row.created_at,
        })
    }
}
