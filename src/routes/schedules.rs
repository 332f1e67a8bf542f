use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use diesel::{
    dsl::{exists, not},
    prelude::*,
    PgConnection,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::{
    auth::AuthenticatedUser,
    error::{AppError, AppResult},
    models::{NewScheduleRow, ScheduleRow, ServiceOrderRow},
    schema::{clients, schedules, service_orders, technicians},
    scheduling::{
        format_time, horizon_after,
        recurrence::first_occurrence_on_or_after,
        validation::{
            parse_priority, require_text, require_time, validate_recurrence, validate_window,
            RecurrenceInput, ScheduleValidationError,
        },
        Frequency, MaterializeReport, OccurrenceFailure, Priority, RecurrenceOptions, ScanReport,
        Schedule, ServiceOrder, ServiceState,
    },
    state::AppState,
    utils::json::{classify_nullable, optional_field, NullableValue},
};

use super::to_iso;

const PREVIEW_LIMIT: usize = 366;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateScheduleRequest {
    pub client_id: Uuid,
    pub technician_id: Option<Uuid>,
    #[serde(default)]
    pub equipment_ids: Vec<Uuid>,
    pub name: String,
    pub description: Option<String>,
    pub service_type: String,
    pub start_time: String,
    pub end_time: Option<String>,
    pub priority: Option<String>,
    pub notes: Option<String>,
    pub frequency: String,
    pub custom_interval_days: Option<i32>,
    #[serde(default)]
    pub days_of_week: Vec<i16>,
    pub day_of_month: Option<i16>,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleListQuery {
    pub client_id: Option<Uuid>,
    pub active: Option<bool>,
}

#[derive(Deserialize)]
pub struct HorizonQuery {
    pub until: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleResponse {
    pub id: Uuid,
    pub client_id: Uuid,
    pub technician_id: Option<Uuid>,
    pub equipment_ids: Vec<Uuid>,
    pub name: String,
    pub description: Option<String>,
    pub service_type: String,
    pub start_time: String,
    pub end_time: Option<String>,
    pub priority: Priority,
    pub notes: Option<String>,
    pub frequency: Frequency,
    pub custom_interval_days: Option<i32>,
    pub days_of_week: Vec<i16>,
    pub day_of_month: Option<u32>,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
    pub next_run_at: Option<NaiveDate>,
    pub last_run_at: Option<String>,
    pub is_active: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generated_count: Option<i64>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceOrderResponse {
    pub id: Uuid,
    pub order_number: String,
    pub client_id: Uuid,
    pub technician_id: Option<Uuid>,
    pub equipment_id: Option<Uuid>,
    pub schedule_id: Option<Uuid>,
    pub scheduled_date: NaiveDateTime,
    pub start_time: String,
    pub end_time: Option<String>,
    pub state: ServiceState,
    pub service_type: String,
    pub priority: Priority,
    pub description: Option<String>,
    pub notes: Option<String>,
    pub details: Value,
    pub created_at: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewResponse {
    pub until: NaiveDate,
    pub occurrences: Vec<NaiveDate>,
    pub truncated: bool,
}

#[derive(AsChangeset, Default)]
#[diesel(table_name = schedules)]
struct ScheduleChangeset {
    technician_id: Option<Option<Uuid>>,
    equipment_ids: Option<Vec<Uuid>>,
    name: Option<String>,
    description: Option<Option<String>>,
    service_type: Option<String>,
    start_time: Option<String>,
    end_time: Option<Option<String>>,
    priority: Option<String>,
    notes: Option<Option<String>>,
    frequency: Option<String>,
    custom_interval_days: Option<Option<i32>>,
    days_of_week: Option<Vec<i16>>,
    day_of_month: Option<Option<i16>>,
    end_date: Option<Option<NaiveDate>>,
    next_run_at: Option<Option<NaiveDate>>,
}

pub async fn create_schedule(
    State(state): State<AppState>,
    Json(payload): Json<CreateScheduleRequest>,
) -> AppResult<(StatusCode, Json<ScheduleResponse>)> {
    let name = require_text("name", &payload.name)?;
    let service_type = require_text("serviceType", &payload.service_type)?;
    let start_time = require_time("startTime", &payload.start_time)?;
    let end_time = payload
        .end_time
        .as_deref()
        .map(|value| require_time("endTime", value))
        .transpose()?;
    let priority = parse_priority(payload.priority.as_deref())?;
    let recurrence = validate_recurrence(RecurrenceInput {
        frequency: &payload.frequency,
        custom_interval_days: payload.custom_interval_days,
        day_of_month: payload.day_of_month,
        days_of_week: &payload.days_of_week,
    })?;
    validate_window(payload.start_date, payload.end_date)?;

    let mut conn = state.db()?;
    ensure_client_exists(&mut conn, payload.client_id)?;
    if let Some(technician_id) = payload.technician_id {
        ensure_technician_exists(&mut conn, technician_id)?;
    }

    let new_schedule = NewScheduleRow {
        id: Uuid::new_v4(),
        client_id: payload.client_id,
        technician_id: payload.technician_id,
        equipment_ids: payload.equipment_ids,
        name,
        description: super::clean_text(payload.description),
        service_type,
        start_time: format_time(start_time),
        end_time: end_time.map(format_time),
        priority: priority.as_str().to_string(),
        notes: super::clean_text(payload.notes),
        frequency: recurrence.frequency.as_str().to_string(),
        custom_interval_days: recurrence.custom_interval_days,
        days_of_week: recurrence.days_of_week,
        day_of_month: recurrence.day_of_month,
        start_date: payload.start_date,
        end_date: payload.end_date,
        next_run_at: Some(payload.start_date),
        is_active: true,
    };

    let row: ScheduleRow = diesel::insert_into(schedules::table)
        .values(&new_schedule)
        .get_result(&mut conn)?;
    tracing::info!(schedule_id = %row.id, frequency = %row.frequency, "schedule created");

    let schedule = Schedule::try_from(row)?;
    Ok((StatusCode::CREATED, Json(to_response(schedule, Some(0)))))
}

pub async fn list_schedules(
    State(state): State<AppState>,
    Query(query): Query<ScheduleListQuery>,
) -> AppResult<Json<Vec<ScheduleResponse>>> {
    let mut conn = state.db()?;

    let mut statement = schedules::table.into_boxed();
    if let Some(client_id) = query.client_id {
        statement = statement.filter(schedules::client_id.eq(client_id));
    }
    if let Some(active) = query.active {
        statement = statement.filter(schedules::is_active.eq(active));
    }

    let rows: Vec<ScheduleRow> = statement
        .order((schedules::next_run_at.asc(), schedules::name.asc()))
        .load(&mut conn)?;

    let response = rows
        .into_iter()
        .map(|row| Schedule::try_from(row).map(|schedule| to_response(schedule, None)))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Json(response))
}

pub async fn get_schedule(
    State(state): State<AppState>,
    Path(schedule_id): Path<Uuid>,
) -> AppResult<Json<ScheduleResponse>> {
    let schedule = load_schedule(&state, schedule_id).await?;
    let generated = state
        .service_orders
        .count_by_schedule_id(schedule_id)
        .await?;
    Ok(Json(to_response(schedule, Some(generated))))
}

pub async fn update_schedule(
    State(state): State<AppState>,
    Path(schedule_id): Path<Uuid>,
    Json(body): Json<Value>,
) -> AppResult<Json<ScheduleResponse>> {
    let mut conn = state.db()?;
    let existing: ScheduleRow = schedules::table.find(schedule_id).first(&mut conn)?;

    if body.get("startDate").is_some() {
        return Err(ScheduleValidationError::StartDateImmutable.into());
    }

    let mut changeset = ScheduleChangeset::default();

    if let Some(name) = optional_field::<String>(&body, "name").map_err(AppError::bad_request)? {
        changeset.name = Some(require_text("name", &name)?);
    }
    if let Some(service_type) =
        optional_field::<String>(&body, "serviceType").map_err(AppError::bad_request)?
    {
        changeset.service_type = Some(require_text("serviceType", &service_type)?);
    }
    if let Some(start_time) =
        optional_field::<String>(&body, "startTime").map_err(AppError::bad_request)?
    {
        changeset.start_time = Some(format_time(require_time("startTime", &start_time)?));
    }
    if let Some(priority) =
        optional_field::<String>(&body, "priority").map_err(AppError::bad_request)?
    {
        changeset.priority = Some(parse_priority(Some(&priority))?.as_str().to_string());
    }
    changeset.equipment_ids =
        optional_field::<Vec<Uuid>>(&body, "equipmentIds").map_err(AppError::bad_request)?;

    changeset.description = classify_nullable::<String>(&body, "description")
        .map_err(AppError::bad_request)?
        .into_change()
        .map(super::clean_text);
    changeset.notes = classify_nullable::<String>(&body, "notes")
        .map_err(AppError::bad_request)?
        .into_change()
        .map(super::clean_text);
    changeset.end_time = match classify_nullable::<String>(&body, "endTime")
        .map_err(AppError::bad_request)?
    {
        NullableValue::Omitted => None,
        NullableValue::Null => Some(None),
        NullableValue::Value(value) => Some(Some(format_time(require_time("endTime", &value)?))),
    };

    changeset.technician_id = classify_nullable::<Uuid>(&body, "technicianId")
        .map_err(AppError::bad_request)?
        .into_change();
    if let Some(Some(technician_id)) = changeset.technician_id {
        ensure_technician_exists(&mut conn, technician_id)?;
    }

    changeset.end_date = classify_nullable::<NaiveDate>(&body, "endDate")
        .map_err(AppError::bad_request)?
        .into_change();
    let end_date = changeset.end_date.unwrap_or(existing.end_date);
    validate_window(existing.start_date, end_date)?;

    let frequency_change =
        optional_field::<String>(&body, "frequency").map_err(AppError::bad_request)?;
    let interval_change = classify_nullable::<i32>(&body, "customIntervalDays")
        .map_err(AppError::bad_request)?
        .into_change();
    let day_of_month_change = classify_nullable::<i16>(&body, "dayOfMonth")
        .map_err(AppError::bad_request)?
        .into_change();
    let days_of_week_change =
        optional_field::<Vec<i16>>(&body, "daysOfWeek").map_err(AppError::bad_request)?;

    let recurrence_changed =
        frequency_change.is_some() || interval_change.is_some() || day_of_month_change.is_some();

    if recurrence_changed || days_of_week_change.is_some() {
        let frequency = frequency_change.unwrap_or_else(|| existing.frequency.clone());
        let days_of_week = days_of_week_change.unwrap_or_else(|| existing.days_of_week.clone());
        let recurrence = validate_recurrence(RecurrenceInput {
            frequency: &frequency,
            custom_interval_days: interval_change.unwrap_or(existing.custom_interval_days),
            day_of_month: day_of_month_change.unwrap_or(existing.day_of_month),
            days_of_week: &days_of_week,
        })?;

        if recurrence_changed {
            let options = RecurrenceOptions {
                custom_interval_days: recurrence.custom_interval_days,
                day_of_month: recurrence
                    .day_of_month
                    .and_then(|day| u32::try_from(day).ok()),
            };
            let today = Utc::now().date_naive();
            changeset.next_run_at = Some(first_occurrence_on_or_after(
                &recurrence.frequency,
                options,
                existing.start_date,
                today,
            ));
            changeset.frequency = Some(recurrence.frequency.as_str().to_string());
            changeset.custom_interval_days = Some(recurrence.custom_interval_days);
            changeset.day_of_month = Some(recurrence.day_of_month);
        }
        changeset.days_of_week = Some(recurrence.days_of_week);
    }

    let now = Utc::now().naive_utc();
    let row: ScheduleRow = diesel::update(schedules::table.find(schedule_id))
        .set((&changeset, schedules::updated_at.eq(now)))
        .get_result(&mut conn)?;
    if recurrence_changed {
        tracing::info!(
            schedule_id = %row.id,
            next_run_at = ?row.next_run_at,
            "schedule recurrence changed"
        );
    }

    let schedule = Schedule::try_from(row)?;
    Ok(Json(to_response(schedule, None)))
}

pub async fn toggle_schedule(
    State(state): State<AppState>,
    Path(schedule_id): Path<Uuid>,
) -> AppResult<Json<ScheduleResponse>> {
    let mut conn = state.db()?;
    let now = Utc::now().naive_utc();
    let row: ScheduleRow = diesel::update(schedules::table.find(schedule_id))
        .set((
            schedules::is_active.eq(not(schedules::is_active)),
            schedules::updated_at.eq(now),
        ))
        .get_result(&mut conn)?;
    tracing::info!(schedule_id = %row.id, is_active = row.is_active, "schedule toggled");

    let schedule = Schedule::try_from(row)?;
    Ok(Json(to_response(schedule, None)))
}

pub async fn delete_schedule(
    State(state): State<AppState>,
    Path(schedule_id): Path<Uuid>,
    user: AuthenticatedUser,
) -> AppResult<Response> {
    user.require_admin()?;
    load_schedule(&state, schedule_id).await?;

    let generated = state
        .service_orders
        .count_by_schedule_id(schedule_id)
        .await?;

    let mut conn = state.db()?;
    if generated == 0 {
        diesel::delete(schedules::table.find(schedule_id)).execute(&mut conn)?;
        tracing::info!(%schedule_id, "schedule deleted");
        return Ok(StatusCode::NO_CONTENT.into_response());
    }

    diesel::update(schedules::table.find(schedule_id))
        .set((
            schedules::is_active.eq(false),
            schedules::updated_at.eq(Utc::now().naive_utc()),
        ))
        .execute(&mut conn)?;
    tracing::info!(%schedule_id, generated, "schedule has service orders, deactivated instead");

    Ok((
        StatusCode::OK,
        Json(json!({ "deactivated": true, "generatedCount": generated })),
    )
        .into_response())
}

pub async fn preview_occurrences(
    State(state): State<AppState>,
    Path(schedule_id): Path<Uuid>,
    Query(query): Query<HorizonQuery>,
) -> AppResult<Json<PreviewResponse>> {
    let schedule = load_schedule(&state, schedule_id).await?;
    let until = resolve_horizon(
        query.until.as_deref(),
        state.config.generation_horizon_days,
        Utc::now().date_naive(),
    )?;

    let mut occurrences: Vec<NaiveDate> =
        schedule.occurrences(until).take(PREVIEW_LIMIT + 1).collect();
    let truncated = occurrences.len() > PREVIEW_LIMIT;
    occurrences.truncate(PREVIEW_LIMIT);

    Ok(Json(PreviewResponse {
        until,
        occurrences,
        truncated,
    }))
}

pub async fn generate_schedule_services(
    State(state): State<AppState>,
    Path(schedule_id): Path<Uuid>,
    Query(query): Query<HorizonQuery>,
    user: AuthenticatedUser,
) -> AppResult<Json<MaterializeReport>> {
    user.require_admin()?;
    let schedule = load_schedule(&state, schedule_id).await?;
    let until = resolve_horizon(
        query.until.as_deref(),
        state.config.generation_horizon_days,
        Utc::now().date_naive(),
    )?;

    let report = match state.materializer().materialize(&schedule, until).await {
        Ok(report) => report,
        Err(aborted) => {
            let mut report = aborted.report;
            report.errors.push(OccurrenceFailure {
                occurrence: aborted.occurrence,
                error: aborted.source.to_string(),
            });
            report
        }
    };
    Ok(Json(report))
}

pub async fn generate_due_services(
    State(state): State<AppState>,
    Query(query): Query<HorizonQuery>,
    user: AuthenticatedUser,
) -> AppResult<Json<ScanReport>> {
    user.require_admin()?;
    let until = resolve_horizon(
        query.until.as_deref(),
        state.config.generation_horizon_days,
        Utc::now().date_naive(),
    )?;
    tracing::info!(requested_by = %user.username, %until, "service generation requested");

    let report = state
        .scanner()
        .run_due_schedules(until)
        .await
        .map_err(|err| AppError::internal(format!("schedule scan failed: {err}")))?;
    Ok(Json(report))
}

pub async fn list_schedule_services(
    State(state): State<AppState>,
    Path(schedule_id): Path<Uuid>,
) -> AppResult<Json<Vec<ServiceOrderResponse>>> {
    let mut conn = state.db()?;
    let found: bool = diesel::select(exists(schedules::table.find(schedule_id)))
        .get_result(&mut conn)?;
    if !found {
        return Err(AppError::not_found());
    }

    let rows: Vec<ServiceOrderRow> = service_orders::table
        .filter(service_orders::schedule_id.eq(schedule_id))
        .order(service_orders::scheduled_at.asc())
        .load(&mut conn)?;

    let response = rows
        .into_iter()
        .map(|row| ServiceOrder::try_from(row).map(to_order_response))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Json(response))
}

/// `until` accepts a calendar date or an RFC 3339 timestamp; absent means
/// `today + default_days`.
pub(crate) fn resolve_horizon(
    until: Option<&str>,
    default_days: i64,
    today: NaiveDate,
) -> AppResult<NaiveDate> {
    let Some(raw) = until.map(str::trim).filter(|value| !value.is_empty()) else {
        return horizon_after(today, default_days).ok_or_else(|| {
            AppError::internal(format!(
                "generation horizon of {default_days} days is out of range"
            ))
        });
    };

    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Ok(date);
    }
    DateTime::parse_from_rfc3339(raw)
        .map(|timestamp| timestamp.date_naive())
        .map_err(|_| AppError::bad_request("until must be an ISO date (YYYY-MM-DD)"))
}

async fn load_schedule(state: &AppState, schedule_id: Uuid) -> AppResult<Schedule> {
    state
        .schedules
        .find_by_id(schedule_id)
        .await?
        .ok_or_else(AppError::not_found)
}

fn ensure_client_exists(conn: &mut PgConnection, client_id: Uuid) -> AppResult<()> {
    let found: bool = diesel::select(exists(clients::table.find(client_id))).get_result(conn)?;
    if !found {
        return Err(AppError::bad_request("clientId does not reference a client"));
    }
    Ok(())
}

fn ensure_technician_exists(conn: &mut PgConnection, technician_id: Uuid) -> AppResult<()> {
    let found: bool =
        diesel::select(exists(technicians::table.find(technician_id))).get_result(conn)?;
    if !found {
        return Err(AppError::bad_request(
            "technicianId does not reference a technician",
        ));
    }
    Ok(())
}

fn to_response(schedule: Schedule, generated_count: Option<i64>) -> ScheduleResponse {
    ScheduleResponse {
        id: schedule.id,
        client_id: schedule.client_id,
        technician_id: schedule.technician_id,
        equipment_ids: schedule.equipment_ids,
        name: schedule.name,
        description: schedule.description,
        service_type: schedule.service_type,
        start_time: format_time(schedule.start_time),
        end_time: schedule.end_time.map(format_time),
        priority: schedule.priority,
        notes: schedule.notes,
        frequency: schedule.frequency,
        custom_interval_days: schedule.custom_interval_days,
        days_of_week: schedule.days_of_week,
        day_of_month: schedule.day_of_month,
        start_date: schedule.start_date,
        end_date: schedule.end_date,
        next_run_at: schedule.next_run_at,
        last_run_at: schedule.last_run_at.map(to_iso),
        is_active: schedule.is_active,
        generated_count,
    }
}

fn to_order_response(order: ServiceOrder) -> ServiceOrderResponse {
    ServiceOrderResponse {
        id: order.id,
        order_number: order.order_number,
        client_id: order.client_id,
        technician_id: order.technician_id,
        equipment_id: order.equipment_id,
        schedule_id: order.schedule_id,
        scheduled_date: order.scheduled_at,
        start_time: format_time(order.start_time),
        end_time: order.end_time.map(format_time),
        state: order.state,
        service_type: order.service_type,
        priority: order.priority,
        description: order.description,
        notes: order.notes,
        details: order.details,
        created_at: to_iso(order.created_at),
    }
}
