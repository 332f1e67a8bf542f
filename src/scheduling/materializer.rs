use std::sync::Arc;

use chrono::{NaiveDate, NaiveDateTime, Utc};
use rand::Rng;
use serde::Serialize;
use serde_json::json;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::repositories::{InsertOutcome, RepositoryError, RepositoryResult, ServiceOrderRepository};

use super::{format_time, NewServiceOrder, Schedule, ServiceState};

const ORDER_NUMBER_ATTEMPTS: usize = 3;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OccurrenceFailure {
    pub occurrence: NaiveDate,
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MaterializeReport {
    pub created_count: usize,
    pub skipped_count: usize,
    pub errors: Vec<OccurrenceFailure>,
}

/// A walk cut short by a transient storage error. `report` covers the
/// occurrences handled before `occurrence` failed; those orders are committed.
#[derive(Debug, Error)]
#[error("materialization stopped at {occurrence}: {source}")]
pub struct MaterializeAborted {
    pub report: MaterializeReport,
    pub occurrence: NaiveDate,
    pub source: RepositoryError,
}

/// Turns a schedule's occurrences into service orders, one per occurrence key.
#[derive(Clone)]
pub struct Materializer {
    orders: Arc<dyn ServiceOrderRepository>,
}

impl Materializer {
    pub fn new(orders: Arc<dyn ServiceOrderRepository>) -> Self {
        Self { orders }
    }

    /// Walks occurrences from `start_date` through `horizon` in date order.
    ///
    /// Occurrences that already have an order are skipped. A failed insert is
    /// recorded in the report and the walk continues, except for transient
    /// storage errors which abort the walk so the caller can retry later.
    pub async fn materialize(
        &self,
        schedule: &Schedule,
        horizon: NaiveDate,
    ) -> Result<MaterializeReport, MaterializeAborted> {
        let mut report = MaterializeReport::default();

        for occurrence in schedule.occurrences(horizon) {
            match self.materialize_occurrence(schedule, occurrence).await {
                Ok(true) => report.created_count += 1,
                Ok(false) => {
                    debug!(schedule_id = %schedule.id, %occurrence, "occurrence already materialized");
                    report.skipped_count += 1;
                }
                Err(err) if err.is_transient() => {
                    warn!(
                        schedule_id = %schedule.id,
                        %occurrence,
                        created = report.created_count,
                        error = %err,
                        "materialization aborted"
                    );
                    return Err(MaterializeAborted {
                        report,
                        occurrence,
                        source: err,
                    });
                }
                Err(err) => {
                    warn!(
                        schedule_id = %schedule.id,
                        %occurrence,
                        error = %err,
                        "failed to materialize occurrence"
                    );
                    report.errors.push(OccurrenceFailure {
                        occurrence,
                        error: err.to_string(),
                    });
                }
            }
        }

        if report.created_count > 0 {
            info!(
                schedule_id = %schedule.id,
                created = report.created_count,
                skipped = report.skipped_count,
                %horizon,
                "materialized schedule occurrences"
            );
        }
        Ok(report)
    }

    async fn materialize_occurrence(
        &self,
        schedule: &Schedule,
        occurrence: NaiveDate,
    ) -> RepositoryResult<bool> {
        let key = schedule.occurrence_key(occurrence);
        let mut attempt = 1;
        loop {
            let order = build_order(schedule, occurrence, Utc::now().naive_utc());
            match self.orders.create_for_occurrence(&key, order).await {
                Ok(InsertOutcome::Created(_)) => return Ok(true),
                Ok(InsertOutcome::AlreadyMaterialized) => return Ok(false),
                Err(RepositoryError::DuplicateOrderNumber(number))
                    if attempt < ORDER_NUMBER_ATTEMPTS =>
                {
                    debug!(%number, attempt, "order number collision, regenerating");
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

/// The PENDING order a schedule produces for `occurrence`.
pub fn build_order(
    schedule: &Schedule,
    occurrence: NaiveDate,
    generated_at: NaiveDateTime,
) -> NewServiceOrder {
    let equipment_id = schedule.equipment_ids.first().copied();
    NewServiceOrder {
        order_number: generate_order_number(generated_at),
        client_id: schedule.client_id,
        technician_id: schedule.technician_id,
        equipment_id,
        schedule_id: Some(schedule.id),
        scheduled_at: occurrence.and_time(schedule.start_time),
        start_time: schedule.start_time,
        end_time: schedule.end_time,
        state: ServiceState::Pending,
        service_type: schedule.service_type.clone(),
        priority: schedule.priority,
        description: Some(
            schedule
                .description
                .clone()
                .unwrap_or_else(|| schedule.name.clone()),
        ),
        notes: schedule.notes.clone(),
        details: json!({
            "scheduleId": schedule.id,
            "scheduleName": schedule.name,
            "occurrence": occurrence,
            "startTime": format_time(schedule.start_time),
            "equipmentId": equipment_id,
            "generatedAt": generated_at,
        }),
    }
}

pub fn generate_order_number(now: NaiveDateTime) -> String {
    let suffix: u16 = rand::thread_rng().gen_range(0..10_000);
    format!("OS-{}-{suffix:04}", now.format("%Y%m%d%H%M%S"))
}
