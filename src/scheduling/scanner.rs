use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use futures_util::{stream, StreamExt};
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::repositories::{RepositoryResult, SchedulePatch, ScheduleRepository};

use super::{
    materializer::{MaterializeReport, Materializer},
    recurrence::next_occurrence_or_fallback,
    Schedule,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleFailure {
    pub schedule_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub occurrence: Option<NaiveDate>,
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanReport {
    pub created_count: usize,
    pub processed_count: usize,
    pub errors: Vec<ScheduleFailure>,
}

struct ScheduleOutcome {
    schedule_id: Uuid,
    report: MaterializeReport,
    failure: Option<ScheduleFailure>,
}

/// Materializes every due schedule and advances its run bookkeeping.
#[derive(Clone)]
pub struct ScheduleScanner {
    schedules: Arc<dyn ScheduleRepository>,
    materializer: Materializer,
    concurrency: usize,
}

impl ScheduleScanner {
    pub fn new(
        schedules: Arc<dyn ScheduleRepository>,
        materializer: Materializer,
        concurrency: usize,
    ) -> Self {
        Self {
            schedules,
            materializer,
            concurrency: concurrency.max(1),
        }
    }

    /// Fails only when the due schedules cannot be listed. Per-schedule
    /// failures land in [`ScanReport::errors`] and leave that schedule's
    /// `next_run_at` untouched so the next scan retries it.
    pub async fn run_due_schedules(&self, horizon: NaiveDate) -> RepositoryResult<ScanReport> {
        let due = self.schedules.find_due(horizon).await?;
        info!(
            due = due.ready.len(),
            unreadable = due.unreadable.len(),
            %horizon,
            "scanning due schedules"
        );

        let mut report = ScanReport::default();
        report
            .errors
            .extend(due.unreadable.into_iter().map(|unreadable| ScheduleFailure {
                schedule_id: unreadable.schedule_id,
                occurrence: None,
                error: unreadable.error.to_string(),
            }));

        let outcomes: Vec<ScheduleOutcome> = stream::iter(due.ready)
            .map(|schedule| async move { self.process(schedule, horizon).await })
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        for outcome in outcomes {
            report.created_count += outcome.report.created_count;
            report
                .errors
                .extend(outcome.report.errors.into_iter().map(|failure| ScheduleFailure {
                    schedule_id: outcome.schedule_id,
                    occurrence: Some(failure.occurrence),
                    error: failure.error,
                }));
            match outcome.failure {
                None => report.processed_count += 1,
                Some(failure) => report.errors.push(failure),
            }
        }

        info!(
            created = report.created_count,
            processed = report.processed_count,
            errors = report.errors.len(),
            "schedule scan finished"
        );
        Ok(report)
    }

    async fn process(&self, schedule: Schedule, horizon: NaiveDate) -> ScheduleOutcome {
        let report = match self.materializer.materialize(&schedule, horizon).await {
            Ok(report) => report,
            Err(aborted) => {
                warn!(
                    schedule_id = %schedule.id,
                    created = aborted.report.created_count,
                    error = %aborted.source,
                    "schedule left due for the next scan"
                );
                return ScheduleOutcome {
                    schedule_id: schedule.id,
                    failure: Some(ScheduleFailure {
                        schedule_id: schedule.id,
                        occurrence: Some(aborted.occurrence),
                        error: aborted.source.to_string(),
                    }),
                    report: aborted.report,
                };
            }
        };

        let failure = match self.reschedule(&schedule).await {
            Ok(()) => None,
            Err(err) => {
                warn!(schedule_id = %schedule.id, error = %err, "failed to record schedule run");
                Some(ScheduleFailure {
                    schedule_id: schedule.id,
                    occurrence: None,
                    error: err.to_string(),
                })
            }
        };

        ScheduleOutcome {
            schedule_id: schedule.id,
            report,
            failure,
        }
    }

    async fn reschedule(&self, schedule: &Schedule) -> RepositoryResult<()> {
        let anchor = schedule
            .last_run_at
            .map(|last_run| last_run.date())
            .unwrap_or(schedule.start_date);
        let next_run_at = next_occurrence_or_fallback(
            &schedule.frequency,
            anchor,
            schedule.recurrence_options(),
        );

        self.schedules
            .update(
                schedule.id,
                SchedulePatch {
                    next_run_at,
                    last_run_at: Some(Utc::now().naive_utc()),
                },
            )
            .await?;
        Ok(())
    }
}
