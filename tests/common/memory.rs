//! In-memory repositories for exercising the materializer and scanner
//! without a database.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveTime, Utc};
use tokio::sync::Mutex;
use uuid::Uuid;

use servicefrios::repositories::{
    DueSchedules, InsertOutcome, RepositoryError, RepositoryResult, SchedulePatch,
    ScheduleRepository, ServiceOrderRepository, UnreadableSchedule,
};
use servicefrios::scheduling::{
    Frequency, NewServiceOrder, OccurrenceKey, Priority, Schedule, ServiceOrder,
};

pub fn schedule(frequency: Frequency, start_date: NaiveDate) -> Schedule {
    Schedule {
        id: Uuid::new_v4(),
        client_id: Uuid::new_v4(),
        technician_id: Some(Uuid::new_v4()),
        equipment_ids: vec![Uuid::new_v4(), Uuid::new_v4()],
        name: "Walk-in freezer maintenance".to_string(),
        description: None,
        service_type: "PREVENTIVE".to_string(),
        start_time: NaiveTime::from_hms_opt(8, 0, 0).expect("valid time"),
        end_time: NaiveTime::from_hms_opt(10, 0, 0),
        priority: Priority::Medium,
        notes: None,
        frequency,
        custom_interval_days: None,
        days_of_week: Vec::new(),
        day_of_month: None,
        start_date,
        end_date: None,
        next_run_at: Some(start_date),
        last_run_at: None,
        is_active: true,
    }
}

#[derive(Default)]
pub struct InMemorySchedules {
    rows: Mutex<HashMap<Uuid, Schedule>>,
    unreadable: Mutex<HashSet<Uuid>>,
    fail_updates: AtomicBool,
}

impl InMemorySchedules {
    pub async fn insert(&self, schedule: Schedule) {
        self.rows.lock().await.insert(schedule.id, schedule);
    }

    pub async fn get(&self, id: Uuid) -> Option<Schedule> {
        self.rows.lock().await.get(&id).cloned()
    }

    /// The stored row for `id` no longer decodes, as with a malformed time.
    pub async fn corrupt(&self, id: Uuid) {
        self.unreadable.lock().await.insert(id);
    }

    pub fn fail_updates(&self, fail: bool) {
        self.fail_updates.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl ScheduleRepository for InMemorySchedules {
    async fn find_due(&self, horizon: NaiveDate) -> RepositoryResult<DueSchedules> {
        let rows = self.rows.lock().await;
        let unreadable = self.unreadable.lock().await;
        let mut matching: Vec<&Schedule> = rows
            .values()
            .filter(|schedule| schedule.is_active)
            .filter(|schedule| schedule.next_run_at.map_or(true, |next| next <= horizon))
            .collect();
        matching.sort_by_key(|schedule| (schedule.next_run_at, schedule.id));

        let mut due = DueSchedules::default();
        for schedule in matching {
            if unreadable.contains(&schedule.id) {
                due.unreadable.push(UnreadableSchedule {
                    schedule_id: schedule.id,
                    error: RepositoryError::InvalidRecord(format!(
                        "{} has malformed start_time \"9am\"",
                        schedule.id
                    )),
                });
            } else {
                due.ready.push(schedule.clone());
            }
        }
        Ok(due)
    }

    async fn find_by_id(&self, id: Uuid) -> RepositoryResult<Option<Schedule>> {
        Ok(self.get(id).await)
    }

    async fn update(&self, id: Uuid, patch: SchedulePatch) -> RepositoryResult<Schedule> {
        if self.fail_updates.load(Ordering::SeqCst) {
            return Err(RepositoryError::Unavailable("schedule store offline".into()));
        }
        let mut rows = self.rows.lock().await;
        let schedule = rows.get_mut(&id).ok_or(RepositoryError::NotFound)?;
        if let Some(next_run_at) = patch.next_run_at {
            schedule.next_run_at = Some(next_run_at);
        }
        if let Some(last_run_at) = patch.last_run_at {
            schedule.last_run_at = Some(last_run_at);
        }
        Ok(schedule.clone())
    }
}

/// Holds its lock across the occurrence check and the insert, and yields in
/// between, so concurrent callers interleave but never both insert.
#[derive(Default)]
pub struct InMemoryServiceOrders {
    orders: Mutex<Vec<ServiceOrder>>,
    failing_days: Mutex<HashSet<NaiveDate>>,
    transient_days: Mutex<HashSet<NaiveDate>>,
    taken_numbers: Mutex<Vec<String>>,
}

impl InMemoryServiceOrders {
    /// Inserts for `day` fail with a constraint error.
    pub async fn fail_on(&self, day: NaiveDate) {
        self.failing_days.lock().await.insert(day);
    }

    /// Inserts for `day` fail as if the database went away.
    pub async fn unavailable_on(&self, day: NaiveDate) {
        self.transient_days.lock().await.insert(day);
    }

    /// The next inserts using these numbers collide.
    pub async fn reserve_numbers(&self, numbers: Vec<String>) {
        self.taken_numbers.lock().await.extend(numbers);
    }

    pub async fn orders(&self) -> Vec<ServiceOrder> {
        let mut orders = self.orders.lock().await.clone();
        orders.sort_by_key(|order| (order.scheduled_at, order.order_number.clone()));
        orders
    }

    pub async fn days_for(&self, schedule_id: Uuid) -> Vec<NaiveDate> {
        self.orders()
            .await
            .into_iter()
            .filter(|order| order.schedule_id == Some(schedule_id))
            .map(|order| order.scheduled_at.date())
            .collect()
    }
}

#[async_trait]
impl ServiceOrderRepository for InMemoryServiceOrders {
    async fn create_for_occurrence(
        &self,
        key: &OccurrenceKey,
        order: NewServiceOrder,
    ) -> RepositoryResult<InsertOutcome> {
        if self.transient_days.lock().await.contains(&key.day) {
            return Err(RepositoryError::Unavailable("connection refused".into()));
        }
        if self.failing_days.lock().await.contains(&key.day) {
            return Err(RepositoryError::Constraint(format!(
                "client {} rejected order",
                order.client_id
            )));
        }

        let mut orders = self.orders.lock().await;
        let exists = orders.iter().any(|existing| {
            existing.is_active
                && existing.schedule_id == Some(key.schedule_id)
                && existing.scheduled_at.date() == key.day
                && existing.start_time == key.start_time
        });
        if exists {
            return Ok(InsertOutcome::AlreadyMaterialized);
        }
        tokio::task::yield_now().await;

        {
            let mut taken = self.taken_numbers.lock().await;
            if !taken.is_empty() {
                let number = taken.remove(0);
                return Err(RepositoryError::DuplicateOrderNumber(number));
            }
        }

        let created = ServiceOrder {
            id: Uuid::new_v4(),
            order_number: order.order_number,
            client_id: order.client_id,
            technician_id: order.technician_id,
            equipment_id: order.equipment_id,
            schedule_id: order.schedule_id,
            scheduled_at: order.scheduled_at,
            start_time: order.start_time,
            end_time: order.end_time,
            state: order.state,
            service_type: order.service_type,
            priority: order.priority,
            description: order.description,
            notes: order.notes,
            details: order.details,
            is_active: true,
            created_at: Utc::now().naive_utc(),
        };
        orders.push(created.clone());
        Ok(InsertOutcome::Created(created))
    }

    async fn count_by_schedule_id(&self, schedule_id: Uuid) -> RepositoryResult<i64> {
        let orders = self.orders.lock().await;
        Ok(orders
            .iter()
            .filter(|order| order.schedule_id == Some(schedule_id))
            .count() as i64)
    }
}
