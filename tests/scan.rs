mod common;

use std::sync::Arc;

use anyhow::Result;
use common::date;
use common::memory::{schedule, InMemorySchedules, InMemoryServiceOrders};
use servicefrios::repositories::{ScheduleRepository, ServiceOrderRepository};
use servicefrios::scheduling::{Frequency, Materializer, ScheduleScanner};

struct Harness {
    schedules: Arc<InMemorySchedules>,
    orders: Arc<InMemoryServiceOrders>,
    scanner: ScheduleScanner,
}

fn harness() -> Harness {
    let schedules = Arc::new(InMemorySchedules::default());
    let orders = Arc::new(InMemoryServiceOrders::default());
    let schedule_repo: Arc<dyn ScheduleRepository> = schedules.clone();
    let order_repo: Arc<dyn ServiceOrderRepository> = orders.clone();
    let scanner = ScheduleScanner::new(schedule_repo, Materializer::new(order_repo), 3);
    Harness {
        schedules,
        orders,
        scanner,
    }
}

#[tokio::test]
async fn only_due_active_schedules_are_processed() -> Result<()> {
    let h = harness();
    let due = schedule(Frequency::Weekly, date(2024, 1, 1));
    let mut later = schedule(Frequency::Weekly, date(2024, 3, 1));
    later.next_run_at = Some(date(2024, 3, 1));
    let mut paused = schedule(Frequency::Daily, date(2024, 1, 1));
    paused.is_active = false;
    let mut never_run = schedule(Frequency::Monthly, date(2024, 1, 10));
    never_run.next_run_at = None;
    for s in [&due, &later, &paused, &never_run] {
        h.schedules.insert(s.clone()).await;
    }

    let report = h.scanner.run_due_schedules(date(2024, 1, 31)).await?;

    assert_eq!(report.processed_count, 2);
    assert_eq!(report.created_count, 5 + 1);
    assert!(report.errors.is_empty());

    let untouched = h.schedules.get(later.id).await.unwrap();
    assert_eq!(untouched.last_run_at, None);
    assert_eq!(untouched.next_run_at, Some(date(2024, 3, 1)));
    assert!(h.orders.days_for(later.id).await.is_empty());
    assert!(h.orders.days_for(paused.id).await.is_empty());
    assert_eq!(
        h.orders.days_for(never_run.id).await,
        vec![date(2024, 1, 10)]
    );
    Ok(())
}

#[tokio::test]
async fn next_run_is_computed_from_last_run_or_start_date() -> Result<()> {
    let h = harness();
    let fresh = schedule(Frequency::Weekly, date(2024, 1, 1));
    let mut previously_run = schedule(Frequency::Weekly, date(2024, 1, 1));
    previously_run.last_run_at = date(2024, 1, 20).and_hms_opt(6, 0, 0);
    previously_run.next_run_at = Some(date(2024, 1, 22));
    h.schedules.insert(fresh.clone()).await;
    h.schedules.insert(previously_run.clone()).await;

    let report = h.scanner.run_due_schedules(date(2024, 1, 31)).await?;
    assert_eq!(report.processed_count, 2);

    let fresh = h.schedules.get(fresh.id).await.unwrap();
    assert_eq!(fresh.next_run_at, Some(date(2024, 1, 8)));
    assert!(fresh.last_run_at.is_some());

    let previously_run = h.schedules.get(previously_run.id).await.unwrap();
    assert_eq!(previously_run.next_run_at, Some(date(2024, 1, 27)));
    assert!(previously_run.last_run_at.unwrap().date() > date(2024, 1, 20));
    Ok(())
}

#[tokio::test]
async fn occurrence_errors_do_not_stop_other_schedules() -> Result<()> {
    let h = harness();
    let flaky = schedule(Frequency::Weekly, date(2024, 1, 1));
    let healthy = schedule(Frequency::Weekly, date(2024, 1, 2));
    h.schedules.insert(flaky.clone()).await;
    h.schedules.insert(healthy.clone()).await;
    h.orders.fail_on(date(2024, 1, 15)).await;

    let report = h.scanner.run_due_schedules(date(2024, 1, 21)).await?;

    assert_eq!(report.processed_count, 2);
    assert_eq!(report.created_count, 2 + 3);
    assert_eq!(report.errors.len(), 1);
    assert_eq!(report.errors[0].schedule_id, flaky.id);
    assert_eq!(report.errors[0].occurrence, Some(date(2024, 1, 15)));

    let flaky = h.schedules.get(flaky.id).await.unwrap();
    assert!(flaky.last_run_at.is_some());
    Ok(())
}

#[tokio::test]
async fn unavailable_storage_leaves_schedule_due() -> Result<()> {
    let h = harness();
    let stuck = schedule(Frequency::Weekly, date(2024, 1, 1));
    let healthy = schedule(Frequency::Daily, date(2024, 1, 30));
    h.schedules.insert(stuck.clone()).await;
    h.schedules.insert(healthy.clone()).await;
    h.orders.unavailable_on(date(2024, 1, 15)).await;

    let report = h.scanner.run_due_schedules(date(2024, 1, 31)).await?;

    assert_eq!(report.processed_count, 1);
    // Jan 1 and Jan 8 were committed before the walk stopped, plus two days
    // for the healthy schedule.
    assert_eq!(
        h.orders.days_for(stuck.id).await,
        vec![date(2024, 1, 1), date(2024, 1, 8)]
    );
    assert_eq!(report.created_count, 2 + 2);
    assert_eq!(report.errors.len(), 1);
    assert_eq!(report.errors[0].schedule_id, stuck.id);
    assert_eq!(report.errors[0].occurrence, Some(date(2024, 1, 15)));

    let stuck = h.schedules.get(stuck.id).await.unwrap();
    assert_eq!(stuck.next_run_at, Some(date(2024, 1, 1)));
    assert_eq!(stuck.last_run_at, None);
    Ok(())
}

#[tokio::test]
async fn unreadable_schedules_are_reported_not_dropped() -> Result<()> {
    let h = harness();
    let broken = schedule(Frequency::Weekly, date(2024, 1, 1));
    let healthy = schedule(Frequency::Weekly, date(2024, 1, 1));
    h.schedules.insert(broken.clone()).await;
    h.schedules.insert(healthy.clone()).await;
    h.schedules.corrupt(broken.id).await;

    let report = h.scanner.run_due_schedules(date(2024, 1, 14)).await?;

    assert_eq!(report.processed_count, 1);
    assert_eq!(report.created_count, 2);
    assert_eq!(report.errors.len(), 1);
    assert_eq!(report.errors[0].schedule_id, broken.id);
    assert_eq!(report.errors[0].occurrence, None);
    assert!(report.errors[0].error.contains("start_time"));

    let broken = h.schedules.get(broken.id).await.unwrap();
    assert_eq!(broken.next_run_at, Some(date(2024, 1, 1)));
    assert_eq!(broken.last_run_at, None);
    Ok(())
}

#[tokio::test]
async fn failed_reschedule_is_reported() -> Result<()> {
    let h = harness();
    let s = schedule(Frequency::Daily, date(2024, 1, 1));
    h.schedules.insert(s.clone()).await;
    h.schedules.fail_updates(true);

    let report = h.scanner.run_due_schedules(date(2024, 1, 3)).await?;

    assert_eq!(report.created_count, 3);
    assert_eq!(report.processed_count, 0);
    assert_eq!(report.errors.len(), 1);
    assert!(report.errors[0].error.contains("offline"));
    Ok(())
}

#[tokio::test]
async fn second_scan_over_same_horizon_creates_nothing() -> Result<()> {
    let h = harness();
    let s = schedule(Frequency::Weekly, date(2024, 1, 1));
    h.schedules.insert(s.clone()).await;

    let first = h.scanner.run_due_schedules(date(2024, 1, 31)).await?;
    let second = h.scanner.run_due_schedules(date(2024, 1, 31)).await?;

    assert_eq!(first.created_count, 5);
    assert_eq!(second.created_count, 0);
    assert_eq!(h.orders.days_for(s.id).await.len(), 5);
    Ok(())
}
