//! Tests for recurrence schedule creation and sweeps.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, TimeZone, Utc};
use rota_rs::config::SchedulerSettings;
use rota_rs::engine::RecurrenceScheduler;
use rota_rs::error::Error;
use rota_rs::model::*;
use rota_rs::store::TaskStore;
use rota_rs::store::memory::MemoryStore;

fn utc(d: u32, h: u32, m: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, d, h, m, 0).unwrap()
}

struct Fixture {
    store: Arc<MemoryStore>,
    scheduler: RecurrenceScheduler,
    restaurant: RestaurantId,
    template: TemplateId,
    manager: StaffId,
}

fn fixture() -> Fixture {
    let store = Arc::new(MemoryStore::new());
    let scheduler = RecurrenceScheduler::new(store.clone(), &SchedulerSettings::default());
    let restaurant = RestaurantId::new();

    let mut template = TaskTemplate::new(restaurant, "Open checklist");
    template.due_offset_minutes = Some(45);
    let template_id = template.id;
    store.upsert_template(template);

    Fixture {
        store,
        scheduler,
        restaurant,
        template: template_id,
        manager: StaffId::new(),
    }
}

impl Fixture {
    fn daily(&self) -> NewRecurrence {
        NewRecurrence {
            template_id: self.template,
            restaurant_id: self.restaurant,
            pattern: RecurrencePattern::daily(9, 0, "UTC"),
            end_date: None,
            max_runs: None,
            created_by: self.manager,
        }
    }

    async fn schedule(&self, id: ScheduleId) -> RecurrenceSchedule {
        self.store.get_schedule(id).await.unwrap()
    }
}

// ---------------------------------------------------------------------------
// Creation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn created_schedule_starts_at_first_occurrence() {
    let f = fixture();
    let s = f
        .scheduler
        .create_recurrence(f.daily(), utc(2, 8, 0))
        .await
        .unwrap();

    assert_eq!(s.next_run_at, utc(2, 9, 0));
    assert!(s.is_active);
    assert_eq!(s.total_runs, 0);
    assert_eq!(f.schedule(s.id).await, s);
}

#[tokio::test]
async fn creation_rejects_bad_requests() {
    let f = fixture();
    let now = utc(2, 8, 0);

    let mut custom = f.daily();
    custom.pattern.kind = RecurrenceType::Custom;

    let mut zero_runs = f.daily();
    zero_runs.max_runs = Some(0);

    let mut ended = f.daily();
    ended.end_date = Some(utc(1, 0, 0));

    let mut ends_before_first = f.daily();
    ends_before_first.end_date = Some(utc(2, 8, 30));

    let mut other_restaurant = f.daily();
    other_restaurant.restaurant_id = RestaurantId::new();

    for req in [custom, zero_runs, ended, ends_before_first, other_restaurant] {
        let err = f.scheduler.create_recurrence(req, now).await.unwrap_err();
        assert!(err.is_validation(), "{err}");
    }

    let mut inactive = TaskTemplate::new(f.restaurant, "Retired");
    inactive.active = false;
    let mut on_inactive = f.daily();
    on_inactive.template_id = inactive.id;
    f.store.upsert_template(inactive);
    let err = f.scheduler.create_recurrence(on_inactive, now).await.unwrap_err();
    assert!(err.is_validation(), "{err}");

    let mut missing = f.daily();
    missing.template_id = TemplateId::new();
    let err = f.scheduler.create_recurrence(missing, now).await.unwrap_err();
    assert!(err.is_not_found(), "{err}");
}

// ---------------------------------------------------------------------------
// Firing
// ---------------------------------------------------------------------------

#[tokio::test]
async fn due_schedule_materializes_one_task_and_advances() {
    let f = fixture();
    let s = f
        .scheduler
        .create_recurrence(f.daily(), utc(2, 8, 0))
        .await
        .unwrap();

    let report = f.scheduler.fire_due_schedules(utc(2, 9, 0)).await.unwrap();
    assert_eq!(report.processed, 1);
    assert_eq!(report.created, 1);

    let tasks = f.store.tasks_for_schedule(s.id);
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].status, TaskStatus::Pending);
    assert_eq!(tasks[0].title, "Open checklist");
    assert_eq!(tasks[0].scheduled_for, Some(utc(2, 9, 0)));
    assert_eq!(tasks[0].due_at, Some(utc(2, 9, 45)));

    let s = f.schedule(s.id).await;
    assert_eq!(s.next_run_at, utc(3, 9, 0));
    assert_eq!(s.total_runs, 1);
    assert_eq!(s.last_run_at, Some(utc(2, 9, 0)));
}

#[tokio::test]
async fn schedules_not_yet_due_are_left_alone() {
    let f = fixture();
    let s = f
        .scheduler
        .create_recurrence(f.daily(), utc(2, 8, 0))
        .await
        .unwrap();

    let report = f.scheduler.fire_due_schedules(utc(2, 8, 59)).await.unwrap();
    assert_eq!(report.processed, 0);
    assert!(f.store.tasks_for_schedule(s.id).is_empty());
}

#[tokio::test]
async fn refiring_the_same_instant_creates_nothing() {
    let f = fixture();
    let s = f
        .scheduler
        .create_recurrence(f.daily(), utc(2, 8, 0))
        .await
        .unwrap();

    f.scheduler.fire_due_schedules(utc(2, 9, 0)).await.unwrap();
    let again = f.scheduler.fire_due_schedules(utc(2, 9, 0)).await.unwrap();
    assert_eq!(again.created, 0);

    // A stale claim for the instant already fired loses.
    let claimed = f
        .store
        .claim_schedule_run(s.id, utc(2, 9, 0), utc(3, 9, 0))
        .await
        .unwrap();
    assert!(!claimed);
    assert_eq!(f.store.tasks_for_schedule(s.id).len(), 1);
}

#[tokio::test]
async fn concurrent_sweeps_fire_each_instant_once() {
    let f = fixture();
    let s = f
        .scheduler
        .create_recurrence(f.daily(), utc(2, 8, 0))
        .await
        .unwrap();

    let (a, b) = (f.scheduler.clone(), f.scheduler.clone());
    let (ra, rb) = tokio::join!(
        a.fire_due_schedules(utc(2, 9, 0)),
        b.fire_due_schedules(utc(2, 9, 0))
    );
    let created = ra.unwrap().created + rb.unwrap().created;

    assert_eq!(created, 1);
    assert_eq!(f.store.tasks_for_schedule(s.id).len(), 1);
    assert_eq!(f.schedule(s.id).await.total_runs, 1);
}

#[tokio::test]
async fn max_runs_exhausts_and_deactivates() {
    let f = fixture();
    let mut req = f.daily();
    req.max_runs = Some(3);
    let s = f.scheduler.create_recurrence(req, utc(2, 8, 0)).await.unwrap();

    for day in 2..=4 {
        let report = f.scheduler.fire_due_schedules(utc(day, 9, 0)).await.unwrap();
        assert_eq!(report.created, 1);
    }

    let report = f.scheduler.fire_due_schedules(utc(5, 9, 0)).await.unwrap();
    assert_eq!(report.created, 0);
    assert_eq!(report.deactivated, 1);

    let s = f.schedule(s.id).await;
    assert!(!s.is_active);
    assert_eq!(s.total_runs, 3);
    assert_eq!(f.store.tasks_for_schedule(s.id).len(), 3);

    let report = f.scheduler.fire_due_schedules(utc(6, 9, 0)).await.unwrap();
    assert_eq!(report.processed, 0);
}

#[tokio::test]
async fn end_date_stops_the_schedule() {
    let f = fixture();
    let mut req = f.daily();
    req.end_date = Some(utc(3, 12, 0));
    let s = f.scheduler.create_recurrence(req, utc(2, 8, 0)).await.unwrap();

    f.scheduler.fire_due_schedules(utc(2, 9, 0)).await.unwrap();
    f.scheduler.fire_due_schedules(utc(3, 9, 0)).await.unwrap();
    let report = f.scheduler.fire_due_schedules(utc(4, 9, 0)).await.unwrap();

    assert_eq!(report.deactivated, 1);
    assert!(!f.schedule(s.id).await.is_active);
    assert_eq!(f.store.tasks_for_schedule(s.id).len(), 2);
}

#[tokio::test]
async fn missing_template_counts_a_failure_and_moves_on() {
    let f = fixture();
    let s = f
        .scheduler
        .create_recurrence(f.daily(), utc(2, 8, 0))
        .await
        .unwrap();
    f.store.remove_template(f.template);

    let report = f.scheduler.fire_due_schedules(utc(2, 9, 0)).await.unwrap();
    assert_eq!(report.failed, 1);
    assert_eq!(report.created, 0);

    let s = f.schedule(s.id).await;
    assert!(s.is_active);
    assert_eq!(s.failed_runs, 1);
    assert_eq!(s.total_runs, 0);
    assert_eq!(s.next_run_at, utc(3, 9, 0));
    assert!(f.store.tasks_for_schedule(s.id).is_empty());
}

#[tokio::test]
async fn one_broken_schedule_does_not_block_others() {
    let f = fixture();
    let healthy = f
        .scheduler
        .create_recurrence(f.daily(), utc(2, 8, 0))
        .await
        .unwrap();

    let doomed_template = TaskTemplate::new(f.restaurant, "Doomed");
    let mut req = f.daily();
    req.template_id = doomed_template.id;
    f.store.upsert_template(doomed_template.clone());
    let broken = f.scheduler.create_recurrence(req, utc(2, 8, 0)).await.unwrap();
    f.store.remove_template(doomed_template.id);

    let report = f.scheduler.fire_due_schedules(utc(2, 9, 0)).await.unwrap();
    assert_eq!(report.processed, 2);
    assert_eq!(report.created, 1);
    assert_eq!(report.failed, 1);
    assert_eq!(f.store.tasks_for_schedule(healthy.id).len(), 1);
    assert_eq!(f.schedule(broken.id).await.failed_runs, 1);
}

#[tokio::test]
async fn unreadable_schedule_is_retired_without_stopping_the_sweep() {
    let f = fixture();
    let healthy = f
        .scheduler
        .create_recurrence(f.daily(), utc(2, 8, 0))
        .await
        .unwrap();
    let corrupt = f
        .scheduler
        .create_recurrence(f.daily(), utc(2, 8, 0))
        .await
        .unwrap();
    f.store.mark_unreadable(corrupt.id);

    let report = f.scheduler.fire_due_schedules(utc(2, 9, 0)).await.unwrap();
    assert_eq!(report.processed, 2);
    assert_eq!(report.created, 1);
    assert_eq!(report.failed, 1);
    assert_eq!(f.store.tasks_for_schedule(healthy.id).len(), 1);
    assert!(f.store.tasks_for_schedule(corrupt.id).is_empty());
    assert!(!f.schedule(corrupt.id).await.is_active);

    let report = f.scheduler.fire_due_schedules(utc(3, 9, 0)).await.unwrap();
    assert_eq!(report.processed, 1);
    assert_eq!(report.created, 1);
    assert_eq!(report.failed, 0);
}

#[tokio::test]
async fn last_allowed_run_cannot_be_claimed_twice() {
    let f = fixture();
    let mut req = f.daily();
    req.max_runs = Some(1);
    let s = f.scheduler.create_recurrence(req, utc(2, 8, 0)).await.unwrap();

    // One sweep has claimed the only run and not settled it yet.
    let first = f
        .store
        .claim_schedule_run(s.id, utc(2, 9, 0), utc(3, 9, 0))
        .await
        .unwrap();
    assert!(first);
    assert_eq!(f.schedule(s.id).await.total_runs, 1);

    // Another sweep listed the schedule after that claim advanced it.
    let second = f
        .store
        .claim_schedule_run(s.id, utc(3, 9, 0), utc(4, 9, 0))
        .await
        .unwrap();
    assert!(!second);
    assert_eq!(f.schedule(s.id).await.next_run_at, utc(3, 9, 0));

    let report = f.scheduler.fire_due_schedules(utc(5, 10, 0)).await.unwrap();
    assert_eq!(report.created, 0);
    assert_eq!(report.deactivated, 1);
    assert!(f.store.tasks_for_schedule(s.id).is_empty());
}

#[tokio::test]
async fn failed_run_does_not_use_up_max_runs() {
    let f = fixture();
    let mut req = f.daily();
    req.max_runs = Some(1);
    let s = f.scheduler.create_recurrence(req, utc(2, 8, 0)).await.unwrap();

    let template = f.store.remove_template(f.template).unwrap();
    let report = f.scheduler.fire_due_schedules(utc(2, 9, 0)).await.unwrap();
    assert_eq!(report.failed, 1);
    assert_eq!(f.schedule(s.id).await.total_runs, 0);

    f.store.upsert_template(template);
    let report = f.scheduler.fire_due_schedules(utc(3, 9, 0)).await.unwrap();
    assert_eq!(report.created, 1);

    let report = f.scheduler.fire_due_schedules(utc(4, 9, 0)).await.unwrap();
    assert_eq!(report.deactivated, 1);

    let s = f.schedule(s.id).await;
    assert_eq!(s.total_runs, 1);
    assert_eq!(s.failed_runs, 1);
    assert_eq!(f.store.tasks_for_schedule(s.id).len(), 1);
}

#[tokio::test]
async fn run_record_error_after_insert_still_counts_as_created() {
    let f = fixture();
    let s = f
        .scheduler
        .create_recurrence(f.daily(), utc(2, 8, 0))
        .await
        .unwrap();

    f.store.fail_run_records(true);
    let report = f.scheduler.fire_due_schedules(utc(2, 9, 0)).await.unwrap();
    assert_eq!(report.created, 1);
    assert_eq!(report.failed, 0);
    assert_eq!(f.store.tasks_for_schedule(s.id).len(), 1);

    let stored = f.schedule(s.id).await;
    assert_eq!(stored.total_runs, 1);
    assert_eq!(stored.failed_runs, 0);
    assert_eq!(stored.last_run_at, None);
    assert_eq!(stored.next_run_at, utc(3, 9, 0));

    f.store.fail_run_records(false);
    let again = f.scheduler.fire_due_schedules(utc(2, 9, 0)).await.unwrap();
    assert_eq!(again.processed, 0);
    assert_eq!(f.store.tasks_for_schedule(s.id).len(), 1);
}

#[tokio::test]
async fn missed_occurrences_catch_up_one_per_sweep() {
    let f = fixture();
    let s = f
        .scheduler
        .create_recurrence(f.daily(), utc(2, 8, 0))
        .await
        .unwrap();

    let late = utc(5, 10, 0);
    for _ in 0..4 {
        let report = f.scheduler.fire_due_schedules(late).await.unwrap();
        assert_eq!(report.created, 1);
    }
    let report = f.scheduler.fire_due_schedules(late).await.unwrap();
    assert_eq!(report.processed, 0);

    let fired: Vec<_> = f
        .store
        .tasks_for_schedule(s.id)
        .iter()
        .filter_map(|t| t.scheduled_for)
        .collect();
    assert_eq!(fired, vec![utc(2, 9, 0), utc(3, 9, 0), utc(4, 9, 0), utc(5, 9, 0)]);
    assert_eq!(f.schedule(s.id).await.next_run_at, utc(6, 9, 0));
}

#[tokio::test]
async fn disabled_schedule_never_fires() {
    let f = fixture();
    let s = f
        .scheduler
        .create_recurrence(f.daily(), utc(2, 8, 0))
        .await
        .unwrap();

    f.scheduler.disable_schedule(s.id).await.unwrap();
    let report = f.scheduler.fire_due_schedules(utc(2, 9, 0)).await.unwrap();
    assert_eq!(report.processed, 0);

    let err = f.scheduler.disable_schedule(ScheduleId::new()).await.unwrap_err();
    assert!(matches!(err, Error::NotFound(_)), "{err}");
}

// ---------------------------------------------------------------------------
// Shutdown
// ---------------------------------------------------------------------------

#[tokio::test]
async fn shutdown_stops_a_sweep_before_the_next_schedule() {
    let f = fixture();
    let s = f
        .scheduler
        .create_recurrence(f.daily(), utc(2, 8, 0))
        .await
        .unwrap();

    f.scheduler.shutdown();
    let report = f.scheduler.fire_due_schedules(utc(2, 9, 0)).await.unwrap();
    assert!(report.cancelled);
    assert_eq!(report.processed, 0);
    assert!(f.store.tasks_for_schedule(s.id).is_empty());
}

#[tokio::test]
async fn run_loop_exits_on_shutdown() {
    let f = fixture();
    let scheduler = f.scheduler.clone();
    let handle = tokio::spawn(async move { scheduler.run().await });

    tokio::time::sleep(StdDuration::from_millis(50)).await;
    f.scheduler.shutdown();

    let result = tokio::time::timeout(StdDuration::from_secs(5), handle)
        .await
        .expect("scheduler did not stop")
        .unwrap();
    assert!(result.is_ok());
}
