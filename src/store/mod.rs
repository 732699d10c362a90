//! The task store contract.
//!
//! The engine reads and writes durable state only through [`TaskStore`],
//! injected as `Arc<dyn TaskStore>`. Two implementations ship with the crate:
//!
//! - [`MemoryStore`](memory::MemoryStore): in-process, mutex-guarded. Used by
//!   tests and local runs.
//! - [`Db`](crate::db::Db): Postgres via sqlx.
//!
//! # Conditional writes
//!
//! Every mutation that can race is a compare-and-swap:
//!
//! - [`TaskStore::bind_assignee`] only succeeds while the task is `pending`
//!   with no assignee. The loser of a race gets [`Error::Conflict`].
//! - [`TaskStore::transition_task`] only succeeds from the expected status.
//! - [`TaskStore::claim_schedule_run`] only succeeds while the schedule is
//!   active, still points at the expected `next_run_at`, and has runs left
//!   under `max_runs`. A successful claim counts the run, so two sweeps
//!   holding stale copies cannot both fire the last allowed run.
//!
//! Workload counts in [`TaskStore::candidate_pool`] are computed from active
//! tasks at query time, never kept as a separate counter.
//!
//! [`Error::Conflict`]: crate::error::Error::Conflict

pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::model::*;

/// One listing of due schedules.
#[derive(Debug, Default)]
pub struct DueSchedules {
    /// Decoded schedules, earliest `next_run_at` first.
    pub schedules: Vec<RecurrenceSchedule>,
    /// Due rows that could not be decoded.
    pub unreadable: Vec<UnreadableSchedule>,
}

#[derive(Debug, Clone)]
pub struct UnreadableSchedule {
    pub id: ScheduleId,
    pub reason: String,
}

#[async_trait]
pub trait TaskStore: Send + Sync {
    // -- tasks ---------------------------------------------------------------

    async fn get_task(&self, id: TaskId) -> Result<Task>;

    /// Insert a new task. When `assignment` is given the task is created
    /// already bound and the history record is written with it.
    async fn insert_task(&self, task: &Task, assignment: Option<&Assignment>) -> Result<Task>;

    /// Bind `assignment.staff_id` to `assignment.task_id` if the task is still
    /// pending and unassigned, appending the history record in the same write.
    async fn bind_assignee(&self, assignment: &Assignment) -> Result<Task>;

    /// Move a task from `from` to `to`, failing if its status is no longer `from`.
    async fn transition_task(
        &self,
        id: TaskId,
        from: TaskStatus,
        to: TaskStatus,
        at: DateTime<Utc>,
    ) -> Result<Task>;

    async fn list_tasks(
        &self,
        restaurant_id: RestaurantId,
        status: Option<TaskStatus>,
        limit: usize,
    ) -> Result<Vec<Task>>;

    /// Oldest first.
    async fn assignment_history(&self, task_id: TaskId) -> Result<Vec<Assignment>>;

    // -- staff ---------------------------------------------------------------

    async fn get_staff(&self, id: StaffId) -> Result<StaffMember>;

    /// Every staff member of the restaurant, with live workload counts and
    /// the shifts relevant to `target`.
    async fn candidate_pool(
        &self,
        restaurant_id: RestaurantId,
        target: Option<DateTime<Utc>>,
    ) -> Result<Vec<StaffCandidate>>;

    // -- templates and schedules ---------------------------------------------

    async fn get_template(&self, id: TemplateId) -> Result<TaskTemplate>;

    async fn insert_schedule(&self, schedule: &RecurrenceSchedule) -> Result<()>;

    async fn get_schedule(&self, id: ScheduleId) -> Result<RecurrenceSchedule>;

    /// Active schedules with `next_run_at <= now`. A row that fails to decode
    /// lands in [`DueSchedules::unreadable`] instead of failing the listing.
    async fn due_schedules(&self, now: DateTime<Utc>) -> Result<DueSchedules>;

    /// Advance `next_run_at` from `expected` to `next` and count the run in
    /// `total_runs`. Returns `false` if the schedule was already advanced,
    /// deactivated, or has used up `max_runs`.
    async fn claim_schedule_run(
        &self,
        id: ScheduleId,
        expected: DateTime<Utc>,
        next: DateTime<Utc>,
    ) -> Result<bool>;

    /// Settle a claimed run. A failed run is moved from `total_runs` to
    /// `failed_runs`.
    async fn record_schedule_run(
        &self,
        id: ScheduleId,
        succeeded: bool,
        ran_at: DateTime<Utc>,
    ) -> Result<()>;

    async fn deactivate_schedule(&self, id: ScheduleId) -> Result<()>;
}
