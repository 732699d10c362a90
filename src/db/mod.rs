//! Postgres task store.
//!
//! Conditional writes are single `UPDATE ... WHERE` statements; a write that
//! matches no row lost its race and is reported as a conflict or an invalid
//! transition, depending on what the row looks like afterwards.

pub mod schedules;
pub mod tasks;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

use crate::error::Result;
use crate::model::*;
use crate::store::{DueSchedules, TaskStore};

/// Database handle. Owns the connection pool.
#[derive(Clone)]
pub struct Db {
    pool: PgPool,
}

impl Db {
    /// Connect to Postgres and create a connection pool.
    pub async fn connect(url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(url)
            .await?;
        Ok(Self { pool })
    }

    /// Run all pending migrations.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| crate::error::Error::Other(format!("migration failed: {e}")))?;
        Ok(())
    }

    pub async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl TaskStore for Db {
    async fn get_task(&self, id: TaskId) -> Result<Task> {
        self.fetch_task(id).await
    }

    async fn insert_task(&self, task: &Task, assignment: Option<&Assignment>) -> Result<Task> {
        self.insert_task_row(task, assignment).await
    }

    async fn bind_assignee(&self, assignment: &Assignment) -> Result<Task> {
        self.bind_assignee_row(assignment).await
    }

    async fn transition_task(
        &self,
        id: TaskId,
        from: TaskStatus,
        to: TaskStatus,
        at: DateTime<Utc>,
    ) -> Result<Task> {
        self.transition_task_row(id, from, to, at).await
    }

    async fn list_tasks(
        &self,
        restaurant_id: RestaurantId,
        status: Option<TaskStatus>,
        limit: usize,
    ) -> Result<Vec<Task>> {
        self.fetch_tasks(restaurant_id, status, limit).await
    }

    async fn assignment_history(&self, task_id: TaskId) -> Result<Vec<Assignment>> {
        self.fetch_assignments(task_id).await
    }

    async fn get_staff(&self, id: StaffId) -> Result<StaffMember> {
        self.fetch_staff(id).await
    }

    async fn candidate_pool(
        &self,
        restaurant_id: RestaurantId,
        target: Option<DateTime<Utc>>,
    ) -> Result<Vec<StaffCandidate>> {
        self.fetch_candidates(restaurant_id, target).await
    }

    async fn get_template(&self, id: TemplateId) -> Result<TaskTemplate> {
        self.fetch_template(id).await
    }

    async fn insert_schedule(&self, schedule: &RecurrenceSchedule) -> Result<()> {
        self.insert_schedule_row(schedule).await
    }

    async fn get_schedule(&self, id: ScheduleId) -> Result<RecurrenceSchedule> {
        self.fetch_schedule(id).await
    }

    async fn due_schedules(&self, now: DateTime<Utc>) -> Result<DueSchedules> {
        self.fetch_due_schedules(now).await
    }

    async fn claim_schedule_run(
        &self,
        id: ScheduleId,
        expected: DateTime<Utc>,
        next: DateTime<Utc>,
    ) -> Result<bool> {
        self.claim_schedule_row(id, expected, next).await
    }

    async fn record_schedule_run(
        &self,
        id: ScheduleId,
        succeeded: bool,
        ran_at: DateTime<Utc>,
    ) -> Result<()> {
        self.record_schedule_row(id, succeeded, ran_at).await
    }

    async fn deactivate_schedule(&self, id: ScheduleId) -> Result<()> {
        self.deactivate_schedule_row(id).await
    }
}
