//! Task templates and recurrence schedules.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::tasks::non_negative;
use crate::error::{Error, Result};
use crate::model::*;
use crate::store::{DueSchedules, UnreadableSchedule};

const SCHEDULE_COLUMNS: &str = "id, template_id, restaurant_id, pattern, next_run_at, end_date, max_runs, total_runs, failed_runs, is_active, created_by, last_run_at, created_at, updated_at";

impl super::Db {
    // -----------------------------------------------------------------------
    // Templates
    // -----------------------------------------------------------------------

    /// Insert or replace a task template.
    pub async fn upsert_template(&self, template: &TaskTemplate) -> Result<()> {
        sqlx::query(
            "INSERT INTO task_templates (id, restaurant_id, title, title_secondary, task_type, priority, required_skills, required_role, location, estimated_minutes, due_offset_minutes, active)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
             ON CONFLICT (id) DO UPDATE SET
                restaurant_id = EXCLUDED.restaurant_id,
                title = EXCLUDED.title,
                title_secondary = EXCLUDED.title_secondary,
                task_type = EXCLUDED.task_type,
                priority = EXCLUDED.priority,
                required_skills = EXCLUDED.required_skills,
                required_role = EXCLUDED.required_role,
                location = EXCLUDED.location,
                estimated_minutes = EXCLUDED.estimated_minutes,
                due_offset_minutes = EXCLUDED.due_offset_minutes,
                active = EXCLUDED.active",
        )
        .bind(template.id.0)
        .bind(template.restaurant_id.0)
        .bind(&template.title)
        .bind(&template.title_secondary)
        .bind(&template.task_type)
        .bind(template.priority.as_str())
        .bind(template.required_skills.iter().cloned().collect::<Vec<String>>())
        .bind(template.required_role.as_str())
        .bind(&template.location)
        .bind(i32::try_from(template.estimated_minutes).unwrap_or(i32::MAX))
        .bind(
            template
                .due_offset_minutes
                .map(|m| i32::try_from(m).unwrap_or(i32::MAX)),
        )
        .bind(template.active)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub(super) async fn fetch_template(&self, id: TemplateId) -> Result<TaskTemplate> {
        let row: Option<TemplateRow> = sqlx::query_as(
            "SELECT id, restaurant_id, title, title_secondary, task_type, priority, required_skills, required_role, location, estimated_minutes, due_offset_minutes, active
             FROM task_templates WHERE id = $1",
        )
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.ok_or_else(|| Error::NotFound(format!("template {id}")))?
            .try_into_template()
    }

    // -----------------------------------------------------------------------
    // Schedules
    // -----------------------------------------------------------------------

    pub(super) async fn insert_schedule_row(&self, schedule: &RecurrenceSchedule) -> Result<()> {
        let pattern = serde_json::to_value(&schedule.pattern)
            .map_err(|e| Error::Other(format!("failed to encode pattern: {e}")))?;

        let inserted = sqlx::query(
            "INSERT INTO recurrence_schedules (id, template_id, restaurant_id, pattern, next_run_at, end_date, max_runs, total_runs, failed_runs, is_active, created_by, last_run_at, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
             ON CONFLICT (id) DO NOTHING",
        )
        .bind(schedule.id.0)
        .bind(schedule.template_id.0)
        .bind(schedule.restaurant_id.0)
        .bind(&pattern)
        .bind(schedule.next_run_at)
        .bind(schedule.end_date)
        .bind(schedule.max_runs.map(|n| i32::try_from(n).unwrap_or(i32::MAX)))
        .bind(i32::try_from(schedule.total_runs).unwrap_or(i32::MAX))
        .bind(i32::try_from(schedule.failed_runs).unwrap_or(i32::MAX))
        .bind(schedule.is_active)
        .bind(schedule.created_by.0)
        .bind(schedule.last_run_at)
        .bind(schedule.created_at)
        .bind(schedule.updated_at)
        .execute(&self.pool)
        .await?
        .rows_affected();

        if inserted == 0 {
            return Err(Error::Conflict(format!(
                "schedule {} already exists",
                schedule.id
            )));
        }
        Ok(())
    }

    pub(super) async fn fetch_schedule(&self, id: ScheduleId) -> Result<RecurrenceSchedule> {
        let row: Option<ScheduleRow> = sqlx::query_as(&format!(
            "SELECT {SCHEDULE_COLUMNS} FROM recurrence_schedules WHERE id = $1"
        ))
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.ok_or_else(|| Error::NotFound(format!("schedule {id}")))?
            .try_into_schedule()
    }

    pub(super) async fn fetch_due_schedules(
        &self,
        now: DateTime<Utc>,
    ) -> Result<DueSchedules> {
        let rows: Vec<ScheduleRow> = sqlx::query_as(&format!(
            "SELECT {SCHEDULE_COLUMNS} FROM recurrence_schedules
             WHERE is_active AND next_run_at <= $1
             ORDER BY next_run_at, id"
        ))
        .bind(now)
        .fetch_all(&self.pool)
        .await?;

        let mut batch = DueSchedules::default();
        for row in rows {
            let id = ScheduleId(row.id);
            match row.try_into_schedule() {
                Ok(schedule) => batch.schedules.push(schedule),
                Err(e) => batch.unreadable.push(UnreadableSchedule {
                    id,
                    reason: e.to_string(),
                }),
            }
        }
        Ok(batch)
    }

    pub(super) async fn claim_schedule_row(
        &self,
        id: ScheduleId,
        expected: DateTime<Utc>,
        next: DateTime<Utc>,
    ) -> Result<bool> {
        let rows_affected = sqlx::query(
            "UPDATE recurrence_schedules
             SET next_run_at = $1, total_runs = total_runs + 1, updated_at = now()
             WHERE id = $2 AND is_active AND next_run_at = $3
               AND (max_runs IS NULL OR total_runs < max_runs)",
        )
        .bind(next)
        .bind(id.0)
        .bind(expected)
        .execute(&self.pool)
        .await?
        .rows_affected();

        Ok(rows_affected == 1)
    }

    pub(super) async fn record_schedule_row(
        &self,
        id: ScheduleId,
        succeeded: bool,
        ran_at: DateTime<Utc>,
    ) -> Result<()> {
        let rows_affected = sqlx::query(
            "UPDATE recurrence_schedules SET
                total_runs = CASE WHEN $1::boolean THEN total_runs ELSE GREATEST(total_runs - 1, 0) END,
                failed_runs = failed_runs + CASE WHEN $1::boolean THEN 0 ELSE 1 END,
                last_run_at = $2,
                updated_at = $2
             WHERE id = $3",
        )
        .bind(succeeded)
        .bind(ran_at)
        .bind(id.0)
        .execute(&self.pool)
        .await?
        .rows_affected();

        if rows_affected == 0 {
            return Err(Error::NotFound(format!("schedule {id}")));
        }
        Ok(())
    }

    pub(super) async fn deactivate_schedule_row(&self, id: ScheduleId) -> Result<()> {
        let rows_affected = sqlx::query(
            "UPDATE recurrence_schedules SET is_active = FALSE, updated_at = now() WHERE id = $1",
        )
        .bind(id.0)
        .execute(&self.pool)
        .await?
        .rows_affected();

        if rows_affected == 0 {
            return Err(Error::NotFound(format!("schedule {id}")));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Row types
// ---------------------------------------------------------------------------

#[derive(sqlx::FromRow)]
struct TemplateRow {
    id: Uuid,
    restaurant_id: Uuid,
    title: String,
    title_secondary: Option<String>,
    task_type: String,
    priority: String,
    required_skills: Vec<String>,
    required_role: String,
    location: Option<String>,
    estimated_minutes: i32,
    due_offset_minutes: Option<i32>,
    active: bool,
}

impl TemplateRow {
    fn try_into_template(self) -> Result<TaskTemplate> {
        Ok(TaskTemplate {
            id: TemplateId(self.id),
            restaurant_id: RestaurantId(self.restaurant_id),
            title: self.title,
            title_secondary: self.title_secondary,
            task_type: self.task_type,
            priority: self.priority.parse()?,
            required_skills: self.required_skills.into_iter().collect(),
            required_role: self.required_role.parse()?,
            location: self.location,
            estimated_minutes: non_negative(i64::from(self.estimated_minutes), "estimated_minutes")?,
            due_offset_minutes: self
                .due_offset_minutes
                .map(|m| non_negative(i64::from(m), "due_offset_minutes"))
                .transpose()?,
            active: self.active,
        })
    }
}

#[derive(sqlx::FromRow)]
struct ScheduleRow {
    id: Uuid,
    template_id: Uuid,
    restaurant_id: Uuid,
    pattern: serde_json::Value,
    next_run_at: DateTime<Utc>,
    end_date: Option<DateTime<Utc>>,
    max_runs: Option<i32>,
    total_runs: i32,
    failed_runs: i32,
    is_active: bool,
    created_by: Uuid,
    last_run_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl ScheduleRow {
    fn try_into_schedule(self) -> Result<RecurrenceSchedule> {
        let pattern: RecurrencePattern = serde_json::from_value(self.pattern).map_err(|e| {
            Error::Other(format!("schedule {} has a malformed pattern: {e}", self.id))
        })?;

        Ok(RecurrenceSchedule {
            id: ScheduleId(self.id),
            template_id: TemplateId(self.template_id),
            restaurant_id: RestaurantId(self.restaurant_id),
            pattern,
            next_run_at: self.next_run_at,
            end_date: self.end_date,
            max_runs: self
                .max_runs
                .map(|n| non_negative(i64::from(n), "max_runs"))
                .transpose()?,
            total_runs: non_negative(i64::from(self.total_runs), "total_runs")?,
            failed_runs: non_negative(i64::from(self.failed_runs), "failed_runs")?,
            is_active: self.is_active,
            created_by: StaffId(self.created_by),
            last_run_at: self.last_run_at,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}
