//! Tasks, assignment history, and the staff roster.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::model::*;

const TASK_COLUMNS: &str = "id, restaurant_id, title, title_secondary, task_type, priority, status, required_skills, required_role, location, scheduled_for, due_at, assignee_id, assigned_by, estimated_minutes, recurrence_id, created_at, updated_at, completed_at";

impl super::Db {
    // -----------------------------------------------------------------------
    // Tasks
    // -----------------------------------------------------------------------

    pub(super) async fn fetch_task(&self, id: TaskId) -> Result<Task> {
        let row: Option<TaskRow> =
            sqlx::query_as(&format!("SELECT {TASK_COLUMNS} FROM tasks WHERE id = $1"))
                .bind(id.0)
                .fetch_optional(&self.pool)
                .await?;

        row.ok_or_else(|| Error::NotFound(format!("task {id}")))?
            .try_into_task()
    }

    pub(super) async fn fetch_tasks(
        &self,
        restaurant_id: RestaurantId,
        status: Option<TaskStatus>,
        limit: usize,
    ) -> Result<Vec<Task>> {
        let rows: Vec<TaskRow> = sqlx::query_as(&format!(
            "SELECT {TASK_COLUMNS} FROM tasks
             WHERE restaurant_id = $1 AND ($2::text IS NULL OR status = $2)
             ORDER BY created_at DESC, id
             LIMIT $3"
        ))
        .bind(restaurant_id.0)
        .bind(status.map(|s| s.as_str()))
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(TaskRow::try_into_task).collect()
    }

    pub(super) async fn insert_task_row(
        &self,
        task: &Task,
        assignment: Option<&Assignment>,
    ) -> Result<Task> {
        if let Some(a) = assignment {
            if a.task_id != task.id || task.assignee_id != Some(a.staff_id) {
                return Err(Error::Validation(format!(
                    "assignment does not match task {}",
                    task.id
                )));
            }
        }

        let mut tx = self.pool.begin().await?;

        let inserted = sqlx::query(
            "INSERT INTO tasks (id, restaurant_id, title, title_secondary, task_type, priority, status, required_skills, required_role, location, scheduled_for, due_at, assignee_id, assigned_by, estimated_minutes, recurrence_id, created_at, updated_at, completed_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19)
             ON CONFLICT (id) DO NOTHING",
        )
        .bind(task.id.0)
        .bind(task.restaurant_id.0)
        .bind(&task.title)
        .bind(&task.title_secondary)
        .bind(&task.task_type)
        .bind(task.priority.as_str())
        .bind(task.status.as_str())
        .bind(task.required_skills.iter().cloned().collect::<Vec<String>>())
        .bind(task.required_role.as_str())
        .bind(&task.location)
        .bind(task.scheduled_for)
        .bind(task.due_at)
        .bind(task.assignee_id.map(|s| s.0))
        .bind(task.assigned_by.map(|s| s.0))
        .bind(i32::try_from(task.estimated_minutes).unwrap_or(i32::MAX))
        .bind(task.recurrence_id.map(|r| r.0))
        .bind(task.created_at)
        .bind(task.updated_at)
        .bind(task.completed_at)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if inserted == 0 {
            return Err(Error::Conflict(format!("task {} already exists", task.id)));
        }

        if let Some(a) = assignment {
            insert_assignment(&mut tx, a).await?;
        }

        tx.commit().await?;
        self.fetch_task(task.id).await
    }

    pub(super) async fn bind_assignee_row(&self, assignment: &Assignment) -> Result<Task> {
        let mut tx = self.pool.begin().await?;

        let bound = sqlx::query(
            "UPDATE tasks SET status = 'assigned', assignee_id = $1, assigned_by = $2, updated_at = $3
             WHERE id = $4 AND status = 'pending' AND assignee_id IS NULL",
        )
        .bind(assignment.staff_id.0)
        .bind(assignment.assigned_by.0)
        .bind(assignment.assigned_at)
        .bind(assignment.task_id.0)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if bound == 0 {
            tx.rollback().await?;
            let current = self.fetch_task(assignment.task_id).await?;
            if current.status.is_terminal() {
                return Err(Error::InvalidTransition {
                    from: current.status.to_string(),
                    to: TaskStatus::Assigned.to_string(),
                });
            }
            return Err(Error::Conflict(format!(
                "task {} is already assigned",
                assignment.task_id
            )));
        }

        insert_assignment(&mut tx, assignment).await?;
        tx.commit().await?;

        self.fetch_task(assignment.task_id).await
    }

    pub(super) async fn transition_task_row(
        &self,
        id: TaskId,
        from: TaskStatus,
        to: TaskStatus,
        at: DateTime<Utc>,
    ) -> Result<Task> {
        let rows_affected = sqlx::query(
            "UPDATE tasks SET
                status = $1,
                updated_at = $2,
                completed_at = CASE WHEN $3::boolean THEN $2 ELSE completed_at END,
                assignee_id = CASE WHEN $1 = 'pending' THEN NULL ELSE assignee_id END,
                assigned_by = CASE WHEN $1 = 'pending' THEN NULL ELSE assigned_by END
             WHERE id = $4 AND status = $5",
        )
        .bind(to.as_str())
        .bind(at)
        .bind(to.is_terminal())
        .bind(id.0)
        .bind(from.as_str())
        .execute(&self.pool)
        .await?
        .rows_affected();

        if rows_affected == 0 {
            let current = self.fetch_task(id).await?;
            return Err(Error::InvalidTransition {
                from: current.status.to_string(),
                to: to.to_string(),
            });
        }

        self.fetch_task(id).await
    }

    pub(super) async fn fetch_assignments(&self, task_id: TaskId) -> Result<Vec<Assignment>> {
        // Surface NotFound for unknown tasks rather than an empty history.
        self.fetch_task(task_id).await?;

        let rows: Vec<AssignmentRow> = sqlx::query_as(
            "SELECT id, task_id, staff_id, assigned_by, assigned_at, method, score, note
             FROM assignments WHERE task_id = $1
             ORDER BY assigned_at, id",
        )
        .bind(task_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(AssignmentRow::try_into_assignment)
            .collect()
    }

    // -----------------------------------------------------------------------
    // Staff
    // -----------------------------------------------------------------------

    /// Insert or replace a staff member together with their shifts.
    pub async fn upsert_staff(&self, member: &StaffMember) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO staff (id, restaurant_id, name, role, skills, location, active)
             VALUES ($1, $2, $3, $4, $5, $6, $7)
             ON CONFLICT (id) DO UPDATE SET
                restaurant_id = EXCLUDED.restaurant_id,
                name = EXCLUDED.name,
                role = EXCLUDED.role,
                skills = EXCLUDED.skills,
                location = EXCLUDED.location,
                active = EXCLUDED.active",
        )
        .bind(member.id.0)
        .bind(member.restaurant_id.0)
        .bind(&member.name)
        .bind(member.role.as_str())
        .bind(member.skills.iter().cloned().collect::<Vec<String>>())
        .bind(&member.location)
        .bind(member.active)
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM shifts WHERE staff_id = $1")
            .bind(member.id.0)
            .execute(&mut *tx)
            .await?;

        for shift in &member.shifts {
            sqlx::query("INSERT INTO shifts (staff_id, starts_at, ends_at) VALUES ($1, $2, $3)")
                .bind(member.id.0)
                .bind(shift.starts_at)
                .bind(shift.ends_at)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    pub(super) async fn fetch_staff(&self, id: StaffId) -> Result<StaffMember> {
        let row: Option<StaffRow> = sqlx::query_as(
            "SELECT id, restaurant_id, name, role, skills, location, active, 0::bigint AS workload
             FROM staff WHERE id = $1",
        )
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await?;

        let row = row.ok_or_else(|| Error::NotFound(format!("staff member {id}")))?;
        let mut shifts = self.fetch_shifts(&[row.id]).await?;
        let (member, _) = row.try_into_member(shifts.remove(&id.0).unwrap_or_default())?;
        Ok(member)
    }

    pub(super) async fn fetch_candidates(
        &self,
        restaurant_id: RestaurantId,
        target: Option<DateTime<Utc>>,
    ) -> Result<Vec<StaffCandidate>> {
        let rows: Vec<StaffRow> = sqlx::query_as(
            "SELECT s.id, s.restaurant_id, s.name, s.role, s.skills, s.location, s.active,
                    (SELECT count(*) FROM tasks t
                     WHERE t.assignee_id = s.id AND t.status IN ('assigned', 'in_progress')) AS workload
             FROM staff s
             WHERE s.restaurant_id = $1
             ORDER BY s.id",
        )
        .bind(restaurant_id.0)
        .fetch_all(&self.pool)
        .await?;

        let ids: Vec<Uuid> = rows.iter().map(|r| r.id).collect();
        let mut shifts = self.fetch_shifts(&ids).await?;

        rows.into_iter()
            .map(|row| {
                let own = shifts.remove(&row.id).unwrap_or_default();
                let (member, workload) = row.try_into_member(own)?;
                Ok(member.to_candidate(workload, target))
            })
            .collect()
    }

    async fn fetch_shifts(&self, staff_ids: &[Uuid]) -> Result<HashMap<Uuid, Vec<Shift>>> {
        let rows: Vec<(Uuid, DateTime<Utc>, DateTime<Utc>)> = sqlx::query_as(
            "SELECT staff_id, starts_at, ends_at FROM shifts
             WHERE staff_id = ANY($1)
             ORDER BY staff_id, starts_at",
        )
        .bind(staff_ids)
        .fetch_all(&self.pool)
        .await?;

        let mut by_staff: HashMap<Uuid, Vec<Shift>> = HashMap::new();
        for (staff_id, starts_at, ends_at) in rows {
            by_staff
                .entry(staff_id)
                .or_default()
                .push(Shift::new(starts_at, ends_at));
        }
        Ok(by_staff)
    }
}

async fn insert_assignment(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    a: &Assignment,
) -> Result<()> {
    sqlx::query(
        "INSERT INTO assignments (id, task_id, staff_id, assigned_by, assigned_at, method, score, note)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
    )
    .bind(a.id.0)
    .bind(a.task_id.0)
    .bind(a.staff_id.0)
    .bind(a.assigned_by.0)
    .bind(a.assigned_at)
    .bind(a.method.as_str())
    .bind(a.score)
    .bind(&a.note)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

pub(super) fn non_negative(value: i64, field: &str) -> Result<u32> {
    u32::try_from(value)
        .map_err(|_| Error::Other(format!("column {field} holds out-of-range value {value}")))
}

// ---------------------------------------------------------------------------
// Row types
// ---------------------------------------------------------------------------

#[derive(sqlx::FromRow)]
struct TaskRow {
    id: Uuid,
    restaurant_id: Uuid,
    title: String,
    title_secondary: Option<String>,
    task_type: String,
    priority: String,
    status: String,
    required_skills: Vec<String>,
    required_role: String,
    location: Option<String>,
    scheduled_for: Option<DateTime<Utc>>,
    due_at: Option<DateTime<Utc>>,
    assignee_id: Option<Uuid>,
    assigned_by: Option<Uuid>,
    estimated_minutes: i32,
    recurrence_id: Option<Uuid>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
}

impl TaskRow {
    fn try_into_task(self) -> Result<Task> {
        Ok(Task {
            id: TaskId(self.id),
            restaurant_id: RestaurantId(self.restaurant_id),
            title: self.title,
            title_secondary: self.title_secondary,
            task_type: self.task_type,
            priority: self.priority.parse()?,
            status: self.status.parse()?,
            required_skills: self.required_skills.into_iter().collect(),
            required_role: self.required_role.parse()?,
            location: self.location,
            scheduled_for: self.scheduled_for,
            due_at: self.due_at,
            assignee_id: self.assignee_id.map(StaffId),
            assigned_by: self.assigned_by.map(StaffId),
            estimated_minutes: non_negative(i64::from(self.estimated_minutes), "estimated_minutes")?,
            recurrence_id: self.recurrence_id.map(ScheduleId),
            created_at: self.created_at,
            updated_at: self.updated_at,
            completed_at: self.completed_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct AssignmentRow {
    id: Uuid,
    task_id: Uuid,
    staff_id: Uuid,
    assigned_by: Uuid,
    assigned_at: DateTime<Utc>,
    method: String,
    score: Option<f64>,
    note: Option<String>,
}

impl AssignmentRow {
    fn try_into_assignment(self) -> Result<Assignment> {
        Ok(Assignment {
            id: AssignmentId(self.id),
            task_id: TaskId(self.task_id),
            staff_id: StaffId(self.staff_id),
            assigned_by: StaffId(self.assigned_by),
            assigned_at: self.assigned_at,
            method: self.method.parse()?,
            score: self.score,
            note: self.note,
        })
    }
}

#[derive(sqlx::FromRow)]
struct StaffRow {
    id: Uuid,
    restaurant_id: Uuid,
    name: String,
    role: String,
    skills: Vec<String>,
    location: Option<String>,
    active: bool,
    workload: i64,
}

impl StaffRow {
    fn try_into_member(self, shifts: Vec<Shift>) -> Result<(StaffMember, u32)> {
        let workload = non_negative(self.workload, "workload")?;
        let member = StaffMember {
            id: StaffId(self.id),
            restaurant_id: RestaurantId(self.restaurant_id),
            name: self.name,
            role: self.role.parse()?,
            skills: self.skills.into_iter().collect(),
            location: self.location,
            active: self.active,
            shifts,
        };
        Ok((member, workload))
    }
}
