//! In-process task store.
//!
//! All state sits behind one `parking_lot::Mutex`. Each trait method takes
//! the lock once, so every check-and-write happens as a single step and the
//! conditional-write contract holds under concurrent callers.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use super::{DueSchedules, TaskStore, UnreadableSchedule};
use crate::error::{Error, Result};
use crate::model::*;

#[derive(Default)]
struct Inner {
    tasks: HashMap<TaskId, Task>,
    assignments: Vec<Assignment>,
    staff: HashMap<StaffId, StaffMember>,
    templates: HashMap<TemplateId, TaskTemplate>,
    schedules: HashMap<ScheduleId, RecurrenceSchedule>,
    unreadable: HashSet<ScheduleId>,
    fail_run_records: bool,
}

impl Inner {
    fn workload(&self, staff_id: StaffId) -> u32 {
        let open = self
            .tasks
            .values()
            .filter(|t| t.assignee_id == Some(staff_id) && t.status.is_active())
            .count();
        u32::try_from(open).unwrap_or(u32::MAX)
    }

    fn task(&self, id: TaskId) -> Result<&Task> {
        self.tasks
            .get(&id)
            .ok_or_else(|| Error::NotFound(format!("task {id}")))
    }

    fn schedule_mut(&mut self, id: ScheduleId) -> Result<&mut RecurrenceSchedule> {
        self.schedules
            .get_mut(&id)
            .ok_or_else(|| Error::NotFound(format!("schedule {id}")))
    }
}

/// Task store held entirely in memory.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a staff member.
    pub fn upsert_staff(&self, member: StaffMember) {
        self.inner.lock().staff.insert(member.id, member);
    }

    /// Add or replace a task template.
    pub fn upsert_template(&self, template: TaskTemplate) {
        self.inner.lock().templates.insert(template.id, template);
    }

    /// Remove a template, e.g. to simulate a broken schedule source.
    pub fn remove_template(&self, id: TemplateId) -> Option<TaskTemplate> {
        self.inner.lock().templates.remove(&id)
    }

    /// Report `id` as undecodable from now on, the way a corrupt row reads
    /// back from Postgres.
    pub fn mark_unreadable(&self, id: ScheduleId) {
        self.inner.lock().unreadable.insert(id);
    }

    /// Make [`TaskStore::record_schedule_run`] fail while `on` is set.
    pub fn fail_run_records(&self, on: bool) {
        self.inner.lock().fail_run_records = on;
    }

    /// Every task created from `schedule_id`.
    pub fn tasks_for_schedule(&self, schedule_id: ScheduleId) -> Vec<Task> {
        let inner = self.inner.lock();
        let mut tasks: Vec<Task> = inner
            .tasks
            .values()
            .filter(|t| t.recurrence_id == Some(schedule_id))
            .cloned()
            .collect();
        tasks.sort_by_key(|t| t.scheduled_for);
        tasks
    }

    pub fn task_count(&self) -> usize {
        self.inner.lock().tasks.len()
    }
}

#[async_trait]
impl TaskStore for MemoryStore {
    async fn get_task(&self, id: TaskId) -> Result<Task> {
        self.inner.lock().task(id).cloned()
    }

    async fn insert_task(&self, task: &Task, assignment: Option<&Assignment>) -> Result<Task> {
        let mut inner = self.inner.lock();
        if inner.tasks.contains_key(&task.id) {
            return Err(Error::Conflict(format!("task {} already exists", task.id)));
        }
        if let Some(assignment) = assignment {
            if assignment.task_id != task.id || task.assignee_id != Some(assignment.staff_id) {
                return Err(Error::Validation(format!(
                    "assignment does not match task {}",
                    task.id
                )));
            }
            inner.assignments.push(assignment.clone());
        }
        inner.tasks.insert(task.id, task.clone());
        Ok(task.clone())
    }

    async fn bind_assignee(&self, assignment: &Assignment) -> Result<Task> {
        let mut inner = self.inner.lock();
        let task = inner.task(assignment.task_id)?;

        if task.status.is_terminal() {
            return Err(Error::InvalidTransition {
                from: task.status.to_string(),
                to: TaskStatus::Assigned.to_string(),
            });
        }
        if task.assignee_id.is_some() || task.status != TaskStatus::Pending {
            return Err(Error::Conflict(format!(
                "task {} is already assigned",
                assignment.task_id
            )));
        }

        let task = inner
            .tasks
            .get_mut(&assignment.task_id)
            .ok_or_else(|| Error::NotFound(format!("task {}", assignment.task_id)))?;
        task.status = TaskStatus::Assigned;
        task.assignee_id = Some(assignment.staff_id);
        task.assigned_by = Some(assignment.assigned_by);
        task.updated_at = assignment.assigned_at;
        let bound = task.clone();

        inner.assignments.push(assignment.clone());
        Ok(bound)
    }

    async fn transition_task(
        &self,
        id: TaskId,
        from: TaskStatus,
        to: TaskStatus,
        at: DateTime<Utc>,
    ) -> Result<Task> {
        let mut inner = self.inner.lock();
        let task = inner
            .tasks
            .get_mut(&id)
            .ok_or_else(|| Error::NotFound(format!("task {id}")))?;

        if task.status != from {
            return Err(Error::InvalidTransition {
                from: task.status.to_string(),
                to: to.to_string(),
            });
        }

        task.status = to;
        task.updated_at = at;
        if to.is_terminal() {
            task.completed_at = Some(at);
        }
        if to == TaskStatus::Pending {
            task.assignee_id = None;
            task.assigned_by = None;
        }
        Ok(task.clone())
    }

    async fn list_tasks(
        &self,
        restaurant_id: RestaurantId,
        status: Option<TaskStatus>,
        limit: usize,
    ) -> Result<Vec<Task>> {
        let inner = self.inner.lock();
        let mut tasks: Vec<Task> = inner
            .tasks
            .values()
            .filter(|t| t.restaurant_id == restaurant_id)
            .filter(|t| status.is_none_or(|s| t.status == s))
            .cloned()
            .collect();
        tasks.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));
        tasks.truncate(limit);
        Ok(tasks)
    }

    async fn assignment_history(&self, task_id: TaskId) -> Result<Vec<Assignment>> {
        let inner = self.inner.lock();
        inner.task(task_id)?;
        Ok(inner
            .assignments
            .iter()
            .filter(|a| a.task_id == task_id)
            .cloned()
            .collect())
    }

    async fn get_staff(&self, id: StaffId) -> Result<StaffMember> {
        self.inner
            .lock()
            .staff
            .get(&id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("staff member {id}")))
    }

    async fn candidate_pool(
        &self,
        restaurant_id: RestaurantId,
        target: Option<DateTime<Utc>>,
    ) -> Result<Vec<StaffCandidate>> {
        let inner = self.inner.lock();
        let mut pool: Vec<StaffCandidate> = inner
            .staff
            .values()
            .filter(|m| m.restaurant_id == restaurant_id)
            .map(|m| m.to_candidate(inner.workload(m.id), target))
            .collect();
        pool.sort_by_key(|c| c.staff_id);
        Ok(pool)
    }

    async fn get_template(&self, id: TemplateId) -> Result<TaskTemplate> {
        self.inner
            .lock()
            .templates
            .get(&id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("template {id}")))
    }

    async fn insert_schedule(&self, schedule: &RecurrenceSchedule) -> Result<()> {
        let mut inner = self.inner.lock();
        if inner.schedules.contains_key(&schedule.id) {
            return Err(Error::Conflict(format!(
                "schedule {} already exists",
                schedule.id
            )));
        }
        inner.schedules.insert(schedule.id, schedule.clone());
        Ok(())
    }

    async fn get_schedule(&self, id: ScheduleId) -> Result<RecurrenceSchedule> {
        self.inner
            .lock()
            .schedules
            .get(&id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("schedule {id}")))
    }

    async fn due_schedules(&self, now: DateTime<Utc>) -> Result<DueSchedules> {
        let inner = self.inner.lock();
        let mut due: Vec<&RecurrenceSchedule> =
            inner.schedules.values().filter(|s| s.is_due(now)).collect();
        due.sort_by(|a, b| a.next_run_at.cmp(&b.next_run_at).then(a.id.cmp(&b.id)));

        let mut batch = DueSchedules::default();
        for schedule in due {
            if inner.unreadable.contains(&schedule.id) {
                batch.unreadable.push(UnreadableSchedule {
                    id: schedule.id,
                    reason: "marked unreadable".to_string(),
                });
            } else {
                batch.schedules.push(schedule.clone());
            }
        }
        Ok(batch)
    }

    async fn claim_schedule_run(
        &self,
        id: ScheduleId,
        expected: DateTime<Utc>,
        next: DateTime<Utc>,
    ) -> Result<bool> {
        let mut inner = self.inner.lock();
        let schedule = inner.schedule_mut(id)?;
        if !schedule.is_active
            || schedule.next_run_at != expected
            || schedule.max_runs.is_some_and(|max| schedule.total_runs >= max)
        {
            return Ok(false);
        }
        schedule.next_run_at = next;
        schedule.total_runs += 1;
        Ok(true)
    }

    async fn record_schedule_run(
        &self,
        id: ScheduleId,
        succeeded: bool,
        ran_at: DateTime<Utc>,
    ) -> Result<()> {
        let mut inner = self.inner.lock();
        if inner.fail_run_records {
            return Err(Error::Other(format!("run record for schedule {id} rejected")));
        }
        let schedule = inner.schedule_mut(id)?;
        if !succeeded {
            schedule.total_runs = schedule.total_runs.saturating_sub(1);
            schedule.failed_runs += 1;
        }
        schedule.last_run_at = Some(ran_at);
        schedule.updated_at = ran_at;
        Ok(())
    }

    async fn deactivate_schedule(&self, id: ScheduleId) -> Result<()> {
        let mut inner = self.inner.lock();
        let schedule = inner.schedule_mut(id)?;
        schedule.is_active = false;
        schedule.updated_at = Utc::now();
        Ok(())
    }
}
