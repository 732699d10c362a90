//! Tasks, their lifecycle state, and the request shapes used to create them.

use std::collections::BTreeSet;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::recurrence::ScheduleId;
use super::staff::{RestaurantId, Role, StaffId};
use crate::error::{Error, Result};

uuid_id!(
    /// Newtype for task IDs.
    TaskId
);

/// Default task type when a request does not name one.
pub const DEFAULT_TASK_TYPE: &str = "general";

/// Default estimated duration in minutes.
pub const DEFAULT_ESTIMATED_MINUTES: u32 = 30;

// ---------------------------------------------------------------------------
// Task
// ---------------------------------------------------------------------------

/// A unit of operational work in a restaurant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,

    /// Tenant scope. Candidates are only drawn from this restaurant's staff.
    pub restaurant_id: RestaurantId,

    /// Title in the restaurant's primary locale.
    pub title: String,

    /// Title in the secondary locale, if translated.
    pub title_secondary: Option<String>,

    /// Free-form category (e.g., "cleaning", "inventory").
    pub task_type: String,

    pub priority: Priority,
    pub status: TaskStatus,

    /// Skills a candidate should hold. Empty means anyone qualifies.
    pub required_skills: BTreeSet<String>,

    /// Minimum role a candidate must hold.
    pub required_role: Role,

    /// Target location or zone (e.g., "kitchen/line-2").
    pub location: Option<String>,

    pub scheduled_for: Option<DateTime<Utc>>,
    pub due_at: Option<DateTime<Utc>>,

    /// Current assignee. Set iff status is assigned or in progress.
    pub assignee_id: Option<StaffId>,

    /// Who bound the current assignee.
    pub assigned_by: Option<StaffId>,

    pub estimated_minutes: u32,

    /// Schedule that materialized this task, if recurring.
    pub recurrence_id: Option<ScheduleId>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Task {
    /// The instant availability is checked against: scheduled start, else due date.
    pub fn target_time(&self) -> Option<DateTime<Utc>> {
        self.scheduled_for.or(self.due_at)
    }

    pub fn estimated_duration(&self) -> Duration {
        Duration::minutes(i64::from(self.estimated_minutes))
    }

    pub fn is_assigned(&self) -> bool {
        self.assignee_id.is_some()
    }
}

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// Lifecycle state of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Waiting for an assignee.
    Pending,
    /// Bound to a staff member, not started.
    Assigned,
    /// Assignee is working on it.
    InProgress,
    /// Done. Terminal.
    Completed,
    /// Abandoned or could not be done. Terminal.
    Failed,
}

impl TaskStatus {
    /// Can transition from self to `to`?
    pub fn can_transition_to(self, to: TaskStatus) -> bool {
        use TaskStatus::*;
        matches!(
            (self, to),
            (Pending, Assigned)
                | (Assigned, InProgress)
                | (Assigned, Pending)   // explicit unassignment
                | (InProgress, Completed)
                | (InProgress, Failed)
        )
    }

    /// Is this a terminal state?
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }

    /// Does a task in this state count toward its assignee's workload?
    pub fn is_active(self) -> bool {
        matches!(self, TaskStatus::Assigned | TaskStatus::InProgress)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Assigned => "assigned",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TaskStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(TaskStatus::Pending),
            "assigned" => Ok(TaskStatus::Assigned),
            "in_progress" => Ok(TaskStatus::InProgress),
            "completed" => Ok(TaskStatus::Completed),
            "failed" => Ok(TaskStatus::Failed),
            other => Err(Error::Validation(format!("unknown task status: {other}"))),
        }
    }
}

// ---------------------------------------------------------------------------
// Priority
// ---------------------------------------------------------------------------

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
    Critical,
    Urgent,
}

impl Priority {
    pub fn as_str(self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
            Priority::Critical => "critical",
            Priority::Urgent => "urgent",
        }
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Priority {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "low" => Ok(Priority::Low),
            "medium" => Ok(Priority::Medium),
            "high" => Ok(Priority::High),
            "critical" => Ok(Priority::Critical),
            "urgent" => Ok(Priority::Urgent),
            other => Err(Error::Validation(format!("unknown priority: {other}"))),
        }
    }
}

// ---------------------------------------------------------------------------
// Creation requests
// ---------------------------------------------------------------------------

/// A task-creation request. Every field is optional so that bulk requests
/// can be completed from [`TaskDefaults`] before validation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NewTask {
    pub restaurant_id: Option<RestaurantId>,
    pub title: Option<String>,
    pub title_secondary: Option<String>,
    pub task_type: Option<String>,
    pub priority: Option<Priority>,
    pub required_skills: Option<BTreeSet<String>>,
    pub required_role: Option<Role>,
    pub location: Option<String>,
    pub scheduled_for: Option<DateTime<Utc>>,
    pub due_at: Option<DateTime<Utc>>,
    pub estimated_minutes: Option<u32>,
    /// Create the task already bound to this staff member.
    pub assignee_id: Option<StaffId>,
}

/// Field values applied to every item of a bulk request that leaves them unset.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskDefaults {
    pub restaurant_id: Option<RestaurantId>,
    pub task_type: Option<String>,
    pub priority: Option<Priority>,
    pub required_skills: Option<BTreeSet<String>>,
    pub required_role: Option<Role>,
    pub location: Option<String>,
    pub scheduled_for: Option<DateTime<Utc>>,
    pub due_at: Option<DateTime<Utc>>,
    pub estimated_minutes: Option<u32>,
}

impl NewTask {
    pub fn new(restaurant_id: RestaurantId, title: impl Into<String>) -> Self {
        Self {
            restaurant_id: Some(restaurant_id),
            title: Some(title.into()),
            ..Self::default()
        }
    }

    pub fn title_secondary(mut self, title: impl Into<String>) -> Self {
        self.title_secondary = Some(title.into());
        self
    }

    pub fn task_type(mut self, task_type: impl Into<String>) -> Self {
        self.task_type = Some(task_type.into());
        self
    }

    pub fn priority(mut self, priority: Priority) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn skills<I, S>(mut self, skills: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.required_skills = Some(skills.into_iter().map(Into::into).collect());
        self
    }

    pub fn required_role(mut self, role: Role) -> Self {
        self.required_role = Some(role);
        self
    }

    pub fn location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    pub fn scheduled_for(mut self, at: DateTime<Utc>) -> Self {
        self.scheduled_for = Some(at);
        self
    }

    pub fn due_at(mut self, at: DateTime<Utc>) -> Self {
        self.due_at = Some(at);
        self
    }

    pub fn estimated_minutes(mut self, minutes: u32) -> Self {
        self.estimated_minutes = Some(minutes);
        self
    }

    pub fn assignee(mut self, staff_id: StaffId) -> Self {
        self.assignee_id = Some(staff_id);
        self
    }

    /// Fill every unset field from `defaults`.
    pub fn with_defaults(mut self, defaults: &TaskDefaults) -> Self {
        self.restaurant_id = self.restaurant_id.or(defaults.restaurant_id);
        self.task_type = self.task_type.or_else(|| defaults.task_type.clone());
        self.priority = self.priority.or(defaults.priority);
        self.required_skills = self
            .required_skills
            .or_else(|| defaults.required_skills.clone());
        self.required_role = self.required_role.or(defaults.required_role);
        self.location = self.location.or_else(|| defaults.location.clone());
        self.scheduled_for = self.scheduled_for.or(defaults.scheduled_for);
        self.due_at = self.due_at.or(defaults.due_at);
        self.estimated_minutes = self.estimated_minutes.or(defaults.estimated_minutes);
        self
    }

    /// Validate the request and build the task it describes.
    ///
    /// A request carrying an assignee produces an `assigned` task; the caller
    /// is responsible for checking that staff member.
    pub fn into_task(self, now: DateTime<Utc>) -> Result<Task> {
        let title = self
            .title
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .ok_or_else(|| Error::Validation("title is required".to_string()))?;

        let restaurant_id = self
            .restaurant_id
            .ok_or_else(|| Error::Validation("restaurant_id is required".to_string()))?;

        if let (Some(start), Some(due)) = (self.scheduled_for, self.due_at) {
            if due < start {
                return Err(Error::Validation(format!(
                    "due_at {due} is before scheduled_for {start}"
                )));
            }
        }

        let estimated_minutes = self.estimated_minutes.unwrap_or(DEFAULT_ESTIMATED_MINUTES);
        if estimated_minutes == 0 {
            return Err(Error::Validation(
                "estimated_minutes must be positive".to_string(),
            ));
        }

        let required_skills = self
            .required_skills
            .unwrap_or_default()
            .into_iter()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let status = if self.assignee_id.is_some() {
            TaskStatus::Assigned
        } else {
            TaskStatus::Pending
        };

        Ok(Task {
            id: TaskId::new(),
            restaurant_id,
            title,
            title_secondary: self.title_secondary.filter(|t| !t.trim().is_empty()),
            task_type: self
                .task_type
                .filter(|t| !t.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_TASK_TYPE.to_string()),
            priority: self.priority.unwrap_or_default(),
            status,
            required_skills,
            required_role: self.required_role.unwrap_or_default(),
            location: self.location.filter(|l| !l.trim().is_empty()),
            scheduled_for: self.scheduled_for,
            due_at: self.due_at,
            assignee_id: self.assignee_id,
            assigned_by: None,
            estimated_minutes,
            recurrence_id: None,
            created_at: now,
            updated_at: now,
            completed_at: None,
        })
    }
}
