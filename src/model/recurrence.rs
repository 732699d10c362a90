//! Recurrence patterns, schedules, and the templates they materialize.

use std::collections::BTreeSet;

use chrono::{DateTime, Duration, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use super::staff::{RestaurantId, Role, StaffId};
use super::task::{Priority, Task, TaskId, TaskStatus};
use crate::error::{Error, Result};

uuid_id!(
    /// Newtype for recurrence schedule IDs.
    ScheduleId
);

uuid_id!(
    /// Newtype for task template IDs.
    TemplateId
);

// ---------------------------------------------------------------------------
// Pattern
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecurrenceType {
    Daily,
    Weekly,
    Monthly,
    Yearly,
    /// Accepted by the wire format but has no next-run rule.
    Custom,
}

impl RecurrenceType {
    pub fn as_str(self) -> &'static str {
        match self {
            RecurrenceType::Daily => "daily",
            RecurrenceType::Weekly => "weekly",
            RecurrenceType::Monthly => "monthly",
            RecurrenceType::Yearly => "yearly",
            RecurrenceType::Custom => "custom",
        }
    }
}

impl std::fmt::Display for RecurrenceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for RecurrenceType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "daily" => Ok(RecurrenceType::Daily),
            "weekly" => Ok(RecurrenceType::Weekly),
            "monthly" => Ok(RecurrenceType::Monthly),
            "yearly" => Ok(RecurrenceType::Yearly),
            "custom" => Ok(RecurrenceType::Custom),
            other => Err(Error::Validation(format!(
                "unknown recurrence type: {other}"
            ))),
        }
    }
}

/// How often and at what local time a schedule fires.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecurrencePattern {
    #[serde(rename = "type")]
    pub kind: RecurrenceType,

    /// Every N days/weeks/months/years. Must be at least 1.
    pub interval: u32,

    /// Weekly only: weekday indices, 0 = Sunday .. 6 = Saturday.
    #[serde(default)]
    pub weekdays: BTreeSet<u8>,

    /// Monthly/yearly: 1..=31, clamped to the month's length.
    #[serde(default)]
    pub day_of_month: Option<u32>,

    /// Yearly: 1..=12.
    #[serde(default)]
    pub month_of_year: Option<u32>,

    pub hour: u32,
    pub minute: u32,

    /// IANA zone name (e.g., "Asia/Bangkok").
    pub timezone: String,
}

impl RecurrencePattern {
    fn base(kind: RecurrenceType, hour: u32, minute: u32, timezone: &str) -> Self {
        Self {
            kind,
            interval: 1,
            weekdays: BTreeSet::new(),
            day_of_month: None,
            month_of_year: None,
            hour,
            minute,
            timezone: timezone.to_string(),
        }
    }

    pub fn daily(hour: u32, minute: u32, timezone: &str) -> Self {
        Self::base(RecurrenceType::Daily, hour, minute, timezone)
    }

    pub fn weekly(
        weekdays: impl IntoIterator<Item = u8>,
        hour: u32,
        minute: u32,
        timezone: &str,
    ) -> Self {
        Self {
            weekdays: weekdays.into_iter().collect(),
            ..Self::base(RecurrenceType::Weekly, hour, minute, timezone)
        }
    }

    pub fn monthly(day_of_month: u32, hour: u32, minute: u32, timezone: &str) -> Self {
        Self {
            day_of_month: Some(day_of_month),
            ..Self::base(RecurrenceType::Monthly, hour, minute, timezone)
        }
    }

    pub fn yearly(
        month_of_year: u32,
        day_of_month: u32,
        hour: u32,
        minute: u32,
        timezone: &str,
    ) -> Self {
        Self {
            month_of_year: Some(month_of_year),
            day_of_month: Some(day_of_month),
            ..Self::base(RecurrenceType::Yearly, hour, minute, timezone)
        }
    }

    pub fn every(mut self, interval: u32) -> Self {
        self.interval = interval;
        self
    }

    /// Check field ranges and resolve the timezone.
    pub fn validate(&self) -> Result<Tz> {
        if self.kind == RecurrenceType::Custom {
            return Err(Error::Validation(
                "custom recurrence has no next-run rule".to_string(),
            ));
        }
        if self.interval == 0 {
            return Err(Error::Validation("interval must be at least 1".to_string()));
        }
        if self.hour > 23 || self.minute > 59 {
            return Err(Error::Validation(format!(
                "invalid time of day {:02}:{:02}",
                self.hour, self.minute
            )));
        }
        if let Some(day) = self.weekdays.iter().find(|d| **d > 6) {
            return Err(Error::Validation(format!(
                "weekday index {day} out of range 0-6"
            )));
        }
        if let Some(day) = self.day_of_month.filter(|d| !(1..=31).contains(d)) {
            return Err(Error::Validation(format!(
                "day_of_month {day} out of range 1-31"
            )));
        }
        if let Some(month) = self.month_of_year.filter(|m| !(1..=12).contains(m)) {
            return Err(Error::Validation(format!(
                "month_of_year {month} out of range 1-12"
            )));
        }
        self.timezone
            .parse::<Tz>()
            .map_err(|_| Error::Validation(format!("unknown timezone: {}", self.timezone)))
    }
}

// ---------------------------------------------------------------------------
// Template
// ---------------------------------------------------------------------------

/// Blueprint a recurring schedule stamps tasks from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskTemplate {
    pub id: TemplateId,
    pub restaurant_id: RestaurantId,
    pub title: String,
    pub title_secondary: Option<String>,
    pub task_type: String,
    pub priority: Priority,
    pub required_skills: BTreeSet<String>,
    pub required_role: Role,
    pub location: Option<String>,
    pub estimated_minutes: u32,
    /// Due date is set this many minutes after the scheduled start.
    pub due_offset_minutes: Option<u32>,
    pub active: bool,
}

impl TaskTemplate {
    pub fn new(restaurant_id: RestaurantId, title: impl Into<String>) -> Self {
        Self {
            id: TemplateId::new(),
            restaurant_id,
            title: title.into(),
            title_secondary: None,
            task_type: super::task::DEFAULT_TASK_TYPE.to_string(),
            priority: Priority::default(),
            required_skills: BTreeSet::new(),
            required_role: Role::default(),
            location: None,
            estimated_minutes: super::task::DEFAULT_ESTIMATED_MINUTES,
            due_offset_minutes: None,
            active: true,
        }
    }

    /// Build a pending task instance for one firing of `schedule_id`.
    pub fn instantiate(
        &self,
        scheduled_for: DateTime<Utc>,
        schedule_id: ScheduleId,
        now: DateTime<Utc>,
    ) -> Task {
        Task {
            id: TaskId::new(),
            restaurant_id: self.restaurant_id,
            title: self.title.clone(),
            title_secondary: self.title_secondary.clone(),
            task_type: self.task_type.clone(),
            priority: self.priority,
            status: TaskStatus::Pending,
            required_skills: self.required_skills.clone(),
            required_role: self.required_role,
            location: self.location.clone(),
            scheduled_for: Some(scheduled_for),
            due_at: self
                .due_offset_minutes
                .map(|m| scheduled_for + Duration::minutes(i64::from(m))),
            assignee_id: None,
            assigned_by: None,
            estimated_minutes: self.estimated_minutes,
            recurrence_id: Some(schedule_id),
            created_at: now,
            updated_at: now,
            completed_at: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Schedule
// ---------------------------------------------------------------------------

/// A template + pattern pair with its firing bookkeeping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecurrenceSchedule {
    pub id: ScheduleId,
    pub template_id: TemplateId,
    pub restaurant_id: RestaurantId,
    pub pattern: RecurrencePattern,
    pub next_run_at: DateTime<Utc>,
    pub end_date: Option<DateTime<Utc>>,
    pub max_runs: Option<u32>,
    pub total_runs: u32,
    pub failed_runs: u32,
    pub is_active: bool,
    pub created_by: StaffId,
    pub last_run_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RecurrenceSchedule {
    /// Why this schedule must not fire again, if it must not.
    pub fn exhausted_reason(&self) -> Option<String> {
        if let Some(max) = self.max_runs {
            if self.total_runs >= max {
                return Some(format!("reached max_runs ({}/{max})", self.total_runs));
            }
        }
        if let Some(end) = self.end_date {
            if self.next_run_at > end {
                return Some(format!("next run {} is past end date {end}", self.next_run_at));
            }
        }
        None
    }

    /// Due at `now`?
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.is_active && self.next_run_at <= now
    }
}

/// Request to create a recurring schedule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewRecurrence {
    pub template_id: TemplateId,
    pub restaurant_id: RestaurantId,
    pub pattern: RecurrencePattern,
    #[serde(default)]
    pub end_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub max_runs: Option<u32>,
    pub created_by: StaffId,
}
