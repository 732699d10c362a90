//! Append-only assignment history.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::staff::StaffId;
use super::task::TaskId;
use crate::error::{Error, Result};

uuid_id!(
    /// Newtype for assignment history record IDs.
    AssignmentId
);

/// How the assignee was chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssignmentMethod {
    Manual,
    Automatic,
}

impl AssignmentMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            AssignmentMethod::Manual => "manual",
            AssignmentMethod::Automatic => "automatic",
        }
    }
}

impl std::fmt::Display for AssignmentMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for AssignmentMethod {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "manual" => Ok(AssignmentMethod::Manual),
            "automatic" => Ok(AssignmentMethod::Automatic),
            other => Err(Error::Validation(format!(
                "unknown assignment method: {other}"
            ))),
        }
    }
}

/// One binding of a task to a staff member. Never mutated once written;
/// a reassignment appends a new record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assignment {
    pub id: AssignmentId,
    pub task_id: TaskId,
    pub staff_id: StaffId,
    pub assigned_by: StaffId,
    pub assigned_at: DateTime<Utc>,
    pub method: AssignmentMethod,
    /// Candidate score, for automatic assignments.
    pub score: Option<f64>,
    pub note: Option<String>,
}

impl Assignment {
    pub fn manual(
        task_id: TaskId,
        staff_id: StaffId,
        assigned_by: StaffId,
        note: Option<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: AssignmentId::new(),
            task_id,
            staff_id,
            assigned_by,
            assigned_at: now,
            method: AssignmentMethod::Manual,
            score: None,
            note,
        }
    }

    pub fn automatic(
        task_id: TaskId,
        staff_id: StaffId,
        assigned_by: StaffId,
        score: f64,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: AssignmentId::new(),
            task_id,
            staff_id,
            assigned_by,
            assigned_at: now,
            method: AssignmentMethod::Automatic,
            score: Some(score),
            note: None,
        }
    }
}
