//! Staff roster and the per-request candidate view built from it.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

uuid_id!(
    /// Newtype for staff member IDs.
    StaffId
);

uuid_id!(
    /// Newtype for restaurant (tenant) IDs.
    RestaurantId
);

/// Role in the restaurant hierarchy. Ordered from least to most senior.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    #[default]
    Staff,
    Supervisor,
    Manager,
    Owner,
}

impl Role {
    /// Does this role satisfy a task requiring `required`?
    pub fn satisfies(self, required: Role) -> bool {
        self >= required
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Role::Staff => "staff",
            Role::Supervisor => "supervisor",
            Role::Manager => "manager",
            Role::Owner => "owner",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Role {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "staff" => Ok(Role::Staff),
            "supervisor" => Ok(Role::Supervisor),
            "manager" => Ok(Role::Manager),
            "owner" => Ok(Role::Owner),
            other => Err(Error::Validation(format!("unknown role: {other}"))),
        }
    }
}

/// A rostered working window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Shift {
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
}

impl Shift {
    pub fn new(starts_at: DateTime<Utc>, ends_at: DateTime<Utc>) -> Self {
        Self { starts_at, ends_at }
    }

    /// Half-open containment: `[starts_at, ends_at)`.
    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.starts_at <= at && at < self.ends_at
    }

    /// Does the shift overlap the UTC calendar day of `at`?
    pub fn touches_day_of(&self, at: DateTime<Utc>) -> bool {
        let day = at.date_naive();
        self.starts_at.date_naive() <= day && day <= self.ends_at.date_naive()
    }
}

/// A member of a restaurant's staff roster.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StaffMember {
    pub id: StaffId,
    pub restaurant_id: RestaurantId,
    pub name: String,
    pub role: Role,
    pub skills: BTreeSet<String>,
    /// Home zone or station (e.g., "kitchen/line-2").
    pub location: Option<String>,
    /// Inactive staff are never assigned.
    pub active: bool,
    pub shifts: Vec<Shift>,
}

impl StaffMember {
    pub fn new(restaurant_id: RestaurantId, name: impl Into<String>, role: Role) -> Self {
        Self {
            id: StaffId::new(),
            restaurant_id,
            name: name.into(),
            role,
            skills: BTreeSet::new(),
            location: None,
            active: true,
            shifts: Vec::new(),
        }
    }

    pub fn with_skills<I, S>(mut self, skills: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.skills = skills.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    pub fn with_shift(mut self, shift: Shift) -> Self {
        self.shifts.push(shift);
        self
    }

    pub fn inactive(mut self) -> Self {
        self.active = false;
        self
    }

    /// Build the scoring view, given a live count of open tasks and the
    /// instant the task targets (if any).
    pub fn to_candidate(&self, workload: u32, target: Option<DateTime<Utc>>) -> StaffCandidate {
        let availability = match target {
            Some(at) => self
                .shifts
                .iter()
                .filter(|s| s.touches_day_of(at))
                .copied()
                .collect(),
            None => self.shifts.clone(),
        };

        StaffCandidate {
            staff_id: self.id,
            restaurant_id: self.restaurant_id,
            name: self.name.clone(),
            role: self.role,
            active: self.active,
            skills: self.skills.clone(),
            workload,
            availability,
            location: self.location.clone(),
        }
    }
}

/// Derived view of a staff member for one scoring request.
///
/// Built fresh from current store state each time; never cached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StaffCandidate {
    pub staff_id: StaffId,
    pub restaurant_id: RestaurantId,
    pub name: String,
    pub role: Role,
    pub active: bool,
    pub skills: BTreeSet<String>,
    /// Count of assigned + in-progress tasks.
    pub workload: u32,
    /// Shifts relevant to the task's target date.
    pub availability: Vec<Shift>,
    pub location: Option<String>,
}
