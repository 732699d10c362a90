//! Core data model.
//!
//! Tasks are the unit of operational work inside a restaurant. Staff members
//! pick them up, either chosen by a manager or ranked by the scorer. Recurring
//! schedules stamp out new tasks from templates.

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash,
            serde::Serialize, serde::Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub uuid::Uuid);

        impl $name {
            pub fn new() -> Self {
                Self(uuid::Uuid::new_v4())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                // Short display: first 8 chars of UUID
                write!(f, "{}", &self.0.to_string()[..8])
            }
        }

        impl std::str::FromStr for $name {
            type Err = crate::error::Error;

            fn from_str(s: &str) -> crate::error::Result<Self> {
                uuid::Uuid::parse_str(s.trim()).map(Self).map_err(|e| {
                    crate::error::Error::Validation(format!(
                        "invalid {}: {s}: {e}",
                        stringify!($name)
                    ))
                })
            }
        }
    };
}

pub mod assignment;
pub mod recurrence;
pub mod staff;
pub mod task;

pub use assignment::{Assignment, AssignmentId, AssignmentMethod};
pub use recurrence::{
    NewRecurrence, RecurrencePattern, RecurrenceSchedule, RecurrenceType, ScheduleId,
    TaskTemplate, TemplateId,
};
pub use staff::{RestaurantId, Role, Shift, StaffCandidate, StaffId, StaffMember};
pub use task::{NewTask, Priority, Task, TaskDefaults, TaskId, TaskStatus};
