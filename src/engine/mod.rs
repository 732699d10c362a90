//! Assignment, bulk scheduling, and the recurrence sweep.

pub mod assign;
pub mod bulk;
pub mod scheduler;

pub use assign::{AssignOutcome, AssignRequest, AssignmentEngine, AutoAssignOutcome};
pub use bulk::{BulkItemFailure, BulkItemSuccess, BulkOutcome};
pub use scheduler::{RecurrenceScheduler, SweepReport};
