//! Span helpers for assignment and scheduling work.

use chrono::{DateTime, Utc};
use tracing::Span;

use crate::model::TaskId;

/// Start a span covering one assignment attempt.
///
/// `task.assignee` and `task.score` are declared empty and filled in once
/// a candidate is bound.
pub fn start_assignment_span(task_id: TaskId, method: &str) -> Span {
    tracing::info_span!(
        "task.assign",
        "task.id" = %task_id.0,
        "task.method" = method,
        "task.assignee" = tracing::field::Empty,
        "task.score" = tracing::field::Empty,
    )
}

/// Start a span covering one scheduler sweep.
pub fn start_sweep_span(now: DateTime<Utc>) -> Span {
    tracing::info_span!(
        "schedule.sweep",
        "sweep.now" = %now,
        "sweep.processed" = tracing::field::Empty,
    )
}

/// Start a span covering one bulk scheduling request.
pub fn start_bulk_span(items: usize) -> Span {
    tracing::info_span!("task.bulk_schedule", "bulk.items" = items)
}

/// Record a state transition event on the given span.
pub fn record_state_transition(span: &Span, from: &str, to: &str) {
    span.in_scope(|| {
        tracing::info!(from = from, to = to, "state_transition");
    });
}
