//! Metric instrument factories for rota-rs.
//!
//! Uses the OTel Meter API with the globally-registered `MeterProvider`.
//! All instruments are created lazily from the `"rota-rs"` meter.

use opentelemetry::metrics::{Counter, Histogram, Meter};

/// Returns the shared meter for rota-rs instruments.
fn meter() -> Meter {
    opentelemetry::global::meter("rota-rs")
}

/// Counter: tasks bound to an assignee.
/// Labels: `method` ("manual" | "automatic" | "creation").
pub fn tasks_assigned() -> Counter<u64> {
    meter()
        .u64_counter("rota.task.assigned")
        .with_description("Number of tasks bound to an assignee")
        .build()
}

/// Counter: assignment attempts that lost the conditional write.
/// Labels: `method`.
pub fn assignment_conflicts() -> Counter<u64> {
    meter()
        .u64_counter("rota.task.assignment_conflicts")
        .with_description("Assignment attempts that found the task already bound")
        .build()
}

/// Counter: automatic assignments that found no eligible candidate.
pub fn no_candidates() -> Counter<u64> {
    meter()
        .u64_counter("rota.task.no_candidates")
        .with_description("Automatic assignments with an empty eligible pool")
        .build()
}

/// Counter: task status transitions.
/// Labels: `from`, `to`.
pub fn task_state_transitions() -> Counter<u64> {
    meter()
        .u64_counter("rota.task.state_transitions")
        .with_description("Number of task status transitions")
        .build()
}

/// Histogram: size of the ranked candidate list per scoring request.
pub fn candidates_ranked() -> Histogram<u64> {
    meter()
        .u64_histogram("rota.scoring.candidates")
        .with_description("Ranked candidates per scoring request")
        .build()
}

/// Counter: schedule firings.
/// Labels: `result` ("created" | "failed" | "exhausted").
pub fn schedule_runs() -> Counter<u64> {
    meter()
        .u64_counter("rota.schedule.runs")
        .with_description("Recurring schedule firings by result")
        .build()
}

/// Counter: bulk scheduling items.
/// Labels: `result` ("ok" | "error" | "cancelled").
pub fn bulk_items() -> Counter<u64> {
    meter()
        .u64_counter("rota.bulk.items")
        .with_description("Bulk scheduling items by result")
        .build()
}

/// Histogram: operation duration in milliseconds.
/// Labels: `operation`.
pub fn operation_duration_ms() -> Histogram<f64> {
    meter()
        .f64_histogram("rota.operation.duration_ms")
        .with_description("Operation duration in milliseconds")
        .with_unit("ms")
        .build()
}
