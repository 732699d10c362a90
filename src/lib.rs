//! # rota-rs
//!
//! Task assignment and recurring scheduling for restaurant operations.
//!
//! Ranks staff for a task by skills, shift availability, workload, and
//! location; binds the winner with a conditional write so concurrent callers
//! can never double-assign; and materializes recurring tasks from templates
//! on daily, weekly, monthly, or yearly patterns in the restaurant's local
//! timezone.
//!
//! Durable state lives behind [`store::TaskStore`]: Postgres via sqlx in
//! production, an in-memory store for tests and local runs.

pub mod config;
pub mod db;
pub mod engine;
pub mod error;
pub mod event;
pub mod model;
pub mod recurrence;
pub mod scoring;
pub mod store;
pub mod telemetry;
