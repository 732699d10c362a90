//! Recurrence scheduler: turns due schedules into tasks.
//!
//! Each sweep handles every due schedule independently. A firing first
//! advances `next_run_at` with a compare-and-swap against the instant being
//! fired, and only the winner materializes the task, so a re-delivered
//! trigger for an already-advanced schedule does nothing. The claim also
//! counts the run against `max_runs`.
//!
//! A failed materialization (missing or inactive template) still leaves the
//! schedule advanced: the failure is counted in `failed_runs` and logged, and
//! the schedule tries again at its next occurrence. A due row the store
//! cannot decode is counted as failed and deactivated.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use opentelemetry::KeyValue;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info, warn};

use crate::config::SchedulerSettings;
use crate::error::{Error, Result};
use crate::model::*;
use crate::recurrence::next_run;
use crate::store::{TaskStore, UnreadableSchedule};
use crate::telemetry::metrics;
use crate::telemetry::spans::start_sweep_span;

/// Counts from one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    /// Due schedules examined.
    pub processed: usize,
    /// Tasks materialized.
    pub created: usize,
    /// Firings that could not materialize a task.
    pub failed: usize,
    /// Schedules switched off because they were exhausted or unworkable.
    pub deactivated: usize,
    /// Schedules whose claim was lost to another sweep or to `max_runs`.
    pub skipped: usize,
    /// The sweep stopped early on shutdown.
    pub cancelled: bool,
}

enum Firing {
    Created(TaskId),
    Failed,
    Deactivated,
    Skipped,
}

/// Periodically fires due recurrence schedules.
#[derive(Clone)]
pub struct RecurrenceScheduler {
    store: Arc<dyn TaskStore>,
    poll_interval: Duration,
    shutdown: CancellationToken,
}

impl RecurrenceScheduler {
    pub fn new(store: Arc<dyn TaskStore>, settings: &SchedulerSettings) -> Self {
        Self {
            store,
            poll_interval: settings.poll_interval(),
            shutdown: CancellationToken::new(),
        }
    }

    /// Signal the scheduler to stop after the schedule it is working on.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    // -----------------------------------------------------------------------
    // Schedule management
    // -----------------------------------------------------------------------

    /// Validate and store a new schedule. The first run is the first
    /// occurrence after `now`.
    pub async fn create_recurrence(
        &self,
        new: NewRecurrence,
        now: DateTime<Utc>,
    ) -> Result<RecurrenceSchedule> {
        new.pattern.validate()?;

        if new.max_runs == Some(0) {
            return Err(Error::Validation("max_runs must be at least 1".to_string()));
        }
        if let Some(end) = new.end_date {
            if end <= now {
                return Err(Error::Validation(format!("end date {end} is in the past")));
            }
        }

        let template = self.store.get_template(new.template_id).await?;
        if template.restaurant_id != new.restaurant_id {
            return Err(Error::Validation(format!(
                "template {} does not belong to restaurant {}",
                template.id, new.restaurant_id
            )));
        }
        if !template.active {
            return Err(Error::Validation(format!(
                "template {} is inactive",
                template.id
            )));
        }

        let next_run_at = next_run(&new.pattern, now)?;
        if let Some(end) = new.end_date {
            if next_run_at > end {
                return Err(Error::Validation(format!(
                    "first occurrence {next_run_at} is after end date {end}"
                )));
            }
        }

        let schedule = RecurrenceSchedule {
            id: ScheduleId::new(),
            template_id: new.template_id,
            restaurant_id: new.restaurant_id,
            pattern: new.pattern,
            next_run_at,
            end_date: new.end_date,
            max_runs: new.max_runs,
            total_runs: 0,
            failed_runs: 0,
            is_active: true,
            created_by: new.created_by,
            last_run_at: None,
            created_at: now,
            updated_at: now,
        };
        self.store.insert_schedule(&schedule).await?;

        info!(
            schedule_id = %schedule.id,
            template_id = %schedule.template_id,
            kind = %schedule.pattern.kind,
            next_run_at = %schedule.next_run_at,
            "recurrence created"
        );
        Ok(schedule)
    }

    /// Soft-disable a schedule. Its past task instances keep their link.
    pub async fn disable_schedule(&self, id: ScheduleId) -> Result<()> {
        self.store.deactivate_schedule(id).await?;
        info!(schedule_id = %id, "recurrence disabled");
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Sweep
    // -----------------------------------------------------------------------

    /// Fire every schedule due at `now`, one at a time.
    ///
    /// Per-schedule errors, including rows that cannot be decoded, are logged
    /// and counted as failures; only failing to list due schedules aborts the
    /// sweep.
    pub async fn fire_due_schedules(&self, now: DateTime<Utc>) -> Result<SweepReport> {
        let span = start_sweep_span(now);
        async {
            let due = self.store.due_schedules(now).await?;
            let mut report = SweepReport::default();

            for unreadable in due.unreadable {
                if self.shutdown.is_cancelled() {
                    report.cancelled = true;
                    break;
                }
                report.processed += 1;
                report.failed += 1;
                self.retire_unreadable(unreadable).await;
            }

            for schedule in due.schedules {
                if self.shutdown.is_cancelled() {
                    report.cancelled = true;
                    break;
                }
                report.processed += 1;

                let id = schedule.id;
                match self.fire(schedule, now).await {
                    Ok(Firing::Created(task_id)) => {
                        debug!(schedule_id = %id, task_id = %task_id, "schedule fired");
                        report.created += 1;
                    }
                    Ok(Firing::Failed) => report.failed += 1,
                    Ok(Firing::Deactivated) => report.deactivated += 1,
                    Ok(Firing::Skipped) => report.skipped += 1,
                    Err(e) => {
                        error!(schedule_id = %id, error = %e, "schedule firing errored");
                        report.failed += 1;
                    }
                }
            }

            tracing::Span::current().record("sweep.processed", report.processed);
            if report.processed > 0 {
                info!(
                    processed = report.processed,
                    created = report.created,
                    failed = report.failed,
                    deactivated = report.deactivated,
                    skipped = report.skipped,
                    "sweep finished"
                );
            }
            Ok(report)
        }
        .instrument(span)
        .await
    }

    async fn fire(&self, schedule: RecurrenceSchedule, now: DateTime<Utc>) -> Result<Firing> {
        if let Some(reason) = schedule.exhausted_reason() {
            self.store.deactivate_schedule(schedule.id).await?;
            info!(schedule_id = %schedule.id, reason = %reason, "recurrence exhausted, deactivated");
            metrics::schedule_runs().add(1, &[KeyValue::new("result", "exhausted")]);
            return Ok(Firing::Deactivated);
        }

        let fired_at = schedule.next_run_at;
        let next = match next_run(&schedule.pattern, fired_at) {
            Ok(next) => next,
            Err(e) => {
                // Nothing was claimed, so there is no run to settle.
                error!(schedule_id = %schedule.id, error = %e, "cannot compute next run, deactivating");
                self.store.deactivate_schedule(schedule.id).await?;
                metrics::schedule_runs().add(1, &[KeyValue::new("result", "failed")]);
                return Ok(Firing::Deactivated);
            }
        };

        if !self
            .store
            .claim_schedule_run(schedule.id, fired_at, next)
            .await?
        {
            debug!(schedule_id = %schedule.id, "claim lost, schedule advanced elsewhere or out of runs");
            return Ok(Firing::Skipped);
        }

        match self.materialize(&schedule, fired_at, now).await {
            Ok(task) => {
                // The task exists and the run is already counted by the claim.
                if let Err(e) = self.store.record_schedule_run(schedule.id, true, now).await {
                    error!(
                        schedule_id = %schedule.id,
                        task_id = %task.id,
                        error = %e,
                        "task created but last run time not recorded"
                    );
                }
                metrics::schedule_runs().add(1, &[KeyValue::new("result", "created")]);
                Ok(Firing::Created(task.id))
            }
            Err(e) => {
                warn!(
                    schedule_id = %schedule.id,
                    template_id = %schedule.template_id,
                    error = %e,
                    next_run_at = %next,
                    "materialization failed, skipping to next occurrence"
                );
                self.store
                    .record_schedule_run(schedule.id, false, now)
                    .await?;
                metrics::schedule_runs().add(1, &[KeyValue::new("result", "failed")]);
                Ok(Firing::Failed)
            }
        }
    }

    async fn retire_unreadable(&self, unreadable: UnreadableSchedule) {
        error!(
            schedule_id = %unreadable.id,
            reason = %unreadable.reason,
            "unreadable schedule, deactivating"
        );
        metrics::schedule_runs().add(1, &[KeyValue::new("result", "failed")]);
        if let Err(e) = self.store.deactivate_schedule(unreadable.id).await {
            error!(schedule_id = %unreadable.id, error = %e, "could not deactivate unreadable schedule");
        }
    }

    async fn materialize(
        &self,
        schedule: &RecurrenceSchedule,
        fired_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<Task> {
        let template = self.store.get_template(schedule.template_id).await?;
        if !template.active {
            return Err(Error::Validation(format!(
                "template {} is inactive",
                template.id
            )));
        }
        if template.restaurant_id != schedule.restaurant_id {
            return Err(Error::Validation(format!(
                "template {} moved to another restaurant",
                template.id
            )));
        }
        let task = template.instantiate(fired_at, schedule.id, now);
        self.store.insert_task(&task, None).await
    }

    // -----------------------------------------------------------------------
    // Loop
    // -----------------------------------------------------------------------

    /// Sweep every poll interval until [`shutdown`](Self::shutdown).
    pub async fn run(&self) -> Result<()> {
        info!(
            poll_interval_secs = self.poll_interval.as_secs(),
            "recurrence scheduler started"
        );

        loop {
            if let Err(e) = self.fire_due_schedules(Utc::now()).await {
                error!("sweep error: {e}");
            }

            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    info!("recurrence scheduler shutting down");
                    return Ok(());
                }
                _ = tokio::time::sleep(self.poll_interval) => {}
            }
        }
    }
}
