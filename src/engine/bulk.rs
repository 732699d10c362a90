//! Bulk task scheduling with per-item results.
//!
//! Items are processed one at a time and independently: a bad item is
//! reported and skipped, never rolled back into its neighbours. Cancellation
//! is honoured between items only, so no task is ever half-created.

use chrono::Utc;
use opentelemetry::KeyValue;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, info, warn};

use super::assign::AssignmentEngine;
use crate::error::{Error, Result};
use crate::model::{NewTask, StaffId, Task, TaskDefaults};
use crate::telemetry::metrics;
use crate::telemetry::spans::start_bulk_span;

/// Reason recorded for items never started because the call was cancelled.
pub const CANCELLED_REASON: &str = "cancelled before processing";

#[derive(Debug, Clone, Serialize)]
pub struct BulkItemSuccess {
    /// 0-based position in the request.
    pub index: usize,
    pub task: Task,
}

#[derive(Debug, Clone, Serialize)]
pub struct BulkItemFailure {
    /// 0-based position in the request.
    pub index: usize,
    pub title: Option<String>,
    pub error: String,
}

/// Outcome of a bulk request. Partial success is success.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BulkOutcome {
    pub successful: Vec<BulkItemSuccess>,
    pub failed: Vec<BulkItemFailure>,
    pub total_requested: usize,
    pub successful_count: usize,
    pub failed_count: usize,
    pub cancelled: bool,
}

impl BulkOutcome {
    fn succeed(&mut self, index: usize, task: Task) {
        self.successful.push(BulkItemSuccess { index, task });
        self.successful_count += 1;
    }

    fn fail(&mut self, index: usize, title: Option<String>, error: String) {
        self.failed.push(BulkItemFailure {
            index,
            title,
            error,
        });
        self.failed_count += 1;
    }
}

impl AssignmentEngine {
    /// Create many tasks, merging `defaults` into each item first.
    ///
    /// # Errors
    ///
    /// Only whole-request problems are errors: an empty list, or more items
    /// than the configured cap. Per-item problems land in
    /// [`BulkOutcome::failed`].
    pub async fn bulk_schedule(
        &self,
        items: Vec<NewTask>,
        defaults: Option<TaskDefaults>,
        actor: StaffId,
        cancel: &CancellationToken,
    ) -> Result<BulkOutcome> {
        let max_items = self.settings().bulk.max_items;
        if items.is_empty() {
            return Err(Error::Validation("bulk request has no items".to_string()));
        }
        if items.len() > max_items {
            return Err(Error::Validation(format!(
                "bulk request has {} items, limit is {max_items}",
                items.len()
            )));
        }

        let span = start_bulk_span(items.len());
        async {
            let started = Utc::now();
            let mut outcome = BulkOutcome {
                total_requested: items.len(),
                ..BulkOutcome::default()
            };

            for (index, item) in items.into_iter().enumerate() {
                let item = match defaults {
                    Some(ref d) => item.with_defaults(d),
                    None => item,
                };
                let title = item.title.clone();

                if cancel.is_cancelled() {
                    outcome.cancelled = true;
                    outcome.fail(index, title, CANCELLED_REASON.to_string());
                    metrics::bulk_items().add(1, &[KeyValue::new("result", "cancelled")]);
                    continue;
                }

                match self.create_task(item, actor).await {
                    Ok(task) => {
                        outcome.succeed(index, task);
                        metrics::bulk_items().add(1, &[KeyValue::new("result", "ok")]);
                    }
                    Err(e) => {
                        warn!(index, error = %e, "bulk item rejected");
                        outcome.fail(index, title, e.to_string());
                        metrics::bulk_items().add(1, &[KeyValue::new("result", "error")]);
                    }
                }
            }

            let elapsed_ms = (Utc::now() - started).num_milliseconds().max(0) as f64;
            metrics::operation_duration_ms()
                .record(elapsed_ms, &[KeyValue::new("operation", "task.bulk_schedule")]);
            info!(
                requested = outcome.total_requested,
                succeeded = outcome.successful_count,
                failed = outcome.failed_count,
                cancelled = outcome.cancelled,
                "bulk schedule finished"
            );
            Ok(outcome)
        }
        .instrument(span)
        .await
    }
}
