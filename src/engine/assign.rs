//! Assignment engine: binds tasks to staff, manually or by score.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use opentelemetry::KeyValue;
use serde::Serialize;
use tracing::{Instrument, debug, info, warn};

use crate::config::Settings;
use crate::config::settings::MAX_BATCH;
use crate::error::{Error, Result};
use crate::event::{AssignmentEvent, NotificationDispatcher};
use crate::model::*;
use crate::scoring::{Confidence, RankedCandidate, TaskRequirements, rank_candidates};
use crate::store::TaskStore;
use crate::telemetry::metrics;
use crate::telemetry::spans::{record_state_transition, start_assignment_span};

/// A manager's request to bind a specific staff member.
#[derive(Debug, Clone)]
pub struct AssignRequest {
    pub task_id: TaskId,
    pub staff_id: StaffId,
    pub note: Option<String>,
    pub actor: StaffId,
}

/// Result of a successful binding.
#[derive(Debug, Clone, Serialize)]
pub struct AssignOutcome {
    pub task: Task,
    pub assignment: Assignment,
}

/// Result of automatic assignment. An empty pool is a result, not an error.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum AutoAssignOutcome {
    Assigned {
        task: Task,
        assignment: Assignment,
        assigned_staff_id: StaffId,
        score: f64,
        confidence: Confidence,
        ranked: Vec<RankedCandidate>,
    },
    NoCandidatesFound {
        task_id: TaskId,
        ranked: Vec<RankedCandidate>,
    },
}

impl AutoAssignOutcome {
    /// The full ranked list, whatever the outcome.
    pub fn ranked(&self) -> &[RankedCandidate] {
        match self {
            AutoAssignOutcome::Assigned { ranked, .. }
            | AutoAssignOutcome::NoCandidatesFound { ranked, .. } => ranked,
        }
    }

    pub fn is_assigned(&self) -> bool {
        matches!(self, AutoAssignOutcome::Assigned { .. })
    }
}

/// Validate a state transition, returning an error if disallowed.
fn validate_transition(from: TaskStatus, to: TaskStatus) -> Result<()> {
    if from.can_transition_to(to) {
        Ok(())
    } else {
        Err(Error::InvalidTransition {
            from: from.to_string(),
            to: to.to_string(),
        })
    }
}

/// Binds tasks to staff and drives their status afterwards.
///
/// Holds no task state of its own: every decision reads the store, and every
/// change goes back through the store's conditional writes.
#[derive(Clone)]
pub struct AssignmentEngine {
    store: Arc<dyn TaskStore>,
    dispatcher: Arc<dyn NotificationDispatcher>,
    settings: Settings,
}

impl AssignmentEngine {
    pub fn new(
        store: Arc<dyn TaskStore>,
        dispatcher: Arc<dyn NotificationDispatcher>,
        settings: Settings,
    ) -> Self {
        Self {
            store,
            dispatcher,
            settings,
        }
    }

    pub fn store(&self) -> &Arc<dyn TaskStore> {
        &self.store
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    // -----------------------------------------------------------------------
    // Manual
    // -----------------------------------------------------------------------

    /// Bind `req.staff_id` to `req.task_id`.
    ///
    /// # Errors
    ///
    /// - [`Error::NotFound`] if the task does not exist.
    /// - [`Error::InvalidTransition`] if the task is completed or failed.
    /// - [`Error::Conflict`] if the task already has an assignee, including
    ///   when a concurrent assignment wins the race.
    /// - [`Error::Validation`] if the staff member is unknown, inactive, or
    ///   belongs to another restaurant.
    pub async fn assign_task(&self, req: AssignRequest) -> Result<AssignOutcome> {
        let span = start_assignment_span(req.task_id, "manual");
        async {
            let task = self.store.get_task(req.task_id).await?;
            ensure_assignable(&task)?;
            self.check_staff(&task, req.staff_id).await?;

            let assignment =
                Assignment::manual(task.id, req.staff_id, req.actor, req.note, Utc::now());
            let task = self.bind(&task, &assignment).await?;
            Ok(AssignOutcome { task, assignment })
        }
        .instrument(span)
        .await
    }

    // -----------------------------------------------------------------------
    // Automatic
    // -----------------------------------------------------------------------

    /// Rank the restaurant's staff for a task and bind the best candidate.
    ///
    /// `max_candidates` caps the ranked list returned for audit (1..=50).
    pub async fn auto_assign_task(
        &self,
        task_id: TaskId,
        max_candidates: usize,
        actor: StaffId,
    ) -> Result<AutoAssignOutcome> {
        let span = start_assignment_span(task_id, "automatic");
        let started = Instant::now();

        let outcome: Result<AutoAssignOutcome> = async {
            validate_max_candidates(max_candidates)?;
            let task = self.store.get_task(task_id).await?;
            ensure_assignable(&task)?;

            let ranked = self.rank(&task, max_candidates).await?;
            let Some(top) = ranked.first() else {
                info!(task_id = %task_id, "no eligible candidates");
                metrics::no_candidates().add(1, &[]);
                return Ok(AutoAssignOutcome::NoCandidatesFound { task_id, ranked });
            };

            let (staff_id, score, confidence) = (top.staff_id, top.score, top.confidence);
            tracing::Span::current().record("task.score", score);

            let assignment = Assignment::automatic(task.id, staff_id, actor, score, Utc::now());
            let task = self.bind(&task, &assignment).await?;

            Ok(AutoAssignOutcome::Assigned {
                task,
                assignment,
                assigned_staff_id: staff_id,
                score,
                confidence,
                ranked,
            })
        }
        .instrument(span)
        .await;

        metrics::operation_duration_ms().record(
            started.elapsed().as_secs_f64() * 1000.0,
            &[KeyValue::new("operation", "task.auto_assign")],
        );
        outcome
    }

    /// Rank candidates for a task without binding anyone.
    pub async fn rank_candidates(
        &self,
        task_id: TaskId,
        max_candidates: usize,
    ) -> Result<Vec<RankedCandidate>> {
        validate_max_candidates(max_candidates)?;
        let task = self.store.get_task(task_id).await?;
        self.rank(&task, max_candidates).await
    }

    async fn rank(&self, task: &Task, max_candidates: usize) -> Result<Vec<RankedCandidate>> {
        let req = TaskRequirements::from(task);
        let pool = self
            .store
            .candidate_pool(task.restaurant_id, req.target)
            .await?;
        let ranked = rank_candidates(&req, &pool, &self.settings.scoring, max_candidates);

        debug!(
            task_id = %task.id,
            pool = pool.len(),
            ranked = ranked.len(),
            "candidates scored"
        );
        metrics::candidates_ranked().record(ranked.len() as u64, &[]);
        Ok(ranked)
    }

    // -----------------------------------------------------------------------
    // Creation
    // -----------------------------------------------------------------------

    /// Create one task. A request naming an assignee creates the task
    /// already bound, after the same staff checks as manual assignment.
    pub async fn create_task(&self, new: NewTask, actor: StaffId) -> Result<Task> {
        let now = Utc::now();
        let mut task = new.into_task(now)?;

        let Some(staff_id) = task.assignee_id else {
            return self.store.insert_task(&task, None).await;
        };

        self.check_staff(&task, staff_id).await?;
        task.assigned_by = Some(actor);
        let assignment = Assignment::manual(
            task.id,
            staff_id,
            actor,
            Some("assigned at creation".to_string()),
            now,
        );
        let task = self.store.insert_task(&task, Some(&assignment)).await?;

        metrics::tasks_assigned().add(1, &[KeyValue::new("method", "creation")]);
        self.notify(&task, &assignment).await;
        Ok(task)
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// Assigned → in progress.
    pub async fn start_task(&self, task_id: TaskId) -> Result<Task> {
        self.transition(task_id, TaskStatus::Assigned, TaskStatus::InProgress)
            .await
    }

    /// In progress → completed.
    pub async fn complete_task(&self, task_id: TaskId) -> Result<Task> {
        self.transition(task_id, TaskStatus::InProgress, TaskStatus::Completed)
            .await
    }

    /// In progress → failed.
    pub async fn fail_task(&self, task_id: TaskId, reason: &str) -> Result<Task> {
        let task = self
            .transition(task_id, TaskStatus::InProgress, TaskStatus::Failed)
            .await?;
        warn!(task_id = %task_id, reason, "task failed");
        Ok(task)
    }

    pub async fn assignment_history(&self, task_id: TaskId) -> Result<Vec<Assignment>> {
        self.store.assignment_history(task_id).await
    }

    async fn transition(&self, task_id: TaskId, from: TaskStatus, to: TaskStatus) -> Result<Task> {
        validate_transition(from, to)?;
        let task = self
            .store
            .transition_task(task_id, from, to, Utc::now())
            .await?;

        metrics::task_state_transitions().add(
            1,
            &[
                KeyValue::new("from", from.as_str()),
                KeyValue::new("to", to.as_str()),
            ],
        );
        info!(task_id = %task_id, %from, %to, "task transitioned");
        Ok(task)
    }

    // -----------------------------------------------------------------------
    // Shared
    // -----------------------------------------------------------------------

    /// Staff must exist, be active, and work at the task's restaurant.
    async fn check_staff(&self, task: &Task, staff_id: StaffId) -> Result<StaffMember> {
        let member = match self.store.get_staff(staff_id).await {
            Ok(m) => m,
            Err(Error::NotFound(_)) => {
                return Err(Error::Validation(format!(
                    "staff member {staff_id} does not exist"
                )));
            }
            Err(e) => return Err(e),
        };
        if !member.active {
            return Err(Error::Validation(format!(
                "staff member {staff_id} is inactive"
            )));
        }
        if member.restaurant_id != task.restaurant_id {
            return Err(Error::Validation(format!(
                "staff member {staff_id} does not belong to restaurant {}",
                task.restaurant_id
            )));
        }
        Ok(member)
    }

    /// Conditional write, then metrics and notification.
    async fn bind(&self, task: &Task, assignment: &Assignment) -> Result<Task> {
        let method = assignment.method.as_str();
        let bound = match self.store.bind_assignee(assignment).await {
            Ok(t) => t,
            Err(e) => {
                if e.is_conflict() {
                    warn!(task_id = %task.id, "lost assignment race");
                    metrics::assignment_conflicts().add(1, &[KeyValue::new("method", method)]);
                }
                return Err(e);
            }
        };

        let span = tracing::Span::current();
        span.record("task.assignee", tracing::field::display(assignment.staff_id));
        record_state_transition(&span, "pending", "assigned");
        metrics::tasks_assigned().add(1, &[KeyValue::new("method", method)]);
        metrics::task_state_transitions().add(
            1,
            &[KeyValue::new("from", "pending"), KeyValue::new("to", "assigned")],
        );
        info!(
            task_id = %bound.id,
            staff_id = %assignment.staff_id,
            method,
            "task assigned"
        );

        self.notify(&bound, assignment).await;
        Ok(bound)
    }

    async fn notify(&self, task: &Task, assignment: &Assignment) {
        self.dispatcher
            .dispatch(AssignmentEvent {
                task_id: task.id,
                assignee_id: assignment.staff_id,
                restaurant_id: task.restaurant_id,
                method: assignment.method,
                score: assignment.score,
                assigned_at: assignment.assigned_at,
            })
            .await;
    }
}

/// Pre-check before any binding attempt; the store re-checks atomically.
fn ensure_assignable(task: &Task) -> Result<()> {
    if task.status.is_terminal() {
        return Err(Error::InvalidTransition {
            from: task.status.to_string(),
            to: TaskStatus::Assigned.to_string(),
        });
    }
    if task.assignee_id.is_some() || task.status != TaskStatus::Pending {
        return Err(Error::Conflict(format!("task {} is already assigned", task.id)));
    }
    Ok(())
}

fn validate_max_candidates(max_candidates: usize) -> Result<()> {
    if (1..=MAX_BATCH).contains(&max_candidates) {
        Ok(())
    } else {
        Err(Error::Validation(format!(
            "max_candidates must be between 1 and {MAX_BATCH}, got {max_candidates}"
        )))
    }
}
