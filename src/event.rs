//! Assignment events handed to the notification dispatcher.
//!
//! The engine produces events; delivery and formatting belong to whoever
//! consumes them. Dispatch is fire-and-forget: a dispatcher that cannot
//! deliver logs the problem and returns.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::model::{AssignmentMethod, RestaurantId, StaffId, TaskId};

/// Emitted after a task is successfully bound to a staff member.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssignmentEvent {
    pub task_id: TaskId,
    pub assignee_id: StaffId,
    pub restaurant_id: RestaurantId,
    pub method: AssignmentMethod,
    pub score: Option<f64>,
    pub assigned_at: DateTime<Utc>,
}

/// Sink for assignment events.
#[async_trait]
pub trait NotificationDispatcher: Send + Sync {
    async fn dispatch(&self, event: AssignmentEvent);
}

/// Forwards events onto an unbounded channel.
pub struct ChannelDispatcher {
    tx: mpsc::UnboundedSender<AssignmentEvent>,
}

impl ChannelDispatcher {
    /// Create a dispatcher and the receiving end of its channel.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<AssignmentEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

#[async_trait]
impl NotificationDispatcher for ChannelDispatcher {
    async fn dispatch(&self, event: AssignmentEvent) {
        let task_id = event.task_id;
        if self.tx.send(event).is_err() {
            warn!(task_id = %task_id, "notification receiver dropped, event discarded");
        }
    }
}

/// Logs each event. Used when no delivery channel is wired up.
#[derive(Debug, Default)]
pub struct TracingDispatcher;

#[async_trait]
impl NotificationDispatcher for TracingDispatcher {
    async fn dispatch(&self, event: AssignmentEvent) {
        info!(
            task_id = %event.task_id,
            assignee_id = %event.assignee_id,
            method = %event.method,
            score = ?event.score,
            "task assigned"
        );
    }
}
