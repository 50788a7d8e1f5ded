//! Notifications from the execution side to the interaction side
//!
//! Every payload is an owned snapshot. Nothing here references live state.

use crate::{ApprovalRequest, ErrorKind, PlanId, PlanStatus, RunId, StepId, StepStatus, TaskPlan};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Envelope wrapping every notification
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationEnvelope {
    /// Unique notification ID
    pub id: Uuid,

    /// Run that produced the notification
    pub run_id: RunId,

    /// Position within the run, starting at 1
    pub sequence: u64,

    /// Publication timestamp
    pub timestamp: chrono::DateTime<chrono::Utc>,

    /// The actual notification
    pub notification: Notification,
}

/// Notification kinds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Notification {
    /// Free-text progress or summary message
    MessageProduced { text: String },

    /// A step is suspended until a human decides
    ApprovalRequested { request: ApprovalRequest },

    /// Snapshot of the whole plan
    PlanUpdated { plan: TaskPlan },

    /// A step moved to a new status
    StatusChanged { step_id: StepId, status: StepStatus },

    /// Something went wrong; `step_id` is absent for run-level errors
    ErrorReported {
        step_id: Option<StepId>,
        kind: ErrorKind,
        message: String,
    },

    /// The run is over and the coordinator accepts a new one
    RunFinished {
        plan_id: Option<PlanId>,
        status: PlanStatus,
    },
}

impl Notification {
    /// Step this notification is about, if any
    pub fn step_id(&self) -> Option<&StepId> {
        match self {
            Notification::ApprovalRequested { request } => Some(&request.step_id),
            Notification::StatusChanged { step_id, .. } => Some(step_id),
            Notification::ErrorReported { step_id, .. } => step_id.as_ref(),
            _ => None,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Notification::ErrorReported { .. })
    }

    /// Short label for logs
    pub fn label(&self) -> &'static str {
        match self {
            Notification::MessageProduced { .. } => "message_produced",
            Notification::ApprovalRequested { .. } => "approval_requested",
            Notification::PlanUpdated { .. } => "plan_updated",
            Notification::StatusChanged { .. } => "status_changed",
            Notification::ErrorReported { .. } => "error_reported",
            Notification::RunFinished { .. } => "run_finished",
        }
    }
}
