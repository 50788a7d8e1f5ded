//! Error types for the plan model

use crate::{PlanStatus, StepId, StepStatus};
use serde::{Deserialize, Serialize};

/// Errors raised while building or mutating a task plan
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PlanError {
    #[error("Plan validation error: {0}")]
    Validation(String),

    #[error("Invalid transition for step {step_id}: {from} -> {to}")]
    InvalidTransition {
        step_id: StepId,
        from: StepStatus,
        to: StepStatus,
    },

    #[error("Invalid plan transition: {from} -> {to}")]
    InvalidPlanTransition { from: PlanStatus, to: PlanStatus },

    #[error("Step not found: {0}")]
    StepNotFound(StepId),
}

impl PlanError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PlanError::Validation(_) => ErrorKind::Validation,
            PlanError::StepNotFound(_) => ErrorKind::Internal,
            PlanError::InvalidTransition { .. } | PlanError::InvalidPlanTransition { .. } => {
                ErrorKind::InvalidTransition
            }
        }
    }
}

/// Result type alias for plan operations
pub type PlanResult<T> = Result<T, PlanError>;

/// Coarse error category carried on `ErrorReported` notifications so the
/// interaction side can render an error without re-deriving state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Malformed plan or request
    Validation,
    /// A step named a worker nobody registered
    UnknownWorker,
    /// A worker registered twice
    DuplicateWorker,
    /// The worker itself reported an error
    Worker,
    /// State machine invariant violated
    InvalidTransition,
    /// Approval already decided or cancelled
    AlreadyResolved,
    /// A gate was already open for the step
    GateAlreadyOpen,
    /// No gate exists for the step
    NoSuchPendingApproval,
    /// A run is already active
    RunAlreadyActive,
    /// The planner could not produce a plan
    Planning,
    Internal,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            ErrorKind::Validation => "validation",
            ErrorKind::UnknownWorker => "unknown_worker",
            ErrorKind::DuplicateWorker => "duplicate_worker",
            ErrorKind::Worker => "worker",
            ErrorKind::InvalidTransition => "invalid_transition",
            ErrorKind::AlreadyResolved => "already_resolved",
            ErrorKind::GateAlreadyOpen => "gate_already_open",
            ErrorKind::NoSuchPendingApproval => "no_such_pending_approval",
            ErrorKind::RunAlreadyActive => "run_already_active",
            ErrorKind::Planning => "planning",
            ErrorKind::Internal => "internal",
        };
        f.write_str(label)
    }
}
