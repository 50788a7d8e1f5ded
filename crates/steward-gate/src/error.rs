use steward_types::{ErrorKind, StepId};
use thiserror::Error;

/// Protocol-misuse errors reported back to the interaction side.
///
/// None of these affect the run that owns the gate.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GateError {
    #[error("approval for step {0} was already resolved or cancelled")]
    AlreadyResolved(StepId),

    #[error("an approval gate is already open for step {0}")]
    GateAlreadyOpen(StepId),

    #[error("no pending approval for step {0}")]
    NoSuchPendingApproval(StepId),
}

impl GateError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            GateError::AlreadyResolved(_) => ErrorKind::AlreadyResolved,
            GateError::GateAlreadyOpen(_) => ErrorKind::GateAlreadyOpen,
            GateError::NoSuchPendingApproval(_) => ErrorKind::NoSuchPendingApproval,
        }
    }

    pub fn step_id(&self) -> &StepId {
        match self {
            GateError::AlreadyResolved(id)
            | GateError::GateAlreadyOpen(id)
            | GateError::NoSuchPendingApproval(id) => id,
        }
    }
}

pub type GateResult<T> = Result<T, GateError>;
