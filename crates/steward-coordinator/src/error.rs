use steward_gate::GateError;
use steward_types::{ErrorKind, RunId};
use thiserror::Error;

/// Errors returned to the interaction side
#[derive(Debug, Error)]
pub enum CoordinatorError {
    #[error("Run {0} is still active")]
    RunAlreadyActive(RunId),

    #[error(transparent)]
    Gate(#[from] GateError),

    #[error("Failed to spawn run thread: {0}")]
    Spawn(String),

    #[error("Run thread panicked")]
    RunPanicked,
}

impl CoordinatorError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CoordinatorError::RunAlreadyActive(_) => ErrorKind::RunAlreadyActive,
            CoordinatorError::Gate(e) => e.kind(),
            CoordinatorError::Spawn(_) | CoordinatorError::RunPanicked => ErrorKind::Internal,
        }
    }
}

pub type CoordinatorResult<T> = Result<T, CoordinatorError>;
