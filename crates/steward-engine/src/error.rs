//! Engine error types

use steward_gate::GateError;
use steward_types::{ErrorKind, PlanError, WorkerId};
use thiserror::Error;

/// Worker registry errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("Worker already registered: {0}")]
    DuplicateWorker(WorkerId),

    #[error("Unknown worker: {0}")]
    UnknownWorker(WorkerId),
}

impl RegistryError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            RegistryError::DuplicateWorker(_) => ErrorKind::DuplicateWorker,
            RegistryError::UnknownWorker(_) => ErrorKind::UnknownWorker,
        }
    }
}

/// Planner errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlannerError {
    #[error("Planner produced no plan: {0}")]
    NoPlan(String),

    #[error("Planner backend error: {0}")]
    Backend(String),
}

/// Run recorder errors. Always swallowed by the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecorderError {
    #[error("No open record for step {0}")]
    UnknownRecord(String),

    #[error("Recorder storage error: {0}")]
    Storage(String),
}

/// Errors that abort a submit or a whole run
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error(transparent)]
    Plan(#[from] PlanError),

    #[error(transparent)]
    Planner(#[from] PlannerError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Gate(#[from] GateError),

    #[error("No plan has been submitted")]
    NoActivePlan,
}

impl OrchestratorError {
    /// Category used on `ErrorReported` notifications.
    ///
    /// A broken step state machine or a gate collision inside the engine
    /// is a bug, not a user error, so both report as internal.
    pub fn kind(&self) -> ErrorKind {
        match self {
            OrchestratorError::Plan(PlanError::Validation(_)) => ErrorKind::Validation,
            OrchestratorError::Plan(_) => ErrorKind::Internal,
            OrchestratorError::Planner(_) => ErrorKind::Planning,
            OrchestratorError::Registry(e) => e.kind(),
            OrchestratorError::Gate(_) => ErrorKind::Internal,
            OrchestratorError::NoActivePlan => ErrorKind::Internal,
        }
    }
}

/// Result type for orchestrator operations
pub type OrchestratorResult<T> = Result<T, OrchestratorError>;

/// Result type for recorder operations
pub type RecorderResult<T> = Result<T, RecorderError>;
