//! The worker capability interface

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use steward_types::{ApprovalProposal, PlanId, Step, StepId, WorkerId};
use tokio_util::sync::CancellationToken;

use crate::events::ProgressSink;
use crate::tools::ToolInvoker;

/// Everything a worker can report back for one invocation
#[derive(Clone, Debug, PartialEq)]
pub enum WorkerOutcome {
    /// The step is done; the payload becomes its result
    Result(serde_json::Value),
    /// The worker proposes an action a human must approve first
    NeedsApproval(ApprovalProposal),
    /// The worker could not complete the step
    Error(String),
}

impl WorkerOutcome {
    pub fn error(detail: impl Into<String>) -> Self {
        WorkerOutcome::Error(detail.into())
    }

    pub fn needs_approval(description: impl Into<String>, payload: serde_json::Value) -> Self {
        WorkerOutcome::NeedsApproval(ApprovalProposal::new(description, payload))
    }
}

/// A named capability that fulfils steps.
///
/// Workers see a read-only step and context. They must not assume they run
/// on any particular thread.
#[async_trait]
pub trait Worker: Send + Sync {
    /// Name steps use to reference this worker
    fn id(&self) -> WorkerId;

    /// One-line description shown to planners
    fn description(&self) -> String {
        String::new()
    }

    async fn invoke(&self, step: &Step, ctx: &WorkerContext) -> WorkerOutcome;
}

/// Shared, read-only context handed to every invocation
#[derive(Clone)]
pub struct WorkerContext {
    pub plan_id: PlanId,
    pub goal: String,
    /// Results of the steps completed so far
    pub results: HashMap<StepId, serde_json::Value>,
    pub workspace: PathBuf,
    pub model: String,
    pub progress: ProgressSink,
    pub tools: Arc<dyn ToolInvoker>,
    /// Fires when the run is cancelled. Observing it is optional.
    pub cancel: CancellationToken,
}

impl WorkerContext {
    pub fn result_of(&self, step_id: &StepId) -> Option<&serde_json::Value> {
        self.results.get(step_id)
    }

    /// Results of the step's dependencies, in dependency order
    pub fn dependency_results<'a>(
        &'a self,
        step: &'a Step,
    ) -> Vec<(&'a StepId, &'a serde_json::Value)> {
        step.depends_on
            .iter()
            .filter_map(|id| self.results.get(id).map(|v| (id, v)))
            .collect()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

impl std::fmt::Debug for WorkerContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerContext")
            .field("plan_id", &self.plan_id)
            .field("goal", &self.goal)
            .field("results", &self.results.len())
            .field("workspace", &self.workspace)
            .field("model", &self.model)
            .finish()
    }
}
