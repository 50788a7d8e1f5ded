//! Planners turn a free-text request into a plan draft

use async_trait::async_trait;
use steward_types::{PlanDraft, WorkerId};
use tracing::debug;

use crate::error::PlannerError;

/// Source of plan drafts.
///
/// `workers` lists what is registered so a planner never proposes steps
/// nobody can fulfil. Drafts are still validated afterwards.
#[async_trait]
pub trait Planner: Send + Sync {
    async fn plan(&self, request: &str, workers: &[WorkerId]) -> Result<PlanDraft, PlannerError>;
}

/// Replays a fixed draft for every request.
///
/// An empty goal is filled in from the request.
#[derive(Clone, Debug)]
pub struct StaticPlanner {
    draft: PlanDraft,
}

impl StaticPlanner {
    pub fn new(draft: PlanDraft) -> Self {
        Self { draft }
    }
}

#[async_trait]
impl Planner for StaticPlanner {
    async fn plan(&self, request: &str, workers: &[WorkerId]) -> Result<PlanDraft, PlannerError> {
        let mut draft = self.draft.clone();
        if draft.goal.trim().is_empty() {
            draft.goal = request.trim().to_string();
        }
        debug!(
            steps = draft.steps.len(),
            available_workers = workers.len(),
            "Static planner replaying draft"
        );
        Ok(draft)
    }
}
