//! Run records: the lifecycle shape handed to run recorders

use crate::{ApprovalDecision, PlanId, StepId, WorkerId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle of one step within one plan, as seen by a recorder
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    pub plan_id: PlanId,
    pub step_id: StepId,
    pub worker: WorkerId,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Present only for steps that went through an approval gate
    #[serde(skip_serializing_if = "Option::is_none")]
    pub approval: Option<ApprovalOutcome>,
}

impl RunRecord {
    pub fn started(plan_id: PlanId, step_id: StepId, worker: WorkerId, at: DateTime<Utc>) -> Self {
        Self {
            plan_id,
            step_id,
            worker,
            started_at: at,
            completed_at: None,
            failed_at: None,
            error: None,
            approval: None,
        }
    }

    pub fn is_open(&self) -> bool {
        self.completed_at.is_none() && self.failed_at.is_none()
    }
}

/// The decided half of an approval, as persisted
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ApprovalOutcome {
    pub decision: ApprovalDecision,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub decided_at: DateTime<Utc>,
}
