//! Approval requests: the human-in-the-loop contract
//!
//! An [`ApprovalRequest`] is created on the execution side when a worker
//! asks for consent, and decided on the interaction side exactly once.
//! After [`ApprovalRequest::resolve`] succeeds the request is frozen.

use crate::{ApprovalId, PlanId, StepId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Decision recorded on a request
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalDecision {
    Undecided,
    Approved,
    Rejected,
}

impl std::fmt::Display for ApprovalDecision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            ApprovalDecision::Undecided => "undecided",
            ApprovalDecision::Approved => "approved",
            ApprovalDecision::Rejected => "rejected",
        };
        f.write_str(label)
    }
}

/// What a worker proposes when it needs consent
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ApprovalProposal {
    /// Human-readable description of the action
    pub description: String,
    /// Payload the step will complete with if approved unedited
    pub payload: serde_json::Value,
}

impl ApprovalProposal {
    pub fn new(description: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            description: description.into(),
            payload,
        }
    }
}

/// A decision delivered by the interaction side
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ApprovalResolution {
    pub approved: bool,
    /// Replacement payload; only honoured with an approval
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub edited_payload: Option<serde_json::Value>,
    /// Free-text reviewer notes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl ApprovalResolution {
    pub fn approve() -> Self {
        Self {
            approved: true,
            edited_payload: None,
            notes: None,
        }
    }

    pub fn approve_with_edits(payload: serde_json::Value) -> Self {
        Self {
            approved: true,
            edited_payload: Some(payload),
            notes: None,
        }
    }

    pub fn reject() -> Self {
        Self {
            approved: false,
            edited_payload: None,
            notes: None,
        }
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        let notes = notes.into();
        if !notes.trim().is_empty() {
            self.notes = Some(notes);
        }
        self
    }

    pub fn decision(&self) -> ApprovalDecision {
        if self.approved {
            ApprovalDecision::Approved
        } else {
            ApprovalDecision::Rejected
        }
    }
}

/// A pending or decided request for human consent
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ApprovalRequest {
    pub id: ApprovalId,
    pub plan_id: PlanId,
    pub step_id: StepId,
    /// Human-readable description of the action requiring consent
    pub description: String,
    /// Payload as proposed by the worker
    pub proposed_payload: serde_json::Value,
    pub decision: ApprovalDecision,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub edited_payload: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub requested_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decided_at: Option<DateTime<Utc>>,
}

impl ApprovalRequest {
    pub fn new(plan_id: PlanId, step_id: StepId, proposal: ApprovalProposal) -> Self {
        Self {
            id: ApprovalId::generate(),
            plan_id,
            step_id,
            description: proposal.description,
            proposed_payload: proposal.payload,
            decision: ApprovalDecision::Undecided,
            edited_payload: None,
            notes: None,
            requested_at: Utc::now(),
            decided_at: None,
        }
    }

    pub fn is_decided(&self) -> bool {
        self.decision != ApprovalDecision::Undecided
    }

    /// Apply a resolution. Returns `false` and leaves the request untouched
    /// if it was already decided.
    pub fn resolve(&mut self, resolution: ApprovalResolution) -> bool {
        if self.is_decided() {
            return false;
        }
        self.decision = resolution.decision();
        // Edits only make sense on an approval.
        self.edited_payload = if resolution.approved {
            resolution.edited_payload
        } else {
            None
        };
        self.notes = resolution.notes;
        self.decided_at = Some(Utc::now());
        true
    }

    /// Payload the step completes with: the edit if any, else the proposal
    pub fn effective_payload(&self) -> &serde_json::Value {
        self.edited_payload.as_ref().unwrap_or(&self.proposed_payload)
    }
}
