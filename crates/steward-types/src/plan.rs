//! Task plans: ordered steps bound to workers
//!
//! A plan is built from a [`PlanDraft`] (what a planner proposes) and then
//! mutated step by step by the orchestrator. Every mutation goes through
//! [`TaskPlan::advance`] or [`TaskPlan::transition`], which enforce the
//! state machines in [`crate::status`].

use crate::{PlanError, PlanId, PlanResult, PlanStatus, StepId, StepStatus, WorkerId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

// ── Drafts ───────────────────────────────────────────────────────────

/// One proposed step, before validation
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StepSpec {
    /// Explicit id; positional (`step-N`) when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<StepId>,
    /// Worker that fulfils the step
    pub worker: WorkerId,
    /// What this step accomplishes
    #[serde(default)]
    pub description: String,
    /// Opaque input handed to the worker
    #[serde(default)]
    pub input: serde_json::Value,
    /// A human must approve the worker's result before completion
    #[serde(default)]
    pub requires_approval: bool,
    /// Steps that must complete first; the preceding step when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub depends_on: Option<Vec<StepId>>,
}

impl StepSpec {
    pub fn new(worker: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: None,
            worker: WorkerId::new(worker),
            description: description.into(),
            input: serde_json::Value::Null,
            requires_approval: false,
            depends_on: None,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(StepId::new(id));
        self
    }

    pub fn with_input(mut self, input: serde_json::Value) -> Self {
        self.input = input;
        self
    }

    pub fn requiring_approval(mut self) -> Self {
        self.requires_approval = true;
        self
    }

    pub fn after<I, S>(mut self, deps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.depends_on = Some(deps.into_iter().map(|d| StepId::new(d)).collect());
        self
    }

    /// No dependencies at all, not even the preceding step
    pub fn independent(mut self) -> Self {
        self.depends_on = Some(Vec::new());
        self
    }
}

/// What a planner proposes for a request
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PlanDraft {
    /// Overall goal of the request
    #[serde(default)]
    pub goal: String,
    /// Ordered steps
    pub steps: Vec<StepSpec>,
}

impl PlanDraft {
    pub fn new(goal: impl Into<String>) -> Self {
        Self {
            goal: goal.into(),
            steps: Vec::new(),
        }
    }

    pub fn with_step(mut self, step: StepSpec) -> Self {
        self.steps.push(step);
        self
    }
}

// ── Steps ────────────────────────────────────────────────────────────

/// A validated step inside a plan
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Step {
    pub id: StepId,
    pub worker: WorkerId,
    pub description: String,
    pub input: serde_json::Value,
    pub requires_approval: bool,
    /// Resolved dependencies, always earlier steps
    pub depends_on: Vec<StepId>,
    pub status: StepStatus,
    /// Set only once the step is `Completed`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    /// Set only once the step is `Failed`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

// ── Task Plan ────────────────────────────────────────────────────────

/// An ordered, validated set of steps for one request
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TaskPlan {
    pub id: PlanId,
    pub goal: String,
    pub steps: Vec<Step>,
    pub status: PlanStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TaskPlan {
    /// Validate a list of step specs into a pending plan.
    ///
    /// Fails when the list is empty, a step id repeats, a step names a
    /// worker for which `is_known_worker` returns false, or a dependency
    /// does not point at an earlier step.
    pub fn create<F>(
        goal: impl Into<String>,
        specs: Vec<StepSpec>,
        is_known_worker: F,
    ) -> PlanResult<Self>
    where
        F: Fn(&WorkerId) -> bool,
    {
        if specs.is_empty() {
            return Err(PlanError::Validation("plan has no steps".into()));
        }

        let mut seen: HashSet<StepId> = HashSet::new();
        let mut steps: Vec<Step> = Vec::with_capacity(specs.len());

        for (index, spec) in specs.into_iter().enumerate() {
            let id = spec.id.unwrap_or_else(|| StepId::positional(index));
            if seen.contains(&id) {
                return Err(PlanError::Validation(format!("duplicate step id '{}'", id)));
            }
            if !is_known_worker(&spec.worker) {
                return Err(PlanError::Validation(format!(
                    "step '{}' references unknown worker '{}'",
                    id, spec.worker
                )));
            }

            let depends_on = match spec.depends_on {
                None => steps.last().map(|prev| vec![prev.id.clone()]).unwrap_or_default(),
                Some(deps) => {
                    for dep in &deps {
                        if !seen.contains(dep) {
                            return Err(PlanError::Validation(format!(
                                "step '{}' depends on '{}', which is not an earlier step",
                                id, dep
                            )));
                        }
                    }
                    deps
                }
            };

            seen.insert(id.clone());
            steps.push(Step {
                id,
                worker: spec.worker,
                description: spec.description,
                input: spec.input,
                requires_approval: spec.requires_approval,
                depends_on,
                status: StepStatus::Pending,
                result: None,
                error: None,
                started_at: None,
                finished_at: None,
            });
        }

        let now = Utc::now();
        Ok(Self {
            id: PlanId::generate(),
            goal: goal.into(),
            steps,
            status: PlanStatus::Pending,
            created_at: now,
            updated_at: now,
        })
    }

    /// Validate a planner draft
    pub fn from_draft<F>(draft: PlanDraft, is_known_worker: F) -> PlanResult<Self>
    where
        F: Fn(&WorkerId) -> bool,
    {
        Self::create(draft.goal, draft.steps, is_known_worker)
    }

    pub fn step(&self, id: &StepId) -> Option<&Step> {
        self.steps.iter().find(|s| &s.id == id)
    }

    fn step_mut(&mut self, id: &StepId) -> PlanResult<&mut Step> {
        self.steps
            .iter_mut()
            .find(|s| &s.id == id)
            .ok_or_else(|| PlanError::StepNotFound(id.clone()))
    }

    /// Move a step to `next`, returning its previous status.
    pub fn advance(&mut self, id: &StepId, next: StepStatus) -> PlanResult<StepStatus> {
        let now = Utc::now();
        let step = self.step_mut(id)?;
        let from = step.status;
        if !from.can_transition_to(next) {
            return Err(PlanError::InvalidTransition {
                step_id: id.clone(),
                from,
                to: next,
            });
        }
        step.status = next;
        if next == StepStatus::Running {
            step.started_at = Some(now);
        }
        if next.is_final() {
            step.finished_at = Some(now);
        }
        self.updated_at = now;
        Ok(from)
    }

    /// Complete a step and store its result
    pub fn complete(&mut self, id: &StepId, result: serde_json::Value) -> PlanResult<()> {
        self.advance(id, StepStatus::Completed)?;
        self.step_mut(id)?.result = Some(result);
        Ok(())
    }

    /// Fail a step and store the error detail
    pub fn fail(&mut self, id: &StepId, detail: impl Into<String>) -> PlanResult<()> {
        self.advance(id, StepStatus::Failed)?;
        self.step_mut(id)?.error = Some(detail.into());
        Ok(())
    }

    /// Move the plan itself to `next`
    pub fn transition(&mut self, next: PlanStatus) -> PlanResult<()> {
        if !self.status.can_transition_to(next) {
            return Err(PlanError::InvalidPlanTransition {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// First pending step, in declaration order, whose dependencies have
    /// all completed.
    pub fn next_eligible(&self) -> Option<&Step> {
        let completed: HashSet<&StepId> = self
            .steps
            .iter()
            .filter(|s| s.status == StepStatus::Completed)
            .map(|s| &s.id)
            .collect();
        self.steps.iter().find(|s| {
            s.status == StepStatus::Pending && s.depends_on.iter().all(|d| completed.contains(d))
        })
    }

    /// Every step is Completed, Failed or Rejected
    pub fn is_terminal(&self) -> bool {
        self.steps.iter().all(|s| s.status.is_final())
    }

    pub fn has_in_flight(&self) -> bool {
        self.steps.iter().any(|s| s.status.is_in_flight())
    }

    /// Nothing can make progress any more
    pub fn is_settled(&self) -> bool {
        !self.has_in_flight() && self.next_eligible().is_none()
    }

    /// Pending steps that can never run because something upstream failed
    /// or was rejected.
    pub fn blocked_steps(&self) -> Vec<&StepId> {
        let mut dead: HashSet<&StepId> = self
            .steps
            .iter()
            .filter(|s| s.status.is_blocking())
            .map(|s| &s.id)
            .collect();
        let mut blocked = Vec::new();
        // Dependencies always point backwards, so one forward pass suffices.
        for step in &self.steps {
            if step.status == StepStatus::Pending
                && step.depends_on.iter().any(|d| dead.contains(d))
            {
                dead.insert(&step.id);
                blocked.push(&step.id);
            }
        }
        blocked
    }

    /// Derive and apply the final status once the plan is settled.
    ///
    /// Completed only if every step completed; otherwise Failed. A plan
    /// that already reached a terminal status keeps it.
    pub fn settle(&mut self) -> PlanResult<PlanStatus> {
        if self.status.is_terminal() {
            return Ok(self.status);
        }
        if !self.is_settled() {
            return Err(PlanError::Validation(
                "plan still has runnable or in-flight steps".into(),
            ));
        }
        let next = if self.steps.iter().all(|s| s.status == StepStatus::Completed) {
            PlanStatus::Completed
        } else {
            PlanStatus::Failed
        };
        if self.status == PlanStatus::Pending {
            self.transition(PlanStatus::Running)?;
        }
        self.transition(next)?;
        Ok(next)
    }

    /// Results of completed steps, keyed by step id
    pub fn results(&self) -> HashMap<StepId, serde_json::Value> {
        self.steps
            .iter()
            .filter_map(|s| s.result.clone().map(|r| (s.id.clone(), r)))
            .collect()
    }

    pub fn count(&self, status: StepStatus) -> usize {
        self.steps.iter().filter(|s| s.status == status).count()
    }
}
