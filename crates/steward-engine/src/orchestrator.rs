//! Orchestrator: drives one task plan to a terminal status
//!
//! The orchestrator is owned by the execution thread. It is the only code
//! that mutates the live [`TaskPlan`]; everything it tells the outside world
//! goes through the [`NotificationBus`] as an owned snapshot.
//!
//! Per step, notifications follow the transition order:
//!
//! ```text
//! StatusChanged(Running)
//!   [StatusChanged(AwaitingApproval) → ApprovalRequested → StatusChanged(Approved)]
//! StatusChanged(Completed | Rejected | Failed)
//! ```

use std::sync::Arc;

use chrono::Utc;
use steward_gate::{GateBoard, GateOutcome};
use steward_types::{
    ApprovalDecision, ApprovalProposal, ApprovalRequest, ErrorKind, Notification, PlanId,
    PlanStatus, Step, StepId, StepStatus, TaskPlan, WorkerId,
};
use tokio::task::JoinError;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn, Instrument};

use crate::error::{OrchestratorError, OrchestratorResult, RecorderResult};
use crate::events::NotificationBus;
use crate::planner::Planner;
use crate::recorder::{NoopRunRecorder, RunRecorder};
use crate::registry::WorkerRegistry;
use crate::settings::ExecutionSettings;
use crate::tools::{NoTools, ToolInvoker};
use crate::worker::{WorkerContext, WorkerOutcome};

/// Detail recorded on a step whose gate was released by cancellation
pub const CANCELLED_AWAITING_APPROVAL: &str = "cancelled while awaiting approval";

/// Detail recorded on a step whose worker asked for approval after the run
/// was cancelled
pub const CANCELLED: &str = "cancelled";

/// What a single call to [`Orchestrator::step`] did
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StepReport {
    /// One step ran to a final status
    Finished { step_id: StepId, status: StepStatus },
    /// No step is eligible to run
    Idle,
    /// Cancellation was observed before any step started
    Cancelled,
}

/// Drives one task plan.
pub struct Orchestrator {
    registry: Arc<WorkerRegistry>,
    planner: Arc<dyn Planner>,
    recorder: Arc<dyn RunRecorder>,
    tools: Arc<dyn ToolInvoker>,
    gates: Arc<GateBoard>,
    bus: NotificationBus,
    cancel: CancellationToken,
    settings: ExecutionSettings,
    plan: Option<TaskPlan>,
}

impl Orchestrator {
    pub fn new(
        registry: Arc<WorkerRegistry>,
        planner: Arc<dyn Planner>,
        bus: NotificationBus,
    ) -> Self {
        Self {
            registry,
            planner,
            recorder: Arc::new(NoopRunRecorder),
            tools: Arc::new(NoTools),
            gates: Arc::new(GateBoard::new()),
            bus,
            cancel: CancellationToken::new(),
            settings: ExecutionSettings::default(),
            plan: None,
        }
    }

    pub fn with_recorder(mut self, recorder: Arc<dyn RunRecorder>) -> Self {
        self.recorder = recorder;
        self
    }

    pub fn with_tools(mut self, tools: Arc<dyn ToolInvoker>) -> Self {
        self.tools = tools;
        self
    }

    /// Share a gate board with whoever delivers decisions
    pub fn with_gates(mut self, gates: Arc<GateBoard>) -> Self {
        self.gates = gates;
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_settings(mut self, settings: ExecutionSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn plan(&self) -> Option<&TaskPlan> {
        self.plan.as_ref()
    }

    pub fn gates(&self) -> &Arc<GateBoard> {
        &self.gates
    }

    pub fn cancellation(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn bus(&self) -> &NotificationBus {
        &self.bus
    }

    /// Echo the request, then plan it and run the plan to the end.
    pub async fn execute(&mut self, request: &str) -> OrchestratorResult<PlanStatus> {
        self.bus
            .message(format!("Working on: {}", self.settings.summarize(request)));
        self.submit(request).await?;
        self.run().await
    }

    /// Ask the planner for a draft and validate it into a running plan.
    #[instrument(skip_all, fields(run_id = %self.bus.run_id()))]
    pub async fn submit(&mut self, request: &str) -> OrchestratorResult<TaskPlan> {
        let workers = self.registry.ids();
        let draft = self.planner.plan(request, &workers).await?;

        let registry = &self.registry;
        let mut plan = TaskPlan::from_draft(draft, |w| registry.contains(w))?;
        plan.transition(PlanStatus::Running)?;

        info!(
            plan_id = %plan.id,
            steps = plan.steps.len(),
            goal = %plan.goal,
            "Plan accepted"
        );
        self.bus.plan(&plan);
        self.plan = Some(plan.clone());
        Ok(plan)
    }

    /// Run the next eligible step to a final status.
    ///
    /// Suspends on an approval gate when the worker asks for one. Returns
    /// [`StepReport::Idle`] when nothing is eligible.
    #[instrument(skip_all, fields(run_id = %self.bus.run_id()))]
    pub async fn step(&mut self) -> OrchestratorResult<StepReport> {
        if self.cancel.is_cancelled() {
            return Ok(StepReport::Cancelled);
        }
        let step_id = {
            let plan = self.plan.as_ref().ok_or(OrchestratorError::NoActivePlan)?;
            match plan.next_eligible() {
                Some(step) => step.id.clone(),
                None => return Ok(StepReport::Idle),
            }
        };

        self.advance(&step_id, StepStatus::Running)?;
        let step = self.snapshot_step(&step_id)?;
        let plan_id = self.plan_id()?;
        log_recorder_failure(
            self.recorder
                .on_step_started(&plan_id, &step_id, &step.worker, Utc::now())
                .await,
            &step_id,
        );

        let worker = match self.registry.get(&step.worker) {
            Ok(worker) => worker,
            Err(err) => {
                let status = self.fail_step(&step_id, Some(err.kind()), err.to_string()).await?;
                return Ok(StepReport::Finished { step_id, status });
            }
        };

        self.bus
            .message(format!("Delegating to {}: {}", step.worker, step.description));
        info!(step_id = %step_id, worker = %step.worker, "Invoking worker");

        let ctx = self.context(&step)?;
        let invocation = {
            let step = step.clone();
            tokio::spawn(async move { worker.invoke(&step, &ctx).await }.in_current_span())
        };
        let outcome = match invocation.await {
            Ok(outcome) => outcome,
            Err(err) => {
                let detail = panic_detail(&step.worker, err);
                error!(step_id = %step_id, detail = %detail, "Worker invocation aborted");
                WorkerOutcome::Error(detail)
            }
        };

        let status = match outcome {
            WorkerOutcome::Error(detail) => {
                self.fail_step(&step_id, Some(ErrorKind::Worker), detail).await?
            }
            WorkerOutcome::Result(payload) if !step.requires_approval => {
                self.complete_step(&step_id, payload).await?
            }
            WorkerOutcome::Result(payload) => {
                let proposal = ApprovalProposal::new(step.description.clone(), payload);
                self.await_approval(&step, proposal).await?
            }
            WorkerOutcome::NeedsApproval(proposal) => self.await_approval(&step, proposal).await?,
        };
        Ok(StepReport::Finished { step_id, status })
    }

    /// Step until nothing is eligible or cancellation is observed, then
    /// settle the plan.
    #[instrument(skip_all, fields(run_id = %self.bus.run_id()))]
    pub async fn run(&mut self) -> OrchestratorResult<PlanStatus> {
        loop {
            match self.step().await? {
                StepReport::Finished { .. } => continue,
                StepReport::Idle | StepReport::Cancelled => break,
            }
        }
        self.finish()
    }

    /// Give up on the current plan after a fatal error.
    ///
    /// Releases open gates and marks an unfinished plan Failed. Returns the
    /// plan's final status, if there is a plan.
    pub fn abort(&mut self) -> Option<PlanStatus> {
        self.gates.cancel_all();
        let plan = self.plan.as_mut()?;
        if !plan.status.is_terminal() {
            if plan.status == PlanStatus::Pending {
                let _ = plan.transition(PlanStatus::Running);
            }
            if plan.transition(PlanStatus::Failed).is_ok() {
                warn!(plan_id = %plan.id, "Plan aborted");
            }
        }
        self.bus.plan(plan);
        Some(plan.status)
    }

    fn finish(&mut self) -> OrchestratorResult<PlanStatus> {
        let cancelled = self.cancel.is_cancelled();
        let plan = self.plan.as_mut().ok_or(OrchestratorError::NoActivePlan)?;

        let status = if cancelled && !plan.status.is_terminal() {
            plan.transition(PlanStatus::Cancelled)?;
            PlanStatus::Cancelled
        } else {
            plan.settle()?
        };
        self.gates.cancel_all();

        let not_run = plan.count(StepStatus::Pending);
        let summary = format!(
            "Plan {}: {} completed, {} failed, {} rejected, {} not run",
            status,
            plan.count(StepStatus::Completed),
            plan.count(StepStatus::Failed),
            plan.count(StepStatus::Rejected),
            not_run,
        );
        info!(
            plan_id = %plan.id,
            status = %status,
            blocked = plan.blocked_steps().len(),
            not_run,
            "Plan finished"
        );
        self.bus.plan(plan);
        self.bus.message(summary);
        Ok(status)
    }

    async fn await_approval(
        &mut self,
        step: &Step,
        proposal: ApprovalProposal,
    ) -> OrchestratorResult<StepStatus> {
        if self.cancel.is_cancelled() {
            // Nobody is left to decide.
            return self.fail_step(&step.id, None, CANCELLED).await;
        }

        self.advance(&step.id, StepStatus::AwaitingApproval)?;
        let request = ApprovalRequest::new(self.plan_id()?, step.id.clone(), proposal);
        let handle = self.gates.open(request.clone(), self.cancel.clone())?;

        info!(
            step_id = %step.id,
            approval_id = %request.id,
            "Awaiting approval"
        );
        self.bus.publish(Notification::ApprovalRequested { request });
        self.publish_plan()?;

        match handle.wait().await {
            GateOutcome::Resolved(decided) => {
                log_recorder_failure(self.recorder.on_approval_resolved(&decided).await, &step.id);
                match decided.decision {
                    ApprovalDecision::Approved => {
                        self.advance(&step.id, StepStatus::Approved)?;
                        self.complete_step(&step.id, decided.effective_payload().clone())
                            .await
                    }
                    ApprovalDecision::Rejected | ApprovalDecision::Undecided => {
                        self.reject_step(&step.id, decided.notes.as_deref()).await
                    }
                }
            }
            GateOutcome::Cancelled => {
                self.fail_step(&step.id, None, CANCELLED_AWAITING_APPROVAL)
                    .await
            }
        }
    }

    async fn complete_step(
        &mut self,
        step_id: &StepId,
        payload: serde_json::Value,
    ) -> OrchestratorResult<StepStatus> {
        let plan = self.plan.as_mut().ok_or(OrchestratorError::NoActivePlan)?;
        plan.complete(step_id, payload)?;
        let plan_id = plan.id.clone();

        self.bus.status(step_id, StepStatus::Completed);
        info!(step_id = %step_id, "Step completed");
        log_recorder_failure(
            self.recorder
                .on_step_completed(&plan_id, step_id, Utc::now())
                .await,
            step_id,
        );
        self.publish_plan()?;
        Ok(StepStatus::Completed)
    }

    async fn reject_step(
        &mut self,
        step_id: &StepId,
        notes: Option<&str>,
    ) -> OrchestratorResult<StepStatus> {
        self.advance(step_id, StepStatus::Rejected)?;
        let plan_id = self.plan_id()?;

        info!(step_id = %step_id, "Step rejected by reviewer");
        log_recorder_failure(
            self.recorder
                .on_step_failed(&plan_id, step_id, "rejected by reviewer", Utc::now())
                .await,
            step_id,
        );
        match notes {
            Some(notes) => self.bus.message(format!("Step {step_id} rejected: {notes}")),
            None => self.bus.message(format!("Step {step_id} rejected")),
        };
        self.publish_plan()?;
        Ok(StepStatus::Rejected)
    }

    /// Fail a step. `kind` is reported as an error; `None` means the
    /// failure came from cancellation, which is not an error.
    async fn fail_step(
        &mut self,
        step_id: &StepId,
        kind: Option<ErrorKind>,
        detail: impl Into<String>,
    ) -> OrchestratorResult<StepStatus> {
        let detail = detail.into();
        let plan = self.plan.as_mut().ok_or(OrchestratorError::NoActivePlan)?;
        plan.fail(step_id, detail.clone())?;
        let plan_id = plan.id.clone();

        self.bus.status(step_id, StepStatus::Failed);
        if let Some(kind) = kind {
            warn!(step_id = %step_id, kind = %kind, detail = %detail, "Step failed");
            self.bus.error(Some(step_id), kind, detail.clone());
        } else {
            info!(step_id = %step_id, detail = %detail, "Step abandoned");
        }
        log_recorder_failure(
            self.recorder
                .on_step_failed(&plan_id, step_id, &detail, Utc::now())
                .await,
            step_id,
        );
        self.publish_plan()?;
        Ok(StepStatus::Failed)
    }

    fn advance(&mut self, step_id: &StepId, next: StepStatus) -> OrchestratorResult<()> {
        let plan = self.plan.as_mut().ok_or(OrchestratorError::NoActivePlan)?;
        plan.advance(step_id, next)?;
        self.bus.status(step_id, next);
        Ok(())
    }

    fn publish_plan(&self) -> OrchestratorResult<()> {
        let plan = self.plan.as_ref().ok_or(OrchestratorError::NoActivePlan)?;
        self.bus.plan(plan);
        Ok(())
    }

    fn plan_id(&self) -> OrchestratorResult<PlanId> {
        self.plan
            .as_ref()
            .map(|p| p.id.clone())
            .ok_or(OrchestratorError::NoActivePlan)
    }

    fn snapshot_step(&self, step_id: &StepId) -> OrchestratorResult<Step> {
        let plan = self.plan.as_ref().ok_or(OrchestratorError::NoActivePlan)?;
        plan.step(step_id)
            .cloned()
            .ok_or_else(|| steward_types::PlanError::StepNotFound(step_id.clone()).into())
    }

    fn context(&self, step: &Step) -> OrchestratorResult<WorkerContext> {
        let plan = self.plan.as_ref().ok_or(OrchestratorError::NoActivePlan)?;
        Ok(WorkerContext {
            plan_id: plan.id.clone(),
            goal: plan.goal.clone(),
            results: plan.results(),
            workspace: self.settings.workspace.clone(),
            model: self.settings.model.clone(),
            progress: self.bus.progress(step.worker.as_str()),
            tools: self.tools.clone(),
            cancel: self.cancel.clone(),
        })
    }
}

fn log_recorder_failure(result: RecorderResult<()>, step_id: &StepId) {
    if let Err(err) = result {
        warn!(step_id = %step_id, error = %err, "Run recorder failed; continuing");
    }
}

/// Step detail for a worker task that panicked or was torn down
fn panic_detail(worker: &WorkerId, err: JoinError) -> String {
    if !err.is_panic() {
        return format!("worker {worker} was aborted");
    }
    let payload = err.into_panic();
    let message = payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned());
    match message {
        Some(message) => format!("worker {worker} panicked: {message}"),
        None => format!("worker {worker} panicked"),
    }
}
