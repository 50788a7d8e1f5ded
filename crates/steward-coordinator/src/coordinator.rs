use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::JoinHandle;

use parking_lot::Mutex;
use steward_engine::{
    NoTools, NoopRunRecorder, NotificationBus, NotificationHub, Orchestrator, Planner,
    RunRecorder, Subscription, ToolInvoker, WorkerRegistry,
};
use steward_gate::{GateBoard, GateError};
use steward_types::{
    ApprovalRequest, ApprovalResolution, ErrorKind, PlanId, PlanStatus, RunId, StepId,
};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, info_span, warn};

use crate::config::CoordinatorConfig;
use crate::error::{CoordinatorError, CoordinatorResult};

/// Control-side view of the run that is executing right now
struct ActiveRun {
    run_id: RunId,
    gates: Arc<GateBoard>,
    cancel: CancellationToken,
}

type ActiveSlot = Arc<Mutex<Option<ActiveRun>>>;

/// Bridge between the interaction side and run execution
pub struct Coordinator {
    registry: Arc<WorkerRegistry>,
    planner: Arc<dyn Planner>,
    recorder: Arc<dyn RunRecorder>,
    tools: Arc<dyn ToolInvoker>,
    hub: Arc<NotificationHub>,
    config: CoordinatorConfig,
    active: ActiveSlot,
    last_thread: Mutex<Option<JoinHandle<()>>>,
}

impl Coordinator {
    pub fn new(
        registry: Arc<WorkerRegistry>,
        planner: Arc<dyn Planner>,
        config: CoordinatorConfig,
    ) -> Self {
        Self {
            registry,
            planner,
            recorder: Arc::new(NoopRunRecorder),
            tools: Arc::new(NoTools),
            hub: Arc::new(NotificationHub::new()),
            config,
            active: Arc::new(Mutex::new(None)),
            last_thread: Mutex::new(None),
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

    pub fn registry(&self) -> &Arc<WorkerRegistry> {
        &self.registry
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    /// Subscribe to notifications from every run started afterwards
    pub fn subscribe(&self) -> Subscription {
        self.hub.subscribe()
    }

    pub fn is_active(&self) -> bool {
        self.active.lock().is_some()
    }

    pub fn active_run(&self) -> Option<RunId> {
        self.active.lock().as_ref().map(|run| run.run_id.clone())
    }

    /// Approvals of the active run still waiting for a decision
    pub fn pending_approvals(&self) -> Vec<ApprovalRequest> {
        self.active
            .lock()
            .as_ref()
            .map(|run| run.gates.pending())
            .unwrap_or_default()
    }

    /// Launch a run for `request` on a dedicated thread.
    ///
    /// Returns as soon as the thread is spawned. Fails with
    /// [`CoordinatorError::RunAlreadyActive`] while another run is active;
    /// that run is not affected.
    pub fn start(&self, request: impl Into<String>) -> CoordinatorResult<RunId> {
        let request = request.into();
        let mut active = self.active.lock();
        if let Some(run) = active.as_ref() {
            warn!(active_run = %run.run_id, "Rejected start while a run is active");
            return Err(CoordinatorError::RunAlreadyActive(run.run_id.clone()));
        }

        let run_id = RunId::generate();
        let gates = Arc::new(GateBoard::new());
        let cancel = CancellationToken::new();
        let bus = NotificationBus::new(self.hub.clone(), run_id.clone());
        let orchestrator = Orchestrator::new(self.registry.clone(), self.planner.clone(), bus)
            .with_recorder(self.recorder.clone())
            .with_tools(self.tools.clone())
            .with_gates(gates.clone())
            .with_cancellation(cancel.clone())
            .with_settings(self.config.execution.clone());

        // The run thread clears the slot itself, so the slot must be filled
        // before the thread can observe it.
        *active = Some(ActiveRun {
            run_id: run_id.clone(),
            gates,
            cancel,
        });

        let slot = self.active.clone();
        let thread_run_id = run_id.clone();
        let spawned = std::thread::Builder::new()
            .name(self.config.thread_name.clone())
            .spawn(move || run_to_completion(orchestrator, request, slot, thread_run_id));

        match spawned {
            Ok(handle) => {
                info!(run_id = %run_id, "Run started");
                drop(active);
                *self.last_thread.lock() = Some(handle);
                Ok(run_id)
            }
            Err(err) => {
                *active = None;
                error!(error = %err, "Failed to spawn run thread");
                Err(CoordinatorError::Spawn(err.to_string()))
            }
        }
    }

    /// Deliver a human decision for `step_id` in the active run.
    pub fn resolve_approval(
        &self,
        step_id: &StepId,
        resolution: ApprovalResolution,
    ) -> CoordinatorResult<ApprovalRequest> {
        let gates = self
            .active
            .lock()
            .as_ref()
            .map(|run| run.gates.clone())
            .ok_or_else(|| GateError::NoSuchPendingApproval(step_id.clone()))?;
        Ok(gates.resolve(step_id, resolution)?)
    }

    /// Cooperatively cancel the active run. Returns whether there was one.
    ///
    /// Open gates release at once; an in-flight worker finishes and its
    /// outcome is recorded before the run stops.
    pub fn cancel(&self) -> bool {
        let active = self.active.lock();
        match active.as_ref() {
            Some(run) => {
                info!(run_id = %run.run_id, "Cancelling run");
                run.cancel.cancel();
                run.gates.cancel_all();
                true
            }
            None => false,
        }
    }

    /// Block until the most recently started run thread exits.
    pub fn join(&self) -> CoordinatorResult<()> {
        let handle = self.last_thread.lock().take();
        match handle {
            Some(handle) => handle.join().map_err(|_| CoordinatorError::RunPanicked),
            None => Ok(()),
        }
    }

    /// Cancel the active run, if any, and wait for its thread.
    pub fn shutdown(&self) -> CoordinatorResult<()> {
        self.cancel();
        self.join()
    }
}

/// Body of a run thread
fn run_to_completion(
    mut orchestrator: Orchestrator,
    request: String,
    slot: ActiveSlot,
    run_id: RunId,
) {
    let span = info_span!("run", run_id = %run_id);
    let _guard = span.enter();
    let bus = orchestrator.bus().clone();

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(err) => {
            error!(error = %err, "Failed to build run runtime");
            bus.error(None, ErrorKind::Internal, format!("failed to start run: {err}"));
            finish_run(&slot, &run_id, &bus, None, PlanStatus::Failed);
            return;
        }
    };

    // Worker panics already fail their own step. Anything else unwinding
    // out of the run still has to reach `finish_run`.
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        runtime.block_on(orchestrator.execute(&request))
    }));
    let status = match outcome {
        Ok(Ok(status)) => status,
        Ok(Err(err)) => {
            error!(error = %err, kind = %err.kind(), "Run aborted");
            bus.error(None, err.kind(), err.to_string());
            orchestrator.abort().unwrap_or(PlanStatus::Failed)
        }
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            error!(panic = %message, "Run panicked");
            bus.error(None, ErrorKind::Internal, format!("run panicked: {message}"));
            orchestrator.abort().unwrap_or(PlanStatus::Failed)
        }
    };
    let plan_id = orchestrator.plan().map(|plan| plan.id.clone());

    info!(status = %status, "Run finished");
    finish_run(&slot, &run_id, &bus, plan_id.as_ref(), status);
}

/// Publish `RunFinished` and clear the active slot if it still belongs to
/// `run_id`.
///
/// The slot lock is held across the publish, so a `start` waiting on it
/// cannot emit anything before this run's final notification.
fn finish_run(
    slot: &ActiveSlot,
    run_id: &RunId,
    bus: &NotificationBus,
    plan_id: Option<&PlanId>,
    status: PlanStatus,
) {
    let mut active = slot.lock();
    let owned = active.as_ref().map(|run| &run.run_id) == Some(run_id);
    if let Some(run) = active.as_ref().filter(|_| owned) {
        run.gates.cancel_all();
    }
    bus.finished(plan_id, status);
    if owned {
        *active = None;
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}
