//! End-to-end runs through the coordinator: a run thread, real gates and
//! a console-like observer on the test side.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use steward_coordinator::{Coordinator, CoordinatorConfig, CoordinatorError};
use steward_engine::{
    GatedWorker, InMemoryRunRecorder, PanickingWorker, Planner, PlannerError, StaticPlanner,
    StaticWorker, Subscription, WorkerRegistry,
};
use steward_types::{
    ApprovalDecision, ApprovalRequest, ApprovalResolution, ErrorKind, Notification,
    NotificationEnvelope, PlanDraft, PlanStatus, RunId, StepId, StepSpec, StepStatus, TaskPlan,
    WorkerId,
};
use tokio::time::timeout;

const WAIT: Duration = Duration::from_secs(5);

/// Collects everything a subscription delivers while waiting on it
struct Observer {
    sub: Subscription,
    seen: Vec<NotificationEnvelope>,
}

impl Observer {
    fn new(coordinator: &Coordinator) -> Self {
        Self {
            sub: coordinator.subscribe(),
            seen: Vec::new(),
        }
    }

    async fn wait_for<F>(&mut self, pred: F) -> Notification
    where
        F: Fn(&Notification) -> bool,
    {
        loop {
            let envelope = timeout(WAIT, self.sub.recv())
                .await
                .expect("timed out waiting for notification")
                .expect("hub closed");
            let matched = pred(&envelope.notification);
            let notification = envelope.notification.clone();
            self.seen.push(envelope);
            if matched {
                return notification;
            }
        }
    }

    async fn approval_request(&mut self) -> ApprovalRequest {
        match self
            .wait_for(|n| matches!(n, Notification::ApprovalRequested { .. }))
            .await
        {
            Notification::ApprovalRequested { request } => request,
            _ => unreachable!(),
        }
    }

    async fn finished(&mut self) -> PlanStatus {
        match self
            .wait_for(|n| matches!(n, Notification::RunFinished { .. }))
            .await
        {
            Notification::RunFinished { status, .. } => status,
            _ => unreachable!(),
        }
    }

    fn last_plan(&self) -> TaskPlan {
        self.seen
            .iter()
            .rev()
            .find_map(|e| match &e.notification {
                Notification::PlanUpdated { plan } => Some(plan.clone()),
                _ => None,
            })
            .expect("no plan snapshot seen")
    }

    /// Status changes and approval requests for one step, in delivery order
    fn trail(&self, step: &str) -> Vec<String> {
        self.seen
            .iter()
            .filter(|e| e.notification.step_id().map(|s| s.as_str()) == Some(step))
            .filter_map(|e| match &e.notification {
                Notification::StatusChanged { status, .. } => Some(status.to_string()),
                Notification::ApprovalRequested { .. } => Some("approval_requested".into()),
                _ => None,
            })
            .collect()
    }
}

fn abc_draft() -> PlanDraft {
    PlanDraft::new("Prepare the IRB submission")
        .with_step(StepSpec::new("auto", "Estimate study budget").with_id("a"))
        .with_step(
            StepSpec::new("gated", "Email consent form to the IRB")
                .with_id("b")
                .with_input(json!({"to": ["irb@example.org"], "subject": "Consent form"})),
        )
        .with_step(StepSpec::new("auto", "Archive submission").with_id("c").after(["b"]))
}

fn coordinator_with(auto: Arc<StaticWorker>, draft: PlanDraft) -> Coordinator {
    let registry = Arc::new(WorkerRegistry::new());
    registry.register(auto).unwrap();
    registry.register(Arc::new(GatedWorker::new("gated"))).unwrap();
    Coordinator::new(
        registry,
        Arc::new(StaticPlanner::new(draft)),
        CoordinatorConfig::default(),
    )
}

#[tokio::test]
async fn rejecting_a_gate_leaves_dependents_pending_and_fails_the_plan() {
    let coordinator =
        coordinator_with(Arc::new(StaticWorker::new("auto", json!("ok"))), abc_draft());
    let mut observer = Observer::new(&coordinator);

    coordinator.start("Submit to the IRB").unwrap();
    let request = observer.approval_request().await;
    assert_eq!(request.step_id, StepId::new("b"));
    assert_eq!(request.description, "Email consent form to the IRB");

    coordinator
        .resolve_approval(&request.step_id, ApprovalResolution::reject())
        .unwrap();
    assert_eq!(observer.finished().await, PlanStatus::Failed);

    let plan = observer.last_plan();
    assert_eq!(plan.status, PlanStatus::Failed);
    assert_eq!(plan.step(&StepId::new("a")).unwrap().status, StepStatus::Completed);
    assert_eq!(plan.step(&StepId::new("b")).unwrap().status, StepStatus::Rejected);
    assert_eq!(plan.step(&StepId::new("c")).unwrap().status, StepStatus::Pending);

    assert_eq!(
        observer.trail("b"),
        vec!["running", "awaiting_approval", "approval_requested", "rejected"]
    );
    coordinator.join().unwrap();
}

#[tokio::test]
async fn approved_edits_become_the_step_result() {
    let recorder = Arc::new(InMemoryRunRecorder::new());
    let coordinator =
        coordinator_with(Arc::new(StaticWorker::new("auto", json!("ok"))), abc_draft())
            .with_recorder(recorder.clone());
    let mut observer = Observer::new(&coordinator);

    coordinator.start("Submit to the IRB").unwrap();
    let request = observer.approval_request().await;
    let edited = json!({"to": ["irb@example.org"], "subject": "Consent form v2"});
    coordinator
        .resolve_approval(
            &request.step_id,
            ApprovalResolution::approve_with_edits(edited.clone()).with_notes("fixed subject"),
        )
        .unwrap();
    assert_eq!(observer.finished().await, PlanStatus::Completed);

    let plan = observer.last_plan();
    assert_eq!(plan.step(&StepId::new("b")).unwrap().result, Some(edited));
    assert_eq!(
        observer.trail("b"),
        vec![
            "running",
            "awaiting_approval",
            "approval_requested",
            "approved",
            "completed"
        ]
    );

    let record = recorder.record(&plan.id, &StepId::new("b")).unwrap();
    let approval = record.approval.unwrap();
    assert_eq!(approval.decision, ApprovalDecision::Approved);
    assert_eq!(approval.notes.as_deref(), Some("fixed subject"));
    assert!(record.completed_at.is_some());
    coordinator.join().unwrap();
}

#[tokio::test]
async fn second_decision_reports_already_resolved_and_first_wins() {
    let coordinator =
        coordinator_with(Arc::new(StaticWorker::new("auto", json!("ok"))), abc_draft());
    let mut observer = Observer::new(&coordinator);

    coordinator.start("Submit").unwrap();
    let request = observer.approval_request().await;

    coordinator
        .resolve_approval(&request.step_id, ApprovalResolution::approve())
        .unwrap();
    let err = coordinator
        .resolve_approval(&request.step_id, ApprovalResolution::reject())
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::AlreadyResolved);

    assert_eq!(observer.finished().await, PlanStatus::Completed);
    let plan = observer.last_plan();
    assert_eq!(plan.step(&StepId::new("b")).unwrap().status, StepStatus::Completed);
    coordinator.join().unwrap();
}

#[tokio::test]
async fn resolving_an_unknown_step_is_rejected_without_affecting_the_run() {
    let coordinator =
        coordinator_with(Arc::new(StaticWorker::new("auto", json!("ok"))), abc_draft());
    let mut observer = Observer::new(&coordinator);

    coordinator.start("Submit").unwrap();
    let request = observer.approval_request().await;

    let err = coordinator
        .resolve_approval(&StepId::new("a"), ApprovalResolution::approve())
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NoSuchPendingApproval);
    assert_eq!(coordinator.pending_approvals().len(), 1);

    coordinator
        .resolve_approval(&request.step_id, ApprovalResolution::approve())
        .unwrap();
    assert_eq!(observer.finished().await, PlanStatus::Completed);
    coordinator.join().unwrap();
}

#[tokio::test]
async fn cancelling_with_an_open_gate_cancels_the_plan() {
    let auto = Arc::new(StaticWorker::new("auto", json!("ok")));
    let draft = PlanDraft::new("goal")
        .with_step(StepSpec::new("gated", "Send reminder").with_id("b"))
        .with_step(StepSpec::new("auto", "Unrelated work").with_id("c").independent());
    let coordinator = coordinator_with(auto.clone(), draft);
    let mut observer = Observer::new(&coordinator);

    coordinator.start("Remind everyone").unwrap();
    let request = observer.approval_request().await;
    assert!(coordinator.cancel());

    assert_eq!(observer.finished().await, PlanStatus::Cancelled);
    let plan = observer.last_plan();
    assert_eq!(plan.status, PlanStatus::Cancelled);
    assert_eq!(plan.step(&StepId::new("b")).unwrap().status, StepStatus::Failed);
    assert_eq!(plan.step(&StepId::new("c")).unwrap().status, StepStatus::Pending);
    assert_eq!(auto.invocations(), 0, "no worker runs after cancellation");
    assert!(!observer.seen.iter().any(|e| e.notification.is_error()));

    let err = coordinator
        .resolve_approval(&request.step_id, ApprovalResolution::approve())
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NoSuchPendingApproval);
    coordinator.join().unwrap();
}

#[tokio::test]
async fn cancelling_during_a_worker_call_records_its_outcome_then_stops() {
    let slow = Arc::new(
        StaticWorker::new("auto", json!("slow result")).with_delay(Duration::from_millis(300)),
    );
    let draft = PlanDraft::new("goal")
        .with_step(StepSpec::new("auto", "Slow step").with_id("a"))
        .with_step(StepSpec::new("auto", "Next step").with_id("b").independent());
    let coordinator = coordinator_with(slow.clone(), draft);
    let mut observer = Observer::new(&coordinator);

    coordinator.start("Go slow").unwrap();
    observer
        .wait_for(|n| {
            matches!(
                n,
                Notification::StatusChanged { status: StepStatus::Running, .. }
            )
        })
        .await;
    assert!(coordinator.cancel());

    assert_eq!(observer.finished().await, PlanStatus::Cancelled);
    let plan = observer.last_plan();
    let a = plan.step(&StepId::new("a")).unwrap();
    assert_eq!(a.status, StepStatus::Completed);
    assert_eq!(a.result, Some(json!("slow result")));
    assert_eq!(plan.step(&StepId::new("b")).unwrap().status, StepStatus::Pending);
    assert_eq!(slow.invocations(), 1);
    coordinator.join().unwrap();
}

#[tokio::test]
async fn second_start_while_active_is_refused_and_first_run_continues() {
    let coordinator =
        coordinator_with(Arc::new(StaticWorker::new("auto", json!("ok"))), abc_draft());
    let mut observer = Observer::new(&coordinator);

    let first = coordinator.start("First").unwrap();
    let request = observer.approval_request().await;

    match coordinator.start("Second") {
        Err(CoordinatorError::RunAlreadyActive(active)) => assert_eq!(active, first),
        other => panic!("expected RunAlreadyActive, got {other:?}"),
    }
    assert_eq!(coordinator.active_run(), Some(first.clone()));

    coordinator
        .resolve_approval(&request.step_id, ApprovalResolution::approve())
        .unwrap();
    assert_eq!(observer.finished().await, PlanStatus::Completed);
    assert!(observer.seen.iter().all(|e| e.run_id == first));

    // Whoever has seen RunFinished also sees the slot released.
    assert!(!coordinator.is_active());
    let second = coordinator.start("Second").unwrap();
    assert_ne!(second, first);
    coordinator.cancel();
    coordinator.join().unwrap();
}

#[tokio::test]
async fn sequence_numbers_are_contiguous_within_a_run() {
    let coordinator = coordinator_with(
        Arc::new(StaticWorker::new("auto", json!("ok"))),
        PlanDraft::new("goal")
            .with_step(StepSpec::new("auto", "one"))
            .with_step(StepSpec::new("auto", "two"))
            .with_step(StepSpec::new("auto", "three")),
    );
    let mut observer = Observer::new(&coordinator);

    coordinator.start("Count").unwrap();
    assert_eq!(observer.finished().await, PlanStatus::Completed);

    let sequences: Vec<u64> = observer.seen.iter().map(|e| e.sequence).collect();
    let expected: Vec<u64> = (1..=sequences.len() as u64).collect();
    assert_eq!(sequences, expected);

    let messages: Vec<&str> = observer
        .seen
        .iter()
        .filter_map(|e| match &e.notification {
            Notification::MessageProduced { text } => Some(text.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(messages.first(), Some(&"Working on: Count"));
    assert!(messages.contains(&"Delegating to auto: two"));
    coordinator.join().unwrap();
}

#[tokio::test]
async fn panicking_worker_fails_its_step_and_the_coordinator_stays_usable() {
    let registry = Arc::new(WorkerRegistry::new());
    registry
        .register(Arc::new(PanickingWorker::new("broken", "boom")))
        .unwrap();
    let coordinator = Coordinator::new(
        registry,
        Arc::new(StaticPlanner::new(
            PlanDraft::new("goal").with_step(StepSpec::new("broken", "crash").with_id("a")),
        )),
        CoordinatorConfig::default(),
    );
    let mut observer = Observer::new(&coordinator);

    coordinator.start("Crash").unwrap();
    assert_eq!(observer.finished().await, PlanStatus::Failed);
    coordinator.join().unwrap();
    assert!(!coordinator.is_active());

    let step = observer.last_plan().steps[0].clone();
    assert_eq!(step.status, StepStatus::Failed);
    assert_eq!(step.error.as_deref(), Some("worker broken panicked: boom"));

    coordinator.start("Again").unwrap();
    assert_eq!(observer.finished().await, PlanStatus::Failed);
    coordinator.join().unwrap();
}

struct PanickingPlanner;

#[async_trait]
impl Planner for PanickingPlanner {
    async fn plan(&self, _: &str, _: &[WorkerId]) -> Result<PlanDraft, PlannerError> {
        panic!("planner exploded")
    }
}

#[tokio::test]
async fn panic_outside_a_worker_still_finishes_the_run_and_frees_the_slot() {
    let coordinator = Coordinator::new(
        Arc::new(WorkerRegistry::new()),
        Arc::new(PanickingPlanner),
        CoordinatorConfig::default(),
    );
    let mut observer = Observer::new(&coordinator);

    coordinator.start("Plan it").unwrap();
    let status = observer.finished().await;
    coordinator.join().unwrap();

    assert_eq!(status, PlanStatus::Failed);
    assert!(observer.seen.iter().any(|e| matches!(
        &e.notification,
        Notification::ErrorReported { step_id: None, kind: ErrorKind::Internal, message }
            if message.contains("planner exploded")
    )));
    assert!(matches!(
        observer.seen.last().map(|e| &e.notification),
        Some(Notification::RunFinished { plan_id: None, status: PlanStatus::Failed })
    ));
    assert!(!coordinator.is_active());
    assert!(coordinator.start("Plan it again").is_ok());
    coordinator.join().unwrap();
}

#[tokio::test]
async fn back_to_back_runs_never_interleave_notifications() {
    let coordinator = coordinator_with(
        Arc::new(StaticWorker::new("auto", json!("ok"))),
        PlanDraft::new("goal").with_step(StepSpec::new("auto", "one")),
    );
    let mut observer = Observer::new(&coordinator);

    let first = coordinator.start("First").unwrap();
    let second = loop {
        match coordinator.start("Second") {
            Ok(run_id) => break run_id,
            Err(CoordinatorError::RunAlreadyActive(_)) => tokio::task::yield_now().await,
            Err(other) => panic!("unexpected start failure: {other}"),
        }
    };
    observer.finished().await;
    observer.finished().await;
    coordinator.join().unwrap();

    let runs: Vec<&RunId> = observer.seen.iter().map(|e| &e.run_id).collect();
    let boundary = runs.iter().position(|run| **run == second).unwrap();
    assert!(runs[..boundary].iter().all(|run| **run == first));
    assert!(runs[boundary..].iter().all(|run| **run == second));
    assert!(matches!(
        observer.seen[boundary - 1].notification,
        Notification::RunFinished { .. }
    ));
}
