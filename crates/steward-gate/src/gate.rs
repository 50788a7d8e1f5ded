use std::sync::Arc;

use parking_lot::Mutex;
use steward_types::{ApprovalRequest, ApprovalResolution, StepId};
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::{GateError, GateResult};

/// What the suspended execution path observes when it wakes up.
#[derive(Clone, Debug, PartialEq)]
pub enum GateOutcome {
    /// The interaction side decided; the request carries the decision
    Resolved(ApprovalRequest),
    /// The run was cancelled before anyone decided
    Cancelled,
}

/// Lifecycle of a gate
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GatePhase {
    Open,
    Resolved,
    Cancelled,
}

struct Slot {
    request: ApprovalRequest,
    phase: GatePhase,
    waiter: Option<oneshot::Sender<GateOutcome>>,
}

/// Per-step decision slot shared by the waiter and the resolver.
pub struct ApprovalGate {
    step_id: StepId,
    slot: Mutex<Slot>,
    cancel: CancellationToken,
}

impl ApprovalGate {
    /// Open a gate for `request`.
    ///
    /// The returned handle suspends until [`ApprovalGate::resolve`] or
    /// cancellation, either via [`ApprovalGate::cancel`] or `cancel` firing.
    pub fn open(request: ApprovalRequest, cancel: CancellationToken) -> (Arc<Self>, GateHandle) {
        let (tx, rx) = oneshot::channel();
        let step_id = request.step_id.clone();
        debug!(step_id = %step_id, approval_id = %request.id, "Approval gate opened");

        let gate = Arc::new(Self {
            step_id: step_id.clone(),
            slot: Mutex::new(Slot {
                request,
                phase: GatePhase::Open,
                waiter: Some(tx),
            }),
            cancel: cancel.clone(),
        });
        let handle = GateHandle {
            step_id,
            gate: gate.clone(),
            rx,
            cancel,
        };
        (gate, handle)
    }

    pub fn step_id(&self) -> &StepId {
        &self.step_id
    }

    /// Current phase. A fired cancellation token counts as cancelled even if
    /// nobody called [`ApprovalGate::cancel`].
    pub fn phase(&self) -> GatePhase {
        let slot = self.slot.lock();
        if slot.phase == GatePhase::Open && self.cancel.is_cancelled() {
            GatePhase::Cancelled
        } else {
            slot.phase
        }
    }

    pub fn is_open(&self) -> bool {
        self.phase() == GatePhase::Open
    }

    /// Snapshot of the request as it currently stands
    pub fn request(&self) -> ApprovalRequest {
        self.slot.lock().request.clone()
    }

    /// Deliver the human decision. Succeeds exactly once per gate.
    pub fn resolve(&self, resolution: ApprovalResolution) -> GateResult<ApprovalRequest> {
        let mut slot = self.slot.lock();
        if slot.phase == GatePhase::Open && self.cancel.is_cancelled() {
            slot.phase = GatePhase::Cancelled;
            if let Some(waiter) = slot.waiter.take() {
                let _ = waiter.send(GateOutcome::Cancelled);
            }
        }
        if slot.phase != GatePhase::Open {
            return Err(GateError::AlreadyResolved(self.step_id.clone()));
        }

        slot.request.resolve(resolution);
        slot.phase = GatePhase::Resolved;
        let resolved = slot.request.clone();
        if let Some(waiter) = slot.waiter.take() {
            // The waiter may already be gone; the decision still stands.
            let _ = waiter.send(GateOutcome::Resolved(resolved.clone()));
        }

        info!(
            step_id = %self.step_id,
            decision = %resolved.decision,
            "Approval gate resolved"
        );
        Ok(resolved)
    }

    /// Release the waiter with [`GateOutcome::Cancelled`]. Returns whether
    /// the gate was still open.
    pub fn cancel(&self) -> bool {
        let mut slot = self.slot.lock();
        if slot.phase != GatePhase::Open {
            return false;
        }
        slot.phase = GatePhase::Cancelled;
        if let Some(waiter) = slot.waiter.take() {
            let _ = waiter.send(GateOutcome::Cancelled);
        }
        debug!(step_id = %self.step_id, "Approval gate cancelled");
        true
    }
}

impl std::fmt::Debug for ApprovalGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApprovalGate")
            .field("step_id", &self.step_id)
            .field("phase", &self.phase())
            .finish()
    }
}

/// The execution side's end of a gate.
#[derive(Debug)]
pub struct GateHandle {
    step_id: StepId,
    gate: Arc<ApprovalGate>,
    rx: oneshot::Receiver<GateOutcome>,
    cancel: CancellationToken,
}

impl GateHandle {
    pub fn step_id(&self) -> &StepId {
        &self.step_id
    }

    /// Suspend until the gate is resolved or cancelled.
    ///
    /// A fired token is settled through the gate's slot, so the outcome
    /// always agrees with what [`ApprovalGate::resolve`] returned.
    pub async fn wait(self) -> GateOutcome {
        let GateHandle {
            gate,
            mut rx,
            cancel,
            ..
        } = self;
        tokio::select! {
            biased;
            outcome = &mut rx => return outcome.unwrap_or(GateOutcome::Cancelled),
            _ = cancel.cancelled() => {}
        }

        if gate.cancel() {
            return GateOutcome::Cancelled;
        }
        // Resolved under the slot lock before the token was seen; the
        // decision is already in the channel.
        rx.await.unwrap_or(GateOutcome::Cancelled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use steward_types::{ApprovalDecision, ApprovalProposal, PlanId};
    use tokio::time::{timeout, Duration};

    fn request(step: &str) -> ApprovalRequest {
        ApprovalRequest::new(
            PlanId::new("plan"),
            StepId::new(step),
            ApprovalProposal::new("Send email", json!({"to": ["irb@example.org"]})),
        )
    }

    #[tokio::test]
    async fn waiter_observes_resolution() {
        let (gate, handle) = ApprovalGate::open(request("b"), CancellationToken::new());
        let waiter = tokio::spawn(handle.wait());

        gate.resolve(ApprovalResolution::approve_with_edits(json!({"to": []})))
            .unwrap();

        let outcome = timeout(Duration::from_millis(200), waiter)
            .await
            .expect("timeout")
            .expect("join");
        match outcome {
            GateOutcome::Resolved(req) => {
                assert_eq!(req.decision, ApprovalDecision::Approved);
                assert_eq!(req.effective_payload(), &json!({"to": []}));
            }
            GateOutcome::Cancelled => panic!("expected resolution"),
        }
    }

    #[tokio::test]
    async fn second_resolve_is_rejected_and_first_wins() {
        let (gate, handle) = ApprovalGate::open(request("b"), CancellationToken::new());

        gate.resolve(ApprovalResolution::reject()).unwrap();
        let err = gate.resolve(ApprovalResolution::approve()).unwrap_err();
        assert_eq!(err, GateError::AlreadyResolved(StepId::new("b")));

        match handle.wait().await {
            GateOutcome::Resolved(req) => assert_eq!(req.decision, ApprovalDecision::Rejected),
            GateOutcome::Cancelled => panic!("expected resolution"),
        }
    }

    #[tokio::test]
    async fn token_cancellation_releases_waiter() {
        let token = CancellationToken::new();
        let (gate, handle) = ApprovalGate::open(request("b"), token.clone());
        let waiter = tokio::spawn(handle.wait());

        token.cancel();
        let outcome = timeout(Duration::from_millis(200), waiter)
            .await
            .expect("waiter must be released promptly")
            .expect("join");
        assert_eq!(outcome, GateOutcome::Cancelled);
        assert_eq!(gate.phase(), GatePhase::Cancelled);
        assert!(matches!(
            gate.resolve(ApprovalResolution::approve()),
            Err(GateError::AlreadyResolved(_))
        ));
    }

    #[tokio::test]
    async fn explicit_cancel_releases_waiter() {
        let (gate, handle) = ApprovalGate::open(request("b"), CancellationToken::new());
        assert!(gate.cancel());
        assert!(!gate.cancel());
        assert_eq!(handle.wait().await, GateOutcome::Cancelled);
    }

    #[tokio::test]
    async fn resolution_sent_before_cancellation_wins() {
        let token = CancellationToken::new();
        let (gate, handle) = ApprovalGate::open(request("b"), token.clone());
        gate.resolve(ApprovalResolution::approve()).unwrap();
        token.cancel();
        assert!(matches!(handle.wait().await, GateOutcome::Resolved(_)));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn racing_cancel_and_resolve_agree_on_the_outcome() {
        for _ in 0..200 {
            let token = CancellationToken::new();
            let (gate, handle) = ApprovalGate::open(request("b"), token.clone());
            let waiter = tokio::spawn(handle.wait());

            let resolver = std::thread::spawn(move || gate.resolve(ApprovalResolution::approve()));
            token.cancel();
            let resolved = resolver.join().expect("resolver thread");
            let outcome = timeout(Duration::from_millis(500), waiter)
                .await
                .expect("waiter must be released")
                .expect("join");

            match (resolved, outcome) {
                (Ok(_), GateOutcome::Resolved(_)) => {}
                (Err(GateError::AlreadyResolved(_)), GateOutcome::Cancelled) => {}
                (resolved, outcome) => {
                    panic!("resolver saw {resolved:?} but waiter saw {outcome:?}")
                }
            }
        }
    }

    #[test]
    fn resolve_without_waiter_still_records_decision() {
        let (gate, handle) = ApprovalGate::open(request("b"), CancellationToken::new());
        drop(handle);
        let req = gate.resolve(ApprovalResolution::approve()).unwrap();
        assert_eq!(req.decision, ApprovalDecision::Approved);
        assert_eq!(gate.phase(), GatePhase::Resolved);
    }
}
