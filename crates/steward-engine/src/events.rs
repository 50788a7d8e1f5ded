//! Notification fan-out from the execution side
//!
//! The [`NotificationHub`] outlives runs and holds subscribers. Each run
//! publishes through its own [`NotificationBus`], which stamps envelopes
//! with the run id and a per-run sequence number.
//!
//! Queues are unbounded and every subscriber gets every envelope, in
//! publication order. Sequence assignment and delivery happen under the
//! same lock so two publishers can never interleave out of order.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use steward_types::{
    ErrorKind, Notification, NotificationEnvelope, PlanId, PlanStatus, RunId, StepId, StepStatus,
    TaskPlan,
};
use tokio::sync::mpsc;
use tracing::debug;

/// Subscriber list shared by every run of a coordinator
#[derive(Default)]
pub struct NotificationHub {
    subscribers: Mutex<Vec<mpsc::UnboundedSender<NotificationEnvelope>>>,
}

impl NotificationHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to every notification published from now on
    pub fn subscribe(&self) -> Subscription {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.lock().push(tx);
        Subscription { rx }
    }

    /// Number of live subscribers
    pub fn subscriber_count(&self) -> usize {
        let mut subscribers = self.subscribers.lock();
        subscribers.retain(|tx| !tx.is_closed());
        subscribers.len()
    }
}

/// Per-run publisher
#[derive(Clone)]
pub struct NotificationBus {
    hub: Arc<NotificationHub>,
    run_id: RunId,
    sequence: Arc<AtomicU64>,
}

impl NotificationBus {
    pub fn new(hub: Arc<NotificationHub>, run_id: RunId) -> Self {
        Self {
            hub,
            run_id,
            sequence: Arc::new(AtomicU64::new(0)),
        }
    }

    /// A bus with a private hub, for running an orchestrator standalone
    pub fn detached() -> Self {
        Self::new(Arc::new(NotificationHub::new()), RunId::generate())
    }

    pub fn run_id(&self) -> &RunId {
        &self.run_id
    }

    pub fn hub(&self) -> &Arc<NotificationHub> {
        &self.hub
    }

    pub fn subscribe(&self) -> Subscription {
        self.hub.subscribe()
    }

    /// Publish a notification, returning its sequence number
    pub fn publish(&self, notification: Notification) -> u64 {
        let mut subscribers = self.hub.subscribers.lock();
        let sequence = self.sequence.fetch_add(1, Ordering::SeqCst) + 1;
        let envelope = NotificationEnvelope {
            id: uuid::Uuid::new_v4(),
            run_id: self.run_id.clone(),
            sequence,
            timestamp: chrono::Utc::now(),
            notification,
        };
        debug!(
            run_id = %self.run_id,
            sequence,
            kind = envelope.notification.label(),
            subscribers = subscribers.len(),
            "Publishing notification"
        );
        // Dropped subscriptions are pruned on the way.
        subscribers.retain(|tx| tx.send(envelope.clone()).is_ok());
        sequence
    }

    pub fn message(&self, text: impl Into<String>) -> u64 {
        self.publish(Notification::MessageProduced { text: text.into() })
    }

    pub fn status(&self, step_id: &StepId, status: StepStatus) -> u64 {
        self.publish(Notification::StatusChanged {
            step_id: step_id.clone(),
            status,
        })
    }

    pub fn plan(&self, plan: &TaskPlan) -> u64 {
        self.publish(Notification::PlanUpdated { plan: plan.clone() })
    }

    pub fn error(
        &self,
        step_id: Option<&StepId>,
        kind: ErrorKind,
        message: impl Into<String>,
    ) -> u64 {
        self.publish(Notification::ErrorReported {
            step_id: step_id.cloned(),
            kind,
            message: message.into(),
        })
    }

    pub fn finished(&self, plan_id: Option<&PlanId>, status: PlanStatus) -> u64 {
        self.publish(Notification::RunFinished {
            plan_id: plan_id.cloned(),
            status,
        })
    }

    /// Sink workers use to report progress
    pub fn progress(&self, worker: impl Into<String>) -> ProgressSink {
        ProgressSink {
            bus: self.clone(),
            worker: worker.into(),
        }
    }
}

impl std::fmt::Debug for NotificationBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationBus")
            .field("run_id", &self.run_id)
            .field("sequence", &self.sequence.load(Ordering::SeqCst))
            .finish()
    }
}

/// Worker-facing handle that turns progress reports into
/// `MessageProduced` notifications
#[derive(Clone, Debug)]
pub struct ProgressSink {
    bus: NotificationBus,
    worker: String,
}

impl ProgressSink {
    pub fn report(&self, text: impl AsRef<str>) {
        self.bus.message(format!("[{}] {}", self.worker, text.as_ref()));
    }
}

/// Receiving end of a subscription
#[derive(Debug)]
pub struct Subscription {
    rx: mpsc::UnboundedReceiver<NotificationEnvelope>,
}

impl Subscription {
    /// Wait for the next envelope. `None` once the hub is gone.
    pub async fn recv(&mut self) -> Option<NotificationEnvelope> {
        self.rx.recv().await
    }

    /// Block the current (non-async) thread for the next envelope
    pub fn blocking_recv(&mut self) -> Option<NotificationEnvelope> {
        self.rx.blocking_recv()
    }

    /// Next envelope if one is already queued
    pub fn try_next(&mut self) -> Option<NotificationEnvelope> {
        self.rx.try_recv().ok()
    }

    /// Everything queued right now
    pub fn drain(&mut self) -> Vec<NotificationEnvelope> {
        std::iter::from_fn(|| self.try_next()).collect()
    }
}
