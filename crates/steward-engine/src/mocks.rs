//! Scripted workers for tests and demos

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use steward_types::{ApprovalProposal, Step, WorkerId};

use crate::worker::{Worker, WorkerContext, WorkerOutcome};

/// Always returns the same payload.
pub struct StaticWorker {
    id: WorkerId,
    payload: serde_json::Value,
    delay: Option<Duration>,
    invocations: AtomicUsize,
}

impl StaticWorker {
    pub fn new(id: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            id: WorkerId::new(id),
            payload,
            delay: None,
            invocations: AtomicUsize::new(0),
        }
    }

    /// Sleep before answering, to keep an invocation in flight
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn invocations(&self) -> usize {
        self.invocations.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Worker for StaticWorker {
    fn id(&self) -> WorkerId {
        self.id.clone()
    }

    async fn invoke(&self, _step: &Step, _ctx: &WorkerContext) -> WorkerOutcome {
        self.invocations.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        WorkerOutcome::Result(self.payload.clone())
    }
}

/// Replays a queue of outcomes, one per invocation.
///
/// Once the queue is empty every further call fails.
pub struct ScriptedWorker {
    id: WorkerId,
    script: Mutex<VecDeque<WorkerOutcome>>,
    invocations: AtomicUsize,
}

impl ScriptedWorker {
    pub fn new(id: impl Into<String>, script: impl IntoIterator<Item = WorkerOutcome>) -> Self {
        Self {
            id: WorkerId::new(id),
            script: Mutex::new(script.into_iter().collect()),
            invocations: AtomicUsize::new(0),
        }
    }

    pub fn invocations(&self) -> usize {
        self.invocations.load(Ordering::SeqCst)
    }

    pub fn remaining(&self) -> usize {
        self.script.lock().len()
    }
}

#[async_trait]
impl Worker for ScriptedWorker {
    fn id(&self) -> WorkerId {
        self.id.clone()
    }

    async fn invoke(&self, step: &Step, _ctx: &WorkerContext) -> WorkerOutcome {
        self.invocations.fetch_add(1, Ordering::SeqCst);
        self.script
            .lock()
            .pop_front()
            .unwrap_or_else(|| {
                WorkerOutcome::error(format!("script exhausted at step {}", step.id))
            })
    }
}

/// Always fails with the same detail.
pub struct FailingWorker {
    id: WorkerId,
    detail: String,
    invocations: AtomicUsize,
}

impl FailingWorker {
    pub fn new(id: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            id: WorkerId::new(id),
            detail: detail.into(),
            invocations: AtomicUsize::new(0),
        }
    }

    pub fn invocations(&self) -> usize {
        self.invocations.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Worker for FailingWorker {
    fn id(&self) -> WorkerId {
        self.id.clone()
    }

    async fn invoke(&self, _step: &Step, _ctx: &WorkerContext) -> WorkerOutcome {
        self.invocations.fetch_add(1, Ordering::SeqCst);
        WorkerOutcome::Error(self.detail.clone())
    }
}

/// Proposes the step's input for approval, described by the step's
/// description.
pub struct GatedWorker {
    id: WorkerId,
    invocations: AtomicUsize,
}

impl GatedWorker {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: WorkerId::new(id),
            invocations: AtomicUsize::new(0),
        }
    }

    pub fn invocations(&self) -> usize {
        self.invocations.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Worker for GatedWorker {
    fn id(&self) -> WorkerId {
        self.id.clone()
    }

    async fn invoke(&self, step: &Step, _ctx: &WorkerContext) -> WorkerOutcome {
        self.invocations.fetch_add(1, Ordering::SeqCst);
        WorkerOutcome::NeedsApproval(ApprovalProposal::new(
            step.description.clone(),
            step.input.clone(),
        ))
    }
}

/// Panics on every invocation.
pub struct PanickingWorker {
    id: WorkerId,
    message: String,
}

impl PanickingWorker {
    pub fn new(id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            id: WorkerId::new(id),
            message: message.into(),
        }
    }
}

#[async_trait]
impl Worker for PanickingWorker {
    fn id(&self) -> WorkerId {
        self.id.clone()
    }

    async fn invoke(&self, _step: &Step, _ctx: &WorkerContext) -> WorkerOutcome {
        panic!("{}", self.message)
    }
}
