//! The per-run set of approval gates
//!
//! Resolved and cancelled gates stay on the board until the next run
//! clears it, so a duplicate decision for a step reports
//! [`GateError::AlreadyResolved`] instead of "nothing pending".

use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use steward_types::{ApprovalRequest, ApprovalResolution, StepId};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::{GateError, GateResult};
use crate::gate::{ApprovalGate, GateHandle};

/// Gates keyed by step, shared by the execution and interaction sides
#[derive(Default)]
pub struct GateBoard {
    gates: DashMap<StepId, Arc<ApprovalGate>>,
}

impl GateBoard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a gate for the request's step.
    pub fn open(
        &self,
        request: ApprovalRequest,
        cancel: CancellationToken,
    ) -> GateResult<GateHandle> {
        let step_id = request.step_id.clone();
        match self.gates.entry(step_id.clone()) {
            Entry::Occupied(mut existing) => {
                if existing.get().is_open() {
                    return Err(GateError::GateAlreadyOpen(step_id));
                }
                let (gate, handle) = ApprovalGate::open(request, cancel);
                existing.insert(gate);
                Ok(handle)
            }
            Entry::Vacant(slot) => {
                let (gate, handle) = ApprovalGate::open(request, cancel);
                slot.insert(gate);
                Ok(handle)
            }
        }
    }

    /// Forward a decision to the gate for `step_id`.
    pub fn resolve(
        &self,
        step_id: &StepId,
        resolution: ApprovalResolution,
    ) -> GateResult<ApprovalRequest> {
        // Clone the Arc so the map shard is not locked while resolving.
        let gate = self
            .gates
            .get(step_id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| GateError::NoSuchPendingApproval(step_id.clone()))?;
        gate.resolve(resolution)
    }

    /// Cancel every open gate, returning how many were open.
    pub fn cancel_all(&self) -> usize {
        let gates: Vec<Arc<ApprovalGate>> =
            self.gates.iter().map(|entry| entry.value().clone()).collect();
        let cancelled = gates.iter().filter(|gate| gate.cancel()).count();
        if cancelled > 0 {
            debug!(cancelled, "Cancelled open approval gates");
        }
        cancelled
    }

    /// Requests still waiting for a decision
    pub fn pending(&self) -> Vec<ApprovalRequest> {
        let mut pending: Vec<ApprovalRequest> = self
            .gates
            .iter()
            .filter(|entry| entry.value().is_open())
            .map(|entry| entry.value().request())
            .collect();
        pending.sort_by_key(|req| req.requested_at);
        pending
    }

    pub fn is_pending(&self, step_id: &StepId) -> bool {
        self.gates
            .get(step_id)
            .map(|entry| entry.value().is_open())
            .unwrap_or(false)
    }

    /// Forget every gate; called when a new run starts.
    pub fn clear(&self) {
        self.gates.clear();
    }

    pub fn len(&self) -> usize {
        self.gates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.gates.is_empty()
    }
}
