//! Run recorders persist step lifecycles
//!
//! The orchestrator calls a recorder at each lifecycle edge and ignores
//! its failures beyond a warning. A run never fails because its history
//! could not be written.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use steward_types::{ApprovalOutcome, ApprovalRequest, PlanId, RunRecord, StepId, WorkerId};

use crate::error::{RecorderError, RecorderResult};

#[async_trait]
pub trait RunRecorder: Send + Sync {
    async fn on_step_started(
        &self,
        plan_id: &PlanId,
        step_id: &StepId,
        worker: &WorkerId,
        at: DateTime<Utc>,
    ) -> RecorderResult<()>;

    async fn on_step_completed(
        &self,
        plan_id: &PlanId,
        step_id: &StepId,
        at: DateTime<Utc>,
    ) -> RecorderResult<()>;

    async fn on_step_failed(
        &self,
        plan_id: &PlanId,
        step_id: &StepId,
        error: &str,
        at: DateTime<Utc>,
    ) -> RecorderResult<()>;

    async fn on_approval_resolved(&self, request: &ApprovalRequest) -> RecorderResult<()>;
}

/// Recorder that drops everything
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopRunRecorder;

#[async_trait]
impl RunRecorder for NoopRunRecorder {
    async fn on_step_started(
        &self,
        _: &PlanId,
        _: &StepId,
        _: &WorkerId,
        _: DateTime<Utc>,
    ) -> RecorderResult<()> {
        Ok(())
    }

    async fn on_step_completed(
        &self,
        _: &PlanId,
        _: &StepId,
        _: DateTime<Utc>,
    ) -> RecorderResult<()> {
        Ok(())
    }

    async fn on_step_failed(
        &self,
        _: &PlanId,
        _: &StepId,
        _: &str,
        _: DateTime<Utc>,
    ) -> RecorderResult<()> {
        Ok(())
    }

    async fn on_approval_resolved(&self, _: &ApprovalRequest) -> RecorderResult<()> {
        Ok(())
    }
}

/// In-memory recorder, keyed by `(plan, step)`
#[derive(Default)]
pub struct InMemoryRunRecorder {
    records: DashMap<(PlanId, StepId), RunRecord>,
}

impl InMemoryRunRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, plan_id: &PlanId, step_id: &StepId) -> Option<RunRecord> {
        self.records
            .get(&(plan_id.clone(), step_id.clone()))
            .map(|r| r.value().clone())
    }

    /// All records of a plan, ordered by start time
    pub fn records_for(&self, plan_id: &PlanId) -> Vec<RunRecord> {
        let mut records: Vec<RunRecord> = self
            .records
            .iter()
            .filter(|r| &r.key().0 == plan_id)
            .map(|r| r.value().clone())
            .collect();
        records.sort_by_key(|r| r.started_at);
        records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    fn update<F>(&self, plan_id: &PlanId, step_id: &StepId, f: F) -> RecorderResult<()>
    where
        F: FnOnce(&mut RunRecord),
    {
        let mut record = self
            .records
            .get_mut(&(plan_id.clone(), step_id.clone()))
            .ok_or_else(|| RecorderError::UnknownRecord(step_id.to_string()))?;
        f(record.value_mut());
        Ok(())
    }
}

#[async_trait]
impl RunRecorder for InMemoryRunRecorder {
    async fn on_step_started(
        &self,
        plan_id: &PlanId,
        step_id: &StepId,
        worker: &WorkerId,
        at: DateTime<Utc>,
    ) -> RecorderResult<()> {
        self.records.insert(
            (plan_id.clone(), step_id.clone()),
            RunRecord::started(plan_id.clone(), step_id.clone(), worker.clone(), at),
        );
        Ok(())
    }

    async fn on_step_completed(
        &self,
        plan_id: &PlanId,
        step_id: &StepId,
        at: DateTime<Utc>,
    ) -> RecorderResult<()> {
        self.update(plan_id, step_id, |r| r.completed_at = Some(at))
    }

    async fn on_step_failed(
        &self,
        plan_id: &PlanId,
        step_id: &StepId,
        error: &str,
        at: DateTime<Utc>,
    ) -> RecorderResult<()> {
        self.update(plan_id, step_id, |r| {
            r.failed_at = Some(at);
            r.error = Some(error.to_string());
        })
    }

    async fn on_approval_resolved(&self, request: &ApprovalRequest) -> RecorderResult<()> {
        let decided_at = request.decided_at.unwrap_or_else(Utc::now);
        self.update(&request.plan_id, &request.step_id, |r| {
            r.approval = Some(ApprovalOutcome {
                decision: request.decision,
                notes: request.notes.clone(),
                decided_at,
            });
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use steward_types::{ApprovalDecision, ApprovalProposal, ApprovalResolution};

    #[tokio::test]
    async fn records_full_lifecycle_with_approval() {
        let recorder = InMemoryRunRecorder::new();
        let plan = PlanId::new("p");
        let step = StepId::new("b");

        recorder
            .on_step_started(&plan, &step, &WorkerId::new("document_maker"), Utc::now())
            .await
            .unwrap();
        assert!(recorder.record(&plan, &step).unwrap().is_open());

        let mut request = ApprovalRequest::new(
            plan.clone(),
            step.clone(),
            ApprovalProposal::new("Finalize", json!({})),
        );
        request.resolve(ApprovalResolution::approve().with_notes("looks good"));
        recorder.on_approval_resolved(&request).await.unwrap();
        recorder.on_step_completed(&plan, &step, Utc::now()).await.unwrap();

        let record = recorder.record(&plan, &step).unwrap();
        assert!(!record.is_open());
        let approval = record.approval.unwrap();
        assert_eq!(approval.decision, ApprovalDecision::Approved);
        assert_eq!(approval.notes.as_deref(), Some("looks good"));
    }

    #[tokio::test]
    async fn completing_an_unknown_step_is_an_error() {
        let recorder = InMemoryRunRecorder::new();
        let err = recorder
            .on_step_completed(&PlanId::new("p"), &StepId::new("x"), Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, RecorderError::UnknownRecord(_)));
    }

    #[tokio::test]
    async fn failure_keeps_error_detail() {
        let recorder = InMemoryRunRecorder::new();
        let plan = PlanId::new("p");
        let step = StepId::new("a");
        recorder
            .on_step_started(&plan, &step, &WorkerId::new("w"), Utc::now())
            .await
            .unwrap();
        recorder
            .on_step_failed(&plan, &step, "timeout", Utc::now())
            .await
            .unwrap();
        let records = recorder.records_for(&plan);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].error.as_deref(), Some("timeout"));
    }
}
