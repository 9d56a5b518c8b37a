//! Submission boundary
//!
//! Validates payloads, creates decision records, hands runs to the job
//! dispatcher, and serves the read side: status polling, history,
//! outcome follow-ups, and deletion.

use crate::db::DecisionStore;
use crate::error::{ServiceError, SubmissionError};
use crate::jobs::AnalysisJobs;
use crate::orchestrator::RunOutcome;
use crate::retrieval::ContextRetriever;
use crate::types::{
    AnalysisStatus, DecisionRecord, DecisionSubmission, StatusView, SubmissionReceipt,
};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::info;
use uuid::Uuid;

/// A submission accepted for analysis
pub struct Dispatched {
    pub receipt: SubmissionReceipt,
    /// Handle on the background run; dropping it does not cancel the run
    pub job: JoinHandle<RunOutcome>,
}

pub struct DecisionService {
    store: DecisionStore,
    jobs: AnalysisJobs,
    retriever: Arc<ContextRetriever>,
}

impl DecisionService {
    pub fn new(store: DecisionStore, jobs: AnalysisJobs, retriever: Arc<ContextRetriever>) -> Self {
        Self { store, jobs, retriever }
    }

    /// Validate, persist as `pending`, and start the run without waiting on it
    pub fn submit(
        &self,
        submission: DecisionSubmission,
        user_id: Uuid,
    ) -> Result<Dispatched, ServiceError> {
        let submission = submission.validate()?;
        let record = self.store.create(&submission, user_id)?;
        info!(decision = %record.id, user = %user_id, "decision submitted");

        let job = self.jobs.submit(record.id, submission);
        Ok(Dispatched {
            receipt: SubmissionReceipt {
                decision_id: record.id,
                status: AnalysisStatus::Pending,
                message: "Analysis started. Poll the status endpoint for results.".to_string(),
            },
            job,
        })
    }

    /// Current status of a decision. A decision owned by someone else is
    /// reported as missing.
    pub fn status(
        &self,
        decision_id: Uuid,
        user_id: Option<Uuid>,
    ) -> Result<StatusView, ServiceError> {
        Ok(self.owned(decision_id, user_id)?.status_view())
    }

    pub fn get(
        &self,
        decision_id: Uuid,
        user_id: Option<Uuid>,
    ) -> Result<DecisionRecord, ServiceError> {
        self.owned(decision_id, user_id)
    }

    pub fn history(
        &self,
        user_id: Option<Uuid>,
        skip: usize,
        limit: usize,
    ) -> Result<Vec<DecisionRecord>, ServiceError> {
        Ok(self.store.history(user_id, skip, limit)?)
    }

    pub fn record_outcome(
        &self,
        decision_id: Uuid,
        user_id: Option<Uuid>,
        outcome: &str,
        selected_variant: Option<&str>,
    ) -> Result<DecisionRecord, ServiceError> {
        let record = self.owned(decision_id, user_id)?;
        if let Some(variant) = selected_variant {
            if !record.variants.iter().any(|v| v == variant) {
                return Err(SubmissionError::UnknownVariant(variant.to_string()).into());
            }
        }

        self.store
            .record_outcome(decision_id, outcome.trim(), selected_variant)?
            .ok_or(ServiceError::NotFound)
    }

    /// Remove the vector entry, then the record. Both steps tolerate the
    /// other side already being gone.
    pub async fn delete_decision(
        &self,
        decision_id: Uuid,
        user_id: Option<Uuid>,
    ) -> Result<(), ServiceError> {
        self.owned(decision_id, user_id)?;
        self.retriever
            .delete_decision_vectors(&decision_id.to_string())
            .await;
        self.store.delete(decision_id)?;
        info!(decision = %decision_id, "decision deleted");
        Ok(())
    }

    fn owned(
        &self,
        decision_id: Uuid,
        user_id: Option<Uuid>,
    ) -> Result<DecisionRecord, ServiceError> {
        match self.store.get(decision_id)? {
            Some(record) if user_id.map_or(true, |u| u == record.user_id) => Ok(record),
            _ => Err(ServiceError::NotFound),
        }
    }
}
