//! Background dispatch of analysis runs
//!
//! `submit` returns as soon as the run is spawned. Each run is wrapped by a
//! supervisor task so a panic inside a collaborator still leaves the
//! decision in a terminal state instead of stuck in `analyzing`.

use crate::error::AnalysisError;
use crate::orchestrator::{AnalysisOrchestrator, RunOutcome};
use crate::types::DecisionSubmission;
use anyhow::anyhow;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::error;
use uuid::Uuid;

#[derive(Clone)]
pub struct AnalysisJobs {
    orchestrator: Arc<AnalysisOrchestrator>,
}

impl AnalysisJobs {
    pub fn new(orchestrator: Arc<AnalysisOrchestrator>) -> Self {
        Self { orchestrator }
    }

    /// Spawn a run for `decision_id`. Must be called within a tokio runtime.
    pub fn submit(
        &self,
        decision_id: Uuid,
        submission: DecisionSubmission,
    ) -> JoinHandle<RunOutcome> {
        let orchestrator = self.orchestrator.clone();

        tokio::spawn(async move {
            let worker = orchestrator.clone();
            let run = tokio::spawn(async move { worker.run(decision_id, &submission).await });

            match run.await {
                Ok(outcome) => outcome,
                Err(join_error) => {
                    error!(decision = %decision_id, error = %join_error, "analysis run aborted");
                    let err =
                        AnalysisError::Unexpected(anyhow!("analysis run aborted: {}", join_error));
                    orchestrator.fail_run(decision_id, &err).await
                }
            }
        })
    }
}
