//! Analysis run state machine
//!
//! ```text
//! pending ──▶ analyzing ──┬──▶ completed
//!                         └──▶ failed
//! ```
//!
//! One run walks a fixed sequence: quality gate, pairwise scoring, context
//! retrieval, critique, indexing, persist. Gate, scoring, and critique
//! failures end the run; retrieval and indexing failures only degrade it.
//! Every terminal failure goes through [`AnalysisOrchestrator::fail_run`],
//! which applies the configured [`FailurePolicy`].

use crate::critique::{CritiqueGenerator, CritiqueRequest};
use crate::db::{AnalysisUpdate, DecisionStore};
use crate::error::AnalysisError;
use crate::quality::validate_arguments;
use crate::retrieval::{retrieval_query, ContextRetriever};
use crate::scoring::{aggregate_by_variant, PairwiseScorer};
use crate::types::{AnalysisStatus, Argument, DecisionSubmission};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// What happens to a decision whose run fails terminally
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Keep the record, status `failed`, with a structured failure detail
    #[default]
    PreserveWithDetail,
    /// Delete the vector entry, then the record
    Rollback,
}

impl FailurePolicy {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "preserve" | "preserve_with_detail" => Some(Self::PreserveWithDetail),
            "rollback" => Some(Self::Rollback),
            _ => None,
        }
    }
}

/// How a run ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Completed,
    /// Failure detail persisted on the record
    Failed { code: &'static str },
    /// Record and vector entry removed
    RolledBack { code: &'static str },
    /// The decision was missing or already terminal when the run started
    Skipped,
}

pub struct AnalysisOrchestrator {
    store: DecisionStore,
    scorer: PairwiseScorer,
    retriever: Arc<ContextRetriever>,
    critic: CritiqueGenerator,
    policy: FailurePolicy,
    top_k: usize,
}

impl AnalysisOrchestrator {
    pub fn new(
        store: DecisionStore,
        scorer: PairwiseScorer,
        retriever: Arc<ContextRetriever>,
        critic: CritiqueGenerator,
    ) -> Self {
        Self {
            store,
            scorer,
            retriever,
            critic,
            policy: FailurePolicy::default(),
            top_k: crate::config::DEFAULT_TOP_K,
        }
    }

    pub fn with_policy(mut self, policy: FailurePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    pub fn policy(&self) -> FailurePolicy {
        self.policy
    }

    /// Execute one run to a terminal state. Never returns an error: every
    /// failure is recorded according to the policy.
    pub async fn run(&self, decision_id: Uuid, submission: &DecisionSubmission) -> RunOutcome {
        info!(decision = %decision_id, "analysis run started");
        match self.execute(decision_id, submission).await {
            Ok(outcome) => outcome,
            Err(err) => self.fail_run(decision_id, &err).await,
        }
    }

    async fn execute(
        &self,
        decision_id: Uuid,
        submission: &DecisionSubmission,
    ) -> Result<RunOutcome, AnalysisError> {
        // 1. Mark as analyzing
        let started = self
            .store
            .update_analysis(decision_id, AnalysisUpdate::status(AnalysisStatus::Analyzing))
            .map_err(AnalysisError::Unexpected)?;
        if !started {
            warn!(decision = %decision_id, "decision missing or already terminal, skipping run");
            return Ok(RunOutcome::Skipped);
        }

        // 2. Stable ids for the rest of the run
        let arguments: Vec<Argument> =
            submission.arguments.iter().map(Argument::identify).collect();

        // 3. Quality gate
        let report = validate_arguments(&arguments);
        if !report.is_valid {
            return Err(AnalysisError::InsufficientData(report));
        }
        debug!(
            decision = %decision_id,
            quality = report.quality_score,
            "arguments passed quality gate"
        );

        // 4. Pairwise scoring
        let scores = self
            .scorer
            .score_arguments(&arguments, &submission.context)
            .await
            .map_err(AnalysisError::ScoringFailure)?;
        let variant_scores = aggregate_by_variant(&arguments, &scores);
        info!(decision = %decision_id, arguments = scores.len(), "arguments scored");

        // 5. Past context, empty on failure
        let query = retrieval_query(&submission.context, &arguments);
        let retrieved = match self.retriever.simple_retrieval(&query, self.top_k).await {
            Ok(found) => found,
            Err(e) => {
                let err = AnalysisError::RetrievalFailure(e);
                warn!(
                    decision = %decision_id,
                    code = err.code(),
                    error = %err,
                    "continuing without past context"
                );
                Vec::new()
            }
        };
        debug!(decision = %decision_id, retrieved = retrieved.len(), "context retrieved");

        // 6. Critique
        let critique = self
            .critic
            .analyze(&CritiqueRequest {
                context: &submission.context,
                variants: &submission.variants,
                arguments: &arguments,
                scores: &scores,
                retrieved_context: &retrieved,
            })
            .await?;
        info!(
            decision = %decision_id,
            confidence = ?critique.confidence_level,
            "critique generated"
        );

        // 7. Index for future runs
        match self
            .retriever
            .index_decision(&decision_id.to_string(), &submission.context, &arguments)
            .await
        {
            Ok(outcome) => debug!(decision = %decision_id, ?outcome, "decision indexed"),
            Err(e) => {
                let err = AnalysisError::IndexingFailure(e);
                warn!(decision = %decision_id, code = err.code(), error = %err, "indexing skipped");
            }
        }

        // 8. Persist
        let llm_analysis =
            serde_json::to_value(&critique).map_err(|e| AnalysisError::Unexpected(e.into()))?;
        let stored = self
            .store
            .update_analysis(
                decision_id,
                AnalysisUpdate {
                    status: AnalysisStatus::Completed,
                    ml_scores: Some(variant_scores),
                    llm_analysis: Some(llm_analysis),
                    retrieved_context: Some(retrieved),
                },
            )
            .map_err(AnalysisError::Unexpected)?;
        if !stored {
            warn!(decision = %decision_id, "decision changed state during run, result dropped");
            return Ok(RunOutcome::Skipped);
        }

        info!(decision = %decision_id, "analysis completed");
        Ok(RunOutcome::Completed)
    }

    /// Record a terminal failure according to the policy
    pub async fn fail_run(&self, decision_id: Uuid, err: &AnalysisError) -> RunOutcome {
        let code = err.code();
        match err {
            AnalysisError::InsufficientData(report) => warn!(
                decision = %decision_id,
                invalid = report.invalid_arguments.len(),
                quality = report.quality_score,
                "arguments rejected by quality gate"
            ),
            _ => error!(decision = %decision_id, code, error = %err, "analysis failed"),
        }

        match self.policy {
            FailurePolicy::PreserveWithDetail => {
                let detail = match serde_json::to_value(err.failure_detail()) {
                    Ok(value) => Some(value),
                    Err(e) => {
                        error!(
                            decision = %decision_id,
                            error = %e,
                            "could not serialize failure detail"
                        );
                        None
                    }
                };
                let update = AnalysisUpdate {
                    llm_analysis: detail,
                    ..AnalysisUpdate::status(AnalysisStatus::Failed)
                };
                match self.store.update_analysis(decision_id, update) {
                    Ok(true) => {}
                    Ok(false) => {
                        warn!(
                            decision = %decision_id,
                            "failure not recorded, decision already terminal"
                        )
                    }
                    Err(e) => {
                        error!(decision = %decision_id, error = %e, "failed to persist failure")
                    }
                }
                RunOutcome::Failed { code }
            }
            FailurePolicy::Rollback => {
                self.retriever
                    .delete_decision_vectors(&decision_id.to_string())
                    .await;
                match self.store.delete(decision_id) {
                    Ok(_) => info!(decision = %decision_id, code, "decision rolled back"),
                    Err(e) => {
                        error!(
                            decision = %decision_id,
                            error = %e,
                            "rollback could not delete decision"
                        )
                    }
                }
                RunOutcome::RolledBack { code }
            }
        }
    }
}
