//! decisions-architect - reasoning critique for personal decisions
//!
//! A user frames a decision as a context, a few named variants, and pro/con
//! arguments. Each submission gets one background analysis run that gates
//! argument quality, scores arguments against each other, pulls similar past
//! decisions, and asks a reasoning engine for a grounded critique. The user
//! polls the persisted status for the result.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use decisions_architect::{AppConfig, Services};
//!
//! let services = Services::build(&AppConfig::from_env())?;
//! let dispatched = services.decisions.submit(submission, user_id)?;
//!
//! // later
//! let view = services.decisions.status(dispatched.receipt.decision_id, Some(user_id))?;
//! ```
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │  DecisionService   submit / status / history / ...   │
//! └──────────────────────┬───────────────────────────────┘
//!                        │ AnalysisJobs (spawned run)
//!                        ▼
//! ┌──────────────────────────────────────────────────────┐
//! │  AnalysisOrchestrator                                │
//! │   1. quality gate        quality::validate_arguments │
//! │   2. pairwise scoring    scoring::PairwiseScorer     │
//! │   3. context retrieval   retrieval::ContextRetriever │
//! │   4. critique            critique::CritiqueGenerator │
//! │   5. indexing            retrieval::ContextRetriever │
//! └──────────────────────┬───────────────────────────────┘
//!                        │
//!     Embedder · RelevanceModel · VectorStore · ReasoningEngine
//!     (ONNX MiniLM, ONNX cross-encoder, SQLite, Anthropic API)
//! ```

pub mod config;
pub mod critique;
pub mod db;
pub mod embeddings;
pub mod error;
pub mod jobs;
pub mod orchestrator;
pub mod quality;
pub mod reasoning;
pub mod relevance;
pub mod retrieval;
pub mod scoring;
pub mod service;
pub mod types;
pub mod vectors;

#[cfg(test)]
pub(crate) mod testing;

pub use config::AppConfig;
pub use db::{AnalysisUpdate, DecisionStore};
pub use error::{AnalysisError, FailureCategory, ReasoningError, ServiceError, SubmissionError};
pub use orchestrator::{AnalysisOrchestrator, FailurePolicy, RunOutcome};
pub use service::{DecisionService, Dispatched};
pub use types::*;

// Collaborator seams
pub use embeddings::{Embedder, OnnxEmbedder, EMBEDDING_DIM};
pub use reasoning::{AnthropicReasoner, ReasonerConfig, ReasoningEngine};
pub use relevance::{OnnxCrossEncoder, RelevanceModel};
pub use vectors::{SqliteVectorStore, VectorStore};

use anyhow::{Context, Result};
use std::sync::Arc;

/// Production service graph, built once per process
pub struct Services {
    pub decisions: DecisionService,
    pub store: DecisionStore,
    pub retriever: Arc<retrieval::ContextRetriever>,
}

impl Services {
    /// Load both ONNX models, open the stores, and wire the pipeline
    pub fn build(config: &AppConfig) -> Result<Self> {
        std::fs::create_dir_all(&config.data_dir)
            .with_context(|| format!("Failed to create data dir {:?}", config.data_dir))?;

        let store = DecisionStore::open(&config.db_path)?;
        let vectors = SqliteVectorStore::open(&config.vector_db_path)?;

        let embedder = OnnxEmbedder::load(&config.embedding_model_dir)
            .context("Failed to load embedding model")?;
        let relevance = OnnxCrossEncoder::load(&config.cross_encoder_dir)
            .context("Failed to load cross-encoder")?;
        let reasoner = AnthropicReasoner::new(config.reasoner.clone())?;
        if !reasoner.has_api_key() {
            tracing::warn!("ANTHROPIC_API_KEY not set, critiques will fail");
        }

        Ok(Self::assemble(
            config,
            store,
            Arc::new(embedder),
            Arc::new(relevance),
            Arc::new(vectors),
            Arc::new(reasoner),
        ))
    }

    /// Wire the pipeline around already constructed collaborators
    pub fn assemble(
        config: &AppConfig,
        store: DecisionStore,
        embedder: Arc<dyn Embedder>,
        relevance: Arc<dyn RelevanceModel>,
        vectors: Arc<dyn VectorStore>,
        reasoner: Arc<dyn ReasoningEngine>,
    ) -> Self {
        let retriever = Arc::new(retrieval::ContextRetriever::new(embedder, vectors));
        let orchestrator = AnalysisOrchestrator::new(
            store.clone(),
            scoring::PairwiseScorer::new(relevance, config.scoring.clone()),
            retriever.clone(),
            critique::CritiqueGenerator::new(reasoner),
        )
        .with_policy(config.failure_policy)
        .with_top_k(config.retrieval_top_k);

        let jobs = jobs::AnalysisJobs::new(Arc::new(orchestrator));
        Self {
            decisions: DecisionService::new(store.clone(), jobs, retriever.clone()),
            store,
            retriever,
        }
    }
}
