//! End-to-end runs through the public API with in-process collaborators

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use decisions_architect::critique::CritiqueGenerator;
use decisions_architect::retrieval::{ContextRetriever, IndexOutcome};
use decisions_architect::scoring::{PairwiseScorer, ScoringConfig};
use decisions_architect::{
    AnalysisOrchestrator, AnalysisStatus, AppConfig, ArgumentInput, ArgumentType, DecisionStore,
    DecisionSubmission, Embedder, FailurePolicy, ReasoningEngine, ReasoningError, RelevanceModel,
    RunOutcome, ServiceError, Services, SqliteVectorStore, SubmissionError,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use uuid::Uuid;

// ============================================================================
// Collaborators
// ============================================================================

#[derive(Default)]
struct WordEmbedder {
    calls: AtomicUsize,
    broken: bool,
}

#[async_trait]
impl Embedder for WordEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.broken {
            return Err(anyhow!("embedding backend offline"));
        }
        let mut v = vec![0.0f32; 64];
        let lower = text.to_lowercase();
        for word in lower.split(|c: char| !c.is_alphanumeric()).filter(|w| !w.is_empty()) {
            let bucket = word
                .bytes()
                .fold(7usize, |h, b| h.wrapping_mul(31).wrapping_add(b as usize));
            v[bucket % 64] += 1.0;
        }
        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt().max(f32::EPSILON);
        Ok(v.into_iter().map(|x| x / norm).collect())
    }

    fn dimension(&self) -> usize {
        64
    }
}

#[derive(Default)]
struct LengthRelevance {
    calls: AtomicUsize,
}

#[async_trait]
impl RelevanceModel for LengthRelevance {
    async fn compare(&self, a: &str, b: &str) -> Result<f64> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok((a.len() as f64 - b.len() as f64) / 40.0)
    }
}

struct CannedReasoner {
    reply: fn() -> std::result::Result<String, ReasoningError>,
    calls: AtomicUsize,
}

impl CannedReasoner {
    fn new(reply: fn() -> std::result::Result<String, ReasoningError>) -> Self {
        Self {
            reply,
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl ReasoningEngine for CannedReasoner {
    async fn complete(
        &self,
        _system: &str,
        _transcript: &str,
    ) -> std::result::Result<String, ReasoningError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        (self.reply)()
    }
}

fn remote_office_critique() -> std::result::Result<String, ReasoningError> {
    Ok(serde_json::json!({
        "argument_quality_comparison": {
            "Remote": {
                "strengths": ["'two hours of commuting' is a measurable cost"],
                "weaknesses": [],
                "logical_fallacies": [],
                "missing_considerations": ["isolation"],
                "data_quality": "SUFFICIENT"
            },
            "Office": {
                "strengths": [],
                "weaknesses": ["'faster in person' is asserted, not shown"],
                "logical_fallacies": [{"type": "Unsupported claim", "quote": "faster in person", "explanation": "no example"}],
                "missing_considerations": [],
                "data_quality": "INSUFFICIENT_REASONING"
            }
        },
        "cognitive_biases_detected": [],
        "alignment_with_model_scores": "Agrees: the remote argument is more concrete.",
        "detected_reasoning_patterns": "No history to compare against.",
        "key_weak_points_to_reconsider": ["'faster in person' - give an example"],
        "final_note": "The remote case is better argued.",
        "score_details": {"logic_stability": 0.8, "data_grounding": 0.6, "historical_consistency": 1.0},
        "confidence_level": "high",
        "systemic_inconsistencies": []
    })
    .to_string())
}

fn unauthorized() -> std::result::Result<String, ReasoningError> {
    Err(ReasoningError::Authentication("401 Unauthorized".to_string()))
}

struct Pipeline {
    services: Services,
    embedder: Arc<WordEmbedder>,
    relevance: Arc<LengthRelevance>,
    reasoner: Arc<CannedReasoner>,
    vectors: SqliteVectorStore,
}

fn pipeline(policy: FailurePolicy, embedder: WordEmbedder, reasoner: CannedReasoner) -> Pipeline {
    let config = AppConfig {
        failure_policy: policy,
        ..AppConfig::default()
    };
    let embedder = Arc::new(embedder);
    let relevance = Arc::new(LengthRelevance::default());
    let reasoner = Arc::new(reasoner);
    let vectors = SqliteVectorStore::in_memory().unwrap();

    let services = Services::assemble(
        &config,
        DecisionStore::in_memory().unwrap(),
        embedder.clone(),
        relevance.clone(),
        Arc::new(vectors.clone()),
        reasoner.clone(),
    );
    Pipeline {
        services,
        embedder,
        relevance,
        reasoner,
        vectors,
    }
}

fn input(variant: &str, text: &str) -> ArgumentInput {
    ArgumentInput {
        variant_name: variant.to_string(),
        text: text.to_string(),
        kind: ArgumentType::Pro,
    }
}

fn remote_or_office() -> DecisionSubmission {
    DecisionSubmission {
        context: "Should I switch to remote work or stay in office? My lease ends in March."
            .to_string(),
        variants: vec!["Remote".to_string(), "Office".to_string()],
        arguments: vec![
            input(
                "Remote",
                "I lose two hours of commuting every day, so remote work gives me ten extra hours a week for focused projects.",
            ),
            input(
                "Office",
                "My team solves hard problems faster in person because we can sketch ideas together on the whiteboard.",
            ),
        ],
        selected_variant: None,
    }
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test]
async fn test_remote_or_office_completes() {
    let p = pipeline(
        FailurePolicy::PreserveWithDetail,
        WordEmbedder::default(),
        CannedReasoner::new(remote_office_critique),
    );
    let user = Uuid::new_v4();

    let dispatched = p.services.decisions.submit(remote_or_office(), user).unwrap();
    assert_eq!(dispatched.receipt.status, AnalysisStatus::Pending);
    assert_eq!(dispatched.job.await.unwrap(), RunOutcome::Completed);

    let view = p.services.decisions.status(dispatched.receipt.decision_id, Some(user)).unwrap();
    assert_eq!(view.status, AnalysisStatus::Completed);

    let results = view.results.unwrap();
    let scores = results.ml_scores.unwrap();
    assert_eq!(scores.len(), 2);
    for score in scores.values() {
        assert!((0.0..=100.0).contains(score));
    }
    let analysis = results.llm_analysis.unwrap();
    assert!(analysis["final_note"].as_str().is_some());
    assert!(analysis["key_weak_points_to_reconsider"].as_array().is_some());

    assert_eq!(p.relevance.calls.load(Ordering::SeqCst), 1);
    assert_eq!(p.vectors.count().unwrap(), 1);
}

#[tokio::test]
async fn test_weak_argument_fails_gate_without_downstream_calls() {
    let p = pipeline(
        FailurePolicy::PreserveWithDetail,
        WordEmbedder::default(),
        CannedReasoner::new(remote_office_critique),
    );
    let weak = DecisionSubmission {
        arguments: vec![input("Remote", "Just do it")],
        ..remote_or_office()
    };

    // the boundary refuses it outright
    assert!(matches!(
        p.services.decisions.submit(weak.clone(), Uuid::new_v4()),
        Err(ServiceError::Invalid(SubmissionError::ArgumentTooBrief(3)))
    ));

    // a run that still receives it stops at the gate
    let retriever = Arc::new(ContextRetriever::new(
        p.embedder.clone(),
        Arc::new(p.vectors.clone()),
    ));
    let orchestrator = AnalysisOrchestrator::new(
        p.services.store.clone(),
        PairwiseScorer::new(p.relevance.clone(), ScoringConfig::default()),
        retriever,
        CritiqueGenerator::new(p.reasoner.clone()),
    );
    let id = p.services.store.create(&weak, Uuid::new_v4()).unwrap().id;

    let outcome = orchestrator.run(id, &weak).await;
    assert_eq!(outcome, RunOutcome::Failed { code: "INSUFFICIENT_DATA" });

    let view = p.services.decisions.status(id, None).unwrap();
    assert_eq!(view.status, AnalysisStatus::Failed);
    let detail = view.results.unwrap().llm_analysis.unwrap();
    assert_eq!(detail["error"], "INSUFFICIENT_DATA");
    assert!(detail["invalid_arguments"][0]["reason"]
        .as_str()
        .unwrap()
        .contains("too short"));

    assert_eq!(p.relevance.calls.load(Ordering::SeqCst), 0);
    assert_eq!(p.embedder.calls.load(Ordering::SeqCst), 0);
    assert_eq!(p.reasoner.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_indexing_identical_text_twice_stores_one_point() {
    let vectors = SqliteVectorStore::in_memory().unwrap();
    let retriever =
        ContextRetriever::new(Arc::new(WordEmbedder::default()), Arc::new(vectors.clone()));
    let args: Vec<_> = remote_or_office()
        .arguments
        .iter()
        .map(decisions_architect::Argument::identify)
        .collect();

    let first = retriever.index_decision("a", "Remote or office", &args).await.unwrap();
    let second = retriever.index_decision("b", "Remote or office", &args).await.unwrap();

    assert_eq!(first, IndexOutcome::Indexed);
    assert_eq!(second, IndexOutcome::Duplicate);
    assert_eq!(vectors.count().unwrap(), 1);
}

#[tokio::test]
async fn test_generation_failure_is_reported_as_auth_failure() {
    let p = pipeline(
        FailurePolicy::PreserveWithDetail,
        WordEmbedder::default(),
        CannedReasoner::new(unauthorized),
    );
    let dispatched = p.services.decisions.submit(remote_or_office(), Uuid::new_v4()).unwrap();
    let id = dispatched.receipt.decision_id;

    assert_eq!(
        dispatched.job.await.unwrap(),
        RunOutcome::Failed { code: "LLM_ANALYSIS_FAILED" }
    );
    let detail = p
        .services
        .decisions
        .status(id, None)
        .unwrap()
        .results
        .unwrap()
        .llm_analysis
        .unwrap();
    assert_eq!(detail["error"], "LLM_ANALYSIS_FAILED");
    assert_eq!(detail["category"], "auth_failure");
    assert!(detail["technical_details"].as_str().unwrap().contains("401"));
}

#[tokio::test]
async fn test_rollback_policy_removes_failed_decision() {
    let p = pipeline(
        FailurePolicy::Rollback,
        WordEmbedder::default(),
        CannedReasoner::new(unauthorized),
    );
    let dispatched = p.services.decisions.submit(remote_or_office(), Uuid::new_v4()).unwrap();
    let id = dispatched.receipt.decision_id;

    assert_eq!(
        dispatched.job.await.unwrap(),
        RunOutcome::RolledBack { code: "LLM_ANALYSIS_FAILED" }
    );
    assert!(matches!(p.services.decisions.status(id, None), Err(ServiceError::NotFound)));
    assert_eq!(p.vectors.count().unwrap(), 0);
}

#[tokio::test]
async fn test_broken_embedder_degrades_to_empty_context() {
    let p = pipeline(
        FailurePolicy::PreserveWithDetail,
        WordEmbedder {
            broken: true,
            ..WordEmbedder::default()
        },
        CannedReasoner::new(remote_office_critique),
    );
    let dispatched = p.services.decisions.submit(remote_or_office(), Uuid::new_v4()).unwrap();
    let id = dispatched.receipt.decision_id;

    assert_eq!(dispatched.job.await.unwrap(), RunOutcome::Completed);
    let results = p.services.decisions.status(id, None).unwrap().results.unwrap();
    assert_eq!(results.retrieved_context.unwrap(), Vec::<String>::new());
    assert_eq!(p.vectors.count().unwrap(), 0);
    // one retrieval attempt, one indexing attempt
    assert_eq!(p.embedder.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_history_lists_own_decisions_newest_first() {
    let p = pipeline(
        FailurePolicy::PreserveWithDetail,
        WordEmbedder::default(),
        CannedReasoner::new(remote_office_critique),
    );
    let user = Uuid::new_v4();

    let first = p.services.decisions.submit(remote_or_office(), user).unwrap();
    first.job.await.unwrap();
    let second = p.services.decisions.submit(remote_or_office(), user).unwrap();
    second.job.await.unwrap();
    p.services.decisions.submit(remote_or_office(), Uuid::new_v4()).unwrap().job.await.unwrap();

    let history = p.services.decisions.history(Some(user), 0, 10).unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].id, second.receipt.decision_id);
    assert_eq!(history[1].id, first.receipt.decision_id);
}
