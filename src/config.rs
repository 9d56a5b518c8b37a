//! Runtime configuration
//!
//! Everything is read from environment variables with sensible defaults, so
//! the binary runs with no configuration beyond `ANTHROPIC_API_KEY`.

use crate::orchestrator::FailurePolicy;
use crate::reasoning::ReasonerConfig;
use crate::scoring::ScoringConfig;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_TOP_K: usize = 3;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub data_dir: PathBuf,
    /// Decision records
    pub db_path: PathBuf,
    /// Vector index of canonical decision texts
    pub vector_db_path: PathBuf,
    pub embedding_model_dir: PathBuf,
    pub cross_encoder_dir: PathBuf,
    pub reasoner: ReasonerConfig,
    pub scoring: ScoringConfig,
    pub retrieval_top_k: usize,
    pub failure_policy: FailurePolicy,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let data_dir = env_path("DECISIONS_DATA_DIR").unwrap_or_else(default_data_dir);

        let mut reasoner = ReasonerConfig::default();
        if let Ok(key) = std::env::var("ANTHROPIC_API_KEY") {
            reasoner.api_key = key;
        }
        if let Ok(model) = std::env::var("DECISIONS_LLM_MODEL") {
            reasoner.model = model;
        }
        if let Ok(url) = std::env::var("DECISIONS_LLM_URL") {
            reasoner.api_url = url;
        }
        if let Some(secs) = env_parse::<u64>("DECISIONS_LLM_TIMEOUT_SECS") {
            reasoner.timeout = Duration::from_secs(secs);
        }

        let mut scoring = ScoringConfig::default();
        if let Some(seed) = env_parse::<u64>("DECISIONS_SCORING_SEED") {
            scoring.seed = seed;
        }

        let failure_policy = match std::env::var("DECISIONS_FAILURE_POLICY") {
            Ok(raw) => FailurePolicy::from_str(&raw).unwrap_or_else(|| {
                tracing::warn!(value = %raw, "unknown failure policy, keeping detail");
                FailurePolicy::default()
            }),
            Err(_) => FailurePolicy::default(),
        };

        Self {
            db_path: env_path("DECISIONS_DB_PATH").unwrap_or_else(|| data_dir.join("decisions.db")),
            vector_db_path: data_dir.join("vectors.db"),
            embedding_model_dir: env_path("DECISIONS_MODEL_DIR")
                .unwrap_or_else(|| data_dir.join("models").join("minilm")),
            cross_encoder_dir: env_path("DECISIONS_CROSS_ENCODER_DIR")
                .unwrap_or_else(|| data_dir.join("models").join("cross-encoder")),
            data_dir,
            reasoner,
            scoring,
            retrieval_top_k: env_parse("DECISIONS_RETRIEVAL_TOP_K").unwrap_or(DEFAULT_TOP_K),
            failure_policy,
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

/// `<platform data dir>/decisions-architect`
pub fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("decisions-architect")
}

fn env_path(key: &str) -> Option<PathBuf> {
    std::env::var(key).ok().filter(|v| !v.is_empty()).map(PathBuf::from)
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}
