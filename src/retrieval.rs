//! Context retrieval over past decisions
//!
//! Each decision is indexed once as a canonical text (context plus every
//! argument). Re-submitting identical text is a no-op thanks to a SHA-256
//! content hash checked before insert.

use crate::embeddings::Embedder;
use crate::types::Argument;
use crate::vectors::{VectorPayload, VectorPoint, VectorStore};
use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Result of an indexing attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexOutcome {
    Indexed,
    /// Identical canonical text already indexed
    Duplicate,
}

pub struct ContextRetriever {
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn VectorStore>,
}

impl ContextRetriever {
    pub fn new(embedder: Arc<dyn Embedder>, store: Arc<dyn VectorStore>) -> Self {
        Self { embedder, store }
    }

    /// Embed and store a decision under its id, unless its canonical text is
    /// already present
    pub async fn index_decision(
        &self,
        decision_id: &str,
        context: &str,
        arguments: &[Argument],
    ) -> Result<IndexOutcome> {
        let canonical = canonical_text(context, arguments);
        let hash = content_hash(&canonical);

        if self.store.exists_with_hash(&hash).await? {
            debug!(decision = decision_id, hash = %hash, "canonical text already indexed");
            return Ok(IndexOutcome::Duplicate);
        }

        let vector = self
            .embedder
            .embed(&canonical)
            .await
            .context("failed to embed canonical text")?;

        self.store
            .upsert(VectorPoint {
                id: decision_id.to_string(),
                vector,
                payload: VectorPayload {
                    decision_id: decision_id.to_string(),
                    canonical_text: canonical,
                    content_hash: hash,
                },
            })
            .await?;

        info!(decision = decision_id, "decision indexed");
        Ok(IndexOutcome::Indexed)
    }

    /// Canonical texts of the `top_k` most similar past decisions, most
    /// relevant first. An empty store yields an empty list.
    pub async fn simple_retrieval(&self, query: &str, top_k: usize) -> Result<Vec<String>> {
        if top_k == 0 {
            return Ok(Vec::new());
        }

        let vector = self
            .embedder
            .embed(query)
            .await
            .context("failed to embed retrieval query")?;

        let hits = self.store.query(&vector, top_k).await?;
        Ok(hits
            .into_iter()
            .map(|hit| hit.payload.canonical_text)
            .filter(|text| !text.is_empty())
            .collect())
    }

    /// Best-effort removal of a decision's vectors; failures are only logged
    pub async fn delete_decision_vectors(&self, decision_id: &str) {
        match self.store.delete(&[decision_id.to_string()]).await {
            Ok(()) => info!(decision = decision_id, "deleted decision vectors"),
            Err(e) => {
                warn!(decision = decision_id, error = %e, "failed to delete decision vectors")
            }
        }
    }
}

/// Unit of semantic indexing: the context followed by every argument
pub fn canonical_text(context: &str, arguments: &[Argument]) -> String {
    let mut text = format!("Context: {}", context);
    for arg in arguments {
        text.push_str("\n- ");
        text.push_str(&arg.text);
    }
    text
}

/// Query used to look up related history for a new decision
pub fn retrieval_query(context: &str, arguments: &[Argument]) -> String {
    let mut query = context.to_string();
    for arg in arguments {
        query.push('\n');
        query.push_str(&arg.text);
    }
    query
}

/// SHA-256 hex digest
pub fn content_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    hex::encode(hasher.finalize())
}
