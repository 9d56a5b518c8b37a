//! Local embedding model for semantic retrieval
//!
//! Canonical decision texts and retrieval queries are embedded with
//! all-MiniLM-L6-v2 through ONNX Runtime (384 dimensions, CPU only).
//! The model is downloaded from HuggingFace on first use.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use ndarray::Array2;
use ort::{inputs, session::{builder::GraphOptimizationLevel, Session}, value::Tensor};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tokenizers::{Tokenizer, TruncationParams, TruncationStrategy};

/// Embedding dimensions for all-MiniLM-L6-v2
pub const EMBEDDING_DIM: usize = 384;

/// Maximum sequence length for the embedding model, special tokens included
pub(crate) const MAX_SEQ_LEN: usize = 256;

const EMBEDDING_REPO: &str = "sentence-transformers/all-MiniLM-L6-v2";

/// Turns text into a fixed-dimension dense vector
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    fn dimension(&self) -> usize;
}

/// ONNX-backed sentence embedder
#[derive(Clone)]
pub struct OnnxEmbedder {
    session: Arc<Mutex<Session>>,
    tokenizer: Arc<Tokenizer>,
}

impl OnnxEmbedder {
    /// Load the model from `model_dir`, downloading it first if missing
    pub fn load(model_dir: &Path) -> Result<Self> {
        let (session, tokenizer) = load_model(model_dir, EMBEDDING_REPO, MAX_SEQ_LEN)?;
        Ok(Self {
            session: Arc::new(Mutex::new(session)),
            tokenizer: Arc::new(tokenizer),
        })
    }

    fn embed_blocking(&self, text: &str) -> Result<Vec<f32>> {
        let encoding = self
            .tokenizer
            .encode(text, true)
            .map_err(|e| anyhow!("Tokenization failed: {}", e))?;

        let len = encoding.get_ids().len();
        let ids: Vec<i64> = encoding.get_ids().iter().map(|&id| id as i64).collect();
        let mask: Vec<i64> = encoding.get_attention_mask().iter().map(|&m| m as i64).collect();
        let token_types = vec![0i64; len];

        let input_ids = Array2::from_shape_vec((1, len), ids)?;
        let attention = Array2::from_shape_vec((1, len), mask)?;
        let token_types = Array2::from_shape_vec((1, len), token_types)?;

        let mut session = self
            .session
            .lock()
            .map_err(|_| anyhow!("embedding session poisoned"))?;

        let outputs = session.run(inputs![
            "input_ids" => Tensor::from_array(input_ids)?,
            "attention_mask" => Tensor::from_array(attention)?,
            "token_type_ids" => Tensor::from_array(token_types)?,
        ])?;

        let output = outputs
            .get("last_hidden_state")
            .or_else(|| outputs.get("token_embeddings"))
            .ok_or_else(|| anyhow!("No embedding output found"))?;

        // shape [1, seq_len, embedding_dim], row-major
        let (shape, data) = output.try_extract_tensor::<f32>()?;
        let shape: Vec<i64> = shape.iter().copied().collect();
        let data = data.to_vec();
        drop(outputs);

        Ok(l2_normalize(&mean_pool_flat(&data, len, &shape)))
    }
}

#[async_trait]
impl Embedder for OnnxEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let this = self.clone();
        let text = text.to_string();
        run_blocking(move || this.embed_blocking(&text)).await
    }

    fn dimension(&self) -> usize {
        EMBEDDING_DIM
    }
}

/// Run CPU-bound inference on the blocking pool so runtime workers stay free
pub(crate) async fn run_blocking<T, F>(work: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .context("inference task panicked")?
}

/// Cap encodings at `max_length` tokens. Pairs are trimmed longest first and
/// special tokens are always kept.
pub(crate) fn truncate_to(tokenizer: &mut Tokenizer, max_length: usize) -> Result<()> {
    tokenizer
        .with_truncation(Some(TruncationParams {
            max_length,
            strategy: TruncationStrategy::LongestFirst,
            ..TruncationParams::default()
        }))
        .map_err(|e| anyhow!("Failed to configure truncation: {}", e))?;
    Ok(())
}

/// Load an ONNX model and its tokenizer, fetching both from `repo_id` when
/// `model_dir` does not have them yet
pub(crate) fn load_model(
    model_dir: &Path,
    repo_id: &str,
    max_length: usize,
) -> Result<(Session, Tokenizer)> {
    std::fs::create_dir_all(model_dir)
        .with_context(|| format!("Failed to create model dir {:?}", model_dir))?;

    let model_path = model_dir.join("model.onnx");
    let tokenizer_path = model_dir.join("tokenizer.json");

    if !model_path.exists() || !tokenizer_path.exists() {
        download_model(model_dir, repo_id)?;
    }

    let session = Session::builder()?
        .with_optimization_level(GraphOptimizationLevel::Level3)
        .map_err(<ort::Error>::from)?
        .with_intra_threads(4)
        .map_err(<ort::Error>::from)?
        .commit_from_file(&model_path)
        .with_context(|| format!("Failed to load ONNX model {:?}", model_path))?;

    let mut tokenizer = Tokenizer::from_file(&tokenizer_path)
        .map_err(|e| anyhow!("Failed to load tokenizer: {}", e))?;
    truncate_to(&mut tokenizer, max_length)?;

    Ok((session, tokenizer))
}

fn download_model(model_dir: &Path, repo_id: &str) -> Result<()> {
    use hf_hub::api::sync::Api;

    tracing::info!(repo = repo_id, "downloading model");
    let api = Api::new()?;
    let repo = api.model(repo_id.to_string());

    let model_path = repo.get("onnx/model.onnx")?;
    std::fs::copy(&model_path, model_dir.join("model.onnx"))?;

    let tokenizer_path = repo.get("tokenizer.json")?;
    std::fs::copy(&tokenizer_path, model_dir.join("tokenizer.json"))?;

    tracing::info!(repo = repo_id, dir = ?model_dir, "model downloaded");
    Ok(())
}

/// Mean pooling over the sequence dimension of a flat [1, seq, dim] tensor
fn mean_pool_flat(data: &[f32], seq_len: usize, shape: &[i64]) -> Vec<f32> {
    let mut result = vec![0.0f32; EMBEDDING_DIM];
    if seq_len == 0 {
        return result;
    }

    let embed_dim = if shape.len() >= 3 { shape[2] as usize } else { EMBEDDING_DIM };

    for i in 0..seq_len {
        for j in 0..embed_dim.min(EMBEDDING_DIM) {
            let idx = i * embed_dim + j;
            if idx < data.len() {
                result[j] += data[idx];
            }
        }
    }

    for v in result.iter_mut() {
        *v /= seq_len as f32;
    }

    result
}

/// L2 normalize a vector
pub fn l2_normalize(vec: &[f32]) -> Vec<f32> {
    let norm: f32 = vec.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        vec.iter().map(|x| x / norm).collect()
    } else {
        vec.to_vec()
    }
}

/// Cosine similarity; 0 when either vector is all zeros
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}
