//! Pairwise relevance model
//!
//! Given two context-framed arguments, returns a signed real: positive when
//! the first is the stronger of the two, negative otherwise. The scorer only
//! relies on the sign and magnitude, never on a fixed range.

use crate::embeddings::{load_model, run_blocking};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use ndarray::Array2;
use ort::{inputs, session::Session, value::Tensor};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tokenizers::Tokenizer;

const CROSS_ENCODER_REPO: &str = "cross-encoder/ms-marco-MiniLM-L-12-v2";

/// Pair budget for the cross-encoder, both segments and special tokens included
pub(crate) const CROSS_ENCODER_MAX_LEN: usize = 512;

#[async_trait]
pub trait RelevanceModel: Send + Sync {
    async fn compare(&self, text_a: &str, text_b: &str) -> Result<f64>;
}

/// Cross-encoder scored on the tokenized (a, b) pair; returns the raw logit
#[derive(Clone)]
pub struct OnnxCrossEncoder {
    session: Arc<Mutex<Session>>,
    tokenizer: Arc<Tokenizer>,
}

impl OnnxCrossEncoder {
    pub fn load(model_dir: &Path) -> Result<Self> {
        let (session, tokenizer) =
            load_model(model_dir, CROSS_ENCODER_REPO, CROSS_ENCODER_MAX_LEN)?;
        Ok(Self {
            session: Arc::new(Mutex::new(session)),
            tokenizer: Arc::new(tokenizer),
        })
    }

    fn score_pair(&self, text_a: &str, text_b: &str) -> Result<f64> {
        let encoding = self
            .tokenizer
            .encode((text_a, text_b), true)
            .map_err(|e| anyhow!("Tokenization failed: {}", e))?;

        // truncation configured at load keeps both segments and the closing [SEP]
        let len = encoding.get_ids().len();
        let ids: Vec<i64> = encoding.get_ids().iter().map(|&v| v as i64).collect();
        let mask: Vec<i64> = encoding.get_attention_mask().iter().map(|&v| v as i64).collect();
        let type_ids: Vec<i64> = encoding.get_type_ids().iter().map(|&v| v as i64).collect();

        let input_ids = Array2::from_shape_vec((1, len), ids)?;
        let attention = Array2::from_shape_vec((1, len), mask)?;
        let token_types = Array2::from_shape_vec((1, len), type_ids)?;

        let mut session = self
            .session
            .lock()
            .map_err(|_| anyhow!("cross-encoder session poisoned"))?;

        let outputs = session.run(inputs![
            "input_ids" => Tensor::from_array(input_ids)?,
            "attention_mask" => Tensor::from_array(attention)?,
            "token_type_ids" => Tensor::from_array(token_types)?,
        ])?;

        let logits = outputs
            .get("logits")
            .ok_or_else(|| anyhow!("No logits output found"))?;
        let (_, data) = logits.try_extract_tensor::<f32>()?;
        let raw = data
            .first()
            .copied()
            .ok_or_else(|| anyhow!("Empty logits tensor"))?;

        Ok(raw as f64)
    }
}

#[async_trait]
impl RelevanceModel for OnnxCrossEncoder {
    async fn compare(&self, text_a: &str, text_b: &str) -> Result<f64> {
        let this = self.clone();
        let (text_a, text_b) = (text_a.to_string(), text_b.to_string());
        run_blocking(move || this.score_pair(&text_a, &text_b)).await
    }
}
