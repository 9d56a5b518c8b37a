//! In-process collaborators for unit tests

use crate::embeddings::{l2_normalize, Embedder};
use crate::error::ReasoningError;
use crate::reasoning::ReasoningEngine;
use crate::relevance::RelevanceModel;
use crate::types::{Argument, ArgumentType};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use tokenizers::Tokenizer;
use uuid::Uuid;

const HASH_DIM: usize = 256;

/// BERT-shaped word-level tokenizer: [CLS]=1, [SEP]=2, pairs typed 0/1
pub fn bert_like_tokenizer() -> Tokenizer {
    let json = r#"{
        "version": "1.0",
        "truncation": null,
        "padding": null,
        "added_tokens": [],
        "normalizer": null,
        "pre_tokenizer": { "type": "Whitespace" },
        "post_processor": {
            "type": "TemplateProcessing",
            "single": [
                { "SpecialToken": { "id": "[CLS]", "type_id": 0 } },
                { "Sequence": { "id": "A", "type_id": 0 } },
                { "SpecialToken": { "id": "[SEP]", "type_id": 0 } }
            ],
            "pair": [
                { "SpecialToken": { "id": "[CLS]", "type_id": 0 } },
                { "Sequence": { "id": "A", "type_id": 0 } },
                { "SpecialToken": { "id": "[SEP]", "type_id": 0 } },
                { "Sequence": { "id": "B", "type_id": 1 } },
                { "SpecialToken": { "id": "[SEP]", "type_id": 1 } }
            ],
            "special_tokens": {
                "[CLS]": { "id": "[CLS]", "ids": [1], "tokens": ["[CLS]"] },
                "[SEP]": { "id": "[SEP]", "ids": [2], "tokens": ["[SEP]"] }
            }
        },
        "decoder": null,
        "model": {
            "type": "WordLevel",
            "vocab": { "[UNK]": 0, "[CLS]": 1, "[SEP]": 2, "word": 3, "other": 4 },
            "unk_token": "[UNK]"
        }
    }"#;
    json.parse().expect("fixture tokenizer json")
}

/// A pro argument with a fresh id
pub fn argument(variant: &str, text: &str) -> Argument {
    Argument {
        id: Uuid::new_v4().to_string(),
        variant_name: variant.to_string(),
        text: text.to_string(),
        kind: ArgumentType::Pro,
    }
}

/// Well-formed critique JSON keyed by the given variants
pub fn critique_json(variants: &[&str]) -> String {
    let comparison: serde_json::Map<String, serde_json::Value> = variants
        .iter()
        .map(|v| {
            (
                v.to_string(),
                serde_json::json!({
                    "strengths": [format!("'{}' has a concrete benefit", v)],
                    "weaknesses": ["no numbers given"],
                    "logical_fallacies": [],
                    "missing_considerations": ["long-term cost"],
                    "data_quality": "SUFFICIENT"
                }),
            )
        })
        .collect();

    serde_json::json!({
        "argument_quality_comparison": comparison,
        "cognitive_biases_detected": [],
        "alignment_with_model_scores": "Scores match the depth of the arguments.",
        "detected_reasoning_patterns": "Mostly convenience driven.",
        "key_weak_points_to_reconsider": ["'no commute' - time saved is not quantified"],
        "final_note": "Reasoning is plausible but thin on evidence.",
        "score_details": {"logic_stability": 0.7, "data_grounding": 0.4, "historical_consistency": 0.9},
        "confidence_level": "medium",
        "systemic_inconsistencies": []
    })
    .to_string()
}

enum RelevanceMode {
    Constant(f64),
    ByLength,
}

/// Relevance model that records every comparison
pub struct CountingRelevance {
    mode: RelevanceMode,
    seen: Mutex<Vec<(String, String)>>,
}

impl CountingRelevance {
    pub fn constant(value: f64) -> Self {
        Self::with_mode(RelevanceMode::Constant(value))
    }

    /// Longer text wins
    pub fn by_length() -> Self {
        Self::with_mode(RelevanceMode::ByLength)
    }

    fn with_mode(mode: RelevanceMode) -> Self {
        Self {
            mode,
            seen: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.seen.lock().unwrap().len()
    }

    pub fn seen(&self) -> Vec<(String, String)> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl RelevanceModel for CountingRelevance {
    async fn compare(&self, text_a: &str, text_b: &str) -> Result<f64> {
        self.seen
            .lock()
            .unwrap()
            .push((text_a.to_string(), text_b.to_string()));
        Ok(match self.mode {
            RelevanceMode::Constant(value) => value,
            RelevanceMode::ByLength => (text_a.len() as f64 - text_b.len() as f64) / 50.0,
        })
    }
}

pub struct FailingRelevance;

#[async_trait]
impl RelevanceModel for FailingRelevance {
    async fn compare(&self, _text_a: &str, _text_b: &str) -> Result<f64> {
        Err(anyhow!("cross-encoder unavailable"))
    }
}

pub struct PanickingRelevance;

#[async_trait]
impl RelevanceModel for PanickingRelevance {
    async fn compare(&self, _text_a: &str, _text_b: &str) -> Result<f64> {
        panic!("relevance model crashed");
    }
}

/// Bag-of-words embedder: tokens hashed into buckets, then normalised
#[derive(Default)]
pub struct HashEmbedder {
    calls: AtomicUsize,
}

impl HashEmbedder {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Embedder for HashEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut vector = vec![0.0f32; HASH_DIM];
        for token in text
            .to_lowercase()
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            vector[fnv1a(token) % HASH_DIM] += 1.0;
        }
        Ok(l2_normalize(&vector))
    }

    fn dimension(&self) -> usize {
        HASH_DIM
    }
}

fn fnv1a(token: &str) -> usize {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for byte in token.bytes() {
        hash ^= byte as u64;
        hash = hash.wrapping_mul(0x0100_0000_01b3);
    }
    hash as usize
}

pub struct FailingEmbedder;

#[async_trait]
impl Embedder for FailingEmbedder {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        Err(anyhow!("embedding model unavailable"))
    }

    fn dimension(&self) -> usize {
        HASH_DIM
    }
}

/// Reasoning engine with a fixed reply, recording each request
pub struct ScriptedReasoner {
    reply: Box<dyn Fn() -> std::result::Result<String, ReasoningError> + Send + Sync>,
    requests: Mutex<Vec<(String, String)>>,
}

impl ScriptedReasoner {
    pub fn replying(json: impl Into<String>) -> Self {
        let json = json.into();
        Self {
            reply: Box::new(move || Ok(json.clone())),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(make: fn() -> ReasoningError) -> Self {
        Self {
            reply: Box::new(move || Err(make())),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn last_request(&self) -> Option<(String, String)> {
        self.requests.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl ReasoningEngine for ScriptedReasoner {
    async fn complete(
        &self,
        system_prompt: &str,
        transcript: &str,
    ) -> std::result::Result<String, ReasoningError> {
        self.requests
            .lock()
            .unwrap()
            .push((system_prompt.to_string(), transcript.to_string()));
        (self.reply)()
    }
}
