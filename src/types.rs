//! Core types for the decision analysis pipeline
//!
//! A decision is the user's framing of a choice: a context, a handful of
//! named variants, and pro/con arguments attached to those variants. The
//! critique types mirror the JSON object the reasoning engine must return:
//! keys stay English, values are in the user's language.

use crate::error::SubmissionError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use uuid::Uuid;

pub const MAX_VARIANTS: usize = 5;
pub const MAX_VARIANT_NAME_LEN: usize = 100;
pub const MAX_ARGUMENTS: usize = 20;
pub const MAX_ARGUMENT_LEN: usize = 2000;
pub const MIN_ARGUMENT_WORDS: usize = 5;
pub const MIN_CONTEXT_LEN: usize = 20;
pub const MAX_CONTEXT_LEN: usize = 5000;
pub const MIN_CONTEXT_WORDS: usize = 10;

/// Lifecycle of one analysis run
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisStatus {
    Pending,
    Analyzing,
    Completed,
    Failed,
}

impl AnalysisStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Analyzing => "analyzing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "analyzing" => Some(Self::Analyzing),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    /// Completed and failed runs never transition again
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// Whether an argument supports or opposes its variant
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ArgumentType {
    Pro,
    Con,
}

impl ArgumentType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pro => "pro",
            Self::Con => "con",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "pro" => Some(Self::Pro),
            "con" => Some(Self::Con),
            _ => None,
        }
    }

    /// Tag used in the critique transcript
    pub fn label(self) -> &'static str {
        match self {
            Self::Pro => "PRO",
            Self::Con => "CON",
        }
    }
}

/// An argument as submitted, before a run assigns it an identifier
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ArgumentInput {
    pub variant_name: String,
    pub text: String,
    #[serde(rename = "type")]
    pub kind: ArgumentType,
}

/// An argument inside a run. The id is assigned once when the run starts and
/// is the only key used for scores, transcript lines, and indexing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Argument {
    pub id: String,
    pub variant_name: String,
    pub text: String,
    #[serde(rename = "type")]
    pub kind: ArgumentType,
}

impl Argument {
    /// Assign a fresh run-scoped identifier to a submitted argument
    pub fn identify(input: &ArgumentInput) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            variant_name: input.variant_name.clone(),
            text: input.text.clone(),
            kind: input.kind,
        }
    }
}

/// Decision submission payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionSubmission {
    pub context: String,
    pub variants: Vec<String>,
    pub arguments: Vec<ArgumentInput>,
    #[serde(default)]
    pub selected_variant: Option<String>,
}

impl DecisionSubmission {
    /// Check the payload against the submission rules and return it with
    /// context and variant names trimmed.
    pub fn validate(self) -> Result<Self, SubmissionError> {
        let context = self.context.trim().to_string();
        let context_len = context.chars().count();
        if context_len < MIN_CONTEXT_LEN || context_len > MAX_CONTEXT_LEN {
            return Err(SubmissionError::ContextLength(context_len));
        }
        let context_words = context.split_whitespace().count();
        if context_words < MIN_CONTEXT_WORDS {
            return Err(SubmissionError::ContextTooBrief(context_words));
        }

        if self.variants.is_empty() || self.variants.len() > MAX_VARIANTS {
            return Err(SubmissionError::VariantCount(self.variants.len()));
        }
        let mut seen = HashSet::new();
        let mut variants = Vec::with_capacity(self.variants.len());
        for name in &self.variants {
            let name = name.trim();
            if name.is_empty() {
                return Err(SubmissionError::EmptyVariant);
            }
            if name.chars().count() > MAX_VARIANT_NAME_LEN {
                return Err(SubmissionError::VariantTooLong(name.to_string()));
            }
            if !seen.insert(name.to_string()) {
                return Err(SubmissionError::DuplicateVariant(name.to_string()));
            }
            variants.push(name.to_string());
        }

        if self.arguments.is_empty() || self.arguments.len() > MAX_ARGUMENTS {
            return Err(SubmissionError::ArgumentCount(self.arguments.len()));
        }
        for arg in &self.arguments {
            if arg.text.trim().is_empty() {
                return Err(SubmissionError::EmptyArgument);
            }
            if arg.text.chars().count() > MAX_ARGUMENT_LEN {
                return Err(SubmissionError::ArgumentTooLong(arg.text.chars().count()));
            }
            let words = arg.text.split_whitespace().count();
            if words < MIN_ARGUMENT_WORDS {
                return Err(SubmissionError::ArgumentTooBrief(words));
            }
            if !seen.contains(&arg.variant_name) {
                return Err(SubmissionError::UnknownVariant(arg.variant_name.clone()));
            }
        }

        let selected_variant = self
            .selected_variant
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());

        Ok(Self {
            context,
            variants,
            arguments: self.arguments,
            selected_variant,
        })
    }
}

/// A persisted decision with its analysis results
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionRecord {
    pub id: Uuid,
    pub user_id: Uuid,
    pub context: String,
    pub variants: Vec<String>,
    pub arguments: Vec<ArgumentInput>,
    pub selected_variant: Option<String>,
    pub outcome: Option<String>,
    pub status: AnalysisStatus,
    pub ml_scores: Option<BTreeMap<String, f64>>,
    pub llm_analysis: Option<serde_json::Value>,
    pub retrieved_context: Option<Vec<String>>,
    pub created_at: DateTime<Utc>,
}

impl DecisionRecord {
    /// Rebuild the submission that produced this record
    pub fn submission(&self) -> DecisionSubmission {
        DecisionSubmission {
            context: self.context.clone(),
            variants: self.variants.clone(),
            arguments: self.arguments.clone(),
            selected_variant: self.selected_variant.clone(),
        }
    }

    pub fn status_view(&self) -> StatusView {
        let results = if self.status.is_terminal() {
            Some(AnalysisResults {
                ml_scores: self.ml_scores.clone(),
                llm_analysis: self.llm_analysis.clone(),
                retrieved_context: self.retrieved_context.clone(),
            })
        } else {
            None
        };

        StatusView {
            decision_id: self.id,
            status: self.status,
            results,
        }
    }
}

/// Status read model returned to pollers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusView {
    pub decision_id: Uuid,
    pub status: AnalysisStatus,
    pub results: Option<AnalysisResults>,
}

/// Results block; on failure `llm_analysis` carries a [`FailureDetail`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisResults {
    pub ml_scores: Option<BTreeMap<String, f64>>,
    pub llm_analysis: Option<serde_json::Value>,
    pub retrieved_context: Option<Vec<String>>,
}

/// Returned to the submitter before the run has done anything
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmissionReceipt {
    pub decision_id: Uuid,
    pub status: AnalysisStatus,
    pub message: String,
}

/// An argument rejected by the quality gate
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InvalidArgument {
    pub variant: String,
    pub text: String,
    pub reason: String,
}

/// Structured failure stored in place of a critique
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailureDetail {
    pub error: String,
    pub user_message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub technical_details: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<crate::error::FailureCategory>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub invalid_arguments: Option<Vec<InvalidArgument>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quality_score: Option<f64>,
}

// ============================================================================
// Critique schema
// ============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DataQuality {
    Sufficient,
    InsufficientReasoning,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ConfidenceLevel {
    High,
    Medium,
    Low,
}

/// A fallacy is either a bare description or a quoted breakdown
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum LogicalFallacy {
    Detailed {
        #[serde(rename = "type")]
        kind: String,
        quote: String,
        explanation: String,
    },
    Plain(String),
}

/// Per-variant assessment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VariantAssessment {
    #[serde(default)]
    pub strengths: Vec<String>,
    #[serde(default)]
    pub weaknesses: Vec<String>,
    #[serde(default)]
    pub logical_fallacies: Vec<LogicalFallacy>,
    #[serde(default)]
    pub missing_considerations: Vec<String>,
    pub data_quality: DataQuality,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ScoreDetails {
    pub logic_stability: f64,
    pub data_grounding: f64,
    pub historical_consistency: f64,
}

/// Contradiction between a current argument and a retrieved past statement
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemicInconsistency {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub past_decision_id: Option<String>,
    pub past_statement: String,
    pub current_statement: String,
    pub conflict_description: String,
}

/// The structured critique produced by the reasoning engine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Critique {
    pub argument_quality_comparison: BTreeMap<String, VariantAssessment>,
    #[serde(default)]
    pub cognitive_biases_detected: Vec<String>,
    pub alignment_with_model_scores: String,
    pub detected_reasoning_patterns: String,
    pub key_weak_points_to_reconsider: Vec<String>,
    pub final_note: String,
    pub score_details: ScoreDetails,
    pub confidence_level: ConfidenceLevel,
    #[serde(default)]
    pub systemic_inconsistencies: Vec<SystemicInconsistency>,
}

impl Critique {
    /// Reject critiques that parse but break the schema's value constraints
    pub fn check(&self, variants: &[String]) -> Result<(), String> {
        let details = [
            ("logic_stability", self.score_details.logic_stability),
            ("data_grounding", self.score_details.data_grounding),
            ("historical_consistency", self.score_details.historical_consistency),
        ];
        for (name, value) in details {
            if !(0.0..=1.0).contains(&value) {
                return Err(format!("score_details.{} out of range: {}", name, value));
            }
        }

        for key in self.argument_quality_comparison.keys() {
            if !variants.iter().any(|v| v == key) {
                return Err(format!(
                    "argument_quality_comparison keyed by unknown variant '{}'",
                    key
                ));
            }
        }

        Ok(())
    }
}
