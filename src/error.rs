//! Error taxonomy for the analysis pipeline
//!
//! | Kind               | Terminal | Persisted code        |
//! |--------------------|----------|-----------------------|
//! | InsufficientData   | yes      | `INSUFFICIENT_DATA`   |
//! | ScoringFailure     | yes      | `ML_SCORING_FAILED`   |
//! | RetrievalFailure   | no       | `RETRIEVAL_FAILED`    |
//! | GenerationFailure  | yes      | `LLM_ANALYSIS_FAILED` |
//! | IndexingFailure    | no       | `INDEXING_FAILED`     |
//! | Unexpected         | yes      | `UNEXPECTED_ERROR`    |
//!
//! Reasoning-engine errors carry an explicit kind so the orchestrator can
//! pick a user-facing message without inspecting error text.

use crate::quality::ValidationReport;
use crate::types::FailureDetail;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// User-facing category of a generation failure
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FailureCategory {
    RateLimited,
    Timeout,
    AuthFailure,
    Unknown,
}

impl FailureCategory {
    pub fn user_message(self) -> &'static str {
        match self {
            Self::RateLimited => {
                "The analysis service is overloaded right now. Please try again in a minute."
            }
            Self::Timeout => {
                "The analysis took too long. Try shortening your arguments or submit again."
            }
            Self::AuthFailure => {
                "The analysis service is temporarily unreachable on our side. Please try again later."
            }
            Self::Unknown => {
                "The analysis service is temporarily unavailable. Please try again in a minute."
            }
        }
    }
}

/// Failure returned by a reasoning engine
#[derive(Debug, Error)]
pub enum ReasoningError {
    #[error("reasoning engine rate limited: {0}")]
    RateLimited(String),
    #[error("reasoning engine timed out: {0}")]
    Timeout(String),
    #[error("reasoning engine rejected credentials: {0}")]
    Authentication(String),
    #[error("reasoning engine returned an invalid response: {0}")]
    InvalidResponse(String),
    #[error("reasoning engine failed: {0}")]
    Other(String),
}

impl ReasoningError {
    pub fn category(&self) -> FailureCategory {
        match self {
            Self::RateLimited(_) => FailureCategory::RateLimited,
            Self::Timeout(_) => FailureCategory::Timeout,
            Self::Authentication(_) => FailureCategory::AuthFailure,
            Self::InvalidResponse(_) | Self::Other(_) => FailureCategory::Unknown,
        }
    }
}

/// Everything that can go wrong during one analysis run
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error(
        "insufficient argument quality: {} of {} arguments valid",
        .0.valid_arguments,
        .0.total_arguments
    )]
    InsufficientData(ValidationReport),
    #[error("argument scoring failed: {0:#}")]
    ScoringFailure(anyhow::Error),
    #[error("context retrieval failed: {0:#}")]
    RetrievalFailure(anyhow::Error),
    #[error("critique generation failed: {0}")]
    GenerationFailure(#[from] ReasoningError),
    #[error("decision indexing failed: {0:#}")]
    IndexingFailure(anyhow::Error),
    #[error("unexpected error: {0:#}")]
    Unexpected(anyhow::Error),
}

impl AnalysisError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::InsufficientData(_) => "INSUFFICIENT_DATA",
            Self::ScoringFailure(_) => "ML_SCORING_FAILED",
            Self::RetrievalFailure(_) => "RETRIEVAL_FAILED",
            Self::GenerationFailure(_) => "LLM_ANALYSIS_FAILED",
            Self::IndexingFailure(_) => "INDEXING_FAILED",
            Self::Unexpected(_) => "UNEXPECTED_ERROR",
        }
    }

    /// Terminal errors end the run; the rest degrade it
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::RetrievalFailure(_) | Self::IndexingFailure(_))
    }

    /// Detail persisted in place of the critique
    pub fn failure_detail(&self) -> FailureDetail {
        let mut detail = FailureDetail {
            error: self.code().to_string(),
            user_message: String::new(),
            technical_details: None,
            category: None,
            invalid_arguments: None,
            quality_score: None,
        };

        match self {
            Self::InsufficientData(report) => {
                detail.user_message = "Some arguments lack sufficient reasoning".to_string();
                detail.invalid_arguments = Some(report.invalid_arguments.clone());
                detail.quality_score = Some(report.quality_score);
            }
            Self::ScoringFailure(_) => {
                detail.user_message =
                    "Argument quality could not be scored. Please try again in a minute.".to_string();
                detail.technical_details = Some(self.to_string());
            }
            Self::GenerationFailure(err) => {
                let category = err.category();
                detail.user_message = category.user_message().to_string();
                detail.category = Some(category);
                detail.technical_details = Some(err.to_string());
            }
            Self::RetrievalFailure(_) | Self::IndexingFailure(_) | Self::Unexpected(_) => {
                detail.user_message =
                    "Something unexpected went wrong. Please try again later.".to_string();
                detail.technical_details = Some(self.to_string());
            }
        }

        detail
    }
}

/// Submission payload rejected at the boundary
#[derive(Debug, Error, PartialEq)]
pub enum SubmissionError {
    #[error("context must be between 20 and 5000 characters (got {0})")]
    ContextLength(usize),
    #[error("context must contain at least 10 words (got {0})")]
    ContextTooBrief(usize),
    #[error("between 1 and 5 variants are required (got {0})")]
    VariantCount(usize),
    #[error("variants cannot be empty")]
    EmptyVariant,
    #[error("variant name too long (max 100 characters): {0}")]
    VariantTooLong(String),
    #[error("variant names must be unique: {0}")]
    DuplicateVariant(String),
    #[error("between 1 and 20 arguments are required (got {0})")]
    ArgumentCount(usize),
    #[error("arguments cannot be empty")]
    EmptyArgument,
    #[error("argument text too long (max 2000 characters, got {0})")]
    ArgumentTooLong(usize),
    #[error("each argument must contain at least 5 words (got {0})")]
    ArgumentTooBrief(usize),
    #[error("argument references unknown variant: {0}")]
    UnknownVariant(String),
}

/// Errors surfaced by the decision service to its callers
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Invalid(#[from] SubmissionError),
    #[error("decision not found")]
    NotFound,
    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}
