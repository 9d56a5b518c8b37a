//! Argument quality gate
//!
//! Runs before any model is touched. An argument must clear a minimum
//! evidentiary bar (length and word count) or the whole run is rejected.
//! [`assess_argument_quality`] is the continuous heuristic reused by the
//! scorer as its absolute component.

use crate::types::{Argument, InvalidArgument};
use serde::{Deserialize, Serialize};

pub const MIN_ARGUMENT_LENGTH: usize = 50;
pub const MIN_WORD_COUNT: usize = 10;

/// Length of the excerpt kept for rejected arguments
const EXCERPT_CHARS: usize = 50;

/// Reasoning connectives (English and Russian)
const REASONING_KEYWORDS: &[&str] = &[
    "because",
    "since",
    "therefore",
    "thus",
    "hence",
    "so",
    "as a result",
    "consequently",
    "due to",
    "given that",
    "considering",
    "leads to",
    "results in",
    "causes",
    "потому что",
    "так как",
    "поэтому",
    "следовательно",
    "в результате",
    "из-за",
    "благодаря",
    "ведь",
];

/// Evidence markers (English and Russian)
const EVIDENCE_MARKERS: &[&str] = &[
    "data",
    "research",
    "study",
    "evidence",
    "example",
    "данные",
    "исследование",
    "пример",
    "факт",
];

/// Outcome of gating a whole argument set
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationReport {
    pub is_valid: bool,
    pub invalid_arguments: Vec<InvalidArgument>,
    /// valid / total, 0 for an empty set
    pub quality_score: f64,
    pub total_arguments: usize,
    pub valid_arguments: usize,
}

/// Check a single argument. `Err` carries the human-readable reason.
pub fn validate_argument(text: &str) -> Result<(), String> {
    let text = text.trim();

    let length = text.chars().count();
    if length < MIN_ARGUMENT_LENGTH {
        return Err(format!(
            "Argument too short ({} chars, min {})",
            length, MIN_ARGUMENT_LENGTH
        ));
    }

    let word_count = text.split_whitespace().count();
    if word_count < MIN_WORD_COUNT {
        return Err(format!(
            "Argument too brief ({} words, min {})",
            word_count, MIN_WORD_COUNT
        ));
    }

    Ok(())
}

/// Gate every argument of a run
pub fn validate_arguments(arguments: &[Argument]) -> ValidationReport {
    let mut invalid_arguments = Vec::new();

    for arg in arguments {
        if let Err(reason) = validate_argument(&arg.text) {
            invalid_arguments.push(InvalidArgument {
                variant: arg.variant_name.clone(),
                text: excerpt(&arg.text),
                reason,
            });
        }
    }

    let total_arguments = arguments.len();
    let valid_arguments = total_arguments - invalid_arguments.len();
    let quality_score = if total_arguments > 0 {
        valid_arguments as f64 / total_arguments as f64
    } else {
        0.0
    };

    ValidationReport {
        is_valid: invalid_arguments.is_empty(),
        invalid_arguments,
        quality_score,
        total_arguments,
        valid_arguments,
    }
}

/// Continuous quality heuristic in [0, 1]
///
/// Additive tiers, capped at 1.0:
/// - length: 0.3 for >= 200 chars, 0.2 for >= 100, 0.1 for >= 50
/// - reasoning connectives present: 0.3 for >= 3, 0.2 for 2, 0.1 for 1
/// - sentences: 0.2 for >= 3, 0.1 for 2
/// - any evidence marker: 0.2
pub fn assess_argument_quality(text: &str) -> f64 {
    let text = text.trim();
    let mut score = 0.0;

    let length = text.chars().count();
    if length >= 200 {
        score += 0.3;
    } else if length >= 100 {
        score += 0.2;
    } else if length >= MIN_ARGUMENT_LENGTH {
        score += 0.1;
    }

    // Substring matching, so "so" also hits inside longer words
    let lower = text.to_lowercase();
    let keyword_count = REASONING_KEYWORDS
        .iter()
        .filter(|kw| lower.contains(*kw))
        .count();
    if keyword_count >= 3 {
        score += 0.3;
    } else if keyword_count == 2 {
        score += 0.2;
    } else if keyword_count == 1 {
        score += 0.1;
    }

    let sentence_count = text
        .split(|c| matches!(c, '.' | '!' | '?'))
        .filter(|s| !s.trim().is_empty())
        .count();
    if sentence_count >= 3 {
        score += 0.2;
    } else if sentence_count == 2 {
        score += 0.1;
    }

    if EVIDENCE_MARKERS.iter().any(|m| lower.contains(*m)) {
        score += 0.2;
    }

    f64::min(score, 1.0)
}

fn excerpt(text: &str) -> String {
    if text.chars().count() > EXCERPT_CHARS {
        let head: String = text.chars().take(EXCERPT_CHARS).collect();
        format!("{}...", head)
    } else {
        text.to_string()
    }
}
