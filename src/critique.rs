//! Grounded critique generation
//!
//! Builds a transcript in which every argument is tagged with its run-scoped
//! id, hands it to the reasoning engine together with a fixed instruction
//! set, and parses the reply into a [`Critique`]. A reply that is not a
//! single JSON object matching the schema ends the run.

use crate::error::ReasoningError;
use crate::reasoning::ReasoningEngine;
use crate::types::{Argument, Critique};
use std::collections::HashMap;
use std::fmt::Write as _;
use std::sync::Arc;
use tracing::debug;

pub const SYSTEM_PROMPT: &str = r#"You are an analytical critic of personal and professional decisions.

LANGUAGE: write every JSON string value in the same language the user used for the context and arguments. JSON keys always stay in English.

You do not make the decision. You stress-test the reasoning behind it.

RULES
1. Grounding. Only analyse what is written. Every claim about an argument must be backed by an exact quote from it. Never invent risks, pressures, or facts that are not in the text.
2. Systemic inconsistency. Compare the current arguments with the "Past Similar Arguments" block. When a current argument contradicts a statement found there, you must report it in "systemic_inconsistencies", quoting the past statement and the current statement verbatim.
3. Variants are distinct strategies. Do not merge or conflate them. Organise the per-variant assessment by variant name. Argument ids may be cited as evidence but must never be used as keys.
4. Be direct. No apologies, no pleasantries.

OUTPUT: a single JSON object, nothing else, with exactly this shape:
{
  "argument_quality_comparison": {
    "<variant name>": {
      "strengths": ["strength with quote"],
      "weaknesses": ["weakness with quote"],
      "logical_fallacies": [{"type": "fallacy name", "quote": "exact quote", "explanation": "why"}],
      "missing_considerations": ["what is missing"],
      "data_quality": "SUFFICIENT" or "INSUFFICIENT_REASONING"
    }
  },
  "cognitive_biases_detected": ["bias: 'quote' - explanation"],
  "alignment_with_model_scores": "agreement or disagreement with the model scores",
  "detected_reasoning_patterns": "recurring themes, or contradictions with past decisions",
  "key_weak_points_to_reconsider": ["'exact quote' - issue"],
  "final_note": "summary of decision quality",
  "score_details": {"logic_stability": 0.0-1.0, "data_grounding": 0.0-1.0, "historical_consistency": 0.0-1.0},
  "confidence_level": "high" or "medium" or "low",
  "systemic_inconsistencies": [
    {"past_decision_id": "id if known", "past_statement": "exact past quote", "current_statement": "exact current quote", "conflict_description": "what conflicts and what it implies"}
  ]
}"#;

/// Inputs for one critique
pub struct CritiqueRequest<'a> {
    pub context: &'a str,
    /// Declaration order
    pub variants: &'a [String],
    pub arguments: &'a [Argument],
    /// Per-argument scores keyed by the same ids as `arguments`
    pub scores: &'a HashMap<String, f64>,
    pub retrieved_context: &'a [String],
}

pub struct CritiqueGenerator {
    engine: Arc<dyn ReasoningEngine>,
}

impl CritiqueGenerator {
    pub fn new(engine: Arc<dyn ReasoningEngine>) -> Self {
        Self { engine }
    }

    pub async fn analyze(&self, request: &CritiqueRequest<'_>) -> Result<Critique, ReasoningError> {
        let transcript = build_transcript(request);
        debug!(chars = transcript.len(), "sending critique transcript");

        let raw = self.engine.complete(SYSTEM_PROMPT, &transcript).await?;
        parse_critique(&raw, request.variants)
    }
}

/// Render the id-tagged transcript sent as the user message
pub fn build_transcript(request: &CritiqueRequest<'_>) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Context: {}", request.context);
    out.push('\n');

    out.push_str("Arguments (keyed by ID):\n");
    for variant in request.variants {
        let _ = writeln!(out, "\n=== {} ===", variant);
        for arg in request.arguments.iter().filter(|a| &a.variant_name == variant) {
            let _ = writeln!(out, "{}: [{}] \"{}\"", arg.id, arg.kind.label(), arg.text);
        }
    }

    out.push_str("\nML Scores (by argument ID):\n");
    for arg in request.arguments {
        if let Some(score) = request.scores.get(&arg.id) {
            let _ = writeln!(out, "  {}: {:.1}/100", arg.id, score);
        }
    }

    out.push_str("\nPast Similar Arguments:\n");
    if request.retrieved_context.is_empty() {
        out.push_str("  None\n");
    } else {
        for (i, ctx) in request.retrieved_context.iter().enumerate() {
            let _ = writeln!(out, "  {}. {}", i + 1, ctx);
        }
    }

    out.push_str("\nIMPORTANT: Return analysis keyed by variant name, NOT by argument ID.\n");
    out.push_str("Aggregate insights per variant, citing specific argument IDs when relevant.");
    out
}

/// Parse and check the engine's reply
pub fn parse_critique(raw: &str, variants: &[String]) -> Result<Critique, ReasoningError> {
    let json = strip_code_fence(raw);
    let critique: Critique = serde_json::from_str(json).map_err(|e| {
        ReasoningError::InvalidResponse(format!("critique does not match schema: {}", e))
    })?;
    critique
        .check(variants)
        .map_err(ReasoningError::InvalidResponse)?;
    Ok(critique)
}

/// Models sometimes wrap JSON in a markdown fence
fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}
