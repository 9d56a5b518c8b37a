//! Reasoning engine client
//!
//! The engine takes a system prompt plus a user transcript and returns a JSON
//! string. Failures come back as [`ReasoningError`] with an explicit kind
//! derived from the HTTP status or transport error, never from error text.

use crate::error::ReasoningError;
use async_trait::async_trait;
use reqwest::StatusCode;
use std::time::Duration;

#[async_trait]
pub trait ReasoningEngine: Send + Sync {
    async fn complete(
        &self,
        system_prompt: &str,
        transcript: &str,
    ) -> Result<String, ReasoningError>;
}

/// Configuration for the Anthropic messages API
#[derive(Debug, Clone)]
pub struct ReasonerConfig {
    pub api_url: String,
    pub api_key: String,
    pub model: String,
    pub max_tokens: u32,
    pub timeout: Duration,
}

impl Default for ReasonerConfig {
    fn default() -> Self {
        Self {
            api_url: "https://api.anthropic.com/v1/messages".to_string(),
            api_key: std::env::var("ANTHROPIC_API_KEY").unwrap_or_default(),
            model: "claude-3-5-haiku-20241022".to_string(),
            max_tokens: 4096,
            timeout: Duration::from_secs(120),
        }
    }
}

/// [`ReasoningEngine`] backed by the Anthropic messages API
pub struct AnthropicReasoner {
    client: reqwest::Client,
    config: ReasonerConfig,
}

impl AnthropicReasoner {
    pub fn new(config: ReasonerConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(config.timeout).build()?;
        Ok(Self { client, config })
    }

    pub fn has_api_key(&self) -> bool {
        !self.config.api_key.is_empty()
    }
}

#[async_trait]
impl ReasoningEngine for AnthropicReasoner {
    async fn complete(
        &self,
        system_prompt: &str,
        transcript: &str,
    ) -> Result<String, ReasoningError> {
        if self.config.api_key.is_empty() {
            return Err(ReasoningError::Authentication(
                "ANTHROPIC_API_KEY not set".to_string(),
            ));
        }

        let request_body = serde_json::json!({
            "model": self.config.model,
            "max_tokens": self.config.max_tokens,
            "system": system_prompt,
            "messages": [
                {
                    "role": "user",
                    "content": transcript
                }
            ]
        });

        let response = self
            .client
            .post(&self.config.api_url)
            .header("x-api-key", &self.config.api_key)
            .header("anthropic-version", "2023-06-01")
            .header("content-type", "application/json")
            .json(&request_body)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(status, body));
        }

        let response_json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| ReasoningError::InvalidResponse(e.to_string()))?;

        response_json["content"][0]["text"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| {
                ReasoningError::InvalidResponse("response has no text content".to_string())
            })
    }
}

fn transport_error(err: reqwest::Error) -> ReasoningError {
    if err.is_timeout() {
        ReasoningError::Timeout(err.to_string())
    } else {
        ReasoningError::Other(err.to_string())
    }
}

/// Map a non-success HTTP status to an error kind
pub(crate) fn status_error(status: StatusCode, body: String) -> ReasoningError {
    let detail = format!("{}: {}", status, body);
    match status.as_u16() {
        429 | 529 => ReasoningError::RateLimited(detail),
        401 | 403 => ReasoningError::Authentication(detail),
        408 | 504 => ReasoningError::Timeout(detail),
        _ => ReasoningError::Other(detail),
    }
}
