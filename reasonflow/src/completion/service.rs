//! Completion service contract and response validation.

use crate::errors::CompletionError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Per-call generation options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionOptions {
    /// Maximum tokens to generate.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Sampling temperature.
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    /// Stop sequences.
    #[serde(default)]
    pub stop: Vec<String>,
}

fn default_max_tokens() -> u32 {
    1024
}

fn default_temperature() -> f32 {
    0.2
}

impl Default for CompletionOptions {
    fn default() -> Self {
        Self {
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            stop: Vec::new(),
        }
    }
}

impl CompletionOptions {
    /// Sets the token cap.
    #[must_use]
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Adds a stop sequence.
    #[must_use]
    pub fn with_stop(mut self, stop: impl Into<String>) -> Self {
        self.stop.push(stop.into());
        self
    }
}

/// A validated completion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionResponse {
    /// Generated text.
    pub content: String,
    /// Model that produced it.
    pub model: String,
    /// Prompt tokens.
    pub input_tokens: u64,
    /// Generated tokens.
    pub output_tokens: u64,
    /// Cost of the call in USD.
    pub cost_usd: f64,
}

impl CompletionResponse {
    /// Creates a response with zero usage.
    #[must_use]
    pub fn text(content: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            model: model.into(),
            input_tokens: 0,
            output_tokens: 0,
            cost_usd: 0.0,
        }
    }

    /// Checks the response contract for `resource`.
    pub fn validate(&self, resource: &str) -> Result<(), CompletionError> {
        if self.content.trim().is_empty() {
            return Err(CompletionError::malformed(resource, "empty content"));
        }
        if !self.cost_usd.is_finite() || self.cost_usd < 0.0 {
            return Err(CompletionError::malformed(
                resource,
                format!("invalid cost_usd {}", self.cost_usd),
            ));
        }
        Ok(())
    }

    /// Total tokens used.
    #[must_use]
    pub const fn total_tokens(&self) -> u64 {
        self.input_tokens.saturating_add(self.output_tokens)
    }
}

/// An unvalidated completion payload as received on the wire.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawCompletion {
    #[serde(default)]
    content: Option<Value>,
    #[serde(default)]
    model: Option<Value>,
    #[serde(default)]
    input_tokens: Option<Value>,
    #[serde(default)]
    output_tokens: Option<Value>,
    #[serde(default)]
    cost_usd: Option<Value>,
}

impl RawCompletion {
    /// Parses a JSON payload without validating it.
    pub fn from_json(resource: &str, raw: &str) -> Result<Self, CompletionError> {
        serde_json::from_str(raw).map_err(|e| CompletionError::malformed(resource, e.to_string()))
    }

    /// Validates the payload into a [`CompletionResponse`].
    pub fn validate(self, resource: &str) -> Result<CompletionResponse, CompletionError> {
        let content = match self.content {
            Some(Value::String(s)) => s,
            Some(other) => {
                return Err(CompletionError::malformed(
                    resource,
                    format!("content must be a string, got {other}"),
                ))
            }
            None => return Err(CompletionError::malformed(resource, "missing content")),
        };
        let model = match self.model {
            Some(Value::String(s)) => s,
            _ => resource.to_string(),
        };

        let response = CompletionResponse {
            content,
            model,
            input_tokens: token_count(resource, "input_tokens", self.input_tokens)?,
            output_tokens: token_count(resource, "output_tokens", self.output_tokens)?,
            cost_usd: self
                .cost_usd
                .as_ref()
                .and_then(Value::as_f64)
                .ok_or_else(|| {
                    CompletionError::malformed(resource, "cost_usd missing or not a number")
                })?,
        };
        response.validate(resource)?;
        Ok(response)
    }
}

fn token_count(resource: &str, field: &str, value: Option<Value>) -> Result<u64, CompletionError> {
    value.as_ref().and_then(Value::as_u64).ok_or_else(|| {
        CompletionError::malformed(
            resource,
            format!("{field} missing or not a non-negative integer"),
        )
    })
}

/// External text-completion collaborator.
#[async_trait]
pub trait CompletionService: Send + Sync {
    /// Produces a completion for `prompt` using `resource_id`.
    async fn complete(
        &self,
        prompt: &str,
        resource_id: &str,
        options: &CompletionOptions,
    ) -> Result<CompletionResponse, CompletionError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_raw_completion_valid() {
        let raw = RawCompletion::from_json(
            "primary",
            r#"{"content": "42", "model": "m1", "input_tokens": 10, "output_tokens": 2, "cost_usd": 0.001}"#,
        )
        .unwrap();
        let response = raw.validate("primary").unwrap();
        assert_eq!(response.content, "42");
        assert_eq!(response.total_tokens(), 12);
    }

    #[test]
    fn test_raw_completion_rejects_non_numeric_tokens() {
        let raw = RawCompletion::from_json(
            "primary",
            r#"{"content": "x", "input_tokens": "ten", "output_tokens": 1, "cost_usd": 0}"#,
        )
        .unwrap();
        let err = raw.validate("primary").unwrap_err();
        assert!(err.to_string().contains("input_tokens"));
    }

    #[test]
    fn test_raw_completion_rejects_missing_cost() {
        let raw = RawCompletion::from_json(
            "primary",
            r#"{"content": "x", "input_tokens": 1, "output_tokens": 1}"#,
        )
        .unwrap();
        assert!(raw.validate("primary").unwrap_err().to_string().contains("cost_usd"));
    }

    #[test]
    fn test_raw_completion_rejects_empty_content() {
        let raw = RawCompletion::from_json(
            "primary",
            r#"{"content": "  ", "input_tokens": 1, "output_tokens": 1, "cost_usd": 0}"#,
        )
        .unwrap();
        assert!(matches!(
            raw.validate("primary"),
            Err(CompletionError::Malformed { .. })
        ));
    }

    #[test]
    fn test_response_rejects_negative_cost() {
        let mut response = CompletionResponse::text("ok", "m");
        response.cost_usd = -1.0;
        assert!(response.validate("primary").is_err());
        response.cost_usd = f64::NAN;
        assert!(response.validate("primary").is_err());
    }

    #[test]
    fn test_options_defaults() {
        let options: CompletionOptions = serde_json::from_str("{}").unwrap();
        assert_eq!(options, CompletionOptions::default());
    }
}
