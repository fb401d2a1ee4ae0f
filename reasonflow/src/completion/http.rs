//! JSON-over-HTTP completion transport.

use super::{CompletionOptions, CompletionResponse, CompletionService, RawCompletion};
use crate::errors::CompletionError;
use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;

/// Posts `{prompt, resource, options}` to an endpoint and expects a
/// `{content, model, input_tokens, output_tokens, cost_usd}` body back.
#[derive(Debug, Clone)]
pub struct HttpCompletionService {
    endpoint: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl HttpCompletionService {
    /// Creates a transport for `endpoint`.
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, CompletionError> {
        let endpoint = endpoint.into();
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CompletionError::service(&endpoint, e.to_string()))?;
        Ok(Self {
            endpoint,
            api_key: None,
            client,
        })
    }

    /// Sends the key as a bearer token.
    #[must_use]
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }
}

#[async_trait]
impl CompletionService for HttpCompletionService {
    async fn complete(
        &self,
        prompt: &str,
        resource_id: &str,
        options: &CompletionOptions,
    ) -> Result<CompletionResponse, CompletionError> {
        let mut request = self.client.post(&self.endpoint).json(&serde_json::json!({
            "prompt": prompt,
            "resource": resource_id,
            "options": options,
        }));
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| CompletionError::service(resource_id, e.to_string()))?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| CompletionError::service(resource_id, e.to_string()))?;

        if !status.is_success() {
            return Err(CompletionError::service(
                resource_id,
                format!("HTTP {status}: {}", crate::utils::preview(&body, 200)),
            ));
        }

        debug!(resource = %resource_id, bytes = body.len(), "Received completion payload");
        RawCompletion::from_json(resource_id, &body)?.validate(resource_id)
    }
}
