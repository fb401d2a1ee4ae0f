//! Scripted completion service.

use crate::completion::{CompletionOptions, CompletionResponse, CompletionService};
use crate::errors::CompletionError;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone)]
enum Scripted {
    Reply(CompletionResponse),
    Fail(String),
    Delay(Duration, String),
}

#[derive(Debug, Default)]
struct Inner {
    script: Mutex<VecDeque<Scripted>>,
    fallback: Mutex<Option<String>>,
    prompts: Mutex<Vec<String>>,
}

/// A completion service that plays back a fixed script.
///
/// Each call consumes the next scripted step. Once the script runs out the
/// fallback reply is returned, or a service error if none was set. Clones share
/// the script and the recorded prompts.
#[derive(Debug, Clone, Default)]
pub struct ScriptedCompletionService {
    inner: Arc<Inner>,
}

impl ScriptedCompletionService {
    /// Creates an empty script.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a text reply.
    #[must_use]
    pub fn then_reply(self, content: impl Into<String>) -> Self {
        self.push(Scripted::Reply(CompletionResponse::text(content, "scripted")))
    }

    /// Appends a full response.
    #[must_use]
    pub fn then_response(self, response: CompletionResponse) -> Self {
        self.push(Scripted::Reply(response))
    }

    /// Appends a service failure.
    #[must_use]
    pub fn then_fail(self, reason: impl Into<String>) -> Self {
        self.push(Scripted::Fail(reason.into()))
    }

    /// Appends a reply that only arrives after `delay`.
    #[must_use]
    pub fn then_delay(self, delay: Duration, content: impl Into<String>) -> Self {
        self.push(Scripted::Delay(delay, content.into()))
    }

    /// Reply used once the script is exhausted.
    #[must_use]
    pub fn with_fallback(self, content: impl Into<String>) -> Self {
        *self.inner.fallback.lock() = Some(content.into());
        self
    }

    /// Number of calls received.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.inner.prompts.lock().len()
    }

    /// Prompts received, in order.
    #[must_use]
    pub fn prompts(&self) -> Vec<String> {
        self.inner.prompts.lock().clone()
    }

    fn push(self, step: Scripted) -> Self {
        self.inner.script.lock().push_back(step);
        self
    }
}

#[async_trait]
impl CompletionService for ScriptedCompletionService {
    async fn complete(
        &self,
        prompt: &str,
        resource_id: &str,
        _options: &CompletionOptions,
    ) -> Result<CompletionResponse, CompletionError> {
        self.inner.prompts.lock().push(prompt.to_string());
        let step = self.inner.script.lock().pop_front();

        match step {
            Some(Scripted::Reply(response)) => Ok(response),
            Some(Scripted::Fail(reason)) => Err(CompletionError::service(resource_id, reason)),
            Some(Scripted::Delay(delay, content)) => {
                tokio::time::sleep(delay).await;
                Ok(CompletionResponse::text(content, "scripted"))
            }
            None => match self.inner.fallback.lock().clone() {
                Some(content) => Ok(CompletionResponse::text(content, "scripted")),
                None => Err(CompletionError::service(resource_id, "script exhausted")),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_plays_script_in_order() {
        let service = ScriptedCompletionService::new()
            .then_fail("down")
            .then_reply("up")
            .with_fallback("again");
        let options = CompletionOptions::default();

        assert!(service.complete("a", "primary", &options).await.is_err());
        assert_eq!(service.complete("b", "primary", &options).await.unwrap().content, "up");
        assert_eq!(service.complete("c", "primary", &options).await.unwrap().content, "again");
        assert_eq!(service.prompts(), vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_exhausted_script_fails() {
        let service = ScriptedCompletionService::new();
        let err = service
            .complete("a", "primary", &CompletionOptions::default())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("script exhausted"));
    }
}
