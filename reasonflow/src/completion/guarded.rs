//! Circuit-guarded, time-bounded completion calls.

use super::{CompletionOptions, CompletionResponse, CompletionService};
use crate::errors::CompletionError;
use crate::executor::Deadline;
use crate::resilience::{CircuitBreaker, SelectedResource};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Wraps a [`CompletionService`] with the circuit breaker and timeouts.
///
/// Every call checks the breaker first, is bounded by the smaller of the
/// per-call timeout and the caller's remaining deadline, and records its
/// outcome on the breaker. Calls rejected by an open circuit are not counted.
#[derive(Clone)]
pub struct GuardedCompletion {
    service: Arc<dyn CompletionService>,
    breaker: Arc<CircuitBreaker>,
    call_timeout: Duration,
    options: CompletionOptions,
}

impl std::fmt::Debug for GuardedCompletion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GuardedCompletion")
            .field("call_timeout", &self.call_timeout)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl GuardedCompletion {
    /// Creates a guarded client.
    #[must_use]
    pub fn new(
        service: Arc<dyn CompletionService>,
        breaker: Arc<CircuitBreaker>,
        call_timeout: Duration,
    ) -> Self {
        Self {
            service,
            breaker,
            call_timeout,
            options: CompletionOptions::default(),
        }
    }

    /// Sets the generation options used for every call.
    #[must_use]
    pub fn with_options(mut self, options: CompletionOptions) -> Self {
        self.options = options;
        self
    }

    /// Gets the breaker.
    #[must_use]
    pub fn breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }

    /// Gets the per-call timeout.
    #[must_use]
    pub const fn call_timeout(&self) -> Duration {
        self.call_timeout
    }

    /// Runs one completion against the selected resource.
    pub async fn complete(
        &self,
        prompt: &str,
        resource: &SelectedResource,
        deadline: Option<&Deadline>,
    ) -> Result<CompletionResponse, CompletionError> {
        let id = resource.id.as_str();
        let bound = deadline.map_or(self.call_timeout, |d| self.call_timeout.min(d.remaining()));
        let timeout_ms = u64::try_from(bound.as_millis()).unwrap_or(u64::MAX);
        if bound.is_zero() {
            return Err(CompletionError::Timeout {
                resource: id.to_string(),
                timeout_ms,
            });
        }

        if !self.breaker.allow(id) {
            return Err(CompletionError::CircuitOpen {
                resource: id.to_string(),
            });
        }

        let result = match tokio::time::timeout(
            bound,
            self.service.complete(prompt, id, &self.options),
        )
        .await
        {
            Ok(Ok(response)) => response.validate(id).map(|()| response),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(CompletionError::Timeout {
                resource: id.to_string(),
                timeout_ms,
            }),
        };

        match &result {
            Ok(response) => {
                self.breaker.record_success(id);
                debug!(
                    resource = %id,
                    model = %response.model,
                    tokens = response.total_tokens(),
                    cost_usd = response.cost_usd,
                    "Completion succeeded"
                );
            }
            Err(e) if e.counts_against_circuit() => {
                let state = self.breaker.record_failure(id);
                warn!(resource = %id, error = %e, circuit = %state, "Completion failed");
            }
            Err(_) => {}
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resilience::CircuitState;
    use crate::testing::ScriptedCompletionService;

    fn guarded(service: ScriptedCompletionService, threshold: u32) -> GuardedCompletion {
        GuardedCompletion::new(
            Arc::new(service),
            Arc::new(CircuitBreaker::new(threshold)),
            Duration::from_secs(5),
        )
    }

    #[tokio::test]
    async fn test_success_resets_breaker() {
        let service = ScriptedCompletionService::new()
            .then_fail("upstream 500")
            .then_reply("fine");
        let client = guarded(service, 3);
        let resource = SelectedResource::new("primary", 0);

        assert!(client.complete("q", &resource, None).await.is_err());
        assert_eq!(client.breaker().failure_count("primary"), 1);

        let response = client.complete("q", &resource, None).await.unwrap();
        assert_eq!(response.content, "fine");
        assert_eq!(client.breaker().failure_count("primary"), 0);
    }

    #[tokio::test]
    async fn test_malformed_response_counts_as_failure() {
        let client = guarded(ScriptedCompletionService::new().then_reply("   "), 3);
        let err = client
            .complete("q", &SelectedResource::new("primary", 0), None)
            .await
            .unwrap_err();
        assert!(matches!(err, CompletionError::Malformed { .. }));
        assert_eq!(client.breaker().failure_count("primary"), 1);
    }

    #[tokio::test]
    async fn test_open_circuit_short_circuits_without_calling() {
        let service = ScriptedCompletionService::new().then_reply("never");
        let probe = service.clone();
        let client = guarded(service, 1);
        client.breaker().record_failure("primary");

        let err = client
            .complete("q", &SelectedResource::new("primary", 0), None)
            .await
            .unwrap_err();
        assert!(matches!(err, CompletionError::CircuitOpen { .. }));
        assert_eq!(probe.call_count(), 0);
        assert_eq!(client.breaker().failure_count("primary"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_is_bounded_by_deadline() {
        let service = ScriptedCompletionService::new()
            .then_delay(Duration::from_secs(30), "slow");
        let client = guarded(service, 3);
        let deadline = Deadline::start(Duration::from_secs(2));

        let err = client
            .complete("q", &SelectedResource::new("primary", 0), Some(&deadline))
            .await
            .unwrap_err();
        match err {
            CompletionError::Timeout { timeout_ms, .. } => assert!(timeout_ms <= 2_000),
            other => panic!("expected timeout, got {other:?}"),
        }
        assert_eq!(client.breaker().state("primary"), CircuitState::Closed);
        assert_eq!(client.breaker().failure_count("primary"), 1);
    }
}
