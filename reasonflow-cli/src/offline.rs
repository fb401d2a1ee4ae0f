//! Completion service that answers without a network.

use async_trait::async_trait;
use reasonflow::completion::{CompletionOptions, CompletionResponse, CompletionService};
use reasonflow::errors::CompletionError;

/// Echoes the task back as a final answer and approves every review.
///
/// Useful for exercising pipelines and configuration offline.
#[derive(Debug, Default, Clone, Copy)]
pub struct OfflineCompletion;

#[async_trait]
impl CompletionService for OfflineCompletion {
    async fn complete(
        &self,
        prompt: &str,
        _resource_id: &str,
        _options: &CompletionOptions,
    ) -> Result<CompletionResponse, CompletionError> {
        let reply = if prompt.contains("Reply `APPROVE") {
            "APPROVE: offline review".to_string()
        } else if prompt.contains("Reply `PASS`") {
            "PASS".to_string()
        } else {
            let task = prompt
                .lines()
                .find_map(|line| line.strip_prefix("Task: "))
                .or_else(|| prompt.lines().next())
                .unwrap_or_default();
            format!("Final Answer: {task}")
        };
        Ok(CompletionResponse::text(reply, "offline"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_echoes_task_line() {
        let response = OfflineCompletion
            .complete("Solve this.\nTask: add 2 and 2\n", "primary", &CompletionOptions::default())
            .await
            .unwrap();
        assert_eq!(response.content, "Final Answer: add 2 and 2");
    }

    #[tokio::test]
    async fn test_approves_reviews() {
        let response = OfflineCompletion
            .complete("Reply `APPROVE: <reason>` or `REJECT: <reason>`.", "primary", &CompletionOptions::default())
            .await
            .unwrap();
        assert!(response.content.starts_with("APPROVE"));
    }
}
