//! Tool trait and registry.

use super::{ToolDefinition, ToolKind};
use crate::errors::ToolError;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;

/// A capability a reasoning pattern can invoke.
///
/// Tools only ever see input that already passed the sanitizer.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Unique tool name, as used in `Action: name[input]`.
    fn name(&self) -> &str;

    /// What the tool does to the outside world.
    fn kind(&self) -> ToolKind;

    /// One-line usage description for prompts.
    fn description(&self) -> &str {
        ""
    }

    /// Runs the tool and returns its observation text.
    async fn invoke(&self, input: &str) -> Result<String, ToolError>;

    /// Returns the prompt-facing definition.
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            kind: self.kind(),
            description: self.description().to_string(),
        }
    }
}

/// Named tool instances available to the executor.
#[derive(Default)]
pub struct ToolRegistry {
    tools: RwLock<BTreeMap<String, Arc<dyn Tool>>>,
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.names())
            .finish()
    }
}

impl ToolRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a tool, replacing any tool with the same name.
    pub fn register(&self, tool: Arc<dyn Tool>) {
        self.tools.write().insert(tool.name().to_string(), tool);
    }

    /// Builder-style [`ToolRegistry::register`].
    #[must_use]
    pub fn with_tool(self, tool: Arc<dyn Tool>) -> Self {
        self.register(tool);
        self
    }

    /// Looks up a tool by name.
    pub fn get(&self, name: &str) -> Result<Arc<dyn Tool>, ToolError> {
        self.tools
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| ToolError::not_found(name))
    }

    /// Returns true if a tool is registered under `name`.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.tools.read().contains_key(name)
    }

    /// Sorted tool names.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.tools.read().keys().cloned().collect()
    }

    /// Number of registered tools.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tools.read().len()
    }

    /// Returns true if no tools are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tools.read().is_empty()
    }

    /// Renders every tool as a prompt block, one line per tool.
    #[must_use]
    pub fn prompt_block(&self) -> String {
        let tools = self.tools.read();
        if tools.is_empty() {
            return "(no tools available)".to_string();
        }
        tools
            .values()
            .map(|t| t.definition().prompt_line())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Upper;

    #[async_trait]
    impl Tool for Upper {
        fn name(&self) -> &str {
            "upper"
        }

        fn kind(&self) -> ToolKind {
            ToolKind::Query
        }

        fn description(&self) -> &str {
            "uppercases its input"
        }

        async fn invoke(&self, input: &str) -> Result<String, ToolError> {
            Ok(input.to_uppercase())
        }
    }

    #[tokio::test]
    async fn test_register_and_invoke() {
        let registry = ToolRegistry::new().with_tool(Arc::new(Upper));
        assert!(registry.contains("upper"));
        assert_eq!(registry.names(), vec!["upper".to_string()]);

        let tool = registry.get("upper").unwrap();
        assert_eq!(tool.invoke("abc").await.unwrap(), "ABC");
    }

    #[test]
    fn test_missing_tool() {
        let registry = ToolRegistry::new();
        assert!(matches!(
            registry.get("nope"),
            Err(ToolError::NotFound { .. })
        ));
        assert_eq!(registry.prompt_block(), "(no tools available)");
    }

    #[test]
    fn test_prompt_block_lists_tools() {
        let registry = ToolRegistry::new().with_tool(Arc::new(Upper));
        assert_eq!(
            registry.prompt_block(),
            "- upper (query): uppercases its input"
        );
    }
}
