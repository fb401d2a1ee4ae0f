//! Tool call and definition types.

use serde::{Deserialize, Serialize};
use std::fmt;

/// What a tool does to the outside world.
///
/// The sanitizer applies the path-escape check only to [`ToolKind::FileWrite`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ToolKind {
    /// Runs a command.
    Command,
    /// Writes a file. Input starts with the target path on its first line.
    FileWrite,
    /// Read-only lookup.
    #[default]
    Query,
}

impl fmt::Display for ToolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Command => write!(f, "command"),
            Self::FileWrite => write!(f, "file_write"),
            Self::Query => write!(f, "query"),
        }
    }
}

/// A tool invocation requested by a reasoning pattern.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Tool name.
    pub name: String,
    /// Unparsed input text.
    pub raw_input: String,
}

impl ToolCall {
    /// Creates a tool call.
    #[must_use]
    pub fn new(name: impl Into<String>, raw_input: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            raw_input: raw_input.into(),
        }
    }

    /// For file-write input, the target path on the first line.
    #[must_use]
    pub fn target_path(&self) -> &str {
        self.raw_input.lines().next().unwrap_or_default().trim()
    }
}

impl fmt::Display for ToolCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}]", self.name, self.raw_input)
    }
}

/// Prompt-facing description of a tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// Tool name.
    pub name: String,
    /// Tool kind.
    pub kind: ToolKind,
    /// What the tool does and how its input is shaped.
    pub description: String,
}

impl ToolDefinition {
    /// Renders the definition as one prompt line.
    #[must_use]
    pub fn prompt_line(&self) -> String {
        format!("- {} ({}): {}", self.name, self.kind, self.description)
    }
}
