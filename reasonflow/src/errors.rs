//! Error types for the reasonflow engine.
//!
//! Lower-level collaborators (completion service, tools, storage, config)
//! return these typed errors. Every one of them converts into a categorized
//! [`Failure`] at the point where it crosses into the railway.

use crate::core::{ErrorCategory, Failure};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// The main error type for reasonflow operations.
#[derive(Debug, Error)]
pub enum ReasonflowError {
    /// A pipeline validation error occurred.
    #[error("{0}")]
    Validation(#[from] PipelineValidationError),

    /// Invalid configuration or rule data.
    #[error("{0}")]
    Config(#[from] ConfigError),

    /// The completion service failed.
    #[error("{0}")]
    Completion(#[from] CompletionError),

    /// A tool-related error.
    #[error("{0}")]
    Tool(#[from] ToolError),

    /// A key/value store error.
    #[error("{0}")]
    Store(#[from] StoreError),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ReasonflowError {
    /// Returns the failure category this error maps to.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Validation(_) | Self::Config(_) => ErrorCategory::Configuration,
            Self::Completion(e) => e.category(),
            Self::Tool(ToolError::Blocked { .. } | ToolError::PathEscape { .. }) => {
                ErrorCategory::Guard
            }
            Self::Tool(_) | Self::Store(_) | Self::Serialization(_) | Self::Io(_) => {
                ErrorCategory::Stage
            }
        }
    }
}

impl From<serde_json::Error> for ReasonflowError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<ReasonflowError> for Failure {
    fn from(err: ReasonflowError) -> Self {
        Self::new(err.category(), err.to_string())
    }
}

/// Metadata about a contract error for better diagnostics.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ContractErrorInfo {
    /// Error code (e.g., "CONTRACT-004-UNKNOWN_STAGE").
    pub code: String,
    /// Short summary of the error.
    pub summary: String,
    /// Hint for fixing the error.
    pub fix_hint: Option<String>,
    /// Additional context key-value pairs.
    #[serde(default)]
    pub context: HashMap<String, String>,
}

impl ContractErrorInfo {
    /// Creates a new contract error info.
    #[must_use]
    pub fn new(code: impl Into<String>, summary: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            summary: summary.into(),
            fix_hint: None,
            context: HashMap::new(),
        }
    }

    /// Sets the fix hint.
    #[must_use]
    pub fn with_fix_hint(mut self, hint: impl Into<String>) -> Self {
        self.fix_hint = Some(hint.into());
        self
    }

    /// Adds a single context entry.
    #[must_use]
    pub fn with_context_entry(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }
}

/// Error raised when a pipeline cannot be constructed.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct PipelineValidationError {
    /// The error message.
    pub message: String,
    /// The stages involved in the error.
    pub stages: Vec<String>,
    /// Optional contract error info.
    pub error_info: Option<ContractErrorInfo>,
}

impl PipelineValidationError {
    /// Creates a new pipeline validation error.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            stages: Vec::new(),
            error_info: None,
        }
    }

    /// Builds the error for a stage name that is not in the registry.
    #[must_use]
    pub fn unknown_stage(name: &str, available: &[String]) -> Self {
        Self::new(format!(
            "Unknown stage '{}'. Available stages: {}",
            name,
            available.join(", ")
        ))
        .with_stages(vec![name.to_string()])
        .with_error_info(
            ContractErrorInfo::new(
                "CONTRACT-004-UNKNOWN_STAGE",
                format!("Stage '{name}' is not registered"),
            )
            .with_fix_hint("Check the stage name for typos or register the stage before building.")
            .with_context_entry("available", available.join(",")),
        )
    }

    /// Sets the stages involved.
    #[must_use]
    pub fn with_stages(mut self, stages: Vec<String>) -> Self {
        self.stages = stages;
        self
    }

    /// Sets the contract error info.
    #[must_use]
    pub fn with_error_info(mut self, info: ContractErrorInfo) -> Self {
        self.error_info = Some(info);
        self
    }

    /// Returns the contract error code, if any.
    #[must_use]
    pub fn code(&self) -> Option<&str> {
        self.error_info.as_ref().map(|info| info.code.as_str())
    }
}

/// Errors raised while loading or validating configuration and rule data.
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    /// A field holds a value outside its allowed range.
    #[error("Invalid config value for '{field}': {reason}")]
    InvalidValue {
        /// The offending field.
        field: String,
        /// Why it was rejected.
        reason: String,
    },

    /// The council roster is malformed.
    #[error("Invalid council roster: {0}")]
    InvalidRoster(String),

    /// Rule data could not be parsed.
    #[error("Malformed rule data: {0}")]
    Malformed(String),

    /// Rule data could not be read.
    #[error("Failed to read rules from {path}: {reason}")]
    Unreadable {
        /// Source path.
        path: String,
        /// Underlying IO message.
        reason: String,
    },
}

impl ConfigError {
    /// Creates an invalid-value error.
    #[must_use]
    pub fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

impl From<ConfigError> for Failure {
    fn from(err: ConfigError) -> Self {
        Self::configuration(err.to_string())
    }
}

/// Errors returned by the completion service or its guard.
#[derive(Debug, Clone, Error)]
pub enum CompletionError {
    /// The circuit for the resource is open.
    #[error("Circuit open for resource '{resource}'")]
    CircuitOpen {
        /// The resource id.
        resource: String,
    },

    /// The call exceeded its timeout.
    #[error("Completion call to '{resource}' timed out after {timeout_ms}ms")]
    Timeout {
        /// The resource id.
        resource: String,
        /// Timeout that was applied.
        timeout_ms: u64,
    },

    /// The service reported a failure.
    #[error("Completion service error from '{resource}': {reason}")]
    Service {
        /// The resource id.
        resource: String,
        /// Failure reason.
        reason: String,
    },

    /// The service answered with data that violates the response contract.
    #[error("Malformed completion response from '{resource}': {reason}")]
    Malformed {
        /// The resource id.
        resource: String,
        /// Which part of the contract was violated.
        reason: String,
    },
}

impl CompletionError {
    /// Creates a service error.
    #[must_use]
    pub fn service(resource: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Service {
            resource: resource.into(),
            reason: reason.into(),
        }
    }

    /// Creates a malformed-response error.
    #[must_use]
    pub fn malformed(resource: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Malformed {
            resource: resource.into(),
            reason: reason.into(),
        }
    }

    /// Returns the failure category for this error.
    #[must_use]
    pub const fn category(&self) -> ErrorCategory {
        match self {
            Self::CircuitOpen { .. } => ErrorCategory::Guard,
            Self::Timeout { .. } | Self::Service { .. } | Self::Malformed { .. } => {
                ErrorCategory::Transient
            }
        }
    }

    /// Returns true if this failure should count against the circuit.
    #[must_use]
    pub const fn counts_against_circuit(&self) -> bool {
        !matches!(self, Self::CircuitOpen { .. })
    }
}

impl From<CompletionError> for Failure {
    fn from(err: CompletionError) -> Self {
        Self::new(err.category(), err.to_string())
    }
}

/// Errors related to tool execution.
#[derive(Debug, Clone, Error)]
pub enum ToolError {
    /// Tool was not found in the registry.
    #[error("Tool not found: {name}")]
    NotFound {
        /// The tool name.
        name: String,
    },

    /// The sanitizer matched a dangerous pattern.
    #[error("BLOCKED: tool '{name}' input matched dangerous pattern '{pattern}'")]
    Blocked {
        /// The tool name.
        name: String,
        /// The matching deny-list pattern.
        pattern: String,
    },

    /// A file-write target resolves outside the working root.
    #[error("BLOCKED: tool '{name}' path '{path}' escapes the working directory")]
    PathEscape {
        /// The tool name.
        name: String,
        /// The requested path.
        path: String,
    },

    /// Tool execution failed.
    #[error("Tool execution failed: {name} - {reason}")]
    ExecutionFailed {
        /// The tool name.
        name: String,
        /// The reason for failure.
        reason: String,
    },
}

impl ToolError {
    /// Creates a tool not found error.
    #[must_use]
    pub fn not_found(name: impl Into<String>) -> Self {
        Self::NotFound { name: name.into() }
    }

    /// Creates an execution failed error.
    #[must_use]
    pub fn execution_failed(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ExecutionFailed {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Returns true if the sanitizer rejected the call.
    #[must_use]
    pub const fn is_blocked(&self) -> bool {
        matches!(self, Self::Blocked { .. } | Self::PathEscape { .. })
    }
}

/// Errors raised by a key/value store.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    /// The stored value under a key has an unexpected shape.
    #[error("Value under '{key}' is not {expected}")]
    WrongType {
        /// The key.
        key: String,
        /// Expected shape.
        expected: String,
    },

    /// The backend is unavailable.
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_stage_lists_available() {
        let available = vec!["ask".to_string(), "guard".to_string(), "intake".to_string()];
        let err = PipelineValidationError::unknown_stage("gaurd", &available);

        assert!(err.to_string().contains("gaurd"));
        assert!(err.to_string().contains("ask, guard, intake"));
        assert_eq!(err.code(), Some("CONTRACT-004-UNKNOWN_STAGE"));
        assert_eq!(err.stages, vec!["gaurd".to_string()]);
    }

    #[test]
    fn test_completion_error_categories() {
        let open = CompletionError::CircuitOpen {
            resource: "fast".into(),
        };
        assert_eq!(open.category(), ErrorCategory::Guard);
        assert!(!open.counts_against_circuit());

        let malformed = CompletionError::malformed("fast", "empty content");
        assert_eq!(malformed.category(), ErrorCategory::Transient);
        assert!(malformed.counts_against_circuit());
    }

    #[test]
    fn test_blocked_tool_error_maps_to_guard_failure() {
        let err = ReasonflowError::from(ToolError::Blocked {
            name: "shell".into(),
            pattern: "rm".into(),
        });
        let failure: Failure = err.into();
        assert_eq!(failure.category, ErrorCategory::Guard);
        assert!(failure.message.starts_with("BLOCKED"));
    }

    #[test]
    fn test_config_error_is_configuration_failure() {
        let failure: Failure = ConfigError::invalid("max_rounds", "must be >= 1").into();
        assert_eq!(failure.category, ErrorCategory::Configuration);
        assert!(failure.message.contains("max_rounds"));
    }

    #[test]
    fn test_contract_error_info_creation() {
        let info = ContractErrorInfo::new("TEST-001", "Test error")
            .with_fix_hint("Fix this by doing that")
            .with_context_entry("stage", "my_stage");

        assert_eq!(info.code, "TEST-001");
        assert_eq!(info.fix_hint, Some("Fix this by doing that".to_string()));
        assert_eq!(info.context.get("stage"), Some(&"my_stage".to_string()));
    }
}
