//! Tool-input sanitizer.
//!
//! Every tool call passes through [`Sanitizer::check`] before the tool sees
//! it. Rejections are [`ToolError::Blocked`] or [`ToolError::PathEscape`] and
//! turn into `BLOCKED` observations in the executor.

use crate::config::SanitizerConfig;
use crate::errors::{ConfigError, ToolError};
use crate::tools::{normalize_lexically, resolve_within, ToolCall, ToolKind};
use crate::utils::PatternMatcher;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

/// Deny-list and working-root checks for tool input.
#[derive(Debug, Clone)]
pub struct Sanitizer {
    patterns: Vec<String>,
    matcher: PatternMatcher,
    root: PathBuf,
}

impl Sanitizer {
    /// Builds a sanitizer; a relative or missing root resolves against the cwd.
    pub fn new(config: &SanitizerConfig, regex_timeout: Duration) -> Result<Self, ConfigError> {
        let cwd = || {
            std::env::current_dir().map_err(|e| ConfigError::invalid("working_root", e.to_string()))
        };
        let root = match &config.working_root {
            Some(root) if root.is_absolute() => root.clone(),
            Some(root) => cwd()?.join(root),
            None => cwd()?,
        };

        Ok(Self {
            patterns: config.danger_patterns.clone(),
            matcher: PatternMatcher::new(regex_timeout).case_insensitive(),
            root: normalize_lexically(&root),
        })
    }

    /// Gets the working root.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Rejects dangerous input, and file writes that leave the working root.
    pub async fn check(&self, call: &ToolCall, kind: ToolKind) -> Result<(), ToolError> {
        if let Some(pattern) = self.matcher.first_match(&self.patterns, &call.raw_input).await {
            warn!(tool = %call.name, pattern = %pattern, "Blocked dangerous tool input");
            return Err(ToolError::Blocked {
                name: call.name.clone(),
                pattern: pattern.to_string(),
            });
        }

        if kind == ToolKind::FileWrite {
            let path = call.target_path();
            if !path.is_empty() && resolve_within(&self.root, path).is_none() {
                warn!(tool = %call.name, path = %path, "Blocked path escape");
                return Err(ToolError::PathEscape {
                    name: call.name.clone(),
                    path: path.to_string(),
                });
            }
        }
        Ok(())
    }
}
