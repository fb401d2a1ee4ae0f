//! File tools confined to a working root.

use super::{Tool, ToolKind};
use crate::errors::ToolError;
use async_trait::async_trait;
use std::path::{Component, Path, PathBuf};
use tracing::debug;

/// Lexically normalizes a path, folding `.` and `..` without touching the filesystem.
#[must_use]
pub fn normalize_lexically(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Resolves `requested` against an absolute `root`.
///
/// Returns `None` when the normalized target lies outside the root.
#[must_use]
pub fn resolve_within(root: &Path, requested: &str) -> Option<PathBuf> {
    let base = normalize_lexically(root);
    let requested = Path::new(requested);
    let candidate = if requested.is_absolute() {
        normalize_lexically(requested)
    } else {
        normalize_lexically(&base.join(requested))
    };
    candidate.starts_with(&base).then_some(candidate)
}

/// Writes text files under the working root.
///
/// Input format: target path on the first line, file content after it.
#[derive(Debug, Clone)]
pub struct WriteFileTool {
    root: PathBuf,
}

impl WriteFileTool {
    /// Creates a tool writing under `root`.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl Tool for WriteFileTool {
    fn name(&self) -> &str {
        "write_file"
    }

    fn kind(&self) -> ToolKind {
        ToolKind::FileWrite
    }

    fn description(&self) -> &str {
        "writes a file; first line is the relative path, remaining lines are the content"
    }

    async fn invoke(&self, input: &str) -> Result<String, ToolError> {
        let (path, content) = input.split_once('\n').unwrap_or((input, ""));
        let path = path.trim();
        if path.is_empty() {
            return Err(ToolError::execution_failed(self.name(), "missing target path"));
        }

        let target = resolve_within(&self.root, path).ok_or_else(|| ToolError::PathEscape {
            name: self.name().to_string(),
            path: path.to_string(),
        })?;

        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| ToolError::execution_failed(self.name(), e.to_string()))?;
        }
        tokio::fs::write(&target, content)
            .await
            .map_err(|e| ToolError::execution_failed(self.name(), e.to_string()))?;

        debug!(path = %target.display(), bytes = content.len(), "Wrote file");
        Ok(format!("wrote {} bytes to {path}", content.len()))
    }
}

/// Reads text files under the working root.
#[derive(Debug, Clone)]
pub struct ReadFileTool {
    root: PathBuf,
    max_chars: usize,
}

impl ReadFileTool {
    /// Creates a tool reading under `root`.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            max_chars: 4_000,
        }
    }

    /// Caps how much of a file is returned as the observation.
    #[must_use]
    pub fn with_max_chars(mut self, max_chars: usize) -> Self {
        self.max_chars = max_chars;
        self
    }
}

#[async_trait]
impl Tool for ReadFileTool {
    fn name(&self) -> &str {
        "read_file"
    }

    fn kind(&self) -> ToolKind {
        ToolKind::Query
    }

    fn description(&self) -> &str {
        "reads a file; input is the relative path"
    }

    async fn invoke(&self, input: &str) -> Result<String, ToolError> {
        let path = input.trim();
        let target = resolve_within(&self.root, path).ok_or_else(|| ToolError::PathEscape {
            name: self.name().to_string(),
            path: path.to_string(),
        })?;

        let bytes = tokio::fs::read(&target)
            .await
            .map_err(|e| ToolError::execution_failed(self.name(), e.to_string()))?;
        let text = String::from_utf8_lossy(&bytes);
        Ok(crate::utils::preview(&text, self.max_chars))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_within_accepts_relative_paths() {
        let root = Path::new("/work/project");
        assert_eq!(
            resolve_within(root, "src/main.rs"),
            Some(PathBuf::from("/work/project/src/main.rs"))
        );
        assert_eq!(
            resolve_within(root, "./a/../b.txt"),
            Some(PathBuf::from("/work/project/b.txt"))
        );
    }

    #[test]
    fn test_resolve_within_rejects_escapes() {
        let root = Path::new("/work/project");
        assert!(resolve_within(root, "../secrets").is_none());
        assert!(resolve_within(root, "a/../../../etc/passwd").is_none());
        assert!(resolve_within(root, "/etc/passwd").is_none());
        assert!(resolve_within(root, "/work/project/ok.txt").is_some());
        assert!(resolve_within(root, "/work/project-other/x").is_none());
    }

    #[tokio::test]
    async fn test_write_then_read() {
        let dir = tempfile::tempdir().unwrap();
        let writer = WriteFileTool::new(dir.path());
        let reader = ReadFileTool::new(dir.path());

        let observation = writer.invoke("notes/plan.md\nstep one").await.unwrap();
        assert!(observation.contains("notes/plan.md"));
        assert_eq!(reader.invoke("notes/plan.md").await.unwrap(), "step one");
    }

    #[tokio::test]
    async fn test_write_refuses_escape() {
        let dir = tempfile::tempdir().unwrap();
        let writer = WriteFileTool::new(dir.path());
        let err = writer.invoke("../outside.txt\nx").await.unwrap_err();
        assert!(err.is_blocked());
    }

    #[tokio::test]
    async fn test_write_requires_path() {
        let dir = tempfile::tempdir().unwrap();
        let err = WriteFileTool::new(dir.path()).invoke("\ncontent").await.unwrap_err();
        assert!(matches!(err, ToolError::ExecutionFailed { .. }));
    }
}
