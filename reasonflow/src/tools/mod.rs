//! Tools invoked by the reasoning patterns.

mod builtin;
mod definitions;
mod registry;

pub use builtin::{normalize_lexically, resolve_within, ReadFileTool, WriteFileTool};
pub use definitions::{ToolCall, ToolDefinition, ToolKind};
pub use registry::{Tool, ToolRegistry};
