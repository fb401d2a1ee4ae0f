//! Testing utilities for reasonflow engines.
//!
//! This module provides:
//! - A scripted completion service
//! - Council reviewer and reviser doubles
//! - A recording tool
//! - Engine fixtures

mod completion;
mod doubles;
mod fixtures;

pub use completion::ScriptedCompletionService;
pub use doubles::{EchoReviser, RecordingTool, StaticReviewer};
pub use fixtures::{test_config, test_services, test_services_builder};
