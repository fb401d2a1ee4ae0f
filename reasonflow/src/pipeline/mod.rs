//! Pipeline building and execution.
//!
//! This module provides:
//! - The stage registry and its built-in stages
//! - Engine services shared by every stage
//! - The validated, short-circuiting pipeline

mod registry;
mod runner;
mod services;

pub use registry::{StageFactory, StageRegistry};
pub use runner::{CallOptions, Pipeline};
pub use services::{EngineServices, EngineServicesBuilder};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Whether answers go through council review.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PipelineMode {
    /// Answers are returned as produced.
    #[default]
    Direct,
    /// The executor submits its answer to the council.
    Deliberate,
}

impl fmt::Display for PipelineMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Direct => write!(f, "direct"),
            Self::Deliberate => write!(f, "deliberate"),
        }
    }
}

impl FromStr for PipelineMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "direct" => Ok(Self::Direct),
            "deliberate" => Ok(Self::Deliberate),
            other => Err(format!("unknown pipeline mode '{other}' (expected direct or deliberate)")),
        }
    }
}
