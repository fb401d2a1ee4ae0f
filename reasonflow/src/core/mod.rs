//! Core domain model types for reasonflow.
//!
//! This module contains the fundamental types used throughout the engine:
//! - The railway outcome type and its failure categories

mod outcome;

pub use outcome::{ErrorCategory, Failure, Outcome, OutcomeKind};
