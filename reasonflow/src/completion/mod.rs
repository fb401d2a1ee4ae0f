//! Completion service collaborator and its guard.

mod guarded;
#[cfg(feature = "http")]
mod http;
mod service;

pub use guarded::GuardedCompletion;
#[cfg(feature = "http")]
pub use http::HttpCompletionService;
pub use service::{CompletionOptions, CompletionResponse, CompletionService, RawCompletion};
