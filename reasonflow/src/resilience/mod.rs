//! Failure isolation in front of the completion service.

mod circuit_breaker;
mod selection;

pub use circuit_breaker::{CircuitBreaker, CircuitEntry, CircuitState, CIRCUIT_KEY_PREFIX};
pub use selection::{ResourceSelector, SelectedResource};
