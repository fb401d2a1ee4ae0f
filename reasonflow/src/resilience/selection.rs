//! One-shot completion resource selection.

use super::circuit_breaker::CircuitBreaker;
use crate::core::{Failure, Outcome};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

/// The resource chosen for one invocation.
///
/// Computed once and reused for every completion call of that invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectedResource {
    /// Resource id passed to the completion service.
    pub id: String,
    /// Position of the resource in the tier list.
    pub tier: usize,
    /// When the selection was made.
    pub selected_at: DateTime<Utc>,
}

impl SelectedResource {
    /// Creates a selection for a specific resource.
    #[must_use]
    pub fn new(id: impl Into<String>, tier: usize) -> Self {
        Self {
            id: id.into(),
            tier,
            selected_at: Utc::now(),
        }
    }
}

/// Picks the first tier whose circuit admits calls.
#[derive(Debug, Clone)]
pub struct ResourceSelector {
    breaker: Arc<CircuitBreaker>,
}

impl ResourceSelector {
    /// Creates a selector over the given breaker.
    #[must_use]
    pub fn new(breaker: Arc<CircuitBreaker>) -> Self {
        Self { breaker }
    }

    /// Selects a resource from `tiers` in preference order.
    pub fn select(&self, tiers: &[String]) -> Outcome<SelectedResource> {
        if tiers.is_empty() {
            return Outcome::fail(Failure::configuration("no completion resources configured"));
        }

        for (tier, id) in tiers.iter().enumerate() {
            if self.breaker.is_available(id) {
                debug!(resource = %id, tier, "Selected completion resource");
                return Outcome::ok(SelectedResource::new(id.clone(), tier));
            }
        }

        Outcome::fail(Failure::guard(format!(
            "all completion resources are unavailable (open circuits: {})",
            tiers.join(", ")
        )))
    }
}
