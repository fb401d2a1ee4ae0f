//! Per-resource circuit breaker for completion calls.

use crate::config::Limits;
use crate::events::get_event_sink;
use crate::storage::KeyValueStore;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Key prefix used when mirroring entries to a store.
pub const CIRCUIT_KEY_PREFIX: &str = "circuit:";

/// State of one resource's circuit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Calls are allowed.
    #[default]
    Closed,
    /// Calls are rejected until a reset, or a cooldown when one is configured.
    Open,
    /// The cooldown elapsed; a single probe call is admitted.
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Closed => write!(f, "closed"),
            Self::Open => write!(f, "open"),
            Self::HalfOpen => write!(f, "half_open"),
        }
    }
}

/// Failure tracking for one resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CircuitEntry {
    /// The resource id.
    pub resource_id: String,
    /// Current state.
    pub state: CircuitState,
    /// Consecutive failures since the last success or reset.
    pub failure_count: u32,
    /// Time of the most recent failure.
    pub last_failure_at: Option<DateTime<Utc>>,
    /// A half-open probe was admitted and has not reported back yet.
    #[serde(skip)]
    pub probe_in_flight: bool,
}

impl CircuitEntry {
    /// Creates a closed entry with no failures.
    #[must_use]
    pub fn closed(resource_id: impl Into<String>) -> Self {
        Self {
            resource_id: resource_id.into(),
            state: CircuitState::Closed,
            failure_count: 0,
            last_failure_at: None,
            probe_in_flight: false,
        }
    }
}

/// Tracks consecutive failures per resource and trips at a threshold.
///
/// All read-modify-write operations hold the map's per-key lock, so
/// concurrent failures against the same resource are never lost.
#[derive(Debug)]
pub struct CircuitBreaker {
    entries: DashMap<String, CircuitEntry>,
    failures_before_trip: u32,
    recovery_cooldown: Option<Duration>,
    store: Option<Arc<dyn KeyValueStore>>,
}

impl CircuitBreaker {
    /// Creates a breaker that trips after `failures_before_trip` failures.
    #[must_use]
    pub fn new(failures_before_trip: u32) -> Self {
        Self {
            entries: DashMap::new(),
            failures_before_trip: failures_before_trip.max(1),
            recovery_cooldown: None,
            store: None,
        }
    }

    /// Creates a breaker from configured limits.
    #[must_use]
    pub fn from_limits(limits: &Limits) -> Self {
        let breaker = Self::new(limits.failures_before_trip);
        match limits.recovery_cooldown() {
            Some(cooldown) => breaker.with_recovery_cooldown(cooldown),
            None => breaker,
        }
    }

    /// Enables half-open probing after the given cooldown.
    #[must_use]
    pub fn with_recovery_cooldown(mut self, cooldown: Duration) -> Self {
        self.recovery_cooldown = Some(cooldown);
        self
    }

    /// Mirrors every entry change into `store`.
    #[must_use]
    pub fn with_store(mut self, store: Arc<dyn KeyValueStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Gets the trip threshold.
    #[must_use]
    pub const fn failures_before_trip(&self) -> u32 {
        self.failures_before_trip
    }

    fn cooldown_elapsed(&self, entry: &CircuitEntry) -> bool {
        let Some(cooldown) = self.recovery_cooldown else {
            return false;
        };
        let elapsed = entry
            .last_failure_at
            .and_then(|at| (Utc::now() - at).to_std().ok())
            .unwrap_or(Duration::ZERO);
        elapsed >= cooldown
    }

    /// Returns true if [`allow`](Self::allow) would admit a call right now.
    ///
    /// Read-only: it never moves a circuit to half-open or claims the probe.
    #[must_use]
    pub fn is_available(&self, resource_id: &str) -> bool {
        self.entries.get(resource_id).map_or(true, |entry| match entry.state {
            CircuitState::Closed => true,
            CircuitState::HalfOpen => !entry.probe_in_flight,
            CircuitState::Open => self.cooldown_elapsed(&entry),
        })
    }

    /// Returns true if a call to `resource_id` may proceed.
    ///
    /// In half-open state only the first caller is admitted; it must report
    /// back through `record_success` or `record_failure`.
    pub fn allow(&self, resource_id: &str) -> bool {
        let Some(mut entry) = self.entries.get_mut(resource_id) else {
            return true;
        };

        match entry.state {
            CircuitState::Closed => true,
            CircuitState::HalfOpen => {
                if entry.probe_in_flight {
                    return false;
                }
                entry.probe_in_flight = true;
                true
            }
            CircuitState::Open => {
                if !self.cooldown_elapsed(&entry) {
                    return false;
                }

                entry.state = CircuitState::HalfOpen;
                entry.probe_in_flight = true;
                let snapshot = entry.clone();
                drop(entry);

                info!(resource = %resource_id, "Circuit half-open, admitting probe");
                self.mirror(&snapshot);
                true
            }
        }
    }

    /// Records a failed call and returns the resulting state.
    pub fn record_failure(&self, resource_id: &str) -> CircuitState {
        let (snapshot, tripped) = {
            let mut entry = self
                .entries
                .entry(resource_id.to_string())
                .or_insert_with(|| CircuitEntry::closed(resource_id));

            let previous = entry.state;
            entry.failure_count = entry.failure_count.saturating_add(1);
            entry.last_failure_at = Some(Utc::now());
            entry.probe_in_flight = false;

            if previous == CircuitState::HalfOpen
                || entry.failure_count >= self.failures_before_trip
            {
                entry.state = CircuitState::Open;
            }
            (entry.clone(), previous != CircuitState::Open && entry.state == CircuitState::Open)
        };

        if tripped {
            warn!(
                resource = %resource_id,
                failures = snapshot.failure_count,
                threshold = self.failures_before_trip,
                "Circuit opened"
            );
            get_event_sink().try_emit(
                "circuit.opened",
                Some(serde_json::json!({
                    "resource": resource_id,
                    "failure_count": snapshot.failure_count,
                })),
            );
        } else {
            debug!(
                resource = %resource_id,
                failures = snapshot.failure_count,
                state = %snapshot.state,
                "Recorded completion failure"
            );
        }

        self.mirror(&snapshot);
        snapshot.state
    }

    /// Records a successful call, resetting the failure count.
    pub fn record_success(&self, resource_id: &str) {
        let (snapshot, recovered) = {
            let mut entry = self
                .entries
                .entry(resource_id.to_string())
                .or_insert_with(|| CircuitEntry::closed(resource_id));
            let recovered = entry.state != CircuitState::Closed;
            entry.failure_count = 0;
            entry.state = CircuitState::Closed;
            entry.probe_in_flight = false;
            (entry.clone(), recovered)
        };

        if recovered {
            info!(resource = %resource_id, "Circuit closed after successful probe");
            get_event_sink().try_emit(
                "circuit.closed",
                Some(serde_json::json!({ "resource": resource_id })),
            );
        }
        self.mirror(&snapshot);
    }

    /// Closes one circuit and clears its count.
    pub fn reset(&self, resource_id: &str) {
        let snapshot = CircuitEntry::closed(resource_id);
        self.entries.insert(resource_id.to_string(), snapshot.clone());
        info!(resource = %resource_id, "Circuit reset");
        self.mirror(&snapshot);
    }

    /// Closes every known circuit.
    pub fn reset_all(&self) {
        let ids: Vec<String> = self.entries.iter().map(|e| e.key().clone()).collect();
        for id in ids {
            self.reset(&id);
        }
    }

    /// Returns a copy of one entry.
    #[must_use]
    pub fn entry(&self, resource_id: &str) -> Option<CircuitEntry> {
        self.entries.get(resource_id).map(|e| e.value().clone())
    }

    /// Returns the state of one resource; unknown resources are closed.
    #[must_use]
    pub fn state(&self, resource_id: &str) -> CircuitState {
        self.entries
            .get(resource_id)
            .map_or(CircuitState::Closed, |e| e.state)
    }

    /// Returns the failure count of one resource.
    #[must_use]
    pub fn failure_count(&self, resource_id: &str) -> u32 {
        self.entries.get(resource_id).map_or(0, |e| e.failure_count)
    }

    /// Returns copies of all entries, sorted by resource id.
    #[must_use]
    pub fn snapshot(&self) -> Vec<CircuitEntry> {
        let mut entries: Vec<CircuitEntry> =
            self.entries.iter().map(|e| e.value().clone()).collect();
        entries.sort_by(|a, b| a.resource_id.cmp(&b.resource_id));
        entries
    }

    /// Loads previously mirrored entries for `resource_ids`.
    ///
    /// Returns how many entries were restored. Entries that cannot be decoded
    /// are skipped with a warning.
    pub fn restore_from(&self, store: &dyn KeyValueStore, resource_ids: &[String]) -> usize {
        let mut restored = 0;
        for id in resource_ids {
            let key = format!("{CIRCUIT_KEY_PREFIX}{id}");
            match store.get(&key) {
                Ok(Some(value)) => match serde_json::from_value::<CircuitEntry>(value) {
                    Ok(entry) => {
                        self.entries.insert(id.clone(), entry);
                        restored += 1;
                    }
                    Err(e) => warn!(key = %key, error = %e, "Skipping undecodable circuit entry"),
                },
                Ok(None) => {}
                Err(e) => warn!(key = %key, error = %e, "Failed to read circuit entry"),
            }
        }
        restored
    }

    fn mirror(&self, entry: &CircuitEntry) {
        let Some(store) = &self.store else {
            return;
        };
        let key = format!("{CIRCUIT_KEY_PREFIX}{}", entry.resource_id);
        let result = serde_json::to_value(entry)
            .map_err(|e| e.to_string())
            .and_then(|value| store.set(&key, value).map_err(|e| e.to_string()));
        if let Err(e) = result {
            warn!(key = %key, error = %e, "Failed to mirror circuit entry");
        }
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::from_limits(&Limits::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::InMemoryStore;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_stays_closed_below_threshold() {
        let breaker = CircuitBreaker::new(3);
        for _ in 0..2 {
            assert_eq!(breaker.record_failure("fast"), CircuitState::Closed);
        }
        assert!(breaker.allow("fast"));
        assert_eq!(breaker.failure_count("fast"), 2);
    }

    #[test]
    fn test_trips_at_exact_threshold() {
        let breaker = CircuitBreaker::new(3);
        breaker.record_failure("fast");
        breaker.record_failure("fast");
        assert_eq!(breaker.record_failure("fast"), CircuitState::Open);
        assert!(!breaker.allow("fast"));
        assert!(breaker.allow("other"));
    }

    #[test]
    fn test_success_resets_count() {
        let breaker = CircuitBreaker::new(3);
        breaker.record_failure("fast");
        breaker.record_failure("fast");
        breaker.record_success("fast");
        assert_eq!(breaker.failure_count("fast"), 0);

        breaker.record_failure("fast");
        breaker.record_failure("fast");
        assert_eq!(breaker.state("fast"), CircuitState::Closed);
    }

    #[test]
    fn test_open_without_cooldown_needs_reset() {
        let breaker = CircuitBreaker::new(1);
        breaker.record_failure("fast");
        std::thread::sleep(Duration::from_millis(20));
        assert!(!breaker.allow("fast"));

        breaker.reset("fast");
        assert!(breaker.allow("fast"));
        assert_eq!(breaker.failure_count("fast"), 0);
    }

    #[test]
    fn test_reset_all() {
        let breaker = CircuitBreaker::new(1);
        breaker.record_failure("a");
        breaker.record_failure("b");
        breaker.reset_all();
        assert!(breaker.allow("a"));
        assert!(breaker.allow("b"));
    }

    #[test]
    fn test_half_open_probe_after_cooldown() {
        let breaker = CircuitBreaker::new(1).with_recovery_cooldown(Duration::from_millis(30));
        breaker.record_failure("fast");
        assert!(!breaker.allow("fast"));

        std::thread::sleep(Duration::from_millis(50));
        assert!(breaker.allow("fast"));
        assert_eq!(breaker.state("fast"), CircuitState::HalfOpen);

        assert_eq!(breaker.record_failure("fast"), CircuitState::Open);
        assert!(!breaker.allow("fast"));

        std::thread::sleep(Duration::from_millis(50));
        assert!(breaker.allow("fast"));
        breaker.record_success("fast");
        assert_eq!(breaker.state("fast"), CircuitState::Closed);
    }

    #[test]
    fn test_half_open_admits_one_concurrent_probe() {
        let breaker = Arc::new(
            CircuitBreaker::new(1).with_recovery_cooldown(Duration::from_millis(10)),
        );
        breaker.record_failure("fast");
        std::thread::sleep(Duration::from_millis(30));
        assert!(breaker.is_available("fast"));
        assert_eq!(breaker.state("fast"), CircuitState::Open);

        let barrier = Arc::new(std::sync::Barrier::new(5));
        let handles: Vec<_> = (0..5)
            .map(|_| {
                let breaker = Arc::clone(&breaker);
                let barrier = Arc::clone(&barrier);
                std::thread::spawn(move || {
                    barrier.wait();
                    breaker.allow("fast")
                })
            })
            .collect();
        let admitted = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|allowed| *allowed)
            .count();

        assert_eq!(admitted, 1);
        assert!(!breaker.is_available("fast"));
        assert_eq!(breaker.state("fast"), CircuitState::HalfOpen);
        assert!(!breaker.allow("fast"));

        breaker.record_success("fast");
        assert!(breaker.allow("fast"));
        assert!(breaker.allow("fast"));
    }

    #[test]
    fn test_concurrent_failures_are_not_lost() {
        let breaker = Arc::new(CircuitBreaker::new(1_000));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let breaker = Arc::clone(&breaker);
                std::thread::spawn(move || {
                    for _ in 0..50 {
                        breaker.record_failure("shared");
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(breaker.failure_count("shared"), 400);
    }

    #[test]
    fn test_mirrors_and_restores_entries() {
        let store = Arc::new(InMemoryStore::new());
        let breaker = CircuitBreaker::new(2).with_store(store.clone());
        breaker.record_failure("fast");
        breaker.record_failure("fast");

        let stored = store.get("circuit:fast").unwrap().unwrap();
        assert_eq!(stored["state"], "open");

        let restored = CircuitBreaker::new(2);
        let count = restored.restore_from(store.as_ref(), &["fast".into(), "slow".into()]);
        assert_eq!(count, 1);
        assert_eq!(restored.state("fast"), CircuitState::Open);
        assert_eq!(restored.entry("fast").unwrap().failure_count, 2);
    }

    #[test]
    fn test_snapshot_sorted() {
        let breaker = CircuitBreaker::new(3);
        breaker.record_failure("b");
        breaker.record_success("a");
        let ids: Vec<_> = breaker.snapshot().into_iter().map(|e| e.resource_id).collect();
        assert_eq!(ids, vec!["a".to_string(), "b".to_string()]);
    }
}
