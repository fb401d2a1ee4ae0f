//! Bounded observation history.

use crate::storage::KeyValueStore;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tracing::warn;
use uuid::Uuid;

/// One recorded observation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// Monotonic step number, starting at 1.
    pub step: u64,
    /// Observation text.
    pub observation: String,
}

/// FIFO buffer holding at most `max_size` entries.
///
/// Step numbers keep increasing across evictions, so a reader can tell how
/// much history was dropped.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryBuffer {
    entries: VecDeque<HistoryEntry>,
    max_size: usize,
    next_step: u64,
}

impl HistoryBuffer {
    /// Creates an empty buffer.
    #[must_use]
    pub fn new(max_size: usize) -> Self {
        let max_size = max_size.max(1);
        Self {
            entries: VecDeque::with_capacity(max_size),
            max_size,
            next_step: 1,
        }
    }

    /// Appends an observation, evicting the oldest entry when full.
    pub fn push(&mut self, observation: impl Into<String>) -> u64 {
        let step = self.next_step;
        self.next_step += 1;
        if self.entries.len() == self.max_size {
            self.entries.pop_front();
        }
        self.entries.push_back(HistoryEntry {
            step,
            observation: observation.into(),
        });
        step
    }

    /// Iterates entries oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &HistoryEntry> {
        self.entries.iter()
    }

    /// Number of retained entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if nothing was recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Capacity.
    #[must_use]
    pub const fn max_size(&self) -> usize {
        self.max_size
    }

    /// Most recent observation.
    #[must_use]
    pub fn last(&self) -> Option<&str> {
        self.entries.back().map(|e| e.observation.as_str())
    }

    /// Copies of the retained entries.
    #[must_use]
    pub fn entries(&self) -> Vec<HistoryEntry> {
        self.entries.iter().cloned().collect()
    }

    /// Renders entries as prompt lines.
    #[must_use]
    pub fn render(&self) -> String {
        self.entries
            .iter()
            .map(|e| format!("[{}] {}", e.step, e.observation))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Saves the retained entries under `history:<run_id>`.
    pub fn persist(&self, store: &dyn KeyValueStore, run_id: Uuid) {
        let key = format!("history:{run_id}");
        let result = serde_json::to_value(self.entries())
            .map_err(|e| e.to_string())
            .and_then(|value| store.set(&key, value).map_err(|e| e.to_string()));
        if let Err(e) = result {
            warn!(key = %key, error = %e, "Failed to persist history");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::InMemoryStore;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_bounded_fifo_with_monotonic_steps() {
        let mut history = HistoryBuffer::new(50);
        for i in 0..60 {
            history.push(format!("obs {i}"));
        }

        assert_eq!(history.len(), 50);
        let entries = history.entries();
        assert_eq!(entries.first().unwrap().observation, "obs 10");
        assert_eq!(entries.first().unwrap().step, 11);
        assert_eq!(entries.last().unwrap().step, 60);
        assert!(entries.windows(2).all(|w| w[1].step == w[0].step + 1));
    }

    #[test]
    fn test_last_and_render() {
        let mut history = HistoryBuffer::new(2);
        assert!(history.last().is_none());
        history.push("a");
        history.push("b");
        history.push("c");
        assert_eq!(history.last(), Some("c"));
        assert_eq!(history.render(), "[2] b\n[3] c");
    }

    #[test]
    fn test_persist_to_store() {
        let store = InMemoryStore::new();
        let mut history = HistoryBuffer::new(5);
        history.push("first");
        let run_id = Uuid::new_v4();
        history.persist(&store, run_id);

        let saved = store.get(&format!("history:{run_id}")).unwrap().unwrap();
        assert_eq!(saved[0]["observation"], "first");
        assert_eq!(saved[0]["step"], 1);
    }
}
