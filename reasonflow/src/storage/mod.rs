//! Key/value storage collaborator.
//!
//! The engine only needs `get`, `set` and `increment`. Circuit entries are
//! mirrored under `circuit:<id>` and run history under `history:<run_id>`.

use crate::errors::StoreError;
use dashmap::DashMap;
use serde_json::Value;
use std::sync::Arc;

/// Minimal key/value persistence.
pub trait KeyValueStore: Send + Sync + std::fmt::Debug {
    /// Reads a value.
    fn get(&self, key: &str) -> Result<Option<Value>, StoreError>;

    /// Writes a value, replacing any previous one.
    fn set(&self, key: &str, value: Value) -> Result<(), StoreError>;

    /// Atomically adds `by` to an integer counter, creating it at zero.
    fn increment(&self, key: &str, by: i64) -> Result<i64, StoreError>;
}

/// Process-local store backed by a concurrent map.
#[derive(Debug, Default, Clone)]
pub struct InMemoryStore {
    entries: Arc<DashMap<String, Value>>,
}

impl InMemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns all keys starting with `prefix`, sorted.
    #[must_use]
    pub fn keys_with_prefix(&self, prefix: &str) -> Vec<String> {
        let mut keys: Vec<String> = self
            .entries
            .iter()
            .filter(|e| e.key().starts_with(prefix))
            .map(|e| e.key().clone())
            .collect();
        keys.sort();
        keys
    }
}

impl KeyValueStore for InMemoryStore {
    fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        Ok(self.entries.get(key).map(|v| v.value().clone()))
    }

    fn set(&self, key: &str, value: Value) -> Result<(), StoreError> {
        self.entries.insert(key.to_string(), value);
        Ok(())
    }

    fn increment(&self, key: &str, by: i64) -> Result<i64, StoreError> {
        let mut slot = self
            .entries
            .entry(key.to_string())
            .or_insert_with(|| Value::from(0_i64));
        let current = slot.as_i64().ok_or_else(|| StoreError::WrongType {
            key: key.to_string(),
            expected: "an integer".to_string(),
        })?;
        let next = current.saturating_add(by);
        *slot = Value::from(next);
        Ok(next)
    }
}
