//! Content-quality rule sources.

use super::seed::SeedCell;
use crate::errors::ConfigError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

/// Named rule categories, each a list of regex patterns.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleSet {
    /// Category name -> patterns.
    #[serde(default)]
    pub categories: BTreeMap<String, Vec<String>>,
}

impl RuleSet {
    /// Creates an empty rule set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a category.
    #[must_use]
    pub fn with_category(mut self, name: impl Into<String>, patterns: Vec<String>) -> Self {
        self.categories.insert(name.into(), patterns);
        self
    }

    /// Merges another rule set, appending patterns per category.
    pub fn merge(&mut self, other: &Self) {
        for (name, patterns) in &other.categories {
            self.categories
                .entry(name.clone())
                .or_default()
                .extend(patterns.iter().cloned());
        }
    }

    /// Total pattern count across categories.
    #[must_use]
    pub fn pattern_count(&self) -> usize {
        self.categories.values().map(Vec::len).sum()
    }

    /// Returns true if there are no categories.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.categories.is_empty()
    }
}

/// Source of content-quality rules.
pub trait RuleProvider: Send + Sync {
    /// Describes where the rules come from, for logs.
    fn source(&self) -> String;

    /// Loads the rule set.
    fn load(&self) -> Result<RuleSet, ConfigError>;
}

/// Rules supplied in memory.
#[derive(Debug, Clone, Default)]
pub struct StaticRules {
    rules: RuleSet,
}

impl StaticRules {
    /// Wraps an in-memory rule set.
    #[must_use]
    pub fn new(rules: RuleSet) -> Self {
        Self { rules }
    }

    /// Builds a provider from the `content_rules` table of a config.
    #[must_use]
    pub fn from_map(categories: BTreeMap<String, Vec<String>>) -> Self {
        Self::new(RuleSet { categories })
    }
}

impl RuleProvider for StaticRules {
    fn source(&self) -> String {
        "static".to_string()
    }

    fn load(&self) -> Result<RuleSet, ConfigError> {
        Ok(self.rules.clone())
    }
}

/// Rules read from a JSON file.
///
/// Accepts either `{"categories": {...}}` or a bare `{"name": ["pattern"]}` map.
#[derive(Debug, Clone)]
pub struct JsonFileRules {
    path: PathBuf,
}

impl JsonFileRules {
    /// Creates a provider for the given path.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Gets the file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl RuleProvider for JsonFileRules {
    fn source(&self) -> String {
        self.path.display().to_string()
    }

    fn load(&self) -> Result<RuleSet, ConfigError> {
        let raw = std::fs::read_to_string(&self.path).map_err(|e| ConfigError::Unreadable {
            path: self.source(),
            reason: e.to_string(),
        })?;

        let value: serde_json::Value =
            serde_json::from_str(&raw).map_err(|e| ConfigError::Malformed(e.to_string()))?;
        if value.get("categories").is_some() {
            serde_json::from_value::<RuleSet>(value)
        } else {
            serde_json::from_value(value).map(|categories| RuleSet { categories })
        }
        .map_err(|e| ConfigError::Malformed(e.to_string()))
    }
}

static SEEDED_RULES: SeedCell<RuleSet> = SeedCell::new();

/// Resolves the process-wide rule set, loading it from `provider` only once.
pub fn seeded_rules(provider: &dyn RuleProvider) -> Result<Arc<RuleSet>, ConfigError> {
    SEEDED_RULES.get_or_seed(|| {
        let rules = provider.load()?;
        info!(
            source = %provider.source(),
            categories = rules.categories.len(),
            patterns = rules.pattern_count(),
            "Seeded content rules"
        );
        Ok(rules)
    })
}
