//! Timeout-bounded regex matching for user-controlled patterns.
//!
//! Patterns come from configuration and rule files, so they are compiled
//! lazily and cached. A pattern that fails to compile, or a match that does
//! not finish within the timeout, is treated as "no match" and logged.

use dashmap::DashMap;
use regex::{Regex, RegexBuilder};
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// Upper bound on the compiled program size of a single pattern.
const COMPILED_SIZE_LIMIT: usize = 1 << 20;

/// A cached, timeout-bounded regex matcher.
#[derive(Debug, Clone)]
pub struct PatternMatcher {
    cache: Arc<DashMap<String, Option<Regex>>>,
    timeout: Duration,
    case_insensitive: bool,
}

impl PatternMatcher {
    /// Creates a matcher with the given per-match timeout.
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        Self {
            cache: Arc::new(DashMap::new()),
            timeout,
            case_insensitive: false,
        }
    }

    /// Makes every compiled pattern case-insensitive.
    #[must_use]
    pub fn case_insensitive(mut self) -> Self {
        self.case_insensitive = true;
        self
    }

    /// Gets the per-match timeout.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    fn compiled(&self, pattern: &str) -> Option<Regex> {
        if let Some(entry) = self.cache.get(pattern) {
            return entry.clone();
        }

        let compiled = RegexBuilder::new(pattern)
            .case_insensitive(self.case_insensitive)
            .size_limit(COMPILED_SIZE_LIMIT)
            .build();

        let regex = match compiled {
            Ok(regex) => Some(regex),
            Err(e) => {
                warn!(pattern = %pattern, error = %e, "Ignoring malformed pattern");
                None
            }
        };
        self.cache.insert(pattern.to_string(), regex.clone());
        regex
    }

    /// Returns true if `pattern` matches `text` within the timeout.
    pub async fn is_match(&self, pattern: &str, text: &str) -> bool {
        self.find(pattern, text).await.is_some()
    }

    /// Returns the first matched substring, if any.
    ///
    /// The match runs on the blocking pool so a slow pattern never stalls the
    /// runtime. A match that outlives the timeout is abandoned to finish there.
    pub async fn find(&self, pattern: &str, text: &str) -> Option<String> {
        let regex = self.compiled(pattern)?;
        let haystack = text.to_string();
        let task = tokio::task::spawn_blocking(move || {
            regex.find(&haystack).map(|m| m.as_str().to_string())
        });

        match tokio::time::timeout(self.timeout, task).await {
            Ok(Ok(found)) => found,
            Ok(Err(e)) => {
                warn!(pattern = %pattern, error = %e, "Pattern match task failed, treating as no match");
                None
            }
            Err(_) => {
                warn!(
                    pattern = %pattern,
                    timeout_ms = self.timeout.as_millis(),
                    "Pattern match timed out, treating as no match"
                );
                None
            }
        }
    }

    /// Returns the first pattern from `patterns` that matches `text`.
    pub async fn first_match<'a, I>(&self, patterns: I, text: &str) -> Option<&'a str>
    where
        I: IntoIterator<Item = &'a String>,
    {
        for pattern in patterns {
            if self.is_match(pattern, text).await {
                return Some(pattern.as_str());
            }
        }
        None
    }

    /// Number of cached patterns, including malformed ones.
    #[must_use]
    pub fn cached_patterns(&self) -> usize {
        self.cache.len()
    }
}

impl Default for PatternMatcher {
    fn default() -> Self {
        Self::new(Duration::from_millis(100))
    }
}
