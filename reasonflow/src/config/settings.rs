//! Engine configuration with serde defaults.

use crate::errors::ConfigError;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Numeric limits that bound every invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Limits {
    /// Consecutive failures that trip a circuit.
    #[serde(default = "default_failures_before_trip")]
    pub failures_before_trip: u32,
    /// Optional cooldown after which an open circuit admits one probe.
    #[serde(default)]
    pub recovery_cooldown_secs: Option<f64>,
    /// Wall-clock limit for one executor run, in seconds.
    #[serde(default = "default_wall_clock_limit")]
    pub wall_clock_limit_secs: f64,
    /// Per-call timeout for the completion service, in seconds.
    #[serde(default = "default_call_timeout")]
    pub call_timeout_secs: f64,
    /// Maximum retained history entries per run.
    #[serde(default = "default_max_history_size")]
    pub max_history_size: usize,
    /// Maximum accepted input length in characters.
    #[serde(default = "default_max_input_length")]
    pub max_input_length: usize,
    /// Iteration cap for a reasoning loop.
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,
    /// Attempts allowed for the reflexion pattern.
    #[serde(default = "default_max_reflexion_attempts")]
    pub max_reflexion_attempts: usize,
    /// Per-match timeout for user-controlled patterns, in milliseconds.
    #[serde(default = "default_regex_timeout_ms")]
    pub regex_timeout_ms: u64,
}

fn default_failures_before_trip() -> u32 {
    3
}

fn default_wall_clock_limit() -> f64 {
    120.0
}

fn default_call_timeout() -> f64 {
    60.0
}

fn default_max_history_size() -> usize {
    50
}

fn default_max_input_length() -> usize {
    10_000
}

fn default_max_iterations() -> usize {
    10
}

fn default_max_reflexion_attempts() -> usize {
    3
}

fn default_regex_timeout_ms() -> u64 {
    100
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            failures_before_trip: default_failures_before_trip(),
            recovery_cooldown_secs: None,
            wall_clock_limit_secs: default_wall_clock_limit(),
            call_timeout_secs: default_call_timeout(),
            max_history_size: default_max_history_size(),
            max_input_length: default_max_input_length(),
            max_iterations: default_max_iterations(),
            max_reflexion_attempts: default_max_reflexion_attempts(),
            regex_timeout_ms: default_regex_timeout_ms(),
        }
    }
}

impl Limits {
    /// Gets the wall-clock limit as a Duration.
    #[must_use]
    pub fn wall_clock_limit(&self) -> Duration {
        Duration::from_secs_f64(self.wall_clock_limit_secs)
    }

    /// Gets the per-call timeout as a Duration.
    #[must_use]
    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.call_timeout_secs)
    }

    /// Gets the regex timeout as a Duration.
    #[must_use]
    pub fn regex_timeout(&self) -> Duration {
        Duration::from_millis(self.regex_timeout_ms)
    }

    /// Gets the recovery cooldown as a Duration, if configured.
    #[must_use]
    pub fn recovery_cooldown(&self) -> Option<Duration> {
        self.recovery_cooldown_secs.map(Duration::from_secs_f64)
    }
}

/// A council participant definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParticipantConfig {
    /// Unique participant id.
    pub id: String,
    /// Voting weight.
    pub weight: f64,
    /// Whether a rejection from this participant blocks consensus.
    #[serde(default)]
    pub has_veto: bool,
    /// What this participant reviews for.
    #[serde(default)]
    pub focus: String,
}

impl ParticipantConfig {
    /// Creates a participant definition.
    #[must_use]
    pub fn new(id: impl Into<String>, weight: f64, has_veto: bool) -> Self {
        Self {
            id: id.into(),
            weight,
            has_veto,
            focus: String::new(),
        }
    }

    /// Sets the review focus.
    #[must_use]
    pub fn with_focus(mut self, focus: impl Into<String>) -> Self {
        self.focus = focus.into();
        self
    }
}

/// Council voting configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CouncilConfig {
    /// Minimum weighted approval for a round to pass.
    #[serde(default = "default_consensus_threshold")]
    pub consensus_threshold: f64,
    /// Hard cap on refinement rounds.
    #[serde(default = "default_max_rounds")]
    pub max_rounds: usize,
    /// The participant roster.
    #[serde(default = "default_participants")]
    pub participants: Vec<ParticipantConfig>,
}

fn default_consensus_threshold() -> f64 {
    0.70
}

fn default_max_rounds() -> usize {
    25
}

fn default_participants() -> Vec<ParticipantConfig> {
    vec![
        ParticipantConfig::new("architect", 0.30, true)
            .with_focus("structural soundness and fit with the stated goal"),
        ParticipantConfig::new("security", 0.25, true)
            .with_focus("unsafe operations, data exposure and destructive side effects"),
        ParticipantConfig::new("quality", 0.20, false)
            .with_focus("correctness, completeness and clarity"),
        ParticipantConfig::new("product", 0.15, false)
            .with_focus("usefulness of the result for the requester"),
        ParticipantConfig::new("operations", 0.10, false)
            .with_focus("cost, latency and operational risk"),
    ]
}

impl Default for CouncilConfig {
    fn default() -> Self {
        Self {
            consensus_threshold: default_consensus_threshold(),
            max_rounds: default_max_rounds(),
            participants: default_participants(),
        }
    }
}

/// Tool-input sanitizer configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SanitizerConfig {
    /// Case-insensitive deny-list of dangerous input patterns.
    #[serde(default = "default_danger_patterns")]
    pub danger_patterns: Vec<String>,
    /// Root that file-write tools must stay inside. Defaults to the process cwd.
    #[serde(default)]
    pub working_root: Option<PathBuf>,
}

fn default_danger_patterns() -> Vec<String> {
    [
        // Destructive filesystem operations
        r"\brm\s+(-[a-z]*\s+)*-[a-z]*[rf][a-z]*\b",
        r"\brm\s+--(recursive|force)\b",
        r"\bshred\b",
        r"\bchmod\s+(-r\s+)?0?777\s+/",
        // Device-node writes
        r"\bdd\s+.*\bof=/dev/",
        r">\s*/dev/(sd|hd|nvme|xvd|vd|disk|mmcblk)",
        // Schema-destroying statements
        r"\bdrop\s+(table|database|schema)\b",
        r"\btruncate\s+table\b",
        // Disk formatting
        r"\bmkfs(\.[a-z0-9]+)?\b",
        r"\bformat\s+[a-z]:",
        r"\b(fdisk|wipefs)\b",
        // Fork bomb
        r":\(\)\s*\{\s*:\s*\|\s*:\s*&\s*\}\s*;\s*:",
    ]
    .iter()
    .map(|s| (*s).to_string())
    .collect()
}

impl Default for SanitizerConfig {
    fn default() -> Self {
        Self {
            danger_patterns: default_danger_patterns(),
            working_root: None,
        }
    }
}

/// Top-level engine configuration.
///
/// Resolved once per process and treated as read-only afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Numeric limits.
    #[serde(default)]
    pub limits: Limits,
    /// Council voting setup.
    #[serde(default)]
    pub council: CouncilConfig,
    /// Tool sanitizer setup.
    #[serde(default)]
    pub sanitizer: SanitizerConfig,
    /// Completion resources in preference order (e.g. model tiers).
    #[serde(default = "default_resources")]
    pub resources: Vec<String>,
    /// Named content-quality rule sets: category -> patterns.
    #[serde(default)]
    pub content_rules: BTreeMap<String, Vec<String>>,
}

fn default_resources() -> Vec<String> {
    vec!["primary".to_string(), "fallback".to_string()]
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            limits: Limits::default(),
            council: CouncilConfig::default(),
            sanitizer: SanitizerConfig::default(),
            resources: default_resources(),
            content_rules: BTreeMap::new(),
        }
    }
}

impl EngineConfig {
    /// Creates a configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses and validates a JSON configuration document.
    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self =
            serde_json::from_str(raw).map_err(|e| ConfigError::Malformed(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reads and validates a JSON configuration file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| ConfigError::Unreadable {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Self::from_json_str(&raw)
    }

    /// Sets the resource tiers.
    #[must_use]
    pub fn with_resources(mut self, resources: Vec<String>) -> Self {
        self.resources = resources;
        self
    }

    /// Sets the limits.
    #[must_use]
    pub fn with_limits(mut self, limits: Limits) -> Self {
        self.limits = limits;
        self
    }

    /// Sets the council configuration.
    #[must_use]
    pub fn with_council(mut self, council: CouncilConfig) -> Self {
        self.council = council;
        self
    }

    /// Sets the working root for file-write tools.
    #[must_use]
    pub fn with_working_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.sanitizer.working_root = Some(root.into());
        self
    }

    /// Adds a content-quality rule category.
    #[must_use]
    pub fn with_content_rule(mut self, category: impl Into<String>, patterns: Vec<String>) -> Self {
        self.content_rules.insert(category.into(), patterns);
        self
    }

    /// Validates every section.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let limits = &self.limits;
        if limits.failures_before_trip < 1 {
            return Err(ConfigError::invalid("failures_before_trip", "must be >= 1"));
        }
        if !(limits.wall_clock_limit_secs.is_finite() && limits.wall_clock_limit_secs > 0.0) {
            return Err(ConfigError::invalid("wall_clock_limit_secs", "must be positive"));
        }
        if !(limits.call_timeout_secs.is_finite() && limits.call_timeout_secs > 0.0) {
            return Err(ConfigError::invalid("call_timeout_secs", "must be positive"));
        }
        if let Some(cooldown) = limits.recovery_cooldown_secs {
            if !(cooldown.is_finite() && cooldown > 0.0) {
                return Err(ConfigError::invalid(
                    "recovery_cooldown_secs",
                    "must be positive when provided",
                ));
            }
        }
        if limits.max_history_size < 1 {
            return Err(ConfigError::invalid("max_history_size", "must be >= 1"));
        }
        if limits.max_input_length < 1 {
            return Err(ConfigError::invalid("max_input_length", "must be >= 1"));
        }
        if limits.max_iterations < 1 {
            return Err(ConfigError::invalid("max_iterations", "must be >= 1"));
        }
        if limits.max_reflexion_attempts < 1 {
            return Err(ConfigError::invalid("max_reflexion_attempts", "must be >= 1"));
        }
        if limits.regex_timeout_ms < 1 {
            return Err(ConfigError::invalid("regex_timeout_ms", "must be >= 1"));
        }

        let council = &self.council;
        if !(council.consensus_threshold > 0.0 && council.consensus_threshold <= 1.0) {
            return Err(ConfigError::invalid(
                "consensus_threshold",
                "must be in (0.0, 1.0]",
            ));
        }
        if council.max_rounds < 1 {
            return Err(ConfigError::invalid("max_rounds", "must be >= 1"));
        }
        validate_roster(&council.participants)?;

        if self.resources.is_empty() {
            return Err(ConfigError::invalid("resources", "at least one resource is required"));
        }
        let mut seen = HashSet::new();
        for resource in &self.resources {
            if resource.trim().is_empty() {
                return Err(ConfigError::invalid("resources", "resource ids cannot be blank"));
            }
            if !seen.insert(resource.as_str()) {
                return Err(ConfigError::invalid(
                    "resources",
                    format!("duplicate resource '{resource}'"),
                ));
            }
        }

        Ok(())
    }
}

/// Validates a council roster.
pub fn validate_roster(participants: &[ParticipantConfig]) -> Result<(), ConfigError> {
    if participants.is_empty() {
        return Err(ConfigError::InvalidRoster("roster is empty".to_string()));
    }
    let mut seen = HashSet::new();
    for participant in participants {
        if participant.id.trim().is_empty() {
            return Err(ConfigError::InvalidRoster(
                "participant ids cannot be blank".to_string(),
            ));
        }
        if !seen.insert(participant.id.as_str()) {
            return Err(ConfigError::InvalidRoster(format!(
                "duplicate participant '{}'",
                participant.id
            )));
        }
        if !(participant.weight.is_finite() && participant.weight > 0.0) {
            return Err(ConfigError::InvalidRoster(format!(
                "participant '{}' has non-positive weight {}",
                participant.id, participant.weight
            )));
        }
    }
    Ok(())
}
