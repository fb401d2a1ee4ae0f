//! Engine configuration and reference-data seeding.
//!
//! Configuration is plain serde data with per-field defaults. Rule data for
//! the lint stage comes from a [`RuleProvider`] and is resolved once per
//! process through a [`SeedCell`].

mod rules;
mod seed;
mod settings;

pub use rules::{seeded_rules, JsonFileRules, RuleProvider, RuleSet, StaticRules};
pub use seed::SeedCell;
pub use settings::{
    validate_roster, CouncilConfig, EngineConfig, Limits, ParticipantConfig, SanitizerConfig,
};
