//! Ready-made engine configuration and services for tests.

use super::{EchoReviser, ScriptedCompletionService, StaticReviewer};
use crate::config::EngineConfig;
use crate::council::Verdict;
use crate::errors::ReasonflowError;
use crate::pipeline::{EngineServices, EngineServicesBuilder};
use std::sync::Arc;

/// Default configuration with the working root in the temp directory.
#[must_use]
pub fn test_config() -> EngineConfig {
    EngineConfig::default().with_working_root(std::env::temp_dir().join("reasonflow-workspace"))
}

/// A services builder whose council approves everything.
#[must_use]
pub fn test_services_builder(config: EngineConfig, service: ScriptedCompletionService) -> EngineServicesBuilder {
    EngineServices::builder(config, Arc::new(service))
        .with_reviewer(Arc::new(StaticReviewer::new(Verdict::Approve)))
        .with_reviser(Arc::new(EchoReviser::new()))
}

/// Builds services from [`test_services_builder`].
pub fn test_services(
    config: EngineConfig,
    service: ScriptedCompletionService,
) -> Result<EngineServices, ReasonflowError> {
    test_services_builder(config, service).build()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_config_is_an_error() {
        let mut config = test_config();
        config.limits.max_iterations = 0;
        assert!(test_services(config, ScriptedCompletionService::new()).is_err());
        assert!(test_services(test_config(), ScriptedCompletionService::new()).is_ok());
    }
}
