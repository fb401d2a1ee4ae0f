//! Named stage factories.

use super::EngineServices;
use crate::errors::PipelineValidationError;
use crate::stages::{
    AskStage, ExecuteStage, GuardStage, IntakeStage, LintStage, ReviewStage, RouteStage, Stage,
};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Builds a stage instance from the engine services.
pub type StageFactory = Arc<dyn Fn(&EngineServices) -> Arc<dyn Stage> + Send + Sync>;

/// The set of stage names a pipeline may use.
#[derive(Clone, Default)]
pub struct StageRegistry {
    factories: BTreeMap<String, StageFactory>,
}

impl fmt::Debug for StageRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StageRegistry")
            .field("stages", &self.available())
            .finish()
    }
}

impl StageRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry holding every built-in stage.
    #[must_use]
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register("intake", |s| Arc::new(IntakeStage::new(s)));
        registry.register("guard", |s| Arc::new(GuardStage::new(s)));
        registry.register("route", |_| Arc::new(RouteStage));
        registry.register("execute", |s| Arc::new(ExecuteStage::new(s)));
        registry.register("ask", |s| Arc::new(AskStage::new(s)));
        registry.register("lint", |s| Arc::new(LintStage::new(s)));
        registry.register("review", |s| Arc::new(ReviewStage::new(s)));
        registry
    }

    /// Registers a factory, replacing any with the same name.
    pub fn register<F>(&mut self, name: impl Into<String>, factory: F)
    where
        F: Fn(&EngineServices) -> Arc<dyn Stage> + Send + Sync + 'static,
    {
        self.factories.insert(name.into(), Arc::new(factory));
    }

    /// Builder-style [`StageRegistry::register`].
    #[must_use]
    pub fn with_stage<F>(mut self, name: impl Into<String>, factory: F) -> Self
    where
        F: Fn(&EngineServices) -> Arc<dyn Stage> + Send + Sync + 'static,
    {
        self.register(name, factory);
        self
    }

    /// Returns true if `name` is registered.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Registered names, sorted.
    #[must_use]
    pub fn available(&self) -> Vec<String> {
        self.factories.keys().cloned().collect()
    }

    /// Instantiates the stage registered as `name`.
    pub fn build(&self, name: &str, services: &EngineServices) -> Result<Arc<dyn Stage>, PipelineValidationError> {
        self.factories
            .get(name)
            .map(|factory| factory(services))
            .ok_or_else(|| PipelineValidationError::unknown_stage(name, &self.available()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_builtins_are_registered() {
        let registry = StageRegistry::with_builtins();
        assert_eq!(
            registry.available(),
            vec!["ask", "execute", "guard", "intake", "lint", "review", "route"]
        );
        assert!(registry.contains("guard"));
        assert!(!registry.contains("gaurd"));
    }
}
