//! Shared engine collaborators handed to every stage.

use crate::completion::{CompletionService, GuardedCompletion};
use crate::config::{seeded_rules, EngineConfig, RuleProvider, RuleSet};
use crate::council::{CompletionReviewer, CompletionReviser, Council, Reviewer, Reviser};
use crate::errors::ReasonflowError;
use crate::events::{get_event_sink, EventSink};
use crate::executor::{Evaluator, Executor, Sanitizer};
use crate::resilience::{CircuitBreaker, ResourceSelector};
use crate::storage::KeyValueStore;
use crate::tools::{ReadFileTool, ToolRegistry, WriteFileTool};
use crate::utils::PatternMatcher;
use std::fmt;
use std::sync::Arc;
use tracing::info;

/// Everything a stage may call out to.
///
/// Built once per engine and cloned cheaply into stages. The circuit breaker
/// inside is the only mutable state shared between invocations.
#[derive(Clone)]
pub struct EngineServices {
    config: Arc<EngineConfig>,
    breaker: Arc<CircuitBreaker>,
    completion: GuardedCompletion,
    executor: Arc<Executor>,
    council: Arc<Council>,
    matcher: PatternMatcher,
    rules: Arc<RuleSet>,
    store: Option<Arc<dyn KeyValueStore>>,
    events: Arc<dyn EventSink>,
}

impl fmt::Debug for EngineServices {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineServices")
            .field("resources", &self.config.resources)
            .field("executor", &self.executor)
            .field("rule_patterns", &self.rules.pattern_count())
            .field("has_store", &self.store.is_some())
            .finish_non_exhaustive()
    }
}

impl EngineServices {
    /// Starts a builder around the completion service.
    #[must_use]
    pub fn builder(config: EngineConfig, service: Arc<dyn CompletionService>) -> EngineServicesBuilder {
        EngineServicesBuilder {
            config,
            service,
            store: None,
            tools: None,
            reviewer: None,
            reviser: None,
            evaluator: None,
            rule_provider: None,
            events: None,
        }
    }

    /// Gets the configuration.
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Gets the circuit breaker.
    #[must_use]
    pub fn breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }

    /// Gets the guarded completion client.
    #[must_use]
    pub const fn completion(&self) -> &GuardedCompletion {
        &self.completion
    }

    /// Gets the executor.
    #[must_use]
    pub fn executor(&self) -> &Executor {
        &self.executor
    }

    /// Gets the council.
    #[must_use]
    pub fn council(&self) -> &Council {
        &self.council
    }

    /// Gets the content-rule matcher.
    #[must_use]
    pub const fn matcher(&self) -> &PatternMatcher {
        &self.matcher
    }

    /// Gets the content rules.
    #[must_use]
    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    /// Gets the key/value store, if one is attached.
    #[must_use]
    pub fn store(&self) -> Option<&Arc<dyn KeyValueStore>> {
        self.store.as_ref()
    }

    /// Gets the event sink.
    #[must_use]
    pub fn events(&self) -> &Arc<dyn EventSink> {
        &self.events
    }

    /// A resource selector over the shared breaker.
    #[must_use]
    pub fn selector(&self) -> ResourceSelector {
        ResourceSelector::new(Arc::clone(&self.breaker))
    }
}

/// Builder for [`EngineServices`].
pub struct EngineServicesBuilder {
    config: EngineConfig,
    service: Arc<dyn CompletionService>,
    store: Option<Arc<dyn KeyValueStore>>,
    tools: Option<Arc<ToolRegistry>>,
    reviewer: Option<Arc<dyn Reviewer>>,
    reviser: Option<Arc<dyn Reviser>>,
    evaluator: Option<Arc<dyn Evaluator>>,
    rule_provider: Option<Arc<dyn RuleProvider>>,
    events: Option<Arc<dyn EventSink>>,
}

impl EngineServicesBuilder {
    /// Attaches a key/value store for circuit and history mirroring.
    #[must_use]
    pub fn with_store(mut self, store: Arc<dyn KeyValueStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Replaces the default file tools.
    #[must_use]
    pub fn with_tools(mut self, tools: Arc<ToolRegistry>) -> Self {
        self.tools = Some(tools);
        self
    }

    /// Replaces the completion-backed council reviewer.
    #[must_use]
    pub fn with_reviewer(mut self, reviewer: Arc<dyn Reviewer>) -> Self {
        self.reviewer = Some(reviewer);
        self
    }

    /// Replaces the completion-backed council reviser.
    #[must_use]
    pub fn with_reviser(mut self, reviser: Arc<dyn Reviser>) -> Self {
        self.reviser = Some(reviser);
        self
    }

    /// Replaces the completion-backed reflexion evaluator.
    #[must_use]
    pub fn with_evaluator(mut self, evaluator: Arc<dyn Evaluator>) -> Self {
        self.evaluator = Some(evaluator);
        self
    }

    /// Seeds process-wide content rules from `provider`.
    ///
    /// Only the first provider seen in the process is loaded.
    #[must_use]
    pub fn with_rule_provider(mut self, provider: Arc<dyn RuleProvider>) -> Self {
        self.rule_provider = Some(provider);
        self
    }

    /// Sends lifecycle events to `sink` instead of the process-wide sink.
    #[must_use]
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.events = Some(sink);
        self
    }

    /// Validates the configuration and wires the collaborators together.
    pub fn build(self) -> Result<EngineServices, ReasonflowError> {
        let config = self.config;
        config.validate()?;
        let limits = config.limits.clone();

        let mut breaker = CircuitBreaker::from_limits(&limits);
        if let Some(store) = &self.store {
            breaker = breaker.with_store(Arc::clone(store));
        }
        let breaker = Arc::new(breaker);
        if let Some(store) = &self.store {
            let restored = breaker.restore_from(store.as_ref(), &config.resources);
            if restored > 0 {
                info!(restored, "Restored circuit entries from store");
            }
        }

        let completion = GuardedCompletion::new(self.service, Arc::clone(&breaker), limits.call_timeout());
        let sanitizer = Sanitizer::new(&config.sanitizer, limits.regex_timeout())?;
        let tools = self.tools.unwrap_or_else(|| {
            let root = sanitizer.root().to_path_buf();
            Arc::new(
                ToolRegistry::new()
                    .with_tool(Arc::new(WriteFileTool::new(root.clone())))
                    .with_tool(Arc::new(ReadFileTool::new(root))),
            )
        });

        let reviewer = self
            .reviewer
            .unwrap_or_else(|| Arc::new(CompletionReviewer::new(completion.clone())));
        let reviser = self
            .reviser
            .unwrap_or_else(|| Arc::new(CompletionReviser::new(completion.clone())));
        let council = Arc::new(Council::from_config(&config.council, reviewer, reviser)?);

        let mut executor = Executor::new(completion.clone(), tools, sanitizer, limits.clone())
            .with_council(Arc::clone(&council));
        if let Some(store) = &self.store {
            executor = executor.with_store(Arc::clone(store));
        }
        if let Some(evaluator) = self.evaluator {
            executor = executor.with_evaluator(evaluator);
        }

        let mut rules = match &self.rule_provider {
            Some(provider) => seeded_rules(provider.as_ref())?.as_ref().clone(),
            None => RuleSet::new(),
        };
        rules.merge(&RuleSet {
            categories: config.content_rules.clone(),
        });

        info!(
            resources = ?config.resources,
            tools = executor.tools().len(),
            rule_patterns = rules.pattern_count(),
            "Engine services ready"
        );

        Ok(EngineServices {
            matcher: PatternMatcher::new(limits.regex_timeout()).case_insensitive(),
            config: Arc::new(config),
            breaker,
            completion,
            executor: Arc::new(executor),
            council,
            rules: Arc::new(rules),
            store: self.store,
            events: self.events.unwrap_or_else(get_event_sink),
        })
    }
}
