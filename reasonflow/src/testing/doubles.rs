//! Council and tool doubles.

use crate::core::Failure;
use crate::council::{ConsensusRound, Participant, Review, ReviewScope, Reviewer, Reviser, Verdict};
use crate::errors::ToolError;
use crate::tools::{Tool, ToolKind};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// A reviewer with a fixed verdict per participant.
#[derive(Debug, Clone)]
pub struct StaticReviewer {
    default: Verdict,
    overrides: Arc<HashMap<String, Verdict>>,
    failing: Arc<HashSet<String>>,
    calls: Arc<AtomicUsize>,
}

impl StaticReviewer {
    /// Every participant returns `default`.
    #[must_use]
    pub fn new(default: Verdict) -> Self {
        Self {
            default,
            overrides: Arc::new(HashMap::new()),
            failing: Arc::new(HashSet::new()),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Overrides one participant's verdict.
    #[must_use]
    pub fn with_verdict(mut self, participant_id: impl Into<String>, verdict: Verdict) -> Self {
        Arc::make_mut(&mut self.overrides).insert(participant_id.into(), verdict);
        self
    }

    /// Makes one participant's review fail.
    #[must_use]
    pub fn failing_for(mut self, participant_id: impl Into<String>) -> Self {
        Arc::make_mut(&mut self.failing).insert(participant_id.into());
        self
    }

    /// Reviews performed so far, across clones.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Reviewer for StaticReviewer {
    async fn review(
        &self,
        participant: &Participant,
        _goal: &str,
        _proposal: &str,
        round: usize,
        _scope: &ReviewScope,
    ) -> Result<Review, Failure> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.contains(&participant.id) {
            return Err(Failure::transient(format!("{} reviewer unavailable", participant.id)));
        }
        let verdict = self
            .overrides
            .get(&participant.id)
            .copied()
            .unwrap_or(self.default);
        Ok(Review::new(verdict, format!("{} in round {round}", participant.id)))
    }
}

/// A reviser that appends a fixed suffix, or returns the proposal unchanged.
#[derive(Debug, Clone, Default)]
pub struct EchoReviser {
    suffix: String,
    calls: Arc<AtomicUsize>,
}

impl EchoReviser {
    /// Returns proposals unchanged.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `suffix` on every revision.
    #[must_use]
    pub fn with_suffix(suffix: impl Into<String>) -> Self {
        Self {
            suffix: suffix.into(),
            calls: Arc::default(),
        }
    }

    /// Revisions performed so far, across clones.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Reviser for EchoReviser {
    async fn revise(
        &self,
        _goal: &str,
        proposal: &str,
        _round: &ConsensusRound,
        _scope: &ReviewScope,
    ) -> Result<String, Failure> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(format!("{proposal}{}", self.suffix))
    }
}

/// A tool that records every input and answers with a fixed reply.
#[derive(Debug, Clone)]
pub struct RecordingTool {
    name: String,
    kind: ToolKind,
    reply: String,
    calls: Arc<Mutex<Vec<String>>>,
}

impl RecordingTool {
    /// Creates a query tool replying `ok`.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: ToolKind::Query,
            reply: "ok".to_string(),
            calls: Arc::default(),
        }
    }

    /// Sets the tool kind.
    #[must_use]
    pub fn with_kind(mut self, kind: ToolKind) -> Self {
        self.kind = kind;
        self
    }

    /// Sets the reply.
    #[must_use]
    pub fn with_reply(mut self, reply: impl Into<String>) -> Self {
        self.reply = reply.into();
        self
    }

    /// Inputs received, in order.
    #[must_use]
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl Tool for RecordingTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> ToolKind {
        self.kind
    }

    fn description(&self) -> &str {
        "records its input"
    }

    async fn invoke(&self, input: &str) -> Result<String, ToolError> {
        self.calls.lock().push(input.to_string());
        Ok(self.reply.clone())
    }
}
