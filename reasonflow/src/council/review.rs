//! Reviewer and reviser collaborators.

use super::round::{ConsensusRound, Participant, Verdict};
use crate::completion::GuardedCompletion;
use crate::core::Failure;
use crate::executor::Deadline;
use crate::resilience::SelectedResource;
use async_trait::async_trait;

/// Where and how long a council run may call out.
#[derive(Debug, Clone, Default)]
pub struct ReviewScope {
    /// Resource for completion-backed reviewers.
    pub resource: Option<SelectedResource>,
    /// Wall-clock bound shared with the executor run.
    pub deadline: Option<Deadline>,
}

impl ReviewScope {
    /// Scope bound to `resource`.
    #[must_use]
    pub const fn new(resource: SelectedResource) -> Self {
        Self {
            resource: Some(resource),
            deadline: None,
        }
    }

    /// Adds a deadline.
    #[must_use]
    pub const fn with_deadline(mut self, deadline: Deadline) -> Self {
        self.deadline = Some(deadline);
        self
    }

    fn require_resource(&self) -> Result<&SelectedResource, Failure> {
        self.resource
            .as_ref()
            .ok_or_else(|| Failure::configuration("council review needs a selected resource"))
    }
}

/// One participant's review.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Review {
    /// Decision.
    pub verdict: Verdict,
    /// Why.
    pub rationale: String,
}

impl Review {
    /// Creates a review.
    #[must_use]
    pub fn new(verdict: Verdict, rationale: impl Into<String>) -> Self {
        Self {
            verdict,
            rationale: rationale.into(),
        }
    }

    /// Parses an `APPROVE: ...` / `REJECT: ...` reply.
    ///
    /// Replies that are neither count as an abstention.
    #[must_use]
    pub fn parse(reply: &str) -> Self {
        let trimmed = reply.trim();
        let upper = trimmed.to_uppercase();
        let rationale = trimmed
            .split_once(':')
            .map_or("", |(_, rest)| rest)
            .trim()
            .to_string();
        if upper.starts_with("APPROVE") {
            Self::new(Verdict::Approve, rationale)
        } else if upper.starts_with("REJECT") {
            Self::new(Verdict::Reject, rationale)
        } else {
            Self::new(Verdict::Abstain, format!("unrecognized review: {trimmed}"))
        }
    }
}

/// Produces one participant's vote on a proposal.
#[async_trait]
pub trait Reviewer: Send + Sync {
    /// Reviews `proposal` as `participant`.
    async fn review(
        &self,
        participant: &Participant,
        goal: &str,
        proposal: &str,
        round: usize,
        scope: &ReviewScope,
    ) -> Result<Review, Failure>;
}

/// Rewrites a proposal after a failed round.
#[async_trait]
pub trait Reviser: Send + Sync {
    /// Returns the next proposal given the objections in `round`.
    async fn revise(
        &self,
        goal: &str,
        proposal: &str,
        round: &ConsensusRound,
        scope: &ReviewScope,
    ) -> Result<String, Failure>;
}

/// Reviewer backed by the guarded completion client.
#[derive(Debug, Clone)]
pub struct CompletionReviewer {
    completion: GuardedCompletion,
}

impl CompletionReviewer {
    /// Creates a reviewer.
    #[must_use]
    pub const fn new(completion: GuardedCompletion) -> Self {
        Self { completion }
    }
}

#[async_trait]
impl Reviewer for CompletionReviewer {
    async fn review(
        &self,
        participant: &Participant,
        goal: &str,
        proposal: &str,
        round: usize,
        scope: &ReviewScope,
    ) -> Result<Review, Failure> {
        let focus = if participant.focus.is_empty() {
            "overall soundness"
        } else {
            participant.focus.as_str()
        };
        let prompt = format!(
            "You are the {id} reviewer (focus: {focus}), round {round}.\n\
             Task: {goal}\n\nProposal:\n{proposal}\n\n\
             Reply `APPROVE: <reason>` or `REJECT: <reason>`.",
            id = participant.id,
        );
        let response = self
            .completion
            .complete(&prompt, scope.require_resource()?, scope.deadline.as_ref())
            .await?;
        Ok(Review::parse(&response.content))
    }
}

/// Reviser backed by the guarded completion client.
#[derive(Debug, Clone)]
pub struct CompletionReviser {
    completion: GuardedCompletion,
}

impl CompletionReviser {
    /// Creates a reviser.
    #[must_use]
    pub const fn new(completion: GuardedCompletion) -> Self {
        Self { completion }
    }
}

#[async_trait]
impl Reviser for CompletionReviser {
    async fn revise(
        &self,
        goal: &str,
        proposal: &str,
        round: &ConsensusRound,
        scope: &ReviewScope,
    ) -> Result<String, Failure> {
        let objections = round.objections().join("\n- ");
        let prompt = format!(
            "Task: {goal}\n\nCurrent proposal:\n{proposal}\n\n\
             Round {number} scored {score:.2}. Objections:\n- {objections}\n\n\
             Rewrite the proposal to address the objections. Reply with the new proposal only.",
            number = round.number,
            score = round.score,
        );
        let response = self
            .completion
            .complete(&prompt, scope.require_resource()?, scope.deadline.as_ref())
            .await?;
        Ok(response.content.trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_review() {
        assert_eq!(
            Review::parse("APPROVE: clean design"),
            Review::new(Verdict::Approve, "clean design")
        );
        assert_eq!(Review::parse("reject: leaks secrets").verdict, Verdict::Reject);
        assert_eq!(Review::parse("looks fine to me").verdict, Verdict::Abstain);
    }

    #[test]
    fn test_scope_without_resource_is_configuration_error() {
        let failure = ReviewScope::default().require_resource().unwrap_err();
        assert_eq!(failure.category, crate::core::ErrorCategory::Configuration);
    }
}
