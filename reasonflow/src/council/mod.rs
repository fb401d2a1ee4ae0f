//! Weighted multi-participant review.
//!
//! Each round collects one vote per participant concurrently and scores the
//! proposal. A round passes when the weighted approval reaches the consensus
//! threshold and no veto holder rejected. Failed rounds are revised and voted
//! again until `max_rounds`, after which the council gives up with a
//! termination failure carrying the last proposal.

mod review;
mod round;

pub use review::{CompletionReviewer, CompletionReviser, Review, ReviewScope, Reviewer, Reviser};
pub use round::{fingerprint, ConsensusRound, CouncilReport, Participant, Verdict, Vote};

use crate::config::{validate_roster, CouncilConfig, ParticipantConfig};
use crate::core::{Failure, Outcome};
use crate::errors::ConfigError;
use crate::events::get_event_sink;
use futures::future::join_all;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, info_span, warn, Instrument};

/// The council: roster, thresholds and review collaborators.
pub struct Council {
    participants: Vec<Participant>,
    consensus_threshold: f64,
    max_rounds: usize,
    reviewer: Arc<dyn Reviewer>,
    reviser: Arc<dyn Reviser>,
}

impl fmt::Debug for Council {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Council")
            .field("participants", &self.participants)
            .field("consensus_threshold", &self.consensus_threshold)
            .field("max_rounds", &self.max_rounds)
            .finish_non_exhaustive()
    }
}

impl Council {
    /// Creates a council, validating the roster and thresholds.
    pub fn new(
        participants: &[ParticipantConfig],
        consensus_threshold: f64,
        max_rounds: usize,
        reviewer: Arc<dyn Reviewer>,
        reviser: Arc<dyn Reviser>,
    ) -> Result<Self, ConfigError> {
        validate_roster(participants)?;
        if !(consensus_threshold > 0.0 && consensus_threshold <= 1.0) {
            return Err(ConfigError::invalid(
                "council.consensus_threshold",
                format!("must be in (0, 1], got {consensus_threshold}"),
            ));
        }
        if max_rounds == 0 {
            return Err(ConfigError::invalid("council.max_rounds", "must be at least 1"));
        }

        Ok(Self {
            participants: participants.iter().map(Participant::from).collect(),
            consensus_threshold,
            max_rounds,
            reviewer,
            reviser,
        })
    }

    /// Creates a council from configuration.
    pub fn from_config(
        config: &CouncilConfig,
        reviewer: Arc<dyn Reviewer>,
        reviser: Arc<dyn Reviser>,
    ) -> Result<Self, ConfigError> {
        Self::new(
            &config.participants,
            config.consensus_threshold,
            config.max_rounds,
            reviewer,
            reviser,
        )
    }

    /// Gets the roster.
    #[must_use]
    pub fn participants(&self) -> &[Participant] {
        &self.participants
    }

    /// Gets the round cap.
    #[must_use]
    pub const fn max_rounds(&self) -> usize {
        self.max_rounds
    }

    /// Gets the consensus threshold.
    #[must_use]
    pub const fn consensus_threshold(&self) -> f64 {
        self.consensus_threshold
    }

    /// Votes on `proposal` until a round passes or the round cap is hit.
    pub async fn converge(&self, goal: &str, proposal: &str, scope: &ReviewScope) -> Outcome<CouncilReport> {
        let span = info_span!("council", participants = self.participants.len(), max_rounds = self.max_rounds);
        self.converge_inner(goal, proposal, scope)
            .instrument(span)
            .await
            .into()
    }

    async fn converge_inner(
        &self,
        goal: &str,
        proposal: &str,
        scope: &ReviewScope,
    ) -> Result<CouncilReport, Failure> {
        let mut proposal = proposal.to_string();
        let mut seen = HashSet::new();
        let mut rounds: Vec<ConsensusRound> = Vec::new();
        let mut oscillation_detected = false;

        for number in 1..=self.max_rounds {
            if let Some(deadline) = &scope.deadline {
                deadline
                    .check(Some(&proposal))
                    .map_err(|f| f.with_partial(partial(&proposal, &rounds, oscillation_detected)))?;
            }

            let print = fingerprint(&proposal);
            if !seen.insert(print.clone()) {
                warn!(round = number, "Revision repeated an earlier proposal");
                oscillation_detected = true;
            }

            let votes = self.collect_votes(goal, &proposal, number, scope).await;
            let round = ConsensusRound::evaluate(number, votes, self.consensus_threshold, print);
            get_event_sink().try_emit(
                "council.round",
                Some(serde_json::json!({
                    "round": number,
                    "score": round.score,
                    "vetoed_by": round.vetoed_by,
                    "passed": round.passed,
                })),
            );
            debug!(round = number, score = round.score, vetoes = round.vetoed_by.len(), "Council round scored");

            if round.passed {
                info!(rounds = number, score = round.score, "Council converged");
                let final_score = round.score;
                rounds.push(round);
                return Ok(CouncilReport {
                    converged: true,
                    final_artifact: proposal,
                    rounds,
                    oscillation_detected,
                    final_score,
                });
            }

            if number < self.max_rounds {
                match self.reviser.revise(goal, &proposal, &round, scope).await {
                    Ok(revised) => proposal = revised,
                    Err(failure) => {
                        warn!(round = number, error = %failure, "Revision failed, keeping proposal");
                    }
                }
            }
            rounds.push(round);
        }

        let score = rounds.last().map_or(0.0, |r| r.score);
        warn!(rounds = self.max_rounds, score, "Council did not converge");
        Err(Failure::termination(format!(
            "council did not converge after {} rounds (last score {score:.2}, threshold {:.2})",
            self.max_rounds, self.consensus_threshold
        ))
        .with_partial(partial(&proposal, &rounds, oscillation_detected)))
    }

    async fn collect_votes(
        &self,
        goal: &str,
        proposal: &str,
        round: usize,
        scope: &ReviewScope,
    ) -> Vec<Vote> {
        let reviews = self.participants.iter().map(|participant| async move {
            match self
                .reviewer
                .review(participant, goal, proposal, round, scope)
                .await
            {
                Ok(review) => Vote::new(participant, review.verdict, review.rationale),
                Err(failure) => {
                    warn!(participant = %participant.id, error = %failure, "Review failed, counting as abstain");
                    Vote::new(participant, Verdict::Abstain, format!("review failed: {failure}"))
                }
            }
        });
        join_all(reviews).await
    }
}

fn partial(proposal: &str, rounds: &[ConsensusRound], oscillation_detected: bool) -> serde_json::Value {
    serde_json::json!({
        "proposal": proposal,
        "score": rounds.last().map_or(0.0, |r| r.score),
        "rounds": rounds.len(),
        "oscillation_detected": oscillation_detected,
    })
}
