//! Votes, weighted scoring and per-round results.

use crate::config::ParticipantConfig;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// A council member.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Participant {
    /// Unique id.
    pub id: String,
    /// Voting weight, positive.
    pub weight: f64,
    /// A rejection from this participant fails the round.
    pub has_veto: bool,
    /// What the participant looks at when reviewing.
    pub focus: String,
}

impl From<&ParticipantConfig> for Participant {
    fn from(config: &ParticipantConfig) -> Self {
        Self {
            id: config.id.clone(),
            weight: config.weight,
            has_veto: config.has_veto,
            focus: config.focus.clone(),
        }
    }
}

/// A participant's decision on a proposal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    /// Counts toward the score.
    Approve,
    /// Counts against the score; vetoes when cast by a veto holder.
    Reject,
    /// Counts against the score, never vetoes. Used when a review fails.
    Abstain,
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Approve => "approve",
            Self::Reject => "reject",
            Self::Abstain => "abstain",
        })
    }
}

/// One participant's vote in one round.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vote {
    /// Who voted.
    pub participant_id: String,
    /// Their weight.
    pub weight: f64,
    /// Whether they hold a veto.
    pub has_veto: bool,
    /// The decision.
    pub verdict: Verdict,
    /// Why.
    pub rationale: String,
}

impl Vote {
    /// Creates a vote from `participant`.
    #[must_use]
    pub fn new(participant: &Participant, verdict: Verdict, rationale: impl Into<String>) -> Self {
        Self {
            participant_id: participant.id.clone(),
            weight: participant.weight,
            has_veto: participant.has_veto,
            verdict,
            rationale: rationale.into(),
        }
    }

    /// True for a veto holder's rejection.
    #[must_use]
    pub fn is_veto(&self) -> bool {
        self.has_veto && self.verdict == Verdict::Reject
    }
}

/// Outcome of one voting round.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsensusRound {
    /// 1-based round number.
    pub number: usize,
    /// Votes in roster order.
    pub votes: Vec<Vote>,
    /// Weighted approval in `[0, 1]`.
    pub score: f64,
    /// Veto holders that rejected.
    pub vetoed_by: Vec<String>,
    /// Score reached the threshold with no veto.
    pub passed: bool,
    /// SHA-256 of the proposal under review.
    pub fingerprint: String,
}

impl ConsensusRound {
    /// Scores `votes` against `threshold`.
    ///
    /// The score is `Σ(weight × approve) / Σ(weight)`, zero when the total
    /// weight is zero.
    #[must_use]
    pub fn evaluate(number: usize, votes: Vec<Vote>, threshold: f64, fingerprint: String) -> Self {
        let total: f64 = votes.iter().map(|v| v.weight).sum();
        let approved: f64 = votes
            .iter()
            .filter(|v| v.verdict == Verdict::Approve)
            .map(|v| v.weight)
            .sum();
        let score = if total > 0.0 { approved / total } else { 0.0 };
        let vetoed_by: Vec<String> = votes
            .iter()
            .filter(|v| v.is_veto())
            .map(|v| v.participant_id.clone())
            .collect();
        let passed = score >= threshold && vetoed_by.is_empty();

        Self {
            number,
            votes,
            score,
            vetoed_by,
            passed,
            fingerprint,
        }
    }

    /// Rationales of the non-approving votes, for the reviser.
    #[must_use]
    pub fn objections(&self) -> Vec<String> {
        self.votes
            .iter()
            .filter(|v| v.verdict != Verdict::Approve)
            .map(|v| format!("{} ({}): {}", v.participant_id, v.verdict, v.rationale))
            .collect()
    }
}

/// Result of a converged council run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CouncilReport {
    /// Always true for a returned report; non-convergence is an error.
    pub converged: bool,
    /// The accepted proposal.
    pub final_artifact: String,
    /// Every round, in order.
    pub rounds: Vec<ConsensusRound>,
    /// A revision repeated an earlier proposal at some point.
    pub oscillation_detected: bool,
    /// Score of the last round.
    pub final_score: f64,
}

/// Hex SHA-256 of a proposal.
#[must_use]
pub fn fingerprint(proposal: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(proposal.as_bytes());
    hex::encode(hasher.finalize())
}
