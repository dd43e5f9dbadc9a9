//! Final decisions and proposal states.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use torus_integrity::BettiNumbers;

use crate::ProposalId;

/// Where a proposal is in its lifecycle.
///
/// `Pending -> CollectingVotes -> {Vetoed | Approved | Rejected}`, or
/// `Withdrawn` if the proposer cancels first. Terminal states never change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProposalState {
    Pending,
    CollectingVotes,
    Vetoed,
    Approved,
    Rejected,
    Withdrawn,
}

impl ProposalState {
    pub const fn is_terminal(self) -> bool {
        !matches!(self, ProposalState::Pending | ProposalState::CollectingVotes)
    }
}

/// The single decision recorded for a proposal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsensusResult {
    pub proposal_id: ProposalId,
    pub approved: bool,
    /// approvals / (approvals + rejections), 0 when nobody voted
    pub score: f64,
    pub approvals: usize,
    pub rejections: usize,
    /// Reasoning integrity veto; forces `approved = false`
    pub vetoed: bool,
    pub note: String,
    pub finalized_at: DateTime<Utc>,
    /// Diagnostic output of the integrity check
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub betti: Option<BettiNumbers>,
}

impl ConsensusResult {
    /// Terminal state this result represents.
    pub fn state(&self) -> ProposalState {
        if self.vetoed {
            ProposalState::Vetoed
        } else if self.approved {
            ProposalState::Approved
        } else {
            ProposalState::Rejected
        }
    }

    /// Total counted votes.
    pub fn total_votes(&self) -> usize {
        self.approvals + self.rejections
    }
}
