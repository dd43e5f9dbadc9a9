//! Quorum scoring over neighbor votes.
//!
//! score = approvals / (approvals + rejections)
//!
//! A proposal passes the quorum when `score >= threshold`. The default
//! threshold is the Byzantine supermajority 2/3: with `f` faulty voters out
//! of `3f + 1`, the honest `2f + 1` can still reach it and the faulty `f`
//! alone cannot.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use torus_topology::AgentId;

use crate::error::{ConsensusError, Result};
use crate::ProposalId;

/// Default quorum threshold (Byzantine supermajority).
pub const DEFAULT_THRESHOLD: f64 = 2.0 / 3.0;

/// A voter's decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VoteDecision {
    Approve,
    Reject,
}

impl VoteDecision {
    pub const fn is_approve(self) -> bool {
        matches!(self, VoteDecision::Approve)
    }
}

/// One voter's ballot on one proposal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vote {
    pub proposal_id: ProposalId,
    pub voter_id: AgentId,
    pub decision: VoteDecision,
    pub timestamp: DateTime<Utc>,
    /// Why the vote was forced (timeout, validator failure), if it was
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl Vote {
    pub fn new(proposal_id: ProposalId, voter_id: AgentId, decision: VoteDecision) -> Self {
        Self {
            proposal_id,
            voter_id,
            decision,
            timestamp: Utc::now(),
            note: None,
        }
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }
}

/// Fraction of approvals among counted votes; 0 when nobody voted.
pub fn quorum_score(approvals: usize, rejections: usize) -> f64 {
    let total = approvals + rejections;
    if total == 0 {
        return 0.0;
    }
    approvals as f64 / total as f64
}

/// Check if a score meets the threshold.
pub fn meets_threshold(score: f64, threshold: f64) -> bool {
    score >= threshold
}

/// Minimum approvals out of `voters` needed to reach `threshold`.
pub fn approvals_needed(voters: usize, threshold: f64) -> usize {
    (0..=voters)
        .find(|&a| meets_threshold(quorum_score(a, voters - a), threshold))
        .unwrap_or(voters + 1)
}

/// Votes counted for one proposal, keyed by voter.
///
/// The first vote from a voter is counted; any later vote from the same
/// voter is refused with [`ConsensusError::DuplicateVote`] and ignored.
#[derive(Debug, Clone)]
pub struct VoteTally {
    proposal_id: ProposalId,
    voters: HashSet<AgentId>,
    votes: Vec<Vote>,
    approvals: usize,
    rejections: usize,
}

impl VoteTally {
    pub fn new(proposal_id: ProposalId) -> Self {
        Self {
            proposal_id,
            voters: HashSet::new(),
            votes: Vec::new(),
            approvals: 0,
            rejections: 0,
        }
    }

    /// Count a vote unless the voter already voted.
    pub fn record(&mut self, vote: Vote) -> Result<()> {
        if !self.voters.insert(vote.voter_id.clone()) {
            return Err(ConsensusError::DuplicateVote {
                proposal: self.proposal_id.clone(),
                voter: vote.voter_id,
            });
        }
        match vote.decision {
            VoteDecision::Approve => self.approvals += 1,
            VoteDecision::Reject => self.rejections += 1,
        }
        self.votes.push(vote);
        Ok(())
    }

    pub fn approvals(&self) -> usize {
        self.approvals
    }

    pub fn rejections(&self) -> usize {
        self.rejections
    }

    pub fn len(&self) -> usize {
        self.votes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.votes.is_empty()
    }

    pub fn score(&self) -> f64 {
        quorum_score(self.approvals, self.rejections)
    }

    /// Counted votes in the order they were recorded.
    pub fn into_votes(self) -> Vec<Vote> {
        self.votes
    }
}
