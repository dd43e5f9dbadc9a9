//! Error types for torus-consensus.

use std::time::Duration;

use thiserror::Error;
use torus_topology::{AgentId, TopologyError};

use crate::ProposalId;

/// Result type for consensus operations.
pub type Result<T> = std::result::Result<T, ConsensusError>;

/// Errors that can occur while submitting or deciding proposals.
///
/// Submission errors are returned synchronously. Errors met while votes are
/// being collected (timeouts, validator failures, duplicate votes) never
/// escape; they end up in the result note instead.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConsensusError {
    /// The proposal is missing a required field.
    #[error("invalid proposal: {0}")]
    Validation(String),

    /// A proposal with this id was already submitted.
    #[error("proposal {0} was already submitted")]
    DuplicateProposal(ProposalId),

    /// The lattice refused the proposer.
    #[error("lattice error: {0}")]
    Topology(#[from] TopologyError),

    /// A voter already voted on this proposal; the first vote stands.
    #[error("duplicate vote from {voter} on proposal {proposal}")]
    DuplicateVote { proposal: ProposalId, voter: AgentId },

    /// A validator call exceeded its time bound.
    #[error("validator for {voter} timed out after {after:?}")]
    Timeout { voter: AgentId, after: Duration },

    /// A validator call failed or panicked.
    #[error("validator for {voter} failed: {reason}")]
    Validator { voter: AgentId, reason: String },

    /// No proposal with this id is known.
    #[error("unknown proposal: {0}")]
    UnknownProposal(ProposalId),

    /// Only the proposer may withdraw a proposal.
    #[error("{requester} is not the proposer of {proposal}")]
    NotProposer { proposal: ProposalId, requester: AgentId },

    /// The proposal already reached a terminal state.
    #[error("proposal {0} is already finalized")]
    AlreadyFinalized(ProposalId),

    /// The proposal was withdrawn before it finalized.
    #[error("proposal {0} was withdrawn")]
    Withdrawn(ProposalId),

    /// Vote collection needs a tokio runtime.
    #[error("no tokio runtime available for vote collection")]
    NoRuntime,

    /// Invalid configuration value.
    #[error("invalid configuration: {0}")]
    Config(String),
}
