//! Proposal lifecycle events for async consumers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use torus_topology::AgentId;

use crate::ProposalId;

/// Events published on the engine's broadcast channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ConsensusEvent {
    /// A proposal was accepted and vote collection started
    Submitted {
        proposal_id: ProposalId,
        proposer_id: AgentId,
        timestamp: DateTime<Utc>,
    },

    /// A proposal reached a terminal decision
    Finalized {
        proposal_id: ProposalId,
        approved: bool,
        vetoed: bool,
        score: f64,
        timestamp: DateTime<Utc>,
    },

    /// The proposer withdrew a proposal before it finalized
    Withdrawn {
        proposal_id: ProposalId,
        timestamp: DateTime<Utc>,
    },
}

impl ConsensusEvent {
    /// The proposal this event concerns.
    pub fn proposal_id(&self) -> &ProposalId {
        match self {
            ConsensusEvent::Submitted { proposal_id, .. } => proposal_id,
            ConsensusEvent::Finalized { proposal_id, .. } => proposal_id,
            ConsensusEvent::Withdrawn { proposal_id, .. } => proposal_id,
        }
    }

    /// When the event happened.
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            ConsensusEvent::Submitted { timestamp, .. } => *timestamp,
            ConsensusEvent::Finalized { timestamp, .. } => *timestamp,
            ConsensusEvent::Withdrawn { timestamp, .. } => *timestamp,
        }
    }

    /// Short type name for logging.
    pub fn event_type(&self) -> &'static str {
        match self {
            ConsensusEvent::Submitted { .. } => "submitted",
            ConsensusEvent::Finalized { .. } => "finalized",
            ConsensusEvent::Withdrawn { .. } => "withdrawn",
        }
    }
}
