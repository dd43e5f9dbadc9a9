//! Proposals submitted by agents.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use torus_integrity::ReasoningNode;
use torus_topology::AgentId;

use crate::error::{ConsensusError, Result};

/// Unique proposal identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProposalId(String);

impl ProposalId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// A fresh random id.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ProposalId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for ProposalId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for ProposalId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// What the proposer wants to do.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionType {
    Transaction,
    DataUpdate,
    SecurityAlert,
    /// Host-defined action kind
    Custom(String),
}

impl std::fmt::Display for ActionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ActionType::Transaction => f.write_str("TRANSACTION"),
            ActionType::DataUpdate => f.write_str("DATA_UPDATE"),
            ActionType::SecurityAlert => f.write_str("SECURITY_ALERT"),
            ActionType::Custom(kind) => f.write_str(kind),
        }
    }
}

/// A proposed action awaiting a quorum decision.
///
/// Immutable once submitted: the engine shares it behind an `Arc` with
/// every validator call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Proposal {
    pub id: ProposalId,
    pub proposer_id: AgentId,
    pub action_type: ActionType,
    /// Opaque to the core
    #[serde(default)]
    pub payload: serde_json::Value,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub reasoning_trace: Vec<ReasoningNode>,
}

impl Proposal {
    /// A proposal with a generated id, the current time, no payload and an
    /// empty reasoning trace.
    pub fn new(proposer_id: impl Into<AgentId>, action_type: ActionType) -> Self {
        Self {
            id: ProposalId::generate(),
            proposer_id: proposer_id.into(),
            action_type,
            payload: serde_json::Value::Null,
            timestamp: Utc::now(),
            reasoning_trace: Vec::new(),
        }
    }

    pub fn with_id(mut self, id: impl Into<ProposalId>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }

    pub fn with_reasoning(mut self, trace: Vec<ReasoningNode>) -> Self {
        self.reasoning_trace = trace;
        self
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Check the fields every proposal must carry.
    ///
    /// The reasoning trace itself is not inspected here; structural problems
    /// in it are the integrity detector's business and veto the proposal
    /// rather than failing submission.
    pub fn validate(&self) -> Result<()> {
        if self.id.as_str().trim().is_empty() {
            return Err(ConsensusError::Validation("proposal id is empty".into()));
        }
        if self.proposer_id.is_empty() {
            return Err(ConsensusError::Validation("proposer id is empty".into()));
        }
        if let ActionType::Custom(kind) = &self.action_type {
            if kind.trim().is_empty() {
                return Err(ConsensusError::Validation("action type is empty".into()));
            }
        }
        Ok(())
    }
}
