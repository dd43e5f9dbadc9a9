//! The per-voter validation hook.
//!
//! The engine asks one [`Validator`] for every neighbor's opinion. Calls run
//! concurrently and each is bounded by the configured vote timeout; an
//! error, panic, or timeout counts as a rejection.

use async_trait::async_trait;
use thiserror::Error;
use torus_topology::AgentId;

use crate::quorum::VoteDecision;
use crate::Proposal;

/// A validator could not produce a decision.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct ValidatorError(pub String);

impl ValidatorError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self(reason.into())
    }
}

/// Decides how a given voter votes on a proposal.
#[async_trait]
pub trait Validator: Send + Sync {
    async fn validate(&self, proposal: &Proposal, voter: &AgentId) -> Result<VoteDecision, ValidatorError>;
}

/// Adapts a synchronous closure into a [`Validator`].
pub struct FnValidator<F>(F);

impl<F> FnValidator<F>
where
    F: Fn(&Proposal, &AgentId) -> VoteDecision + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

impl<F> std::fmt::Debug for FnValidator<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("FnValidator")
    }
}

#[async_trait]
impl<F> Validator for FnValidator<F>
where
    F: Fn(&Proposal, &AgentId) -> VoteDecision + Send + Sync,
{
    async fn validate(&self, proposal: &Proposal, voter: &AgentId) -> Result<VoteDecision, ValidatorError> {
        Ok((self.0)(proposal, voter))
    }
}

/// Approves everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct ApproveAll;

#[async_trait]
impl Validator for ApproveAll {
    async fn validate(&self, _proposal: &Proposal, _voter: &AgentId) -> Result<VoteDecision, ValidatorError> {
        Ok(VoteDecision::Approve)
    }
}
