//! Torus Neighbor Consensus
//!
//! Agents on the torus lattice propose actions; the proposer's four
//! orthogonal neighbors vote on them, and the reasoning behind each
//! proposal is checked for circularity before anything is approved.
//!
//! # Decision Rule
//!
//! ```text
//! score    = approvals / (approvals + rejections)
//! vetoed   = reasoning trace has b1 > 0 (or cannot be analysed)
//! approved = score >= threshold && !vetoed
//! ```
//!
//! The threshold defaults to 2/3. The proposer's own approval is counted
//! unless disabled. A voter that errors, panics, or misses the vote timeout
//! counts as a rejection, so a silent neighbor can delay a decision but
//! never block it.
//!
//! # Lifecycle
//!
//! `Pending -> CollectingVotes -> {Vetoed | Approved | Rejected}`, or
//! `Withdrawn` if the proposer cancels first. Each proposal gets exactly one
//! result, and each subscriber hears about it exactly once.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use torus_consensus::{ActionType, ApproveAll, ConsensusConfig, ConsensusEngine, Proposal};
//! use torus_topology::Lattice;
//!
//! # async fn demo() -> torus_consensus::Result<()> {
//! let lattice = Arc::new(Lattice::new(10, 10)?);
//! let engine = ConsensusEngine::new(lattice, Arc::new(ApproveAll), ConsensusConfig::default())?;
//!
//! engine.register("bob", None)?;
//! let id = engine.submit_proposal(Proposal::new("alice", ActionType::Transaction))?;
//! let result = engine.await_result(&id).await;
//! # Ok(())
//! # }
//! ```

mod bus;
mod config;
mod engine;
mod error;
mod events;
mod proposal;
mod quorum;
mod registry;
mod result;
mod validator;

pub use bus::{NotificationBus, Subscription};
pub use config::{ConsensusConfig, IsolationPolicy};
pub use engine::ConsensusEngine;
pub use error::{ConsensusError, Result};
pub use events::ConsensusEvent;
pub use proposal::{ActionType, Proposal, ProposalId};
pub use quorum::{approvals_needed, meets_threshold, quorum_score, Vote, VoteDecision, VoteTally, DEFAULT_THRESHOLD};
pub use registry::{ProposalRegistry, ProposalStatus};
pub use result::{ConsensusResult, ProposalState};
pub use validator::{ApproveAll, FnValidator, Validator, ValidatorError};
