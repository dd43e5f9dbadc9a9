//! The consensus engine: neighbor voting joined with the integrity veto.
//!
//! `submit_proposal` validates and stores a proposal, then returns while a
//! spawned task decides it:
//!
//! 1. Ask the lattice for the proposer's neighbors (or apply the isolation
//!    policy when there are none).
//! 2. Poll every voter concurrently, each call under the vote timeout,
//!    while the reasoning trace goes through the integrity detector.
//! 3. Join both, tally, and write the one result to the registry.

use std::sync::Arc;

use chrono::Utc;
use futures::future::join_all;
use tokio::runtime::Handle;
use tokio::sync::broadcast;
use torus_integrity::{IntegrityDetector, IntegrityReport};
use torus_topology::{AgentId, Coord, Lattice};
use tracing::{debug, info, warn};

use crate::bus::Subscription;
use crate::config::{ConsensusConfig, IsolationPolicy};
use crate::error::{ConsensusError, Result};
use crate::events::ConsensusEvent;
use crate::quorum::{approvals_needed, meets_threshold, Vote, VoteDecision, VoteTally};
use crate::registry::ProposalRegistry;
use crate::result::{ConsensusResult, ProposalState};
use crate::validator::Validator;
use crate::{Proposal, ProposalId};

/// Who votes on a proposal.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Jury {
    voters: Vec<AgentId>,
    proposer_votes: bool,
    note: Option<String>,
}

/// Handle to a consensus engine. Cheap to clone.
#[derive(Clone)]
pub struct ConsensusEngine {
    inner: Arc<EngineInner>,
}

struct EngineInner {
    lattice: Arc<Lattice>,
    detector: IntegrityDetector,
    validator: Arc<dyn Validator>,
    registry: ProposalRegistry,
    config: ConsensusConfig,
}

impl std::fmt::Debug for ConsensusEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConsensusEngine")
            .field("lattice", &format_args!("{}x{}", self.inner.lattice.width(), self.inner.lattice.height()))
            .field("config", &self.inner.config)
            .field("proposals", &self.inner.registry.len())
            .finish()
    }
}

impl ConsensusEngine {
    /// Build an engine over a lattice with the given validator.
    pub fn new(lattice: Arc<Lattice>, validator: Arc<dyn Validator>, config: ConsensusConfig) -> Result<Self> {
        config.validate()?;
        info!(
            width = lattice.width(),
            height = lattice.height(),
            threshold = config.threshold,
            timeout_ms = config.vote_timeout.as_millis() as u64,
            isolation = ?config.isolation_policy,
            "Consensus engine created"
        );
        Ok(Self {
            inner: Arc::new(EngineInner {
                detector: IntegrityDetector::new(config.integrity.clone()),
                registry: ProposalRegistry::new(config.event_capacity, config.retain_votes),
                lattice,
                validator,
                config,
            }),
        })
    }

    /// Place an agent on the lattice.
    pub fn register(&self, agent_id: impl Into<AgentId>, coordinate: Option<Coord>) -> Result<Coord> {
        Ok(self.inner.lattice.register(agent_id, coordinate)?)
    }

    /// Accept a proposal and start deciding it in the background.
    ///
    /// Malformed proposals, duplicate ids, and a proposer that cannot be
    /// placed on the lattice fail here, before the lattice is touched.
    /// Everything after that ends up in the result. Must be called from
    /// within a tokio runtime.
    pub fn submit_proposal(&self, proposal: Proposal) -> Result<ProposalId> {
        proposal.validate()?;
        let runtime = Handle::try_current().map_err(|_| ConsensusError::NoRuntime)?;
        if self.inner.registry.contains(&proposal.id) {
            return Err(ConsensusError::DuplicateProposal(proposal.id));
        }

        let coord = self.inner.lattice.register(proposal.proposer_id.clone(), None)?;
        let proposal = self.inner.registry.insert(proposal)?;
        self.inner.registry.begin_voting(&proposal.id)?;

        let id = proposal.id.clone();
        info!(
            proposal = %id,
            proposer = %proposal.proposer_id,
            coord = %coord,
            action = %proposal.action_type,
            trace_nodes = proposal.reasoning_trace.len(),
            "Proposal submitted"
        );

        let inner = Arc::clone(&self.inner);
        runtime.spawn(async move { inner.decide(proposal).await });
        Ok(id)
    }

    /// The finalized result, or `None` while undecided.
    pub fn check_consensus(&self, id: &ProposalId) -> Option<ConsensusResult> {
        self.inner.registry.result(id)
    }

    /// Wait for a proposal to finalize. `None` if withdrawn or unknown.
    pub async fn await_result(&self, id: &ProposalId) -> Option<ConsensusResult> {
        self.inner.registry.wait(id).await
    }

    /// Cancel a proposal before it finalizes.
    pub fn withdraw(&self, id: &ProposalId, requester: &AgentId) -> Result<()> {
        self.inner.registry.withdraw(id, requester)
    }

    /// Call `callback` with the id of every proposal that finalizes.
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&ProposalId) + Send + Sync + 'static,
    {
        self.inner.registry.subscribe(callback)
    }

    /// Subscribe to the lifecycle event stream.
    ///
    /// Only events published after this call are received; a receiver that
    /// falls more than `event_capacity` events behind sees `Lagged`.
    pub fn events(&self) -> broadcast::Receiver<ConsensusEvent> {
        self.inner.registry.events()
    }

    /// Current lifecycle state, `None` for unknown ids.
    pub fn state(&self, id: &ProposalId) -> Option<ProposalState> {
        self.inner.registry.state(id)
    }

    /// The proposal as submitted.
    pub fn proposal(&self, id: &ProposalId) -> Option<Arc<Proposal>> {
        self.inner.registry.proposal(id)
    }

    /// Votes counted for a finalized proposal, if retained.
    pub fn votes(&self, id: &ProposalId) -> Option<Vec<Vote>> {
        self.inner.registry.votes(id)
    }

    /// Proposals still collecting votes, sorted by id.
    pub fn pending(&self) -> Vec<ProposalId> {
        self.inner.registry.pending()
    }

    /// The lattice proposers and voters live on.
    pub fn lattice(&self) -> &Arc<Lattice> {
        &self.inner.lattice
    }

    /// Settings the engine was built with.
    pub fn config(&self) -> &ConsensusConfig {
        &self.inner.config
    }
}

impl EngineInner {
    async fn decide(&self, proposal: Arc<Proposal>) {
        let jury = self.select_jury(&proposal);
        let ballots_cast = jury.voters.len() + usize::from(jury.proposer_votes);
        debug!(
            proposal = %proposal.id,
            voters = jury.voters.len(),
            proposer_votes = jury.proposer_votes,
            approvals_needed = approvals_needed(ballots_cast, self.config.threshold),
            "Jury selected"
        );

        let (ballots, report) = tokio::join!(self.collect_votes(&proposal, &jury.voters), async {
            self.detector.validate_reasoning(&proposal.reasoning_trace)
        });

        let (result, votes) = self.tally(&proposal, jury, ballots, &report);

        match self.registry.finalize(result, votes) {
            Ok(()) => {}
            Err(ConsensusError::Withdrawn(id)) => {
                debug!(proposal = %id, "Proposal withdrawn during voting, result discarded");
            }
            Err(err) => warn!(proposal = %proposal.id, error = %err, "Could not record result"),
        }
    }

    fn select_jury(&self, proposal: &Proposal) -> Jury {
        let neighbors = self.lattice.neighbors(&proposal.proposer_id);
        if !neighbors.is_empty() {
            return Jury {
                voters: neighbors,
                proposer_votes: self.config.count_proposer_vote,
                note: None,
            };
        }

        warn!(
            proposal = %proposal.id,
            proposer = %proposal.proposer_id,
            policy = ?self.config.isolation_policy,
            "Proposer has no neighbors"
        );
        let rejected = Jury {
            voters: Vec::new(),
            proposer_votes: false,
            note: Some("proposer is isolated: no neighbors to form a quorum".into()),
        };
        match &self.config.isolation_policy {
            IsolationPolicy::Reject => rejected,
            IsolationPolicy::AutoApprove => Jury {
                voters: Vec::new(),
                proposer_votes: true,
                note: Some("proposer is isolated: auto-approved by policy".into()),
            },
            IsolationPolicy::FallbackPool(pool) if pool.is_empty() => rejected,
            IsolationPolicy::FallbackPool(pool) => Jury {
                voters: pool.clone(),
                proposer_votes: self.config.count_proposer_vote,
                note: Some(format!("proposer is isolated: polled fallback pool of {}", pool.len())),
            },
        }
    }

    /// Poll every voter concurrently. Always yields one vote per voter.
    async fn collect_votes(&self, proposal: &Arc<Proposal>, voters: &[AgentId]) -> Vec<Vote> {
        let timeout = self.config.vote_timeout;

        let calls = voters.iter().cloned().map(|voter| {
            let validator = Arc::clone(&self.validator);
            let proposal = Arc::clone(proposal);
            async move {
                let mut handle = {
                    let proposal = Arc::clone(&proposal);
                    let voter = voter.clone();
                    tokio::spawn(async move { validator.validate(&proposal, &voter).await })
                };

                let outcome = match tokio::time::timeout(timeout, &mut handle).await {
                    Ok(Ok(Ok(decision))) => Ok(decision),
                    Ok(Ok(Err(err))) => Err(ConsensusError::Validator {
                        voter: voter.clone(),
                        reason: err.to_string(),
                    }),
                    Ok(Err(join_err)) => Err(ConsensusError::Validator {
                        voter: voter.clone(),
                        reason: if join_err.is_panic() {
                            "validator panicked".into()
                        } else {
                            "validator task cancelled".into()
                        },
                    }),
                    Err(_) => {
                        handle.abort();
                        Err(ConsensusError::Timeout {
                            voter: voter.clone(),
                            after: timeout,
                        })
                    }
                };

                match outcome {
                    Ok(decision) => {
                        debug!(proposal = %proposal.id, voter = %voter, ?decision, "Vote received");
                        Vote::new(proposal.id.clone(), voter, decision)
                    }
                    Err(err) => {
                        warn!(proposal = %proposal.id, voter = %voter, error = %err, "Vote counted as rejection");
                        Vote::new(proposal.id.clone(), voter, VoteDecision::Reject).with_note(err.to_string())
                    }
                }
            }
        });

        join_all(calls).await
    }

    fn tally(
        &self,
        proposal: &Proposal,
        jury: Jury,
        ballots: Vec<Vote>,
        report: &IntegrityReport,
    ) -> (ConsensusResult, Vec<Vote>) {
        let mut tally = VoteTally::new(proposal.id.clone());
        let mut notes: Vec<String> = jury.note.into_iter().collect();

        if jury.proposer_votes {
            let own = Vote::new(proposal.id.clone(), proposal.proposer_id.clone(), VoteDecision::Approve)
                .with_note("proposer self-endorsement");
            // Fresh tally: cannot collide
            let _ = tally.record(own);
        }

        for vote in ballots {
            let forced = vote.note.clone();
            match tally.record(vote) {
                Ok(()) => notes.extend(forced),
                Err(dup) => {
                    debug!(proposal = %proposal.id, error = %dup, "Duplicate vote ignored");
                    notes.push(format!("{dup}; first vote kept"));
                }
            }
        }

        let score = tally.score();
        let vetoed = !report.is_valid;
        let approved = !vetoed && meets_threshold(score, self.config.threshold);

        let headline = if vetoed {
            warn!(proposal = %proposal.id, betti = %report.betti, "Integrity veto");
            format!("vetoed: {}", report.summary())
        } else {
            format!(
                "{} with score {:.3} against threshold {:.3}",
                if approved { "approved" } else { "rejected" },
                score,
                self.config.threshold
            )
        };
        notes.insert(0, headline);

        let result = ConsensusResult {
            proposal_id: proposal.id.clone(),
            approved,
            score,
            approvals: tally.approvals(),
            rejections: tally.rejections(),
            vetoed,
            note: notes.join("; "),
            finalized_at: Utc::now(),
            betti: Some(report.betti),
        };
        (result, tally.into_votes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validator::{ApproveAll, FnValidator};
    use crate::ActionType;
    use std::time::Duration;
    use torus_integrity::ReasoningNode;

    fn engine_with(validator: Arc<dyn Validator>, config: ConsensusConfig) -> ConsensusEngine {
        let lattice = Arc::new(Lattice::new(10, 10).unwrap());
        ConsensusEngine::new(lattice, validator, config).unwrap()
    }

    fn cross(engine: &ConsensusEngine) {
        engine.register("center", Some(Coord::new(5, 5))).unwrap();
        engine.register("n", Some(Coord::new(5, 4))).unwrap();
        engine.register("s", Some(Coord::new(5, 6))).unwrap();
        engine.register("e", Some(Coord::new(6, 5))).unwrap();
        engine.register("w", Some(Coord::new(4, 5))).unwrap();
    }

    #[test]
    fn invalid_config_refused() {
        let lattice = Arc::new(Lattice::new(3, 3).unwrap());
        let config = ConsensusConfig::default().with_threshold(2.0);
        assert!(matches!(
            ConsensusEngine::new(lattice, Arc::new(ApproveAll), config),
            Err(ConsensusError::Config(_))
        ));
    }

    #[test]
    fn submit_outside_runtime_fails() {
        let engine = engine_with(Arc::new(ApproveAll), ConsensusConfig::default());
        let proposal = Proposal::new("alice", ActionType::Transaction);
        assert_eq!(engine.submit_proposal(proposal), Err(ConsensusError::NoRuntime));
    }

    #[tokio::test]
    async fn malformed_proposal_fails_synchronously() {
        let engine = engine_with(Arc::new(ApproveAll), ConsensusConfig::default());
        let proposal = Proposal::new("", ActionType::Transaction);
        assert!(matches!(engine.submit_proposal(proposal), Err(ConsensusError::Validation(_))));
        assert!(engine.lattice().is_empty());
    }

    #[tokio::test]
    async fn proposer_registered_on_submit() {
        let engine = engine_with(Arc::new(ApproveAll), ConsensusConfig::default());
        let id = engine
            .submit_proposal(Proposal::new("alice", ActionType::Transaction))
            .unwrap();

        assert_eq!(engine.lattice().coordinate_of(&"alice".into()), Some(Coord::ORIGIN));
        assert!(engine.await_result(&id).await.is_some());
    }

    #[tokio::test]
    async fn duplicate_submission_refused() {
        let engine = engine_with(Arc::new(ApproveAll), ConsensusConfig::default());
        let p = Proposal::new("alice", ActionType::Transaction).with_id("p1");
        engine.submit_proposal(p.clone()).unwrap();
        assert!(matches!(
            engine.submit_proposal(p),
            Err(ConsensusError::DuplicateProposal(_))
        ));
    }

    #[tokio::test]
    async fn duplicate_id_leaves_lattice_untouched() {
        let engine = engine_with(Arc::new(ApproveAll), ConsensusConfig::default());
        engine
            .submit_proposal(Proposal::new("alice", ActionType::Transaction).with_id("p1"))
            .unwrap();
        assert_eq!(engine.lattice().len(), 1);

        let err = engine
            .submit_proposal(Proposal::new("bob", ActionType::Transaction).with_id("p1"))
            .unwrap_err();

        assert_eq!(err, ConsensusError::DuplicateProposal(ProposalId::from("p1")));
        assert_eq!(engine.lattice().len(), 1);
        assert!(engine.lattice().coordinate_of(&"bob".into()).is_none());
        assert!(engine.lattice().neighbors(&"alice".into()).is_empty());
    }

    #[tokio::test]
    async fn unanimous_neighbors_approve() {
        let config = ConsensusConfig::default().with_retain_votes(true);
        let engine = engine_with(Arc::new(ApproveAll), config);
        cross(&engine);

        let id = engine
            .submit_proposal(Proposal::new("center", ActionType::DataUpdate))
            .unwrap();
        let result = engine.await_result(&id).await.unwrap();

        assert!(result.approved);
        assert_eq!((result.approvals, result.rejections), (5, 0));
        assert_eq!(result.score, 1.0);
        assert_eq!(engine.state(&id), Some(ProposalState::Approved));
        assert_eq!(engine.votes(&id).map(|v| v.len()), Some(5));
    }

    #[tokio::test]
    async fn proposer_vote_can_be_disabled() {
        let validator = FnValidator::new(|_: &Proposal, voter: &AgentId| {
            if voter.as_str() == "w" {
                VoteDecision::Reject
            } else {
                VoteDecision::Approve
            }
        });
        let config = ConsensusConfig::default().with_proposer_vote(false);
        let engine = engine_with(Arc::new(validator), config);
        cross(&engine);

        let id = engine
            .submit_proposal(Proposal::new("center", ActionType::Transaction))
            .unwrap();
        let result = engine.await_result(&id).await.unwrap();

        assert_eq!((result.approvals, result.rejections), (3, 1));
        assert_eq!(result.score, 0.75);
        assert!(result.approved);
    }

    #[tokio::test]
    async fn cycle_vetoes_despite_unanimity() {
        let engine = engine_with(Arc::new(ApproveAll), ConsensusConfig::default());
        cross(&engine);

        let trace = vec![
            ReasoningNode::new("a", "premise").connect("b"),
            ReasoningNode::new("b", "inference").connect("a"),
        ];
        let id = engine
            .submit_proposal(Proposal::new("center", ActionType::SecurityAlert).with_reasoning(trace))
            .unwrap();
        let result = engine.await_result(&id).await.unwrap();

        assert!(result.vetoed);
        assert!(!result.approved);
        assert_eq!(result.score, 1.0);
        assert!(result.note.contains("circular reasoning"));
        assert_eq!(result.betti.map(|b| b.b1), Some(1));
        assert_eq!(engine.state(&id), Some(ProposalState::Vetoed));
    }

    #[tokio::test]
    async fn isolated_proposer_rejected_by_default() {
        let engine = engine_with(Arc::new(ApproveAll), ConsensusConfig::default());
        let id = engine
            .submit_proposal(Proposal::new("hermit", ActionType::Transaction))
            .unwrap();
        let result = engine.await_result(&id).await.unwrap();

        assert!(!result.approved);
        assert_eq!(result.score, 0.0);
        assert_eq!(result.total_votes(), 0);
        assert!(result.note.contains("isolated"));
    }

    #[tokio::test]
    async fn isolated_proposer_auto_approved_by_policy() {
        let config = ConsensusConfig::default().with_isolation_policy(IsolationPolicy::AutoApprove);
        let engine = engine_with(Arc::new(ApproveAll), config);
        let id = engine
            .submit_proposal(Proposal::new("hermit", ActionType::Transaction))
            .unwrap();
        let result = engine.await_result(&id).await.unwrap();

        assert!(result.approved);
        assert_eq!((result.approvals, result.rejections), (1, 0));
    }

    #[tokio::test]
    async fn fallback_pool_polled_with_first_vote_winning() {
        let pool = vec!["oracle".into(), "oracle".into(), "hermit".into()];
        let config = ConsensusConfig::default().with_isolation_policy(IsolationPolicy::FallbackPool(pool));
        let validator = FnValidator::new(|_: &Proposal, _: &AgentId| VoteDecision::Reject);
        let engine = engine_with(Arc::new(validator), config);

        let id = engine
            .submit_proposal(Proposal::new("hermit", ActionType::Transaction))
            .unwrap();
        let result = engine.await_result(&id).await.unwrap();

        // hermit's self-approval stands, its polled vote and oracle's repeat are ignored
        assert_eq!((result.approvals, result.rejections), (1, 1));
        assert!(result.note.contains("duplicate vote"));
    }

    #[tokio::test(start_paused = true)]
    async fn slow_validator_times_out_as_rejection() {
        struct Stalling;

        #[async_trait::async_trait]
        impl Validator for Stalling {
            async fn validate(
                &self,
                _proposal: &Proposal,
                voter: &AgentId,
            ) -> std::result::Result<VoteDecision, crate::ValidatorError> {
                if voter.as_str() == "w" {
                    futures::future::pending::<()>().await;
                }
                Ok(VoteDecision::Approve)
            }
        }

        let config = ConsensusConfig::default().with_vote_timeout(Duration::from_millis(100));
        let engine = engine_with(Arc::new(Stalling), config);
        cross(&engine);

        let id = engine
            .submit_proposal(Proposal::new("center", ActionType::Transaction))
            .unwrap();
        let result = engine.await_result(&id).await.unwrap();

        assert_eq!((result.approvals, result.rejections), (4, 1));
        assert_eq!(result.score, 0.8);
        assert!(result.note.contains("timed out"));
    }

    #[tokio::test]
    async fn check_consensus_is_stable() {
        let engine = engine_with(Arc::new(ApproveAll), ConsensusConfig::default());
        cross(&engine);
        let id = engine
            .submit_proposal(Proposal::new("center", ActionType::Transaction))
            .unwrap();
        engine.await_result(&id).await;

        let first = engine.check_consensus(&id);
        assert!(first.is_some());
        assert_eq!(first, engine.check_consensus(&id));

        // Votes are dropped after finalization unless retention is on
        assert!(engine.votes(&id).is_none());
    }
}
