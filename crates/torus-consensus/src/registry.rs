//! Proposal registry: the single source of truth for proposal state.
//!
//! Results are append-once: the first finalization wins and every later
//! attempt is refused. Each entry carries a `watch` channel so waiters can
//! block until their proposal reaches a terminal state without polling.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::Utc;
use tokio::sync::{broadcast, watch};
use torus_topology::AgentId;
use tracing::{debug, info};

use crate::bus::{NotificationBus, Subscription};
use crate::error::{ConsensusError, Result};
use crate::events::ConsensusEvent;
use crate::quorum::Vote;
use crate::result::{ConsensusResult, ProposalState};
use crate::{Proposal, ProposalId};

/// Lifecycle of one registered proposal.
#[derive(Debug, Clone, PartialEq)]
pub enum ProposalStatus {
    Pending,
    CollectingVotes,
    Finalized(ConsensusResult),
    Withdrawn,
}

impl ProposalStatus {
    pub fn state(&self) -> ProposalState {
        match self {
            ProposalStatus::Pending => ProposalState::Pending,
            ProposalStatus::CollectingVotes => ProposalState::CollectingVotes,
            ProposalStatus::Finalized(result) => result.state(),
            ProposalStatus::Withdrawn => ProposalState::Withdrawn,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.state().is_terminal()
    }
}

#[derive(Debug)]
struct Entry {
    proposal: Arc<Proposal>,
    status: watch::Sender<ProposalStatus>,
    votes: Option<Vec<Vote>>,
}

/// Proposals and their results, keyed by id.
#[derive(Debug)]
pub struct ProposalRegistry {
    entries: RwLock<HashMap<ProposalId, Entry>>,
    bus: Arc<NotificationBus>,
    events: broadcast::Sender<ConsensusEvent>,
    retain_votes: bool,
}

impl ProposalRegistry {
    pub fn new(event_capacity: usize, retain_votes: bool) -> Self {
        let (events, _) = broadcast::channel(event_capacity.max(1));
        Self {
            entries: RwLock::new(HashMap::new()),
            bus: Arc::new(NotificationBus::new()),
            events,
            retain_votes,
        }
    }

    /// Store a new proposal in the `Pending` state.
    pub fn insert(&self, proposal: Proposal) -> Result<Arc<Proposal>> {
        let proposal = Arc::new(proposal);
        {
            let mut entries = self.write();
            if entries.contains_key(&proposal.id) {
                return Err(ConsensusError::DuplicateProposal(proposal.id.clone()));
            }
            let (status, _) = watch::channel(ProposalStatus::Pending);
            entries.insert(
                proposal.id.clone(),
                Entry {
                    proposal: Arc::clone(&proposal),
                    status,
                    votes: None,
                },
            );
        }

        self.publish(ConsensusEvent::Submitted {
            proposal_id: proposal.id.clone(),
            proposer_id: proposal.proposer_id.clone(),
            timestamp: Utc::now(),
        });
        Ok(proposal)
    }

    /// Move a pending proposal into vote collection.
    pub fn begin_voting(&self, id: &ProposalId) -> Result<()> {
        let entries = self.read();
        let entry = entries
            .get(id)
            .ok_or_else(|| ConsensusError::UnknownProposal(id.clone()))?;

        let mut moved = false;
        entry.status.send_if_modified(|status| {
            if *status == ProposalStatus::Pending {
                *status = ProposalStatus::CollectingVotes;
                moved = true;
                true
            } else {
                false
            }
        });
        if moved {
            debug!(proposal = %id, "Collecting votes");
        }
        Ok(())
    }

    /// Record the one and only result for a proposal, then notify.
    ///
    /// Fails if the proposal is unknown, withdrawn, or already finalized;
    /// in those cases nothing is stored and nobody is notified.
    pub fn finalize(&self, result: ConsensusResult, votes: Vec<Vote>) -> Result<()> {
        let id = result.proposal_id.clone();
        {
            let mut entries = self.write();
            let entry = entries
                .get_mut(&id)
                .ok_or_else(|| ConsensusError::UnknownProposal(id.clone()))?;

            match &*entry.status.borrow() {
                ProposalStatus::Finalized(_) => return Err(ConsensusError::AlreadyFinalized(id)),
                ProposalStatus::Withdrawn => return Err(ConsensusError::Withdrawn(id)),
                ProposalStatus::Pending | ProposalStatus::CollectingVotes => {}
            }

            if self.retain_votes {
                entry.votes = Some(votes);
            }
            entry.status.send_replace(ProposalStatus::Finalized(result.clone()));
        }

        info!(
            proposal = %id,
            state = ?result.state(),
            score = result.score,
            "Proposal finalized"
        );

        let notified = self.bus.notify(&id);
        debug!(proposal = %id, subscribers = notified, "Subscribers notified");

        self.publish(ConsensusEvent::Finalized {
            proposal_id: id,
            approved: result.approved,
            vetoed: result.vetoed,
            score: result.score,
            timestamp: result.finalized_at,
        });
        Ok(())
    }

    /// Cancel a proposal before it finalizes. No subscriber is notified.
    pub fn withdraw(&self, id: &ProposalId, requester: &AgentId) -> Result<()> {
        {
            let entries = self.read();
            let entry = entries
                .get(id)
                .ok_or_else(|| ConsensusError::UnknownProposal(id.clone()))?;

            if &entry.proposal.proposer_id != requester {
                return Err(ConsensusError::NotProposer {
                    proposal: id.clone(),
                    requester: requester.clone(),
                });
            }

            let mut refusal = None;
            entry.status.send_if_modified(|status| match status {
                ProposalStatus::Finalized(_) => {
                    refusal = Some(ConsensusError::AlreadyFinalized(id.clone()));
                    false
                }
                ProposalStatus::Withdrawn => {
                    refusal = Some(ConsensusError::Withdrawn(id.clone()));
                    false
                }
                ProposalStatus::Pending | ProposalStatus::CollectingVotes => {
                    *status = ProposalStatus::Withdrawn;
                    true
                }
            });
            if let Some(err) = refusal {
                return Err(err);
            }
        }

        info!(proposal = %id, requester = %requester, "Proposal withdrawn");
        self.publish(ConsensusEvent::Withdrawn {
            proposal_id: id.clone(),
            timestamp: Utc::now(),
        });
        Ok(())
    }

    /// The finalized result, if any.
    pub fn result(&self, id: &ProposalId) -> Option<ConsensusResult> {
        let entries = self.read();
        let status = entries.get(id)?.status.borrow();
        match &*status {
            ProposalStatus::Finalized(result) => Some(result.clone()),
            _ => None,
        }
    }

    pub fn status(&self, id: &ProposalId) -> Option<ProposalStatus> {
        self.read().get(id).map(|e| e.status.borrow().clone())
    }

    pub fn state(&self, id: &ProposalId) -> Option<ProposalState> {
        self.read().get(id).map(|e| e.status.borrow().state())
    }

    pub fn proposal(&self, id: &ProposalId) -> Option<Arc<Proposal>> {
        self.read().get(id).map(|e| Arc::clone(&e.proposal))
    }

    /// Counted votes of a finalized proposal, when vote retention is on.
    pub fn votes(&self, id: &ProposalId) -> Option<Vec<Vote>> {
        self.read().get(id).and_then(|e| e.votes.clone())
    }

    /// Proposals that have not reached a terminal state, sorted by id.
    pub fn pending(&self) -> Vec<ProposalId> {
        let mut ids: Vec<ProposalId> = self
            .read()
            .iter()
            .filter(|(_, e)| !e.status.borrow().is_terminal())
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort();
        ids
    }

    /// Whether a proposal with this id was ever inserted.
    pub fn contains(&self, id: &ProposalId) -> bool {
        self.read().contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Wait until a proposal is finalized or withdrawn.
    ///
    /// Returns the result, or `None` for unknown and withdrawn proposals.
    pub async fn wait(&self, id: &ProposalId) -> Option<ConsensusResult> {
        let mut rx = self.read().get(id)?.status.subscribe();
        let status = rx.wait_for(ProposalStatus::is_terminal).await.ok()?;
        match &*status {
            ProposalStatus::Finalized(result) => Some(result.clone()),
            _ => None,
        }
    }

    /// Register a finalization callback.
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&ProposalId) + Send + Sync + 'static,
    {
        self.bus.subscribe(callback)
    }

    /// Stream of lifecycle events.
    pub fn events(&self) -> broadcast::Receiver<ConsensusEvent> {
        self.events.subscribe()
    }

    fn publish(&self, event: ConsensusEvent) {
        let event_type = event.event_type();
        // No receivers is fine: the event stream is optional
        match self.events.send(event) {
            Ok(receivers) => debug!(event_type, receivers, "Event published"),
            Err(_) => debug!(event_type, "Event published (no receivers)"),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<ProposalId, Entry>> {
        self.entries.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<ProposalId, Entry>> {
        self.entries.write().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ActionType;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn proposal(id: &str) -> Proposal {
        Proposal::new("alice", ActionType::Transaction).with_id(id)
    }

    fn result(id: &str, approved: bool) -> ConsensusResult {
        ConsensusResult {
            proposal_id: ProposalId::from(id),
            approved,
            score: if approved { 1.0 } else { 0.0 },
            approvals: usize::from(approved),
            rejections: usize::from(!approved),
            vetoed: false,
            note: "test".into(),
            finalized_at: Utc::now(),
            betti: None,
        }
    }

    #[test]
    fn duplicate_ids_rejected() {
        let registry = ProposalRegistry::new(16, true);
        registry.insert(proposal("p1")).unwrap();
        assert!(registry.contains(&ProposalId::from("p1")));
        assert!(!registry.contains(&ProposalId::from("p2")));
        assert_eq!(
            registry.insert(proposal("p1")).unwrap_err(),
            ConsensusError::DuplicateProposal(ProposalId::from("p1"))
        );
    }

    #[test]
    fn lifecycle_states() {
        let registry = ProposalRegistry::new(16, true);
        let id = ProposalId::from("p1");
        registry.insert(proposal("p1")).unwrap();
        assert_eq!(registry.state(&id), Some(ProposalState::Pending));

        registry.begin_voting(&id).unwrap();
        assert_eq!(registry.state(&id), Some(ProposalState::CollectingVotes));
        assert_eq!(registry.pending(), vec![id.clone()]);
        assert!(registry.result(&id).is_none());

        registry.finalize(result("p1", true), Vec::new()).unwrap();
        assert_eq!(registry.state(&id), Some(ProposalState::Approved));
        assert!(registry.pending().is_empty());
    }

    #[test]
    fn results_are_write_once() {
        let registry = ProposalRegistry::new(16, true);
        let id = ProposalId::from("p1");
        registry.insert(proposal("p1")).unwrap();

        let first = result("p1", true);
        registry.finalize(first.clone(), Vec::new()).unwrap();
        assert_eq!(
            registry.finalize(result("p1", false), Vec::new()).unwrap_err(),
            ConsensusError::AlreadyFinalized(id.clone())
        );
        assert_eq!(registry.result(&id), Some(first));
    }

    #[test]
    fn finalize_notifies_each_subscriber_once() {
        let registry = ProposalRegistry::new(16, true);
        let count = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&count);
        let _sub = registry.subscribe(move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        });

        registry.insert(proposal("p1")).unwrap();
        registry.finalize(result("p1", true), Vec::new()).unwrap();
        let _ = registry.finalize(result("p1", true), Vec::new());

        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn withdraw_suppresses_finalization() {
        let registry = ProposalRegistry::new(16, true);
        let id = ProposalId::from("p1");
        let count = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&count);
        let _sub = registry.subscribe(move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        });

        registry.insert(proposal("p1")).unwrap();
        registry.withdraw(&id, &AgentId::from("alice")).unwrap();
        assert_eq!(
            registry.finalize(result("p1", true), Vec::new()).unwrap_err(),
            ConsensusError::Withdrawn(id.clone())
        );
        assert_eq!(registry.state(&id), Some(ProposalState::Withdrawn));
        assert!(registry.result(&id).is_none());
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn only_proposer_may_withdraw() {
        let registry = ProposalRegistry::new(16, true);
        let id = ProposalId::from("p1");
        registry.insert(proposal("p1")).unwrap();

        assert!(matches!(
            registry.withdraw(&id, &AgentId::from("mallory")),
            Err(ConsensusError::NotProposer { .. })
        ));
        registry.finalize(result("p1", false), Vec::new()).unwrap();
        assert_eq!(
            registry.withdraw(&id, &AgentId::from("alice")).unwrap_err(),
            ConsensusError::AlreadyFinalized(id)
        );
    }

    #[test]
    fn votes_retained_only_when_enabled() {
        let vote = Vote::new(ProposalId::from("p1"), AgentId::from("bob"), crate::VoteDecision::Approve);

        let keeping = ProposalRegistry::new(16, true);
        keeping.insert(proposal("p1")).unwrap();
        keeping.finalize(result("p1", true), vec![vote.clone()]).unwrap();
        assert_eq!(keeping.votes(&ProposalId::from("p1")), Some(vec![vote.clone()]));

        let discarding = ProposalRegistry::new(16, false);
        discarding.insert(proposal("p1")).unwrap();
        discarding.finalize(result("p1", true), vec![vote]).unwrap();
        assert_eq!(discarding.votes(&ProposalId::from("p1")), None);
    }

    #[tokio::test]
    async fn wait_resolves_on_finalize() {
        let registry = Arc::new(ProposalRegistry::new(16, true));
        let id = ProposalId::from("p1");
        registry.insert(proposal("p1")).unwrap();

        let waiter = {
            let registry = Arc::clone(&registry);
            let id = id.clone();
            tokio::spawn(async move { registry.wait(&id).await })
        };
        tokio::task::yield_now().await;

        let expected = result("p1", true);
        registry.finalize(expected.clone(), Vec::new()).unwrap();
        assert_eq!(waiter.await.unwrap(), Some(expected));
    }

    #[tokio::test]
    async fn wait_on_withdrawn_or_unknown_is_none() {
        let registry = ProposalRegistry::new(16, true);
        let id = ProposalId::from("p1");
        assert!(registry.wait(&id).await.is_none());

        registry.insert(proposal("p1")).unwrap();
        registry.withdraw(&id, &AgentId::from("alice")).unwrap();
        assert!(registry.wait(&id).await.is_none());
    }

    #[tokio::test]
    async fn events_follow_lifecycle() {
        let registry = ProposalRegistry::new(16, true);
        let mut events = registry.events();

        registry.insert(proposal("p1")).unwrap();
        registry.finalize(result("p1", true), Vec::new()).unwrap();

        assert_eq!(events.recv().await.unwrap().event_type(), "submitted");
        let finalized = events.recv().await.unwrap();
        assert_eq!(finalized.event_type(), "finalized");
        assert_eq!(finalized.proposal_id().as_str(), "p1");
    }
}
