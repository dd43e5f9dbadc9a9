//! Test harness for end-to-end consensus scenarios.
//!
//! Provides a [`ScriptedValidator`] whose per-voter behavior is fixed up
//! front, and fixtures for placing a proposer with a full set of neighbors.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, Once, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use torus_consensus::{ConsensusConfig, ConsensusEngine, Proposal, Validator, ValidatorError, VoteDecision};
use torus_integrity::ReasoningNode;
use torus_topology::{AgentId, Coord, Lattice};

/// How one voter behaves.
#[derive(Debug, Clone, PartialEq)]
pub enum Script {
    Approve,
    Reject,
    /// Never answers
    Stall,
    /// Answers after a delay
    Delay(Duration, VoteDecision),
    Fail(String),
    Panic,
}

/// Validator that plays back a fixed script per voter.
///
/// Voters without a script approve. Every call is recorded.
#[derive(Debug, Default)]
pub struct ScriptedValidator {
    scripts: HashMap<AgentId, Script>,
    calls: Mutex<Vec<AgentId>>,
}

impl ScriptedValidator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, voter: &str, script: Script) -> Self {
        self.scripts.insert(AgentId::from(voter), script);
        self
    }

    /// Voters polled so far, in call order.
    pub fn calls(&self) -> Vec<AgentId> {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

#[async_trait]
impl Validator for ScriptedValidator {
    async fn validate(&self, _proposal: &Proposal, voter: &AgentId) -> Result<VoteDecision, ValidatorError> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(voter.clone());

        match self.scripts.get(voter).cloned().unwrap_or(Script::Approve) {
            Script::Approve => Ok(VoteDecision::Approve),
            Script::Reject => Ok(VoteDecision::Reject),
            Script::Stall => futures::future::pending().await,
            Script::Delay(after, decision) => {
                tokio::time::sleep(after).await;
                Ok(decision)
            }
            Script::Fail(reason) => Err(ValidatorError::new(reason)),
            Script::Panic => panic!("scripted validator panic for {voter}"),
        }
    }
}

/// Names of the four neighbors placed by [`place_cross`].
pub const CROSS: [&str; 4] = ["north", "south", "east", "west"];

/// Place `center` at `at` with an agent in each orthogonal cell.
pub fn place_cross(engine: &ConsensusEngine, center: &str, at: Coord) {
    let lattice = engine.lattice();
    let cells = [
        (center, at),
        (CROSS[0], Coord::new(at.x, at.y - 1)),
        (CROSS[1], Coord::new(at.x, at.y + 1)),
        (CROSS[2], Coord::new(at.x + 1, at.y)),
        (CROSS[3], Coord::new(at.x - 1, at.y)),
    ];
    for (id, coord) in cells {
        if let Err(err) = lattice.register(id, Some(coord)) {
            panic!("placing {id} at {coord}: {err}");
        }
    }
}

/// Engine over a fresh `width x height` lattice.
pub fn engine(
    width: u32,
    height: u32,
    validator: Arc<dyn Validator>,
    config: ConsensusConfig,
) -> ConsensusEngine {
    let lattice = match Lattice::new(width, height) {
        Ok(lattice) => Arc::new(lattice),
        Err(err) => panic!("lattice {width}x{height}: {err}"),
    };
    match ConsensusEngine::new(lattice, validator, config) {
        Ok(engine) => engine,
        Err(err) => panic!("engine: {err}"),
    }
}

/// A closed loop of `len` reasoning steps.
pub fn cyclic_trace(len: usize) -> Vec<ReasoningNode> {
    (0..len)
        .map(|i| ReasoningNode::new(format!("step-{i}"), format!("claim {i}")).connect(format!("step-{}", (i + 1) % len)))
        .collect()
}

/// Route engine logs to the test writer once per process.
pub fn init_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "torus_consensus=debug".into()),
            )
            .with_test_writer()
            .try_init();
    });
}
