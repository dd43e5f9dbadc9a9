//! Torus lattice simulation
//!
//! Fills a lattice with agents and runs three proposals through the
//! consensus engine: a clean one, one its neighbors dislike, and one whose
//! reasoning goes in a circle.
//!
//! Usage: `torus-sim [agents] [width] [height]`
//! (`TORUS_WIDTH` / `TORUS_HEIGHT` are used when the positional
//! dimensions are omitted; engine settings come from `TORUS_*`.)

use std::env;
use std::sync::Arc;

use serde_json::json;
use torus_consensus::{
    ActionType, ConsensusConfig, ConsensusEngine, ConsensusEvent, FnValidator, Proposal, VoteDecision,
};
use torus_integrity::{chain, ReasoningNode};
use torus_topology::{AgentId, Lattice};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "torus_sim=info,torus_consensus=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args: Vec<String> = env::args().collect();

    let agent_count: usize = args.get(1).and_then(|s| s.parse().ok()).unwrap_or(25);
    let width: u32 = args
        .get(2)
        .cloned()
        .or_else(|| env::var("TORUS_WIDTH").ok())
        .and_then(|s| s.parse().ok())
        .unwrap_or(10);
    let height: u32 = args
        .get(3)
        .cloned()
        .or_else(|| env::var("TORUS_HEIGHT").ok())
        .and_then(|s| s.parse().ok())
        .unwrap_or(10);

    let config = ConsensusConfig::from_env()?;
    let lattice = Arc::new(Lattice::new(width, height)?);

    // Neighbors veto anything flagged risky
    let validator = FnValidator::new(|proposal: &Proposal, _voter: &AgentId| {
        if proposal.payload.get("risky").and_then(|v| v.as_bool()) == Some(true) {
            VoteDecision::Reject
        } else {
            VoteDecision::Approve
        }
    });

    let engine = ConsensusEngine::new(Arc::clone(&lattice), Arc::new(validator), config)?;

    println!("Torus Consensus Simulation");
    println!("==========================");
    println!();
    println!("Lattice {}x{}, registering {} agents...", width, height, agent_count);

    for i in 0..agent_count {
        if lattice.is_full() {
            println!("  Lattice full after {} agents", lattice.len());
            break;
        }
        engine.register(format!("agent-{i}"), None)?;
    }

    let proposer = AgentId::from("agent-0");
    if lattice.agent(&proposer).is_none() {
        engine.register(proposer.clone(), None)?;
    }
    println!(
        "  {} sits at {:?} with neighbors {:?}",
        proposer,
        lattice.coordinate_of(&proposer),
        lattice
            .neighbors(&proposer)
            .iter()
            .map(AgentId::as_str)
            .collect::<Vec<_>>()
    );

    let _subscription = engine.subscribe(|id| info!(proposal = %id, "Finalization delivered"));

    let mut events = engine.events();
    let event_log = tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            if let ConsensusEvent::Finalized { proposal_id, score, .. } = &event {
                info!(proposal = %proposal_id, score, "Event: {}", event.event_type());
            }
        }
    });

    let clean = Proposal::new(proposer.clone(), ActionType::Transaction)
        .with_id("clean-transfer")
        .with_payload(json!({ "amount": 40, "to": "agent-3" }))
        .with_reasoning(chain(&["balance checked", "limit respected", "transfer"]));

    let risky = Proposal::new(proposer.clone(), ActionType::DataUpdate)
        .with_id("risky-update")
        .with_payload(json!({ "field": "quota", "risky": true }));

    let circular = Proposal::new(proposer.clone(), ActionType::SecurityAlert)
        .with_id("circular-alert")
        .with_reasoning(vec![
            ReasoningNode::new("a", "the node is compromised").connect("b"),
            ReasoningNode::new("b", "it sends odd traffic").connect("c"),
            ReasoningNode::new("c", "compromised nodes send odd traffic").connect("a"),
        ]);

    let ids = vec![
        engine.submit_proposal(clean)?,
        engine.submit_proposal(risky)?,
        engine.submit_proposal(circular)?,
    ];

    println!();
    println!("Results:");
    for id in &ids {
        match engine.await_result(id).await {
            Some(result) => println!(
                "  {:<16} {:?}  {}/{} score={:.2}  {}",
                id.as_str(),
                result.state(),
                result.approvals,
                result.total_votes(),
                result.score,
                result.note
            ),
            None => println!("  {:<16} withdrawn", id.as_str()),
        }
    }

    drop(engine);
    event_log.abort();

    Ok(())
}
