//! Torus Reasoning Integrity
//!
//! Structural sanity check for the reasoning behind a proposal, independent
//! of what any peer thinks of the proposal itself.
//!
//! # Model
//!
//! A reasoning trace is a list of concept nodes, each naming the nodes it
//! depends on. The trace becomes a simplicial complex: one simplex per node,
//! of dimension equal to its number of connections. Betti numbers are taken
//! over the 1-skeleton formed by the declared connections:
//!
//! - b0 = connected components (union-find)
//! - b1 = E - V + b0, the number of independent cycles
//! - b2 = 0 (voids are not modelled at this level)
//!
//! A non-zero b1 means the reasoning justifies itself in a circle, which is
//! reported as a hallucination and vetoes the proposal.

mod betti;
mod detector;
mod error;
mod simplex;
mod trace;

pub use betti::{analyze, calculate_betti_numbers, BettiNumbers, CycleAnalysis};
pub use detector::{IntegrityConfig, IntegrityDetector, IntegrityReport};
pub use error::TraceError;
pub use simplex::{Simplex, SimplicialComplex};
pub use trace::{chain, ReasoningNode};
