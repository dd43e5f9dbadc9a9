//! Error types for torus-topology.

use thiserror::Error;

use crate::{AgentId, Coord};

/// Result type for lattice operations.
pub type Result<T> = std::result::Result<T, TopologyError>;

/// Errors that can occur while managing the lattice.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TopologyError {
    /// Every cell already has an occupant.
    #[error("lattice is full: all {capacity} cells are occupied")]
    RegistryFull { capacity: usize },

    /// The requested cell belongs to another agent.
    #[error("cell {coord} is already occupied by {occupant}")]
    CellOccupied { coord: Coord, occupant: AgentId },

    /// The agent was never registered.
    #[error("unknown agent: {0}")]
    UnknownAgent(AgentId),

    /// Width and height must both be non-zero.
    #[error("invalid lattice dimensions {width}x{height}")]
    InvalidDimensions { width: u32, height: u32 },
}
