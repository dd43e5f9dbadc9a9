//! Torus Lattice Topology
//!
//! Fixed-size 2D grid with wraparound edges on which agents are placed.
//!
//! # Geometry
//!
//! The grid is a torus: leaving the right edge re-enters on the left and
//! leaving the top re-enters at the bottom. There is no boundary, so every
//! cell has exactly 4 orthogonal connections:
//! - North (y - 1)
//! - South (y + 1)
//! - East (x + 1)
//! - West (x - 1)
//!
//! # Occupancy
//!
//! Each cell holds at most one agent. Agents are placed either at a
//! requested cell or at the first free cell in row-major scan order, and
//! keep that cell for the lifetime of the lattice.

mod coord;
mod error;
mod lattice;
mod neighbors;

pub use coord::Coord;
pub use error::{Result, TopologyError};
pub use lattice::{Agent, AgentId, Lattice, LatticeNode, NodeStatus};
pub use neighbors::{Direction, Neighbors};

/// Connections per cell (invariant: always 4 on a torus)
pub const CONNECTIONS_PER_CELL: usize = 4;

/// Vertical connections (north/south)
pub const VERTICAL_CONNECTIONS: usize = 2;

/// Horizontal connections (east/west)
pub const HORIZONTAL_CONNECTIONS: usize = 2;

// Compile-time assertion of the 4-connection invariant
const _: () = assert!(VERTICAL_CONNECTIONS + HORIZONTAL_CONNECTIONS == CONNECTIONS_PER_CELL);
