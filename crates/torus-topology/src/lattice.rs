//! Agent occupancy on a fixed-size torus.
//!
//! The lattice is the only piece of shared state that several call paths
//! mutate (concurrent registrations), so all occupancy changes go through a
//! single write lock: a cell is checked and claimed under the same guard,
//! which rules out two agents landing on one cell.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::{debug, info, warn};

use crate::error::{Result, TopologyError};
use crate::{Coord, Neighbors};

/// Unique agent identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize), serde(transparent))]
pub struct AgentId(String);

impl AgentId {
    /// Create an id from any string-like value.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the raw id.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the id is the empty string.
    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl From<&str> for AgentId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for AgentId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for AgentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Health of an agent and the cell it occupies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum NodeStatus {
    #[default]
    Active,
    Faulty,
    Correcting,
}

/// A registered agent.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Agent {
    pub id: AgentId,
    pub coordinate: Coord,
    pub status: NodeStatus,
}

/// One grid cell.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LatticeNode {
    pub coordinate: Coord,
    pub occupant: Option<AgentId>,
    pub status: NodeStatus,
}

#[derive(Debug)]
struct LatticeState {
    /// Row-major: index = y * width + x
    cells: Vec<LatticeNode>,
    agents: HashMap<AgentId, Agent>,
}

/// A `width × height` toroidal grid of agents.
#[derive(Debug)]
pub struct Lattice {
    width: u32,
    height: u32,
    state: RwLock<LatticeState>,
}

impl Lattice {
    /// Create an empty lattice.
    pub fn new(width: u32, height: u32) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(TopologyError::InvalidDimensions { width, height });
        }

        let cells = (0..i64::from(height))
            .flat_map(|y| (0..i64::from(width)).map(move |x| Coord::new(x, y)))
            .map(|coordinate| LatticeNode {
                coordinate,
                occupant: None,
                status: NodeStatus::Active,
            })
            .collect();

        Ok(Self {
            width,
            height,
            state: RwLock::new(LatticeState {
                cells,
                agents: HashMap::new(),
            }),
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Total number of cells.
    pub fn capacity(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Number of registered agents.
    pub fn len(&self) -> usize {
        self.read().agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_full(&self) -> bool {
        self.len() >= self.capacity()
    }

    /// Toroidal modulo onto this grid.
    pub fn wrap(&self, x: i64, y: i64) -> Coord {
        Coord::new(x, y).wrapped(self.width, self.height)
    }

    /// Register an agent, returning its cell.
    ///
    /// Without a coordinate the first free cell in row-major order is
    /// taken. A requested coordinate is wrapped onto the grid first.
    /// Re-registering an agent returns the cell it already holds.
    pub fn register(&self, agent_id: impl Into<AgentId>, coordinate: Option<Coord>) -> Result<Coord> {
        let id = agent_id.into();
        let mut state = self.write();

        if let Some(existing) = state.agents.get(&id) {
            debug!(agent = %id, coord = %existing.coordinate, "Agent already registered");
            return Ok(existing.coordinate);
        }

        let coord = match coordinate {
            Some(requested) => {
                let coord = self.wrap(requested.x, requested.y);
                if let Some(occupant) = &state.cells[self.index(coord)].occupant {
                    return Err(TopologyError::CellOccupied {
                        coord,
                        occupant: occupant.clone(),
                    });
                }
                coord
            }
            None => state
                .cells
                .iter()
                .find(|cell| cell.occupant.is_none())
                .map(|cell| cell.coordinate)
                .ok_or_else(|| {
                    warn!(agent = %id, capacity = self.capacity(), "Lattice full, registration refused");
                    TopologyError::RegistryFull {
                        capacity: self.capacity(),
                    }
                })?,
        };

        let index = self.index(coord);
        let cell = &mut state.cells[index];
        cell.occupant = Some(id.clone());
        cell.status = NodeStatus::Active;

        state.agents.insert(
            id.clone(),
            Agent {
                id: id.clone(),
                coordinate: coord,
                status: NodeStatus::Active,
            },
        );

        info!(agent = %id, coord = %coord, "Agent registered");
        Ok(coord)
    }

    /// Occupants of the wrapped N, S, E, W cells of an agent.
    ///
    /// Empty cells are skipped, the agent never appears in its own list,
    /// and an agent reachable in several directions appears once.
    /// Unregistered or isolated agents get an empty list.
    pub fn neighbors(&self, agent_id: &AgentId) -> Vec<AgentId> {
        let state = self.read();
        let Some(agent) = state.agents.get(agent_id) else {
            return Vec::new();
        };

        Neighbors::distinct_of(agent.coordinate, self.width, self.height)
            .into_iter()
            .filter_map(|cell| state.cells[self.index(cell)].occupant.clone())
            .filter(|occupant| occupant != agent_id)
            .collect()
    }

    /// Look up a registered agent.
    pub fn agent(&self, agent_id: &AgentId) -> Option<Agent> {
        self.read().agents.get(agent_id).cloned()
    }

    /// Cell held by an agent.
    pub fn coordinate_of(&self, agent_id: &AgentId) -> Option<Coord> {
        self.read().agents.get(agent_id).map(|a| a.coordinate)
    }

    /// Occupant of a (wrapped) cell.
    pub fn occupant(&self, coord: Coord) -> Option<AgentId> {
        let coord = self.wrap(coord.x, coord.y);
        self.read().cells[self.index(coord)].occupant.clone()
    }

    /// Snapshot of every cell in row-major order.
    pub fn nodes(&self) -> Vec<LatticeNode> {
        self.read().cells.clone()
    }

    /// Flag an agent and its cell as faulty.
    pub fn mark_faulty(&self, agent_id: &AgentId) -> Result<()> {
        self.set_status(agent_id, NodeStatus::Faulty)
    }

    /// Flag an agent as recovering from a fault.
    pub fn begin_correction(&self, agent_id: &AgentId) -> Result<()> {
        self.set_status(agent_id, NodeStatus::Correcting)
    }

    /// Return an agent to active service.
    pub fn clear_faulty(&self, agent_id: &AgentId) -> Result<()> {
        self.set_status(agent_id, NodeStatus::Active)
    }

    /// Cells currently flagged faulty.
    pub fn scan_faulty(&self) -> Vec<LatticeNode> {
        self.read()
            .cells
            .iter()
            .filter(|cell| cell.status == NodeStatus::Faulty)
            .cloned()
            .collect()
    }

    fn set_status(&self, agent_id: &AgentId, status: NodeStatus) -> Result<()> {
        let mut state = self.write();
        let coord = match state.agents.get_mut(agent_id) {
            Some(agent) => {
                agent.status = status;
                agent.coordinate
            }
            None => return Err(TopologyError::UnknownAgent(agent_id.clone())),
        };
        let index = self.index(coord);
        state.cells[index].status = status;

        info!(agent = %agent_id, ?status, "Agent status changed");
        Ok(())
    }

    /// Row-major index of an in-range coordinate.
    fn index(&self, coord: Coord) -> usize {
        coord.y as usize * self.width as usize + coord.x as usize
    }

    fn read(&self) -> RwLockReadGuard<'_, LatticeState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, LatticeState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}
