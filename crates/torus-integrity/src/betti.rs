//! Betti numbers of the connection graph.
//!
//! - b0: connected components, via union-find over declared connections
//! - b1: independent cycles, the cycle rank `E - V + b0`
//! - b2: always 0, the model stops at the 1-skeleton
//!
//! Edges are counted per declaration, so a pair of nodes that reference
//! each other contributes two parallel edges (a 2-cycle) and a node that
//! references itself contributes a loop (a 1-cycle).

use std::collections::HashMap;

use crate::Simplex;

/// Betti numbers of a reasoning complex.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BettiNumbers {
    /// β_0: connected components
    pub b0: usize,
    /// β_1: independent cycles
    pub b1: usize,
    /// β_2: voids (not computed for the 1-skeleton model)
    pub b2: usize,
}

impl BettiNumbers {
    pub const fn new(b0: usize, b1: usize, b2: usize) -> Self {
        Self { b0, b1, b2 }
    }

    /// Total number of features.
    pub const fn total(&self) -> usize {
        self.b0 + self.b1 + self.b2
    }

    /// Euler characteristic χ = β_0 - β_1 + β_2
    pub const fn euler_characteristic(&self) -> i64 {
        self.b0 as i64 - self.b1 as i64 + self.b2 as i64
    }

    /// Whether the graph has no cycles.
    pub const fn is_acyclic(&self) -> bool {
        self.b1 == 0
    }
}

impl std::fmt::Display for BettiNumbers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "b0={} b1={} b2={}", self.b0, self.b1, self.b2)
    }
}

/// Disjoint-set forest with path halving and union by rank.
#[derive(Debug, Clone)]
struct UnionFind {
    parent: Vec<usize>,
    rank: Vec<u8>,
    components: usize,
}

impl UnionFind {
    fn new(size: usize) -> Self {
        Self {
            parent: (0..size).collect(),
            rank: vec![0; size],
            components: size,
        }
    }

    fn find(&mut self, mut x: usize) -> usize {
        while self.parent[x] != x {
            self.parent[x] = self.parent[self.parent[x]];
            x = self.parent[x];
        }
        x
    }

    /// Merge the sets holding `a` and `b`; false if they were already joined.
    fn union(&mut self, a: usize, b: usize) -> bool {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra == rb {
            return false;
        }
        match self.rank[ra].cmp(&self.rank[rb]) {
            std::cmp::Ordering::Less => self.parent[ra] = rb,
            std::cmp::Ordering::Greater => self.parent[rb] = ra,
            std::cmp::Ordering::Equal => {
                self.parent[rb] = ra;
                self.rank[ra] = self.rank[ra].saturating_add(1);
            }
        }
        self.components -= 1;
        true
    }
}

/// Betti numbers plus the connections that closed each cycle.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CycleAnalysis {
    pub betti: BettiNumbers,
    pub vertices: usize,
    pub edges: usize,
    /// One `(from, to)` per independent cycle, in declaration order
    pub witnesses: Vec<(String, String)>,
}

/// Compute Betti numbers and cycle witnesses for a set of simplices.
pub fn analyze(simplices: &[Simplex]) -> CycleAnalysis {
    let mut index: HashMap<&str, usize> = HashMap::new();
    for vertex in simplices.iter().flat_map(Simplex::vertices) {
        let next = index.len();
        index.entry(vertex).or_insert(next);
    }

    let vertices = index.len();
    let mut forest = UnionFind::new(vertices);
    let mut edges = 0usize;
    let mut witnesses = Vec::new();

    for (from, to) in simplices.iter().flat_map(Simplex::edges) {
        edges += 1;
        if !forest.union(index[from], index[to]) {
            witnesses.push((from.to_string(), to.to_string()));
        }
    }

    let b0 = forest.components;
    // Every edge either merges two components or closes a cycle, so
    // edges + b0 >= vertices always holds.
    let b1 = edges + b0 - vertices;
    debug_assert_eq!(b1, witnesses.len());

    CycleAnalysis {
        betti: BettiNumbers::new(b0, b1, 0),
        vertices,
        edges,
        witnesses,
    }
}

/// Compute `{b0, b1, b2}` for a set of simplices.
pub fn calculate_betti_numbers(simplices: &[Simplex]) -> BettiNumbers {
    analyze(simplices).betti
}
