//! Simplicial complexes built from reasoning traces.
//!
//! Each reasoning node together with the nodes it connects to forms one
//! simplex whose dimension is the number of connections. Only the declared
//! connections become edges of the 1-skeleton; the implied faces between
//! two targets of the same node are not edges, otherwise every branching
//! step would look like a cycle.

use std::collections::HashSet;

use crate::error::TraceError;
use crate::ReasoningNode;

/// A reasoning node and the nodes it depends on.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Simplex {
    /// The node that declared the connections
    pub origin: String,
    /// Connection targets, sorted and unique
    pub targets: Vec<String>,
}

impl Simplex {
    /// Create a simplex (targets will be sorted and deduplicated).
    pub fn new(origin: impl Into<String>, targets: impl IntoIterator<Item = impl Into<String>>) -> Self {
        let mut targets: Vec<String> = targets.into_iter().map(Into::into).collect();
        targets.sort_unstable();
        targets.dedup();
        Self {
            origin: origin.into(),
            targets,
        }
    }

    /// A lone vertex (0-simplex).
    pub fn vertex(id: impl Into<String>) -> Self {
        Self {
            origin: id.into(),
            targets: Vec::new(),
        }
    }

    /// Dimension: number of connections.
    pub fn dim(&self) -> usize {
        self.targets.len()
    }

    /// Every vertex touched by this simplex, origin first.
    pub fn vertices(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.origin.as_str()).chain(self.targets.iter().map(String::as_str))
    }

    /// Declared connection edges `(origin, target)`.
    pub fn edges(&self) -> impl Iterator<Item = (&str, &str)> {
        self.targets.iter().map(move |t| (self.origin.as_str(), t.as_str()))
    }
}

impl From<&ReasoningNode> for Simplex {
    fn from(node: &ReasoningNode) -> Self {
        Self {
            origin: node.id.clone(),
            // BTreeSet iteration is already sorted and unique
            targets: node.connections.iter().cloned().collect(),
        }
    }
}

/// Collection of simplices derived from one trace.
#[derive(Debug, Clone, Default)]
pub struct SimplicialComplex {
    simplices: Vec<Simplex>,
}

impl SimplicialComplex {
    /// Build from a reasoning trace.
    ///
    /// Rejects blank ids, duplicate ids, and blank connection targets. A
    /// connection to a node that is not in the trace is rejected unless
    /// `allow_dangling` is set, in which case the target becomes a vertex
    /// of its own.
    pub fn from_trace(trace: &[ReasoningNode], allow_dangling: bool) -> Result<Self, TraceError> {
        let mut ids: HashSet<&str> = HashSet::with_capacity(trace.len());
        for (position, node) in trace.iter().enumerate() {
            if node.id.trim().is_empty() {
                return Err(TraceError::EmptyNodeId { position });
            }
            if !ids.insert(node.id.as_str()) {
                return Err(TraceError::DuplicateNode(node.id.clone()));
            }
        }

        for node in trace {
            for target in &node.connections {
                let blank = target.trim().is_empty();
                if blank || (!allow_dangling && !ids.contains(target.as_str())) {
                    return Err(TraceError::DanglingReference {
                        from: node.id.clone(),
                        to: target.clone(),
                    });
                }
            }
        }

        Ok(Self {
            simplices: trace.iter().map(Simplex::from).collect(),
        })
    }

    pub fn simplices(&self) -> &[Simplex] {
        &self.simplices
    }

    /// Number of distinct vertices.
    pub fn vertex_count(&self) -> usize {
        self.simplices
            .iter()
            .flat_map(Simplex::vertices)
            .collect::<HashSet<_>>()
            .len()
    }

    /// Number of declared connection edges.
    pub fn edge_count(&self) -> usize {
        self.simplices.iter().map(Simplex::dim).sum()
    }

    /// Highest simplex dimension (0 for an empty complex).
    pub fn max_dim(&self) -> usize {
        self.simplices.iter().map(Simplex::dim).max().unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.simplices.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simplex_dimension_is_connection_count() {
        assert_eq!(Simplex::vertex("a").dim(), 0);
        assert_eq!(Simplex::new("a", ["c", "b", "c"]).dim(), 2);
        assert_eq!(Simplex::new("a", ["c", "b"]).targets, vec!["b", "c"]);
    }

    #[test]
    fn simplex_vertices_origin_first() {
        let s = Simplex::new("x", ["b", "a"]);
        assert_eq!(s.vertices().collect::<Vec<_>>(), vec!["x", "a", "b"]);
        assert_eq!(s.edges().count(), 2);
    }

    #[test]
    fn complex_counts() {
        let trace = vec![
            ReasoningNode::new("a", "goal").connect_all(["b", "c"]),
            ReasoningNode::new("b", "fact"),
            ReasoningNode::new("c", "fact").connect("d"),
            ReasoningNode::new("d", "fact"),
        ];
        let complex = SimplicialComplex::from_trace(&trace, false).unwrap();
        assert_eq!(complex.vertex_count(), 4);
        assert_eq!(complex.edge_count(), 3);
        assert_eq!(complex.max_dim(), 2);
    }

    #[test]
    fn rejects_duplicate_ids() {
        let trace = vec![ReasoningNode::new("a", "x"), ReasoningNode::new("a", "y")];
        assert_eq!(
            SimplicialComplex::from_trace(&trace, false).unwrap_err(),
            TraceError::DuplicateNode("a".into())
        );
    }

    #[test]
    fn rejects_blank_ids() {
        let trace = vec![ReasoningNode::new("a", "x"), ReasoningNode::new("  ", "y")];
        assert_eq!(
            SimplicialComplex::from_trace(&trace, false).unwrap_err(),
            TraceError::EmptyNodeId { position: 1 }
        );
    }

    #[test]
    fn dangling_reference_policy() {
        let trace = vec![ReasoningNode::new("a", "x").connect("ghost")];
        assert_eq!(
            SimplicialComplex::from_trace(&trace, false).unwrap_err(),
            TraceError::DanglingReference {
                from: "a".into(),
                to: "ghost".into()
            }
        );

        let complex = SimplicialComplex::from_trace(&trace, true).unwrap();
        assert_eq!(complex.vertex_count(), 2);
    }

    #[test]
    fn blank_target_rejected_even_when_lenient() {
        let trace = vec![ReasoningNode::new("a", "x").connect("")];
        assert!(SimplicialComplex::from_trace(&trace, true).is_err());
    }
}
