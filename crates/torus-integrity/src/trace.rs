//! Reasoning traces attached to proposals.

use std::collections::BTreeSet;

/// One step of the reasoning behind a proposal.
///
/// `connections` names the other steps this one depends on.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ReasoningNode {
    pub id: String,
    pub concept: String,
    #[cfg_attr(feature = "serde", serde(default))]
    pub connections: BTreeSet<String>,
}

impl ReasoningNode {
    /// A node with no dependencies.
    pub fn new(id: impl Into<String>, concept: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            concept: concept.into(),
            connections: BTreeSet::new(),
        }
    }

    /// Add a dependency on another node.
    pub fn connect(mut self, to: impl Into<String>) -> Self {
        self.connections.insert(to.into());
        self
    }

    /// Add several dependencies.
    pub fn connect_all<I, S>(mut self, to: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.connections.extend(to.into_iter().map(Into::into));
        self
    }
}

/// Build a linear chain `ids[0] -> ids[1] -> ...`, handy for fixtures.
pub fn chain<S: AsRef<str>>(ids: &[S]) -> Vec<ReasoningNode> {
    ids.iter()
        .enumerate()
        .map(|(i, id)| {
            let node = ReasoningNode::new(id.as_ref(), id.as_ref());
            match ids.get(i + 1) {
                Some(next) => node.connect(next.as_ref()),
                None => node,
            }
        })
        .collect()
}
