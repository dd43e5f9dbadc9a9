//! Error types for torus-integrity.

use thiserror::Error;

/// A reasoning trace that cannot be turned into a complex.
///
/// The detector never returns these to its caller: a malformed trace cannot
/// be trusted, so it is reported as invalid with the error attached.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum TraceError {
    /// A node with a blank id.
    #[error("reasoning node at position {position} has an empty id")]
    EmptyNodeId { position: usize },

    /// Two nodes share an id.
    #[error("duplicate reasoning node id: {0}")]
    DuplicateNode(String),

    /// A connection names a node that is not in the trace.
    #[error("node {from} connects to unknown node {to}")]
    DanglingReference { from: String, to: String },
}
