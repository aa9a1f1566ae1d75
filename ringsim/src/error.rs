//! Simulator errors.

use ringrange::NodeId;

/// Errors raised while setting up or running a simulation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SimError {
    /// The topology does not place exactly one node per ring slot.
    #[error("topology has {actual} nodes but the ring needs {expected}")]
    NodeCount { expected: usize, actual: usize },
    /// A node could not be created or powered on.
    #[error("node {node}: {message}")]
    Node { node: NodeId, message: String },
    /// A scenario referred to a node that does not exist.
    #[error("unknown node {0}")]
    UnknownNode(NodeId),
}
