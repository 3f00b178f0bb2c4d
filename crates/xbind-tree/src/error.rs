//! Tree errors

use crate::node::NodeId;

/// Errors raised by tree mutations
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TreeError {
    /// Handle does not belong to this document
    #[error("Unknown node: {0}")]
    UnknownNode(NodeId),

    /// Operation needs an element
    #[error("Node {0} is not an element")]
    NotAnElement(NodeId),

    /// Node cannot take children
    #[error("Node {0} cannot have children")]
    NotAContainer(NodeId),

    /// Insertion would break the tree shape
    #[error("Hierarchy request error: {0}")]
    HierarchyRequest(String),
}
