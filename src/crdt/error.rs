//! Error types for the RGA CRDT.

use crate::crdt::types::NodeId;

/// Errors reported for expected failure conditions.
///
/// None of these leave a replica in a partially mutated state.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RgaError {
    /// A delete targeted an identity absent from the node table
    #[error("node not found: {0}")]
    NodeNotFound(NodeId),

    /// The operation failed structural validation
    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    /// The operation's type tag is neither `insert` nor `delete`
    #[error("unknown operation type: {0}")]
    UnknownOperationType(String),

    /// A snapshot references nodes it does not contain
    #[error("corrupt snapshot: {0}")]
    CorruptSnapshot(String),
}

pub type Result<T, E = RgaError> = std::result::Result<T, E>;
