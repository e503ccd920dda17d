//! Classification of remote operations that collide with unsynced local edits.
//!
//! A remote operation conflicts with a pending local one when:
//! - it deletes a character the local operation inserted or also deleted, or
//! - both are inserts aimed at the same visible position.
//!
//! Conflicts are informational. Both operations are still applied and the
//! replicas still converge; a caller can surface them to the user.

use serde::Serialize;

use crate::crdt::{InsertOperation, NodeId, Operation};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Conflict {
    /// The pending local operation
    pub local: Operation,
    /// The remote operation that collided with it
    pub remote: Operation,
}

fn inserted(op: &InsertOperation, id: &NodeId) -> bool {
    let span = op.content.chars().count().max(1) as u64;
    id.site == op.node_id.site && id.clock >= op.node_id.clock && id.clock < op.node_id.clock + span
}

fn collides(local: &Operation, remote: &Operation) -> bool {
    match (local, remote) {
        (Operation::Insert(local), Operation::Delete(remote)) => inserted(local, &remote.node_id),
        (Operation::Delete(local), Operation::Delete(remote)) => local.node_id == remote.node_id,
        (Operation::Insert(local), Operation::Insert(remote)) => local.position == remote.position,
        (Operation::Delete(_), Operation::Insert(_)) => false,
    }
}

/// Returns one conflict per pending local operation `remote` collides with.
pub fn detect(remote: &Operation, pending: &[Operation]) -> Vec<Conflict> {
    pending
        .iter()
        .filter(|local| collides(local, remote))
        .map(|local| Conflict {
            local: local.clone(),
            remote: remote.clone(),
        })
        .collect()
}
