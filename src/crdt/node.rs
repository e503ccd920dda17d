//! Node definition for the RGA CRDT.
//!
//! A node is a run of text inserted by a single operation. Its content never
//! changes; only its visibility flips, once, when a delete tombstones it.

use serde::{Deserialize, Serialize};

use crate::crdt::operation::InsertOperation;
use crate::crdt::types::{NodeId, OrderKey, SiteId, Timestamp};

/// Represents a run of characters within the RGA.
///
/// # Tombstone Deletion
///
/// Instead of physically removing nodes, the RGA marks them invisible. The final
/// set of nodes is then independent of the order operations arrived in, which is
/// what lets replicas converge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    /// Identity of the node's first character
    pub id: NodeId,
    /// The text this node carries
    pub content: String,
    /// Left neighbor at insertion time (informational)
    pub left_origin: Option<NodeId>,
    /// Right neighbor at insertion time (informational)
    pub right_origin: Option<NodeId>,
    /// False once the node has been tombstoned
    pub visible: bool,
    /// Creation timestamp of the originating insert
    pub timestamp: Timestamp,
    /// Originating site
    pub site_id: SiteId,
}

impl Node {
    /// Builds the node an insert operation creates.
    pub fn from_insert(op: &InsertOperation) -> Self {
        Node {
            id: op.node_id.clone(),
            content: op.content.clone(),
            left_origin: op.left_origin.clone(),
            right_origin: op.right_origin.clone(),
            visible: true,
            timestamp: op.timestamp,
            site_id: op.site_id.clone(),
        }
    }

    /// Number of characters carried.
    pub fn len(&self) -> usize {
        self.content.chars().count()
    }

    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }

    /// Number of clock values the node occupies. Empty nodes still claim one.
    pub fn span(&self) -> u64 {
        self.len().max(1) as u64
    }

    /// Length that counts towards the visible text.
    pub fn visible_len(&self) -> usize {
        if self.visible { self.len() } else { 0 }
    }

    /// Whether `id` addresses one of this node's characters.
    pub fn contains(&self, id: &NodeId) -> bool {
        id.site == self.id.site
            && id.clock >= self.id.clock
            && id.clock - self.id.clock < self.span()
    }

    /// The key this node is positioned by in the visit sequence.
    pub fn order_key(&self) -> OrderKey<'_> {
        OrderKey {
            timestamp: self.timestamp,
            site: &self.site_id,
            clock: self.id.clock,
        }
    }

    /// Marks this node as deleted. Returns false if it already was.
    pub fn delete(&mut self) -> bool {
        std::mem::replace(&mut self.visible, false)
    }

    /// Splits the node at character `offset`, keeping the head in place and
    /// returning the tail as a new node with the same timestamp and site.
    ///
    /// `offset` must lie strictly inside the node.
    pub fn split_off(&mut self, offset: usize) -> Node {
        assert!(
            offset > 0 && offset < self.len(),
            "split offset {} outside node {} of length {}",
            offset,
            self.id,
            self.len()
        );

        let byte = self
            .content
            .char_indices()
            .nth(offset)
            .map(|(i, _)| i)
            .unwrap_or(self.content.len());
        let tail_content = self.content.split_off(byte);
        let tail_id = self.id.offset(offset);

        let tail = Node {
            id: tail_id.clone(),
            content: tail_content,
            left_origin: Some(self.id.offset(offset - 1)),
            right_origin: self.right_origin.take(),
            visible: self.visible,
            timestamp: self.timestamp,
            site_id: self.site_id.clone(),
        };
        self.right_origin = Some(tail_id);
        tail
    }
}
