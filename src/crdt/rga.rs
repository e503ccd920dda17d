//! Core RGA CRDT implementation.
//!
//! This module contains the main RGA (Replicated Growable Array) struct and its operations.
//! The RGA provides a conflict-free replicated sequence suitable for collaborative text editing.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use tracing::{debug, warn};

use crate::crdt::error::{Result, RgaError};
use crate::crdt::node::Node;
use crate::crdt::operation::{
    DeleteOperation, InsertOperation, Operation, compare, create_delete, create_insert,
};
use crate::crdt::types::{MAX_CLOCK, NodeId, SiteId, TimeSource, WallClock};

/// A whole-replica checkpoint, used to bootstrap late joiners and to persist state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RgaSnapshot {
    /// Every node ever observed, keyed by identity
    pub nodes: Vec<(NodeId, Node)>,
    /// Node identities in document order
    pub sequence: Vec<NodeId>,
    pub site_id: SiteId,
    pub clock: u64,
    pub version: u64,
}

/// The Replicated Growable Array (RGA) CRDT.
///
/// # Design
///
/// - Nodes live in an append-only arena and are never removed, only tombstoned
/// - A per-site ordered index maps any character identity to the node covering it
/// - The visit sequence holds arena indices in document order, so materializing
///   text never touches a hash map
/// - New nodes are placed by their `(timestamp, site)` key alone; the origins they
///   carry are informational. The visit order is therefore a pure function of the
///   node set, which makes application order irrelevant
pub struct RGA {
    /// The unique identifier for this replica
    site_id: SiteId,
    /// Highest clock value this replica has minted or observed
    clock: u64,
    /// Bumped on every successful mutation
    version: u64,
    /// Node arena
    nodes: Vec<Node>,
    /// site -> first-character clock -> arena index
    index: HashMap<SiteId, BTreeMap<u64, usize>>,
    /// Arena indices in document order, tombstones included
    sequence: Vec<usize>,
    /// Stamps local operations
    time: Box<dyn TimeSource>,
}

impl RGA {
    /// Creates an empty replica stamping operations with wall-clock time.
    pub fn new(site_id: impl Into<SiteId>) -> Self {
        Self::with_time_source(site_id, Box::new(WallClock))
    }

    /// Creates an empty replica with a custom time source.
    pub fn with_time_source(site_id: impl Into<SiteId>, time: Box<dyn TimeSource>) -> Self {
        RGA {
            site_id: site_id.into(),
            clock: 0,
            version: 0,
            nodes: Vec::new(),
            index: HashMap::new(),
            sequence: Vec::new(),
            time,
        }
    }

    /// Gets the site ID for this replica.
    pub fn site_id(&self) -> &str {
        &self.site_id
    }

    /// Gets the current clock value.
    pub fn clock(&self) -> u64 {
        self.clock
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    /// Inserts `content` at the visible offset `position` and returns the
    /// operation to broadcast. Positions past the end are clamped.
    pub fn insert(&mut self, content: &str, position: usize) -> InsertOperation {
        let position = position.min(self.len());
        let (left_origin, right_origin) = self.find_origins(position);

        let op = create_insert(
            content,
            position,
            left_origin,
            right_origin,
            &self.site_id,
            self.clock + 1,
            self.time.as_ref(),
        );
        self.integrate_insert(&op);

        debug!(
            site = %self.site_id,
            node = %op.node_id,
            position,
            "local insert"
        );
        op
    }

    /// Deletes `length` visible characters starting at `position`, one delete
    /// operation per character. Returns an empty list when `position` is out of range.
    pub fn delete(&mut self, position: usize, length: usize) -> Vec<DeleteOperation> {
        let total = self.len();
        if position >= total {
            return Vec::new();
        }
        let end = position.saturating_add(length).min(total);

        let mut operations = Vec::with_capacity(end - position);
        for _ in position..end {
            // Each deletion shifts the next character down to `position`
            let Some((idx, offset)) = self.char_at(position) else {
                break;
            };
            let target = self.nodes[idx].id.offset(offset);
            let op = create_delete(target, &self.site_id, self.time.as_ref());
            self.tombstone(idx, offset);
            self.clock = self.clock.max(op.node_id.clock);
            self.version += 1;
            operations.push(op);
        }

        debug!(
            site = %self.site_id,
            position,
            deleted = operations.len(),
            "local delete"
        );
        operations
    }

    /// Applies an operation produced by any replica.
    ///
    /// # Returns
    ///
    /// * `Ok(())` - The operation was integrated
    /// * `Err(RgaError::InvalidOperation)` - Structural validation failed
    /// * `Err(RgaError::NodeNotFound)` - A delete targeted an unknown character
    pub fn apply_operation(&mut self, operation: &Operation) -> Result<()> {
        operation.validate()?;
        self.time.observe(operation.timestamp());

        match operation {
            Operation::Insert(op) => {
                self.integrate_insert(op);
                Ok(())
            }
            Operation::Delete(op) => self.apply_delete(op),
        }
    }

    fn integrate_insert(&mut self, op: &InsertOperation) {
        let node = Node::from_insert(op);
        let last_clock = node.id.clock + node.span() - 1;

        let key = node.order_key();
        let at = self
            .sequence
            .iter()
            .position(|&i| self.nodes[i].order_key() > key)
            .unwrap_or(self.sequence.len());

        let idx = self.register(node);
        self.sequence.insert(at, idx);
        self.clock = self.clock.max(last_clock);
        self.version += 1;
    }

    fn apply_delete(&mut self, op: &DeleteOperation) -> Result<()> {
        let idx = self
            .locate(&op.node_id)
            .ok_or_else(|| RgaError::NodeNotFound(op.node_id.clone()))?;
        let offset = (op.node_id.clock - self.nodes[idx].id.clock) as usize;

        let changed = self.tombstone(idx, offset);
        self.clock = self.clock.max(op.node_id.clock);
        self.version += 1;

        debug!(
            site = %self.site_id,
            node = %op.node_id,
            changed,
            "applied delete"
        );
        Ok(())
    }

    /// Makes the character at `offset` of node `idx` invisible, splitting the
    /// node so the tombstone covers exactly that character. Returns false if the
    /// character was already invisible.
    fn tombstone(&mut self, idx: usize, offset: usize) -> bool {
        if !self.nodes[idx].visible {
            return false;
        }

        let mut idx = idx;
        if offset > 0 {
            idx = self.split(idx, offset);
        }
        if self.nodes[idx].len() > 1 {
            self.split(idx, 1);
        }
        self.nodes[idx].delete()
    }

    /// Splits node `idx` at `offset`, placing the tail right after it in the
    /// visit sequence. Returns the tail's arena index.
    fn split(&mut self, idx: usize, offset: usize) -> usize {
        let tail = self.nodes[idx].split_off(offset);
        let at = self
            .sequence
            .iter()
            .position(|&i| i == idx)
            .expect("arena node missing from visit sequence");
        let tail_idx = self.register(tail);
        self.sequence.insert(at + 1, tail_idx);
        tail_idx
    }

    fn register(&mut self, node: Node) -> usize {
        let idx = self.nodes.len();
        self.index
            .entry(node.id.site.clone())
            .or_default()
            .insert(node.id.clock, idx);
        self.nodes.push(node);
        idx
    }

    /// Arena index of the node covering the character `id`.
    fn locate(&self, id: &NodeId) -> Option<usize> {
        let (_, &idx) = self.index.get(&id.site)?.range(..=id.clock).next_back()?;
        self.nodes[idx].contains(id).then_some(idx)
    }

    /// Arena index and in-node offset of the visible character at `position`.
    fn char_at(&self, position: usize) -> Option<(usize, usize)> {
        let mut consumed = 0;
        for &idx in &self.sequence {
            let len = self.nodes[idx].visible_len();
            if consumed + len > position {
                return Some((idx, position - consumed));
            }
            consumed += len;
        }
        None
    }

    /// The characters immediately left and right of the visible offset `position`.
    fn find_origins(&self, position: usize) -> (Option<NodeId>, Option<NodeId>) {
        let mut consumed = 0;
        let mut left = None;

        for &idx in &self.sequence {
            let node = &self.nodes[idx];
            let len = node.visible_len();
            if len == 0 {
                continue;
            }
            if consumed + len <= position {
                left = Some(node.id.offset(len - 1));
                consumed += len;
                continue;
            }

            let offset = position - consumed;
            if offset > 0 {
                left = Some(node.id.offset(offset - 1));
            }
            return (left, Some(node.id.offset(offset)));
        }

        (left, None)
    }

    /// Returns the current visible text.
    pub fn text(&self) -> String {
        self.sequence
            .iter()
            .map(|&i| &self.nodes[i])
            .filter(|node| node.visible)
            .map(|node| node.content.as_str())
            .collect()
    }

    /// Number of visible characters.
    pub fn len(&self) -> usize {
        self.nodes.iter().map(Node::visible_len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Nodes in document order, tombstones included.
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.sequence.iter().map(|&i| &self.nodes[i])
    }

    /// Number of nodes, including tombstones.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn visible_node_count(&self) -> usize {
        self.nodes.iter().filter(|node| node.visible).count()
    }

    /// The node covering the character `id`, if this replica has seen it.
    pub fn get_node(&self, id: &NodeId) -> Option<&Node> {
        self.locate(id).map(|idx| &self.nodes[idx])
    }

    /// The visible node at `position`, with the offset of `position` inside it.
    pub fn node_at(&self, position: usize) -> Option<(&Node, usize)> {
        self.char_at(position)
            .map(|(idx, offset)| (&self.nodes[idx], offset))
    }

    /// Visible offset of the character `id`: the number of visible characters
    /// preceding it in document order.
    pub fn position_of(&self, id: &NodeId) -> Option<usize> {
        let target = self.locate(id)?;
        let mut position = 0;
        for &idx in &self.sequence {
            let node = &self.nodes[idx];
            if idx == target {
                let offset = (id.clock - node.id.clock) as usize;
                return Some(position + if node.visible { offset } else { 0 });
            }
            position += node.visible_len();
        }
        None
    }

    /// Integrates every node `other` knows about.
    ///
    /// Operations are synthesized for nodes absent here (an insert, followed by
    /// deletes when the node is a tombstone in `other`) and for characters that
    /// `other` has tombstoned but this replica still shows. They are sorted with
    /// the operation total order and applied in that order.
    pub fn merge(&mut self, other: &RGA) {
        let mut operations: Vec<Operation> = Vec::new();

        for node in other.nodes() {
            let known = self.locate(&node.id).is_some();
            if !known {
                operations.push(Operation::Insert(InsertOperation {
                    node_id: node.id.clone(),
                    content: node.content.clone(),
                    left_origin: node.left_origin.clone(),
                    right_origin: node.right_origin.clone(),
                    position: 0,
                    timestamp: node.timestamp,
                    site_id: node.site_id.clone(),
                }));
            }
            if node.visible {
                continue;
            }

            for offset in 0..node.len() {
                let id = node.id.offset(offset);
                let visible_here = !known
                    || self
                        .locate(&id)
                        .is_some_and(|idx| self.nodes[idx].visible);
                if visible_here {
                    operations.push(Operation::Delete(DeleteOperation {
                        node_id: id,
                        timestamp: node.timestamp,
                        site_id: node.site_id.clone(),
                    }));
                }
            }
        }

        // Stable: a synthesized insert stays ahead of its own deletes
        operations.sort_by(compare);

        debug!(
            site = %self.site_id,
            from = %other.site_id,
            operations = operations.len(),
            "merging replica"
        );
        for operation in &operations {
            if let Err(e) = self.apply_operation(operation) {
                warn!(site = %self.site_id, error = %e, "merge operation rejected");
            }
        }
    }

    /// Takes a full snapshot of this replica.
    pub fn serialize(&self) -> RgaSnapshot {
        RgaSnapshot {
            nodes: self
                .nodes
                .iter()
                .map(|node| (node.id.clone(), node.clone()))
                .collect(),
            sequence: self.nodes().map(|node| node.id.clone()).collect(),
            site_id: self.site_id.clone(),
            clock: self.clock,
            version: self.version,
        }
    }

    /// Rebuilds a replica from a snapshot, stamping future operations with wall-clock time.
    pub fn deserialize(snapshot: RgaSnapshot) -> Result<Self> {
        Self::deserialize_with(snapshot, Box::new(WallClock))
    }

    /// Rebuilds a replica from a snapshot with a custom time source.
    pub fn deserialize_with(snapshot: RgaSnapshot, time: Box<dyn TimeSource>) -> Result<Self> {
        let mut rga = RGA::with_time_source(snapshot.site_id.clone(), time);
        rga.load(snapshot)?;
        Ok(rga)
    }

    /// Replaces this replica's contents with `snapshot`, keeping the time source.
    ///
    /// The clock never moves backwards, so identities minted before the restore
    /// are not minted a second time.
    pub fn restore(&mut self, snapshot: RgaSnapshot) -> Result<()> {
        let clock = self.clock;
        let version = self.version;
        self.load(snapshot)?;
        self.clock = self.clock.max(clock);
        self.version = self.version.max(version) + 1;
        Ok(())
    }

    fn load(&mut self, snapshot: RgaSnapshot) -> Result<()> {
        if snapshot.sequence.len() != snapshot.nodes.len() {
            return Err(RgaError::CorruptSnapshot(format!(
                "{} nodes but {} sequence entries",
                snapshot.nodes.len(),
                snapshot.sequence.len()
            )));
        }

        if snapshot.clock > MAX_CLOCK {
            return Err(RgaError::CorruptSnapshot(format!(
                "clock {} out of range",
                snapshot.clock
            )));
        }

        let mut nodes = Vec::with_capacity(snapshot.nodes.len());
        let mut index: HashMap<SiteId, BTreeMap<u64, usize>> = HashMap::new();
        let mut by_id: HashMap<NodeId, usize> = HashMap::new();
        for (id, node) in snapshot.nodes {
            if id != node.id {
                return Err(RgaError::CorruptSnapshot(format!(
                    "entry {} holds node {}",
                    id, node.id
                )));
            }
            if id.clock.checked_add(node.span()).is_none_or(|end| end > MAX_CLOCK) {
                return Err(RgaError::CorruptSnapshot(format!(
                    "node {} out of clock range",
                    id
                )));
            }
            self.time.observe(node.timestamp);
            let idx = nodes.len();
            index
                .entry(id.site.clone())
                .or_default()
                .insert(id.clock, idx);
            by_id.insert(id, idx);
            nodes.push(node);
        }

        let sequence = snapshot
            .sequence
            .iter()
            .map(|id| {
                by_id.get(id).copied().ok_or_else(|| {
                    RgaError::CorruptSnapshot(format!("sequence references unknown node {}", id))
                })
            })
            .collect::<Result<Vec<_>>>()?;

        self.site_id = snapshot.site_id;
        self.clock = snapshot.clock;
        self.version = snapshot.version;
        self.nodes = nodes;
        self.index = index;
        self.sequence = sequence;
        Ok(())
    }
}

impl fmt::Display for RGA {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for node in self.nodes().filter(|node| node.visible) {
            f.write_str(&node.content)?;
        }
        Ok(())
    }
}

impl fmt::Debug for RGA {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RGA")
            .field("site_id", &self.site_id)
            .field("clock", &self.clock)
            .field("version", &self.version)
            .field("nodes", &self.nodes.len())
            .field("text", &self.text())
            .finish()
    }
}
