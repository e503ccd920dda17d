//! Per-replica state management.
//!
//! A `StateManager` owns one RGA replica for one local site and mediates every
//! mutation of it: it queues local operations until the transport acknowledges
//! them, drops re-delivered remote operations, keeps a bounded undo/redo history
//! and debounces the persistence callback.
//!
//! A manager is driven by a single actor at a time. Hosts that share one across
//! tasks must wrap it in a per-document mutex.

pub mod conflict;
pub mod content;
pub mod debounce;
pub mod history;

use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::config::ManagerConfig;
use crate::crdt::{Operation, RGA, RgaError, RgaSnapshot, SiteId};

pub use conflict::Conflict;
pub use content::{DocumentContent, FormatKind, TextFormat};
pub use debounce::{SaveCallback, SaveDebouncer};
pub use history::{HistoryEntry, UndoHistory};

/// Outbound hook invoked for every locally produced operation.
pub type Broadcaster = Box<dyn Fn(&Operation) + Send + Sync>;

/// Counters exposed for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DebugInfo {
    pub site_id: SiteId,
    pub node_count: usize,
    pub sequence_length: usize,
    pub version: u64,
    pub pending_operations: usize,
    pub acknowledged_operations: usize,
    pub deferred_operations: usize,
    pub undo_stack_size: usize,
    pub redo_stack_size: usize,
}

pub struct StateManager {
    rga: RGA,
    config: ManagerConfig,
    /// Local operations not yet acknowledged by the transport
    pending: Vec<Operation>,
    /// Dedup keys of operations known to be applied
    acknowledged: HashSet<String>,
    /// Remote deletes that arrived before the insert they target
    deferred: Vec<Operation>,
    conflicts: Vec<Conflict>,
    history: UndoHistory,
    saver: SaveDebouncer,
    broadcaster: Option<Broadcaster>,
    /// Set while a remote operation is being applied
    applying_remote: bool,
}

impl StateManager {
    /// Creates a manager for `site_id` with the default configuration.
    pub fn new(site_id: impl Into<SiteId>) -> Self {
        Self::with_config(site_id, ManagerConfig::default())
    }

    pub fn with_config(site_id: impl Into<SiteId>, config: ManagerConfig) -> Self {
        let site_id = site_id.into();
        info!(site = %site_id, "starting document session");

        StateManager {
            rga: RGA::with_time_source(site_id, config.clock.build()),
            pending: Vec::new(),
            acknowledged: HashSet::new(),
            deferred: Vec::new(),
            conflicts: Vec::new(),
            history: UndoHistory::new(config.history_limit),
            saver: SaveDebouncer::new(config.save_debounce, None),
            broadcaster: None,
            applying_remote: false,
            config,
        }
    }

    /// Installs the persistence callback.
    ///
    /// Saves run on a tokio timer. Mutations made outside a tokio runtime
    /// schedule nothing and log a warning, so a manager driven from synchronous
    /// code never calls `callback`.
    pub fn on_save(mut self, callback: impl Fn(DocumentContent) + Send + Sync + 'static) -> Self {
        self.saver.set_callback(Arc::new(callback));
        self
    }

    /// Installs the outbound broadcast hook.
    pub fn on_broadcast(mut self, broadcaster: impl Fn(&Operation) + Send + Sync + 'static) -> Self {
        self.broadcaster = Some(Box::new(broadcaster));
        self
    }

    pub fn site_id(&self) -> &str {
        self.rga.site_id()
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    pub fn text(&self) -> String {
        self.rga.text()
    }

    pub fn content(&self) -> DocumentContent {
        DocumentContent::from_text(self.rga.text())
    }

    /// Read access to the underlying replica.
    pub fn rga(&self) -> &RGA {
        &self.rga
    }

    /// Whole-replica snapshot for bootstrapping a peer.
    pub fn state(&self) -> RgaSnapshot {
        self.rga.serialize()
    }

    /// Replaces the replica's contents with `snapshot`, typically taken from a
    /// peer. The local site identity is kept. Clears history.
    pub fn set_state(&mut self, mut snapshot: RgaSnapshot) -> Result<(), RgaError> {
        snapshot.site_id = self.site_id().to_string();
        self.rga.restore(snapshot)?;
        self.retry_deferred();
        self.history.clear();
        self.schedule_save();
        Ok(())
    }

    /// Inserts `content` at `position`. Returns `None` if nothing was inserted.
    pub fn insert_text(&mut self, content: &str, position: usize) -> Option<Operation> {
        if self.applying_remote || content.is_empty() {
            return None;
        }

        let entry = self.history_entry();
        self.history.record(entry);

        let operation = Operation::Insert(self.rga.insert(content, position));
        self.pending.push(operation.clone());
        self.broadcast(&operation);
        self.schedule_save();
        Some(operation)
    }

    /// Deletes `length` characters at `position`. Returns the operations
    /// produced, empty when nothing was deleted.
    pub fn delete_text(&mut self, position: usize, length: usize) -> Vec<Operation> {
        if self.applying_remote {
            return Vec::new();
        }

        let entry = self.history_entry();
        let operations: Vec<Operation> = self
            .rga
            .delete(position, length)
            .into_iter()
            .map(Operation::Delete)
            .collect();
        if operations.is_empty() {
            return operations;
        }
        self.history.record(entry);

        self.pending.extend(operations.iter().cloned());
        for operation in &operations {
            self.broadcast(operation);
        }
        self.schedule_save();
        operations
    }

    /// Applies an operation received from another site.
    ///
    /// Returns false when the operation was already applied, is invalid, or
    /// could not be applied yet. A delete whose target has not arrived is kept
    /// and applied once the target's insert does.
    pub fn apply_remote_operation(&mut self, operation: &Operation) -> bool {
        let key = operation.dedup_key();
        if self.has_seen(operation) {
            debug!(site = %self.site_id(), op = %key, "duplicate operation ignored");
            return false;
        }

        self.applying_remote = true;
        let applied = match self.rga.apply_operation(operation) {
            Ok(()) => {
                self.acknowledge_applied(operation, key);
                if matches!(operation, Operation::Insert(_)) {
                    self.retry_deferred();
                }
                true
            }
            Err(RgaError::NodeNotFound(target)) => {
                debug!(site = %self.site_id(), node = %target, "deferring delete of unseen node");
                self.deferred.push(operation.clone());
                false
            }
            Err(e) => {
                warn!(site = %self.site_id(), op = %key, error = %e, "remote operation rejected");
                false
            }
        };
        self.applying_remote = false;

        if applied {
            // Undo must never revert past state another site has built on
            self.history.clear();
            self.schedule_save();
        }
        applied
    }

    /// Whether `operation` was already applied, produced locally, or is
    /// waiting for its target.
    pub fn has_seen(&self, operation: &Operation) -> bool {
        let key = operation.dedup_key();
        self.acknowledged.contains(&key)
            || self.pending.iter().any(|op| op.dedup_key() == key)
            || self.deferred.iter().any(|op| op.dedup_key() == key)
    }

    fn acknowledge_applied(&mut self, operation: &Operation, key: String) {
        let conflicts = conflict::detect(operation, &self.pending);
        if !conflicts.is_empty() {
            warn!(
                site = %self.site_id(),
                op = %key,
                count = conflicts.len(),
                "remote operation conflicts with pending edits"
            );
            self.conflicts.extend(conflicts);
        }
        self.acknowledged.insert(key);
    }

    /// Reapplies parked deletes whose targets may have arrived.
    fn retry_deferred(&mut self) {
        for operation in std::mem::take(&mut self.deferred) {
            match self.rga.apply_operation(&operation) {
                Ok(()) => {
                    let key = operation.dedup_key();
                    self.acknowledge_applied(&operation, key);
                }
                Err(RgaError::NodeNotFound(_)) => self.deferred.push(operation),
                Err(e) => warn!(site = %self.site_id(), error = %e, "deferred operation rejected"),
            }
        }
    }

    /// Marks a local operation as delivered by the transport.
    pub fn acknowledge_operation(&mut self, operation: &Operation) {
        let key = operation.dedup_key();
        self.pending.retain(|op| op.dedup_key() != key);
        self.acknowledged.insert(key);
    }

    pub fn pending_operations(&self) -> &[Operation] {
        &self.pending
    }

    pub fn pending_operations_count(&self) -> usize {
        self.pending.len()
    }

    /// Reverts the most recent local edit group. Returns false if there is none.
    ///
    /// Undo is local: no compensating operation is produced. Operations of the
    /// undone group that were still pending leave the queue, and their dedup keys
    /// are kept so a re-delivery cannot bring the undone text back. Peers that
    /// already received them keep the undone text.
    pub fn undo(&mut self) -> bool {
        let current = self.history_entry();
        match self.history.undo(current) {
            Some(previous) => self.restore(previous),
            None => false,
        }
    }

    /// Reapplies the most recently undone edit group. Returns false if there is none.
    pub fn redo(&mut self) -> bool {
        let current = self.history_entry();
        match self.history.redo(current) {
            Some(next) => self.restore(next),
            None => false,
        }
    }

    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }

    fn restore(&mut self, entry: HistoryEntry) -> bool {
        if let Err(e) = self.rga.restore(entry.snapshot) {
            error!(site = %self.site_id(), error = %e, "history snapshot could not be restored");
            self.history.clear();
            return false;
        }
        let dropped: Vec<String> = self
            .pending
            .iter()
            .map(Operation::dedup_key)
            .filter(|key| !entry.pending.iter().any(|op| &op.dedup_key() == key))
            .collect();
        self.acknowledged.extend(dropped);
        self.pending = entry.pending;
        self.retry_deferred();
        self.schedule_save();
        true
    }

    fn history_entry(&self) -> HistoryEntry {
        HistoryEntry::new(self.rga.serialize(), self.pending.clone(), self.rga.text())
    }

    /// Folds another replica's state into this one.
    pub fn merge(&mut self, other: &StateManager) {
        self.rga.merge(&other.rga);
        self.retry_deferred();
        self.history.clear();
        self.schedule_save();
    }

    pub fn has_conflicts(&self) -> bool {
        !self.conflicts.is_empty()
    }

    pub fn conflicts(&self) -> &[Conflict] {
        &self.conflicts
    }

    pub fn clear_conflicts(&mut self) {
        self.conflicts.clear();
    }

    pub fn debug_info(&self) -> DebugInfo {
        DebugInfo {
            site_id: self.site_id().to_string(),
            node_count: self.rga.node_count(),
            sequence_length: self.rga.nodes().count(),
            version: self.rga.version(),
            pending_operations: self.pending.len(),
            acknowledged_operations: self.acknowledged.len(),
            deferred_operations: self.deferred.len(),
            undo_stack_size: self.history.undo_len(),
            redo_stack_size: self.history.redo_len(),
        }
    }

    /// Ends the session: cancels any pending save and releases the queues.
    ///
    /// Dropping the manager has the same effect on the save timer.
    pub fn destroy(mut self) {
        self.saver.cancel();
        self.pending.clear();
        self.acknowledged.clear();
        self.deferred.clear();
        self.history.clear();
        info!(site = %self.site_id(), "document session closed");
    }

    fn broadcast(&self, operation: &Operation) {
        if self.applying_remote {
            return;
        }
        if let Some(broadcaster) = &self.broadcaster {
            broadcaster(operation);
        }
    }

    fn schedule_save(&mut self) {
        let rga = &self.rga;
        self.saver
            .schedule(|| DocumentContent::from_text(rga.text()));
    }
}

impl std::fmt::Debug for StateManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateManager")
            .field("rga", &self.rga)
            .field("pending", &self.pending.len())
            .field("conflicts", &self.conflicts.len())
            .finish()
    }
}
