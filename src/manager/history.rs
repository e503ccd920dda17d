//! Bounded undo/redo history.
//!
//! Each entry is a full replica snapshot plus the pending queue at that moment.
//! Restoring an entry swaps it in wholesale, so the text after an undo is exactly
//! the text before the undone edit.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};

use crate::crdt::{Operation, RgaSnapshot};

/// One restorable point in local editing history.
#[derive(Debug, Clone)]
pub struct HistoryEntry {
    pub snapshot: RgaSnapshot,
    pub pending: Vec<Operation>,
    pub text: String,
    pub taken_at: DateTime<Utc>,
}

impl HistoryEntry {
    pub fn new(snapshot: RgaSnapshot, pending: Vec<Operation>, text: String) -> Self {
        HistoryEntry {
            snapshot,
            pending,
            text,
            taken_at: Utc::now(),
        }
    }
}

#[derive(Debug)]
pub struct UndoHistory {
    undo: VecDeque<HistoryEntry>,
    redo: Vec<HistoryEntry>,
    limit: usize,
}

impl UndoHistory {
    pub fn new(limit: usize) -> Self {
        UndoHistory {
            undo: VecDeque::new(),
            redo: Vec::new(),
            limit,
        }
    }

    /// Records the state before a new local edit. Clears the redo stack.
    pub fn record(&mut self, entry: HistoryEntry) {
        self.redo.clear();
        self.push_undo(entry);
    }

    /// Pops the most recent undo entry, parking `current` for redo.
    pub fn undo(&mut self, current: HistoryEntry) -> Option<HistoryEntry> {
        let previous = self.undo.pop_back()?;
        self.redo.push(current);
        Some(previous)
    }

    /// Pops the most recent redo entry, parking `current` for undo.
    pub fn redo(&mut self, current: HistoryEntry) -> Option<HistoryEntry> {
        let next = self.redo.pop()?;
        self.push_undo(current);
        Some(next)
    }

    fn push_undo(&mut self, entry: HistoryEntry) {
        if self.limit == 0 {
            return;
        }
        if self.undo.len() == self.limit {
            self.undo.pop_front();
        }
        self.undo.push_back(entry);
    }

    pub fn clear(&mut self) {
        self.undo.clear();
        self.redo.clear();
    }

    pub fn can_undo(&self) -> bool {
        !self.undo.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo.is_empty()
    }

    pub fn undo_len(&self) -> usize {
        self.undo.len()
    }

    pub fn redo_len(&self) -> usize {
        self.redo.len()
    }
}
