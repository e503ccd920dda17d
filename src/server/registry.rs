//! Per-document state shared by the relay's connections.
//!
//! Each document identifier maps to one server-side `StateManager` guarded by its
//! own mutex, so concurrent connections to a document are serialized while
//! different documents never contend.

use crossbeam_skiplist::SkipMap;
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::config::ManagerConfig;
use crate::crdt::types::generate_site_id;
use crate::crdt::{Operation, RgaSnapshot};
use crate::manager::{DocumentContent, StateManager};

/// Capacity of each document's relay channel.
const RELAY_CAPACITY: usize = 1024;

/// An operation accepted by the relay, tagged with the connection it came from.
#[derive(Debug, Clone)]
pub struct Relayed {
    pub origin: u64,
    pub operation: Operation,
}

/// One open document.
pub struct DocumentHandle {
    id: String,
    manager: Mutex<StateManager>,
    updates: broadcast::Sender<Relayed>,
}

impl DocumentHandle {
    fn new(id: &str, config: &ManagerConfig) -> Self {
        let document = id.to_string();
        let manager = StateManager::with_config(generate_site_id(), config.clone()).on_save(
            move |content: DocumentContent| {
                info!(
                    document = %document,
                    chars = content.text.chars().count(),
                    "document snapshot ready for persistence"
                );
            },
        );
        let (updates, _) = broadcast::channel(RELAY_CAPACITY);

        DocumentHandle {
            id: id.to_string(),
            manager: Mutex::new(manager),
            updates,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Applies an operation from connection `origin` and relays it to the
    /// document's other connections. Returns false for operations already seen.
    ///
    /// Deletes whose target has not arrived yet are relayed too; every replica
    /// parks them the same way. Relaying happens under the document lock so
    /// that `join` never hands out a snapshot and a relay of the same edit.
    pub fn submit(&self, origin: u64, operation: Operation) -> bool {
        let mut manager = self.manager.lock();
        if manager.has_seen(&operation) {
            debug!(document = %self.id, origin, op = %operation.dedup_key(), "operation not relayed");
            return false;
        }

        manager.apply_remote_operation(&operation);
        if !manager.has_seen(&operation) {
            return false;
        }
        // No receivers is fine: the operation is already in the server replica
        let _ = self.updates.send(Relayed { origin, operation });
        true
    }

    /// Subscribes to relayed operations and returns the snapshot they follow.
    pub fn join(&self) -> (RgaSnapshot, broadcast::Receiver<Relayed>) {
        let manager = self.manager.lock();
        (manager.state(), self.updates.subscribe())
    }

    pub fn snapshot(&self) -> RgaSnapshot {
        self.manager.lock().state()
    }

    pub fn content(&self) -> DocumentContent {
        self.manager.lock().content()
    }

    pub fn connections(&self) -> usize {
        self.updates.receiver_count()
    }
}

/// All documents the relay currently holds.
pub struct DocumentRegistry {
    documents: SkipMap<String, Arc<DocumentHandle>>,
    config: ManagerConfig,
    next_connection: AtomicU64,
}

impl DocumentRegistry {
    pub fn new(config: ManagerConfig) -> Self {
        DocumentRegistry {
            documents: SkipMap::new(),
            config,
            next_connection: AtomicU64::new(1),
        }
    }

    /// Returns the document, creating an empty one on first use.
    pub fn open(&self, id: &str) -> Arc<DocumentHandle> {
        let entry = self
            .documents
            .get_or_insert_with(id.to_string(), || {
                info!(document = %id, "opening document");
                Arc::new(DocumentHandle::new(id, &self.config))
            });
        entry.value().clone()
    }

    pub fn get(&self, id: &str) -> Option<Arc<DocumentHandle>> {
        self.documents.get(id).map(|entry| entry.value().clone())
    }

    /// Drops a document. Its pending save is cancelled once the last
    /// connection holding it goes away.
    pub fn close(&self, id: &str) -> bool {
        self.documents.remove(id).is_some()
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    pub fn next_connection_id(&self) -> u64 {
        self.next_connection.fetch_add(1, Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crdt::ClockKind;

    fn registry() -> DocumentRegistry {
        DocumentRegistry::new(ManagerConfig {
            clock: ClockKind::Lamport,
            ..ManagerConfig::default()
        })
    }

    #[tokio::test]
    async fn test_open_is_idempotent() {
        let registry = registry();
        let a = registry.open("doc");
        let b = registry.open("doc");

        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(registry.len(), 1);
        assert!(registry.get("other").is_none());

        assert!(registry.close("doc"));
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_submit_relays_fresh_operations_once() {
        let registry = registry();
        let document = registry.open("doc");
        let (_, mut updates) = document.join();

        let mut client = StateManager::new("client-1");
        let op = client.insert_text("hello", 0).unwrap();

        assert!(document.submit(7, op.clone()));
        assert!(!document.submit(7, op.clone()));
        assert_eq!(document.content().text, "hello");

        let relayed = updates.recv().await.unwrap();
        assert_eq!(relayed.origin, 7);
        assert_eq!(relayed.operation, op);
        assert!(updates.try_recv().is_err());
    }

    #[test]
    fn test_connection_ids_are_unique() {
        let registry = registry();
        assert_ne!(registry.next_connection_id(), registry.next_connection_id());
    }
}
