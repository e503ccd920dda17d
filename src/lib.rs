//! # collab-rga - collaborative text editing on a Replicated Growable Array
//!
//! Several sites edit one shared document independently and converge to the same
//! text without locks or turn-taking.
//!
//! ## Features
//!
//! - **Conflict-free**: Operations can be applied in any order and replicas converge
//! - **Tombstone-based deletion**: Nodes are never removed, only hidden
//! - **State management**: Pending-operation tracking, remote dedup, bounded undo/redo
//! - **Debounced persistence**: Bursts of edits coalesce into a single save
//!
//! ## Example
//!
//! ```rust
//! use collab_rga::StateManager;
//!
//! let mut alice = StateManager::new("alice");
//! let mut bob = StateManager::new("bob");
//!
//! let op = alice.insert_text("Hello", 0).unwrap();
//! assert!(bob.apply_remote_operation(&op));
//! assert_eq!(alice.text(), bob.text());
//! ```

pub mod config;
pub mod crdt;
pub mod manager;
pub mod server;

// Re-export the main public API
pub use config::{ManagerConfig, ServerConfig};
pub use crdt::{
    ClockKind, DeleteOperation, InsertOperation, Node, NodeId, Operation, RGA, RgaError,
    RgaSnapshot, SiteId, Timestamp,
};
pub use manager::{Conflict, DebugInfo, DocumentContent, StateManager, TextFormat};
