//! CRDT (Conflict-free Replicated Data Type) implementation module.
//!
//! This module contains the RGA (Replicated Growable Array) CRDT implementation,
//! the operations replicas exchange, and their supporting types.

pub mod error;
pub mod node;
pub mod operation;
pub mod rga;
pub mod types;

// Re-export the main public API
pub use error::RgaError;
pub use node::Node;
pub use operation::{DeleteOperation, InsertOperation, Operation, compare, create_delete, create_insert};
pub use rga::{RGA, RgaSnapshot};
pub use types::{ClockKind, LamportClock, NodeId, SiteId, TimeSource, Timestamp, WallClock};
