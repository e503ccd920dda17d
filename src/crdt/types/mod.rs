//! Type definitions for the RGA CRDT.
//!
//! This module contains the fundamental types used throughout the RGA implementation,
//! organized into focused submodules.

pub mod clock;
pub mod node_id;
pub mod site;
pub mod timestamp;

pub use clock::{ClockKind, LamportClock, TimeSource, WallClock};
pub use node_id::{MAX_CLOCK, NodeId, ParseNodeIdError};
pub use site::{SiteId, generate_site_id};
pub use timestamp::{OrderKey, Timestamp};
