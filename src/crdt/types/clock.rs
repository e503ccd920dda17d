//! Time sources used to stamp operations.
//!
//! The default `WallClock` stamps operations with wall-clock milliseconds, which is
//! what peers on the wire expect. `LamportClock` is an opt-in logical clock that is
//! immune to clock skew between sites: it ticks on every local operation and is
//! merged with `max` on every remote one. All sites of a document must agree on
//! which source they use, since the timestamps are ordering keys.

use std::sync::atomic::{AtomicI64, Ordering as AtomicOrdering};

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::crdt::types::timestamp::Timestamp;

/// Something that can stamp a new operation and observe remote timestamps.
pub trait TimeSource: Send + Sync {
    /// Returns the timestamp for a newly created local operation.
    fn now(&self) -> Timestamp;

    /// Observes the timestamp of an operation received from another site.
    fn observe(&self, _remote: Timestamp) {}
}

/// Wall-clock milliseconds since the Unix epoch.
#[derive(Debug, Default, Clone, Copy)]
pub struct WallClock;

impl TimeSource for WallClock {
    fn now(&self) -> Timestamp {
        Utc::now().timestamp_millis()
    }
}

/// A thread-safe Lamport clock
#[derive(Debug, Default)]
pub struct LamportClock {
    counter: AtomicI64,
}

impl LamportClock {
    /// Creates a new Lamport clock starting at zero
    pub fn new() -> Self {
        LamportClock {
            counter: AtomicI64::new(0),
        }
    }

    /// Gets the current counter value
    pub fn current(&self) -> Timestamp {
        self.counter.load(AtomicOrdering::SeqCst)
    }
}

impl TimeSource for LamportClock {
    fn now(&self) -> Timestamp {
        self.counter.fetch_add(1, AtomicOrdering::SeqCst) + 1
    }

    fn observe(&self, remote: Timestamp) {
        self.counter.fetch_max(remote, AtomicOrdering::SeqCst);
    }
}

/// Which time source a replica stamps its operations with.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClockKind {
    /// Wall-clock milliseconds (wire compatible default)
    #[default]
    Wall,
    /// Logical Lamport counter
    Lamport,
}

impl ClockKind {
    /// Builds a fresh time source of this kind.
    pub fn build(self) -> Box<dyn TimeSource> {
        match self {
            ClockKind::Wall => Box::new(WallClock),
            ClockKind::Lamport => Box::new(LamportClock::new()),
        }
    }
}
