//! Operation timestamps and the ordering key derived from them.
//!
//! Operations are totally ordered by `(timestamp, site)`. Nodes additionally fall
//! back to their clock value, which only matters when one site mints two nodes
//! within the same timestamp.

use std::cmp::Ordering;

/// Milliseconds since the Unix epoch, or a logical counter when the replica runs
/// a Lamport clock. Zero is never a valid timestamp.
pub type Timestamp = i64;

/// The key a node is positioned by in the visit sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderKey<'a> {
    /// Creation timestamp of the node
    pub timestamp: Timestamp,
    /// Originating site
    pub site: &'a str,
    /// Clock value of the node's first character
    pub clock: u64,
}

impl PartialOrd for OrderKey<'_> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for OrderKey<'_> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.timestamp
            .cmp(&other.timestamp)
            .then_with(|| self.site.cmp(other.site))
            .then_with(|| self.clock.cmp(&other.clock))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(timestamp: Timestamp, site: &str, clock: u64) -> OrderKey<'_> {
        OrderKey {
            timestamp,
            site,
            clock,
        }
    }

    #[test]
    fn test_timestamp_dominates() {
        // Lower timestamp wins even against a lower site id
        assert!(key(1, "b1", 9) < key(2, "a1", 1));
    }

    #[test]
    fn test_site_breaks_timestamp_ties() {
        assert!(key(5, "a1", 9) < key(5, "b1", 1));
    }

    #[test]
    fn test_clock_breaks_full_ties() {
        assert!(key(5, "a1", 1) < key(5, "a1", 2));
        assert_eq!(key(5, "a1", 1).cmp(&key(5, "a1", 1)), Ordering::Equal);
    }
}
