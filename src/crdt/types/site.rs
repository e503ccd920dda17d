//! Site identifier type and related functionality.
//!
//! This module contains the definition of SiteId, which uniquely identifies
//! each editing replica in the distributed CRDT system.

use uuid::Uuid;

/// A stable identifier for each editing replica (collaborator).
///
/// Site identifiers are compared lexicographically when two operations carry the
/// same timestamp, and form one half of every node identity.
pub type SiteId = String;

/// Generates a fresh site identifier of the form `site_<uuid>`.
pub fn generate_site_id() -> SiteId {
    format!("site_{}", Uuid::new_v4().simple())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_site_ids_are_distinct() {
        let a = generate_site_id();
        let b = generate_site_id();

        assert!(a.starts_with("site_"));
        assert_ne!(a, b);
    }
}
