//! Node identity for the RGA.
//!
//! A NodeId pairs the originating site with that site's local clock value. On the
//! wire it travels as the string `"{site}_{clock}"`; since site identifiers may
//! themselves contain underscores, parsing splits on the last one.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::crdt::types::site::SiteId;

/// Highest clock value a node may occupy. Operations reaching past it are
/// rejected, leaving headroom for the clock arithmetic replicas perform.
pub const MAX_CLOCK: u64 = u64::MAX >> 1;

/// A globally unique identifier for one character of inserted text.
///
/// An insert of `n` characters is identified by the id of its first character;
/// the following characters are addressed as `clock + 1`, `clock + 2`, and so on.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct NodeId {
    /// The site that minted this identity
    pub site: SiteId,
    /// The site's clock value at minting time
    pub clock: u64,
}

impl NodeId {
    /// Creates a new NodeId from a site and clock value
    pub fn new(site: impl Into<SiteId>, clock: u64) -> Self {
        NodeId {
            site: site.into(),
            clock,
        }
    }

    /// Returns the identity of the character `offset` places after this one.
    pub fn offset(&self, offset: usize) -> Self {
        NodeId {
            site: self.site.clone(),
            clock: self.clock + offset as u64,
        }
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.site, self.clock)
    }
}

/// Failure to parse a wire-form node identity.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("malformed node id '{0}'")]
pub struct ParseNodeIdError(String);

impl FromStr for NodeId {
    type Err = ParseNodeIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (site, clock) = s
            .rsplit_once('_')
            .ok_or_else(|| ParseNodeIdError(s.to_string()))?;
        if site.is_empty() {
            return Err(ParseNodeIdError(s.to_string()));
        }
        let clock = clock
            .parse::<u64>()
            .map_err(|_| ParseNodeIdError(s.to_string()))?;
        Ok(NodeId::new(site, clock))
    }
}

impl TryFrom<String> for NodeId {
    type Error = ParseNodeIdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<NodeId> for String {
    fn from(id: NodeId) -> Self {
        id.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_id_display() {
        let id = NodeId::new("a1", 5);
        assert_eq!(id.to_string(), "a1_5");
    }

    #[test]
    fn test_parse_site_with_underscores() {
        let id: NodeId = "site_abc_123_42".parse().unwrap();
        assert_eq!(id.site, "site_abc_123");
        assert_eq!(id.clock, 42);
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert!("".parse::<NodeId>().is_err());
        assert!("noclock".parse::<NodeId>().is_err());
        assert!("_7".parse::<NodeId>().is_err());
        assert!("site_x".parse::<NodeId>().is_err());
    }

    #[test]
    fn test_offset() {
        let id = NodeId::new("b1", 10);
        assert_eq!(id.offset(3), NodeId::new("b1", 13));
    }

    #[test]
    fn test_serde_uses_string_form() {
        let id = NodeId::new("a1", 3);
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"a1_3\"");

        let back: NodeId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }
}
