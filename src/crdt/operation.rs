//! Operations exchanged between replicas.
//!
//! An operation is the only unit that travels between sites. It is immutable once
//! created; replicas apply it with `RGA::apply_operation`.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cmp::Ordering;

use crate::crdt::error::{Result, RgaError};
use crate::crdt::types::{MAX_CLOCK, NodeId, SiteId, TimeSource, Timestamp};

/// Inserts `content` as a new node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InsertOperation {
    /// Identity of the new node (and of its first character)
    pub node_id: NodeId,
    /// The inserted text
    pub content: String,
    /// Character immediately left of the insertion point, if any
    pub left_origin: Option<NodeId>,
    /// Character immediately right of the insertion point, if any
    pub right_origin: Option<NodeId>,
    /// Intended visible offset at creation time
    pub position: usize,
    pub timestamp: Timestamp,
    pub site_id: SiteId,
}

/// Marks one character invisible.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteOperation {
    /// Identity of the character to tombstone
    pub node_id: NodeId,
    pub timestamp: Timestamp,
    pub site_id: SiteId,
}

/// A replicated edit: the tagged union of insert and delete.
///
/// Serializes as `{"type":"insert",...}` or `{"type":"delete",...}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Operation {
    Insert(InsertOperation),
    Delete(DeleteOperation),
}

/// Mints an insert operation. Does not touch any replica.
pub fn create_insert(
    content: &str,
    position: usize,
    left_origin: Option<NodeId>,
    right_origin: Option<NodeId>,
    site_id: &str,
    clock: u64,
    time: &dyn TimeSource,
) -> InsertOperation {
    InsertOperation {
        node_id: NodeId::new(site_id, clock),
        content: content.to_string(),
        left_origin,
        right_origin,
        position,
        timestamp: time.now(),
        site_id: site_id.to_string(),
    }
}

/// Mints a delete operation targeting an existing character.
pub fn create_delete(node_id: NodeId, site_id: &str, time: &dyn TimeSource) -> DeleteOperation {
    DeleteOperation {
        node_id,
        timestamp: time.now(),
        site_id: site_id.to_string(),
    }
}

/// Total order used to linearize operations during a bulk merge:
/// timestamp ascending, then site identifier.
pub fn compare(a: &Operation, b: &Operation) -> Ordering {
    a.timestamp()
        .cmp(&b.timestamp())
        .then_with(|| a.site_id().cmp(b.site_id()))
}

impl Operation {
    /// The wire tag of this operation.
    pub fn kind(&self) -> &'static str {
        match self {
            Operation::Insert(_) => "insert",
            Operation::Delete(_) => "delete",
        }
    }

    pub fn node_id(&self) -> &NodeId {
        match self {
            Operation::Insert(op) => &op.node_id,
            Operation::Delete(op) => &op.node_id,
        }
    }

    pub fn timestamp(&self) -> Timestamp {
        match self {
            Operation::Insert(op) => op.timestamp,
            Operation::Delete(op) => op.timestamp,
        }
    }

    pub fn site_id(&self) -> &str {
        match self {
            Operation::Insert(op) => &op.site_id,
            Operation::Delete(op) => &op.site_id,
        }
    }

    /// Composite identity `{type}_{nodeId}_{timestamp}` used to recognize
    /// re-delivered operations.
    pub fn dedup_key(&self) -> String {
        format!("{}_{}_{}", self.kind(), self.node_id(), self.timestamp())
    }

    /// Structural check performed before an operation reaches a replica.
    pub fn validate(&self) -> Result<()> {
        if self.node_id().site.is_empty() {
            return Err(RgaError::InvalidOperation("missing node id".to_string()));
        }
        if self.site_id().is_empty() {
            return Err(RgaError::InvalidOperation("missing site id".to_string()));
        }
        if self.timestamp() <= 0 {
            return Err(RgaError::InvalidOperation(format!(
                "invalid timestamp {}",
                self.timestamp()
            )));
        }

        let span = match self {
            Operation::Insert(op) => op.content.chars().count().max(1) as u64,
            Operation::Delete(_) => 1,
        };
        let clock = self.node_id().clock;
        if clock.checked_add(span).is_none_or(|end| end > MAX_CLOCK) {
            return Err(RgaError::InvalidOperation(format!(
                "node id {} out of clock range",
                self.node_id()
            )));
        }
        Ok(())
    }

    pub fn is_valid(&self) -> bool {
        self.validate().is_ok()
    }

    /// Encodes the operation in its wire form.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    /// Decodes and validates an operation from its wire form.
    pub fn from_json(text: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(text)
            .map_err(|e| RgaError::InvalidOperation(e.to_string()))?;
        Self::from_value(value)
    }

    /// Decodes and validates an already parsed JSON value.
    ///
    /// An unrecognized `type` tag is reported separately from a malformed body.
    /// Negative positions fail here, since positions are unsigned.
    pub fn from_value(value: Value) -> Result<Self> {
        match value.get("type").and_then(Value::as_str) {
            Some("insert") | Some("delete") => {}
            Some(other) => return Err(RgaError::UnknownOperationType(other.to_string())),
            None => {
                return Err(RgaError::InvalidOperation(
                    "missing operation type".to_string(),
                ));
            }
        }

        let operation: Operation = serde_json::from_value(value)
            .map_err(|e| RgaError::InvalidOperation(e.to_string()))?;
        operation.validate()?;
        Ok(operation)
    }
}

impl From<InsertOperation> for Operation {
    fn from(op: InsertOperation) -> Self {
        Operation::Insert(op)
    }
}

impl From<DeleteOperation> for Operation {
    fn from(op: DeleteOperation) -> Self {
        Operation::Delete(op)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crdt::types::LamportClock;

    fn delete_at(timestamp: Timestamp, site: &str) -> Operation {
        Operation::Delete(DeleteOperation {
            node_id: NodeId::new("x", 1),
            timestamp,
            site_id: site.to_string(),
        })
    }

    #[test]
    fn test_create_insert_mints_identity() {
        let clock = LamportClock::new();
        let op = create_insert("hi", 0, None, None, "a1", 7, &clock);

        assert_eq!(op.node_id, NodeId::new("a1", 7));
        assert_eq!(op.site_id, "a1");
        assert_eq!(op.timestamp, 1);
        assert_eq!(op.content, "hi");
    }

    #[test]
    fn test_compare_orders_by_timestamp_then_site() {
        assert_eq!(compare(&delete_at(1, "b"), &delete_at(2, "a")), Ordering::Less);
        assert_eq!(compare(&delete_at(2, "a"), &delete_at(2, "b")), Ordering::Less);
        assert_eq!(compare(&delete_at(2, "a"), &delete_at(2, "a")), Ordering::Equal);
    }

    #[test]
    fn test_validate_rejects_missing_fields() {
        assert!(delete_at(1, "a").is_valid());
        assert!(matches!(
            delete_at(0, "a").validate(),
            Err(RgaError::InvalidOperation(_))
        ));
        assert!(matches!(
            delete_at(1, "").validate(),
            Err(RgaError::InvalidOperation(_))
        ));
    }

    #[test]
    fn test_validate_rejects_clock_overflow() {
        let insert = |clock: u64| {
            Operation::Insert(InsertOperation {
                node_id: NodeId::new("b1", clock),
                content: "ab".to_string(),
                left_origin: None,
                right_origin: None,
                position: 0,
                timestamp: 5,
                site_id: "b1".to_string(),
            })
        };

        assert!(matches!(
            insert(u64::MAX).validate(),
            Err(RgaError::InvalidOperation(_))
        ));
        assert!(matches!(
            insert(MAX_CLOCK - 1).validate(),
            Err(RgaError::InvalidOperation(_))
        ));
        assert!(insert(MAX_CLOCK - 2).is_valid());

        let delete = Operation::Delete(DeleteOperation {
            node_id: NodeId::new("b1", u64::MAX),
            timestamp: 5,
            site_id: "a1".to_string(),
        });
        assert!(!delete.is_valid());

        let wire = r#"{"type":"insert","nodeId":"b1_18446744073709551615","content":"ab",
            "leftOrigin":null,"rightOrigin":null,"position":0,"timestamp":5,"siteId":"b1"}"#;
        assert!(matches!(
            Operation::from_json(wire),
            Err(RgaError::InvalidOperation(_))
        ));
    }

    #[test]
    fn test_dedup_key() {
        let op = delete_at(42, "a");
        assert_eq!(op.dedup_key(), "delete_x_1_42");
    }

    #[test]
    fn test_wire_shape() {
        let op = Operation::Insert(InsertOperation {
            node_id: NodeId::new("a1", 1),
            content: "Hello".to_string(),
            left_origin: None,
            right_origin: Some(NodeId::new("b1", 3)),
            position: 0,
            timestamp: 1000,
            site_id: "a1".to_string(),
        });

        let value: Value = serde_json::from_str(&op.to_json().unwrap()).unwrap();
        assert_eq!(value["type"], "insert");
        assert_eq!(value["nodeId"], "a1_1");
        assert_eq!(value["leftOrigin"], Value::Null);
        assert_eq!(value["rightOrigin"], "b1_3");
        assert_eq!(value["siteId"], "a1");
    }

    #[test]
    fn test_from_json_errors() {
        let unknown = r#"{"type":"format","nodeId":"a_1","timestamp":1,"siteId":"a"}"#;
        assert_eq!(
            Operation::from_json(unknown),
            Err(RgaError::UnknownOperationType("format".to_string()))
        );

        let negative = r#"{"type":"insert","nodeId":"a_1","content":"x","leftOrigin":null,
            "rightOrigin":null,"position":-1,"timestamp":1,"siteId":"a"}"#;
        assert!(matches!(
            Operation::from_json(negative),
            Err(RgaError::InvalidOperation(_))
        ));

        let no_timestamp = r#"{"type":"delete","nodeId":"a_1","timestamp":0,"siteId":"a"}"#;
        assert!(matches!(
            Operation::from_json(no_timestamp),
            Err(RgaError::InvalidOperation(_))
        ));

        let ok = r#"{"type":"delete","nodeId":"a_1","timestamp":5,"siteId":"a"}"#;
        let op = Operation::from_json(ok).unwrap();
        assert_eq!(op.node_id(), &NodeId::new("a", 1));
    }
}
