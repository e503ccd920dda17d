//! Integration tests for the RGA CRDT implementation.
//!
//! These tests verify convergence of replicas across concurrent editing
//! scenarios, delivery orders and re-delivery.

use collab_rga::crdt::{DeleteOperation, InsertOperation, TimeSource};
use collab_rga::{ClockKind, ManagerConfig, NodeId, Operation, RGA, StateManager};
use proptest::prelude::*;

fn manager(site: &str) -> StateManager {
    StateManager::with_config(
        site,
        ManagerConfig {
            clock: ClockKind::Lamport,
            ..ManagerConfig::default()
        },
    )
}

fn insert_op(site: &str, clock: u64, content: &str, timestamp: i64) -> Operation {
    Operation::Insert(InsertOperation {
        node_id: NodeId::new(site, clock),
        content: content.to_string(),
        left_origin: None,
        right_origin: None,
        position: 0,
        timestamp,
        site_id: site.to_string(),
    })
}

#[test]
fn test_concurrent_inserts_order_by_timestamp() {
    let mut replica = RGA::new("c1");
    replica
        .apply_operation(&insert_op("b1", 1, "Hi ", 2000))
        .unwrap();
    replica
        .apply_operation(&insert_op("a1", 1, "Hello", 1000))
        .unwrap();
    assert_eq!(replica.text(), "HelloHi ");

    // Same outcome in the other delivery order
    let mut other = RGA::new("d1");
    other
        .apply_operation(&insert_op("a1", 1, "Hello", 1000))
        .unwrap();
    other
        .apply_operation(&insert_op("b1", 1, "Hi ", 2000))
        .unwrap();
    assert_eq!(other.text(), "HelloHi ");
}

#[test]
fn test_equal_timestamps_order_by_site() {
    let mut replica = RGA::new("c1");
    replica.apply_operation(&insert_op("b1", 1, "B", 5)).unwrap();
    replica.apply_operation(&insert_op("a1", 1, "A", 5)).unwrap();
    assert_eq!(replica.text(), "AB");
}

#[test]
fn test_range_delete_inside_single_insert() {
    let mut alice = manager("a1");
    let mut bob = manager("b1");

    let insert = alice.insert_text("Hello World", 0).unwrap();
    let deletes = alice.delete_text(2, 3);
    assert_eq!(deletes.len(), 3);
    assert_eq!(alice.text(), "He World");

    bob.apply_remote_operation(&insert);
    for op in &deletes {
        assert!(bob.apply_remote_operation(op));
    }
    assert_eq!(bob.text(), "He World");
}

#[test]
fn test_two_sites_converge() {
    let mut alice = manager("a1");
    let mut bob = manager("b1");

    let mut from_alice = vec![alice.insert_text("abc", 0).unwrap()];
    let mut from_bob = vec![bob.insert_text("xyz", 0).unwrap()];
    from_alice.extend(alice.delete_text(1, 1));
    from_bob.extend(bob.delete_text(0, 2));

    for op in &from_bob {
        alice.apply_remote_operation(op);
    }
    for op in &from_alice {
        bob.apply_remote_operation(op);
    }

    assert_eq!(alice.text(), bob.text());
    assert_eq!(alice.text().chars().count(), 3);
}

#[test]
fn test_cross_site_delete_converges() {
    let mut alice = manager("a1");
    let mut bob = manager("b1");

    let insert = alice.insert_text("shared", 0).unwrap();
    bob.apply_remote_operation(&insert);

    // Both remove overlapping ranges concurrently
    let from_alice = alice.delete_text(0, 3);
    let from_bob = bob.delete_text(2, 3);

    for op in &from_bob {
        alice.apply_remote_operation(op);
    }
    for op in &from_alice {
        bob.apply_remote_operation(op);
    }

    assert_eq!(alice.text(), "d");
    assert_eq!(bob.text(), "d");
}

#[test]
fn test_duplicate_delivery_applied_once() {
    let mut alice = manager("a1");
    let mut bob = manager("b1");

    let op = alice.insert_text("once", 0).unwrap();
    assert!(bob.apply_remote_operation(&op));
    assert!(!bob.apply_remote_operation(&op));
    assert_eq!(bob.text(), "once");
}

#[test]
fn test_idempotent_delete_at_replica_level() {
    let mut replica = RGA::new("a1");
    replica.insert("abc", 0);
    let delete = Operation::Delete(DeleteOperation {
        node_id: NodeId::new("a1", 2),
        timestamp: 10,
        site_id: "b1".to_string(),
    });

    replica.apply_operation(&delete).unwrap();
    let once = replica.text();
    replica.apply_operation(&delete).unwrap();
    assert_eq!(replica.text(), once);
    assert_eq!(once, "ac");
}

/// Stamps every operation with one fixed instant.
struct FixedClock(i64);

impl TimeSource for FixedClock {
    fn now(&self) -> i64 {
        self.0
    }
}

#[test]
fn test_merge_replicas() {
    let mut a = RGA::with_time_source("a1", Box::new(FixedClock(200)));
    let mut b = RGA::with_time_source("b1", Box::new(FixedClock(100)));
    a.insert("left", 0);
    b.insert("right", 0);
    b.delete(0, 1);

    let mut merged_a = RGA::deserialize(a.serialize()).unwrap();
    merged_a.merge(&b);
    let mut merged_b = RGA::deserialize(b.serialize()).unwrap();
    merged_b.merge(&a);

    // b's insert carries the earlier timestamp, so it comes first on both sides
    assert_eq!(merged_a.text(), "ightleft");
    assert_eq!(merged_b.text(), "ightleft");

    // Merging again changes nothing
    merged_a.merge(&b);
    assert_eq!(merged_a.text(), "ightleft");
}

#[test]
fn test_merge_orders_equal_timestamps_by_site() {
    let mut a = RGA::with_time_source("a1", Box::new(FixedClock(100)));
    let mut b = RGA::with_time_source("b1", Box::new(FixedClock(100)));
    b.insert("second", 0);
    a.insert("first", 0);

    b.merge(&a);
    a.merge(&b);
    assert_eq!(a.text(), "firstsecond");
    assert_eq!(b.text(), "firstsecond");
}

#[test]
fn test_late_joiner_bootstraps_from_snapshot() {
    let mut alice = manager("a1");
    let mut bob = manager("b1");
    let first = alice.insert_text("hello", 0).unwrap();
    bob.apply_remote_operation(&first);

    let mut carol = manager("c1");
    carol.set_state(bob.state()).unwrap();
    assert_eq!(carol.text(), "hello");

    let op = carol.insert_text("!", 5).unwrap();
    alice.apply_remote_operation(&op);
    bob.apply_remote_operation(&op);
    assert_eq!(alice.text(), "hello!");
    assert_eq!(bob.text(), "hello!");
}

#[derive(Debug, Clone)]
enum Edit {
    Insert(String, usize),
    Delete(usize, usize),
}

fn edit() -> impl Strategy<Value = Edit> {
    prop_oneof![
        ("[a-z]{1,4}", 0usize..16).prop_map(|(text, pos)| Edit::Insert(text, pos)),
        (0usize..16, 1usize..4).prop_map(|(pos, len)| Edit::Delete(pos, len)),
    ]
}

/// Replays `edits` on a fresh manager for `site`, returning the operations produced.
fn produce(site: &str, edits: &[Edit]) -> Vec<Operation> {
    let mut m = manager(site);
    let mut operations = Vec::new();
    for edit in edits {
        match edit {
            Edit::Insert(text, pos) => operations.extend(m.insert_text(text, *pos)),
            Edit::Delete(pos, len) => operations.extend(m.delete_text(*pos, *len)),
        }
    }
    operations
}

fn scenario() -> impl Strategy<Value = (Vec<Operation>, Vec<Operation>)> {
    (
        prop::collection::vec(edit(), 1..8),
        prop::collection::vec(edit(), 1..8),
        prop::collection::vec(edit(), 0..6),
    )
        .prop_flat_map(|(a, b, c)| {
            let mut operations = produce("a1", &a);
            operations.extend(produce("b1", &b));
            operations.extend(produce("c1", &c));
            (
                Just(operations.clone()).prop_shuffle(),
                Just(operations).prop_shuffle(),
            )
        })
}

proptest! {
    #[test]
    fn prop_any_delivery_order_converges((first, second) in scenario()) {
        let mut x = manager("x1");
        let mut y = manager("y1");
        for op in &first {
            x.apply_remote_operation(op);
        }
        for op in &second {
            y.apply_remote_operation(op);
        }
        prop_assert_eq!(x.text(), y.text());
        prop_assert_eq!(x.debug_info().deferred_operations, 0);
    }

    #[test]
    fn prop_redelivery_is_harmless((ops, _) in scenario()) {
        let mut once = manager("x1");
        let mut twice = manager("y1");
        for op in &ops {
            once.apply_remote_operation(op);
        }
        for op in ops.iter().chain(ops.iter()) {
            twice.apply_remote_operation(op);
        }
        prop_assert_eq!(once.text(), twice.text());
    }
}
