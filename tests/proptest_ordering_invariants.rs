//! Property-based invariant tests for order keys and projections.
//!
//! These tests verify invariants that must hold for **any** input:
//!
//! 1. A key allocated between two neighbors lies strictly between them.
//! 2. One-sided keys land beyond their only neighbor.
//! 3. Key allocation is deterministic.
//! 4. Sorted insertion keeps the sequence sorted and reports the landing index.
//! 5. Partitioning splits ids into disjoint added/updated/deleted sets that
//!    cover every id in the differential.
//! 6. An array projection stays sorted, mirrors the store's ids, and only
//!    reports indices that are in range when applied in order.
//! 7. A tree projection built from rows in any order places every row under
//!    its parent with siblings sorted by order.

use proptest::prelude::*;
use spark_bindings::collections::{
    checked_order_key_between, insert_sorted, order_key_between, partition,
};
use spark_bindings::{
    row, ArrayChange, ArrayConfig, ArrayProperty, Differential, MemoryStore, OrderRails, Row,
    TreeConfig, TreePath, TreeProperty, Value,
};
use std::cell::RefCell;
use std::collections::HashSet;
use std::rc::Rc;

// ── Helpers ─────────────────────────────────────────────────────────────

fn order() -> impl Strategy<Value = f64> {
    -1000.0f64..1000.0
}

/// Two neighbors at least one unit apart.
fn neighbors() -> impl Strategy<Value = (f64, f64)> {
    (order(), 1.0f64..500.0).prop_map(|(lo, gap)| (lo, lo + gap))
}

#[derive(Debug, Clone)]
enum ArrayOp {
    Insert(f64),
    Delete(usize),
    Reorder(usize, f64),
    Rename(usize),
}

fn array_op() -> impl Strategy<Value = ArrayOp> {
    prop_oneof![
        3 => order().prop_map(ArrayOp::Insert),
        1 => any::<usize>().prop_map(ArrayOp::Delete),
        2 => (any::<usize>(), order()).prop_map(|(i, o)| ArrayOp::Reorder(i, o)),
        1 => any::<usize>().prop_map(ArrayOp::Rename),
    ]
}

/// Replays `changes` against a length, checking every index on the way.
fn replay(len: &mut usize, changes: &[ArrayChange]) -> Result<(), TestCaseError> {
    for change in changes {
        match change {
            ArrayChange::Initial(elements) => *len = elements.len(),
            ArrayChange::Insert(i) => {
                prop_assert!(*i <= *len, "insert at {} into {}", i, len);
                *len += 1;
            }
            ArrayChange::Delete(i) => {
                prop_assert!(*i < *len, "delete at {} from {}", i, len);
                *len -= 1;
            }
            ArrayChange::Update(i) => prop_assert!(*i < *len),
            ArrayChange::Move { src, dst } => {
                prop_assert!(*src < *len && *dst < *len, "move {}->{} in {}", src, dst, len);
            }
        }
    }
    Ok(())
}

/// Rows forming a forest: each row's parent has a smaller id.
fn forest() -> impl Strategy<Value = Vec<Row>> {
    proptest::collection::vec((any::<prop::sample::Index>(), any::<bool>(), order()), 1..40)
        .prop_map(|specs| {
            specs
                .into_iter()
                .enumerate()
                .map(|(i, (pick, root, order))| {
                    let parent = if root || i == 0 {
                        Value::Null
                    } else {
                        Value::from(pick.index(i) as i64)
                    };
                    row! { "id" => i as i64, "parent" => parent, "order" => order }
                })
                .collect::<Vec<_>>()
        })
        .prop_shuffle()
}

// ═════════════════════════════════════════════════════════════════════════
// 1-3. Key allocation
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn key_between_neighbors_is_strictly_inside((lo, hi) in neighbors()) {
        let rails = OrderRails::default();
        let key = checked_order_key_between(Some(lo), Some(hi), &rails);
        prop_assert!(key.is_ok(), "gap {} reported exhausted", hi - lo);
        let key = key.unwrap();
        prop_assert!(lo < key && key < hi, "{} not in ({}, {})", key, lo, hi);
    }

    #[test]
    fn checked_keys_never_escape_their_bounds(lo in order(), hi in order()) {
        let rails = OrderRails::default();
        if let Ok(key) = checked_order_key_between(Some(lo), Some(hi), &rails) {
            prop_assert!(lo < key && key < hi);
        } else {
            prop_assert!(hi - lo < rails.min_gap || hi <= lo);
        }
    }

    #[test]
    fn one_sided_keys_land_beyond_the_neighbor(bound in order()) {
        let rails = OrderRails::default();
        let after = order_key_between(Some(bound), None, &rails);
        let before = order_key_between(None, Some(bound), &rails);
        prop_assert!(after > bound);
        prop_assert!(before < bound);
    }

    #[test]
    fn key_allocation_is_deterministic(
        lo in proptest::option::of(order()),
        hi in proptest::option::of(order()),
    ) {
        let rails = OrderRails::default();
        let a = order_key_between(lo, hi, &rails);
        let b = order_key_between(lo, hi, &rails);
        prop_assert_eq!(a.to_bits(), b.to_bits());
    }
}

// ═════════════════════════════════════════════════════════════════════════
// 4. Sorted insertion
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn sorted_insertion_keeps_order(keys in proptest::collection::vec(order(), 0..100)) {
        let mut items: Vec<(f64, usize)> = Vec::new();
        for (seq, key) in keys.into_iter().enumerate() {
            let index = insert_sorted(&mut items, (key, seq), |item| item.0);
            prop_assert_eq!(items[index], (key, seq));
        }
        for pair in items.windows(2) {
            prop_assert!(pair[0].0 <= pair[1].0);
            // Equal keys keep arrival order.
            if pair[0].0 == pair[1].0 {
                prop_assert!(pair[0].1 < pair[1].1);
            }
        }
    }
}

// ═════════════════════════════════════════════════════════════════════════
// 5. Partitioning
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn partition_is_disjoint_and_complete(
        added in proptest::collection::hash_set(0i64..30, 0..20),
        removed in proptest::collection::hash_set(0i64..30, 0..20),
    ) {
        let diff = Differential::new(
            added.iter().map(|id| row! { "id" => *id, "side" => "new" }).collect(),
            removed.iter().map(|id| row! { "id" => *id, "side" => "old" }).collect(),
        );
        let parts = partition(&diff, "id").unwrap();

        let id_set = |rows: &[Row]| -> HashSet<Value> {
            rows.iter().filter_map(|r| r.id("id").cloned()).collect()
        };
        let inserted = id_set(&parts.added_rows);
        let updated = id_set(&parts.updated_rows);
        let deleted: HashSet<Value> = parts.deleted_ids.iter().cloned().collect();

        prop_assert!(inserted.is_disjoint(&updated));
        prop_assert!(inserted.is_disjoint(&deleted));
        prop_assert!(updated.is_disjoint(&deleted));

        let every: HashSet<Value> = added.union(&removed).map(|id| Value::from(*id)).collect();
        let covered: HashSet<Value> = inserted.union(&updated).chain(&deleted).cloned().collect();
        prop_assert_eq!(covered, every);
        let new_side = Value::from("new");
        prop_assert!(parts.updated_rows.iter().all(|r| r.get("side") == Some(&new_side)));
        prop_assert_eq!(parts.is_empty(), diff.is_empty());
    }
}

// ═════════════════════════════════════════════════════════════════════════
// 6. Array projection
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn array_projection_tracks_the_store(ops in proptest::collection::vec(array_op(), 0..40)) {
        let store = MemoryStore::new("id");
        let array = ArrayProperty::new(store.clone(), ArrayConfig::default());
        let batches = Rc::new(RefCell::new(Vec::new()));
        let b = batches.clone();
        let _removal = array.signal().observe_changing(move |batch: &Vec<ArrayChange>, _| {
            b.borrow_mut().push(batch.clone());
        });
        store.flush();

        let mut next_id = 0i64;
        let mut len = 0usize;
        for op in ops {
            let ids: Vec<Value> = store.rows().iter().filter_map(|r| r.id("id").cloned()).collect();
            match op {
                ArrayOp::Insert(order) => {
                    store.insert(row! { "id" => next_id, "order" => order }).unwrap();
                    next_id += 1;
                }
                ArrayOp::Delete(i) if !ids.is_empty() => {
                    store.delete(&ids[i % ids.len()]).unwrap();
                }
                ArrayOp::Reorder(i, order) if !ids.is_empty() => {
                    store.set(&ids[i % ids.len()], "order", order).unwrap();
                }
                ArrayOp::Rename(i) if !ids.is_empty() => {
                    store.set(&ids[i % ids.len()], "name", format!("renamed {i}")).unwrap();
                }
                _ => {}
            }
            store.flush();

            for batch in batches.borrow_mut().drain(..) {
                replay(&mut len, &batch)?;
            }
            prop_assert_eq!(len, array.len());

            let orders: Vec<f64> = array.elements().iter().map(|e| e.order).collect();
            prop_assert!(orders.windows(2).all(|w| w[0] <= w[1]), "unsorted: {:?}", orders);

            let projected: HashSet<Value> = array.elements().into_iter().map(|e| e.id).collect();
            let stored: HashSet<Value> =
                store.rows().iter().filter_map(|r| r.id("id").cloned()).collect();
            prop_assert_eq!(projected, stored);
            prop_assert!(array.last_error().is_none());
        }
    }
}

// ═════════════════════════════════════════════════════════════════════════
// 7. Tree projection
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn tree_nests_rows_in_any_order(rows in forest()) {
        let count = rows.len();
        let parents: Vec<(Value, Value)> = rows
            .iter()
            .map(|r| (r.get("id").cloned().unwrap(), r.get("parent").cloned().unwrap()))
            .collect();
        let store = MemoryStore::with_rows("id", rows);
        let tree = TreeProperty::new(store.clone(), TreeConfig::default());
        tree.start();
        store.flush();

        prop_assert!(tree.last_error().is_none());
        prop_assert_eq!(tree.len(), count);

        for (id, parent) in parents {
            let expected = if parent.is_null() { None } else { Some(parent) };
            prop_assert_eq!(tree.parent_of(&id), expected.clone());

            let path: TreePath = tree.path_for_id(&id).unwrap();
            prop_assert_eq!(&path.parent, &expected);
            let node = tree.node_at_path(&path).unwrap();
            prop_assert_eq!(&node.id, &id);

            let orders: Vec<f64> = node.children.iter().map(|c| c.order).collect();
            prop_assert!(orders.windows(2).all(|w| w[0] <= w[1]));
        }
    }
}
