// (c) Copyright 2025 Helsing GmbH. All rights reserved.
//! The reuse resolver and snapshot computation.
//!
//! Every nested value goes through [`resolve`] when a node is built, either from caller
//! input or from the scapegoat of the node it replaces:
//!
//! 1. leaves are stored as-is;
//! 2. a tracked node whose recorded parent is exactly the node being replaced is *reused*: it
//!    is asked to compute itself (which hands back the same cell when its subtree is clean)
//!    and is re-parented to the new owner;
//! 3. anything else (a plain container, or a node owned elsewhere) is *adopted* into a
//!    brand-new cell, resolving its children the same way.
//!
//! Rule 2 is what keeps clean subtrees shared between snapshots. Rule 3 makes sure the same
//! node assigned to two places, or moved under a new parent, gets its own identity instead of
//! aliasing stale ancestry. Since a reused node is re-parented as soon as it's claimed, the
//! first slot (in entry order) that refers to it wins and every later one receives a copy.
use crate::{
    Value,
    node::{Container, DraftCell, Map, Node},
};
use std::rc::{Rc, Weak};
use tracing::trace;

/// The entries a new cell is built from.
#[derive(Clone, Copy)]
enum Source<'a> {
    Object(&'a Map),
    Array(&'a [Value]),
}

impl<'a> From<&'a Container> for Source<'a> {
    fn from(container: &'a Container) -> Self {
        match container {
            Container::Object(map) => Source::Object(map),
            Container::Array(items) => Source::Array(items),
        }
    }
}

/// Wraps a container value in a brand-new cell. Returns `None` for leaves.
///
/// A tracked node is copied from its current view; none of its cells are reused.
pub(crate) fn adopt(value: &Value) -> Option<Node> {
    match value {
        Value::Object(map) => Some(build(Source::Object(map), None)),
        Value::Array(items) => Some(build(Source::Array(items), None)),
        Value::Node(node) => Some(node.0.view(|c| build(c.into(), None))),
        _ => None,
    }
}

/// Prepares a value written into `owner`: plain containers become fresh cells parented to
/// `owner`, anything else is kept as-is until the next snapshot is computed.
pub(crate) fn adopt_into(value: Value, owner: &Rc<DraftCell>) -> Value {
    match value {
        Value::Object(_) | Value::Array(_) => match adopt(&value) {
            Some(node) => {
                node.0.set_parent(&Rc::downgrade(owner));
                Value::Node(node)
            }
            None => value,
        },
        other => other,
    }
}

fn build(source: Source<'_>, previous: Option<&Rc<DraftCell>>) -> Node {
    let cell = Rc::new_cyclic(|owner| {
        let base = match source {
            Source::Object(map) => Container::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), resolve(v, owner, previous)))
                    .collect(),
            ),
            Source::Array(items) => Container::Array(
                items
                    .iter()
                    .map(|item| resolve(item, owner, previous))
                    .collect(),
            ),
        };
        DraftCell::new(base)
    });
    trace!(id = %cell.id, replaces = ?previous.map(|p| p.id), "built node");
    Node(cell)
}

fn resolve(value: &Value, owner: &Weak<DraftCell>, previous: Option<&Rc<DraftCell>>) -> Value {
    let node = match value {
        Value::Node(node) if previous.is_some_and(|previous| node.0.parent_is(previous)) => {
            let next = compute(&node.0);
            trace!(from = %node.id(), to = %next.id(), "reusing child");
            next
        }
        other => match adopt(other) {
            Some(node) => node,
            None => return other.clone(),
        },
    };
    node.0.set_parent(owner);
    Value::Node(node)
}

/// Produces the snapshot that replaces `cell`.
///
/// A clean cell is its own next snapshot. A dirty cell is rebuilt from its scapegoat (or its
/// base, if only descendants were written) and retired: it becomes read-only, loses its
/// watcher and parent, and children it no longer carries become inert.
pub(crate) fn compute(cell: &Rc<DraftCell>) -> Node {
    if !cell.dirty.get() {
        return Node(Rc::clone(cell));
    }
    cell.dirty.set(false);
    cell.finalized.set(true);
    let working = cell.scapegoat.borrow_mut().take();
    let next = build(working.as_ref().unwrap_or(&cell.base).into(), Some(cell));

    cell.watch.borrow_mut().retire();
    cell.clear_parent();
    for child in cell.base.nodes() {
        if child.0.parent_is(cell) {
            child.0.clear_parent();
        }
    }
    trace!(from = %cell.id, to = %next.id(), "computed snapshot");
    next
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Key, create, transact, value};
    use quickcheck::TestResult;

    fn child(node: &Node, key: impl Into<Key>) -> Node {
        node.get(key)
            .and_then(Value::into_node)
            .expect("child is a node")
    }

    #[test]
    fn clean_cells_compute_to_themselves() {
        let state = create(value!({ "a": { "v": 1 } })).unwrap();
        transact(|| {
            // reads alone never dirty a cell
            let _ = child(&state, "a").get("v");
        });
        assert_eq!(compute(&state.0), state);
        assert!(state.is_writable());
    }

    #[test]
    fn dirty_paths_are_rebuilt_and_the_rest_is_shared() {
        let prev = create(value!({ "a": { "v": 1 }, "b": { "v": 2 }, "c": { "v": 3 } })).unwrap();
        transact(|| child(&prev, "a").set("v", 10)).unwrap();

        let next = compute(&prev.0);
        assert_ne!(next, prev);
        assert_ne!(child(&next, "a"), child(&prev, "a"));
        assert_eq!(child(&next, "b"), child(&prev, "b"));
        assert_eq!(child(&next, "c"), child(&prev, "c"));

        assert_eq!(child(&next, "a").get("v").unwrap(), 10);
        assert_eq!(child(&prev, "a").get("v").unwrap(), 1);
        assert!(!prev.is_writable());
        assert!(!child(&prev, "a").is_writable());
        // shared children now belong to the new snapshot
        assert_eq!(child(&next, "b").parent(), Some(next.clone()));
        assert!(next.is_root());
    }

    #[test]
    fn swapped_children_are_reused_and_duplicates_are_copied() {
        let prev = create(value!({ "a": { "v": 1 }, "b": { "v": 2 } })).unwrap();
        let old_a = child(&prev, "a");
        let old_b = child(&prev, "b");
        transact(|| {
            prev.set("a", &old_b)?;
            prev.set("b", &old_a)?;
            prev.set("c", &old_a)
        })
        .unwrap();

        let next = compute(&prev.0);
        assert_eq!(child(&next, "a"), old_b);
        assert_eq!(child(&next, "b"), old_a);
        assert_ne!(child(&next, "c"), old_a);
        assert_eq!(child(&next, "c").to_plain(), old_a.to_plain());
        assert_eq!(child(&next, "c").parent(), Some(next.clone()));
    }

    #[test]
    fn nodes_moved_from_another_tree_are_copied() {
        let left = create(value!({ "item": { "v": 1 } })).unwrap();
        let right = create(value!({})).unwrap();
        let item = child(&left, "item");
        transact(|| right.set("item", &item)).unwrap();

        let next = compute(&right.0);
        assert_ne!(child(&next, "item"), item);
        assert_eq!(item.parent(), Some(left));
    }

    #[test]
    fn dropped_children_become_inert() {
        let prev = create(value!({ "a": { "v": 1 }, "b": {} })).unwrap();
        let a = child(&prev, "a");
        transact(|| prev.delete("a")).unwrap();

        let next = compute(&prev.0);
        assert!(!next.has("a"));
        assert!(a.is_root());
        // still writable, but no longer feeds into any tree
        transact(|| a.set("v", 2)).unwrap();
        assert!(!next.is_dirty());
    }

    #[test]
    fn leaves_are_never_wrapped() {
        let payload = crate::Atomic::new(42_u8);
        let state = create(Value::object([
            ("f", Value::Atomic(payload.clone())),
            ("s", "text".into()),
        ]))
        .unwrap();
        assert_eq!(state.get("f"), Some(Value::Atomic(payload)));
        assert!(!crate::is_tracked(&state.get("s").unwrap()));
    }

    /// Writes to random children of a wide root: touched children get new cells carrying the
    /// last written value, untouched ones are shared.
    #[quickcheck]
    fn only_written_children_are_rebuilt(writes: Vec<(u8, i64)>) -> TestResult {
        const WIDTH: u8 = 6;
        let prev = create(Value::object(
            (0..WIDTH).map(|i| (format!("c{i}"), value!({ "v": 0 }))),
        ))
        .unwrap();

        let mut last = [None; WIDTH as usize];
        transact(|| {
            for &(i, v) in &writes {
                let i = i % WIDTH;
                child(&prev, format!("c{i}")).set("v", v).unwrap();
                last[i as usize] = Some(v);
            }
        });

        let next = compute(&prev.0);
        if writes.is_empty() != (next == prev) {
            return TestResult::failed();
        }
        for i in 0..WIDTH {
            let key = format!("c{i}");
            let (before, after) = (child(&prev, &key), child(&next, &key));
            let ok = match last[i as usize] {
                Some(v) => before != after && after.get("v").unwrap() == v,
                None => before == after,
            };
            if !ok {
                return TestResult::failed();
            }
        }
        TestResult::passed()
    }
}
