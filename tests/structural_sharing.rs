use bistate::{Key, Node, Value, create, transact, value, watch};
use quickcheck::{Arbitrary, Gen, QuickCheck, TestResult};
use std::{cell::RefCell, rc::Rc};

fn child(node: &Node, key: impl Into<Key>) -> Node {
    node.get(key)
        .and_then(Value::into_node)
        .expect("child is a node")
}

/// Runs `work` in a transaction and returns the snapshot that replaced `state`.
fn commit(state: &Node, work: impl FnOnce()) -> Node {
    let next = Rc::new(RefCell::new(None));
    let sink = Rc::clone(&next);
    watch(state, move |_, n| *sink.borrow_mut() = Some(n.clone())).unwrap();
    transact(work);
    next.borrow_mut().take().expect("the watcher fired")
}

#[test]
fn untouched_subtrees_are_shared() {
    let prev = create(value!({
        "a": [{ "value": 1 }, { "value": 2 }, { "value": 3 }],
        "b": [{ "value": 1 }, { "value": 2 }, { "value": 3 }],
        "c": [{ "value": 1 }, { "value": 2 }, { "value": 3 }]
    }))
    .unwrap();
    let next = commit(&prev, || {
        let a0 = child(&child(&prev, "a"), 0);
        a0.set("value", 2).unwrap();
        let b2 = child(&child(&prev, "b"), 2);
        b2.set("value", 4).unwrap();
        prev.set("d", value!([{ "value": 1 }, { "value": 2 }, { "value": 3 }]))
            .unwrap();
    });

    assert_eq!(
        next.to_plain(),
        value!({
            "a": [{ "value": 2 }, { "value": 2 }, { "value": 3 }],
            "b": [{ "value": 1 }, { "value": 2 }, { "value": 4 }],
            "c": [{ "value": 1 }, { "value": 2 }, { "value": 3 }],
            "d": [{ "value": 1 }, { "value": 2 }, { "value": 3 }]
        })
    );

    let (prev_a, next_a) = (child(&prev, "a"), child(&next, "a"));
    let (prev_b, next_b) = (child(&prev, "b"), child(&next, "b"));
    assert_eq!(child(&prev, "c"), child(&next, "c"));
    assert_ne!(prev_a, next_a);
    assert_ne!(child(&prev_a, 0), child(&next_a, 0));
    assert_eq!(child(&prev_a, 1), child(&next_a, 1));
    assert_eq!(child(&prev_a, 2), child(&next_a, 2));
    assert_eq!(child(&prev_b, 0), child(&next_b, 0));
    assert_eq!(child(&prev_b, 1), child(&next_b, 1));
    assert_ne!(child(&prev_b, 2), child(&next_b, 2));
}

#[test]
fn swapped_object_properties_are_reused() {
    let prev = create(value!({ "a": { "value": 1 }, "b": { "value": 2 } })).unwrap();
    let (old_a, old_b) = (child(&prev, "a"), child(&prev, "b"));
    let next = commit(&prev, || {
        prev.set("a", &old_b).unwrap();
        prev.set("b", &old_a).unwrap();
        prev.set("c", &old_a).unwrap();
        assert_eq!(child(&prev, "b"), child(&prev, "c"));
    });

    assert_eq!(child(&next, "a"), old_b);
    assert_eq!(child(&next, "b"), old_a);
    assert_ne!(child(&next, "c"), old_a);
    assert_eq!(
        next.to_plain(),
        value!({ "a": { "value": 2 }, "b": { "value": 1 }, "c": { "value": 1 } })
    );
}

#[test]
fn rotated_list_items_are_reused() {
    let prev = create(value!([{ "value": 1 }, { "value": 2 }, { "value": 3 }])).unwrap();
    let [a, b, c] = [0, 1, 2].map(|i| child(&prev, i));
    let next = commit(&prev, || {
        prev.set(0, &c).unwrap();
        prev.set(1, &a).unwrap();
        prev.set(2, &b).unwrap();
        prev.set(3, &c).unwrap();
    });

    assert_eq!(
        next.to_plain(),
        value!([{ "value": 3 }, { "value": 1 }, { "value": 2 }, { "value": 3 }])
    );
    assert_eq!(
        prev.to_plain(),
        value!([{ "value": 1 }, { "value": 2 }, { "value": 3 }])
    );
    assert_eq!(child(&next, 0), c);
    assert_eq!(child(&next, 1), a);
    assert_eq!(child(&next, 2), b);
    assert_ne!(child(&next, 3), c);
}

#[test]
fn reuse_is_limited_to_the_same_layer() {
    let prev = create(value!({ "a": { "count": 0 }, "b": { "value": { "count": 1 } } })).unwrap();
    let old_a = child(&prev, "a");
    let old_value = child(&child(&prev, "b"), "value");
    let next = commit(&prev, || {
        prev.set("a", &old_value).unwrap();
        child(&prev, "b").set("value", &old_a).unwrap();
    });

    assert_eq!(
        next.to_plain(),
        value!({ "a": { "count": 1 }, "b": { "value": { "count": 0 } } })
    );
    assert_ne!(child(&next, "a"), old_value);
    assert_ne!(child(&child(&next, "b"), "value"), old_a);
}

/// A write to one leaf of a fixed-shape tree: `groups[group].items[item].value = value`.
#[derive(Debug, Clone)]
struct Write {
    group: usize,
    item: usize,
    value: i64,
}

const GROUPS: usize = 4;
const ITEMS: usize = 3;

impl Arbitrary for Write {
    fn arbitrary(g: &mut Gen) -> Self {
        Write {
            group: usize::arbitrary(g) % GROUPS,
            item: usize::arbitrary(g) % ITEMS,
            value: i64::arbitrary(g),
        }
    }
}

fn item(root: &Node, group: usize, index: usize) -> Node {
    child(&child(&child(root, group), "items"), index)
}

fn sharing_matches_the_written_paths(writes: Vec<Write>) -> TestResult {
    let prev = create(Value::array((0..GROUPS).map(|_| {
        value!({ "items": [{ "value": 0 }, { "value": 0 }, { "value": 0 }] })
    })))
    .unwrap();

    let next = Rc::new(RefCell::new(None));
    let sink = Rc::clone(&next);
    watch(&prev, move |_, n| *sink.borrow_mut() = Some(n.clone())).unwrap();
    transact(|| {
        for write in &writes {
            item(&prev, write.group, write.item)
                .set("value", write.value)
                .unwrap();
        }
    });

    let Some(next) = next.borrow_mut().take() else {
        return TestResult::from_bool(writes.is_empty());
    };
    if writes.is_empty() {
        return TestResult::failed();
    }
    for group in 0..GROUPS {
        let touched = writes.iter().any(|w| w.group == group);
        if touched == (child(&prev, group) == child(&next, group)) {
            return TestResult::failed();
        }
        for index in 0..ITEMS {
            let last = writes
                .iter()
                .rev()
                .find(|w| w.group == group && w.item == index);
            let (before, after) = (item(&prev, group, index), item(&next, group, index));
            let ok = match last {
                Some(w) => before != after && after.get("value").unwrap() == w.value,
                None => before == after && after.get("value").unwrap() == 0,
            };
            if !ok {
                return TestResult::failed();
            }
        }
    }
    TestResult::passed()
}

#[test]
fn sharing_follows_written_paths() {
    QuickCheck::new()
        .tests(200)
        .quickcheck(sharing_matches_the_written_paths as fn(Vec<Write>) -> TestResult);
}
