// (c) Copyright 2025 Helsing GmbH. All rights reserved.
//! Tracked nodes: the draft cell behind every object and array of a tree, and the
//! accessor/mutator facade callers use to read and write it.
//!
//! A cell owns two containers. The *base* holds the committed values and never changes
//! after the cell has been built. The *scapegoat* is the working copy; it is created from the
//! base on the first write of a transaction. Reads inside a transaction see the scapegoat,
//! reads outside see the base, so a snapshot looks immutable to anybody outside the batch.
//!
//! Writes are only legal while a transaction is open and the cell has not yet been replaced
//! by a newer snapshot. Each write marks the cell and all of its ancestors dirty; the
//! coordinator then recomputes the watched roots once the outermost transaction closes.
use crate::{
    BistateRandomState, Error, Value,
    resolve,
    transaction::{self, in_transaction},
    watch::WatchSlot,
};
use std::{
    cell::{Cell, RefCell, RefMut},
    collections::HashSet,
    fmt,
    hash::{Hash, Hasher},
    rc::{Rc, Weak},
    sync::atomic::{AtomicU64, Ordering},
};

mod container;
pub(crate) use container::Container;
pub use container::Map;

static NEXT_NODE_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identifier of a cell.
///
/// Every snapshot generation of a changed node gets a new id; a reused subtree keeps its id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(u64);

impl NodeId {
    fn next() -> Self {
        Self(NEXT_NODE_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Addresses an entry of a node: a field of an object or an index of an array.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Key {
    Field(String),
    Index(usize),
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Field(field) => f.write_str(field),
            Key::Index(index) => write!(f, "{index}"),
        }
    }
}

impl From<&str> for Key {
    fn from(field: &str) -> Self {
        Key::Field(field.to_string())
    }
}

impl From<String> for Key {
    fn from(field: String) -> Self {
        Key::Field(field)
    }
}

impl From<&String> for Key {
    fn from(field: &String) -> Self {
        Key::Field(field.clone())
    }
}

impl From<usize> for Key {
    fn from(index: usize) -> Self {
        Key::Index(index)
    }
}

impl From<&Key> for Key {
    fn from(key: &Key) -> Self {
        key.clone()
    }
}

/// The unit of mutability for one node.
pub(crate) struct DraftCell {
    pub(crate) id: NodeId,
    pub(crate) base: Container,
    pub(crate) scapegoat: RefCell<Option<Container>>,
    /// Set once the cell has been replaced by its next snapshot.
    pub(crate) finalized: Cell<bool>,
    pub(crate) dirty: Cell<bool>,
    parent: RefCell<Weak<DraftCell>>,
    pub(crate) watch: RefCell<WatchSlot>,
    /// Debounce token for deferred commits.
    pub(crate) debounce: Cell<u64>,
}

impl DraftCell {
    pub(crate) fn new(base: Container) -> Self {
        Self {
            id: NodeId::next(),
            base,
            scapegoat: RefCell::new(None),
            finalized: Cell::new(false),
            dirty: Cell::new(false),
            parent: RefCell::new(Weak::new()),
            watch: RefCell::new(WatchSlot::default()),
            debounce: Cell::new(0),
        }
    }

    pub(crate) fn parent(&self) -> Option<Rc<DraftCell>> {
        self.parent.borrow().upgrade()
    }

    pub(crate) fn set_parent(&self, owner: &Weak<DraftCell>) {
        *self.parent.borrow_mut() = owner.clone();
    }

    pub(crate) fn clear_parent(&self) {
        *self.parent.borrow_mut() = Weak::new();
    }

    /// Whether the recorded parent is exactly `cell`.
    pub(crate) fn parent_is(&self, cell: &Rc<DraftCell>) -> bool {
        std::ptr::eq(self.parent.borrow().as_ptr(), Rc::as_ptr(cell))
    }

    /// Runs `f` on the container a read should see right now.
    pub(crate) fn view<T>(&self, f: impl FnOnce(&Container) -> T) -> T {
        if in_transaction() && !self.finalized.get() {
            if let Some(scapegoat) = self.scapegoat.borrow().as_ref() {
                return f(scapegoat);
            }
        }
        f(&self.base)
    }

    /// The working copy, created from the base on first use.
    fn draft(&self) -> RefMut<'_, Container> {
        RefMut::map(self.scapegoat.borrow_mut(), |scapegoat| {
            scapegoat.get_or_insert_with(|| self.base.clone())
        })
    }

    pub(crate) fn is_array(&self) -> bool {
        self.base.is_array()
    }

    /// Marks this cell and its ancestors dirty, queueing watched roots for commit.
    pub(crate) fn notify(self: &Rc<Self>) {
        // a replaced cell no longer feeds into any snapshot
        if self.finalized.get() {
            return;
        }
        self.dirty.set(true);
        if self.watch.borrow().is_consuming() {
            transaction::enqueue(self);
        }
        if let Some(parent) = self.parent() {
            parent.notify();
        }
    }
}

/// A handle to a tracked object or array.
///
/// Handles are cheap to clone. Equality is identity: two handles are equal if they refer to
/// the same cell, which is how structural sharing between snapshots shows up.
#[derive(Clone)]
pub struct Node(pub(crate) Rc<DraftCell>);

/// Creates a new tree from `initial`.
///
/// `initial` must be an object or an array. A tracked node is copied into a fresh,
/// independent tree; the source is left untouched.
///
/// # Example
///
/// ```
/// # use bistate::{create, value, Error};
/// let state = create(value!({ "count": 0 })).unwrap();
/// assert_eq!(state.get("count").unwrap(), 0);
///
/// assert!(matches!(create(1), Err(Error::InvalidShape { found: "number" })));
/// ```
pub fn create(initial: impl Into<Value>) -> Result<Node, Error> {
    let initial = initial.into();
    resolve::adopt(&initial).ok_or_else(|| Error::InvalidShape {
        found: initial.type_name(),
    })
}

/// Whether `value` is a tracked node. Never fails.
pub fn is_tracked(value: &Value) -> bool {
    matches!(value, Value::Node(_))
}

/// Removes a tracked node from its parent.
///
/// Returns `Ok(false)` if the node has no parent or is no longer found in it. The removal
/// goes through the normal write path, so it must happen inside a transaction.
pub fn remove(value: &Value) -> Result<bool, Error> {
    match value {
        Value::Node(node) => node.detach(),
        other => Err(Error::NotTracked {
            found: other.type_name(),
        }),
    }
}

impl Node {
    pub fn id(&self) -> NodeId {
        self.0.id
    }

    pub fn is_array(&self) -> bool {
        self.0.is_array()
    }

    pub fn is_object(&self) -> bool {
        !self.0.is_array()
    }

    /// Whether this node has no (live) parent.
    pub fn is_root(&self) -> bool {
        self.0.parent().is_none()
    }

    pub fn parent(&self) -> Option<Node> {
        self.0.parent().map(Node)
    }

    /// Whether this node can still be written (inside a transaction) and watched, that is,
    /// it hasn't been replaced by a newer snapshot yet.
    pub fn is_writable(&self) -> bool {
        !self.0.finalized.get()
    }

    /// Whether this node or one of its descendants holds uncommitted writes.
    pub fn is_dirty(&self) -> bool {
        self.0.dirty.get()
    }

    pub fn get(&self, key: impl Into<Key>) -> Option<Value> {
        let key = key.into();
        self.0.view(|c| c.get(&key).cloned())
    }

    pub fn has(&self, key: impl Into<Key>) -> bool {
        let key = key.into();
        self.0.view(|c| c.get(&key).is_some())
    }

    pub fn keys(&self) -> Vec<Key> {
        self.0.view(|c| c.keys().collect())
    }

    pub fn values(&self) -> Vec<Value> {
        self.0.view(|c| c.values().cloned().collect())
    }

    pub fn entries(&self) -> Vec<(Key, Value)> {
        self.0.view(|c| c.entries().map(|(k, v)| (k, v.clone())).collect())
    }

    pub fn len(&self) -> usize {
        self.0.view(Container::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Position of `value` in this array. Nodes are matched by identity.
    pub fn index_of(&self, value: &Value) -> Option<usize> {
        self.0.view(|c| match c {
            Container::Array(items) => items.iter().position(|item| item == value),
            Container::Object(_) => None,
        })
    }

    /// Returns a deep, untracked copy of the current view.
    pub fn to_plain(&self) -> Value {
        self.0.view(|c| match c {
            Container::Object(map) => {
                Value::Object(map.iter().map(|(k, v)| (k.clone(), v.to_plain())).collect())
            }
            Container::Array(items) => Value::Array(items.iter().map(Value::to_plain).collect()),
        })
    }

    fn ensure_writable(&self, key: &Key) -> Result<(), Error> {
        if in_transaction() && !self.0.finalized.get() {
            Ok(())
        } else {
            Err(Error::immutable_write(key))
        }
    }

    fn ensure_array(&self) -> Result<(), Error> {
        if self.is_array() {
            Ok(())
        } else {
            Err(Error::NotAnArray { id: self.id() })
        }
    }

    /// Prepares `value` for storage in this node.
    ///
    /// Plain containers are adopted into fresh cells parented to this node; nodes are
    /// stored as-is and resolved when the snapshot is computed.
    fn prepare(&self, value: Value) -> Result<Value, Error> {
        if let Value::Node(node) = &value {
            if node.reaches(self) {
                return Err(Error::Cycle { id: node.id() });
            }
        }
        Ok(resolve::adopt_into(value, &self.0))
    }

    /// Whether `target` is this node or can be reached from it through the current views.
    ///
    /// Nodes written during a transaction keep their old parent until the next snapshot, so
    /// the parent chain can't answer this; the walk follows the drafts instead.
    fn reaches(&self, target: &Node) -> bool {
        let mut seen = HashSet::<NodeId, BistateRandomState>::default();
        let mut stack = vec![self.clone()];
        while let Some(node) = stack.pop() {
            if node == *target {
                return true;
            }
            if seen.insert(node.id()) {
                node.0.view(|c| stack.extend(c.nodes().cloned()));
            }
        }
        false
    }

    /// Drops the parent link of children taken out of the draft that the next snapshot
    /// won't account for.
    ///
    /// Children of the base are released when the snapshot is computed. Children adopted
    /// during this transaction never reach the base, so they are released here unless the
    /// draft still holds them elsewhere.
    fn release(&self, removed: &[Value]) {
        for node in removed.iter().filter_map(Value::as_node) {
            if !node.0.parent_is(&self.0) || self.0.base.position(node).is_some() {
                continue;
            }
            if self.0.view(|c| c.position(node)).is_none() {
                node.0.clear_parent();
            }
        }
    }

    /// Writes `value` under `key`.
    ///
    /// # Example
    ///
    /// ```
    /// # use bistate::{create, transact, value, Error};
    /// let state = create(value!({ "count": 0 })).unwrap();
    ///
    /// // outside a transaction, snapshots are read-only
    /// assert!(matches!(state.set("count", 1), Err(Error::ImmutableWrite { .. })));
    ///
    /// transact(|| {
    ///     state.set("count", 1)?;
    ///     // writes are visible inside the same transaction
    ///     assert_eq!(state.get("count").unwrap(), 1);
    ///     Ok::<_, Error>(())
    /// })
    /// .unwrap();
    ///
    /// assert_eq!(state.get("count").unwrap(), 0);
    /// ```
    pub fn set(&self, key: impl Into<Key>, value: impl Into<Value>) -> Result<(), Error> {
        let key = key.into();
        self.ensure_writable(&key)?;
        let slot = self
            .0
            .base
            .slot(&key)
            .ok_or_else(|| Error::InvalidKey { key: key.clone() })?;
        let value = self.prepare(value.into())?;
        let replaced = self.0.draft().set(slot, value);
        self.release(replaced.as_slice());
        self.0.notify();
        Ok(())
    }

    /// Deletes the entry under `key`, returning whether it existed.
    ///
    /// Array slots are reset to `Null` rather than removed; use [`Node::splice`] to shift
    /// later items down.
    pub fn delete(&self, key: impl Into<Key>) -> Result<bool, Error> {
        let key = key.into();
        self.ensure_writable(&key)?;
        let removed = match self.0.base.slot(&key) {
            Some(slot) => self.0.draft().remove(slot),
            None => None,
        };
        let Some(removed) = removed else {
            return Ok(false);
        };
        self.release(std::slice::from_ref(&removed));
        self.0.notify();
        Ok(true)
    }

    /// Removes `delete_count` items at `start` and inserts `items` in their place,
    /// returning the removed items.
    ///
    /// `start` and `delete_count` are clamped to the array bounds.
    pub fn splice(
        &self,
        start: usize,
        delete_count: usize,
        items: impl IntoIterator<Item = Value>,
    ) -> Result<Vec<Value>, Error> {
        self.ensure_writable(&Key::Index(start))?;
        self.ensure_array()?;
        let items = items
            .into_iter()
            .map(|item| self.prepare(item))
            .collect::<Result<Vec<_>, _>>()?;
        let removed = {
            let mut draft = self.0.draft();
            let array = draft
                .as_array_mut()
                .ok_or(Error::NotAnArray { id: self.id() })?;
            let start = start.min(array.len());
            let end = start.saturating_add(delete_count).min(array.len());
            array.splice(start..end, items).collect::<Vec<_>>()
        };
        self.release(&removed);
        self.0.notify();
        Ok(removed)
    }

    /// Appends `value`, returning the new length.
    pub fn push(&self, value: impl Into<Value>) -> Result<usize, Error> {
        let value: Value = value.into();
        let len = self.len();
        self.splice(len, 0, [value])?;
        Ok(len + 1)
    }

    /// Removes and returns the last item.
    pub fn pop(&self) -> Result<Option<Value>, Error> {
        let len = self.len();
        let mut removed = self.splice(len.saturating_sub(1), 1, [])?;
        Ok(removed.pop())
    }

    /// Removes and returns the first item.
    pub fn shift(&self) -> Result<Option<Value>, Error> {
        let mut removed = self.splice(0, 1, [])?;
        Ok(removed.pop())
    }

    /// Prepends `value`, returning the new length.
    pub fn unshift(&self, value: impl Into<Value>) -> Result<usize, Error> {
        let value: Value = value.into();
        self.splice(0, 0, [value])?;
        Ok(self.len())
    }

    pub fn insert(&self, index: usize, value: impl Into<Value>) -> Result<(), Error> {
        let value: Value = value.into();
        self.splice(index, 0, [value]).map(drop)
    }

    /// Shortens the array to `len` items.
    pub fn truncate(&self, len: usize) -> Result<(), Error> {
        self.splice(len, usize::MAX, []).map(drop)
    }

    /// Removes this node from its parent; see [`remove`].
    pub fn detach(&self) -> Result<bool, Error> {
        let Some(parent) = self.parent() else {
            return Ok(false);
        };
        match parent.0.view(|c| c.position(self)) {
            Some(Key::Index(index)) if parent.is_array() => {
                parent.splice(index, 1, [])?;
                Ok(true)
            }
            Some(key) => parent.delete(key),
            None => Ok(false),
        }
    }
}

impl PartialEq for Node {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for Node {}

impl Hash for Node {
    fn hash<H: Hasher>(&self, state: &mut H) {
        Rc::as_ptr(&self.0).hash(state);
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.view(|c| match c {
            Container::Object(map) => f.debug_map().entries(map.iter()).finish(),
            Container::Array(items) => f.debug_list().entries(items.iter()).finish(),
        })
    }
}

#[cfg(feature = "serde")]
impl serde::Serialize for Node {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use serde::ser::{SerializeMap, SerializeSeq};
        self.0.view(|c| match c {
            Container::Object(map) => {
                let mut ser = serializer.serialize_map(Some(map.len()))?;
                for (k, v) in map {
                    ser.serialize_entry(k, v)?;
                }
                ser.end()
            }
            Container::Array(items) => {
                let mut ser = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    ser.serialize_element(item)?;
                }
                ser.end()
            }
        })
    }
}
