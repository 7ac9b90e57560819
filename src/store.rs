// (c) Copyright 2025 Helsing GmbH. All rights reserved.
//! A store that follows one tree across snapshots.
//!
//! A root can only carry one watcher, and that watcher is gone once the root is replaced.
//! [`Store`] owns the watcher of the current snapshot, re-watches every snapshot it receives
//! and fans each one out to any number of listeners.
use crate::{Error, Node, Value, create, watch};
use std::{
    cell::{Cell, RefCell},
    fmt,
    rc::{Rc, Weak},
};
use tracing::{trace, warn};

type Listener = Rc<dyn Fn(&Node)>;

struct StoreInner {
    current: RefCell<Node>,
    listeners: RefCell<Vec<(u64, Listener)>>,
    next_id: Cell<u64>,
}

impl StoreInner {
    fn is_subscribed(&self, id: u64) -> bool {
        self.listeners.borrow().iter().any(|(other, _)| *other == id)
    }
}

/// Holds the current snapshot of a tree and notifies listeners about new ones.
///
/// Cloning a `Store` creates a new handle to the same store.
///
/// # Example
///
/// ```
/// # use bistate::{transact, value, Store};
/// # use std::{cell::RefCell, rc::Rc};
/// let store = Store::new(value!({ "count": 1 })).unwrap();
/// let seen = Rc::new(RefCell::new(Vec::new()));
///
/// let sink = Rc::clone(&seen);
/// store.subscribe(move |next| sink.borrow_mut().push(next.get("count").unwrap()));
///
/// for _ in 0..3 {
///     transact(|| {
///         let state = store.get_state();
///         let count = state.get("count").and_then(|c| c.as_i64()).unwrap();
///         state.set("count", count + 1)
///     })
///     .unwrap();
/// }
///
/// assert_eq!(*seen.borrow(), [2, 3, 4]);
/// assert_eq!(store.get_state().get("count").unwrap(), 4);
/// ```
#[derive(Clone)]
pub struct Store {
    inner: Rc<StoreInner>,
}

impl Store {
    /// Creates a tree from `initial` and starts following it.
    ///
    /// Fails like [`create`] does.
    pub fn new(initial: impl Into<Value>) -> Result<Self, Error> {
        let inner = Rc::new(StoreInner {
            current: RefCell::new(create(initial)?),
            listeners: RefCell::new(Vec::new()),
            next_id: Cell::new(0),
        });
        follow(&inner)?;
        Ok(Self { inner })
    }

    /// The latest committed snapshot.
    pub fn get_state(&self) -> Node {
        self.inner.current.borrow().clone()
    }

    /// Registers `listener`, called with every new snapshot.
    ///
    /// Listeners are called in registration order, after the store has switched to the new
    /// snapshot. A listener removed while others are being notified is skipped for that round.
    pub fn subscribe(&self, listener: impl Fn(&Node) + 'static) -> Subscription {
        let id = self.inner.next_id.get();
        self.inner.next_id.set(id + 1);
        self.inner
            .listeners
            .borrow_mut()
            .push((id, Rc::new(listener)));
        Subscription {
            store: Rc::downgrade(&self.inner),
            id,
        }
    }

    /// Locks the current snapshot; see [`lock`](crate::lock).
    pub fn lock(&self, on_locked: impl FnMut() + 'static) {
        crate::lock(&self.get_state(), on_locked);
    }

    /// Unlocks the current snapshot; see [`unlock`](crate::unlock).
    pub fn unlock(&self) {
        crate::unlock(&self.get_state());
    }
}

impl fmt::Debug for Store {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store")
            .field("current", &self.inner.current.borrow())
            .field("listeners", &self.inner.listeners.borrow().len())
            .finish()
    }
}

fn follow(inner: &Rc<StoreInner>) -> Result<(), Error> {
    let store = Rc::downgrade(inner);
    let current = inner.current.borrow().clone();
    watch(&current, move |_, next| {
        if let Some(inner) = store.upgrade() {
            publish(&inner, next);
        }
    })?;
    Ok(())
}

fn publish(inner: &Rc<StoreInner>, next: &Node) {
    *inner.current.borrow_mut() = next.clone();
    if let Err(error) = follow(inner) {
        warn!(%error, id = %next.id(), "store can not follow its new snapshot");
    }

    let listeners = inner.listeners.borrow().clone();
    trace!(id = %next.id(), listeners = listeners.len(), "publishing snapshot");
    for (id, listener) in listeners {
        if inner.is_subscribed(id) {
            listener(next);
        }
    }
}

/// Handle returned by [`Store::subscribe`].
///
/// Dropping it keeps the listener registered.
#[derive(Debug)]
pub struct Subscription {
    store: Weak<StoreInner>,
    id: u64,
}

impl Subscription {
    /// Removes the listener. Has no effect if the store is gone.
    pub fn unsubscribe(self) {
        if let Some(inner) = self.store.upgrade() {
            inner.listeners.borrow_mut().retain(|(id, _)| *id != self.id);
        }
    }
}
