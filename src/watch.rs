// (c) Copyright 2025 Helsing GmbH. All rights reserved.
//! Watching roots for new snapshots.
//!
//! A root carries at most one watcher. When a transaction that wrote to the root closes, the
//! root is recomputed and the watcher receives `(previous, next)`. Computing retires the
//! previous snapshot together with its watcher, so a watcher fires at most once; observers
//! that want to follow a tree across snapshots re-watch `next` (which is what
//! [`Store`](crate::Store) does).
//!
//! A root can also be *locked*. While locked, a commit doesn't recompute the root. Instead the
//! lock callback is told that an update is waiting, and [`unlock`] delivers it.
use crate::{
    Error,
    node::{DraftCell, Node},
    resolve,
};
use std::rc::{Rc, Weak};
use tracing::trace;

type Watcher = Box<dyn FnOnce(&Node, &Node)>;

/// The watch/lock state of one cell.
#[derive(Default)]
pub(crate) struct WatchSlot {
    watcher: Option<(u64, Watcher)>,
    /// Whether writes below this root should queue it for commit.
    consuming: bool,
    locked: bool,
    on_locked: Option<Box<dyn FnMut()>>,
    next_token: u64,
}

impl WatchSlot {
    pub(crate) fn is_consuming(&self) -> bool {
        self.consuming
    }

    /// Drops the watcher and lock callback of a replaced cell.
    pub(crate) fn retire(&mut self) {
        *self = WatchSlot {
            next_token: self.next_token,
            ..WatchSlot::default()
        };
    }
}

/// Registers the watcher of a root.
///
/// If the root already holds uncommitted writes (for example from a transaction that closed
/// before anybody watched it), the watcher fires right away.
///
/// # Errors
///
/// - [`Error::DoubleWatch`] if the root is already watched.
/// - [`Error::NotWatchable`] if the node has already been replaced by a newer snapshot.
/// - [`Error::NonRootWatch`] if the node has a parent.
pub fn watch(node: &Node, watcher: impl FnOnce(&Node, &Node) + 'static) -> Result<Unwatch, Error> {
    let cell = &node.0;
    let token = {
        let mut slot = cell.watch.borrow_mut();
        if slot.watcher.is_some() {
            return Err(Error::DoubleWatch);
        }
        if cell.finalized.get() {
            return Err(Error::NotWatchable);
        }
        if cell.parent().is_some() {
            return Err(Error::NonRootWatch);
        }
        slot.next_token += 1;
        let token = slot.next_token;
        slot.watcher = Some((token, Box::new(watcher)));
        slot.consuming = true;
        token
    };
    trace!(id = %cell.id, "watching root");
    if cell.dirty.get() {
        trigger(cell);
    }
    Ok(Unwatch {
        cell: Rc::downgrade(cell),
        token,
    })
}

/// Handle returned by [`watch`].
///
/// Dropping it keeps the watcher registered.
#[derive(Debug)]
pub struct Unwatch {
    cell: Weak<DraftCell>,
    token: u64,
}

impl Unwatch {
    /// Removes the watcher, unless it already fired or was replaced.
    pub fn unwatch(self) {
        let Some(cell) = self.cell.upgrade() else {
            return;
        };
        let removed = {
            let mut slot = cell.watch.borrow_mut();
            if slot
                .watcher
                .as_ref()
                .is_some_and(|(token, _)| *token == self.token)
            {
                slot.consuming = false;
                slot.watcher.take()
            } else {
                None
            }
        };
        drop(removed);
    }
}

/// Suspends watcher delivery for `node`.
///
/// Every commit that would have recomputed the root calls `on_locked` instead; the writes stay
/// pending on the root. Locking again replaces the callback.
pub fn lock(node: &Node, on_locked: impl FnMut() + 'static) {
    let mut slot = node.0.watch.borrow_mut();
    slot.locked = true;
    slot.on_locked = Some(Box::new(on_locked));
}

/// Lifts a [`lock`] and delivers a held-back update, if any.
pub fn unlock(node: &Node) {
    let callback = {
        let mut slot = node.0.watch.borrow_mut();
        slot.locked = false;
        slot.on_locked.take()
    };
    drop(callback);
    if node.0.dirty.get() {
        trigger(&node.0);
    }
}

/// Recomputes a watched root and hands the result to its watcher.
///
/// Roots without a watcher are left alone; their writes stay pending until somebody watches
/// them.
pub(crate) fn trigger(cell: &Rc<DraftCell>) {
    let mut slot = cell.watch.borrow_mut();
    if slot.locked {
        let Some(mut on_locked) = slot.on_locked.take() else {
            return;
        };
        drop(slot);
        trace!(id = %cell.id, "root is locked, deferring to lock callback");
        on_locked();
        let mut slot = cell.watch.borrow_mut();
        if slot.locked && slot.on_locked.is_none() {
            slot.on_locked = Some(on_locked);
        }
        return;
    }
    let Some((token, watcher)) = slot.watcher.take() else {
        return;
    };
    drop(slot);

    let previous = Node(Rc::clone(cell));
    let next = resolve::compute(cell);
    if next == previous {
        cell.watch.borrow_mut().watcher = Some((token, watcher));
        return;
    }
    trace!(from = %previous.id(), to = %next.id(), "firing watcher");
    watcher(&previous, &next);
}
