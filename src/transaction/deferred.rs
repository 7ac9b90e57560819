// (c) Copyright 2025 Helsing GmbH. All rights reserved.
use super::{bump, in_transaction};
use crate::{node::DraftCell, watch};
use std::{
    cell::RefCell,
    collections::VecDeque,
    rc::{Rc, Weak},
};
use tracing::debug;

/// A queued commit of one root, valid while the root's debounce token still equals `token`.
struct Task {
    root: Weak<DraftCell>,
    token: u64,
}

thread_local! {
    static QUEUE: RefCell<VecDeque<Task>> = RefCell::new(VecDeque::new());
}

pub(super) fn schedule(roots: impl IntoIterator<Item = Rc<DraftCell>>) {
    QUEUE.with_borrow_mut(|queue| {
        for root in roots {
            let token = bump(&root);
            queue.push_back(Task {
                root: Rc::downgrade(&root),
                token,
            });
        }
    });
}

/// Runs the queued deferred commits, returning how many of them were still current.
///
/// Tasks superseded by a later write to the same root are discarded, as are tasks whose root
/// has been dropped. Commits scheduled while flushing run in the same call. Does nothing when
/// called inside a transaction.
///
/// ```
/// # use bistate::{create, flush_deferred, transact_deferred, value, watch};
/// # use std::{cell::Cell, rc::Rc};
/// let state = create(value!({ "count": 0 })).unwrap();
/// let fired = Rc::new(Cell::new(0));
/// let counter = Rc::clone(&fired);
/// watch(&state, move |_, next| counter.set(next.get("count").unwrap().as_i64().unwrap()))
///     .unwrap();
///
/// transact_deferred(|| state.set("count", 1)).unwrap();
/// transact_deferred(|| state.set("count", 2)).unwrap();
/// assert_eq!(fired.get(), 0);
///
/// // only the second commit is still current
/// assert_eq!(flush_deferred(), 1);
/// assert_eq!(fired.get(), 2);
/// ```
pub fn flush_deferred() -> usize {
    if in_transaction() {
        return 0;
    }
    let mut ran = 0;
    while let Some(task) = QUEUE.with_borrow_mut(VecDeque::pop_front) {
        let Some(root) = task.root.upgrade() else {
            continue;
        };
        if root.debounce.get() != task.token {
            debug!(id = %root.id, token = task.token, "discarding superseded deferred commit");
            continue;
        }
        ran += 1;
        watch::trigger(&root);
    }
    ran
}
