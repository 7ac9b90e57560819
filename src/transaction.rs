// (c) Copyright 2025 Helsing GmbH. All rights reserved.
//! Transactions: batching writes and committing new snapshots.
//!
//! Writes are only accepted while a transaction is open. Transactions are re-entrant: a
//! [`transact`] call inside another one just extends the open scope, and only the outermost
//! call commits. Committing recomputes every watched root that was written, in the order the
//! roots were first written, and fires each root's watcher once with `(previous, next)`.
//!
//! Watchers run after the scope has closed, so a watcher can't write to either snapshot
//! unless it opens a transaction of its own.
//!
//! # Deferred commits
//!
//! [`transact_deferred`] batches the same way but doesn't commit on exit. Each written root
//! instead gets a commit task queued with the root's current debounce token, and
//! [`flush_deferred`] later runs the tasks whose token is still current. Writing the same root
//! again, deferred or explicitly, bumps the token and supersedes the earlier task. An explicit
//! commit therefore always wins over a deferred one that is still queued.
//!
//! # State
//!
//! The coordinator is thread-local. Trees must not be shared between threads (they are
//! `!Send`), so every tree sees exactly one coordinator.
use crate::{node::DraftCell, watch};
use smallvec::SmallVec;
use std::{cell::RefCell, rc::Rc};
use tracing::debug;

mod deferred;
pub use deferred::flush_deferred;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Idle,
    Explicit,
    Deferred,
}

struct Coordinator {
    mode: Mode,
    /// Watched roots written in the open scope, in order of first write.
    pending: SmallVec<[Rc<DraftCell>; 4]>,
}

thread_local! {
    static COORDINATOR: RefCell<Coordinator> = RefCell::new(Coordinator {
        mode: Mode::Idle,
        pending: SmallVec::new(),
    });
}

/// Restores the outer mode when a scope ends, including by unwinding.
struct Scope {
    outer: Mode,
}

impl Scope {
    /// Opens a scope. Nested scopes keep the mode of the outermost one.
    fn enter(mode: Mode) -> (Self, Mode) {
        COORDINATOR.with_borrow_mut(|coordinator| {
            let outer = coordinator.mode;
            if outer == Mode::Idle {
                coordinator.mode = mode;
            }
            (Scope { outer }, coordinator.mode)
        })
    }

    fn is_outermost(&self) -> bool {
        self.outer == Mode::Idle
    }
}

impl Drop for Scope {
    fn drop(&mut self) {
        COORDINATOR.with_borrow_mut(|coordinator| coordinator.mode = self.outer);
    }
}

/// Runs `work` inside a transaction and returns its result.
///
/// When the outermost transaction returns, every watched root written inside it is
/// recomputed and its watcher fires. A panic in `work` closes the scope without committing;
/// the writes stay pending and are committed by the next transaction.
///
/// `R: Unpin` rejects `async` blocks: the set of written roots has to be known when the
/// scope closes, so a transaction can't return a future that writes later.
///
/// ```
/// # use bistate::{create, transact, value, watch, Error};
/// # use std::{cell::Cell, rc::Rc};
/// let state = create(value!({ "a": 0, "b": 0 })).unwrap();
/// let fired = Rc::new(Cell::new(0));
/// let counter = Rc::clone(&fired);
/// watch(&state, move |_, _| counter.set(counter.get() + 1)).unwrap();
///
/// let sum = transact(|| {
///     state.set("a", 1)?;
///     transact(|| state.set("b", 2))?;
///     Ok::<_, Error>(3)
/// })
/// .unwrap();
///
/// assert_eq!(sum, 3);
/// assert_eq!(fired.get(), 1);
/// ```
pub fn transact<F, R>(work: F) -> R
where
    F: FnOnce() -> R,
    R: Unpin,
{
    run(Mode::Explicit, work)
}

/// Like [`transact`], but queues the commit for [`flush_deferred`] instead of running it.
///
/// Nested inside an explicit transaction, this behaves like [`transact`].
pub fn transact_deferred<F, R>(work: F) -> R
where
    F: FnOnce() -> R,
    R: Unpin,
{
    run(Mode::Deferred, work)
}

/// Whether a transaction is open on this thread.
pub fn in_transaction() -> bool {
    COORDINATOR.with_borrow(|coordinator| coordinator.mode != Mode::Idle)
}

fn run<F, R>(mode: Mode, work: F) -> R
where
    F: FnOnce() -> R,
{
    let (scope, effective) = Scope::enter(mode);
    let result = work();
    let outermost = scope.is_outermost();
    drop(scope);
    if outermost {
        let roots = drain();
        match effective {
            Mode::Explicit => commit(roots),
            Mode::Deferred => deferred::schedule(roots),
            Mode::Idle => unreachable!("an open scope is never idle"),
        }
    }
    result
}

/// Queues a watched root for commit, once per batch.
pub(crate) fn enqueue(cell: &Rc<DraftCell>) {
    COORDINATOR.with_borrow_mut(|coordinator| {
        if !coordinator.pending.iter().any(|root| Rc::ptr_eq(root, cell)) {
            coordinator.pending.push(Rc::clone(cell));
        }
    });
}

fn drain() -> SmallVec<[Rc<DraftCell>; 4]> {
    COORDINATOR.with_borrow_mut(|coordinator| std::mem::take(&mut coordinator.pending))
}

/// Moves a root's debounce token forward, invalidating queued deferred commits.
fn bump(cell: &DraftCell) -> u64 {
    let token = cell.debounce.get().wrapping_add(1);
    cell.debounce.set(token);
    token
}

fn commit(roots: SmallVec<[Rc<DraftCell>; 4]>) {
    if roots.is_empty() {
        return;
    }
    debug!(roots = roots.len(), "committing transaction");
    for root in roots {
        bump(&root);
        watch::trigger(&root);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Error, Node, create, value, watch};
    use std::{cell::Cell, panic};

    #[test]
    fn scopes_nest_and_restore() {
        assert!(!in_transaction());
        transact(|| {
            assert!(in_transaction());
            transact(|| assert!(in_transaction()));
            assert!(in_transaction());
        });
        assert!(!in_transaction());
    }

    #[test]
    fn nested_transactions_return_values() {
        let total = transact(|| transact(|| 1) + transact(|| 2));
        assert_eq!(total, 3);
    }

    #[test]
    fn nested_deferred_scopes_keep_the_outer_mode() {
        let state = create(value!({ "count": 0 })).unwrap();
        let fired = Rc::new(Cell::new(false));
        let flag = Rc::clone(&fired);
        watch(&state, move |_, _| flag.set(true)).unwrap();
        transact(|| transact_deferred(|| state.set("count", 1))).unwrap();
        assert!(fired.get());
        assert_eq!(flush_deferred(), 0);
    }

    #[test]
    fn a_panic_closes_the_scope_without_committing() {
        let state = create(value!({ "count": 0 })).unwrap();
        let next = Rc::new(RefCell::new(None::<Node>));
        let sink = Rc::clone(&next);
        watch(&state, move |_, n| *sink.borrow_mut() = Some(n.clone())).unwrap();

        let outcome = panic::catch_unwind(panic::AssertUnwindSafe(|| {
            transact(|| {
                state.set("count", 1).unwrap();
                panic!("boom");
            })
        }));
        assert!(outcome.is_err());
        assert!(!in_transaction());
        assert!(next.borrow().is_none());
        assert!(state.is_writable());

        // the next transaction picks up the pending write
        transact(|| state.set("other", true)).unwrap();
        let next = next.borrow_mut().take().unwrap();
        assert_eq!(next.get("count").unwrap(), 1);
        assert_eq!(next.get("other").unwrap(), true);
    }

    #[test]
    fn failed_writes_do_not_commit() {
        let list = create(value!([])).unwrap();
        let fired = Rc::new(Cell::new(false));
        let flag = Rc::clone(&fired);
        watch(&list, move |_, _| flag.set(true)).unwrap();
        let result = transact(|| list.set("length", 0));
        assert!(matches!(result, Err(Error::InvalidKey { .. })));
        assert!(!fired.get());
    }
}
