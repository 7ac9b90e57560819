// (c) Copyright 2025 Helsing GmbH. All rights reserved.
//! # Bistate: a copy-on-write, structurally shared tree store
//!
//! This crate lets you treat a nested object/array graph as an immutable snapshot, batch a
//! sequence of in-place-looking writes inside a transaction, and receive a brand-new
//! immutable snapshot once the transaction closes. The new snapshot reuses every subtree
//! that was not touched, directly or transitively, and rebuilds only the ones that were.
//!
//! ## Core Concepts
//!
//! - [`Node`]: the handle for one object or array in a tree. Two handles are `==` when they
//!   point at the same cell, which is how structural sharing is observed.
//! - [`Value`]: what a slot holds. Leaves (numbers, strings, [`Atomic`] payloads) are stored
//!   as-is; plain [`Value::Object`]/[`Value::Array`] inputs are adopted into fresh nodes on
//!   write.
//! - [`transact`]: opens a (re-entrant) transaction. Writes are only legal inside one. When
//!   the outermost call returns, every watched root that was written is recomputed once and
//!   its watcher fires with `(previous, next)`.
//! - [`watch`]: registers the single watcher of a root.
//! - [`Store`]: wraps a root, follows it across snapshots and fans changes out to any number
//!   of listeners.
//!
//! ## Snapshots and drafts
//!
//! Every node keeps a *base* (the committed values) and, once written, a *scapegoat* (the
//! working copy). Reads inside a transaction see the scapegoat, reads outside see the base.
//! Committing a root computes the next snapshot from the scapegoats: a clean subtree is
//! handed over unchanged, a dirty one is rebuilt, and the replaced node becomes read-only.
//!
//! ```rust
//! use bistate::{transact, watch, value};
//! use std::{cell::RefCell, rc::Rc};
//!
//! let state = bistate::create(value!({ "a": { "v": 1 }, "b": { "v": 2 } })).unwrap();
//! let seen = Rc::new(RefCell::new(None));
//!
//! let sink = Rc::clone(&seen);
//! watch(&state, move |_previous, next| *sink.borrow_mut() = Some(next.clone())).unwrap();
//!
//! transact(|| {
//!     let a = state.get("a").and_then(|a| a.into_node()).unwrap();
//!     a.set("v", 10)
//! })
//! .unwrap();
//!
//! let next = seen.borrow_mut().take().unwrap();
//! assert_ne!(next, state);
//! // `b` was not touched, so it is shared between both snapshots.
//! assert_eq!(next.get("b"), state.get("b"));
//! // the old snapshot never changes
//! assert_eq!(state.get("a").unwrap().into_node().unwrap().get("v").unwrap(), 1);
//! ```
//!
//! ## Threading
//!
//! Trees are single-threaded: nodes are reference counted and the transaction coordinator
//! is thread-local. Independent threads get independent coordinators.
//!
//! ## Features
//!
//! - `json`: conversions to and from `serde_json::Value`. Enabled by default.
//! - `serde`: `serde::Serialize` for [`Value`] and [`Node`].
#[cfg(test)]
#[macro_use(quickcheck)]
extern crate quickcheck_macros;

use ahash::RandomState;
use std::{
    hash::BuildHasher,
    sync::atomic::{AtomicBool, Ordering},
};

// Use a constant seed for hashing to make performance benchmarks have less variance.
pub(crate) const DETERMINISTIC_HASHER: RandomState = RandomState::with_seeds(48, 1516, 23, 42);

mod either;
mod error;
pub use error::Error;
pub mod node;
pub use node::{Key, Map, Node, NodeId, create, is_tracked, remove};
mod resolve;
pub mod store;
pub use store::{Store, Subscription};
pub mod transaction;
pub use transaction::{flush_deferred, in_transaction, transact, transact_deferred};
pub mod value;
pub use value::{Atomic, Value};
pub mod watch;
pub use watch::{Unwatch, lock, unlock, watch};
#[cfg(feature = "json")]
mod json;
/// Macros usable for tests and initialization
pub mod macros;

static ENABLE_DETERMINISM: AtomicBool = AtomicBool::new(false);

/// Makes object key hashing deterministic.
///
/// This should only be enabled for testing and benchmarking, as it increases the odds of
/// DoS scenarios.
#[doc(hidden)]
pub fn enable_determinism() {
    ENABLE_DETERMINISM.store(true, Ordering::Release);
}

/// Checks if determinism is enabled.
#[doc(hidden)]
pub fn determinism_enabled() -> bool {
    ENABLE_DETERMINISM.load(Ordering::Acquire)
}

#[inline]
fn make_random_state() -> RandomState {
    if determinism_enabled() {
        DETERMINISTIC_HASHER
    } else {
        RandomState::new()
    }
}

/// The hasher used by object nodes.
///
/// A small wrapper around ahash's `RandomState` that switches to a fixed seed once
/// [`enable_determinism`] has been called.
#[derive(Clone)]
pub struct BistateRandomState {
    inner: RandomState,
}

impl Default for BistateRandomState {
    #[inline]
    fn default() -> Self {
        Self {
            inner: make_random_state(),
        }
    }
}

impl BuildHasher for BistateRandomState {
    type Hasher = <RandomState as BuildHasher>::Hasher;

    #[inline]
    fn build_hasher(&self) -> Self::Hasher {
        self.inner.build_hasher()
    }
}
