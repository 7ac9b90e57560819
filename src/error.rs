// (c) Copyright 2025 Helsing GmbH. All rights reserved.
//! Errors raised by bistate operations.
//!
//! Every variant is a contract violation reported at the call that caused it. Nothing in
//! this crate retries or recovers; callers should treat these as programming errors.

use crate::node::{Key, NodeId};
use thiserror::Error;

/// Errors that can occur while building, mutating or observing a bistate tree.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// A tree can only be created from an object or an array.
    #[error("expected initial state to be an object or array, but got {found}")]
    InvalidShape {
        /// Type name of the rejected value.
        found: &'static str,
    },

    /// A write or delete was attempted outside a transaction, or on a finalized snapshot.
    #[error("state is immutable, it is not allowed to write `{key}`")]
    ImmutableWrite {
        /// The key that was being written.
        key: Key,
    },

    /// The root already carries a watcher.
    #[error("a bistate root can not be watched twice")]
    DoubleWatch,

    /// Only roots (cells without a parent) can be watched.
    #[error("only a root node can be watched")]
    NonRootWatch,

    /// The snapshot has already been replaced by a newer one.
    #[error("current state is immutable, it can not be watched now")]
    NotWatchable,

    /// The operation requires a tracked node.
    #[error("expected a tracked node, but received {found}")]
    NotTracked {
        /// Type name of the rejected value.
        found: &'static str,
    },

    /// An array operation was used on an object node.
    #[error("node {id} is not an array")]
    NotAnArray {
        /// The object node.
        id: NodeId,
    },

    /// A node was written into itself, or into a node it already contains.
    #[error("node {id} can not be written into itself or a node it contains")]
    Cycle {
        /// The node being written.
        id: NodeId,
    },

    /// The key does not address a slot of this node kind.
    #[error("key `{key}` does not address an array slot")]
    InvalidKey {
        /// The rejected key.
        key: Key,
    },
}

impl Error {
    #[inline]
    pub(crate) fn immutable_write(key: impl Into<Key>) -> Self {
        Error::ImmutableWrite { key: key.into() }
    }
}
