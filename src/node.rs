// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! The wait node: a [`CompletionSource`] plus the metadata the engine needs
//! while it sits in a [`crate::queue::WaitQueue`].

use crate::completion::CompletionSource;

/// What a wait should produce when its deadline passes and
/// `throw_on_timeout` is `false`. Types with no sensible "nothing happened"
/// value (e.g. a correlation source's arbitrary payload) fall back to
/// [`crate::error::SyncError::Timeout`] regardless of the flag.
pub(crate) trait TimeoutFallback: Sized {
    fn timeout_fallback() -> Option<Self> {
        None
    }
}

impl TimeoutFallback for bool {
    fn timeout_fallback() -> Option<Self> {
        Some(false)
    }
}

/// An intrusive queue element. While linked, it is owned by exactly one
/// [`crate::queue::WaitQueue`]; once detached it is either returned to a
/// [`crate::pool::Pool`] or dropped.
pub(crate) struct WaitNode<T> {
    pub(crate) cs: CompletionSource<T>,
    /// Whether a timeout should complete this wait with
    /// [`crate::error::SyncError::Timeout`] (`true`) or a plain `false`
    /// success value (`false`). Set per-call from the
    /// [`crate::builder::WaitBuilder`] that created this node.
    pub(crate) throw_on_timeout: bool,
    /// Static call-site tag, surfaced through `tracing` spans for
    /// diagnosing a stuck waiter. Not exposed publicly.
    pub(crate) caller_info: &'static str,
}

impl<T> WaitNode<T> {
    pub(crate) fn new(throw_on_timeout: bool, caller_info: &'static str) -> Self {
        Self::with_version(0, throw_on_timeout, caller_info)
    }

    pub(crate) fn with_version(version: u16, throw_on_timeout: bool, caller_info: &'static str) -> Self {
        Self {
            cs: CompletionSource::with_version(version),
            throw_on_timeout,
            caller_info,
        }
    }

    /// Stamp a pooled, already-reset node with the metadata for its next
    /// wait. The completion source itself was reset by
    /// [`crate::pool::Pool::give_back`] when the node was returned.
    pub(crate) fn set_meta(&mut self, throw_on_timeout: bool, caller_info: &'static str) {
        self.throw_on_timeout = throw_on_timeout;
        self.caller_info = caller_info;
    }
}
