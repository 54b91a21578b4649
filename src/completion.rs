// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Completion source: a single-consumer, single-shot result slot with a
//! version token that detects stale completions from a reused, pooled node.

use std::task::Waker;

use crate::error::SyncError;

/// The three terminal shapes a completion source can settle into.
#[derive(Debug, Clone)]
pub(crate) enum Outcome<T> {
    Success(T),
    Failure(SyncError),
    Canceled,
}

impl<T> Outcome<T> {
    /// Convert into the `Result<T, SyncError>` surfaced to callers.
    pub(crate) fn into_result(self) -> Result<T, SyncError> {
        match self {
            Outcome::Success(val) => Ok(val),
            Outcome::Failure(err) => Err(err),
            Outcome::Canceled => Err(SyncError::Canceled),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Status {
    Pending,
    Completed,
}

/// Single-shot result slot. Not `Clone`; owned by exactly one [`crate::node::WaitNode`].
#[derive(Debug)]
pub(crate) struct CompletionSource<T> {
    status: Status,
    result: Option<Outcome<T>>,
    version: u16,
    waker: Option<Waker>,
}

impl<T> CompletionSource<T> {
    /// A freshly allocated source starts `pending` at version 0.
    pub(crate) fn new() -> Self {
        Self::with_version(0)
    }

    /// Like [`Self::new`], but seeded with `version`. The pool hands out a
    /// distinct starting version per fresh allocation so that two brand-new
    /// nodes can never carry the version a stale, still-in-flight timer or
    /// cancellation callback is holding, even if they land in the same
    /// reused queue slot.
    pub(crate) fn with_version(version: u16) -> Self {
        Self {
            status: Status::Pending,
            result: None,
            version,
            waker: None,
        }
    }

    pub(crate) fn version(&self) -> u16 {
        self.version
    }

    pub(crate) fn is_pending(&self) -> bool {
        self.status == Status::Pending
    }

    /// Transition completed -> pending, clearing result and waker.
    ///
    /// Panics if still pending: resetting a source someone may still be
    /// observing is an internal consistency error ("internal
    /// consistency errors are unrecoverable programming errors"). Callers
    /// (the node [`crate::pool::Pool`]) check `is_pending()` first and drop
    /// rather than pool a node that somehow wasn't completed.
    pub(crate) fn reset(&mut self) -> u16 {
        assert_eq!(
            self.status,
            Status::Completed,
            "reset() called on a completion source that is still pending"
        );
        self.status = Status::Pending;
        self.result = None;
        self.waker = None;
        self.version = self.version.wrapping_add(1);
        self.version
    }

    /// Attempt to complete with `result`, guarded by `version`.
    ///
    /// Returns `true` if this call won the race and the result was stored
    /// (and the registered waker, if any, is returned to be woken by the
    /// caller *outside* the primitive mutex). Returns `false` if the source
    /// was already completed or `version` is stale.
    pub(crate) fn try_complete(&mut self, version: u16, result: Outcome<T>) -> Option<Waker> {
        if self.status != Status::Pending || version != self.version {
            return None;
        }
        self.status = Status::Completed;
        self.result = Some(result);
        self.waker.take()
    }

    /// Register the waker that should be woken on completion. Called while
    /// polling a `Pending` source. Replaces any previously registered waker
    /// (the last poll's waker is the one that must fire, per the `Future`
    /// contract).
    pub(crate) fn register_waker(&mut self, waker: &Waker) {
        match &mut self.waker {
            Some(existing) if existing.will_wake(waker) => {}
            _ => self.waker = Some(waker.clone()),
        }
    }

    /// Take the stored result. Panics if not completed; callers must check
    /// `status` (or go through the node's `poll`) first.
    pub(crate) fn take_result(&mut self) -> Outcome<T> {
        self.result
            .take()
            .expect("take_result() called before completion")
    }
}
