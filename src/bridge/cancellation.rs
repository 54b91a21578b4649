// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Link several independent cancellation tokens into one: the linked token
//! cancels the moment any parent does, and records which one got there
//! first with a single atomic compare-exchange — "first-writer-wins",
//! the same race-resolution shape as
//! [`crate::completion::CompletionSource::try_complete`], just tracking an
//! index instead of a result.

use std::sync::atomic::{AtomicIsize, Ordering};
use std::sync::Arc;

use crate::cancel::{CancellationToken, CancellationTokenSource};
use crate::error::{SyncError, SyncResult};

/// Owns a child [`CancellationToken`] that cancels as soon as any of the
/// parent tokens given to [`Self::new`] does.
pub struct LinkedCancellationSource {
    child: CancellationTokenSource,
    origin: Arc<AtomicIsize>,
}

const NO_ORIGIN: isize = -1;

impl LinkedCancellationSource {
    pub fn new(parents: &[CancellationToken]) -> Self {
        let child = CancellationTokenSource::new();
        let origin = Arc::new(AtomicIsize::new(NO_ORIGIN));

        for (index, parent) in parents.iter().enumerate() {
            if !parent.is_cancelable() {
                continue;
            }
            let child_for_parent = child.clone();
            let origin_for_parent = Arc::clone(&origin);
            parent.register_callback(Box::new(move || {
                let _ = origin_for_parent.compare_exchange(
                    NO_ORIGIN,
                    index as isize,
                    Ordering::SeqCst,
                    Ordering::SeqCst,
                );
                child_for_parent.cancel();
            }));
        }

        Self { child, origin }
    }

    pub fn token(&self) -> CancellationToken {
        self.child.token()
    }

    /// Cancel the linked token directly, independent of any parent.
    pub fn cancel(&self) {
        self.child.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.child.is_cancelled()
    }

    /// Index into the `parents` slice of whichever token cancelled first.
    /// `None` if nothing has cancelled yet, or if [`Self::cancel`] was
    /// called directly rather than through a parent.
    pub fn origin_index(&self) -> Option<usize> {
        match self.origin.load(Ordering::SeqCst) {
            NO_ORIGIN => None,
            index => Some(index as usize),
        }
    }
}

/// Wait for `token` to be cancelled, bridged into this crate's `SyncResult`
/// shape. `complete_as_canceled` picks which result a cancellation produces:
/// `true` surfaces [`SyncError::Canceled`], `false` resolves `Ok(())` — the
/// same token wait either way, just read as success or failure depending on
/// what the caller is using the token for.
///
/// Fast-paths a token that can never cancel (resolves `Ok(())` immediately
/// rather than waiting forever) and one that's already cancelled (resolves
/// without registering a callback).
pub async fn wait_for_cancellation(token: &CancellationToken, complete_as_canceled: bool) -> SyncResult<()> {
    if !token.is_cancelable() {
        return Ok(());
    }
    if !token.is_cancelled() {
        token.cancelled().await;
    }
    if complete_as_canceled {
        Err(SyncError::Canceled)
    } else {
        Ok(())
    }
}

/// Race several cancellation tokens and report which one cancels first, as
/// an index into `tokens`. `None` if every token given is
/// [`CancellationToken::none`] (none of them can ever cancel). Built
/// directly on [`LinkedCancellationSource`], which already does the
/// first-writer-wins bookkeeping this needs.
pub async fn wait_any_cancelled(tokens: &[CancellationToken]) -> Option<usize> {
    if !tokens.iter().any(CancellationToken::is_cancelable) {
        return None;
    }
    let linked = LinkedCancellationSource::new(tokens);
    linked.token().cancelled().await;
    linked.origin_index()
}
