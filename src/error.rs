// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Error taxonomy surfaced by every primitive in this crate.

use thiserror::Error;

/// Errors a waiter can observe from any queued-synchronizer primitive.
#[derive(Debug, Clone, Error)]
pub enum SyncError {
    /// The primitive was disposed while this wait was pending, or after.
    #[error("synchronizer `{0}` was disposed")]
    Disposed(&'static str),

    /// The wait was cancelled through a [`crate::cancel::CancellationToken`].
    #[error("wait was cancelled")]
    Canceled,

    /// The wait exceeded its deadline and `throw_on_timeout` was set.
    #[error("wait timed out")]
    Timeout,

    /// The primitive enforces a bounded queue and it was full.
    #[error("concurrency limit reached")]
    ConcurrencyLimitReached,

    /// A negative, non-infinite timeout was supplied.
    #[error("invalid timeout")]
    InvalidTimeout,

    /// A linked cancellation wait was explicitly interrupted.
    #[error("wait was interrupted")]
    Interrupted,
}

/// Convenience alias used throughout the crate's public API.
pub type SyncResult<T> = Result<T, SyncError>;
