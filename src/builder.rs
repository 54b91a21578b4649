// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! The per-call wait request: timeout, cancellation, and the
//! throw-vs-fallback timeout policy, assembled before `acquire_async` is
//! invoked.

use std::time::Duration;

use crate::cancel::CancellationToken;
use crate::error::SyncError;

/// How long a wait is willing to block.
#[derive(Debug, Clone, Copy)]
pub enum Timeout {
    Infinite,
    Zero,
    After(Duration),
}

impl Timeout {
    /// Mirrors the millisecond convention many wait APIs use: `-1` means
    /// infinite, `0` means don't block, anything else negative is invalid.
    pub fn from_millis(ms: i64) -> Result<Self, SyncError> {
        match ms {
            -1 => Ok(Timeout::Infinite),
            0 => Ok(Timeout::Zero),
            ms if ms < 0 => Err(SyncError::InvalidTimeout),
            ms => Ok(Timeout::After(Duration::from_millis(ms as u64))),
        }
    }
}

impl From<Duration> for Timeout {
    fn from(d: Duration) -> Self {
        if d.is_zero() {
            Timeout::Zero
        } else {
            Timeout::After(d)
        }
    }
}

/// Assembles one wait request. Every field has a sensible default, so the
/// common case is `WaitBuilder::new()` with no further configuration.
#[derive(Debug, Clone)]
pub struct WaitBuilder {
    pub(crate) timeout: Timeout,
    pub(crate) token: CancellationToken,
    pub(crate) throw_on_timeout: bool,
    pub(crate) caller_info: &'static str,
}

impl WaitBuilder {
    pub fn new() -> Self {
        Self {
            timeout: Timeout::Infinite,
            token: CancellationToken::none(),
            throw_on_timeout: false,
            caller_info: "wait",
        }
    }

    pub fn timeout(mut self, timeout: Timeout) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn cancellation_token(mut self, token: CancellationToken) -> Self {
        self.token = token;
        self
    }

    /// When set, a timeout completes the wait with
    /// [`crate::error::SyncError::Timeout`] instead of a type-appropriate
    /// fallback value.
    pub fn throw_on_timeout(mut self, throw: bool) -> Self {
        self.throw_on_timeout = throw;
        self
    }

    /// Static call-site tag surfaced through `tracing` spans.
    pub fn caller_info(mut self, caller_info: &'static str) -> Self {
        self.caller_info = caller_info;
        self
    }
}

impl Default for WaitBuilder {
    fn default() -> Self {
        Self::new()
    }
}
