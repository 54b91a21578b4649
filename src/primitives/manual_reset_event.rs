// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! A gate that, once open, admits every waiter — queued already or still to
//! come — until explicitly closed again.

use std::sync::Arc;

use crate::builder::WaitBuilder;
use crate::config::PoolOptions;
use crate::error::{SyncError, SyncResult};
use crate::lock_manager::LockManager;
use crate::synchronizer::QueuedSynchronizer;
use crate::time::{ThreadTimer, Timer};

struct ManualResetManager {
    signaled: bool,
}

impl LockManager<bool> for ManualResetManager {
    fn is_lock_allowed(&self) -> bool {
        self.signaled
    }

    fn acquire_lock(&mut self) -> bool {
        // Broadcasting: granting one waiter never closes the gate for the
        // next.
        true
    }
}

pub struct ManualResetEvent {
    engine: QueuedSynchronizer<bool, ManualResetManager>,
}

impl ManualResetEvent {
    pub fn new(initial_state: bool) -> Self {
        Self::with_options(initial_state, PoolOptions::default(), Arc::new(ThreadTimer::new()))
    }

    pub fn with_options(initial_state: bool, options: PoolOptions, timer: Arc<dyn Timer>) -> Self {
        Self {
            engine: QueuedSynchronizer::new(
                ManualResetManager { signaled: initial_state },
                options,
                timer,
                "ManualResetEvent",
            ),
        }
    }

    pub async fn wait(&self) -> SyncResult<bool> {
        self.wait_with(WaitBuilder::new()).await
    }

    pub async fn wait_with(&self, builder: WaitBuilder) -> SyncResult<bool> {
        self.engine.acquire_async(builder).await
    }

    /// Open the gate, releasing every current and future waiter until
    /// `reset()` closes it again. Returns `true` if the gate was actually
    /// opened by this call; `false` if it was already open.
    pub fn set(&self) -> bool {
        self.engine.open_and_release_all(|m| {
            let was_signaled = m.signaled;
            m.signaled = true;
            !was_signaled
        })
    }

    /// Close the gate. Waiters already granted are unaffected; new waiters
    /// queue until the next `set()`. Returns `true` if a signal was actually
    /// cleared; `false` if the gate was already closed.
    pub fn reset(&self) -> bool {
        self.engine.with_manager(|m| {
            let was_signaled = m.signaled;
            m.signaled = false;
            was_signaled
        })
    }

    /// Release every waiter queued right now, then leave the gate closed for
    /// whoever asks next — equivalent to `set()` immediately followed by
    /// `reset()`, except performed atomically so no waiter can slip in during
    /// the gap and be left queued against an already-closed gate. Returns
    /// `true` if the gate was open at any point during the call.
    pub fn set_auto_reset(&self) -> bool {
        self.engine.release_all_and_close(
            |m| {
                let was_signaled = m.signaled;
                m.signaled = true;
                !was_signaled
            },
            |m| m.signaled = false,
        )
    }

    pub fn is_set(&self) -> bool {
        self.engine.with_manager(|m| m.signaled)
    }

    pub fn dispose(&self) {
        self.engine.dispose(SyncError::Disposed("ManualResetEvent"));
    }
}
