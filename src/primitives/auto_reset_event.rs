// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! A gate that admits exactly one waiter per `set()` call.

use std::sync::Arc;

use crate::builder::WaitBuilder;
use crate::config::PoolOptions;
use crate::error::SyncResult;
use crate::lock_manager::LockManager;
use crate::synchronizer::QueuedSynchronizer;
use crate::time::{Timer, ThreadTimer};

struct AutoResetManager {
    signaled: bool,
}

impl LockManager<bool> for AutoResetManager {
    fn is_lock_allowed(&self) -> bool {
        self.signaled
    }

    fn acquire_lock(&mut self) -> bool {
        self.signaled = false;
        true
    }
}

/// FIFO auto-reset event: each `set()` wakes at most one waiter (or, if
/// nobody is waiting, latches a single pending signal for the next
/// `wait()`) rather than broadcasting to everyone queued.
pub struct AutoResetEvent {
    engine: QueuedSynchronizer<bool, AutoResetManager>,
}

impl AutoResetEvent {
    pub fn new(initial_state: bool) -> Self {
        Self::with_options(initial_state, PoolOptions::default(), Arc::new(ThreadTimer::new()))
    }

    pub fn with_options(initial_state: bool, options: PoolOptions, timer: Arc<dyn Timer>) -> Self {
        Self {
            engine: QueuedSynchronizer::new(
                AutoResetManager { signaled: initial_state },
                options,
                timer,
                "AutoResetEvent",
            ),
        }
    }

    /// Wait for the next signal. On success, always resolves `true`; a
    /// timeout resolves `false` unless `throw_on_timeout` was set on the
    /// builder.
    pub async fn wait(&self) -> SyncResult<bool> {
        self.wait_with(WaitBuilder::new()).await
    }

    pub async fn wait_with(&self, builder: WaitBuilder) -> SyncResult<bool> {
        self.engine.acquire_async(builder).await
    }

    /// Release exactly one waiter, or latch the signal if no one is
    /// waiting yet. Returns `true` if a waiter was released or the signal
    /// was newly latched; `false` if it was already latched with nobody
    /// queued to hand it to.
    pub fn set(&self) -> bool {
        self.engine.signal(|m| {
            let was_signaled = m.signaled;
            m.signaled = true;
            !was_signaled
        })
    }

    /// Clear a latched signal without waking anyone. Returns `true` if a
    /// signal was actually latched; `false` if it was already clear or
    /// waiters are already queued.
    pub fn reset(&self) -> bool {
        self.engine.with_manager(|m| {
            let was_signaled = m.signaled;
            m.signaled = false;
            was_signaled
        })
    }

    pub fn is_set(&self) -> bool {
        self.engine.with_manager(|m| m.signaled)
    }

    pub fn dispose(&self) {
        self.engine.dispose(crate::error::SyncError::Disposed("AutoResetEvent"));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::block_on;
    use std::sync::Arc as StdArc;
    use std::thread;

    #[test]
    fn set_before_wait_latches_signal() {
        let event = AutoResetEvent::new(false);
        assert!(event.set());
        assert!(event.is_set());
        let fut = event.wait();
        assert!(!event.is_set(), "the wait must consume the latch synchronously");
        drop(fut);
    }

    #[test]
    fn set_on_already_latched_signal_returns_false() {
        let event = AutoResetEvent::new(false);
        assert!(event.set());
        assert!(!event.set(), "nothing changed: still latched, nobody to hand it to");
    }

    #[test]
    fn reset_reports_whether_a_signal_was_cleared() {
        let event = AutoResetEvent::new(false);
        assert!(!event.reset(), "nothing was latched to begin with");
        event.set();
        assert!(event.reset());
        assert!(!event.reset(), "already clear");
    }

    #[test]
    fn set_wakes_exactly_one_waiter() {
        let event = StdArc::new(AutoResetEvent::new(false));
        let a = event.clone();
        let b = event.clone();

        let (ready_tx, ready_rx) = std::sync::mpsc::channel();
        let (done_tx, done_rx) = std::sync::mpsc::channel::<bool>();

        let handles: Vec<_> = [a, b]
            .into_iter()
            .map(|ev| {
                let ready_tx = ready_tx.clone();
                let done_tx = done_tx.clone();
                thread::spawn(move || {
                    let mut fut = Box::pin(ev.wait());
                    ready_tx.send(()).unwrap();
                    let result = block_on(fut.as_mut());
                    done_tx.send(result.is_ok()).unwrap();
                })
            })
            .collect();

        ready_rx.recv().unwrap();
        ready_rx.recv().unwrap();
        event.set();

        let first = done_rx.recv_timeout(std::time::Duration::from_secs(1));
        assert!(first.is_ok(), "exactly one waiter should have been released");

        event.dispose();
        for h in handles {
            let _ = h.join();
        }
    }
}
