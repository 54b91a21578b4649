// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! The timer boundary: a sleeping thread raced against the real work rather
//! than a reactor, exposed as a trait so a host application can swap in a
//! runtime's own timer wheel instead of spawning OS threads.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// A scheduled callback, cancelable before it fires. Dropping a handle
/// without calling `cancel` leaves the callback armed.
pub trait TimerHandle: Send {
    /// Best-effort cancellation: if the callback hasn't started running,
    /// suppress it. Racing with the callback already firing is fine — the
    /// version-guarded `try_complete` downstream makes a late fire a no-op.
    fn cancel(&self);
}

/// Schedules one-shot callbacks at a future instant.
///
/// Implementations must be safe to call from any thread and must not block
/// the caller of `schedule`.
pub trait Timer: Send + Sync + 'static {
    fn schedule(&self, delay: Duration, callback: Box<dyn FnOnce() + Send>) -> Box<dyn TimerHandle>;
}

struct ThreadTimerHandle {
    cancelled: Arc<AtomicBool>,
}

impl TimerHandle for ThreadTimerHandle {
    fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }
}

/// Reference [`Timer`] implementation: one parked OS thread per scheduled
/// callback. Adequate for the default, moderate-fanout case; a host
/// with a tighter timer budget should supply its own `Timer`.
#[derive(Default)]
pub struct ThreadTimer;

impl ThreadTimer {
    pub fn new() -> Self {
        Self
    }
}

impl Timer for ThreadTimer {
    fn schedule(&self, delay: Duration, callback: Box<dyn FnOnce() + Send>) -> Box<dyn TimerHandle> {
        let cancelled = Arc::new(AtomicBool::new(false));
        let handle = ThreadTimerHandle {
            cancelled: Arc::clone(&cancelled),
        };
        std::thread::Builder::new()
            .name("qsync-timer".into())
            .spawn(move || {
                std::thread::sleep(delay);
                if !cancelled.load(Ordering::SeqCst) {
                    callback();
                }
            })
            .expect("failed to spawn timer thread");
        Box::new(handle)
    }
}

/// A resolved deadline: either bounded or unbounded. Computed once from a
/// [`crate::builder::Timeout`] at the moment a wait begins.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Deadline {
    Infinite,
    /// Already elapsed — the wait must fail/fallback synchronously.
    Elapsed,
    After(Duration),
}

impl Deadline {
    pub(crate) fn from_now(instant: Option<Instant>) -> Self {
        match instant {
            None => Deadline::Infinite,
            Some(at) => match at.checked_duration_since(Instant::now()) {
                Some(remaining) if remaining > Duration::ZERO => Deadline::After(remaining),
                _ => Deadline::Elapsed,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    #[test]
    fn fires_after_delay() {
        let timer = ThreadTimer::new();
        let (tx, rx) = mpsc::channel();
        let _handle = timer.schedule(Duration::from_millis(10), Box::new(move || {
            tx.send(()).unwrap();
        }));
        rx.recv_timeout(Duration::from_secs(1)).expect("timer never fired");
    }

    #[test]
    fn cancel_suppresses_callback() {
        let timer = ThreadTimer::new();
        let (tx, rx) = mpsc::channel::<()>();
        let handle = timer.schedule(Duration::from_millis(50), Box::new(move || {
            let _ = tx.send(());
        }));
        handle.cancel();
        assert!(rx.recv_timeout(Duration::from_millis(200)).is_err());
    }
}
