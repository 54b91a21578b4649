// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! A non-negative counter waiters can drain. Each `wait()` that
//! finds the counter positive decrements it by one; otherwise it queues
//! until `increment()` hands its unit to the oldest waiter.
//!
//! A full `Barrier` (parties rendezvousing on a generation) is out of scope
//! here; `value()` plus this wait/increment pair is the seam a caller would
//! build one on top of rather than this crate providing every higher-level
//! primitive directly.

use std::sync::Arc;

use crate::builder::WaitBuilder;
use crate::config::PoolOptions;
use crate::error::{SyncError, SyncResult};
use crate::lock_manager::LockManager;
use crate::synchronizer::QueuedSynchronizer;
use crate::time::{ThreadTimer, Timer};

struct CounterManager {
    count: u64,
}

impl LockManager<bool> for CounterManager {
    fn is_lock_allowed(&self) -> bool {
        self.count > 0
    }

    fn acquire_lock(&mut self) -> bool {
        self.count -= 1;
        true
    }
}

pub struct Counter {
    engine: QueuedSynchronizer<bool, CounterManager>,
}

impl Counter {
    pub fn new(initial_count: u64) -> Self {
        Self::with_options(initial_count, PoolOptions::default(), Arc::new(ThreadTimer::new()))
    }

    pub fn with_options(initial_count: u64, options: PoolOptions, timer: Arc<dyn Timer>) -> Self {
        Self {
            engine: QueuedSynchronizer::new(
                CounterManager { count: initial_count },
                options,
                timer,
                "Counter",
            ),
        }
    }

    /// Wait for, and consume, one unit.
    pub async fn wait(&self) -> SyncResult<bool> {
        self.wait_with(WaitBuilder::new()).await
    }

    pub async fn wait_with(&self, builder: WaitBuilder) -> SyncResult<bool> {
        self.engine.acquire_async(builder).await
    }

    /// Add one unit, handing it straight to the oldest waiter if any is
    /// queued.
    pub fn increment(&self) {
        self.engine.signal(|m| {
            m.count += 1;
            true
        });
    }

    /// Add `n` units, releasing up to `n` queued waiters.
    pub fn increment_by(&self, n: u64) {
        for _ in 0..n {
            self.increment();
        }
    }

    pub fn value(&self) -> u64 {
        self.engine.with_manager(|m| m.count)
    }

    /// Atomically exchange the count for `0`. Returns whether the prior
    /// value was positive.
    pub fn reset(&self) -> bool {
        self.engine.with_manager(|m| {
            let was_positive = m.count > 0;
            m.count = 0;
            was_positive
        })
    }

    pub fn dispose(&self) {
        self.engine.dispose(SyncError::Disposed("Counter"));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::block_on;
    use std::sync::Arc as StdArc;
    use std::thread;

    #[test]
    fn wait_consumes_available_unit_without_queueing() {
        let counter = Counter::new(1);
        let mut fut = Box::pin(counter.wait());
        let result = block_on(fut.as_mut());
        assert_eq!(result.unwrap(), true);
        assert_eq!(counter.value(), 0);
    }

    #[test]
    fn producer_consumer_hand_off() {
        let counter = StdArc::new(Counter::new(0));
        let consumer = counter.clone();
        let handle = thread::spawn(move || {
            let mut fut = Box::pin(consumer.wait());
            block_on(fut.as_mut())
        });

        thread::sleep(std::time::Duration::from_millis(20));
        counter.increment();

        assert!(handle.join().unwrap().unwrap());
        assert_eq!(counter.value(), 0);
    }

    #[test]
    fn increment_by_releases_multiple_waiters() {
        let counter = StdArc::new(Counter::new(0));
        let handles: Vec<_> = (0..3)
            .map(|_| {
                let c = counter.clone();
                thread::spawn(move || {
                    let mut fut = Box::pin(c.wait());
                    block_on(fut.as_mut())
                })
            })
            .collect();

        thread::sleep(std::time::Duration::from_millis(20));
        counter.increment_by(3);

        for h in handles {
            assert!(h.join().unwrap().unwrap());
        }
        assert_eq!(counter.value(), 0);
    }

    #[test]
    fn reset_reports_whether_the_prior_value_was_positive() {
        let counter = Counter::new(3);
        assert!(counter.reset());
        assert_eq!(counter.value(), 0);
        assert!(!counter.reset(), "already zero");
    }
}
