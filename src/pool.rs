// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Bounded free-list of wait nodes. Keeps the steady-state wait/
//! complete cycle allocation-free without an unbounded cache.

use std::sync::atomic::{AtomicU16, AtomicUsize, Ordering};
use std::sync::Mutex;

use tracing::trace;

use crate::node::WaitNode;

/// Default `max_pool_size`: `2 * available_parallelism()`, falling back to
/// 2 if the platform can't report it.
pub fn default_max_pool_size() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get() * 2)
        .unwrap_or(2)
}

/// A concurrency-safe bag of reusable [`WaitNode`]s for one node type.
///
/// `live_count` tracks every node ever handed out by this pool (pooled or
/// not); once it exceeds `max_pool_size`, nodes past the bound are dropped
/// on return instead of being pooled, bounding steady-state memory.
pub(crate) struct Pool<T> {
    free: Mutex<Vec<Box<WaitNode<T>>>>,
    max_pool_size: usize,
    live_count: AtomicUsize,
    next_fresh_version: AtomicU16,
}

impl<T> Pool<T> {
    pub(crate) fn new(max_pool_size: usize) -> Self {
        assert!(max_pool_size >= 1, "max_pool_size must be >= 1");
        Self {
            free: Mutex::new(Vec::new()),
            max_pool_size,
            live_count: AtomicUsize::new(0),
            next_fresh_version: AtomicU16::new(0),
        }
    }

    /// Take a node ready for a new wait, allocating only if the free list is
    /// empty.
    pub(crate) fn take(&self, throw_on_timeout: bool, caller_info: &'static str) -> Box<WaitNode<T>> {
        let reused = self.free.lock().unwrap().pop();
        match reused {
            Some(mut node) => {
                trace!(caller = caller_info, "pool hit");
                node.set_meta(throw_on_timeout, caller_info);
                node
            }
            None => {
                trace!(caller = caller_info, "pool miss, allocating");
                self.live_count.fetch_add(1, Ordering::Relaxed);
                // Stagger fresh allocations' starting version so a late
                // timer/cancel callback racing a slot's reuse can't collide
                // with a brand-new occupant also starting at version 0.
                let version = self.next_fresh_version.fetch_add(1, Ordering::Relaxed);
                Box::new(WaitNode::with_version(version, throw_on_timeout, caller_info))
            }
        }
    }

    /// Return a node that has finished its wait. Resets it for reuse; if the
    /// node was somehow not yet completed (an internal consistency error
    /// elsewhere in the engine) it is dropped rather than pooled. Nodes past
    /// `max_pool_size` are also dropped.
    pub(crate) fn give_back(&self, mut node: Box<WaitNode<T>>) {
        if node.cs.is_pending() {
            // Not actually done observing; pooling it would let a future
            // waiter alias a still-pending completion. Drop instead.
            return;
        }
        node.cs.reset();

        let mut free = self.free.lock().unwrap();
        if free.len() < self.max_pool_size {
            free.push(node);
        }
        // else: drop — "drop on consume" for nodes past the soft cap.
    }

    /// Nodes allocated so far (pooled + checked out). Exposed for tests
    /// exercising the pool-bound invariant.
    #[cfg(test)]
    pub(crate) fn live_count(&self) -> usize {
        self.live_count.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::completion::Outcome;

    #[test]
    fn reuses_completed_nodes() {
        let pool: Pool<bool> = Pool::new(4);
        let mut node = pool.take(false, "test");
        let version = node.cs.version();
        node.cs.try_complete(version, Outcome::Success(true));
        pool.give_back(node);
        assert_eq!(pool.live_count(), 1);

        let node2 = pool.take(false, "test");
        assert_eq!(pool.live_count(), 1, "no new allocation on reuse");
        assert!(node2.cs.is_pending());
    }

    #[test]
    fn drops_pending_node_instead_of_pooling() {
        let pool: Pool<bool> = Pool::new(4);
        let node = pool.take(false, "test");
        // Still pending: give_back must not pool it.
        pool.give_back(node);
        assert_eq!(pool.free.lock().unwrap().len(), 0);
    }

    #[test]
    fn respects_max_pool_size() {
        let pool: Pool<bool> = Pool::new(2);
        for _ in 0..5 {
            let mut node = pool.take(false, "test");
            let version = node.cs.version();
            node.cs.try_complete(version, Outcome::Success(true));
            pool.give_back(node);
        }
        assert!(pool.free.lock().unwrap().len() <= 2);
    }
}
