// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Construction-time knobs shared by every primitive.

use crate::pool::default_max_pool_size;

/// Tuning for a primitive's internal [`crate::pool::Pool`] and its queue.
#[derive(Debug, Clone, Copy)]
pub struct PoolOptions {
    /// Nodes kept around for reuse once live; past this, a returned node is
    /// dropped instead of pooled. Defaults to `2 * available_parallelism()`.
    pub max_pool_size: usize,
    /// Upper bound on concurrently queued waiters. `None` (the default)
    /// means unbounded; once set, an `acquire_async` call that would grow
    /// the queue past this fails fast with
    /// [`crate::error::SyncError::ConcurrencyLimitReached`] instead of
    /// enqueuing.
    pub queue_capacity: Option<usize>,
}

impl Default for PoolOptions {
    fn default() -> Self {
        Self {
            max_pool_size: default_max_pool_size(),
            queue_capacity: None,
        }
    }
}

impl PoolOptions {
    pub fn new(max_pool_size: usize) -> Self {
        Self {
            max_pool_size,
            ..Self::default()
        }
    }

    /// Bound the number of waiters this primitive will queue at once.
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = Some(capacity);
        self
    }
}
