// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Keyed rendezvous: `wait(key)` queues until a matching
//! `pulse(key, value_or_error)` arrives. Waiters are sharded into independently
//! mutexed buckets by `hash(key) % bucket_count`, the way a sharded cache
//! avoids one lock serializing unrelated keys; FIFO ordering only holds
//! *within* a bucket; two different keys hashing to the same bucket don't
//! promise anything about each other's order.
//!
//! `pulse()` arriving before any matching `wait()` is not buffered — it is
//! a no-op that reports no waiter was found. Pairing this with an external
//! request/response table (so a late response can be dropped deliberately)
//! is the expected usage, the same way a correlation-ID dispatch table
//! works in request-handling code. `pulse_all()` is the bulk counterpart:
//! deliver one outcome to every waiter queued on every key at once, for a
//! shutdown or a broadcast error.

use std::collections::hash_map::DefaultHasher;
use std::future::Future;
use std::hash::{Hash, Hasher};
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use std::time::Instant;

use crate::builder::{Timeout, WaitBuilder};
use crate::cancel::{CallbackReg, CancellationToken};
use crate::completion::Outcome;
use crate::config::PoolOptions;
use crate::error::{SyncError, SyncResult};
use crate::node::WaitNode;
use crate::pool::Pool;
use crate::queue::WaitQueue;
use crate::time::{Deadline, Timer, TimerHandle, ThreadTimer};

const DEFAULT_BUCKET_COUNT: usize = 16;

struct Entry<K, V> {
    key: K,
    node: Box<WaitNode<V>>,
}

struct Bucket<K, V> {
    queue: WaitQueue<Entry<K, V>>,
}

struct Inner<K, V> {
    buckets: Vec<Mutex<Bucket<K, V>>>,
    pool: Pool<V>,
    timer: Arc<dyn Timer>,
}

impl<K, V> Inner<K, V>
where
    K: Hash + Eq + Send + 'static,
    V: Send + 'static,
{
    fn bucket_index(&self, key: &K) -> usize {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        (hasher.finish() as usize) % self.buckets.len()
    }

    /// A correlation wait has no sensible fallback value for an arbitrary
    /// payload type, so a timeout always observes
    /// [`crate::error::SyncError::Timeout`], regardless of the builder's
    /// `throw_on_timeout` flag.
    fn fire_timeout(self: &Arc<Self>, bucket_idx: usize, entry_idx: usize, version: u16) {
        let mut bucket = self.buckets[bucket_idx].lock().unwrap();
        let Some(entry) = bucket.queue.get_mut(entry_idx) else { return };
        if entry.node.cs.version() != version || !entry.node.cs.is_pending() {
            return;
        }
        let waker = entry.node.cs.try_complete(version, Outcome::Failure(SyncError::Timeout));
        drop(bucket);
        if let Some(w) = waker {
            w.wake();
        }
    }

    fn fire_cancel(self: &Arc<Self>, bucket_idx: usize, entry_idx: usize, version: u16) {
        let mut bucket = self.buckets[bucket_idx].lock().unwrap();
        let Some(entry) = bucket.queue.get_mut(entry_idx) else { return };
        if entry.node.cs.version() != version {
            return;
        }
        let waker = entry.node.cs.try_complete(version, Outcome::Canceled);
        drop(bucket);
        if let Some(w) = waker {
            w.wake();
        }
    }
}

/// A keyed rendezvous point between producers (`pulse`) and consumers
/// (`wait`).
pub struct CorrelationSource<K, V> {
    inner: Arc<Inner<K, V>>,
}

impl<K, V> Clone for CorrelationSource<K, V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<K, V> CorrelationSource<K, V>
where
    K: Hash + Eq + Send + 'static,
    V: Send + 'static,
{
    pub fn new() -> Self {
        Self::with_options(DEFAULT_BUCKET_COUNT, PoolOptions::default(), Arc::new(ThreadTimer::new()))
    }

    pub fn with_options(bucket_count: usize, options: PoolOptions, timer: Arc<dyn Timer>) -> Self {
        assert!(bucket_count >= 1, "bucket_count must be >= 1");
        let buckets = (0..bucket_count)
            .map(|_| Mutex::new(Bucket { queue: WaitQueue::new() }))
            .collect();
        Self {
            inner: Arc::new(Inner {
                buckets,
                pool: Pool::new(options.max_pool_size),
                timer,
            }),
        }
    }

    /// Queue a wait for `key`. Resolves once a matching `pulse()` call
    /// arrives, the wait times out, or it's cancelled.
    pub async fn wait(&self, key: K) -> SyncResult<V> {
        self.wait_with(key, WaitBuilder::new()).await
    }

    pub async fn wait_with(&self, key: K, builder: WaitBuilder) -> SyncResult<V> {
        self.acquire(key, builder).await
    }

    fn acquire(&self, key: K, builder: WaitBuilder) -> CorrelationWaitFuture<K, V> {
        if builder.token.is_cancelable() && builder.token.is_cancelled() {
            return CorrelationWaitFuture::ready(Err(SyncError::Canceled));
        }
        if matches!(builder.timeout, Timeout::Zero) {
            // No sensible fallback value for an arbitrary payload type:
            // a zero-timeout correlation wait always fails fast with
            // `Timeout`, regardless of `throw_on_timeout`.
            return CorrelationWaitFuture::ready(Err(SyncError::Timeout));
        }

        let bucket_idx = self.inner.bucket_index(&key);
        let deadline_at = match builder.timeout {
            Timeout::Infinite | Timeout::Zero => None,
            Timeout::After(d) => Some(Instant::now() + d),
        };

        let node = self.inner.pool.take(builder.throw_on_timeout, builder.caller_info);
        let version = node.cs.version();
        let mut bucket = self.inner.buckets[bucket_idx].lock().unwrap();
        let entry_idx = bucket.queue.push_back(Entry { key, node });
        drop(bucket);

        let timer_handle = match Deadline::from_now(deadline_at) {
            Deadline::Infinite => None,
            Deadline::Elapsed => {
                self.inner.fire_timeout(bucket_idx, entry_idx, version);
                None
            }
            Deadline::After(remaining) => {
                let inner = Arc::clone(&self.inner);
                Some(self.inner.timer.schedule(
                    remaining,
                    Box::new(move || inner.fire_timeout(bucket_idx, entry_idx, version)),
                ))
            }
        };

        let cancel_reg = if builder.token.is_cancelable() {
            let inner = Arc::clone(&self.inner);
            Some(builder.token.register_callback(Box::new(move || {
                inner.fire_cancel(bucket_idx, entry_idx, version);
            })))
        } else {
            None
        };

        CorrelationWaitFuture {
            state: FutureState::Pending(PendingWait {
                inner: Arc::clone(&self.inner),
                bucket_idx,
                entry_idx,
                cancel_token: builder.token,
                cancel_reg,
                timer_handle,
            }),
        }
    }

    /// Deliver `result` (a value or an error) to the oldest still-pending
    /// waiter on `key`, if any. Returns `false` (and drops `result`) if
    /// nobody is waiting.
    pub fn pulse(&self, key: &K, result: SyncResult<V>) -> bool {
        let bucket_idx = self.inner.bucket_index(key);
        let mut bucket = self.inner.buckets[bucket_idx].lock().unwrap();
        let indices: Vec<usize> = bucket.queue.iter_indices().collect();
        for idx in indices {
            let entry = bucket.queue.get_mut(idx).expect("index from iter_indices must be live");
            if &entry.key != key || !entry.node.cs.is_pending() {
                continue;
            }
            let version = entry.node.cs.version();
            let outcome = match result {
                Ok(value) => Outcome::Success(value),
                Err(err) => Outcome::Failure(err),
            };
            let waker = entry.node.cs.try_complete(version, outcome);
            drop(bucket);
            if let Some(w) = waker {
                w.wake();
            }
            return true;
        }
        false
    }

    /// Deliver an outcome to every waiter currently queued, across every
    /// bucket — draining each bucket in one lock hold so a concurrent
    /// cancel/timeout detaching its own entry can't race the bulk drain.
    /// `make_result` is called once per released waiter; the common case is
    /// broadcasting a constant error (e.g. shutting every pending
    /// correlation wait down at once), so a closure rather than a single
    /// `V` avoids requiring `V: Clone` for the success case nobody needs
    /// here. Returns how many waiters were released.
    pub fn pulse_all(&self, mut make_result: impl FnMut() -> SyncResult<V>) -> usize {
        let mut released = 0;
        for bucket_mutex in &self.inner.buckets {
            let mut bucket = bucket_mutex.lock().unwrap();
            let indices: Vec<usize> = bucket.queue.iter_indices().collect();
            let mut wakers = Vec::new();
            for idx in indices {
                let entry = bucket.queue.get_mut(idx).expect("index from iter_indices must be live");
                if !entry.node.cs.is_pending() {
                    continue;
                }
                let version = entry.node.cs.version();
                let outcome = match make_result() {
                    Ok(value) => Outcome::Success(value),
                    Err(err) => Outcome::Failure(err),
                };
                if let Some(w) = entry.node.cs.try_complete(version, outcome) {
                    wakers.push(w);
                }
                released += 1;
            }
            drop(bucket);
            for w in wakers {
                w.wake();
            }
        }
        released
    }
}

impl<K, V> Default for CorrelationSource<K, V>
where
    K: Hash + Eq + Send + 'static,
    V: Send + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

struct PendingWait<K, V> {
    inner: Arc<Inner<K, V>>,
    bucket_idx: usize,
    entry_idx: usize,
    cancel_token: CancellationToken,
    cancel_reg: Option<CallbackReg>,
    timer_handle: Option<Box<dyn TimerHandle>>,
}

impl<K, V> PendingWait<K, V> {
    fn disarm(&mut self) {
        if let Some(handle) = self.timer_handle.take() {
            handle.cancel();
        }
        if let Some(reg) = self.cancel_reg.take() {
            self.cancel_token.unregister_callback(reg);
        }
    }
}

enum FutureState<K, V> {
    Ready(Option<Result<V, SyncError>>),
    Pending(PendingWait<K, V>),
    Done,
}

struct CorrelationWaitFuture<K, V> {
    state: FutureState<K, V>,
}

impl<K, V> CorrelationWaitFuture<K, V> {
    fn ready(result: Result<V, SyncError>) -> Self {
        Self {
            state: FutureState::Ready(Some(result)),
        }
    }
}

impl<K, V> Future for CorrelationWaitFuture<K, V>
where
    K: Hash + Eq + Send + 'static,
    V: Send + 'static,
{
    type Output = Result<V, SyncError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        match &mut this.state {
            FutureState::Ready(slot) => Poll::Ready(slot.take().expect("polled after completion")),
            FutureState::Pending(pending) => {
                let mut bucket = pending.inner.buckets[pending.bucket_idx].lock().unwrap();
                let entry = bucket
                    .queue
                    .get_mut(pending.entry_idx)
                    .expect("pending wait's entry removed by someone other than its own future");
                if entry.node.cs.is_pending() {
                    entry.node.cs.register_waker(cx.waker());
                    return Poll::Pending;
                }
                let outcome = entry.node.cs.take_result();
                let entry = bucket.queue.remove(pending.entry_idx);
                drop(bucket);

                pending.disarm();
                pending.inner.pool.give_back(entry.node);
                this.state = FutureState::Done;
                Poll::Ready(outcome.into_result())
            }
            FutureState::Done => panic!("polled after completion"),
        }
    }
}

impl<K, V> Drop for CorrelationWaitFuture<K, V> {
    fn drop(&mut self) {
        if let FutureState::Pending(pending) = &mut self.state {
            let mut bucket = pending.inner.buckets[pending.bucket_idx].lock().unwrap();
            if let Some(entry) = bucket.queue.get_mut(pending.entry_idx) {
                if entry.node.cs.is_pending() {
                    let version = entry.node.cs.version();
                    entry.node.cs.try_complete(version, Outcome::Canceled);
                }
                let entry = bucket.queue.remove(pending.entry_idx);
                drop(bucket);
                pending.disarm();
                pending.inner.pool.give_back(entry.node);
            }
        }
    }
}
