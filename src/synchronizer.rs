// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! The queued-synchronizer engine: a mutex, a FIFO [`WaitQueue`], a
//! node [`Pool`], and a [`LockManager`] policy, all wired behind one lock —
//! completion is "mark it, grab the waker, wake it outside the lock."

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use std::time::Instant;

use tracing::{debug, trace};

use crate::builder::{Timeout, WaitBuilder};
use crate::cancel::{CallbackReg, CancellationToken};
use crate::completion::Outcome;
use crate::config::PoolOptions;
use crate::error::SyncError;
use crate::lock_manager::LockManager;
use crate::node::{TimeoutFallback, WaitNode};
use crate::pool::Pool;
use crate::queue::WaitQueue;
use crate::time::{Deadline, Timer, TimerHandle};

struct State<T, M> {
    queue: WaitQueue<Box<WaitNode<T>>>,
    manager: M,
    disposed: bool,
}

struct Inner<T, M> {
    state: Mutex<State<T, M>>,
    pool: Pool<T>,
    timer: Arc<dyn Timer>,
    name: &'static str,
    queue_capacity: Option<usize>,
}

/// A [`LockManager`] plus the shared queue/pool/timer plumbing around it.
/// Cloning is cheap (an `Arc` bump); every clone refers to the same engine.
pub(crate) struct QueuedSynchronizer<T, M> {
    inner: Arc<Inner<T, M>>,
}

impl<T, M> Clone for QueuedSynchronizer<T, M> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T, M> QueuedSynchronizer<T, M>
where
    T: TimeoutFallback + Send + 'static,
    M: LockManager<T> + 'static,
{
    pub(crate) fn new(manager: M, options: PoolOptions, timer: Arc<dyn Timer>, name: &'static str) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(State {
                    queue: WaitQueue::new(),
                    manager,
                    disposed: false,
                }),
                pool: Pool::new(options.max_pool_size),
                timer,
                name,
                queue_capacity: options.queue_capacity,
            }),
        }
    }

    /// Run `f` against the manager under the engine lock. Used by
    /// primitives (e.g. `ManualResetEvent::reset`) whose state transitions
    /// aren't themselves a wait.
    pub(crate) fn with_manager<R>(&self, f: impl FnOnce(&mut M) -> R) -> R {
        let mut state = self.inner.state.lock().unwrap();
        f(&mut state.manager)
    }

    pub(crate) fn is_disposed(&self) -> bool {
        self.inner.state.lock().unwrap().disposed
    }

    /// Begin a wait. The synchronous part (checking `is_lock_allowed`,
    /// enqueueing, arming the timer/cancellation) runs now; the returned
    /// future only ever re-checks state already decided here.
    pub(crate) fn acquire_async(&self, builder: WaitBuilder) -> WaitFuture<T, M> {
        let _span = tracing::trace_span!("acquire_async", name = self.inner.name).entered();
        if builder.token.is_cancelable() && builder.token.is_cancelled() {
            return WaitFuture::ready(Err(SyncError::Canceled));
        }

        let mut state = self.inner.state.lock().unwrap();
        if state.disposed {
            return WaitFuture::ready(Err(SyncError::Disposed(self.inner.name)));
        }
        if state.queue.is_empty() && state.manager.is_lock_allowed() {
            let value = state.manager.acquire_lock();
            trace!(name = self.inner.name, caller = builder.caller_info, "acquired without waiting");
            return WaitFuture::ready(Ok(value));
        }
        if let Some(capacity) = self.inner.queue_capacity {
            if state.queue.len() >= capacity {
                trace!(name = self.inner.name, caller = builder.caller_info, "queue capacity reached");
                return WaitFuture::ready(Err(SyncError::ConcurrencyLimitReached));
            }
        }
        if matches!(builder.timeout, Timeout::Zero) {
            trace!(name = self.inner.name, caller = builder.caller_info, "zero-timeout wait failed fast");
            return WaitFuture::ready(timeout_outcome::<T>(builder.throw_on_timeout));
        }

        let deadline_at = match builder.timeout {
            Timeout::Infinite | Timeout::Zero => None,
            Timeout::After(d) => Some(Instant::now() + d),
        };

        let mut node = self.inner.pool.take(builder.throw_on_timeout, builder.caller_info);
        let version = node.cs.version();
        let index = state.queue.push_back(node);
        drop(state);
        trace!(name = self.inner.name, caller = builder.caller_info, "enqueued, awaiting release");

        let timer_handle = match Deadline::from_now(deadline_at) {
            Deadline::Infinite => None,
            Deadline::Elapsed => {
                Inner::fire_timeout(&self.inner, index, version);
                None
            }
            Deadline::After(remaining) => {
                let inner = Arc::clone(&self.inner);
                Some(self.inner.timer.schedule(
                    remaining,
                    Box::new(move || Inner::fire_timeout(&inner, index, version)),
                ))
            }
        };

        let cancel_reg = if builder.token.is_cancelable() {
            let inner = Arc::clone(&self.inner);
            Some(builder.token.register_callback(Box::new(move || {
                Inner::fire_cancel(&inner, index, version);
            })))
        } else {
            None
        };

        WaitFuture {
            state: FutureState::Pending(PendingWait {
                inner: Arc::clone(&self.inner),
                index,
                cancel_token: builder.token,
                cancel_reg,
                timer_handle,
            }),
        }
    }

    /// Release exactly one pending waiter, skipping (without removing —
    /// that stays the owning future's job) any waiter already settled by a
    /// timeout or cancellation race. If no one is waiting, `mark` runs
    /// instead, recording the pulse on the manager for the next caller's
    /// fast path; `mark` reports whether it actually flipped the manager's
    /// state (e.g. latched a signal that was previously clear), since
    /// calling this again while already latched is a no-op worth
    /// distinguishing from a real transition. Both branches run under one
    /// lock hold, so a concurrent `acquire_async` can never enqueue in the
    /// gap between "no one is waiting" and "mark the manager" (the bug a
    /// two-step release-then-mark would have).
    ///
    /// Returns `true` if a queued waiter was released, or if `mark`
    /// reported a real transition; `false` if nothing changed.
    pub(crate) fn signal(&self, mark: impl FnOnce(&mut M) -> bool) -> bool {
        let _span = tracing::trace_span!("release_one", name = self.inner.name).entered();
        let mut state = self.inner.state.lock().unwrap();
        let indices: Vec<usize> = state.queue.iter_indices().collect();
        for idx in indices {
            let node = state.queue.get_mut(idx).expect("index from iter_indices must be live");
            if !node.cs.is_pending() {
                continue;
            }
            let value = state.manager.acquire_lock();
            let version = node.cs.version();
            let waker = node.cs.try_complete(version, Outcome::Success(value));
            drop(state);
            trace!(name = self.inner.name, "released one queued waiter (FIFO head)");
            if let Some(waker) = waker {
                waker.wake();
            }
            return true;
        }
        let transitioned = mark(&mut state.manager);
        trace!(name = self.inner.name, transitioned, "no waiter queued; marked manager");
        transitioned
    }

    /// Open the gate (`mark`) and release every currently pending waiter,
    /// all under one lock hold. Used by primitives like
    /// [`crate::primitives::manual_reset_event::ManualResetEvent`] where
    /// the gate, once open, must admit both everyone already queued and
    /// everyone who asks afterward — doing the mark and the drain as two
    /// separate locked sections would let a waiter enqueue in between and
    /// never get swept.
    ///
    /// Returns whatever `mark` reports: whether the gate was actually
    /// opened by this call (`false` if it was already open).
    pub(crate) fn open_and_release_all(&self, mark: impl FnOnce(&mut M) -> bool) -> bool {
        let _span = tracing::trace_span!("release_all", name = self.inner.name).entered();
        let mut state = self.inner.state.lock().unwrap();
        let transitioned = mark(&mut state.manager);
        let indices: Vec<usize> = state.queue.iter_indices().collect();
        let mut wakers = Vec::new();
        let mut released = 0;
        for idx in indices {
            let node = state.queue.get_mut(idx).expect("index from iter_indices must be live");
            if !node.cs.is_pending() {
                continue;
            }
            let value = state.manager.acquire_lock();
            let version = node.cs.version();
            if let Some(waker) = node.cs.try_complete(version, Outcome::Success(value)) {
                wakers.push(waker);
            }
            released += 1;
        }
        drop(state);
        debug!(name = self.inner.name, released, transitioned, "opened gate and released all queued waiters");
        for waker in wakers {
            waker.wake();
        }
        transitioned
    }

    /// Open the gate, drain every currently pending waiter, then close it
    /// again, all under one lock hold. Equivalent to `open_and_release_all`
    /// followed by closing the manager, except doing those as two separate
    /// locked sections would let a waiter enqueue in the gap and then never
    /// get woken (queued against an already-closed gate) or get admitted
    /// when it shouldn't (queued while briefly open). Used for an
    /// auto-resetting broadcast: release everyone waiting right now, but
    /// leave the gate closed for whoever comes next.
    ///
    /// Returns whatever `open` reports: whether the gate was actually open
    /// at any point during the call.
    pub(crate) fn release_all_and_close(
        &self,
        open: impl FnOnce(&mut M) -> bool,
        close: impl FnOnce(&mut M),
    ) -> bool {
        let _span = tracing::trace_span!("release_all_and_close", name = self.inner.name).entered();
        let mut state = self.inner.state.lock().unwrap();
        let transitioned = open(&mut state.manager);
        let indices: Vec<usize> = state.queue.iter_indices().collect();
        let mut wakers = Vec::new();
        let mut released = 0;
        for idx in indices {
            let node = state.queue.get_mut(idx).expect("index from iter_indices must be live");
            if !node.cs.is_pending() {
                continue;
            }
            let value = state.manager.acquire_lock();
            let version = node.cs.version();
            if let Some(waker) = node.cs.try_complete(version, Outcome::Success(value)) {
                wakers.push(waker);
            }
            released += 1;
        }
        close(&mut state.manager);
        drop(state);
        debug!(
            name = self.inner.name,
            released, transitioned, "opened gate, released all queued waiters, and closed it again"
        );
        for waker in wakers {
            waker.wake();
        }
        transitioned
    }

    /// Fail every pending waiter with `reason` and mark the engine
    /// disposed; further `acquire_async` calls fail immediately.
    pub(crate) fn dispose(&self, reason: SyncError) {
        let _span = tracing::trace_span!("dispose", name = self.inner.name).entered();
        let mut state = self.inner.state.lock().unwrap();
        if state.disposed {
            trace!(name = self.inner.name, "dispose called on already-disposed engine");
            return;
        }
        state.disposed = true;
        let indices: Vec<usize> = state.queue.iter_indices().collect();
        let mut wakers = Vec::new();
        for idx in indices {
            let node = state.queue.get_mut(idx).expect("index from iter_indices must be live");
            if node.cs.is_pending() {
                let version = node.cs.version();
                if let Some(w) = node.cs.try_complete(version, Outcome::Failure(reason.clone())) {
                    wakers.push(w);
                }
            }
        }
        drop(state);
        debug!(name = self.inner.name, failed = wakers.len(), "disposed, failing all pending waiters");
        for w in wakers {
            w.wake();
        }
    }
}

pub(crate) fn timeout_outcome<T: TimeoutFallback>(throw_on_timeout: bool) -> Result<T, SyncError> {
    if throw_on_timeout {
        return Err(SyncError::Timeout);
    }
    match T::timeout_fallback() {
        Some(value) => Ok(value),
        None => Err(SyncError::Timeout),
    }
}

impl<T, M> Inner<T, M>
where
    T: TimeoutFallback + Send + 'static,
{
    fn fire_timeout(self: &Arc<Self>, index: usize, version: u16) {
        let mut state = self.state.lock().unwrap();
        let Some(node) = state.queue.get_mut(index) else {
            return;
        };
        if node.cs.version() != version || !node.cs.is_pending() {
            return;
        }
        let outcome = if node.throw_on_timeout {
            Outcome::Failure(SyncError::Timeout)
        } else {
            match T::timeout_fallback() {
                Some(value) => Outcome::Success(value),
                None => Outcome::Failure(SyncError::Timeout),
            }
        };
        let waker = node.cs.try_complete(version, outcome);
        drop(state);
        if let Some(w) = waker {
            w.wake();
        }
    }

    fn fire_cancel(self: &Arc<Self>, index: usize, version: u16) {
        let mut state = self.state.lock().unwrap();
        let Some(node) = state.queue.get_mut(index) else {
            return;
        };
        if node.cs.version() != version {
            return;
        }
        let waker = node.cs.try_complete(version, Outcome::Canceled);
        drop(state);
        if let Some(w) = waker {
            w.wake();
        }
    }
}

struct PendingWait<T, M> {
    inner: Arc<Inner<T, M>>,
    index: usize,
    cancel_token: CancellationToken,
    cancel_reg: Option<CallbackReg>,
    timer_handle: Option<Box<dyn TimerHandle>>,
}

enum FutureState<T, M> {
    Ready(Option<Result<T, SyncError>>),
    Pending(PendingWait<T, M>),
    Done,
}

/// The future returned by [`QueuedSynchronizer::acquire_async`]. Holds no
/// runtime dependency of its own: whatever executor polls it drives the
/// wait forward through plain `Waker` calls.
pub(crate) struct WaitFuture<T, M> {
    state: FutureState<T, M>,
}

impl<T, M> WaitFuture<T, M> {
    fn ready(result: Result<T, SyncError>) -> Self {
        Self {
            state: FutureState::Ready(Some(result)),
        }
    }
}

impl<T, M> PendingWait<T, M> {
    fn disarm(&mut self) {
        if let Some(handle) = self.timer_handle.take() {
            handle.cancel();
        }
        if let Some(reg) = self.cancel_reg.take() {
            self.cancel_token.unregister_callback(reg);
        }
    }
}

impl<T, M> Future for WaitFuture<T, M>
where
    T: Send + 'static,
    M: LockManager<T> + 'static,
{
    type Output = Result<T, SyncError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        match &mut this.state {
            FutureState::Ready(slot) => {
                Poll::Ready(slot.take().expect("WaitFuture polled again after completion"))
            }
            FutureState::Pending(pending) => {
                let mut state = pending.inner.state.lock().unwrap();
                let node = state
                    .queue
                    .get_mut(pending.index)
                    .expect("pending wait's node removed by someone other than its own future");
                if node.cs.is_pending() {
                    node.cs.register_waker(cx.waker());
                    return Poll::Pending;
                }
                let outcome = node.cs.take_result();
                let node = state.queue.remove(pending.index);
                drop(state);

                pending.disarm();
                pending.inner.pool.give_back(node);
                this.state = FutureState::Done;
                Poll::Ready(outcome.into_result())
            }
            FutureState::Done => panic!("WaitFuture polled again after completion"),
        }
    }
}

impl<T, M> Drop for WaitFuture<T, M> {
    fn drop(&mut self) {
        if let FutureState::Pending(pending) = &mut self.state {
            let mut state = pending.inner.state.lock().unwrap();
            if let Some(node) = state.queue.get_mut(pending.index) {
                if node.cs.is_pending() {
                    let version = node.cs.version();
                    node.cs.try_complete(version, Outcome::Canceled);
                }
                let node = state.queue.remove(pending.index);
                drop(state);
                pending.disarm();
                pending.inner.pool.give_back(node);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::ThreadTimer;

    struct GateManager {
        signaled: bool,
    }

    impl LockManager<bool> for GateManager {
        fn is_lock_allowed(&self) -> bool {
            self.signaled
        }

        fn acquire_lock(&mut self) -> bool {
            self.signaled = false;
            true
        }
    }

    #[test]
    fn queue_capacity_rejects_past_the_bound() {
        let engine = QueuedSynchronizer::new(
            GateManager { signaled: false },
            PoolOptions::default().with_queue_capacity(1),
            Arc::new(ThreadTimer::new()),
            "GateManager",
        );

        let first = engine.acquire_async(WaitBuilder::new());
        assert!(matches!(first.state, FutureState::Pending(_)));

        let second = engine.acquire_async(WaitBuilder::new());
        assert!(matches!(
            second.state,
            FutureState::Ready(Some(Err(SyncError::ConcurrencyLimitReached)))
        ));
    }

    #[test]
    fn immediate_grant_does_not_count_against_capacity() {
        let engine = QueuedSynchronizer::new(
            GateManager { signaled: true },
            PoolOptions::default().with_queue_capacity(1),
            Arc::new(ThreadTimer::new()),
            "GateManager",
        );

        for _ in 0..3 {
            let fut = engine.acquire_async(WaitBuilder::new());
            assert!(matches!(fut.state, FutureState::Ready(Some(Ok(true)))));
            engine.with_manager(|m| m.signaled = true);
        }
    }
}
