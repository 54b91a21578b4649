// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Cooperative cancellation: a flag broadened into a broadcaster, so waiters
//! can both poll it synchronously and be woken by it asynchronously, the
//! way a `Notify`-backed cancellation token behaves.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll, Waker};

struct Inner {
    cancelled: AtomicBool,
    wakers: Mutex<Vec<Waker>>,
    callbacks: Mutex<Vec<(u64, Box<dyn FnOnce() + Send>)>>,
    next_callback_id: AtomicU64,
}

/// A handle a producer holds to cancel the tokens it handed out.
#[derive(Clone)]
pub struct CancellationTokenSource {
    inner: Arc<Inner>,
}

/// A cancellation signal consumers observe. Cheap to clone; all clones (and
/// the token produced by [`CancellationTokenSource::token`]) share state.
///
/// [`CancellationToken::none`] produces a token that is never cancelable —
/// the async-bridge fast path checks `is_cancelable()` before paying
/// for any registration.
#[derive(Clone)]
pub struct CancellationToken {
    inner: Option<Arc<Inner>>,
}

/// Opaque handle returned by [`CancellationToken::register_callback`];
/// pass to [`CancellationToken::unregister_callback`] once the wait this
/// callback was guarding has completed through another path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct CallbackReg(Option<u64>);

impl Default for Inner {
    fn default() -> Self {
        Self {
            cancelled: AtomicBool::new(false),
            wakers: Mutex::new(Vec::new()),
            callbacks: Mutex::new(Vec::new()),
            next_callback_id: AtomicU64::new(0),
        }
    }
}

impl CancellationTokenSource {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner::default()),
        }
    }

    /// A handle consumers can wait on / register callbacks against.
    pub fn token(&self) -> CancellationToken {
        CancellationToken {
            inner: Some(Arc::clone(&self.inner)),
        }
    }

    /// Cancel, waking every pending waiter and firing every registered
    /// callback exactly once. Idempotent: a second call is a no-op.
    pub fn cancel(&self) {
        if self.inner.cancelled.swap(true, Ordering::SeqCst) {
            return;
        }
        for waker in self.inner.wakers.lock().unwrap().drain(..) {
            waker.wake();
        }
        let callbacks: Vec<_> = self
            .inner
            .callbacks
            .lock()
            .unwrap()
            .drain(..)
            .collect();
        for (_, cb) in callbacks {
            cb();
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }
}

impl Default for CancellationTokenSource {
    fn default() -> Self {
        Self::new()
    }
}

impl CancellationToken {
    /// A token that can never be cancelled (the "no cancellation requested"
    /// case every wait builder defaults to).
    pub fn none() -> Self {
        Self { inner: None }
    }

    pub fn is_cancelable(&self) -> bool {
        self.inner.is_some()
    }

    pub fn is_cancelled(&self) -> bool {
        match &self.inner {
            Some(inner) => inner.cancelled.load(Ordering::SeqCst),
            None => false,
        }
    }

    /// Await cancellation. Resolves immediately for a non-cancelable token's
    /// dual — actually never resolves, since `none()` can never cancel; use
    /// `is_cancelable()` to special-case that fast path before awaiting.
    pub fn cancelled(&self) -> Cancelled<'_> {
        Cancelled { token: self }
    }

    /// Register `callback` to run exactly once, either right away (already
    /// cancelled) or the first time `cancel()` is called. Returns a handle
    /// to unregister if the caller's wait completes through a different
    /// path first (so a late cancellation doesn't touch a reused node).
    pub(crate) fn register_callback(&self, callback: Box<dyn FnOnce() + Send>) -> CallbackReg {
        let Some(inner) = &self.inner else {
            return CallbackReg(None);
        };
        if inner.cancelled.load(Ordering::SeqCst) {
            callback();
            return CallbackReg(None);
        }
        let id = inner.next_callback_id.fetch_add(1, Ordering::Relaxed);
        let mut callbacks = inner.callbacks.lock().unwrap();
        // Re-check under the lock: cancel() may have run (and drained the
        // list) between our first check and taking the lock.
        if inner.cancelled.load(Ordering::SeqCst) {
            drop(callbacks);
            callback();
            return CallbackReg(None);
        }
        callbacks.push((id, callback));
        CallbackReg(Some(id))
    }

    pub(crate) fn unregister_callback(&self, reg: CallbackReg) {
        let Some(id) = reg.0 else { return };
        let Some(inner) = &self.inner else { return };
        inner.callbacks.lock().unwrap().retain(|(cb_id, _)| *cb_id != id);
    }

    fn register_waker(&self, waker: &Waker) {
        if let Some(inner) = &self.inner {
            inner.wakers.lock().unwrap().push(waker.clone());
        }
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::none()
    }
}

/// Future returned by [`CancellationToken::cancelled`].
pub struct Cancelled<'a> {
    token: &'a CancellationToken,
}

impl Future for Cancelled<'_> {
    type Output = ();

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        if self.token.is_cancelled() {
            return Poll::Ready(());
        }
        self.token.register_waker(cx.waker());
        if self.token.is_cancelled() {
            return Poll::Ready(());
        }
        Poll::Pending
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancel_is_idempotent() {
        let src = CancellationTokenSource::new();
        let tok = src.token();
        src.cancel();
        src.cancel();
        assert!(tok.is_cancelled());
    }

    #[test]
    fn none_token_is_never_cancelable() {
        let tok = CancellationToken::none();
        assert!(!tok.is_cancelable());
        assert!(!tok.is_cancelled());
    }

    #[test]
    fn callback_fires_immediately_if_already_cancelled() {
        let src = CancellationTokenSource::new();
        src.cancel();
        let tok = src.token();
        let fired = Arc::new(AtomicBool::new(false));
        let f = fired.clone();
        tok.register_callback(Box::new(move || f.store(true, Ordering::SeqCst)));
        assert!(fired.load(Ordering::SeqCst));
    }

    #[test]
    fn callback_fires_on_later_cancel() {
        let src = CancellationTokenSource::new();
        let tok = src.token();
        let fired = Arc::new(AtomicBool::new(false));
        let f = fired.clone();
        let reg = tok.register_callback(Box::new(move || f.store(true, Ordering::SeqCst)));
        assert!(!fired.load(Ordering::SeqCst));
        src.cancel();
        assert!(fired.load(Ordering::SeqCst));
        tok.unregister_callback(reg);
    }

    #[test]
    fn unregister_prevents_late_callback() {
        let src = CancellationTokenSource::new();
        let tok = src.token();
        let fired = Arc::new(AtomicBool::new(false));
        let f = fired.clone();
        let reg = tok.register_callback(Box::new(move || f.store(true, Ordering::SeqCst)));
        tok.unregister_callback(reg);
        src.cancel();
        assert!(!fired.load(Ordering::SeqCst));
    }
}
