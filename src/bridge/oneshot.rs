// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! A single-producer, single-shot completion cell, the same shape as
//! [`crate::completion::CompletionSource`] but standalone — bridge adapters
//! complete exactly once and are never pooled, so there is no queue or
//! free-list to share.

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll, Waker};

struct Shared<T> {
    result: Mutex<Option<T>>,
    waker: Mutex<Option<Waker>>,
}

pub(crate) struct OneshotSender<T> {
    shared: Arc<Shared<T>>,
}

pub(crate) struct OneshotReceiver<T> {
    shared: Arc<Shared<T>>,
}

pub(crate) fn channel<T>() -> (OneshotSender<T>, OneshotReceiver<T>) {
    let shared = Arc::new(Shared {
        result: Mutex::new(None),
        waker: Mutex::new(None),
    });
    (
        OneshotSender { shared: Arc::clone(&shared) },
        OneshotReceiver { shared },
    )
}

impl<T> OneshotSender<T> {
    /// Consumes the sender: a oneshot fires exactly once.
    pub(crate) fn send(self, value: T) {
        *self.shared.result.lock().unwrap() = Some(value);
        if let Some(waker) = self.shared.waker.lock().unwrap().take() {
            waker.wake();
        }
    }
}

impl<T> Future for OneshotReceiver<T> {
    type Output = T;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<T> {
        let mut result = self.shared.result.lock().unwrap();
        if let Some(value) = result.take() {
            return Poll::Ready(value);
        }
        drop(result);
        *self.shared.waker.lock().unwrap() = Some(cx.waker().clone());
        // Re-check: the sender may have fired between our first check and
        // registering the waker.
        result = self.shared.result.lock().unwrap();
        match result.take() {
            Some(value) => Poll::Ready(value),
            None => Poll::Pending,
        }
    }
}
