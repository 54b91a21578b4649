// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Test-only helpers shared across primitive test modules.

#![cfg(test)]

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Condvar, Mutex};
use std::task::{Context, Poll, Wake, Waker};

struct ThreadWaker {
    ready: Mutex<bool>,
    condvar: Condvar,
}

impl Wake for ThreadWaker {
    fn wake(self: Arc<Self>) {
        *self.ready.lock().unwrap() = true;
        self.condvar.notify_one();
    }
}

/// Drive a future to completion on the calling thread using nothing but its
/// own wakers — a minimal blocking-park executor with no task scheduler
/// behind it.
pub(crate) fn block_on<F: Future>(mut fut: Pin<&mut F>) -> F::Output {
    let waker_state = Arc::new(ThreadWaker {
        ready: Mutex::new(false),
        condvar: Condvar::new(),
    });
    let waker: Waker = Waker::from(waker_state.clone());
    let mut cx = Context::from_waker(&waker);

    loop {
        match fut.as_mut().poll(&mut cx) {
            Poll::Ready(out) => return out,
            Poll::Pending => {
                let mut ready = waker_state.ready.lock().unwrap();
                while !*ready {
                    ready = waker_state.condvar.wait(ready).unwrap();
                }
                *ready = false;
            }
        }
    }
}
