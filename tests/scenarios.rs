// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! End-to-end scenarios exercising each primitive the way a caller would,
//! combining a handful of threads each driving their own future with the
//! crate's own waker-based block_on — no async runtime dependency, the
//! same posture the library itself takes.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::task::{Context, Poll, Wake, Waker};
use std::thread;
use std::time::Duration;

use qsync_core::bridge::{wait_any, LinkedCancellationSource};
use qsync_core::primitives::{AutoResetEvent, CorrelationSource, Counter, ManualResetEvent};
use qsync_core::{CancellationTokenSource, SyncError, Timeout, WaitBuilder};

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

fn block_on<F: Future>(mut fut: Pin<&mut F>) -> F::Output {
    let state = Arc::new(ThreadWaker {
        ready: Mutex::new(false),
        condvar: Condvar::new(),
    });
    let waker: Waker = Waker::from(state.clone());
    let mut cx = Context::from_waker(&waker);
    loop {
        match fut.as_mut().poll(&mut cx) {
            Poll::Ready(out) => return out,
            Poll::Pending => {
                let mut ready = state.ready.lock().unwrap();
                while !*ready {
                    ready = state.condvar.wait(ready).unwrap();
                }
                *ready = false;
            }
        }
    }
}

#[test]
fn auto_reset_event_wakes_waiters_one_at_a_time_in_fifo_order() {
    let event = Arc::new(AutoResetEvent::new(false));
    let order = Arc::new(Mutex::new(Vec::new()));

    let handles: Vec<_> = (0..3)
        .map(|id| {
            let event = event.clone();
            let order = order.clone();
            thread::spawn(move || {
                let mut fut = Box::pin(event.wait());
                let result = block_on(fut.as_mut());
                if result.is_ok() {
                    order.lock().unwrap().push(id);
                }
            })
        })
        .collect();

    // Let every thread register as a waiter before pulsing.
    thread::sleep(Duration::from_millis(30));
    for _ in 0..3 {
        event.set();
        thread::sleep(Duration::from_millis(10));
    }

    for h in handles {
        h.join().unwrap();
    }
    assert_eq!(order.lock().unwrap().len(), 3);
}

#[test]
fn manual_reset_event_broadcasts_to_every_waiter_and_stays_open() {
    let event = Arc::new(ManualResetEvent::new(false));
    let handles: Vec<_> = (0..5)
        .map(|_| {
            let event = event.clone();
            thread::spawn(move || {
                let mut fut = Box::pin(event.wait());
                block_on(fut.as_mut())
            })
        })
        .collect();

    thread::sleep(Duration::from_millis(30));
    event.set();

    for h in handles {
        assert!(h.join().unwrap().unwrap());
    }

    // Still open: a waiter arriving after `set()` passes immediately.
    let mut late = Box::pin(event.wait());
    assert!(block_on(late.as_mut()).unwrap());
}

#[test]
fn counter_hands_each_unit_to_exactly_one_consumer() {
    let counter = Arc::new(Counter::new(0));
    let total_seen = Arc::new(AtomicUsize::new(0));

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let counter = counter.clone();
            let total_seen = total_seen.clone();
            thread::spawn(move || {
                let mut fut = Box::pin(counter.wait());
                if block_on(fut.as_mut()).is_ok() {
                    total_seen.fetch_add(1, Ordering::SeqCst);
                }
            })
        })
        .collect();

    thread::sleep(Duration::from_millis(30));
    counter.increment_by(4);

    for h in handles {
        h.join().unwrap();
    }
    assert_eq!(total_seen.load(Ordering::SeqCst), 4);
    assert_eq!(counter.value(), 0);
}

#[test]
fn correlation_source_matches_producer_to_the_right_waiter() {
    let source = Arc::new(CorrelationSource::<&'static str, u32>::new());

    let waiter_a = {
        let source = source.clone();
        thread::spawn(move || {
            let mut fut = Box::pin(source.wait("request-a"));
            block_on(fut.as_mut())
        })
    };
    let waiter_b = {
        let source = source.clone();
        thread::spawn(move || {
            let mut fut = Box::pin(source.wait("request-b"));
            block_on(fut.as_mut())
        })
    };

    thread::sleep(Duration::from_millis(30));
    assert!(source.pulse(&"request-b", Ok(2)));
    assert!(source.pulse(&"request-a", Ok(1)));

    assert_eq!(waiter_a.join().unwrap().unwrap(), 1);
    assert_eq!(waiter_b.join().unwrap().unwrap(), 2);
}

#[test]
fn a_cancelled_wait_resolves_with_canceled_and_the_node_is_reclaimed() {
    let event = AutoResetEvent::new(false);
    let source = CancellationTokenSource::new();
    let builder = WaitBuilder::new().cancellation_token(source.token());

    let mut fut = Box::pin(event.wait_with(builder));
    // Poll once to register the wait, then cancel before it can resolve.
    let waker = Waker::from(Arc::new(ThreadWaker {
        ready: Mutex::new(false),
        condvar: Condvar::new(),
    }));
    let mut cx = Context::from_waker(&waker);
    assert!(matches!(fut.as_mut().poll(&mut cx), Poll::Pending));

    source.cancel();
    let result = block_on(fut.as_mut());
    assert!(matches!(result, Err(SyncError::Canceled)));
}

#[test]
fn a_timed_out_event_wait_falls_back_to_false_by_default() {
    let event = AutoResetEvent::new(false);
    let builder = WaitBuilder::new().timeout(Timeout::After(Duration::from_millis(20)));
    let mut fut = Box::pin(event.wait_with(builder));
    assert_eq!(block_on(fut.as_mut()).unwrap(), false);
}

#[test]
fn throw_on_timeout_surfaces_a_timeout_error_instead() {
    let event = AutoResetEvent::new(false);
    let builder = WaitBuilder::new()
        .timeout(Timeout::After(Duration::from_millis(20)))
        .throw_on_timeout(true);
    let mut fut = Box::pin(event.wait_with(builder));
    assert!(matches!(block_on(fut.as_mut()), Err(SyncError::Timeout)));
}

#[test]
fn wait_any_picks_whichever_event_fires_first() {
    let slow = Arc::new(AutoResetEvent::new(false));
    let fast = Arc::new(AutoResetEvent::new(false));

    let fast_clone = fast.clone();
    thread::spawn(move || {
        thread::sleep(Duration::from_millis(15));
        fast_clone.set();
    });

    let branches: Vec<Pin<Box<dyn Future<Output = qsync_core::SyncResult<bool>> + Send>>> = vec![
        Box::pin(async move { slow.wait().await }),
        Box::pin(async move { fast.wait().await }),
    ];
    let mut raced = Box::pin(wait_any(branches));
    let (winner, result) = block_on(raced.as_mut());
    assert_eq!(winner, 1);
    assert!(result.unwrap());
}

#[test]
fn linked_cancellation_fires_when_either_parent_does() {
    let a = CancellationTokenSource::new();
    let b = CancellationTokenSource::new();
    let linked = LinkedCancellationSource::new(&[a.token(), b.token()]);

    let event = AutoResetEvent::new(false);
    let builder = WaitBuilder::new().cancellation_token(linked.token());
    let mut fut = Box::pin(event.wait_with(builder));

    b.cancel();
    let result = block_on(fut.as_mut());
    assert!(matches!(result, Err(SyncError::Canceled)));
    assert_eq!(linked.origin_index(), Some(1));
}

#[test]
fn disposing_fails_every_pending_waiter() {
    let event = Arc::new(AutoResetEvent::new(false));
    let handles: Vec<_> = (0..3)
        .map(|_| {
            let event = event.clone();
            thread::spawn(move || {
                let mut fut = Box::pin(event.wait());
                block_on(fut.as_mut())
            })
        })
        .collect();

    thread::sleep(Duration::from_millis(30));
    event.dispose();

    for h in handles {
        assert!(matches!(h.join().unwrap(), Err(SyncError::Disposed(_))));
    }
}
