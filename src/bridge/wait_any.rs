// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Race several same-shaped futures and take whichever settles first —
//! polling every branch on every wake, the same structural idea as the
//! teacher's `select.rs`, minus the thread-parking backoff loop: a real
//! `Waker` means there's no need to poll on a timer.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

type BoxedBranch<T> = Pin<Box<dyn Future<Output = T> + Send>>;

/// Future returned by [`wait_any`]. Branches are trait objects rather than
/// one concrete `F` — the realistic use of this (racing a primitive's own
/// wait future against, say, a linked cancellation future) combines
/// distinctly-typed futures, not N copies of the same one.
pub struct WaitAny<T> {
    branches: Vec<Option<BoxedBranch<T>>>,
}

impl<T> Future for WaitAny<T> {
    /// The winning branch's index and its output.
    type Output = (usize, T);

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        for (index, slot) in this.branches.iter_mut().enumerate() {
            if let Some(fut) = slot {
                if let Poll::Ready(output) = fut.as_mut().poll(cx) {
                    *slot = None;
                    return Poll::Ready((index, output));
                }
            }
        }
        Poll::Pending
    }
}

/// Wait for the first of `futures` to complete. The rest are dropped
/// (cancelling, for this crate's own wait futures, whatever they were
/// waiting on).
pub fn wait_any<T>(futures: Vec<BoxedBranch<T>>) -> WaitAny<T> {
    assert!(!futures.is_empty(), "wait_any requires at least one branch");
    WaitAny {
        branches: futures.into_iter().map(Some).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::block_on;
    use std::future::Future;
    use std::pin::Pin;
    use std::task::{Context, Poll};

    struct ReadyAfter(u32, std::cell::Cell<u32>);
    impl Future for ReadyAfter {
        type Output = u32;
        fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<u32> {
            let polls = self.1.get() + 1;
            self.1.set(polls);
            if polls >= self.0 {
                Poll::Ready(self.0)
            } else {
                cx.waker().wake_by_ref();
                Poll::Pending
            }
        }
    }

    #[test]
    fn first_ready_branch_wins() {
        let branches: Vec<BoxedBranch<u32>> = vec![
            Box::pin(ReadyAfter(3, std::cell::Cell::new(0))),
            Box::pin(ReadyAfter(1, std::cell::Cell::new(0))),
        ];
        let mut fut = Box::pin(wait_any(branches));
        let (index, value) = block_on(fut.as_mut());
        assert_eq!(index, 1);
        assert_eq!(value, 1);
    }
}
