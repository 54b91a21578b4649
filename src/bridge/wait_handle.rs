// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Bridges a blocking, externally-defined wait handle (an OS event object,
//! a foreign library's condition primitive — whatever a host embeds this
//! crate alongside) into a `Future` by parking a thread and racing it
//! against a channel, rather than requiring the blocking side to become
//! async itself.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use crate::bridge::oneshot;
use crate::bridge::wait_any::wait_any;
use crate::cancel::CancellationToken;
use crate::error::{SyncError, SyncResult};

/// Something that can be waited on only by blocking a thread. Implement
/// this for a host's own wait primitive to bridge it into async code.
pub trait ExternalWaitHandle: Send + 'static {
    /// Block the calling thread until signaled or `timeout` elapses.
    /// Returns `true` if signaled, `false` if the timeout elapsed first.
    /// `None` means wait indefinitely.
    fn wait_blocking(&self, timeout: Option<Duration>) -> bool;
}

/// Bridge `handle` onto a background thread and return a future that
/// resolves with its blocking result, or [`SyncError::Canceled`] if `token`
/// cancels first. `token` is raced against the spawned thread's oneshot
/// rather than polled from inside the blocking call, since `handle` itself
/// has no notion of cancellation.
pub async fn wait_handle_async<H: ExternalWaitHandle>(
    handle: H,
    timeout: Option<Duration>,
    token: CancellationToken,
) -> SyncResult<bool> {
    if token.is_cancelable() && token.is_cancelled() {
        return Err(SyncError::Canceled);
    }

    let (tx, rx) = oneshot::channel();
    std::thread::Builder::new()
        .name("qsync-wait-handle".into())
        .spawn(move || {
            let signaled = handle.wait_blocking(timeout);
            tx.send(signaled);
        })
        .expect("failed to spawn wait-handle bridge thread");

    if !token.is_cancelable() {
        return Ok(rx.await);
    }

    let branches: Vec<Pin<Box<dyn Future<Output = SyncResult<bool>> + Send>>> = vec![
        Box::pin(async move { Ok(rx.await) }),
        Box::pin(async move {
            token.cancelled().await;
            Err(SyncError::Canceled)
        }),
    ];
    let (_, result) = wait_any(branches).await;
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::block_on;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    struct AlwaysSignaled;
    impl ExternalWaitHandle for AlwaysSignaled {
        fn wait_blocking(&self, _timeout: Option<Duration>) -> bool {
            true
        }
    }

    #[test]
    fn bridges_a_synchronous_handle() {
        let mut fut = Box::pin(wait_handle_async(AlwaysSignaled, None, CancellationToken::none()));
        assert!(matches!(block_on(fut.as_mut()), Ok(true)));
    }

    #[test]
    fn bridges_a_delayed_handle() {
        struct DelayedSignal(Arc<AtomicBool>);
        impl ExternalWaitHandle for DelayedSignal {
            fn wait_blocking(&self, _timeout: Option<Duration>) -> bool {
                while !self.0.load(Ordering::SeqCst) {
                    std::thread::sleep(Duration::from_millis(5));
                }
                true
            }
        }
        let flag = Arc::new(AtomicBool::new(false));
        let mut fut = Box::pin(wait_handle_async(DelayedSignal(flag.clone()), None, CancellationToken::none()));
        std::thread::sleep(Duration::from_millis(20));
        flag.store(true, Ordering::SeqCst);
        assert!(matches!(block_on(fut.as_mut()), Ok(true)));
    }

    #[test]
    fn cancellation_wins_over_a_slow_handle() {
        use crate::cancel::CancellationTokenSource;
        struct NeverSignals;
        impl ExternalWaitHandle for NeverSignals {
            fn wait_blocking(&self, _timeout: Option<Duration>) -> bool {
                std::thread::sleep(Duration::from_secs(3600));
                true
            }
        }
        let source = CancellationTokenSource::new();
        let mut fut = Box::pin(wait_handle_async(NeverSignals, None, source.token()));
        std::thread::sleep(Duration::from_millis(20));
        source.cancel();
        assert!(matches!(block_on(fut.as_mut()), Err(SyncError::Canceled)));
    }
}
