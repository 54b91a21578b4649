// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Executor-agnostic async coordination primitives built on one shared
//! engine: a FIFO wait queue, a bounded node pool, and a version-guarded
//! completion slot per waiter.
//!
//! Nothing here depends on a particular async runtime — every `wait()`
//! returns a plain [`std::future::Future`] driven by [`std::task::Waker`],
//! built against bare `std::task::{Context, Poll, Waker}` rather than a
//! specific executor.

mod builder;
mod cancel;
mod completion;
mod config;
mod error;
mod lock_manager;
mod node;
mod pool;
mod queue;
mod synchronizer;
mod time;

pub mod bridge;
pub mod primitives;

#[cfg(test)]
mod test_support;

pub use builder::{Timeout, WaitBuilder};
pub use cancel::{CancellationToken, CancellationTokenSource};
pub use config::PoolOptions;
pub use error::{SyncError, SyncResult};
pub use primitives::{AutoResetEvent, CorrelationSource, Counter, ManualResetEvent};
pub use time::{ThreadTimer, Timer, TimerHandle};
