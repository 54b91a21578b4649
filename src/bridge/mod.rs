// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Async-bridge layer: adapts things that aren't themselves a
//! queued-synchronizer wait — an external OS-level wait handle, a race
//! between several futures, several cancellation tokens linked into one —
//! into the same `Future<Output = SyncResult<_>>` shape everything else in
//! this crate produces.

mod oneshot;
pub mod cancellation;
pub mod wait_any;
pub mod wait_handle;

pub use cancellation::{wait_any_cancelled, wait_for_cancellation, LinkedCancellationSource};
pub use wait_any::wait_any;
pub use wait_handle::{wait_handle_async, ExternalWaitHandle};
