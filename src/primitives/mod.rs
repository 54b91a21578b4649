// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Concrete primitives built on [`crate::synchronizer::QueuedSynchronizer`].

pub mod auto_reset_event;
pub mod correlation;
pub mod counter;
pub mod manual_reset_event;

pub use auto_reset_event::AutoResetEvent;
pub use correlation::CorrelationSource;
pub use counter::Counter;
pub use manual_reset_event::ManualResetEvent;
