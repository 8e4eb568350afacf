// SPDX-License-Identifier: MIT

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! warden-queue: the persistent task scheduler.
//!
//! Domain-agnostic: it claims eligible pending tasks under the
//! concurrency policy, dispatches them through the handler registry, and
//! finalizes the result. Domain semantics live entirely in the handlers.

pub mod cancel;
pub mod progress;
pub mod registry;
pub mod running;
pub mod scheduler;

pub use cancel::CancelRegistry;
pub use progress::ProgressWriter;
pub use registry::{HandlerRegistry, HandlerSpec, TargetPathFn, TaskContext, TaskHandler};
pub use running::{RunningEntry, RunningIndex};
pub use scheduler::{CancelOutcome, QueueError, TaskQueue};
