// SPDX-License-Identifier: MIT

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! warden-core: domain types for the warden control plane.

pub mod artifact;
pub mod clock;
pub mod config;
pub mod id;
pub mod logstream;
pub mod task;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

pub use artifact::{
    file_extension, mime_type_for, Artifact, ArtifactId, ChecksumAlgorithm, LocationId,
    LocationKind, StorageLocation,
};
pub use clock::Clock;
pub use config::{ConfigError, WardenConfig};
pub use id::short;
pub use logstream::{LogSession, LogSessionId, LogSessionStatus};
pub use task::{
    NewTask, Task, TaskId, TaskOutcome, TaskPriority, TaskStatus, ZONE_ARTIFACT, ZONE_SYSTEM,
};
