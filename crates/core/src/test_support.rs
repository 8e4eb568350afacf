// SPDX-License-Identifier: MIT

//! Shared test fixtures, available to downstream crates via the
//! `test-support` feature.

use crate::artifact::{LocationKind, StorageLocation};
use crate::clock::Clock;
use crate::task::{NewTask, Task, TaskPriority};
use crate::{LocationId, ZONE_SYSTEM};

/// A manual clock seeded at a fixed, recognizable epoch.
pub fn clock() -> Clock {
    Clock::manual(1_700_000_000_000)
}

/// A pending task with test defaults for the given operation.
pub fn task(operation: &str) -> Task {
    task_with(operation, |c| c)
}

/// A pending task customized through the `NewTask` builder.
pub fn task_with(operation: &str, f: impl FnOnce(NewTask) -> NewTask) -> Task {
    let config = f(NewTask::new(operation)
        .zone_name(ZONE_SYSTEM)
        .priority(TaskPriority::Medium)
        .created_by("test"));
    Task::new(config, &clock())
}

/// An enabled ISO storage location rooted at `path`.
pub fn location(path: &str) -> StorageLocation {
    StorageLocation {
        id: LocationId::new(),
        name: format!("test-{}", crate::short(path.trim_start_matches('/'), 12)),
        path: path.to_string(),
        kind: LocationKind::Iso,
        enabled: true,
        file_count: 0,
        total_size: 0,
        last_scan_at: None,
        scan_errors: 0,
        last_error_message: None,
        created_at: clock().now_utc(),
    }
}
