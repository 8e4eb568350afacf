// SPDX-License-Identifier: MIT

//! Handler registry: the closed table of operations the scheduler can
//! dispatch. Built once at startup; an operation name arriving from the
//! database that is not registered is a runtime task failure, never a
//! crash.

use crate::progress::ProgressWriter;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use warden_core::{Task, TaskOutcome, TaskPriority};
use warden_store::Store;

/// Everything a handler invocation receives: the claimed task snapshot,
/// store access, the cooperative cancel flag, and a throttled progress
/// writer.
#[derive(Clone)]
pub struct TaskContext {
    pub task: Task,
    pub store: Store,
    pub cancel: CancellationToken,
    pub progress: ProgressWriter,
}

impl TaskContext {
    /// Handlers poll this between discrete steps.
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

/// A task executor. Implementations decode `ctx.task.metadata` into their
/// typed parameter struct at entry and fold every failure into the
/// returned outcome.
#[async_trait]
pub trait TaskHandler: Send + Sync {
    async fn run(&self, ctx: TaskContext) -> TaskOutcome;
}

/// Extracts the filesystem path a task writes, for single-writer-per-path
/// serialization (downloads and upload processing).
pub type TargetPathFn = fn(&serde_json::Value) -> Option<String>;

/// Registration record for one operation.
#[derive(Clone)]
pub struct HandlerSpec {
    pub handler: Arc<dyn TaskHandler>,
    pub default_priority: TaskPriority,
    pub timeout: Duration,
    /// At most one instance of this operation runs at a time.
    pub serial: bool,
    /// At most one stateful task per zone_name at a time.
    pub zone_exclusive: bool,
    /// Per-operation concurrency cap (overridden by `serial`).
    pub concurrency_cap: Option<usize>,
    pub target_path: Option<TargetPathFn>,
}

impl HandlerSpec {
    pub fn new(handler: Arc<dyn TaskHandler>) -> Self {
        Self {
            handler,
            default_priority: TaskPriority::Medium,
            timeout: Duration::from_secs(300),
            serial: false,
            zone_exclusive: false,
            concurrency_cap: None,
            target_path: None,
        }
    }

    pub fn priority(mut self, v: TaskPriority) -> Self {
        self.default_priority = v;
        self
    }

    pub fn timeout(mut self, v: Duration) -> Self {
        self.timeout = v;
        self
    }

    pub fn serial(mut self) -> Self {
        self.serial = true;
        self
    }

    pub fn zone_exclusive(mut self) -> Self {
        self.zone_exclusive = true;
        self
    }

    pub fn concurrency_cap(mut self, v: usize) -> Self {
        self.concurrency_cap = Some(v);
        self
    }

    pub fn target_path(mut self, v: TargetPathFn) -> Self {
        self.target_path = Some(v);
        self
    }
}

/// Operation name -> handler spec.
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    handlers: HashMap<String, HandlerSpec>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, operation: impl Into<String>, spec: HandlerSpec) {
        let operation = operation.into();
        if self.handlers.insert(operation.clone(), spec).is_some() {
            tracing::warn!(operation, "handler registered twice; last wins");
        }
    }

    pub fn get(&self, operation: &str) -> Option<&HandlerSpec> {
        self.handlers.get(operation)
    }

    pub fn contains(&self, operation: &str) -> bool {
        self.handlers.contains_key(operation)
    }

    pub fn operations(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;
