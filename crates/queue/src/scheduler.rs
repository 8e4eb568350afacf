// SPDX-License-Identifier: MIT

//! The task scheduler: select -> claim -> dispatch -> finalize.
//!
//! A single scheduling tick claims eligible pending tasks and dispatches
//! their handlers onto the runtime as independent workers. The claim is a
//! conditional status update in the store; the in-memory indexes here are
//! advisory fences only.

use crate::cancel::CancelRegistry;
use crate::progress::ProgressWriter;
use crate::registry::{HandlerRegistry, HandlerSpec, TaskContext};
use crate::running::{RunningEntry, RunningIndex};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use warden_core::config::TaskQueueConfig;
use warden_core::{Clock, NewTask, Task, TaskId, TaskOutcome, TaskStatus};
use warden_store::{Store, StoreError, TaskFilter};

#[derive(Debug, Error)]
pub enum QueueError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("unknown operation: {0}")]
    UnknownOperation(String),
    #[error("dependency task not found: {0}")]
    DependencyNotFound(String),
    #[error("dependency task {id} is {status}, not completable")]
    DependencyNotRunnable { id: String, status: TaskStatus },
    #[error("another task is already writing {0}")]
    PathBusy(String),
}

/// Result of a cancel request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelOutcome {
    /// Pending task transitioned straight to cancelled; no handler ran.
    Cancelled,
    /// Running task's cancel flag was set; the handler will unwind at its
    /// next poll point.
    Signalled,
    /// Task already terminal.
    AlreadyFinished(TaskStatus),
    NotFound,
}

pub struct TaskQueue {
    store: Store,
    registry: Arc<HandlerRegistry>,
    config: TaskQueueConfig,
    clock: Clock,
    running: RunningIndex,
    cancels: CancelRegistry,
    progress_interval: Duration,
}

impl TaskQueue {
    pub fn new(
        store: Store,
        registry: Arc<HandlerRegistry>,
        config: TaskQueueConfig,
        clock: Clock,
    ) -> Self {
        Self {
            store,
            registry,
            config,
            clock,
            running: RunningIndex::new(),
            cancels: CancelRegistry::new(),
            progress_interval: Duration::from_secs(2),
        }
    }

    /// Share a pre-built running index (handlers hold the same one for
    /// the scan's downloading-path rule).
    pub fn with_running_index(mut self, index: RunningIndex) -> Self {
        self.running = index;
        self
    }

    /// Shared with handlers that need in-flight visibility (the artifact
    /// scan's downloading-path rule).
    pub fn running_index(&self) -> RunningIndex {
        self.running.clone()
    }

    pub fn registry(&self) -> &HandlerRegistry {
        &self.registry
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Validate and persist a new pending task.
    pub async fn enqueue(&self, config: NewTask) -> Result<Task, QueueError> {
        let Some(spec) = self.registry.get(&config.operation) else {
            return Err(QueueError::UnknownOperation(config.operation));
        };

        if let Some(dep_id) = &config.depends_on {
            match self.store.get_task(dep_id).await? {
                None => return Err(QueueError::DependencyNotFound(dep_id.to_string())),
                Some(dep) if dep.is_terminal() && dep.status != TaskStatus::Completed => {
                    return Err(QueueError::DependencyNotRunnable {
                        id: dep_id.to_string(),
                        status: dep.status,
                    });
                }
                Some(_) => {}
            }
        }

        // Single-writer-per-path: refuse a second task targeting the same
        // file while one is pending or running.
        if let Some(path) = spec.target_path.and_then(|f| f(&config.metadata)) {
            if self.running.path_busy(&path) || self.pending_path_busy(&path).await? {
                return Err(QueueError::PathBusy(path));
            }
        }

        let task = Task::new(config, &self.clock);
        self.store.insert_task(&task).await?;
        tracing::info!(
            task_id = %task.id,
            operation = %task.operation,
            zone = %task.zone_name,
            priority = %task.priority,
            "task enqueued"
        );
        Ok(task)
    }

    async fn pending_path_busy(&self, path: &str) -> Result<bool, QueueError> {
        for operation in self.registry.operations() {
            let Some(spec) = self.registry.get(operation) else { continue };
            let Some(extract) = spec.target_path else { continue };
            let pending = self
                .store
                .list_tasks(&TaskFilter {
                    status: Some(TaskStatus::Pending),
                    operation: Some(operation.to_string()),
                    ..TaskFilter::default()
                })
                .await?;
            if pending.iter().any(|t| extract(&t.metadata).as_deref() == Some(path)) {
                return Ok(true);
            }
        }
        Ok(false)
    }

    pub async fn get(&self, id: &TaskId) -> Result<Option<Task>, QueueError> {
        Ok(self.store.get_task(id).await?)
    }

    pub async fn list(&self, filter: &TaskFilter) -> Result<Vec<Task>, QueueError> {
        Ok(self.store.list_tasks(filter).await?)
    }

    /// Cancel: CAS for pending tasks, cooperative flag for running ones.
    pub async fn cancel(&self, id: &TaskId) -> Result<CancelOutcome, QueueError> {
        let Some(task) = self.store.get_task(id).await? else {
            return Ok(CancelOutcome::NotFound);
        };
        match task.status {
            TaskStatus::Pending => {
                if self.store.cancel_pending_task(id, self.clock.now_utc(), None).await? {
                    self.cascade_cancel(id).await?;
                    tracing::info!(task_id = %id, "pending task cancelled");
                    Ok(CancelOutcome::Cancelled)
                } else if self.cancels.cancel(id) {
                    // Lost the race to a claim; fall back to signalling.
                    Ok(CancelOutcome::Signalled)
                } else {
                    Ok(CancelOutcome::AlreadyFinished(task.status))
                }
            }
            TaskStatus::Running => {
                if self.cancels.cancel(id) {
                    tracing::info!(task_id = %id, "running task signalled to cancel");
                    Ok(CancelOutcome::Signalled)
                } else {
                    // Not in flight here: let the crash sweep reconcile it.
                    Ok(CancelOutcome::AlreadyFinished(task.status))
                }
            }
            status => Ok(CancelOutcome::AlreadyFinished(status)),
        }
    }

    /// One scheduling pass. Returns the number of tasks dispatched.
    pub async fn tick(self: &Arc<Self>) -> Result<usize, QueueError> {
        let pending = self.store.pending_tasks_ordered().await?;
        if pending.is_empty() {
            return Ok(0);
        }

        let mut dispatched = 0;
        for task in pending {
            if self.running.len() >= self.config.global_max {
                break;
            }

            let Some(spec) = self.registry.get(&task.operation).cloned() else {
                // Claim first so the failure transition respects the same
                // CAS discipline as every other worker.
                let now = self.clock.now_utc();
                if self.store.claim_task(&task.id, now).await? {
                    self.store.fail_task(&task.id, self.clock.now_utc(), "unknown_operation").await?;
                    self.cascade_cancel(&task.id).await?;
                    tracing::error!(task_id = %task.id, operation = %task.operation, "unknown operation");
                }
                continue;
            };

            if !self.dependency_satisfied(&task).await? {
                continue;
            }

            // Concurrency fences. The running index already contains this
            // tick's earlier claims, so one pass stays within policy.
            let op_running = self.running.count_operation(&task.operation);
            if spec.serial && op_running > 0 {
                continue;
            }
            if let Some(cap) = spec.concurrency_cap {
                if op_running >= cap {
                    continue;
                }
            }
            if spec.zone_exclusive && self.running.zone_busy(&task.zone_name) {
                continue;
            }
            let target_path = spec.target_path.and_then(|f| f(&task.metadata));
            if let Some(path) = &target_path {
                if self.running.path_busy(path) {
                    continue;
                }
            }

            if !self.store.claim_task(&task.id, self.clock.now_utc()).await? {
                // Another worker won.
                continue;
            }

            self.running.insert(
                task.id.clone(),
                RunningEntry {
                    operation: task.operation.clone(),
                    zone_name: task.zone_name.clone(),
                    zone_exclusive: spec.zone_exclusive,
                    target_path,
                },
            );
            let token = self.cancels.register(task.id.clone());
            dispatched += 1;
            self.spawn_dispatch(task, spec, token);
        }
        Ok(dispatched)
    }

    /// True when the task may run now. Cancels the task (and cascades)
    /// when its dependency can never complete.
    async fn dependency_satisfied(&self, task: &Task) -> Result<bool, QueueError> {
        let Some(dep_id) = &task.depends_on else { return Ok(true) };
        let now = self.clock.now_utc();
        match self.store.get_task(dep_id).await? {
            Some(dep) if dep.status == TaskStatus::Completed => Ok(true),
            Some(dep) if dep.is_terminal() => {
                let reason = format!("dependency {} {}", dep.id, dep.status);
                if self.store.cancel_pending_task(&task.id, now, Some(&reason)).await? {
                    tracing::info!(task_id = %task.id, %reason, "task cancelled");
                    self.cascade_cancel(&task.id).await?;
                }
                Ok(false)
            }
            Some(_) => Ok(false),
            None => {
                let reason = format!("dependency {dep_id} does not exist");
                if self.store.cancel_pending_task(&task.id, now, Some(&reason)).await? {
                    self.cascade_cancel(&task.id).await?;
                }
                Ok(false)
            }
        }
    }

    fn spawn_dispatch(self: &Arc<Self>, task: Task, spec: HandlerSpec, token: CancellationToken) {
        let queue = Arc::clone(self);
        tokio::spawn(async move {
            queue.dispatch(task, spec, token).await;
        });
    }

    async fn dispatch(&self, task: Task, spec: HandlerSpec, token: CancellationToken) {
        let task_id = task.id.clone();
        let operation = task.operation.clone();
        let started = Instant::now();

        // Re-read so the handler sees the claimed row (status, attempt).
        let snapshot = match self.store.get_task(&task_id).await {
            Ok(Some(current)) => current,
            _ => task,
        };
        let attempt = snapshot.attempt;

        let ctx = TaskContext {
            task: snapshot,
            store: self.store.clone(),
            cancel: token.clone(),
            progress: ProgressWriter::new(
                self.store.clone(),
                task_id.clone(),
                self.progress_interval,
            ),
        };

        let handler = Arc::clone(&spec.handler);
        let mut run = tokio::spawn(async move { handler.run(ctx).await });
        let outcome = tokio::select! {
            result = &mut run => match result {
                Ok(outcome) => outcome,
                Err(e) => TaskOutcome::fail(format!("handler aborted: {e}")),
            },
            _ = tokio::time::sleep(spec.timeout) => {
                run.abort();
                TaskOutcome::fail(format!(
                    "handler timed out after {}s",
                    spec.timeout.as_secs()
                ))
            }
        };

        // Free the concurrency slot before any retry backoff sleep.
        self.running.remove(&task_id);
        let elapsed_ms = started.elapsed().as_millis() as u64;

        if let Err(e) = self.finalize(&task_id, &operation, attempt, outcome, &token, elapsed_ms).await
        {
            tracing::error!(task_id = %task_id, error = %e, "failed to finalize task");
        }
        self.cancels.remove(&task_id);
    }

    async fn finalize(
        &self,
        task_id: &TaskId,
        operation: &str,
        attempt: u32,
        outcome: TaskOutcome,
        token: &CancellationToken,
        elapsed_ms: u64,
    ) -> Result<(), QueueError> {
        let now = self.clock.now_utc();

        if outcome.success {
            self.store
                .complete_task(task_id, now, outcome.message.as_deref(), outcome.progress_info.as_ref())
                .await?;
            tracing::info!(task_id = %task_id, operation, elapsed_ms, "task completed");
            return Ok(());
        }

        if token.is_cancelled() {
            let reason = outcome.error.as_deref().unwrap_or("cancelled");
            self.store.cancel_running_task(task_id, now, Some(reason)).await?;
            self.cascade_cancel(task_id).await?;
            tracing::info!(task_id = %task_id, operation, elapsed_ms, "task cancelled");
            return Ok(());
        }

        let error = outcome.error.unwrap_or_else(|| "handler failed".to_string());
        if attempt <= self.config.max_retries {
            let backoff = Duration::from_secs(
                self.config
                    .retry_backoff_base_secs
                    .saturating_mul(1u64 << (attempt.clamp(1, 16) - 1)),
            );
            tracing::warn!(
                task_id = %task_id,
                operation,
                attempt,
                backoff_secs = backoff.as_secs(),
                error = %error,
                "task failed, retrying"
            );
            tokio::time::sleep(backoff).await;
            if token.is_cancelled() {
                self.store.cancel_running_task(task_id, self.clock.now_utc(), Some(&error)).await?;
                self.cascade_cancel(task_id).await?;
            } else {
                self.store.requeue_task(task_id, &error).await?;
            }
            return Ok(());
        }

        self.store.fail_task(task_id, now, &error).await?;
        self.cascade_cancel(task_id).await?;
        tracing::warn!(task_id = %task_id, operation, elapsed_ms, error = %error, "task failed");
        Ok(())
    }

    /// Propagate `cancelled` down the dependency chain. Idempotent: the
    /// CAS lets each descendant be cancelled exactly once.
    async fn cascade_cancel(&self, root: &TaskId) -> Result<(), QueueError> {
        let mut worklist = vec![root.clone()];
        while let Some(id) = worklist.pop() {
            for dependent in self.store.pending_dependents_of(&id).await? {
                let reason = format!("dependency {id} did not complete");
                if self
                    .store
                    .cancel_pending_task(&dependent.id, self.clock.now_utc(), Some(&reason))
                    .await?
                {
                    tracing::info!(task_id = %dependent.id, %reason, "task cancelled");
                    worklist.push(dependent.id);
                }
            }
        }
        Ok(())
    }

    /// Startup recovery: no task silently stays `running` across a
    /// process crash.
    pub async fn recover(&self) -> Result<u64, QueueError> {
        let now = self.clock.now_utc();
        let cutoff = now - chrono::Duration::seconds(self.config.recovery_grace_secs);
        let swept = self.store.sweep_stale_running(cutoff, now).await?;
        if swept > 0 {
            tracing::warn!(swept, "recovered stale running tasks as worker_crash");
        }
        Ok(swept)
    }

    /// Retention cleanup. Returns (completed deleted, failed/cancelled deleted).
    pub async fn cleanup(&self) -> Result<(u64, u64), QueueError> {
        let now = self.clock.now_utc();
        let completed_cutoff = now - chrono::Duration::days(self.config.retention_completed_days);
        let failed_cutoff = now - chrono::Duration::days(self.config.retention_failed_days);

        let completed =
            self.store.delete_terminal_tasks_before(TaskStatus::Completed, completed_cutoff).await?;
        let failed =
            self.store.delete_terminal_tasks_before(TaskStatus::Failed, failed_cutoff).await?;
        let cancelled =
            self.store.delete_terminal_tasks_before(TaskStatus::Cancelled, failed_cutoff).await?;
        Ok((completed, failed + cancelled))
    }

    /// Run the scheduling loop until `shutdown` fires.
    pub fn start(self: &Arc<Self>, shutdown: CancellationToken) -> tokio::task::JoinHandle<()> {
        let queue = Arc::clone(self);
        tokio::spawn(async move {
            let tick = Duration::from_millis(queue.config.tick_ms);
            let cleanup_every = Duration::from_secs(queue.config.cleanup_interval_secs.max(1));
            let mut last_cleanup = Instant::now();
            tracing::info!(
                tick_ms = queue.config.tick_ms,
                global_max = queue.config.global_max,
                operations = queue.registry.len(),
                "task queue started"
            );
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = tokio::time::sleep(tick) => {}
                }
                if let Err(e) = queue.tick().await {
                    tracing::error!(error = %e, "scheduler tick failed");
                }
                if last_cleanup.elapsed() >= cleanup_every {
                    last_cleanup = Instant::now();
                    match queue.cleanup().await {
                        Ok((completed, failed)) if completed + failed > 0 => {
                            tracing::info!(completed, failed, "retention cleanup removed tasks");
                        }
                        Err(e) => tracing::error!(error = %e, "retention cleanup failed"),
                        _ => {}
                    }
                }
            }
            tracing::info!("task queue stopped");
        })
    }
}

#[cfg(test)]
#[path = "scheduler_tests.rs"]
mod tests;
