// SPDX-License-Identifier: MIT

use super::*;
use crate::registry::TaskHandler;
use async_trait::async_trait;
use parking_lot::Mutex;
use warden_core::{NewTask, TaskPriority};

/// Records every invocation; behavior is scripted per operation.
#[derive(Clone, Default)]
struct Recorder {
    runs: Arc<Mutex<Vec<String>>>,
}

impl Recorder {
    fn runs(&self) -> Vec<String> {
        self.runs.lock().clone()
    }
}

struct Scripted {
    recorder: Recorder,
    behavior: Behavior,
}

enum Behavior {
    Ok,
    Fail,
    /// Sleep until cancelled (or give up after 5s).
    BlockUntilCancel,
    /// Sleep forever; used to exercise the dispatch timeout and fences.
    Hang,
}

#[async_trait]
impl TaskHandler for Scripted {
    async fn run(&self, ctx: TaskContext) -> TaskOutcome {
        self.recorder.runs.lock().push(ctx.task.operation.clone());
        match self.behavior {
            Behavior::Ok => TaskOutcome::ok("done"),
            Behavior::Fail => TaskOutcome::fail("scripted failure"),
            Behavior::BlockUntilCancel => {
                for _ in 0..100 {
                    if ctx.is_cancelled() {
                        return TaskOutcome::fail("interrupted by cancel");
                    }
                    tokio::time::sleep(Duration::from_millis(50)).await;
                }
                TaskOutcome::ok("never cancelled")
            }
            Behavior::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                TaskOutcome::ok("woke up")
            }
        }
    }
}

struct Harness {
    queue: Arc<TaskQueue>,
    clock: Clock,
    recorder: Recorder,
}

fn spec(recorder: &Recorder, behavior: Behavior) -> HandlerSpec {
    HandlerSpec::new(Arc::new(Scripted { recorder: recorder.clone(), behavior }))
}

async fn harness(configure: impl FnOnce(&Recorder, &mut HandlerRegistry, &mut TaskQueueConfig)) -> Harness {
    let store = Store::open_in_memory().await.unwrap();
    let recorder = Recorder::default();
    let mut registry = HandlerRegistry::new();
    let mut config = TaskQueueConfig { tick_ms: 10, ..TaskQueueConfig::default() };
    configure(&recorder, &mut registry, &mut config);
    let clock = Clock::manual(1_700_000_000_000);
    let queue = Arc::new(TaskQueue::new(store, Arc::new(registry), config, clock.clone()));
    Harness { queue, clock, recorder }
}

async fn wait_for_status(queue: &Arc<TaskQueue>, id: &TaskId, status: TaskStatus) -> Task {
    for _ in 0..200 {
        if let Some(task) = queue.get(id).await.unwrap() {
            if task.status == status {
                return task;
            }
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("task {id} never reached {status}");
}

#[tokio::test]
async fn tick_claims_dispatches_and_completes() {
    let h = harness(|r, reg, _| {
        reg.register("noop", spec(r, Behavior::Ok));
    })
    .await;

    let task = h.queue.enqueue(NewTask::new("noop").created_by("test")).await.unwrap();
    assert_eq!(h.queue.tick().await.unwrap(), 1);

    let done = wait_for_status(&h.queue, &task.id, TaskStatus::Completed).await;
    assert_eq!(done.result_message.as_deref(), Some("done"));
    assert_eq!(done.attempt, 1);
    assert!(done.started_at.is_some());
    assert!(done.completed_at.is_some());
    assert_eq!(h.recorder.runs(), vec!["noop"]);
}

#[tokio::test]
async fn every_task_is_claimed_exactly_once_under_concurrent_ticks() {
    let h = harness(|r, reg, config| {
        reg.register("noop", spec(r, Behavior::Ok));
        config.global_max = 64;
    })
    .await;

    let mut ids = Vec::new();
    for _ in 0..40 {
        ids.push(h.queue.enqueue(NewTask::new("noop")).await.unwrap().id);
    }

    // Sixteen concurrent scheduler passes race over the same pending set.
    let mut ticks = Vec::new();
    for _ in 0..16 {
        let queue = Arc::clone(&h.queue);
        ticks.push(tokio::spawn(async move { queue.tick().await.unwrap() }));
    }
    let mut claimed = 0;
    for tick in ticks {
        claimed += tick.await.unwrap();
    }
    assert_eq!(claimed, 40);

    for id in &ids {
        wait_for_status(&h.queue, id, TaskStatus::Completed).await;
    }
    // The CAS admitted each task exactly once.
    assert_eq!(h.recorder.runs().len(), 40);
}

#[tokio::test]
async fn strict_priority_before_fifo() {
    let h = harness(|r, reg, config| {
        reg.register("work", spec(r, Behavior::Ok));
        config.global_max = 1;
    })
    .await;

    let low = h
        .queue
        .enqueue(NewTask::new("work").priority(TaskPriority::Low))
        .await
        .unwrap();
    h.clock.advance(Duration::from_millis(5));
    let first_critical = h
        .queue
        .enqueue(NewTask::new("work").priority(TaskPriority::Critical))
        .await
        .unwrap();
    h.clock.advance(Duration::from_millis(5));
    let second_critical = h
        .queue
        .enqueue(NewTask::new("work").priority(TaskPriority::Critical))
        .await
        .unwrap();

    // One slot: the earlier critical task wins despite being enqueued
    // after the low-priority one.
    assert_eq!(h.queue.tick().await.unwrap(), 1);
    wait_for_status(&h.queue, &first_critical.id, TaskStatus::Completed).await;
    assert_eq!(h.queue.get(&low.id).await.unwrap().unwrap().status, TaskStatus::Pending);

    assert_eq!(h.queue.tick().await.unwrap(), 1);
    wait_for_status(&h.queue, &second_critical.id, TaskStatus::Completed).await;
    assert_eq!(h.queue.get(&low.id).await.unwrap().unwrap().status, TaskStatus::Pending);

    assert_eq!(h.queue.tick().await.unwrap(), 1);
    wait_for_status(&h.queue, &low.id, TaskStatus::Completed).await;
}

#[tokio::test]
async fn dependency_orders_tasks() {
    let h = harness(|r, reg, _| {
        reg.register("zone_wait_ssh", spec(r, Behavior::Ok));
        reg.register("zone_sync", spec(r, Behavior::Ok));
    })
    .await;

    let a = h.queue.enqueue(NewTask::new("zone_wait_ssh")).await.unwrap();
    h.clock.advance(Duration::from_millis(5));
    let b = h
        .queue
        .enqueue(NewTask::new("zone_sync").depends_on(a.id.clone()))
        .await
        .unwrap();

    // B is ineligible while A is pending/running.
    h.queue.tick().await.unwrap();
    let a_done = wait_for_status(&h.queue, &a.id, TaskStatus::Completed).await;
    assert_eq!(h.queue.get(&b.id).await.unwrap().unwrap().status, TaskStatus::Pending);

    h.clock.advance(Duration::from_millis(5));
    h.queue.tick().await.unwrap();
    let b_done = wait_for_status(&h.queue, &b.id, TaskStatus::Completed).await;
    assert!(b_done.started_at.unwrap() >= a_done.completed_at.unwrap());
}

#[tokio::test]
async fn dependency_failure_cascades_cancellation() {
    let h = harness(|r, reg, _| {
        reg.register("zone_wait_ssh", spec(r, Behavior::Fail));
        reg.register("zone_sync", spec(r, Behavior::Ok));
        reg.register("zone_provision", spec(r, Behavior::Ok));
    })
    .await;

    let a = h.queue.enqueue(NewTask::new("zone_wait_ssh")).await.unwrap();
    let b = h
        .queue
        .enqueue(NewTask::new("zone_sync").depends_on(a.id.clone()))
        .await
        .unwrap();
    let c = h
        .queue
        .enqueue(NewTask::new("zone_provision").depends_on(b.id.clone()))
        .await
        .unwrap();

    h.queue.tick().await.unwrap();
    wait_for_status(&h.queue, &a.id, TaskStatus::Failed).await;

    let b_cancelled = wait_for_status(&h.queue, &b.id, TaskStatus::Cancelled).await;
    let c_cancelled = wait_for_status(&h.queue, &c.id, TaskStatus::Cancelled).await;
    assert!(b_cancelled.started_at.is_none());
    assert!(c_cancelled.started_at.is_none());
    // Only the failing root ever executed.
    assert_eq!(h.recorder.runs(), vec!["zone_wait_ssh"]);
}

#[tokio::test]
async fn enqueue_rejects_bad_dependencies() {
    let h = harness(|r, reg, _| {
        reg.register("work", spec(r, Behavior::Fail));
        reg.register("follow", spec(r, Behavior::Ok));
    })
    .await;

    let missing = h
        .queue
        .enqueue(NewTask::new("follow").depends_on(TaskId::from_string("tsk-ghost")))
        .await;
    assert!(matches!(missing, Err(QueueError::DependencyNotFound(_))));

    let a = h.queue.enqueue(NewTask::new("work")).await.unwrap();
    h.queue.tick().await.unwrap();
    wait_for_status(&h.queue, &a.id, TaskStatus::Failed).await;

    let failed_dep = h.queue.enqueue(NewTask::new("follow").depends_on(a.id.clone())).await;
    assert!(matches!(failed_dep, Err(QueueError::DependencyNotRunnable { .. })));
}

#[tokio::test]
async fn cancel_pending_runs_no_handler() {
    let h = harness(|r, reg, _| {
        reg.register("noop", spec(r, Behavior::Ok));
    })
    .await;

    let task = h.queue.enqueue(NewTask::new("noop")).await.unwrap();
    assert_eq!(h.queue.cancel(&task.id).await.unwrap(), CancelOutcome::Cancelled);

    h.queue.tick().await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    let cancelled = h.queue.get(&task.id).await.unwrap().unwrap();
    assert_eq!(cancelled.status, TaskStatus::Cancelled);
    assert!(cancelled.started_at.is_none());
    assert!(h.recorder.runs().is_empty());
}

#[tokio::test]
async fn cancel_running_signals_the_handler() {
    let h = harness(|r, reg, _| {
        reg.register("slow", spec(r, Behavior::BlockUntilCancel));
    })
    .await;

    let task = h.queue.enqueue(NewTask::new("slow")).await.unwrap();
    h.queue.tick().await.unwrap();
    wait_for_status(&h.queue, &task.id, TaskStatus::Running).await;

    assert_eq!(h.queue.cancel(&task.id).await.unwrap(), CancelOutcome::Signalled);
    let cancelled = wait_for_status(&h.queue, &task.id, TaskStatus::Cancelled).await;
    assert_eq!(cancelled.error.as_deref(), Some("interrupted by cancel"));
}

#[tokio::test]
async fn cancel_terminal_reports_finished() {
    let h = harness(|r, reg, _| {
        reg.register("noop", spec(r, Behavior::Ok));
    })
    .await;

    let task = h.queue.enqueue(NewTask::new("noop")).await.unwrap();
    h.queue.tick().await.unwrap();
    wait_for_status(&h.queue, &task.id, TaskStatus::Completed).await;

    assert_eq!(
        h.queue.cancel(&task.id).await.unwrap(),
        CancelOutcome::AlreadyFinished(TaskStatus::Completed)
    );
    assert_eq!(
        h.queue.cancel(&TaskId::from_string("tsk-ghost")).await.unwrap(),
        CancelOutcome::NotFound
    );
}

#[tokio::test]
async fn unknown_operation_from_store_fails_at_dispatch() {
    let h = harness(|r, reg, _| {
        reg.register("known", spec(r, Behavior::Ok));
    })
    .await;

    // Enqueue-side validation rejects it outright.
    assert!(matches!(
        h.queue.enqueue(NewTask::new("mystery_op")).await,
        Err(QueueError::UnknownOperation(_))
    ));

    // A row written by an older build surfaces as a task failure.
    let stale = warden_core::test_support::task("mystery_op");
    h.queue.store().insert_task(&stale).await.unwrap();
    h.queue.tick().await.unwrap();

    let failed = wait_for_status(&h.queue, &stale.id, TaskStatus::Failed).await;
    assert_eq!(failed.error.as_deref(), Some("unknown_operation"));
}

#[tokio::test]
async fn serial_operations_never_overlap() {
    let h = harness(|r, reg, config| {
        reg.register("zpool_create", spec(r, Behavior::Hang).serial());
        config.global_max = 8;
    })
    .await;

    let first = h.queue.enqueue(NewTask::new("zpool_create")).await.unwrap();
    h.clock.advance(Duration::from_millis(5));
    let second = h.queue.enqueue(NewTask::new("zpool_create")).await.unwrap();

    assert_eq!(h.queue.tick().await.unwrap(), 1);
    wait_for_status(&h.queue, &first.id, TaskStatus::Running).await;

    // While the first hangs, the second stays pending across ticks.
    assert_eq!(h.queue.tick().await.unwrap(), 0);
    assert_eq!(h.queue.get(&second.id).await.unwrap().unwrap().status, TaskStatus::Pending);
}

#[tokio::test]
async fn zone_exclusive_tasks_serialize_per_zone() {
    let h = harness(|r, reg, _| {
        reg.register("zone_provision", spec(r, Behavior::Hang).zone_exclusive());
    })
    .await;

    let web_a = h
        .queue
        .enqueue(NewTask::new("zone_provision").zone_name("web01"))
        .await
        .unwrap();
    h.clock.advance(Duration::from_millis(5));
    let web_b = h
        .queue
        .enqueue(NewTask::new("zone_provision").zone_name("web01"))
        .await
        .unwrap();
    let db = h
        .queue
        .enqueue(NewTask::new("zone_provision").zone_name("db01"))
        .await
        .unwrap();

    // Same zone blocks; a different zone proceeds in the same tick.
    assert_eq!(h.queue.tick().await.unwrap(), 2);
    wait_for_status(&h.queue, &web_a.id, TaskStatus::Running).await;
    wait_for_status(&h.queue, &db.id, TaskStatus::Running).await;
    assert_eq!(h.queue.get(&web_b.id).await.unwrap().unwrap().status, TaskStatus::Pending);
}

#[tokio::test]
async fn per_operation_cap_limits_claims() {
    let h = harness(|r, reg, config| {
        reg.register("artifact_download_url", spec(r, Behavior::Hang).concurrency_cap(2));
        config.global_max = 8;
    })
    .await;

    for _ in 0..4 {
        h.queue.enqueue(NewTask::new("artifact_download_url")).await.unwrap();
        h.clock.advance(Duration::from_millis(1));
    }
    assert_eq!(h.queue.tick().await.unwrap(), 2);
    assert_eq!(h.queue.tick().await.unwrap(), 0);
}

#[tokio::test]
async fn global_max_bounds_a_tick() {
    let h = harness(|r, reg, config| {
        reg.register("work", spec(r, Behavior::Hang));
        config.global_max = 3;
    })
    .await;

    for _ in 0..10 {
        h.queue.enqueue(NewTask::new("work")).await.unwrap();
        h.clock.advance(Duration::from_millis(1));
    }
    assert_eq!(h.queue.tick().await.unwrap(), 3);
    assert_eq!(h.queue.tick().await.unwrap(), 0);
}

#[tokio::test]
async fn handler_timeout_fails_the_task() {
    let h = harness(|r, reg, _| {
        reg.register(
            "slow",
            spec(r, Behavior::Hang).timeout(Duration::from_millis(100)),
        );
    })
    .await;

    let task = h.queue.enqueue(NewTask::new("slow")).await.unwrap();
    h.queue.tick().await.unwrap();

    let failed = wait_for_status(&h.queue, &task.id, TaskStatus::Failed).await;
    assert!(failed.error.unwrap_or_default().contains("timed out"));
}

#[tokio::test]
async fn retries_requeue_with_attempt_tracking() {
    let h = harness(|r, reg, config| {
        reg.register("flaky", spec(r, Behavior::Fail));
        config.max_retries = 2;
        config.retry_backoff_base_secs = 0;
    })
    .await;

    let task = h.queue.enqueue(NewTask::new("flaky")).await.unwrap();

    for _ in 0..3 {
        loop {
            h.queue.tick().await.unwrap();
            let current = h.queue.get(&task.id).await.unwrap().unwrap();
            if current.status != TaskStatus::Running {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        let current = h.queue.get(&task.id).await.unwrap().unwrap();
        if current.status == TaskStatus::Failed {
            break;
        }
    }

    let failed = wait_for_status(&h.queue, &task.id, TaskStatus::Failed).await;
    assert_eq!(failed.attempt, 3);
    assert_eq!(failed.error.as_deref(), Some("scripted failure"));
    assert_eq!(h.recorder.runs().len(), 3);
}

#[tokio::test]
async fn recover_sweeps_stale_running_tasks() {
    let h = harness(|r, reg, config| {
        reg.register("work", spec(r, Behavior::Ok));
        config.recovery_grace_secs = 300;
    })
    .await;

    // Simulate a crash: a row claimed long ago with no worker attached.
    let stale = warden_core::test_support::task("work");
    h.queue.store().insert_task(&stale).await.unwrap();
    h.queue.store().claim_task(&stale.id, h.clock.now_utc()).await.unwrap();
    h.clock.advance(Duration::from_secs(600));

    assert_eq!(h.queue.recover().await.unwrap(), 1);
    let failed = h.queue.get(&stale.id).await.unwrap().unwrap();
    assert_eq!(failed.status, TaskStatus::Failed);
    assert_eq!(failed.error.as_deref(), Some("worker_crash"));
}

#[tokio::test]
async fn cleanup_applies_retention_windows() {
    let h = harness(|r, reg, config| {
        reg.register("work", spec(r, Behavior::Ok));
        config.retention_completed_days = 7;
        config.retention_failed_days = 30;
    })
    .await;

    let done = h.queue.enqueue(NewTask::new("work")).await.unwrap();
    h.queue.tick().await.unwrap();
    wait_for_status(&h.queue, &done.id, TaskStatus::Completed).await;

    // Ten days later: past completed retention, inside failed retention.
    h.clock.advance(Duration::from_secs(10 * 24 * 3600));
    let (completed, failed) = h.queue.cleanup().await.unwrap();
    assert_eq!((completed, failed), (1, 0));
    assert!(h.queue.get(&done.id).await.unwrap().is_none());
}

#[tokio::test]
async fn per_path_exclusion_applies_at_enqueue_and_claim() {
    fn extract(metadata: &serde_json::Value) -> Option<String> {
        metadata.get("final_path").and_then(|v| v.as_str()).map(str::to_string)
    }

    let h = harness(|r, reg, _| {
        reg.register(
            "artifact_download_url",
            spec(r, Behavior::Hang).target_path(extract),
        );
    })
    .await;

    let metadata = serde_json::json!({"final_path": "/data/iso/omnios.iso"});
    h.queue
        .enqueue(NewTask::new("artifact_download_url").metadata(metadata.clone()))
        .await
        .unwrap();

    // A second writer for the same path is refused while the first is pending.
    let busy = h
        .queue
        .enqueue(NewTask::new("artifact_download_url").metadata(metadata.clone()))
        .await;
    assert!(matches!(busy, Err(QueueError::PathBusy(_))));

    // A row that slipped in anyway (e.g. written by another node) is
    // fenced at claim time.
    let slipped = warden_core::test_support::task_with("artifact_download_url", |c| {
        c.metadata(metadata)
    });
    h.queue.store().insert_task(&slipped).await.unwrap();

    assert_eq!(h.queue.tick().await.unwrap(), 1);
    assert_eq!(h.queue.tick().await.unwrap(), 0);
    assert_eq!(
        h.queue.get(&slipped.id).await.unwrap().unwrap().status,
        TaskStatus::Pending
    );
}
