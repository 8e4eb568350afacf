// SPDX-License-Identifier: MIT

use super::*;
use crate::Store;
use warden_core::test_support::{task, task_with};
use warden_core::{Clock, TaskPriority, TaskStatus};

async fn store() -> Store {
    Store::open_in_memory().await.unwrap()
}

#[tokio::test]
async fn insert_and_get_round_trip() {
    let store = store().await;
    let task = task_with("zpool_create", |c| {
        c.metadata(serde_json::json!({"pool_name": "tank"})).created_by("ops")
    });
    store.insert_task(&task).await.unwrap();

    let loaded = store.get_task(&task.id).await.unwrap().unwrap();
    assert_eq!(loaded.operation, "zpool_create");
    assert_eq!(loaded.status, TaskStatus::Pending);
    assert_eq!(loaded.metadata["pool_name"], "tank");
    assert_eq!(loaded.created_by, "ops");
    assert_eq!(loaded.created_at.timestamp_millis(), task.created_at.timestamp_millis());
}

#[tokio::test]
async fn get_missing_returns_none() {
    let store = store().await;
    let missing = store.get_task(&warden_core::TaskId::from_string("tsk-none")).await.unwrap();
    assert!(missing.is_none());
}

#[tokio::test]
async fn claim_is_exclusive() {
    let store = store().await;
    let clock = Clock::manual(1_700_000_000_000);
    let t = task("artifact_scan_location");
    store.insert_task(&t).await.unwrap();

    assert!(store.claim_task(&t.id, clock.now_utc()).await.unwrap());
    // Second claim loses the CAS.
    assert!(!store.claim_task(&t.id, clock.now_utc()).await.unwrap());

    let claimed = store.get_task(&t.id).await.unwrap().unwrap();
    assert_eq!(claimed.status, TaskStatus::Running);
    assert_eq!(claimed.attempt, 1);
    assert!(claimed.started_at.is_some());
    assert!(claimed.completed_at.is_none());
}

#[tokio::test]
async fn pending_order_is_priority_then_fifo() {
    let store = store().await;
    let low = task_with("op_a", |c| c.priority(TaskPriority::Low));
    let critical = task_with("op_b", |c| c.priority(TaskPriority::Critical));
    let clock = Clock::manual(1_700_000_000_000);
    clock.advance(std::time::Duration::from_millis(10));
    let critical_later = warden_core::Task::new(
        warden_core::NewTask::new("op_c").priority(TaskPriority::Critical),
        &clock,
    );

    store.insert_task(&low).await.unwrap();
    store.insert_task(&critical_later).await.unwrap();
    store.insert_task(&critical).await.unwrap();

    let pending = store.pending_tasks_ordered().await.unwrap();
    let ops: Vec<&str> = pending.iter().map(|t| t.operation.as_str()).collect();
    assert_eq!(ops, vec!["op_b", "op_c", "op_a"]);
}

#[tokio::test]
async fn complete_freezes_terminal_state() {
    let store = store().await;
    let clock = Clock::manual(1_700_000_000_000);
    let t = task("user_create");
    store.insert_task(&t).await.unwrap();
    store.claim_task(&t.id, clock.now_utc()).await.unwrap();

    assert!(store.complete_task(&t.id, clock.now_utc(), Some("done"), None).await.unwrap());
    // Terminal rows reject further transitions.
    assert!(!store.fail_task(&t.id, clock.now_utc(), "late").await.unwrap());
    assert!(!store.complete_task(&t.id, clock.now_utc(), Some("again"), None).await.unwrap());

    let done = store.get_task(&t.id).await.unwrap().unwrap();
    assert_eq!(done.status, TaskStatus::Completed);
    assert_eq!(done.result_message.as_deref(), Some("done"));
    assert_eq!(done.progress_percent, Some(100));
    assert!(done.error.is_none());
}

#[tokio::test]
async fn fail_records_error() {
    let store = store().await;
    let clock = Clock::manual(1_700_000_000_000);
    let t = task("zpool_create");
    store.insert_task(&t).await.unwrap();
    store.claim_task(&t.id, clock.now_utc()).await.unwrap();
    store.fail_task(&t.id, clock.now_utc(), "zpool create exited 1").await.unwrap();

    let failed = store.get_task(&t.id).await.unwrap().unwrap();
    assert_eq!(failed.status, TaskStatus::Failed);
    assert_eq!(failed.error.as_deref(), Some("zpool create exited 1"));
}

#[tokio::test]
async fn requeue_resets_to_pending() {
    let store = store().await;
    let clock = Clock::manual(1_700_000_000_000);
    let t = task("artifact_download_url");
    store.insert_task(&t).await.unwrap();
    store.claim_task(&t.id, clock.now_utc()).await.unwrap();
    store.requeue_task(&t.id, "connection reset").await.unwrap();

    let back = store.get_task(&t.id).await.unwrap().unwrap();
    assert_eq!(back.status, TaskStatus::Pending);
    assert!(back.started_at.is_none());
    assert_eq!(back.attempt, 1);

    // Second claim increments the attempt counter.
    store.claim_task(&t.id, clock.now_utc()).await.unwrap();
    let again = store.get_task(&t.id).await.unwrap().unwrap();
    assert_eq!(again.attempt, 2);
}

#[tokio::test]
async fn cancel_pending_never_touches_running() {
    let store = store().await;
    let clock = Clock::manual(1_700_000_000_000);
    let t = task("zone_sync");
    store.insert_task(&t).await.unwrap();

    assert!(store.cancel_pending_task(&t.id, clock.now_utc(), None).await.unwrap());
    let cancelled = store.get_task(&t.id).await.unwrap().unwrap();
    assert_eq!(cancelled.status, TaskStatus::Cancelled);
    assert!(cancelled.started_at.is_none());

    let running = task("zone_sync");
    store.insert_task(&running).await.unwrap();
    store.claim_task(&running.id, clock.now_utc()).await.unwrap();
    assert!(!store.cancel_pending_task(&running.id, clock.now_utc(), None).await.unwrap());
}

#[tokio::test]
async fn progress_only_applies_to_running() {
    let store = store().await;
    let clock = Clock::manual(1_700_000_000_000);
    let t = task("artifact_download_url");
    store.insert_task(&t).await.unwrap();

    // Pending: progress writes are dropped.
    store
        .set_task_progress(&t.id, Some(50), Some(&serde_json::json!({"status": "downloading"})))
        .await
        .unwrap();
    assert!(store.get_task(&t.id).await.unwrap().unwrap().progress_percent.is_none());

    store.claim_task(&t.id, clock.now_utc()).await.unwrap();
    store
        .set_task_progress(&t.id, Some(50), Some(&serde_json::json!({"downloaded_mb": 10})))
        .await
        .unwrap();
    let running = store.get_task(&t.id).await.unwrap().unwrap();
    assert_eq!(running.progress_percent, Some(50));
    assert_eq!(running.progress_info.unwrap()["downloaded_mb"], 10);
}

#[tokio::test]
async fn dependents_query_finds_pending_children() {
    let store = store().await;
    let parent = task("zone_wait_ssh");
    let child = task_with("zone_sync", |c| c.depends_on(parent.id.clone()));
    store.insert_task(&parent).await.unwrap();
    store.insert_task(&child).await.unwrap();

    let dependents = store.pending_dependents_of(&parent.id).await.unwrap();
    assert_eq!(dependents.len(), 1);
    assert_eq!(dependents[0].id, child.id);
}

#[tokio::test]
async fn stale_running_sweep_marks_worker_crash() {
    let store = store().await;
    let clock = Clock::manual(1_700_000_000_000);
    let stale = task("system_update_install");
    store.insert_task(&stale).await.unwrap();
    store.claim_task(&stale.id, clock.now_utc()).await.unwrap();

    clock.advance(std::time::Duration::from_secs(600));
    let fresh = task("system_update_install");
    store.insert_task(&fresh).await.unwrap();
    store.claim_task(&fresh.id, clock.now_utc()).await.unwrap();

    let cutoff = clock.now_utc() - chrono::Duration::seconds(300);
    let swept = store.sweep_stale_running(cutoff, clock.now_utc()).await.unwrap();
    assert_eq!(swept, 1);

    let crashed = store.get_task(&stale.id).await.unwrap().unwrap();
    assert_eq!(crashed.status, TaskStatus::Failed);
    assert_eq!(crashed.error.as_deref(), Some("worker_crash"));
    let alive = store.get_task(&fresh.id).await.unwrap().unwrap();
    assert_eq!(alive.status, TaskStatus::Running);
}

#[tokio::test]
async fn retention_cleanup_deletes_old_terminal_rows() {
    let store = store().await;
    let clock = Clock::manual(1_700_000_000_000);
    let t = task("user_delete");
    store.insert_task(&t).await.unwrap();
    store.claim_task(&t.id, clock.now_utc()).await.unwrap();
    store.complete_task(&t.id, clock.now_utc(), None, None).await.unwrap();

    clock.advance(std::time::Duration::from_secs(8 * 24 * 3600));
    let cutoff = clock.now_utc() - chrono::Duration::days(7);
    let deleted = store.delete_terminal_tasks_before(TaskStatus::Completed, cutoff).await.unwrap();
    assert_eq!(deleted, 1);
    assert!(store.get_task(&t.id).await.unwrap().is_none());
}

#[tokio::test]
async fn list_tasks_applies_filters() {
    let store = store().await;
    let clock = Clock::manual(1_700_000_000_000);
    for op in ["zpool_create", "zpool_create", "user_create"] {
        store.insert_task(&task(op)).await.unwrap();
    }
    let t = task("zpool_create");
    store.insert_task(&t).await.unwrap();
    store.claim_task(&t.id, clock.now_utc()).await.unwrap();

    let all = store.list_tasks(&TaskFilter::default()).await.unwrap();
    assert_eq!(all.len(), 4);

    let pending_pools = store
        .list_tasks(&TaskFilter {
            status: Some(TaskStatus::Pending),
            operation: Some("zpool_create".to_string()),
            ..TaskFilter::default()
        })
        .await
        .unwrap();
    assert_eq!(pending_pools.len(), 2);

    let limited = store
        .list_tasks(&TaskFilter { limit: Some(2), ..TaskFilter::default() })
        .await
        .unwrap();
    assert_eq!(limited.len(), 2);
}

#[tokio::test]
async fn stats_count_by_status_and_priority() {
    let store = store().await;
    let clock = Clock::manual(1_700_000_000_000);
    store.insert_task(&task_with("a", |c| c.priority(TaskPriority::Critical))).await.unwrap();
    store.insert_task(&task_with("b", |c| c.priority(TaskPriority::Background))).await.unwrap();
    let run = task("c");
    store.insert_task(&run).await.unwrap();
    store.claim_task(&run.id, clock.now_utc()).await.unwrap();

    let stats = store.task_stats().await.unwrap();
    assert_eq!(stats.pending, 2);
    assert_eq!(stats.running, 1);
    assert_eq!(
        stats.pending_by_priority,
        vec![("critical".to_string(), 1), ("background".to_string(), 1)]
    );
}
