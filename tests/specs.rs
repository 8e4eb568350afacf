// SPDX-License-Identifier: MIT

//! Workspace-level scenarios: the queue, store, and executors working
//! together end to end.

use serial_test::serial;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use warden_core::{
    Clock, NewTask, TaskId, TaskStatus, WardenConfig, ZONE_ARTIFACT,
};
use warden_handlers::{build_registry, ops, HandlerDeps};
use warden_queue::{RunningIndex, TaskQueue};
use warden_store::Store;

const EMPTY_SHA256: &str = "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";

struct World {
    queue: Arc<TaskQueue>,
    store: Store,
    _shim: tempfile::TempDir,
    location_dir: tempfile::TempDir,
    location: warden_core::StorageLocation,
}

/// Install a `pfexec` shim (execs its arguments) ahead of PATH.
fn install_pfexec_shim() -> tempfile::TempDir {
    use std::os::unix::fs::PermissionsExt;
    let dir = tempfile::tempdir().unwrap();
    let shim = dir.path().join("pfexec");
    std::fs::write(&shim, "#!/bin/sh\nexec \"$@\"\n").unwrap();
    let mut perms = std::fs::metadata(&shim).unwrap().permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(&shim, perms).unwrap();
    let path = std::env::var("PATH").unwrap_or_default();
    std::env::set_var("PATH", format!("{}:{}", dir.path().display(), path));
    dir
}

async fn world() -> World {
    let shim = install_pfexec_shim();
    let store = Store::open_in_memory().await.unwrap();
    let config = Arc::new(WardenConfig::default());
    let running = RunningIndex::new();
    let registry = build_registry(&HandlerDeps {
        config: Arc::clone(&config),
        runner: warden_adapters::CommandRunner::new(),
        running: running.clone(),
    });
    let mut queue_config = config.task_queue.clone();
    queue_config.tick_ms = 10;
    let queue = Arc::new(
        TaskQueue::new(store.clone(), Arc::new(registry), queue_config, Clock::system())
            .with_running_index(running),
    );

    let location_dir = tempfile::tempdir().unwrap();
    let location = warden_core::test_support::location(&location_dir.path().display().to_string());
    store.insert_location(&location).await.unwrap();

    World { queue, store, _shim: shim, location_dir, location }
}

async fn wait_terminal(queue: &Arc<TaskQueue>, id: &TaskId, timeout: Duration) -> warden_core::Task {
    let deadline = std::time::Instant::now() + timeout;
    loop {
        queue.tick().await.unwrap();
        if let Some(task) = queue.get(id).await.unwrap() {
            if task.is_terminal() {
                return task;
            }
        }
        assert!(std::time::Instant::now() < deadline, "task {id} never finished");
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

/// Serve one HTTP response; `stall` delays the body after the headers so
/// callers can race other work against the transfer.
async fn serve_fixture(body: Vec<u8>, stall: Duration) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        if let Ok((mut socket, _)) = listener.accept().await {
            let mut request = [0u8; 4096];
            let _ = socket.read(&mut request).await;
            let header = format!(
                "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                body.len()
            );
            let _ = socket.write_all(header.as_bytes()).await;
            tokio::time::sleep(stall).await;
            let _ = socket.write_all(&body).await;
            let _ = socket.shutdown().await;
        }
    });
    format!("http://{addr}/iso1.iso")
}

// S1: download with a matching checksum lands an inventory row and bumps
// the location aggregates.
#[tokio::test]
#[serial]
async fn download_and_verify_records_artifact() {
    let w = world().await;
    let url = serve_fixture(Vec::new(), Duration::ZERO).await;

    let task = w
        .queue
        .enqueue(
            NewTask::new(ops::ARTIFACT_DOWNLOAD_URL)
                .zone_name(ZONE_ARTIFACT)
                .metadata(serde_json::json!({
                    "url": url,
                    "storage_location_id": w.location.id,
                    "filename": "iso1.iso",
                    "final_path": format!("{}/iso1.iso", w.location.path),
                    "checksum": EMPTY_SHA256,
                    "checksum_algorithm": "sha256",
                }))
                .created_by("specs"),
        )
        .await
        .unwrap();

    let done = wait_terminal(&w.queue, &task.id, Duration::from_secs(30)).await;
    assert_eq!(done.status, TaskStatus::Completed, "error: {:?}", done.error);

    let artifact = w
        .store
        .get_artifact_by_path(&format!("{}/iso1.iso", w.location.path))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(artifact.size, 0);
    assert_eq!(artifact.checksum.as_deref(), Some(EMPTY_SHA256));
    assert_eq!(artifact.checksum_verified, Some(true));

    let location = w.store.get_location(&w.location.id).await.unwrap().unwrap();
    assert_eq!(location.file_count, 1);
}

// S2: a wrong expected checksum fails the task, leaves no row, and no
// file on disk.
#[tokio::test]
#[serial]
async fn checksum_mismatch_fails_and_cleans_up() {
    let w = world().await;
    let url = serve_fixture(b"payload".to_vec(), Duration::ZERO).await;
    let final_path = format!("{}/iso1.iso", w.location.path);

    let task = w
        .queue
        .enqueue(
            NewTask::new(ops::ARTIFACT_DOWNLOAD_URL)
                .zone_name(ZONE_ARTIFACT)
                .metadata(serde_json::json!({
                    "url": url,
                    "storage_location_id": w.location.id,
                    "filename": "iso1.iso",
                    "final_path": final_path,
                    "checksum": "0000000000000000000000000000000000000000000000000000000000000000",
                    "checksum_algorithm": "sha256",
                }))
                .created_by("specs"),
        )
        .await
        .unwrap();

    let done = wait_terminal(&w.queue, &task.id, Duration::from_secs(30)).await;
    assert_eq!(done.status, TaskStatus::Failed);
    assert!(done.error.unwrap_or_default().contains("checksum mismatch"));
    assert!(w.store.get_artifact_by_path(&final_path).await.unwrap().is_none());
    assert!(!std::path::Path::new(&final_path).exists());
}

// S3: a scan racing an in-flight download skips the download's target
// path and leaves no partial row behind.
#[tokio::test]
#[serial]
async fn scan_skips_path_of_running_download() {
    let w = world().await;
    // Stall the body long enough for the scan to run mid-download.
    let url = serve_fixture(b"slow-body".to_vec(), Duration::from_secs(3)).await;
    let final_path = format!("{}/iso1.iso", w.location.path);

    let download = w
        .queue
        .enqueue(
            NewTask::new(ops::ARTIFACT_DOWNLOAD_URL)
                .zone_name(ZONE_ARTIFACT)
                .metadata(serde_json::json!({
                    "url": url,
                    "storage_location_id": w.location.id,
                    "filename": "iso1.iso",
                    "final_path": final_path,
                }))
                .created_by("specs"),
        )
        .await
        .unwrap();

    // Claim the download, then wait for its pre-created file to appear.
    w.queue.tick().await.unwrap();
    let deadline = std::time::Instant::now() + Duration::from_secs(10);
    while !std::path::Path::new(&final_path).exists() {
        assert!(std::time::Instant::now() < deadline, "download never pre-created the file");
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    let scan = w
        .queue
        .enqueue(
            NewTask::new(ops::ARTIFACT_SCAN_LOCATION)
                .zone_name(ZONE_ARTIFACT)
                .metadata(serde_json::json!({"storage_location_id": w.location.id}))
                .created_by("specs"),
        )
        .await
        .unwrap();

    let scan_done = wait_terminal(&w.queue, &scan.id, Duration::from_secs(30)).await;
    assert_eq!(scan_done.status, TaskStatus::Completed);
    let summary = scan_done.progress_info.unwrap();
    assert_eq!(summary["skipped"], 1, "summary: {summary}");
    assert_eq!(summary["added"], 0);
    assert_eq!(summary["scanned"], 0);

    // No zero-size row exists for the in-flight path.
    assert!(w.store.get_artifact_by_path(&final_path).await.unwrap().is_none());

    // Once the download completes, exactly one row exists with the bytes.
    let download_done = wait_terminal(&w.queue, &download.id, Duration::from_secs(30)).await;
    assert_eq!(download_done.status, TaskStatus::Completed, "error: {:?}", download_done.error);
    let artifact = w.store.get_artifact_by_path(&final_path).await.unwrap().unwrap();
    assert_eq!(artifact.size, 9);
}

// S4: a provisioning chain linked by depends_on cancels downstream when
// the head fails.
#[tokio::test]
#[serial]
async fn failed_dependency_cancels_the_chain() {
    let w = world().await;

    // Unreachable TEST-NET address with a one-second wait limit.
    let a = w
        .queue
        .enqueue(
            NewTask::new(ops::ZONE_WAIT_SSH)
                .zone_name("web01")
                .metadata(serde_json::json!({
                    "ip": "203.0.113.1",
                    "port": 22,
                    "credentials": {"username": "root", "key_path": "/nonexistent/key"},
                    "timeout_seconds": 1,
                    "poll_interval_seconds": 1,
                }))
                .created_by("specs"),
        )
        .await
        .unwrap();
    let b = w
        .queue
        .enqueue(
            NewTask::new(ops::ZONE_SYNC)
                .zone_name("web01")
                .metadata(serde_json::json!({
                    "ip": "203.0.113.1",
                    "credentials": {"username": "root"},
                    "folder": {"map": "/prov", "to": "/srv"},
                }))
                .depends_on(a.id.clone())
                .created_by("specs"),
        )
        .await
        .unwrap();
    let c = w
        .queue
        .enqueue(
            NewTask::new(ops::ZONE_PROVISION)
                .zone_name("web01")
                .metadata(serde_json::json!({
                    "ip": "203.0.113.1",
                    "credentials": {"username": "root"},
                    "playbook": "site.yml",
                }))
                .depends_on(b.id.clone())
                .created_by("specs"),
        )
        .await
        .unwrap();

    let a_done = wait_terminal(&w.queue, &a.id, Duration::from_secs(60)).await;
    assert_eq!(a_done.status, TaskStatus::Failed);

    let b_done = wait_terminal(&w.queue, &b.id, Duration::from_secs(30)).await;
    let c_done = wait_terminal(&w.queue, &c.id, Duration::from_secs(30)).await;
    assert_eq!(b_done.status, TaskStatus::Cancelled);
    assert_eq!(c_done.status, TaskStatus::Cancelled);
    assert!(b_done.started_at.is_none());
    assert!(c_done.started_at.is_none());
}

// Dependency ordering in the successful direction: B starts only after A
// completes.
#[tokio::test]
#[serial]
async fn dependency_chain_orders_successful_work() {
    let w = world().await;
    std::fs::write(w.location_dir.path().join("seed.iso"), b"seed").unwrap();

    let a = w
        .queue
        .enqueue(
            NewTask::new(ops::ARTIFACT_SCAN_LOCATION)
                .zone_name(ZONE_ARTIFACT)
                .metadata(serde_json::json!({"storage_location_id": w.location.id}))
                .created_by("specs"),
        )
        .await
        .unwrap();
    let b = w
        .queue
        .enqueue(
            NewTask::new(ops::ARTIFACT_SCAN_LOCATION)
                .zone_name(ZONE_ARTIFACT)
                .metadata(serde_json::json!({"storage_location_id": w.location.id}))
                .depends_on(a.id.clone())
                .created_by("specs"),
        )
        .await
        .unwrap();

    let a_done = wait_terminal(&w.queue, &a.id, Duration::from_secs(30)).await;
    let b_done = wait_terminal(&w.queue, &b.id, Duration::from_secs(30)).await;
    assert_eq!(a_done.status, TaskStatus::Completed);
    assert_eq!(b_done.status, TaskStatus::Completed);
    assert!(b_done.started_at.unwrap() >= a_done.completed_at.unwrap());

    // The second scan saw the row the first one inserted.
    assert_eq!(b_done.progress_info.unwrap()["added"], 0);
}

// Worker-crash recovery over a real (file-backed) store restart.
#[tokio::test]
#[serial]
async fn crash_recovery_survives_a_store_reopen() {
    let _shim = install_pfexec_shim();
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("warden.db");

    // First life: claim a task, then "crash" (drop everything).
    {
        let store = Store::open(&db_path).await.unwrap();
        let clock = Clock::manual(1_700_000_000_000);
        let task = warden_core::test_support::task(ops::ZPOOL_CREATE);
        store.insert_task(&task).await.unwrap();
        store.claim_task(&task.id, clock.now_utc()).await.unwrap();
    }

    // Second life, past the grace window.
    let store = Store::open(&db_path).await.unwrap();
    let config = Arc::new(WardenConfig::default());
    let running = RunningIndex::new();
    let registry = build_registry(&HandlerDeps {
        config: Arc::clone(&config),
        runner: warden_adapters::CommandRunner::new(),
        running: running.clone(),
    });
    let clock = Clock::manual(1_700_000_000_000);
    clock.advance(Duration::from_secs(3600));
    let queue = Arc::new(
        TaskQueue::new(store.clone(), Arc::new(registry), config.task_queue.clone(), clock)
            .with_running_index(running),
    );

    assert_eq!(queue.recover().await.unwrap(), 1);
    let failed = store
        .list_tasks(&warden_store::TaskFilter {
            status: Some(TaskStatus::Failed),
            ..warden_store::TaskFilter::default()
        })
        .await
        .unwrap();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].error.as_deref(), Some("worker_crash"));
}
