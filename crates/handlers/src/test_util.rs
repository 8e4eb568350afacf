// SPDX-License-Identifier: MIT

//! Shared fixtures for executor tests.

use crate::artifact::ArtifactEngine;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use warden_adapters::CommandRunner;
use warden_core::{Clock, NewTask, Task, WardenConfig};
use warden_queue::{ProgressWriter, RunningIndex, TaskContext};
use warden_store::Store;

/// Install a `pfexec` shim (execs its arguments) ahead of PATH so
/// privileged command lines run unprivileged in tests. Callers must be
/// `#[serial]`: PATH is process-global.
pub(crate) fn install_pfexec_shim() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap_or_else(|e| panic!("tempdir: {e}"));
    let shim = dir.path().join("pfexec");
    std::fs::write(&shim, "#!/bin/sh\nexec \"$@\"\n").unwrap_or_else(|e| panic!("shim: {e}"));
    let mut perms = std::fs::metadata(&shim)
        .unwrap_or_else(|e| panic!("shim meta: {e}"))
        .permissions();
    use std::os::unix::fs::PermissionsExt;
    perms.set_mode(0o755);
    std::fs::set_permissions(&shim, perms).unwrap_or_else(|e| panic!("shim perms: {e}"));

    let path = std::env::var("PATH").unwrap_or_default();
    std::env::set_var("PATH", format!("{}:{}", dir.path().display(), path));
    dir
}

/// Build an engine over a default config (tempdir-agnostic).
pub(crate) fn engine(running: RunningIndex) -> ArtifactEngine {
    ArtifactEngine::new(Arc::new(WardenConfig::default()), CommandRunner::new(), running)
}

/// Insert and claim a task, returning a live handler context.
pub(crate) async fn claimed_context(
    store: &Store,
    operation: &str,
    metadata: serde_json::Value,
) -> TaskContext {
    let clock = Clock::manual(1_700_000_000_000);
    let task = Task::new(
        NewTask::new(operation).metadata(metadata).created_by("test"),
        &clock,
    );
    store.insert_task(&task).await.unwrap_or_else(|e| panic!("insert: {e}"));
    store
        .claim_task(&task.id, clock.now_utc())
        .await
        .unwrap_or_else(|e| panic!("claim: {e}"));
    let task = store
        .get_task(&task.id)
        .await
        .unwrap_or_else(|e| panic!("get: {e}"))
        .unwrap_or_else(|| panic!("task vanished"));
    TaskContext {
        store: store.clone(),
        cancel: tokio_util::sync::CancellationToken::new(),
        progress: ProgressWriter::new(store.clone(), task.id.clone(), Duration::from_millis(10)),
        task,
    }
}

/// An enabled ISO location rooted at a scratch directory.
pub(crate) async fn store_with_tmp_location() -> (Store, warden_core::StorageLocation, tempfile::TempDir)
{
    let store = Store::open_in_memory().await.unwrap_or_else(|e| panic!("store: {e}"));
    let dir = tempfile::tempdir().unwrap_or_else(|e| panic!("tempdir: {e}"));
    let location = warden_core::test_support::location(&dir.path().display().to_string());
    store.insert_location(&location).await.unwrap_or_else(|e| panic!("location: {e}"));
    (store, location, dir)
}

/// Minimal one-shot HTTP server returning `body` for any request.
/// Returns the URL to fetch.
pub(crate) async fn serve_once(body: Vec<u8>) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .unwrap_or_else(|e| panic!("bind: {e}"));
    let addr = listener.local_addr().unwrap_or_else(|e| panic!("addr: {e}"));
    tokio::spawn(async move {
        if let Ok((mut socket, _)) = listener.accept().await {
            let mut request = [0u8; 4096];
            let _ = socket.read(&mut request).await;
            let header = format!(
                "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                body.len()
            );
            let _ = socket.write_all(header.as_bytes()).await;
            let _ = socket.write_all(&body).await;
            let _ = socket.shutdown().await;
        }
    });
    format!("http://{addr}/fixture.iso")
}

/// Convenience: write a file into a location directory.
pub(crate) fn write_file(dir: &std::path::Path, name: &str, contents: &[u8]) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, contents).unwrap_or_else(|e| panic!("write {name}: {e}"));
    path
}
