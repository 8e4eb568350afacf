// SPDX-License-Identifier: MIT

//! Daemon startup and shutdown sequencing.

use super::{DaemonPaths, LifecycleError};
use crate::api::{self, AppState};
use crate::logstream::LogStreamManager;
use fs2::FileExt;
use std::io::Write;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use warden_adapters::CommandRunner;
use warden_core::Clock;
use warden_handlers::{build_registry, HandlerDeps};
use warden_queue::{RunningIndex, TaskQueue};
use warden_store::Store;

/// A started daemon: router state plus the background task handles.
pub struct Daemon {
    pub state: AppState,
    pub shutdown: CancellationToken,
    queue_handle: tokio::task::JoinHandle<()>,
    janitor_handle: tokio::task::JoinHandle<()>,
    // Held for the daemon's lifetime; dropping releases the lock.
    _lock_file: std::fs::File,
}

/// Ordered startup: lock -> store -> recovery -> registry -> queue ->
/// janitors. The HTTP bind happens last, in `run`.
pub async fn startup(paths: &DaemonPaths) -> Result<Daemon, LifecycleError> {
    match startup_inner(paths).await {
        Ok(daemon) => Ok(daemon),
        Err(e) => {
            // Leave the lock file alone if another daemon owns it.
            if !matches!(e, LifecycleError::LockFailed(_)) {
                let _ = std::fs::remove_file(&paths.lock_path);
            }
            Err(e)
        }
    }
}

async fn startup_inner(paths: &DaemonPaths) -> Result<Daemon, LifecycleError> {
    // 1. State directories.
    std::fs::create_dir_all(&paths.state_dir)?;
    std::fs::create_dir_all(&paths.log_dir)?;

    // 2. Exclusive lock first; avoid truncating before we hold it so a
    // failed start never wipes the running daemon's PID.
    let lock_file = std::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(false)
        .open(&paths.lock_path)?;
    lock_file.try_lock_exclusive().map_err(LifecycleError::LockFailed)?;
    let mut lock_file = lock_file;
    lock_file.set_len(0)?;
    writeln!(lock_file, "{}", std::process::id())?;

    // 3. Open the store.
    let store = Store::open(&paths.db_path)
        .await?
        .with_bulk_chunk(paths.config.host_monitoring.performance.batch_size);

    // 4. Registry and queue share one running-task index (the scan race
    // rule reads it).
    let runner = CommandRunner::new();
    let running = RunningIndex::new();
    let registry = build_registry(&HandlerDeps {
        config: Arc::clone(&paths.config),
        runner,
        running: running.clone(),
    });
    let queue = Arc::new(
        TaskQueue::new(
            store.clone(),
            Arc::new(registry),
            paths.config.task_queue.clone(),
            Clock::system(),
        )
        .with_running_index(running),
    );

    // 5. Recovery sweep: nothing stays `running` across a crash.
    let swept = queue.recover().await.map_err(|e| match e {
        warden_queue::QueueError::Store(e) => LifecycleError::Store(e),
        other => LifecycleError::Io(std::io::Error::other(other.to_string())),
    })?;
    if swept > 0 {
        tracing::warn!(swept, "recovered stale running tasks at startup");
    }

    // 6. Background loops.
    let shutdown = CancellationToken::new();
    let queue_handle = queue.start(shutdown.clone());
    let logs = LogStreamManager::new(Arc::clone(&paths.config), store.clone());
    let janitor_handle = logs.spawn_janitor(shutdown.clone());

    let state = AppState {
        config: Arc::clone(&paths.config),
        store,
        queue,
        runner,
        logs,
        state_dir: paths.state_dir.clone(),
    };

    tracing::info!(
        state_dir = %paths.state_dir.display(),
        operations = state.queue.registry().len(),
        "daemon started"
    );
    Ok(Daemon { state, shutdown, queue_handle, janitor_handle, _lock_file: lock_file })
}

/// Full daemon run: startup, HTTP bind, serve until SIGTERM/SIGINT, then
/// drain the background loops.
pub async fn run(paths: DaemonPaths) -> Result<(), LifecycleError> {
    let daemon = startup(&paths).await?;

    let port = crate::env::http_port().unwrap_or(paths.config.server.port);
    let bind_addr = format!("{}:{}", paths.config.server.bind_address, port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .map_err(|e| LifecycleError::BindFailed(bind_addr.clone(), e))?;
    tracing::info!(addr = %bind_addr, "listening");

    let shutdown = daemon.shutdown.clone();
    let router = api::router(daemon.state.clone());
    let serve = axum::serve(listener, router).with_graceful_shutdown({
        let shutdown = shutdown.clone();
        async move {
            wait_for_signal().await;
            shutdown.cancel();
        }
    });
    serve.await?;

    // Drain the scheduler tick and janitor before releasing the lock.
    let _ = daemon.queue_handle.await;
    let _ = daemon.janitor_handle.await;
    let _ = std::fs::remove_file(&paths.lock_path);
    tracing::info!("daemon stopped");
    Ok(())
}

async fn wait_for_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    let mut sigterm = match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
    {
        Ok(sigterm) => sigterm,
        Err(e) => {
            tracing::error!(error = %e, "failed to install SIGTERM handler");
            let _ = ctrl_c.await;
            return;
        }
    };
    tokio::select! {
        _ = ctrl_c => {}
        _ = sigterm.recv() => {}
    }
    tracing::info!("shutdown signal received");
}

#[cfg(test)]
#[path = "startup_tests.rs"]
mod tests;
