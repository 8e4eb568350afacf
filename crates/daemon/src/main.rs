// SPDX-License-Identifier: MIT

//! `wardend` entry point.
//!
//! Exit codes: 0 normal, 1 configuration error, 2 store unavailable.

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use warden_core::WardenConfig;
use warden_daemon::lifecycle::{self, DaemonPaths, LifecycleError};

#[derive(Debug, Parser)]
#[command(name = "wardend", version, about = "Host-local control plane daemon")]
struct Args {
    /// Configuration file (TOML). Defaults apply when omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    /// State directory (database, lock, logs).
    #[arg(long)]
    state_dir: Option<PathBuf>,

    /// Log to stderr instead of the state-dir log file.
    #[arg(long)]
    foreground: bool,
}

fn main() -> std::process::ExitCode {
    let args = Args::parse();

    let config_path = args.config.clone().or_else(warden_daemon::env::config_path);
    let config = match config_path {
        Some(path) => match WardenConfig::load(&path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("wardend: {e}");
                return std::process::ExitCode::from(1);
            }
        },
        None => WardenConfig::default(),
    };

    let state_dir = args.state_dir.clone().unwrap_or_else(warden_daemon::env::state_dir);
    let paths = DaemonPaths::new(state_dir, Arc::new(config));

    // File logging by default; stderr in the foreground.
    let _guard = if args.foreground {
        tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
            )
            .init();
        None
    } else {
        if let Err(e) = std::fs::create_dir_all(&paths.log_dir) {
            eprintln!("wardend: cannot create log directory: {e}");
            return std::process::ExitCode::from(1);
        }
        let appender = tracing_appender::rolling::daily(&paths.log_dir, "wardend.log");
        let (writer, guard) = tracing_appender::non_blocking(appender);
        tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
            )
            .with_writer(writer)
            .with_ansi(false)
            .init();
        Some(guard)
    };

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("wardend: failed to start runtime: {e}");
            return std::process::ExitCode::from(1);
        }
    };

    match runtime.block_on(lifecycle::run(paths)) {
        Ok(()) => std::process::ExitCode::SUCCESS,
        Err(LifecycleError::Store(e)) => {
            tracing::error!(error = %e, "store unavailable");
            eprintln!("wardend: store unavailable: {e}");
            std::process::ExitCode::from(2)
        }
        Err(e) => {
            tracing::error!(error = %e, "daemon failed");
            eprintln!("wardend: {e}");
            std::process::ExitCode::from(1)
        }
    }
}
