// SPDX-License-Identifier: MIT

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! warden-handlers: the executors behind every registered operation.
//!
//! The scheduler is domain-agnostic; this crate owns the domain
//! semantics, one module per resource family. `build_registry` is the
//! single place the closed operation set is declared.

#[cfg(test)]
pub(crate) mod test_util;

pub mod accounts;
pub mod artifact;
pub mod host;
pub mod ipaddr;
pub mod ops;
pub mod sysupdate;
pub mod zone;
pub mod zpool;

use accounts::{GroupHandler, GroupOp, RoleHandler, RoleOp, UserHandler, UserOp};
use artifact::ArtifactEngine;
use host::{HostAction, HostLifecycleHandler};
use std::sync::Arc;
use std::time::Duration;
use warden_adapters::CommandRunner;
use warden_core::{TaskPriority, WardenConfig};
use warden_queue::{HandlerRegistry, HandlerSpec, RunningIndex};
use zone::ZoneDeps;

/// Shared dependencies handed to every executor at registration.
#[derive(Clone)]
pub struct HandlerDeps {
    pub config: Arc<WardenConfig>,
    pub runner: CommandRunner,
    pub running: RunningIndex,
}

/// Build the full handler registry: the closed set of operations this
/// host exposes.
pub fn build_registry(deps: &HandlerDeps) -> HandlerRegistry {
    let mut registry = HandlerRegistry::new();
    let runner = deps.runner;
    let engine = ArtifactEngine::new(Arc::clone(&deps.config), runner, deps.running.clone());
    let zone_deps = ZoneDeps { config: Arc::clone(&deps.config), runner };
    let download_timeout =
        Duration::from_secs(deps.config.artifact_storage.download.total_timeout_seconds.max(60));

    // Storage pools: mutating zpool operations are serial.
    registry.register(
        ops::ZPOOL_CREATE,
        HandlerSpec::new(Arc::new(zpool::ZpoolCreateHandler::new(runner)))
            .priority(TaskPriority::High)
            .timeout(Duration::from_secs(300))
            .serial(),
    );
    registry.register(
        ops::ZPOOL_SET_PROPERTIES,
        HandlerSpec::new(Arc::new(zpool::ZpoolSetPropertiesHandler::new(runner)))
            .timeout(Duration::from_secs(120))
            .serial(),
    );

    // Network addresses.
    registry.register(
        ops::IP_ADDRESS_CREATE,
        HandlerSpec::new(Arc::new(ipaddr::IpAddressCreateHandler::new(runner)))
            .timeout(Duration::from_secs(60)),
    );
    registry.register(
        ops::IP_ADDRESS_DELETE,
        HandlerSpec::new(Arc::new(ipaddr::IpAddressDeleteHandler::new(runner)))
            .timeout(Duration::from_secs(60)),
    );

    // Artifact engine.
    registry.register(
        ops::ARTIFACT_DOWNLOAD_URL,
        HandlerSpec::new(Arc::new(artifact::download::DownloadUrlHandler::new(engine.clone())))
            .timeout(download_timeout)
            .concurrency_cap(deps.config.task_queue.max_concurrent_downloads.max(1))
            .target_path(artifact::download_target_path),
    );
    registry.register(
        ops::ARTIFACT_UPLOAD_PROCESS,
        HandlerSpec::new(Arc::new(artifact::upload::UploadProcessHandler::new(engine.clone())))
            .timeout(Duration::from_secs(600))
            .target_path(artifact::upload_target_path),
    );
    registry.register(
        ops::ARTIFACT_SCAN_LOCATION,
        HandlerSpec::new(Arc::new(artifact::scan::ScanLocationHandler::new(engine.clone())))
            .timeout(Duration::from_secs(600)),
    );
    registry.register(
        ops::ARTIFACT_SCAN_ALL,
        HandlerSpec::new(Arc::new(artifact::scan::ScanAllHandler::new(engine.clone())))
            .timeout(Duration::from_secs(1800)),
    );
    registry.register(
        ops::ARTIFACT_DELETE_FILE,
        HandlerSpec::new(Arc::new(artifact::delete::DeleteFileHandler::new(engine.clone())))
            .timeout(Duration::from_secs(600)),
    );
    // Storage-path deletion is serial, like creation on the API side.
    registry.register(
        ops::ARTIFACT_DELETE_FOLDER,
        HandlerSpec::new(Arc::new(artifact::delete::DeleteFolderHandler::new(engine)))
            .timeout(Duration::from_secs(600))
            .serial(),
    );

    // Zone provisioning: stateful per zone.
    let ssh_timeout = deps.config.provisioning.ssh.timeout_seconds;
    registry.register(
        ops::ZONE_WAIT_SSH,
        HandlerSpec::new(Arc::new(zone::ZoneWaitSshHandler::new(zone_deps.clone())))
            .timeout(Duration::from_secs(ssh_timeout + 60))
            .zone_exclusive(),
    );
    registry.register(
        ops::ZONE_SYNC,
        HandlerSpec::new(Arc::new(zone::ZoneSyncHandler::new(zone_deps.clone())))
            .timeout(Duration::from_secs(660))
            .zone_exclusive(),
    );
    registry.register(
        ops::ZONE_PROVISION,
        HandlerSpec::new(Arc::new(zone::ZoneProvisionHandler::new(zone_deps.clone())))
            .timeout(Duration::from_secs(1860))
            .zone_exclusive(),
    );
    registry.register(
        ops::ZONE_PROVISIONING_EXTRACT,
        HandlerSpec::new(Arc::new(zone::ZoneProvisioningExtractHandler::new(zone_deps)))
            .timeout(Duration::from_secs(360))
            .zone_exclusive(),
    );

    // System updates.
    registry.register(
        ops::SYSTEM_UPDATE_INSTALL,
        HandlerSpec::new(Arc::new(sysupdate::UpdateInstallHandler::new(runner)))
            .priority(TaskPriority::High)
            .timeout(Duration::from_secs(1800))
            .serial(),
    );
    registry.register(
        ops::SYSTEM_UPDATE_REFRESH,
        HandlerSpec::new(Arc::new(sysupdate::UpdateRefreshHandler::new(runner)))
            .timeout(Duration::from_secs(600))
            .serial(),
    );

    // Host lifecycle: serial and critical.
    for (operation, action) in [
        (ops::SYSTEM_HOST_RESTART, HostAction::Restart),
        (ops::SYSTEM_HOST_REBOOT, HostAction::Reboot),
        (ops::SYSTEM_HOST_FAST_REBOOT, HostAction::FastReboot),
        (ops::SYSTEM_HOST_SHUTDOWN, HostAction::Shutdown),
        (ops::SYSTEM_HOST_POWEROFF, HostAction::Poweroff),
        (ops::SYSTEM_HOST_HALT, HostAction::Halt),
        (ops::SYSTEM_HOST_RUNLEVEL, HostAction::RunlevelChange),
        (ops::SYSTEM_HOST_SINGLE_USER, HostAction::SingleUser),
        (ops::SYSTEM_HOST_MULTI_USER, HostAction::MultiUser),
    ] {
        registry.register(
            operation,
            HandlerSpec::new(Arc::new(HostLifecycleHandler::new(runner, action)))
                .priority(TaskPriority::Critical)
                .timeout(Duration::from_secs(3600))
                .serial(),
        );
    }

    // Accounts: stateful against the shared name databases.
    for (operation, op) in [
        (ops::USER_CREATE, UserOp::Create),
        (ops::USER_MODIFY, UserOp::Modify),
        (ops::USER_DELETE, UserOp::Delete),
        (ops::USER_SET_PASSWORD, UserOp::SetPassword),
        (ops::USER_LOCK, UserOp::Lock),
        (ops::USER_UNLOCK, UserOp::Unlock),
    ] {
        registry.register(
            operation,
            HandlerSpec::new(Arc::new(UserHandler::new(runner, op)))
                .timeout(Duration::from_secs(60))
                .zone_exclusive(),
        );
    }
    for (operation, op) in [
        (ops::GROUP_CREATE, GroupOp::Create),
        (ops::GROUP_MODIFY, GroupOp::Modify),
        (ops::GROUP_DELETE, GroupOp::Delete),
    ] {
        registry.register(
            operation,
            HandlerSpec::new(Arc::new(GroupHandler::new(runner, op)))
                .timeout(Duration::from_secs(60))
                .zone_exclusive(),
        );
    }
    for (operation, op) in [
        (ops::ROLE_CREATE, RoleOp::Create),
        (ops::ROLE_MODIFY, RoleOp::Modify),
        (ops::ROLE_DELETE, RoleOp::Delete),
    ] {
        registry.register(
            operation,
            HandlerSpec::new(Arc::new(RoleHandler::new(runner, op)))
                .timeout(Duration::from_secs(60))
                .zone_exclusive(),
        );
    }

    registry
}

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;
