// SPDX-License-Identifier: MIT

use super::*;

fn registry() -> HandlerRegistry {
    let deps = HandlerDeps {
        config: Arc::new(WardenConfig::default()),
        runner: CommandRunner::new(),
        running: RunningIndex::new(),
    };
    build_registry(&deps)
}

#[test]
fn every_operation_is_registered() {
    let registry = registry();
    for operation in [
        ops::ZPOOL_CREATE,
        ops::ZPOOL_SET_PROPERTIES,
        ops::IP_ADDRESS_CREATE,
        ops::IP_ADDRESS_DELETE,
        ops::ARTIFACT_DOWNLOAD_URL,
        ops::ARTIFACT_SCAN_LOCATION,
        ops::ARTIFACT_SCAN_ALL,
        ops::ARTIFACT_DELETE_FILE,
        ops::ARTIFACT_DELETE_FOLDER,
        ops::ARTIFACT_UPLOAD_PROCESS,
        ops::ZONE_WAIT_SSH,
        ops::ZONE_SYNC,
        ops::ZONE_PROVISION,
        ops::ZONE_PROVISIONING_EXTRACT,
        ops::SYSTEM_UPDATE_INSTALL,
        ops::SYSTEM_UPDATE_REFRESH,
        ops::SYSTEM_HOST_RESTART,
        ops::SYSTEM_HOST_REBOOT,
        ops::SYSTEM_HOST_FAST_REBOOT,
        ops::SYSTEM_HOST_SHUTDOWN,
        ops::SYSTEM_HOST_POWEROFF,
        ops::SYSTEM_HOST_HALT,
        ops::SYSTEM_HOST_RUNLEVEL,
        ops::SYSTEM_HOST_SINGLE_USER,
        ops::SYSTEM_HOST_MULTI_USER,
        ops::USER_CREATE,
        ops::USER_MODIFY,
        ops::USER_DELETE,
        ops::USER_SET_PASSWORD,
        ops::USER_LOCK,
        ops::USER_UNLOCK,
        ops::GROUP_CREATE,
        ops::GROUP_MODIFY,
        ops::GROUP_DELETE,
        ops::ROLE_CREATE,
        ops::ROLE_MODIFY,
        ops::ROLE_DELETE,
    ] {
        assert!(registry.contains(operation), "{operation} missing from registry");
    }
}

#[test]
fn host_lifecycle_is_serial_and_critical() {
    let registry = registry();
    for operation in [ops::SYSTEM_HOST_SHUTDOWN, ops::SYSTEM_HOST_HALT, ops::SYSTEM_HOST_RESTART] {
        let spec = registry.get(operation).unwrap();
        assert!(spec.serial, "{operation} must be serial");
        assert_eq!(spec.default_priority, TaskPriority::Critical);
    }
}

#[test]
fn downloads_are_capped_and_path_fenced() {
    let registry = registry();
    let spec = registry.get(ops::ARTIFACT_DOWNLOAD_URL).unwrap();
    assert_eq!(spec.concurrency_cap, Some(3));
    assert!(!spec.serial);
    let path = spec
        .target_path
        .map(|f| f(&serde_json::json!({"final_path": "/data/iso/a.iso"})));
    assert_eq!(path, Some(Some("/data/iso/a.iso".to_string())));
}

#[test]
fn zone_operations_are_zone_exclusive() {
    let registry = registry();
    for operation in [ops::ZONE_WAIT_SSH, ops::ZONE_SYNC, ops::ZONE_PROVISION] {
        assert!(registry.get(operation).unwrap().zone_exclusive, "{operation}");
    }
}

#[test]
fn zpool_mutations_are_serial() {
    let registry = registry();
    assert!(registry.get(ops::ZPOOL_CREATE).unwrap().serial);
    assert!(registry.get(ops::ZPOOL_SET_PROPERTIES).unwrap().serial);
}
