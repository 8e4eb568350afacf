// SPDX-License-Identifier: MIT

//! Operation names: the closed vocabulary of the handler registry.

pub const ZPOOL_CREATE: &str = "zpool_create";
pub const ZPOOL_SET_PROPERTIES: &str = "zpool_set_properties";

pub const IP_ADDRESS_CREATE: &str = "ip_address_create";
pub const IP_ADDRESS_DELETE: &str = "ip_address_delete";

pub const ARTIFACT_DOWNLOAD_URL: &str = "artifact_download_url";
pub const ARTIFACT_SCAN_LOCATION: &str = "artifact_scan_location";
pub const ARTIFACT_SCAN_ALL: &str = "artifact_scan_all";
pub const ARTIFACT_DELETE_FILE: &str = "artifact_delete_file";
pub const ARTIFACT_DELETE_FOLDER: &str = "artifact_delete_folder";
pub const ARTIFACT_UPLOAD_PROCESS: &str = "artifact_upload_process";

pub const ZONE_WAIT_SSH: &str = "zone_wait_ssh";
pub const ZONE_SYNC: &str = "zone_sync";
pub const ZONE_PROVISION: &str = "zone_provision";
pub const ZONE_PROVISIONING_EXTRACT: &str = "zone_provisioning_extract";

pub const SYSTEM_UPDATE_INSTALL: &str = "system_update_install";
pub const SYSTEM_UPDATE_REFRESH: &str = "system_update_refresh";

pub const SYSTEM_HOST_RESTART: &str = "system_host_restart";
pub const SYSTEM_HOST_REBOOT: &str = "system_host_reboot";
pub const SYSTEM_HOST_FAST_REBOOT: &str = "system_host_fast_reboot";
pub const SYSTEM_HOST_SHUTDOWN: &str = "system_host_shutdown";
pub const SYSTEM_HOST_POWEROFF: &str = "system_host_poweroff";
pub const SYSTEM_HOST_HALT: &str = "system_host_halt";
pub const SYSTEM_HOST_RUNLEVEL: &str = "system_host_runlevel_change";
pub const SYSTEM_HOST_SINGLE_USER: &str = "system_host_single_user";
pub const SYSTEM_HOST_MULTI_USER: &str = "system_host_multi_user";

pub const USER_CREATE: &str = "user_create";
pub const USER_MODIFY: &str = "user_modify";
pub const USER_DELETE: &str = "user_delete";
pub const USER_SET_PASSWORD: &str = "user_set_password";
pub const USER_LOCK: &str = "user_lock";
pub const USER_UNLOCK: &str = "user_unlock";
pub const GROUP_CREATE: &str = "group_create";
pub const GROUP_MODIFY: &str = "group_modify";
pub const GROUP_DELETE: &str = "group_delete";
pub const ROLE_CREATE: &str = "role_create";
pub const ROLE_MODIFY: &str = "role_modify";
pub const ROLE_DELETE: &str = "role_delete";
