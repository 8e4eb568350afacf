// SPDX-License-Identifier: MIT

use super::*;

fn create_params(json: serde_json::Value) -> UserCreateParams {
    serde_json::from_value(json).unwrap()
}

#[test]
fn minimal_useradd() {
    let (command, warnings) = build_useradd(&create_params(serde_json::json!({
        "username": "webadmin",
    })))
    .unwrap();
    assert_eq!(command, "pfexec useradd -m webadmin");
    assert!(warnings.is_empty());
}

#[test]
fn full_useradd_command() {
    let (command, _) = build_useradd(&create_params(serde_json::json!({
        "username": "webadmin",
        "uid": 1001,
        "gid": 100,
        "groups": ["staff", "www"],
        "comment": "Web administrator",
        "home_directory": "/export/home/webadmin",
        "shell": "/bin/bash",
        "authorizations": ["solaris.admin.usermgr.read"],
        "profiles": ["Basic Solaris User"],
        "roles": ["backupadmin"],
        "project": "webproj",
    })))
    .unwrap();
    assert_eq!(
        command,
        "pfexec useradd -u 1001 -g 100 -G staff,www -c 'Web administrator' \
         -d /export/home/webadmin -s /bin/bash -m -A solaris.admin.usermgr.read \
         -P 'Basic Solaris User' -R backupadmin -p webproj webadmin"
    );
}

#[test]
fn zfs_flags_map_to_z_options() {
    let (force, _) = build_useradd(&create_params(serde_json::json!({
        "username": "u1", "force_zfs": true,
    })))
    .unwrap();
    assert!(force.contains(" -m -z "));

    let (prevent, _) = build_useradd(&create_params(serde_json::json!({
        "username": "u1", "prevent_zfs": true,
    })))
    .unwrap();
    assert!(prevent.contains(" -m -Z "));

    let both = build_useradd(&create_params(serde_json::json!({
        "username": "u1", "force_zfs": true, "prevent_zfs": true,
    })));
    assert!(both.is_err());
}

#[test]
fn no_home_creation_drops_m_flag() {
    let (command, _) = build_useradd(&create_params(serde_json::json!({
        "username": "svc", "create_home": false,
    })))
    .unwrap();
    assert_eq!(command, "pfexec useradd svc");
}

#[test]
fn system_uid_warns_but_builds() {
    let (command, warnings) = build_useradd(&create_params(serde_json::json!({
        "username": "daemonish", "uid": 50,
    })))
    .unwrap();
    assert!(command.contains("-u 50"));
    assert_eq!(warnings.len(), 1);
    assert!(warnings[0].contains("system range"));
}

#[test]
fn invalid_username_rejected() {
    assert!(build_useradd(&create_params(serde_json::json!({"username": "1abc"}))).is_err());
    assert!(build_useradd(&create_params(serde_json::json!({"username": "webadmin"}))).is_ok());
}

#[test]
fn usermod_requires_changes() {
    let params: UserModifyParams =
        serde_json::from_value(serde_json::json!({"username": "webadmin"})).unwrap();
    assert!(build_usermod(&params).is_err());
}

#[test]
fn usermod_builds_requested_changes() {
    let params: UserModifyParams = serde_json::from_value(serde_json::json!({
        "username": "webadmin",
        "new_username": "webroot",
        "shell": "/bin/zsh",
        "profiles": ["System Administrator"],
    }))
    .unwrap();
    let (command, _) = build_usermod(&params).unwrap();
    assert_eq!(
        command,
        "pfexec usermod -l webroot -s /bin/zsh -P 'System Administrator' webadmin"
    );
}

#[test]
fn usermod_validates_new_username() {
    let params: UserModifyParams = serde_json::from_value(serde_json::json!({
        "username": "webadmin",
        "new_username": "Bad Name",
    }))
    .unwrap();
    assert!(build_usermod(&params).is_err());
}
