// SPDX-License-Identifier: MIT

use super::*;

fn disk(name: &str) -> VdevEntry {
    VdevEntry::Disk(name.to_string())
}

fn group(kind: Option<&str>, devices: &[&str]) -> VdevEntry {
    VdevEntry::Group {
        kind: kind.map(str::to_string),
        devices: devices.iter().map(|d| d.to_string()).collect(),
    }
}

#[test]
fn bare_disks_serialize_in_order() {
    let spec = vdev_spec(&[disk("c0t0d0"), disk("c0t1d0")]).unwrap();
    assert_eq!(spec, "c0t0d0 c0t1d0");
}

#[test]
fn mirror_group_prefixes_type() {
    let spec = vdev_spec(&[group(Some("mirror"), &["c0t0d0", "c0t1d0"])]).unwrap();
    assert_eq!(spec, "mirror c0t0d0 c0t1d0");
}

#[test]
fn mixed_groups_keep_order() {
    let spec = vdev_spec(&[
        group(Some("raidz2"), &["c0t0d0", "c0t1d0", "c0t2d0"]),
        group(Some("log"), &["c0t3d0"]),
        group(Some("cache"), &["c0t4d0"]),
    ])
    .unwrap();
    assert_eq!(spec, "raidz2 c0t0d0 c0t1d0 c0t2d0 log c0t3d0 cache c0t4d0");
}

#[test]
fn untyped_group_is_a_plain_device_list() {
    let spec = vdev_spec(&[group(None, &["c0t0d0", "c0t1d0"])]).unwrap();
    assert_eq!(spec, "c0t0d0 c0t1d0");
}

#[test]
fn empty_vdevs_rejected() {
    assert!(vdev_spec(&[]).is_err());
}

#[test]
fn unknown_vdev_type_rejected() {
    let err = vdev_spec(&[group(Some("raid5"), &["c0t0d0"])]).unwrap_err();
    assert!(err.contains("raid5"));
}

#[test]
fn empty_group_rejected() {
    assert!(vdev_spec(&[group(Some("mirror"), &[])]).is_err());
}

#[test]
fn vdev_entries_deserialize_from_both_shapes() {
    let entries: Vec<VdevEntry> = serde_json::from_value(serde_json::json!([
        "c0t0d0",
        {"type": "mirror", "devices": ["c0t1d0", "c0t2d0"]},
        {"devices": ["c0t3d0"]},
    ]))
    .unwrap();
    assert_eq!(vdev_spec(&entries).unwrap(), "c0t0d0 mirror c0t1d0 c0t2d0 c0t3d0");
}

#[test]
fn create_command_includes_flags_and_properties() {
    let params: ZpoolCreateParams = serde_json::from_value(serde_json::json!({
        "pool_name": "tank",
        "vdevs": [{"type": "mirror", "devices": ["c0t0d0", "c0t1d0"]}],
        "properties": {"ashift": "12", "autotrim": "on"},
        "force": true,
        "mount_point": "/tank",
    }))
    .unwrap();

    let command = build_create_command(&params).unwrap();
    assert_eq!(
        command,
        "pfexec zpool create -f -m /tank -o ashift=12 -o autotrim=on tank mirror c0t0d0 c0t1d0"
    );
}

#[test]
fn create_command_minimal() {
    let params: ZpoolCreateParams = serde_json::from_value(serde_json::json!({
        "pool_name": "tank",
        "vdevs": ["c0t0d0"],
    }))
    .unwrap();
    assert_eq!(build_create_command(&params).unwrap(), "pfexec zpool create tank c0t0d0");
}

#[test]
fn create_command_requires_pool_name() {
    let params: ZpoolCreateParams = serde_json::from_value(serde_json::json!({
        "pool_name": "",
        "vdevs": ["c0t0d0"],
    }))
    .unwrap();
    assert!(build_create_command(&params).is_err());
}
