// SPDX-License-Identifier: MIT

use super::*;
use warden_core::TaskId;
use warden_queue::{RunningEntry, RunningIndex};

#[yare::parameterized(
    plain    = { "http://host/isos/omnios.iso", Some("omnios.iso") },
    query    = { "http://host/isos/omnios.iso?token=abc", Some("omnios.iso") },
    fragment = { "http://host/isos/omnios.iso#sec", Some("omnios.iso") },
    trailing = { "http://host/isos/", None },
    bare     = { "http://host", None },
)]
fn filenames_from_urls(url: &str, expected: Option<&str>) {
    assert_eq!(filename_from_url(url).as_deref(), expected);
}

#[test]
fn join_normalizes_trailing_slash() {
    assert_eq!(join_location_path("/data/iso", "a.iso"), "/data/iso/a.iso");
    assert_eq!(join_location_path("/data/iso/", "a.iso"), "/data/iso/a.iso");
}

#[test]
fn target_path_extractors_read_final_path() {
    let metadata = serde_json::json!({"final_path": "/data/iso/a.iso", "url": "http://x/a.iso"});
    assert_eq!(download_target_path(&metadata).as_deref(), Some("/data/iso/a.iso"));
    assert_eq!(upload_target_path(&metadata).as_deref(), Some("/data/iso/a.iso"));
    assert_eq!(download_target_path(&serde_json::json!({})), None);
}

#[test]
fn writing_paths_covers_downloads_and_uploads() {
    let running = RunningIndex::new();
    running.insert(
        TaskId::new(),
        RunningEntry {
            operation: crate::ops::ARTIFACT_DOWNLOAD_URL.to_string(),
            zone_name: "artifact".to_string(),
            zone_exclusive: false,
            target_path: Some("/data/iso/dl.iso".to_string()),
        },
    );
    running.insert(
        TaskId::new(),
        RunningEntry {
            operation: crate::ops::ARTIFACT_UPLOAD_PROCESS.to_string(),
            zone_name: "artifact".to_string(),
            zone_exclusive: false,
            target_path: Some("/data/iso/up.iso".to_string()),
        },
    );
    running.insert(
        TaskId::new(),
        RunningEntry {
            operation: "zone_sync".to_string(),
            zone_name: "web01".to_string(),
            zone_exclusive: true,
            target_path: Some("/not/an/artifact".to_string()),
        },
    );

    let engine = crate::test_util::engine(running);
    let paths = engine.writing_paths();
    assert!(paths.contains("/data/iso/dl.iso"));
    assert!(paths.contains("/data/iso/up.iso"));
    assert!(!paths.contains("/not/an/artifact"));
}
