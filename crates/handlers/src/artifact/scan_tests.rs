// SPDX-License-Identifier: MIT

use super::*;
use crate::ops;
use crate::test_util::{claimed_context, engine, store_with_tmp_location, write_file};
use warden_core::TaskId;
use warden_queue::{RunningEntry, RunningIndex};

fn scan_handler(running: RunningIndex) -> ScanLocationHandler {
    ScanLocationHandler::new(engine(running))
}

fn scan_metadata(location: &warden_core::StorageLocation) -> serde_json::Value {
    serde_json::json!({"storage_location_id": location.id.as_str()})
}

fn summary_of(outcome: &warden_core::TaskOutcome) -> ScanSummary {
    let info = outcome.progress_info.clone().unwrap_or_default();
    serde_json::from_value(info).unwrap()
}

#[tokio::test]
async fn scan_inserts_supported_files_only() {
    let (store, location, dir) = store_with_tmp_location().await;
    write_file(dir.path(), "a.iso", b"aaaa");
    write_file(dir.path(), "b.iso", b"bb");
    write_file(dir.path(), "notes.txt", b"ignored");
    std::fs::create_dir(dir.path().join("subdir")).unwrap();

    let ctx = claimed_context(&store, ops::ARTIFACT_SCAN_LOCATION, scan_metadata(&location)).await;
    let outcome = scan_handler(RunningIndex::new()).run(ctx).await;
    assert!(outcome.success, "outcome: {:?}", outcome.error);
    assert_eq!(
        summary_of(&outcome),
        ScanSummary { scanned: 2, added: 2, removed: 0, skipped: 0 }
    );

    let refreshed = store.get_location(&location.id).await.unwrap().unwrap();
    assert_eq!(refreshed.file_count, 2);
    assert_eq!(refreshed.total_size, 6);
    assert!(refreshed.last_scan_at.is_some());

    // Bare rows: no checksum until a download or verify pass computes one.
    let a = store
        .get_artifact_by_path(&format!("{}/a.iso", location.path))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(a.size, 4);
    assert!(a.checksum.is_none());
    assert!(a.checksum_algorithm.is_none());
}

#[tokio::test]
async fn scan_skips_in_flight_download_paths() {
    let (store, location, dir) = store_with_tmp_location().await;
    // A partial file exists on disk while its download is still running.
    write_file(dir.path(), "partial.iso", b"");
    write_file(dir.path(), "done.iso", b"xyz");

    let running = RunningIndex::new();
    running.insert(
        TaskId::new(),
        RunningEntry {
            operation: ops::ARTIFACT_DOWNLOAD_URL.to_string(),
            zone_name: warden_core::ZONE_ARTIFACT.to_string(),
            zone_exclusive: false,
            target_path: Some(format!("{}/partial.iso", location.path)),
        },
    );

    let ctx = claimed_context(&store, ops::ARTIFACT_SCAN_LOCATION, scan_metadata(&location)).await;
    let outcome = scan_handler(running).run(ctx).await;
    assert!(outcome.success);
    assert_eq!(
        summary_of(&outcome),
        ScanSummary { scanned: 1, added: 1, removed: 0, skipped: 1 }
    );

    // The in-flight path never gets a row, so no zero-size record exists.
    let partial = store
        .get_artifact_by_path(&format!("{}/partial.iso", location.path))
        .await
        .unwrap();
    assert!(partial.is_none());
}

#[tokio::test]
async fn rescan_touches_existing_rows_without_duplicates() {
    let (store, location, dir) = store_with_tmp_location().await;
    write_file(dir.path(), "a.iso", b"aaaa");

    let ctx = claimed_context(&store, ops::ARTIFACT_SCAN_LOCATION, scan_metadata(&location)).await;
    let first = scan_handler(RunningIndex::new()).run(ctx).await;
    assert_eq!(summary_of(&first).added, 1);

    let ctx = claimed_context(&store, ops::ARTIFACT_SCAN_LOCATION, scan_metadata(&location)).await;
    let second = scan_handler(RunningIndex::new()).run(ctx).await;
    assert!(second.success);
    assert_eq!(
        summary_of(&second),
        ScanSummary { scanned: 1, added: 0, removed: 0, skipped: 0 }
    );

    let a = store
        .get_artifact_by_path(&format!("{}/a.iso", location.path))
        .await
        .unwrap()
        .unwrap();
    assert!(a.last_verified.is_some());
}

#[tokio::test]
async fn remove_orphaned_deletes_rows_for_missing_files() {
    let (store, location, dir) = store_with_tmp_location().await;
    let kept = write_file(dir.path(), "kept.iso", b"k");
    write_file(dir.path(), "gone.iso", b"g");

    let ctx = claimed_context(&store, ops::ARTIFACT_SCAN_LOCATION, scan_metadata(&location)).await;
    scan_handler(RunningIndex::new()).run(ctx).await;

    std::fs::remove_file(dir.path().join("gone.iso")).unwrap();

    let ctx = claimed_context(
        &store,
        ops::ARTIFACT_SCAN_LOCATION,
        serde_json::json!({
            "storage_location_id": location.id.as_str(),
            "remove_orphaned": true,
        }),
    )
    .await;
    let outcome = scan_handler(RunningIndex::new()).run(ctx).await;
    assert!(outcome.success);
    assert_eq!(
        summary_of(&outcome),
        ScanSummary { scanned: 1, added: 0, removed: 1, skipped: 0 }
    );

    assert!(store
        .get_artifact_by_path(&format!("{}/gone.iso", location.path))
        .await
        .unwrap()
        .is_none());
    assert!(store
        .get_artifact_by_path(&kept.display().to_string())
        .await
        .unwrap()
        .is_some());
    assert_eq!(store.get_location(&location.id).await.unwrap().unwrap().file_count, 1);
}

#[tokio::test]
async fn verify_checksums_flags_corrupted_files() {
    let (store, location, dir) = store_with_tmp_location().await;
    let path = write_file(dir.path(), "a.iso", b"original");

    let ctx = claimed_context(&store, ops::ARTIFACT_SCAN_LOCATION, scan_metadata(&location)).await;
    scan_handler(RunningIndex::new()).run(ctx).await;

    // Record the correct digest, then corrupt the file.
    let artifact = store
        .get_artifact_by_path(&path.display().to_string())
        .await
        .unwrap()
        .unwrap();
    let mut with_checksum = artifact.clone();
    with_checksum.checksum =
        Some(checksum::hash_bytes(b"original", warden_core::ChecksumAlgorithm::Sha256));
    with_checksum.checksum_algorithm = Some(warden_core::ChecksumAlgorithm::Sha256);
    store.upsert_artifact_by_path(&with_checksum).await.unwrap();
    std::fs::write(&path, b"corrupted").unwrap();

    let ctx = claimed_context(
        &store,
        ops::ARTIFACT_SCAN_LOCATION,
        serde_json::json!({
            "storage_location_id": location.id.as_str(),
            "verify_checksums": true,
        }),
    )
    .await;
    let outcome = scan_handler(RunningIndex::new()).run(ctx).await;
    assert!(outcome.success);

    let rechecked = store
        .get_artifact_by_path(&path.display().to_string())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(rechecked.checksum_verified, Some(false));
}

#[tokio::test]
async fn missing_directory_fails_and_records_error() {
    let (store, location, dir) = store_with_tmp_location().await;
    drop(dir);

    let ctx = claimed_context(&store, ops::ARTIFACT_SCAN_LOCATION, scan_metadata(&location)).await;
    let outcome = scan_handler(RunningIndex::new()).run(ctx).await;
    assert!(!outcome.success);

    let after = store.get_location(&location.id).await.unwrap().unwrap();
    assert_eq!(after.scan_errors, 1);
    assert!(after.last_error_message.is_some());
}

#[tokio::test]
async fn scan_all_covers_enabled_locations_and_reports_partial_failures() {
    let (store, healthy, dir) = store_with_tmp_location().await;
    write_file(dir.path(), "ok.iso", b"ok");

    // Second location whose directory is missing.
    let broken = warden_core::test_support::location("/nonexistent/warden-test");
    store.insert_location(&broken).await.unwrap();

    let ctx = claimed_context(&store, ops::ARTIFACT_SCAN_ALL, serde_json::json!({})).await;
    let outcome = ScanAllHandler::new(engine(RunningIndex::new())).run(ctx).await;

    // One of two locations scanned: partial success.
    assert!(outcome.success);
    let info = outcome.progress_info.unwrap();
    assert_eq!(info["added"], 1);
    assert_eq!(info["errors"].as_array().unwrap().len(), 1);

    assert_eq!(store.get_location(&healthy.id).await.unwrap().unwrap().file_count, 1);
    assert_eq!(store.get_location(&broken.id).await.unwrap().unwrap().scan_errors, 1);
}
