//! End-to-end update flow: bundled manifest, remote diff, download and ledger.

mod common;

use common::{record, Env, BASE};
use depot::download::{temp_path, ChecksumVerifier};
use depot::package::checksum::checksum_bytes;
use depot::package::{LifecycleState, ManifestFormat, ManifestRecord};
use depot::tracker::{LedgerFile, PackageTracker, RemoteView};

#[tokio::test]
async fn test_changed_package_is_updated_and_resolved() {
    let env = Env::new();
    env.bundle(&[(ManifestRecord::new("A.pkg", 5, 1), b"old")]);
    env.publish(&[(ManifestRecord::new("A.pkg", 0, 2), b"new")]);
    let remote_checksum = checksum_bytes(b"new");
    let tracker = env.tracker().await;
    tracker.fetch_remote_manifest().await.unwrap();

    let set = tracker.diff_for_update();
    let records = set.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].logical_path, "a.pkg");
    assert_eq!(records[0].checksum, remote_checksum);

    let remote = &records[0];
    tracker
        .downloader()
        .fetch_package(
            &tracker.remote_url(remote).unwrap(),
            &tracker.download_path(remote),
            &ChecksumVerifier::for_record(remote),
        )
        .await
        .unwrap();
    tracker.record_downloaded("A.pkg").await.unwrap();

    let resolved = tracker.resolve_by_package("A.pkg").unwrap();
    assert_eq!(resolved.checksum, remote_checksum);
    assert_eq!(resolved.lifecycle_state, LifecycleState::Downloaded);
    assert_eq!(
        std::fs::read(tracker.local_path(&resolved).unwrap()).unwrap(),
        b"new"
    );
}

#[tokio::test]
async fn test_diff_includes_only_changed_checksums() {
    let env = Env::new();
    env.bundle(&[
        (record("same.pkg", b"same"), b"same"),
        (record("changed.pkg", b"v1"), b"v1"),
        (
            record("ui/icons.pkg", b"icons-v1").with_real_path("ui/icons_11111111.pkg"),
            b"icons-v1",
        ),
    ]);
    env.publish(&[
        (record("same.pkg", b"same"), b"same"),
        (record("changed.pkg", b"v2"), b"v2"),
        (
            record("ui/icons.pkg", b"icons-v2").with_real_path("ui/icons_22222222.pkg"),
            b"icons-v2",
        ),
        (record("dlc.pkg", b"dlc"), b"dlc"),
    ]);
    let tracker = env.tracker().await;
    tracker.fetch_remote_manifest().await.unwrap();

    let set = tracker.compute_update_set();

    let mut paths: Vec<_> = set.updates().iter().map(|u| u.local_path.clone()).collect();
    paths.sort();
    assert_eq!(paths, vec!["changed.pkg", "ui/icons.pkg"]);
    assert_eq!(set.remote_only(), &["dlc.pkg".to_string()]);
}

#[tokio::test]
async fn test_hashed_rename_replaces_previous_download() {
    let env = Env::new();
    env.publish(&[(
        record("ui/icons.pkg", b"v1").with_real_path("ui/icons_11111111.pkg"),
        b"v1",
    )]);
    let tracker = env.tracker().await;
    tracker.fetch_remote_manifest().await.unwrap();
    download(&tracker, "ui/icons.pkg").await;
    tracker.persist_ledger().await.unwrap();
    let old_file = env.config().package_dir().join("ui/icons_11111111.pkg");
    assert!(old_file.exists());

    env.publish(&[(
        record("ui/icons.pkg", b"v2").with_real_path("ui/icons_22222222.pkg"),
        b"v2",
    )]);
    let tracker = env.tracker().await;
    tracker.fetch_remote_manifest().await.unwrap();
    let set = tracker.diff_for_update();
    assert_eq!(set.len(), 1);
    download(&tracker, "ui/icons.pkg").await;

    assert!(!old_file.exists());
    let record = tracker.resolve_by_package("ui/icons.pkg").unwrap();
    assert_eq!(record.real_path, "ui/icons_22222222.pkg");
}

#[tokio::test]
async fn test_ledger_survives_restart() {
    let env = Env::new();
    env.publish(&[
        (record("lonely.pkg", b"1"), b"1"),
        (
            record("fonts.pkg", b"22").with_resources(["fonts/a.ttf"]),
            b"22",
        ),
        (
            record("scene.pkg", b"333")
                .with_resources(["scene/a.bin", "scene/b.bin", "scene/c.bin"])
                .with_dependencies(["fonts.pkg", "lonely.pkg"]),
            b"333",
        ),
    ]);
    let tracker = env.tracker().await;
    tracker.fetch_remote_manifest().await.unwrap();
    for path in ["lonely.pkg", "fonts.pkg", "scene.pkg"] {
        download(&tracker, path).await;
    }
    tracker.persist_ledger().await.unwrap();
    let before: Vec<_> = tracker.local_records();

    let restarted = env.tracker().await;
    let mut after = restarted.local_records();
    let mut before = before;
    before.sort_by(|a, b| a.logical_path.cmp(&b.logical_path));
    after.sort_by(|a, b| a.logical_path.cmp(&b.logical_path));
    assert_eq!(before, after);
    assert_eq!(
        restarted.resolve_by_resource("scene/b.bin").unwrap().dependencies(),
        &["fonts.pkg".to_string(), "lonely.pkg".to_string()]
    );
    assert!(restarted
        .resolve_by_package("lonely.pkg")
        .unwrap()
        .dependencies()
        .is_empty());
}

#[tokio::test]
async fn test_binary_ledger_round_trip() {
    let env = Env::new();
    let path = env.temp.path().join("ledger.bin");
    let ledger = LedgerFile::new(&path, ManifestFormat::Binary);
    let manifest = [
        ManifestRecord::new("a.pkg", 1, 1),
        ManifestRecord::new("b.pkg", 2, 1).with_resources(["b/x"]),
        ManifestRecord::new("c.pkg", 3, 1)
            .with_resources(["c/x", "c/y"])
            .with_dependencies(["a.pkg", "b.pkg"]),
    ]
    .into_iter()
    .map(|r| r.with_state(LifecycleState::Downloaded))
    .collect();

    ledger.save(&manifest).await.unwrap();

    assert_eq!(ledger.load().await, manifest);
}

#[tokio::test]
async fn test_unreachable_remote_falls_back_to_ledger() {
    let env = Env::new();
    env.bundle(&[(record("a.pkg", b"a"), b"a")]);
    let tracker = env.tracker().await;

    assert!(tracker.fetch_remote_manifest().await.is_err());

    assert_eq!(tracker.stats().remote_view, RemoteView::LedgerFallback);
    assert!(tracker.diff_for_update().is_empty());
    assert!(tracker.resolve_by_package("a.pkg").is_some());
}

#[tokio::test]
async fn test_interrupted_download_resumes_byte_identical() {
    let env = Env::new();
    let data: Vec<u8> = (0..200_000u32).map(|i| (i % 251) as u8).collect();
    env.publish(&[(record("big.pkg", &data), &data[..])]);
    let tracker = env.tracker().await;
    tracker.fetch_remote_manifest().await.unwrap();
    let remote = tracker.resolve_remote_by_package("big.pkg").unwrap();
    let url = format!("{}/big.pkg", BASE);
    let dest = tracker.download_path(&remote);
    let verifier = ChecksumVerifier::for_record(&remote);

    env.transport.interrupt_next(&url, 70_000);
    assert!(tracker
        .downloader()
        .fetch_package(&url, &dest, &verifier)
        .await
        .is_err());
    assert_eq!(std::fs::metadata(temp_path(&dest)).unwrap().len(), 70_000);

    tracker
        .downloader()
        .fetch_package(&url, &dest, &verifier)
        .await
        .unwrap();

    assert_eq!(std::fs::read(&dest).unwrap(), data);
    assert_eq!(env.transport.requested_offsets(&url), vec![0, 70_000]);
    assert!(!temp_path(&dest).exists());
}

async fn download(tracker: &PackageTracker, logical_path: &str) {
    let remote = tracker.resolve_remote_by_package(logical_path).unwrap();
    tracker
        .downloader()
        .fetch_package(
            &tracker.remote_url(&remote).unwrap(),
            &tracker.download_path(&remote),
            &ChecksumVerifier::for_record(&remote),
        )
        .await
        .unwrap();
    tracker.record_downloaded(logical_path).await.unwrap();
}
