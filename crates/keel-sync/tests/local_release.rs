//! End-to-end release activation on the local filesystem.
#![cfg(target_os = "linux")]

use keel_remote::LocalShell;
use keel_sync::{ArtifactSync, RemoteLayout, SyncConfig};
use keel_types::HostHandle;
use std::fs;
use std::path::Path;
use std::sync::Arc;

fn localhost() -> HostHandle {
    HostHandle {
        id: "local".into(),
        name: "localhost".into(),
        zone: "local".into(),
        external_ip: None,
        tags: vec![],
    }
}

fn write_tree(root: &Path, version: &str) {
    fs::create_dir_all(root.join("strategy")).unwrap();
    fs::write(root.join("main.py"), format!("VERSION = '{}'\n", version)).unwrap();
    fs::write(root.join("strategy/flip.py"), "def flip(): pass\n").unwrap();
    fs::write(root.join(".env"), "BYBIT_API_SECRET=hunter2\n").unwrap();
}

fn syncer(remote_root: &Path, keep: usize) -> ArtifactSync {
    ArtifactSync::new(
        Arc::new(LocalShell::new()),
        RemoteLayout::new(remote_root.to_string_lossy()),
        SyncConfig {
            keep_releases: keep,
            ..SyncConfig::default()
        },
    )
}

#[tokio::test]
async fn push_activates_release_without_secrets() {
    let source = tempfile::tempdir().unwrap();
    let remote = tempfile::tempdir().unwrap();
    write_tree(source.path(), "1");

    let sync = syncer(remote.path(), 3);
    let receipt = sync.push(&localhost(), source.path()).await.unwrap();

    let current = remote.path().join("current");
    assert_eq!(
        fs::read_link(&current).unwrap(),
        Path::new(&receipt.path)
    );
    assert_eq!(
        fs::read_to_string(current.join("main.py")).unwrap(),
        "VERSION = '1'\n"
    );
    assert!(current.join("strategy/flip.py").exists());
    assert!(!current.join(".env").exists());
    assert_eq!(
        sync.current_release(&localhost()).await.unwrap(),
        Some(receipt.release.clone())
    );

    // No staging leftovers.
    let leftovers: Vec<_> = fs::read_dir(remote.path())
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_name().to_string_lossy().starts_with(".staging-"))
        .collect();
    assert!(leftovers.is_empty());
}

#[tokio::test]
async fn identical_push_is_idempotent() {
    let source = tempfile::tempdir().unwrap();
    let remote = tempfile::tempdir().unwrap();
    write_tree(source.path(), "1");

    let sync = syncer(remote.path(), 3);
    let first = sync.push(&localhost(), source.path()).await.unwrap();
    let second = sync.push(&localhost(), source.path()).await.unwrap();

    assert_eq!(first.release, second.release);
    assert_eq!(
        fs::read_dir(remote.path().join("releases")).unwrap().count(),
        1
    );
}

#[tokio::test]
async fn old_releases_are_pruned() {
    let source = tempfile::tempdir().unwrap();
    let remote = tempfile::tempdir().unwrap();
    let sync = syncer(remote.path(), 2);

    let mut last = None;
    for version in ["1", "2", "3"] {
        write_tree(source.path(), version);
        last = Some(sync.push(&localhost(), source.path()).await.unwrap());
        // ls -t has one-second resolution on some filesystems
        std::thread::sleep(std::time::Duration::from_millis(1100));
    }

    let releases: Vec<String> = fs::read_dir(remote.path().join("releases"))
        .unwrap()
        .filter_map(|e| e.ok())
        .map(|e| e.file_name().to_string_lossy().to_string())
        .collect();
    assert_eq!(releases.len(), 2);
    assert!(releases.contains(&last.unwrap().release.to_string()));
}

#[tokio::test]
async fn missing_source_touches_nothing() {
    let remote = tempfile::tempdir().unwrap();
    let sync = syncer(remote.path(), 3);

    let result = sync
        .push(&localhost(), Path::new("/nonexistent/keel-source"))
        .await;

    assert!(result.is_err());
    assert!(!remote.path().join("current").exists());
}
