//! Integration tests for sweep and watch discovery

use nas_ingest::services::IngestWatcher;
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

fn extensions() -> Vec<String> {
    ["flac", "mp3", "wav", "m4a"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn touch(path: &std::path::Path) {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(path, b"audio").unwrap();
}

#[tokio::test]
async fn test_sweep_enqueues_allow_listed_files_recursively() {
    let temp_dir = TempDir::new().unwrap();
    let root = temp_dir.path().to_path_buf();
    touch(&root.join("a.flac"));
    touch(&root.join("Album/02 - Track.MP3"));
    touch(&root.join("Album/Disc 2/03.Wav"));
    touch(&root.join("Album/cover.jpg"));
    touch(&root.join("notes.txt"));

    let (tx, mut rx) = mpsc::channel(16);
    let watcher = IngestWatcher::new(root.clone(), extensions(), Duration::from_millis(0), tx);

    let queued = watcher.sweep().await.unwrap();
    drop(watcher);

    let mut seen = BTreeSet::new();
    while let Some(path) = rx.recv().await {
        seen.insert(path);
    }

    assert_eq!(queued, 3);
    let expected: BTreeSet<PathBuf> = [
        root.join("a.flac"),
        root.join("Album/02 - Track.MP3"),
        root.join("Album/Disc 2/03.Wav"),
    ]
    .into_iter()
    .collect();
    assert_eq!(seen, expected);
}

#[tokio::test]
async fn test_sweep_waits_for_queue_capacity() {
    let temp_dir = TempDir::new().unwrap();
    for i in 0..5 {
        touch(&temp_dir.path().join(format!("{}.flac", i)));
    }

    let (tx, mut rx) = mpsc::channel(1);
    let watcher = IngestWatcher::new(
        temp_dir.path().to_path_buf(),
        extensions(),
        Duration::from_millis(0),
        tx,
    );

    let consumer = tokio::spawn(async move {
        let mut count = 0;
        while rx.recv().await.is_some() {
            count += 1;
        }
        count
    });

    assert_eq!(watcher.sweep().await.unwrap(), 5);
    drop(watcher);
    assert_eq!(consumer.await.unwrap(), 5);
}

#[tokio::test]
async fn test_watch_delivers_new_file_after_settle_delay() {
    let temp_dir = TempDir::new().unwrap();
    let root = temp_dir.path().to_path_buf();
    let (tx, mut rx) = mpsc::channel(16);
    let watcher = IngestWatcher::new(root.clone(), extensions(), Duration::from_millis(50), tx);
    let cancel = CancellationToken::new();

    let watch_cancel = cancel.clone();
    let handle = tokio::spawn(async move { watcher.watch(watch_cancel.cancelled()).await });

    // Give the watcher time to subscribe
    tokio::time::sleep(Duration::from_millis(200)).await;
    touch(&root.join("ignored.txt"));
    touch(&root.join("incoming.flac"));

    let received = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("watched file delivered")
        .unwrap();
    assert_eq!(received, root.join("incoming.flac"));

    cancel.cancel();
    handle.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_watch_sweeps_directory_moved_in() {
    let temp_dir = TempDir::new().unwrap();
    let root = temp_dir.path().join("downloads");
    std::fs::create_dir_all(&root).unwrap();

    // Album assembled outside the watched tree, then moved in whole
    let staging = temp_dir.path().join("staging/Album");
    touch(&staging.join("01.flac"));
    touch(&staging.join("CD2/02.mp3"));
    touch(&staging.join("cover.jpg"));

    let (tx, mut rx) = mpsc::channel(16);
    let watcher = IngestWatcher::new(root.clone(), extensions(), Duration::from_millis(50), tx);
    let cancel = CancellationToken::new();

    let watch_cancel = cancel.clone();
    let handle = tokio::spawn(async move { watcher.watch(watch_cancel.cancelled()).await });

    tokio::time::sleep(Duration::from_millis(200)).await;
    std::fs::rename(&staging, root.join("Album")).unwrap();

    let mut seen = BTreeSet::new();
    while seen.len() < 2 {
        let path = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("files of the new directory delivered")
            .unwrap();
        seen.insert(path);
    }

    let expected: BTreeSet<PathBuf> = [root.join("Album/01.flac"), root.join("Album/CD2/02.mp3")]
        .into_iter()
        .collect();
    assert_eq!(seen, expected);

    cancel.cancel();
    handle.await.unwrap().unwrap();
}
