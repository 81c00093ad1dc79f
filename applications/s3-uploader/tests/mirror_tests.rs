//! End-to-end tests: directory changes flow through the watcher into a sink


use s3_uploader::Mirror;
use s3u_uploader::MemorySink;
use s3u_watcher::{LocalSource, MemorySource};
use std::fs;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tempfile::TempDir;
use tokio::sync::oneshot;
use tokio::time::timeout;

const WAIT: Duration = Duration::from_secs(5);

#[tokio::test]
async fn test_nested_file_uploaded_under_relative_key() {
    test_helpers::init_tracing();
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    fs::create_dir(temp_dir.path().join("sub")).unwrap();
    fs::write(temp_dir.path().join("sub/file.txt"), b"nested").unwrap();

    let sink = Arc::new(MemorySink::new());
    let mirror = Mirror::new(
        temp_dir.path(),
        Arc::new(LocalSource::new(temp_dir.path())),
        sink.clone(),
        test_helpers::fast_config(),
        2,
    );

    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let running = tokio::spawn(mirror.run(async {
        let _ = stop_rx.await;
    }));

    let object = test_helpers::wait_for_object(&sink, "sub/file.txt").await;
    assert_eq!(object, b"nested");

    stop_tx.send(()).unwrap();
    let stats = timeout(WAIT, running)
        .await
        .expect("mirror stops within timeout")
        .unwrap()
        .unwrap();

    assert_eq!(stats.completed, 1);
    assert_eq!(stats.failed, 0);
    assert_eq!(sink.keys(), vec!["sub/file.txt"]);
}

#[tokio::test]
async fn test_modified_file_uploaded_again() {
    test_helpers::init_tracing();
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let path = temp_dir.path().join("foo.txt");
    fs::write(&path, b"foo").unwrap();

    let sink = Arc::new(MemorySink::new());
    let mirror = Mirror::new(
        temp_dir.path(),
        Arc::new(LocalSource::new(temp_dir.path())),
        sink.clone(),
        test_helpers::fast_config(),
        2,
    );

    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let running = tokio::spawn(mirror.run(async {
        let _ = stop_rx.await;
    }));

    test_helpers::wait_for_object(&sink, "foo.txt").await;
    fs::write(&path, b"foo bar baz").unwrap();

    for _ in 0..400 {
        if sink.object("foo.txt").as_deref() == Some(&b"foo bar baz"[..]) {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(sink.object("foo.txt").as_deref(), Some(&b"foo bar baz"[..]));

    stop_tx.send(()).unwrap();
    let stats = timeout(WAIT, running).await.unwrap().unwrap().unwrap();
    assert_eq!(stats.completed, 2);
}

#[tokio::test]
async fn test_paths_without_valid_key_are_skipped() {
    test_helpers::init_tracing();
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    fs::write(temp_dir.path().join("ok.txt"), b"ok").unwrap();

    let source = Arc::new(MemorySource::new());
    let now = SystemTime::now();
    source.insert("../escape.txt", 3, now);
    source.insert("ok.txt", 2, now);

    let sink = Arc::new(MemorySink::new());
    let mirror = Mirror::new(
        temp_dir.path(),
        source,
        sink.clone(),
        test_helpers::fast_config(),
        1,
    );

    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let running = tokio::spawn(mirror.run(async {
        let _ = stop_rx.await;
    }));

    test_helpers::wait_for_object(&sink, "ok.txt").await;
    stop_tx.send(()).unwrap();

    let stats = timeout(WAIT, running).await.unwrap().unwrap().unwrap();
    assert_eq!(stats.completed, 1);
    assert_eq!(stats.failed, 0);
    assert_eq!(sink.keys(), vec!["ok.txt"]);
}

#[tokio::test]
async fn test_immediate_shutdown_uploads_nothing() {
    test_helpers::init_tracing();
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    fs::write(temp_dir.path().join("foo.txt"), b"foo").unwrap();

    let sink = Arc::new(MemorySink::new());
    let mirror = Mirror::new(
        temp_dir.path(),
        Arc::new(LocalSource::new(temp_dir.path())),
        sink.clone(),
        test_helpers::fast_config(),
        1,
    );

    let stats = timeout(WAIT, mirror.run(async {}))
        .await
        .expect("mirror stops within timeout")
        .unwrap();

    assert_eq!(stats.total(), 0);
    assert!(sink.is_empty());
}

#[tokio::test]
async fn test_shutdown_counts_changes_left_behind() {
    test_helpers::init_tracing();
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    for name in ["a.txt", "b.txt", "c.txt"] {
        fs::write(temp_dir.path().join(name), [b'x'; 64]).unwrap();
    }

    // One slot and a slow transfer keep the other two changes waiting
    let sink = Arc::new(
        MemorySink::new()
            .with_chunk_size(4)
            .with_chunk_delay(Duration::from_millis(20)),
    );
    let mirror = Mirror::new(
        temp_dir.path(),
        Arc::new(LocalSource::new(temp_dir.path())),
        sink.clone(),
        test_helpers::fast_config(),
        1,
    );

    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let running = tokio::spawn(mirror.run(async {
        let _ = stop_rx.await;
    }));

    for _ in 0..400 {
        if sink.put_count() > 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert_eq!(sink.put_count(), 1);
    stop_tx.send(()).unwrap();

    let stats = timeout(WAIT, running).await.unwrap().unwrap().unwrap();
    assert_eq!(stats.completed, 1);
    assert_eq!(stats.discarded, 2);
    assert_eq!(sink.len(), 1);
}
