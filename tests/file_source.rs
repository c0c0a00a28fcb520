//! Filesystem watching behaviour of `FileSource` in push mode.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use dynamic_config::{FileSource, Source, SourceError, SourceType};
use tokio::sync::mpsc;
use tokio_test::{assert_err, assert_ok};

type Payloads = mpsc::UnboundedReceiver<Vec<u8>>;

fn watched(path: &Path) -> (FileSource, Payloads) {
    let source = FileSource::new(path, SourceType::Dynamic);
    let (tx, rx) = mpsc::unbounded_channel();
    source.set_update_callback(Arc::new(move |bytes: Vec<u8>| {
        let _ = tx.send(bytes);
    }));
    (source, rx)
}

/// Waits until `expected` is delivered, skipping intermediate payloads.
async fn delivered(rx: &mut Payloads, expected: &[u8]) -> bool {
    tokio::time::timeout(Duration::from_secs(3), async {
        while let Some(payload) = rx.recv().await {
            if payload == expected {
                return true;
            }
        }
        false
    })
    .await
    .unwrap_or(false)
}

/// True if nothing arrives within `window`.
async fn quiet(rx: &mut Payloads, window: Duration) -> bool {
    tokio::time::timeout(window, rx.recv()).await.is_err()
}

async fn settle() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn write_delivers_new_content() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("app.json");
    std::fs::write(&path, br#"{"level":"info"}"#).unwrap();

    let (source, mut rx) = watched(&path);
    assert_ok!(source.start());
    settle().await;

    std::fs::write(&path, br#"{"level":"debug"}"#).unwrap();
    assert!(delivered(&mut rx, br#"{"level":"debug"}"#).await);

    assert_ok!(source.stop());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn sibling_files_are_ignored() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("app.json");
    std::fs::write(&path, b"{}").unwrap();

    let (source, mut rx) = watched(&path);
    assert_ok!(source.start());
    settle().await;

    std::fs::write(dir.path().join("other.json"), b"{\"x\":1}").unwrap();
    std::fs::write(dir.path().join("app.json.bak"), b"{\"x\":2}").unwrap();
    assert!(quiet(&mut rx, Duration::from_millis(500)).await);

    assert_ok!(source.stop());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn remove_delivers_empty_payload_and_ends_watch() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("app.json");
    std::fs::write(&path, b"{}").unwrap();

    let (source, mut rx) = watched(&path);
    assert_ok!(source.start());
    settle().await;

    std::fs::remove_file(&path).unwrap();
    let payload = tokio::time::timeout(Duration::from_secs(3), rx.recv())
        .await
        .expect("removal delivered")
        .expect("channel open");
    assert!(payload.is_empty());

    // The watch task is gone: recreating the file produces nothing.
    std::fs::write(&path, br#"{"level":"warn"}"#).unwrap();
    assert!(quiet(&mut rx, Duration::from_millis(500)).await);

    assert_ok!(source.stop());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn rename_into_place_is_picked_up() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("app.yaml");
    std::fs::write(&path, b"level: info\n").unwrap();

    let (source, mut rx) = watched(&path);
    assert_ok!(source.start());
    settle().await;

    let staged = dir.path().join(".app.yaml.tmp");
    std::fs::write(&staged, b"level: error\n").unwrap();
    std::fs::rename(&staged, &path).unwrap();

    assert!(delivered(&mut rx, b"level: error\n").await);

    assert_ok!(source.stop());
}

#[cfg(unix)]
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn symlink_swap_is_picked_up() {
    use std::os::unix::fs::symlink;

    let dir = tempfile::tempdir().unwrap();
    let v1 = dir.path().join("v1.json");
    let v2 = dir.path().join("v2.json");
    std::fs::write(&v1, br#"{"level":"info"}"#).unwrap();
    std::fs::write(&v2, br#"{"level":"trace"}"#).unwrap();

    let path = dir.path().join("app.json");
    symlink(&v1, &path).unwrap();

    let (source, mut rx) = watched(&path);
    assert_ok!(source.start());
    settle().await;

    let staged = dir.path().join("app.json.next");
    symlink(&v2, &staged).unwrap();
    std::fs::rename(&staged, &path).unwrap();

    assert!(delivered(&mut rx, br#"{"level":"trace"}"#).await);

    assert_ok!(source.stop());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn stop_ends_watching() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("app.json");
    std::fs::write(&path, b"{}").unwrap();

    let (source, mut rx) = watched(&path);
    assert_ok!(source.start());
    settle().await;

    assert_ok!(source.stop());
    let second = assert_err!(source.stop());
    assert!(matches!(second, SourceError::AlreadyStopped));

    std::fs::write(&path, br#"{"level":"debug"}"#).unwrap();
    assert!(quiet(&mut rx, Duration::from_millis(500)).await);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn start_twice_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("app.json");
    std::fs::write(&path, b"{}").unwrap();

    let (source, _rx) = watched(&path);
    assert_ok!(source.start());
    assert!(matches!(source.start(), Err(SourceError::AlreadyStarted)));
    assert_ok!(source.stop());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn read_returns_current_bytes_in_both_modes() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("app.json");
    std::fs::write(&path, br#"{"level":"info"}"#).unwrap();

    for mode in [SourceType::Polling, SourceType::Dynamic] {
        let source = FileSource::new(&path, mode);
        assert_eq!(source.source_type(), mode);
        assert_eq!(assert_ok!(source.read()), br#"{"level":"info"}"#.to_vec());
    }
}
