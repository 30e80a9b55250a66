//! File-watch driven reloads against a real directory.

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tc_config::ConfigManager;

const DELAY: Duration = Duration::from_millis(200);

fn write(path: &Path, content: &str) {
    std::fs::write(path, content).expect("failed to write config");
}

/// Polls until `check` holds or the deadline passes.
async fn eventually(mut check: impl FnMut() -> bool) -> bool {
    for _ in 0..100 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    check()
}

fn counted_manager(path: &Path) -> (Arc<ConfigManager>, Arc<AtomicUsize>) {
    let manager = Arc::new(ConfigManager::new(path).with_reload_delay(DELAY));
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    manager.set_reload_callback(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(())
    });
    (manager, calls)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_write_triggers_reload() {
    let dir = tempfile::tempdir().expect("failed to create temp dir");
    let path = dir.path().join("tc-exporter.yaml");
    write(&path, "port: 9100\n");

    let (manager, _calls) = counted_manager(&path);
    manager.load_config().unwrap();
    manager.start_watching().unwrap();

    write(&path, "port: 9101\n");
    assert!(eventually(|| manager.config().port == 9101).await);
    assert_eq!(manager.stats().reload_count, 1);

    manager.stop_watching().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_burst_of_writes_reloads_once() {
    let dir = tempfile::tempdir().expect("failed to create temp dir");
    let path = dir.path().join("tc-exporter.yaml");
    write(&path, "port: 9100\n");

    let (manager, calls) = counted_manager(&path);
    manager.load_config().unwrap();
    manager.start_watching().unwrap();

    for port in 9101..9111 {
        write(&path, &format!("port: {port}\n"));
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    assert!(eventually(|| calls.load(Ordering::SeqCst) >= 1).await);
    // Give a spurious second reload the chance to show up.
    tokio::time::sleep(DELAY * 3).await;

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(manager.config().port, 9110);

    manager.stop_watching().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_invalid_edit_keeps_last_known_good() {
    let dir = tempfile::tempdir().expect("failed to create temp dir");
    let path = dir.path().join("tc-exporter.yaml");
    write(&path, "port: 9100\n");

    let (manager, calls) = counted_manager(&path);
    manager.load_config().unwrap();
    manager.start_watching().unwrap();

    write(&path, "port: 99999\n");
    tokio::time::sleep(DELAY * 4).await;
    assert_eq!(manager.config().port, 9100);
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    write(&path, "port: 9102\n");
    assert!(eventually(|| manager.config().port == 9102).await);

    manager.stop_watching().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_replace_by_rename_is_observed() {
    let dir = tempfile::tempdir().expect("failed to create temp dir");
    let path = dir.path().join("tc-exporter.yaml");
    write(&path, "port: 9100\n");

    let (manager, _calls) = counted_manager(&path);
    manager.load_config().unwrap();
    manager.start_watching().unwrap();

    let staged = dir.path().join(".tc-exporter.yaml.swp");
    write(&staged, "port: 9103\n");
    std::fs::rename(&staged, &path).expect("failed to rename");

    assert!(eventually(|| manager.config().port == 9103).await);
    manager.stop_watching().await;
}

#[tokio::test]
async fn test_no_reload_after_stop() {
    let dir = tempfile::tempdir().expect("failed to create temp dir");
    let path = dir.path().join("tc-exporter.yaml");
    write(&path, "port: 9100\n");

    let (manager, calls) = counted_manager(&path);
    manager.load_config().unwrap();
    manager.start_watching().unwrap();
    manager.stop_watching().await;

    write(&path, "port: 9104\n");
    tokio::time::sleep(DELAY * 3).await;
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert_eq!(manager.config().port, 9100);
}
