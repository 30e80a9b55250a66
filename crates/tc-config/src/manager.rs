//! Hot reload of the configuration file.
//!
//! [`ConfigManager`] owns the current validated [`Config`]. A reload reads,
//! parses and validates the file, offers the candidate to the reload
//! callback, and only then publishes it. Any failure leaves the previous
//! config in place.
//!
//! The watch loop observes the parent directory, so editors that save by
//! renaming a temp file over the config are picked up. Bursts of events are
//! debounced into a single reload.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use notify::event::ModifyKind;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::error::{ConfigError, Result};

/// Default debounce window for file events.
pub const DEFAULT_RELOAD_DELAY: Duration = Duration::from_secs(2);

/// Called with a validated candidate before it is published.
///
/// Returning an error rejects the candidate and keeps the current config.
/// The callback runs while the reload is serialized, so it must not call
/// [`ConfigManager::reload`] itself.
pub type ReloadCallback = Arc<dyn Fn(&Config) -> std::result::Result<(), String> + Send + Sync>;

/// Snapshot of the manager's reload bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReloadStats {
    /// Path of the backing file.
    pub config_path: PathBuf,
    /// When the last committed reload happened.
    pub last_reload: Option<DateTime<Utc>>,
    /// Number of committed reloads.
    pub reload_count: u64,
    /// Whether the watch loop is running.
    pub is_watching: bool,
    /// Debounce window.
    #[serde(with = "humantime_serde")]
    pub reload_delay: Duration,
}

#[derive(Debug, Default)]
struct ReloadState {
    last_reload: Option<DateTime<Utc>>,
    reload_count: u64,
}

struct WatchHandle {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

/// Owns the current configuration and reloads it from disk.
pub struct ConfigManager {
    path: PathBuf,
    current: RwLock<Arc<Config>>,
    callback: RwLock<Option<ReloadCallback>>,
    reload_delay: Duration,
    reload_guard: Mutex<ReloadState>,
    watch: Mutex<Option<WatchHandle>>,
}

impl std::fmt::Debug for ConfigManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigManager")
            .field("path", &self.path)
            .field("reload_delay", &self.reload_delay)
            .field("is_watching", &self.is_watching())
            .finish_non_exhaustive()
    }
}

impl ConfigManager {
    /// Creates a manager for `path`, starting from [`Config::default`].
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            current: RwLock::new(Arc::new(Config::default())),
            callback: RwLock::new(None),
            reload_delay: DEFAULT_RELOAD_DELAY,
            reload_guard: Mutex::new(ReloadState::default()),
            watch: Mutex::new(None),
        }
    }

    /// Sets the debounce window.
    #[must_use]
    pub fn with_reload_delay(mut self, delay: Duration) -> Self {
        self.reload_delay = delay;
        self
    }

    /// Path of the backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The current configuration.
    ///
    /// The returned value is an immutable snapshot; later reloads replace the
    /// manager's pointer and never mutate it.
    #[must_use]
    pub fn config(&self) -> Arc<Config> {
        Arc::clone(&self.current.read())
    }

    /// Installs the callback consulted on every [`ConfigManager::reload`].
    pub fn set_reload_callback<F>(&self, callback: F)
    where
        F: Fn(&Config) -> std::result::Result<(), String> + Send + Sync + 'static,
    {
        *self.callback.write() = Some(Arc::new(callback));
    }

    /// Loads the file and publishes it without consulting the callback.
    ///
    /// Used once at startup. On error the current config is untouched, so
    /// the caller keeps running on defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::NotFound`] for a missing file, and a read, parse
    /// or validation error otherwise.
    pub fn load_config(&self) -> Result<Arc<Config>> {
        let _state = self.reload_guard.lock();
        let config = Arc::new(Config::from_file(&self.path)?);
        *self.current.write() = Arc::clone(&config);
        info!(path = %self.path.display(), "configuration loaded");
        Ok(config)
    }

    /// Reloads the file.
    ///
    /// The candidate is validated, then offered to the reload callback, and
    /// published only if both accept it. Reloads are serialized.
    ///
    /// # Errors
    ///
    /// Returns the load error or [`ConfigError::Callback`]; in both cases the
    /// previous config stays current.
    pub fn reload(&self) -> Result<Arc<Config>> {
        let mut state = self.reload_guard.lock();

        let candidate = Arc::new(Config::from_file(&self.path)?);

        let callback = self.callback.read().clone();
        if let Some(callback) = callback {
            if let Err(reason) = callback(&candidate) {
                warn!(
                    path = %self.path.display(),
                    reason = %reason,
                    "reload rejected, keeping previous configuration"
                );
                return Err(ConfigError::Callback(reason));
            }
        }

        *self.current.write() = Arc::clone(&candidate);
        state.reload_count += 1;
        state.last_reload = Some(Utc::now());
        info!(
            path = %self.path.display(),
            reload_count = state.reload_count,
            "configuration reloaded"
        );
        Ok(candidate)
    }

    /// Reload bookkeeping.
    #[must_use]
    pub fn stats(&self) -> ReloadStats {
        let state = self.reload_guard.lock();
        ReloadStats {
            config_path: self.path.clone(),
            last_reload: state.last_reload,
            reload_count: state.reload_count,
            is_watching: self.is_watching(),
            reload_delay: self.reload_delay,
        }
    }

    /// Whether the watch loop is running.
    #[must_use]
    pub fn is_watching(&self) -> bool {
        self.watch
            .lock()
            .as_ref()
            .is_some_and(|handle| !handle.task.is_finished())
    }

    /// Starts watching the config file's directory for changes.
    ///
    /// # Errors
    ///
    /// Fails if a watch loop is already running, if there is no tokio
    /// runtime, or if the directory cannot be watched.
    pub fn start_watching(self: &Arc<Self>) -> Result<()> {
        let mut slot = self.watch.lock();
        if slot.as_ref().is_some_and(|h| !h.task.is_finished()) {
            return Err(ConfigError::AlreadyWatching);
        }
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| ConfigError::NoRuntime)?;

        let (dir, target) = watch_target(&self.path);
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let mut watcher = notify::recommended_watcher(move |event: notify::Result<Event>| {
            // The receiver is gone once the loop has exited.
            let _ = event_tx.send(event);
        })?;
        watcher.watch(&dir, RecursiveMode::NonRecursive)?;

        let cancel = CancellationToken::new();
        let task = runtime.spawn(watch_loop(
            Arc::downgrade(self),
            self.reload_delay,
            watcher,
            target,
            event_rx,
            cancel.clone(),
        ));
        *slot = Some(WatchHandle { cancel, task });

        info!(
            path = %self.path.display(),
            dir = %dir.display(),
            delay = ?self.reload_delay,
            "watching configuration file"
        );
        Ok(())
    }

    /// Stops the watch loop and releases the watcher. Safe to call repeatedly.
    pub async fn stop_watching(&self) {
        let handle = self.watch.lock().take();
        let Some(handle) = handle else {
            return;
        };
        handle.cancel.cancel();
        if let Err(e) = handle.task.await {
            warn!(error = %e, "config watch task ended abnormally");
        }
        info!(path = %self.path.display(), "stopped watching configuration file");
    }
}

impl Drop for ConfigManager {
    fn drop(&mut self) {
        if let Some(handle) = self.watch.get_mut().take() {
            handle.cancel.cancel();
        }
    }
}

/// Splits the config path into the directory to watch and the exact path
/// events must carry.
fn watch_target(path: &Path) -> (PathBuf, PathBuf) {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    let dir = std::fs::canonicalize(&parent).unwrap_or(parent);
    let target = match path.file_name() {
        Some(name) => dir.join(name),
        None => dir.clone(),
    };
    (dir, target)
}

/// Content changes only; metadata updates such as chmod or touch are ignored.
fn is_config_event(event: &Event, target: &Path) -> bool {
    matches!(
        event.kind,
        EventKind::Create(_)
            | EventKind::Modify(ModifyKind::Data(_) | ModifyKind::Name(_) | ModifyKind::Any)
    ) && event.paths.iter().any(|p| p == target)
}

async fn wait_for(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

async fn watch_loop(
    manager: Weak<ConfigManager>,
    reload_delay: Duration,
    _watcher: RecommendedWatcher,
    target: PathBuf,
    mut events: mpsc::UnboundedReceiver<notify::Result<Event>>,
    cancel: CancellationToken,
) {
    // Capacity one: a pending reload absorbs any further signal.
    let (reload_tx, mut reload_rx) = mpsc::channel::<()>(1);
    let mut deadline: Option<Instant> = None;

    loop {
        tokio::select! {
            () = cancel.cancelled() => break,

            event = events.recv() => match event {
                Some(Ok(event)) => {
                    if is_config_event(&event, &target) {
                        debug!(kind = ?event.kind, "config file event");
                        deadline = Some(Instant::now() + reload_delay);
                    }
                }
                Some(Err(e)) => warn!(error = %e, "config watcher error"),
                None => {
                    warn!("config watcher closed");
                    break;
                }
            },

            () = wait_for(deadline) => {
                deadline = None;
                if reload_tx.try_send(()).is_err() {
                    debug!("reload already pending");
                }
            }

            Some(()) = reload_rx.recv() => {
                let Some(manager) = manager.upgrade() else {
                    break;
                };
                if let Err(e) = manager.reload() {
                    error!(error = %e, "failed to reload configuration");
                }
            }
        }
    }

    debug!("config watch loop exited");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn write(path: &Path, content: &str) {
        std::fs::write(path, content).expect("failed to write config");
    }

    fn manager_with(content: &str) -> (tempfile::TempDir, ConfigManager) {
        let dir = tempfile::tempdir().expect("failed to create temp dir");
        let path = dir.path().join("tc-exporter.yaml");
        write(&path, content);
        (dir, ConfigManager::new(path))
    }

    #[test]
    fn test_starts_from_defaults() {
        let manager = ConfigManager::new("/nonexistent/tc-exporter.yaml");
        assert_eq!(*manager.config(), Config::default());
        assert_eq!(manager.stats().reload_count, 0);
        assert!(!manager.is_watching());
    }

    #[test]
    fn test_missing_file_keeps_defaults() {
        let manager = ConfigManager::new("/nonexistent/tc-exporter.yaml");
        assert!(manager.load_config().unwrap_err().is_not_found());
        assert!(manager.reload().unwrap_err().is_not_found());
        assert_eq!(*manager.config(), Config::default());
    }

    #[test]
    fn test_load_config() {
        let (_dir, manager) = manager_with("port: 9100\n");
        manager.load_config().unwrap();
        assert_eq!(manager.config().port, 9100);
        assert_eq!(manager.stats().reload_count, 0);
    }

    #[test]
    fn test_reload_rolls_back_on_invalid_port() {
        let (_dir, manager) = manager_with("port: 9100\n");
        manager.load_config().unwrap();

        write(manager.path(), "port: 99999\n");
        let err = manager.reload().unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
        assert_eq!(manager.config().port, 9100);
        assert_eq!(manager.stats().reload_count, 0);
    }

    #[test]
    fn test_only_content_changes_trigger_reload() {
        use notify::event::{AccessKind, CreateKind, DataChange, MetadataKind, RenameMode};

        let target = Path::new("/etc/tc-exporter/tc-exporter.yaml");
        let event = |kind| Event::new(kind).add_path(target.to_path_buf());

        assert!(is_config_event(&event(EventKind::Create(CreateKind::File)), target));
        assert!(is_config_event(
            &event(EventKind::Modify(ModifyKind::Data(DataChange::Content))),
            target
        ));
        assert!(is_config_event(
            &event(EventKind::Modify(ModifyKind::Name(RenameMode::To))),
            target
        ));
        assert!(is_config_event(&event(EventKind::Modify(ModifyKind::Any)), target));

        assert!(!is_config_event(
            &event(EventKind::Modify(ModifyKind::Metadata(MetadataKind::Permissions))),
            target
        ));
        assert!(!is_config_event(
            &event(EventKind::Modify(ModifyKind::Metadata(MetadataKind::WriteTime))),
            target
        ));
        assert!(!is_config_event(&event(EventKind::Access(AccessKind::Any)), target));

        let other = Event::new(EventKind::Modify(ModifyKind::Any))
            .add_path(PathBuf::from("/etc/tc-exporter/other.yaml"));
        assert!(!is_config_event(&other, target));
    }

    #[test]
    fn test_reload_of_unchanged_file_succeeds() {
        let (_dir, manager) = manager_with("port: 9100\nlog:\n  max_size: 10MiB\n");
        manager.load_config().unwrap();
        manager.reload().unwrap();
        assert_eq!(manager.config().log.max_size, "10MiB");

        write(manager.path(), "port: 9200\nlog:\n  max_size: lots\n");
        let err = manager.reload().unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
        assert_eq!(manager.config().port, 9100);
    }

    #[test]
    fn test_reload_keeps_previous_on_parse_error() {
        let (_dir, manager) = manager_with("port: 9100\n");
        manager.load_config().unwrap();

        write(manager.path(), "port: [1, 2\n");
        assert!(matches!(manager.reload().unwrap_err(), ConfigError::Parse { .. }));
        assert_eq!(manager.config().port, 9100);
    }

    #[test]
    fn test_callback_rejection_rolls_back() {
        let (_dir, manager) = manager_with("port: 9100\n");
        manager.load_config().unwrap();
        manager.set_reload_callback(|candidate| {
            if candidate.port == 9200 {
                Err("port 9200 is reserved".to_string())
            } else {
                Ok(())
            }
        });

        write(manager.path(), "port: 9200\n");
        let err = manager.reload().unwrap_err();
        assert_eq!(err.to_string(), "reload callback failed: port 9200 is reserved");
        assert_eq!(manager.config().port, 9100);

        write(manager.path(), "port: 9300\n");
        manager.reload().unwrap();
        assert_eq!(manager.config().port, 9300);
        assert_eq!(manager.stats().reload_count, 1);
        assert!(manager.stats().last_reload.is_some());
    }

    #[test]
    fn test_callback_sees_candidate_and_previous() {
        let (_dir, manager) = manager_with("port: 9100\n");
        manager.load_config().unwrap();
        let manager = Arc::new(manager);

        let seen = Arc::new(Mutex::new(Vec::new()));
        let observer = Arc::clone(&manager);
        let log = Arc::clone(&seen);
        manager.set_reload_callback(move |candidate| {
            log.lock().push((observer.config().port, candidate.port));
            Ok(())
        });

        write(manager.path(), "port: 9101\n");
        manager.reload().unwrap();
        assert_eq!(*seen.lock(), vec![(9100, 9101)]);
    }

    #[test]
    fn test_snapshots_are_immutable() {
        let (_dir, manager) = manager_with("port: 9100\n");
        manager.load_config().unwrap();
        let before = manager.config();

        write(manager.path(), "port: 9101\n");
        manager.reload().unwrap();
        assert_eq!(before.port, 9100);
        assert_eq!(manager.config().port, 9101);
    }

    #[test]
    fn test_stats_serialize() {
        let manager = ConfigManager::new("/etc/uos-exporter/tc-exporter.yaml")
            .with_reload_delay(Duration::from_millis(500));
        let stats = manager.stats();
        assert_eq!(stats.reload_delay, Duration::from_millis(500));
        assert_eq!(stats.config_path, PathBuf::from("/etc/uos-exporter/tc-exporter.yaml"));
    }

    #[test]
    fn test_watch_target_relative_path() {
        let (dir, target) = watch_target(Path::new("tc-exporter.yaml"));
        assert_eq!(target, dir.join("tc-exporter.yaml"));
    }

    #[test]
    fn test_start_watching_needs_runtime() {
        let (_dir, manager) = manager_with("port: 9100\n");
        let manager = Arc::new(manager);
        assert!(matches!(manager.start_watching(), Err(ConfigError::NoRuntime)));
    }

    #[tokio::test]
    async fn test_start_and_stop_watching() {
        let (_dir, manager) = manager_with("port: 9100\n");
        let manager = Arc::new(manager.with_reload_delay(Duration::from_millis(50)));

        manager.start_watching().unwrap();
        assert!(manager.is_watching());
        assert!(matches!(manager.start_watching(), Err(ConfigError::AlreadyWatching)));

        manager.stop_watching().await;
        assert!(!manager.is_watching());
        manager.stop_watching().await;
    }

    #[tokio::test]
    async fn test_unrelated_files_are_ignored() {
        let (dir, manager) = manager_with("port: 9100\n");
        let manager = Arc::new(manager.with_reload_delay(Duration::from_millis(20)));
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        manager.set_reload_callback(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        manager.start_watching().unwrap();
        write(&dir.path().join("other.yaml"), "port: 1\n");
        tokio::time::sleep(Duration::from_millis(300)).await;
        manager.stop_watching().await;

        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }
}
