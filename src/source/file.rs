//! Filesystem-backed configuration source.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use notify::event::{ModifyKind, RenameMode};
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

use super::path::{clean_path, is_same_file, real_path, watch_dir};
use super::{Source, SourceType, UpdateCallback};
use crate::error::SourceError;

/// Delay between a qualifying filesystem event and re-reading the file, so
/// multi-step writes can settle.
pub const DEBOUNCE_DELAY: Duration = Duration::from_millis(100);

type SharedCallback = Arc<Mutex<Option<UpdateCallback>>>;

/// Reads configuration from a file, optionally pushing changes as they happen.
///
/// In [`SourceType::Dynamic`] mode the *parent directory* is watched rather than
/// the file itself, so replacing the file by rename or repointing a symlink
/// keeps being observed.
pub struct FileSource {
    path: PathBuf,
    source_type: SourceType,
    callback: SharedCallback,
    watcher: Mutex<Option<RecommendedWatcher>>,
    shutdown: watch::Sender<bool>,
    started: AtomicBool,
    stopped: AtomicBool,
}

impl std::fmt::Debug for FileSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileSource")
            .field("path", &self.path)
            .field("source_type", &self.source_type)
            .field("started", &self.started.load(Ordering::SeqCst))
            .field("stopped", &self.stopped.load(Ordering::SeqCst))
            .finish()
    }
}

impl FileSource {
    /// Creates a new file source for `path`.
    pub fn new(path: impl Into<PathBuf>, source_type: SourceType) -> Self {
        let (shutdown, _) = watch::channel(false);

        Self {
            path: path.into(),
            source_type,
            callback: Arc::new(Mutex::new(None)),
            watcher: Mutex::new(None),
            shutdown,
            started: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
        }
    }

    /// Returns the configured path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn start_watching(&self) -> Result<(), SourceError> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| SourceError::NoRuntime)?;

        if self.started.swap(true, Ordering::SeqCst) {
            return Err(SourceError::AlreadyStarted);
        }

        let absolute = std::path::absolute(&self.path).map_err(|e| SourceError::WatchFailed {
            path: self.path.clone(),
            message: e.to_string(),
        })?;
        let target = clean_path(&absolute);
        let dir = watch_dir(&target);

        // Forward watcher events into the tokio task.
        let (event_tx, event_rx) = mpsc::unbounded_channel::<notify::Result<Event>>();
        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| {
                let _ = event_tx.send(res);
            },
            Config::default(),
        )?;

        watcher
            .watch(&dir, RecursiveMode::NonRecursive)
            .map_err(|e| SourceError::WatchFailed {
                path: dir.clone(),
                message: e.to_string(),
            })?;

        info!(path = ?target, dir = ?dir, "Started watching config file");

        let task = WatchTask {
            real_path: real_path(&target),
            target,
            callback: Arc::clone(&self.callback),
            shutdown: self.shutdown.subscribe(),
        };
        runtime.spawn(task.run(event_rx));

        *self.watcher.lock().unwrap_or_else(PoisonError::into_inner) = Some(watcher);
        Ok(())
    }
}

impl Source for FileSource {
    fn start(&self) -> Result<(), SourceError> {
        if self.stopped.load(Ordering::SeqCst) {
            return Err(SourceError::AlreadyStopped);
        }

        match self.source_type {
            SourceType::Polling => Ok(()),
            SourceType::Dynamic => self.start_watching(),
        }
    }

    fn stop(&self) -> Result<(), SourceError> {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return Err(SourceError::AlreadyStopped);
        }

        self.shutdown.send_replace(true);

        if self.source_type == SourceType::Polling {
            return Ok(());
        }

        // Dropping the watcher closes the event channel as well.
        let watcher = self
            .watcher
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        match watcher {
            Some(watcher) => {
                drop(watcher);
                info!(path = ?self.path, "Stopped watching config file");
                Ok(())
            }
            None => Err(SourceError::NotStarted),
        }
    }

    fn source_type(&self) -> SourceType {
        self.source_type
    }

    fn read(&self) -> Result<Vec<u8>, SourceError> {
        std::fs::read(&self.path).map_err(|e| SourceError::ReadFailed {
            path: self.path.clone(),
            source: e,
        })
    }

    fn set_update_callback(&self, callback: UpdateCallback) {
        if self.source_type != SourceType::Dynamic {
            debug!(path = ?self.path, "Ignoring update callback for polling source");
            return;
        }

        *self.callback.lock().unwrap_or_else(PoisonError::into_inner) = Some(callback);
    }
}

/// What a filesystem event means for the watched file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FileChange {
    WriteOrCreate,
    Remove,
    Other,
}

impl FileChange {
    /// Classifies `kind` for the path at `index` in the event's path list.
    fn classify(kind: &EventKind, index: usize) -> Self {
        match kind {
            EventKind::Create(_) => FileChange::WriteOrCreate,
            EventKind::Modify(ModifyKind::Data(_)) | EventKind::Modify(ModifyKind::Any) => {
                FileChange::WriteOrCreate
            }
            // Renamed into place. FSEvents reports every rename as `Any`; a rename
            // away then surfaces as a failed read.
            EventKind::Modify(ModifyKind::Name(RenameMode::To))
            | EventKind::Modify(ModifyKind::Name(RenameMode::Any)) => FileChange::WriteOrCreate,
            EventKind::Modify(ModifyKind::Name(RenameMode::Both)) if index == 1 => {
                FileChange::WriteOrCreate
            }
            EventKind::Remove(_) => FileChange::Remove,
            _ => FileChange::Other,
        }
    }
}

/// Background consumer of filesystem events for one target file.
struct WatchTask {
    target: PathBuf,
    real_path: Option<PathBuf>,
    callback: SharedCallback,
    shutdown: watch::Receiver<bool>,
}

impl WatchTask {
    async fn run(mut self, mut events: mpsc::UnboundedReceiver<notify::Result<Event>>) {
        loop {
            let event = tokio::select! {
                biased;
                _ = self.shutdown.changed() => {
                    debug!(path = ?self.target, "Watch task stopping");
                    break;
                }
                event = events.recv() => event,
            };

            let event = match event {
                Some(Ok(event)) => event,
                Some(Err(e)) => {
                    error!(path = ?self.target, error = %e, "Watcher error");
                    break;
                }
                None => {
                    warn!(path = ?self.target, "Watcher channel closed");
                    break;
                }
            };

            let index = match event
                .paths
                .iter()
                .position(|p| is_same_file(p, &self.target))
            {
                Some(index) => index,
                None => continue,
            };

            let change = FileChange::classify(&event.kind, index);
            let current = real_path(&self.target);
            let swapped = current.is_some() && current != self.real_path;

            if change == FileChange::WriteOrCreate || swapped {
                if swapped {
                    debug!(path = ?self.target, from = ?self.real_path, to = ?current, "Config file target changed");
                }
                self.real_path = current;

                if !self.debounce().await {
                    break;
                }

                match tokio::fs::read(&self.target).await {
                    Ok(bytes) => self.deliver(bytes),
                    Err(e) => {
                        let e = SourceError::ReadFailed {
                            path: self.target.clone(),
                            source: e,
                        };
                        warn!(error = %e, "Dropping config change");
                    }
                }
            } else if change == FileChange::Remove {
                info!(path = ?self.target, "Config file removed, stopping watch");
                self.deliver(Vec::new());
                break;
            }
        }
    }

    /// Waits out the debounce window. Returns `false` if stopped meanwhile.
    async fn debounce(&mut self) -> bool {
        tokio::select! {
            biased;
            _ = self.shutdown.changed() => false,
            _ = tokio::time::sleep(DEBOUNCE_DELAY) => true,
        }
    }

    fn deliver(&self, bytes: Vec<u8>) {
        let callback = self
            .callback
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        match callback {
            Some(callback) => {
                debug!(path = ?self.target, bytes = bytes.len(), "Delivering config update");
                callback(bytes);
            }
            None => debug!(path = ?self.target, "No update callback registered"),
        }
    }
}
