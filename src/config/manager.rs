//! Typed configuration manager driving a [`Source`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock, PoisonError, RwLock, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use super::options::Options;
use crate::error::{ConfigError, DecodeError};
use crate::listener::Listener;
use crate::source::{Source, SourceType};

/// Decode function turning raw source bytes into a typed configuration.
pub type DecodeFn<T> = Arc<dyn Fn(&[u8]) -> Result<T, DecodeError> + Send + Sync>;

/// Holds the current configuration of type `T` and keeps it in sync with a
/// [`Source`].
///
/// Polling sources are read on a timer; dynamic sources push bytes through a
/// callback. Either way every payload is decoded, compared with the held value,
/// and only a value that differs is stored and fanned out to the listeners.
/// Payloads that fail to decode are logged and dropped, leaving the held value
/// authoritative.
///
/// Cloning the manager yields another handle to the same state.
pub struct ConfigManager<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for ConfigManager<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct Inner<T> {
    options: Options,
    source: Arc<dyn Source>,
    decode: DecodeFn<T>,
    state: RwLock<State<T>>,
    runtime: OnceLock<Handle>,
    shutdown: watch::Sender<bool>,
    started: AtomicBool,
    stopped: AtomicBool,
}

/// Everything guarded by the manager's lock.
struct State<T> {
    current: T,
    listeners: Vec<Arc<dyn Listener<T>>>,
    last_updated: Option<DateTime<Utc>>,
    digest: Option<String>,
}

impl<T> ConfigManager<T>
where
    T: Clone + PartialEq + Default + Send + Sync + 'static,
{
    /// Creates an idle manager. Nothing is read until [`start`](Self::start)
    /// or [`refresh`](Self::refresh).
    pub fn new<F>(source: Arc<dyn Source>, decode: F, options: Options) -> Self
    where
        F: Fn(&[u8]) -> Result<T, DecodeError> + Send + Sync + 'static,
    {
        let (shutdown, _) = watch::channel(false);

        Self {
            inner: Arc::new(Inner {
                options,
                source,
                decode: Arc::new(decode),
                state: RwLock::new(State {
                    current: T::default(),
                    listeners: Vec::new(),
                    last_updated: None,
                    digest: None,
                }),
                runtime: OnceLock::new(),
                shutdown,
                started: AtomicBool::new(false),
                stopped: AtomicBool::new(false),
            }),
        }
    }

    /// Starts refreshing from the source.
    ///
    /// Must be called from within a tokio runtime. A manager can be started
    /// once; after [`stop`](Self::stop) it cannot be restarted.
    pub fn start(&self) -> Result<(), ConfigError> {
        let runtime = Handle::try_current().map_err(|_| ConfigError::NoRuntime)?;

        if self.inner.stopped.load(Ordering::SeqCst) {
            return Err(ConfigError::Stopped);
        }
        if self.inner.started.swap(true, Ordering::SeqCst) {
            return Err(ConfigError::AlreadyStarted);
        }
        let _ = self.inner.runtime.set(runtime.clone());

        match self.inner.source.source_type() {
            SourceType::Polling => {
                let period = self.inner.options.poll_interval;
                runtime.spawn(poll_loop(
                    Arc::downgrade(&self.inner),
                    self.inner.shutdown.subscribe(),
                    period,
                ));
                info!(interval = ?period, "Config manager polling started");
            }
            SourceType::Dynamic => {
                let weak = Arc::downgrade(&self.inner);
                self.inner
                    .source
                    .set_update_callback(Arc::new(move |bytes: Vec<u8>| {
                        if let Some(inner) = weak.upgrade() {
                            inner.on_source_update(&bytes);
                        }
                    }));
                if let Err(e) = self.inner.source.start() {
                    self.inner.started.store(false, Ordering::SeqCst);
                    return Err(e.into());
                }
                info!("Config manager listening for source updates");
            }
        }

        Ok(())
    }

    /// Stops the source and the poll loop.
    ///
    /// Source failures are logged. Only the first call has any effect.
    pub fn stop(&self) {
        if self.inner.stopped.swap(true, Ordering::SeqCst) {
            warn!("Config manager already stopped");
            return;
        }

        if let Err(e) = self.inner.source.stop() {
            warn!(error = %e, "Failed to stop config source");
        }
        self.inner.shutdown.send_replace(true);

        info!("Config manager stopped");
    }

    /// Adds a listener notified on every applied change.
    pub fn register_listener<L>(&self, listener: L)
    where
        L: Listener<T> + 'static,
    {
        let count = {
            let mut state = self.inner.write_state();
            state.listeners.push(Arc::new(listener));
            state.listeners.len()
        };

        if let Some(metrics) = &self.inner.options.metrics {
            metrics.set_listeners(count);
        }
        debug!(listeners = count, "Registered config listener");
    }

    /// Reads the source once and applies the result.
    ///
    /// Returns whether the held configuration changed. The manager never calls
    /// this on its own; use it e.g. to load the initial value.
    pub fn refresh(&self) -> Result<bool, ConfigError> {
        if self.inner.stopped.load(Ordering::SeqCst) {
            return Err(ConfigError::Stopped);
        }

        let bytes = self.inner.read_source()?;
        Ok(self.inner.apply(&bytes)?)
    }

    /// Returns a clone of the held configuration.
    pub fn current(&self) -> T {
        self.inner.read_state().current.clone()
    }

    /// When the held configuration last changed.
    pub fn last_updated(&self) -> Option<DateTime<Utc>> {
        self.inner.read_state().last_updated
    }

    /// SHA-256 hex digest of the payload behind the held configuration.
    pub fn digest(&self) -> Option<String> {
        self.inner.read_state().digest.clone()
    }

    /// Whether the manager has been started and not yet stopped.
    pub fn is_running(&self) -> bool {
        self.inner.started.load(Ordering::SeqCst) && !self.inner.stopped.load(Ordering::SeqCst)
    }

    /// Returns the manager options.
    pub fn options(&self) -> &Options {
        &self.inner.options
    }
}

impl<T> Inner<T>
where
    T: Clone + PartialEq + Default + Send + Sync + 'static,
{
    fn read_state(&self) -> std::sync::RwLockReadGuard<'_, State<T>> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_state(&self) -> std::sync::RwLockWriteGuard<'_, State<T>> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn read_source(&self) -> Result<Vec<u8>, ConfigError> {
        let result = self.source.read();
        if let Some(metrics) = &self.options.metrics {
            match &result {
                Ok(_) => metrics.record_read_ok(),
                Err(_) => metrics.record_read_error(),
            }
        }
        Ok(result?)
    }

    /// One poll tick.
    fn poll_once(&self) {
        match self.read_source() {
            Ok(bytes) => self.on_source_update(&bytes),
            Err(e) => warn!(error = %e, "Failed to read config, keeping current"),
        }
    }

    /// Entry point for bytes from either refresh mode. Errors are absorbed.
    fn on_source_update(&self, bytes: &[u8]) {
        if self.stopped.load(Ordering::SeqCst) {
            debug!("Ignoring config update after stop");
            return;
        }

        if let Err(e) = self.apply(bytes) {
            warn!(error = %e, "Failed to decode config, keeping current");
        }
    }

    /// Decodes `bytes` and stores the result if it differs from the held value.
    fn apply(&self, bytes: &[u8]) -> Result<bool, DecodeError> {
        let config = (self.decode)(bytes).inspect_err(|_| {
            if let Some(metrics) = &self.options.metrics {
                metrics.record_decode_failure();
            }
        })?;

        let (listeners, digest) = {
            let mut state = self.write_state();
            if state.current == config {
                drop(state);
                if let Some(metrics) = &self.options.metrics {
                    metrics.record_unchanged();
                }
                debug!("Config unchanged");
                return Ok(false);
            }

            let digest = compute_digest(bytes);
            state.current = config.clone();
            state.last_updated = Some(Utc::now());
            state.digest = Some(digest.clone());
            (state.listeners.clone(), digest)
        };

        info!(digest = %digest, listeners = listeners.len(), "Config updated");
        if let Some(metrics) = &self.options.metrics {
            metrics.record_applied(listeners.len());
        }

        self.dispatch(config, listeners);
        Ok(true)
    }

    /// Hands `config` to every listener on its own blocking task, without
    /// waiting for any of them.
    fn dispatch(&self, config: T, listeners: Vec<Arc<dyn Listener<T>>>) {
        let runtime = self
            .runtime
            .get()
            .cloned()
            .or_else(|| Handle::try_current().ok());

        for listener in listeners {
            let config = config.clone();
            match &runtime {
                Some(runtime) => {
                    runtime.spawn_blocking(move || listener.update(config));
                }
                None => {
                    std::thread::spawn(move || listener.update(config));
                }
            }
        }
    }
}

async fn poll_loop<T>(inner: Weak<Inner<T>>, mut shutdown: watch::Receiver<bool>, period: Duration)
where
    T: Clone + PartialEq + Default + Send + Sync + 'static,
{
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = shutdown.changed() => break,
            _ = ticker.tick() => {
                let Some(inner) = inner.upgrade() else { break };
                inner.poll_once();
            }
        }
    }

    debug!("Config poll loop finished");
}

/// Computes the SHA-256 hex digest of a payload.
fn compute_digest(content: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content);
    hex::encode(hasher.finalize())
}
