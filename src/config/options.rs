//! Manager options.

use std::sync::Arc;
use std::time::Duration;

use crate::metrics::Metrics;

/// Poll interval used when none is configured.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Options for a [`ConfigManager`](super::ConfigManager).
#[derive(Clone)]
pub struct Options {
    pub(crate) poll_interval: Duration,
    pub(crate) metrics: Option<Arc<Metrics>>,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            metrics: None,
        }
    }
}

impl std::fmt::Debug for Options {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Options")
            .field("poll_interval", &self.poll_interval)
            .field("metrics", &self.metrics.is_some())
            .finish()
    }
}

impl Options {
    /// Sets the timer period for polling sources. Ignored for dynamic sources.
    ///
    /// A zero interval is rejected and the default is kept.
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        if poll_interval.is_zero() {
            tracing::warn!(
                default = ?DEFAULT_POLL_INTERVAL,
                "Ignoring zero poll interval"
            );
            return self;
        }
        self.poll_interval = poll_interval;
        self
    }

    /// Records refresh pipeline metrics into `metrics`.
    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Returns the configured poll interval.
    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }
}
