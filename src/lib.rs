//! Dynamic Config - typed configuration that reloads itself.
//!
//! A [`ConfigManager`] pulls raw bytes from a [`Source`], decodes them into a
//! typed value, suppresses payloads equal to the value it already holds, and
//! fans every real change out to its [`Listener`]s concurrently.
//! [`FileSource`] provides file-backed configuration, either polled or pushed
//! through a filesystem watch that survives rename and symlink-swap deploys.

pub mod cli;
pub mod config;
pub mod error;
pub mod listener;
pub mod metrics;
pub mod parse;
pub mod source;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use serde::Deserialize;
use tracing::{error, info, warn};

use crate::cli::{Cli, Format, Mode};
use crate::error::DecodeError;
use crate::metrics::{Metrics, MetricsServer};

pub use crate::config::{ConfigManager, Options};
pub use crate::error::{ConfigError, SourceError};
pub use crate::listener::Listener;
pub use crate::source::{FileSource, Source, SourceType, UpdateCallback};

/// Document watched by the `dynconf` binary.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct LogConfig {
    #[serde(default)]
    pub level: String,
}

impl LogConfig {
    /// The configured level, falling back to `info` when unset.
    pub fn effective_level(&self) -> &str {
        if self.level.is_empty() {
            "info"
        } else {
            &self.level
        }
    }
}

/// Runs the `dynconf` binary with the provided CLI arguments.
pub async fn run(cli: Cli) -> Result<()> {
    setup_logging(cli.log_level(), cli.json_logs)?;

    let source_type = match cli.mode {
        Mode::Push => SourceType::Dynamic,
        Mode::Poll => SourceType::Polling,
    };
    let source = Arc::new(FileSource::new(&cli.config, source_type));

    let mut options =
        Options::default().with_poll_interval(Duration::from_millis(cli.poll_interval_ms));

    if let Some(port) = cli.metrics_port {
        let metrics = Arc::new(Metrics::new()?);
        options = options.with_metrics(Arc::clone(&metrics));

        let server = MetricsServer::new(metrics, port);
        tokio::spawn(async move {
            if let Err(e) = server.start().await {
                error!(error = %e, "Prometheus server failed");
            }
        });
    }

    let decode: fn(&[u8]) -> Result<LogConfig, DecodeError> = match cli.format {
        Format::Json => parse::json::<LogConfig>,
        Format::Yaml => parse::yaml::<LogConfig>,
    };

    let manager = ConfigManager::new(source, decode, options);
    manager.register_listener(|config: LogConfig| {
        info!(level = config.effective_level(), "Log level changed");
    });

    // Load whatever is on disk now; later changes arrive through the source.
    match manager.refresh() {
        Ok(_) => {
            let current = manager.current();
            info!(level = current.effective_level(), "Initial configuration loaded");
        }
        Err(e) => warn!(error = %e, "Initial configuration unavailable"),
    }

    manager.start()?;
    info!(path = ?cli.config, mode = ?cli.mode, "Watching configuration. Press Ctrl+C to stop.");

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received");

    manager.stop();
    Ok(())
}

/// Initializes the tracing subscriber for structured logging.
fn setup_logging(level: &str, json: bool) -> Result<()> {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    if json {
        fmt()
            .with_env_filter(filter)
            .json()
            .with_target(true)
            .with_file(true)
            .with_line_number(true)
            .try_init()
            .map_err(|e| anyhow::anyhow!(e))?;
    } else {
        fmt()
            .with_env_filter(filter)
            .with_target(true)
            .try_init()
            .map_err(|e| anyhow::anyhow!(e))?;
    }

    Ok(())
}
