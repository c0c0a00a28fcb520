//! Error types for the dynamic configuration loader.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by the configuration manager's public lifecycle.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Source error: {0}")]
    Source(#[from] SourceError),

    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    #[error("Config manager must be started from within a tokio runtime")]
    NoRuntime,

    #[error("Config manager is already running")]
    AlreadyStarted,

    #[error("Config manager has been stopped and cannot be restarted")]
    Stopped,
}

/// Errors raised by configuration sources.
#[derive(Error, Debug)]
pub enum SourceError {
    #[error("Failed to read config file '{path}': {source}")]
    ReadFailed {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to watch '{path}': {message}")]
    WatchFailed { path: PathBuf, message: String },

    #[error("Notify error: {0}")]
    Notify(#[from] notify::Error),

    #[error("File watching requires a tokio runtime")]
    NoRuntime,

    #[error("Source is already started")]
    AlreadyStarted,

    #[error("Source is already stopped")]
    AlreadyStopped,

    #[error("Source was never started")]
    NotStarted,
}

/// Errors produced by decode functions.
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Metrics registration and export errors.
#[derive(Error, Debug)]
pub enum MetricsError {
    #[error("Prometheus metrics failed: {0}")]
    Prometheus(String),
}
