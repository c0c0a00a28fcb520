//! Origins of raw configuration bytes.

pub mod file;
pub mod path;

use std::fmt;
use std::sync::Arc;

use crate::error::SourceError;

pub use file::FileSource;

/// Callback a push source invokes with the latest raw configuration bytes.
///
/// An empty payload means the configuration is gone (e.g. the file was removed).
pub type UpdateCallback = Arc<dyn Fn(Vec<u8>) + Send + Sync>;

/// Refresh strategy a source requires from its owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceType {
    /// The owner reads the source on a timer.
    Polling,
    /// The source pushes changes through its update callback.
    Dynamic,
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceType::Polling => write!(f, "polling"),
            SourceType::Dynamic => write!(f, "dynamic"),
        }
    }
}

/// A provider of raw configuration bytes.
///
/// Implementations use interior mutability so a single instance can be shared
/// between the manager and its background tasks.
#[cfg_attr(test, mockall::automock)]
pub trait Source: Send + Sync {
    /// Activates background monitoring. Pull sources may treat this as a no-op.
    fn start(&self) -> Result<(), SourceError>;

    /// Deactivates monitoring and releases resources.
    ///
    /// Must not panic when `start` failed or never ran.
    fn stop(&self) -> Result<(), SourceError>;

    /// The refresh strategy, fixed for the lifetime of the source.
    fn source_type(&self) -> SourceType;

    /// Reads the current raw content.
    fn read(&self) -> Result<Vec<u8>, SourceError>;

    /// Registers the callback used for push delivery. Ignored by polling sources.
    fn set_update_callback(&self, callback: UpdateCallback);
}
