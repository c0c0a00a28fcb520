//! Prometheus instrumentation for the refresh pipeline.

pub mod prometheus;

pub use self::prometheus::{Metrics, MetricsServer};
