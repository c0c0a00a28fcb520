//! Prometheus metrics exporter.

use std::net::SocketAddr;
use std::sync::Arc;

use ::prometheus::{Counter, CounterVec, Encoder, Gauge, Opts, Registry, TextEncoder};
use tracing::{error, info};

use crate::error::MetricsError;

/// Prometheus metrics for a configuration manager.
pub struct Metrics {
    /// Registry for all metrics.
    registry: Registry,
    /// Source reads by outcome (`ok` / `error`).
    pub source_reads_total: CounterVec,
    /// Payloads rejected by the decode function.
    pub decode_failures_total: Counter,
    /// Decoded payloads by result (`applied` / `unchanged`).
    pub updates_total: CounterVec,
    /// Listener invocations scheduled.
    pub listener_dispatches_total: Counter,
    /// Registered listeners.
    pub listeners: Gauge,
}

impl std::fmt::Debug for Metrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Metrics").finish_non_exhaustive()
    }
}

fn prom_err(e: ::prometheus::Error) -> MetricsError {
    MetricsError::Prometheus(e.to_string())
}

impl Metrics {
    /// Creates a new metrics instance with its own registry.
    pub fn new() -> Result<Self, MetricsError> {
        let registry = Registry::new();

        let source_reads_total = CounterVec::new(
            Opts::new("dynconf_source_reads_total", "Reads from the configuration source"),
            &["outcome"],
        )
        .map_err(prom_err)?;

        let decode_failures_total = Counter::new(
            "dynconf_decode_failures_total",
            "Configuration payloads that failed to decode",
        )
        .map_err(prom_err)?;

        let updates_total = CounterVec::new(
            Opts::new("dynconf_updates_total", "Decoded configuration payloads by result"),
            &["result"],
        )
        .map_err(prom_err)?;

        let listener_dispatches_total = Counter::new(
            "dynconf_listener_dispatches_total",
            "Listener invocations scheduled for applied updates",
        )
        .map_err(prom_err)?;

        let listeners = Gauge::new("dynconf_listeners", "Number of registered listeners")
            .map_err(prom_err)?;

        registry
            .register(Box::new(source_reads_total.clone()))
            .map_err(prom_err)?;
        registry
            .register(Box::new(decode_failures_total.clone()))
            .map_err(prom_err)?;
        registry
            .register(Box::new(updates_total.clone()))
            .map_err(prom_err)?;
        registry
            .register(Box::new(listener_dispatches_total.clone()))
            .map_err(prom_err)?;
        registry
            .register(Box::new(listeners.clone()))
            .map_err(prom_err)?;

        Ok(Self {
            registry,
            source_reads_total,
            decode_failures_total,
            updates_total,
            listener_dispatches_total,
            listeners,
        })
    }

    /// Records a successful source read.
    pub fn record_read_ok(&self) {
        self.source_reads_total.with_label_values(&["ok"]).inc();
    }

    /// Records a failed source read.
    pub fn record_read_error(&self) {
        self.source_reads_total.with_label_values(&["error"]).inc();
    }

    /// Records a payload the decode function rejected.
    pub fn record_decode_failure(&self) {
        self.decode_failures_total.inc();
    }

    /// Records an applied update fanned out to `listeners` listeners.
    pub fn record_applied(&self, listeners: usize) {
        self.updates_total.with_label_values(&["applied"]).inc();
        self.listener_dispatches_total.inc_by(listeners as f64);
    }

    /// Records a payload equal to the held configuration.
    pub fn record_unchanged(&self) {
        self.updates_total.with_label_values(&["unchanged"]).inc();
    }

    /// Updates the listener gauge.
    pub fn set_listeners(&self, count: usize) {
        self.listeners.set(count as f64);
    }

    /// Returns the metrics in Prometheus text format.
    pub fn gather(&self) -> Result<String, MetricsError> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer).map_err(prom_err)?;
        String::from_utf8(buffer).map_err(|e| MetricsError::Prometheus(e.to_string()))
    }
}

/// HTTP server for Prometheus metrics.
pub struct MetricsServer {
    /// Metrics instance.
    metrics: Arc<Metrics>,
    /// Port to listen on.
    port: u16,
}

impl MetricsServer {
    /// Creates a new metrics server.
    pub fn new(metrics: Arc<Metrics>, port: u16) -> Self {
        Self { metrics, port }
    }

    /// Serves `/metrics` until the listener fails.
    pub async fn start(self) -> Result<(), MetricsError> {
        use http_body_util::Full;
        use hyper::body::Bytes;
        use hyper::server::conn::http1;
        use hyper::service::service_fn;
        use hyper::{body::Incoming, Request, Response, StatusCode};
        use hyper_util::rt::TokioIo;

        let addr: SocketAddr = ([0, 0, 0, 0], self.port).into();
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|e| MetricsError::Prometheus(e.to_string()))?;

        info!(port = self.port, "Starting Prometheus metrics server");

        loop {
            let (stream, _) = listener
                .accept()
                .await
                .map_err(|e| MetricsError::Prometheus(e.to_string()))?;

            let io = TokioIo::new(stream);
            let metrics = self.metrics.clone();

            tokio::spawn(async move {
                let service = service_fn(|req: Request<Incoming>| {
                    let metrics = metrics.clone();
                    async move {
                        let (status, body) = if req.uri().path() != "/metrics" {
                            (StatusCode::NOT_FOUND, String::from("Not Found"))
                        } else {
                            match metrics.gather() {
                                Ok(body) => (StatusCode::OK, body),
                                Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
                            }
                        };

                        let mut response = Response::new(Full::new(Bytes::from(body)));
                        *response.status_mut() = status;
                        Ok::<_, hyper::Error>(response)
                    }
                });

                if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                    error!(error = %e, "Error serving metrics connection");
                }
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gathers_recorded_values() {
        let metrics = Metrics::new().unwrap();
        metrics.record_read_ok();
        metrics.record_read_ok();
        metrics.record_read_error();
        metrics.record_decode_failure();
        metrics.record_applied(3);
        metrics.record_unchanged();
        metrics.set_listeners(3);

        let text = metrics.gather().unwrap();
        assert!(text.contains("dynconf_source_reads_total{outcome=\"ok\"} 2"));
        assert!(text.contains("dynconf_source_reads_total{outcome=\"error\"} 1"));
        assert!(text.contains("dynconf_decode_failures_total 1"));
        assert!(text.contains("dynconf_updates_total{result=\"applied\"} 1"));
        assert!(text.contains("dynconf_listener_dispatches_total 3"));
        assert!(text.contains("dynconf_listeners 3"));
    }
}
