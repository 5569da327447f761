//! Metrics collection and exposition.
//!
//! # Metrics
//! - `balancer_requests_total` (counter): requests by method, status, backend
//! - `balancer_request_duration_seconds` (histogram): time until the response
//!   body finished streaming (or until the 503 for requests never forwarded)
//! - `balancer_backend_healthy` (gauge): 1=healthy, 0=unhealthy
//! - `balancer_selection_exhausted_total` (counter): requests with no healthy backend
//!
//! Recording is a no-op until `init_metrics` installs the exporter.

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus exporter with an HTTP listener on `addr`.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

/// Record one finished request.
///
/// For forwarded requests this runs when the relayed body stream ends, so the
/// duration includes streaming time.
pub fn record_request(method: &str, status: u16, backend: &str, start: Instant) {
    counter!(
        "balancer_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string(),
        "backend" => backend.to_string()
    )
    .increment(1);
    histogram!(
        "balancer_request_duration_seconds",
        "method" => method.to_string(),
        "backend" => backend.to_string()
    )
    .record(start.elapsed().as_secs_f64());
}

/// Record the latest probe outcome of a backend.
pub fn record_backend_health(backend: &str, healthy: bool) {
    gauge!("balancer_backend_healthy", "backend" => backend.to_string())
        .set(if healthy { 1.0 } else { 0.0 });
}

/// Record a selection that found no healthy backend.
pub fn record_selection_exhausted() {
    counter!("balancer_selection_exhausted_total").increment(1);
}
