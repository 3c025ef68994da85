//! Prometheus metrics for gangway-http-proxy.
//!
//! Tracks request volume, upstream latency, and pipeline fallthroughs.

use lazy_static::lazy_static;
use prometheus::{
    register_counter_vec, register_histogram_vec, CounterVec, Encoder, HistogramVec, TextEncoder,
};

lazy_static! {
    /// Total number of requests processed
    pub static ref REQUESTS_TOTAL: CounterVec = register_counter_vec!(
        "gangway_requests_total",
        "Total number of requests processed by the proxy",
        &["method", "status"]
    )
    .unwrap();

    /// Upstream request duration
    pub static ref UPSTREAM_REQUEST_DURATION_MS: HistogramVec = register_histogram_vec!(
        "gangway_upstream_request_duration_ms",
        "Time spent forwarding to the upstream and reading its response headers",
        &["method"],
        vec![1.0, 5.0, 10.0, 25.0, 50.0, 100.0, 250.0, 500.0, 1000.0, 2500.0, 5000.0]
    )
    .unwrap();

    /// Requests handed on to the next pipeline stage
    pub static ref FALLTHROUGH_TOTAL: CounterVec = register_counter_vec!(
        "gangway_fallthrough_total",
        "Requests that fell through to the next pipeline stage",
        &["reason"]  // reason: no_match|upstream_404
    )
    .unwrap();
}

pub fn record_request(method: &str, status: u16) {
    REQUESTS_TOTAL
        .with_label_values(&[method, &status.to_string()])
        .inc();
}

pub fn record_upstream_duration(method: &str, duration_ms: f64) {
    UPSTREAM_REQUEST_DURATION_MS
        .with_label_values(&[method])
        .observe(duration_ms);
}

pub fn record_fallthrough(reason: &str) {
    FALLTHROUGH_TOTAL.with_label_values(&[reason]).inc();
}

/// Render the registry in the Prometheus text exposition format.
pub fn render() -> Vec<u8> {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&prometheus::gather(), &mut buffer) {
        tracing::error!("Failed to encode metrics: {}", e);
    }
    buffer
}
