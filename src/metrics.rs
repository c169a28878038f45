//! Prometheus metrics for the gateway
//!
//! Registered in the default registry and exposed by the dashboard at
//! `GET /metrics`.

use lazy_static::lazy_static;
use prometheus::{
    register_counter_vec, register_gauge, register_gauge_vec, register_histogram_vec,
    CounterVec, Encoder, Gauge, GaugeVec, HistogramVec, TextEncoder,
};

use crate::types::Region;

lazy_static! {
    // === Ingestion ===

    /// Raw messages received from the input subscription
    pub static ref MESSAGES_RECEIVED: CounterVec = register_counter_vec!(
        "gateway_messages_received_total",
        "Raw telemetry messages received",
        &["region"]
    ).unwrap();

    /// Messages dropped because they failed to decode
    pub static ref DECODE_FAILURES: CounterVec = register_counter_vec!(
        "gateway_decode_failures_total",
        "Telemetry messages that failed to decode",
        &["kind"]
    ).unwrap();

    // === Republishing ===

    /// Sink publish attempts by outcome
    pub static ref SINK_PUBLISH: CounterVec = register_counter_vec!(
        "gateway_sink_publish_total",
        "Sink publish attempts by sink and status",
        &["sink", "status"]
    ).unwrap();

    /// Sink publish latency
    pub static ref SINK_DURATION: HistogramVec = register_histogram_vec!(
        "gateway_sink_publish_seconds",
        "Sink publish latency in seconds",
        &["sink"],
        vec![0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]
    ).unwrap();

    // === Store ===

    /// Readings held per region
    pub static ref STORE_READINGS: GaugeVec = register_gauge_vec!(
        "gateway_store_readings",
        "Readings held in the store per region",
        &["region"]
    ).unwrap();

    // === Bus consumer ===

    /// Records consumed from the bus
    pub static ref RECORDS_CONSUMED: CounterVec = register_counter_vec!(
        "gateway_records_consumed_total",
        "Records consumed from the message bus by status",
        &["status"]
    ).unwrap();

    // === System Health ===

    /// Health status (0=unhealthy, 1=healthy)
    pub static ref HEALTH_STATUS: Gauge = register_gauge!(
        "gateway_health_status",
        "Gateway health status (0=unhealthy, 1=healthy)"
    ).unwrap();

    /// Process uptime
    pub static ref UPTIME_SECONDS: Gauge = register_gauge!(
        "gateway_uptime_seconds",
        "Gateway uptime in seconds"
    ).unwrap();
}

/// Initialize metrics system
pub fn init() {
    HEALTH_STATUS.set(1.0);
    UPTIME_SECONDS.set(0.0);
    for region in Region::ALL {
        STORE_READINGS.with_label_values(&[region.as_str()]).set(0.0);
    }
    tracing::debug!("Metrics system initialized");
}

/// All registered metrics in Prometheus text format
pub fn gather_metrics() -> Result<String, String> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = vec![];

    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| format!("Failed to encode metrics: {}", e))?;

    String::from_utf8(buffer).map_err(|e| format!("Metrics contain invalid UTF-8: {}", e))
}

/// Record an inbound raw message
#[inline]
pub fn record_received(region: &str) {
    MESSAGES_RECEIVED.with_label_values(&[region]).inc();
}

/// Record a dropped message by decode error kind
#[inline]
pub fn record_decode_failure(kind: &str) {
    DECODE_FAILURES.with_label_values(&[kind]).inc();
}

/// Record a sink publish attempt
#[inline]
pub fn record_sink(sink: &str, success: bool, duration_secs: f64) {
    let status = if success { "success" } else { "error" };
    SINK_PUBLISH.with_label_values(&[sink, status]).inc();
    SINK_DURATION.with_label_values(&[sink]).observe(duration_secs);
}

/// Update per-region store gauges
pub fn update_store_counts(counts: &[(Region, usize)]) {
    for (region, count) in counts {
        STORE_READINGS
            .with_label_values(&[region.as_str()])
            .set(*count as f64);
    }
}

/// Record a consumed bus record
#[inline]
pub fn record_consumed(success: bool) {
    let status = if success { "success" } else { "error" };
    RECORDS_CONSUMED.with_label_values(&[status]).inc();
}

/// Update uptime
#[inline]
pub fn update_uptime(seconds: f64) {
    UPTIME_SECONDS.set(seconds);
}
