//! Metrics helper structs for convenient metric recording

use prometheus::{Encoder, TextEncoder};

use super::{
    BATCHES_TOTAL, CALLBACK_PANICS_TOTAL, CHANNELS_OPEN, CHANNEL_ERRORS_TOTAL,
    CONNECTION_CHECKS_TOTAL, EVENTS_DELIVERED_TOTAL, EVENTS_RECEIVED_TOTAL,
    EVENTS_UNMATCHED_TOTAL, HANDSHAKES_TOTAL,
};

/// Encode all metrics to Prometheus text format
pub fn encode_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer).unwrap_or_default())
}

/// Helper struct for recording connection metrics
pub struct ConnectionMetrics;

impl ConnectionMetrics {
    pub fn record_handshake_ok() {
        HANDSHAKES_TOTAL.with_label_values(&["ok"]).inc();
    }

    pub fn record_handshake_failed() {
        HANDSHAKES_TOTAL.with_label_values(&["failed"]).inc();
    }

    pub fn record_channel_opened() {
        CHANNELS_OPEN.inc();
    }

    pub fn record_channel_closed() {
        CHANNELS_OPEN.dec();
    }
}

/// Helper struct for recording event dispatch metrics
pub struct EventMetrics;

impl EventMetrics {
    pub fn record_received() {
        EVENTS_RECEIVED_TOTAL.inc();
    }

    pub fn record_delivered(count: u64) {
        EVENTS_DELIVERED_TOTAL.inc_by(count);
    }

    pub fn record_unmatched() {
        EVENTS_UNMATCHED_TOTAL.inc();
    }

    /// Record a callback panic of the given kind (subscriber, batch_listener, ...)
    pub fn record_callback_panic(kind: &str) {
        CALLBACK_PANICS_TOTAL.with_label_values(&[kind]).inc();
    }
}

/// Helper struct for recording configuration batch metrics
pub struct BatchMetrics;

impl BatchMetrics {
    pub fn record_sent() {
        BATCHES_TOTAL.with_label_values(&["sent"]).inc();
    }

    pub fn record_rejected() {
        BATCHES_TOTAL.with_label_values(&["rejected"]).inc();
    }

    pub fn record_acknowledged() {
        BATCHES_TOTAL.with_label_values(&["acknowledged"]).inc();
    }
}

/// Helper struct for recording health metrics
pub struct HealthMetrics;

impl HealthMetrics {
    pub fn record_error() {
        CHANNEL_ERRORS_TOTAL.with_label_values(&["received"]).inc();
    }

    pub fn record_healed() {
        CHANNEL_ERRORS_TOTAL.with_label_values(&["healed"]).inc();
    }

    pub fn record_reported() {
        CHANNEL_ERRORS_TOTAL.with_label_values(&["reported"]).inc();
    }

    pub fn record_check(reachable: bool) {
        let result = if reachable { "reachable" } else { "unreachable" };
        CONNECTION_CHECKS_TOTAL.with_label_values(&[result]).inc();
    }
}
