//! Prometheus metrics for the gateway client.
//!
//! This module provides metrics for monitoring client connections:
//! - Connection metrics (push channels opened and closed, handshake failures)
//! - Event metrics (received, delivered, unmatched)
//! - Configuration batch metrics (sent, rejected, acknowledged)
//! - Health metrics (channel errors healed or reported, connection checks)

mod helpers;

pub use helpers::{encode_metrics, BatchMetrics, ConnectionMetrics, EventMetrics, HealthMetrics};

use lazy_static::lazy_static;
use prometheus::{
    register_int_counter, register_int_counter_vec, register_int_gauge, IntCounter,
    IntCounterVec, IntGauge,
};

/// Prefix for all metrics
const METRIC_PREFIX: &str = "sse_client";

lazy_static! {
    // ============================================================================
    // Connection Metrics
    // ============================================================================

    /// Number of currently open push channels
    pub static ref CHANNELS_OPEN: IntGauge = register_int_gauge!(
        format!("{}_channels_open", METRIC_PREFIX),
        "Number of currently open push channels"
    ).unwrap();

    /// Total handshake attempts by outcome
    pub static ref HANDSHAKES_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_handshakes_total", METRIC_PREFIX),
        "Total handshake attempts",
        &["outcome"]
    ).unwrap();

    // ============================================================================
    // Event Metrics
    // ============================================================================

    /// Total channel events received
    pub static ref EVENTS_RECEIVED_TOTAL: IntCounter = register_int_counter!(
        format!("{}_events_received_total", METRIC_PREFIX),
        "Total channel events received"
    ).unwrap();

    /// Total deliveries to subscriber callbacks
    pub static ref EVENTS_DELIVERED_TOTAL: IntCounter = register_int_counter!(
        format!("{}_events_delivered_total", METRIC_PREFIX),
        "Total event deliveries to subscriber callbacks"
    ).unwrap();

    /// Events that matched no subscription
    pub static ref EVENTS_UNMATCHED_TOTAL: IntCounter = register_int_counter!(
        format!("{}_events_unmatched_total", METRIC_PREFIX),
        "Total events that matched no subscription"
    ).unwrap();

    /// Callbacks that panicked, by callback kind
    pub static ref CALLBACK_PANICS_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_callback_panics_total", METRIC_PREFIX),
        "Total callback invocations that panicked",
        &["kind"]
    ).unwrap();

    // ============================================================================
    // Configuration Batch Metrics
    // ============================================================================

    /// Configuration batches by outcome
    pub static ref BATCHES_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_config_batches_total", METRIC_PREFIX),
        "Total configuration batches",
        &["outcome"]
    ).unwrap();

    // ============================================================================
    // Health Metrics
    // ============================================================================

    /// Channel errors by outcome
    pub static ref CHANNEL_ERRORS_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_channel_errors_total", METRIC_PREFIX),
        "Channel error signals and their healing outcome",
        &["outcome"]
    ).unwrap();

    /// Connection checks by result
    pub static ref CONNECTION_CHECKS_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_connection_checks_total", METRIC_PREFIX),
        "Total connection check round trips",
        &["result"]
    ).unwrap();
}
