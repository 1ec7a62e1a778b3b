//! Metrics Module
//!
//! Prometheus-compatible metrics for monitoring:
//! - API request metrics (latency, count, status)
//! - Matching engine metrics (orders, trades, match latency)
//! - WebSocket metrics (connections, messages)

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::time::Instant;

/// Metric names as constants for consistency
pub mod names {
    // API Metrics
    pub const HTTP_REQUESTS_TOTAL: &str = "http_requests_total";
    pub const HTTP_REQUEST_DURATION_SECONDS: &str = "http_request_duration_seconds";

    // Matching Engine Metrics
    pub const ORDERS_SUBMITTED_TOTAL: &str = "orders_submitted_total";
    pub const ORDERS_CANCELLED_TOTAL: &str = "orders_cancelled_total";
    pub const ORDER_MATCH_DURATION_SECONDS: &str = "order_match_duration_seconds";
    pub const TRADES_EXECUTED_TOTAL: &str = "trades_executed_total";

    // WebSocket Metrics
    pub const WS_CONNECTIONS_ACTIVE: &str = "ws_connections_active";
    pub const WS_MESSAGES_SENT_TOTAL: &str = "ws_messages_sent_total";
}

/// Label keys
pub mod labels {
    pub const METHOD: &str = "method";
    pub const ENDPOINT: &str = "endpoint";
    pub const STATUS: &str = "status";
    pub const ORDER_SIDE: &str = "side";
    pub const ORDER_TYPE: &str = "order_type";
    pub const FEED: &str = "feed";
}

/// Initialize Prometheus metrics exporter
///
/// Returns a handle that can be used to render metrics
pub fn init_metrics() -> PrometheusHandle {
    let builder = PrometheusBuilder::new()
        // HTTP request duration buckets (in seconds)
        .set_buckets_for_metric(
            Matcher::Full(names::HTTP_REQUEST_DURATION_SECONDS.to_string()),
            &[0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0],
        )
        .expect("non-empty buckets")
        // Order matching duration buckets (in seconds) - should be fast
        .set_buckets_for_metric(
            Matcher::Full(names::ORDER_MATCH_DURATION_SECONDS.to_string()),
            &[0.0001, 0.0005, 0.001, 0.005, 0.01, 0.025, 0.05, 0.1],
        )
        .expect("non-empty buckets");

    builder
        .install_recorder()
        .expect("Failed to install Prometheus recorder")
}

// ============================================================================
// HTTP Metrics
// ============================================================================

/// Record HTTP request
pub fn record_http_request(method: &str, endpoint: &str, status: u16, duration_secs: f64) {
    let status_str = status.to_string();
    counter!(
        names::HTTP_REQUESTS_TOTAL,
        labels::METHOD => method.to_string(),
        labels::ENDPOINT => endpoint.to_string(),
        labels::STATUS => status_str.clone()
    )
    .increment(1);

    histogram!(
        names::HTTP_REQUEST_DURATION_SECONDS,
        labels::METHOD => method.to_string(),
        labels::ENDPOINT => endpoint.to_string(),
        labels::STATUS => status_str
    )
    .record(duration_secs);
}

// ============================================================================
// Matching Engine Metrics
// ============================================================================

/// Record order submission
pub fn record_order_submitted(side: &str, order_type: &str) {
    counter!(
        names::ORDERS_SUBMITTED_TOTAL,
        labels::ORDER_SIDE => side.to_string(),
        labels::ORDER_TYPE => order_type.to_string()
    )
    .increment(1);
}

/// Record order cancelled
pub fn record_order_cancelled() {
    counter!(names::ORDERS_CANCELLED_TOTAL).increment(1);
}

/// Record order matching duration
pub fn record_order_match_duration(duration_secs: f64) {
    histogram!(names::ORDER_MATCH_DURATION_SECONDS).record(duration_secs);
}

/// Record executed trades
pub fn record_trades_executed(count: usize) {
    counter!(names::TRADES_EXECUTED_TOTAL).increment(count as u64);
}

// ============================================================================
// WebSocket Metrics
// ============================================================================

/// Track active WebSocket connections per feed
pub fn adjust_ws_connections(feed: &str, delta: i64) {
    gauge!(
        names::WS_CONNECTIONS_ACTIVE,
        labels::FEED => feed.to_string()
    )
    .increment(delta as f64);
}

/// Record WebSocket message sent
pub fn record_ws_message_sent(feed: &str) {
    counter!(
        names::WS_MESSAGES_SENT_TOTAL,
        labels::FEED => feed.to_string()
    )
    .increment(1);
}

// ============================================================================
// Timer Helper
// ============================================================================

/// Timer for measuring durations
pub struct Timer {
    start: Instant,
}

impl Timer {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Get elapsed time in seconds
    pub fn elapsed_secs(&self) -> f64 {
        self.start.elapsed().as_secs_f64()
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}
