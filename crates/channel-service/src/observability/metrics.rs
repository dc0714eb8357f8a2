//! Metrics definitions for the channel service.
//!
//! All metrics follow Prometheus naming conventions:
//! - `channel_` prefix
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Cardinality
//!
//! Labels are bounded; channel ids and addresses are never used as labels:
//! - `actor_type`: 2 values (registry, endpoint)
//! - `operation`: 2 values (subscribe, unsubscribe)
//! - `status`: 2 values (success, error)

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::time::Duration;

/// Initialize Prometheus metrics recorder and return the handle
/// for serving metrics via HTTP.
///
/// Must be called before any metrics are recorded.
///
/// # Errors
///
/// Returns error if Prometheus recorder fails to install (e.g., already installed).
pub fn init_metrics_recorder() -> Result<PrometheusHandle, String> {
    PrometheusBuilder::new()
        // Membership operations - in-memory is sub-millisecond, remote backends slower
        .set_buckets_for_metric(
            Matcher::Prefix("channel_membership".to_string()),
            &[
                0.0001, 0.0005, 0.001, 0.005, 0.010, 0.050, 0.100, 0.500, 1.000, 5.000,
            ],
        )
        .map_err(|e| format!("Failed to set membership latency buckets: {e}"))?
        // Fan-out size - subscriber counts, not durations
        .set_buckets_for_metric(
            Matcher::Full("channel_fanout_size".to_string()),
            &[0.0, 1.0, 5.0, 10.0, 50.0, 100.0, 500.0, 1000.0, 5000.0],
        )
        .map_err(|e| format!("Failed to set fan-out size buckets: {e}"))?
        .install_recorder()
        .map_err(|e| format!("Failed to install Prometheus metrics recorder: {e}"))
}

// ============================================================================
// Channel Metrics (Gauges)
// ============================================================================

/// Set the number of registered channels.
///
/// Metric: `channel_channels_active`
/// Labels: none
pub fn set_channels_active(count: usize) {
    // usize to f64 conversion is safe for realistic channel counts (< 2^53)
    #[allow(clippy::cast_precision_loss)]
    gauge!("channel_channels_active").set(count as f64);
}

/// Set the mailbox depth for an actor type.
///
/// Metric: `channel_actor_mailbox_depth`
/// Labels: `actor_type` (registry, endpoint)
pub fn set_actor_mailbox_depth(actor_type: &str, depth: usize) {
    #[allow(clippy::cast_precision_loss)]
    gauge!("channel_actor_mailbox_depth", "actor_type" => actor_type.to_string())
        .set(depth as f64);
}

// ============================================================================
// Publish & Fan-out Metrics
// ============================================================================

/// Record a publish and the size of its fan-out.
///
/// Metrics: `channel_messages_published_total` (counter),
/// `channel_fanout_size` (histogram)
pub fn record_published(fanout: usize) {
    counter!("channel_messages_published_total").increment(1);
    #[allow(clippy::cast_precision_loss)]
    histogram!("channel_fanout_size").record(fanout as f64);
}

/// Record the outcome of a single fan-out delivery.
///
/// Metric: `channel_deliveries_total`
/// Labels: `status` (success, error)
pub fn record_delivery(status: &str) {
    counter!("channel_deliveries_total", "status" => status.to_string()).increment(1);
}

// ============================================================================
// Membership Metrics
// ============================================================================

/// Record a subscribe/unsubscribe backend call.
///
/// Metrics: `channel_membership_ops_total` (counter),
/// `channel_membership_duration_seconds` (histogram)
/// Labels: `operation` (subscribe, unsubscribe), `status` (success, error)
pub fn record_membership_op(operation: &str, status: &str, duration: Duration) {
    counter!("channel_membership_ops_total",
        "operation" => operation.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    histogram!("channel_membership_duration_seconds", "operation" => operation.to_string())
        .record(duration.as_secs_f64());
}

/// Record a subscriber purge triggered by an "actor removed" notification.
///
/// Metric: `channel_lifecycle_purges_total`
/// Labels: `status` (success, error)
pub fn record_lifecycle_purge(status: &str) {
    counter!("channel_lifecycle_purges_total", "status" => status.to_string()).increment(1);
}

// ============================================================================
// Runtime Metrics
// ============================================================================

/// Record a message rejected by a full mailbox.
///
/// Metric: `channel_messages_dropped_total`
/// Labels: `actor_type`
pub fn record_message_dropped(actor_type: &str) {
    counter!("channel_messages_dropped_total", "actor_type" => actor_type.to_string())
        .increment(1);
}
