//! Prometheus Metrics Module
//!
//! Exposes gateway metrics via Prometheus format for monitoring.
//!
//! # Metrics Categories
//!
//! - **Events**: Counts of events routed and orphaned by kind
//! - **Queue**: Current event queue depth
//! - **Requests**: Pending request count and query latency
//! - **Realtime**: Registered screen count
//! - **Connection**: Session up/down state

use std::sync::OnceLock;
use std::time::Duration;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

// =============================================================================
// Global Metrics Handle
// =============================================================================

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Initialize the Prometheus metrics recorder.
///
/// # Panics
///
/// Panics if the recorder cannot be installed.
#[allow(clippy::expect_used)]
pub fn init_metrics() -> PrometheusHandle {
    PROMETHEUS_HANDLE
        .get_or_init(|| {
            let builder = PrometheusBuilder::new();
            let handle = builder
                .install_recorder()
                .expect("failed to install Prometheus recorder");

            register_metrics();
            handle
        })
        .clone()
}

/// Get the Prometheus handle for rendering metrics.
///
/// Returns `None` if metrics have not been initialized.
#[must_use]
pub fn get_metrics_handle() -> Option<PrometheusHandle> {
    PROMETHEUS_HANDLE.get().cloned()
}

// =============================================================================
// Metric Registration
// =============================================================================

fn register_metrics() {
    // Event counters
    describe_counter!(
        "kiwoom_gateway_events_routed_total",
        "Total inbound events dispatched, by kind"
    );
    describe_counter!(
        "kiwoom_gateway_orphan_events_total",
        "Total inbound events that matched no pending request or registration"
    );

    // Queue gauge
    describe_gauge!(
        "kiwoom_gateway_queue_depth",
        "Events queued and not yet consumed by the router"
    );

    // Request gauges and latency
    describe_gauge!(
        "kiwoom_gateway_pending_requests",
        "Outstanding correlated requests"
    );
    describe_histogram!(
        "kiwoom_gateway_query_duration_seconds",
        "End-to-end latency of correlated queries, all pages"
    );

    // Realtime gauge
    describe_gauge!(
        "kiwoom_gateway_realtime_screens",
        "Screens with at least one realtime registration"
    );

    // Connection gauge
    describe_gauge!(
        "kiwoom_gateway_connection_up",
        "Whether the broker session is connected (1) or not (0)"
    );
}

// =============================================================================
// Recording Helpers
// =============================================================================

/// Count one dispatched event.
pub fn record_event_routed(kind: &'static str) {
    counter!("kiwoom_gateway_events_routed_total", "kind" => kind).increment(1);
}

/// Count one orphaned event.
pub fn record_orphan(kind: &'static str) {
    counter!("kiwoom_gateway_orphan_events_total", "kind" => kind).increment(1);
}

/// Update the queue depth gauge.
pub fn set_queue_depth(depth: usize) {
    #[allow(clippy::cast_precision_loss)]
    gauge!("kiwoom_gateway_queue_depth").set(depth as f64);
}

/// Update the pending request gauge.
pub fn set_pending_requests(count: usize) {
    #[allow(clippy::cast_precision_loss)]
    gauge!("kiwoom_gateway_pending_requests").set(count as f64);
}

/// Update the registered screen gauge.
pub fn set_realtime_screens(count: usize) {
    #[allow(clippy::cast_precision_loss)]
    gauge!("kiwoom_gateway_realtime_screens").set(count as f64);
}

/// Update the connection gauge.
pub fn set_connection_up(connected: bool) {
    gauge!("kiwoom_gateway_connection_up").set(if connected { 1.0 } else { 0.0 });
}

/// Record one completed query's end-to-end latency.
pub fn record_query_duration(duration: Duration) {
    histogram!("kiwoom_gateway_query_duration_seconds").record(duration.as_secs_f64());
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recording_without_recorder_is_a_noop() {
        record_event_routed("tr_data");
        record_orphan("real_data");
        set_queue_depth(3);
        set_connection_up(true);
        record_query_duration(Duration::from_millis(120));
    }
}
