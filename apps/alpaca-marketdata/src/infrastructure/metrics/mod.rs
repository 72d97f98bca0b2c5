//! Prometheus Metrics Module
//!
//! Counters for pagination and streaming, recorded through the `metrics`
//! facade. Recording is a no-op until [`init_metrics`] installs the
//! Prometheus recorder.
//!
//! # Metrics
//!
//! - `marketdata_pages_fetched_total{endpoint}`
//! - `marketdata_records_received_total{endpoint}`
//! - `marketdata_pagination_errors_total{endpoint, error_type}`
//! - `marketdata_stream_errors_total{backend, error_type}`

use std::sync::OnceLock;

use metrics::{counter, describe_counter};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

// =============================================================================
// Global Metrics Handle
// =============================================================================

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Install the Prometheus recorder and describe every metric.
///
/// Repeated calls return the handle from the first successful call. Returns
/// `None` if another recorder is already installed.
pub fn init_metrics() -> Option<PrometheusHandle> {
    if let Some(handle) = PROMETHEUS_HANDLE.get() {
        return Some(handle.clone());
    }

    match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => {
            register_metrics();
            Some(PROMETHEUS_HANDLE.get_or_init(|| handle).clone())
        }
        Err(e) => {
            tracing::warn!(error = %e, "Failed to install Prometheus recorder");
            None
        }
    }
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
    describe_counter!(
        "marketdata_pages_fetched_total",
        "Total collection pages fetched from the market data service"
    );
    describe_counter!(
        "marketdata_records_received_total",
        "Total records returned by completed paginated calls"
    );
    describe_counter!(
        "marketdata_pagination_errors_total",
        "Total paginated calls that failed"
    );
    describe_counter!(
        "marketdata_stream_errors_total",
        "Total streaming transport errors by type"
    );
}

// =============================================================================
// Metric Recording Functions
// =============================================================================

/// Record one page fetched for `endpoint`.
pub fn record_page_fetched(endpoint: &str) {
    counter!(
        "marketdata_pages_fetched_total",
        "endpoint" => endpoint.to_string()
    )
    .increment(1);
}

/// Record records returned by a completed paginated call.
pub fn record_records_received(endpoint: &'static str, count: usize) {
    counter!(
        "marketdata_records_received_total",
        "endpoint" => endpoint
    )
    .increment(u64::try_from(count).unwrap_or(u64::MAX));
}

/// Record a failed paginated call.
pub fn record_pagination_error(endpoint: &'static str, error_type: &'static str) {
    counter!(
        "marketdata_pagination_errors_total",
        "endpoint" => endpoint,
        "error_type" => error_type
    )
    .increment(1);
}

/// Record a streaming transport error.
pub fn record_stream_error(backend: &'static str, error_type: &'static str) {
    counter!(
        "marketdata_stream_errors_total",
        "backend" => backend,
        "error_type" => error_type
    )
    .increment(1);
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recording_without_recorder_is_a_no_op() {
        record_page_fetched("/v2/stocks/trades");
        record_records_received("trades", 3);
        record_pagination_error("trades", "status");
        record_stream_error("tungstenite", "read_deadline");
    }

    #[test]
    fn init_is_idempotent() {
        let first = init_metrics();
        let second = init_metrics();
        assert_eq!(first.is_some(), second.is_some());
        if first.is_some() {
            assert!(get_metrics_handle().is_some());
        }
    }
}
