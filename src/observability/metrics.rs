//! Pipeline self-metrics.
//!
//! # Metrics
//! - `telemetry_records_dropped_total` (counter): records lost, by pipeline and reason
//! - `telemetry_records_exported_total` (counter): records accepted by a sink
//! - `telemetry_sink_export_failures_total` (counter): failed batch exports
//!
//! # Design Decisions
//! - Recorded through the `metrics` facade; without an installed recorder the
//!   calls are no-ops, so library code and tests need no setup
//! - The Prometheus recorder is installed at most once per process

use std::sync::OnceLock;

use metrics::{counter, describe_counter};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

static HANDLE: OnceLock<Option<PrometheusHandle>> = OnceLock::new();

/// Install the Prometheus recorder. Idempotent; returns the handle used to
/// render the self-metrics.
pub fn init_metrics() -> Option<PrometheusHandle> {
    HANDLE
        .get_or_init(|| match PrometheusBuilder::new().install_recorder() {
            Ok(handle) => {
                describe_counter!(
                    "telemetry_records_dropped_total",
                    "Telemetry records dropped before export"
                );
                describe_counter!(
                    "telemetry_records_exported_total",
                    "Telemetry records accepted by a sink"
                );
                describe_counter!(
                    "telemetry_sink_export_failures_total",
                    "Batch exports that failed and went to the local fallback"
                );
                tracing::debug!("Prometheus recorder installed");
                Some(handle)
            }
            Err(e) => {
                tracing::warn!(error = %e, "Self-metrics disabled, recorder already installed");
                None
            }
        })
        .clone()
}

pub fn record_dropped(pipeline: &'static str, reason: &'static str) {
    counter!("telemetry_records_dropped_total", "pipeline" => pipeline, "reason" => reason)
        .increment(1);
}

pub fn record_exported(pipeline: &'static str, count: usize) {
    counter!("telemetry_records_exported_total", "pipeline" => pipeline).increment(count as u64);
}

pub fn record_export_failure(pipeline: &'static str) {
    counter!("telemetry_sink_export_failures_total", "pipeline" => pipeline).increment(1);
}
