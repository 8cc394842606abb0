//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the telemetry
//! shim. All types derive Serde traits for deserialization from config files.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::events::LogLevel;

/// Root configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct TelemetryConfig {
    /// Service identity stamped on every exported span.
    pub service: ServiceConfig,

    /// HTTP ingress listener.
    pub listener: ListenerConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Correlation header handling at the ingress boundary.
    pub correlation: CorrelationConfig,

    /// Span and log sinks.
    pub sinks: SinksConfig,

    /// Metric aggregation and exposition.
    pub metrics: MetricsConfig,

    /// Task queue and workers.
    pub queue: QueueConfig,

    /// Process diagnostics (the shim's own logs).
    pub observability: ObservabilityConfig,
}

/// Service identity (resource attributes).
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// `service.name`; defaults to `OTEL_SERVICE_NAME` when set.
    pub name: String,

    /// `deployment.environment`.
    pub environment: String,

    /// `service.instance.id`; defaults to `HOSTNAME` when set.
    pub instance_id: Option<String>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: std::env::var("OTEL_SERVICE_NAME")
                .unwrap_or_else(|_| "record-store-service".to_string()),
            environment: "development".to_string(),
            instance_id: std::env::var("HOSTNAME").ok(),
        }
    }
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8000").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8000".to_string(),
        }
    }
}

/// Timeout configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Request timeout in seconds. Spans still open at the deadline are
    /// closed as cancelled.
    pub request_secs: u64,

    /// Time allowed for sinks to drain on shutdown, in seconds.
    pub shutdown_drain_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            request_secs: 30,
            shutdown_drain_secs: 5,
        }
    }
}

/// Correlation header handling.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CorrelationConfig {
    /// Header carrying the caller's correlation id.
    pub header_name: String,

    /// Honour W3C `traceparent` from callers.
    pub accept_traceparent: bool,

    /// Use `x-request-id` when the correlation header is absent.
    pub fallback_to_request_id: bool,

    /// Longest accepted correlation id (at most 128).
    pub max_length: usize,

    /// Echo the correlation header and `traceparent` on responses.
    pub echo_response_headers: bool,
}

impl Default for CorrelationConfig {
    fn default() -> Self {
        Self {
            header_name: "x-correlation-id".to_string(),
            accept_traceparent: true,
            fallback_to_request_id: true,
            max_length: 128,
            echo_response_headers: true,
        }
    }
}

/// Where a sink sends its records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SinkKind {
    /// JSON lines on stdout (picked up by a log shipper).
    Stdout,
    /// JSON batches POSTed to `endpoint`.
    Http,
    /// Records are accepted and dropped.
    Discard,
}

/// What to do when a sink queue is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BackpressurePolicy {
    /// Reject the incoming record.
    DropNewest,
    /// Evict the oldest queued record to make room.
    DropOldest,
}

/// Retry settings for HTTP export.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ExportRetryConfig {
    /// Total attempts per batch, including the first.
    pub max_attempts: u32,

    /// Base delay for exponential backoff in milliseconds.
    pub base_delay_ms: u64,

    /// Maximum delay for exponential backoff in milliseconds.
    pub max_delay_ms: u64,
}

impl Default for ExportRetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 100,
            max_delay_ms: 2000,
        }
    }
}

/// One sink pipeline: bounded queue, drain task, exporter.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SinkConfig {
    pub kind: SinkKind,

    /// Collector URL, required for `http`.
    pub endpoint: Option<String>,

    /// Maximum queued records before backpressure applies.
    pub queue_capacity: usize,

    /// Maximum records per export call.
    pub batch_size: usize,

    pub backpressure: BackpressurePolicy,

    /// Per-request export timeout in seconds.
    pub timeout_secs: u64,

    pub retry: ExportRetryConfig,
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            kind: SinkKind::Stdout,
            endpoint: None,
            queue_capacity: 2048,
            batch_size: 128,
            backpressure: BackpressurePolicy::DropNewest,
            timeout_secs: 5,
            retry: ExportRetryConfig::default(),
        }
    }
}

/// Span and log sinks.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SinksConfig {
    pub spans: SinkConfig,
    pub logs: SinkConfig,

    /// Log events below this level are not emitted.
    pub log_min_level: LogLevel,
}

impl Default for SinksConfig {
    fn default() -> Self {
        Self {
            spans: SinkConfig::default(),
            logs: SinkConfig::default(),
            log_min_level: LogLevel::Info,
        }
    }
}

/// Metric aggregation and exposition.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Serve the scrape endpoint.
    pub enabled: bool,

    /// Scrape path.
    pub path: String,

    /// Append the pipeline's own metrics to the scrape output.
    pub self_metrics: bool,

    /// Histogram boundaries for metrics without an explicit entry.
    pub default_buckets: Vec<f64>,

    /// Histogram boundaries per metric name.
    pub buckets: BTreeMap<String, Vec<f64>>,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        let mut buckets = BTreeMap::new();
        buckets.insert(
            "http_request_duration_seconds".to_string(),
            vec![0.1, 0.5, 1.0, 2.0, 5.0, 10.0],
        );
        buckets.insert(
            "order_processing_time_seconds".to_string(),
            vec![1.0, 2.0, 3.0, 5.0, 10.0, 30.0],
        );

        Self {
            enabled: true,
            path: "/metrics".to_string(),
            self_metrics: true,
            default_buckets: vec![
                0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
            ],
            buckets,
        }
    }
}

/// Task queue configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Number of concurrent workers.
    pub workers: usize,

    /// Maximum queued deliveries.
    pub capacity: usize,

    /// Simulated processing time for demo order tasks, in milliseconds.
    pub simulated_work_ms: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            workers: 2,
            capacity: 1024,
            simulated_work_ms: 250,
        }
    }
}

/// Diagnostic log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Json,
    Pretty,
}

/// Process diagnostics.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error). `RUST_LOG` overrides.
    pub log_level: String,

    pub log_format: LogFormat,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_toml_uses_defaults() {
        let config: TelemetryConfig = toml::from_str(
            r#"
            [listener]
            bind_address = "127.0.0.1:9000"

            [sinks.spans]
            kind = "http"
            endpoint = "http://collector:4318/v1/spans"
            backpressure = "drop_oldest"
            "#,
        )
        .unwrap();

        assert_eq!(config.listener.bind_address, "127.0.0.1:9000");
        assert_eq!(config.sinks.spans.kind, SinkKind::Http);
        assert_eq!(config.sinks.spans.backpressure, BackpressurePolicy::DropOldest);
        assert_eq!(config.sinks.spans.queue_capacity, 2048);
        assert_eq!(config.sinks.logs.kind, SinkKind::Stdout);
        assert_eq!(config.correlation.header_name, "x-correlation-id");
        assert_eq!(
            config.metrics.buckets.get("order_processing_time_seconds").unwrap(),
            &vec![1.0, 2.0, 3.0, 5.0, 10.0, 30.0]
        );
    }

    #[test]
    fn test_log_min_level_parses() {
        let config: TelemetryConfig = toml::from_str(
            r#"
            [sinks]
            log_min_level = "warn"
            "#,
        )
        .unwrap();
        assert_eq!(config.sinks.log_min_level, LogLevel::Warn);
    }
}
