//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (capacities > 0, buckets increasing)
//! - Check cross-field rules (http sinks need an endpoint)
//! - Detect a scrape path that shadows a demo route
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: TelemetryConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use axum::http::HeaderName;
use thiserror::Error;

use crate::config::schema::{SinkConfig, SinkKind, TelemetryConfig};
use crate::correlation::ids::MAX_CORRELATION_ID_LEN;

/// Routes served by the shim besides the scrape endpoint.
const RESERVED_PATHS: &[&str] = &["/", "/health", "/trace-test", "/checkout", "/metrics/snapshot"];

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Validate a parsed configuration.
pub fn validate_config(config: &TelemetryConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.service.name.trim().is_empty() {
        errors.push(ValidationError::new("service.name", "must not be empty"));
    }

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "listener.bind_address",
            format!("'{}' is not a socket address", config.listener.bind_address),
        ));
    }

    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::new("timeouts.request_secs", "must be > 0"));
    }

    let correlation = &config.correlation;
    if HeaderName::try_from(correlation.header_name.as_str()).is_err() {
        errors.push(ValidationError::new(
            "correlation.header_name",
            format!("'{}' is not a valid header name", correlation.header_name),
        ));
    }
    if correlation.max_length == 0 || correlation.max_length > MAX_CORRELATION_ID_LEN {
        errors.push(ValidationError::new(
            "correlation.max_length",
            format!("must be within 1..={}", MAX_CORRELATION_ID_LEN),
        ));
    }

    validate_sink("sinks.spans", &config.sinks.spans, &mut errors);
    validate_sink("sinks.logs", &config.sinks.logs, &mut errors);

    let metrics = &config.metrics;
    if !metrics.path.starts_with('/') {
        errors.push(ValidationError::new("metrics.path", "must start with '/'"));
    } else if RESERVED_PATHS.contains(&metrics.path.as_str()) {
        errors.push(ValidationError::new(
            "metrics.path",
            format!("'{}' collides with a built-in route", metrics.path),
        ));
    }
    validate_buckets("metrics.default_buckets", &metrics.default_buckets, &mut errors);
    for (name, bounds) in &metrics.buckets {
        validate_buckets(&format!("metrics.buckets.{}", name), bounds, &mut errors);
    }

    if config.queue.workers == 0 {
        errors.push(ValidationError::new("queue.workers", "must be > 0"));
    }
    if config.queue.capacity == 0 {
        errors.push(ValidationError::new("queue.capacity", "must be > 0"));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn validate_sink(prefix: &str, sink: &SinkConfig, errors: &mut Vec<ValidationError>) {
    if sink.queue_capacity == 0 {
        errors.push(ValidationError::new(format!("{}.queue_capacity", prefix), "must be > 0"));
    }
    if sink.batch_size == 0 || sink.batch_size > sink.queue_capacity.max(1) {
        errors.push(ValidationError::new(
            format!("{}.batch_size", prefix),
            "must be > 0 and <= queue_capacity",
        ));
    }
    if sink.retry.max_attempts == 0 {
        errors.push(ValidationError::new(format!("{}.retry.max_attempts", prefix), "must be >= 1"));
    }
    if sink.kind == SinkKind::Http {
        match sink.endpoint.as_deref() {
            Some(url) if url.starts_with("http://") || url.starts_with("https://") => {}
            Some(url) => errors.push(ValidationError::new(
                format!("{}.endpoint", prefix),
                format!("'{}' is not an http(s) URL", url),
            )),
            None => errors.push(ValidationError::new(
                format!("{}.endpoint", prefix),
                "required when kind = \"http\"",
            )),
        }
    }
}

fn validate_buckets(field: &str, bounds: &[f64], errors: &mut Vec<ValidationError>) {
    if bounds.is_empty() {
        errors.push(ValidationError::new(field, "must contain at least one boundary"));
        return;
    }
    if bounds.iter().any(|b| !b.is_finite()) {
        errors.push(ValidationError::new(field, "boundaries must be finite"));
        return;
    }
    if bounds.windows(2).any(|w| w[0] >= w[1]) {
        errors.push(ValidationError::new(field, "boundaries must be strictly increasing"));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate_config(&TelemetryConfig::default()).is_ok());
    }

    #[test]
    fn test_http_sink_requires_endpoint() {
        let mut config = TelemetryConfig::default();
        config.sinks.spans.kind = SinkKind::Http;
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "sinks.spans.endpoint");

        config.sinks.spans.endpoint = Some("ftp://collector".to_string());
        assert!(validate_config(&config).is_err());

        config.sinks.spans.endpoint = Some("http://collector:9411/spans".to_string());
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_buckets_must_increase() {
        let mut config = TelemetryConfig::default();
        config
            .metrics
            .buckets
            .insert("latency".to_string(), vec![1.0, 1.0, 2.0]);
        config.metrics.default_buckets = vec![];
        let errors = validate_config(&config).unwrap_err();
        let fields: Vec<_> = errors.iter().map(|e| e.field.as_str()).collect();
        assert!(fields.contains(&"metrics.default_buckets"));
        assert!(fields.contains(&"metrics.buckets.latency"));
    }

    #[test]
    fn test_collects_all_errors() {
        let mut config = TelemetryConfig::default();
        config.correlation.header_name = "bad header".to_string();
        config.correlation.max_length = 500;
        config.metrics.path = "/health".to_string();
        config.sinks.logs.batch_size = 0;
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 4);
    }
}
