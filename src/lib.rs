//! Correlation and trace/log/metric stitching core for the record-store demo.

pub mod aggregator;
pub mod config;
pub mod correlation;
pub mod demo;
pub mod events;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod queue;
pub mod resilience;
pub mod sink;
pub mod span;
pub mod telemetry;

use std::collections::BTreeMap;

/// Key/value attributes attached to spans and log events.
pub type Attributes = BTreeMap<String, serde_json::Value>;

pub use config::schema::TelemetryConfig;
pub use correlation::CorrelationContext;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
pub use telemetry::Telemetry;
