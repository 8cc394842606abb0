//! Finished span records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::correlation::{CorrelationId, SpanId, TraceId};
use crate::Attributes;
use super::resource::Resource;

/// Outcome of a span.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpanStatus {
    Ok,
    Error,
    /// Force-closed because its owner was cancelled or timed out.
    Cancelled,
}

impl SpanStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SpanStatus::Ok => "ok",
            SpanStatus::Error => "error",
            SpanStatus::Cancelled => "cancelled",
        }
    }
}

/// A closed span as handed to the sink. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Span {
    pub trace_id: TraceId,
    pub span_id: SpanId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_span_id: Option<SpanId>,
    pub correlation_id: CorrelationId,
    pub operation_name: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub duration_us: u64,
    pub status: SpanStatus,
    #[serde(default)]
    pub attributes: Attributes,
    pub resource: Resource,
}

impl Span {
    pub fn is_root(&self) -> bool {
        self.parent_span_id.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_serializes_snake_case() {
        assert_eq!(serde_json::to_string(&SpanStatus::Cancelled).unwrap(), "\"cancelled\"");
        assert_eq!(SpanStatus::Error.as_str(), "error");
    }

    #[test]
    fn test_root_span_omits_parent() {
        let now = Utc::now();
        let span = Span {
            trace_id: TraceId::generate(),
            span_id: SpanId::generate(),
            parent_span_id: None,
            correlation_id: CorrelationId::generate(),
            operation_name: "GET /".to_string(),
            start_time: now,
            end_time: now,
            duration_us: 0,
            status: SpanStatus::Ok,
            attributes: Attributes::new(),
            resource: Resource::new("svc", "test", "host-1"),
        };

        let json = serde_json::to_value(&span).unwrap();
        assert!(json.get("parent_span_id").is_none());
        assert_eq!(json["resource"]["service.name"], "svc");
        assert!(span.is_root());
    }

    #[test]
    fn test_child_span_json_keeps_every_field() {
        let start = Utc::now();
        let mut attributes = Attributes::new();
        attributes.insert("http.status_code".to_string(), 503.into());
        attributes.insert("cancelled".to_string(), true.into());
        attributes.insert("task.name".to_string(), "process_order".into());
        let span = Span {
            trace_id: TraceId::generate(),
            span_id: SpanId::generate(),
            parent_span_id: Some(SpanId::generate()),
            correlation_id: CorrelationId::generate(),
            operation_name: "task.process_order".to_string(),
            start_time: start,
            end_time: start + chrono::Duration::milliseconds(12),
            duration_us: 12_000,
            status: SpanStatus::Cancelled,
            attributes,
            resource: Resource::new("svc", "test", "host-1"),
        };

        let line = serde_json::to_string(&span).unwrap();
        let parsed: Span = serde_json::from_str(&line).unwrap();
        assert_eq!(parsed, span);
        assert!(!parsed.is_root());
    }
}
