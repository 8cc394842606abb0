//! Queue message envelope.
//!
//! Wire form is a single JSON object:
//!
//! ```text
//! {
//!   "task": "process_order",
//!   "task_id": "6f1c…",
//!   "enqueued_at": "2024-05-01T12:00:00Z",
//!   "propagated_context": {
//!     "correlation_id": "…", "trace_id": "<32 hex>", "span_id": "<16 hex>",
//!     "baggage": { … }
//!   },
//!   "payload": { … }
//! }
//! ```

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::correlation::{CorrelationContext, CorrelationId, SpanId, TraceId};

#[derive(Debug, Error)]
pub enum EnvelopeError {
    #[error("failed to encode envelope: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("failed to decode envelope: {0}")]
    Decode(#[source] serde_json::Error),
}

/// Context fields carried across the queue hop.
///
/// `span_id` is the producer's span; the consumer's span becomes its child.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropagatedContext {
    pub correlation_id: CorrelationId,
    pub trace_id: TraceId,
    pub span_id: SpanId,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub baggage: BTreeMap<String, String>,
}

impl PropagatedContext {
    pub fn capture(context: &CorrelationContext) -> Self {
        Self {
            correlation_id: context.correlation_id().clone(),
            trace_id: context.trace_id(),
            span_id: context.current_span_id(),
            baggage: context.baggage().clone(),
        }
    }

    pub fn restore(self) -> CorrelationContext {
        CorrelationContext::remote(self.correlation_id, self.trace_id, self.span_id, self.baggage)
    }
}

/// A unit of deferred work plus the context it was enqueued under.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueEnvelope<P> {
    pub task: String,
    pub task_id: Uuid,
    pub enqueued_at: DateTime<Utc>,
    #[serde(default)]
    pub propagated_context: Option<PropagatedContext>,
    pub payload: P,
}

impl<P> QueueEnvelope<P> {
    /// Envelope with no propagated context, as an uninstrumented producer
    /// would send it.
    pub fn bare(task: impl Into<String>, payload: P) -> Self {
        Self {
            task: task.into(),
            task_id: Uuid::new_v4(),
            enqueued_at: Utc::now(),
            propagated_context: None,
            payload,
        }
    }
}

impl<P: Serialize> QueueEnvelope<P> {
    pub fn encode(&self) -> Result<Vec<u8>, EnvelopeError> {
        serde_json::to_vec(self).map_err(EnvelopeError::Encode)
    }
}

impl<P: DeserializeOwned> QueueEnvelope<P> {
    /// Decode payload and context together; either both or an error.
    pub fn decode(bytes: &[u8]) -> Result<Self, EnvelopeError> {
        serde_json::from_slice(bytes).map_err(EnvelopeError::Decode)
    }
}
