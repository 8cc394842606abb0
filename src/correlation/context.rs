//! The correlation context carried through a request.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use super::ids::{CorrelationId, SpanId, TraceId};

/// Reservation of a minted context's span id for the request's root span.
///
/// Shared by every clone of the minted context, so only the first `open`
/// claims the id.
#[derive(Clone, Default)]
struct RootClaim(Arc<AtomicBool>);

impl RootClaim {
    fn claim(&self) -> bool {
        !self.0.swap(true, Ordering::AcqRel)
    }
}

/// Immutable identifier bundle threaded explicitly through a request or task.
///
/// Never stored in global state: every call that produces telemetry takes the
/// context as an argument. Child contexts are produced with [`derive`].
///
/// [`derive`]: CorrelationContext::derive
#[derive(Clone)]
pub struct CorrelationContext {
    correlation_id: CorrelationId,
    trace_id: TraceId,
    current_span_id: SpanId,
    baggage: BTreeMap<String, String>,
    root: Option<RootClaim>,
}

impl CorrelationContext {
    /// Mint a fresh context: new correlation id, trace id and root span id.
    pub fn new_context() -> Self {
        Self {
            correlation_id: CorrelationId::generate(),
            trace_id: TraceId::generate(),
            current_span_id: SpanId::generate(),
            baggage: BTreeMap::new(),
            root: Some(RootClaim::default()),
        }
    }

    /// Build a context from a caller-supplied correlation id.
    ///
    /// A valid value is reused verbatim as the correlation id. When it carries
    /// 128 bits (UUID or 32-hex) those bits also become the trace id, so the
    /// caller's id is honoured as the trace root. Malformed input falls back to
    /// [`new_context`](Self::new_context).
    pub fn from_incoming(header_value: &str) -> Self {
        let Some(correlation_id) = CorrelationId::parse(header_value.trim()) else {
            tracing::debug!(
                len = header_value.len(),
                "Malformed incoming correlation id, minting a fresh context"
            );
            return Self::new_context();
        };

        let trace_id = correlation_id
            .embedded_trace_id()
            .unwrap_or_else(TraceId::generate);

        Self {
            correlation_id,
            trace_id,
            current_span_id: SpanId::generate(),
            baggage: BTreeMap::new(),
            root: Some(RootClaim::default()),
        }
    }

    /// Rebuild a context that was propagated from another process.
    ///
    /// `span_id` is the remote parent span: spans opened on the result become
    /// its children rather than a new root.
    pub fn remote(
        correlation_id: CorrelationId,
        trace_id: TraceId,
        span_id: SpanId,
        baggage: BTreeMap<String, String>,
    ) -> Self {
        Self {
            correlation_id,
            trace_id,
            current_span_id: span_id,
            baggage,
            root: None,
        }
    }

    /// Child context sharing correlation id, trace id and baggage, with
    /// `current_span_id` replaced.
    pub fn derive(&self, new_span_id: SpanId) -> Self {
        Self {
            correlation_id: self.correlation_id.clone(),
            trace_id: self.trace_id,
            current_span_id: new_span_id,
            baggage: self.baggage.clone(),
            root: None,
        }
    }

    /// Copy of this context with one more baggage entry.
    pub fn with_baggage(&self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let mut next = self.clone();
        next.baggage.insert(key.into(), value.into());
        next
    }

    /// Copy of this context with the baggage entries merged in.
    pub fn with_baggage_entries(&self, entries: BTreeMap<String, String>) -> Self {
        let mut next = self.clone();
        next.baggage.extend(entries);
        next
    }

    pub fn correlation_id(&self) -> &CorrelationId {
        &self.correlation_id
    }

    pub fn trace_id(&self) -> TraceId {
        self.trace_id
    }

    pub fn current_span_id(&self) -> SpanId {
        self.current_span_id
    }

    pub fn baggage(&self) -> &BTreeMap<String, String> {
        &self.baggage
    }

    /// True if this context was minted locally and its root span is not yet
    /// opened.
    pub fn is_unclaimed_root(&self) -> bool {
        self.root
            .as_ref()
            .is_some_and(|root| !root.0.load(Ordering::Acquire))
    }

    /// Claim the reserved root span id. Succeeds once per minted context.
    pub(crate) fn claim_root(&self) -> bool {
        self.root.as_ref().is_some_and(RootClaim::claim)
    }
}

impl PartialEq for CorrelationContext {
    fn eq(&self, other: &Self) -> bool {
        self.correlation_id == other.correlation_id
            && self.trace_id == other.trace_id
            && self.current_span_id == other.current_span_id
            && self.baggage == other.baggage
    }
}

impl Eq for CorrelationContext {}

impl fmt::Debug for CorrelationContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CorrelationContext")
            .field("correlation_id", &self.correlation_id)
            .field("trace_id", &self.trace_id)
            .field("current_span_id", &self.current_span_id)
            .field("baggage", &self.baggage)
            .finish()
    }
}
