//! Span recorder.
//!
//! # Responsibilities
//! - Open spans with start time and parent linkage from the caller's context
//! - Close spans exactly once and hand them to the span sink
//! - Report misuse (double close, foreign handle) to the caller
//! - Force-close spans of a cancelled trace
//!
//! # Design Decisions
//! - Parentage is explicit: `parent_span_id = context.current_span_id`
//! - Open spans live in a sharded map; no lock is held across emission
//! - The handle and the open entry share a `closed` flag; whoever flips it
//!   first owns finishing the span

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use thiserror::Error;

use crate::correlation::{CorrelationContext, CorrelationId, SpanId, TraceId};
use crate::sink::Dispatcher;
use crate::Attributes;
use super::guard::SpanGuard;
use super::resource::Resource;
use super::span::{Span, SpanStatus};

/// Instrumentation bugs reported back to the calling code.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SpanError {
    #[error("span {span_id} was already closed")]
    AlreadyClosed { span_id: SpanId },

    #[error("span {span_id} was not opened by this recorder")]
    UnknownSpan { span_id: SpanId },
}

/// Caller's reference to an open span.
#[derive(Debug)]
pub struct SpanHandle {
    trace_id: TraceId,
    span_id: SpanId,
    closed: Arc<AtomicBool>,
}

impl SpanHandle {
    pub fn span_id(&self) -> SpanId {
        self.span_id
    }

    pub fn trace_id(&self) -> TraceId {
        self.trace_id
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

struct OpenSpan {
    parent_span_id: Option<SpanId>,
    correlation_id: CorrelationId,
    operation_name: String,
    start_time: DateTime<Utc>,
    started: Instant,
    attributes: Attributes,
    closed: Arc<AtomicBool>,
}

struct RecorderInner {
    open: DashMap<(TraceId, SpanId), OpenSpan>,
    resource: Resource,
    sink: Dispatcher<Span>,
}

/// Opens and closes spans. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct SpanRecorder {
    inner: Arc<RecorderInner>,
}

impl SpanRecorder {
    pub fn new(resource: Resource, sink: Dispatcher<Span>) -> Self {
        Self {
            inner: Arc::new(RecorderInner {
                open: DashMap::new(),
                resource,
                sink,
            }),
        }
    }

    /// Open a span as a child of `context.current_span_id`.
    ///
    /// The first open on a freshly minted context claims the reserved root
    /// span id and has no parent. Returns the handle and the child context to
    /// pass to nested calls.
    pub fn open(
        &self,
        context: &CorrelationContext,
        operation_name: impl Into<String>,
    ) -> (SpanHandle, CorrelationContext) {
        let trace_id = context.trace_id();
        let (span_id, parent_span_id) = if context.claim_root() {
            (context.current_span_id(), None)
        } else {
            (self.fresh_span_id(trace_id), Some(context.current_span_id()))
        };

        let closed = Arc::new(AtomicBool::new(false));
        let operation_name = operation_name.into();

        tracing::trace!(
            trace_id = %trace_id,
            span_id = %span_id,
            parent_span_id = ?parent_span_id,
            operation = %operation_name,
            "Span opened"
        );

        self.inner.open.insert(
            (trace_id, span_id),
            OpenSpan {
                parent_span_id,
                correlation_id: context.correlation_id().clone(),
                operation_name,
                start_time: Utc::now(),
                started: Instant::now(),
                attributes: Attributes::new(),
                closed: Arc::clone(&closed),
            },
        );

        let handle = SpanHandle {
            trace_id,
            span_id,
            closed,
        };
        (handle, context.derive(span_id))
    }

    /// Open a span wrapped in a guard that cancels it if dropped unclosed.
    pub fn enter(&self, context: &CorrelationContext, operation_name: impl Into<String>) -> SpanGuard {
        let (handle, child) = self.open(context, operation_name);
        SpanGuard::new(self.clone(), handle, child)
    }

    /// Close a span and emit it to the sink.
    ///
    /// Closing twice returns [`SpanError::AlreadyClosed`]; a handle from
    /// another recorder returns [`SpanError::UnknownSpan`].
    pub fn close(
        &self,
        handle: &SpanHandle,
        status: SpanStatus,
        attributes: Attributes,
    ) -> Result<(), SpanError> {
        if handle.closed.swap(true, Ordering::AcqRel) {
            return Err(SpanError::AlreadyClosed {
                span_id: handle.span_id,
            });
        }

        match self.inner.open.remove(&(handle.trace_id, handle.span_id)) {
            Some((_, open)) => {
                self.finish(handle.trace_id, handle.span_id, open, status, attributes);
                Ok(())
            }
            None => {
                handle.closed.store(false, Ordering::Release);
                Err(SpanError::UnknownSpan {
                    span_id: handle.span_id,
                })
            }
        }
    }

    /// Add attributes to a span that is still open.
    pub fn annotate(&self, handle: &SpanHandle, attributes: Attributes) -> Result<(), SpanError> {
        if handle.is_closed() {
            return Err(SpanError::AlreadyClosed {
                span_id: handle.span_id,
            });
        }
        match self.inner.open.get_mut(&(handle.trace_id, handle.span_id)) {
            Some(mut open) => {
                open.attributes.extend(attributes);
                Ok(())
            }
            None => Err(SpanError::UnknownSpan {
                span_id: handle.span_id,
            }),
        }
    }

    /// Force-close every open span of `trace_id` as cancelled. Returns how
    /// many spans were closed.
    pub fn cancel_trace(&self, trace_id: TraceId) -> usize {
        let cancelled = self.cancel_where(|key| key.0 == trace_id);
        if cancelled > 0 {
            tracing::debug!(trace_id = %trace_id, cancelled, "Force-closed open spans");
        }
        cancelled
    }

    /// Force-close every open span of every trace as cancelled. Used at
    /// shutdown, after the owners had their chance to finish.
    pub fn cancel_all(&self) -> usize {
        let cancelled = self.cancel_where(|_| true);
        if cancelled > 0 {
            tracing::info!(cancelled, "Force-closed spans still open at shutdown");
        }
        cancelled
    }

    fn cancel_where(&self, matches: impl Fn(&(TraceId, SpanId)) -> bool) -> usize {
        let keys: Vec<(TraceId, SpanId)> = self
            .inner
            .open
            .iter()
            .filter(|entry| matches(entry.key()))
            .map(|entry| *entry.key())
            .collect();

        let mut cancelled = 0;
        for key in keys {
            let owned = self
                .inner
                .open
                .remove_if(&key, |_, open| !open.closed.swap(true, Ordering::AcqRel));
            if let Some((_, open)) = owned {
                self.finish(key.0, key.1, open, SpanStatus::Cancelled, Attributes::new());
                cancelled += 1;
            }
        }
        cancelled
    }

    /// Number of spans currently open.
    pub fn open_spans(&self) -> usize {
        self.inner.open.len()
    }

    pub fn resource(&self) -> &Resource {
        &self.inner.resource
    }

    pub fn dispatcher(&self) -> &Dispatcher<Span> {
        &self.inner.sink
    }

    fn fresh_span_id(&self, trace_id: TraceId) -> SpanId {
        loop {
            let candidate = SpanId::generate();
            if !self.inner.open.contains_key(&(trace_id, candidate)) {
                return candidate;
            }
        }
    }

    fn finish(
        &self,
        trace_id: TraceId,
        span_id: SpanId,
        open: OpenSpan,
        status: SpanStatus,
        attributes: Attributes,
    ) {
        let mut merged = open.attributes;
        merged.extend(attributes);

        let span = Span {
            trace_id,
            span_id,
            parent_span_id: open.parent_span_id,
            correlation_id: open.correlation_id,
            operation_name: open.operation_name,
            start_time: open.start_time,
            end_time: Utc::now(),
            duration_us: open.started.elapsed().as_micros() as u64,
            status,
            attributes: merged,
            resource: self.inner.resource.clone(),
        };

        tracing::trace!(
            trace_id = %trace_id,
            span_id = %span_id,
            status = span.status.as_str(),
            duration_us = span.duration_us,
            "Span closed"
        );

        self.inner.sink.submit(span);
    }
}
