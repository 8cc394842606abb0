//! Scope guard for spans.

use crate::correlation::CorrelationContext;
use crate::Attributes;
use super::recorder::{SpanError, SpanHandle, SpanRecorder};
use super::span::SpanStatus;

/// An open span that closes itself as [`SpanStatus::Cancelled`] if dropped
/// before [`finish`](SpanGuard::finish) is called.
///
/// Dropping the future that owns a guard (client disconnect, timeout) is how
/// in-flight request spans get force-closed.
pub struct SpanGuard {
    recorder: SpanRecorder,
    handle: Option<SpanHandle>,
    context: CorrelationContext,
}

impl SpanGuard {
    pub(crate) fn new(recorder: SpanRecorder, handle: SpanHandle, context: CorrelationContext) -> Self {
        Self {
            recorder,
            handle: Some(handle),
            context,
        }
    }

    /// Context whose current span is this span. Pass it to nested calls.
    pub fn context(&self) -> &CorrelationContext {
        &self.context
    }

    pub fn handle(&self) -> Option<&SpanHandle> {
        self.handle.as_ref()
    }

    /// Add attributes while the span is still open.
    pub fn annotate(&self, attributes: Attributes) {
        if let Some(handle) = &self.handle {
            if let Err(e) = self.recorder.annotate(handle, attributes) {
                tracing::debug!(error = %e, "Span annotation ignored");
            }
        }
    }

    /// Close the span with an explicit outcome.
    pub fn finish(mut self, status: SpanStatus, attributes: Attributes) -> Result<(), SpanError> {
        match self.handle.take() {
            Some(handle) => self.recorder.close(&handle, status, attributes),
            None => Ok(()),
        }
    }
}

impl Drop for SpanGuard {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            if handle.is_closed() {
                return;
            }
            let mut attributes = Attributes::new();
            attributes.insert("cancelled".to_string(), true.into());
            // Already closed by cancel_trace is fine.
            let _ = self.recorder.close(&handle, SpanStatus::Cancelled, attributes);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::config::BackpressurePolicy;
    use crate::sink::{DispatchOptions, Dispatcher, InMemorySink};
    use crate::span::{Resource, Span};

    fn recorder() -> (SpanRecorder, InMemorySink<Span>) {
        let sink = InMemorySink::new();
        let (dispatcher, _handle) = Dispatcher::spawn(
            sink.clone(),
            DispatchOptions {
                name: "spans",
                capacity: 64,
                batch_size: 8,
                policy: BackpressurePolicy::DropNewest,
            },
        );
        (SpanRecorder::new(Resource::new("svc", "test", "host"), dispatcher), sink)
    }

    #[tokio::test]
    async fn test_finish_closes_once() {
        let (recorder, sink) = recorder();
        let guard = recorder.enter(&CorrelationContext::new_context(), "work");
        guard.finish(SpanStatus::Ok, Attributes::new()).unwrap();

        assert!(recorder.dispatcher().flush(Duration::from_secs(2)).await);
        let spans = sink.records();
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].status, SpanStatus::Ok);
    }

    #[tokio::test]
    async fn test_drop_cancels_span() {
        let (recorder, sink) = recorder();
        let ctx = CorrelationContext::new_context();

        let slow = async {
            let guard = recorder.enter(&ctx, "GET /slow");
            tokio::time::sleep(Duration::from_secs(60)).await;
            guard.finish(SpanStatus::Ok, Attributes::new())
        };
        let timed_out = tokio::time::timeout(Duration::from_millis(20), slow).await;
        assert!(timed_out.is_err());

        assert!(recorder.dispatcher().flush(Duration::from_secs(2)).await);
        let spans = sink.records();
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].status, SpanStatus::Cancelled);
        assert_eq!(spans[0].attributes["cancelled"], true);
        assert_eq!(recorder.open_spans(), 0);
    }
}
