//! Telemetry core wiring.
//!
//! # Responsibilities
//! - Build the span and log pipelines from configuration
//! - Bundle recorder, emitter and aggregator for the rest of the process
//! - Flush and stop the pipelines on shutdown
//!
//! # Data Flow
//! ```text
//! TelemetryConfig
//!     → sinks.spans → Dispatcher<Span>     → SpanRecorder
//!     → sinks.logs  → Dispatcher<LogEvent> → LogEmitter
//!     → metrics     → MetricAggregator
//! ```

use std::time::Duration;

use serde::Serialize;
use tokio::task::JoinHandle;

use crate::aggregator::MetricAggregator;
use crate::config::{SinkConfig, SinkKind, TelemetryConfig};
use crate::events::{LogEmitter, LogEvent};
use crate::queue::QueueHop;
use crate::sink::{DiscardSink, DispatchOptions, Dispatcher, HttpSink, Sink, SinkError, StdoutSink};
use crate::span::{Resource, Span, SpanRecorder};

/// The stitching core: everything a request or task needs to emit telemetry.
/// Cheap to clone.
#[derive(Clone)]
pub struct Telemetry {
    pub spans: SpanRecorder,
    pub events: LogEmitter,
    pub metrics: MetricAggregator,
}

/// Drain tasks of the sink pipelines, awaited on shutdown.
pub struct PipelineTasks {
    spans: JoinHandle<()>,
    logs: JoinHandle<()>,
}

impl Telemetry {
    /// Build pipelines with the sinks named in `config`.
    ///
    /// Must be called within a Tokio runtime.
    pub fn start(config: &TelemetryConfig) -> Result<(Self, PipelineTasks), SinkError> {
        let (span_dispatcher, spans) = spawn_pipeline::<Span>("spans", &config.sinks.spans)?;
        let (log_dispatcher, logs) = spawn_pipeline::<LogEvent>("logs", &config.sinks.logs)?;
        Ok((
            Self::assemble(config, span_dispatcher, log_dispatcher),
            PipelineTasks { spans, logs },
        ))
    }

    /// Build pipelines around caller-provided sinks.
    pub fn with_sinks<S, L>(config: &TelemetryConfig, span_sink: S, log_sink: L) -> (Self, PipelineTasks)
    where
        S: Sink<Span>,
        L: Sink<LogEvent>,
    {
        let (span_dispatcher, spans) = Dispatcher::spawn(
            span_sink,
            DispatchOptions::from_config("spans", &config.sinks.spans),
        );
        let (log_dispatcher, logs) = Dispatcher::spawn(
            log_sink,
            DispatchOptions::from_config("logs", &config.sinks.logs),
        );
        (
            Self::assemble(config, span_dispatcher, log_dispatcher),
            PipelineTasks { spans, logs },
        )
    }

    fn assemble(
        config: &TelemetryConfig,
        spans: Dispatcher<Span>,
        logs: Dispatcher<LogEvent>,
    ) -> Self {
        let resource = Resource::from_config(&config.service);
        let events = LogEmitter::new(
            resource.service_name.clone(),
            config.sinks.log_min_level,
            logs,
        );
        Self {
            spans: SpanRecorder::new(resource, spans),
            events,
            metrics: MetricAggregator::new(&config.metrics),
        }
    }

    /// Propagator for queue hops, logging gaps through this emitter.
    pub fn hop(&self) -> QueueHop {
        QueueHop::new(self.events.clone())
    }

    /// Force-close spans still open as cancelled, flush what is queued, then
    /// stop both pipelines.
    pub async fn shutdown(&self, tasks: PipelineTasks, timeout: Duration) {
        self.spans.cancel_all();
        let span_flushed = self.spans.dispatcher().flush(timeout).await;
        let log_flushed = self.events.dispatcher().flush(timeout).await;
        if !(span_flushed && log_flushed) {
            tracing::warn!(
                spans_queued = self.spans.dispatcher().queued(),
                logs_queued = self.events.dispatcher().queued(),
                "Telemetry flush timed out, remaining records dropped"
            );
        }

        self.spans.dispatcher().close();
        self.events.dispatcher().close();
        for (name, handle) in [("spans", tasks.spans), ("logs", tasks.logs)] {
            match tokio::time::timeout(timeout, handle).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::error!(pipeline = name, error = %e, "Sink drain task failed"),
                Err(_) => tracing::warn!(pipeline = name, "Sink drain task did not stop in time"),
            }
        }

        tracing::info!(
            spans = ?self.spans.dispatcher().stats(),
            logs = ?self.events.dispatcher().stats(),
            open_spans = self.spans.open_spans(),
            "Telemetry pipelines stopped"
        );
    }
}

fn spawn_pipeline<T>(
    name: &'static str,
    config: &SinkConfig,
) -> Result<(Dispatcher<T>, JoinHandle<()>), SinkError>
where
    T: Serialize + Send + Sync + 'static,
{
    let options = DispatchOptions::from_config(name, config);
    tracing::info!(
        pipeline = name,
        kind = ?config.kind,
        endpoint = config.endpoint.as_deref().unwrap_or("-"),
        capacity = options.capacity,
        backpressure = ?options.policy,
        "Telemetry pipeline configured"
    );

    let spawned = match config.kind {
        SinkKind::Stdout => Dispatcher::spawn(StdoutSink, options),
        SinkKind::Discard => Dispatcher::spawn(DiscardSink, options),
        SinkKind::Http => {
            let endpoint = config
                .endpoint
                .clone()
                .ok_or_else(|| SinkError::Unavailable(format!("{} sink has no endpoint", name)))?;
            let sink = HttpSink::new(
                endpoint,
                Duration::from_secs(config.timeout_secs),
                config.retry.clone(),
            )?;
            Dispatcher::spawn(sink, options)
        }
    };
    Ok(spawned)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::correlation::CorrelationContext;
    use crate::sink::InMemorySink;
    use crate::span::SpanStatus;
    use crate::Attributes;

    #[tokio::test]
    async fn test_shutdown_flushes_pending_records() {
        let spans = InMemorySink::new();
        let logs = InMemorySink::new();
        let (telemetry, tasks) =
            Telemetry::with_sinks(&TelemetryConfig::default(), spans.clone(), logs.clone());

        let ctx = CorrelationContext::new_context();
        let (handle, child) = telemetry.spans.open(&ctx, "GET /");
        telemetry.events.info(&child, "handled");
        telemetry.spans.close(&handle, SpanStatus::Ok, Attributes::new()).unwrap();

        telemetry.shutdown(tasks, Duration::from_secs(2)).await;
        assert_eq!(spans.len(), 1);
        assert_eq!(logs.len(), 1);
        assert!(telemetry.spans.dispatcher().is_closed());
        assert_eq!(spans.records()[0].resource.service_name, logs.records()[0].service);
    }

    #[tokio::test]
    async fn test_shutdown_cancels_spans_left_open() {
        let spans = InMemorySink::new();
        let (telemetry, tasks) =
            Telemetry::with_sinks(&TelemetryConfig::default(), spans.clone(), InMemorySink::new());

        let ctx = CorrelationContext::new_context();
        let (root, root_ctx) = telemetry.spans.open(&ctx, "GET /slow");
        let (_stuck, _) = telemetry.spans.open(&root_ctx, "order.fulfil");

        telemetry.shutdown(tasks, Duration::from_secs(2)).await;
        assert_eq!(telemetry.spans.open_spans(), 0);
        assert!(root.is_closed());

        let records = spans.records();
        assert_eq!(records.len(), 2);
        assert!(records.iter().all(|s| s.status == SpanStatus::Cancelled));
        assert!(records.iter().all(|s| s.trace_id == ctx.trace_id()));
    }

    #[tokio::test]
    async fn test_start_with_discard_sinks() {
        let mut config = TelemetryConfig::default();
        config.sinks.spans.kind = SinkKind::Discard;
        config.sinks.logs.kind = SinkKind::Discard;
        let (telemetry, tasks) = Telemetry::start(&config).unwrap();

        let guard = telemetry.spans.enter(&CorrelationContext::new_context(), "noop");
        guard.finish(SpanStatus::Ok, Attributes::new()).unwrap();
        telemetry.shutdown(tasks, Duration::from_secs(2)).await;
        assert_eq!(telemetry.spans.dispatcher().stats().exported, 1);
    }
}
