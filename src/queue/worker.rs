//! Background task workers.
//!
//! # Responsibilities
//! - Consume envelopes from the broker
//! - Resume the producer's trace and open a `task.<name>` span under it
//! - Dispatch to the registered handler and record the outcome
//! - Drain already-queued messages on shutdown
//!
//! # Design Decisions
//! - Handlers receive the task span's context explicitly; nothing is ambient
//! - A failing or unknown task is logged and counted, never retried here

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use serde_json::Value;
use thiserror::Error;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::correlation::CorrelationContext;
use crate::events::LogLevel;
use crate::lifecycle::Shutdown;
use crate::span::{SpanError, SpanStatus};
use crate::telemetry::Telemetry;
use crate::Attributes;
use super::broker::InProcessBroker;
use super::envelope::QueueEnvelope;
use super::propagator::QueueHop;

/// Errors a task handler reports.
#[derive(Debug, Error)]
pub enum TaskError {
    #[error("invalid payload: {0}")]
    Payload(#[from] serde_json::Error),

    #[error("span: {0}")]
    Span(#[from] SpanError),

    #[error("{0}")]
    Failed(String),
}

/// What a handler gets besides its payload.
#[derive(Clone)]
pub struct TaskContext {
    /// Context of the `task.<name>` span.
    pub context: CorrelationContext,
    pub task_id: Uuid,
    pub telemetry: Telemetry,
}

type TaskHandler = Arc<dyn Fn(TaskContext, Value) -> BoxFuture<'static, Result<(), TaskError>> + Send + Sync>;

/// Task name to handler table.
#[derive(Clone, Default)]
pub struct TaskRegistry {
    handlers: HashMap<String, TaskHandler>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F, Fut>(&mut self, name: impl Into<String>, handler: F)
    where
        F: Fn(TaskContext, Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), TaskError>> + Send + 'static,
    {
        self.handlers.insert(
            name.into(),
            Arc::new(move |ctx, payload| handler(ctx, payload).boxed()),
        );
    }

    fn get(&self, name: &str) -> Option<TaskHandler> {
        self.handlers.get(name).cloned()
    }
}

/// Pool of workers consuming one broker.
#[derive(Clone)]
pub struct WorkerPool {
    telemetry: Telemetry,
    hop: QueueHop,
    broker: InProcessBroker,
    registry: Arc<TaskRegistry>,
}

impl WorkerPool {
    pub fn new(telemetry: Telemetry, broker: InProcessBroker, registry: TaskRegistry) -> Self {
        Self {
            hop: telemetry.hop(),
            telemetry,
            broker,
            registry: Arc::new(registry),
        }
    }

    /// Start `workers` consumers. Each stops when `shutdown` fires, after
    /// draining what is already queued.
    pub fn spawn(&self, workers: usize, shutdown: &Shutdown) -> Vec<JoinHandle<()>> {
        (0..workers.max(1))
            .map(|worker| {
                let pool = self.clone();
                let mut stop = shutdown.subscribe();
                tokio::spawn(async move {
                    tracing::debug!(worker, "Worker started");
                    loop {
                        let message = tokio::select! {
                            _ = stop.recv() => break,
                            message = pool.broker.receive() => message,
                        };
                        match message {
                            Some(bytes) => pool.process(&bytes).await,
                            None => break,
                        }
                    }

                    while let Some(bytes) = pool.broker.try_receive().await {
                        pool.process(&bytes).await;
                    }
                    tracing::debug!(worker, "Worker stopped");
                })
            })
            .collect()
    }

    /// Handle one encoded envelope.
    pub async fn process(&self, bytes: &[u8]) {
        let envelope = match QueueEnvelope::<Value>::decode(bytes) {
            Ok(envelope) => envelope,
            Err(e) => {
                tracing::warn!(error = %e, "Dropping undecodable queue message");
                self.telemetry.metrics.increment(
                    "tasks_processed_total",
                    &[("task", "unknown"), ("outcome", "malformed")],
                );
                return;
            }
        };

        let task = envelope.task.clone();
        let task_id = envelope.task_id;
        let queued_ms = (chrono::Utc::now() - envelope.enqueued_at).num_milliseconds().max(0);
        let (context, payload) = self.hop.unwrap(envelope);

        let telemetry = &self.telemetry;
        let guard = telemetry.spans.enter(&context, format!("task.{}", task));
        let mut attributes = Attributes::new();
        attributes.insert("task.name".to_string(), task.clone().into());
        attributes.insert("task.id".to_string(), task_id.to_string().into());
        attributes.insert("messaging.system".to_string(), "in_process".into());
        attributes.insert("messaging.queue_time_ms".to_string(), queued_ms.into());
        guard.annotate(attributes);
        let span_context = guard.context().clone();

        let (status, outcome, error) = match self.registry.get(&task) {
            Some(handler) => {
                let ctx = TaskContext {
                    context: span_context.clone(),
                    task_id,
                    telemetry: telemetry.clone(),
                };
                match handler(ctx, payload).await {
                    Ok(()) => (SpanStatus::Ok, "success", None),
                    Err(e) => (SpanStatus::Error, "failure", Some(e.to_string())),
                }
            }
            None => (
                SpanStatus::Error,
                "unregistered",
                Some(format!("no handler registered for '{}'", task)),
            ),
        };

        telemetry.metrics.add_traced(
            "tasks_processed_total",
            &[("task", task.as_str()), ("outcome", outcome)],
            1,
            &span_context,
        );

        let mut log_attributes = Attributes::new();
        log_attributes.insert("task".to_string(), task.clone().into());
        log_attributes.insert("task_id".to_string(), task_id.to_string().into());
        log_attributes.insert("outcome".to_string(), outcome.into());
        let mut close_attributes = Attributes::new();
        match &error {
            Some(message) => {
                tracing::warn!(task = %task, task_id = %task_id, error = %message, "Task failed");
                log_attributes.insert("error".to_string(), message.clone().into());
                close_attributes.insert("error.message".to_string(), message.clone().into());
                telemetry
                    .events
                    .log(&span_context, LogLevel::Error, "Task failed", log_attributes);
            }
            None => {
                telemetry
                    .events
                    .log(&span_context, LogLevel::Info, "Task completed", log_attributes);
            }
        }

        if let Err(e) = guard.finish(status, close_attributes) {
            tracing::debug!(task = %task, error = %e, "Task span already closed");
        }
    }
}
