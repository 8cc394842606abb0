//! Startup orchestration.
//!
//! # Responsibilities
//! - Initialize subsystems in dependency order
//! - Emit the startup self-test span
//! - Start the queue workers, then the HTTP listener
//! - Stop everything in reverse order on shutdown
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - Listeners start last (traffic only when ready)
//! - Telemetry pipelines stop last so shutdown itself is still recorded

use std::net::SocketAddr;
use std::time::Duration;

use thiserror::Error;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use crate::config::TelemetryConfig;
use crate::correlation::{CorrelationContext, TraceId};
use crate::demo::tasks;
use crate::http::{AppState, HttpServer};
use crate::observability::metrics;
use crate::queue::{InProcessBroker, WorkerPool};
use crate::sink::SinkError;
use crate::span::SpanStatus;
use crate::telemetry::{PipelineTasks, Telemetry};
use crate::Attributes;
use super::shutdown::Shutdown;

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("telemetry pipeline: {0}")]
    Sink(#[from] SinkError),

    #[error("listener: {0}")]
    Io(#[from] std::io::Error),
}

/// Emit one span and log event so the trace backend shows the service as
/// soon as it starts.
pub fn emit_self_test(telemetry: &Telemetry) -> TraceId {
    let context = CorrelationContext::new_context();
    let guard = telemetry.spans.enter(&context, "telemetry_test_span");

    let mut attributes = Attributes::new();
    attributes.insert("test.attribute".to_string(), "test-value".into());
    attributes.insert(
        "service.name".to_string(),
        telemetry.spans.resource().service_name.clone().into(),
    );
    guard.annotate(attributes);
    telemetry
        .events
        .info(guard.context(), "Created test span during telemetry setup");

    if let Err(e) = guard.finish(SpanStatus::Ok, Attributes::new()) {
        tracing::warn!(error = %e, "Self-test span could not be closed");
    }
    tracing::info!(trace_id = %context.trace_id(), "Telemetry self-test span emitted");
    context.trace_id()
}

/// A running shim: HTTP ingress, queue workers and telemetry pipelines.
pub struct Application {
    telemetry: Telemetry,
    broker: InProcessBroker,
    shutdown: Shutdown,
    local_addr: SocketAddr,
    server: JoinHandle<Result<(), std::io::Error>>,
    workers: Vec<JoinHandle<()>>,
    pipelines: PipelineTasks,
    drain_timeout: Duration,
}

impl Application {
    /// Build pipelines from `config` and start serving on `listener`.
    pub async fn start(config: TelemetryConfig, listener: TcpListener) -> Result<Self, StartupError> {
        let (telemetry, pipelines) = Telemetry::start(&config)?;
        Self::start_with(config, listener, telemetry, pipelines).await
    }

    /// Start serving with pipelines the caller already built.
    pub async fn start_with(
        config: TelemetryConfig,
        listener: TcpListener,
        telemetry: Telemetry,
        pipelines: PipelineTasks,
    ) -> Result<Self, StartupError> {
        let prometheus = if config.metrics.enabled && config.metrics.self_metrics {
            metrics::init_metrics()
        } else {
            None
        };

        emit_self_test(&telemetry);

        let shutdown = Shutdown::new();
        let broker = InProcessBroker::new(config.queue.capacity);
        let registry = tasks::registry(Duration::from_millis(config.queue.simulated_work_ms));
        let workers = WorkerPool::new(telemetry.clone(), broker.clone(), registry)
            .spawn(config.queue.workers, &shutdown);
        tracing::info!(workers = workers.len(), capacity = config.queue.capacity, "Queue workers started");

        let local_addr = listener.local_addr()?;
        let drain_timeout = Duration::from_secs(config.timeouts.shutdown_drain_secs);
        let state = AppState::new(config, telemetry.clone(), broker.clone(), prometheus);
        let server = tokio::spawn(HttpServer::new(state).run(listener, shutdown.clone()));

        Ok(Self {
            telemetry,
            broker,
            shutdown,
            local_addr,
            server,
            workers,
            pipelines,
            drain_timeout,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn telemetry(&self) -> &Telemetry {
        &self.telemetry
    }

    pub fn broker(&self) -> &InProcessBroker {
        &self.broker
    }

    /// Handle that stops the application when triggered.
    pub fn shutdown_handle(&self) -> Shutdown {
        self.shutdown.clone()
    }

    /// Wait for shutdown to be triggered, then stop in order: HTTP, workers,
    /// telemetry pipelines.
    pub async fn run_until_stopped(self) -> Result<(), std::io::Error> {
        self.shutdown.wait().await;
        self.stop().await
    }

    /// Trigger shutdown and stop in order: HTTP, workers, telemetry pipelines.
    pub async fn stop(self) -> Result<(), std::io::Error> {
        self.shutdown.trigger();

        let served = match tokio::time::timeout(self.drain_timeout, self.server).await {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => {
                tracing::error!(error = %e, "HTTP server task failed");
                Ok(())
            }
            Err(_) => {
                tracing::warn!("HTTP server did not drain in time");
                Ok(())
            }
        };

        for mut worker in self.workers {
            if tokio::time::timeout(self.drain_timeout, &mut worker).await.is_err() {
                tracing::warn!("Queue worker did not drain in time, aborting");
                worker.abort();
                if let Err(e) = worker.await {
                    if !e.is_cancelled() {
                        tracing::error!(error = %e, "Queue worker failed");
                    }
                }
            }
        }

        self.telemetry.shutdown(self.pipelines, self.drain_timeout).await;
        tracing::info!("Shutdown complete");
        served
    }
}
