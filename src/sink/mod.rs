//! Telemetry sinks.
//!
//! # Data Flow
//! ```text
//! SpanRecorder::close / LogEmitter::log
//!     → dispatcher.rs (bounded queue, never blocks the caller)
//!     → drain task (one per sink, batches records)
//!     → Sink::export (stdout / http / memory / discard)
//!     → on failure: local fallback stream (tracing, target telemetry::fallback)
//! ```
//!
//! # Design Decisions
//! - Export runs only on the drain task; request paths only enqueue
//! - Backpressure policy is configurable (drop newest / drop oldest)
//! - Loss is tolerated and counted; ids of delivered records stay consistent

pub mod dispatcher;
pub mod http;
pub mod memory;
pub mod stdout;

use std::future::Future;

use thiserror::Error;

use crate::resilience::retries::Transient;

pub use dispatcher::{DispatchOptions, DispatchStats, Dispatcher};
pub use http::HttpSink;
pub use memory::InMemorySink;
pub use stdout::StdoutSink;

/// Errors raised by a sink export.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("transport error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("collector responded with status {0}")]
    Status(u16),

    #[error("serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("write failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("sink unavailable: {0}")]
    Unavailable(String),
}

impl Transient for SinkError {
    fn is_transient(&self) -> bool {
        match self {
            SinkError::Http(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            SinkError::Status(code) => *code == 429 || *code >= 500,
            SinkError::Unavailable(_) => true,
            SinkError::Serialize(_) | SinkError::Io(_) => false,
        }
    }
}

/// Destination for finished telemetry records.
pub trait Sink<T>: Send + Sync + 'static {
    /// Short name used in logs and self-metrics.
    fn name(&self) -> &'static str;

    /// Export one batch. Called only from the sink's drain task.
    fn export(&self, batch: &[T]) -> impl Future<Output = Result<(), SinkError>> + Send;
}

/// Accepts every record and drops it.
#[derive(Debug, Clone, Copy, Default)]
pub struct DiscardSink;

impl<T: Sync> Sink<T> for DiscardSink {
    fn name(&self) -> &'static str {
        "discard"
    }

    async fn export(&self, _batch: &[T]) -> Result<(), SinkError> {
        Ok(())
    }
}
