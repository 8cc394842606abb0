//! Structured log emitter.
//!
//! # Responsibilities
//! - Stamp every event with the active context's ids
//! - Filter below the configured minimum level
//! - Hand events to the log sink without blocking
//!
//! # Design Decisions
//! - Fire-and-forget: `log` returns nothing; a full or closed pipeline is
//!   counted by the dispatcher, export failures land on the fallback stream
//! - The emitter never reads ambient state; the context is always an argument

use std::sync::Arc;

use crate::correlation::CorrelationContext;
use crate::sink::Dispatcher;
use crate::Attributes;
use super::event::{LogEvent, LogLevel};

struct EmitterInner {
    service: String,
    min_level: LogLevel,
    sink: Dispatcher<LogEvent>,
}

/// Emits [`LogEvent`]s to the log sink. Cheap to clone.
#[derive(Clone)]
pub struct LogEmitter {
    inner: Arc<EmitterInner>,
}

impl LogEmitter {
    pub fn new(service: impl Into<String>, min_level: LogLevel, sink: Dispatcher<LogEvent>) -> Self {
        Self {
            inner: Arc::new(EmitterInner {
                service: service.into(),
                min_level,
                sink,
            }),
        }
    }

    /// Emit one event stamped with `context`.
    pub fn log(
        &self,
        context: &CorrelationContext,
        level: LogLevel,
        message: impl Into<String>,
        attributes: Attributes,
    ) {
        if level < self.inner.min_level {
            return;
        }
        let event = LogEvent::new(context, &self.inner.service, level, message, attributes);
        self.inner.sink.submit(event);
    }

    pub fn debug(&self, context: &CorrelationContext, message: impl Into<String>) {
        self.log(context, LogLevel::Debug, message, Attributes::new());
    }

    pub fn info(&self, context: &CorrelationContext, message: impl Into<String>) {
        self.log(context, LogLevel::Info, message, Attributes::new());
    }

    pub fn warn(&self, context: &CorrelationContext, message: impl Into<String>) {
        self.log(context, LogLevel::Warn, message, Attributes::new());
    }

    pub fn error(&self, context: &CorrelationContext, message: impl Into<String>) {
        self.log(context, LogLevel::Error, message, Attributes::new());
    }

    pub fn is_enabled(&self, level: LogLevel) -> bool {
        level >= self.inner.min_level
    }

    pub fn dispatcher(&self) -> &Dispatcher<LogEvent> {
        &self.inner.sink
    }
}
