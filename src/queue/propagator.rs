//! Context propagation across a queue hop.
//!
//! # Responsibilities
//! - Capture the producer's context into the envelope
//! - Restore it in the consumer so the trace continues
//! - Recover from envelopes that arrive without a context
//!
//! # Design Decisions
//! - The consumer never mints a trace id while a propagated context exists
//! - A missing context is a diagnostic, not a failure: the task still runs
//!   under a fresh context and an INFO event marks the gap

use chrono::Utc;
use uuid::Uuid;

use crate::correlation::CorrelationContext;
use crate::events::{LogEmitter, LogLevel};
use crate::Attributes;
use super::envelope::{PropagatedContext, QueueEnvelope};

/// Wraps and unwraps envelopes for one process.
#[derive(Clone)]
pub struct QueueHop {
    events: LogEmitter,
}

impl QueueHop {
    pub fn new(events: LogEmitter) -> Self {
        Self { events }
    }

    /// Wrap `payload` for `task`, capturing `context`.
    ///
    /// Pass the context of the producing span so the consumer's span becomes
    /// its child.
    pub fn wrap<P>(&self, context: &CorrelationContext, task: impl Into<String>, payload: P) -> QueueEnvelope<P> {
        QueueEnvelope {
            task: task.into(),
            task_id: Uuid::new_v4(),
            enqueued_at: Utc::now(),
            propagated_context: Some(PropagatedContext::capture(context)),
            payload,
        }
    }

    /// Restore the producer's context and hand back the payload.
    pub fn unwrap<P>(&self, envelope: QueueEnvelope<P>) -> (CorrelationContext, P) {
        match envelope.propagated_context {
            Some(propagated) => (propagated.restore(), envelope.payload),
            None => {
                let context = CorrelationContext::new_context();
                tracing::debug!(
                    task = %envelope.task,
                    task_id = %envelope.task_id,
                    trace_id = %context.trace_id(),
                    "Envelope carried no context, starting a new trace"
                );

                let mut attributes = Attributes::new();
                attributes.insert("propagation.gap".to_string(), true.into());
                attributes.insert("task".to_string(), envelope.task.clone().into());
                attributes.insert("task_id".to_string(), envelope.task_id.to_string().into());
                self.events.log(
                    &context,
                    LogLevel::Info,
                    "Queue message arrived without propagated context",
                    attributes,
                );

                (context, envelope.payload)
            }
        }
    }
}
