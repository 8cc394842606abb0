//! Correlation context subsystem.
//!
//! # Data Flow
//! ```text
//! Inbound request headers / queue envelope
//!     → headers.rs (traceparent, correlation header, baggage)
//!     → context.rs (CorrelationContext, immutable)
//!     → passed by value down every call that emits telemetry
//!     → derive() for each child span
//! ```
//!
//! # Design Decisions
//! - The context is a value, never ambient state
//! - Malformed input mints a fresh context; tracing never blocks a request
//! - Ids use the W3C Trace Context hex forms for collector compatibility

pub mod context;
pub mod headers;
pub mod ids;

pub use context::CorrelationContext;
pub use ids::{CorrelationId, IdError, SpanId, TraceId};
