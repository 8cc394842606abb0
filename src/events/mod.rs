//! Structured log events stitched to traces.
//!
//! Every event carries the correlation id, trace id and span id of the
//! context it was emitted under, so a log line can be joined to its span.

pub mod emitter;
pub mod event;

pub use emitter::LogEmitter;
pub use event::{LogEvent, LogLevel};
