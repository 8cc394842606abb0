//! Span recording subsystem.
//!
//! # Data Flow
//! ```text
//! CorrelationContext
//!     → recorder.rs (open: id, parent, start time)
//!     → guard.rs (scope-bound close, cancel on drop)
//!     → recorder.rs (close: end time, status, attributes)
//!     → Dispatcher<Span> → span sink
//! ```
//!
//! # Design Decisions
//! - A span is closed exactly once; misuse is an error, not a panic
//! - Every span carries the service resource it was recorded under

pub mod guard;
pub mod recorder;
pub mod resource;
#[allow(clippy::module_inception)]
pub mod span;

pub use guard::SpanGuard;
pub use recorder::{SpanError, SpanHandle, SpanRecorder};
pub use resource::Resource;
pub use span::{Span, SpanStatus};
