//! Deferred work and queue-hop propagation.
//!
//! # Data Flow
//! ```text
//! producer span context
//!     → propagator.rs wrap (context captured into the envelope)
//!     → envelope.rs encode (JSON bytes)
//!     → broker.rs (bounded FIFO)
//!     → worker.rs decode + propagator.rs unwrap (same trace resumed)
//!     → task.<name> span, child of the producer span
//! ```

pub mod broker;
pub mod envelope;
pub mod propagator;
pub mod worker;

pub use broker::{InProcessBroker, QueueError};
pub use envelope::{EnvelopeError, PropagatedContext, QueueEnvelope};
pub use propagator::QueueHop;
pub use worker::{TaskContext, TaskError, TaskRegistry, WorkerPool};
