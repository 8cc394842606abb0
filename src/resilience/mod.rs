//! Resilience for sink export.
//!
//! # Data Flow
//! ```text
//! Drain task export call:
//!     → retries.rs (retry transient failures within the attempt budget)
//!     → backoff.rs (exponential delay with jitter between attempts)
//!     → exhausted: caller falls back to the local stream
//! ```
//!
//! # Design Decisions
//! - Retries run on the drain task, never on a request path
//! - Jittered backoff keeps many instances from retrying in lockstep
//! - Only transient failures (transport errors, 5xx, 429) are retried

pub mod backoff;
pub mod retries;
