//! HTTP ingress subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, request id, timeout)
//!     → middleware.rs (context from headers, root span, request metrics)
//!     → demo routes / scrape endpoint
//!     → middleware.rs (close span, echo correlation headers)
//!     → Send to client
//! ```

pub mod middleware;
pub mod server;

pub use middleware::{telemetry_middleware, RequestContext};
pub use server::{AppState, HttpServer};
