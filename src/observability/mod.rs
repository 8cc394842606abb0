//! Process observability: diagnostics about the shim itself.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (tracing events → stdout, JSON or pretty)
//!     → metrics.rs (pipeline self-metrics via the `metrics` facade)
//!
//! Consumers:
//!     → Log shipper tailing stdout
//!     → Prometheus scrape (appended to the domain metrics response)
//! ```
//!
//! # Design Decisions
//! - Kept apart from the stitching core: these describe the pipeline, not the
//!   requests flowing through it
//! - Telemetry export failures land here (target `telemetry::fallback`)

pub mod logging;
pub mod metrics;
