//! In-process metric aggregation.
//!
//! # Data Flow
//! ```text
//! increment / add / observe (+ optional trace exemplar)
//!     → registry.rs (key = name + sorted labels, atomic update)
//!     → snapshot() → Vec<MetricSample>
//!     → exposition.rs (Prometheus text) or JSON (with exemplars)
//! ```

pub mod exposition;
pub mod instruments;
pub mod registry;
pub mod sample;

pub use registry::MetricAggregator;
pub use sample::{
    BucketCount, Exemplar, HistogramSnapshot, Labels, MetricKey, MetricKind, MetricSample,
};
