//! Metric keys and point-in-time samples.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::correlation::TraceId;

/// Label set, kept sorted by name.
pub type Labels = BTreeMap<String, String>;

/// Identity of one time series: metric name plus sorted labels.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MetricKey {
    pub name: String,
    pub labels: Labels,
}

impl MetricKey {
    /// Build a key. A label given twice keeps its last value.
    pub fn new(name: &str, labels: &[(&str, &str)]) -> Self {
        Self {
            name: name.to_string(),
            labels: labels
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricKind {
    Counter,
    Histogram,
}

impl MetricKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricKind::Counter => "counter",
            MetricKind::Histogram => "histogram",
        }
    }
}

/// Trace id attached to the most recent traced update of a series.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Exemplar {
    pub trace_id: TraceId,
    pub value: f64,
    pub timestamp: DateTime<Utc>,
}

/// Cumulative count of observations `<= le`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BucketCount {
    pub le: f64,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistogramSnapshot {
    /// Finite boundaries only; the `+Inf` bucket equals `count`.
    pub buckets: Vec<BucketCount>,
    pub sum: f64,
    pub count: u64,
}

/// One series as returned by a snapshot.
///
/// `value` is the counter total, or the observation sum for histograms.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricSample {
    pub name: String,
    pub kind: MetricKind,
    pub labels: Labels,
    pub value: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub histogram: Option<HistogramSnapshot>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exemplar: Option<Exemplar>,
}
