//! Metric aggregator.
//!
//! # Responsibilities
//! - Maintain counters and histograms keyed by name and sorted labels
//! - Resolve histogram boundaries from configuration
//! - Attach the latest trace id as an exemplar on traced updates
//! - Produce consistent per-series snapshots for scraping
//!
//! # Design Decisions
//! - DashMap shards plus per-series atomics; the hot path takes a shard read
//!   lock only, and nothing is held across I/O
//! - A metric name has one kind for the life of the process; a conflicting
//!   update is logged and ignored
//! - Counters are monotonic; rates are computed by the scraper

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;

use crate::config::MetricsConfig;
use crate::correlation::{CorrelationContext, TraceId};
use super::exposition;
use super::instruments::{Counter, Histogram};
use super::sample::{MetricKey, MetricKind, MetricSample};

/// Shared counters and histograms. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct MetricAggregator {
    inner: Arc<AggregatorInner>,
}

struct AggregatorInner {
    kinds: DashMap<String, MetricKind>,
    counters: DashMap<MetricKey, Counter>,
    histograms: DashMap<MetricKey, Histogram>,
    default_buckets: Arc<[f64]>,
    buckets: BTreeMap<String, Arc<[f64]>>,
    kind_conflicts: AtomicU64,
}

impl Default for MetricAggregator {
    fn default() -> Self {
        Self::new(&MetricsConfig::default())
    }
}

impl MetricAggregator {
    pub fn new(config: &MetricsConfig) -> Self {
        let buckets = config
            .buckets
            .iter()
            .map(|(name, bounds)| (name.clone(), Arc::from(bounds.as_slice())))
            .collect();
        Self {
            inner: Arc::new(AggregatorInner {
                kinds: DashMap::new(),
                counters: DashMap::new(),
                histograms: DashMap::new(),
                default_buckets: Arc::from(config.default_buckets.as_slice()),
                buckets,
                kind_conflicts: AtomicU64::new(0),
            }),
        }
    }

    /// Add one to a counter.
    pub fn increment(&self, name: &str, labels: &[(&str, &str)]) {
        self.add(name, labels, 1);
    }

    /// Add `n` to a counter.
    pub fn add(&self, name: &str, labels: &[(&str, &str)], n: u64) {
        self.update_counter(name, labels, n, None);
    }

    /// Record one histogram observation.
    pub fn observe(&self, name: &str, labels: &[(&str, &str)], value: f64) {
        self.update_histogram(name, labels, value, None);
    }

    /// Like [`add`](Self::add), and remember the context's trace id as the
    /// series exemplar.
    pub fn add_traced(&self, name: &str, labels: &[(&str, &str)], n: u64, context: &CorrelationContext) {
        self.update_counter(name, labels, n, Some(context.trace_id()));
    }

    /// Like [`observe`](Self::observe), and remember the context's trace id
    /// as the series exemplar.
    pub fn observe_traced(
        &self,
        name: &str,
        labels: &[(&str, &str)],
        value: f64,
        context: &CorrelationContext,
    ) {
        self.update_histogram(name, labels, value, Some(context.trace_id()));
    }

    /// Current counter value, if the series exists.
    pub fn counter_value(&self, name: &str, labels: &[(&str, &str)]) -> Option<u64> {
        self.inner
            .counters
            .get(&MetricKey::new(name, labels))
            .map(|c| c.value().value())
    }

    /// Every series, sorted by name then labels.
    pub fn snapshot(&self) -> Vec<MetricSample> {
        let mut samples: Vec<MetricSample> = self
            .inner
            .counters
            .iter()
            .map(|entry| MetricSample {
                name: entry.key().name.clone(),
                kind: MetricKind::Counter,
                labels: entry.key().labels.clone(),
                value: entry.value().value() as f64,
                histogram: None,
                exemplar: entry.value().exemplar(),
            })
            .collect();

        samples.extend(self.inner.histograms.iter().map(|entry| {
            let histogram = entry.value().snapshot();
            MetricSample {
                name: entry.key().name.clone(),
                kind: MetricKind::Histogram,
                labels: entry.key().labels.clone(),
                value: histogram.sum,
                histogram: Some(histogram),
                exemplar: entry.value().exemplar(),
            }
        }));

        samples.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.labels.cmp(&b.labels)));
        samples
    }

    /// Prometheus text exposition (format 0.0.4) of every series.
    pub fn render_prometheus(&self) -> String {
        exposition::render(&self.snapshot())
    }

    /// Number of distinct series.
    pub fn series_count(&self) -> usize {
        self.inner.counters.len() + self.inner.histograms.len()
    }

    /// Updates dropped because the name was registered with the other kind.
    pub fn kind_conflicts(&self) -> u64 {
        self.inner.kind_conflicts.load(Ordering::Relaxed)
    }

    fn claim_kind(&self, name: &str, kind: MetricKind) -> bool {
        let existing = match self.inner.kinds.get(name) {
            Some(existing) => *existing,
            None => *self.inner.kinds.entry(name.to_string()).or_insert(kind),
        };
        if existing != kind {
            self.inner.kind_conflicts.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(
                metric = name,
                registered = existing.as_str(),
                attempted = kind.as_str(),
                "Metric kind conflict, update ignored"
            );
            return false;
        }
        true
    }

    fn update_counter(&self, name: &str, labels: &[(&str, &str)], n: u64, trace_id: Option<TraceId>) {
        if !self.claim_kind(name, MetricKind::Counter) {
            return;
        }
        let key = MetricKey::new(name, labels);
        if let Some(counter) = self.inner.counters.get(&key) {
            counter.add(n, trace_id);
            return;
        }
        self.inner.counters.entry(key).or_default().add(n, trace_id);
    }

    fn update_histogram(&self, name: &str, labels: &[(&str, &str)], value: f64, trace_id: Option<TraceId>) {
        if !self.claim_kind(name, MetricKind::Histogram) {
            return;
        }
        let key = MetricKey::new(name, labels);
        if let Some(histogram) = self.inner.histograms.get(&key) {
            histogram.observe(value, trace_id);
            return;
        }
        let bounds = self.bounds_for(name);
        self.inner
            .histograms
            .entry(key)
            .or_insert_with(|| Histogram::new(bounds))
            .observe(value, trace_id);
    }

    fn bounds_for(&self, name: &str) -> Arc<[f64]> {
        self.inner
            .buckets
            .get(name)
            .cloned()
            .unwrap_or_else(|| Arc::clone(&self.inner.default_buckets))
    }
}
