//! Lock-free counter and histogram cells.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwapOption;
use chrono::Utc;

use crate::correlation::TraceId;
use super::sample::{BucketCount, Exemplar, HistogramSnapshot};

fn set_exemplar(slot: &ArcSwapOption<Exemplar>, trace_id: TraceId, value: f64) {
    slot.store(Some(Arc::new(Exemplar {
        trace_id,
        value,
        timestamp: Utc::now(),
    })));
}

/// Monotonic counter.
#[derive(Debug, Default)]
pub struct Counter {
    value: AtomicU64,
    exemplar: ArcSwapOption<Exemplar>,
}

impl Counter {
    pub fn add(&self, n: u64, trace_id: Option<TraceId>) {
        self.value.fetch_add(n, Ordering::Relaxed);
        if let Some(trace_id) = trace_id {
            set_exemplar(&self.exemplar, trace_id, n as f64);
        }
    }

    pub fn value(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }

    pub fn exemplar(&self) -> Option<Exemplar> {
        self.exemplar.load_full().map(|e| (*e).clone())
    }
}

/// Fixed-boundary histogram.
#[derive(Debug)]
pub struct Histogram {
    bounds: Arc<[f64]>,
    /// Per-bucket (non-cumulative) counts; the last slot is `+Inf`.
    buckets: Box<[AtomicU64]>,
    sum_bits: AtomicU64,
    count: AtomicU64,
    exemplar: ArcSwapOption<Exemplar>,
}

impl Histogram {
    pub fn new(bounds: Arc<[f64]>) -> Self {
        let buckets = (0..=bounds.len()).map(|_| AtomicU64::new(0)).collect();
        Self {
            bounds,
            buckets,
            sum_bits: AtomicU64::new(0f64.to_bits()),
            count: AtomicU64::new(0),
            exemplar: ArcSwapOption::empty(),
        }
    }

    pub fn observe(&self, value: f64, trace_id: Option<TraceId>) {
        if value.is_nan() {
            return;
        }
        let idx = self
            .bounds
            .iter()
            .position(|bound| value <= *bound)
            .unwrap_or(self.bounds.len());
        self.buckets[idx].fetch_add(1, Ordering::Relaxed);

        let mut current = self.sum_bits.load(Ordering::Relaxed);
        loop {
            let next = (f64::from_bits(current) + value).to_bits();
            match self.sum_bits.compare_exchange_weak(
                current,
                next,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(actual) => current = actual,
            }
        }
        self.count.fetch_add(1, Ordering::Relaxed);

        if let Some(trace_id) = trace_id {
            set_exemplar(&self.exemplar, trace_id, value);
        }
    }

    pub fn snapshot(&self) -> HistogramSnapshot {
        let mut cumulative = 0;
        let buckets = self
            .bounds
            .iter()
            .zip(self.buckets.iter())
            .map(|(bound, cell)| {
                cumulative += cell.load(Ordering::Relaxed);
                BucketCount {
                    le: *bound,
                    count: cumulative,
                }
            })
            .collect();
        let overflow = self.buckets[self.bounds.len()].load(Ordering::Relaxed);

        HistogramSnapshot {
            buckets,
            sum: f64::from_bits(self.sum_bits.load(Ordering::Relaxed)),
            // Derived from the buckets so `+Inf` always matches `count`.
            count: cumulative + overflow,
        }
    }

    pub fn exemplar(&self) -> Option<Exemplar> {
        self.exemplar.load_full().map(|e| (*e).clone())
    }
}
