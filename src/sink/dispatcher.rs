//! Bounded hand-off between telemetry producers and a sink's drain task.
//!
//! # Responsibilities
//! - Accept records without blocking or awaiting
//! - Apply the backpressure policy when the queue is full
//! - Drain in batches and export on a dedicated task
//! - Fall back to the local stream when export fails
//!
//! # Design Decisions
//! - A plain `VecDeque` under a short-lived mutex, so both drop-newest and
//!   drop-oldest are possible (a channel can only refuse the newest)
//! - `Notify` stores a permit, so a submit racing the drain's idle check is
//!   never lost

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::Notify;
use tokio::task::JoinHandle;

use crate::config::{BackpressurePolicy, SinkConfig};
use crate::observability::metrics;
use super::Sink;

/// Queue settings for one sink pipeline.
#[derive(Debug, Clone)]
pub struct DispatchOptions {
    pub name: &'static str,
    pub capacity: usize,
    pub batch_size: usize,
    pub policy: BackpressurePolicy,
}

impl DispatchOptions {
    pub fn from_config(name: &'static str, config: &SinkConfig) -> Self {
        Self {
            name,
            capacity: config.queue_capacity.max(1),
            batch_size: config.batch_size.max(1),
            policy: config.backpressure,
        }
    }
}

/// Point-in-time counters for one pipeline.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DispatchStats {
    pub queued: usize,
    pub submitted: u64,
    pub exported: u64,
    pub dropped: u64,
    pub export_failures: u64,
}

struct Shared<T> {
    options: DispatchOptions,
    queue: Mutex<VecDeque<T>>,
    notify: Notify,
    closed: AtomicBool,
    in_flight: AtomicUsize,
    submitted: AtomicU64,
    exported: AtomicU64,
    dropped: AtomicU64,
    export_failures: AtomicU64,
}

impl<T> Shared<T> {
    fn lock(&self) -> MutexGuard<'_, VecDeque<T>> {
        self.queue.lock().expect("sink queue mutex poisoned")
    }

    fn take_batch(&self) -> Vec<T> {
        let mut queue = self.lock();
        let n = queue.len().min(self.options.batch_size);
        let batch: Vec<T> = queue.drain(..n).collect();
        self.in_flight.store(batch.len(), Ordering::Release);
        batch
    }

    fn record_drop(&self, reason: &'static str) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
        metrics::record_dropped(self.options.name, reason);
    }
}

/// Producer side of a sink pipeline. Cheap to clone.
pub struct Dispatcher<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for Dispatcher<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T> Dispatcher<T>
where
    T: Serialize + Send + Sync + 'static,
{
    /// Start the drain task for `sink`. Must be called within a Tokio runtime.
    pub fn spawn<S: Sink<T>>(sink: S, options: DispatchOptions) -> (Self, JoinHandle<()>) {
        let shared = Arc::new(Shared {
            queue: Mutex::new(VecDeque::with_capacity(options.capacity.min(1024))),
            options,
            notify: Notify::new(),
            closed: AtomicBool::new(false),
            in_flight: AtomicUsize::new(0),
            submitted: AtomicU64::new(0),
            exported: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
            export_failures: AtomicU64::new(0),
        });

        tracing::debug!(
            sink = sink.name(),
            pipeline = shared.options.name,
            capacity = shared.options.capacity,
            "Starting sink drain task"
        );

        let handle = tokio::spawn(drain(sink, Arc::clone(&shared)));
        (Self { shared }, handle)
    }

    /// Hand a record to the drain task. Never blocks on I/O.
    ///
    /// Returns false if the record was rejected (queue full under
    /// drop-newest, or pipeline closed).
    pub fn submit(&self, item: T) -> bool {
        let shared = &self.shared;
        if shared.closed.load(Ordering::Acquire) {
            shared.record_drop("closed");
            return false;
        }
        shared.submitted.fetch_add(1, Ordering::Relaxed);

        let (accepted, evicted) = {
            let mut queue = shared.lock();
            if queue.len() < shared.options.capacity {
                queue.push_back(item);
                (true, false)
            } else {
                match shared.options.policy {
                    BackpressurePolicy::DropNewest => (false, false),
                    BackpressurePolicy::DropOldest => {
                        queue.pop_front();
                        queue.push_back(item);
                        (true, true)
                    }
                }
            }
        };

        if !accepted {
            shared.record_drop("queue_full");
        } else if evicted {
            shared.record_drop("evicted");
        }

        shared.notify.notify_one();
        accepted
    }

    /// Records waiting for the drain task.
    pub fn queued(&self) -> usize {
        self.shared.lock().len()
    }

    pub fn stats(&self) -> DispatchStats {
        let shared = &self.shared;
        DispatchStats {
            queued: self.queued(),
            submitted: shared.submitted.load(Ordering::Relaxed),
            exported: shared.exported.load(Ordering::Relaxed),
            dropped: shared.dropped.load(Ordering::Relaxed),
            export_failures: shared.export_failures.load(Ordering::Relaxed),
        }
    }

    /// Wait until everything submitted so far has been exported (or handed
    /// to the fallback). Returns false on timeout.
    pub async fn flush(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            let idle = {
                let queue = self.shared.lock();
                queue.is_empty() && self.shared.in_flight.load(Ordering::Acquire) == 0
            };
            if idle {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    /// Stop accepting records. The drain task exports what is queued, then
    /// exits.
    pub fn close(&self) {
        self.shared.closed.store(true, Ordering::Release);
        self.shared.notify.notify_one();
    }

    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::Acquire)
    }
}

async fn drain<T, S>(sink: S, shared: Arc<Shared<T>>)
where
    T: Serialize + Send + Sync + 'static,
    S: Sink<T>,
{
    let name = shared.options.name;
    loop {
        let batch = shared.take_batch();
        if batch.is_empty() {
            if shared.closed.load(Ordering::Acquire) {
                break;
            }
            shared.notify.notified().await;
            continue;
        }

        let count = batch.len();
        match sink.export(&batch).await {
            Ok(()) => {
                shared.exported.fetch_add(count as u64, Ordering::Relaxed);
                metrics::record_exported(name, count);
            }
            Err(e) => {
                shared.export_failures.fetch_add(1, Ordering::Relaxed);
                metrics::record_export_failure(name);
                tracing::warn!(
                    pipeline = name,
                    sink = sink.name(),
                    records = count,
                    error = %e,
                    "Sink export failed, writing batch to local fallback"
                );
                write_fallback(name, &batch);
            }
        }
        shared.in_flight.store(0, Ordering::Release);
    }

    tracing::debug!(pipeline = name, "Sink drain task finished");
}

/// Best-effort local stream for records a sink could not take.
fn write_fallback<T: Serialize>(pipeline: &'static str, batch: &[T]) {
    for record in batch {
        match serde_json::to_string(record) {
            Ok(line) => tracing::info!(target: "telemetry::fallback", pipeline, record = %line),
            Err(e) => tracing::error!(pipeline, error = %e, "Unserializable telemetry record dropped"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::memory::InMemorySink;

    fn options(capacity: usize, policy: BackpressurePolicy) -> DispatchOptions {
        DispatchOptions {
            name: "test",
            capacity,
            batch_size: 16,
            policy,
        }
    }

    #[tokio::test]
    async fn test_records_reach_sink() {
        let sink = InMemorySink::<u32>::new();
        let (dispatcher, handle) =
            Dispatcher::spawn(sink.clone(), options(64, BackpressurePolicy::DropNewest));

        for i in 0..40 {
            assert!(dispatcher.submit(i));
        }
        assert!(dispatcher.flush(Duration::from_secs(2)).await);
        assert_eq!(sink.records(), (0..40).collect::<Vec<_>>());

        dispatcher.close();
        handle.await.unwrap();
        assert_eq!(dispatcher.stats().exported, 40);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_drop_newest_when_full() {
        let sink = InMemorySink::<u32>::new();
        let (dispatcher, _handle) =
            Dispatcher::spawn(sink.clone(), options(3, BackpressurePolicy::DropNewest));

        // The drain task cannot run until this task yields.
        let accepted: Vec<bool> = (0..5).map(|i| dispatcher.submit(i)).collect();
        assert_eq!(accepted, vec![true, true, true, false, false]);

        assert!(dispatcher.flush(Duration::from_secs(2)).await);
        assert_eq!(sink.records(), vec![0, 1, 2]);
        assert_eq!(dispatcher.stats().dropped, 2);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_drop_oldest_when_full() {
        let sink = InMemorySink::<u32>::new();
        let (dispatcher, _handle) =
            Dispatcher::spawn(sink.clone(), options(3, BackpressurePolicy::DropOldest));

        for i in 0..5 {
            assert!(dispatcher.submit(i));
        }
        assert!(dispatcher.flush(Duration::from_secs(2)).await);
        assert_eq!(sink.records(), vec![2, 3, 4]);
        assert_eq!(dispatcher.stats().dropped, 2);
    }

    #[tokio::test]
    async fn test_failed_export_is_counted_not_propagated() {
        let sink = InMemorySink::<u32>::new();
        sink.set_failing(true);
        let (dispatcher, _handle) =
            Dispatcher::spawn(sink.clone(), options(8, BackpressurePolicy::DropNewest));

        assert!(dispatcher.submit(7));
        assert!(dispatcher.flush(Duration::from_secs(2)).await);
        assert!(sink.records().is_empty());
        assert_eq!(dispatcher.stats().export_failures, 1);
    }

    #[tokio::test]
    async fn test_closed_dispatcher_rejects() {
        let sink = InMemorySink::<u32>::new();
        let (dispatcher, handle) =
            Dispatcher::spawn(sink.clone(), options(8, BackpressurePolicy::DropNewest));
        dispatcher.submit(1);
        dispatcher.close();
        handle.await.unwrap();

        assert!(!dispatcher.submit(2));
        assert_eq!(sink.records(), vec![1]);
    }
}
