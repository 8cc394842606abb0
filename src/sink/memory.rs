//! In-memory sink for tests and local inspection.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use super::{Sink, SinkError};

/// Collects exported records in memory. Clones share storage.
#[derive(Debug)]
pub struct InMemorySink<T> {
    records: Arc<Mutex<Vec<T>>>,
    failing: Arc<AtomicBool>,
}

impl<T> Clone for InMemorySink<T> {
    fn clone(&self) -> Self {
        Self {
            records: Arc::clone(&self.records),
            failing: Arc::clone(&self.failing),
        }
    }
}

impl<T> Default for InMemorySink<T> {
    fn default() -> Self {
        Self {
            records: Arc::new(Mutex::new(Vec::new())),
            failing: Arc::new(AtomicBool::new(false)),
        }
    }
}

impl<T: Clone> InMemorySink<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of everything exported so far.
    pub fn records(&self) -> Vec<T> {
        self.records.lock().expect("memory sink mutex poisoned").clone()
    }

    pub fn len(&self) -> usize {
        self.records.lock().expect("memory sink mutex poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Simulate an unreachable backend: exports fail while set.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::Release);
    }

    /// Poll until at least `count` records arrived. Returns false on timeout.
    pub async fn wait_for(&self, count: usize, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while self.len() < count {
            if Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        true
    }
}

impl<T> Sink<T> for InMemorySink<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn export(&self, batch: &[T]) -> Result<(), SinkError> {
        if self.failing.load(Ordering::Acquire) {
            return Err(SinkError::Unavailable("memory sink set to fail".to_string()));
        }
        self.records
            .lock()
            .expect("memory sink mutex poisoned")
            .extend_from_slice(batch);
        Ok(())
    }
}
