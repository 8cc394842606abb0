//! In-process message broker.
//!
//! Stands in for the external broker: messages cross it as encoded envelope
//! bytes, so producers and consumers exercise the same wire form they would
//! against RabbitMQ.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tokio::sync::{mpsc, Mutex};

use super::envelope::{EnvelopeError, QueueEnvelope};

#[derive(Debug, Error)]
pub enum QueueError {
    #[error(transparent)]
    Envelope(#[from] EnvelopeError),

    #[error("queue is full, task '{task}' rejected")]
    Full { task: String },

    #[error("queue is closed")]
    Closed,
}

/// Bounded FIFO of encoded envelopes. Clones share the queue.
#[derive(Clone)]
pub struct InProcessBroker {
    tx: mpsc::Sender<Vec<u8>>,
    rx: Arc<Mutex<mpsc::Receiver<Vec<u8>>>>,
    capacity: usize,
    published: Arc<AtomicU64>,
}

impl InProcessBroker {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (tx, rx) = mpsc::channel(capacity);
        Self {
            tx,
            rx: Arc::new(Mutex::new(rx)),
            capacity,
            published: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Encode and enqueue without waiting. A full queue is an error for the
    /// producer to handle.
    pub fn publish<P: Serialize>(&self, envelope: &QueueEnvelope<P>) -> Result<(), QueueError> {
        let bytes = envelope.encode()?;
        match self.tx.try_send(bytes) {
            Ok(()) => {
                self.published.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(
                    task = %envelope.task,
                    task_id = %envelope.task_id,
                    "Task published"
                );
                Ok(())
            }
            Err(mpsc::error::TrySendError::Full(_)) => Err(QueueError::Full {
                task: envelope.task.clone(),
            }),
            Err(mpsc::error::TrySendError::Closed(_)) => Err(QueueError::Closed),
        }
    }

    /// Wait for the next message. `None` once every sender is gone.
    pub async fn receive(&self) -> Option<Vec<u8>> {
        self.rx.lock().await.recv().await
    }

    /// Next message if one is already queued.
    pub async fn try_receive(&self) -> Option<Vec<u8>> {
        self.rx.lock().await.try_recv().ok()
    }

    /// Messages waiting to be consumed.
    pub fn depth(&self) -> usize {
        self.capacity - self.tx.capacity()
    }

    pub fn published(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }
}
