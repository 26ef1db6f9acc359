//! Queue transport boundary.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use thiserror::Error;

use matterflow_core::WorkError;

use crate::contract::JobContract;

/// Queue transport error.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum QueueError {
    #[error("queue unavailable: {0}")]
    Unavailable(String),
}

impl From<QueueError> for WorkError {
    fn from(e: QueueError) -> Self {
        match e {
            // Losing a chained publish breaks the pipeline, so it fails
            // the current job as transient and gets retried.
            QueueError::Unavailable(msg) => WorkError::unavailable(msg),
        }
    }
}

/// At-least-once queue transport.
///
/// Delivery, visibility timeouts, and redelivery are the transport's
/// concern; the engine only sends.
#[async_trait::async_trait]
pub trait JobQueue: Send + Sync {
    async fn send(&self, job: JobContract) -> Result<(), QueueError>;
}

#[async_trait::async_trait]
impl<Q> JobQueue for Arc<Q>
where
    Q: JobQueue + ?Sized,
{
    async fn send(&self, job: JobContract) -> Result<(), QueueError> {
        (**self).send(job).await
    }
}

/// A contract parked after exhausting retries (or poisoning).
#[derive(Debug, Clone, PartialEq)]
pub struct DeadLetterEntry {
    pub job: JobContract,
    pub dead_lettered_at: DateTime<Utc>,
    pub reason: String,
}

impl DeadLetterEntry {
    pub fn new(job: JobContract, reason: impl Into<String>) -> Self {
        Self {
            job,
            dead_lettered_at: Utc::now(),
            reason: reason.into(),
        }
    }
}

/// In-memory queue double for tests/dev.
///
/// FIFO; tests drive redelivery explicitly via [`pop`](Self::pop) and
/// [`InMemoryJobQueue::dead_letter`]. Send failures can be injected to
/// exercise the chaining failure policy.
#[derive(Debug, Default)]
pub struct InMemoryJobQueue {
    pending: Mutex<VecDeque<JobContract>>,
    dead_letters: Mutex<Vec<DeadLetterEntry>>,
    send_failures_to_inject: AtomicU32,
}

impl InMemoryJobQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// The next `n` sends fail with `Unavailable`.
    pub fn inject_send_failures(&self, n: u32) {
        self.send_failures_to_inject.store(n, Ordering::SeqCst);
    }

    /// Take the next pending contract (transport delivery in tests).
    pub fn pop(&self) -> Option<JobContract> {
        self.pending.lock().unwrap().pop_front()
    }

    pub fn pending_count(&self) -> usize {
        self.pending.lock().unwrap().len()
    }

    pub fn dead_letter(&self, job: JobContract, reason: impl Into<String>) {
        self.dead_letters
            .lock()
            .unwrap()
            .push(DeadLetterEntry::new(job, reason));
    }

    pub fn dead_letters(&self) -> Vec<DeadLetterEntry> {
        self.dead_letters.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl JobQueue for InMemoryJobQueue {
    async fn send(&self, job: JobContract) -> Result<(), QueueError> {
        let injected = self
            .send_failures_to_inject
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            return Err(QueueError::Unavailable("injected outage".to_string()));
        }
        self.pending.lock().unwrap().push_back(job);
        Ok(())
    }
}
