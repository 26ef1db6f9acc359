//! Idempotency store: processed markers and per-key leases.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use thiserror::Error;

use matterflow_core::WorkError;

/// Idempotency store operation error.
///
/// Always infrastructure trouble: a handler that cannot reach the store
/// fails the whole job as transient rather than doing work undeduped.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IdempotencyStoreError {
    #[error("idempotency store unavailable: {0}")]
    Unavailable(String),
}

impl From<IdempotencyStoreError> for WorkError {
    fn from(e: IdempotencyStoreError) -> Self {
        match e {
            IdempotencyStoreError::Unavailable(msg) => WorkError::unavailable(msg),
        }
    }
}

/// Durable key/value store answering "has this key been processed" plus a
/// short-lived distributed lock per key.
///
/// Invariant: a key is in exactly one of three states at any instant —
/// unlocked-and-unprocessed, locked-in-flight, or marked-processed. A
/// lock record and a processed record never coexist:
/// [`mark_processed`](IdempotencyStore::mark_processed) atomically
/// replaces the caller's lease with the processed marker.
#[async_trait::async_trait]
pub trait IdempotencyStore: Send + Sync {
    /// Fast check: has this key already completed its expensive work?
    async fn is_processed(&self, key: &str) -> Result<bool, IdempotencyStoreError>;

    /// Try to take the exclusive, time-bounded lease on a key. `false`
    /// means another live owner holds it. Expired leases are reclaimable
    /// (crash recovery).
    async fn try_acquire_lock(
        &self,
        key: &str,
        owner: &str,
        ttl: Duration,
    ) -> Result<bool, IdempotencyStoreError>;

    /// Record completion. The dedup record is retained for `ttl`; keys
    /// are content-derived, so reprocessing after expiry is safe.
    async fn mark_processed(&self, key: &str, ttl: Duration)
    -> Result<(), IdempotencyStoreError>;

    /// Drop the lease if `owner` still holds it. Called on every exit
    /// path, success or failure, so a crashed worker never blocks the key
    /// beyond the lease's own ttl.
    async fn release_lock(&self, key: &str, owner: &str) -> Result<(), IdempotencyStoreError>;
}

#[async_trait::async_trait]
impl<S> IdempotencyStore for Arc<S>
where
    S: IdempotencyStore + ?Sized,
{
    async fn is_processed(&self, key: &str) -> Result<bool, IdempotencyStoreError> {
        (**self).is_processed(key).await
    }

    async fn try_acquire_lock(
        &self,
        key: &str,
        owner: &str,
        ttl: Duration,
    ) -> Result<bool, IdempotencyStoreError> {
        (**self).try_acquire_lock(key, owner, ttl).await
    }

    async fn mark_processed(
        &self,
        key: &str,
        ttl: Duration,
    ) -> Result<(), IdempotencyStoreError> {
        (**self).mark_processed(key, ttl).await
    }

    async fn release_lock(&self, key: &str, owner: &str) -> Result<(), IdempotencyStoreError> {
        (**self).release_lock(key, owner).await
    }
}

#[derive(Debug, Clone)]
struct Lease {
    owner: String,
    expires_at: Instant,
}

#[derive(Debug, Default)]
struct State {
    processed: HashMap<String, Instant>,
    leases: HashMap<String, Lease>,
}

/// In-memory [`IdempotencyStore`] double.
///
/// Tests can make the next N calls fail `Unavailable` to exercise the
/// "never work undeduped" failure policy.
#[derive(Debug, Default)]
pub struct InMemoryIdempotencyStore {
    state: RwLock<State>,
    failures_to_inject: AtomicU32,
}

impl InMemoryIdempotencyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// The next `n` store calls fail with `Unavailable`.
    pub fn inject_failures(&self, n: u32) {
        self.failures_to_inject.store(n, Ordering::SeqCst);
    }

    fn check_injected(&self) -> Result<(), IdempotencyStoreError> {
        let injected = self
            .failures_to_inject
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            Err(IdempotencyStoreError::Unavailable(
                "injected outage".to_string(),
            ))
        } else {
            Ok(())
        }
    }

    /// Current lease owner for a key, if the lease is live (test hook).
    pub fn lease_owner(&self, key: &str) -> Option<String> {
        let state = self.state.read().unwrap();
        state
            .leases
            .get(key)
            .filter(|l| l.expires_at > Instant::now())
            .map(|l| l.owner.clone())
    }
}

#[async_trait::async_trait]
impl IdempotencyStore for InMemoryIdempotencyStore {
    async fn is_processed(&self, key: &str) -> Result<bool, IdempotencyStoreError> {
        self.check_injected()?;
        let mut state = self.state.write().unwrap();
        match state.processed.get(key) {
            Some(expires_at) if *expires_at > Instant::now() => Ok(true),
            Some(_) => {
                // Dedup record aged out; the key is reprocessable.
                state.processed.remove(key);
                Ok(false)
            }
            None => Ok(false),
        }
    }

    async fn try_acquire_lock(
        &self,
        key: &str,
        owner: &str,
        ttl: Duration,
    ) -> Result<bool, IdempotencyStoreError> {
        self.check_injected()?;
        let mut state = self.state.write().unwrap();
        let now = Instant::now();
        if let Some(lease) = state.leases.get(key) {
            if lease.expires_at > now {
                return Ok(false);
            }
        }
        state.leases.insert(
            key.to_string(),
            Lease {
                owner: owner.to_string(),
                expires_at: now + ttl,
            },
        );
        Ok(true)
    }

    async fn mark_processed(
        &self,
        key: &str,
        ttl: Duration,
    ) -> Result<(), IdempotencyStoreError> {
        self.check_injected()?;
        let mut state = self.state.write().unwrap();
        // One atomic transition: lease out, processed marker in.
        state.leases.remove(key);
        state.processed.insert(key.to_string(), Instant::now() + ttl);
        Ok(())
    }

    async fn release_lock(&self, key: &str, owner: &str) -> Result<(), IdempotencyStoreError> {
        self.check_injected()?;
        let mut state = self.state.write().unwrap();
        if state.leases.get(key).is_some_and(|l| l.owner == owner) {
            state.leases.remove(key);
        }
        Ok(())
    }
}
