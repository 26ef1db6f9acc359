//! Optimistic-concurrency aggregate update helper.

use std::time::Duration;

use tracing::debug;

use matterflow_core::{CancellationToken, MatterId, WorkError, WorkResult};

use crate::store::{Etag, Fields, RecordStore, RecordStoreError, VersionedRecord};

/// Bounded retry policy with exponential backoff.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum write attempts (including the first).
    pub max_attempts: u32,
    /// Base delay before the second attempt.
    pub base_delay: Duration,
    /// Cap on any single delay.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_millis(50),
            max_delay: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
            max_delay,
        }
    }

    /// Delay before retry number `attempt` (1-indexed): base * 2^(attempt-1), capped.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        let pow = 1u32 << attempt.saturating_sub(1).min(16);
        let ms = self.base_delay.as_millis().saturating_mul(pow as u128);
        Duration::from_millis(ms.min(self.max_delay.as_millis()) as u64)
    }
}

/// Read-compute-write with conflict retry.
///
/// `compute` receives the record as read on *this* attempt, so a value
/// written after a conflict is always derived from a read made strictly
/// after the previous writer's commit — never from stale data. Supports
/// both recalculate-from-children and increment-by-delta callers; the
/// operation mode lives entirely in the closure.
///
/// Exhausting the retry budget surfaces as [`WorkError::Conflict`], which
/// classifies as transient so the job itself is retried.
pub async fn update_with_retry<S, F>(
    store: &S,
    entity_type: &str,
    id: MatterId,
    policy: &RetryPolicy,
    cancel: &CancellationToken,
    compute: F,
) -> WorkResult<Etag>
where
    S: RecordStore + ?Sized,
    F: Fn(&VersionedRecord) -> WorkResult<Fields> + Send + Sync,
{
    let mut attempt: u32 = 0;
    loop {
        attempt += 1;
        cancel.check()?;

        let record = store.get(entity_type, id, cancel).await.map_err(WorkError::from)?;
        let fields = compute(&record)?;

        match store
            .update(entity_type, id, fields, record.etag, cancel)
            .await
        {
            Ok(etag) => return Ok(etag),
            Err(RecordStoreError::Conflict { .. }) if attempt < policy.max_attempts => {
                debug!(%entity_type, %id, attempt, "aggregate write conflicted, retrying");
                tokio::time::sleep(policy.delay_for_attempt(attempt)).await;
            }
            Err(e) => return Err(e.into()),
        }
    }
}

/// Increment-by-delta compute closure for [`update_with_retry`].
pub fn increment_field(
    field: &str,
    delta: i64,
) -> impl Fn(&VersionedRecord) -> WorkResult<Fields> + Send + Sync + use<> {
    let field = field.to_string();
    move |record: &VersionedRecord| {
        let current = record.i64_field(&field).unwrap_or(0);
        let mut fields = Fields::new();
        fields.insert(field.clone(), serde_json::json!(current + delta));
        Ok(fields)
    }
}
