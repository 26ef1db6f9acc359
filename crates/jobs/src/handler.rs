//! Handler contract and the idempotent execution wrapper.

use std::time::Duration;

use tracing::{debug, warn};
use uuid::Uuid;

use matterflow_core::{CancellationToken, WorkError, WorkResult};

use crate::contract::{JobContract, JobOutcome};
use crate::idempotency::IdempotencyStore;
use crate::queue::JobQueue;

/// What one work step produced: its result plus the follow-on contracts
/// to publish for later stages.
///
/// Follow-ons are returned rather than sent inline so the wrapper can
/// apply one chaining policy everywhere: publish failures fail the
/// current job (retry-eligible) instead of silently breaking the
/// pipeline. A permanently-failed step may still return follow-ons when
/// enough partial data exists for the next stage to run on degraded
/// input.
pub struct StepResult {
    pub result: WorkResult<()>,
    pub follow_on: Vec<JobContract>,
}

impl StepResult {
    pub fn completed() -> Self {
        Self {
            result: Ok(()),
            follow_on: Vec::new(),
        }
    }

    pub fn completed_then(follow_on: Vec<JobContract>) -> Self {
        Self {
            result: Ok(()),
            follow_on,
        }
    }

    pub fn failed(error: WorkError) -> Self {
        Self {
            result: Err(error),
            follow_on: Vec::new(),
        }
    }

    pub fn failed_then(error: WorkError, follow_on: Vec<JobContract>) -> Self {
        Self {
            result: Err(error),
            follow_on,
        }
    }
}

/// The expensive work of one job type.
///
/// Implementations never see the dedup protocol: [`Idempotent`] wraps
/// every step with the is-processed / lease / mark-processed sequence.
#[async_trait::async_trait]
pub trait WorkStep: Send + Sync {
    fn job_type(&self) -> &'static str;

    /// Do the work. Must honor the cancellation token across external
    /// calls and is safe to invoke more than once per key (the transport
    /// is at-least-once).
    async fn run(&self, job: &JobContract, cancel: &CancellationToken) -> StepResult;

    /// Follow-on contracts required on *every* delivery, including ones
    /// where the work is skipped (dedupe hit or lock contention).
    /// Idempotency covers "did the expensive work run", not "was every
    /// chained enqueue re-confirmed" — downstream keys are derived
    /// independently, so re-publishing is safe.
    fn follow_on_when_skipped(&self, _job: &JobContract) -> Vec<JobContract> {
        Vec::new()
    }
}

/// A registered job handler: consumes one contract, returns one outcome.
#[async_trait::async_trait]
pub trait JobHandler: Send + Sync {
    fn job_type(&self) -> &'static str;

    async fn handle(&self, job: &JobContract, cancel: &CancellationToken) -> JobOutcome;
}

/// TTLs governing the idempotency records.
#[derive(Debug, Clone)]
pub struct IdempotencyConfig {
    /// How long the "this key completed" record is retained. Keys are
    /// content-derived, so reprocessing after expiry is safe.
    pub processed_ttl: Duration,
    /// Lease length; bounds how long a crashed worker blocks a key.
    pub lease_ttl: Duration,
}

impl Default for IdempotencyConfig {
    fn default() -> Self {
        Self {
            processed_ttl: Duration::from_secs(7 * 24 * 60 * 60),
            lease_ttl: Duration::from_secs(60),
        }
    }
}

/// Wraps a [`WorkStep`] with the idempotency protocol:
///
/// 1. `is_processed` — short-circuit to `Completed` on a hit (still
///    publishing the every-delivery follow-ons);
/// 2. `try_acquire_lock` — on contention, `Completed` without work and
///    without error;
/// 3. run the step;
/// 4. `mark_processed` only after the work succeeded;
/// 5. `release_lock` on every exit path.
///
/// A store failure in steps 1–2 fails the whole job as transient: work is
/// never attempted undeduped.
pub struct Idempotent<W, S, Q> {
    work: W,
    store: S,
    queue: Q,
    config: IdempotencyConfig,
    worker_id: String,
}

impl<W, S, Q> Idempotent<W, S, Q>
where
    W: WorkStep,
    S: IdempotencyStore,
    Q: JobQueue,
{
    pub fn new(work: W, store: S, queue: Q) -> Self {
        Self {
            work,
            store,
            queue,
            config: IdempotencyConfig::default(),
            worker_id: Uuid::now_v7().to_string(),
        }
    }

    pub fn with_config(mut self, config: IdempotencyConfig) -> Self {
        self.config = config;
        self
    }

    /// Publish the skipped-path follow-ons and complete.
    async fn complete_skipped(&self, job: &JobContract) -> JobOutcome {
        for follow in self.work.follow_on_when_skipped(job) {
            if let Err(e) = self.queue.send(follow).await {
                return JobOutcome::failed(job, WorkError::from(e).to_string());
            }
        }
        JobOutcome::short_circuited(job)
    }

    /// Steps 3–4, entered only with the lease held.
    async fn run_locked(&self, job: &JobContract, cancel: &CancellationToken) -> JobOutcome {
        let step = self.work.run(job, cancel).await;

        // Record completion before publishing the chain: if a publish
        // fails, the retry short-circuits to the skipped path and
        // republishes without redoing the expensive work.
        if step.result.is_ok() {
            if let Err(e) = self
                .store
                .mark_processed(&job.idempotency_key, self.config.processed_ttl)
                .await
            {
                return JobOutcome::failed(job, WorkError::from(e).to_string());
            }
        }

        // Chaining is attempted even when the step failed permanently:
        // partial failure of this stage must not silently cancel the next.
        for follow in step.follow_on {
            if let Err(e) = self.queue.send(follow).await {
                return JobOutcome::failed(job, WorkError::from(e).to_string());
            }
        }

        match step.result {
            Ok(()) => JobOutcome::completed(job),
            Err(e) => JobOutcome::from_work_error(job, &e),
        }
    }
}

#[async_trait::async_trait]
impl<W, S, Q> JobHandler for Idempotent<W, S, Q>
where
    W: WorkStep,
    S: IdempotencyStore,
    Q: JobQueue,
{
    fn job_type(&self) -> &'static str {
        self.work.job_type()
    }

    async fn handle(&self, job: &JobContract, cancel: &CancellationToken) -> JobOutcome {
        let key = job.idempotency_key.as_str();

        match self.store.is_processed(key).await {
            Err(e) => return JobOutcome::failed(job, WorkError::from(e).to_string()),
            Ok(true) => {
                debug!(
                    job_id = %job.job_id,
                    job_type = job.job_type(),
                    "key already processed, short-circuiting"
                );
                return self.complete_skipped(job).await;
            }
            Ok(false) => {}
        }

        match self
            .store
            .try_acquire_lock(key, &self.worker_id, self.config.lease_ttl)
            .await
        {
            Err(e) => return JobOutcome::failed(job, WorkError::from(e).to_string()),
            Ok(false) => {
                debug!(
                    job_id = %job.job_id,
                    job_type = job.job_type(),
                    "key leased by another worker, skipping"
                );
                return self.complete_skipped(job).await;
            }
            Ok(true) => {}
        }

        let outcome = self.run_locked(job, cancel).await;

        // Guaranteed release: success or failure, the lease never outlives
        // this invocation (beyond its own ttl on a crash).
        if let Err(e) = self.store.release_lock(key, &self.worker_id).await {
            warn!(
                job_id = %job.job_id,
                job_type = job.job_type(),
                error = %e,
                "failed to release idempotency lease"
            );
        }

        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract::{JobPayload, OutcomeStatus};
    use crate::idempotency::InMemoryIdempotencyStore;
    use crate::queue::InMemoryJobQueue;
    use matterflow_core::{CorrelationId, MatterId};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Scripted work step: runs count, a fixed result, optional chain.
    struct StubStep {
        runs: AtomicUsize,
        result: Box<dyn Fn() -> WorkResult<()> + Send + Sync>,
        follow_on: Vec<JobContract>,
        skipped_follow_on: Vec<JobContract>,
    }

    impl StubStep {
        fn succeeding() -> Self {
            Self {
                runs: AtomicUsize::new(0),
                result: Box::new(|| Ok(())),
                follow_on: Vec::new(),
                skipped_follow_on: Vec::new(),
            }
        }

        fn failing(error: WorkError) -> Self {
            Self {
                result: Box::new(move || Err(error.clone())),
                ..Self::succeeding()
            }
        }

        fn with_follow_on(mut self, jobs: Vec<JobContract>) -> Self {
            self.follow_on = jobs;
            self
        }

        fn with_skipped_follow_on(mut self, jobs: Vec<JobContract>) -> Self {
            self.skipped_follow_on = jobs;
            self
        }

        fn run_count(&self) -> usize {
            self.runs.load(Ordering::SeqCst)
        }
    }

    #[async_trait::async_trait]
    impl WorkStep for Arc<StubStep> {
        fn job_type(&self) -> &'static str {
            "profile_summary"
        }

        async fn run(&self, _job: &JobContract, _cancel: &CancellationToken) -> StepResult {
            self.runs.fetch_add(1, Ordering::SeqCst);
            StepResult {
                result: (self.result)(),
                follow_on: self.follow_on.clone(),
            }
        }

        fn follow_on_when_skipped(&self, _job: &JobContract) -> Vec<JobContract> {
            self.skipped_follow_on.clone()
        }
    }

    fn contract() -> JobContract {
        JobContract::new(
            MatterId::new(),
            CorrelationId::new(),
            JobPayload::ProfileSummary {
                playbook: "matter-profile".to_string(),
                document_version: 1,
                index_after: false,
            },
        )
    }

    fn chained_contract(subject: MatterId) -> JobContract {
        JobContract::new(
            subject,
            CorrelationId::new(),
            JobPayload::RagIndexing {
                document_version: 1,
                summary: None,
            },
        )
    }

    fn harness(
        step: Arc<StubStep>,
    ) -> (
        Idempotent<Arc<StubStep>, Arc<InMemoryIdempotencyStore>, Arc<InMemoryJobQueue>>,
        Arc<InMemoryIdempotencyStore>,
        Arc<InMemoryJobQueue>,
    ) {
        let store = Arc::new(InMemoryIdempotencyStore::new());
        let queue = Arc::new(InMemoryJobQueue::new());
        let handler = Idempotent::new(step, store.clone(), queue.clone());
        (handler, store, queue)
    }

    #[tokio::test]
    async fn second_delivery_short_circuits() {
        let step = Arc::new(StubStep::succeeding());
        let (handler, _store, _queue) = harness(step.clone());
        let job = contract();
        let cancel = CancellationToken::new();

        let first = handler.handle(&job, &cancel).await;
        assert_eq!(first.status, OutcomeStatus::Completed);
        assert!(!first.short_circuited);

        let second = handler.handle(&job.redelivered(), &cancel).await;
        assert_eq!(second.status, OutcomeStatus::Completed);
        assert!(second.short_circuited);

        // The expensive work ran at most once.
        assert_eq!(step.run_count(), 1);
    }

    #[tokio::test]
    async fn lock_contention_completes_without_work() {
        let step = Arc::new(StubStep::succeeding());
        let (handler, store, _queue) = harness(step.clone());
        let job = contract();

        // Another worker holds the lease.
        assert!(
            store
                .try_acquire_lock(&job.idempotency_key, "other-worker", Duration::from_secs(60))
                .await
                .unwrap()
        );

        let outcome = handler.handle(&job, &CancellationToken::new()).await;
        assert_eq!(outcome.status, OutcomeStatus::Completed);
        assert!(outcome.short_circuited);
        assert_eq!(step.run_count(), 0);

        // The other worker's lease is untouched.
        assert_eq!(
            store.lease_owner(&job.idempotency_key).as_deref(),
            Some("other-worker")
        );
    }

    #[tokio::test]
    async fn store_outage_fails_the_job_without_working() {
        let step = Arc::new(StubStep::succeeding());
        let (handler, store, _queue) = harness(step.clone());
        store.inject_failures(1);

        let outcome = handler.handle(&contract(), &CancellationToken::new()).await;
        assert_eq!(outcome.status, OutcomeStatus::Failed);
        assert_eq!(step.run_count(), 0);
    }

    #[tokio::test]
    async fn transient_work_error_fails() {
        let step = Arc::new(StubStep::failing(WorkError::timeout("backend")));
        let (handler, store, _queue) = harness(step.clone());
        let job = contract();

        let outcome = handler.handle(&job, &CancellationToken::new()).await;
        assert_eq!(outcome.status, OutcomeStatus::Failed);

        // Not marked processed: the retry does the work again.
        assert!(!store.is_processed(&job.idempotency_key).await.unwrap());
        // And the lease is released for it.
        assert!(store.lease_owner(&job.idempotency_key).is_none());
    }

    #[tokio::test]
    async fn permanent_work_error_poisons() {
        let step = Arc::new(StubStep::failing(WorkError::not_found("matter")));
        let (handler, _store, _queue) = harness(step.clone());

        let outcome = handler.handle(&contract(), &CancellationToken::new()).await;
        assert_eq!(outcome.status, OutcomeStatus::Poisoned);
    }

    #[tokio::test]
    async fn permanent_failure_still_publishes_the_chain() {
        let subject = MatterId::new();
        let follow = chained_contract(subject);
        let step = Arc::new(
            StubStep::failing(WorkError::malformed("unparseable document"))
                .with_follow_on(vec![follow.clone()]),
        );
        let (handler, _store, queue) = harness(step.clone());

        let outcome = handler.handle(&contract(), &CancellationToken::new()).await;
        assert_eq!(outcome.status, OutcomeStatus::Poisoned);

        let published = queue.pop().expect("follow-on enqueued despite poison");
        assert_eq!(published.idempotency_key, follow.idempotency_key);
    }

    #[tokio::test]
    async fn chaining_publish_failure_fails_the_job() {
        let follow = chained_contract(MatterId::new());
        let step = Arc::new(StubStep::succeeding().with_follow_on(vec![follow]));
        let (handler, store, queue) = harness(step.clone());
        let job = contract();
        queue.inject_send_failures(1);

        let outcome = handler.handle(&job, &CancellationToken::new()).await;
        assert_eq!(outcome.status, OutcomeStatus::Failed);

        // Work itself completed and was recorded; the retry republishes
        // from the skipped path without redoing it.
        assert!(store.is_processed(&job.idempotency_key).await.unwrap());
        assert_eq!(step.run_count(), 1);
    }

    #[tokio::test]
    async fn skipped_path_republishes_follow_ons() {
        let subject = MatterId::new();
        let follow = chained_contract(subject);
        let step = Arc::new(
            StubStep::succeeding().with_skipped_follow_on(vec![follow.clone()]),
        );
        let (handler, store, queue) = harness(step.clone());
        let job = contract();

        store
            .mark_processed(&job.idempotency_key, Duration::from_secs(600))
            .await
            .unwrap();

        let outcome = handler.handle(&job, &CancellationToken::new()).await;
        assert_eq!(outcome.status, OutcomeStatus::Completed);
        assert!(outcome.short_circuited);
        assert_eq!(step.run_count(), 0);

        let published = queue.pop().expect("chain published on the skipped path");
        assert_eq!(published.idempotency_key, follow.idempotency_key);
    }

    #[tokio::test]
    async fn lease_is_released_after_success() {
        let step = Arc::new(StubStep::succeeding());
        let (handler, store, _queue) = harness(step);
        let job = contract();

        handler.handle(&job, &CancellationToken::new()).await;
        assert!(store.lease_owner(&job.idempotency_key).is_none());
    }
}
