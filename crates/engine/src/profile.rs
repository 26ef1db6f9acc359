//! Profile-summary work step: AI extraction over a matter's documents.

use serde_json::json;
use tracing::debug;

use matterflow_ai::{ExtractionBackend, truncate_with_marker};
use matterflow_core::{CancellationToken, MatterId, WorkError};
use matterflow_jobs::{JobContract, JobPayload, StepResult, WorkStep};
use matterflow_records::{Fields, RecordStore, RetryPolicy, update_with_retry};

use crate::schema::{
    MATTER_ENTITY, SUMMARY_CONFIDENCE_FIELD, SUMMARY_FIELD, SUMMARY_MAX_CHARS,
};

/// Runs the extraction playbook against the subject matter, stores the
/// truncated summary on the matter record, and optionally chains a
/// RAG-indexing stage.
///
/// The indexing stage is chained even when extraction fails with partial
/// facts: a degraded summary is still worth indexing, and the chained
/// job's key is derived independently of this one.
pub struct ProfileSummaryStep<B, S> {
    backend: B,
    store: S,
    policy: RetryPolicy,
}

impl<B, S> ProfileSummaryStep<B, S>
where
    B: ExtractionBackend,
    S: RecordStore,
{
    pub fn new(backend: B, store: S) -> Self {
        Self {
            backend,
            store,
            policy: RetryPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    fn indexing_job(
        job: &JobContract,
        document_version: u64,
        summary: Option<String>,
    ) -> JobContract {
        JobContract::new(
            job.subject_id,
            job.correlation_id,
            JobPayload::RagIndexing {
                document_version,
                summary,
            },
        )
    }

    async fn store_summary(
        &self,
        subject: MatterId,
        summary: &str,
        confidence: f64,
        cancel: &CancellationToken,
    ) -> Result<(), WorkError> {
        update_with_retry(
            &self.store,
            MATTER_ENTITY,
            subject,
            &self.policy,
            cancel,
            |_record| {
                let mut fields = Fields::new();
                fields.insert(SUMMARY_FIELD.to_string(), json!(summary));
                fields.insert(SUMMARY_CONFIDENCE_FIELD.to_string(), json!(confidence));
                Ok(fields)
            },
        )
        .await
        .map(|_| ())
    }
}

#[async_trait::async_trait]
impl<B, S> WorkStep for ProfileSummaryStep<B, S>
where
    B: ExtractionBackend,
    S: RecordStore,
{
    fn job_type(&self) -> &'static str {
        "profile_summary"
    }

    async fn run(&self, job: &JobContract, cancel: &CancellationToken) -> StepResult {
        let JobPayload::ProfileSummary {
            playbook,
            document_version,
            index_after,
        } = &job.payload
        else {
            return StepResult::failed(WorkError::malformed(
                "payload is not a profile-summary job",
            ));
        };
        if let Err(e) = cancel.check() {
            return StepResult::failed(e);
        }

        match self.backend.analyze(job.subject_id, playbook, cancel).await {
            Ok(facts) => {
                let summary = truncate_with_marker(
                    facts.summary.as_deref().unwrap_or_default(),
                    SUMMARY_MAX_CHARS,
                );
                let follow = if *index_after {
                    vec![Self::indexing_job(job, *document_version, Some(summary.clone()))]
                } else {
                    Vec::new()
                };
                match self
                    .store_summary(job.subject_id, &summary, facts.confidence, cancel)
                    .await
                {
                    Ok(()) => StepResult::completed_then(follow),
                    // The summary exists even though the write failed, so
                    // the chain still goes out with it.
                    Err(e) => StepResult::failed_then(e, follow),
                }
            }
            Err(e) => {
                let partial_summary = e
                    .partial_facts()
                    .and_then(|facts| facts.summary.as_deref())
                    .map(|s| truncate_with_marker(s, SUMMARY_MAX_CHARS));
                let follow = match (&partial_summary, index_after) {
                    (Some(summary), true) => {
                        debug!(
                            subject_id = %job.subject_id,
                            "extraction failed with partial facts, chaining indexing on degraded input"
                        );
                        vec![Self::indexing_job(job, *document_version, Some(summary.clone()))]
                    }
                    _ => Vec::new(),
                };
                StepResult::failed_then(WorkError::from(e), follow)
            }
        }
    }

    fn follow_on_when_skipped(&self, job: &JobContract) -> Vec<JobContract> {
        // The summary was stored by whichever delivery did the work; the
        // indexing job reads it back from the record.
        match &job.payload {
            JobPayload::ProfileSummary {
                document_version,
                index_after: true,
                ..
            } => vec![Self::indexing_job(job, *document_version, None)],
            _ => Vec::new(),
        }
    }
}
