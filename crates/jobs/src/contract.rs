//! Job contract and outcome model.

use serde::{Deserialize, Serialize};

use matterflow_core::{CorrelationId, ErrorClass, JobId, MatterId, WorkError, classify};

use crate::key::derive_idempotency_key;

/// Default delivery ceiling before a failing job dead-letters.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Typed, job-type-specific payload.
///
/// Tagged union keyed by the job type: the envelope stays generic while
/// each stage gets a concrete shape, deserialized only after the tag is
/// read. No stringly-typed dictionaries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "job_type", rename_all = "snake_case")]
pub enum JobPayload {
    /// AI content extraction over the subject document set.
    ProfileSummary {
        /// Extraction playbook the backend runs.
        playbook: String,
        /// Content identity; bumps on every document change.
        document_version: u64,
        /// Whether to chain a RAG-indexing stage afterwards.
        index_after: bool,
    },
    /// Search-index refresh for the subject's extracted content.
    RagIndexing {
        document_version: u64,
        /// Summary text to index; `None` means read it from the record.
        summary: Option<String>,
    },
    /// Recompute the matter's financial totals from billing children.
    FinancialRollup {
        /// Bumps whenever the billing line items change.
        rollup_version: u64,
    },
}

impl JobPayload {
    /// Discriminator string selecting the handler.
    pub fn job_type(&self) -> &'static str {
        match self {
            JobPayload::ProfileSummary { .. } => "profile_summary",
            JobPayload::RagIndexing { .. } => "rag_indexing",
            JobPayload::FinancialRollup { .. } => "financial_rollup",
        }
    }

    /// Content identity feeding the idempotency key.
    pub fn content_version(&self) -> u64 {
        match self {
            JobPayload::ProfileSummary {
                document_version, ..
            } => *document_version,
            JobPayload::RagIndexing {
                document_version, ..
            } => *document_version,
            JobPayload::FinancialRollup { rollup_version } => *rollup_version,
        }
    }
}

/// One unit of dispatched work: the immutable queue envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobContract {
    pub job_id: JobId,
    pub subject_id: MatterId,
    /// Propagated end-to-end for tracing across chained jobs.
    pub correlation_id: CorrelationId,
    /// Deterministic key for the logical unit of work; stable across
    /// redelivery. Two contracts with the same key are the same work.
    pub idempotency_key: String,
    /// Current delivery count (1 on first delivery).
    pub attempt: u32,
    pub max_attempts: u32,
    #[serde(flatten)]
    pub payload: JobPayload,
}

impl JobContract {
    /// Build a contract for new logical work. The idempotency key is
    /// derived, never random.
    pub fn new(subject_id: MatterId, correlation_id: CorrelationId, payload: JobPayload) -> Self {
        let idempotency_key = derive_idempotency_key(
            payload.job_type(),
            subject_id,
            payload.content_version(),
        );
        Self {
            job_id: JobId::new(),
            subject_id,
            correlation_id,
            idempotency_key,
            attempt: 1,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            payload,
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn job_type(&self) -> &'static str {
        self.payload.job_type()
    }

    /// The redelivered copy of this contract. Same logical work, same
    /// key; only the delivery count moves.
    pub fn redelivered(&self) -> Self {
        let mut next = self.clone();
        next.attempt += 1;
        next
    }
}

/// Terminal status of one handler invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeStatus {
    /// Work done (or safely skipped); ack the message.
    Completed,
    /// Transient failure; retry-eligible up to `max_attempts`.
    Failed,
    /// Permanent failure; dead-letter, never retry.
    Poisoned,
}

/// Result of executing one [`JobContract`].
///
/// Created fresh by every handler invocation and never persisted; the
/// idempotency store records only the fact that a key completed.
#[derive(Debug, Clone, PartialEq)]
pub struct JobOutcome {
    pub job_id: JobId,
    pub job_type: &'static str,
    pub status: OutcomeStatus,
    pub error: Option<String>,
    /// True when the handler completed without doing the work (dedupe hit
    /// or lock contention). Queue-visible behavior is identical to a real
    /// completion; telemetry keeps the two apart.
    pub short_circuited: bool,
}

impl JobOutcome {
    pub fn completed(job: &JobContract) -> Self {
        Self {
            job_id: job.job_id,
            job_type: job.job_type(),
            status: OutcomeStatus::Completed,
            error: None,
            short_circuited: false,
        }
    }

    pub fn short_circuited(job: &JobContract) -> Self {
        Self {
            short_circuited: true,
            ..Self::completed(job)
        }
    }

    pub fn failed(job: &JobContract, error: impl Into<String>) -> Self {
        Self {
            job_id: job.job_id,
            job_type: job.job_type(),
            status: OutcomeStatus::Failed,
            error: Some(error.into()),
            short_circuited: false,
        }
    }

    pub fn poisoned(job: &JobContract, error: impl Into<String>) -> Self {
        Self {
            job_id: job.job_id,
            job_type: job.job_type(),
            status: OutcomeStatus::Poisoned,
            error: Some(error.into()),
            short_circuited: false,
        }
    }

    /// Classify a work-step error into an outcome. The single place the
    /// transient/permanent decision is made.
    pub fn from_work_error(job: &JobContract, error: &WorkError) -> Self {
        match classify(error) {
            ErrorClass::Transient => Self::failed(job, error.to_string()),
            ErrorClass::Permanent => Self::poisoned(job, error.to_string()),
        }
    }
}
