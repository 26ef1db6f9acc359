//! RAG-indexing work step: pushes the matter summary into the search index.

use tracing::debug;

use matterflow_core::{CancellationToken, WorkError};
use matterflow_jobs::{JobContract, JobPayload, StepResult, WorkStep};
use matterflow_records::RecordStore;

use crate::index::SearchIndex;
use crate::schema::{MATTER_ENTITY, SUMMARY_FIELD};

/// Indexes the summary carried in the payload, or falls back to the one
/// stored on the matter record (the degraded path after a skipped or
/// partially-failed upstream stage).
pub struct RagIndexingStep<I, S> {
    index: I,
    store: S,
}

impl<I, S> RagIndexingStep<I, S>
where
    I: SearchIndex,
    S: RecordStore,
{
    pub fn new(index: I, store: S) -> Self {
        Self { index, store }
    }
}

#[async_trait::async_trait]
impl<I, S> WorkStep for RagIndexingStep<I, S>
where
    I: SearchIndex,
    S: RecordStore,
{
    fn job_type(&self) -> &'static str {
        "rag_indexing"
    }

    async fn run(&self, job: &JobContract, cancel: &CancellationToken) -> StepResult {
        let JobPayload::RagIndexing {
            document_version,
            summary,
        } = &job.payload
        else {
            return StepResult::failed(WorkError::malformed(
                "payload is not a rag-indexing job",
            ));
        };
        if let Err(e) = cancel.check() {
            return StepResult::failed(e);
        }

        let text = match summary {
            Some(text) => text.clone(),
            None => {
                let record = match self
                    .store
                    .get(MATTER_ENTITY, job.subject_id, cancel)
                    .await
                {
                    Ok(record) => record,
                    Err(e) => return StepResult::failed(e.into()),
                };
                match record.str_field(SUMMARY_FIELD) {
                    Some(text) => text.to_string(),
                    None => {
                        // Upstream never produced a summary; there is
                        // nothing to index and nothing to retry.
                        debug!(
                            subject_id = %job.subject_id,
                            "matter has no stored summary, skipping index write"
                        );
                        return StepResult::completed();
                    }
                }
            }
        };

        match self
            .index
            .upsert(job.subject_id, *document_version, &text, cancel)
            .await
        {
            Ok(()) => StepResult::completed(),
            Err(e) => StepResult::failed(e.into()),
        }
    }
}
