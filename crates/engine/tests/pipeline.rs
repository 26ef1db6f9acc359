//! End-to-end pipeline tests: queue in, dispatcher, chained stages,
//! records and index out. The in-memory queue double plays the transport,
//! with the test loop driving redelivery the way a broker would.

use std::sync::Arc;

use serde_json::json;

use matterflow_ai::{ExtractionError, ScriptedExtraction, StructuredFacts};
use matterflow_core::{CancellationToken, CorrelationId, MatterId};
use matterflow_engine::schema::{
    AMOUNT_FIELD, BILLING_EVENT_ENTITY, BUDGET_FIELD, MATTER_ENTITY, OCCURRED_ON_FIELD,
    SPEND_FIELD, SUMMARY_FIELD,
};
use matterflow_engine::{InMemorySearchIndex, handler_registry};
use matterflow_jobs::{
    Dispatcher, InMemoryIdempotencyStore, InMemoryJobQueue, InMemoryTelemetry, JobContract,
    JobPayload, JobQueue, QueueAction, TelemetryLabel,
};
use matterflow_records::RecordStore;
use matterflow_records::memory::PARENT_FIELD;
use matterflow_records::{Fields, InMemoryRecordStore};

struct Pipeline {
    dispatcher: Dispatcher<Arc<InMemoryTelemetry>>,
    backend: Arc<ScriptedExtraction>,
    store: Arc<InMemoryRecordStore>,
    index: Arc<InMemorySearchIndex>,
    queue: Arc<InMemoryJobQueue>,
    telemetry: Arc<InMemoryTelemetry>,
}

fn pipeline() -> Pipeline {
    matterflow_observability::init_pretty();
    let backend = Arc::new(ScriptedExtraction::new());
    let store = Arc::new(InMemoryRecordStore::new());
    let index = Arc::new(InMemorySearchIndex::new());
    let dedup = Arc::new(InMemoryIdempotencyStore::new());
    let queue = Arc::new(InMemoryJobQueue::new());
    let telemetry = Arc::new(InMemoryTelemetry::new());

    let registry = handler_registry(
        backend.clone(),
        store.clone(),
        index.clone(),
        dedup,
        queue.clone(),
    );
    Pipeline {
        dispatcher: Dispatcher::new(registry, telemetry.clone()),
        backend,
        store,
        index,
        queue,
        telemetry,
    }
}

/// Drive the queue to empty, redelivering on `Retry` and parking on
/// `DeadLetter` the way the transport would.
async fn drain(p: &Pipeline, cancel: &CancellationToken) {
    while let Some(job) = p.queue.pop() {
        match p.dispatcher.dispatch(&job, cancel).await {
            QueueAction::Ack => {}
            QueueAction::Retry => p.queue.send(job.redelivered()).await.unwrap(),
            QueueAction::DeadLetter => p.queue.dead_letter(job, "dead-lettered by dispatcher"),
        }
    }
}

fn profile_job(subject: MatterId) -> JobContract {
    JobContract::new(
        subject,
        CorrelationId::new(),
        JobPayload::ProfileSummary {
            playbook: "matter-profile".to_string(),
            document_version: 1,
            index_after: true,
        },
    )
}

#[tokio::test]
async fn profile_job_chains_into_the_index() {
    let p = pipeline();
    let subject = MatterId::new();
    let cancel = CancellationToken::new();
    p.store.insert(MATTER_ENTITY, subject, Fields::new());
    p.backend.script(
        subject,
        Ok(StructuredFacts::new(0.9).with_summary("Vendor dispute, delivery milestones missed.")),
    );

    p.queue.send(profile_job(subject)).await.unwrap();
    drain(&p, &cancel).await;

    let record = p.store.get(MATTER_ENTITY, subject, &cancel).await.unwrap();
    assert_eq!(
        record.str_field(SUMMARY_FIELD),
        Some("Vendor dispute, delivery milestones missed.")
    );

    let doc = p.index.document(subject).expect("chained stage indexed the summary");
    assert_eq!(doc.text, "Vendor dispute, delivery milestones missed.");

    assert_eq!(p.backend.call_count(), 1);
    assert!(p.queue.dead_letters().is_empty());
    assert_eq!(p.telemetry.counter("profile_summary", TelemetryLabel::Completed), 1);
    assert_eq!(p.telemetry.counter("rag_indexing", TelemetryLabel::Completed), 1);
}

#[tokio::test]
async fn duplicate_delivery_runs_the_work_once() {
    let p = pipeline();
    let subject = MatterId::new();
    let cancel = CancellationToken::new();
    p.store.insert(MATTER_ENTITY, subject, Fields::new());
    p.backend.script(
        subject,
        Ok(StructuredFacts::new(0.9).with_summary("Single extraction.")),
    );

    let job = profile_job(subject);
    p.queue.send(job.clone()).await.unwrap();
    drain(&p, &cancel).await;

    // The transport redelivers the already-completed contract.
    p.queue.send(job.redelivered()).await.unwrap();
    drain(&p, &cancel).await;

    assert_eq!(p.backend.call_count(), 1);
    assert_eq!(
        p.telemetry.counter("profile_summary", TelemetryLabel::ShortCircuited),
        1
    );
    // The skipped delivery still re-published its chain; indexing itself
    // deduped on its own key.
    assert_eq!(
        p.telemetry.counter("rag_indexing", TelemetryLabel::ShortCircuited),
        1
    );
}

#[tokio::test]
async fn transient_backend_outage_retries_to_success() {
    let p = pipeline();
    let subject = MatterId::new();
    let cancel = CancellationToken::new();
    p.store.insert(MATTER_ENTITY, subject, Fields::new());
    p.backend.script(
        subject,
        Err(ExtractionError::Unavailable("model endpoint down".to_string())),
    );
    p.backend.script(
        subject,
        Ok(StructuredFacts::new(0.85).with_summary("Recovered on retry.")),
    );

    p.queue.send(profile_job(subject)).await.unwrap();
    drain(&p, &cancel).await;

    assert_eq!(p.backend.call_count(), 2);
    let record = p.store.get(MATTER_ENTITY, subject, &cancel).await.unwrap();
    assert_eq!(record.str_field(SUMMARY_FIELD), Some("Recovered on retry."));
    assert!(p.queue.dead_letters().is_empty());
    assert_eq!(p.telemetry.counter("profile_summary", TelemetryLabel::Failed), 1);
    assert_eq!(p.telemetry.counter("profile_summary", TelemetryLabel::Completed), 1);
}

#[tokio::test]
async fn missing_subject_dead_letters_without_retry() {
    let p = pipeline();
    let subject = MatterId::new();
    let cancel = CancellationToken::new();
    p.backend.script(
        subject,
        Err(ExtractionError::SubjectNotFound(subject.to_string())),
    );

    p.queue.send(profile_job(subject)).await.unwrap();
    drain(&p, &cancel).await;

    let dead = p.queue.dead_letters();
    assert_eq!(dead.len(), 1);
    assert_eq!(dead[0].job.subject_id, subject);
    assert_eq!(p.backend.call_count(), 1);
    assert_eq!(p.telemetry.counter("profile_summary", TelemetryLabel::Poisoned), 1);
}

#[tokio::test]
async fn unparseable_document_still_indexes_partial_facts() {
    let p = pipeline();
    let subject = MatterId::new();
    let cancel = CancellationToken::new();
    p.store.insert(MATTER_ENTITY, subject, Fields::new());
    p.backend.script(
        subject,
        Err(ExtractionError::Unparseable {
            reason: "corrupt pdf".to_string(),
            partial: Some(StructuredFacts::new(0.4).with_summary("Partial: engagement letter.")),
        }),
    );

    p.queue.send(profile_job(subject)).await.unwrap();
    drain(&p, &cancel).await;

    // Primary stage dead-lettered, downstream stage ran on degraded input.
    assert_eq!(p.queue.dead_letters().len(), 1);
    let doc = p.index.document(subject).expect("degraded summary indexed");
    assert_eq!(doc.text, "Partial: engagement letter.");
}

#[tokio::test]
async fn rollup_job_writes_totals_through_the_dispatcher() {
    let p = pipeline();
    let subject = MatterId::new();
    let cancel = CancellationToken::new();

    let mut matter = Fields::new();
    matter.insert(BUDGET_FIELD.to_string(), json!(20_000));
    p.store.insert(MATTER_ENTITY, subject, matter);
    for (amount, date) in [(5_000, "2026-01-10"), (7_500, "2026-02-15"), (3_000, "2026-03-05")] {
        let mut event = Fields::new();
        event.insert(PARENT_FIELD.to_string(), json!(subject.to_string()));
        event.insert(AMOUNT_FIELD.to_string(), json!(amount));
        event.insert(OCCURRED_ON_FIELD.to_string(), json!(date));
        p.store.insert(BILLING_EVENT_ENTITY, MatterId::new(), event);
    }

    let job = JobContract::new(
        subject,
        CorrelationId::new(),
        JobPayload::FinancialRollup { rollup_version: 1 },
    );
    p.queue.send(job).await.unwrap();
    drain(&p, &cancel).await;

    let record = p.store.get(MATTER_ENTITY, subject, &cancel).await.unwrap();
    assert_eq!(record.i64_field(SPEND_FIELD), Some(15_500));
    assert_eq!(p.telemetry.counter("financial_rollup", TelemetryLabel::Completed), 1);
}

#[tokio::test]
async fn new_document_version_is_new_work() {
    let p = pipeline();
    let subject = MatterId::new();
    let cancel = CancellationToken::new();
    p.store.insert(MATTER_ENTITY, subject, Fields::new());
    p.backend.script(subject, Ok(StructuredFacts::new(0.9).with_summary("Version one.")));
    p.backend.script(subject, Ok(StructuredFacts::new(0.9).with_summary("Version two.")));

    p.queue.send(profile_job(subject)).await.unwrap();
    drain(&p, &cancel).await;

    // Documents changed; the producer enqueues with a bumped version and
    // a therefore-different idempotency key.
    let bumped = JobContract::new(
        subject,
        CorrelationId::new(),
        JobPayload::ProfileSummary {
            playbook: "matter-profile".to_string(),
            document_version: 2,
            index_after: true,
        },
    );
    p.queue.send(bumped).await.unwrap();
    drain(&p, &cancel).await;

    assert_eq!(p.backend.call_count(), 2);
    let record = p.store.get(MATTER_ENTITY, subject, &cancel).await.unwrap();
    assert_eq!(record.str_field(SUMMARY_FIELD), Some("Version two."));
    assert_eq!(p.index.document(subject).unwrap().document_version, 2);
}
