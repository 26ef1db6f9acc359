//! `matterflow-engine` — the concrete pipeline stages.
//!
//! Wires the job-engine machinery to the domain: the three work steps
//! (profile summary, RAG indexing, financial rollup), the search-index
//! boundary, and the concrete tool handlers an orchestrating agent calls
//! directly.

use std::sync::Arc;

pub mod index;
pub mod profile;
pub mod rag;
pub mod rollup;
pub mod schema;
pub mod tools;

pub use index::{IndexError, InMemorySearchIndex, SearchIndex};
pub use profile::ProfileSummaryStep;
pub use rag::RagIndexingStep;
pub use rollup::FinancialRollupStep;
pub use tools::{MatterFinancialsTool, ProfileSummaryTool};

use matterflow_ai::{ExtractionBackend, ToolRegistry};
use matterflow_jobs::{HandlerRegistry, Idempotent, IdempotencyStore, JobQueue};
use matterflow_records::RecordStore;

/// Build the full handler registry, each step wrapped in the idempotency
/// protocol. Called once at process start.
pub fn handler_registry<B, S, I, D, Q>(
    backend: B,
    store: S,
    index: I,
    dedup: D,
    queue: Q,
) -> HandlerRegistry
where
    B: ExtractionBackend + 'static,
    S: RecordStore + Clone + 'static,
    I: SearchIndex + 'static,
    D: IdempotencyStore + Clone + 'static,
    Q: JobQueue + Clone + 'static,
{
    HandlerRegistry::new()
        .register(Arc::new(Idempotent::new(
            ProfileSummaryStep::new(backend, store.clone()),
            dedup.clone(),
            queue.clone(),
        )))
        .register(Arc::new(Idempotent::new(
            RagIndexingStep::new(index, store.clone()),
            dedup.clone(),
            queue.clone(),
        )))
        .register(Arc::new(Idempotent::new(
            FinancialRollupStep::new(store),
            dedup,
            queue,
        )))
}

/// Build the tool catalog over a shared record store.
pub fn tool_registry<S>(store: S) -> ToolRegistry
where
    S: RecordStore + Clone + 'static,
{
    ToolRegistry::new()
        .register(Arc::new(MatterFinancialsTool::new(store.clone())))
        .register(Arc::new(ProfileSummaryTool::new(store)))
}
