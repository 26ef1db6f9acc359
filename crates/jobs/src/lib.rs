//! `matterflow-jobs` — the asynchronous job engine.
//!
//! Contract and outcome model, idempotency store with per-key leases,
//! queue transport boundary, the idempotent handler wrapper implementing
//! the dedup/lock/work/mark protocol, and the dispatcher that translates
//! outcomes into queue actions.

pub mod contract;
pub mod dispatcher;
pub mod handler;
pub mod idempotency;
pub mod key;
pub mod queue;
pub mod telemetry;

pub use contract::{JobContract, JobOutcome, JobPayload, OutcomeStatus};
pub use dispatcher::{Dispatcher, HandlerRegistry, QueueAction};
pub use handler::{Idempotent, IdempotencyConfig, JobHandler, StepResult, WorkStep};
pub use idempotency::{IdempotencyStore, IdempotencyStoreError, InMemoryIdempotencyStore};
pub use key::derive_idempotency_key;
pub use queue::{DeadLetterEntry, InMemoryJobQueue, JobQueue, QueueError};
pub use telemetry::{InMemoryTelemetry, NoopTelemetry, TelemetryLabel, TelemetrySink};
