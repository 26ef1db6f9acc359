//! Queue consumer entry point: message → handler → queue action.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, error, warn};

use matterflow_core::CancellationToken;

use crate::contract::{JobContract, OutcomeStatus};
use crate::handler::JobHandler;
use crate::telemetry::{TelemetryLabel, TelemetrySink};

/// What the transport should do with the delivered message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueAction {
    /// Done; remove the message.
    Ack,
    /// Transient failure; redeliver after the transport's backoff.
    Retry,
    /// Permanent failure or retries exhausted; park for operator triage.
    DeadLetter,
}

/// Explicit handler routing table, built once at process start and
/// passed by reference. No global mutable registration.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<&'static str, Arc<dyn JobHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(mut self, handler: Arc<dyn JobHandler>) -> Self {
        self.handlers.insert(handler.job_type(), handler);
        self
    }

    pub fn get(&self, job_type: &str) -> Option<&Arc<dyn JobHandler>> {
        self.handlers.get(job_type)
    }
}

/// Receives queue messages, invokes the matching handler, and translates
/// the outcome into a transport action.
///
/// The dispatcher never panics on a malformed message: a contract that
/// does not deserialize is itself a poisoned outcome for that message.
pub struct Dispatcher<T: TelemetrySink> {
    registry: HandlerRegistry,
    telemetry: T,
}

impl<T: TelemetrySink> Dispatcher<T> {
    pub fn new(registry: HandlerRegistry, telemetry: T) -> Self {
        Self {
            registry,
            telemetry,
        }
    }

    /// Queue consumer entry point over the raw message body.
    pub async fn handle(&self, raw: &str, cancel: &CancellationToken) -> QueueAction {
        let job: JobContract = match serde_json::from_str(raw) {
            Ok(job) => job,
            Err(e) => {
                error!(error = %e, "message does not deserialize into a job contract, dead-lettering");
                self.telemetry.count("malformed", TelemetryLabel::Poisoned);
                return QueueAction::DeadLetter;
            }
        };
        self.dispatch(&job, cancel).await
    }

    /// Dispatch an already-parsed contract.
    pub async fn dispatch(&self, job: &JobContract, cancel: &CancellationToken) -> QueueAction {
        let job_type = job.job_type();
        let Some(handler) = self.registry.get(job_type) else {
            error!(
                job_id = %job.job_id,
                job_type,
                subject_id = %job.subject_id,
                correlation_id = %job.correlation_id,
                "no handler registered for job type, dead-lettering"
            );
            self.telemetry.count(job_type, TelemetryLabel::Poisoned);
            return QueueAction::DeadLetter;
        };

        let started = Instant::now();
        let outcome = handler.handle(job, cancel).await;
        // Off the critical path: the sink contract is infallible.
        self.telemetry.timing(job_type, started.elapsed());

        match outcome.status {
            OutcomeStatus::Completed => {
                let label = if outcome.short_circuited {
                    TelemetryLabel::ShortCircuited
                } else {
                    TelemetryLabel::Completed
                };
                self.telemetry.count(job_type, label);
                debug!(job_id = %job.job_id, job_type, "job completed");
                QueueAction::Ack
            }
            OutcomeStatus::Failed => {
                self.telemetry.count(job_type, TelemetryLabel::Failed);
                if job.attempt < job.max_attempts {
                    warn!(
                        job_id = %job.job_id,
                        job_type,
                        attempt = job.attempt,
                        max_attempts = job.max_attempts,
                        error = outcome.error.as_deref().unwrap_or(""),
                        "job failed transiently, retrying"
                    );
                    QueueAction::Retry
                } else {
                    error!(
                        job_id = %job.job_id,
                        job_type,
                        subject_id = %job.subject_id,
                        correlation_id = %job.correlation_id,
                        attempts = job.attempt,
                        error = outcome.error.as_deref().unwrap_or(""),
                        "job exhausted retries, dead-lettering"
                    );
                    QueueAction::DeadLetter
                }
            }
            OutcomeStatus::Poisoned => {
                self.telemetry.count(job_type, TelemetryLabel::Poisoned);
                error!(
                    job_id = %job.job_id,
                    job_type,
                    subject_id = %job.subject_id,
                    correlation_id = %job.correlation_id,
                    error = outcome.error.as_deref().unwrap_or(""),
                    "job poisoned, dead-lettering"
                );
                QueueAction::DeadLetter
            }
        }
    }
}
