//! Extraction-backend contract.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use thiserror::Error;

use matterflow_core::{CancellationToken, MatterId, WorkError};

/// Structured facts extracted from a subject document.
///
/// This is *not* domain state. It is an insight persisted or indexed by
/// handlers without the backend ever mutating records itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructuredFacts {
    /// Human-readable summary (destined for a fixed-width record field).
    pub summary: Option<String>,

    /// Named facts keyed by playbook field.
    pub facts: serde_json::Map<String, JsonValue>,

    /// Backend confidence in \[0, 1\] (recommended convention; not enforced).
    pub confidence: f64,
}

impl StructuredFacts {
    pub fn new(confidence: f64) -> Self {
        Self {
            summary: None,
            facts: serde_json::Map::new(),
            confidence,
        }
    }

    pub fn with_summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = Some(summary.into());
        self
    }

    pub fn with_fact(mut self, name: impl Into<String>, value: impl Into<JsonValue>) -> Self {
        self.facts.insert(name.into(), value.into());
        self
    }
}

/// Extraction failure.
///
/// `Unparseable` may carry the facts the backend managed to extract
/// before giving up; downstream stages that can run on degraded input
/// (indexing) use them even though the primary stage is poisoned.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ExtractionError {
    #[error("subject not found: {0}")]
    SubjectNotFound(String),

    #[error("access denied: {0}")]
    AccessDenied(String),

    #[error("document unparseable: {reason}")]
    Unparseable {
        reason: String,
        partial: Option<StructuredFacts>,
    },

    #[error("extraction backend unavailable: {0}")]
    Unavailable(String),

    #[error("extraction timed out: {0}")]
    Timeout(String),

    #[error("cancelled")]
    Cancelled,
}

impl ExtractionError {
    /// Facts salvaged from a failed extraction, if any.
    pub fn partial_facts(&self) -> Option<&StructuredFacts> {
        match self {
            ExtractionError::Unparseable {
                partial: Some(facts),
                ..
            } => Some(facts),
            _ => None,
        }
    }
}

impl From<ExtractionError> for WorkError {
    fn from(e: ExtractionError) -> Self {
        match e {
            ExtractionError::SubjectNotFound(msg) => WorkError::not_found(msg),
            ExtractionError::AccessDenied(msg) => WorkError::access_denied(msg),
            ExtractionError::Unparseable { reason, .. } => WorkError::malformed(reason),
            ExtractionError::Unavailable(msg) => WorkError::unavailable(msg),
            ExtractionError::Timeout(msg) => WorkError::timeout(msg),
            ExtractionError::Cancelled => WorkError::Cancelled,
        }
    }
}

/// AI/extraction backend boundary.
///
/// `analyze` is a network suspension point; implementations must honor
/// the cancellation token promptly.
#[async_trait::async_trait]
pub trait ExtractionBackend: Send + Sync {
    async fn analyze(
        &self,
        subject: MatterId,
        playbook: &str,
        cancel: &CancellationToken,
    ) -> Result<StructuredFacts, ExtractionError>;
}

#[async_trait::async_trait]
impl<B> ExtractionBackend for Arc<B>
where
    B: ExtractionBackend + ?Sized,
{
    async fn analyze(
        &self,
        subject: MatterId,
        playbook: &str,
        cancel: &CancellationToken,
    ) -> Result<StructuredFacts, ExtractionError> {
        (**self).analyze(subject, playbook, cancel).await
    }
}

/// Scripted backend double for tests/dev.
///
/// Responses are consumed per subject in FIFO order; an unscripted
/// subject answers `Unavailable`. Every call is counted so tests can
/// assert the expensive work ran at most once.
#[derive(Debug, Default)]
pub struct ScriptedExtraction {
    responses: Mutex<HashMap<MatterId, Vec<Result<StructuredFacts, ExtractionError>>>>,
    calls: Mutex<Vec<MatterId>>,
}

impl ScriptedExtraction {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(&self, subject: MatterId, response: Result<StructuredFacts, ExtractionError>) {
        self.responses
            .lock()
            .unwrap()
            .entry(subject)
            .or_default()
            .push(response);
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait::async_trait]
impl ExtractionBackend for ScriptedExtraction {
    async fn analyze(
        &self,
        subject: MatterId,
        _playbook: &str,
        cancel: &CancellationToken,
    ) -> Result<StructuredFacts, ExtractionError> {
        if cancel.is_cancelled() {
            return Err(ExtractionError::Cancelled);
        }
        self.calls.lock().unwrap().push(subject);
        let mut responses = self.responses.lock().unwrap();
        match responses.get_mut(&subject) {
            Some(queue) if !queue.is_empty() => queue.remove(0),
            _ => Err(ExtractionError::Unavailable(format!(
                "no scripted response for {subject}"
            ))),
        }
    }
}
