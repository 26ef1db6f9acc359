//! Work-error model and retry classification.

use thiserror::Error;

/// Result type used across handler work steps.
pub type WorkResult<T> = Result<T, WorkError>;

/// Error raised by a handler's work step or by one of its collaborators.
///
/// Keep this focused on failures a handler must classify for retry purposes.
/// Everything a handler can observe from the record store, the extraction
/// backend, or the idempotency store is funneled into one of these variants
/// so that [`classify`] is the single place retry decisions come from.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum WorkError {
    /// The subject entity does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The caller is not allowed to touch the subject entity.
    #[error("access denied: {0}")]
    AccessDenied(String),

    /// Input could not be parsed or violates the contract.
    #[error("malformed input: {0}")]
    Malformed(String),

    /// A collaborator signalled it is temporarily unavailable.
    #[error("temporarily unavailable: {0}")]
    Unavailable(String),

    /// A network call timed out.
    #[error("timed out: {0}")]
    Timeout(String),

    /// The caller-supplied cancellation token fired mid-flight.
    #[error("cancelled")]
    Cancelled,

    /// Optimistic-concurrency token mismatch on a conditional write.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Anything a collaborator raised that fits no bucket above.
    #[error("unclassified: {0}")]
    Other(String),
}

impl WorkError {
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn access_denied(msg: impl Into<String>) -> Self {
        Self::AccessDenied(msg.into())
    }

    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::Malformed(msg.into())
    }

    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::Unavailable(msg.into())
    }

    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::Timeout(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn other(msg: impl Into<String>) -> Self {
        Self::Other(msg.into())
    }
}

/// Retry classification of a [`WorkError`].
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ErrorClass {
    /// Retry-eligible: the same work may succeed on a later delivery.
    Transient,
    /// Not retry-eligible: redelivery would fail the same way.
    Permanent,
}

/// Classify an error once, at the handler/dispatcher boundary.
///
/// - Infrastructure trouble (unavailable, timeout) is transient.
/// - Cancellation is transient: the job is redelivered and retried.
/// - Conflicts are transient at the job level; the aggregate update helper
///   retries them locally first and only surfaces them when its own budget
///   is exhausted.
/// - Data problems (not found, denied, malformed) are permanent.
/// - Unclassified errors are permanent: unknown failures are not assumed
///   retry-safe.
pub fn classify(error: &WorkError) -> ErrorClass {
    match error {
        WorkError::Unavailable(_) | WorkError::Timeout(_) | WorkError::Cancelled => {
            ErrorClass::Transient
        }
        WorkError::Conflict(_) => ErrorClass::Transient,
        WorkError::NotFound(_) | WorkError::AccessDenied(_) | WorkError::Malformed(_) => {
            ErrorClass::Permanent
        }
        WorkError::Other(_) => ErrorClass::Permanent,
    }
}
