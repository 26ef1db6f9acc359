//! `matterflow-core` — foundation building blocks for the job engine.
//!
//! This crate contains **pure** primitives (no infrastructure concerns):
//! typed identifiers, the work-error taxonomy, and the cancellation token
//! threaded through every external call.

pub mod cancel;
pub mod error;
pub mod id;

pub use cancel::CancellationToken;
pub use error::{ErrorClass, WorkError, WorkResult, classify};
pub use id::{CorrelationId, JobId, MatterId};
