//! Cooperative cancellation.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::{WorkError, WorkResult};

/// Caller-supplied cancellation token.
///
/// Cloned freely; all clones observe the same flag. Handlers check it
/// before every external call so a cancelled job aborts promptly rather
/// than blocking a worker.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }

    /// Err([`WorkError::Cancelled`]) once the token has fired.
    pub fn check(&self) -> WorkResult<()> {
        if self.is_cancelled() {
            Err(WorkError::Cancelled)
        } else {
            Ok(())
        }
    }
}
