//! Search-index boundary.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, RwLock};

use thiserror::Error;

use matterflow_core::{CancellationToken, MatterId, WorkError};

/// Search-index operation error.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IndexError {
    #[error("search index unavailable: {0}")]
    Unavailable(String),

    #[error("cancelled")]
    Cancelled,
}

impl From<IndexError> for WorkError {
    fn from(e: IndexError) -> Self {
        match e {
            IndexError::Unavailable(msg) => WorkError::unavailable(msg),
            IndexError::Cancelled => WorkError::Cancelled,
        }
    }
}

/// Write-side interface of the RAG search index.
///
/// One document per matter; upserts are last-write-wins. Ordering across
/// concurrent writers comes from content-derived job keys upstream, not
/// from the index.
#[async_trait::async_trait]
pub trait SearchIndex: Send + Sync {
    async fn upsert(
        &self,
        subject: MatterId,
        document_version: u64,
        text: &str,
        cancel: &CancellationToken,
    ) -> Result<(), IndexError>;
}

#[async_trait::async_trait]
impl<I> SearchIndex for Arc<I>
where
    I: SearchIndex + ?Sized,
{
    async fn upsert(
        &self,
        subject: MatterId,
        document_version: u64,
        text: &str,
        cancel: &CancellationToken,
    ) -> Result<(), IndexError> {
        (**self).upsert(subject, document_version, text, cancel).await
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct IndexedDocument {
    pub document_version: u64,
    pub text: String,
}

/// In-memory [`SearchIndex`] double.
#[derive(Debug, Default)]
pub struct InMemorySearchIndex {
    documents: RwLock<HashMap<MatterId, IndexedDocument>>,
    failures_to_inject: AtomicU32,
}

impl InMemorySearchIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// The next `n` upserts fail with `Unavailable`.
    pub fn inject_failures(&self, n: u32) {
        self.failures_to_inject.store(n, Ordering::SeqCst);
    }

    pub fn document(&self, subject: MatterId) -> Option<IndexedDocument> {
        self.documents.read().unwrap().get(&subject).cloned()
    }

    pub fn len(&self) -> usize {
        self.documents.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.read().unwrap().is_empty()
    }
}

#[async_trait::async_trait]
impl SearchIndex for InMemorySearchIndex {
    async fn upsert(
        &self,
        subject: MatterId,
        document_version: u64,
        text: &str,
        cancel: &CancellationToken,
    ) -> Result<(), IndexError> {
        if cancel.is_cancelled() {
            return Err(IndexError::Cancelled);
        }
        let injected = self
            .failures_to_inject
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            return Err(IndexError::Unavailable("injected outage".to_string()));
        }
        self.documents.write().unwrap().insert(
            subject,
            IndexedDocument {
                document_version,
                text: text.to_string(),
            },
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn upsert_replaces_the_document() {
        let index = InMemorySearchIndex::new();
        let subject = MatterId::new();
        let cancel = CancellationToken::new();

        index.upsert(subject, 1, "first", &cancel).await.unwrap();
        index.upsert(subject, 2, "second", &cancel).await.unwrap();

        let doc = index.document(subject).unwrap();
        assert_eq!(doc.document_version, 2);
        assert_eq!(doc.text, "second");
        assert_eq!(index.len(), 1);
    }

    #[tokio::test]
    async fn injected_failure_surfaces_as_unavailable() {
        let index = InMemorySearchIndex::new();
        index.inject_failures(1);
        let err = index
            .upsert(MatterId::new(), 1, "text", &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, IndexError::Unavailable(_)));
    }
}
