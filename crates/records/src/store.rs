//! Record-store contract.

use std::sync::Arc;

use serde_json::Value as JsonValue;
use thiserror::Error;

use matterflow_core::{CancellationToken, MatterId, WorkError};

/// Named field values of one record.
pub type Fields = serde_json::Map<String, JsonValue>;

/// Opaque optimistic-concurrency token.
///
/// The store hands one out on every read and bumps it on every successful
/// write. A conditional write with a stale token fails with
/// [`RecordStoreError::Conflict`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Etag(u64);

impl Etag {
    pub fn initial() -> Self {
        Self(1)
    }

    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl core::fmt::Display for Etag {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "W/\"{}\"", self.0)
    }
}

/// A record read from the store, together with its concurrency token.
#[derive(Debug, Clone, PartialEq)]
pub struct VersionedRecord {
    pub entity_type: String,
    pub id: MatterId,
    pub fields: Fields,
    pub etag: Etag,
}

impl VersionedRecord {
    /// Convenience accessor for an integer field (amounts in cents).
    pub fn i64_field(&self, name: &str) -> Option<i64> {
        self.fields.get(name).and_then(JsonValue::as_i64)
    }

    pub fn str_field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).and_then(JsonValue::as_str)
    }
}

/// Simple equality filter for queries.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordFilter {
    pub field: String,
    pub equals: JsonValue,
}

impl RecordFilter {
    pub fn equals(field: impl Into<String>, value: impl Into<JsonValue>) -> Self {
        Self {
            field: field.into(),
            equals: value.into(),
        }
    }
}

/// Record store operation error.
///
/// Infrastructure-facing error shape; handlers convert these into the
/// engine-wide [`WorkError`] taxonomy via the `From` impl below so retry
/// classification stays in one place.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RecordStoreError {
    #[error("record not found: {entity_type}/{id}")]
    NotFound { entity_type: String, id: MatterId },

    #[error("access denied: {entity_type}/{id}")]
    AccessDenied { entity_type: String, id: MatterId },

    #[error("optimistic concurrency conflict on {entity_type}/{id}")]
    Conflict { entity_type: String, id: MatterId },

    #[error("record store unavailable: {0}")]
    Unavailable(String),

    #[error("cancelled")]
    Cancelled,
}

impl From<RecordStoreError> for WorkError {
    fn from(e: RecordStoreError) -> Self {
        match e {
            RecordStoreError::NotFound { entity_type, id } => {
                WorkError::not_found(format!("{entity_type}/{id}"))
            }
            RecordStoreError::AccessDenied { entity_type, id } => {
                WorkError::access_denied(format!("{entity_type}/{id}"))
            }
            RecordStoreError::Conflict { entity_type, id } => {
                WorkError::conflict(format!("{entity_type}/{id}"))
            }
            RecordStoreError::Unavailable(msg) => WorkError::unavailable(msg),
            RecordStoreError::Cancelled => WorkError::Cancelled,
        }
    }
}

/// Narrow interface over the system of record.
///
/// All methods take the caller's cancellation token: these are the network
/// suspension points of a worker, and a cancelled job must abort them
/// promptly rather than wait out the call.
///
/// `query_aggregate_children` is a first-class method so handlers that
/// roll up child records (billing line items under a matter) never need
/// to downcast the store to a concrete client to reach a lower-level
/// query API. It also keeps those handlers fully mockable.
#[async_trait::async_trait]
pub trait RecordStore: Send + Sync {
    /// Read one record with its concurrency token.
    async fn get(
        &self,
        entity_type: &str,
        id: MatterId,
        cancel: &CancellationToken,
    ) -> Result<VersionedRecord, RecordStoreError>;

    /// Read all records of a type matching a filter.
    async fn query(
        &self,
        entity_type: &str,
        filter: &RecordFilter,
        cancel: &CancellationToken,
    ) -> Result<Vec<VersionedRecord>, RecordStoreError>;

    /// Conditionally write fields; fails with `Conflict` when
    /// `expected_etag` is stale. Returns the new token on success.
    async fn update(
        &self,
        entity_type: &str,
        id: MatterId,
        fields: Fields,
        expected_etag: Etag,
        cancel: &CancellationToken,
    ) -> Result<Etag, RecordStoreError>;

    /// Read the child records of an aggregate parent (e.g. billing line
    /// items under a matter).
    async fn query_aggregate_children(
        &self,
        child_type: &str,
        parent: MatterId,
        cancel: &CancellationToken,
    ) -> Result<Vec<VersionedRecord>, RecordStoreError>;
}

#[async_trait::async_trait]
impl<S> RecordStore for Arc<S>
where
    S: RecordStore + ?Sized,
{
    async fn get(
        &self,
        entity_type: &str,
        id: MatterId,
        cancel: &CancellationToken,
    ) -> Result<VersionedRecord, RecordStoreError> {
        (**self).get(entity_type, id, cancel).await
    }

    async fn query(
        &self,
        entity_type: &str,
        filter: &RecordFilter,
        cancel: &CancellationToken,
    ) -> Result<Vec<VersionedRecord>, RecordStoreError> {
        (**self).query(entity_type, filter, cancel).await
    }

    async fn update(
        &self,
        entity_type: &str,
        id: MatterId,
        fields: Fields,
        expected_etag: Etag,
        cancel: &CancellationToken,
    ) -> Result<Etag, RecordStoreError> {
        (**self)
            .update(entity_type, id, fields, expected_etag, cancel)
            .await
    }

    async fn query_aggregate_children(
        &self,
        child_type: &str,
        parent: MatterId,
        cancel: &CancellationToken,
    ) -> Result<Vec<VersionedRecord>, RecordStoreError> {
        (**self)
            .query_aggregate_children(child_type, parent, cancel)
            .await
    }
}
