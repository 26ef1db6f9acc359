//! In-memory record store for tests/dev.

use std::collections::HashMap;
use std::sync::RwLock;
use std::sync::atomic::{AtomicU32, Ordering};

use matterflow_core::{CancellationToken, MatterId};

use crate::store::{Etag, Fields, RecordFilter, RecordStore, RecordStoreError, VersionedRecord};

/// Field linking a child record to its aggregate parent.
pub const PARENT_FIELD: &str = "matter_id";

#[derive(Debug, Clone)]
struct StoredRecord {
    fields: Fields,
    etag: Etag,
}

/// In-memory [`RecordStore`] double.
///
/// Etags start at 1 and bump on every successful write. Tests can inject
/// a fixed number of artificial conflicts to exercise the optimistic-
/// concurrency retry path (the conflict-then-succeed fixture).
#[derive(Debug, Default)]
pub struct InMemoryRecordStore {
    records: RwLock<HashMap<(String, MatterId), StoredRecord>>,
    injected_conflicts: AtomicU32,
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a record; returns its initial etag.
    pub fn insert(&self, entity_type: impl Into<String>, id: MatterId, fields: Fields) -> Etag {
        let etag = Etag::initial();
        self.records.write().unwrap().insert(
            (entity_type.into(), id),
            StoredRecord { fields, etag },
        );
        etag
    }

    /// The next `n` conditional writes fail with `Conflict` before any
    /// genuine etag check.
    pub fn inject_conflicts(&self, n: u32) {
        self.injected_conflicts.store(n, Ordering::SeqCst);
    }

    fn take_injected_conflict(&self) -> bool {
        self.injected_conflicts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait::async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn get(
        &self,
        entity_type: &str,
        id: MatterId,
        cancel: &CancellationToken,
    ) -> Result<VersionedRecord, RecordStoreError> {
        if cancel.is_cancelled() {
            return Err(RecordStoreError::Cancelled);
        }
        let records = self.records.read().unwrap();
        let stored = records.get(&(entity_type.to_string(), id)).ok_or_else(|| {
            RecordStoreError::NotFound {
                entity_type: entity_type.to_string(),
                id,
            }
        })?;
        Ok(VersionedRecord {
            entity_type: entity_type.to_string(),
            id,
            fields: stored.fields.clone(),
            etag: stored.etag,
        })
    }

    async fn query(
        &self,
        entity_type: &str,
        filter: &RecordFilter,
        cancel: &CancellationToken,
    ) -> Result<Vec<VersionedRecord>, RecordStoreError> {
        if cancel.is_cancelled() {
            return Err(RecordStoreError::Cancelled);
        }
        let records = self.records.read().unwrap();
        let mut out: Vec<_> = records
            .iter()
            .filter(|((t, _), stored)| {
                t == entity_type && stored.fields.get(&filter.field) == Some(&filter.equals)
            })
            .map(|((t, id), stored)| VersionedRecord {
                entity_type: t.clone(),
                id: *id,
                fields: stored.fields.clone(),
                etag: stored.etag,
            })
            .collect();
        out.sort_by_key(|r| *r.id.as_uuid());
        Ok(out)
    }

    async fn update(
        &self,
        entity_type: &str,
        id: MatterId,
        fields: Fields,
        expected_etag: Etag,
        cancel: &CancellationToken,
    ) -> Result<Etag, RecordStoreError> {
        if cancel.is_cancelled() {
            return Err(RecordStoreError::Cancelled);
        }
        if self.take_injected_conflict() {
            return Err(RecordStoreError::Conflict {
                entity_type: entity_type.to_string(),
                id,
            });
        }
        let mut records = self.records.write().unwrap();
        let stored = records
            .get_mut(&(entity_type.to_string(), id))
            .ok_or_else(|| RecordStoreError::NotFound {
                entity_type: entity_type.to_string(),
                id,
            })?;
        if stored.etag != expected_etag {
            return Err(RecordStoreError::Conflict {
                entity_type: entity_type.to_string(),
                id,
            });
        }
        for (k, v) in fields {
            stored.fields.insert(k, v);
        }
        stored.etag = stored.etag.next();
        Ok(stored.etag)
    }

    async fn query_aggregate_children(
        &self,
        child_type: &str,
        parent: MatterId,
        cancel: &CancellationToken,
    ) -> Result<Vec<VersionedRecord>, RecordStoreError> {
        let filter = RecordFilter::equals(PARENT_FIELD, parent.to_string());
        self.query(child_type, &filter, cancel).await
    }
}
