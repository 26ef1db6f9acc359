//! `matterflow-records` — the record-store boundary.
//!
//! The system of record (the CRM-style data platform) is an external
//! collaborator. This crate defines the narrow interface the engine reads
//! and writes through, an in-memory double for tests/dev, and the
//! optimistic-concurrency update helper every handler uses when it mutates
//! a shared aggregate record.

pub mod memory;
pub mod retry;
pub mod store;

pub use memory::InMemoryRecordStore;
pub use retry::{RetryPolicy, update_with_retry};
pub use store::{Etag, Fields, RecordFilter, RecordStore, RecordStoreError, VersionedRecord};
