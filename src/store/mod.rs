//! Abstract document store with partition-by-type semantics.
//!
//! Entities live as JSON documents keyed by (partition key, id); each entity
//! type owns one fixed partition key string.

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

mod memory;
mod sqlite;

pub use memory::InMemoryDocumentStore;
pub use sqlite::SqliteDocumentStore;

/// Partition key for recording documents.
pub const PARTITION_RECORDING: &str = "recording";
/// Partition key for transcription documents.
pub const PARTITION_TRANSCRIPTION: &str = "transcription";

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("document not found")]
    NotFound,
    #[error("document already exists")]
    AlreadyExists,
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Insert a new document. Fails with `AlreadyExists` if (partition, id)
    /// is already present.
    async fn create(&self, partition: &str, id: &str, body: Value) -> Result<(), StoreError>;

    /// Read a document, `None` if absent.
    async fn read(&self, partition: &str, id: &str) -> Result<Option<Value>, StoreError>;

    /// Full-replace an existing document. Fails with `NotFound` if absent —
    /// callers re-fetch before mutating; there is no concurrency token.
    async fn replace(&self, partition: &str, id: &str, body: Value) -> Result<(), StoreError>;

    /// Delete a document. Fails with `NotFound` if absent.
    async fn delete(&self, partition: &str, id: &str) -> Result<(), StoreError>;

    /// All documents in a partition whose top-level `field` equals `value`.
    async fn query_eq(
        &self,
        partition: &str,
        field: &str,
        value: &str,
    ) -> Result<Vec<Value>, StoreError>;

    /// All documents in a partition.
    async fn list(&self, partition: &str) -> Result<Vec<Value>, StoreError>;
}
