//! Abstract byte store for recording audio, with time-limited signed read
//! URLs the transcription provider can fetch from.

use async_trait::async_trait;
use thiserror::Error;

mod fs;

pub use fs::FsBlobStore;

#[derive(Error, Debug)]
pub enum BlobError {
    #[error("blob not found: {0}")]
    NotFound(String),
    #[error("invalid blob name: {0}")]
    InvalidName(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, Copy)]
pub struct BlobProperties {
    pub size: u64,
}

#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn put(&self, name: &str, bytes: &[u8]) -> Result<(), BlobError>;

    /// A URL that grants read access to the blob for `ttl_secs` seconds.
    async fn signed_read_url(&self, name: &str, ttl_secs: i64) -> Result<String, BlobError>;

    async fn properties(&self, name: &str) -> Result<BlobProperties, BlobError>;

    async fn delete(&self, name: &str) -> Result<(), BlobError>;
}
