use thiserror::Error;

/// Application-wide error taxonomy.
///
/// Every variant maps to one machine-readable `kind` string and one HTTP
/// status at the boundary; see `http::mod` for the mapping.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("provider error: {0}")]
    ExternalProvider(String),

    #[error("authentication failure: {0}")]
    Authentication(String),

    #[error("audio combine failed: {0}")]
    CombineFailed(String),

    #[error("unsupported audio format: {0}")]
    UnsupportedFormat(String),

    #[error("speaker mapping incomplete: missing {0}")]
    IncompleteMapping(String),

    #[error("invalid provider response: {0}")]
    InvalidProviderResponse(String),

    #[error("store error: {0}")]
    Store(#[from] crate::store::StoreError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl AppError {
    /// Stable machine-readable kind for structured error payloads.
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::NotFound(_) => "not_found",
            AppError::InvalidInput(_) => "invalid_input",
            AppError::Conflict(_) => "conflict",
            AppError::ExternalProvider(_) => "external_provider_error",
            AppError::Authentication(_) => "authentication_failure",
            AppError::CombineFailed(_) => "combine_failed",
            AppError::UnsupportedFormat(_) => "unsupported_format",
            AppError::IncompleteMapping(_) => "incomplete_mapping",
            AppError::InvalidProviderResponse(_) => "invalid_provider_response",
            AppError::Store(_) => "store_error",
            AppError::Io(_) => "io_error",
        }
    }
}

impl From<crate::audiostream::ChunkError> for AppError {
    fn from(e: crate::audiostream::ChunkError) -> Self {
        use crate::audiostream::ChunkError;
        match e {
            ChunkError::SessionNotFound(_) => AppError::NotFound("session"),
            ChunkError::SessionExists(id) => {
                AppError::Conflict(format!("session already exists: {id}"))
            }
        }
    }
}

pub type AppResult<T> = Result<T, AppError>;
