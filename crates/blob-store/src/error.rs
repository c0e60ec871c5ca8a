//! Error types for the blob store.

/// Errors that can occur when working with a blob store.
#[derive(Debug, thiserror::Error)]
pub enum BlobStoreError {
    /// IO error from the filesystem backend
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Content id parse error
    #[error("invalid content id: {0}")]
    InvalidContentId(#[from] crate::ContentIdError),

    /// Blob not found
    #[error("blob not found: {0}")]
    NotFound(crate::ContentId),

    /// Backend unavailable or misbehaving
    #[error("storage backend error: {0}")]
    Backend(String),
}

/// Result type alias for blob store operations.
pub type Result<T, E = BlobStoreError> = std::result::Result<T, E>;
