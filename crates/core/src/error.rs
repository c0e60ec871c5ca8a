//! Error taxonomy for the core.

use uuid::Uuid;

use crate::permission::PermissionType;

/// Errors surfaced by tree, grant, and sharing operations.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// Sibling name collision; recoverable by the caller (rename and
    /// retry).
    #[error("an active sibling named {name:?} ({kind}) already exists here")]
    DuplicateName { name: String, kind: String },

    /// The resolver denied a required capability. Never retried.
    #[error("permission denied: {required} on node {node_id}")]
    PermissionDenied {
        node_id: Uuid,
        required: PermissionType,
    },

    /// Node, grant, or principal reference does not resolve.
    #[error("not found: {0}")]
    NotFound(String),

    /// Grant request names both or neither of user/group.
    #[error("invalid grant spec: {0}")]
    InvalidGrantSpec(String),

    /// A node is in the wrong lifecycle state for the operation
    /// (e.g. hard delete of a node that was never soft-deleted).
    #[error("node {0} is not soft-deleted")]
    NotSoftDeleted(Uuid),

    /// A move that would make a directory its own ancestor.
    #[error("cannot move node {0} into its own subtree")]
    MoveIntoSubtree(Uuid),

    /// The blob store failed mid copy/move or cleanup. The logical
    /// mutation is not committed when this happens before the
    /// database write.
    #[error("storage backend error: {0}")]
    StorageBackend(#[from] filevault_blobs::BlobStoreError),

    /// Uniqueness violation between concurrent writers. Caught and
    /// retried internally by directory-path creation; surfaced only
    /// when a retry budget is exhausted.
    #[error("concurrent conflict on {0}")]
    ConcurrencyConflict(String),

    /// Database error
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Migration error
    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

impl CoreError {
    /// Whether the underlying sqlx error is a uniqueness violation,
    /// i.e. another writer won a race we can recover from.
    pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
        matches!(
            err,
            sqlx::Error::Database(db) if db.is_unique_violation()
        )
    }
}

/// Result type alias for core operations.
pub type Result<T, E = CoreError> = std::result::Result<T, E>;
