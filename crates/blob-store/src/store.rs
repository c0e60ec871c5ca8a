use async_trait::async_trait;
use bytes::Bytes;

use crate::{ContentId, Result};

/// An opaque, possibly-failing byte store keyed by content id.
///
/// The logical tree commits metadata only after the corresponding
/// byte operation succeeds, so implementations may fail a call and
/// leave at worst an orphaned blob (reconciled by a later sweep),
/// never a dangling metadata reference.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store bytes under a freshly minted content id.
    async fn put(&self, bytes: Bytes) -> Result<ContentId>;

    /// Fetch the bytes for a content id.
    async fn get(&self, id: &ContentId) -> Result<Bytes>;

    /// Remove the bytes for a content id. Removing an id that is
    /// already gone is not an error.
    async fn delete(&self, id: &ContentId) -> Result<()>;

    /// Duplicate a blob under a new content id.
    async fn copy(&self, id: &ContentId) -> Result<ContentId>;

    /// Whether bytes exist for a content id.
    async fn has(&self, id: &ContentId) -> Result<bool>;
}
