use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;

use crate::{BlobStore, BlobStoreError, ContentId, Result};

/// In-memory blob store for tests and ephemeral deployments.
#[derive(Debug, Clone, Default)]
pub struct MemoryBlobStore {
    blobs: Arc<Mutex<BTreeMap<ContentId, Bytes>>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of blobs currently held.
    pub fn len(&self) -> usize {
        self.blobs.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.blobs.lock().is_empty()
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn put(&self, bytes: Bytes) -> Result<ContentId> {
        let id = ContentId::generate();
        self.blobs.lock().insert(id.clone(), bytes);
        Ok(id)
    }

    async fn get(&self, id: &ContentId) -> Result<Bytes> {
        self.blobs
            .lock()
            .get(id)
            .cloned()
            .ok_or_else(|| BlobStoreError::NotFound(id.clone()))
    }

    async fn delete(&self, id: &ContentId) -> Result<()> {
        self.blobs.lock().remove(id);
        Ok(())
    }

    async fn copy(&self, id: &ContentId) -> Result<ContentId> {
        let mut blobs = self.blobs.lock();
        let bytes = blobs
            .get(id)
            .cloned()
            .ok_or_else(|| BlobStoreError::NotFound(id.clone()))?;
        let new_id = ContentId::generate();
        blobs.insert(new_id.clone(), bytes);
        Ok(new_id)
    }

    async fn has(&self, id: &ContentId) -> Result<bool> {
        Ok(self.blobs.lock().contains_key(id))
    }
}
