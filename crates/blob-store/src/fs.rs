use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use tracing::debug;

use crate::{BlobStore, BlobStoreError, ContentId, Result};

/// Filesystem-backed blob store: one file per blob under a root
/// directory, named by content id.
#[derive(Debug, Clone)]
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    /// Open a store rooted at the given directory, creating it if
    /// missing.
    pub async fn open(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        tokio::fs::create_dir_all(&root).await?;
        Ok(Self { root })
    }

    fn blob_path(&self, id: &ContentId) -> PathBuf {
        self.root.join(id.as_str())
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn put(&self, bytes: Bytes) -> Result<ContentId> {
        let id = ContentId::generate();
        let path = self.blob_path(&id);
        // write through a temp file so a crash never leaves a
        // half-written blob under a valid id
        let tmp = path.with_extension("tmp");
        tokio::fs::write(&tmp, &bytes).await?;
        tokio::fs::rename(&tmp, &path).await?;
        debug!(id = %id, size = bytes.len(), "stored blob");
        Ok(id)
    }

    async fn get(&self, id: &ContentId) -> Result<Bytes> {
        match tokio::fs::read(self.blob_path(id)).await {
            Ok(bytes) => Ok(Bytes::from(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(BlobStoreError::NotFound(id.clone()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn delete(&self, id: &ContentId) -> Result<()> {
        match tokio::fs::remove_file(self.blob_path(id)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn copy(&self, id: &ContentId) -> Result<ContentId> {
        let new_id = ContentId::generate();
        match tokio::fs::copy(self.blob_path(id), self.blob_path(&new_id)).await {
            Ok(_) => Ok(new_id),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(BlobStoreError::NotFound(id.clone()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn has(&self, id: &ContentId) -> Result<bool> {
        Ok(tokio::fs::try_exists(self.blob_path(id)).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_fs_round_trip() {
        let temp = TempDir::new().unwrap();
        let store = FsBlobStore::open(temp.path().join("blobs")).await.unwrap();

        let id = store.put(Bytes::from_static(b"on disk")).await.unwrap();
        assert!(store.has(&id).await.unwrap());
        assert_eq!(
            store.get(&id).await.unwrap(),
            Bytes::from_static(b"on disk")
        );

        let copy = store.copy(&id).await.unwrap();
        assert_ne!(copy, id);

        store.delete(&id).await.unwrap();
        assert!(!store.has(&id).await.unwrap());
        assert!(store.has(&copy).await.unwrap());
    }

    #[tokio::test]
    async fn test_fs_missing_blob() {
        let temp = TempDir::new().unwrap();
        let store = FsBlobStore::open(temp.path()).await.unwrap();

        let id = ContentId::generate();
        assert!(matches!(
            store.get(&id).await,
            Err(BlobStoreError::NotFound(_))
        ));
        // copy of a missing blob is an error, delete is not
        assert!(store.copy(&id).await.is_err());
        store.delete(&id).await.unwrap();
    }
}
