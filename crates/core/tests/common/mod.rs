#![allow(dead_code)]

use std::sync::Arc;

use filevault_blobs::MemoryBlobStore;
use filevault_core::{
    AccessResolver, Database, GrantStore, ShareOperator, StaticDirectory, Tree, UserId,
    VisibilityModel,
};

/// Fully wired in-memory stack for integration tests.
pub struct Vault {
    pub db: Database,
    pub directory: Arc<StaticDirectory>,
    pub blobs: Arc<MemoryBlobStore>,
    pub tree: Tree,
    pub grants: GrantStore,
    pub resolver: AccessResolver,
    pub visibility: VisibilityModel,
    pub sharing: ShareOperator,
}

pub async fn vault() -> anyhow::Result<Vault> {
    let db = Database::in_memory().await?;
    let directory = Arc::new(StaticDirectory::new());
    let blobs = Arc::new(MemoryBlobStore::new());
    let tree = Tree::new(db.clone(), blobs.clone());
    let grants = GrantStore::new(db.clone());
    let resolver = AccessResolver::new(db.clone(), directory.clone());
    let visibility = VisibilityModel::new(db.clone());
    let sharing = ShareOperator::new(
        db.clone(),
        tree.clone(),
        grants.clone(),
        resolver.clone(),
    );
    Ok(Vault {
        db,
        directory,
        blobs,
        tree,
        grants,
        resolver,
        visibility,
        sharing,
    })
}

pub fn user() -> UserId {
    UserId::generate()
}
