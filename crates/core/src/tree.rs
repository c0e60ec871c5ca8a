//! Operations on the logical node tree.
//!
//! The tree owns structural mutation: create, move, copy, the
//! soft/hard delete lifecycle, and nested directory materialization.
//! File bytes live behind the blob store; every operation that
//! touches both writes the bytes first so a crash leaves at most an
//! orphaned blob, never metadata pointing at nothing.

use std::str::FromStr;
use std::sync::Arc;

use filevault_blobs::{BlobStore, BlobStoreError, ContentId};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::database::models::{AccessAction, AccessLogEntry, NewNode, Node, NodeKind};
use crate::database::Database;
use crate::error::{CoreError, Result};
use crate::principal::{GroupId, UserId};
use crate::sharing::SharingDecision;
use crate::visibility::Visibility;

const PATH_CREATE_ATTEMPTS: usize = 3;

#[derive(Clone)]
pub struct Tree {
    db: Database,
    blobs: Arc<dyn BlobStore>,
}

impl Tree {
    pub fn new(db: Database, blobs: Arc<dyn BlobStore>) -> Self {
        Self { db, blobs }
    }

    pub fn blobs(&self) -> &Arc<dyn BlobStore> {
        &self.blobs
    }

    /// Insert a node. A sibling with the same (owner, name, kind)
    /// among non-deleted nodes is rejected as a duplicate; callers
    /// wanting auto-rename go through [`Tree::unique_name`] first.
    pub async fn create_node(&self, spec: NewNode) -> Result<Node> {
        self.insert_node(spec, &[], &[]).await
    }

    /// Insert a node carrying a resolved sharing decision: the
    /// decision's visibility plus its shared-user and shared-group
    /// sets, all committed together.
    pub async fn create_node_with_sharing(
        &self,
        mut spec: NewNode,
        decision: &SharingDecision,
    ) -> Result<Node> {
        spec.visibility = decision.visibility;
        self.insert_node(spec, &decision.shared_users, &decision.shared_groups)
            .await
    }

    async fn insert_node(
        &self,
        spec: NewNode,
        shared_users: &[UserId],
        shared_groups: &[GroupId],
    ) -> Result<Node> {
        let mut tx = self.db.begin().await?;
        let node = Node::create(&spec, &mut *tx).await.map_err(|err| {
            if CoreError::is_unique_violation(&err) {
                CoreError::DuplicateName {
                    name: spec.name.clone(),
                    kind: spec.kind.to_string(),
                }
            } else {
                err.into()
            }
        })?;
        for user in shared_users {
            Node::add_shared_user(node.id(), *user, &mut *tx).await?;
        }
        for group in shared_groups {
            Node::add_shared_group(node.id(), *group, &mut *tx).await?;
        }
        AccessLogEntry::record(
            node.id(),
            Some(spec.owner),
            AccessAction::Create,
            None,
            None,
            &mut *tx,
        )
        .await?;
        tx.commit().await?;
        debug!(node_id = %node.id(), name = %node.name, kind = %node.kind, "created node");
        Ok(node)
    }

    /// Store `bytes` and insert a file node referencing them. Bytes
    /// land in the blob store before the row exists.
    pub async fn create_file(&self, mut spec: NewNode, bytes: bytes::Bytes) -> Result<Node> {
        let size = bytes.len() as i64;
        let content_id = self.blobs.put(bytes).await?;
        spec.kind = NodeKind::File;
        spec.storage_ref = Some(content_id.to_string());
        spec.size = Some(size);
        self.create_node(spec).await
    }

    /// [`Tree::create_file`] carrying a resolved sharing decision.
    pub async fn create_file_with_sharing(
        &self,
        mut spec: NewNode,
        decision: &SharingDecision,
        bytes: bytes::Bytes,
    ) -> Result<Node> {
        let size = bytes.len() as i64;
        let content_id = self.blobs.put(bytes).await?;
        spec.kind = NodeKind::File;
        spec.storage_ref = Some(content_id.to_string());
        spec.size = Some(size);
        self.create_node_with_sharing(spec, decision).await
    }

    /// Fetch an active node or fail.
    pub async fn require_active(&self, node_id: Uuid) -> Result<Node> {
        Node::get_active(node_id, &*self.db)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("node {node_id}")))
    }

    /// Non-deleted direct children, name order.
    pub async fn children(&self, parent_id: Option<Uuid>) -> Result<Vec<Node>> {
        Ok(Node::children(parent_id, &*self.db).await?)
    }

    /// Every non-deleted node under `node`, depth-first pre-order.
    pub async fn descendants(&self, node: &Node) -> Result<Vec<Node>> {
        if !node.is_dir() {
            return Ok(Vec::new());
        }
        let mut out = Vec::new();
        let mut stack = Node::children(Some(node.id()), &*self.db).await?;
        stack.reverse();
        while let Some(current) = stack.pop() {
            let children = if current.is_dir() {
                Node::children(Some(current.id()), &*self.db).await?
            } else {
                Vec::new()
            };
            out.push(current);
            for child in children.into_iter().rev() {
                stack.push(child);
            }
        }
        Ok(out)
    }

    /// Mark a node deleted. Children are left alone; a soft delete
    /// hides the subtree root, and restore brings the whole subtree
    /// back exactly as it was.
    pub async fn soft_delete(&self, node_id: Uuid, actor: UserId) -> Result<Node> {
        let node = self.require_active(node_id).await?;
        let mut tx = self.db.begin().await?;
        Node::mark_deleted(node.id(), actor, &mut *tx).await?;
        AccessLogEntry::record(
            node.id(),
            Some(actor),
            AccessAction::Delete,
            None,
            None,
            &mut *tx,
        )
        .await?;
        tx.commit().await?;
        debug!(node_id = %node.id(), "soft-deleted node");
        Node::get(node_id, &*self.db)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("node {node_id}")))
    }

    /// Bring a soft-deleted node back. The deletion markers are
    /// cleared; everything else is untouched.
    pub async fn restore(&self, node_id: Uuid, actor: UserId) -> Result<Node> {
        let node = Node::get(node_id, &*self.db)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("node {node_id}")))?;
        if !*node.is_deleted {
            return Err(CoreError::NotSoftDeleted(node_id));
        }
        let mut tx = self.db.begin().await?;
        Node::clear_deleted(node.id(), &mut *tx).await?;
        AccessLogEntry::record(
            node.id(),
            Some(actor),
            AccessAction::Restore,
            None,
            None,
            &mut *tx,
        )
        .await?;
        tx.commit().await?;
        debug!(node_id = %node.id(), "restored node");
        Node::get(node_id, &*self.db)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("node {node_id}")))
    }

    /// Permanently remove a soft-deleted node and its entire subtree,
    /// soft-deleted descendants included. Children go before parents,
    /// and each file's bytes are released before its row, so an
    /// interrupted run can always be re-driven to completion.
    /// Returns the number of rows removed.
    pub async fn hard_delete(&self, node_id: Uuid) -> Result<u64> {
        let root = Node::get(node_id, &*self.db)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("node {node_id}")))?;
        if !*root.is_deleted {
            return Err(CoreError::NotSoftDeleted(node_id));
        }

        // Pre-order over the full subtree, deleted rows included.
        let mut ordered = Vec::new();
        let mut stack = vec![root];
        while let Some(current) = stack.pop() {
            let children = if current.is_dir() {
                Node::children_with_deleted(current.id(), &*self.db).await?
            } else {
                Vec::new()
            };
            ordered.push(current);
            for child in children.into_iter().rev() {
                stack.push(child);
            }
        }

        let mut removed = 0u64;
        for node in ordered.iter().rev() {
            if let Some(storage_ref) = &node.storage_ref {
                let content_id =
                    ContentId::from_str(storage_ref).map_err(BlobStoreError::from)?;
                // Blob delete is idempotent; a retry after a partial
                // run sails through already-released refs.
                self.blobs.delete(&content_id).await?;
            }
            if Node::delete_row(node.id(), &*self.db).await? {
                removed += 1;
            }
        }
        debug!(node_id = %node_id, removed, "hard-deleted subtree");
        Ok(removed)
    }

    /// Move a node under a new parent (None = root level), renaming
    /// to `name (n)` if the destination already has a sibling with
    /// the same name.
    pub async fn move_node(
        &self,
        node_id: Uuid,
        new_parent: Option<Uuid>,
        actor: UserId,
    ) -> Result<Node> {
        let node = self.require_active(node_id).await?;
        let dest_id = self.resolve_destination(new_parent).await?;
        if let Some(dest) = dest_id {
            self.reject_subtree_destination(node.id(), dest).await?;
        }
        let name = self.unique_name(dest_id, &node.name).await?;

        let mut tx = self.db.begin().await?;
        Node::set_parent_and_name(node.id(), dest_id, &name, &mut *tx).await?;
        AccessLogEntry::record(
            node.id(),
            Some(actor),
            AccessAction::Move,
            None,
            None,
            &mut *tx,
        )
        .await?;
        tx.commit().await?;
        debug!(node_id = %node.id(), name = %name, "moved node");
        self.require_active(node_id).await
    }

    /// Copy a node into a destination directory. The copy is owned by
    /// `actor`, keeps the source's visibility and shared sets, and for
    /// files gets its own independent copy of the bytes under a fresh
    /// content id. Explicit grants never follow a copy; the recipient
    /// re-shares if they want to. Directory copies are shallow.
    pub async fn copy_node(
        &self,
        node_id: Uuid,
        new_parent: Option<Uuid>,
        actor: UserId,
    ) -> Result<Node> {
        let source = self.require_active(node_id).await?;
        let dest_id = self.resolve_destination(new_parent).await?;
        let name = self.unique_name(dest_id, &source.name).await?;

        // Bytes first: duplicate the blob before any metadata lands.
        let storage_ref = match &source.storage_ref {
            Some(storage_ref) => {
                let content_id =
                    ContentId::from_str(storage_ref).map_err(BlobStoreError::from)?;
                Some(self.blobs.copy(&content_id).await?.to_string())
            }
            None => None,
        };

        let spec = NewNode {
            name,
            kind: source.kind,
            parent_id: dest_id,
            owner: actor,
            visibility: source.visibility,
            storage_ref,
            size: source.size,
            mime_type: source.mime_type.clone(),
        };

        let mut tx = self.db.begin().await?;
        let copy = Node::create(&spec, &mut *tx).await.map_err(|err| {
            if CoreError::is_unique_violation(&err) {
                CoreError::DuplicateName {
                    name: spec.name.clone(),
                    kind: spec.kind.to_string(),
                }
            } else {
                err.into()
            }
        })?;
        for user in Node::shared_users(source.id(), &mut *tx).await? {
            Node::add_shared_user(copy.id(), user, &mut *tx).await?;
        }
        for group in Node::shared_groups(source.id(), &mut *tx).await? {
            Node::add_shared_group(copy.id(), group, &mut *tx).await?;
        }
        AccessLogEntry::record(
            copy.id(),
            Some(actor),
            AccessAction::Copy,
            None,
            None,
            &mut *tx,
        )
        .await?;
        tx.commit().await?;
        debug!(source = %source.id(), copy = %copy.id(), "copied node");
        Ok(copy)
    }

    /// Walk a `/`-separated relative path below `parent`, creating
    /// missing directories owned by `owner` along the way. Empty
    /// segments are skipped. Returns the deepest directory, or None
    /// when the path has no segments.
    pub async fn ensure_directory_path(
        &self,
        parent: Option<&Node>,
        path: &str,
        owner: UserId,
        visibility: Visibility,
    ) -> Result<Option<Node>> {
        let mut current = parent.cloned();
        for segment in path.split('/').filter(|s| !s.is_empty()) {
            let parent_id = current.as_ref().map(Node::id);
            current =
                Some(self.get_or_create_directory(parent_id, owner, segment, visibility).await?);
        }
        Ok(current)
    }

    /// Find or create one directory level. When two writers race to
    /// create the same segment, the loser's insert hits the sibling
    /// uniqueness index; it re-fetches and adopts the winner's row.
    async fn get_or_create_directory(
        &self,
        parent_id: Option<Uuid>,
        owner: UserId,
        name: &str,
        visibility: Visibility,
    ) -> Result<Node> {
        for _ in 0..PATH_CREATE_ATTEMPTS {
            if let Some(existing) =
                Node::find_active_directory(parent_id, owner, name, &*self.db).await?
            {
                return Ok(existing);
            }
            let spec =
                NewNode::directory(name, parent_id, owner).with_visibility(visibility);
            match self.create_node(spec).await {
                Ok(node) => return Ok(node),
                Err(CoreError::DuplicateName { .. }) => {
                    warn!(name, "directory create lost a race, re-fetching");
                    continue;
                }
                Err(err) => return Err(err),
            }
        }
        Err(CoreError::ConcurrencyConflict(format!(
            "could not materialize directory {name:?}"
        )))
    }

    /// First free name in a directory, starting from `original` and
    /// counting up through `base (n).ext`.
    pub async fn unique_name(&self, parent_id: Option<Uuid>, original: &str) -> Result<String> {
        if !Node::sibling_name_exists(parent_id, original, &*self.db).await? {
            return Ok(original.to_string());
        }
        let (base, ext) = split_name(original);
        let mut n = 1u32;
        loop {
            let candidate = match ext {
                Some(ext) => format!("{base} ({n}).{ext}"),
                None => format!("{base} ({n})"),
            };
            if !Node::sibling_name_exists(parent_id, &candidate, &*self.db).await? {
                return Ok(candidate);
            }
            n += 1;
        }
    }

    /// A destination inside the moved node's own subtree would orphan
    /// it behind a parent cycle; walk the destination's ancestor chain
    /// and refuse if the moved node shows up.
    async fn reject_subtree_destination(&self, node_id: Uuid, dest_id: Uuid) -> Result<()> {
        let mut current = Some(dest_id);
        while let Some(id) = current {
            if id == node_id {
                return Err(CoreError::MoveIntoSubtree(node_id));
            }
            let ancestor = Node::get(id, &*self.db)
                .await?
                .ok_or_else(|| CoreError::NotFound(format!("node {id}")))?;
            current = ancestor.parent_id.map(|parent| *parent);
        }
        Ok(())
    }

    async fn resolve_destination(&self, new_parent: Option<Uuid>) -> Result<Option<Uuid>> {
        match new_parent {
            None => Ok(None),
            Some(id) => {
                let dest = self.require_active(id).await?;
                if !dest.is_dir() {
                    return Err(CoreError::NotFound(format!(
                        "destination directory {id}"
                    )));
                }
                Ok(Some(dest.id()))
            }
        }
    }
}

/// Split a file name into stem and extension the way the rename pass
/// expects: the last dot separates them, except a leading dot alone
/// (".env") names a stem, not an extension.
fn split_name(name: &str) -> (&str, Option<&str>) {
    match name.rsplit_once('.') {
        Some((base, ext)) if !base.is_empty() && !ext.is_empty() => (base, Some(ext)),
        _ => (name, None),
    }
}

#[cfg(test)]
mod tests {
    use super::split_name;

    #[test]
    fn split_name_variants() {
        assert_eq!(split_name("report.pdf"), ("report", Some("pdf")));
        assert_eq!(split_name("archive.tar.gz"), ("archive.tar", Some("gz")));
        assert_eq!(split_name("README"), ("README", None));
        assert_eq!(split_name(".env"), (".env", None));
        assert_eq!(split_name("trailing."), ("trailing.", None));
    }
}
