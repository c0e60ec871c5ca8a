//! Sharing inheritance and subtree-wide share/unshare.

use chrono::{DateTime, Utc};
use tracing::info;
use uuid::Uuid;

use crate::database::models::{AccessAction, AccessLogEntry, Node, PermissionGrant};
use crate::database::Database;
use crate::error::Result;
use crate::grants::{GrantPrincipal, GrantSpec, GrantStore};
use crate::permission::PermissionType;
use crate::principal::{GroupId, UserId};
use crate::resolver::AccessResolver;
use crate::tree::Tree;
use crate::visibility::Visibility;

/// The sharing state a new node should be created with.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SharingDecision {
    pub visibility: Visibility,
    pub shared_users: Vec<UserId>,
    pub shared_groups: Vec<GroupId>,
}

impl SharingDecision {
    fn private() -> Self {
        Self::default()
    }
}

/// Decide the sharing state for a node about to be created.
///
/// An explicit non-private request wins verbatim. A private request
/// under a shared parent inherits the parent's sharing, so a file
/// dropped into a shared folder stays visible to everyone the folder
/// was shared with, whether the creator is the folder's owner or a
/// collaborator. A private request under a private parent (or at the
/// root) stays private.
pub async fn determine_sharing(
    db: &Database,
    parent: Option<&Node>,
    requested_visibility: Visibility,
    requested_users: &[UserId],
    requested_groups: &[GroupId],
) -> Result<SharingDecision> {
    if requested_visibility != Visibility::Private {
        return Ok(SharingDecision {
            visibility: requested_visibility,
            shared_users: requested_users.to_vec(),
            shared_groups: requested_groups.to_vec(),
        });
    }

    let Some(parent) = parent else {
        return Ok(SharingDecision::private());
    };

    match parent.visibility {
        Visibility::Public => Ok(SharingDecision {
            visibility: Visibility::Public,
            ..SharingDecision::private()
        }),
        Visibility::UserShared => Ok(SharingDecision {
            visibility: Visibility::UserShared,
            shared_users: Node::shared_users(parent.id(), &**db).await?,
            shared_groups: Vec::new(),
        }),
        Visibility::GroupShared => Ok(SharingDecision {
            visibility: Visibility::GroupShared,
            shared_users: Vec::new(),
            shared_groups: Node::shared_groups(parent.id(), &**db).await?,
        }),
        Visibility::Private => Ok(SharingDecision::private()),
    }
}

/// One node that could not be processed during a subtree operation.
#[derive(Debug, Clone)]
pub struct ShareFailure {
    pub node_id: Uuid,
    pub error: String,
}

/// Outcome of a recursive share. Partial success is the expected
/// shape, not an error.
#[derive(Debug, Default)]
pub struct ShareReport {
    pub succeeded: Vec<PermissionGrant>,
    pub failed: Vec<ShareFailure>,
}

/// Outcome of a recursive unshare.
#[derive(Debug, Default)]
pub struct UnshareReport {
    pub revoked: u64,
    pub failed: Vec<ShareFailure>,
}

/// Applies grants and revokes across whole subtrees.
#[derive(Clone)]
pub struct ShareOperator {
    db: Database,
    tree: Tree,
    grants: GrantStore,
    resolver: AccessResolver,
}

impl ShareOperator {
    pub fn new(db: Database, tree: Tree, grants: GrantStore, resolver: AccessResolver) -> Self {
        Self {
            db,
            tree,
            grants,
            resolver,
        }
    }

    /// Grant `types` to a principal on `root` and every non-deleted
    /// descendant. Requires share on the root. Each grant commits on
    /// its own, so one bad node never rolls back the rest; failures
    /// are collected into the report.
    pub async fn share_recursively(
        &self,
        root_id: Uuid,
        principal: GrantPrincipal,
        types: &[PermissionType],
        expires_at: Option<DateTime<Utc>>,
        actor: UserId,
    ) -> Result<ShareReport> {
        let root = self.tree.require_active(root_id).await?;
        self.resolver
            .require(&root, Some(actor), PermissionType::Share)
            .await?;

        let mut nodes = vec![root.clone()];
        nodes.extend(self.tree.descendants(&root).await?);

        let mut report = ShareReport::default();
        for node in &nodes {
            for permission_type in types {
                let spec = GrantSpec {
                    node_id: node.id(),
                    principal,
                    permission_type: *permission_type,
                    expires_at,
                    granted_by: actor,
                };
                match self.grants.grant(spec).await {
                    Ok(grant) => report.succeeded.push(grant),
                    Err(err) => report.failed.push(ShareFailure {
                        node_id: node.id(),
                        error: err.to_string(),
                    }),
                }
            }
        }

        AccessLogEntry::record(
            root.id(),
            Some(actor),
            AccessAction::RecursiveShare,
            None,
            None,
            &*self.db,
        )
        .await?;
        info!(
            root = %root.id(),
            granted = report.succeeded.len(),
            failed = report.failed.len(),
            "recursive share"
        );
        Ok(report)
    }

    /// Revoke a principal's grants on `root` and every non-deleted
    /// descendant, optionally scoped to a subset of types (None means
    /// all of them). Same partial-success contract as
    /// [`ShareOperator::share_recursively`].
    pub async fn unshare_recursively(
        &self,
        root_id: Uuid,
        principal: GrantPrincipal,
        types: Option<&[PermissionType]>,
        actor: UserId,
    ) -> Result<UnshareReport> {
        let root = self.tree.require_active(root_id).await?;
        self.resolver
            .require(&root, Some(actor), PermissionType::Share)
            .await?;

        let mut nodes = vec![root.clone()];
        nodes.extend(self.tree.descendants(&root).await?);

        let mut report = UnshareReport::default();
        for node in &nodes {
            match self.grants.revoke(node.id(), principal, types, actor).await {
                Ok(revoked) => report.revoked += revoked,
                Err(err) => report.failed.push(ShareFailure {
                    node_id: node.id(),
                    error: err.to_string(),
                }),
            }
        }

        AccessLogEntry::record(
            root.id(),
            Some(actor),
            AccessAction::RecursiveUnshare,
            None,
            None,
            &*self.db,
        )
        .await?;
        info!(
            root = %root.id(),
            revoked = report.revoked,
            failed = report.failed.len(),
            "recursive unshare"
        );
        Ok(report)
    }
}
