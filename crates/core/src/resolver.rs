//! Access resolution.
//!
//! A single question, answered the same way everywhere: may this
//! actor perform this permission on this node? Sources are consulted
//! in a fixed order and the first conclusive one wins:
//!
//! 1. anonymous actors are denied outright
//! 2. superusers are allowed outright
//! 3. the owner is allowed outright
//! 4. best valid user-targeted grant
//! 5. best valid group-targeted grant across all the actor's groups
//! 6. the node's visibility fallback
//! 7. otherwise denied
//!
//! Grants that are inactive or past their expiry never count; a
//! request that an expired grant would have satisfied falls through
//! to the later sources as if the grant did not exist.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::Utc;

use crate::database::models::{Node, PermissionGrant};
use crate::database::Database;
use crate::error::{CoreError, Result};
use crate::permission::PermissionType;
use crate::principal::{PrincipalDirectory, UserId};
use crate::visibility::Visibility;

#[derive(Clone)]
pub struct AccessResolver {
    db: Database,
    directory: Arc<dyn PrincipalDirectory>,
}

impl AccessResolver {
    pub fn new(db: Database, directory: Arc<dyn PrincipalDirectory>) -> Self {
        Self { db, directory }
    }

    /// Resolve one access question. `actor` of None is an anonymous
    /// request and always denies.
    pub async fn can_access(
        &self,
        node: &Node,
        actor: Option<UserId>,
        permission: PermissionType,
    ) -> Result<bool> {
        let Some(user) = actor else {
            return Ok(false);
        };
        if self.directory.is_superuser(user).await? {
            return Ok(true);
        }
        if node.owner() == user {
            return Ok(true);
        }

        let now = Utc::now();
        if let Some(grant) =
            PermissionGrant::best_user_grant(node.id(), user, now, &*self.db).await?
        {
            if grant.permission_type.grants(permission) {
                return Ok(true);
            }
        }

        let groups = self.directory.groups_of(user).await?;
        if let Some(grant) =
            PermissionGrant::best_group_grant(node.id(), &groups, now, &*self.db).await?
        {
            if grant.permission_type.grants(permission) {
                return Ok(true);
            }
        }

        // Visibility fallback. A public node answers yes to every
        // permission type, not just read.
        match node.visibility {
            Visibility::Public => Ok(true),
            Visibility::UserShared => {
                Ok(Node::is_shared_with_user(node.id(), user, &*self.db).await?)
            }
            Visibility::GroupShared => {
                let shared = Node::shared_groups(node.id(), &*self.db).await?;
                Ok(groups.iter().any(|group| shared.contains(group)))
            }
            Visibility::Private => Ok(false),
        }
    }

    pub async fn can_read(&self, node: &Node, actor: Option<UserId>) -> Result<bool> {
        self.can_access(node, actor, PermissionType::Read).await
    }

    pub async fn can_write(&self, node: &Node, actor: Option<UserId>) -> Result<bool> {
        self.can_access(node, actor, PermissionType::Write).await
    }

    pub async fn can_delete(&self, node: &Node, actor: Option<UserId>) -> Result<bool> {
        self.can_access(node, actor, PermissionType::Delete).await
    }

    pub async fn can_share(&self, node: &Node, actor: Option<UserId>) -> Result<bool> {
        self.can_access(node, actor, PermissionType::Share).await
    }

    pub async fn can_admin(&self, node: &Node, actor: Option<UserId>) -> Result<bool> {
        self.can_access(node, actor, PermissionType::Admin).await
    }

    /// The permission types the actor holds on the node through
    /// ownership and explicit grants: the union of the expanded best
    /// user grant and best group grant, with owners and superusers
    /// short-circuiting to the full set.
    ///
    /// Visibility is deliberately not consulted here. A stranger who
    /// can read a public node through the fallback still has an empty
    /// effective set; this reports granted capability, not fallback
    /// reachability.
    pub async fn effective_permissions(
        &self,
        node: &Node,
        actor: Option<UserId>,
    ) -> Result<BTreeSet<PermissionType>> {
        let Some(user) = actor else {
            return Ok(BTreeSet::new());
        };
        if self.directory.is_superuser(user).await? || node.owner() == user {
            return Ok(PermissionType::all());
        }

        let now = Utc::now();
        let mut effective = BTreeSet::new();
        if let Some(grant) =
            PermissionGrant::best_user_grant(node.id(), user, now, &*self.db).await?
        {
            effective.extend(grant.permission_type.expanded());
        }
        let groups = self.directory.groups_of(user).await?;
        if let Some(grant) =
            PermissionGrant::best_group_grant(node.id(), &groups, now, &*self.db).await?
        {
            effective.extend(grant.permission_type.expanded());
        }
        Ok(effective)
    }

    /// Like [`AccessResolver::can_access`] but failing with
    /// [`CoreError::PermissionDenied`] instead of returning false.
    pub async fn require(
        &self,
        node: &Node,
        actor: Option<UserId>,
        permission: PermissionType,
    ) -> Result<()> {
        if self.can_access(node, actor, permission).await? {
            Ok(())
        } else {
            Err(CoreError::PermissionDenied {
                node_id: node.id(),
                required: permission,
            })
        }
    }
}
