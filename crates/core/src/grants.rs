//! Grant lifecycle: idempotent grants, deactivating revokes, and the
//! paged retention sweep.
//!
//! Every mutation runs in a transaction that also recomputes the
//! node's cached visibility and appends an audit entry, so the three
//! stay consistent under concurrent writers.

use chrono::{DateTime, Utc};
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::RetentionConfig;
use crate::database::models::{AccessAction, AccessLogEntry, Node, PermissionGrant};
use crate::database::Database;
use crate::error::{CoreError, Result};
use crate::permission::PermissionType;
use crate::principal::{GroupId, UserId};
use crate::visibility;

/// The subject of a grant: a single user or a whole group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GrantPrincipal {
    User(UserId),
    Group(GroupId),
}

impl GrantPrincipal {
    /// Build from optional ids as they arrive off the wire. Exactly
    /// one must be present.
    pub fn from_parts(user: Option<UserId>, group: Option<GroupId>) -> Result<Self> {
        match (user, group) {
            (Some(user), None) => Ok(GrantPrincipal::User(user)),
            (None, Some(group)) => Ok(GrantPrincipal::Group(group)),
            (Some(_), Some(_)) => Err(CoreError::InvalidGrantSpec(
                "grant names both a user and a group".into(),
            )),
            (None, None) => Err(CoreError::InvalidGrantSpec(
                "grant names neither a user nor a group".into(),
            )),
        }
    }

    pub fn user_id(&self) -> Option<UserId> {
        match self {
            GrantPrincipal::User(user) => Some(*user),
            GrantPrincipal::Group(_) => None,
        }
    }

    pub fn group_id(&self) -> Option<GroupId> {
        match self {
            GrantPrincipal::User(_) => None,
            GrantPrincipal::Group(group) => Some(*group),
        }
    }
}

/// Everything needed to issue one grant.
#[derive(Debug, Clone)]
pub struct GrantSpec {
    pub node_id: Uuid,
    pub principal: GrantPrincipal,
    pub permission_type: PermissionType,
    pub expires_at: Option<DateTime<Utc>>,
    pub granted_by: UserId,
}

/// Issues, revokes, and sweeps permission grants.
#[derive(Clone, Debug)]
pub struct GrantStore {
    db: Database,
}

impl GrantStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Issue a grant. Idempotent per (node, principal, type): if a row
    /// for that triple already exists it is reactivated and its expiry
    /// replaced, so repeated grants never pile up duplicates.
    pub async fn grant(&self, spec: GrantSpec) -> Result<PermissionGrant> {
        let node = Node::get_active(spec.node_id, &*self.db)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("node {}", spec.node_id)))?;

        let mut tx = self.db.begin().await?;
        let existing = PermissionGrant::find_for_principal(
            node.id(),
            spec.principal.user_id(),
            spec.principal.group_id(),
            spec.permission_type,
            &mut *tx,
        )
        .await?;

        let grant = match existing {
            Some(row) => PermissionGrant::reactivate(row.id(), spec.expires_at, &mut *tx).await?,
            None => {
                PermissionGrant::insert(
                    node.id(),
                    spec.principal.user_id(),
                    spec.principal.group_id(),
                    spec.permission_type,
                    spec.expires_at,
                    spec.granted_by,
                    &mut *tx,
                )
                .await?
            }
        };

        visibility::recompute_in_tx(&mut tx, node.id()).await?;
        AccessLogEntry::record(
            node.id(),
            Some(spec.granted_by),
            AccessAction::PermissionGranted,
            None,
            None,
            &mut *tx,
        )
        .await?;
        tx.commit().await?;

        debug!(
            node_id = %node.id(),
            permission = %spec.permission_type,
            "issued grant"
        );
        Ok(grant)
    }

    /// Revoke grants for a principal on a node. `types` of None means
    /// every type. Rows are deactivated, not deleted; the retention
    /// sweep purges them later. Returns the number of rows touched;
    /// zero when nothing matched, which is not an error.
    pub async fn revoke(
        &self,
        node_id: Uuid,
        principal: GrantPrincipal,
        types: Option<&[PermissionType]>,
        actor: UserId,
    ) -> Result<u64> {
        let node = Node::get(node_id, &*self.db)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("node {node_id}")))?;

        let mut tx = self.db.begin().await?;
        let mut revoked = 0;
        match types {
            None => {
                revoked += PermissionGrant::deactivate_for_principal(
                    node.id(),
                    principal.user_id(),
                    principal.group_id(),
                    None,
                    &mut *tx,
                )
                .await?;
            }
            Some(types) => {
                for permission_type in types {
                    revoked += PermissionGrant::deactivate_for_principal(
                        node.id(),
                        principal.user_id(),
                        principal.group_id(),
                        Some(*permission_type),
                        &mut *tx,
                    )
                    .await?;
                }
            }
        }

        visibility::recompute_in_tx(&mut tx, node.id()).await?;
        AccessLogEntry::record(
            node.id(),
            Some(actor),
            AccessAction::PermissionRevoked,
            None,
            None,
            &mut *tx,
        )
        .await?;
        tx.commit().await?;

        debug!(node_id = %node.id(), revoked, "revoked grants");
        Ok(revoked)
    }

    /// All active grants on a node, highest priority first.
    pub async fn list_active(&self, node_id: Uuid) -> Result<Vec<PermissionGrant>> {
        Ok(PermissionGrant::list_active(node_id, &*self.db).await?)
    }

    /// Deactivate every active grant whose expiry has passed, in
    /// pages so a large backlog never holds one long transaction.
    /// Returns the number deactivated this run.
    pub async fn deactivate_expired(&self, retention: &RetentionConfig) -> Result<u64> {
        let now = Utc::now();
        let mut total = 0u64;
        loop {
            let page =
                PermissionGrant::deactivate_expired_page(now, retention.page_size, &*self.db)
                    .await?;
            total += page;
            if page == 0 || total >= retention.max_per_run as u64 {
                break;
            }
        }
        if total > 0 {
            info!(deactivated = total, "expired grant sweep");
        }
        Ok(total)
    }

    /// Purge inactive grants older than `cutoff`, in pages. The audit
    /// log keeps the history; the grant rows themselves only need to
    /// live long enough for re-grant reactivation and review.
    pub async fn purge_inactive_older_than(
        &self,
        cutoff: DateTime<Utc>,
        retention: &RetentionConfig,
    ) -> Result<u64> {
        let mut total = 0u64;
        loop {
            let page =
                PermissionGrant::purge_inactive_page(cutoff, retention.page_size, &*self.db)
                    .await?;
            total += page;
            if page == 0 || total >= retention.max_per_run as u64 {
                break;
            }
        }
        if total > 0 {
            info!(purged = total, "inactive grant purge");
        }
        Ok(total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn principal_from_parts_requires_exactly_one() {
        let user = UserId::generate();
        let group = GroupId::generate();

        assert!(matches!(
            GrantPrincipal::from_parts(Some(user), None),
            Ok(GrantPrincipal::User(_))
        ));
        assert!(matches!(
            GrantPrincipal::from_parts(None, Some(group)),
            Ok(GrantPrincipal::Group(_))
        ));
        assert!(matches!(
            GrantPrincipal::from_parts(Some(user), Some(group)),
            Err(CoreError::InvalidGrantSpec(_))
        ));
        assert!(matches!(
            GrantPrincipal::from_parts(None, None),
            Err(CoreError::InvalidGrantSpec(_))
        ));
    }
}
