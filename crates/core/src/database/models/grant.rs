use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqliteExecutor};
use uuid::Uuid;

use crate::database::types::{DBool, DUuid};
use crate::permission::PermissionType;
use crate::principal::{GroupId, UserId};

const GRANT_COLUMNS: &str = r#"
    grant_id, node_id, user_id, group_id, permission_type,
    granted_by, granted_at, expires_at, is_active, priority
"#;

/// An explicit permission grant tying a user or a group to a node.
///
/// Exactly one of `user_id`/`group_id` is set. Revocation and expiry
/// deactivate the row; only the retention sweep deletes it.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PermissionGrant {
    pub grant_id: DUuid,
    pub node_id: DUuid,
    pub user_id: Option<DUuid>,
    pub group_id: Option<DUuid>,
    pub permission_type: PermissionType,
    pub granted_by: DUuid,
    pub granted_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub is_active: DBool,
    pub priority: i64,
}

impl PermissionGrant {
    pub fn id(&self) -> Uuid {
        *self.grant_id
    }

    /// Active and not past its expiry.
    pub fn is_valid(&self, now: DateTime<Utc>) -> bool {
        if !*self.is_active {
            return false;
        }
        match self.expires_at {
            Some(expires_at) => expires_at > now,
            None => true,
        }
    }

    /// Capabilities this grant confers, per the hierarchy expansion.
    pub fn expanded_permissions(&self) -> BTreeSet<PermissionType> {
        self.permission_type.expanded()
    }

    /// Whether this grant satisfies a request for `permission` right
    /// now.
    pub fn has_permission(&self, permission: PermissionType, now: DateTime<Utc>) -> bool {
        self.is_valid(now) && self.permission_type.grants(permission)
    }

    pub async fn insert(
        node_id: Uuid,
        user_id: Option<UserId>,
        group_id: Option<GroupId>,
        permission_type: PermissionType,
        expires_at: Option<DateTime<Utc>>,
        granted_by: UserId,
        exec: impl SqliteExecutor<'_>,
    ) -> Result<PermissionGrant, sqlx::Error> {
        sqlx::query_as::<_, PermissionGrant>(&format!(
            r#"
            INSERT INTO permission_grants (
                grant_id, node_id, user_id, group_id, permission_type,
                granted_by, granted_at, expires_at, is_active, priority
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 1, ?9)
            RETURNING {GRANT_COLUMNS}
            "#
        ))
        .bind(DUuid::new())
        .bind(DUuid::from(node_id))
        .bind(user_id.map(|u| DUuid::from(u.0)))
        .bind(group_id.map(|g| DUuid::from(g.0)))
        .bind(permission_type)
        .bind(DUuid::from(granted_by.0))
        .bind(Utc::now())
        .bind(expires_at)
        .bind(permission_type.priority())
        .fetch_one(exec)
        .await
    }

    /// Find the row for an exact (node, principal, type) triple,
    /// preferring an active one. Inactive rows are visible so a
    /// re-grant reactivates instead of duplicating.
    pub async fn find_for_principal(
        node_id: Uuid,
        user_id: Option<UserId>,
        group_id: Option<GroupId>,
        permission_type: PermissionType,
        exec: impl SqliteExecutor<'_>,
    ) -> Result<Option<PermissionGrant>, sqlx::Error> {
        sqlx::query_as::<_, PermissionGrant>(&format!(
            r#"
            SELECT {GRANT_COLUMNS} FROM permission_grants
            WHERE node_id = ?1
              AND COALESCE(user_id, '') = COALESCE(?2, '')
              AND COALESCE(group_id, '') = COALESCE(?3, '')
              AND permission_type = ?4
            ORDER BY is_active DESC, granted_at DESC
            LIMIT 1
            "#
        ))
        .bind(DUuid::from(node_id))
        .bind(user_id.map(|u| DUuid::from(u.0)))
        .bind(group_id.map(|g| DUuid::from(g.0)))
        .bind(permission_type)
        .fetch_optional(exec)
        .await
    }

    /// Reactivate a grant and replace its expiry (idempotent
    /// re-grant path).
    pub async fn reactivate(
        grant_id: Uuid,
        expires_at: Option<DateTime<Utc>>,
        exec: impl SqliteExecutor<'_>,
    ) -> Result<PermissionGrant, sqlx::Error> {
        sqlx::query_as::<_, PermissionGrant>(&format!(
            r#"
            UPDATE permission_grants
            SET is_active = 1, expires_at = ?1
            WHERE grant_id = ?2
            RETURNING {GRANT_COLUMNS}
            "#
        ))
        .bind(expires_at)
        .bind(DUuid::from(grant_id))
        .fetch_one(exec)
        .await
    }

    /// Deactivate active grants for a principal on a node, optionally
    /// scoped to one permission type. Returns rows affected.
    pub async fn deactivate_for_principal(
        node_id: Uuid,
        user_id: Option<UserId>,
        group_id: Option<GroupId>,
        permission_type: Option<PermissionType>,
        exec: impl SqliteExecutor<'_>,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE permission_grants
            SET is_active = 0
            WHERE node_id = ?1
              AND COALESCE(user_id, '') = COALESCE(?2, '')
              AND COALESCE(group_id, '') = COALESCE(?3, '')
              AND (?4 IS NULL OR permission_type = ?4)
              AND is_active = 1
            "#,
        )
        .bind(DUuid::from(node_id))
        .bind(user_id.map(|u| DUuid::from(u.0)))
        .bind(group_id.map(|g| DUuid::from(g.0)))
        .bind(permission_type)
        .execute(exec)
        .await?;
        Ok(result.rows_affected())
    }

    /// The highest-priority valid user-targeted grant for a user on a
    /// node.
    pub async fn best_user_grant(
        node_id: Uuid,
        user: UserId,
        now: DateTime<Utc>,
        exec: impl SqliteExecutor<'_>,
    ) -> Result<Option<PermissionGrant>, sqlx::Error> {
        sqlx::query_as::<_, PermissionGrant>(&format!(
            r#"
            SELECT {GRANT_COLUMNS} FROM permission_grants
            WHERE node_id = ?1 AND user_id = ?2 AND group_id IS NULL
              AND is_active = 1
              AND (expires_at IS NULL OR expires_at > ?3)
            ORDER BY priority DESC
            LIMIT 1
            "#
        ))
        .bind(DUuid::from(node_id))
        .bind(DUuid::from(user.0))
        .bind(now)
        .fetch_optional(exec)
        .await
    }

    /// The highest-priority valid group-targeted grant across any of
    /// the given groups (max over all groups, not per group).
    pub async fn best_group_grant(
        node_id: Uuid,
        groups: &[GroupId],
        now: DateTime<Utc>,
        exec: impl SqliteExecutor<'_>,
    ) -> Result<Option<PermissionGrant>, sqlx::Error> {
        if groups.is_empty() {
            return Ok(None);
        }
        let candidates = sqlx::query_as::<_, PermissionGrant>(&format!(
            r#"
            SELECT {GRANT_COLUMNS} FROM permission_grants
            WHERE node_id = ?1 AND group_id IS NOT NULL AND user_id IS NULL
              AND is_active = 1
              AND (expires_at IS NULL OR expires_at > ?2)
            ORDER BY priority DESC
            "#
        ))
        .bind(DUuid::from(node_id))
        .bind(now)
        .fetch_all(exec)
        .await?;

        Ok(candidates.into_iter().find(|grant| {
            grant
                .group_id
                .map(|id| groups.contains(&GroupId(*id)))
                .unwrap_or(false)
        }))
    }

    pub async fn has_active_user_grant(
        node_id: Uuid,
        exec: impl SqliteExecutor<'_>,
    ) -> Result<bool, sqlx::Error> {
        let row = sqlx::query(
            r#"
            SELECT 1 FROM permission_grants
            WHERE node_id = ?1 AND user_id IS NOT NULL AND is_active = 1
            LIMIT 1
            "#,
        )
        .bind(DUuid::from(node_id))
        .fetch_optional(exec)
        .await?;
        Ok(row.is_some())
    }

    pub async fn has_active_group_grant(
        node_id: Uuid,
        exec: impl SqliteExecutor<'_>,
    ) -> Result<bool, sqlx::Error> {
        let row = sqlx::query(
            r#"
            SELECT 1 FROM permission_grants
            WHERE node_id = ?1 AND group_id IS NOT NULL AND is_active = 1
            LIMIT 1
            "#,
        )
        .bind(DUuid::from(node_id))
        .fetch_optional(exec)
        .await?;
        Ok(row.is_some())
    }

    /// All active grants on a node, highest priority first.
    pub async fn list_active(
        node_id: Uuid,
        exec: impl SqliteExecutor<'_>,
    ) -> Result<Vec<PermissionGrant>, sqlx::Error> {
        sqlx::query_as::<_, PermissionGrant>(&format!(
            r#"
            SELECT {GRANT_COLUMNS} FROM permission_grants
            WHERE node_id = ?1 AND is_active = 1
            ORDER BY priority DESC, granted_at ASC
            "#
        ))
        .bind(DUuid::from(node_id))
        .fetch_all(exec)
        .await
    }

    /// Deactivate one page of expired-but-active grants. Returns rows
    /// affected; callers loop until zero.
    pub async fn deactivate_expired_page(
        now: DateTime<Utc>,
        limit: i64,
        exec: impl SqliteExecutor<'_>,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE permission_grants
            SET is_active = 0
            WHERE grant_id IN (
                SELECT grant_id FROM permission_grants
                WHERE is_active = 1
                  AND expires_at IS NOT NULL
                  AND expires_at < ?1
                LIMIT ?2
            )
            "#,
        )
        .bind(now)
        .bind(limit)
        .execute(exec)
        .await?;
        Ok(result.rows_affected())
    }

    /// Delete one page of long-inactive grants. Returns rows affected.
    pub async fn purge_inactive_page(
        cutoff: DateTime<Utc>,
        limit: i64,
        exec: impl SqliteExecutor<'_>,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            r#"
            DELETE FROM permission_grants
            WHERE grant_id IN (
                SELECT grant_id FROM permission_grants
                WHERE is_active = 0 AND granted_at < ?1
                LIMIT ?2
            )
            "#,
        )
        .bind(cutoff)
        .bind(limit)
        .execute(exec)
        .await?;
        Ok(result.rows_affected())
    }
}
