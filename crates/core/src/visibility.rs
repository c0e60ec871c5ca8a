//! Coarse sharing classification of a node.
//!
//! Visibility is a denormalized cache over the grant store and the
//! shared-user/shared-group sets, kept for cheap listing filters. It
//! is never the sole authority for an access decision; the resolver
//! consults explicit grants first and only falls back to it.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sqlx::encode::IsNull;
use sqlx::error::BoxDynError;
use sqlx::sqlite::{SqliteArgumentValue, SqliteTypeInfo, SqliteValueRef};
use sqlx::{Decode, Encode, Sqlite, SqliteConnection, Type};
use tracing::debug;
use uuid::Uuid;

use crate::database::models::{AccessAction, AccessLogEntry, Node, PermissionGrant};
use crate::database::Database;
use crate::error::{CoreError, Result};
use crate::principal::{GroupId, UserId};

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    #[default]
    Private,
    /// Shared with the explicit shared-user set.
    #[serde(rename = "user")]
    UserShared,
    /// Shared with the explicit shared-group set.
    #[serde(rename = "group")]
    GroupShared,
    Public,
}

impl Visibility {
    pub fn as_str(&self) -> &'static str {
        match self {
            Visibility::Private => "private",
            Visibility::UserShared => "user",
            Visibility::GroupShared => "group",
            Visibility::Public => "public",
        }
    }
}

impl fmt::Display for Visibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Visibility {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "private" => Ok(Visibility::Private),
            "user" => Ok(Visibility::UserShared),
            "group" => Ok(Visibility::GroupShared),
            "public" => Ok(Visibility::Public),
            other => Err(format!("unrecognized visibility: {other:?}")),
        }
    }
}

impl Decode<'_, Sqlite> for Visibility {
    fn decode(value: SqliteValueRef<'_>) -> Result<Self, BoxDynError> {
        let s = <String as Decode<Sqlite>>::decode(value)?;
        Ok(s.parse::<Visibility>()?)
    }
}

impl Encode<'_, Sqlite> for Visibility {
    fn encode_by_ref(
        &self,
        args: &mut Vec<SqliteArgumentValue<'_>>,
    ) -> Result<IsNull, BoxDynError> {
        args.push(SqliteArgumentValue::Text(self.as_str().into()));
        Ok(IsNull::No)
    }
}

impl Type<Sqlite> for Visibility {
    fn compatible(ty: &SqliteTypeInfo) -> bool {
        <String as Type<Sqlite>>::compatible(ty)
    }

    fn type_info() -> SqliteTypeInfo {
        <String as Type<Sqlite>>::type_info()
    }
}

/// Re-derive a node's cached visibility from its grants and shared
/// sets. Runs inside the caller's transaction so the cache is
/// coherent before commit.
///
/// Priority order, first match wins:
/// 1. Public stays Public until explicitly downgraded.
/// 2. Any active user grant or shared user -> UserShared.
/// 3. Any active group grant or shared group -> GroupShared.
/// 4. Otherwise Private.
pub(crate) async fn recompute_in_tx(
    conn: &mut SqliteConnection,
    node_id: Uuid,
) -> Result<Visibility> {
    let node = Node::get(node_id, &mut *conn)
        .await?
        .ok_or_else(|| CoreError::NotFound(format!("node {node_id}")))?;

    if node.visibility == Visibility::Public {
        return Ok(Visibility::Public);
    }

    let next = if PermissionGrant::has_active_user_grant(node_id, &mut *conn).await?
        || Node::has_shared_users(node_id, &mut *conn).await?
    {
        Visibility::UserShared
    } else if PermissionGrant::has_active_group_grant(node_id, &mut *conn).await?
        || Node::has_shared_groups(node_id, &mut *conn).await?
    {
        Visibility::GroupShared
    } else {
        Visibility::Private
    };

    if next != node.visibility {
        Node::set_visibility(node_id, next, &mut *conn).await?;
        debug!(node_id = %node_id, from = %node.visibility, to = %next, "recomputed visibility");
    }
    Ok(next)
}

/// Coarse per-node sharing state.
///
/// Mutations here (and every grant write in the grant store) trigger
/// a recompute before their transaction commits, so listings can
/// filter on the cached column without consulting grants.
#[derive(Clone, Debug)]
pub struct VisibilityModel {
    db: Database,
}

impl VisibilityModel {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Recompute and persist a node's cached visibility. Idempotent.
    pub async fn recompute_visibility(&self, node_id: Uuid) -> Result<Visibility> {
        let mut tx = self.db.begin().await?;
        let visibility = recompute_in_tx(&mut tx, node_id).await?;
        tx.commit().await?;
        Ok(visibility)
    }

    /// Explicitly set a node's visibility, then reconcile it against
    /// grants and shared sets. Downgrading from Public happens here;
    /// the recompute alone never does it.
    pub async fn set_visibility(
        &self,
        node_id: Uuid,
        visibility: Visibility,
        actor: UserId,
    ) -> Result<Visibility> {
        let mut tx = self.db.begin().await?;
        Node::get(node_id, &mut *tx)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("node {node_id}")))?;
        Node::set_visibility(node_id, visibility, &mut *tx).await?;
        let effective = recompute_in_tx(&mut tx, node_id).await?;
        AccessLogEntry::record(
            node_id,
            Some(actor),
            AccessAction::VisibilityChange,
            None,
            None,
            &mut *tx,
        )
        .await?;
        tx.commit().await?;
        Ok(effective)
    }

    /// Replace the shared-user set.
    pub async fn set_shared_users(
        &self,
        node_id: Uuid,
        users: &[UserId],
        actor: UserId,
    ) -> Result<Visibility> {
        let mut tx = self.db.begin().await?;
        Node::get(node_id, &mut *tx)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("node {node_id}")))?;
        Node::clear_shared_users(node_id, &mut *tx).await?;
        for user in users {
            Node::add_shared_user(node_id, *user, &mut *tx).await?;
        }
        let effective = recompute_in_tx(&mut tx, node_id).await?;
        AccessLogEntry::record(
            node_id,
            Some(actor),
            AccessAction::Shared,
            None,
            None,
            &mut *tx,
        )
        .await?;
        tx.commit().await?;
        Ok(effective)
    }

    /// Replace the shared-group set.
    pub async fn set_shared_groups(
        &self,
        node_id: Uuid,
        groups: &[GroupId],
        actor: UserId,
    ) -> Result<Visibility> {
        let mut tx = self.db.begin().await?;
        Node::get(node_id, &mut *tx)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("node {node_id}")))?;
        Node::clear_shared_groups(node_id, &mut *tx).await?;
        for group in groups {
            Node::add_shared_group(node_id, *group, &mut *tx).await?;
        }
        let effective = recompute_in_tx(&mut tx, node_id).await?;
        AccessLogEntry::record(
            node_id,
            Some(actor),
            AccessAction::Shared,
            None,
            None,
            &mut *tx,
        )
        .await?;
        tx.commit().await?;
        Ok(effective)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_names_match_the_column_encoding() {
        for visibility in [
            Visibility::Private,
            Visibility::UserShared,
            Visibility::GroupShared,
            Visibility::Public,
        ] {
            let json = serde_json::to_string(&visibility).unwrap();
            assert_eq!(json, format!("{:?}", visibility.as_str()));
            assert_eq!(visibility.as_str().parse::<Visibility>(), Ok(visibility));
        }
    }

    #[test]
    fn unknown_visibility_is_rejected() {
        assert!("shared".parse::<Visibility>().is_err());
    }
}
