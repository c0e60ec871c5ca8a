use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::encode::IsNull;
use sqlx::error::BoxDynError;
use sqlx::sqlite::{SqliteArgumentValue, SqliteTypeInfo, SqliteValueRef};
use sqlx::{Decode, Encode, FromRow, Sqlite, SqliteExecutor, Type};
use uuid::Uuid;

use crate::database::types::{DBool, DUuid};
use crate::principal::{GroupId, UserId};
use crate::visibility::Visibility;

/// Whether a node is a file or a directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    File,
    Directory,
}

impl NodeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeKind::File => "file",
            NodeKind::Directory => "directory",
        }
    }

    pub fn is_dir(&self) -> bool {
        matches!(self, NodeKind::Directory)
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for NodeKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "file" => Ok(NodeKind::File),
            "directory" => Ok(NodeKind::Directory),
            other => Err(format!("unrecognized node kind: {other:?}")),
        }
    }
}

impl Decode<'_, Sqlite> for NodeKind {
    fn decode(value: SqliteValueRef<'_>) -> Result<Self, BoxDynError> {
        let s = <String as Decode<Sqlite>>::decode(value)?;
        Ok(s.parse::<NodeKind>()?)
    }
}

impl Encode<'_, Sqlite> for NodeKind {
    fn encode_by_ref(
        &self,
        args: &mut Vec<SqliteArgumentValue<'_>>,
    ) -> Result<IsNull, BoxDynError> {
        args.push(SqliteArgumentValue::Text(self.as_str().into()));
        Ok(IsNull::No)
    }
}

impl Type<Sqlite> for NodeKind {
    fn compatible(ty: &SqliteTypeInfo) -> bool {
        <String as Type<Sqlite>>::compatible(ty)
    }

    fn type_info() -> SqliteTypeInfo {
        <String as Type<Sqlite>>::type_info()
    }
}

const NODE_COLUMNS: &str = r#"
    node_id, name, kind, parent_id, owner_id, visibility,
    storage_ref, size, mime_type,
    is_deleted, deleted_at, deleted_by, created_at, updated_at
"#;

/// A logical file or directory. Hierarchy is carried by `parent_id`
/// only; `name` is a single path segment.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Node {
    pub node_id: DUuid,
    pub name: String,
    pub kind: NodeKind,
    pub parent_id: Option<DUuid>,
    pub owner_id: DUuid,
    pub visibility: Visibility,
    pub storage_ref: Option<String>,
    pub size: Option<i64>,
    pub mime_type: Option<String>,
    pub is_deleted: DBool,
    pub deleted_at: Option<DateTime<Utc>>,
    pub deleted_by: Option<DUuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Parameters for inserting a node.
#[derive(Debug, Clone)]
pub struct NewNode {
    pub name: String,
    pub kind: NodeKind,
    pub parent_id: Option<Uuid>,
    pub owner: UserId,
    pub visibility: Visibility,
    pub storage_ref: Option<String>,
    pub size: Option<i64>,
    pub mime_type: Option<String>,
}

impl NewNode {
    pub fn directory(name: impl Into<String>, parent_id: Option<Uuid>, owner: UserId) -> Self {
        Self {
            name: name.into(),
            kind: NodeKind::Directory,
            parent_id,
            owner,
            visibility: Visibility::Private,
            storage_ref: None,
            size: None,
            mime_type: None,
        }
    }

    /// A file spec without bytes yet; the tree fills in the storage
    /// ref and size once the blob write has succeeded.
    pub fn file(name: impl Into<String>, parent_id: Option<Uuid>, owner: UserId) -> Self {
        Self {
            name: name.into(),
            kind: NodeKind::File,
            parent_id,
            owner,
            visibility: Visibility::Private,
            storage_ref: None,
            size: None,
            mime_type: None,
        }
    }

    pub fn with_visibility(mut self, visibility: Visibility) -> Self {
        self.visibility = visibility;
        self
    }

    pub fn with_size(mut self, size: i64) -> Self {
        self.size = Some(size);
        self
    }

    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = Some(mime_type.into());
        self
    }
}

impl Node {
    pub fn id(&self) -> Uuid {
        *self.node_id
    }

    pub fn owner(&self) -> UserId {
        UserId(*self.owner_id)
    }

    pub fn is_dir(&self) -> bool {
        self.kind.is_dir()
    }

    /// Insert a new node row. A uniqueness violation here means an
    /// active sibling with the same (owner, name, kind) exists.
    pub async fn create(
        spec: &NewNode,
        exec: impl SqliteExecutor<'_>,
    ) -> Result<Node, sqlx::Error> {
        let node_id = DUuid::new();
        let now = Utc::now();
        sqlx::query_as::<_, Node>(&format!(
            r#"
            INSERT INTO nodes (
                node_id, name, kind, parent_id, owner_id, visibility,
                storage_ref, size, mime_type, created_at, updated_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            RETURNING {NODE_COLUMNS}
            "#
        ))
        .bind(node_id)
        .bind(&spec.name)
        .bind(spec.kind)
        .bind(spec.parent_id.map(DUuid::from))
        .bind(DUuid::from(spec.owner.0))
        .bind(spec.visibility)
        .bind(&spec.storage_ref)
        .bind(spec.size)
        .bind(&spec.mime_type)
        .bind(now)
        .bind(now)
        .fetch_one(exec)
        .await
    }

    /// Fetch a node regardless of deletion state.
    pub async fn get(
        node_id: Uuid,
        exec: impl SqliteExecutor<'_>,
    ) -> Result<Option<Node>, sqlx::Error> {
        sqlx::query_as::<_, Node>(&format!(
            "SELECT {NODE_COLUMNS} FROM nodes WHERE node_id = ?1"
        ))
        .bind(DUuid::from(node_id))
        .fetch_optional(exec)
        .await
    }

    /// Fetch a node, excluding soft-deleted ones.
    pub async fn get_active(
        node_id: Uuid,
        exec: impl SqliteExecutor<'_>,
    ) -> Result<Option<Node>, sqlx::Error> {
        sqlx::query_as::<_, Node>(&format!(
            "SELECT {NODE_COLUMNS} FROM nodes WHERE node_id = ?1 AND is_deleted = 0"
        ))
        .bind(DUuid::from(node_id))
        .fetch_optional(exec)
        .await
    }

    /// Non-deleted direct children of a parent (None = root level).
    pub async fn children(
        parent_id: Option<Uuid>,
        exec: impl SqliteExecutor<'_>,
    ) -> Result<Vec<Node>, sqlx::Error> {
        sqlx::query_as::<_, Node>(&format!(
            r#"
            SELECT {NODE_COLUMNS} FROM nodes
            WHERE COALESCE(parent_id, '') = COALESCE(?1, '') AND is_deleted = 0
            ORDER BY name
            "#
        ))
        .bind(parent_id.map(DUuid::from))
        .fetch_all(exec)
        .await
    }

    /// Direct children including soft-deleted ones; hard delete must
    /// sweep those too.
    pub async fn children_with_deleted(
        parent_id: Uuid,
        exec: impl SqliteExecutor<'_>,
    ) -> Result<Vec<Node>, sqlx::Error> {
        sqlx::query_as::<_, Node>(&format!(
            "SELECT {NODE_COLUMNS} FROM nodes WHERE parent_id = ?1 ORDER BY name"
        ))
        .bind(DUuid::from(parent_id))
        .fetch_all(exec)
        .await
    }

    /// Look up an active directory by (parent, owner, name), the key
    /// used when materializing nested upload paths.
    pub async fn find_active_directory(
        parent_id: Option<Uuid>,
        owner: UserId,
        name: &str,
        exec: impl SqliteExecutor<'_>,
    ) -> Result<Option<Node>, sqlx::Error> {
        sqlx::query_as::<_, Node>(&format!(
            r#"
            SELECT {NODE_COLUMNS} FROM nodes
            WHERE COALESCE(parent_id, '') = COALESCE(?1, '')
              AND owner_id = ?2 AND name = ?3
              AND kind = 'directory' AND is_deleted = 0
            "#
        ))
        .bind(parent_id.map(DUuid::from))
        .bind(DUuid::from(owner.0))
        .bind(name)
        .fetch_optional(exec)
        .await
    }

    /// Whether any active sibling (any owner, any kind) already uses
    /// this name. Used by the `name (n)` resolution pass.
    pub async fn sibling_name_exists(
        parent_id: Option<Uuid>,
        name: &str,
        exec: impl SqliteExecutor<'_>,
    ) -> Result<bool, sqlx::Error> {
        let row = sqlx::query(
            r#"
            SELECT 1 FROM nodes
            WHERE COALESCE(parent_id, '') = COALESCE(?1, '')
              AND name = ?2 AND is_deleted = 0
            LIMIT 1
            "#,
        )
        .bind(parent_id.map(DUuid::from))
        .bind(name)
        .fetch_optional(exec)
        .await?;
        Ok(row.is_some())
    }

    pub async fn mark_deleted(
        node_id: Uuid,
        deleted_by: UserId,
        exec: impl SqliteExecutor<'_>,
    ) -> Result<(), sqlx::Error> {
        let now = Utc::now();
        sqlx::query(
            r#"
            UPDATE nodes
            SET is_deleted = 1, deleted_at = ?1, deleted_by = ?2, updated_at = ?1
            WHERE node_id = ?3
            "#,
        )
        .bind(now)
        .bind(DUuid::from(deleted_by.0))
        .bind(DUuid::from(node_id))
        .execute(exec)
        .await?;
        Ok(())
    }

    pub async fn clear_deleted(
        node_id: Uuid,
        exec: impl SqliteExecutor<'_>,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            UPDATE nodes
            SET is_deleted = 0, deleted_at = NULL, deleted_by = NULL, updated_at = ?1
            WHERE node_id = ?2
            "#,
        )
        .bind(Utc::now())
        .bind(DUuid::from(node_id))
        .execute(exec)
        .await?;
        Ok(())
    }

    /// Remove the row. Grants and sharing relations cascade.
    pub async fn delete_row(
        node_id: Uuid,
        exec: impl SqliteExecutor<'_>,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM nodes WHERE node_id = ?1")
            .bind(DUuid::from(node_id))
            .execute(exec)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn set_parent_and_name(
        node_id: Uuid,
        parent_id: Option<Uuid>,
        name: &str,
        exec: impl SqliteExecutor<'_>,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE nodes SET parent_id = ?1, name = ?2, updated_at = ?3 WHERE node_id = ?4",
        )
        .bind(parent_id.map(DUuid::from))
        .bind(name)
        .bind(Utc::now())
        .bind(DUuid::from(node_id))
        .execute(exec)
        .await?;
        Ok(())
    }

    pub async fn set_visibility(
        node_id: Uuid,
        visibility: Visibility,
        exec: impl SqliteExecutor<'_>,
    ) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE nodes SET visibility = ?1, updated_at = ?2 WHERE node_id = ?3")
            .bind(visibility)
            .bind(Utc::now())
            .bind(DUuid::from(node_id))
            .execute(exec)
            .await?;
        Ok(())
    }

    // ---- shared-user / shared-group relations ----

    pub async fn shared_users(
        node_id: Uuid,
        exec: impl SqliteExecutor<'_>,
    ) -> Result<Vec<UserId>, sqlx::Error> {
        let rows = sqlx::query_as::<_, (DUuid,)>(
            "SELECT user_id FROM node_shared_users WHERE node_id = ?1 ORDER BY user_id",
        )
        .bind(DUuid::from(node_id))
        .fetch_all(exec)
        .await?;
        Ok(rows.into_iter().map(|(id,)| UserId(*id)).collect())
    }

    pub async fn shared_groups(
        node_id: Uuid,
        exec: impl SqliteExecutor<'_>,
    ) -> Result<Vec<GroupId>, sqlx::Error> {
        let rows = sqlx::query_as::<_, (DUuid,)>(
            "SELECT group_id FROM node_shared_groups WHERE node_id = ?1 ORDER BY group_id",
        )
        .bind(DUuid::from(node_id))
        .fetch_all(exec)
        .await?;
        Ok(rows.into_iter().map(|(id,)| GroupId(*id)).collect())
    }

    pub async fn is_shared_with_user(
        node_id: Uuid,
        user: UserId,
        exec: impl SqliteExecutor<'_>,
    ) -> Result<bool, sqlx::Error> {
        let row = sqlx::query(
            "SELECT 1 FROM node_shared_users WHERE node_id = ?1 AND user_id = ?2",
        )
        .bind(DUuid::from(node_id))
        .bind(DUuid::from(user.0))
        .fetch_optional(exec)
        .await?;
        Ok(row.is_some())
    }

    pub async fn add_shared_user(
        node_id: Uuid,
        user: UserId,
        exec: impl SqliteExecutor<'_>,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT OR IGNORE INTO node_shared_users (node_id, user_id) VALUES (?1, ?2)",
        )
        .bind(DUuid::from(node_id))
        .bind(DUuid::from(user.0))
        .execute(exec)
        .await?;
        Ok(())
    }

    pub async fn add_shared_group(
        node_id: Uuid,
        group: GroupId,
        exec: impl SqliteExecutor<'_>,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT OR IGNORE INTO node_shared_groups (node_id, group_id) VALUES (?1, ?2)",
        )
        .bind(DUuid::from(node_id))
        .bind(DUuid::from(group.0))
        .execute(exec)
        .await?;
        Ok(())
    }

    pub async fn clear_shared_users(
        node_id: Uuid,
        exec: impl SqliteExecutor<'_>,
    ) -> Result<(), sqlx::Error> {
        sqlx::query("DELETE FROM node_shared_users WHERE node_id = ?1")
            .bind(DUuid::from(node_id))
            .execute(exec)
            .await?;
        Ok(())
    }

    pub async fn clear_shared_groups(
        node_id: Uuid,
        exec: impl SqliteExecutor<'_>,
    ) -> Result<(), sqlx::Error> {
        sqlx::query("DELETE FROM node_shared_groups WHERE node_id = ?1")
            .bind(DUuid::from(node_id))
            .execute(exec)
            .await?;
        Ok(())
    }

    pub async fn has_shared_users(
        node_id: Uuid,
        exec: impl SqliteExecutor<'_>,
    ) -> Result<bool, sqlx::Error> {
        let row = sqlx::query("SELECT 1 FROM node_shared_users WHERE node_id = ?1 LIMIT 1")
            .bind(DUuid::from(node_id))
            .fetch_optional(exec)
            .await?;
        Ok(row.is_some())
    }

    pub async fn has_shared_groups(
        node_id: Uuid,
        exec: impl SqliteExecutor<'_>,
    ) -> Result<bool, sqlx::Error> {
        let row = sqlx::query("SELECT 1 FROM node_shared_groups WHERE node_id = ?1 LIMIT 1")
            .bind(DUuid::from(node_id))
            .fetch_optional(exec)
            .await?;
        Ok(row.is_some())
    }
}
