use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::encode::IsNull;
use sqlx::error::BoxDynError;
use sqlx::sqlite::{SqliteArgumentValue, SqliteTypeInfo, SqliteValueRef};
use sqlx::{Decode, Encode, FromRow, Sqlite, SqliteExecutor, Type};
use uuid::Uuid;

use crate::database::types::DUuid;
use crate::principal::UserId;

/// Audited action kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessAction {
    View,
    Download,
    Upload,
    Edit,
    Create,
    Delete,
    Restore,
    Move,
    Copy,
    PermissionGranted,
    PermissionRevoked,
    VisibilityChange,
    Shared,
    Unshared,
    RecursiveShare,
    RecursiveUnshare,
}

impl AccessAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccessAction::View => "view",
            AccessAction::Download => "download",
            AccessAction::Upload => "upload",
            AccessAction::Edit => "edit",
            AccessAction::Create => "create",
            AccessAction::Delete => "delete",
            AccessAction::Restore => "restore",
            AccessAction::Move => "move",
            AccessAction::Copy => "copy",
            AccessAction::PermissionGranted => "permission_granted",
            AccessAction::PermissionRevoked => "permission_revoked",
            AccessAction::VisibilityChange => "visibility_change",
            AccessAction::Shared => "shared",
            AccessAction::Unshared => "unshared",
            AccessAction::RecursiveShare => "recursive_share",
            AccessAction::RecursiveUnshare => "recursive_unshare",
        }
    }
}

impl fmt::Display for AccessAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for AccessAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "view" => Ok(AccessAction::View),
            "download" => Ok(AccessAction::Download),
            "upload" => Ok(AccessAction::Upload),
            "edit" => Ok(AccessAction::Edit),
            "create" => Ok(AccessAction::Create),
            "delete" => Ok(AccessAction::Delete),
            "restore" => Ok(AccessAction::Restore),
            "move" => Ok(AccessAction::Move),
            "copy" => Ok(AccessAction::Copy),
            "permission_granted" => Ok(AccessAction::PermissionGranted),
            "permission_revoked" => Ok(AccessAction::PermissionRevoked),
            "visibility_change" => Ok(AccessAction::VisibilityChange),
            "shared" => Ok(AccessAction::Shared),
            "unshared" => Ok(AccessAction::Unshared),
            "recursive_share" => Ok(AccessAction::RecursiveShare),
            "recursive_unshare" => Ok(AccessAction::RecursiveUnshare),
            other => Err(format!("unrecognized access action: {other:?}")),
        }
    }
}

impl Decode<'_, Sqlite> for AccessAction {
    fn decode(value: SqliteValueRef<'_>) -> Result<Self, BoxDynError> {
        let s = <String as Decode<Sqlite>>::decode(value)?;
        Ok(s.parse::<AccessAction>()?)
    }
}

impl Encode<'_, Sqlite> for AccessAction {
    fn encode_by_ref(
        &self,
        args: &mut Vec<SqliteArgumentValue<'_>>,
    ) -> Result<IsNull, BoxDynError> {
        args.push(SqliteArgumentValue::Text(self.as_str().into()));
        Ok(IsNull::No)
    }
}

impl Type<Sqlite> for AccessAction {
    fn compatible(ty: &SqliteTypeInfo) -> bool {
        <String as Type<Sqlite>>::compatible(ty)
    }

    fn type_info() -> SqliteTypeInfo {
        <String as Type<Sqlite>>::type_info()
    }
}

/// Append-only audit record. The core only writes these; querying is
/// an outer-layer concern.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct AccessLogEntry {
    pub log_id: DUuid,
    pub node_id: DUuid,
    pub user_id: Option<DUuid>,
    pub action: AccessAction,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl AccessLogEntry {
    pub async fn record(
        node_id: Uuid,
        user: Option<UserId>,
        action: AccessAction,
        ip_address: Option<&str>,
        user_agent: Option<&str>,
        exec: impl SqliteExecutor<'_>,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO access_log (
                log_id, node_id, user_id, action, ip_address, user_agent, timestamp
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
        )
        .bind(DUuid::new())
        .bind(DUuid::from(node_id))
        .bind(user.map(|u| DUuid::from(u.0)))
        .bind(action)
        .bind(ip_address)
        .bind(user_agent)
        .bind(Utc::now())
        .execute(exec)
        .await?;
        Ok(())
    }
}
