//! Permission types and the hierarchy expansion.
//!
//! Grant types are totally ordered by privilege (`read < write <
//! delete < share < admin`); the rank doubles as the grant priority
//! used to select the single winning grant per principal. The
//! expansion in [`PermissionType::expanded`] is the one source of
//! truth for which capabilities a grant type implies.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sqlx::encode::IsNull;
use sqlx::error::BoxDynError;
use sqlx::sqlite::{SqliteArgumentValue, SqliteTypeInfo, SqliteValueRef};
use sqlx::{Decode, Encode, Sqlite, Type};

/// A grantable capability on a node.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum PermissionType {
    Read,
    Write,
    Delete,
    Share,
    Admin,
}

impl PermissionType {
    /// Rank used as grant priority; higher overrides lower when one
    /// principal holds several grant types on the same node.
    pub fn priority(&self) -> i64 {
        match self {
            PermissionType::Read => 1,
            PermissionType::Write => 2,
            PermissionType::Delete => 3,
            PermissionType::Share => 4,
            PermissionType::Admin => 5,
        }
    }

    /// The full capability set this grant type implies.
    ///
    /// `share` deliberately does not imply `write` or `delete`; every
    /// type implies at least `read`.
    pub fn expanded(&self) -> BTreeSet<PermissionType> {
        use PermissionType::*;
        let slice: &[PermissionType] = match self {
            Admin => &[Read, Write, Delete, Share, Admin],
            Delete => &[Read, Write, Delete],
            Write => &[Read, Write],
            Share => &[Read, Share],
            Read => &[Read],
        };
        slice.iter().copied().collect()
    }

    /// Whether a grant of this type satisfies a request for `other`.
    pub fn grants(&self, other: PermissionType) -> bool {
        self.expanded().contains(&other)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PermissionType::Read => "read",
            PermissionType::Write => "write",
            PermissionType::Delete => "delete",
            PermissionType::Share => "share",
            PermissionType::Admin => "admin",
        }
    }

    /// Every permission type, for "owner/superuser gets everything".
    pub fn all() -> BTreeSet<PermissionType> {
        PermissionType::Admin.expanded()
    }
}

impl fmt::Display for PermissionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for PermissionType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "read" => Ok(PermissionType::Read),
            "write" => Ok(PermissionType::Write),
            "delete" => Ok(PermissionType::Delete),
            "share" => Ok(PermissionType::Share),
            "admin" => Ok(PermissionType::Admin),
            other => Err(format!("unrecognized permission type: {other:?}")),
        }
    }
}

impl Decode<'_, Sqlite> for PermissionType {
    fn decode(value: SqliteValueRef<'_>) -> Result<Self, BoxDynError> {
        let s = <String as Decode<Sqlite>>::decode(value)?;
        Ok(s.parse::<PermissionType>()?)
    }
}

impl Encode<'_, Sqlite> for PermissionType {
    fn encode_by_ref(
        &self,
        args: &mut Vec<SqliteArgumentValue<'_>>,
    ) -> Result<IsNull, BoxDynError> {
        args.push(SqliteArgumentValue::Text(self.as_str().into()));
        Ok(IsNull::No)
    }
}

impl Type<Sqlite> for PermissionType {
    fn compatible(ty: &SqliteTypeInfo) -> bool {
        <String as Type<Sqlite>>::compatible(ty)
    }

    fn type_info() -> SqliteTypeInfo {
        <String as Type<Sqlite>>::type_info()
    }
}
