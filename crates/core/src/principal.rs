//! Principals and the account directory collaborator.
//!
//! The core never mutates accounts; it only asks two questions of an
//! external directory: is this user a superuser, and which groups do
//! they belong to. Every permission check takes the acting principal
//! explicitly - there is no ambient "current user".

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Result;

/// Identity of an authenticated user.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct UserId(pub Uuid);

impl UserId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identity of a user group.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct GroupId(pub Uuid);

impl GroupId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Read-only lookups against the surrounding account system.
#[async_trait]
pub trait PrincipalDirectory: Send + Sync {
    async fn is_superuser(&self, user: UserId) -> Result<bool>;

    async fn groups_of(&self, user: UserId) -> Result<Vec<GroupId>>;
}

/// In-memory directory for tests and embedded use.
#[derive(Debug, Default)]
pub struct StaticDirectory {
    superusers: RwLock<BTreeSet<UserId>>,
    memberships: RwLock<BTreeMap<UserId, BTreeSet<GroupId>>>,
}

impl StaticDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_superuser(&self, user: UserId) {
        self.superusers.write().insert(user);
    }

    pub fn add_membership(&self, user: UserId, group: GroupId) {
        self.memberships.write().entry(user).or_default().insert(group);
    }

    pub fn remove_membership(&self, user: UserId, group: GroupId) {
        if let Some(groups) = self.memberships.write().get_mut(&user) {
            groups.remove(&group);
        }
    }
}

#[async_trait]
impl PrincipalDirectory for StaticDirectory {
    async fn is_superuser(&self, user: UserId) -> Result<bool> {
        Ok(self.superusers.read().contains(&user))
    }

    async fn groups_of(&self, user: UserId) -> Result<Vec<GroupId>> {
        Ok(self
            .memberships
            .read()
            .get(&user)
            .map(|groups| groups.iter().copied().collect())
            .unwrap_or_default())
    }
}
