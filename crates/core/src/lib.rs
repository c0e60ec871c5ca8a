//! Hierarchical access control over a logical file tree.
//!
//! The core keeps a tree of file and directory nodes in SQLite,
//! explicit permission grants (per user or per group, with expiry),
//! coarse shared-user/shared-group sets, and a cached visibility
//! classification per node. Around that state it offers:
//!
//! - [`tree::Tree`]: create/move/copy, the soft/hard delete
//!   lifecycle, and race-safe nested directory materialization
//! - [`grants::GrantStore`]: idempotent grant issue, deactivating
//!   revoke, and the paged retention sweep
//! - [`resolver::AccessResolver`]: the single authorization question,
//!   resolved from superuser/ownership/grants/visibility in a fixed
//!   order
//! - [`sharing`]: sharing inheritance for new nodes and recursive
//!   share/unshare over subtrees
//!
//! File bytes live behind the [`filevault_blobs::BlobStore`] trait;
//! user and group membership behind
//! [`principal::PrincipalDirectory`]. The core never mutates
//! accounts and never serves bytes itself.

pub mod config;
pub mod database;
pub mod error;
pub mod grants;
pub mod permission;
pub mod principal;
pub mod resolver;
pub mod sharing;
pub mod tree;
pub mod visibility;

pub use config::{Config, RetentionConfig};
pub use database::models::{
    AccessAction, AccessLogEntry, NewNode, Node, NodeKind, PermissionGrant,
};
pub use database::Database;
pub use error::{CoreError, Result};
pub use grants::{GrantPrincipal, GrantSpec, GrantStore};
pub use permission::PermissionType;
pub use principal::{GroupId, PrincipalDirectory, StaticDirectory, UserId};
pub use resolver::AccessResolver;
pub use sharing::{determine_sharing, ShareOperator, ShareReport, SharingDecision, UnshareReport};
pub use tree::Tree;
pub use visibility::{Visibility, VisibilityModel};
