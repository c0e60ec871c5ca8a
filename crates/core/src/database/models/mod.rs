mod access_log;
mod grant;
mod node;

pub use access_log::{AccessAction, AccessLogEntry};
pub use grant::PermissionGrant;
pub use node::{NewNode, Node, NodeKind};
