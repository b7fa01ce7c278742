//! ACL types mirrored between the metadata log and the legacy store.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Kind of resource an ACL pattern applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AclResourceType {
    /// A topic.
    Topic,
    /// A consumer group.
    Group,
    /// The cluster itself.
    Cluster,
    /// A transactional id.
    TransactionalId,
}

/// How the pattern name matches resource names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PatternType {
    /// Exact name match.
    Literal,
    /// Prefix match.
    Prefixed,
}

/// The resource half of an ACL binding. The legacy store keys its ACL
/// znodes by this pattern, so mirrored writes are grouped by it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourcePattern {
    /// Resource kind.
    pub resource_type: AclResourceType,
    /// Resource name (or prefix).
    pub name: String,
    /// Name matching mode.
    pub pattern_type: PatternType,
}

impl fmt::Display for ResourcePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:?}:{}:{:?}",
            self.resource_type, self.name, self.pattern_type
        )
    }
}

/// Operation an ACL entry permits or denies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[allow(missing_docs)]
pub enum AclOperation {
    Read,
    Write,
    Create,
    Delete,
    Alter,
    Describe,
    All,
}

/// Whether an ACL entry allows or denies its operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[allow(missing_docs)]
pub enum AclPermission {
    Allow,
    Deny,
}

/// The principal half of an ACL binding.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AccessControlEntry {
    /// Principal the entry applies to.
    pub principal: String,
    /// Host the entry applies to (`*` for any).
    pub host: String,
    /// Operation covered.
    pub operation: AclOperation,
    /// Allow or deny.
    pub permission: AclPermission,
}

/// A complete ACL: a resource pattern bound to an access control entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AclBinding {
    /// The resource pattern.
    pub pattern: ResourcePattern,
    /// The access control entry.
    pub entry: AccessControlEntry,
}
