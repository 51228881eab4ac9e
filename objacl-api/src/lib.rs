//! objacl-api: Shared types for the objacl access-control engine
//!
//! This crate defines the model that the engine and its collaborators agree on:
//! object identities, security identifiers, permissions, access control entries,
//! ACL aggregates, principals, and the [`Entity`] trait through which domain
//! objects expose their identity, inheritance contract, and associations.

pub mod acl;
pub mod entity;
pub mod identity;
pub mod permission;
pub mod principal;
pub mod sid;

pub use acl::{AccessControlEntry, Acl, AclModelError};
pub use entity::{Association, Entity, InheritanceMode};
pub use identity::ObjectIdentity;
pub use permission::Permission;
pub use principal::Principal;
pub use sid::Sid;

/// Well-known authority and principal names
pub mod authority {
    /// Members of this group administer every object
    pub const ADMIN_GROUP: &str = "GROUP_ADMIN";
    /// Service agents that may read every object
    pub const AGENT_GROUP: &str = "GROUP_AGENT";
    /// Authority held by unauthenticated callers
    pub const ANONYMOUS: &str = "IS_AUTHENTICATED_ANONYMOUSLY";
    /// Temporarily elevated privileges (e.g., creating users on behalf of someone)
    pub const RUN_AS_ADMIN: &str = "GROUP_RUN_AS_ADMIN";
    /// Prefix shared by group authorities
    pub const GROUP_PREFIX: &str = "GROUP_";
    /// Principal name of unauthenticated callers
    pub const ANONYMOUS_USER: &str = "anonymousUser";
}
