//! Engine-level error taxonomy

use objacl_api::{AclModelError, ObjectIdentity};
use thiserror::Error;

use crate::audit::AuditError;
use crate::config::ConfigError;
use crate::sid::HierarchyError;
use crate::store::StoreError;

/// Result alias for engine operations
pub type Result<T> = std::result::Result<T, AclError>;

/// Errors that abort an engine operation
///
/// Anomalies that only affect one association branch (a pruning mismatch, an
/// object without identity) are logged instead and never surface here.
#[derive(Debug, Error)]
pub enum AclError {
    /// Update requested on an object that never received an ACL
    #[error("No ACL found for {0}; it should have been created before the update")]
    AclMissing(ObjectIdentity),

    /// Neither the child nor its parent defines any ACE
    #[error("Either the child or the parent has to have ACEs (child: {child}, parent: {parent})")]
    InconsistentAcl {
        child: ObjectIdentity,
        parent: ObjectIdentity,
    },

    /// Attempt to re-link an ACL to a different parent
    #[error("Cannot change the parent ACL of {object} once set (current: {current}, proposed: {proposed})")]
    ParentConflict {
        object: ObjectIdentity,
        current: ObjectIdentity,
        proposed: ObjectIdentity,
    },

    /// Collection query called with no objects
    #[error("Collection query requires at least one object")]
    EmptyBatch,

    /// Principal may not edit the ACL of this object
    #[error("{principal} may not change the ACL of {identity}")]
    AccessDenied {
        identity: ObjectIdentity,
        principal: String,
    },

    /// Object identity could not be determined
    #[error("Cannot resolve an object identity for {0}")]
    UnresolvableIdentity(String),

    /// Association could not be inspected and the policy forbids assuming it is fine
    #[error("Association '{property}' on {type_name} is not loaded")]
    UnloadedAssociation { type_name: String, property: String },

    /// Graph walk exceeded the configured depth limit
    #[error("Association graph deeper than {max_depth} levels")]
    DepthLimitExceeded { max_depth: usize },

    #[error("ACL model violation: {0}")]
    Model(AclModelError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Hierarchy(#[from] HierarchyError),

    #[error(transparent)]
    Audit(#[from] AuditError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl From<AclModelError> for AclError {
    fn from(err: AclModelError) -> Self {
        match err {
            AclModelError::ParentConflict {
                child,
                current,
                proposed,
            } => Self::ParentConflict {
                object: child,
                current,
                proposed,
            },
            other => Self::Model(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parent_conflict_maps_to_engine_variant() {
        let err: AclError = AclModelError::ParentConflict {
            child: ObjectIdentity::new("Sample", 1),
            current: ObjectIdentity::new("Project", 1),
            proposed: ObjectIdentity::new("Project", 2),
        }
        .into();
        assert!(matches!(err, AclError::ParentConflict { .. }));
        assert!(err.to_string().contains("Project#2"));
    }

    #[test]
    fn test_other_model_errors_are_wrapped() {
        let err: AclError = AclModelError::SelfParent(ObjectIdentity::new("Sample", 1)).into();
        assert!(matches!(err, AclError::Model(_)));
    }

    #[test]
    fn test_store_errors_convert() {
        let err: AclError = StoreError::NotFound(ObjectIdentity::new("Sample", 9)).into();
        assert!(matches!(err, AclError::Store(StoreError::NotFound(_))));
    }
}
