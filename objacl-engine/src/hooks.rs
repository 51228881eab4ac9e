//! Application-specific adjustments to ACL propagation
//!
//! Every method has a default, so applications override only what their
//! domain needs: which entities are users or groups, which associations to
//! skip, and where the cascade metadata under-reports a relationship.

use objacl_api::{Acl, Entity, InheritanceMode, Sid};

/// Extension points consulted by the propagation engine
pub trait PropagationHooks: Send + Sync {
    /// Skip the association walk below `entity` entirely
    fn can_skip_acl_check(&self, entity: &dyn Entity) -> bool {
        let _ = entity;
        false
    }

    /// Skip one association property
    fn can_skip_association_check(&self, entity: &dyn Entity, property: &str) -> bool {
        let _ = (entity, property);
        false
    }

    /// Follow a property even when the cascade policy says the operation
    /// does not propagate through it
    fn force_association_follow(&self, entity: &dyn Entity, property: &str) -> bool {
        let _ = (entity, property);
        false
    }

    /// Clear the child's ACEs even when its entry count differs from the parent's
    fn allow_removing_aces_from_child(&self, entity: &dyn Entity, parent: &Acl) -> bool {
        let _ = (entity, parent);
        false
    }

    /// Keep a fresh object private even when an administrator creates it
    ///
    /// Defaults to true for secured children.
    fn keep_private_on_creation(&self, entity: &dyn Entity) -> bool {
        entity.inheritance() == Some(InheritanceMode::InheritsAlways)
    }

    /// User name, if `entity` represents a user account
    fn user_name(&self, entity: &dyn Entity) -> Option<String> {
        let _ = entity;
        None
    }

    /// Authority of the group, if `entity` represents a user group
    fn group_authority(&self, entity: &dyn Entity) -> Option<String> {
        let _ = entity;
        None
    }

    /// Last chance to adjust a fresh or updated ACL before ownership rules run
    fn special_cases(&self, acl: &mut Acl, parent: Option<&Acl>, sid: &Sid, entity: &dyn Entity) {
        let _ = (acl, parent, sid, entity);
    }
}

/// Hooks with every default in place
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultHooks;

impl PropagationHooks for DefaultHooks {}
