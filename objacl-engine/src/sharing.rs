//! Explicit visibility edits on a single object's ACL

use objacl_api::{Acl, Entity, Permission, Principal, Sid};

use crate::audit;
use crate::error::{AclError, Result};
use crate::propagation::AclEngine;

impl AclEngine {
    /// Grant READ to anonymous users
    pub fn make_public(&self, entity: &dyn Entity, principal: &Principal) -> Result<bool> {
        let anonymous = self.sid_resolver().authorities().anonymous_sid();
        self.edit_acl(entity, principal, |acl| grant_missing(acl, Permission::READ, &anonymous))
    }

    /// Revoke anonymous READ
    pub fn make_private(&self, entity: &dyn Entity, principal: &Principal) -> Result<bool> {
        let anonymous = self.sid_resolver().authorities().anonymous_sid();
        self.edit_acl(entity, principal, |acl| {
            revoke(acl, &[Permission::READ], &anonymous)
        })
    }

    /// Grant READ to the members of `group` (an authority name)
    pub fn make_readable_by_group(
        &self,
        entity: &dyn Entity,
        group: &str,
        principal: &Principal,
    ) -> Result<bool> {
        let sid = Sid::authority(group);
        self.edit_acl(entity, principal, |acl| grant_missing(acl, Permission::READ, &sid))
    }

    /// Revoke READ and WRITE from `group`
    pub fn make_unreadable_by_group(
        &self,
        entity: &dyn Entity,
        group: &str,
        principal: &Principal,
    ) -> Result<bool> {
        let sid = Sid::authority(group);
        self.edit_acl(entity, principal, |acl| {
            revoke(acl, &[Permission::READ, Permission::WRITE], &sid)
        })
    }

    /// Grant READ and WRITE to `group`
    pub fn make_writeable_by_group(
        &self,
        entity: &dyn Entity,
        group: &str,
        principal: &Principal,
    ) -> Result<bool> {
        let sid = Sid::authority(group);
        self.edit_acl(entity, principal, |acl| {
            let read = grant_missing(acl, Permission::READ, &sid);
            let write = grant_missing(acl, Permission::WRITE, &sid);
            read || write
        })
    }

    /// Revoke WRITE from `group`, leaving READ in place
    pub fn make_unwriteable_by_group(
        &self,
        entity: &dyn Entity,
        group: &str,
        principal: &Principal,
    ) -> Result<bool> {
        let sid = Sid::authority(group);
        self.edit_acl(entity, principal, |acl| revoke(acl, &[Permission::WRITE], &sid))
    }

    /// Transfer ownership; administrators only
    pub fn set_owner(&self, entity: &dyn Entity, owner: Sid, principal: &Principal) -> Result<bool> {
        let identity = entity
            .identity()
            .ok_or_else(|| AclError::UnresolvableIdentity(entity.type_name().to_string()))?;
        if !self.sid_resolver().is_admin(principal) {
            return Err(AclError::AccessDenied {
                identity,
                principal: principal.name().to_string(),
            });
        }
        self.edit_acl(entity, principal, |acl| {
            if acl.owner() == Some(&owner) {
                return false;
            }
            acl.set_owner(owner.clone());
            true
        })
    }

    /// Load the object's own ACL, apply `edit`, persist if it changed anything
    fn edit_acl(
        &self,
        entity: &dyn Entity,
        principal: &Principal,
        edit: impl FnOnce(&mut Acl) -> bool,
    ) -> Result<bool> {
        let identity = entity
            .identity()
            .ok_or_else(|| AclError::UnresolvableIdentity(entity.type_name().to_string()))?;
        let mut acl = self
            .store()
            .find(&identity)?
            .ok_or_else(|| AclError::AclMissing(identity.clone()))?;

        if !self.may_edit(entity, &acl, principal)? {
            return Err(AclError::AccessDenied {
                identity,
                principal: principal.name().to_string(),
            });
        }

        if !edit(&mut acl) {
            tracing::trace!(identity = %identity, "ACL already as requested");
            return Ok(false);
        }
        let saved = self.store().update(acl)?;
        tracing::debug!(identity = %identity, principal = principal.name(), "ACL edited");
        self.record(audit::acl_updated(&saved, principal));
        Ok(true)
    }

    fn may_edit(&self, entity: &dyn Entity, acl: &Acl, principal: &Principal) -> Result<bool> {
        let sids = self.sid_resolver();
        if sids.is_admin(principal) || acl.owner() == Some(&principal.sid()) {
            return Ok(true);
        }
        if sids.is_anonymous(principal) {
            return Ok(false);
        }
        self.evaluator()
            .has_any_permission(entity, &[Permission::WRITE, Permission::ADMINISTRATION], principal)
    }
}

fn grant_missing(acl: &mut Acl, permission: Permission, sid: &Sid) -> bool {
    if acl.has_local_grant(permission, sid) {
        return false;
    }
    acl.grant(permission, sid.clone());
    true
}

fn revoke(acl: &mut Acl, permissions: &[Permission], sid: &Sid) -> bool {
    let removed = acl.retain_entries(|ace| {
        !(ace.is_granting() && ace.sid() == sid && permissions.contains(&ace.permission()))
    });
    removed > 0
}
