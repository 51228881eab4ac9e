//! Permission evaluation over ACL inheritance chains

use objacl_api::{Acl, Entity, InheritanceMode, ObjectIdentity, Permission, Principal, Sid};
use std::cell::RefCell;
use std::collections::{HashMap, HashSet};

use crate::error::{AclError, Result};
use crate::sid::SidResolver;
use crate::store::AclStore;

/// Identity-keyed cache of ACLs for one evaluation
///
/// Parent links are identity keys; the arena resolves them on demand and
/// remembers misses so each identity is fetched at most once.
pub struct AclArena<'a> {
    store: &'a dyn AclStore,
    acls: RefCell<HashMap<ObjectIdentity, Option<Acl>>>,
}

impl<'a> AclArena<'a> {
    pub fn new(store: &'a dyn AclStore) -> Self {
        Self {
            store,
            acls: RefCell::new(HashMap::new()),
        }
    }

    /// Seed the arena with already-fetched ACLs
    pub fn preload(&self, acls: impl IntoIterator<Item = Acl>) {
        let mut cache = self.acls.borrow_mut();
        for acl in acls {
            cache.insert(acl.identity().clone(), Some(acl));
        }
    }

    /// Record that `identity` has no ACL
    pub fn mark_missing(&self, identity: ObjectIdentity) {
        self.acls.borrow_mut().entry(identity).or_insert(None);
    }

    pub fn get(&self, identity: &ObjectIdentity) -> Result<Option<Acl>> {
        if let Some(cached) = self.acls.borrow().get(identity) {
            return Ok(cached.clone());
        }
        let fetched = self.store.find(identity)?;
        self.acls
            .borrow_mut()
            .insert(identity.clone(), fetched.clone());
        Ok(fetched)
    }

    /// Number of identities resolved so far (hits and misses)
    pub fn len(&self) -> usize {
        self.acls.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Answers visibility and permission questions for one principal context
pub struct PermissionEvaluator<'a> {
    arena: AclArena<'a>,
    sids: &'a SidResolver,
}

impl<'a> PermissionEvaluator<'a> {
    pub fn new(store: &'a dyn AclStore, sids: &'a SidResolver) -> Self {
        Self::with_arena(AclArena::new(store), sids)
    }

    pub fn with_arena(arena: AclArena<'a>, sids: &'a SidResolver) -> Self {
        Self { arena, sids }
    }

    pub fn arena(&self) -> &AclArena<'a> {
        &self.arena
    }

    pub fn sid_resolver(&self) -> &SidResolver {
        self.sids
    }

    /// Walk `acl` and its ancestors until `matches` finds a local entry
    ///
    /// Moves to the parent only while the current ACL inherits. A missing or
    /// already-seen parent ends the walk with `false`.
    fn chain_any(&self, acl: &Acl, mut matches: impl FnMut(&Acl) -> bool) -> Result<bool> {
        if matches(acl) {
            return Ok(true);
        }
        let mut seen = HashSet::new();
        seen.insert(acl.identity().clone());
        let mut next = acl.inherits_from_parent().then(|| acl.parent().cloned()).flatten();

        while let Some(identity) = next {
            if !seen.insert(identity.clone()) {
                tracing::warn!(identity = %identity, "Cycle in ACL parent chain");
                return Ok(false);
            }
            let Some(current) = self.arena.get(&identity)? else {
                tracing::debug!(identity = %identity, "Parent ACL missing from store");
                return Ok(false);
            };
            if matches(&current) {
                return Ok(true);
            }
            next = current
                .inherits_from_parent()
                .then(|| current.parent().cloned())
                .flatten();
        }
        Ok(false)
    }

    /// True unless some ACE on the chain grants READ to the anonymous authority
    pub fn is_private(&self, acl: &Acl) -> Result<bool> {
        let anonymous = self.sids.authorities().anonymous_sid();
        let public = self.chain_any(acl, |a| a.has_local_grant(Permission::READ, &anonymous))?;
        Ok(!public)
    }

    /// True if some ACE on the chain grants READ to a group other than admin or agent
    pub fn is_shared(&self, acl: &Acl) -> Result<bool> {
        let authorities = self.sids.authorities();
        self.chain_any(acl, |a| {
            a.entries().iter().any(|ace| {
                ace.is_granting()
                    && ace.permission() == Permission::READ
                    && ace
                        .sid()
                        .as_authority()
                        .is_some_and(|name| authorities.is_sharing_group(name))
            })
        })
    }

    /// Whether one of `sids` is granted `permission` somewhere on the chain
    pub fn is_granted(&self, acl: &Acl, permission: Permission, sids: &[Sid]) -> Result<bool> {
        self.chain_any(acl, |a| sids.iter().any(|sid| a.has_local_grant(permission, sid)))
    }

    /// Sids holding a granting `permission` entry anywhere on the chain
    fn sids_granted(&self, acl: &Acl, permission: Permission) -> Result<Vec<Sid>> {
        let mut granted: Vec<Sid> = Vec::new();
        self.chain_any(acl, |a| {
            for ace in a.entries() {
                if ace.is_granting() && ace.permission() == permission && !granted.contains(ace.sid()) {
                    granted.push(ace.sid().clone());
                }
            }
            false
        })?;
        Ok(granted)
    }

    /// Sharing groups granted `permission` on the chain, sorted by name
    pub fn groups_granted(&self, acl: &Acl, permission: Permission) -> Result<Vec<String>> {
        let authorities = self.sids.authorities();
        let mut groups: Vec<String> = self
            .sids_granted(acl, permission)?
            .iter()
            .filter_map(|sid| sid.as_authority())
            .filter(|name| authorities.is_sharing_group(name))
            .map(str::to_string)
            .collect();
        groups.sort();
        Ok(groups)
    }

    /// Principals named in a granting `permission` entry on the chain, sorted
    ///
    /// Group membership is not expanded.
    pub fn principals_granted(&self, acl: &Acl, permission: Permission) -> Result<Vec<String>> {
        let mut names: Vec<String> = self
            .sids_granted(acl, permission)?
            .iter()
            .filter_map(|sid| sid.as_principal())
            .map(str::to_string)
            .collect();
        names.sort();
        Ok(names)
    }

    /// ACL governing `entity`
    ///
    /// A secured child without an ACL of its own is governed by its nearest
    /// security owner that is not itself a child.
    pub fn acl_for(&self, entity: &dyn Entity) -> Result<Option<Acl>> {
        let Some(identity) = entity.identity() else {
            return Ok(None);
        };
        if let Some(acl) = self.arena.get(&identity)? {
            return Ok(Some(acl));
        }
        if entity.inheritance() != Some(InheritanceMode::InheritsAlways) {
            return Ok(None);
        }
        match nearest_secured_owner(entity) {
            Some(owner) => match owner.identity() {
                Some(owner_identity) => {
                    tracing::trace!(
                        identity = %identity,
                        owner = %owner_identity,
                        "Evaluating secured child through its owner"
                    );
                    self.arena.get(&owner_identity)
                }
                None => Ok(None),
            },
            None => Ok(None),
        }
    }

    /// ACL governing `entity`, or `AclMissing`
    pub fn require_acl(&self, entity: &dyn Entity) -> Result<Acl> {
        let identity = entity
            .identity()
            .ok_or_else(|| AclError::UnresolvableIdentity(entity.type_name().to_string()))?;
        self.acl_for(entity)?
            .ok_or(AclError::AclMissing(identity))
    }

    /// Whether `principal` holds every permission in `required` on `entity`
    ///
    /// Administrators always pass. Entities that are not securable pass.
    /// Securables without an ACL are denied.
    pub fn has_permission(
        &self,
        entity: &dyn Entity,
        required: &[Permission],
        principal: &Principal,
    ) -> Result<bool> {
        let sids = self.sids.resolve_sids(principal);
        self.has_permission_with_sids(entity, required, principal, &sids)
    }

    pub(crate) fn has_permission_with_sids(
        &self,
        entity: &dyn Entity,
        required: &[Permission],
        principal: &Principal,
        sids: &[Sid],
    ) -> Result<bool> {
        if !entity.is_securable() {
            return Ok(true);
        }
        if self.sids.is_admin(principal) {
            return Ok(true);
        }
        let Some(acl) = self.acl_for(entity)? else {
            tracing::debug!(
                type_name = entity.type_name(),
                id = ?entity.id(),
                "No ACL; denying access"
            );
            return Ok(false);
        };
        for permission in required {
            if !self.is_granted(&acl, *permission, sids)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Whether `principal` holds at least one of `any_of` on `entity`
    pub fn has_any_permission(
        &self,
        entity: &dyn Entity,
        any_of: &[Permission],
        principal: &Principal,
    ) -> Result<bool> {
        for permission in any_of {
            if self.has_permission(entity, std::slice::from_ref(permission), principal)? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    pub fn is_object_private(&self, entity: &dyn Entity) -> Result<bool> {
        let acl = self.require_acl(entity)?;
        self.is_private(&acl)
    }

    pub fn is_public(&self, entity: &dyn Entity) -> Result<bool> {
        Ok(!self.is_object_private(entity)?)
    }

    pub fn is_object_shared(&self, entity: &dyn Entity) -> Result<bool> {
        let acl = self.require_acl(entity)?;
        self.is_shared(&acl)
    }

    /// Owner sid of the governing ACL
    pub fn owner(&self, entity: &dyn Entity) -> Result<Option<Sid>> {
        Ok(self.require_acl(entity)?.owner().cloned())
    }

    pub fn is_owned_by(&self, entity: &dyn Entity, principal: &Principal) -> Result<bool> {
        Ok(self.owner(entity)? == Some(principal.sid()))
    }

    pub fn is_editable_by(&self, entity: &dyn Entity, principal: &Principal) -> Result<bool> {
        self.has_permission(entity, &[Permission::WRITE], principal)
    }

    /// READ or ADMINISTRATION
    pub fn is_viewable_by(&self, entity: &dyn Entity, principal: &Principal) -> Result<bool> {
        self.has_any_permission(
            entity,
            &[Permission::READ, Permission::ADMINISTRATION],
            principal,
        )
    }

    pub fn groups_readable_by(&self, entity: &dyn Entity) -> Result<Vec<String>> {
        let acl = self.require_acl(entity)?;
        self.groups_granted(&acl, Permission::READ)
    }

    pub fn groups_editable_by(&self, entity: &dyn Entity) -> Result<Vec<String>> {
        let acl = self.require_acl(entity)?;
        self.groups_granted(&acl, Permission::WRITE)
    }

    /// Users granted READ directly
    pub fn readable_by(&self, entity: &dyn Entity) -> Result<Vec<String>> {
        let acl = self.require_acl(entity)?;
        self.principals_granted(&acl, Permission::READ)
    }

    /// Users granted WRITE directly
    pub fn editable_by(&self, entity: &dyn Entity) -> Result<Vec<String>> {
        let acl = self.require_acl(entity)?;
        self.principals_granted(&acl, Permission::WRITE)
    }

    /// Private, yet `principal` may read it
    pub fn is_non_public_but_readable_by(
        &self,
        entity: &dyn Entity,
        principal: &Principal,
    ) -> Result<bool> {
        Ok(self.is_object_private(entity)?
            && self.has_permission(entity, &[Permission::READ], principal)?)
    }

    /// Whether `group` (an authority name) is granted `permission` on the chain
    pub fn is_granted_to_group(
        &self,
        entity: &dyn Entity,
        group: &str,
        permission: Permission,
    ) -> Result<bool> {
        let acl = self.require_acl(entity)?;
        self.is_granted(&acl, permission, &[Sid::authority(group)])
    }
}

/// Nearest security owner of a secured child that is not a child itself
pub fn nearest_secured_owner(entity: &dyn Entity) -> Option<&dyn Entity> {
    let mut current = entity.security_owner()?;
    let mut hops = 0usize;
    while current.inheritance() == Some(InheritanceMode::InheritsAlways) {
        current = current.security_owner()?;
        hops += 1;
        if hops > 1024 {
            tracing::warn!(type_name = entity.type_name(), "Security owner chain too long");
            return None;
        }
    }
    Some(current)
}
