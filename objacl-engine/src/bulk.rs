//! Batch permission checks
//!
//! ACLs for a whole batch are fetched in one store call before evaluation.
//! Results are positional: the answer for `objects[i]` is at index `i`,
//! duplicates included.

use objacl_api::{Acl, Entity, ObjectIdentity, Permission, Principal, Sid};
use std::collections::BTreeSet;

use crate::error::{AclError, Result};
use crate::evaluator::{AclArena, PermissionEvaluator};
use crate::sid::SidResolver;
use crate::store::{AclStore, StoreError};

pub struct BulkPermissionChecker<'a> {
    store: &'a dyn AclStore,
    sids: &'a SidResolver,
}

impl<'a> BulkPermissionChecker<'a> {
    pub fn new(store: &'a dyn AclStore, sids: &'a SidResolver) -> Self {
        Self { store, sids }
    }

    pub fn sid_resolver(&self) -> &'a SidResolver {
        self.sids
    }

    /// Evaluator whose cache already holds the ACLs of `objects`
    ///
    /// A batch read that reports a missing ACL is retried without that
    /// identity, so each unsecured object costs one more batch read and
    /// never a per-object lookup.
    pub fn evaluator_for<E: Entity>(
        &self,
        objects: &[E],
        sids: Option<&[Sid]>,
    ) -> Result<PermissionEvaluator<'a>> {
        let mut remaining: Vec<ObjectIdentity> = objects
            .iter()
            .filter(|o| o.is_securable())
            .filter_map(|o| o.identity())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        let arena = AclArena::new(self.store);
        while !remaining.is_empty() {
            match self.store.read_many(&remaining, sids) {
                Ok(found) => {
                    arena.preload(found.into_values());
                    break;
                }
                Err(StoreError::NotFound(missing)) => {
                    let before = remaining.len();
                    remaining.retain(|identity| identity != &missing);
                    if remaining.len() == before {
                        // Reported an identity we never asked for
                        return Err(StoreError::NotFound(missing).into());
                    }
                    tracing::debug!(
                        missing = %missing,
                        remaining = remaining.len(),
                        "No ACL in batch; retrying without it"
                    );
                    arena.mark_missing(missing);
                }
                Err(err) => return Err(err.into()),
            }
        }
        Ok(PermissionEvaluator::with_arena(arena, self.sids))
    }

    /// Positional `has_permission` over `objects`
    pub fn has_permission<E: Entity>(
        &self,
        objects: &[E],
        required: &[Permission],
        principal: &Principal,
    ) -> Result<Vec<bool>> {
        if objects.is_empty() {
            return Err(AclError::EmptyBatch);
        }
        let sids = self.sids.resolve_sids(principal);
        let eval = self.evaluator_for(objects, Some(&sids))?;
        objects
            .iter()
            .map(|object| eval.has_permission_with_sids(object, required, principal, &sids))
            .collect()
    }

    pub fn are_private<E: Entity>(&self, objects: &[E]) -> Result<Vec<bool>> {
        self.each_acl(objects, |eval, acl| eval.is_private(acl))
    }

    pub fn are_shared<E: Entity>(&self, objects: &[E]) -> Result<Vec<bool>> {
        self.each_acl(objects, |eval, acl| eval.is_shared(acl))
    }

    /// Objects readable by anonymous users
    pub fn choose_public<'o, E: Entity>(&self, objects: &'o [E]) -> Result<Vec<&'o E>> {
        let private = self.are_private(objects)?;
        Ok(objects
            .iter()
            .zip(private)
            .filter_map(|(object, private)| (!private).then_some(object))
            .collect())
    }

    pub fn choose_private<'o, E: Entity>(&self, objects: &'o [E]) -> Result<Vec<&'o E>> {
        let private = self.are_private(objects)?;
        Ok(objects
            .iter()
            .zip(private)
            .filter_map(|(object, private)| private.then_some(object))
            .collect())
    }

    pub fn are_owned_by<E: Entity>(&self, objects: &[E], principal: &Principal) -> Result<Vec<bool>> {
        let sid = principal.sid();
        self.each_acl(objects, |_, acl| Ok(acl.owner() == Some(&sid)))
    }

    /// Owner sid of each object's governing ACL
    pub fn owners<E: Entity>(&self, objects: &[E]) -> Result<Vec<Option<Sid>>> {
        self.each_acl(objects, |_, acl| Ok(acl.owner().cloned()))
    }

    /// Sharing groups granted READ on each object's chain
    pub fn groups_readable_by<E: Entity>(&self, objects: &[E]) -> Result<Vec<Vec<String>>> {
        self.each_acl(objects, |eval, acl| eval.groups_granted(acl, Permission::READ))
    }

    /// Sharing groups granted WRITE on each object's chain
    pub fn groups_editable_by<E: Entity>(&self, objects: &[E]) -> Result<Vec<Vec<String>>> {
        self.each_acl(objects, |eval, acl| eval.groups_granted(acl, Permission::WRITE))
    }

    /// Objects that are private yet readable by `principal`
    pub fn are_non_public_but_readable_by<E: Entity>(
        &self,
        objects: &[E],
        principal: &Principal,
    ) -> Result<Vec<bool>> {
        let sids = self.sids.resolve_sids(principal);
        let is_admin = self.sids.is_admin(principal);
        self.each_acl(objects, |eval, acl| {
            Ok(eval.is_private(acl)?
                && (is_admin || eval.is_granted(acl, Permission::READ, &sids)?))
        })
    }

    fn each_acl<T, E: Entity>(
        &self,
        objects: &[E],
        f: impl Fn(&PermissionEvaluator<'a>, &Acl) -> Result<T>,
    ) -> Result<Vec<T>> {
        if objects.is_empty() {
            return Err(AclError::EmptyBatch);
        }
        let eval = self.evaluator_for(objects, None)?;
        objects
            .iter()
            .map(|object| {
                let acl = eval.require_acl(object)?;
                f(&eval, &acl)
            })
            .collect()
    }
}
