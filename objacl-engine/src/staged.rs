//! Transactional overlay over an ACL store
//!
//! The engine performs no locking and no rollback of its own. Running an
//! `apply_acl` call against a [`StagedAclStore`] buffers every write; the
//! caller commits when its own transaction succeeds, and dropping the overlay
//! discards everything.

use objacl_api::{Acl, ObjectIdentity, Sid};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, PoisonError, RwLock};

use crate::store::{AclStore, StoreError};

/// Buffered change for one identity; `None` marks a deletion
type Pending = BTreeMap<ObjectIdentity, Option<Acl>>;

/// Write-buffering wrapper around a shared store
pub struct StagedAclStore {
    base: Arc<dyn AclStore>,
    pending: RwLock<Pending>,
}

impl StagedAclStore {
    pub fn new(base: Arc<dyn AclStore>) -> Self {
        Self {
            base,
            pending: RwLock::new(BTreeMap::new()),
        }
    }

    /// Number of buffered changes
    pub fn pending_changes(&self) -> usize {
        self.pending
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Discard every buffered change
    pub fn rollback(&self) {
        let mut pending = self.pending.write().unwrap_or_else(PoisonError::into_inner);
        if !pending.is_empty() {
            tracing::debug!(changes = pending.len(), "Discarding staged ACL changes");
        }
        pending.clear();
    }

    /// Apply buffered changes to the base store
    ///
    /// Deletions go first; upserts follow parent-before-child so the base
    /// store's parent check holds at every step. Each change leaves the
    /// buffer once the base store accepts it. The commit is not atomic
    /// against the base store: on failure the applied part stays applied,
    /// the rest stays buffered, and the caller may retry or roll back.
    pub fn commit(&self) -> Result<usize, StoreError> {
        let mut pending = self.pending.write().unwrap_or_else(PoisonError::into_inner);
        let total = pending.len();

        let deletions: Vec<ObjectIdentity> = pending
            .iter()
            .filter(|(_, change)| change.is_none())
            .map(|(identity, _)| identity.clone())
            .collect();
        for identity in deletions {
            self.base.delete(&identity, true)?;
            pending.remove(&identity);
        }

        let mut upserts: Vec<Acl> = pending.values().flatten().cloned().collect();
        while !upserts.is_empty() {
            let before = upserts.len();
            let mut deferred = Vec::new();
            for acl in upserts {
                let ready = match acl.parent() {
                    Some(parent) => self.base.find(parent)?.is_some(),
                    None => true,
                };
                if ready {
                    let identity = acl.identity().clone();
                    self.base.update(acl)?;
                    pending.remove(&identity);
                } else {
                    deferred.push(acl);
                }
            }
            if deferred.len() == before {
                // Remaining parents exist nowhere; let the base store report it
                for acl in deferred {
                    let identity = acl.identity().clone();
                    self.base.update(acl)?;
                    pending.remove(&identity);
                }
                break;
            }
            upserts = deferred;
        }

        tracing::debug!(changes = total, "Committed staged ACL changes");
        Ok(total)
    }

    fn effective(&self, pending: &Pending, identity: &ObjectIdentity) -> Result<Option<Acl>, StoreError> {
        match pending.get(identity) {
            Some(change) => Ok(change.clone()),
            None => self.base.find(identity),
        }
    }

    fn all_identities(&self, pending: &Pending) -> Result<BTreeSet<ObjectIdentity>, StoreError> {
        let mut ids: BTreeSet<ObjectIdentity> = self.base.identities()?.into_iter().collect();
        for (identity, change) in pending {
            match change {
                Some(_) => ids.insert(identity.clone()),
                None => ids.remove(identity),
            };
        }
        Ok(ids)
    }

    fn children_in(&self, pending: &Pending, identity: &ObjectIdentity) -> Result<Vec<ObjectIdentity>, StoreError> {
        let mut children = Vec::new();
        for candidate in self.all_identities(pending)? {
            if let Some(acl) = self.effective(pending, &candidate)? {
                if acl.parent() == Some(identity) {
                    children.push(candidate);
                }
            }
        }
        Ok(children)
    }
}

impl AclStore for StagedAclStore {
    fn find(&self, identity: &ObjectIdentity) -> Result<Option<Acl>, StoreError> {
        let pending = self.pending.read().unwrap_or_else(PoisonError::into_inner);
        self.effective(&pending, identity)
    }

    fn create(&self, identity: &ObjectIdentity, owner: Sid) -> Result<Acl, StoreError> {
        let mut pending = self.pending.write().unwrap_or_else(PoisonError::into_inner);
        if self.effective(&pending, identity)?.is_some() {
            return Err(StoreError::AlreadyExists(identity.clone()));
        }
        let acl = Acl::new(identity.clone(), Some(owner));
        pending.insert(identity.clone(), Some(acl.clone()));
        Ok(acl)
    }

    fn update(&self, acl: Acl) -> Result<Acl, StoreError> {
        let mut pending = self.pending.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(parent) = acl.parent() {
            if self.effective(&pending, parent)?.is_none() {
                return Err(StoreError::ParentNotFound {
                    child: acl.identity().clone(),
                    parent: parent.clone(),
                });
            }
        }
        pending.insert(acl.identity().clone(), Some(acl.clone()));
        Ok(acl)
    }

    fn delete(
        &self,
        identity: &ObjectIdentity,
        cascade_to_children: bool,
    ) -> Result<(), StoreError> {
        let mut pending = self.pending.write().unwrap_or_else(PoisonError::into_inner);
        if self.effective(&pending, identity)?.is_none() {
            return Ok(());
        }
        let children = self.children_in(&pending, identity)?;
        if !children.is_empty() && !cascade_to_children {
            return Err(StoreError::ChildrenExist(identity.clone()));
        }

        let mut doomed = BTreeSet::new();
        let mut stack = vec![identity.clone()];
        while let Some(next) = stack.pop() {
            if doomed.insert(next.clone()) {
                stack.extend(self.children_in(&pending, &next)?);
            }
        }
        for id in doomed {
            pending.insert(id, None);
        }
        Ok(())
    }

    fn find_children(&self, identity: &ObjectIdentity) -> Result<Vec<ObjectIdentity>, StoreError> {
        let pending = self.pending.read().unwrap_or_else(PoisonError::into_inner);
        self.children_in(&pending, identity)
    }

    fn identities(&self) -> Result<Vec<ObjectIdentity>, StoreError> {
        let pending = self.pending.read().unwrap_or_else(PoisonError::into_inner);
        Ok(self.all_identities(&pending)?.into_iter().collect())
    }

    fn delete_sid(&self, sid: &Sid) -> Result<usize, StoreError> {
        let mut pending = self.pending.write().unwrap_or_else(PoisonError::into_inner);
        let mut removed = 0;
        for identity in self.all_identities(&pending)? {
            if let Some(mut acl) = self.effective(&pending, &identity)? {
                let count = acl.retain_entries(|ace| ace.sid() != sid);
                if count > 0 {
                    removed += count;
                    pending.insert(identity, Some(acl));
                }
            }
        }
        Ok(removed)
    }
}

impl Drop for StagedAclStore {
    fn drop(&mut self) {
        let pending = self.pending.get_mut().unwrap_or_else(PoisonError::into_inner);
        if !pending.is_empty() {
            tracing::debug!(changes = pending.len(), "Dropping uncommitted ACL changes");
        }
    }
}

impl std::fmt::Debug for StagedAclStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StagedAclStore")
            .field("pending", &self.pending_changes())
            .finish_non_exhaustive()
    }
}
