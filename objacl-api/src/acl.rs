//! Access control entries and ACL aggregates

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::{ObjectIdentity, Permission, Sid};

/// Errors raised when an ACL mutation would violate the model
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AclModelError {
    #[error("Parent of {child} is already {current}; cannot change it to {proposed}")]
    ParentConflict {
        child: ObjectIdentity,
        current: ObjectIdentity,
        proposed: ObjectIdentity,
    },

    #[error("ACL {0} cannot be its own parent")]
    SelfParent(ObjectIdentity),

    #[error("ACE index {index} out of bounds for ACL with {len} entries")]
    AceIndexOutOfBounds { index: usize, len: usize },
}

/// One grant (or deny) record
///
/// Entries are immutable once constructed; ACLs replace them wholesale.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AccessControlEntry {
    permission: Permission,
    sid: Sid,
    granting: bool,
}

impl AccessControlEntry {
    /// Create an entry
    pub fn new(permission: Permission, sid: Sid, granting: bool) -> Self {
        Self {
            permission,
            sid,
            granting,
        }
    }

    /// Create a granting entry
    pub fn grant(permission: Permission, sid: Sid) -> Self {
        Self::new(permission, sid, true)
    }

    pub fn permission(&self) -> Permission {
        self.permission
    }

    pub fn sid(&self) -> &Sid {
        &self.sid
    }

    pub fn is_granting(&self) -> bool {
        self.granting
    }

    /// Whether this entry grants `permission` to `sid`
    pub fn grants(&self, permission: Permission, sid: &Sid) -> bool {
        self.granting && self.permission == permission && &self.sid == sid
    }
}

impl fmt::Display for AccessControlEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let verb = if self.granting { "grant" } else { "deny" };
        write!(f, "{} {} to {}", verb, self.permission, self.sid)
    }
}

/// ACL aggregate rooted at one object identity
///
/// The parent link is a key reference to another ACL rather than a pointer;
/// resolving it is the job of whoever holds the ACLs (a store or an arena).
/// Entry order is the position in [`Acl::entries`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Acl {
    identity: ObjectIdentity,
    #[serde(default)]
    owner: Option<Sid>,
    #[serde(default)]
    parent: Option<ObjectIdentity>,
    entries_inheriting: bool,
    #[serde(default)]
    entries: Vec<AccessControlEntry>,
}

impl Acl {
    /// Create an empty, inheriting ACL
    pub fn new(identity: ObjectIdentity, owner: Option<Sid>) -> Self {
        Self {
            identity,
            owner,
            parent: None,
            entries_inheriting: true,
            entries: Vec::new(),
        }
    }

    pub fn identity(&self) -> &ObjectIdentity {
        &self.identity
    }

    pub fn owner(&self) -> Option<&Sid> {
        self.owner.as_ref()
    }

    pub fn set_owner(&mut self, owner: Sid) {
        self.owner = Some(owner);
    }

    /// Identity of the parent ACL, if linked
    pub fn parent(&self) -> Option<&ObjectIdentity> {
        self.parent.as_ref()
    }

    /// Link this ACL to `parent`
    ///
    /// Parent linkage is write-once: relinking to the same parent is a no-op,
    /// linking to a different one fails. Returns whether the link changed.
    pub fn link_parent(&mut self, parent: &ObjectIdentity) -> Result<bool, AclModelError> {
        if parent == &self.identity {
            return Err(AclModelError::SelfParent(self.identity.clone()));
        }
        match &self.parent {
            Some(current) if current == parent => Ok(false),
            Some(current) => Err(AclModelError::ParentConflict {
                child: self.identity.clone(),
                current: current.clone(),
                proposed: parent.clone(),
            }),
            None => {
                self.parent = Some(parent.clone());
                Ok(true)
            }
        }
    }

    pub fn entries_inheriting(&self) -> bool {
        self.entries_inheriting
    }

    pub fn set_entries_inheriting(&mut self, inheriting: bool) {
        self.entries_inheriting = inheriting;
    }

    /// Whether evaluation falls through to the parent ACL
    pub fn inherits_from_parent(&self) -> bool {
        self.entries_inheriting && self.parent.is_some()
    }

    pub fn entries(&self) -> &[AccessControlEntry] {
        &self.entries
    }

    /// Append a granting entry
    pub fn grant(&mut self, permission: Permission, sid: Sid) {
        self.entries.push(AccessControlEntry::grant(permission, sid));
    }

    /// Insert an entry at `index` (0..=len)
    pub fn insert_ace(
        &mut self,
        index: usize,
        entry: AccessControlEntry,
    ) -> Result<(), AclModelError> {
        if index > self.entries.len() {
            return Err(AclModelError::AceIndexOutOfBounds {
                index,
                len: self.entries.len(),
            });
        }
        self.entries.insert(index, entry);
        Ok(())
    }

    /// Remove the entry at `index`
    pub fn delete_ace(&mut self, index: usize) -> Result<AccessControlEntry, AclModelError> {
        if index >= self.entries.len() {
            return Err(AclModelError::AceIndexOutOfBounds {
                index,
                len: self.entries.len(),
            });
        }
        Ok(self.entries.remove(index))
    }

    /// Keep only the entries matching `keep`; returns how many were removed
    pub fn retain_entries(&mut self, keep: impl FnMut(&AccessControlEntry) -> bool) -> usize {
        let before = self.entries.len();
        self.entries.retain(keep);
        before - self.entries.len()
    }

    /// Remove every entry
    pub fn clear_entries(&mut self) {
        self.entries.clear();
    }

    /// Whether a local entry grants `permission` to `sid`
    pub fn has_local_grant(&self, permission: Permission, sid: &Sid) -> bool {
        self.entries.iter().any(|ace| ace.grants(permission, sid))
    }

    /// Stable digest of the entry list (order-sensitive)
    pub fn fingerprint(&self) -> String {
        let mut hasher = blake3::Hasher::new();
        for ace in &self.entries {
            hasher.update(&ace.permission.mask().to_le_bytes());
            hasher.update(&[u8::from(ace.granting)]);
            match &ace.sid {
                Sid::Principal(_) => hasher.update(b"p:"),
                Sid::Authority(_) => hasher.update(b"a:"),
            };
            hasher.update(ace.sid.name().as_bytes());
            hasher.update(b"\n");
        }
        hasher.finalize().to_hex().to_string()
    }
}

impl fmt::Display for Acl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Acl[{}", self.identity)?;
        if let Some(owner) = &self.owner {
            write!(f, "; owner: {}", owner)?;
        }
        if let Some(parent) = &self.parent {
            write!(f, "; parent: {}", parent)?;
        }
        write!(
            f,
            "; inheriting: {}; entries: {}]",
            self.entries_inheriting,
            self.entries.len()
        )
    }
}
