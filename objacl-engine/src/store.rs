//! ACL storage
//!
//! The engine treats storage as a transactional key-value store of ACL
//! aggregates keyed by object identity. Exactly one ACL exists per identity;
//! `create` never overwrites.

use objacl_api::{Acl, ObjectIdentity, Sid};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};
use thiserror::Error;

/// Error type for ACL store operations
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("No ACL for {0}")]
    NotFound(ObjectIdentity),

    #[error("ACL for {0} already exists")]
    AlreadyExists(ObjectIdentity),

    #[error("ACL for {0} still has child ACLs")]
    ChildrenExist(ObjectIdentity),

    #[error("Parent ACL {parent} of {child} does not exist")]
    ParentNotFound {
        child: ObjectIdentity,
        parent: ObjectIdentity,
    },

    #[error("Store is read-only")]
    ReadOnly,

    #[error("Failed to access ACL store: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse ACL store: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Durable storage of ACL aggregates
///
/// Implementations must be atomic per call; multi-call atomicity is the job
/// of the enclosing transaction (see [`crate::staged::StagedAclStore`]).
pub trait AclStore: Send + Sync {
    /// ACL for `identity`, if any
    fn find(&self, identity: &ObjectIdentity) -> Result<Option<Acl>, StoreError>;

    /// Create an empty, inheriting ACL owned by `owner`
    ///
    /// Fails with [`StoreError::AlreadyExists`] when another caller got there
    /// first.
    fn create(&self, identity: &ObjectIdentity, owner: Sid) -> Result<Acl, StoreError>;

    /// Persist `acl`, creating it if missing; its parent must exist
    fn update(&self, acl: Acl) -> Result<Acl, StoreError>;

    /// Delete the ACL of `identity`
    ///
    /// With `cascade_to_children` every descendant ACL goes too; without it
    /// the call fails if any child ACL references this one.
    fn delete(&self, identity: &ObjectIdentity, cascade_to_children: bool)
        -> Result<(), StoreError>;

    /// Identities whose ACL names `identity` as parent
    fn find_children(&self, identity: &ObjectIdentity) -> Result<Vec<ObjectIdentity>, StoreError>;

    /// Every stored identity
    fn identities(&self) -> Result<Vec<ObjectIdentity>, StoreError>;

    /// Remove every ACE granted to `sid`; returns how many were removed
    fn delete_sid(&self, sid: &Sid) -> Result<usize, StoreError>;

    /// Fetch several ACLs at once
    ///
    /// `sids` is a hint naming the sids the caller will evaluate. Fails with
    /// [`StoreError::NotFound`] if any requested identity has no ACL.
    fn read_many(
        &self,
        identities: &[ObjectIdentity],
        sids: Option<&[Sid]>,
    ) -> Result<HashMap<ObjectIdentity, Acl>, StoreError> {
        let _ = sids;
        let mut found = HashMap::with_capacity(identities.len());
        for identity in identities {
            if found.contains_key(identity) {
                continue;
            }
            match self.find(identity)? {
                Some(acl) => {
                    found.insert(identity.clone(), acl);
                }
                None => return Err(StoreError::NotFound(identity.clone())),
            }
        }
        Ok(found)
    }
}

impl<S: AclStore + ?Sized> AclStore for Arc<S> {
    fn find(&self, identity: &ObjectIdentity) -> Result<Option<Acl>, StoreError> {
        (**self).find(identity)
    }

    fn create(&self, identity: &ObjectIdentity, owner: Sid) -> Result<Acl, StoreError> {
        (**self).create(identity, owner)
    }

    fn update(&self, acl: Acl) -> Result<Acl, StoreError> {
        (**self).update(acl)
    }

    fn delete(
        &self,
        identity: &ObjectIdentity,
        cascade_to_children: bool,
    ) -> Result<(), StoreError> {
        (**self).delete(identity, cascade_to_children)
    }

    fn find_children(&self, identity: &ObjectIdentity) -> Result<Vec<ObjectIdentity>, StoreError> {
        (**self).find_children(identity)
    }

    fn identities(&self) -> Result<Vec<ObjectIdentity>, StoreError> {
        (**self).identities()
    }

    fn delete_sid(&self, sid: &Sid) -> Result<usize, StoreError> {
        (**self).delete_sid(sid)
    }

    fn read_many(
        &self,
        identities: &[ObjectIdentity],
        sids: Option<&[Sid]>,
    ) -> Result<HashMap<ObjectIdentity, Acl>, StoreError> {
        (**self).read_many(identities, sids)
    }
}

// ============================================================================
// Shared table logic
// ============================================================================

#[derive(Debug, Clone, Default)]
struct AclTable {
    acls: HashMap<ObjectIdentity, Acl>,
}

impl AclTable {
    fn from_acls(acls: Vec<Acl>) -> Self {
        Self {
            acls: acls
                .into_iter()
                .map(|acl| (acl.identity().clone(), acl))
                .collect(),
        }
    }

    fn sorted(&self) -> Vec<Acl> {
        let mut acls: Vec<Acl> = self.acls.values().cloned().collect();
        acls.sort_by(|a, b| a.identity().cmp(b.identity()));
        acls
    }

    fn create(&mut self, identity: &ObjectIdentity, owner: Sid) -> Result<Acl, StoreError> {
        if self.acls.contains_key(identity) {
            return Err(StoreError::AlreadyExists(identity.clone()));
        }
        let acl = Acl::new(identity.clone(), Some(owner));
        self.acls.insert(identity.clone(), acl.clone());
        Ok(acl)
    }

    fn update(&mut self, acl: Acl) -> Result<Acl, StoreError> {
        if let Some(parent) = acl.parent() {
            if !self.acls.contains_key(parent) {
                return Err(StoreError::ParentNotFound {
                    child: acl.identity().clone(),
                    parent: parent.clone(),
                });
            }
        }
        self.acls.insert(acl.identity().clone(), acl.clone());
        Ok(acl)
    }

    fn children(&self, identity: &ObjectIdentity) -> Vec<ObjectIdentity> {
        let mut children: Vec<ObjectIdentity> = self
            .acls
            .values()
            .filter(|acl| acl.parent() == Some(identity))
            .map(|acl| acl.identity().clone())
            .collect();
        children.sort();
        children
    }

    /// Removes `identity` (and descendants when cascading); returns removed identities
    fn delete(
        &mut self,
        identity: &ObjectIdentity,
        cascade_to_children: bool,
    ) -> Result<Vec<ObjectIdentity>, StoreError> {
        if !self.acls.contains_key(identity) {
            return Ok(Vec::new());
        }
        let children = self.children(identity);
        if !children.is_empty() && !cascade_to_children {
            return Err(StoreError::ChildrenExist(identity.clone()));
        }

        let mut doomed = BTreeSet::new();
        let mut stack = vec![identity.clone()];
        while let Some(next) = stack.pop() {
            if doomed.insert(next.clone()) {
                stack.extend(self.children(&next));
            }
        }
        for id in &doomed {
            self.acls.remove(id);
        }
        Ok(doomed.into_iter().collect())
    }

    fn delete_sid(&mut self, sid: &Sid) -> usize {
        self.acls
            .values_mut()
            .map(|acl| acl.retain_entries(|ace| ace.sid() != sid))
            .sum()
    }
}

// ============================================================================
// In-Memory ACL Store
// ============================================================================

/// In-memory ACL store for testing or single-process use
pub struct MemoryAclStore {
    table: RwLock<AclTable>,
}

impl MemoryAclStore {
    pub fn new() -> Self {
        Self {
            table: RwLock::new(AclTable::default()),
        }
    }

    /// Pre-populated store
    pub fn with_acls(acls: Vec<Acl>) -> Self {
        Self {
            table: RwLock::new(AclTable::from_acls(acls)),
        }
    }

    /// Number of stored ACLs
    pub fn len(&self) -> usize {
        self.table
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .acls
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for MemoryAclStore {
    fn default() -> Self {
        Self::new()
    }
}

impl AclStore for MemoryAclStore {
    fn find(&self, identity: &ObjectIdentity) -> Result<Option<Acl>, StoreError> {
        let table = self.table.read().unwrap_or_else(PoisonError::into_inner);
        Ok(table.acls.get(identity).cloned())
    }

    fn create(&self, identity: &ObjectIdentity, owner: Sid) -> Result<Acl, StoreError> {
        let mut table = self.table.write().unwrap_or_else(PoisonError::into_inner);
        table.create(identity, owner)
    }

    fn update(&self, acl: Acl) -> Result<Acl, StoreError> {
        let mut table = self.table.write().unwrap_or_else(PoisonError::into_inner);
        table.update(acl)
    }

    fn delete(
        &self,
        identity: &ObjectIdentity,
        cascade_to_children: bool,
    ) -> Result<(), StoreError> {
        let mut table = self.table.write().unwrap_or_else(PoisonError::into_inner);
        table.delete(identity, cascade_to_children).map(|_| ())
    }

    fn find_children(&self, identity: &ObjectIdentity) -> Result<Vec<ObjectIdentity>, StoreError> {
        let table = self.table.read().unwrap_or_else(PoisonError::into_inner);
        Ok(table.children(identity))
    }

    fn identities(&self) -> Result<Vec<ObjectIdentity>, StoreError> {
        let table = self.table.read().unwrap_or_else(PoisonError::into_inner);
        let mut ids: Vec<ObjectIdentity> = table.acls.keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }

    fn delete_sid(&self, sid: &Sid) -> Result<usize, StoreError> {
        let mut table = self.table.write().unwrap_or_else(PoisonError::into_inner);
        Ok(table.delete_sid(sid))
    }
}

impl std::fmt::Debug for MemoryAclStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryAclStore")
            .field("count", &self.len())
            .finish()
    }
}

// ============================================================================
// File-based ACL Store
// ============================================================================

/// Persistent file data structure
#[derive(Debug, Clone, Serialize, Deserialize)]
struct AclFileData {
    version: u32,
    acls: Vec<Acl>,
}

/// File-based ACL store
///
/// Keeps every ACL in memory and rewrites a JSON snapshot after each
/// mutation. Default location: `<data dir>/<app>/acls.json`.
pub struct FileAclStore {
    path: PathBuf,
    table: RwLock<AclTable>,
}

impl FileAclStore {
    /// Open (or start) a store at `path`
    pub fn new(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();

        let table = if path.exists() {
            let file = File::open(&path)?;
            let data: AclFileData = serde_json::from_reader(BufReader::new(file))?;
            tracing::debug!(path = %path.display(), acls = data.acls.len(), "Loaded ACL store");
            AclTable::from_acls(data.acls)
        } else {
            AclTable::default()
        };

        Ok(Self {
            path,
            table: RwLock::new(table),
        })
    }

    /// Store in the default location for an application
    pub fn default_for_app(app_name: &str) -> Result<Self, StoreError> {
        let data_dir = dirs::data_dir().unwrap_or_else(|| PathBuf::from(".local/share"));
        Self::new(data_dir.join(app_name).join("acls.json"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn save(&self, table: &AclTable) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let data = AclFileData {
            version: 1,
            acls: table.sorted(),
        };
        let writer = BufWriter::new(File::create(&self.path)?);
        serde_json::to_writer_pretty(writer, &data)?;
        Ok(())
    }
}

impl AclStore for FileAclStore {
    fn find(&self, identity: &ObjectIdentity) -> Result<Option<Acl>, StoreError> {
        let table = self.table.read().unwrap_or_else(PoisonError::into_inner);
        Ok(table.acls.get(identity).cloned())
    }

    fn create(&self, identity: &ObjectIdentity, owner: Sid) -> Result<Acl, StoreError> {
        let mut table = self.table.write().unwrap_or_else(PoisonError::into_inner);
        let acl = table.create(identity, owner)?;
        self.save(&table)?;
        Ok(acl)
    }

    fn update(&self, acl: Acl) -> Result<Acl, StoreError> {
        let mut table = self.table.write().unwrap_or_else(PoisonError::into_inner);
        let acl = table.update(acl)?;
        self.save(&table)?;
        Ok(acl)
    }

    fn delete(
        &self,
        identity: &ObjectIdentity,
        cascade_to_children: bool,
    ) -> Result<(), StoreError> {
        let mut table = self.table.write().unwrap_or_else(PoisonError::into_inner);
        let removed = table.delete(identity, cascade_to_children)?;
        if !removed.is_empty() {
            self.save(&table)?;
        }
        Ok(())
    }

    fn find_children(&self, identity: &ObjectIdentity) -> Result<Vec<ObjectIdentity>, StoreError> {
        let table = self.table.read().unwrap_or_else(PoisonError::into_inner);
        Ok(table.children(identity))
    }

    fn identities(&self) -> Result<Vec<ObjectIdentity>, StoreError> {
        let table = self.table.read().unwrap_or_else(PoisonError::into_inner);
        Ok(table.sorted().into_iter().map(|acl| acl.identity().clone()).collect())
    }

    fn delete_sid(&self, sid: &Sid) -> Result<usize, StoreError> {
        let mut table = self.table.write().unwrap_or_else(PoisonError::into_inner);
        let removed = table.delete_sid(sid);
        if removed > 0 {
            self.save(&table)?;
        }
        Ok(removed)
    }
}

impl std::fmt::Debug for FileAclStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileAclStore")
            .field("path", &self.path)
            .finish()
    }
}

// ============================================================================
// Read-Only ACL Store
// ============================================================================

/// Read-only wrapper for any ACL store
///
/// Useful for evaluation-only processes that must never alter ACLs.
pub struct ReadOnlyAclStore<S: AclStore> {
    inner: S,
}

impl<S: AclStore> ReadOnlyAclStore<S> {
    pub fn new(inner: S) -> Self {
        Self { inner }
    }
}

impl<S: AclStore> AclStore for ReadOnlyAclStore<S> {
    fn find(&self, identity: &ObjectIdentity) -> Result<Option<Acl>, StoreError> {
        self.inner.find(identity)
    }

    fn create(&self, _identity: &ObjectIdentity, _owner: Sid) -> Result<Acl, StoreError> {
        Err(StoreError::ReadOnly)
    }

    fn update(&self, _acl: Acl) -> Result<Acl, StoreError> {
        Err(StoreError::ReadOnly)
    }

    fn delete(
        &self,
        _identity: &ObjectIdentity,
        _cascade_to_children: bool,
    ) -> Result<(), StoreError> {
        Err(StoreError::ReadOnly)
    }

    fn find_children(&self, identity: &ObjectIdentity) -> Result<Vec<ObjectIdentity>, StoreError> {
        self.inner.find_children(identity)
    }

    fn identities(&self) -> Result<Vec<ObjectIdentity>, StoreError> {
        self.inner.identities()
    }

    fn delete_sid(&self, _sid: &Sid) -> Result<usize, StoreError> {
        Err(StoreError::ReadOnly)
    }

    fn read_many(
        &self,
        identities: &[ObjectIdentity],
        sids: Option<&[Sid]>,
    ) -> Result<HashMap<ObjectIdentity, Acl>, StoreError> {
        self.inner.read_many(identities, sids)
    }
}

impl<S: AclStore + std::fmt::Debug> std::fmt::Debug for ReadOnlyAclStore<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReadOnlyAclStore")
            .field("inner", &self.inner)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use objacl_api::Permission;

    fn oi(type_name: &str, id: u64) -> ObjectIdentity {
        ObjectIdentity::new(type_name, id)
    }

    fn linked(store: &dyn AclStore, child: &ObjectIdentity, parent: &ObjectIdentity) {
        let mut acl = store.create(child, Sid::principal("alice")).unwrap();
        acl.link_parent(parent).unwrap();
        store.update(acl).unwrap();
    }

    #[test]
    fn test_create_never_overwrites() {
        let store = MemoryAclStore::new();
        let id = oi("Project", 1);
        let mut acl = store.create(&id, Sid::principal("alice")).unwrap();
        acl.grant(Permission::READ, Sid::principal("alice"));
        store.update(acl).unwrap();

        assert!(matches!(
            store.create(&id, Sid::principal("bob")),
            Err(StoreError::AlreadyExists(_))
        ));
        let stored = store.find(&id).unwrap().unwrap();
        assert_eq!(stored.owner(), Some(&Sid::principal("alice")));
        assert_eq!(stored.entries().len(), 1);
    }

    #[test]
    fn test_update_requires_parent() {
        let store = MemoryAclStore::new();
        let mut acl = Acl::new(oi("Sample", 1), None);
        acl.link_parent(&oi("Project", 1)).unwrap();
        assert!(matches!(
            store.update(acl),
            Err(StoreError::ParentNotFound { .. })
        ));
    }

    #[test]
    fn test_delete_cascades_to_descendants() {
        let store = MemoryAclStore::new();
        let project = oi("Project", 1);
        let sample = oi("Sample", 1);
        let aliquot = oi("Aliquot", 1);
        store.create(&project, Sid::principal("alice")).unwrap();
        linked(&store, &sample, &project);
        linked(&store, &aliquot, &sample);
        store.create(&oi("Project", 2), Sid::principal("alice")).unwrap();

        assert_eq!(store.find_children(&project).unwrap(), vec![sample.clone()]);
        store.delete(&project, true).unwrap();

        assert!(store.find(&project).unwrap().is_none());
        assert!(store.find(&sample).unwrap().is_none());
        assert!(store.find(&aliquot).unwrap().is_none());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_delete_without_cascade_refuses_orphans() {
        let store = MemoryAclStore::new();
        let project = oi("Project", 1);
        store.create(&project, Sid::principal("alice")).unwrap();
        linked(&store, &oi("Sample", 1), &project);

        assert!(matches!(
            store.delete(&project, false),
            Err(StoreError::ChildrenExist(_))
        ));
        assert!(store.find(&project).unwrap().is_some());
    }

    #[test]
    fn test_read_many_reports_missing_key() {
        let store = MemoryAclStore::new();
        store.create(&oi("Project", 1), Sid::principal("alice")).unwrap();

        let found = store
            .read_many(&[oi("Project", 1), oi("Project", 1)], None)
            .unwrap();
        assert_eq!(found.len(), 1);

        let err = store
            .read_many(&[oi("Project", 1), oi("Project", 2)], None)
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound(id) if id == oi("Project", 2)));
    }

    #[test]
    fn test_delete_sid() {
        let store = MemoryAclStore::new();
        for id in 1..=2 {
            let mut acl = store
                .create(&oi("Project", id), Sid::principal("alice"))
                .unwrap();
            acl.grant(Permission::READ, Sid::authority("GROUP_LAB"));
            acl.grant(Permission::WRITE, Sid::authority("GROUP_LAB"));
            acl.grant(Permission::READ, Sid::principal("alice"));
            store.update(acl).unwrap();
        }
        assert_eq!(store.delete_sid(&Sid::authority("GROUP_LAB")).unwrap(), 4);
        let acl = store.find(&oi("Project", 1)).unwrap().unwrap();
        assert_eq!(acl.entries().len(), 1);
    }

    #[test]
    fn test_file_store_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("acls.json");

        let store = FileAclStore::new(&path).unwrap();
        let project = oi("Project", 1);
        let mut acl = store.create(&project, Sid::principal("alice")).unwrap();
        acl.grant(Permission::ADMINISTRATION, Sid::authority("GROUP_ADMIN"));
        store.update(acl).unwrap();
        linked(&store, &oi("Sample", 4), &project);
        assert!(path.exists());

        let reopened = FileAclStore::new(&path).unwrap();
        let acl = reopened.find(&project).unwrap().unwrap();
        assert_eq!(acl.entries().len(), 1);
        assert_eq!(
            reopened.find_children(&project).unwrap(),
            vec![oi("Sample", 4)]
        );
    }

    #[test]
    fn test_read_only_store() {
        let inner = MemoryAclStore::new();
        inner.create(&oi("Project", 1), Sid::principal("alice")).unwrap();
        let store = ReadOnlyAclStore::new(inner);

        assert!(store.find(&oi("Project", 1)).unwrap().is_some());
        assert!(matches!(
            store.create(&oi("Project", 2), Sid::principal("bob")),
            Err(StoreError::ReadOnly)
        ));
        assert!(matches!(
            store.delete(&oi("Project", 1), true),
            Err(StoreError::ReadOnly)
        ));
        assert!(matches!(
            store.delete_sid(&Sid::principal("alice")),
            Err(StoreError::ReadOnly)
        ));
    }
}
