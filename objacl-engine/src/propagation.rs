//! ACL propagation
//!
//! Callers invoke [`AclEngine::apply_acl`] at the boundary of their own
//! create/update/delete operations. The engine decides, for the root entity
//! and every securable reachable through cascading associations, whether it
//! needs ACEs of its own, whether it inherits from a parent, and when child
//! entries have become redundant with the parent's.

use objacl_api::{Acl, Entity, InheritanceMode, Permission, Principal, Sid};
use std::sync::Arc;

use crate::audit::{self, AclAuditEvent, AuditSink};
use crate::bulk::BulkPermissionChecker;
use crate::cascade::{CascadePolicyProvider, Operation};
use crate::config::UnloadedPolicy;
use crate::error::{AclError, Result};
use crate::evaluator::{nearest_secured_owner, PermissionEvaluator};
use crate::filter::ResultFilter;
use crate::hooks::PropagationHooks;
use crate::sid::SidResolver;
use crate::staged::StagedAclStore;
use crate::store::{AclStore, StoreError};
use crate::walker::{AssociationVisitor, ObjectGraphWalker};

/// Root object(s) of an `apply_acl` call
pub enum AclTarget<'a> {
    One(&'a dyn Entity),
    /// Homogeneous collection; each element is handled independently
    Many(Vec<&'a dyn Entity>),
}

impl<'a> AclTarget<'a> {
    pub fn one(entity: &'a dyn Entity) -> Self {
        Self::One(entity)
    }

    pub fn many<I>(entities: I) -> Self
    where
        I: IntoIterator<Item = &'a dyn Entity>,
    {
        Self::Many(entities.into_iter().collect())
    }

    fn into_vec(self) -> Vec<&'a dyn Entity> {
        match self {
            Self::One(entity) => vec![entity],
            Self::Many(entities) => entities,
        }
    }
}

impl<'a> From<&'a dyn Entity> for AclTarget<'a> {
    fn from(entity: &'a dyn Entity) -> Self {
        Self::One(entity)
    }
}

impl<'a> From<Vec<&'a dyn Entity>> for AclTarget<'a> {
    fn from(entities: Vec<&'a dyn Entity>) -> Self {
        Self::Many(entities)
    }
}

/// The access-control engine
///
/// Construct one with [`crate::presets::AclEngineBuilder`] or
/// [`crate::presets::AclPresets`].
pub struct AclEngine {
    store: Arc<dyn AclStore>,
    cascade: Arc<dyn CascadePolicyProvider>,
    hooks: Arc<dyn PropagationHooks>,
    audit: Arc<dyn AuditSink>,
    sids: SidResolver,
    unloaded_policy: UnloadedPolicy,
    max_depth: Option<usize>,
}

impl AclEngine {
    pub(crate) fn from_parts(
        store: Arc<dyn AclStore>,
        cascade: Arc<dyn CascadePolicyProvider>,
        hooks: Arc<dyn PropagationHooks>,
        audit: Arc<dyn AuditSink>,
        sids: SidResolver,
        unloaded_policy: UnloadedPolicy,
        max_depth: Option<usize>,
    ) -> Self {
        Self {
            store,
            cascade,
            hooks,
            audit,
            sids,
            unloaded_policy,
            max_depth,
        }
    }

    pub fn store(&self) -> &dyn AclStore {
        self.store.as_ref()
    }

    pub fn sid_resolver(&self) -> &SidResolver {
        &self.sids
    }

    pub fn audit_sink(&self) -> &dyn AuditSink {
        self.audit.as_ref()
    }

    /// Same engine writing to a different store (e.g., a staged overlay)
    pub fn with_store(&self, store: Arc<dyn AclStore>) -> Self {
        Self {
            store,
            cascade: Arc::clone(&self.cascade),
            hooks: Arc::clone(&self.hooks),
            audit: Arc::clone(&self.audit),
            sids: self.sids.clone(),
            unloaded_policy: self.unloaded_policy,
            max_depth: self.max_depth,
        }
    }

    /// Engine writing into a fresh overlay of this engine's store
    ///
    /// Commit or roll back through the returned overlay handle.
    pub fn staged(&self) -> (Self, Arc<StagedAclStore>) {
        let overlay = Arc::new(StagedAclStore::new(Arc::clone(&self.store)));
        let engine = self.with_store(Arc::clone(&overlay) as Arc<dyn AclStore>);
        (engine, overlay)
    }

    /// Evaluator with a fresh ACL cache
    pub fn evaluator(&self) -> PermissionEvaluator<'_> {
        PermissionEvaluator::new(self.store.as_ref(), &self.sids)
    }

    pub fn bulk(&self) -> BulkPermissionChecker<'_> {
        BulkPermissionChecker::new(self.store.as_ref(), &self.sids)
    }

    pub fn filter(&self) -> ResultFilter<'_> {
        ResultFilter::new(self.bulk())
    }

    pub(crate) fn record(&self, event: AclAuditEvent) {
        if let Err(err) = self.audit.record(event) {
            tracing::warn!(error = %err, "Failed to record ACL audit event");
        }
    }

    /// Attach, correct, or remove ACLs after `operation` on `target`
    ///
    /// Non-securable elements are skipped.
    pub fn apply_acl<'t>(
        &self,
        operation: Operation,
        target: impl Into<AclTarget<'t>>,
        principal: &Principal,
    ) -> Result<()> {
        for entity in target.into().into_vec() {
            if !entity.is_securable() {
                tracing::trace!(type_name = entity.type_name(), "Not securable; skipping");
                continue;
            }
            match operation {
                Operation::Create => self.start_create(entity, principal)?,
                Operation::Update => self.start_update(entity, principal)?,
                Operation::Delete => self.delete_acl(entity, principal)?,
            }
        }
        Ok(())
    }

    fn start_create(&self, entity: &dyn Entity, principal: &Principal) -> Result<()> {
        let identity = entity
            .identity()
            .ok_or_else(|| unresolvable(entity))?;
        tracing::debug!(identity = %identity, principal = principal.name(), "Start create ACL");

        let parent = if entity.inheritance() == Some(InheritanceMode::InheritsAlways) {
            self.locate_parent_acl(entity)?
        } else {
            None
        };
        self.create_or_update(None, entity, parent.as_ref(), principal)?;
        self.walk(Operation::Create, entity, parent, principal)
    }

    fn start_update(&self, entity: &dyn Entity, principal: &Principal) -> Result<()> {
        let identity = entity
            .identity()
            .ok_or_else(|| unresolvable(entity))?;
        tracing::debug!(identity = %identity, principal = principal.name(), "Start update ACL");

        let acl = self
            .store
            .find(&identity)?
            .ok_or_else(|| AclError::AclMissing(identity.clone()))?;
        let parent = match acl.parent() {
            Some(parent_identity) => Some(
                self.store
                    .find(parent_identity)?
                    .ok_or_else(|| StoreError::NotFound(parent_identity.clone()))?,
            ),
            None => None,
        };
        self.create_or_update(Some(acl), entity, parent.as_ref(), principal)?;
        self.walk(Operation::Update, entity, parent, principal)
    }

    fn delete_acl(&self, entity: &dyn Entity, principal: &Principal) -> Result<()> {
        let identity = entity
            .identity()
            .ok_or_else(|| unresolvable(entity))?;
        tracing::debug!(identity = %identity, "Deleting ACL and descendants");
        self.store.delete(&identity, true)?;
        self.record(audit::acl_deleted(&identity, principal, true));
        Ok(())
    }

    fn walk(
        &self,
        operation: Operation,
        entity: &dyn Entity,
        parent: Option<Acl>,
        principal: &Principal,
    ) -> Result<()> {
        let walker = ObjectGraphWalker::new(self.cascade.as_ref(), self.hooks.as_ref())
            .unloaded_policy(self.unloaded_policy)
            .max_depth(self.max_depth);
        let mut pass = PropagationPass {
            engine: self,
            principal,
        };
        walker.walk(operation, entity, parent, &mut pass)?;
        Ok(())
    }

    /// ACL of the nearest security owner that is not itself a secured child
    pub fn locate_parent_acl(&self, entity: &dyn Entity) -> Result<Option<Acl>> {
        let Some(owner) = nearest_secured_owner(entity) else {
            return Ok(None);
        };
        match owner.identity() {
            Some(identity) => Ok(self.store.find(&identity)?),
            None => Ok(None),
        }
    }

    /// Create the ACL for `entity`, or correct an existing one
    ///
    /// `acl` is the already-fetched ACL when the caller has it. Returns `None`
    /// when the entity has no persisted identity yet; the caller is expected
    /// to retry once it does.
    pub fn create_or_update(
        &self,
        acl: Option<Acl>,
        entity: &dyn Entity,
        parent: Option<&Acl>,
        principal: &Principal,
    ) -> Result<Option<Acl>> {
        let Some(identity) = entity.identity() else {
            tracing::warn!(
                type_name = entity.type_name(),
                "ACLs cannot be added or updated on non-persistent object"
            );
            return Ok(None);
        };
        tracing::trace!(identity = %identity, "Checking for ACLs");

        let (mut acl, created) = match acl {
            Some(acl) => (acl, false),
            None => match self.store.find(&identity)? {
                Some(existing) => {
                    tracing::debug!(identity = %identity, "ACL found; checking parent linkage");
                    return self
                        .maybe_set_parent_acl(entity, existing, parent, principal)
                        .map(Some);
                }
                None => match self.store.create(&identity, principal.sid()) {
                    Ok(fresh) => (fresh, true),
                    Err(StoreError::AlreadyExists(_)) => {
                        tracing::debug!(identity = %identity, "Lost ACL creation race; treating as update");
                        let existing = self
                            .store
                            .find(&identity)?
                            .ok_or_else(|| StoreError::NotFound(identity.clone()))?;
                        return self
                            .maybe_set_parent_acl(entity, existing, parent, principal)
                            .map(Some);
                    }
                    Err(err) => return Err(err.into()),
                },
            },
        };

        let is_admin = self.sids.is_admin(principal);
        let mode = entity.inheritance();
        let inherit_from_parent =
            parent.is_some() && mode != Some(InheritanceMode::NeverInherits);

        if parent.is_none() && mode == Some(InheritanceMode::InheritsAlways) {
            tracing::debug!(identity = %identity, "Object did not have a parent during ACL setup");
        }

        if created && !inherit_from_parent {
            let keep_private = self.hooks.keep_private_on_creation(entity);
            self.setup_base_aces(&mut acl, &principal.sid(), keep_private, principal);

            // Future members of a new group can read it
            if let Some(group) = self.hooks.group_authority(entity) {
                tracing::debug!(identity = %identity, group = %group, "Making group readable by its members");
                acl.grant(Permission::READ, Sid::authority(group));
            }
        } else if acl.entries().is_empty() && parent.is_none() {
            tracing::warn!(identity = %identity, "ACL has no entries and no parent to inherit from");
        }

        let mut sid = principal.sid();
        if created {
            if let Some(user_name) = self.hooks.user_name(entity) {
                if user_name == principal.name() {
                    tracing::warn!(identity = %identity, user = %user_name, "A user created themselves");
                } else {
                    if self.sids.is_running_as_admin(principal) {
                        sid = Sid::principal(user_name.clone());
                        acl.set_owner(sid.clone());
                    }
                    tracing::debug!(identity = %identity, sid = %sid, "New user given read/write permissions");
                    acl.grant(Permission::READ, sid.clone());
                    acl.grant(Permission::WRITE, sid.clone());
                }
            }
        }

        self.hooks.special_cases(&mut acl, parent, &sid, entity);

        if acl.owner() == Some(&sid) || is_admin {
            if is_admin && acl.owner().is_none() {
                acl.set_owner(sid.clone());
            }
            if let Some(parent) = parent.filter(|_| inherit_from_parent) {
                if acl.link_parent(parent.identity())? {
                    tracing::trace!(child = %identity, parent = %parent.identity(), "Setting parent ACL");
                    self.record(audit::parent_linked(&identity, parent.identity(), principal));
                }
            }
            acl.set_entries_inheriting(inherit_from_parent);
            self.maybe_clear_aces(entity, &mut acl, parent, principal)?;
        }

        let saved = self.store.update(acl)?;
        if created {
            self.record(audit::acl_created(&saved, principal));
        } else {
            self.record(audit::acl_updated(&saved, principal));
        }
        Ok(Some(saved))
    }

    fn setup_base_aces(&self, acl: &mut Acl, sid: &Sid, keep_private: bool, principal: &Principal) {
        let authorities = self.sids.authorities();
        let is_admin = self.sids.is_admin(principal);
        let identity = acl.identity().clone();

        tracing::debug!(identity = %identity, "Granting base ACEs");
        acl.grant(Permission::ADMINISTRATION, authorities.admin_sid());
        acl.grant(Permission::READ, authorities.agent_sid());

        if is_admin && !keep_private {
            tracing::debug!(identity = %identity, "Making readable by anonymous");
            acl.grant(Permission::READ, authorities.anonymous_sid());
        }

        if !is_admin && !self.sids.is_anonymous(principal) {
            acl.grant(Permission::READ, sid.clone());
            acl.grant(Permission::WRITE, sid.clone());
        }
    }

    /// Link an existing ACL to `parent` if not yet linked, then try pruning
    fn maybe_set_parent_acl(
        &self,
        entity: &dyn Entity,
        mut acl: Acl,
        parent: Option<&Acl>,
        principal: &Principal,
    ) -> Result<Acl> {
        let Some(parent) = parent else {
            return Ok(acl);
        };
        if entity.inheritance() == Some(InheritanceMode::NeverInherits) {
            return Ok(acl);
        }

        let linked = acl.link_parent(parent.identity())?;
        if linked {
            tracing::trace!(child = %acl.identity(), parent = %parent.identity(), "Setting parent ACL");
            acl.set_entries_inheriting(true);
        }
        let cleared = self.maybe_clear_aces(entity, &mut acl, Some(parent), principal)?;

        if linked || cleared {
            acl = self.store.update(acl)?;
            if linked {
                self.record(audit::parent_linked(acl.identity(), parent.identity(), principal));
            }
            self.record(audit::acl_updated(&acl, principal));
        }
        Ok(acl)
    }

    /// Remove the child's ACEs when they merely repeat the parent's
    ///
    /// Returns whether entries were removed. A child/parent mismatch is
    /// logged and left alone; a child and parent that both lack entries are
    /// an error.
    pub fn maybe_clear_aces(
        &self,
        entity: &dyn Entity,
        child: &mut Acl,
        parent: Option<&Acl>,
        principal: &Principal,
    ) -> Result<bool> {
        let Some(parent) = parent else {
            return Ok(false);
        };
        if entity.inheritance() == Some(InheritanceMode::NeverInherits) {
            return Ok(false);
        }

        let ace_count = child.entries().len();
        if ace_count == 0 {
            if parent.entries().is_empty() {
                return Err(AclError::InconsistentAcl {
                    child: child.identity().clone(),
                    parent: parent.identity().clone(),
                });
            }
            return Ok(false);
        }

        let force = self.hooks.allow_removing_aces_from_child(entity, parent);
        if parent.entries().len() == ace_count || force {
            let unmatched = parent.entries().iter().find(|ace| {
                !child
                    .entries()
                    .iter()
                    .any(|c| c.permission() == ace.permission() && c.sid() == ace.sid())
            });
            if let Some(ace) = unmatched {
                tracing::warn!(
                    ace = %ace,
                    parent = %parent.identity(),
                    child = %child.identity(),
                    "Didn't find matching permission on child"
                );
            }

            if force || unmatched.is_none() {
                tracing::trace!(child = %child.identity(), removed = ace_count, "Erasing ACEs from child");
                child.clear_entries();
                self.record(audit::aces_pruned(
                    child.identity(),
                    parent.identity(),
                    ace_count,
                    principal,
                ));
                return Ok(true);
            }
        } else {
            tracing::warn!(
                child = %child,
                parent = %parent,
                "Could not clear ACEs on child; entry counts differ"
            );
        }

        self.record(audit::inconsistency_detected(child, parent, principal));
        Ok(false)
    }

    /// Parent ACL for everything reachable beneath `entity`
    ///
    /// A never-inheriting entity, or an owning entity at the top of a subtree,
    /// re-roots parenthood at its own ACL; otherwise the previous parent is
    /// threaded through.
    pub fn choose_parent_for_associations(
        &self,
        entity: &dyn Entity,
        previous: Option<Acl>,
    ) -> Result<Option<Acl>> {
        let mode = entity.inheritance();
        let re_root = mode == Some(InheritanceMode::NeverInherits)
            || (previous.is_none() && mode == Some(InheritanceMode::OwnsAces));
        if !re_root {
            return Ok(previous);
        }
        match entity.identity() {
            Some(identity) => Ok(self.store.find(&identity)?),
            None => Ok(None),
        }
    }
}

impl std::fmt::Debug for AclEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AclEngine")
            .field("sids", &self.sids)
            .field("unloaded_policy", &self.unloaded_policy)
            .field("max_depth", &self.max_depth)
            .finish_non_exhaustive()
    }
}

fn unresolvable(entity: &dyn Entity) -> AclError {
    AclError::UnresolvableIdentity(format!("unsaved {}", entity.type_name()))
}

/// Visitor binding one walk to the engine and the acting principal
struct PropagationPass<'e> {
    engine: &'e AclEngine,
    principal: &'e Principal,
}

impl AssociationVisitor for PropagationPass<'_> {
    fn visit_securable(&mut self, entity: &dyn Entity, parent: Option<&Acl>) -> Result<()> {
        self.engine
            .create_or_update(None, entity, parent, self.principal)?;
        Ok(())
    }

    fn choose_parent(&mut self, entity: &dyn Entity, previous: Option<Acl>) -> Result<Option<Acl>> {
        self.engine.choose_parent_for_associations(entity, previous)
    }
}
