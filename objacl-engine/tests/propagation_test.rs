//! End-to-end ACL propagation over entity graphs

mod common;

use common::{admin, alice, bob, DirectoryHooks, Node};
use objacl_engine::objacl_api::{Acl, Entity, ObjectIdentity, Permission, Principal, Sid};
use objacl_engine::{
    AclAuditEventType, AclEngine, AclError, AclStore, AclTarget, EngineSettings, MemoryAclStore,
    MemoryAuditSink, Operation, PropagationHooks, StoreError, UnloadedPolicy,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

fn engine() -> (AclEngine, Arc<MemoryAuditSink>) {
    let audit = Arc::new(MemoryAuditSink::new());
    let engine = AclEngine::builder()
        .store(MemoryAclStore::new())
        .cascade(common::cascade())
        .hooks(DirectoryHooks::new().user(7, "bob").group(8, "lab"))
        .shared_audit(audit.clone())
        .build()
        .expect("Failed to build engine");
    (engine, audit)
}

fn acl_of(engine: &AclEngine, node: &Node) -> Acl {
    let identity = node.identity().expect("node has no identity");
    engine
        .store()
        .find(&identity)
        .unwrap()
        .unwrap_or_else(|| panic!("no ACL for {identity}"))
}

fn has_acl(engine: &AclEngine, node: &Node) -> bool {
    engine
        .store()
        .find(&node.identity().unwrap())
        .unwrap()
        .is_some()
}

#[test]
fn test_fresh_object_is_private() {
    let (engine, audit) = engine();
    let project = Node::project(1);

    engine
        .apply_acl(Operation::Create, AclTarget::one(project), &alice())
        .unwrap();

    let acl = acl_of(&engine, project);
    assert_eq!(acl.owner(), Some(&Sid::principal("alice")));
    assert_eq!(acl.entries().len(), 4);
    assert!(acl.has_local_grant(Permission::ADMINISTRATION, &Sid::authority("GROUP_ADMIN")));
    assert!(acl.has_local_grant(Permission::READ, &Sid::authority("GROUP_AGENT")));
    assert!(acl.has_local_grant(Permission::READ, &Sid::principal("alice")));
    assert!(acl.has_local_grant(Permission::WRITE, &Sid::principal("alice")));
    assert!(acl.parent().is_none());
    assert!(!acl.entries_inheriting());

    let eval = engine.evaluator();
    assert!(eval.is_private(&acl).unwrap());
    assert!(!eval.is_shared(&acl).unwrap());
    assert!(eval
        .has_permission(project, &[Permission::READ, Permission::WRITE], &alice())
        .unwrap());
    assert!(!eval.has_permission(project, &[Permission::READ], &bob()).unwrap());
    assert!(eval.has_permission(project, &[Permission::WRITE], &admin()).unwrap());

    assert_eq!(audit.find_by_type(AclAuditEventType::AclCreated).len(), 1);
}

#[test]
fn test_admin_created_object_is_public() {
    let (engine, _) = engine();
    let project = Node::project(1);

    engine
        .apply_acl(Operation::Create, AclTarget::one(project), &admin())
        .unwrap();

    let acl = acl_of(&engine, project);
    assert_eq!(acl.owner(), Some(&Sid::principal("root")));
    assert_eq!(acl.entries().len(), 3);
    assert!(acl.has_local_grant(
        Permission::READ,
        &Sid::authority("IS_AUTHENTICATED_ANONYMOUSLY")
    ));
    assert!(!acl.has_local_grant(Permission::WRITE, &Sid::principal("root")));

    let eval = engine.evaluator();
    assert!(!eval.is_private(&acl).unwrap());
    assert!(eval
        .has_permission(project, &[Permission::READ], &Principal::anonymous())
        .unwrap());
    assert!(!eval
        .has_permission(project, &[Permission::WRITE], &Principal::anonymous())
        .unwrap());
}

#[test]
fn test_secured_child_inherits_from_owner() {
    let (engine, audit) = engine();
    let sample = Node::sample(2);
    let project = Node::project(1).own("samples", sample);

    engine
        .apply_acl(Operation::Create, AclTarget::one(project), &alice())
        .unwrap();

    let child = acl_of(&engine, sample);
    assert_eq!(child.entries().len(), 0);
    assert_eq!(child.parent(), Some(&ObjectIdentity::new("Project", 1)));
    assert!(child.entries_inheriting());
    assert_eq!(child.owner(), Some(&Sid::principal("alice")));
    assert_eq!(audit.find_by_type(AclAuditEventType::ParentLinked).len(), 1);

    let parent = acl_of(&engine, project);
    let eval = engine.evaluator();
    assert_eq!(eval.is_private(&child).unwrap(), eval.is_private(&parent).unwrap());
    assert!(eval.has_permission(sample, &[Permission::READ], &alice()).unwrap());
    assert!(!eval.has_permission(sample, &[Permission::READ], &bob()).unwrap());

    engine.make_public(project, &alice()).unwrap();
    let eval = engine.evaluator();
    assert!(!eval.is_object_private(sample).unwrap());
    assert!(eval
        .has_permission(sample, &[Permission::READ], &Principal::anonymous())
        .unwrap());
}

#[test]
fn test_parent_threads_through_plain_nodes_and_nested_children() {
    let (engine, _) = engine();
    let project = Node::project(1);
    let sample = Node::sample(2);
    let characteristic = Node::characteristic(3);
    let summary = Node::summary(4);
    let listed = Node::sample(5);

    project.own("samples", sample);
    sample.own("characteristics", characteristic);
    project.link("summary", summary);
    summary.link("items", listed);
    listed.set_owner(project);

    engine
        .apply_acl(Operation::Create, AclTarget::one(project), &alice())
        .unwrap();

    let project_identity = ObjectIdentity::new("Project", 1);
    for node in [sample, characteristic, listed] {
        let acl = acl_of(&engine, node);
        assert_eq!(acl.parent(), Some(&project_identity), "{}", acl.identity());
        assert!(acl.entries().is_empty());
    }
    assert!(!has_acl(&engine, summary));
}

#[test]
fn test_never_inheriting_object_keeps_own_aces() {
    let (engine, _) = engine();
    let sample = Node::sample(2);
    let protocol = Node::protocol(9);
    let project = Node::project(1).own("samples", sample);
    sample.link("protocol", protocol);

    engine
        .apply_acl(Operation::Create, AclTarget::one(project), &alice())
        .unwrap();

    let acl = acl_of(&engine, protocol);
    assert!(acl.parent().is_none());
    assert!(!acl.entries_inheriting());
    assert_eq!(acl.entries().len(), 4);
    assert!(engine.evaluator().is_private(&acl).unwrap());
}

#[test]
fn test_create_is_idempotent() {
    let (engine, audit) = engine();
    let sample = Node::sample(2);
    let project = Node::project(1).own("samples", sample);

    engine
        .apply_acl(Operation::Create, AclTarget::one(project), &alice())
        .unwrap();
    let first_project = acl_of(&engine, project);
    let first_sample = acl_of(&engine, sample);

    engine
        .apply_acl(Operation::Create, AclTarget::one(project), &bob())
        .unwrap();

    assert_eq!(acl_of(&engine, project), first_project);
    assert_eq!(acl_of(&engine, sample), first_sample);
    assert_eq!(audit.find_by_type(AclAuditEventType::AclCreated).len(), 2);
    assert!(audit.find_by_type(AclAuditEventType::AclUpdated).is_empty());
}

#[test]
fn test_update_requires_existing_acl() {
    let (engine, _) = engine();
    let project = Node::project(1);

    let err = engine
        .apply_acl(Operation::Update, AclTarget::one(project), &alice())
        .unwrap_err();
    assert!(matches!(err, AclError::AclMissing(ref id) if *id == ObjectIdentity::new("Project", 1)));
}

#[test]
fn test_update_attaches_new_children() {
    let (engine, audit) = engine();
    let project = Node::project(1);
    engine
        .apply_acl(Operation::Create, AclTarget::one(project), &alice())
        .unwrap();

    let sample = Node::sample(2);
    project.own("samples", sample);
    engine
        .apply_acl(Operation::Update, AclTarget::one(project), &alice())
        .unwrap();

    let child = acl_of(&engine, sample);
    assert_eq!(child.parent(), Some(&ObjectIdentity::new("Project", 1)));
    assert!(child.entries().is_empty());
    assert_eq!(acl_of(&engine, project).entries().len(), 4);
    assert_eq!(audit.find_by_type(AclAuditEventType::AclUpdated).len(), 1);
}

#[test]
fn test_update_prunes_redundant_child_entries() {
    let (engine, audit) = engine();
    let sample = Node::sample(2);
    engine
        .apply_acl(Operation::Create, AclTarget::one(sample), &alice())
        .unwrap();
    assert_eq!(acl_of(&engine, sample).entries().len(), 4);

    let project = Node::project(1);
    engine
        .apply_acl(Operation::Create, AclTarget::one(project), &alice())
        .unwrap();
    project.own("samples", sample);
    engine
        .apply_acl(Operation::Update, AclTarget::one(project), &alice())
        .unwrap();

    let child = acl_of(&engine, sample);
    assert!(child.entries().is_empty());
    assert_eq!(child.parent(), Some(&ObjectIdentity::new("Project", 1)));
    assert!(child.entries_inheriting());

    let pruned = audit.find_by_type(AclAuditEventType::AcesPruned);
    assert_eq!(pruned.len(), 1);
    assert_eq!(pruned[0].identity, "Sample#2");
}

#[test]
fn test_mismatched_child_entries_are_kept() {
    let (engine, audit) = engine();
    let sample = Node::sample(2);
    engine
        .apply_acl(Operation::Create, AclTarget::one(sample), &alice())
        .unwrap();
    engine
        .make_readable_by_group(sample, "GROUP_LAB", &alice())
        .unwrap();

    let project = Node::project(1);
    engine
        .apply_acl(Operation::Create, AclTarget::one(project), &alice())
        .unwrap();
    project.own("samples", sample);
    engine
        .apply_acl(Operation::Update, AclTarget::one(project), &alice())
        .unwrap();

    let child = acl_of(&engine, sample);
    assert_eq!(child.entries().len(), 5);
    assert_eq!(child.parent(), Some(&ObjectIdentity::new("Project", 1)));
    assert!(audit.find_by_type(AclAuditEventType::AcesPruned).is_empty());
    assert_eq!(
        audit
            .find_by_type(AclAuditEventType::InconsistencyDetected)
            .len(),
        1
    );
}

/// Prunes every sample's entries once it has a parent
struct PruneSamples;

impl PropagationHooks for PruneSamples {
    fn allow_removing_aces_from_child(&self, entity: &dyn Entity, _parent: &Acl) -> bool {
        entity.type_name() == "Sample"
    }
}

#[test]
fn test_forced_pruning_clears_mismatched_child() {
    let audit = Arc::new(MemoryAuditSink::new());
    let engine = AclEngine::builder()
        .store(MemoryAclStore::new())
        .cascade(common::cascade())
        .hooks(PruneSamples)
        .shared_audit(audit.clone())
        .build()
        .unwrap();

    let sample = Node::sample(2);
    engine
        .apply_acl(Operation::Create, AclTarget::one(sample), &alice())
        .unwrap();
    engine
        .make_readable_by_group(sample, "GROUP_LAB", &alice())
        .unwrap();
    assert_eq!(acl_of(&engine, sample).entries().len(), 5);

    let project = Node::project(1);
    engine
        .apply_acl(Operation::Create, AclTarget::one(project), &alice())
        .unwrap();
    project.own("samples", sample);
    engine
        .apply_acl(Operation::Update, AclTarget::one(project), &alice())
        .unwrap();

    let child = acl_of(&engine, sample);
    assert!(child.entries().is_empty());
    assert_eq!(child.parent(), Some(&ObjectIdentity::new("Project", 1)));
    assert!(child.entries_inheriting());
    assert_eq!(acl_of(&engine, project).entries().len(), 4);

    let pruned = audit.find_by_type(AclAuditEventType::AcesPruned);
    assert_eq!(pruned.len(), 1);
    assert_eq!(pruned[0].identity, "Sample#2");
    assert!(audit
        .find_by_type(AclAuditEventType::InconsistencyDetected)
        .is_empty());

    // The group grant went with the pruned entries
    let eval = engine.evaluator();
    let lab_member = Principal::new("carol").with_authority("GROUP_LAB");
    assert!(!eval.has_permission(sample, &[Permission::READ], &lab_member).unwrap());
}

/// Follows `related` even though its cascade style is `None`
struct FollowRelated;

impl PropagationHooks for FollowRelated {
    fn force_association_follow(&self, _entity: &dyn Entity, property: &str) -> bool {
        property == "related"
    }
}

#[test]
fn test_forced_follow_walks_non_cascading_property() {
    let (plain, _) = engine();
    let sample = Node::sample(5);
    let project = Node::project(1).link("related", sample);
    plain
        .apply_acl(Operation::Create, AclTarget::one(project), &alice())
        .unwrap();
    assert!(has_acl(&plain, project));
    assert!(!has_acl(&plain, sample));

    let forced = AclEngine::builder()
        .store(MemoryAclStore::new())
        .cascade(common::cascade())
        .hooks(FollowRelated)
        .build()
        .unwrap();
    let sample = Node::sample(5);
    let project = Node::project(1).link("related", sample);
    forced
        .apply_acl(Operation::Create, AclTarget::one(project), &alice())
        .unwrap();

    let acl = acl_of(&forced, sample);
    assert_eq!(acl.parent(), Some(&ObjectIdentity::new("Project", 1)));
    assert!(acl.entries().is_empty());
    assert!(forced
        .evaluator()
        .has_permission(sample, &[Permission::READ], &alice())
        .unwrap());
}

/// Skips the `samples` property and everything below summaries
struct SkipHooks;

impl PropagationHooks for SkipHooks {
    fn can_skip_association_check(&self, _entity: &dyn Entity, property: &str) -> bool {
        property == "samples"
    }

    fn can_skip_acl_check(&self, entity: &dyn Entity) -> bool {
        entity.type_name() == "Summary"
    }
}

#[test]
fn test_skip_hooks_leave_associations_alone() {
    let engine = AclEngine::builder()
        .store(MemoryAclStore::new())
        .cascade(common::cascade())
        .hooks(SkipHooks)
        .build()
        .unwrap();

    let owned = Node::sample(2);
    let listed = Node::sample(5);
    let summary = Node::summary(4).link("items", listed);
    let project = Node::project(1)
        .own("samples", owned)
        .link("summary", summary);

    engine
        .apply_acl(Operation::Create, AclTarget::one(project), &alice())
        .unwrap();

    assert!(has_acl(&engine, project));
    assert!(!has_acl(&engine, owned));
    assert!(!has_acl(&engine, listed));
}

/// Grants every new project to the lab group
struct LabProjects;

impl PropagationHooks for LabProjects {
    fn special_cases(&self, acl: &mut Acl, parent: Option<&Acl>, _sid: &Sid, entity: &dyn Entity) {
        let lab = Sid::authority("GROUP_LAB");
        if parent.is_none()
            && entity.type_name() == "Project"
            && !acl.has_local_grant(Permission::READ, &lab)
        {
            acl.grant(Permission::READ, lab);
        }
    }
}

#[test]
fn test_special_cases_adjust_fresh_acl() {
    let engine = AclEngine::builder()
        .store(MemoryAclStore::new())
        .cascade(common::cascade())
        .hooks(LabProjects)
        .build()
        .unwrap();

    let sample = Node::sample(2);
    let project = Node::project(1).own("samples", sample);
    engine
        .apply_acl(Operation::Create, AclTarget::one(project), &alice())
        .unwrap();

    let acl = acl_of(&engine, project);
    assert_eq!(acl.entries().len(), 5);
    assert!(acl.has_local_grant(Permission::READ, &Sid::authority("GROUP_LAB")));
    assert!(acl_of(&engine, sample).entries().is_empty());

    let eval = engine.evaluator();
    assert!(eval.is_shared(&acl).unwrap());
    assert_eq!(eval.groups_readable_by(sample).unwrap(), vec!["GROUP_LAB"]);
}

#[test]
fn test_delete_cascades_to_children() {
    let (engine, audit) = engine();
    let sample = Node::sample(2);
    let project = Node::project(1).own("samples", sample);
    let other = Node::project(3);
    engine
        .apply_acl(
            Operation::Create,
            AclTarget::many([project as &dyn Entity, other as &dyn Entity]),
            &alice(),
        )
        .unwrap();

    engine
        .apply_acl(Operation::Delete, AclTarget::one(project), &alice())
        .unwrap();

    assert!(!has_acl(&engine, project));
    assert!(!has_acl(&engine, sample));
    assert!(has_acl(&engine, other));
    assert_eq!(audit.find_by_type(AclAuditEventType::AclDeleted).len(), 1);
}

#[test]
fn test_collection_skips_non_securables() {
    let (engine, _) = engine();
    let project = Node::project(1);
    let summary = Node::summary(4);

    engine
        .apply_acl(
            Operation::Create,
            vec![summary as &dyn Entity, project as &dyn Entity],
            &alice(),
        )
        .unwrap();

    assert!(has_acl(&engine, project));
    assert_eq!(engine.store().identities().unwrap().len(), 1);
}

#[test]
fn test_relinking_to_another_parent_fails() {
    let (engine, _) = engine();
    let store = engine.store();
    store
        .create(&ObjectIdentity::new("Project", 2), Sid::principal("alice"))
        .unwrap();
    let mut existing = store
        .create(&ObjectIdentity::new("Sample", 5), Sid::principal("alice"))
        .unwrap();
    existing.link_parent(&ObjectIdentity::new("Project", 2)).unwrap();
    store.update(existing).unwrap();

    let sample = Node::sample(5);
    let project = Node::project(1).own("samples", sample);
    let err = engine
        .apply_acl(Operation::Create, AclTarget::one(project), &alice())
        .unwrap_err();

    match err {
        AclError::ParentConflict {
            object,
            current,
            proposed,
        } => {
            assert_eq!(object, ObjectIdentity::new("Sample", 5));
            assert_eq!(current, ObjectIdentity::new("Project", 2));
            assert_eq!(proposed, ObjectIdentity::new("Project", 1));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_child_and_parent_without_entries_is_inconsistent() {
    let (engine, _) = engine();
    engine
        .store()
        .create(&ObjectIdentity::new("Project", 1), Sid::principal("alice"))
        .unwrap();

    let sample = Node::sample(2);
    Node::project(1).own("samples", sample);

    let err = engine
        .apply_acl(Operation::Create, AclTarget::one(sample), &alice())
        .unwrap_err();
    assert!(matches!(err, AclError::InconsistentAcl { .. }));
}

#[test]
fn test_new_user_owns_own_account() {
    let (engine, _) = engine();
    let user = Node::user(7);
    let registrar = Principal::anonymous().with_authority("GROUP_RUN_AS_ADMIN");

    engine
        .apply_acl(Operation::Create, AclTarget::one(user), &registrar)
        .unwrap();

    let acl = acl_of(&engine, user);
    assert_eq!(acl.owner(), Some(&Sid::principal("bob")));
    assert_eq!(acl.entries().len(), 4);
    assert!(acl.has_local_grant(Permission::READ, &Sid::principal("bob")));
    assert!(acl.has_local_grant(Permission::WRITE, &Sid::principal("bob")));
    assert!(!acl.has_local_grant(Permission::READ, &Sid::principal("anonymousUser")));
    assert!(engine.evaluator().is_private(&acl).unwrap());
}

#[test]
fn test_new_group_is_readable_by_members() {
    let (engine, _) = engine();
    let group = Node::group(8);

    engine
        .apply_acl(Operation::Create, AclTarget::one(group), &alice())
        .unwrap();

    let acl = acl_of(&engine, group);
    assert!(acl.has_local_grant(Permission::READ, &Sid::authority("GROUP_LAB")));
    let eval = engine.evaluator();
    assert!(eval.is_shared(&acl).unwrap());
    assert!(eval
        .has_permission(group, &[Permission::READ], &bob().with_authority("GROUP_LAB"))
        .unwrap());
}

#[test]
fn test_unsaved_object() {
    let (engine, _) = engine();
    let project = Node::unsaved_project();

    let err = engine
        .apply_acl(Operation::Create, AclTarget::one(project), &alice())
        .unwrap_err();
    assert!(matches!(err, AclError::UnresolvableIdentity(_)));

    let result = engine.create_or_update(None, project, None, &alice()).unwrap();
    assert!(result.is_none());
    assert!(engine.store().identities().unwrap().is_empty());
}

#[test]
fn test_unloaded_association_policy() {
    let project = Node::project(1);
    project.mark_unloaded("samples");

    let (engine, _) = engine();
    engine
        .apply_acl(Operation::Create, AclTarget::one(project), &alice())
        .unwrap();

    let strict = AclEngine::builder()
        .store(MemoryAclStore::new())
        .cascade(common::cascade())
        .settings(EngineSettings {
            unloaded_policy: UnloadedPolicy::Fail,
            ..Default::default()
        })
        .build()
        .unwrap();
    let err = strict
        .apply_acl(Operation::Create, AclTarget::one(project), &alice())
        .unwrap_err();
    assert!(matches!(err, AclError::UnloadedAssociation { ref property, .. } if property == "samples"));
}

#[test]
fn test_cyclic_graph_terminates() {
    let (engine, _) = engine();
    let sample = Node::sample(2);
    let project = Node::project(1).own("samples", sample);
    sample.link("characteristics", project);

    engine
        .apply_acl(Operation::Create, AclTarget::one(project), &alice())
        .unwrap();
    assert_eq!(engine.store().identities().unwrap().len(), 2);
}

#[test]
fn test_staged_changes_commit_and_rollback() {
    let (engine, _) = engine();
    let sample = Node::sample(2);
    let project = Node::project(1).own("samples", sample);

    let (staged, overlay) = engine.staged();
    staged
        .apply_acl(Operation::Create, AclTarget::one(project), &alice())
        .unwrap();
    assert!(has_acl(&staged, sample));
    assert!(engine.store().identities().unwrap().is_empty());

    overlay.rollback();
    assert_eq!(overlay.pending_changes(), 0);
    assert!(engine.store().identities().unwrap().is_empty());

    staged
        .apply_acl(Operation::Create, AclTarget::one(project), &alice())
        .unwrap();
    assert_eq!(overlay.commit().unwrap(), 2);
    assert_eq!(
        acl_of(&engine, sample).parent(),
        Some(&ObjectIdentity::new("Project", 1))
    );
}

/// Store whose next lookup misses, as if another writer created the ACL
/// between the lookup and the insert
struct RacyStore {
    inner: MemoryAclStore,
    miss_next_find: AtomicBool,
}

impl AclStore for RacyStore {
    fn find(&self, identity: &ObjectIdentity) -> Result<Option<Acl>, StoreError> {
        if self.miss_next_find.swap(false, Ordering::SeqCst) {
            return Ok(None);
        }
        self.inner.find(identity)
    }

    fn create(&self, identity: &ObjectIdentity, owner: Sid) -> Result<Acl, StoreError> {
        self.inner.create(identity, owner)
    }

    fn update(&self, acl: Acl) -> Result<Acl, StoreError> {
        self.inner.update(acl)
    }

    fn delete(&self, identity: &ObjectIdentity, cascade_to_children: bool) -> Result<(), StoreError> {
        self.inner.delete(identity, cascade_to_children)
    }

    fn find_children(&self, identity: &ObjectIdentity) -> Result<Vec<ObjectIdentity>, StoreError> {
        self.inner.find_children(identity)
    }

    fn identities(&self) -> Result<Vec<ObjectIdentity>, StoreError> {
        self.inner.identities()
    }

    fn delete_sid(&self, sid: &Sid) -> Result<usize, StoreError> {
        self.inner.delete_sid(sid)
    }
}

#[test]
fn test_lost_creation_race_becomes_update() {
    let mut existing = Acl::new(ObjectIdentity::new("Project", 1), Some(Sid::principal("alice")));
    existing.grant(Permission::READ, Sid::principal("alice"));
    existing.grant(Permission::WRITE, Sid::principal("alice"));

    let store = RacyStore {
        inner: MemoryAclStore::with_acls(vec![existing.clone()]),
        miss_next_find: AtomicBool::new(true),
    };
    let engine = AclEngine::builder()
        .store(store)
        .cascade(common::cascade())
        .build()
        .unwrap();

    let project = Node::project(1);
    engine
        .apply_acl(Operation::Create, AclTarget::one(project), &bob())
        .unwrap();

    assert_eq!(acl_of(&engine, project), existing);
}
