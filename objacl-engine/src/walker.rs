//! Association graph traversal
//!
//! The walker follows an entity's associations as the cascade policy
//! dictates and hands every securable it reaches to a visitor, together with
//! the parent ACL established for that subtree.

use objacl_api::entity::entity_addr;
use objacl_api::{Acl, Association, Entity, ObjectIdentity};
use std::collections::HashSet;

use crate::cascade::{CascadePolicyProvider, Operation};
use crate::config::UnloadedPolicy;
use crate::error::{AclError, Result};
use crate::hooks::PropagationHooks;

/// Callbacks invoked while walking
pub trait AssociationVisitor {
    /// A securable was reached below a node whose subtree parent is `parent`
    fn visit_securable(&mut self, entity: &dyn Entity, parent: Option<&Acl>) -> Result<()>;

    /// Parent ACL for everything reachable beneath `entity`
    fn choose_parent(&mut self, entity: &dyn Entity, previous: Option<Acl>) -> Result<Option<Acl>>;
}

/// Counters for one walk
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WalkSummary {
    /// Securables handed to the visitor
    pub securables: usize,
    /// Nodes whose associations were inspected
    pub nodes: usize,
    /// Association branches ended because the value was not loaded
    pub unloaded: usize,
    /// Nodes skipped because they were already visited
    pub revisits: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum VisitKey {
    Identity(ObjectIdentity),
    Address(usize),
}

impl VisitKey {
    fn of(entity: &dyn Entity) -> Self {
        match entity.identity() {
            Some(identity) if entity.is_securable() => Self::Identity(identity),
            _ => Self::Address(entity_addr(entity)),
        }
    }
}

struct WalkState {
    visited: HashSet<VisitKey>,
    summary: WalkSummary,
}

/// Cascade-guided traversal of an entity graph
pub struct ObjectGraphWalker<'a> {
    cascade: &'a dyn CascadePolicyProvider,
    hooks: &'a dyn PropagationHooks,
    unloaded_policy: UnloadedPolicy,
    max_depth: Option<usize>,
}

impl<'a> ObjectGraphWalker<'a> {
    pub fn new(cascade: &'a dyn CascadePolicyProvider, hooks: &'a dyn PropagationHooks) -> Self {
        Self {
            cascade,
            hooks,
            unloaded_policy: UnloadedPolicy::default(),
            max_depth: None,
        }
    }

    pub fn unloaded_policy(mut self, policy: UnloadedPolicy) -> Self {
        self.unloaded_policy = policy;
        self
    }

    pub fn max_depth(mut self, max_depth: Option<usize>) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Walk the associations of `entity` for `operation`
    ///
    /// `parent` is the parent ACL already established above `entity` (if any).
    /// Every node is visited at most once per walk.
    pub fn walk(
        &self,
        operation: Operation,
        entity: &dyn Entity,
        parent: Option<Acl>,
        visitor: &mut dyn AssociationVisitor,
    ) -> Result<WalkSummary> {
        let mut state = WalkState {
            visited: HashSet::new(),
            summary: WalkSummary::default(),
        };
        self.process_associations(operation, entity, parent, 0, visitor, &mut state)?;
        tracing::trace!(
            operation = %operation,
            root = entity.type_name(),
            securables = state.summary.securables,
            nodes = state.summary.nodes,
            "Association walk finished"
        );
        Ok(state.summary)
    }

    fn process_associations(
        &self,
        operation: Operation,
        entity: &dyn Entity,
        previous: Option<Acl>,
        depth: usize,
        visitor: &mut dyn AssociationVisitor,
        state: &mut WalkState,
    ) -> Result<()> {
        if !state.visited.insert(VisitKey::of(entity)) {
            state.summary.revisits += 1;
            return Ok(());
        }
        if self.hooks.can_skip_acl_check(entity) {
            return Ok(());
        }
        if let Some(max_depth) = self.max_depth {
            if depth > max_depth {
                return Err(AclError::DepthLimitExceeded { max_depth });
            }
        }

        let type_name = entity.type_name();
        let Some(properties) = self.cascade.associations(type_name) else {
            tracing::warn!(type_name, "No cascade metadata; associations not checked");
            return Ok(());
        };
        state.summary.nodes += 1;

        let parent = visitor.choose_parent(entity, previous)?;

        for property in &properties {
            let forced = self.hooks.force_association_follow(entity, property);
            if !forced
                && (self.hooks.can_skip_association_check(entity, property)
                    || !self.cascade.cascades(type_name, property, operation))
            {
                continue;
            }

            let values = match entity.association(property) {
                Association::Unloaded => {
                    match self.unloaded_policy {
                        UnloadedPolicy::AssumeAclPresent => {
                            tracing::trace!(
                                type_name,
                                property = %property,
                                "Association was unreachable during ACL association checking"
                            );
                            state.summary.unloaded += 1;
                            continue;
                        }
                        UnloadedPolicy::Fail => {
                            return Err(AclError::UnloadedAssociation {
                                type_name: type_name.to_string(),
                                property: property.clone(),
                            });
                        }
                    }
                }
                other => other.values(),
            };

            for value in values {
                if state.visited.contains(&VisitKey::of(value)) {
                    state.summary.revisits += 1;
                    continue;
                }
                if value.is_securable() {
                    visitor.visit_securable(value, parent.as_ref())?;
                    state.summary.securables += 1;
                }
                self.process_associations(
                    operation,
                    value,
                    parent.clone(),
                    depth + 1,
                    visitor,
                    state,
                )?;
            }
        }
        Ok(())
    }
}
