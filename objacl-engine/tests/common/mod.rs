//! Shared fixtures for integration tests
//!
//! Entities are leaked so association graphs can hold plain `'static`
//! references, cycles included.

#![allow(dead_code)]

use objacl_engine::objacl_api::{Association, Entity, InheritanceMode, Principal};
use objacl_engine::{CascadeStyle, CascadeTable, PropagationHooks};
use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet};

pub struct Node {
    type_name: &'static str,
    id: Cell<Option<u64>>,
    mode: Option<InheritanceMode>,
    owner: Cell<Option<&'static Node>>,
    associations: RefCell<Vec<(&'static str, &'static Node)>>,
    unloaded: RefCell<HashSet<&'static str>>,
}

impl Node {
    fn leak(type_name: &'static str, id: Option<u64>, mode: Option<InheritanceMode>) -> &'static Node {
        Box::leak(Box::new(Node {
            type_name,
            id: Cell::new(id),
            mode,
            owner: Cell::new(None),
            associations: RefCell::new(Vec::new()),
            unloaded: RefCell::new(HashSet::new()),
        }))
    }

    pub fn project(id: u64) -> &'static Node {
        Self::leak("Project", Some(id), Some(InheritanceMode::OwnsAces))
    }

    pub fn sample(id: u64) -> &'static Node {
        Self::leak("Sample", Some(id), Some(InheritanceMode::InheritsAlways))
    }

    pub fn characteristic(id: u64) -> &'static Node {
        Self::leak("Characteristic", Some(id), Some(InheritanceMode::InheritsAlways))
    }

    pub fn protocol(id: u64) -> &'static Node {
        Self::leak("Protocol", Some(id), Some(InheritanceMode::NeverInherits))
    }

    /// Non-securable holder between securables
    pub fn summary(id: u64) -> &'static Node {
        Self::leak("Summary", Some(id), None)
    }

    pub fn unsaved_project() -> &'static Node {
        Self::leak("Project", None, Some(InheritanceMode::OwnsAces))
    }

    pub fn user(id: u64) -> &'static Node {
        Self::leak("User", Some(id), Some(InheritanceMode::OwnsAces))
    }

    pub fn group(id: u64) -> &'static Node {
        Self::leak("UserGroup", Some(id), Some(InheritanceMode::OwnsAces))
    }

    /// Attach `child` under `property` and make this node its security owner
    pub fn own(&'static self, property: &'static str, child: &'static Node) -> &'static Node {
        child.owner.set(Some(self));
        self.link(property, child)
    }

    /// Attach `target` under `property` without ownership
    pub fn link(&'static self, property: &'static str, target: &'static Node) -> &'static Node {
        self.associations.borrow_mut().push((property, target));
        self
    }

    pub fn set_owner(&self, owner: &'static Node) {
        self.owner.set(Some(owner));
    }

    pub fn set_id(&self, id: u64) {
        self.id.set(Some(id));
    }

    pub fn mark_unloaded(&self, property: &'static str) {
        self.unloaded.borrow_mut().insert(property);
    }
}

impl Entity for Node {
    fn type_name(&self) -> &str {
        self.type_name
    }

    fn id(&self) -> Option<u64> {
        self.id.get()
    }

    fn inheritance(&self) -> Option<InheritanceMode> {
        self.mode
    }

    fn security_owner(&self) -> Option<&dyn Entity> {
        self.owner.get().map(|n| n as &dyn Entity)
    }

    fn association(&self, property: &str) -> Association<'_> {
        if self.unloaded.borrow().contains(property) {
            return Association::Unloaded;
        }
        let values: Vec<&dyn Entity> = self
            .associations
            .borrow()
            .iter()
            .filter(|(name, _)| *name == property)
            .map(|(_, node)| *node as &dyn Entity)
            .collect();
        match values.len() {
            0 => Association::Absent,
            1 => Association::One(values[0]),
            _ => Association::Many(values),
        }
    }
}

/// Recognises users and groups by identifier
#[derive(Default)]
pub struct DirectoryHooks {
    users: HashMap<u64, String>,
    groups: HashMap<u64, String>,
}

impl DirectoryHooks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn user(mut self, id: u64, name: &str) -> Self {
        self.users.insert(id, name.to_string());
        self
    }

    pub fn group(mut self, id: u64, name: &str) -> Self {
        self.groups.insert(id, name.to_string());
        self
    }
}

impl PropagationHooks for DirectoryHooks {
    fn user_name(&self, entity: &dyn Entity) -> Option<String> {
        if entity.type_name() != "User" {
            return None;
        }
        self.users.get(&entity.id()?).cloned()
    }

    fn group_authority(&self, entity: &dyn Entity) -> Option<String> {
        if entity.type_name() != "UserGroup" {
            return None;
        }
        self.groups
            .get(&entity.id()?)
            .map(|name| format!("GROUP_{}", name.to_uppercase()))
    }
}

pub fn cascade() -> CascadeTable {
    CascadeTable::new()
        .with("Project", "samples", CascadeStyle::All)
        .with("Project", "summary", CascadeStyle::All)
        .with("Project", "related", CascadeStyle::None)
        .with("Summary", "items", CascadeStyle::All)
        .with("Sample", "characteristics", CascadeStyle::All)
        .with("Sample", "protocol", CascadeStyle::SaveUpdate)
        .with_type("Characteristic")
        .with_type("Protocol")
        .with_type("User")
        .with_type("UserGroup")
}

pub fn alice() -> Principal {
    Principal::new("alice")
}

pub fn bob() -> Principal {
    Principal::new("bob")
}

pub fn admin() -> Principal {
    Principal::new("root").with_authority("GROUP_ADMIN")
}
