//! Securable domain entities
//!
//! Domain objects take part in access control by implementing [`Entity`].
//! An entity that reports an [`InheritanceMode`] is *securable*: it gets an
//! ACL of its own. Other entities are still traversed when they sit between
//! securables in the association graph.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::ObjectIdentity;

/// How a securable entity relates to the ACLs of its ancestors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InheritanceMode {
    /// Owns its ACEs; may inherit from a parent when one is established
    OwnsAces,
    /// Never holds meaningful ACEs of its own; resolves through its security owner
    InheritsAlways,
    /// Never inherits, whatever the association structure
    NeverInherits,
}

impl InheritanceMode {
    /// Whether entities of this mode are secured children
    pub fn is_child(self) -> bool {
        matches!(self, Self::InheritsAlways)
    }

    /// Whether entities of this mode may be linked to a parent ACL
    pub fn may_inherit(self) -> bool {
        !matches!(self, Self::NeverInherits)
    }
}

impl fmt::Display for InheritanceMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OwnsAces => write!(f, "owns-aces"),
            Self::InheritsAlways => write!(f, "inherits-always"),
            Self::NeverInherits => write!(f, "never-inherits"),
        }
    }
}

/// Value of one association property
pub enum Association<'a> {
    /// Not loaded; the value cannot be inspected without another fetch
    Unloaded,
    /// No value (null reference or missing property)
    Absent,
    /// Single reference
    One(&'a dyn Entity),
    /// Collection of references
    Many(Vec<&'a dyn Entity>),
}

impl<'a> Association<'a> {
    /// Whether the value could not be inspected
    pub fn is_unloaded(&self) -> bool {
        matches!(self, Self::Unloaded)
    }

    /// Loaded values, in order (empty for `Unloaded` and `Absent`)
    pub fn values(&self) -> Vec<&'a dyn Entity> {
        match self {
            Self::Unloaded | Self::Absent => Vec::new(),
            Self::One(entity) => vec![*entity],
            Self::Many(entities) => entities.clone(),
        }
    }
}

impl fmt::Debug for Association<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unloaded => write!(f, "Unloaded"),
            Self::Absent => write!(f, "Absent"),
            Self::One(entity) => write!(f, "One({})", entity.type_name()),
            Self::Many(entities) => write!(f, "Many(len={})", entities.len()),
        }
    }
}

/// A domain object as seen by the access-control engine
///
/// Value objects that stand in for an entity (same type name and id) may
/// implement this trait as well; evaluation only needs the identity.
pub trait Entity {
    /// Type name used in object identities and cascade lookups
    fn type_name(&self) -> &str;

    /// Persisted identifier; `None` until the entity has been saved
    fn id(&self) -> Option<u64>;

    /// Inheritance contract; `None` means the entity is not securable
    fn inheritance(&self) -> Option<InheritanceMode> {
        None
    }

    /// Entity whose ACL this one inherits from (for secured children)
    fn security_owner(&self) -> Option<&dyn Entity> {
        None
    }

    /// Current value of the association property `property`
    fn association(&self, _property: &str) -> Association<'_> {
        Association::Absent
    }

    /// Object identity, available once the entity is persisted
    fn identity(&self) -> Option<ObjectIdentity> {
        self.id()
            .map(|id| ObjectIdentity::new(self.type_name(), id))
    }

    /// Whether the entity takes part in access control
    fn is_securable(&self) -> bool {
        self.inheritance().is_some()
    }
}

impl<T: Entity + ?Sized> Entity for &T {
    fn type_name(&self) -> &str {
        (**self).type_name()
    }

    fn id(&self) -> Option<u64> {
        (**self).id()
    }

    fn inheritance(&self) -> Option<InheritanceMode> {
        (**self).inheritance()
    }

    fn security_owner(&self) -> Option<&dyn Entity> {
        (**self).security_owner()
    }

    fn association(&self, property: &str) -> Association<'_> {
        (**self).association(property)
    }

    fn identity(&self) -> Option<ObjectIdentity> {
        (**self).identity()
    }

    fn is_securable(&self) -> bool {
        (**self).is_securable()
    }
}

/// Address of an entity, for identity-less visited sets
pub fn entity_addr(entity: &dyn Entity) -> usize {
    entity as *const dyn Entity as *const () as usize
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Note {
        id: Option<u64>,
    }

    impl Entity for Note {
        fn type_name(&self) -> &str {
            "Note"
        }

        fn id(&self) -> Option<u64> {
            self.id
        }
    }

    struct Folder {
        id: u64,
        notes: Vec<Note>,
    }

    impl Entity for Folder {
        fn type_name(&self) -> &str {
            "Folder"
        }

        fn id(&self) -> Option<u64> {
            Some(self.id)
        }

        fn inheritance(&self) -> Option<InheritanceMode> {
            Some(InheritanceMode::OwnsAces)
        }

        fn association(&self, property: &str) -> Association<'_> {
            match property {
                "notes" => Association::Many(self.notes.iter().map(|n| n as &dyn Entity).collect()),
                "archive" => Association::Unloaded,
                _ => Association::Absent,
            }
        }
    }

    #[test]
    fn test_identity_requires_id() {
        assert_eq!(Note { id: None }.identity(), None);
        assert_eq!(
            Note { id: Some(3) }.identity(),
            Some(ObjectIdentity::new("Note", 3))
        );
    }

    #[test]
    fn test_securable_follows_inheritance() {
        let folder = Folder { id: 1, notes: vec![] };
        assert!(folder.is_securable());
        assert!(!Note { id: Some(1) }.is_securable());
    }

    #[test]
    fn test_association_values() {
        let folder = Folder {
            id: 1,
            notes: vec![Note { id: Some(1) }, Note { id: Some(2) }],
        };
        assert_eq!(folder.association("notes").values().len(), 2);
        assert!(folder.association("archive").is_unloaded());
        assert!(folder.association("missing").values().is_empty());
    }

    #[test]
    fn test_inheritance_mode_helpers() {
        assert!(InheritanceMode::InheritsAlways.is_child());
        assert!(!InheritanceMode::OwnsAces.is_child());
        assert!(!InheritanceMode::NeverInherits.may_inherit());
        assert!(InheritanceMode::OwnsAces.may_inherit());
    }
}
