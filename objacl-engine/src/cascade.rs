//! Cascade policy: which associations an operation propagates through

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Kind of CRUD operation an ACL pass is attached to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Create,
    Update,
    Delete,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Create => write!(f, "create"),
            Self::Update => write!(f, "update"),
            Self::Delete => write!(f, "delete"),
        }
    }
}

/// Cascade declared on one association property
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CascadeStyle {
    /// Operations never cascade
    #[default]
    None,
    /// Create and update cascade
    SaveUpdate,
    /// Only delete cascades
    Delete,
    /// Every operation cascades
    All,
}

impl CascadeStyle {
    /// Whether `operation` propagates through an association with this style
    pub fn cascades(self, operation: Operation) -> bool {
        match (self, operation) {
            (Self::All, _) => true,
            (Self::SaveUpdate, Operation::Create | Operation::Update) => true,
            (Self::Delete, Operation::Delete) => true,
            _ => false,
        }
    }
}

/// Source of association metadata for the graph walker
///
/// Implementations describe the persistence model; the engine never
/// introspects entities beyond [`objacl_api::Entity::association`].
pub trait CascadePolicyProvider: Send + Sync {
    /// Association properties of `type_name`, or `None` if the type is unknown
    fn associations(&self, type_name: &str) -> Option<Vec<String>>;

    /// Whether `operation` cascades through `property` of `type_name`
    fn cascades(&self, type_name: &str, property: &str, operation: Operation) -> bool;
}

/// Declarative `(type, property) -> style` table
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CascadeTable {
    types: BTreeMap<String, BTreeMap<String, CascadeStyle>>,
}

impl CascadeTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a property (builder style)
    pub fn with(
        mut self,
        type_name: impl Into<String>,
        property: impl Into<String>,
        style: CascadeStyle,
    ) -> Self {
        self.insert(type_name, property, style);
        self
    }

    /// Declare a type with no associations
    pub fn with_type(mut self, type_name: impl Into<String>) -> Self {
        self.types.entry(type_name.into()).or_default();
        self
    }

    pub fn insert(
        &mut self,
        type_name: impl Into<String>,
        property: impl Into<String>,
        style: CascadeStyle,
    ) {
        self.types
            .entry(type_name.into())
            .or_default()
            .insert(property.into(), style);
    }

    /// Declared style, if any
    pub fn style(&self, type_name: &str, property: &str) -> Option<CascadeStyle> {
        self.types.get(type_name)?.get(property).copied()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

impl CascadePolicyProvider for CascadeTable {
    fn associations(&self, type_name: &str) -> Option<Vec<String>> {
        self.types
            .get(type_name)
            .map(|props| props.keys().cloned().collect())
    }

    fn cascades(&self, type_name: &str, property: &str, operation: Operation) -> bool {
        self.style(type_name, property)
            .map(|style| style.cascades(operation))
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_style_matrix() {
        assert!(CascadeStyle::All.cascades(Operation::Delete));
        assert!(CascadeStyle::SaveUpdate.cascades(Operation::Create));
        assert!(CascadeStyle::SaveUpdate.cascades(Operation::Update));
        assert!(!CascadeStyle::SaveUpdate.cascades(Operation::Delete));
        assert!(CascadeStyle::Delete.cascades(Operation::Delete));
        assert!(!CascadeStyle::Delete.cascades(Operation::Create));
        assert!(!CascadeStyle::None.cascades(Operation::Update));
    }

    #[test]
    fn test_table_lookup() {
        let table = CascadeTable::new()
            .with("Project", "samples", CascadeStyle::All)
            .with("Project", "owner", CascadeStyle::None)
            .with_type("Sample");

        assert_eq!(
            table.associations("Project"),
            Some(vec!["owner".to_string(), "samples".to_string()])
        );
        assert_eq!(table.associations("Sample"), Some(vec![]));
        assert_eq!(table.associations("Unknown"), None);
        assert!(table.cascades("Project", "samples", Operation::Update));
        assert!(!table.cascades("Project", "owner", Operation::Create));
        assert!(!table.cascades("Project", "missing", Operation::Create));
    }

    #[test]
    fn test_table_json_shape() {
        let table = CascadeTable::new().with("Project", "samples", CascadeStyle::SaveUpdate);
        let json = serde_json::to_string(&table).unwrap();
        assert_eq!(json, r#"{"Project":{"samples":"save_update"}}"#);
    }
}
