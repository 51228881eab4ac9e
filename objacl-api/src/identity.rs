//! Object identities

use serde::{Deserialize, Serialize};
use std::fmt;

/// `(type, id)` pair uniquely naming one securable entity instance
///
/// Identities are immutable values; two identities are equal when both the
/// type name and the identifier match.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectIdentity {
    type_name: String,
    id: u64,
}

impl ObjectIdentity {
    /// Create an identity for an entity of `type_name` persisted under `id`
    pub fn new(type_name: impl Into<String>, id: u64) -> Self {
        Self {
            type_name: type_name.into(),
            id,
        }
    }

    /// Entity type name
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Persisted identifier
    pub fn id(&self) -> u64 {
        self.id
    }
}

impl fmt::Display for ObjectIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.type_name, self.id)
    }
}
