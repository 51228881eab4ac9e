//! Permission masks

use serde::{Deserialize, Serialize};
use std::fmt;

/// A single permission, identified by its bit mask
///
/// Permissions match by exact mask equality; holding ADMINISTRATION does not
/// imply READ.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Permission(u32);

impl Permission {
    pub const READ: Self = Self(1);
    pub const WRITE: Self = Self(1 << 1);
    pub const CREATE: Self = Self(1 << 2);
    pub const DELETE: Self = Self(1 << 3);
    pub const ADMINISTRATION: Self = Self(1 << 4);

    /// Build a permission from a raw mask
    pub const fn from_mask(mask: u32) -> Self {
        Self(mask)
    }

    /// Raw mask
    pub const fn mask(self) -> u32 {
        self.0
    }

    /// Name of a built-in permission
    pub fn name(self) -> Option<&'static str> {
        match self {
            Self::READ => Some("READ"),
            Self::WRITE => Some("WRITE"),
            Self::CREATE => Some("CREATE"),
            Self::DELETE => Some("DELETE"),
            Self::ADMINISTRATION => Some("ADMINISTRATION"),
            _ => None,
        }
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => f.write_str(name),
            None => write!(f, "MASK({:#x})", self.0),
        }
    }
}
