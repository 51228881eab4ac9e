//! Security identifiers

use serde::{Deserialize, Serialize};
use std::fmt;

/// Subject of an access control entry: a principal or a granted authority
///
/// Equality is by logical identity (the principal or authority name).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "name")]
pub enum Sid {
    /// A named user
    Principal(String),
    /// A role or group authority (e.g., `GROUP_ADMIN`)
    Authority(String),
}

impl Sid {
    /// Create a principal sid
    pub fn principal(name: impl Into<String>) -> Self {
        Self::Principal(name.into())
    }

    /// Create an authority sid
    pub fn authority(name: impl Into<String>) -> Self {
        Self::Authority(name.into())
    }

    /// Principal or authority name
    pub fn name(&self) -> &str {
        match self {
            Self::Principal(name) | Self::Authority(name) => name,
        }
    }

    /// Authority name, if this is an authority sid
    pub fn as_authority(&self) -> Option<&str> {
        match self {
            Self::Authority(name) => Some(name),
            Self::Principal(_) => None,
        }
    }

    /// Principal name, if this is a principal sid
    pub fn as_principal(&self) -> Option<&str> {
        match self {
            Self::Principal(name) => Some(name),
            Self::Authority(_) => None,
        }
    }
}

impl fmt::Display for Sid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Principal(name) => write!(f, "principal:{}", name),
            Self::Authority(name) => write!(f, "authority:{}", name),
        }
    }
}
