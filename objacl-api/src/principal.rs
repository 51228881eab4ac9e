//! Authenticated principals

use serde::{Deserialize, Serialize};

use crate::{authority, Sid};

/// The caller on whose behalf an engine operation runs
///
/// Passed explicitly to every engine call; there is no ambient security
/// context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    name: String,
    #[serde(default)]
    authorities: Vec<String>,
    #[serde(default)]
    anonymous: bool,
}

impl Principal {
    /// Authenticated principal without any authorities
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            authorities: Vec::new(),
            anonymous: false,
        }
    }

    /// Unauthenticated caller
    pub fn anonymous() -> Self {
        Self {
            name: authority::ANONYMOUS_USER.to_string(),
            authorities: vec![authority::ANONYMOUS.to_string()],
            anonymous: true,
        }
    }

    /// Add a granted authority
    pub fn with_authority(mut self, authority: impl Into<String>) -> Self {
        self.authorities.push(authority.into());
        self
    }

    /// Add several granted authorities
    pub fn with_authorities<I, S>(mut self, authorities: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.authorities
            .extend(authorities.into_iter().map(Into::into));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Directly granted authorities (before hierarchy expansion)
    pub fn authorities(&self) -> &[String] {
        &self.authorities
    }

    pub fn has_authority(&self, authority: &str) -> bool {
        self.authorities.iter().any(|a| a == authority)
    }

    /// Whether the principal authenticated anonymously
    pub fn is_anonymous_token(&self) -> bool {
        self.anonymous
    }

    /// Principal sid for this caller
    pub fn sid(&self) -> Sid {
        Sid::principal(self.name.clone())
    }
}
