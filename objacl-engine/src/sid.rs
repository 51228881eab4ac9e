//! Sid resolution and authority hierarchies

use objacl_api::{Principal, Sid};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use thiserror::Error;

use crate::config::AuthorityConfig;

/// Error type for role hierarchy definitions
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HierarchyError {
    #[error("Invalid role hierarchy line {line}: '{content}'")]
    Syntax { line: usize, content: String },

    #[error("Role hierarchy contains a cycle through '{0}'")]
    Cycle(String),
}

/// Expansion of granted authorities into every authority they imply
pub trait RoleHierarchy: Send + Sync {
    /// Input authorities followed by every authority reachable from them,
    /// without duplicates
    fn reachable_authorities(&self, authorities: &[String]) -> Vec<String>;
}

/// Hierarchy where no authority implies another
#[derive(Debug, Default, Clone, Copy)]
pub struct NullRoleHierarchy;

impl RoleHierarchy for NullRoleHierarchy {
    fn reachable_authorities(&self, authorities: &[String]) -> Vec<String> {
        let mut seen = BTreeSet::new();
        authorities
            .iter()
            .filter(|a| seen.insert(a.as_str()))
            .cloned()
            .collect()
    }
}

/// Hierarchy parsed from `HIGHER > LOWER` declarations, one per line
///
/// ```text
/// GROUP_ADMIN > GROUP_USER
/// GROUP_USER > GROUP_GUEST
/// ```
#[derive(Debug, Clone, Default)]
pub struct RoleHierarchyMap {
    reachable: BTreeMap<String, Vec<String>>,
}

impl RoleHierarchyMap {
    /// Parse a hierarchy definition; blank lines and `#` comments are ignored
    pub fn parse(definition: &str) -> Result<Self, HierarchyError> {
        let mut direct: BTreeMap<String, Vec<String>> = BTreeMap::new();

        for (index, raw) in definition.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let parts: Vec<&str> = line.split('>').map(str::trim).collect();
            if parts.len() < 2 || parts.iter().any(|p| p.is_empty()) {
                return Err(HierarchyError::Syntax {
                    line: index + 1,
                    content: raw.to_string(),
                });
            }
            // `A > B > C` declares A > B and B > C
            for pair in parts.windows(2) {
                let lower = direct.entry(pair[0].to_string()).or_default();
                if !lower.iter().any(|l| l == pair[1]) {
                    lower.push(pair[1].to_string());
                }
            }
        }

        let mut reachable = BTreeMap::new();
        for role in direct.keys() {
            let mut found = Vec::new();
            let mut stack: Vec<&str> = direct[role].iter().map(String::as_str).collect();
            while let Some(next) = stack.pop() {
                if next == role {
                    return Err(HierarchyError::Cycle(role.clone()));
                }
                if found.iter().any(|f: &String| f == next) {
                    continue;
                }
                found.push(next.to_string());
                if let Some(lower) = direct.get(next) {
                    stack.extend(lower.iter().map(String::as_str));
                }
            }
            reachable.insert(role.clone(), found);
        }

        tracing::debug!(roles = reachable.len(), "Parsed role hierarchy");
        Ok(Self { reachable })
    }
}

impl RoleHierarchy for RoleHierarchyMap {
    fn reachable_authorities(&self, authorities: &[String]) -> Vec<String> {
        let mut seen = BTreeSet::new();
        let mut result = Vec::new();
        for authority in authorities {
            if seen.insert(authority.clone()) {
                result.push(authority.clone());
            }
        }
        for authority in authorities {
            for implied in self.reachable.get(authority).into_iter().flatten() {
                if seen.insert(implied.clone()) {
                    result.push(implied.clone());
                }
            }
        }
        result
    }
}

/// Maps a principal to the sids its ACEs may be granted to
#[derive(Clone)]
pub struct SidResolver {
    hierarchy: Arc<dyn RoleHierarchy>,
    authorities: AuthorityConfig,
}

impl SidResolver {
    pub fn new(hierarchy: Arc<dyn RoleHierarchy>, authorities: AuthorityConfig) -> Self {
        Self {
            hierarchy,
            authorities,
        }
    }

    /// Resolver without any authority hierarchy
    pub fn flat(authorities: AuthorityConfig) -> Self {
        Self::new(Arc::new(NullRoleHierarchy), authorities)
    }

    pub fn authorities(&self) -> &AuthorityConfig {
        &self.authorities
    }

    /// Principal sid first, then every reachable authority sid
    pub fn resolve_sids(&self, principal: &Principal) -> Vec<Sid> {
        let reachable = self
            .hierarchy
            .reachable_authorities(principal.authorities());
        let mut sids = Vec::with_capacity(reachable.len() + 1);
        sids.push(principal.sid());
        sids.extend(reachable.into_iter().map(Sid::authority));
        sids
    }

    /// Administrator, directly or through the hierarchy
    pub fn is_admin(&self, principal: &Principal) -> bool {
        if self.authorities.is_anonymous(principal) {
            return false;
        }
        self.authorities.is_admin(principal)
            || self
                .hierarchy
                .reachable_authorities(principal.authorities())
                .iter()
                .any(|a| *a == self.authorities.admin)
    }

    pub fn is_anonymous(&self, principal: &Principal) -> bool {
        self.authorities.is_anonymous(principal)
    }

    pub fn is_running_as_admin(&self, principal: &Principal) -> bool {
        self.authorities.is_running_as_admin(principal)
    }
}

impl std::fmt::Debug for SidResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SidResolver")
            .field("authorities", &self.authorities)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_null_hierarchy_dedups() {
        let result = NullRoleHierarchy.reachable_authorities(&strings(&["A", "B", "A"]));
        assert_eq!(result, strings(&["A", "B"]));
    }

    #[test]
    fn test_hierarchy_is_transitive() {
        let map = RoleHierarchyMap::parse(
            "# roles\nGROUP_ADMIN > GROUP_USER\n\nGROUP_USER > GROUP_GUEST\n",
        )
        .unwrap();
        let result = map.reachable_authorities(&strings(&["GROUP_ADMIN"]));
        assert_eq!(result[0], "GROUP_ADMIN");
        assert!(result.contains(&"GROUP_USER".to_string()));
        assert!(result.contains(&"GROUP_GUEST".to_string()));
        assert_eq!(result.len(), 3);
    }

    #[test]
    fn test_chained_declaration() {
        let map = RoleHierarchyMap::parse("A > B > C").unwrap();
        let result = map.reachable_authorities(&strings(&["B"]));
        assert_eq!(result, strings(&["B", "C"]));
    }

    #[test]
    fn test_cycle_rejected() {
        let result = RoleHierarchyMap::parse("A > B\nB > C\nC > A");
        assert!(matches!(result, Err(HierarchyError::Cycle(_))));
    }

    #[test]
    fn test_syntax_error() {
        let result = RoleHierarchyMap::parse("A > B\nnonsense\n");
        assert_eq!(
            result.unwrap_err(),
            HierarchyError::Syntax {
                line: 2,
                content: "nonsense".into()
            }
        );
    }

    #[test]
    fn test_resolve_sids_principal_first() {
        let map = RoleHierarchyMap::parse("GROUP_LEAD > GROUP_LAB").unwrap();
        let resolver = SidResolver::new(Arc::new(map), AuthorityConfig::default());
        let principal = Principal::new("alice").with_authority("GROUP_LEAD");

        let sids = resolver.resolve_sids(&principal);
        assert_eq!(
            sids,
            vec![
                Sid::principal("alice"),
                Sid::authority("GROUP_LEAD"),
                Sid::authority("GROUP_LAB"),
            ]
        );
    }

    #[test]
    fn test_admin_through_hierarchy() {
        let map = RoleHierarchyMap::parse("GROUP_ROOT > GROUP_ADMIN").unwrap();
        let resolver = SidResolver::new(Arc::new(map), AuthorityConfig::default());
        assert!(resolver.is_admin(&Principal::new("ops").with_authority("GROUP_ROOT")));
        assert!(!resolver.is_admin(&Principal::new("alice")));
        assert!(!resolver.is_admin(&Principal::anonymous().with_authority("GROUP_ROOT")));
    }
}
