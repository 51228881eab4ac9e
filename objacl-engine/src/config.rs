//! Engine configuration
//!
//! Settings are plain serde structs so they can be kept in a JSON file next to
//! the rest of an application's configuration:
//!
//! ```json
//! {
//!   "authorities": { "admin": "GROUP_ADMIN" },
//!   "unloaded_policy": "fail",
//!   "max_depth": 32,
//!   "cascade": { "Project": { "samples": "all" } }
//! }
//! ```

use objacl_api::{authority, Principal, Sid};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use thiserror::Error;

use crate::cascade::CascadeTable;

/// Error type for configuration loading
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read configuration: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse configuration: {0}")]
    ParseError(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Names of the well-known authorities the engine grants to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthorityConfig {
    /// Administers every object
    pub admin: String,
    /// Reads every object
    pub agent: String,
    /// Held by unauthenticated callers; a READ grant to it makes an object public
    pub anonymous: String,
    /// Temporary elevation used when creating users on someone's behalf
    pub run_as_admin: String,
    /// Prefix identifying group authorities
    pub group_prefix: String,
    /// Principal name of unauthenticated callers
    pub anonymous_user: String,
}

impl Default for AuthorityConfig {
    fn default() -> Self {
        Self {
            admin: authority::ADMIN_GROUP.to_string(),
            agent: authority::AGENT_GROUP.to_string(),
            anonymous: authority::ANONYMOUS.to_string(),
            run_as_admin: authority::RUN_AS_ADMIN.to_string(),
            group_prefix: authority::GROUP_PREFIX.to_string(),
            anonymous_user: authority::ANONYMOUS_USER.to_string(),
        }
    }
}

impl AuthorityConfig {
    pub fn admin_sid(&self) -> Sid {
        Sid::authority(self.admin.clone())
    }

    pub fn agent_sid(&self) -> Sid {
        Sid::authority(self.agent.clone())
    }

    pub fn anonymous_sid(&self) -> Sid {
        Sid::authority(self.anonymous.clone())
    }

    /// Whether the principal directly holds the admin authority
    ///
    /// Anonymous callers are never administrators.
    pub fn is_admin(&self, principal: &Principal) -> bool {
        !self.is_anonymous(principal) && principal.has_authority(&self.admin)
    }

    pub fn is_anonymous(&self, principal: &Principal) -> bool {
        principal.is_anonymous_token() || principal.name() == self.anonymous_user
    }

    pub fn is_running_as_admin(&self, principal: &Principal) -> bool {
        principal.has_authority(&self.run_as_admin)
    }

    /// Whether `name` is a group other than the admin and agent groups
    pub fn is_sharing_group(&self, name: &str) -> bool {
        name.starts_with(&self.group_prefix) && name != self.admin && name != self.agent
    }
}

/// What the graph walk does with an association it cannot inspect
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnloadedPolicy {
    /// Treat unloaded values as pre-existing objects that already have ACLs
    #[default]
    AssumeAclPresent,
    /// Abort with `AclError::UnloadedAssociation`
    Fail,
}

/// Complete engine settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    pub authorities: AuthorityConfig,
    pub unloaded_policy: UnloadedPolicy,
    /// Maximum association depth for one graph walk; unbounded when `None`
    pub max_depth: Option<usize>,
    /// Declarative cascade table
    pub cascade: CascadeTable,
}

impl EngineSettings {
    /// Parse settings from a JSON string
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let settings: Self = serde_json::from_str(json)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Load settings from a JSON file
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let file = File::open(path.as_ref())?;
        let settings: Self = serde_json::from_reader(BufReader::new(file))?;
        settings.validate()?;
        Ok(settings)
    }

    /// Reject settings the engine cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_depth == Some(0) {
            return Err(ConfigError::Invalid("max_depth must be at least 1".into()));
        }
        let names = [
            &self.authorities.admin,
            &self.authorities.agent,
            &self.authorities.anonymous,
        ];
        if names.iter().any(|n| n.is_empty()) {
            return Err(ConfigError::Invalid(
                "authority names must not be empty".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cascade::{CascadePolicyProvider, CascadeStyle, Operation};

    #[test]
    fn test_default_authorities() {
        let config = AuthorityConfig::default();
        assert_eq!(config.admin, "GROUP_ADMIN");
        assert_eq!(config.anonymous_sid(), Sid::authority("IS_AUTHENTICATED_ANONYMOUSLY"));
    }

    #[test]
    fn test_principal_roles() {
        let config = AuthorityConfig::default();
        let admin = Principal::new("root").with_authority("GROUP_ADMIN");
        let user = Principal::new("alice").with_authority("GROUP_USER");
        let runner = Principal::new("svc").with_authority("GROUP_RUN_AS_ADMIN");

        assert!(config.is_admin(&admin));
        assert!(!config.is_admin(&user));
        assert!(config.is_anonymous(&Principal::anonymous()));
        assert!(config.is_anonymous(&Principal::new("anonymousUser")));
        assert!(!config.is_anonymous(&user));
        assert!(config.is_running_as_admin(&runner));
    }

    #[test]
    fn test_anonymous_never_admin() {
        let config = AuthorityConfig::default();
        let odd = Principal::anonymous().with_authority("GROUP_ADMIN");
        assert!(!config.is_admin(&odd));
    }

    #[test]
    fn test_sharing_group() {
        let config = AuthorityConfig::default();
        assert!(config.is_sharing_group("GROUP_LAB"));
        assert!(!config.is_sharing_group("GROUP_ADMIN"));
        assert!(!config.is_sharing_group("GROUP_AGENT"));
        assert!(!config.is_sharing_group("IS_AUTHENTICATED_ANONYMOUSLY"));
    }

    #[test]
    fn test_settings_from_json() {
        let json = r#"{
            "unloaded_policy": "fail",
            "max_depth": 16,
            "cascade": { "Project": { "samples": "all", "notes": "none" } }
        }"#;
        let settings = EngineSettings::from_json_str(json).unwrap();
        assert_eq!(settings.unloaded_policy, UnloadedPolicy::Fail);
        assert_eq!(settings.max_depth, Some(16));
        assert_eq!(settings.authorities, AuthorityConfig::default());
        assert_eq!(
            settings.cascade.style("Project", "samples"),
            Some(CascadeStyle::All)
        );
        assert!(settings.cascade.cascades("Project", "samples", Operation::Create));
        assert!(!settings.cascade.cascades("Project", "notes", Operation::Create));
    }

    #[test]
    fn test_settings_reject_zero_depth() {
        let result = EngineSettings::from_json_str(r#"{ "max_depth": 0 }"#);
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_settings_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("acl.json");
        std::fs::write(&path, r#"{ "authorities": { "agent": "GROUP_BOT" } }"#).unwrap();

        let settings = EngineSettings::from_json_file(&path).unwrap();
        assert_eq!(settings.authorities.agent, "GROUP_BOT");
        assert_eq!(settings.authorities.admin, "GROUP_ADMIN");
        assert_eq!(settings.unloaded_policy, UnloadedPolicy::AssumeAclPresent);
    }
}
