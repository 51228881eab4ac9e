//! Pre-configured engines for common setups
//!
//! Provides ready-to-use engines that applications can use directly or as
//! starting points for customization.

use std::path::PathBuf;
use std::sync::Arc;

use crate::audit::{AuditSink, FileAuditSink, MemoryAuditSink, NullAuditSink};
use crate::cascade::{CascadePolicyProvider, CascadeTable};
use crate::config::EngineSettings;
use crate::hooks::{DefaultHooks, PropagationHooks};
use crate::propagation::AclEngine;
use crate::sid::{NullRoleHierarchy, RoleHierarchy, SidResolver};
use crate::store::{AclStore, FileAclStore, MemoryAclStore};

/// Builder for [`AclEngine`]
pub struct AclEngineBuilder {
    store: Option<Arc<dyn AclStore>>,
    cascade: Option<Arc<dyn CascadePolicyProvider>>,
    hooks: Option<Arc<dyn PropagationHooks>>,
    audit: Option<Arc<dyn AuditSink>>,
    hierarchy: Option<Arc<dyn RoleHierarchy>>,
    settings: EngineSettings,
    app_name: Option<String>,
}

impl AclEngineBuilder {
    pub fn new() -> Self {
        Self {
            store: None,
            cascade: None,
            hooks: None,
            audit: None,
            hierarchy: None,
            settings: EngineSettings::default(),
            app_name: None,
        }
    }

    /// Application name (used for default paths)
    pub fn app_name(mut self, name: impl Into<String>) -> Self {
        self.app_name = Some(name.into());
        self
    }

    pub fn store(mut self, store: impl AclStore + 'static) -> Self {
        self.store = Some(Arc::new(store));
        self
    }

    /// Use a store that is also held elsewhere
    pub fn shared_store(mut self, store: Arc<dyn AclStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Cascade policy; defaults to the table in the settings
    pub fn cascade(mut self, cascade: impl CascadePolicyProvider + 'static) -> Self {
        self.cascade = Some(Arc::new(cascade));
        self
    }

    pub fn hooks(mut self, hooks: impl PropagationHooks + 'static) -> Self {
        self.hooks = Some(Arc::new(hooks));
        self
    }

    pub fn audit(mut self, audit: impl AuditSink + 'static) -> Self {
        self.audit = Some(Arc::new(audit));
        self
    }

    /// Audit sink that is also held elsewhere (e.g., a memory sink under test)
    pub fn shared_audit(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = Some(audit);
        self
    }

    pub fn role_hierarchy(mut self, hierarchy: impl RoleHierarchy + 'static) -> Self {
        self.hierarchy = Some(Arc::new(hierarchy));
        self
    }

    pub fn settings(mut self, settings: EngineSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Build the engine
    pub fn build(self) -> Result<AclEngine, PresetError> {
        self.settings
            .validate()
            .map_err(|e| PresetError::InvalidConfig(e.to_string()))?;
        let app_name = self.app_name.as_deref().unwrap_or("objacl");

        let store: Arc<dyn AclStore> = match self.store {
            Some(s) => s,
            None => {
                let store = FileAclStore::default_for_app(app_name)
                    .map_err(|e| PresetError::StoreInit(e.to_string()))?;
                Arc::new(store)
            }
        };

        let EngineSettings {
            authorities,
            unloaded_policy,
            max_depth,
            cascade,
        } = self.settings;

        let sids = SidResolver::new(
            self.hierarchy
                .unwrap_or_else(|| Arc::new(NullRoleHierarchy)),
            authorities,
        );

        Ok(AclEngine::from_parts(
            store,
            self.cascade.unwrap_or_else(|| Arc::new(cascade)),
            self.hooks.unwrap_or_else(|| Arc::new(DefaultHooks)),
            self.audit.unwrap_or_else(|| Arc::new(NullAuditSink)),
            sids,
            unloaded_policy,
            max_depth,
        ))
    }
}

impl Default for AclEngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl AclEngine {
    pub fn builder() -> AclEngineBuilder {
        AclEngineBuilder::new()
    }
}

/// Error type for preset initialization
#[derive(Debug, thiserror::Error)]
pub enum PresetError {
    #[error("Failed to initialize store: {0}")]
    StoreInit(String),

    #[error("Failed to initialize audit: {0}")]
    AuditInit(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

// ============================================================================
// Preset Configurations
// ============================================================================

/// Preset engines for common use cases
pub struct AclPresets;

impl AclPresets {
    /// Testing mode (in-memory, no persistence)
    ///
    /// - In-memory ACL store
    /// - Memory-based audit
    /// - Empty cascade table
    /// - Default hooks
    pub fn testing() -> AclEngine {
        Self::testing_with_audit().0
    }

    /// Testing mode, also returning the audit sink for inspection
    pub fn testing_with_audit() -> (AclEngine, Arc<MemoryAuditSink>) {
        let audit = Arc::new(MemoryAuditSink::new());
        let engine = AclEngine::from_parts(
            Arc::new(MemoryAclStore::new()),
            Arc::new(CascadeTable::new()),
            Arc::new(DefaultHooks),
            Arc::clone(&audit) as Arc<dyn AuditSink>,
            SidResolver::flat(Default::default()),
            Default::default(),
            None,
        );
        (engine, audit)
    }

    /// In-memory engine with a cascade table
    ///
    /// - In-memory ACL store
    /// - Memory-based audit
    /// - Default hooks and authorities
    pub fn in_memory(cascade: CascadeTable) -> AclEngine {
        AclEngine::from_parts(
            Arc::new(MemoryAclStore::new()),
            Arc::new(cascade),
            Arc::new(DefaultHooks),
            Arc::new(MemoryAuditSink::new()),
            SidResolver::flat(Default::default()),
            Default::default(),
            None,
        )
    }

    /// File-backed engine under the user's data directory
    ///
    /// - `<data_dir>/<app_name>/acls.json` ACL store
    /// - `<data_dir>/<app_name>/audit.jsonl` audit log
    /// - Default hooks and authorities
    pub fn file_backed(app_name: &str, cascade: CascadeTable) -> Result<AclEngine, PresetError> {
        let data_dir = dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from(".local/share"))
            .join(app_name);

        let store = FileAclStore::new(data_dir.join("acls.json"))
            .map_err(|e| PresetError::StoreInit(e.to_string()))?;

        let audit = FileAuditSink::new(data_dir.join("audit.jsonl"))
            .map_err(|e| PresetError::AuditInit(e.to_string()))?;

        AclEngineBuilder::new()
            .store(store)
            .audit(audit)
            .cascade(cascade)
            .build()
    }
}
