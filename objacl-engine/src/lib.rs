//! objacl-engine: object-level access control over entity graphs
//!
//! The engine keeps one ACL per securable domain object. After each of its
//! own create/update/delete operations the application hands the affected
//! object to [`AclEngine::apply_acl`]; the engine walks the object's
//! cascading associations and attaches, links, or prunes ACLs so that child
//! objects inherit from their owners. Read paths ask the
//! [`PermissionEvaluator`], the [`BulkPermissionChecker`], or the
//! [`ResultFilter`] whether a principal may see or change an object.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                              AclEngine                                   │
//! │  ┌─────────────┐ ┌─────────────┐ ┌─────────────┐ ┌─────────────────────┐│
//! │  │  AclStore   │ │   Cascade   │ │    Hooks    │ │       Audit         ││
//! │  │             │ │             │ │             │ │                     ││
//! │  │ - File      │ │ - Table     │ │ - Default   │ │ - File (JSONL)      ││
//! │  │ - Memory    │ │ - custom    │ │ - custom    │ │ - Memory            ││
//! │  │ - ReadOnly  │ │             │ │             │ │ - Null              ││
//! │  │ - Staged    │ │             │ │             │ │ - Composite         ││
//! │  └─────────────┘ └─────────────┘ └─────────────┘ └─────────────────────┘│
//! │         │                 ObjectGraphWalker                              │
//! │         ▼                                                                │
//! │  PermissionEvaluator ◄── BulkPermissionChecker ◄── ResultFilter          │
//! │         ▲                                                                │
//! │     SidResolver (authorities + role hierarchy)                           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use objacl_engine::{AclEngine, AclTarget, CascadeStyle, CascadeTable, Operation};
//! use objacl_engine::objacl_api::{Permission, Principal};
//!
//! let cascade = CascadeTable::new().with("Project", "samples", CascadeStyle::All);
//! let engine = AclEngine::builder()
//!     .app_name("myapp")
//!     .cascade(cascade)
//!     .build()?;
//!
//! let alice = Principal::new("alice");
//! engine.apply_acl(Operation::Create, AclTarget::one(&project), &alice)?;
//!
//! assert!(engine.evaluator().has_permission(&project, &[Permission::READ], &alice)?);
//! ```

pub mod audit;
pub mod bulk;
pub mod cascade;
pub mod config;
pub mod error;
pub mod evaluator;
pub mod filter;
pub mod hooks;
pub mod presets;
pub mod propagation;
pub mod sharing;
pub mod sid;
pub mod staged;
pub mod store;
pub mod tracing_support;
pub mod walker;

pub use objacl_api;

pub use audit::{
    AclAuditDetails, AclAuditEvent, AclAuditEventType, AuditError, AuditSink,
    CompositeAuditSink, FileAuditSink, MemoryAuditSink, NullAuditSink,
};
pub use bulk::BulkPermissionChecker;
pub use cascade::{CascadePolicyProvider, CascadeStyle, CascadeTable, Operation};
pub use config::{AuthorityConfig, ConfigError, EngineSettings, UnloadedPolicy};
pub use error::{AclError, Result};
pub use evaluator::{nearest_secured_owner, AclArena, PermissionEvaluator};
pub use filter::{Annotated, ResultFilter, SecurityAnnotation};
pub use hooks::{DefaultHooks, PropagationHooks};
pub use presets::{AclEngineBuilder, AclPresets, PresetError};
pub use propagation::{AclEngine, AclTarget};
pub use sid::{HierarchyError, NullRoleHierarchy, RoleHierarchy, RoleHierarchyMap, SidResolver};
pub use staged::StagedAclStore;
pub use store::{AclStore, FileAclStore, MemoryAclStore, ReadOnlyAclStore, StoreError};
pub use walker::{AssociationVisitor, ObjectGraphWalker, WalkSummary};
