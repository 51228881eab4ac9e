//! Audit trail for ACL changes
//!
//! Sinks receive one event per ACL mutation the engine performs. Failures to
//! record are logged and never abort propagation.

use chrono::{SecondsFormat, Utc};
use objacl_api::{Acl, ObjectIdentity, Principal};
use serde::Serialize;
use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError, RwLock};
use thiserror::Error;

/// RFC 3339 timestamp string
pub type Timestamp = String;

fn now_rfc3339() -> Timestamp {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// One recorded ACL change
#[derive(Debug, Clone, Serialize)]
pub struct AclAuditEvent {
    pub timestamp: Timestamp,
    pub event_type: AclAuditEventType,
    /// Object whose ACL changed
    pub identity: String,
    /// Principal on whose behalf the change ran
    pub principal: String,
    pub details: AclAuditDetails,
}

impl AclAuditEvent {
    pub fn new(
        event_type: AclAuditEventType,
        identity: &ObjectIdentity,
        principal: &Principal,
        details: AclAuditDetails,
    ) -> Self {
        Self {
            timestamp: now_rfc3339(),
            event_type,
            identity: identity.to_string(),
            principal: principal.name().to_string(),
            details,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AclAuditEventType {
    AclCreated,
    AclUpdated,
    AclDeleted,
    ParentLinked,
    AcesPruned,
    /// Child and parent disagree on their ACEs and could not be reconciled
    InconsistencyDetected,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum AclAuditDetails {
    /// State of the ACL after the change
    Entries {
        entry_count: usize,
        fingerprint: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        owner: Option<String>,
    },
    Parent { parent: String },
    Pruned { removed: usize, parent: String },
    Mismatch {
        parent: String,
        child_fingerprint: String,
        parent_fingerprint: String,
    },
    Deleted { cascade: bool },
}

#[derive(Debug, Error)]
pub enum AuditError {
    #[error("Failed to write audit log: {0}")]
    WriteError(#[from] std::io::Error),

    #[error("Failed to serialize audit event: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Audit sink not available: {0}")]
    Unavailable(String),
}

/// Destination for audit events
pub trait AuditSink: Send + Sync {
    fn record(&self, event: AclAuditEvent) -> Result<(), AuditError>;

    fn flush(&self) -> Result<(), AuditError>;

    fn is_healthy(&self) -> bool {
        true
    }
}

// ============================================================================
// Default Implementations
// ============================================================================

/// Audit sink writing JSON Lines to a file
pub struct FileAuditSink {
    path: PathBuf,
    writer: Mutex<BufWriter<File>>,
}

impl FileAuditSink {
    pub fn new(path: impl AsRef<Path>) -> Result<Self, AuditError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            path,
            writer: Mutex::new(BufWriter::new(file)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl AuditSink for FileAuditSink {
    fn record(&self, event: AclAuditEvent) -> Result<(), AuditError> {
        let json = serde_json::to_string(&event)?;
        let mut writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        writeln!(writer, "{}", json)?;
        Ok(())
    }

    fn flush(&self) -> Result<(), AuditError> {
        let mut writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        writer.flush()?;
        Ok(())
    }

    fn is_healthy(&self) -> bool {
        self.path.parent().map(|p| p.exists()).unwrap_or(true)
    }
}

impl fmt::Debug for FileAuditSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileAuditSink")
            .field("path", &self.path)
            .finish()
    }
}

/// Bounded in-memory sink (oldest events evicted first)
pub struct MemoryAuditSink {
    events: RwLock<Vec<AclAuditEvent>>,
    max_events: usize,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::with_capacity(1000)
    }

    pub fn with_capacity(max_events: usize) -> Self {
        Self {
            events: RwLock::new(Vec::with_capacity(max_events.min(1000))),
            max_events,
        }
    }

    pub fn events(&self) -> Vec<AclAuditEvent> {
        self.events
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn count(&self) -> usize {
        self.events
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn clear(&self) {
        self.events
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    pub fn find_by_type(&self, event_type: AclAuditEventType) -> Vec<AclAuditEvent> {
        self.events
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|e| e.event_type == event_type)
            .cloned()
            .collect()
    }

    pub fn find_by_identity(&self, identity: &ObjectIdentity) -> Vec<AclAuditEvent> {
        let key = identity.to_string();
        self.events
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|e| e.identity == key)
            .cloned()
            .collect()
    }
}

impl Default for MemoryAuditSink {
    fn default() -> Self {
        Self::new()
    }
}

impl AuditSink for MemoryAuditSink {
    fn record(&self, event: AclAuditEvent) -> Result<(), AuditError> {
        let mut events = self.events.write().unwrap_or_else(PoisonError::into_inner);
        if events.len() >= self.max_events {
            events.remove(0);
        }
        events.push(event);
        Ok(())
    }

    fn flush(&self) -> Result<(), AuditError> {
        Ok(())
    }
}

impl fmt::Debug for MemoryAuditSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryAuditSink")
            .field("count", &self.count())
            .field("max_events", &self.max_events)
            .finish()
    }
}

/// Discards every event
#[derive(Debug, Default)]
pub struct NullAuditSink;

impl AuditSink for NullAuditSink {
    fn record(&self, _event: AclAuditEvent) -> Result<(), AuditError> {
        Ok(())
    }

    fn flush(&self) -> Result<(), AuditError> {
        Ok(())
    }
}

/// Fans events out to several sinks
pub struct CompositeAuditSink {
    sinks: Vec<Box<dyn AuditSink>>,
}

impl CompositeAuditSink {
    pub fn new() -> Self {
        Self { sinks: Vec::new() }
    }

    pub fn with_sink(mut self, sink: impl AuditSink + 'static) -> Self {
        self.sinks.push(Box::new(sink));
        self
    }
}

impl Default for CompositeAuditSink {
    fn default() -> Self {
        Self::new()
    }
}

impl AuditSink for CompositeAuditSink {
    fn record(&self, event: AclAuditEvent) -> Result<(), AuditError> {
        for sink in &self.sinks {
            sink.record(event.clone())?;
        }
        Ok(())
    }

    fn flush(&self) -> Result<(), AuditError> {
        for sink in &self.sinks {
            sink.flush()?;
        }
        Ok(())
    }

    fn is_healthy(&self) -> bool {
        self.sinks.iter().all(|s| s.is_healthy())
    }
}

impl fmt::Debug for CompositeAuditSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompositeAuditSink")
            .field("sink_count", &self.sinks.len())
            .finish()
    }
}

impl<S: AuditSink + ?Sized> AuditSink for std::sync::Arc<S> {
    fn record(&self, event: AclAuditEvent) -> Result<(), AuditError> {
        (**self).record(event)
    }

    fn flush(&self) -> Result<(), AuditError> {
        (**self).flush()
    }

    fn is_healthy(&self) -> bool {
        (**self).is_healthy()
    }
}

// ============================================================================
// Helper functions
// ============================================================================

fn entries_details(acl: &Acl) -> AclAuditDetails {
    AclAuditDetails::Entries {
        entry_count: acl.entries().len(),
        fingerprint: acl.fingerprint(),
        owner: acl.owner().map(ToString::to_string),
    }
}

pub fn acl_created(acl: &Acl, principal: &Principal) -> AclAuditEvent {
    AclAuditEvent::new(
        AclAuditEventType::AclCreated,
        acl.identity(),
        principal,
        entries_details(acl),
    )
}

pub fn acl_updated(acl: &Acl, principal: &Principal) -> AclAuditEvent {
    AclAuditEvent::new(
        AclAuditEventType::AclUpdated,
        acl.identity(),
        principal,
        entries_details(acl),
    )
}

pub fn acl_deleted(identity: &ObjectIdentity, principal: &Principal, cascade: bool) -> AclAuditEvent {
    AclAuditEvent::new(
        AclAuditEventType::AclDeleted,
        identity,
        principal,
        AclAuditDetails::Deleted { cascade },
    )
}

pub fn parent_linked(
    child: &ObjectIdentity,
    parent: &ObjectIdentity,
    principal: &Principal,
) -> AclAuditEvent {
    AclAuditEvent::new(
        AclAuditEventType::ParentLinked,
        child,
        principal,
        AclAuditDetails::Parent {
            parent: parent.to_string(),
        },
    )
}

pub fn aces_pruned(
    child: &ObjectIdentity,
    parent: &ObjectIdentity,
    removed: usize,
    principal: &Principal,
) -> AclAuditEvent {
    AclAuditEvent::new(
        AclAuditEventType::AcesPruned,
        child,
        principal,
        AclAuditDetails::Pruned {
            removed,
            parent: parent.to_string(),
        },
    )
}

pub fn inconsistency_detected(child: &Acl, parent: &Acl, principal: &Principal) -> AclAuditEvent {
    AclAuditEvent::new(
        AclAuditEventType::InconsistencyDetected,
        child.identity(),
        principal,
        AclAuditDetails::Mismatch {
            parent: parent.identity().to_string(),
            child_fingerprint: child.fingerprint(),
            parent_fingerprint: parent.fingerprint(),
        },
    )
}
