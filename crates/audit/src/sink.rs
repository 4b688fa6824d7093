use std::sync::{Arc, RwLock};

use thiserror::Error;
use uuid::Uuid;

use modulerp_core::TenantId;

use crate::AuditEntry;

/// An audit entry could not be persisted.
///
/// Reported through logging (and optionally to the caller); never a reason
/// to undo the business mutation.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("failed to persist audit entry {entry_id}: {reason}")]
pub struct AuditPersistFailure {
    pub entry_id: Uuid,
    pub reason: String,
}

impl AuditPersistFailure {
    pub fn new(entry_id: Uuid, reason: impl Into<String>) -> Self {
        Self {
            entry_id,
            reason: reason.into(),
        }
    }
}

/// Append-only destination for audit entries.
pub trait AuditSink: Send + Sync {
    fn append(&self, entry: &AuditEntry) -> Result<(), AuditPersistFailure>;
}

impl<S> AuditSink for Arc<S>
where
    S: AuditSink + ?Sized,
{
    fn append(&self, entry: &AuditEntry) -> Result<(), AuditPersistFailure> {
        (**self).append(entry)
    }
}

/// In-memory audit log for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryAuditLog {
    entries: RwLock<Vec<AuditEntry>>,
}

impl InMemoryAuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Entries of one tenant, in append order.
    pub fn entries_for_tenant(&self, tenant_id: TenantId) -> Vec<AuditEntry> {
        match self.entries.read() {
            Ok(entries) => entries
                .iter()
                .filter(|e| e.tenant_id() == tenant_id)
                .cloned()
                .collect(),
            Err(_) => vec![],
        }
    }

    /// History of a single record, in append order.
    pub fn entries_for_entity(
        &self,
        tenant_id: TenantId,
        entity_type: &str,
        entity_id: &str,
    ) -> Vec<AuditEntry> {
        self.entries_for_tenant(tenant_id)
            .into_iter()
            .filter(|e| e.entity_type() == entity_type && e.entity_id() == entity_id)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl AuditSink for InMemoryAuditLog {
    fn append(&self, entry: &AuditEntry) -> Result<(), AuditPersistFailure> {
        let mut entries = self
            .entries
            .write()
            .map_err(|_| AuditPersistFailure::new(entry.entry_id(), "audit log lock poisoned"))?;
        entries.push(entry.clone());
        Ok(())
    }
}
