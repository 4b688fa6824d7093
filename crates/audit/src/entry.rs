use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use modulerp_core::{TenantId, UserId};

/// Kind of mutation an audit entry describes.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    Insert,
    Update,
    SoftDelete,
    Restore,
    HardDelete,
}

impl AuditAction {
    pub fn as_str(self) -> &'static str {
        match self {
            AuditAction::Insert => "insert",
            AuditAction::Update => "update",
            AuditAction::SoftDelete => "soft_delete",
            AuditAction::Restore => "restore",
            AuditAction::HardDelete => "hard_delete",
        }
    }
}

impl core::fmt::Display for AuditAction {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable audit record. Only [`AuditRecorder`](crate::AuditRecorder)
/// creates entries; there are no mutators.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    entry_id: Uuid,
    tenant_id: TenantId,
    /// Position in the tenant's audit stream, starting at 1.
    sequence: u64,
    entity_type: String,
    entity_id: String,
    user_id: UserId,
    action: AuditAction,
    recorded_at: DateTime<Utc>,
    before: Option<JsonValue>,
    after: Option<JsonValue>,
}

impl AuditEntry {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        tenant_id: TenantId,
        sequence: u64,
        entity_type: String,
        entity_id: String,
        user_id: UserId,
        action: AuditAction,
        recorded_at: DateTime<Utc>,
        before: Option<JsonValue>,
        after: Option<JsonValue>,
    ) -> Self {
        Self {
            entry_id: Uuid::now_v7(),
            tenant_id,
            sequence,
            entity_type,
            entity_id,
            user_id,
            action,
            recorded_at,
            before,
            after,
        }
    }

    pub fn entry_id(&self) -> Uuid {
        self.entry_id
    }

    pub fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn entity_type(&self) -> &str {
        &self.entity_type
    }

    pub fn entity_id(&self) -> &str {
        &self.entity_id
    }

    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    pub fn action(&self) -> AuditAction {
        self.action
    }

    pub fn recorded_at(&self) -> DateTime<Utc> {
        self.recorded_at
    }

    pub fn before(&self) -> Option<&JsonValue> {
        self.before.as_ref()
    }

    pub fn after(&self) -> Option<&JsonValue> {
        self.after.as_ref()
    }
}
