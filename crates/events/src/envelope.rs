use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use modulerp_core::TenantId;

use crate::IntegrationEvent;

/// Envelope for a published integration event.
///
/// Every subscriber receives its own clone; nothing is shared with the
/// publisher or with sibling subscribers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventEnvelope<E> {
    event_id: Uuid,
    kind: String,
    version: u32,
    tenant_id: TenantId,
    occurred_at: DateTime<Utc>,
    payload: E,
}

impl<E: IntegrationEvent> EventEnvelope<E> {
    /// Wrap an event, assigning a fresh event id.
    pub fn wrap(payload: E) -> Self {
        Self {
            event_id: Uuid::now_v7(),
            kind: E::KIND.to_string(),
            version: E::VERSION,
            tenant_id: payload.tenant_id(),
            occurred_at: payload.occurred_at(),
            payload,
        }
    }
}

impl<E> EventEnvelope<E> {
    pub fn event_id(&self) -> Uuid {
        self.event_id
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }

    pub fn occurred_at(&self) -> DateTime<Utc> {
        self.occurred_at
    }

    pub fn payload(&self) -> &E {
        &self.payload
    }

    pub fn into_payload(self) -> E {
        self.payload
    }
}
