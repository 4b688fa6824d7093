//! Integration events exchanged between modules.
//!
//! Publishers depend on this crate, never on the consuming module.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use modulerp_core::{RecordId, TenantId, UserId};

use crate::IntegrationEvent;

/// Projects assigned an asset (equipment, vehicle, ...) to a project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectResourceAssignedEvent {
    pub tenant_id: TenantId,
    pub project_id: RecordId,
    pub project_name: String,
    pub asset_id: RecordId,
    pub assigned_by: UserId,
    pub occurred_at: DateTime<Utc>,
}

impl IntegrationEvent for ProjectResourceAssignedEvent {
    const KIND: &'static str = "projects.resource.assigned";

    fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        self.occurred_at
    }
}

/// Projects released an asset it previously held.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectResourceReleasedEvent {
    pub tenant_id: TenantId,
    pub project_id: RecordId,
    pub asset_id: RecordId,
    pub released_by: UserId,
    pub occurred_at: DateTime<Utc>,
}

impl IntegrationEvent for ProjectResourceReleasedEvent {
    const KIND: &'static str = "projects.resource.released";

    fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        self.occurred_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::EventEnvelope;

    #[test]
    fn envelope_copies_event_metadata() {
        let event = ProjectResourceAssignedEvent {
            tenant_id: TenantId::new(),
            project_id: RecordId::new(),
            project_name: "Downtown Build".into(),
            asset_id: RecordId::new(),
            assigned_by: UserId::new(),
            occurred_at: Utc::now(),
        };

        let envelope = EventEnvelope::wrap(event.clone());
        assert_eq!(envelope.kind(), "projects.resource.assigned");
        assert_eq!(envelope.version(), 1);
        assert_eq!(envelope.tenant_id(), event.tenant_id);
        assert_eq!(envelope.occurred_at(), event.occurred_at);
        assert_eq!(envelope.payload(), &event);

        let json = serde_json::to_value(&envelope).unwrap();
        assert_eq!(json["payload"]["project_name"], "Downtown Build");
    }
}
