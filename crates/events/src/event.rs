use chrono::{DateTime, Utc};

use modulerp_core::TenantId;

/// An integration event: an immutable fact one module publishes for others.
///
/// Events are:
/// - **immutable** (treat them as facts)
/// - **tenant-scoped** (every event names its tenant)
/// - **versioned** (schema evolution)
pub trait IntegrationEvent: Clone + core::fmt::Debug + Send + Sync + 'static {
    /// Stable event kind identifier (e.g. "projects.resource.assigned").
    ///
    /// Subscriptions are keyed by this tag.
    const KIND: &'static str;

    /// Schema version for this event kind.
    const VERSION: u32 = 1;

    fn tenant_id(&self) -> TenantId;

    /// When the event occurred (business time).
    fn occurred_at(&self) -> DateTime<Utc>;
}
