use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use modulerp_auth::Principal;
use modulerp_core::{Clock, DomainError, SystemClock, TenantId};

use crate::{AuditAction, AuditEntry, AuditPersistFailure, AuditSink};

/// What the caller sees when an entry cannot be persisted.
///
/// The failure is always logged. The mutation is never rolled back.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditFailurePolicy {
    /// Background logging only.
    #[default]
    Log,
    /// Also hand the failure back on the [`AuditReceipt`] so the caller can
    /// show a warning.
    Surface,
}

impl FromStr for AuditFailurePolicy {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "log" => Ok(Self::Log),
            "surface" => Ok(Self::Surface),
            other => Err(DomainError::validation(format!(
                "unknown audit failure policy '{other}' (expected log|surface)"
            ))),
        }
    }
}

/// Result of [`AuditRecorder::record`].
#[derive(Debug, Clone, PartialEq)]
pub struct AuditReceipt {
    pub entry: AuditEntry,
    /// Set only under [`AuditFailurePolicy::Surface`] when persisting failed.
    pub warning: Option<AuditPersistFailure>,
}

#[derive(Debug, Copy, Clone)]
struct TenantCursor {
    sequence: u64,
    recorded_at: DateTime<Utc>,
}

/// Produces audit entries, numbered per tenant, and appends them to a sink.
///
/// Within a tenant, sequence numbers strictly increase and timestamps never go
/// backwards, even if the clock does. Assigning the position and appending
/// happen under one lock, so the sink sees entries in sequence order.
pub struct AuditRecorder<S, C = SystemClock> {
    sink: S,
    clock: C,
    policy: AuditFailurePolicy,
    cursors: Mutex<HashMap<TenantId, TenantCursor>>,
}

impl<S: AuditSink> AuditRecorder<S> {
    pub fn new(sink: S) -> Self {
        Self::with_clock(sink, SystemClock)
    }
}

impl<S: AuditSink, C: Clock> AuditRecorder<S, C> {
    pub fn with_clock(sink: S, clock: C) -> Self {
        Self {
            sink,
            clock,
            policy: AuditFailurePolicy::default(),
            cursors: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_policy(mut self, policy: AuditFailurePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn policy(&self) -> AuditFailurePolicy {
        self.policy
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Record an already authorized and committed mutation.
    pub fn record(
        &self,
        action: AuditAction,
        entity_type: &str,
        entity_id: impl core::fmt::Display,
        principal: &Principal,
        before: Option<JsonValue>,
        after: Option<JsonValue>,
    ) -> AuditReceipt {
        let tenant_id = principal.tenant_id();
        let mut cursors = self
            .cursors
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let now = self.clock.now();
        let cursor = match cursors.get(&tenant_id) {
            Some(prev) => TenantCursor {
                sequence: prev.sequence + 1,
                recorded_at: now.max(prev.recorded_at),
            },
            None => TenantCursor {
                sequence: 1,
                recorded_at: now,
            },
        };
        cursors.insert(tenant_id, cursor);

        let entry = AuditEntry::new(
            tenant_id,
            cursor.sequence,
            entity_type.to_string(),
            entity_id.to_string(),
            principal.user_id(),
            action,
            cursor.recorded_at,
            before,
            after,
        );

        let result = self.sink.append(&entry);
        drop(cursors);

        let warning = match result {
            Ok(()) => {
                tracing::debug!(
                    tenant_id = %tenant_id,
                    sequence = entry.sequence(),
                    entity_type,
                    action = %action,
                    "audit entry recorded"
                );
                None
            }
            Err(failure) => {
                tracing::error!(
                    tenant_id = %tenant_id,
                    sequence = entry.sequence(),
                    entity_type,
                    action = %action,
                    error = %failure,
                    "audit entry could not be persisted; mutation stands"
                );
                match self.policy {
                    AuditFailurePolicy::Log => None,
                    AuditFailurePolicy::Surface => Some(failure),
                }
            }
        };

        AuditReceipt { entry, warning }
    }
}
