//! Authorization evaluator.
//!
//! - No IO
//! - No panics
//! - Denial is a value, not an error

use serde::Serialize;
use thiserror::Error;

use modulerp_core::{BranchId, ConfigurationError, DepartmentId, Ownable, OwnershipMetadata, TenantId, UserId};

use crate::{DataScope, Permission, Principal, PrincipalKind};

/// Why a request was denied.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DenyReason {
    /// The record lives in another tenant. Checked before anything else.
    CrossTenant,
    /// The principal holds no grant for the permission.
    NoGrant,
    /// A grant exists but does not reach the record's ownership tier.
    InsufficientScope,
}

impl core::fmt::Display for DenyReason {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(match self {
            DenyReason::CrossTenant => "cross-tenant access",
            DenyReason::NoGrant => "no grant",
            DenyReason::InsufficientScope => "insufficient scope",
        })
    }
}

/// Outcome of [`authorize`].
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "decision", content = "reason", rename_all = "snake_case")]
pub enum Decision {
    Allow,
    Deny(DenyReason),
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allow)
    }

    /// Convert into `Result` for callers that propagate denial with `?`.
    pub fn into_result(self, permission: &Permission) -> Result<(), AuthzError> {
        match self {
            Decision::Allow => Ok(()),
            Decision::Deny(reason) => Err(AuthzError::Denied {
                permission: permission.to_string(),
                reason,
            }),
        }
    }
}

/// Error channel for callers that want exception-style propagation.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthzError {
    #[error("access denied for '{permission}': {reason}")]
    Denied {
        permission: String,
        reason: DenyReason,
    },

    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
}

/// Narrowest scope that reaches `record` for `principal`.
///
/// Own if the principal owns the record, else Department if the departments
/// match, else Branch if the branches match, else Global. Tenant is not
/// considered here.
pub fn required_scope(principal: &Principal, record: &OwnershipMetadata) -> DataScope {
    if same(record.owner_id(), Some(principal.user_id())) {
        DataScope::Own
    } else if same::<DepartmentId>(record.department_id(), principal.department_id()) {
        DataScope::Department
    } else if same::<BranchId>(record.branch_id(), principal.branch_id()) {
        DataScope::Branch
    } else {
        DataScope::Global
    }
}

fn same<T: PartialEq>(a: Option<T>, b: Option<T>) -> bool {
    matches!((a, b), (Some(a), Some(b)) if a == b)
}

/// Decide on raw ownership metadata (no entity-type validation).
pub fn authorize_metadata(
    principal: &Principal,
    permission: &Permission,
    record: &OwnershipMetadata,
) -> Decision {
    if record.tenant_id() != principal.tenant_id() {
        return Decision::Deny(DenyReason::CrossTenant);
    }

    let Some(granted) = principal.scope_for(permission) else {
        return Decision::Deny(DenyReason::NoGrant);
    };

    if granted.covers(required_scope(principal, record)) {
        Decision::Allow
    } else {
        Decision::Deny(DenyReason::InsufficientScope)
    }
}

/// Authorize `principal` to exercise `permission` on `record`.
///
/// Cross-tenant access is denied before the record's ownership metadata is
/// even validated. A record missing ownership fields its entity type requires
/// yields `Err(ConfigurationError)`, never a decision.
pub fn authorize<R: Ownable + ?Sized>(
    principal: &Principal,
    permission: &Permission,
    record: &R,
) -> Result<Decision, ConfigurationError> {
    let meta = record.ownership();

    if meta.tenant_id() != principal.tenant_id() {
        tracing::debug!(
            tenant_id = %principal.tenant_id(),
            record_tenant_id = %meta.tenant_id(),
            %permission,
            entity_type = record.entity_type(),
            "cross-tenant access denied"
        );
        return Ok(Decision::Deny(DenyReason::CrossTenant));
    }

    if let Err(err) = meta.validate(record.entity_type(), record.ownership_requirements()) {
        tracing::error!(
            tenant_id = %principal.tenant_id(),
            %permission,
            error = %err,
            "malformed ownership metadata"
        );
        return Err(err);
    }

    let decision = authorize_metadata(principal, permission, meta);
    tracing::debug!(
        tenant_id = %principal.tenant_id(),
        user_id = %principal.user_id(),
        %permission,
        entity_type = record.entity_type(),
        ?decision,
        "authorization decision"
    );
    Ok(decision)
}

/// [`authorize`], with denial folded into [`AuthzError`].
pub fn require<R: Ownable + ?Sized>(
    principal: &Principal,
    permission: &Permission,
    record: &R,
) -> Result<(), AuthzError> {
    authorize(principal, permission, record)?.into_result(permission)
}

// ─────────────────────────────────────────────────────────────────────────────
// Authorization Explanation
// ─────────────────────────────────────────────────────────────────────────────

/// Detailed, serialisable explanation of an authorization decision.
#[derive(Debug, Clone, Serialize)]
pub struct AuthorizationExplanation {
    pub permission: String,
    pub granted: bool,
    pub decision: Decision,
    /// Scope the principal holds for the permission (explicit or wildcard).
    pub granted_scope: Option<DataScope>,
    /// Narrowest scope that would reach the record (same-tenant only).
    pub required_scope: Option<DataScope>,
    pub reason: String,
    pub principal: PrincipalState,
}

#[derive(Debug, Clone, Serialize)]
pub struct PrincipalState {
    pub user_id: UserId,
    pub tenant_id: TenantId,
    pub department_id: Option<DepartmentId>,
    pub branch_id: Option<BranchId>,
    pub kind: PrincipalKind,
    pub roles: Vec<String>,
    pub grants: Vec<(String, DataScope)>,
    pub has_wildcard: bool,
}

impl From<&Principal> for PrincipalState {
    fn from(principal: &Principal) -> Self {
        Self {
            user_id: principal.user_id(),
            tenant_id: principal.tenant_id(),
            department_id: principal.department_id(),
            branch_id: principal.branch_id(),
            kind: principal.kind().clone(),
            roles: principal.roles().iter().map(|r| r.as_str().to_string()).collect(),
            grants: principal
                .grants()
                .sorted()
                .into_iter()
                .map(|(p, s)| (p.as_str().to_string(), s))
                .collect(),
            has_wildcard: principal.grants().has_wildcard(),
        }
    }
}

/// Explain why [`authorize_metadata`] would allow or deny.
pub fn explain(
    principal: &Principal,
    permission: &Permission,
    record: &OwnershipMetadata,
) -> AuthorizationExplanation {
    let decision = authorize_metadata(principal, permission, record);
    let granted_scope = principal.scope_for(permission);
    let required = (record.tenant_id() == principal.tenant_id())
        .then(|| required_scope(principal, record));

    let reason = match (decision, granted_scope, required) {
        (Decision::Deny(DenyReason::CrossTenant), _, _) => format!(
            "record belongs to tenant {} but principal acts in tenant {}",
            record.tenant_id(),
            principal.tenant_id()
        ),
        (Decision::Deny(DenyReason::NoGrant), _, _) => {
            format!("principal holds no grant for '{permission}'")
        }
        (_, Some(granted), Some(required)) => format!(
            "granted scope '{granted}' {} required scope '{required}'",
            if decision.is_allowed() { "covers" } else { "does not cover" }
        ),
        _ => decision_label(decision).to_string(),
    };

    AuthorizationExplanation {
        permission: permission.to_string(),
        granted: decision.is_allowed(),
        decision,
        granted_scope,
        required_scope: required,
        reason,
        principal: PrincipalState::from(principal),
    }
}

fn decision_label(decision: Decision) -> &'static str {
    match decision {
        Decision::Allow => "allowed",
        Decision::Deny(_) => "denied",
    }
}
