//! Module adapters built on the authorization, audit and event layers.
//!
//! Every mutating operation follows the same order: authorize, commit,
//! audit, then (for publishers) publish.

pub mod fixed_assets;
pub mod projects;

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value as JsonValue;
use thiserror::Error;

use modulerp_audit::{AuditPersistFailure, AuditRecorder, AuditSink};
use modulerp_auth::{AuthzError, RegistryError};
use modulerp_core::{Clock, ConfigurationError, DomainError};

/// Audit recorder shared by every module of a process.
pub type SharedAuditRecorder = Arc<AuditRecorder<Arc<dyn AuditSink>, Arc<dyn Clock>>>;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ServiceError {
    #[error(transparent)]
    Authz(#[from] AuthzError),

    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error(transparent)]
    Registry(#[from] RegistryError),
}

impl From<ConfigurationError> for ServiceError {
    fn from(err: ConfigurationError) -> Self {
        ServiceError::Authz(AuthzError::Configuration(err))
    }
}

/// A committed change plus the audit warning, if any was surfaced.
#[derive(Debug, Clone, PartialEq)]
pub struct Committed<T> {
    pub record: T,
    pub audit_warning: Option<AuditPersistFailure>,
}

pub(crate) fn snapshot<T: Serialize>(value: &T) -> Option<JsonValue> {
    serde_json::to_value(value).ok()
}
