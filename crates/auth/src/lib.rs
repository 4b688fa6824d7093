//! `modulerp-auth`: tenant- and scope-aware authorization.
//!
//! This crate is intentionally decoupled from HTTP and storage. Every
//! data-access path asks it for a [`Decision`] (single record) or a
//! [`ScopeFilter`] (list/query) before touching storage.

pub mod authorize;
pub mod filter;
pub mod permissions;
pub mod principal;
pub mod roles;
pub mod scope;

pub use authorize::{
    AuthorizationExplanation, AuthzError, Decision, DenyReason, PrincipalState, authorize,
    authorize_metadata, explain, require, required_scope,
};
pub use filter::{
    ColumnMapping, OwnershipClause, RowAccess, ScopeFilter, SqlParam, SqlPredicate,
    build_scope_filter,
};
pub use permissions::{Permission, PermissionDefinition, PermissionRegistry, RegistryError};
pub use principal::{GrantSet, Principal, PrincipalBuilder, PrincipalKind};
pub use roles::{Role, RoleDefinition, RolePolicy};
pub use scope::DataScope;
