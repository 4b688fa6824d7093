//! Storage-level scope filters for list/query operations.
//!
//! [`build_scope_filter`] returns a predicate that selects exactly the rows
//! [`authorize_metadata`](crate::authorize::authorize_metadata) would allow,
//! so bulk reads never fetch-then-discard unauthorized rows.

use serde::Serialize;
use uuid::Uuid;

use modulerp_core::{BranchId, DepartmentId, OwnershipMetadata, TenantId, UserId};

use crate::{DataScope, Permission, Principal};

/// A single ownership equality test.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "field", content = "equals", rename_all = "snake_case")]
pub enum OwnershipClause {
    Owner(UserId),
    Department(DepartmentId),
    Branch(BranchId),
}

impl OwnershipClause {
    pub fn matches(&self, record: &OwnershipMetadata) -> bool {
        match self {
            OwnershipClause::Owner(id) => record.owner_id() == Some(*id),
            OwnershipClause::Department(id) => record.department_id() == Some(*id),
            OwnershipClause::Branch(id) => record.branch_id() == Some(*id),
        }
    }
}

/// Row access within the tenant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "access", content = "clauses", rename_all = "snake_case")]
pub enum RowAccess {
    /// No rows at all.
    None,
    /// Every row of the tenant.
    All,
    /// Rows matching at least one clause.
    AnyOf(Vec<OwnershipClause>),
}

/// Tenant-bound row predicate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScopeFilter {
    tenant_id: TenantId,
    access: RowAccess,
}

impl ScopeFilter {
    pub fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }

    pub fn access(&self) -> &RowAccess {
        &self.access
    }

    pub fn matches(&self, record: &OwnershipMetadata) -> bool {
        if record.tenant_id() != self.tenant_id {
            return false;
        }
        match &self.access {
            RowAccess::None => false,
            RowAccess::All => true,
            RowAccess::AnyOf(clauses) => clauses.iter().any(|c| c.matches(record)),
        }
    }

    /// Render as a parameterised SQL predicate (`$n` placeholders, numbering
    /// starts at `first_param`).
    pub fn to_sql(&self, columns: &ColumnMapping, first_param: usize) -> SqlPredicate {
        let mut params = Vec::new();
        let mut next = first_param;
        let mut bind = |value: Uuid, params: &mut Vec<SqlParam>| {
            params.push(SqlParam::Uuid(value));
            let placeholder = format!("${next}");
            next += 1;
            placeholder
        };

        let sql = match &self.access {
            RowAccess::None => "FALSE".to_string(),
            RowAccess::All => {
                let t = bind(*self.tenant_id.as_uuid(), &mut params);
                format!("{} = {t}", columns.tenant)
            }
            RowAccess::AnyOf(clauses) => {
                let t = bind(*self.tenant_id.as_uuid(), &mut params);
                let ors: Vec<String> = clauses
                    .iter()
                    .map(|clause| {
                        let (column, value) = match clause {
                            OwnershipClause::Owner(id) => (columns.owner, *id.as_uuid()),
                            OwnershipClause::Department(id) => (columns.department, *id.as_uuid()),
                            OwnershipClause::Branch(id) => (columns.branch, *id.as_uuid()),
                        };
                        format!("{column} = {}", bind(value, &mut params))
                    })
                    .collect();
                format!("{} = {t} AND ({})", columns.tenant, ors.join(" OR "))
            }
        };

        SqlPredicate { sql, params }
    }
}

/// Column names of the ownership fields in a table.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ColumnMapping {
    pub tenant: &'static str,
    pub owner: &'static str,
    pub department: &'static str,
    pub branch: &'static str,
}

impl Default for ColumnMapping {
    fn default() -> Self {
        Self {
            tenant: "tenant_id",
            owner: "owner_id",
            department: "department_id",
            branch: "branch_id",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SqlParam {
    Uuid(Uuid),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqlPredicate {
    pub sql: String,
    pub params: Vec<SqlParam>,
}

/// Build the row filter equivalent to per-record authorization.
pub fn build_scope_filter(principal: &Principal, permission: &Permission) -> ScopeFilter {
    let access = match principal.scope_for(permission) {
        None => RowAccess::None,
        Some(DataScope::Global) => RowAccess::All,
        Some(scope) => {
            let mut clauses = vec![OwnershipClause::Owner(principal.user_id())];
            if scope >= DataScope::Department {
                if let Some(dept) = principal.department_id() {
                    clauses.push(OwnershipClause::Department(dept));
                }
            }
            if scope >= DataScope::Branch {
                if let Some(branch) = principal.branch_id() {
                    clauses.push(OwnershipClause::Branch(branch));
                }
            }
            RowAccess::AnyOf(clauses)
        }
    };

    tracing::debug!(
        tenant_id = %principal.tenant_id(),
        %permission,
        ?access,
        "built scope filter"
    );

    ScopeFilter {
        tenant_id: principal.tenant_id(),
        access,
    }
}
