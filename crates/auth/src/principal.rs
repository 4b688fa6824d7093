use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use modulerp_core::{BranchId, DepartmentId, TenantId, UserId};

use crate::{DataScope, Permission, PermissionRegistry, RegistryError, Role, RolePolicy};

/// Whether the principal is a person or a module acting on its own behalf.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "name", rename_all = "snake_case")]
pub enum PrincipalKind {
    User,
    Service(String),
}

/// Effective (permission → scope) grants of a principal.
///
/// When several sources grant the same permission, the broadest scope wins.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GrantSet {
    grants: HashMap<Permission, DataScope>,
}

impl GrantSet {
    pub fn insert(&mut self, permission: Permission, scope: DataScope) {
        self.grants
            .entry(permission)
            .and_modify(|s| *s = (*s).max(scope))
            .or_insert(scope);
    }

    /// Scope for `permission`: the explicit grant, else the wildcard grant.
    pub fn scope_for(&self, permission: &Permission) -> Option<DataScope> {
        self.grants
            .get(permission)
            .or_else(|| self.grants.get(&Permission::WILDCARD))
            .copied()
    }

    pub fn has_wildcard(&self) -> bool {
        self.grants.contains_key(&Permission::WILDCARD)
    }

    /// Grants sorted by permission key.
    pub fn sorted(&self) -> Vec<(Permission, DataScope)> {
        let mut grants: Vec<_> = self.grants.iter().map(|(p, s)| (p.clone(), *s)).collect();
        grants.sort_by(|a, b| a.0.cmp(&b.0));
        grants
    }

    pub fn len(&self) -> usize {
        self.grants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.grants.is_empty()
    }
}

/// The acting identity for a request.
///
/// A principal belongs to exactly one tenant and is immutable for the
/// duration of the request. Construct it with [`Principal::builder`] or
/// [`Principal::service`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    user_id: UserId,
    tenant_id: TenantId,
    department_id: Option<DepartmentId>,
    branch_id: Option<BranchId>,
    kind: PrincipalKind,
    roles: Vec<Role>,
    grants: GrantSet,
}

impl Principal {
    pub fn builder(tenant_id: TenantId, user_id: UserId) -> PrincipalBuilder {
        PrincipalBuilder {
            principal: Principal {
                user_id,
                tenant_id,
                department_id: None,
                branch_id: None,
                kind: PrincipalKind::User,
                roles: Vec::new(),
                grants: GrantSet::default(),
            },
        }
    }

    /// Service identity for a module acting inside `tenant_id` (for example,
    /// an event handler re-authorizing its own side effects).
    ///
    /// The user id is derived from `name`, so every action of one service is
    /// attributed to the same actor across calls and restarts.
    pub fn service(
        tenant_id: TenantId,
        name: impl Into<String>,
        registry: &PermissionRegistry,
        grants: &[(&str, DataScope)],
    ) -> Result<Self, RegistryError> {
        let name = name.into();
        let mut builder = Self::builder(tenant_id, Self::service_user_id(&name));
        builder.principal.kind = PrincipalKind::Service(name);
        for (key, scope) in grants {
            builder = builder.grant(registry, key, *scope)?;
        }
        Ok(builder.build())
    }

    /// Stable actor id of the service called `name`.
    pub fn service_user_id(name: &str) -> UserId {
        let key = format!("modulerp.service.{name}");
        UserId::from_uuid(Uuid::new_v5(&Uuid::NAMESPACE_OID, key.as_bytes()))
    }

    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    pub fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }

    pub fn department_id(&self) -> Option<DepartmentId> {
        self.department_id
    }

    pub fn branch_id(&self) -> Option<BranchId> {
        self.branch_id
    }

    pub fn kind(&self) -> &PrincipalKind {
        &self.kind
    }

    pub fn roles(&self) -> &[Role] {
        &self.roles
    }

    pub fn grants(&self) -> &GrantSet {
        &self.grants
    }

    pub fn scope_for(&self, permission: &Permission) -> Option<DataScope> {
        self.grants.scope_for(permission)
    }
}

#[derive(Debug, Clone)]
pub struct PrincipalBuilder {
    principal: Principal,
}

impl PrincipalBuilder {
    pub fn department(mut self, department_id: DepartmentId) -> Self {
        self.principal.department_id = Some(department_id);
        self
    }

    pub fn branch(mut self, branch_id: BranchId) -> Self {
        self.principal.branch_id = Some(branch_id);
        self
    }

    /// Grant `key` at `scope`. Fails for keys the registry does not know.
    pub fn grant(
        mut self,
        registry: &PermissionRegistry,
        key: &str,
        scope: DataScope,
    ) -> Result<Self, RegistryError> {
        let permission = registry.resolve(key)?;
        self.principal.grants.insert(permission, scope);
        Ok(self)
    }

    /// Assign a role, merging its grants.
    pub fn role(mut self, policy: &RolePolicy, name: &str) -> Result<Self, RegistryError> {
        let definition = policy.get(name)?;
        for (permission, scope) in &definition.grants {
            self.principal.grants.insert(permission.clone(), *scope);
        }
        self.principal.roles.push(definition.role.clone());
        Ok(self)
    }

    pub fn build(self) -> Principal {
        self.principal
    }
}
