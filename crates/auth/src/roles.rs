use std::borrow::Cow;
use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::{DataScope, Permission, PermissionRegistry, RegistryError};

/// Role identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Role(Cow<'static, str>);

impl Role {
    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for Role {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A role with the (permission, scope) pairs it grants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoleDefinition {
    pub role: Role,
    pub grants: Vec<(Permission, DataScope)>,
    pub description: Option<String>,
}

/// Validated role → grants mapping, assembled at start-up.
#[derive(Debug, Clone, Default)]
pub struct RolePolicy {
    roles: HashMap<Role, RoleDefinition>,
}

impl RolePolicy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Define a role. Every permission key must be known to `registry`.
    pub fn define(
        &mut self,
        registry: &PermissionRegistry,
        name: &'static str,
        grants: &[(&str, DataScope)],
        description: Option<&str>,
    ) -> Result<&RoleDefinition, RegistryError> {
        let role = Role::new(name);
        if self.roles.contains_key(&role) {
            return Err(RegistryError::DuplicateRole(name.to_string()));
        }

        let grants = grants
            .iter()
            .map(|(key, scope)| registry.resolve(key).map(|p| (p, *scope)))
            .collect::<Result<Vec<_>, _>>()?;

        let definition = RoleDefinition {
            role: role.clone(),
            grants,
            description: description.map(str::to_string),
        };
        Ok(self.roles.entry(role).or_insert(definition))
    }

    pub fn get(&self, name: &str) -> Result<&RoleDefinition, RegistryError> {
        self.roles
            .get(&Role::new(name.to_string()))
            .ok_or_else(|| RegistryError::UnknownRole(name.to_string()))
    }

    pub fn roles(&self) -> impl Iterator<Item = &RoleDefinition> {
        self.roles.values()
    }
}
