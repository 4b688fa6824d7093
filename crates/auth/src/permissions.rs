use std::borrow::Cow;
use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Permission identifier.
///
/// Permissions are keys of the form `module.resource.action` (at least two
/// dot-separated segments of `[a-z0-9_]`), e.g. "hr.payroll.read".
/// The special wildcard `"*"` applies to every permission without an explicit
/// grant.
///
/// Outside of tests, obtain permissions through [`PermissionRegistry::resolve`]
/// so unknown keys are rejected at start-up rather than at evaluation time.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Permission(Cow<'static, str>);

impl Permission {
    pub const WILDCARD: Permission = Permission(Cow::Borrowed("*"));

    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_wildcard(&self) -> bool {
        self.as_str() == "*"
    }

    /// Leading segment of the key (the owning module), e.g. "hr".
    pub fn module(&self) -> &str {
        self.as_str().split('.').next().unwrap_or_default()
    }

    fn is_well_formed(key: &str) -> bool {
        if key == "*" {
            return true;
        }
        let segments: Vec<&str> = key.split('.').collect();
        segments.len() >= 2
            && segments.iter().all(|s| {
                !s.is_empty()
                    && s.chars()
                        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
            })
    }
}

impl core::fmt::Display for Permission {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("malformed permission key '{0}' (expected module.resource.action)")]
    MalformedPermission(String),

    #[error("permission '{0}' is already registered")]
    DuplicatePermission(String),

    #[error("unknown permission '{0}'")]
    UnknownPermission(String),

    #[error("role '{0}' is already defined")]
    DuplicateRole(String),

    #[error("unknown role '{0}'")]
    UnknownRole(String),
}

/// Permission definition (for validation and display).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PermissionDefinition {
    pub permission: Permission,
    pub description: Option<String>,
    /// Capability tag; the owning module, or "system" for the wildcard.
    pub category: String,
}

/// The closed set of permission keys known to the process.
///
/// Built once during start-up; afterwards it is only read.
#[derive(Debug, Clone, Default)]
pub struct PermissionRegistry {
    permissions: HashMap<String, PermissionDefinition>,
}

impl PermissionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a permission key. The description defaults to one derived from
    /// the key.
    pub fn register(
        &mut self,
        key: &'static str,
        description: Option<&str>,
    ) -> Result<Permission, RegistryError> {
        if key == "*" || !Permission::is_well_formed(key) {
            return Err(RegistryError::MalformedPermission(key.to_string()));
        }
        if self.permissions.contains_key(key) {
            return Err(RegistryError::DuplicatePermission(key.to_string()));
        }

        let permission = Permission::new(key);
        self.permissions.insert(
            key.to_string(),
            PermissionDefinition {
                permission: permission.clone(),
                description: description
                    .map(str::to_string)
                    .or_else(|| permission_description(key)),
                category: permission.module().to_string(),
            },
        );
        Ok(permission)
    }

    /// Builder-style [`register`](Self::register) for many keys at once.
    pub fn with_permissions(
        mut self,
        keys: impl IntoIterator<Item = &'static str>,
    ) -> Result<Self, RegistryError> {
        for key in keys {
            self.register(key, None)?;
        }
        Ok(self)
    }

    /// Look up a registered key. The wildcard is always known.
    pub fn resolve(&self, key: &str) -> Result<Permission, RegistryError> {
        if key == "*" {
            return Ok(Permission::WILDCARD);
        }
        self.permissions
            .get(key)
            .map(|d| d.permission.clone())
            .ok_or_else(|| RegistryError::UnknownPermission(key.to_string()))
    }

    pub fn contains(&self, permission: &Permission) -> bool {
        permission.is_wildcard() || self.permissions.contains_key(permission.as_str())
    }

    pub fn definition(&self, key: &str) -> Option<&PermissionDefinition> {
        self.permissions.get(key)
    }

    /// All definitions tagged with `category`, sorted by key.
    pub fn by_category(&self, category: &str) -> Vec<&PermissionDefinition> {
        let mut defs: Vec<&PermissionDefinition> = self
            .permissions
            .values()
            .filter(|d| d.category == category)
            .collect();
        defs.sort_by(|a, b| a.permission.cmp(&b.permission));
        defs
    }

    pub fn len(&self) -> usize {
        self.permissions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.permissions.is_empty()
    }
}

fn permission_description(perm: &str) -> Option<String> {
    let parts: Vec<&str> = perm.split('.').collect();
    if parts.len() < 2 {
        return None;
    }

    let module = parts[0];
    let action = parts[parts.len() - 1];
    let resource = if parts.len() > 2 {
        parts[1..parts.len() - 1].join(".")
    } else {
        module.to_string()
    };

    let action_desc = match action {
        "read" => "View/list",
        "write" => "Create/update/delete",
        "create" => "Create new",
        "update" => "Update",
        "delete" => "Delete",
        "assign" => "Assign",
        _ => action,
    };

    Some(format!("{action_desc} {resource} records"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registered_keys_resolve_and_unknown_keys_are_rejected() {
        let registry = PermissionRegistry::new()
            .with_permissions(["hr.payroll.read", "fixed_assets.asset.update"])
            .unwrap();

        assert_eq!(
            registry.resolve("hr.payroll.read").unwrap().as_str(),
            "hr.payroll.read"
        );
        assert_eq!(
            registry.resolve("hr.payroll.write"),
            Err(RegistryError::UnknownPermission("hr.payroll.write".to_string()))
        );
        assert!(registry.resolve("*").unwrap().is_wildcard());
    }

    #[test]
    fn malformed_and_duplicate_keys_fail_registration() {
        let mut registry = PermissionRegistry::new();
        assert!(matches!(
            registry.register("Payroll", None),
            Err(RegistryError::MalformedPermission(_))
        ));
        assert!(matches!(
            registry.register("hr..read", None),
            Err(RegistryError::MalformedPermission(_))
        ));
        registry.register("hr.payroll.read", None).unwrap();
        assert!(matches!(
            registry.register("hr.payroll.read", None),
            Err(RegistryError::DuplicatePermission(_))
        ));
    }

    #[test]
    fn definitions_carry_category_and_derived_description() {
        let registry = PermissionRegistry::new()
            .with_permissions(["hr.payroll.read", "hr.employee.update", "crm.lead.read"])
            .unwrap();

        let hr = registry.by_category("hr");
        assert_eq!(hr.len(), 2);
        assert_eq!(hr[0].permission.as_str(), "hr.employee.update");

        let def = registry.definition("hr.payroll.read").unwrap();
        assert_eq!(def.description.as_deref(), Some("View/list payroll records"));
    }
}
