//! Ownership metadata carried by every persisted business record.
//!
//! The authorization layer never looks at a record's business fields; it only
//! sees the [`OwnershipMetadata`] exposed through [`Ownable`].

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{BranchId, DepartmentId, TenantId, UserId};

/// Ownership tiers of a record.
///
/// `tenant_id` is fixed at construction: there is deliberately no setter.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OwnershipMetadata {
    tenant_id: TenantId,
    owner_id: Option<UserId>,
    department_id: Option<DepartmentId>,
    branch_id: Option<BranchId>,
}

impl OwnershipMetadata {
    pub fn new(tenant_id: TenantId) -> Self {
        Self {
            tenant_id,
            owner_id: None,
            department_id: None,
            branch_id: None,
        }
    }

    pub fn owned_by(mut self, owner_id: UserId) -> Self {
        self.owner_id = Some(owner_id);
        self
    }

    pub fn in_department(mut self, department_id: DepartmentId) -> Self {
        self.department_id = Some(department_id);
        self
    }

    pub fn in_branch(mut self, branch_id: BranchId) -> Self {
        self.branch_id = Some(branch_id);
        self
    }

    pub fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }

    pub fn owner_id(&self) -> Option<UserId> {
        self.owner_id
    }

    pub fn department_id(&self) -> Option<DepartmentId> {
        self.department_id
    }

    pub fn branch_id(&self) -> Option<BranchId> {
        self.branch_id
    }

    /// Hand the record over to another owner (within the same tenant).
    pub fn transfer_owner(&mut self, owner_id: Option<UserId>) {
        self.owner_id = owner_id;
    }

    /// Move the record to another department (within the same tenant).
    pub fn transfer_department(&mut self, department_id: Option<DepartmentId>) {
        self.department_id = department_id;
    }

    /// Move the record to another branch (within the same tenant).
    pub fn transfer_branch(&mut self, branch_id: Option<BranchId>) {
        self.branch_id = branch_id;
    }

    /// Check that every field the entity type requires is present.
    pub fn validate(
        &self,
        entity_type: &str,
        requirements: OwnershipRequirements,
    ) -> Result<(), ConfigurationError> {
        let missing = if requirements.owner && self.owner_id.is_none() {
            Some(OwnershipField::Owner)
        } else if requirements.department && self.department_id.is_none() {
            Some(OwnershipField::Department)
        } else if requirements.branch && self.branch_id.is_none() {
            Some(OwnershipField::Branch)
        } else {
            None
        };

        match missing {
            Some(field) => Err(ConfigurationError::MissingOwnership {
                entity_type: entity_type.to_string(),
                field,
            }),
            None => Ok(()),
        }
    }
}

/// Which ownership fields an entity type must always carry.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct OwnershipRequirements {
    pub owner: bool,
    pub department: bool,
    pub branch: bool,
}

impl OwnershipRequirements {
    /// Only the tenant is required.
    pub const TENANT_ONLY: Self = Self {
        owner: false,
        department: false,
        branch: false,
    };

    /// Owner, department and branch are all required.
    pub const FULL: Self = Self {
        owner: true,
        department: true,
        branch: true,
    };
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OwnershipField {
    Owner,
    Department,
    Branch,
}

impl core::fmt::Display for OwnershipField {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(match self {
            OwnershipField::Owner => "owner_id",
            OwnershipField::Department => "department_id",
            OwnershipField::Branch => "branch_id",
        })
    }
}

/// Caller-side data-integrity bug: a record lacks ownership data its entity
/// type declares as required.
///
/// This is neither Allow nor Deny; it aborts the current operation.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigurationError {
    #[error("{entity_type} record is missing required ownership field '{field}'")]
    MissingOwnership {
        entity_type: String,
        field: OwnershipField,
    },
}

/// A persisted business entity exposing ownership metadata.
pub trait Ownable {
    /// Stable entity type name (e.g. "fixed_assets.asset").
    fn entity_type(&self) -> &'static str;

    fn ownership(&self) -> &OwnershipMetadata;

    /// Ownership fields this entity type must carry.
    fn ownership_requirements(&self) -> OwnershipRequirements {
        OwnershipRequirements::TENANT_ONLY
    }
}

impl<T: Ownable + ?Sized> Ownable for &T {
    fn entity_type(&self) -> &'static str {
        (**self).entity_type()
    }

    fn ownership(&self) -> &OwnershipMetadata {
        (**self).ownership()
    }

    fn ownership_requirements(&self) -> OwnershipRequirements {
        (**self).ownership_requirements()
    }
}
