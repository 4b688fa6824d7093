//! `modulerp-core`: shared foundation types for every module.
//!
//! This crate contains **pure** primitives (no infrastructure concerns).

pub mod clock;
pub mod error;
pub mod id;
pub mod ownership;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{DomainError, DomainResult};
pub use id::{BranchId, DepartmentId, RecordId, TenantId, UserId};
pub use ownership::{
    ConfigurationError, Ownable, OwnershipField, OwnershipMetadata, OwnershipRequirements,
};
