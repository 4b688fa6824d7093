//! Tenant-isolated record storage used by the module adapters.

pub mod tenant_store;

pub use tenant_store::{InMemoryTenantStore, TenantStore};
