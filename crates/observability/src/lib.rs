//! Tracing/logging setup shared by every process that hosts the platform.

/// Tracing configuration (filters, formatting).
pub mod tracing;

pub use self::tracing::init;
