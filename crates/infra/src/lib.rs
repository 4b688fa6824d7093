//! Infrastructure layer: configuration, record storage, module adapters and
//! process assembly.

pub mod config;
pub mod modules;
pub mod platform;
pub mod read_model;

#[cfg(test)]
mod integration_tests;

pub use config::{ConfigError, CoreConfig};
pub use modules::{Committed, ServiceError, SharedAuditRecorder};
pub use platform::Platform;
