//! `modulerp-audit`: append-only audit trail for authorized mutations.
//!
//! The recorder is called *after* a write has been authorized and committed.
//! It never authorizes anything itself, and a failure to persist an entry
//! never rolls back the mutation it describes.

pub mod entry;
pub mod recorder;
pub mod sink;

pub use entry::{AuditAction, AuditEntry};
pub use recorder::{AuditFailurePolicy, AuditReceipt, AuditRecorder};
pub use sink::{AuditPersistFailure, AuditSink, InMemoryAuditLog};
