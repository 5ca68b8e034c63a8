//! Audit logging module.
//!
//! Every privileged action is recorded as one JSON line: what was run,
//! whether it was escalated, how it ended and how long it took.

mod entry;
mod logger;

pub use entry::{AuditEntry, AuditResult};
pub use logger::AuditLogger;
