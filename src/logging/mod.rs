//! Logging infrastructure for Merit
//!
//! Structured audit events for the achievement workflow.

pub mod audit;

pub use audit::{AuditAction, AuditEvent, AuditLogger};
