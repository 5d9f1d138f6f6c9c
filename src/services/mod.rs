//! Services built on top of the lifecycle engine
//!
//! - **Reports**: achievement statistics and per-student summaries

pub mod reports;

pub use reports::{ReportService, Statistics, StudentReport};
