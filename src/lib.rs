//! Merit - academic achievement tracking backend
//!
//! Students record achievements as drafts and submit them; their academic
//! advisor verifies or rejects them. Verified achievements feed the
//! statistics and per-student reports.
//!
//! ## Storage
//!
//! - **SQLite**: users, roles, permissions, student and lecturer profiles,
//!   and the achievement references that hold the authoritative workflow
//!   status
//! - **MongoDB**: the achievement records themselves (title, details,
//!   points, attachments)
//! - **Local disk**: uploaded evidence files

pub mod auth;
pub mod config;
pub mod db;
pub mod lifecycle;
pub mod logging;
pub mod routes;
pub mod server;
pub mod services;
pub mod storage;
pub mod types;

pub use config::Args;
pub use server::{run, AppState};
pub use types::{MeritError, Result};
