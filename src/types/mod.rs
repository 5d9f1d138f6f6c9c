//! Shared types

pub mod error;

pub use error::{MeritError, Result};
